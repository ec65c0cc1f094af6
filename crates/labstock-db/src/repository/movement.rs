//! # Stock Movement Engine
//!
//! Records ingreso/egreso movements and keeps `components.quantity` in step
//! with the ledger.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                 │
//! │    SELECT component                     → current = 10                 │
//! │    labstock-core::apply_movement(egreso, 3) → new = 7, signed = −3     │
//! │    UPDATE components SET quantity = 7                                  │
//! │      WHERE id = ? AND quantity = 10     ← compare-and-swap             │
//! │      (0 rows → someone else moved stock → ConcurrentUpdate, retryable) │
//! │    INSERT component_movements (quantity = −3)                          │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::bounded;
use crate::repository::component::fetch_component;
use crate::repository::period::{active_period, fetch_period};
use labstock_core::input::{MovementFilter, NewMovement};
use labstock_core::movement::apply_movement;
use labstock_core::period::resolve_period;
use labstock_core::{Component, ComponentMovement, MovementType};

pub(crate) const MOVEMENT_COLUMNS: &str =
    "id, component_id, quantity, reason, movement_type, academic_period_id, movement_date";

/// Repository for the movement ledger.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
    tx_timeout: Duration,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool, tx_timeout: Duration) -> Self {
        MovementRepository { pool, tx_timeout }
    }

    /// Records a movement and updates the component quantity atomically.
    ///
    /// ## Errors
    /// - `Validation` - quantity not positive, empty reason
    /// - `NotFound` - unknown component or period
    /// - `NoActivePeriod` - no period given and none active
    /// - `InsufficientStock` - egreso would take stock below zero
    /// - `ConcurrentUpdate` - stock changed mid-transaction (retryable)
    pub async fn create(&self, input: &NewMovement) -> DbResult<ComponentMovement> {
        input.validate()?;

        bounded("create_movement", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;

            let component = fetch_component(&mut tx, input.component_id).await?;
            let period_id = match input.academic_period_id {
                Some(id) => fetch_period(&mut tx, id).await?.id,
                None => resolve_period(None, active_period(&mut tx).await?.as_ref())?,
            };

            let movement = record_movement(
                &mut tx,
                &component,
                input.movement_type,
                input.quantity,
                input.reason.trim(),
                period_id,
            )
            .await?;

            tx.commit().await?;

            info!(
                movement_id = movement.id,
                component_id = component.id,
                quantity = movement.quantity,
                "Stock movement recorded"
            );
            Ok(movement)
        })
        .await
    }

    /// Lists movements, newest first.
    pub async fn list(&self, filter: &MovementFilter) -> DbResult<Vec<ComponentMovement>> {
        debug!(?filter, "Listing movements");

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {MOVEMENT_COLUMNS} FROM component_movements WHERE 1 = 1"
        ));
        if let Some(component_id) = filter.component_id {
            builder.push(" AND component_id = ").push_bind(component_id);
        }
        if let Some(movement_type) = filter.movement_type {
            builder.push(" AND movement_type = ").push_bind(movement_type);
        }
        if let Some(from) = filter.from {
            builder.push(" AND movement_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND movement_date <= ").push_bind(to);
        }
        builder.push(" ORDER BY movement_date DESC, id DESC");

        let movements = builder
            .build_query_as::<ComponentMovement>()
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Sum of the ledger for one component. Equals its quantity unless
    /// a period (and its movements) was deleted.
    pub async fn ledger_total(&self, component_id: i64) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM component_movements WHERE component_id = ?1",
        )
        .bind(component_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

/// Applies one movement inside the caller's transaction.
///
/// `component` is the row as read in this transaction; the quantity update
/// only succeeds if nobody changed it since.
pub(crate) async fn record_movement(
    conn: &mut SqliteConnection,
    component: &Component,
    movement_type: MovementType,
    quantity: i64,
    reason: &str,
    period_id: i64,
) -> DbResult<ComponentMovement> {
    let change = apply_movement(
        component.id,
        &component.name,
        component.quantity,
        movement_type,
        quantity,
    )?;
    let now = Utc::now();

    debug!(
        component_id = component.id,
        previous = change.previous,
        new_quantity = change.new_quantity,
        "Applying stock movement"
    );

    let updated = sqlx::query(
        "UPDATE components SET quantity = ?1, updated_at = ?2 WHERE id = ?3 AND quantity = ?4",
    )
    .bind(change.new_quantity)
    .bind(now)
    .bind(component.id)
    .bind(change.previous)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(DbError::ConcurrentUpdate {
            entity: "Component",
            id: component.id,
        });
    }

    let result = sqlx::query(
        r#"
        INSERT INTO component_movements (
            component_id, quantity, reason, movement_type, academic_period_id, movement_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(component.id)
    .bind(change.signed_quantity)
    .bind(reason)
    .bind(movement_type)
    .bind(period_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(ComponentMovement {
        id: result.last_insert_rowid(),
        component_id: component.id,
        quantity: change.signed_quantity,
        reason: reason.to_string(),
        movement_type,
        academic_period_id: period_id,
        movement_date: now,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{seed_category, seed_component, seed_period, test_db};
    use labstock_core::{CoreError, ValidationError, MAX_QUANTITY};

    fn movement(component_id: i64, movement_type: MovementType, quantity: i64) -> NewMovement {
        NewMovement {
            component_id,
            quantity,
            reason: "Inventory adjustment".to_string(),
            movement_type,
            academic_period_id: None,
        }
    }

    #[tokio::test]
    async fn test_ingress_and_egress_update_quantity() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Passives").await;
        let resistor = seed_component(&db, category.id, "Resistor 220R", 100).await;

        let m = db
            .movements()
            .create(&movement(resistor.id, MovementType::Egress, 30))
            .await
            .unwrap();
        assert_eq!(m.quantity, -30);

        db.movements()
            .create(&movement(resistor.id, MovementType::Ingress, 5))
            .await
            .unwrap();

        let component = db.components().get(resistor.id).await.unwrap();
        assert_eq!(component.quantity, 75);
        assert_eq!(db.movements().ledger_total(resistor.id).await.unwrap(), 75);
    }

    #[tokio::test]
    async fn test_egress_cannot_go_negative() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Passives").await;
        let cap = seed_component(&db, category.id, "Capacitor 10uF", 4).await;

        let err = db
            .movements()
            .create(&movement(cap.id, MovementType::Egress, 5))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InsufficientStock(_))));

        // Nothing was written.
        assert_eq!(db.components().get(cap.id).await.unwrap().quantity, 4);
        assert_eq!(db.movements().ledger_total(cap.id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_validation_before_transaction() {
        let db = test_db().await;
        let mut input = movement(1, MovementType::Ingress, 0);
        assert!(matches!(
            db.movements().create(&input).await.unwrap_err().as_domain(),
            Some(CoreError::Validation(_))
        ));

        input.quantity = 2;
        input.reason = " ".to_string();
        assert!(matches!(
            db.movements().create(&input).await.unwrap_err().as_domain(),
            Some(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_ingress_rejected_without_writing() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Passives").await;
        let led = seed_component(&db, category.id, "LED 5mm", 1).await;

        let err = db
            .movements()
            .create(&movement(led.id, MovementType::Ingress, i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::Validation(ValidationError::TooLarge { .. }))
        ));
        assert!(!err.is_retryable());

        db.movements()
            .create(&movement(led.id, MovementType::Ingress, MAX_QUANTITY))
            .await
            .unwrap();
        assert_eq!(
            db.components().get(led.id).await.unwrap().quantity,
            MAX_QUANTITY + 1
        );
    }

    #[tokio::test]
    async fn test_explicit_period_and_missing_period() {
        let db = test_db().await;
        let active = seed_period(&db, "2025-I", true).await;
        let other = seed_period(&db, "2024-II", false).await;
        let category = seed_category(&db, "Passives").await;
        let diode = seed_component(&db, category.id, "1N4007", 10).await;

        let mut input = movement(diode.id, MovementType::Ingress, 1);
        input.academic_period_id = Some(other.id);
        let m = db.movements().create(&input).await.unwrap();
        assert_eq!(m.academic_period_id, other.id);

        input.academic_period_id = Some(9_999);
        let err = db.movements().create(&input).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NotFound { .. })));

        input.academic_period_id = None;
        let m = db.movements().create(&input).await.unwrap();
        assert_eq!(m.academic_period_id, active.id);
    }

    #[tokio::test]
    async fn test_no_active_period() {
        let db = test_db().await;
        let period = seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Passives").await;
        let diode = seed_component(&db, category.id, "1N4007", 10).await;

        sqlx::query("UPDATE academic_periods SET is_active = 0 WHERE id = ?1")
            .bind(period.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db
            .movements()
            .create(&movement(diode.id, MovementType::Ingress, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NoActivePeriod)));
    }

    #[tokio::test]
    async fn test_stale_quantity_is_a_concurrent_update() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Passives").await;
        let led = seed_component(&db, category.id, "LED red", 10).await;
        let period = db.periods().active().await.unwrap().unwrap();

        // Another writer moved stock after `led` was read.
        db.movements()
            .create(&movement(led.id, MovementType::Egress, 2))
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = record_movement(&mut conn, &led, MovementType::Egress, 1, "stale", period.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConcurrentUpdate { entity: "Component", .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_list_filters_newest_first() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Passives").await;
        let led = seed_component(&db, category.id, "LED red", 10).await;
        let other = seed_component(&db, category.id, "LED green", 10).await;

        db.movements()
            .create(&movement(led.id, MovementType::Egress, 2))
            .await
            .unwrap();

        let for_led = db
            .movements()
            .list(&MovementFilter {
                component_id: Some(led.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(for_led.len(), 2);
        assert_eq!(for_led[0].movement_type, MovementType::Egress);

        let egress_only = db
            .movements()
            .list(&MovementFilter {
                movement_type: Some(MovementType::Egress),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(egress_only.len(), 1);
        assert!(egress_only.iter().all(|m| m.component_id != other.id));
    }
}
