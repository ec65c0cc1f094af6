//! # Component Repository
//!
//! Catalog operations and the Availability Calculator's data access.
//!
//! ## Stock Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  components.quantity                                                   │
//! │       ▲                                                                 │
//! │       │ written ONLY by record_movement (movement.rs)                   │
//! │       │                                                                 │
//! │  create_with_stock ──► INSERT quantity 0 ──► ingreso +N                │
//! │  update            ──► name, description, category, is_active, image   │
//! │                                                                         │
//! │  availability = max(0, quantity − active loans − not returned)         │
//! │                  computed from request_details ⋈ requests               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::bounded;
use crate::repository::movement::record_movement;
use crate::repository::period::{active_period, fetch_period};
use labstock_core::input::{ComponentStatusFilter, ComponentUpdate, LowStockFilter, NewComponent};
use labstock_core::period::resolve_period;
use labstock_core::report::ComponentStock;
use labstock_core::validation::validate_id_list;
use labstock_core::{
    Availability, Component, CoreError, MovementType, OpenDemand, Shortage,
};

pub(crate) const COMPONENT_COLUMNS: &str =
    "id, name, description, quantity, category_id, is_active, image_url, created_at, updated_at";

/// Repository for component database operations.
#[derive(Debug, Clone)]
pub struct ComponentRepository {
    pool: SqlitePool,
    tx_timeout: Duration,
}

impl ComponentRepository {
    /// Creates a new ComponentRepository.
    pub fn new(pool: SqlitePool, tx_timeout: Duration) -> Self {
        ComponentRepository { pool, tx_timeout }
    }

    /// Creates a component and records its initial stock.
    ///
    /// ## Steps (one transaction)
    /// 1. Resolve the period (explicit or active)
    /// 2. INSERT the component with quantity 0
    /// 3. Record an ingreso movement of `initial_quantity`
    ///
    /// No component ever holds stock without a movement explaining it.
    pub async fn create_with_stock(&self, input: &NewComponent) -> DbResult<Component> {
        input.validate()?;

        bounded("create_component", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;

            let period_id = match input.academic_period_id {
                Some(id) => fetch_period(&mut tx, id).await?.id,
                None => resolve_period(None, active_period(&mut tx).await?.as_ref())?,
            };

            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO components (
                    name, description, quantity, category_id,
                    is_active, image_url, created_at, updated_at
                ) VALUES (?1, ?2, 0, ?3, 1, ?4, ?5, ?5)
                "#,
            )
            .bind(input.name.trim())
            .bind(&input.description)
            .bind(input.category_id)
            .bind(&input.image_url)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let id = result.last_insert_rowid();
            let component = fetch_component(&mut tx, id).await?;

            let movement = record_movement(
                &mut tx,
                &component,
                MovementType::Ingress,
                input.initial_quantity,
                input.reason.trim(),
                period_id,
            )
            .await?;

            let component = fetch_component(&mut tx, id).await?;
            tx.commit().await?;

            info!(
                component_id = id,
                quantity = component.quantity,
                movement_id = movement.id,
                "Component created"
            );
            Ok(component)
        })
        .await
    }

    /// Gets a component by ID.
    pub async fn get(&self, id: i64) -> DbResult<Component> {
        let mut conn = self.pool.acquire().await?;
        fetch_component(&mut conn, id).await
    }

    /// Lists components with their availability, by name.
    pub async fn list(&self, filter: ComponentStatusFilter) -> DbResult<Vec<ComponentStock>> {
        debug!(?filter, "Listing components");

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COMPONENT_COLUMNS} FROM components"));
        if let Some(is_active) = filter.is_active() {
            builder.push(" WHERE is_active = ").push_bind(is_active);
        }
        builder.push(" ORDER BY name, id");

        let mut conn = self.pool.acquire().await?;
        let components = builder
            .build_query_as::<Component>()
            .fetch_all(&mut *conn)
            .await?;

        let ids: Vec<i64> = components.iter().map(|c| c.id).collect();
        let demand = load_demand(&mut conn, &ids).await?;

        Ok(components
            .into_iter()
            .map(|component| {
                let availability =
                    Availability::calculate(component.id, component.quantity, &demand);
                ComponentStock {
                    component,
                    availability,
                }
            })
            .collect())
    }

    /// Computes availability for one component.
    ///
    /// Fails with NotFound for unknown ids.
    pub async fn availability(&self, id: i64) -> DbResult<Availability> {
        let mut conn = self.pool.acquire().await?;
        let component = fetch_component(&mut conn, id).await?;
        let demand = load_demand(&mut conn, &[id]).await?;
        Ok(Availability::calculate(id, component.quantity, &demand))
    }

    /// Fails with InsufficientStock when `requested` exceeds availability.
    /// The error carries the full breakdown.
    pub async fn check_availability(&self, id: i64, requested: i64) -> DbResult<Availability> {
        let mut conn = self.pool.acquire().await?;
        let requested_map = BTreeMap::from([(id, requested)]);
        check_stock(&mut conn, &requested_map).await?;

        let component = fetch_component(&mut conn, id).await?;
        let demand = load_demand(&mut conn, &[id]).await?;
        Ok(Availability::calculate(id, component.quantity, &demand))
    }

    /// Case-insensitive substring search on the name.
    pub async fn search_by_name(&self, fragment: &str) -> DbResult<Vec<Component>> {
        let fragment = fragment.trim();
        debug!(fragment = %fragment, "Searching components");

        let sql = format!(
            "SELECT {COMPONENT_COLUMNS} FROM components \
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name, id"
        );
        let pattern = format!("%{}%", escape_like(fragment));

        let components = sqlx::query_as::<_, Component>(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(components)
    }

    /// Components whose total stock is below the threshold, lowest first.
    pub async fn low_stock(&self, filter: &LowStockFilter) -> DbResult<Vec<Component>> {
        filter.validate()?;
        debug!(?filter, "Listing low stock components");

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {COMPONENT_COLUMNS} FROM components WHERE quantity < "
        ));
        builder.push_bind(filter.threshold);
        if let Some(category_id) = filter.category_id {
            builder.push(" AND category_id = ").push_bind(category_id);
        }
        builder.push(" ORDER BY quantity, name, id");

        let components = builder
            .build_query_as::<Component>()
            .fetch_all(&self.pool)
            .await?;
        Ok(components)
    }

    /// Components in any of the given categories.
    pub async fn filter_by_categories(&self, category_ids: &[i64]) -> DbResult<Vec<Component>> {
        validate_id_list("category_ids", category_ids)?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {COMPONENT_COLUMNS} FROM components WHERE category_id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in category_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY name, id");

        let components = builder
            .build_query_as::<Component>()
            .fetch_all(&self.pool)
            .await?;
        Ok(components)
    }

    /// Edits metadata. Quantity is not editable here.
    pub async fn update(&self, id: i64, changes: &ComponentUpdate) -> DbResult<Component> {
        changes.validate()?;
        debug!(id, "Updating component");

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE components SET updated_at = ");
        builder.push_bind(Utc::now());
        if let Some(name) = &changes.name {
            builder.push(", name = ").push_bind(name.trim().to_string());
        }
        if let Some(description) = &changes.description {
            builder.push(", description = ").push_bind(description.clone());
        }
        if let Some(category_id) = changes.category_id {
            builder.push(", category_id = ").push_bind(category_id);
        }
        if let Some(is_active) = changes.is_active {
            builder.push(", is_active = ").push_bind(is_active);
        }
        if let Some(image_url) = &changes.image_url {
            builder.push(", image_url = ").push_bind(image_url.clone());
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Component", id));
        }

        self.get(id).await
    }

    /// Deletes a component and its history.
    ///
    /// ## Guards
    /// - loans still `no_devuelto`
    /// - listed in a `pendiente` request
    /// - loans `devuelto` without an end date (inconsistent close)
    ///
    /// Then removes request details, loans, movements, and the component.
    pub async fn delete(&self, id: i64) -> DbResult<Component> {
        bounded("delete_component", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let component = fetch_component(&mut tx, id).await?;

            let guards: [(&str, &str); 3] = [
                (
                    "SELECT COUNT(*) FROM loan_history \
                     WHERE component_id = ?1 AND status = 'no_devuelto'",
                    "loan(s) not returned",
                ),
                (
                    "SELECT COUNT(*) FROM request_details d \
                     JOIN requests r ON r.request_id = d.request_id \
                     WHERE d.component_id = ?1 AND r.status = 'pendiente'",
                    "pending request line(s)",
                ),
                (
                    "SELECT COUNT(*) FROM loan_history \
                     WHERE component_id = ?1 AND status = 'devuelto' AND end_date IS NULL",
                    "returned loan(s) without an end date",
                ),
            ];

            for (sql, what) in guards {
                let count: i64 = sqlx::query_scalar(sql).bind(id).fetch_one(&mut *tx).await?;
                if count > 0 {
                    return Err(CoreError::conflict(format!(
                        "Component '{}' has {count} {what}",
                        component.name
                    ))
                    .into());
                }
            }

            for sql in [
                "DELETE FROM request_details WHERE component_id = ?1",
                "DELETE FROM loan_history WHERE component_id = ?1",
                "DELETE FROM component_movements WHERE component_id = ?1",
                "DELETE FROM components WHERE id = ?1",
            ] {
                sqlx::query(sql).bind(id).execute(&mut *tx).await?;
            }

            tx.commit().await?;
            info!(component_id = id, "Component deleted");
            Ok(component)
        })
        .await
    }

    /// Counts active components (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM components WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

pub(crate) async fn fetch_component(conn: &mut SqliteConnection, id: i64) -> DbResult<Component> {
    let sql = format!("SELECT {COMPONENT_COLUMNS} FROM components WHERE id = ?1");
    sqlx::query_as::<_, Component>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Component", id))
}

/// Detail lines that currently hold stock for the given components.
pub(crate) async fn load_demand(
    conn: &mut SqliteConnection,
    component_ids: &[i64],
) -> DbResult<Vec<OpenDemand>> {
    if component_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT d.component_id, r.status, r.is_active, d.quantity
        FROM request_details d
        JOIN requests r ON r.request_id = d.request_id
        WHERE (r.status = 'no_devuelto' OR (r.status = 'prestamo' AND r.is_active = 1))
          AND d.component_id IN (
        "#,
    );
    let mut separated = builder.separated(", ");
    for id in component_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let demand = builder
        .build_query_as::<OpenDemand>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(demand)
}

/// Checks every requested component, reporting all shortages together.
///
/// `requested` must already be aggregated per component.
pub(crate) async fn check_stock(
    conn: &mut SqliteConnection,
    requested: &BTreeMap<i64, i64>,
) -> DbResult<()> {
    let ids: Vec<i64> = requested.keys().copied().collect();
    let demand = load_demand(conn, &ids).await?;

    let mut shortages: Vec<Shortage> = Vec::new();
    for (component_id, quantity) in requested {
        let component = fetch_component(conn, *component_id).await?;
        let availability = Availability::calculate(component.id, component.quantity, &demand);
        if let Some(shortage) = availability.check(component.id, &component.name, *quantity) {
            shortages.push(shortage);
        }
    }

    if shortages.is_empty() {
        Ok(())
    } else {
        debug!(count = shortages.len(), "Insufficient stock");
        Err(CoreError::InsufficientStock(shortages).into())
    }
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Unit Tests
// =============================================================================
