//! # Academic Period Registry
//!
//! ## Single Active Period
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  set_active(3)                                                         │
//! │    BEGIN                                                               │
//! │      SELECT period 3                  (NotFound if missing)            │
//! │      UPDATE ... SET is_active = 0 WHERE is_active = 1                  │
//! │      UPDATE ... SET is_active = 1 WHERE id = 3                         │
//! │    COMMIT                                                              │
//! │                                                                         │
//! │  Backstop: UNIQUE INDEX ON academic_periods(is_active)                 │
//! │            WHERE is_active = 1                                         │
//! │  A racing activation fails instead of leaving two active periods.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Activation only happens through [`PeriodRepository::set_active`];
//! create and update never touch `is_active`.

use std::time::Duration;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::bounded;
use crate::repository::loan::loans_in_period;
use crate::repository::movement::MOVEMENT_COLUMNS;
use labstock_core::input::NewAcademicPeriod;
use labstock_core::period::ensure_deletable;
use labstock_core::report::{PeriodReport, PeriodStats, PeriodSummary};
use labstock_core::{AcademicPeriod, ComponentMovement};

const PERIOD_COLUMNS: &str = "id, name, start_date, end_date, is_active, created_at";

/// Repository for academic periods.
#[derive(Debug, Clone)]
pub struct PeriodRepository {
    pool: SqlitePool,
    tx_timeout: Duration,
}

impl PeriodRepository {
    /// Creates a new PeriodRepository.
    pub fn new(pool: SqlitePool, tx_timeout: Duration) -> Self {
        PeriodRepository { pool, tx_timeout }
    }

    /// Creates an inactive period.
    pub async fn create(&self, input: &NewAcademicPeriod) -> DbResult<AcademicPeriod> {
        input.validate()?;
        let now = Utc::now();

        debug!(name = %input.name, "Creating academic period");

        let result = sqlx::query(
            r#"
            INSERT INTO academic_periods (name, start_date, end_date, is_active, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            "#,
        )
        .bind(input.name.trim())
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(AcademicPeriod {
            id: result.last_insert_rowid(),
            name: input.name.trim().to_string(),
            start_date: input.start_date,
            end_date: input.end_date,
            is_active: false,
            created_at: now,
        })
    }

    /// Gets a period by ID.
    pub async fn get(&self, id: i64) -> DbResult<AcademicPeriod> {
        let mut conn = self.pool.acquire().await?;
        fetch_period(&mut conn, id).await
    }

    /// The active period, if any.
    pub async fn active(&self) -> DbResult<Option<AcademicPeriod>> {
        let mut conn = self.pool.acquire().await?;
        active_period(&mut conn).await
    }

    /// Lists periods, most recent start first.
    pub async fn list(&self, include_stats: bool) -> DbResult<Vec<PeriodSummary>> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM academic_periods ORDER BY start_date DESC, id DESC"
        );
        let mut conn = self.pool.acquire().await?;
        let periods = sqlx::query_as::<_, AcademicPeriod>(&sql)
            .fetch_all(&mut *conn)
            .await?;

        let mut summaries = Vec::with_capacity(periods.len());
        for period in periods {
            let stats = if include_stats {
                let loans = loans_in_period(&mut conn, period.id, None).await?;
                let movements = movements_in_period(&mut conn, period.id).await?;
                Some(PeriodStats::from_rows(&loans, &movements))
            } else {
                None
            };
            summaries.push(PeriodSummary { period, stats });
        }
        Ok(summaries)
    }

    /// Replaces name and dates. Activation state is unchanged.
    pub async fn update(&self, id: i64, input: &NewAcademicPeriod) -> DbResult<AcademicPeriod> {
        input.validate()?;
        debug!(id, "Updating academic period");

        let result = sqlx::query(
            "UPDATE academic_periods SET name = ?2, start_date = ?3, end_date = ?4 WHERE id = ?1",
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.start_date)
        .bind(input.end_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("AcademicPeriod", id));
        }
        self.get(id).await
    }

    /// Makes `id` the only active period.
    pub async fn set_active(&self, id: i64) -> DbResult<AcademicPeriod> {
        bounded("set_active_period", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;

            fetch_period(&mut tx, id).await?;

            let deactivated = sqlx::query(
                "UPDATE academic_periods SET is_active = 0 WHERE is_active = 1 AND id <> ?1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE academic_periods SET is_active = 1 WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            let period = fetch_period(&mut tx, id).await?;
            tx.commit().await?;

            info!(
                period_id = id,
                deactivated = deactivated.rows_affected(),
                "Academic period activated"
            );
            Ok(period)
        })
        .await
    }

    /// Deletes a period and everything bound to it.
    ///
    /// ## Steps (one transaction)
    /// 1. Refuse while a loan bound to the period is still out
    ///    (`no_devuelto` on a request that is on loan or not returned)
    /// 2. Close historical `no_devuelto` loans bound to the period
    /// 3. Delete its request_periods and component_movements
    /// 4. Delete the period
    pub async fn delete(&self, id: i64) -> DbResult<AcademicPeriod> {
        bounded("delete_period", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let period = fetch_period(&mut tx, id).await?;

            let outstanding: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(DISTINCT lh.id)
                FROM loan_history lh
                JOIN requests r ON r.request_id = lh.request_id
                JOIN request_periods rp ON rp.request_id = lh.request_id
                WHERE rp.academic_period_id = ?1
                  AND lh.status = 'no_devuelto'
                  AND r.status IN ('prestamo', 'no_devuelto')
                "#,
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            ensure_deletable(id, outstanding)?;

            let now = Utc::now();
            let closed = sqlx::query(
                r#"
                UPDATE loan_history
                SET status = 'devuelto', end_date = ?2
                WHERE status = 'no_devuelto'
                  AND request_id IN (
                      SELECT request_id FROM request_periods WHERE academic_period_id = ?1
                  )
                "#,
            )
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            for sql in [
                "DELETE FROM request_periods WHERE academic_period_id = ?1",
                "DELETE FROM component_movements WHERE academic_period_id = ?1",
                "DELETE FROM academic_periods WHERE id = ?1",
            ] {
                sqlx::query(sql).bind(id).execute(&mut *tx).await?;
            }

            tx.commit().await?;

            info!(
                period_id = id,
                loans_closed = closed.rows_affected(),
                "Academic period deleted"
            );
            Ok(period)
        })
        .await
    }

    /// Loans, movements and counts for one period.
    pub async fn report(&self, id: i64) -> DbResult<PeriodReport> {
        let mut conn = self.pool.acquire().await?;
        let period = fetch_period(&mut conn, id).await?;
        let loans = loans_in_period(&mut conn, id, None).await?;
        let movements = movements_in_period(&mut conn, id).await?;

        Ok(PeriodReport {
            stats: PeriodStats::from_rows(&loans, &movements),
            period,
            loans,
            movements,
        })
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

pub(crate) async fn fetch_period(conn: &mut SqliteConnection, id: i64) -> DbResult<AcademicPeriod> {
    let sql = format!("SELECT {PERIOD_COLUMNS} FROM academic_periods WHERE id = ?1");
    sqlx::query_as::<_, AcademicPeriod>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("AcademicPeriod", id))
}

pub(crate) async fn active_period(conn: &mut SqliteConnection) -> DbResult<Option<AcademicPeriod>> {
    let sql = format!("SELECT {PERIOD_COLUMNS} FROM academic_periods WHERE is_active = 1 LIMIT 1");
    let period = sqlx::query_as::<_, AcademicPeriod>(&sql)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(period)
}

async fn movements_in_period(
    conn: &mut SqliteConnection,
    period_id: i64,
) -> DbResult<Vec<ComponentMovement>> {
    let sql = format!(
        "SELECT {MOVEMENT_COLUMNS} FROM component_movements \
         WHERE academic_period_id = ?1 ORDER BY movement_date DESC, id DESC"
    );
    let movements = sqlx::query_as::<_, ComponentMovement>(&sql)
        .bind(period_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(movements)
}

// =============================================================================
// Unit Tests
// =============================================================================
