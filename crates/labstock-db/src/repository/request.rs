//! # Request Repository
//!
//! Borrow requests and their detail lines. Creation lives here; the state
//! transitions live in [`super::lifecycle`].
//!
//! ## Soft Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create   ──► availability checked ──► pendiente (holds nothing)       │
//! │                     ...time passes, other loans are accepted...        │
//! │  accept   ──► availability checked AGAIN ──► prestamo (holds stock)    │
//! │                                                                         │
//! │  A successful create does not guarantee a successful accept.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::bounded;
use crate::repository::component::check_stock;
use labstock_core::availability::aggregate_requested;
use labstock_core::input::{NewRequest, RequestFilter};
use labstock_core::{PeriodEvent, Request, RequestDetail, RequestPeriod, RequestStatus};

pub(crate) const REQUEST_COLUMNS: &str = "request_id, user_id, type_request, status, is_active, \
     description, file_url, return_date, responsible, admin_notes, created_at, updated_at";

const REQUEST_PERIOD_COLUMNS: &str =
    "id, request_id, academic_period_id, type_date, request_period_date";

/// Repository for requests and the lifecycle procedures.
#[derive(Debug, Clone)]
pub struct RequestRepository {
    pub(super) pool: SqlitePool,
    pub(super) tx_timeout: Duration,
}

impl RequestRepository {
    /// Creates a new RequestRepository.
    pub fn new(pool: SqlitePool, tx_timeout: Duration) -> Self {
        RequestRepository { pool, tx_timeout }
    }

    /// Creates a pending request.
    ///
    /// ## Steps (one transaction)
    /// 1. Sum quantities per component
    /// 2. Check availability of every component; all shortages are
    ///    reported together and nothing is written
    /// 3. INSERT the request as `pendiente`, then its detail lines
    pub async fn create(&self, input: &NewRequest) -> DbResult<Request> {
        input.validate()?;
        let requested =
            aggregate_requested(input.details.iter().map(|d| (d.component_id, d.quantity)))?;

        bounded("create_request", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;

            check_stock(&mut tx, &requested).await?;

            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO requests (
                    user_id, type_request, status, is_active, description, file_url,
                    return_date, responsible, admin_notes, created_at, updated_at
                ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, NULL, ?8, ?8)
                "#,
            )
            .bind(input.user_id)
            .bind(input.type_request.trim())
            .bind(RequestStatus::Pending)
            .bind(&input.description)
            .bind(&input.file_url)
            .bind(input.return_date)
            .bind(&input.responsible)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            let request_id = result.last_insert_rowid();

            for detail in &input.details {
                sqlx::query(
                    "INSERT INTO request_details (request_id, component_id, quantity) VALUES (?1, ?2, ?3)",
                )
                .bind(request_id)
                .bind(detail.component_id)
                .bind(detail.quantity)
                .execute(&mut *tx)
                .await?;
            }

            let request = fetch_request(&mut tx, request_id).await?;
            tx.commit().await?;

            info!(
                request_id,
                user_id = input.user_id,
                lines = input.details.len(),
                "Request created"
            );
            Ok(request)
        })
        .await
    }

    /// Gets a request with its details.
    pub async fn get(&self, request_id: i64) -> DbResult<Request> {
        let mut conn = self.pool.acquire().await?;
        fetch_request(&mut conn, request_id).await
    }

    /// Lists requests, newest first, with details.
    pub async fn list(&self, filter: &RequestFilter) -> DbResult<Vec<Request>> {
        debug!(?filter, "Listing requests");

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE 1 = 1"));
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(is_active) = filter.is_active {
            builder.push(" AND is_active = ").push_bind(is_active);
        }
        builder.push(" ORDER BY created_at DESC, request_id DESC");

        let mut conn = self.pool.acquire().await?;
        let requests = builder
            .build_query_as::<Request>()
            .fetch_all(&mut *conn)
            .await?;
        attach_details(&mut conn, requests).await
    }

    /// Active loans due in `[from, to)`. Read by the due-date scanner.
    pub async fn due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Request>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM requests \
             WHERE status = 'prestamo' AND is_active = 1 \
               AND return_date >= ?1 AND return_date < ?2 \
             ORDER BY return_date, request_id"
        );
        let mut conn = self.pool.acquire().await?;
        let requests = sqlx::query_as::<_, Request>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&mut *conn)
            .await?;
        attach_details(&mut conn, requests).await
    }

    /// Audit trail of a request, oldest first.
    pub async fn period_events(&self, request_id: i64) -> DbResult<Vec<RequestPeriod>> {
        let sql = format!(
            "SELECT {REQUEST_PERIOD_COLUMNS} FROM request_periods \
             WHERE request_id = ?1 ORDER BY id"
        );
        let events = sqlx::query_as::<_, RequestPeriod>(&sql)
            .bind(request_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

pub(crate) async fn fetch_request(conn: &mut SqliteConnection, request_id: i64) -> DbResult<Request> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE request_id = ?1");
    let mut request = sqlx::query_as::<_, Request>(&sql)
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Request", request_id))?;

    request.details = sqlx::query_as::<_, RequestDetail>(
        "SELECT id, request_id, component_id, quantity FROM request_details \
         WHERE request_id = ?1 ORDER BY id",
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(request)
}

async fn attach_details(
    conn: &mut SqliteConnection,
    mut requests: Vec<Request>,
) -> DbResult<Vec<Request>> {
    if requests.is_empty() {
        return Ok(requests);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, request_id, component_id, quantity FROM request_details WHERE request_id IN (",
    );
    let mut separated = builder.separated(", ");
    for request in &requests {
        separated.push_bind(request.request_id);
    }
    separated.push_unseparated(") ORDER BY id");

    let details = builder
        .build_query_as::<RequestDetail>()
        .fetch_all(&mut *conn)
        .await?;

    let mut by_request: HashMap<i64, Vec<RequestDetail>> = HashMap::new();
    for detail in details {
        by_request.entry(detail.request_id).or_default().push(detail);
    }
    for request in &mut requests {
        request.details = by_request.remove(&request.request_id).unwrap_or_default();
    }
    Ok(requests)
}

/// Appends an audit row binding a lifecycle event to a period.
pub(crate) async fn insert_request_period(
    conn: &mut SqliteConnection,
    request_id: i64,
    period_id: i64,
    event: PeriodEvent,
    at: DateTime<Utc>,
) -> DbResult<RequestPeriod> {
    let result = sqlx::query(
        r#"
        INSERT INTO request_periods (request_id, academic_period_id, type_date, request_period_date)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(request_id)
    .bind(period_id)
    .bind(event)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(RequestPeriod {
        id: result.last_insert_rowid(),
        request_id,
        academic_period_id: period_id,
        type_date: event,
        request_period_date: at,
    })
}

pub(crate) async fn has_period_event(
    conn: &mut SqliteConnection,
    request_id: i64,
    event: PeriodEvent,
) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM request_periods WHERE request_id = ?1 AND type_date = ?2",
    )
    .bind(request_id)
    .bind(event)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
