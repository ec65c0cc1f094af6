//! # Loan Repository
//!
//! Read-only reports over `loan_history`. Loan rows are written by the
//! request lifecycle procedures only.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use labstock_core::input::LoanFilter;
use labstock_core::report::{ComponentLoanCount, LoanDurationSummary, ReturnTimeComparison};
use labstock_core::{LoanHistory, LoanStatus};

pub(crate) const LOAN_COLUMNS: &str = "lh.id, lh.request_id, lh.user_id, lh.component_id, \
     lh.start_date, lh.end_date, lh.status, lh.was_returned, lh.final_status, lh.notes";

/// Repository for loan history reports.
#[derive(Debug, Clone)]
pub struct LoanRepository {
    pool: SqlitePool,
}

impl LoanRepository {
    /// Creates a new LoanRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoanRepository { pool }
    }

    /// Loan rows of one request.
    pub async fn for_request(&self, request_id: i64) -> DbResult<Vec<LoanHistory>> {
        let mut conn = self.pool.acquire().await?;
        loans_for_request(&mut conn, request_id).await
    }

    /// Loans still out: `no_devuelto`, or closed without the component
    /// coming back.
    pub async fn current(&self, filter: &LoanFilter) -> DbResult<Vec<LoanHistory>> {
        debug!(?filter, "Listing current loans");

        let mut builder = select_loans();
        builder.push(
            " WHERE (lh.status = 'no_devuelto' OR (lh.status = 'devuelto' AND lh.was_returned = 0))",
        );
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY lh.start_date DESC, lh.id DESC");

        let loans = builder
            .build_query_as::<LoanHistory>()
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    /// Loans of requests marked as not returned.
    pub async fn not_returned(&self, filter: &LoanFilter) -> DbResult<Vec<LoanHistory>> {
        let mut builder = select_loans();
        builder.push(
            " JOIN requests r ON r.request_id = lh.request_id \
              WHERE lh.status = 'no_devuelto' AND r.status = 'no_devuelto'",
        );
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY lh.start_date DESC, lh.id DESC");

        let loans = builder
            .build_query_as::<LoanHistory>()
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    pub async fn by_user(&self, user_id: i64) -> DbResult<Vec<LoanHistory>> {
        self.filtered(LoanFilter {
            user_id: Some(user_id),
            ..Default::default()
        })
        .await
    }

    /// Loans whose request has any lifecycle event in the period.
    pub async fn by_period(
        &self,
        period_id: i64,
        status: Option<LoanStatus>,
    ) -> DbResult<Vec<LoanHistory>> {
        let mut conn = self.pool.acquire().await?;
        loans_in_period(&mut conn, period_id, status).await
    }

    /// Loan counts per component, most lent first.
    pub async fn most_requested(&self, filter: &LoanFilter) -> DbResult<Vec<ComponentLoanCount>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT c.id AS component_id, c.name AS component_name, c.category_id,
                   COUNT(lh.id) AS loan_count
            FROM loan_history lh
            JOIN components c ON c.id = lh.component_id
            WHERE 1 = 1
            "#,
        );
        push_filters(&mut builder, filter);
        builder.push(" GROUP BY c.id, c.name, c.category_id ORDER BY loan_count DESC, c.name");

        let counts = builder
            .build_query_as::<ComponentLoanCount>()
            .fetch_all(&self.pool)
            .await?;
        Ok(counts)
    }

    /// Returned loans beside their request's due date, latest return first.
    /// Requests without a return date are skipped.
    pub async fn return_time_comparison(
        &self,
        filter: &LoanFilter,
    ) -> DbResult<Vec<ReturnTimeComparison>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT lh.id AS loan_id, lh.request_id, lh.user_id, lh.component_id,
                   c.name AS component_name, lh.start_date, lh.end_date, r.return_date
            FROM loan_history lh
            JOIN requests r ON r.request_id = lh.request_id
            JOIN components c ON c.id = lh.component_id
            WHERE lh.status = 'devuelto'
              AND lh.end_date IS NOT NULL
              AND r.return_date IS NOT NULL
            "#,
        );
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY lh.end_date DESC, lh.id DESC");

        let rows = builder
            .build_query_as::<ReturnTimeComparison>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Mean duration over closed loans and loans of not-returned requests.
    pub async fn average_duration(&self) -> DbResult<LoanDurationSummary> {
        let sql = format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loan_history lh
            JOIN requests r ON r.request_id = lh.request_id
            WHERE (lh.status = 'devuelto' AND lh.end_date IS NOT NULL)
               OR (lh.status = 'no_devuelto' AND r.status = 'no_devuelto')
            "#
        );
        let loans = sqlx::query_as::<_, LoanHistory>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(LoanDurationSummary::from_loans(&loans, Utc::now()))
    }

    async fn filtered(&self, filter: LoanFilter) -> DbResult<Vec<LoanHistory>> {
        let mut builder = select_loans();
        builder.push(" WHERE 1 = 1");
        push_filters(&mut builder, &filter);
        builder.push(" ORDER BY lh.start_date DESC, lh.id DESC");

        let loans = builder
            .build_query_as::<LoanHistory>()
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }
}

fn select_loans() -> QueryBuilder<'static, Sqlite> {
    QueryBuilder::new(format!("SELECT {LOAN_COLUMNS} FROM loan_history lh"))
}

/// Appends `AND ...` clauses. The builder must already have a WHERE.
fn push_filters(builder: &mut QueryBuilder<'static, Sqlite>, filter: &LoanFilter) {
    if let Some(user_id) = filter.user_id {
        builder.push(" AND lh.user_id = ").push_bind(user_id);
    }
    if let Some(component_id) = filter.component_id {
        builder.push(" AND lh.component_id = ").push_bind(component_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND lh.status = ").push_bind(status);
    }
    if let Some(category_id) = filter.category_id {
        builder
            .push(" AND lh.component_id IN (SELECT id FROM components WHERE category_id = ")
            .push_bind(category_id)
            .push(")");
    }
    if let Some(from) = filter.from {
        builder.push(" AND lh.start_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND lh.start_date <= ").push_bind(to);
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

pub(crate) async fn loans_for_request(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> DbResult<Vec<LoanHistory>> {
    let sql = format!(
        "SELECT {LOAN_COLUMNS} FROM loan_history lh WHERE lh.request_id = ?1 ORDER BY lh.id"
    );
    let loans = sqlx::query_as::<_, LoanHistory>(&sql)
        .bind(request_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(loans)
}

pub(crate) async fn loans_in_period(
    conn: &mut SqliteConnection,
    period_id: i64,
    status: Option<LoanStatus>,
) -> DbResult<Vec<LoanHistory>> {
    let mut builder = select_loans();
    builder
        .push(
            " WHERE EXISTS (SELECT 1 FROM request_periods rp \
              WHERE rp.request_id = lh.request_id AND rp.academic_period_id = ",
        )
        .push_bind(period_id)
        .push(")");
    if let Some(status) = status {
        builder.push(" AND lh.status = ").push_bind(status);
    }
    builder.push(" ORDER BY lh.start_date DESC, lh.id DESC");

    let loans = builder
        .build_query_as::<LoanHistory>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(loans)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{
        accepted_request, new_request, seed_category, seed_component, seed_period, test_db,
    };

    #[tokio::test]
    async fn test_current_and_not_returned() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;

        let out = accepted_request(&db, 7, &[(uno.id, 1)]).await;
        let lost = accepted_request(&db, 8, &[(uno.id, 1)]).await;
        let back = accepted_request(&db, 9, &[(uno.id, 1)]).await;

        db.requests().mark_not_returned(lost.request_id, None).await.unwrap();
        db.requests().finalize(back.request_id, None).await.unwrap();

        let current = db.loans().current(&LoanFilter::default()).await.unwrap();
        let mut ids: Vec<i64> = current.iter().map(|l| l.request_id).collect();
        ids.sort();
        assert_eq!(ids, vec![out.request_id, lost.request_id]);

        let not_returned = db.loans().not_returned(&LoanFilter::default()).await.unwrap();
        assert_eq!(not_returned.len(), 1);
        assert_eq!(not_returned[0].request_id, lost.request_id);

        let for_user = db
            .loans()
            .current(&LoanFilter {
                user_id: Some(7),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(for_user.len(), 1);
    }

    #[tokio::test]
    async fn test_by_user_and_period() {
        let db = test_db().await;
        let period = seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let mega = seed_component(&db, category.id, "Arduino Mega", 10).await;

        let first = accepted_request(&db, 7, &[(uno.id, 1), (mega.id, 1)]).await;
        accepted_request(&db, 8, &[(uno.id, 1)]).await;
        db.requests().finalize(first.request_id, None).await.unwrap();

        assert_eq!(db.loans().by_user(7).await.unwrap().len(), 2);
        assert_eq!(db.loans().by_user(8).await.unwrap().len(), 1);

        // Finalized request has inicio + fin rows; its loans appear once.
        assert_eq!(db.loans().by_period(period.id, None).await.unwrap().len(), 3);
        assert_eq!(
            db.loans()
                .by_period(period.id, Some(LoanStatus::Returned))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_most_requested() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let boards = seed_category(&db, "Boards").await;
        let sensors = seed_category(&db, "Sensors").await;
        let uno = seed_component(&db, boards.id, "Arduino Uno", 10).await;
        let dht = seed_component(&db, sensors.id, "DHT11", 10).await;

        accepted_request(&db, 7, &[(uno.id, 1), (dht.id, 1)]).await;
        accepted_request(&db, 8, &[(uno.id, 1)]).await;

        let counts = db.loans().most_requested(&LoanFilter::default()).await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].component_id, uno.id);
        assert_eq!(counts[0].loan_count, 2);

        let sensors_only = db
            .loans()
            .most_requested(&LoanFilter {
                category_id: Some(sensors.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sensors_only.len(), 1);
        assert_eq!(sensors_only[0].component_name, "DHT11");
    }

    #[tokio::test]
    async fn test_return_time_comparison() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;

        let returned = accepted_request(&db, 7, &[(uno.id, 1)]).await;
        let still_out = accepted_request(&db, 7, &[(uno.id, 1)]).await;
        let lost = accepted_request(&db, 8, &[(uno.id, 1)]).await;

        let mut undated = new_request(9, &[(uno.id, 1)]);
        undated.return_date = None;
        let undated = db.requests().create(&undated).await.unwrap();
        db.requests().accept(undated.request_id).await.unwrap();

        db.requests().finalize(returned.request_id, None).await.unwrap();
        db.requests().finalize(undated.request_id, None).await.unwrap();
        db.requests().mark_not_returned(lost.request_id, None).await.unwrap();

        let rows = db
            .loans()
            .return_time_comparison(&LoanFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.request_id, returned.request_id);
        assert_eq!(row.component_name, "Arduino Uno");
        assert_eq!(Some(row.return_date), returned.return_date);
        // Returned right away, a week ahead of the due date.
        assert!(!row.was_late());
        assert!(row.days_late() <= -6);
        assert_ne!(row.request_id, still_out.request_id);

        let other_user = db
            .loans()
            .return_time_comparison(&LoanFilter {
                user_id: Some(8),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(other_user.is_empty());
    }

    #[tokio::test]
    async fn test_average_duration_empty_and_populated() {
        let db = test_db().await;
        assert_eq!(
            db.loans().average_duration().await.unwrap(),
            LoanDurationSummary::default()
        );

        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let request = accepted_request(&db, 7, &[(uno.id, 1)]).await;
        db.requests().finalize(request.request_id, None).await.unwrap();

        let summary = db.loans().average_duration().await.unwrap();
        assert_eq!(summary.sample_size, 1);
        assert!(summary.returned >= 0.0);
        assert_eq!(summary.not_returned, 0.0);
    }
}
