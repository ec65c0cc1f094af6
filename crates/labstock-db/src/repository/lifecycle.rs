//! # Request Lifecycle Procedures
//!
//! Every transition is one named transaction. The rules come from
//! `labstock_core::lifecycle`; this module owns the SQL and the ordering of
//! writes.
//!
//! ```text
//!   pendiente ──accept──► prestamo ──finalize──────────► finalizado
//!       │                    │                              ▲
//!       └──reject──► finalizado                             │
//!                            └──mark_not_returned──► no_devuelto ──finalize──┘
//! ```
//!
//! The status write is a compare-and-swap on the status read at the start
//! of the procedure. Two admins racing on the same request cannot both win:
//! the loser gets [`DbError::ConcurrentUpdate`], which is retryable.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::component::{check_stock, fetch_component};
use super::loan::loans_for_request;
use super::movement::record_movement;
use super::period::active_period;
use super::request::{fetch_request, has_period_event, insert_request_period, RequestRepository};
use crate::error::{DbError, DbResult};
use crate::pool::bounded;
use labstock_core::availability::aggregate_requested;
use labstock_core::lifecycle::{
    authorize_delete, authorize_return_date_update, ensure_on_loan, ensure_open_loan,
    finalize_path, FINALIZED_FROM_NOT_RETURNED_NOTE, NOT_RETURNED_WRITE_OFF_REASON,
};
use labstock_core::period::require_active;
use labstock_core::report::{DeletedRequest, RejectedRequest, RequestWithPeriod};
use labstock_core::validation::validate_rejection_notes;
use labstock_core::{
    Actor, CoreError, FinalizePath, LoanOutcome, LoanStatus, MovementType, PeriodEvent, Request,
    RequestStatus, Transition,
};

impl RequestRepository {
    /// Accepts a pending request and opens its loans.
    ///
    /// ## Steps (one transaction)
    /// 1. Require `pendiente`
    /// 2. Re-check availability of every component (all shortages reported)
    /// 3. Require an active period
    /// 4. CAS status `pendiente` → `prestamo`
    /// 5. INSERT one `no_devuelto` loan per component
    /// 6. INSERT the `inicio` audit row
    pub async fn accept(&self, request_id: i64) -> DbResult<Request> {
        bounded("accept_request", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let request = fetch_request(&mut tx, request_id).await?;
            Transition::Accept.ensure_from(request_id, request.status)?;

            let requested = aggregate_requested(
                request.details.iter().map(|d| (d.component_id, d.quantity)),
            )?;
            check_stock(&mut tx, &requested).await?;

            let period = require_active(active_period(&mut tx).await?)?;
            let now = Utc::now();

            transition_status(
                &mut tx,
                request_id,
                request.status,
                Transition::Accept.target(),
                true,
                None,
                now,
            )
            .await?;

            for component_id in requested.keys() {
                sqlx::query(
                    r#"
                    INSERT INTO loan_history (
                        request_id, user_id, component_id, start_date, end_date,
                        status, was_returned, final_status, notes
                    ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, 0, NULL, NULL)
                    "#,
                )
                .bind(request_id)
                .bind(request.user_id)
                .bind(*component_id)
                .bind(now)
                .bind(LoanStatus::NotReturned)
                .execute(&mut *tx)
                .await?;
            }

            insert_request_period(&mut tx, request_id, period.id, PeriodEvent::Start, now).await?;

            let accepted = fetch_request(&mut tx, request_id).await?;
            tx.commit().await?;

            info!(
                request_id,
                period_id = period.id,
                loans = requested.len(),
                "Request accepted"
            );
            Ok(accepted)
        })
        .await
    }

    /// Rejects a pending request. Stock is never touched.
    ///
    /// The proof file reference is cleared in the same transaction and
    /// handed back so the caller can remove the file.
    pub async fn reject(&self, request_id: i64, notes: &str) -> DbResult<RejectedRequest> {
        let notes = validate_rejection_notes(notes)?;

        bounded("reject_request", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let request = fetch_request(&mut tx, request_id).await?;
            Transition::Reject.ensure_from(request_id, request.status)?;

            transition_status(
                &mut tx,
                request_id,
                request.status,
                Transition::Reject.target(),
                false,
                Some(&notes),
                Utc::now(),
            )
            .await?;

            if request.file_url.is_some() {
                sqlx::query("UPDATE requests SET file_url = NULL WHERE request_id = ?1")
                    .bind(request_id)
                    .execute(&mut *tx)
                    .await?;
            }

            let rejected = fetch_request(&mut tx, request_id).await?;
            tx.commit().await?;

            info!(request_id, "Request rejected");
            Ok(RejectedRequest {
                request: rejected,
                detached_file_url: request.file_url,
            })
        })
        .await
    }

    /// Closes a request.
    ///
    /// From `prestamo` the loans come back: `devuelto`, `was_returned`,
    /// `finalizado_normal`. From `no_devuelto` the loans are left as they
    /// are and the missing units are written off with an egress per
    /// component, clamped to what is still on the shelf. Both paths append
    /// a `fin` audit row in the active period.
    pub async fn finalize(
        &self,
        request_id: i64,
        admin_notes: Option<String>,
    ) -> DbResult<RequestWithPeriod> {
        bounded("finalize_request", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let request = fetch_request(&mut tx, request_id).await?;
            let path = finalize_path(request_id, request.status)?;
            let period = require_active(active_period(&mut tx).await?)?;
            let now = Utc::now();

            let notes = match path {
                FinalizePath::FromOnLoan => admin_notes,
                FinalizePath::FromNotReturned => {
                    Some(admin_notes.unwrap_or_else(|| FINALIZED_FROM_NOT_RETURNED_NOTE.to_string()))
                }
            };

            transition_status(
                &mut tx,
                request_id,
                request.status,
                RequestStatus::Finalized,
                false,
                notes.as_deref(),
                now,
            )
            .await?;

            match path {
                FinalizePath::FromOnLoan => {
                    let closed = sqlx::query(
                        r#"
                        UPDATE loan_history
                        SET status = ?1, end_date = ?2, was_returned = 1, final_status = ?3
                        WHERE request_id = ?4
                        "#,
                    )
                    .bind(LoanStatus::Returned)
                    .bind(now)
                    .bind(LoanOutcome::ReturnedNormally)
                    .bind(request_id)
                    .execute(&mut *tx)
                    .await?;
                    debug!(request_id, loans = closed.rows_affected(), "Loans returned");
                }
                FinalizePath::FromNotReturned => {
                    let missing = aggregate_requested(
                        request.details.iter().map(|d| (d.component_id, d.quantity)),
                    )?;
                    for (component_id, quantity) in missing {
                        let component = fetch_component(&mut tx, component_id).await?;
                        let written_off = quantity.min(component.quantity);
                        if written_off == 0 {
                            continue;
                        }
                        record_movement(
                            &mut tx,
                            &component,
                            MovementType::Egress,
                            written_off,
                            NOT_RETURNED_WRITE_OFF_REASON,
                            period.id,
                        )
                        .await?;
                    }
                }
            }

            let request_period =
                insert_request_period(&mut tx, request_id, period.id, PeriodEvent::End, now)
                    .await?;
            let finalized = fetch_request(&mut tx, request_id).await?;
            tx.commit().await?;

            info!(request_id, period_id = period.id, ?path, "Request finalized");
            Ok(RequestWithPeriod {
                request: finalized,
                request_period,
            })
        })
        .await
    }

    /// Marks a loan as not returned. The request stays active and its units
    /// stay subtracted from availability.
    pub async fn mark_not_returned(
        &self,
        request_id: i64,
        admin_notes: Option<String>,
    ) -> DbResult<RequestWithPeriod> {
        bounded("mark_not_returned", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let request = fetch_request(&mut tx, request_id).await?;
            Transition::MarkNotReturned.ensure_from(request_id, request.status)?;
            let period = require_active(active_period(&mut tx).await?)?;
            let now = Utc::now();

            transition_status(
                &mut tx,
                request_id,
                request.status,
                Transition::MarkNotReturned.target(),
                request.is_active,
                admin_notes.as_deref(),
                now,
            )
            .await?;

            sqlx::query(
                r#"
                UPDATE loan_history
                SET status = ?1, was_returned = 0, final_status = ?2
                WHERE request_id = ?3
                "#,
            )
            .bind(LoanStatus::NotReturned)
            .bind(LoanOutcome::NotReturned)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

            let request_period = insert_request_period(
                &mut tx,
                request_id,
                period.id,
                PeriodEvent::NotReturned,
                now,
            )
            .await?;
            let updated = fetch_request(&mut tx, request_id).await?;
            tx.commit().await?;

            info!(request_id, period_id = period.id, "Request marked as not returned");
            Ok(RequestWithPeriod {
                request: updated,
                request_period,
            })
        })
        .await
    }

    /// Moves the return date of a loan. Allowed once per request.
    ///
    /// ## Checks, in order
    /// 1. Actor is the owner, or an admin while the request is active
    /// 2. Request is `prestamo` with an open loan
    /// 3. No earlier `actualizacion_retorno` row
    /// 4. An active period exists
    pub async fn update_return_date(
        &self,
        request_id: i64,
        actor: &Actor,
        return_date: DateTime<Utc>,
    ) -> DbResult<Request> {
        bounded("update_return_date", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let request = fetch_request(&mut tx, request_id).await?;

            authorize_return_date_update(actor, request.user_id, request.is_active)?;
            ensure_on_loan(request_id, request.status, "update_return_date")?;
            let loans = loans_for_request(&mut tx, request_id).await?;
            ensure_open_loan(request_id, &loans)?;

            if has_period_event(&mut tx, request_id, PeriodEvent::ReturnDateUpdate).await? {
                return Err(CoreError::AlreadyModified { request_id }.into());
            }

            let period = require_active(active_period(&mut tx).await?)?;
            let now = Utc::now();

            let updated = sqlx::query(
                r#"
                UPDATE requests SET return_date = ?1, updated_at = ?2
                WHERE request_id = ?3 AND status = ?4
                "#,
            )
            .bind(return_date)
            .bind(now)
            .bind(request_id)
            .bind(RequestStatus::OnLoan)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(DbError::ConcurrentUpdate {
                    entity: "Request",
                    id: request_id,
                });
            }

            insert_request_period(
                &mut tx,
                request_id,
                period.id,
                PeriodEvent::ReturnDateUpdate,
                now,
            )
            .await?;
            let request = fetch_request(&mut tx, request_id).await?;
            tx.commit().await?;

            info!(request_id, user_id = actor.user_id, %return_date, "Return date updated");
            Ok(request)
        })
        .await
    }

    /// Deletes a request and everything hanging off it.
    ///
    /// ## Steps (one transaction)
    /// 1. Permission check (a loan in progress is never deletable)
    /// 2. Close open loan rows: `devuelto`, end date now
    /// 3. DELETE details, audit rows, loan rows, then the request
    pub async fn delete(&self, request_id: i64, actor: &Actor) -> DbResult<DeletedRequest> {
        bounded("delete_request", self.tx_timeout, async {
            let mut tx = self.pool.begin().await?;
            let request = fetch_request(&mut tx, request_id).await?;
            authorize_delete(actor, request_id, request.user_id, request.status)?;

            let closed = sqlx::query(
                r#"
                UPDATE loan_history
                SET status = ?1, end_date = COALESCE(end_date, ?2)
                WHERE request_id = ?3 AND (status = ?4 OR end_date IS NULL)
                "#,
            )
            .bind(LoanStatus::Returned)
            .bind(Utc::now())
            .bind(request_id)
            .bind(LoanStatus::NotReturned)
            .execute(&mut *tx)
            .await?;

            for sql in [
                "DELETE FROM request_details WHERE request_id = ?1",
                "DELETE FROM request_periods WHERE request_id = ?1",
                "DELETE FROM loan_history WHERE request_id = ?1",
                "DELETE FROM requests WHERE request_id = ?1",
            ] {
                sqlx::query(sql).bind(request_id).execute(&mut *tx).await?;
            }

            tx.commit().await?;

            info!(
                request_id,
                user_id = actor.user_id,
                loans_closed = closed.rows_affected(),
                "Request deleted"
            );
            Ok(DeletedRequest {
                request,
                loans_closed: closed.rows_affected(),
            })
        })
        .await
    }
}

/// Compare-and-swap on `requests.status`.
///
/// `admin_notes` of `None` keeps the stored notes.
pub(crate) async fn transition_status(
    conn: &mut SqliteConnection,
    request_id: i64,
    expected: RequestStatus,
    next: RequestStatus,
    is_active: bool,
    admin_notes: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    debug!(request_id, from = %expected, to = %next, "Transitioning request");

    let result = sqlx::query(
        r#"
        UPDATE requests
        SET status = ?1, is_active = ?2, admin_notes = COALESCE(?3, admin_notes), updated_at = ?4
        WHERE request_id = ?5 AND status = ?6
        "#,
    )
    .bind(next)
    .bind(is_active)
    .bind(admin_notes)
    .bind(now)
    .bind(request_id)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::ConcurrentUpdate {
            entity: "Request",
            id: request_id,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{
        accepted_request, new_request, seed_category, seed_component, seed_period, seed_request,
        test_db,
    };
    use chrono::Duration as ChronoDuration;
    use labstock_core::input::MovementFilter;

    #[tokio::test]
    async fn test_accept_opens_loans_and_exhausts_stock() {
        let db = test_db().await;
        let period = seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let a = seed_component(&db, category.id, "Component A", 10).await;

        let request = seed_request(&db, 7, &[(a.id, 10)]).await;
        let accepted = db.requests().accept(request.request_id).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::OnLoan);
        assert!(accepted.is_active);

        let loans = db.loans().for_request(request.request_id).await.unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].status, LoanStatus::NotReturned);
        assert!(loans[0].end_date.is_none());

        let events = db.requests().period_events(request.request_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].type_date, PeriodEvent::Start);
        assert_eq!(events[0].academic_period_id, period.id);

        assert_eq!(
            db.components().availability(a.id).await.unwrap().available_quantity,
            0
        );

        // A second request cannot even be created.
        let err = db
            .requests()
            .create(&crate::repository::test_support::new_request(8, &[(a.id, 1)]))
            .await
            .unwrap_err();
        match err.as_domain() {
            Some(CoreError::InsufficientStock(shortages)) => assert_eq!(shortages[0].available, 0),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_accept_rechecks_and_lists_every_shortage() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 5).await;
        let mega = seed_component(&db, category.id, "Arduino Mega", 5).await;

        // Both pass the soft check at creation time.
        let late = seed_request(&db, 7, &[(uno.id, 4), (mega.id, 4)]).await;
        accepted_request(&db, 8, &[(uno.id, 3), (mega.id, 3)]).await;

        let err = db.requests().accept(late.request_id).await.unwrap_err();
        match err.as_domain() {
            Some(CoreError::InsufficientStock(shortages)) => {
                assert_eq!(shortages.len(), 2);
                assert!(shortages.iter().all(|s| s.available == 2 && s.in_requests == 3));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Nothing changed.
        let request = db.requests().get(late.request_id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(db.loans().for_request(late.request_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_without_active_period() {
        let db = test_db().await;
        let period = seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 5).await;
        let request = seed_request(&db, 7, &[(uno.id, 1)]).await;

        sqlx::query("UPDATE academic_periods SET is_active = 0 WHERE id = ?1")
            .bind(period.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.requests().accept(request.request_id).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NoActivePeriod)));
        assert_eq!(
            db.requests().get(request.request_id).await.unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_accept_twice_is_invalid_transition() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 5).await;
        let request = accepted_request(&db, 7, &[(uno.id, 1)]).await;

        let err = db.requests().accept(request.request_id).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InvalidTransition { from: RequestStatus::OnLoan, .. })
        ));
    }

    #[tokio::test]
    async fn test_reject() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 5).await;
        let request = seed_request(&db, 7, &[(uno.id, 1)]).await;

        let err = db.requests().reject(request.request_id, "   ").await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));

        let RejectedRequest {
            request: rejected,
            detached_file_url,
        } = db
            .requests()
            .reject(request.request_id, " Out of scope ")
            .await
            .unwrap();
        assert!(detached_file_url.is_none());
        assert_eq!(rejected.status, RequestStatus::Finalized);
        assert!(!rejected.is_active);
        assert_eq!(rejected.admin_notes.as_deref(), Some("Out of scope"));
        assert!(db.loans().for_request(request.request_id).await.unwrap().is_empty());
        assert_eq!(db.components().get(uno.id).await.unwrap().quantity, 5);

        let err = db.requests().reject(request.request_id, "again").await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_reject_detaches_proof_file() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 5).await;

        let mut input = new_request(7, &[(uno.id, 1)]);
        input.file_url = Some("/uploads/proof.pdf".to_string());
        let request = db.requests().create(&input).await.unwrap();
        assert_eq!(request.file_url.as_deref(), Some("/uploads/proof.pdf"));

        let rejected = db
            .requests()
            .reject(request.request_id, "Missing signature")
            .await
            .unwrap();
        assert_eq!(
            rejected.detached_file_url.as_deref(),
            Some("/uploads/proof.pdf")
        );
        assert!(rejected.request.file_url.is_none());
        assert!(db
            .requests()
            .get(request.request_id)
            .await
            .unwrap()
            .file_url
            .is_none());
    }

    #[tokio::test]
    async fn test_finalize_returns_loans_and_is_not_repeatable() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 5).await;
        let request = accepted_request(&db, 7, &[(uno.id, 2)]).await;

        let result = db
            .requests()
            .finalize(request.request_id, Some("All good".to_string()))
            .await
            .unwrap();
        assert_eq!(result.request.status, RequestStatus::Finalized);
        assert!(!result.request.is_active);
        assert_eq!(result.request.admin_notes.as_deref(), Some("All good"));
        assert_eq!(result.request_period.type_date, PeriodEvent::End);

        let loans = db.loans().for_request(request.request_id).await.unwrap();
        assert_eq!(loans[0].status, LoanStatus::Returned);
        assert!(loans[0].was_returned);
        assert_eq!(loans[0].final_status, Some(LoanOutcome::ReturnedNormally));
        assert!(loans[0].end_date.is_some());
        assert_eq!(
            db.components().availability(uno.id).await.unwrap().available_quantity,
            5
        );

        let err = db.requests().finalize(request.request_id, None).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::AlreadyFinalized { .. })
        ));
        assert_eq!(
            db.requests().period_events(request.request_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_finalize_pending_is_invalid() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 5).await;
        let request = seed_request(&db, 7, &[(uno.id, 2)]).await;

        let err = db.requests().finalize(request.request_id, None).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_not_returned_then_finalized() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let request = accepted_request(&db, 7, &[(uno.id, 3)]).await;

        let marked = db
            .requests()
            .mark_not_returned(request.request_id, None)
            .await
            .unwrap();
        assert_eq!(marked.request.status, RequestStatus::NotReturned);
        assert_eq!(marked.request_period.type_date, PeriodEvent::NotReturned);

        let availability = db.components().availability(uno.id).await.unwrap();
        assert_eq!(availability.not_returned_quantity, 3);
        assert_eq!(availability.available_quantity, 7);

        let finalized = db.requests().finalize(request.request_id, None).await.unwrap();
        assert_eq!(finalized.request.status, RequestStatus::Finalized);
        assert!(!finalized.request.is_active);
        assert_eq!(
            finalized.request.admin_notes.as_deref(),
            Some(FINALIZED_FROM_NOT_RETURNED_NOTE)
        );

        let loans = db.loans().for_request(request.request_id).await.unwrap();
        assert!(!loans[0].was_returned);
        assert_eq!(loans[0].final_status, Some(LoanOutcome::NotReturned));
        assert_eq!(loans[0].status, LoanStatus::NotReturned);

        let types: Vec<PeriodEvent> = db
            .requests()
            .period_events(request.request_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.type_date)
            .collect();
        assert_eq!(
            types,
            vec![PeriodEvent::Start, PeriodEvent::NotReturned, PeriodEvent::End]
        );

        // Written off: availability does not jump back to 10.
        let availability = db.components().availability(uno.id).await.unwrap();
        assert_eq!(availability.total_quantity, 7);
        assert_eq!(availability.available_quantity, 7);
        let egress = db
            .movements()
            .list(&MovementFilter {
                component_id: Some(uno.id),
                movement_type: Some(MovementType::Egress),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(egress.len(), 1);
        assert_eq!(egress[0].quantity, -3);
        assert_eq!(egress[0].reason, NOT_RETURNED_WRITE_OFF_REASON);
    }

    #[tokio::test]
    async fn test_mark_not_returned_requires_loan() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let request = seed_request(&db, 7, &[(uno.id, 3)]).await;

        let err = db
            .requests()
            .mark_not_returned(request.request_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_update_return_date_once() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let request = accepted_request(&db, 7, &[(uno.id, 1)]).await;
        let new_date = Utc::now() + ChronoDuration::days(14);

        let err = db
            .requests()
            .update_return_date(request.request_id, &Actor::user(8), new_date)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::PermissionDenied { .. })));

        let updated = db
            .requests()
            .update_return_date(request.request_id, &Actor::user(7), new_date)
            .await
            .unwrap();
        assert_eq!(
            updated.return_date.map(|d| d.timestamp()),
            Some(new_date.timestamp())
        );

        let err = db
            .requests()
            .update_return_date(
                request.request_id,
                &Actor::admin(1),
                new_date + ChronoDuration::days(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::AlreadyModified { .. })));

        let events = db.requests().period_events(request.request_id).await.unwrap();
        assert_eq!(events.last().map(|e| e.type_date), Some(PeriodEvent::ReturnDateUpdate));
    }

    #[tokio::test]
    async fn test_update_return_date_requires_loan() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let request = seed_request(&db, 7, &[(uno.id, 1)]).await;

        let err = db
            .requests()
            .update_return_date(request.request_id, &Actor::user(7), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidStatus { .. })));
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;

        let pending = seed_request(&db, 7, &[(uno.id, 1)]).await;
        let err = db
            .requests()
            .delete(pending.request_id, &Actor::user(8))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::PermissionDenied { .. })));

        let on_loan = accepted_request(&db, 7, &[(uno.id, 1)]).await;
        for actor in [Actor::user(7), Actor::admin(1)] {
            let err = db.requests().delete(on_loan.request_id, &actor).await.unwrap_err();
            assert!(matches!(err.as_domain(), Some(CoreError::Conflict { .. })));
        }

        let deleted = db
            .requests()
            .delete(pending.request_id, &Actor::user(7))
            .await
            .unwrap();
        assert_eq!(deleted.loans_closed, 0);
        assert_eq!(deleted.request.details.len(), 1);
        assert!(db.requests().get(pending.request_id).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_deletes_not_returned_request() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let mega = seed_component(&db, category.id, "Arduino Mega", 10).await;

        let request = accepted_request(&db, 7, &[(uno.id, 1), (mega.id, 2)]).await;
        db.requests()
            .mark_not_returned(request.request_id, None)
            .await
            .unwrap();

        let err = db
            .requests()
            .delete(request.request_id, &Actor::user(7))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::PermissionDenied { .. })));

        let deleted = db
            .requests()
            .delete(request.request_id, &Actor::admin(1))
            .await
            .unwrap();
        assert_eq!(deleted.loans_closed, 2);
        assert!(db.loans().for_request(request.request_id).await.unwrap().is_empty());
        assert!(db.requests().period_events(request.request_id).await.unwrap().is_empty());
        assert_eq!(
            db.components().availability(mega.id).await.unwrap().available_quantity,
            10
        );
    }

    #[tokio::test]
    async fn test_stale_status_swap_is_retryable() {
        let db = test_db().await;
        seed_period(&db, "2025-I", true).await;
        let category = seed_category(&db, "Boards").await;
        let uno = seed_component(&db, category.id, "Arduino Uno", 10).await;
        let request = seed_request(&db, 7, &[(uno.id, 1)]).await;

        let mut conn = db.pool().acquire().await.unwrap();
        let err = transition_status(
            &mut conn,
            request.request_id,
            RequestStatus::OnLoan,
            RequestStatus::Finalized,
            false,
            None,
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::ConcurrentUpdate { entity: "Request", .. }));
        assert!(err.is_retryable());
    }
}
