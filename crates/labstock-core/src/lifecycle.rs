//! # Request Lifecycle
//!
//! The transition table and the permission rules of the request state
//! machine. The database layer performs the side effects; this module only
//! decides whether a move is legal.
//!
//! ## Transition Table
//! ```text
//! ┌──────────────────┬────────────────────────────┬──────────────┐
//! │ Transition       │ From                       │ To           │
//! ├──────────────────┼────────────────────────────┼──────────────┤
//! │ Accept           │ pendiente                  │ prestamo     │
//! │ Reject           │ pendiente                  │ finalizado   │
//! │ MarkNotReturned  │ prestamo                   │ no_devuelto  │
//! │ Finalize         │ prestamo | no_devuelto     │ finalizado   │
//! └──────────────────┴────────────────────────────┴──────────────┘
//! ```
//!
//! Reject closes a pending request without it ever holding stock. Anything
//! not in the table fails with [`CoreError::InvalidTransition`].

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{Actor, LoanHistory, RequestStatus};

/// Admin note recorded when a not-returned request is closed without notes.
pub const FINALIZED_FROM_NOT_RETURNED_NOTE: &str = "Finalized from not-returned status";

/// Reason recorded on the write-off movement created when a not-returned
/// request is closed.
pub const NOT_RETURNED_WRITE_OFF_REASON: &str = "Write-off: components not returned";

/// A named lifecycle move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Accept,
    Reject,
    MarkNotReturned,
    Finalize,
}

impl Transition {
    pub const ALL: [Transition; 4] = [
        Transition::Accept,
        Transition::Reject,
        Transition::MarkNotReturned,
        Transition::Finalize,
    ];

    /// Status a request holds after the transition.
    pub const fn target(&self) -> RequestStatus {
        match self {
            Transition::Accept => RequestStatus::OnLoan,
            Transition::Reject => RequestStatus::Finalized,
            Transition::MarkNotReturned => RequestStatus::NotReturned,
            Transition::Finalize => RequestStatus::Finalized,
        }
    }

    /// Statuses the transition may start from.
    pub const fn sources(&self) -> &'static [RequestStatus] {
        match self {
            Transition::Accept | Transition::Reject => &[RequestStatus::Pending],
            Transition::MarkNotReturned => &[RequestStatus::OnLoan],
            Transition::Finalize => &[RequestStatus::OnLoan, RequestStatus::NotReturned],
        }
    }

    /// Checks `current` against the table.
    pub fn ensure_from(&self, request_id: i64, current: RequestStatus) -> CoreResult<()> {
        if self.sources().contains(&current) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                request_id,
                from: current,
                to: self.target(),
            })
        }
    }
}

impl RequestStatus {
    /// Statuses reachable from this one in a single step.
    pub fn allowed_next(&self) -> Vec<RequestStatus> {
        let mut next: Vec<RequestStatus> = Transition::ALL
            .iter()
            .filter(|t| t.sources().contains(self))
            .map(|t| t.target())
            .collect();
        next.dedup();
        next
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        Transition::ALL
            .iter()
            .any(|t| t.target() == next && t.sources().contains(self))
    }

    /// True once nothing else can happen to the request.
    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }
}

// =============================================================================
// Finalize
// =============================================================================

/// Which side effects a finalize performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizePath {
    /// Loans come back: closed as returned.
    FromOnLoan,
    /// Loans stay not-returned; only the request is closed.
    FromNotReturned,
}

/// Picks the finalize path, rejecting a second finalize explicitly.
pub fn finalize_path(request_id: i64, current: RequestStatus) -> CoreResult<FinalizePath> {
    match current {
        RequestStatus::Finalized => Err(CoreError::AlreadyFinalized { request_id }),
        RequestStatus::NotReturned => Ok(FinalizePath::FromNotReturned),
        other => {
            Transition::Finalize.ensure_from(request_id, other)?;
            Ok(FinalizePath::FromOnLoan)
        }
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Who may delete a request.
///
/// A request on loan is protected for every role. Otherwise an admin may
/// delete anything, and a user only their own pending request.
pub fn authorize_delete(
    actor: &Actor,
    request_id: i64,
    owner_id: i64,
    status: RequestStatus,
) -> CoreResult<()> {
    if status == RequestStatus::OnLoan {
        return Err(CoreError::conflict(format!(
            "Request {request_id} has an active loan and cannot be deleted"
        )));
    }
    if actor.is_admin() {
        return Ok(());
    }
    if actor.user_id != owner_id {
        return Err(CoreError::permission_denied(
            "users can only delete their own requests",
        ));
    }
    if status != RequestStatus::Pending {
        return Err(CoreError::permission_denied(
            "users can only delete pending requests",
        ));
    }
    Ok(())
}

/// Who may move a request's return date. Owners always, admins only while
/// the request is active.
pub fn authorize_return_date_update(
    actor: &Actor,
    owner_id: i64,
    is_active: bool,
) -> CoreResult<()> {
    if actor.is_admin() {
        if is_active {
            Ok(())
        } else {
            Err(CoreError::permission_denied("request is no longer active"))
        }
    } else if actor.user_id == owner_id {
        Ok(())
    } else {
        Err(CoreError::permission_denied(
            "users can only change the return date of their own requests",
        ))
    }
}

/// Return date changes are only possible while the loan is out.
pub fn ensure_on_loan(
    request_id: i64,
    status: RequestStatus,
    operation: &'static str,
) -> CoreResult<()> {
    if status == RequestStatus::OnLoan {
        Ok(())
    } else {
        Err(CoreError::InvalidStatus {
            request_id,
            status,
            required: RequestStatus::OnLoan,
            operation,
        })
    }
}

/// Requires at least one loan row without an end date.
pub fn ensure_open_loan(request_id: i64, loans: &[LoanHistory]) -> CoreResult<()> {
    if loans.iter().any(|l| l.end_date.is_none()) {
        Ok(())
    } else {
        Err(CoreError::conflict(format!(
            "Request {request_id} has no open loan"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoanStatus;
    use chrono::Utc;

    #[test]
    fn test_transition_table() {
        use RequestStatus::*;

        assert!(Pending.can_transition_to(OnLoan));
        assert!(OnLoan.can_transition_to(Finalized));
        assert!(OnLoan.can_transition_to(NotReturned));
        assert!(NotReturned.can_transition_to(Finalized));

        assert!(!Pending.can_transition_to(NotReturned));
        assert!(!NotReturned.can_transition_to(OnLoan));
        assert!(!Finalized.can_transition_to(OnLoan));
        assert!(!OnLoan.can_transition_to(Pending));

        assert!(Finalized.is_terminal());
        assert!(!NotReturned.is_terminal());
    }

    #[test]
    fn test_ensure_from_reports_both_ends() {
        let err = Transition::Accept
            .ensure_from(9, RequestStatus::Finalized)
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidTransition {
                request_id: 9,
                from: RequestStatus::Finalized,
                to: RequestStatus::OnLoan,
            }
        );

        assert!(Transition::MarkNotReturned
            .ensure_from(9, RequestStatus::Pending)
            .is_err());
        assert!(Transition::Reject
            .ensure_from(9, RequestStatus::Pending)
            .is_ok());
    }

    #[test]
    fn test_finalize_path() {
        assert_eq!(
            finalize_path(1, RequestStatus::OnLoan).unwrap(),
            FinalizePath::FromOnLoan
        );
        assert_eq!(
            finalize_path(1, RequestStatus::NotReturned).unwrap(),
            FinalizePath::FromNotReturned
        );
        assert_eq!(
            finalize_path(1, RequestStatus::Finalized).unwrap_err(),
            CoreError::AlreadyFinalized { request_id: 1 }
        );
        assert!(matches!(
            finalize_path(1, RequestStatus::Pending).unwrap_err(),
            CoreError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_delete_permissions() {
        let owner = Actor::user(5);
        let stranger = Actor::user(6);
        let admin = Actor::admin(1);

        assert!(authorize_delete(&owner, 1, 5, RequestStatus::Pending).is_ok());
        assert!(matches!(
            authorize_delete(&stranger, 1, 5, RequestStatus::Pending),
            Err(CoreError::PermissionDenied { .. })
        ));
        assert!(matches!(
            authorize_delete(&owner, 1, 5, RequestStatus::Finalized),
            Err(CoreError::PermissionDenied { .. })
        ));

        assert!(authorize_delete(&admin, 1, 5, RequestStatus::Finalized).is_ok());
        assert!(authorize_delete(&admin, 1, 5, RequestStatus::NotReturned).is_ok());

        // On loan is protected for everybody.
        assert!(matches!(
            authorize_delete(&admin, 1, 5, RequestStatus::OnLoan),
            Err(CoreError::Conflict { .. })
        ));
        assert!(matches!(
            authorize_delete(&owner, 1, 5, RequestStatus::OnLoan),
            Err(CoreError::Conflict { .. })
        ));
    }

    #[test]
    fn test_return_date_permissions() {
        assert!(authorize_return_date_update(&Actor::user(5), 5, true).is_ok());
        assert!(authorize_return_date_update(&Actor::user(6), 5, true).is_err());
        assert!(authorize_return_date_update(&Actor::admin(1), 5, true).is_ok());
        assert!(authorize_return_date_update(&Actor::admin(1), 5, false).is_err());
    }

    #[test]
    fn test_open_loan_required() {
        let mut loan = LoanHistory {
            id: 1,
            request_id: 3,
            user_id: 5,
            component_id: 2,
            start_date: Utc::now(),
            end_date: None,
            status: LoanStatus::NotReturned,
            was_returned: false,
            final_status: None,
            notes: None,
        };
        assert!(ensure_open_loan(3, std::slice::from_ref(&loan)).is_ok());

        loan.end_date = Some(Utc::now());
        assert!(ensure_open_loan(3, &[loan]).is_err());
        assert!(ensure_open_loan(3, &[]).is_err());
    }
}
