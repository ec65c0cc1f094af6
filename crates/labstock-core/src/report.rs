//! Read models returned by queries and lifecycle operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::availability::Availability;
use crate::types::{
    AcademicPeriod, Component, ComponentMovement, LoanHistory, LoanStatus, MovementType, Request,
    RequestPeriod,
};

/// A component together with its live availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComponentStock {
    pub component: Component,
    pub availability: Availability,
}

/// Result of finalize and mark-not-returned: the request and the audit row
/// written for the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RequestWithPeriod {
    pub request: Request,
    pub request_period: RequestPeriod,
}

/// A rejected request and the proof file it no longer references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RejectedRequest {
    pub request: Request,
    pub detached_file_url: Option<String>,
}

/// What a request delete removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeletedRequest {
    pub request: Request,
    pub loans_closed: u64,
}

// =============================================================================
// Period Reports
// =============================================================================

/// Loan and movement counts for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PeriodStats {
    pub total_loans: i64,
    /// Loans still `no_devuelto`.
    pub active_loans: i64,
    /// Loans `devuelto`.
    pub completed_loans: i64,
    pub total_movements: i64,
    pub ingress_movements: i64,
    pub egress_movements: i64,
}

impl PeriodStats {
    pub fn from_rows(loans: &[LoanHistory], movements: &[ComponentMovement]) -> Self {
        let count_loans =
            |status: LoanStatus| loans.iter().filter(|l| l.status == status).count() as i64;
        let count_moves = |kind: MovementType| {
            movements.iter().filter(|m| m.movement_type == kind).count() as i64
        };

        PeriodStats {
            total_loans: loans.len() as i64,
            active_loans: count_loans(LoanStatus::NotReturned),
            completed_loans: count_loans(LoanStatus::Returned),
            total_movements: movements.len() as i64,
            ingress_movements: count_moves(MovementType::Ingress),
            egress_movements: count_moves(MovementType::Egress),
        }
    }
}

/// Period listing entry, stats included on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PeriodSummary {
    pub period: AcademicPeriod,
    pub stats: Option<PeriodStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PeriodReport {
    pub period: AcademicPeriod,
    pub stats: PeriodStats,
    pub loans: Vec<LoanHistory>,
    pub movements: Vec<ComponentMovement>,
}

// =============================================================================
// Loan Reports
// =============================================================================

/// How often a component was lent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ComponentLoanCount {
    pub component_id: i64,
    pub component_name: String,
    pub category_id: i64,
    pub loan_count: i64,
}

/// A returned loan next to the date its request was due back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnTimeComparison {
    pub loan_id: i64,
    pub request_id: i64,
    pub user_id: i64,
    pub component_id: i64,
    pub component_name: String,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub return_date: DateTime<Utc>,
}

impl ReturnTimeComparison {
    /// Whole days past the due date. Negative for early returns.
    pub fn days_late(&self) -> i64 {
        (self.end_date - self.return_date).num_days()
    }

    pub fn was_late(&self) -> bool {
        self.end_date > self.return_date
    }
}

/// Mean loan duration in days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoanDurationSummary {
    pub overall: f64,
    pub returned: f64,
    pub not_returned: f64,
    pub sample_size: usize,
}

impl LoanDurationSummary {
    /// Averages loan durations. Open loans run until `now`. Empty groups
    /// average to zero.
    pub fn from_loans(loans: &[LoanHistory], now: DateTime<Utc>) -> Self {
        let durations: Vec<(f64, bool)> = loans
            .iter()
            .map(|loan| {
                let end = loan.end_date.unwrap_or(now);
                let days = (end - loan.start_date).num_seconds() as f64 / 86_400.0;
                (days, loan.was_returned)
            })
            .collect();

        LoanDurationSummary {
            overall: mean(durations.iter().map(|(d, _)| *d)),
            returned: mean(durations.iter().filter(|(_, r)| *r).map(|(d, _)| *d)),
            not_returned: mean(durations.iter().filter(|(_, r)| !*r).map(|(d, _)| *d)),
            sample_size: durations.len(),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
