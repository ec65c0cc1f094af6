//! Academic period rules.
//!
//! At most one period is active. Movements and lifecycle events are tagged
//! with the active period unless the caller names one explicitly.

use crate::error::{CoreError, CoreResult};
use crate::types::AcademicPeriod;

/// Picks the period a movement or event is bound to.
///
/// An explicit id wins; otherwise the active period is used, and its absence
/// is [`CoreError::NoActivePeriod`].
pub fn resolve_period(explicit: Option<i64>, active: Option<&AcademicPeriod>) -> CoreResult<i64> {
    match (explicit, active) {
        (Some(id), _) => Ok(id),
        (None, Some(period)) => Ok(period.id),
        (None, None) => Err(CoreError::NoActivePeriod),
    }
}

/// Requires an active period for a lifecycle transition.
pub fn require_active(active: Option<AcademicPeriod>) -> CoreResult<AcademicPeriod> {
    active.ok_or(CoreError::NoActivePeriod)
}

/// Blocks deleting a period that still has loans out.
pub fn ensure_deletable(period_id: i64, outstanding_loans: i64) -> CoreResult<()> {
    if outstanding_loans > 0 {
        return Err(CoreError::conflict(format!(
            "Academic period {period_id} has {outstanding_loans} outstanding loan(s)"
        )));
    }
    Ok(())
}

/// Counts active periods in a listing. Used to assert the single-active
/// invariant.
pub fn active_count(periods: &[AcademicPeriod]) -> usize {
    periods.iter().filter(|p| p.is_active).count()
}
