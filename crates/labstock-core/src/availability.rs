//! # Availability Calculator
//!
//! How many units of a component can be promised right now.
//!
//! ## Formula
//! ```text
//! available = max(0, total_quantity − in_requests − not_returned)
//!
//!   in_requests   = Σ qty of detail lines whose request is
//!                   status = prestamo AND is_active
//!   not_returned  = Σ qty of detail lines whose request is
//!                   status = no_devuelto (regardless of is_active)
//! ```
//!
//! Pending and finalized requests never reserve stock. The database layer
//! loads the open demand rows ([`OpenDemand`]); everything here is pure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::types::RequestStatus;
use crate::MAX_QUANTITY;

/// One detail line of a request that may hold stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OpenDemand {
    pub component_id: i64,
    pub status: RequestStatus,
    pub is_active: bool,
    pub quantity: i64,
}

impl OpenDemand {
    /// Units this line holds out of the lab, if any.
    fn held(&self) -> Held {
        match (self.status, self.is_active) {
            (RequestStatus::OnLoan, true) => Held::InRequests(self.quantity),
            (RequestStatus::NotReturned, _) => Held::NotReturned(self.quantity),
            _ => Held::Nothing,
        }
    }
}

enum Held {
    InRequests(i64),
    NotReturned(i64),
    Nothing,
}

/// Availability breakdown for one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Availability {
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub in_requests: i64,
    pub not_returned_quantity: i64,
}

impl Availability {
    /// Computes availability from the component's total and its demand rows.
    ///
    /// Rows for other components are ignored so callers can pass a shared
    /// batch.
    pub fn calculate<'a>(
        component_id: i64,
        total_quantity: i64,
        demand: impl IntoIterator<Item = &'a OpenDemand>,
    ) -> Self {
        let mut in_requests: i64 = 0;
        let mut not_returned_quantity: i64 = 0;

        for row in demand.into_iter().filter(|d| d.component_id == component_id) {
            match row.held() {
                Held::InRequests(q) => in_requests = in_requests.saturating_add(q),
                Held::NotReturned(q) => {
                    not_returned_quantity = not_returned_quantity.saturating_add(q)
                }
                Held::Nothing => {}
            }
        }

        let available_quantity = total_quantity
            .saturating_sub(in_requests)
            .saturating_sub(not_returned_quantity)
            .max(0);

        Availability {
            total_quantity,
            available_quantity,
            in_requests,
            not_returned_quantity,
        }
    }

    /// Returns a shortage record if `requested` exceeds what is available.
    pub fn check(
        &self,
        component_id: i64,
        component_name: &str,
        requested: i64,
    ) -> Option<Shortage> {
        (requested > self.available_quantity).then(|| Shortage {
            component_id,
            component_name: component_name.to_string(),
            requested,
            available: self.available_quantity,
            in_requests: self.in_requests,
            not_returned: self.not_returned_quantity,
        })
    }
}

/// A component that cannot cover the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Shortage {
    pub component_id: i64,
    pub component_name: String,
    pub requested: i64,
    pub available: i64,
    pub in_requests: i64,
    pub not_returned: i64,
}

/// Sums requested quantities per component.
///
/// A request listing the same component twice must be checked against the
/// combined quantity, which may not exceed [`MAX_QUANTITY`]. Output is
/// ordered by component id.
pub fn aggregate_requested<I>(lines: I) -> CoreResult<BTreeMap<i64, i64>>
where
    I: IntoIterator<Item = (i64, i64)>,
{
    let mut totals = BTreeMap::new();
    for (component_id, quantity) in lines {
        let total = totals.entry(component_id).or_insert(0i64);
        *total = total
            .checked_add(quantity)
            .filter(|sum| *sum <= MAX_QUANTITY)
            .ok_or_else(|| ValidationError::too_large("quantity", MAX_QUANTITY))?;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand(component_id: i64, status: RequestStatus, is_active: bool, quantity: i64) -> OpenDemand {
        OpenDemand {
            component_id,
            status,
            is_active,
            quantity,
        }
    }

    #[test]
    fn test_no_demand_means_everything_available() {
        let a = Availability::calculate(1, 10, std::iter::empty());
        assert_eq!(a.available_quantity, 10);
        assert_eq!(a.in_requests, 0);
        assert_eq!(a.not_returned_quantity, 0);
    }

    #[test]
    fn test_only_active_loans_and_not_returned_hold_stock() {
        let rows = vec![
            demand(1, RequestStatus::OnLoan, true, 3),
            demand(1, RequestStatus::OnLoan, false, 50),
            demand(1, RequestStatus::Pending, true, 7),
            demand(1, RequestStatus::Finalized, false, 9),
            demand(1, RequestStatus::NotReturned, false, 2),
            demand(2, RequestStatus::OnLoan, true, 4),
        ];

        let a = Availability::calculate(1, 10, &rows);
        assert_eq!(a.in_requests, 3);
        assert_eq!(a.not_returned_quantity, 2);
        assert_eq!(a.available_quantity, 5);
        assert_eq!(a.total_quantity, 10);
    }

    #[test]
    fn test_available_never_negative() {
        // Stock written off below what is still out.
        let rows = vec![demand(1, RequestStatus::NotReturned, true, 8)];
        let a = Availability::calculate(1, 3, &rows);
        assert_eq!(a.available_quantity, 0);
        assert_eq!(a.not_returned_quantity, 8);
    }

    #[test]
    fn test_check_reports_shortage() {
        let a = Availability {
            total_quantity: 10,
            available_quantity: 4,
            in_requests: 6,
            not_returned_quantity: 0,
        };
        assert!(a.check(1, "Servo", 4).is_none());

        let shortage = a.check(1, "Servo", 5).unwrap();
        assert_eq!(shortage.requested, 5);
        assert_eq!(shortage.available, 4);
        assert_eq!(shortage.in_requests, 6);
    }

    #[test]
    fn test_aggregate_requested_sums_duplicates() {
        let totals = aggregate_requested(vec![(3, 2), (1, 1), (3, 4)]).unwrap();
        assert_eq!(totals.into_iter().collect::<Vec<_>>(), vec![(1, 1), (3, 6)]);
    }

    #[test]
    fn test_aggregate_requested_rejects_oversized_totals() {
        use crate::error::CoreError;

        let overflow = aggregate_requested(vec![(1, i64::MAX), (1, 1)]).unwrap_err();
        assert!(matches!(
            overflow,
            CoreError::Validation(ValidationError::TooLarge { .. })
        ));

        let too_many = aggregate_requested(vec![(1, MAX_QUANTITY), (1, 1)]).unwrap_err();
        assert!(matches!(
            too_many,
            CoreError::Validation(ValidationError::TooLarge { max: MAX_QUANTITY, .. })
        ));
    }

    #[test]
    fn test_calculate_saturates_on_corrupt_demand() {
        let rows = vec![
            demand(1, RequestStatus::OnLoan, true, i64::MAX),
            demand(1, RequestStatus::OnLoan, true, i64::MAX),
        ];
        let a = Availability::calculate(1, 5, &rows);
        assert_eq!(a.in_requests, i64::MAX);
        assert_eq!(a.available_quantity, 0);
    }
}
