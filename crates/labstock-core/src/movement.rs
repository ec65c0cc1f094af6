//! Stock movement arithmetic.
//!
//! The ledger stores signed quantities: `+n` for ingreso, `-n` for egreso.
//! A component's quantity never drops below zero.

use crate::availability::Shortage;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::MovementType;

impl MovementType {
    /// Signed ledger quantity for an absolute amount.
    pub const fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementType::Ingress => quantity,
            MovementType::Egress => -quantity,
        }
    }

    /// Direction of a stored signed quantity.
    pub const fn from_signed(quantity: i64) -> Self {
        if quantity < 0 {
            MovementType::Egress
        } else {
            MovementType::Ingress
        }
    }
}

/// Result of applying a movement to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub previous: i64,
    pub new_quantity: i64,
    pub signed_quantity: i64,
}

/// Computes the new component quantity.
///
/// `quantity` must already be validated as positive. An egress larger than
/// the current stock fails with [`CoreError::InsufficientStock`]; an ingress
/// that would overflow the stored total fails validation.
pub fn apply_movement(
    component_id: i64,
    component_name: &str,
    current: i64,
    movement_type: MovementType,
    quantity: i64,
) -> CoreResult<StockChange> {
    let signed_quantity = movement_type.signed(quantity);
    let new_quantity = current
        .checked_add(signed_quantity)
        .ok_or_else(|| ValidationError::too_large("quantity", i64::MAX - current.max(0)))?;

    if new_quantity < 0 {
        return Err(CoreError::InsufficientStock(vec![Shortage {
            component_id,
            component_name: component_name.to_string(),
            requested: quantity,
            available: current,
            in_requests: 0,
            not_returned: 0,
        }]));
    }

    Ok(StockChange {
        previous: current,
        new_quantity,
        signed_quantity,
    })
}
