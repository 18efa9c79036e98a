use rust_decimal::Decimal;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Unknown product code: {0}")]
    UnknownProduct(String),

    #[error("Price mismatch for {code}: catalog price is {expected}, request has {actual}")]
    PriceMismatch {
        code: String,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("Cannot transition out of terminal status {from} (attempted {from} -> {to})")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}
