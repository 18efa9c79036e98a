use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Payment Authorization Port
// ============================================================================
//
// Authorization itself is an external concern; the state machine only reacts
// to its accept/reject outcome. Rejection is an expected business outcome and
// therefore a variant, not an error.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub card_number: String,
    pub cvv: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Accepted,
    Rejected { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        order_number: &str,
        amount: Decimal,
        payment: &PaymentDetails,
    ) -> anyhow::Result<PaymentOutcome>;
}

/// Gateway stub that authorizes everything. Real deployments plug the payment
/// provider in behind the same trait.
pub struct ApproveAllGateway;

#[async_trait]
impl PaymentGateway for ApproveAllGateway {
    async fn authorize(
        &self,
        _order_number: &str,
        _amount: Decimal,
        _payment: &PaymentDetails,
    ) -> anyhow::Result<PaymentOutcome> {
        Ok(PaymentOutcome::Accepted)
    }
}
