//! Payment gateway adapter.
//!
//! The settlement flow only ever needs one gateway operation: refund part of
//! a previously captured payment. `stripe` talks to the real provider and
//! `mock` records requests for tests and local runs.

pub mod mock;
pub mod stripe;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use mock::MockGateway;
pub use stripe::StripeGateway;

/// Reason tag attached to refunds issued after a carer approves a cancellation.
pub const CARER_APPROVED_CANCELLATION: &str = "carer_approved_cancellation";

/// A refund against a captured payment, amount in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub payment_reference: String,
    pub amount_minor: i64,
    pub reason: &'static str,
    pub booking_id: Uuid,
    pub idempotency_key: String,
}

impl RefundRequest {
    /// Build the refund for a booking's `attempt`-th refund attempt.
    ///
    /// Retries after an unknown outcome keep the attempt number and so replay
    /// under the same key. The attempt only advances once the provider has
    /// definitely refused, since a refused key keeps replaying the refusal.
    pub fn for_booking(
        booking_id: Uuid,
        payment_reference: &str,
        amount_minor: i64,
        attempt: i32,
    ) -> Self {
        Self {
            payment_reference: payment_reference.to_string(),
            amount_minor,
            reason: CARER_APPROVED_CANCELLATION,
            booking_id,
            idempotency_key: format!("booking-{}-refund-{}", booking_id, attempt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider answered with an error status. 4xx means it refused and
    /// no refund was created; 5xx and 409 leave the outcome open.
    #[error("gateway rejected refund ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Transport failure or timeout; the refund may or may not exist.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider answered 2xx but the body could not be read.
    #[error("unreadable gateway response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether the provider may have created the refund despite the error.
    ///
    /// 409 is the provider reporting a concurrent request on the same
    /// idempotency key, which may still complete.
    pub fn outcome_unknown(&self) -> bool {
        match self {
            GatewayError::Rejected { status, .. } => *status >= 500 || *status == 409,
            GatewayError::Unavailable(_) | GatewayError::Malformed(_) => true,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_refund(&self, request: &RefundRequest) -> Result<RefundReceipt, GatewayError>;
}
