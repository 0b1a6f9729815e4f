//! In-process gateway that records refund requests instead of moving money.
//!
//! Idempotency keys behave like the real provider's: once a request has been
//! executed under a key, later requests with that key replay the stored
//! result instead of creating another refund.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{GatewayError, PaymentGateway, RefundReceipt, RefundRequest};

enum Script {
    Fail(GatewayError),
    /// Create the refund, then report a transport failure to the caller.
    LoseResponse,
}

#[derive(Default)]
pub struct MockGateway {
    calls: Mutex<Vec<RefundRequest>>,
    scripts: Mutex<VecDeque<Script>>,
    executed: Mutex<HashMap<String, Result<RefundReceipt, GatewayError>>>,
    refunds: Mutex<Vec<RefundReceipt>>,
    latency: Option<Duration>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, which widens race windows in concurrency tests.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make the next new request fail with `error`. Queued scripts are
    /// consumed in order; replayed keys never consume one.
    pub async fn fail_next(&self, error: GatewayError) {
        self.scripts.lock().await.push_back(Script::Fail(error));
    }

    /// Create the next new refund but answer the caller with a timeout.
    pub async fn lose_next_response(&self) {
        self.scripts.lock().await.push_back(Script::LoseResponse);
    }

    /// Every request received so far, failed and replayed ones included.
    pub async fn calls(&self) -> Vec<RefundRequest> {
        self.calls.lock().await.clone()
    }

    /// Refunds actually created, one per executed key.
    pub async fn refunds(&self) -> Vec<RefundReceipt> {
        self.refunds.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_refund(&self, request: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        self.calls.lock().await.push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut executed = self.executed.lock().await;
        if let Some(stored) = executed.get(&request.idempotency_key) {
            info!(
                idempotency_key = %request.idempotency_key,
                "Mock replayed stored refund result"
            );
            return stored.clone();
        }

        let receipt = RefundReceipt {
            refund_id: format!("re_mock_{}", request.idempotency_key.replace('-', "_")),
            status: "succeeded".to_string(),
        };

        match self.scripts.lock().await.pop_front() {
            Some(Script::Fail(error)) => {
                // The provider only keeps results for requests it got to run.
                if matches!(error, GatewayError::Rejected { .. }) {
                    executed.insert(request.idempotency_key.clone(), Err(error.clone()));
                }
                return Err(error);
            }
            Some(Script::LoseResponse) => {
                executed.insert(request.idempotency_key.clone(), Ok(receipt.clone()));
                self.refunds.lock().await.push(receipt);
                return Err(GatewayError::Unavailable("operation timed out".to_string()));
            }
            None => {}
        }

        info!(
            booking_id = %request.booking_id,
            amount_minor = request.amount_minor,
            "Mock refund recorded"
        );

        executed.insert(request.idempotency_key.clone(), Ok(receipt.clone()));
        self.refunds.lock().await.push(receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_same_key_replays_without_new_refund() {
        let gateway = MockGateway::new();
        let request = RefundRequest::for_booking(Uuid::new_v4(), "pi_1", 500, 0);

        let first = gateway.create_refund(&request).await.unwrap();
        let second = gateway.create_refund(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.calls().await.len(), 2);
        assert_eq!(gateway.refunds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_replayed_for_its_key_only() {
        let gateway = MockGateway::new();
        let booking_id = Uuid::new_v4();
        gateway
            .fail_next(GatewayError::Rejected {
                status: 400,
                message: "amount too large".into(),
            })
            .await;

        let first = RefundRequest::for_booking(booking_id, "pi_1", 500, 0);
        assert!(gateway.create_refund(&first).await.is_err());
        assert!(gateway.create_refund(&first).await.is_err());

        let next = RefundRequest::for_booking(booking_id, "pi_1", 500, 1);
        assert!(gateway.create_refund(&next).await.is_ok());
        assert_eq!(gateway.refunds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lost_response_still_creates_refund() {
        let gateway = MockGateway::new();
        gateway.lose_next_response().await;
        let request = RefundRequest::for_booking(Uuid::new_v4(), "pi_1", 500, 0);

        let err = gateway.create_refund(&request).await.unwrap_err();
        assert!(err.outcome_unknown());
        assert_eq!(gateway.refunds().await.len(), 1);

        let replay = gateway.create_refund(&request).await.unwrap();
        assert_eq!(gateway.refunds().await, vec![replay]);
    }
}
