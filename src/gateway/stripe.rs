//! Stripe refunds over the REST API.
//!
//! POST {api_base}/v1/refunds - form-encoded refund creation

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use super::{GatewayError, PaymentGateway, RefundReceipt, RefundRequest};

const STRIPE_API_VERSION: &str = "2023-10-16";

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    fn refunds_url(&self) -> String {
        format!("{}/v1/refunds", self.api_base)
    }
}

/// Form fields for a refund creation call.
fn refund_form(request: &RefundRequest) -> Vec<(&'static str, String)> {
    vec![
        ("payment_intent", request.payment_reference.clone()),
        ("amount", request.amount_minor.to_string()),
        ("metadata[reason]", request.reason.to_string()),
        ("metadata[booking_id]", request.booking_id.to_string()),
    ]
}

/// Pull the human-readable message out of a Stripe error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_refund(&self, request: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        let response = self
            .client
            .post(self.refunds_url())
            .bearer_auth(&self.secret_key)
            .header("Stripe-Version", STRIPE_API_VERSION)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&refund_form(request))
            .send()
            .await
            .map_err(|e| {
                error!(booking_id = %request.booking_id, "Stripe refund request failed: {}", e);
                GatewayError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let refund: StripeRefund = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        info!(
            booking_id = %request.booking_id,
            refund_id = %refund.id,
            amount_minor = request.amount_minor,
            "Stripe refund created"
        );

        Ok(RefundReceipt {
            refund_id: refund.id,
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_refund_form_carries_amount_and_metadata() {
        let booking_id = Uuid::new_v4();
        let request = RefundRequest::for_booking(booking_id, "pi_3Nx", 8000, 0);
        let form = refund_form(&request);

        assert!(form.contains(&("payment_intent", "pi_3Nx".to_string())));
        assert!(form.contains(&("amount", "8000".to_string())));
        assert!(form.contains(&("metadata[reason]", "carer_approved_cancellation".to_string())));
        assert!(form.contains(&("metadata[booking_id]", booking_id.to_string())));
    }

    #[test]
    fn test_error_message_prefers_stripe_error_field() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"Charge ch_1 has already been refunded."}}"#;
        assert_eq!(error_message(body), "Charge ch_1 has already been refunded.");
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        assert_eq!(error_message(" upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_refunds_url_ignores_trailing_slash() {
        let gateway = StripeGateway::new("https://api.stripe.com/", "sk_test", None).unwrap();
        assert_eq!(gateway.refunds_url(), "https://api.stripe.com/v1/refunds");
    }
}
