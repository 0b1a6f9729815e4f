//! Settlement error taxonomy and its HTTP mapping.
//!
//! Every failure is turned into `{ "error": "<message>" }` at the handler
//! boundary. Storage failures keep their detail in the logs only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::gateway::GatewayError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl SettlementError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SettlementError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SettlementError::Forbidden(_) => StatusCode::FORBIDDEN,
            SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
            SettlementError::InvalidState(_) => StatusCode::CONFLICT,
            SettlementError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            SettlementError::PaymentGateway(_) => StatusCode::PAYMENT_REQUIRED,
            SettlementError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            SettlementError::Store(e) => {
                error!(error = %e, "Settlement failed on storage");
                "Database operation failed".to_string()
            }
            other => {
                warn!(status = status.as_u16(), error = %other, "Settlement request rejected");
                other.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T, E = SettlementError> = std::result::Result<T, E>;
