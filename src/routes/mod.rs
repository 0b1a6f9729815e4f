//! HTTP route modules for the settlement service.
//!
//! - `refunds`: carer decisions on cancellation requests
//! - `bookings`: booking read endpoint for the two parties
//! - `health`: liveness probe

pub mod bookings;
pub mod health;
pub mod refunds;

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::error;
use uuid::Uuid;

use crate::error::{Result, SettlementError};
use crate::identity::{bearer_token, IdentityResolver};

/// Shared identity resolver handed to routes through an `Extension`.
pub type SharedIdentity = Arc<dyn IdentityResolver>;

/// Resolve the authenticated caller from the request's bearer token.
pub(crate) async fn authenticate(identity: &SharedIdentity, headers: &HeaderMap) -> Result<Uuid> {
    let token = bearer_token(headers)
        .ok_or_else(|| SettlementError::Unauthorized("No authorization header".to_string()))?;

    match identity.resolve(token).await {
        Ok(Some(user_id)) => Ok(user_id),
        Ok(None) => Err(SettlementError::Unauthorized("Unauthorized".to_string())),
        Err(e) => {
            error!("Failed to resolve caller identity: {}", e);
            Err(SettlementError::Unauthorized("Unauthorized".to_string()))
        }
    }
}
