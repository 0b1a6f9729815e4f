//! Refund settlement routes.
//!
//! POST /approve-refund - Approve or decline a client's cancellation request

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Extension, Json, Router};
use tracing::info;

use crate::error::{Result, SettlementError};
use crate::models::{SettleRefundRequest, SettleRefundResponse};
use crate::routes::{authenticate, SharedIdentity};
use crate::settlement::SettlementService;

/// Build the refunds router.
pub fn router() -> Router {
    Router::new().route("/approve-refund", post(settle_refund))
}

/// Settle a cancellation request as the booking's carer.
///
/// The caller is authenticated before the body is looked at, so an
/// anonymous request gets 401 even when its payload is malformed.
async fn settle_refund(
    Extension(service): Extension<SettlementService>,
    Extension(identity): Extension<SharedIdentity>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SettleRefundRequest>, JsonRejection>,
) -> Result<Json<SettleRefundResponse>> {
    let actor_id = authenticate(&identity, &headers).await?;
    let Json(req) = payload.map_err(|e| SettlementError::InvalidArgument(e.body_text()))?;

    let outcome = service
        .settle(req.booking_id, actor_id, req.action, req.amount)
        .await?;

    info!(
        booking_id = %req.booking_id,
        action = ?req.action,
        refund_status = %outcome.booking.refund_status,
        "Refund request settled"
    );

    Ok(Json(SettleRefundResponse {
        message: outcome.message().to_string(),
        status: outcome.booking.status.clone(),
        refund_amount: outcome.refund_amount,
    }))
}
