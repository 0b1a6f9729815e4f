//! Booking read routes.
//!
//! GET /bookings/{id} - Retrieve a booking (client or carer of the booking only)

use axum::extract::Path;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::error::{Result, SettlementError};
use crate::models::{ApiResponse, Booking};
use crate::routes::{authenticate, SharedIdentity};
use crate::settlement::SettlementService;

/// Build the bookings router.
pub fn router() -> Router {
    Router::new().route("/bookings/{id}", get(get_booking))
}

/// Retrieve a booking by ID.
async fn get_booking(
    Extension(service): Extension<SettlementService>,
    Extension(identity): Extension<SharedIdentity>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Booking>>> {
    let caller = authenticate(&identity, &headers).await?;

    let booking = service
        .store()
        .find(id)
        .await?
        .ok_or_else(|| SettlementError::NotFound("Booking not found".to_string()))?;

    if caller != booking.client_id && caller != booking.carer_id {
        return Err(SettlementError::Forbidden(
            "You are not a party to this booking".to_string(),
        ));
    }

    Ok(Json(ApiResponse {
        data: booking,
        message: "Booking retrieved".to_string(),
    }))
}
