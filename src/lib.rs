//! # Care Booking Refund Settlement
//!
//! Settles carer decisions on client cancellation requests: authorizes the
//! carer, refunds the service-cost portion of the booking through the payment
//! gateway and moves the booking to its terminal `cancelled` state.
//!
//! The router is exposed here so integration tests can drive it in-process
//! against the in-memory store and mock gateway.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod routes;
pub mod settlement;
pub mod store;

use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::SharedIdentity;
use crate::settlement::SettlementService;

/// Build the Axum router with all route modules and middleware.
///
/// The caller wires the settlement service (store + gateway) and the identity
/// resolver. This function does NOT start a server.
pub fn create_app(settlement: SettlementService, identity: SharedIdentity) -> Router {
    Router::new()
        .merge(routes::refunds::router())
        .merge(routes::bookings::router())
        .merge(routes::health::router())
        .layer(Extension(settlement))
        .layer(Extension(identity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
