//! # Care Booking Refund Settlement Service
//!
//! Serves the carer-facing refund settlement endpoint.
//!
//! ## Architecture
//!
//! - Axum handles HTTP routing and request/response lifecycle
//! - SQLx manages the bookings table (conditional updates guard settlement)
//! - The payment gateway adapter issues refunds (Stripe, or an in-memory mock)
//! - Caller identity is resolved by the hosted auth platform

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use care_settlement::config::{AppConfig, GatewayConfig};
use care_settlement::gateway::{MockGateway, PaymentGateway, StripeGateway};
use care_settlement::identity::HttpIdentityResolver;
use care_settlement::routes::SharedIdentity;
use care_settlement::settlement::SettlementService;
use care_settlement::store::PgBookingStore;
use care_settlement::{create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "care_settlement=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting refund settlement service");

    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    info!("Connected to application database, migrations complete");

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway {
        GatewayConfig::Stripe {
            secret_key,
            api_base,
            timeout,
        } => {
            info!("Using Stripe payment gateway at {}", api_base);
            Arc::new(
                StripeGateway::new(api_base.as_str(), secret_key.as_str(), *timeout)
                    .context("failed to initialize Stripe gateway")?,
            )
        }
        GatewayConfig::Mock => {
            info!("Using mock payment gateway; no money will move");
            Arc::new(MockGateway::new())
        }
    };

    let identity: SharedIdentity = Arc::new(HttpIdentityResolver::new(
        config.auth_url.as_str(),
        config.auth_service_key.as_str(),
    ));

    let claim_lease = chrono::Duration::from_std(config.refund_claim_lease)
        .context("REFUND_CLAIM_LEASE_SECS is out of range")?;
    let settlement = SettlementService::new(Arc::new(PgBookingStore::new(pool)), gateway)
        .with_claim_lease(claim_lease);
    let app = create_app(settlement, identity);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
