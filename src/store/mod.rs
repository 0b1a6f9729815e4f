//! Booking persistence.
//!
//! Every write is conditional on the booking still being in
//! `cancellation_requested` (and on its payment status), so concurrent
//! settlements of one booking cannot both succeed.
//!
//! A refund claim is a lease: `refund_claimed_at` records when it was taken,
//! and a claim older than the caller's cutoff may be taken over by a later
//! approval. That keeps a crash between the gateway call and the final write
//! from leaving the booking stuck in `refund_pending`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, PaymentStatus, RefundStatus, UnknownStatus};

pub use memory::MemoryBookingStore;
pub use postgres::PgBookingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt booking record: {0}")]
    Corrupt(#[from] UnknownStatus),
}

/// A held `refund_pending` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundClaim {
    /// Refund attempt number, which selects the idempotency key.
    pub attempt: i32,
    pub claimed_at: DateTime<Utc>,
}

/// The terminal write for a settled booking.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub refund_status: RefundStatus,
    /// `None` leaves the stored value untouched.
    pub refund_amount_processed: Option<Decimal>,
    /// Payment status the row must still have for the write to apply.
    pub expected_payment_status: PaymentStatus,
    pub payment_status: PaymentStatus,
    pub settled_at: DateTime<Utc>,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Mark a `cancellation_requested` booking as `refund_pending` ahead of
    /// the gateway call, stamping the claim with `claimed_at`.
    ///
    /// Applies to a `paid` booking, or to a `refund_pending` one whose claim
    /// was taken before `stale_before`. Returns `None` otherwise, which
    /// includes losing the claim to a concurrent approval.
    async fn claim_refund(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<RefundClaim>, StoreError>;

    /// Undo `claim` after a failed gateway call, returning the booking to
    /// `paid`. `rotate_key` advances the refund attempt so the next approval
    /// uses a fresh idempotency key. Returns false if the claim was no longer
    /// held, e.g. because another approval took it over.
    async fn release_refund(
        &self,
        id: Uuid,
        claim: &RefundClaim,
        rotate_key: bool,
    ) -> Result<bool, StoreError>;

    /// Move a `cancellation_requested` booking to `cancelled`, clearing any
    /// refund claim. Returns the updated booking, or `None` if the row no
    /// longer matched.
    async fn settle(&self, id: Uuid, settlement: &Settlement) -> Result<Option<Booking>, StoreError>;
}
