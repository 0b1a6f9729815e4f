//! In-memory booking store with the same conditional-write rules as Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookingStore, RefundClaim, Settlement, StoreError};
use crate::models::{Booking, BookingStatus, PaymentStatus};

#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, booking: Booking) {
        self.bookings.write().await.insert(booking.id, booking);
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn find(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn claim_refund(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<RefundClaim>, StoreError> {
        let mut bookings = self.bookings.write().await;
        let Some(b) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        let claimable = match b.payment_status {
            PaymentStatus::Paid => true,
            PaymentStatus::RefundPending => b.refund_claimed_at.map_or(true, |at| at < stale_before),
            _ => false,
        };
        if b.status != BookingStatus::CancellationRequested || !claimable {
            return Ok(None);
        }

        b.payment_status = PaymentStatus::RefundPending;
        b.refund_claimed_at = Some(claimed_at);
        b.updated_at = claimed_at;
        Ok(Some(RefundClaim {
            attempt: b.refund_attempt,
            claimed_at,
        }))
    }

    async fn release_refund(
        &self,
        id: Uuid,
        claim: &RefundClaim,
        rotate_key: bool,
    ) -> Result<bool, StoreError> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(b)
                if b.status == BookingStatus::CancellationRequested
                    && b.payment_status == PaymentStatus::RefundPending
                    && b.refund_claimed_at == Some(claim.claimed_at) =>
            {
                b.payment_status = PaymentStatus::Paid;
                b.refund_claimed_at = None;
                if rotate_key {
                    b.refund_attempt += 1;
                }
                b.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle(&self, id: Uuid, settlement: &Settlement) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.bookings.write().await;
        let Some(b) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        if b.status != BookingStatus::CancellationRequested
            || b.payment_status != settlement.expected_payment_status
        {
            return Ok(None);
        }

        b.status = BookingStatus::Cancelled;
        b.refund_status = settlement.refund_status;
        if let Some(amount) = settlement.refund_amount_processed {
            b.refund_amount_processed = Some(amount);
        }
        b.payment_status = settlement.payment_status;
        b.refund_claimed_at = None;
        b.updated_at = settlement.settled_at;

        Ok(Some(b.clone()))
    }
}
