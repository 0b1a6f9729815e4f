//! PostgreSQL booking store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{BookingStore, RefundClaim, Settlement, StoreError};
use crate::db::AppDb;
use crate::models::{Booking, BookingRow};

#[derive(Clone)]
pub struct PgBookingStore {
    pool: AppDb,
}

impl PgBookingStore {
    pub fn new(pool: AppDb) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Booking::try_from).transpose()?)
    }

    async fn claim_refund(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<RefundClaim>, StoreError> {
        let attempt: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE bookings
            SET payment_status = 'refund_pending',
                refund_claimed_at = $2,
                updated_at = $2
            WHERE id = $1
              AND status = 'cancellation_requested'
              AND (payment_status = 'paid'
                   OR (payment_status = 'refund_pending'
                       AND (refund_claimed_at IS NULL OR refund_claimed_at < $3)))
            RETURNING refund_attempt
            "#,
        )
        .bind(id)
        .bind(claimed_at)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt.map(|attempt| RefundClaim {
            attempt,
            claimed_at,
        }))
    }

    async fn release_refund(
        &self,
        id: Uuid,
        claim: &RefundClaim,
        rotate_key: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET payment_status = 'paid',
                refund_claimed_at = NULL,
                refund_attempt = refund_attempt + CASE WHEN $3 THEN 1 ELSE 0 END,
                updated_at = now()
            WHERE id = $1
              AND status = 'cancellation_requested'
              AND payment_status = 'refund_pending'
              AND refund_claimed_at = $2
            "#,
        )
        .bind(id)
        .bind(claim.claimed_at)
        .bind(rotate_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn settle(&self, id: Uuid, settlement: &Settlement) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            UPDATE bookings
            SET status = 'cancelled',
                refund_status = $2,
                refund_amount_processed = COALESCE($3, refund_amount_processed),
                payment_status = $4,
                refund_claimed_at = NULL,
                updated_at = $5
            WHERE id = $1
              AND status = 'cancellation_requested'
              AND payment_status = $6
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(settlement.refund_status.as_str())
        .bind(settlement.refund_amount_processed)
        .bind(settlement.payment_status.as_str())
        .bind(settlement.settled_at)
        .bind(settlement.expected_payment_status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Booking::try_from).transpose()?)
    }
}
