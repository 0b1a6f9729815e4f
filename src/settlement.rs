//! # Refund Settlement
//!
//! Applies a carer's decision on a client's cancellation request.
//!
//! ## Approve
//!
//! 1. Refund the service cost: `total_price - client_fee`, floored at zero.
//!    The platform fee is never returned.
//! 2. If the booking was paid, has a payment reference and the refund is
//!    non-zero: claim the booking (`refund_pending`), call the gateway, release
//!    the claim if the gateway fails.
//! 3. Settle the booking as `cancelled` / `succeeded`.
//!
//! A claim left behind by a crashed or failed settlement expires after the
//! claim lease. The next approval takes it over and calls the gateway again
//! under the same idempotency key, so a refund that already went through is
//! replayed rather than issued twice.
//!
//! ## Decline
//!
//! Settle the booking as `cancelled` / `declined` with no money movement.
//! A booking with a claim, expired or not, cannot be declined: money may
//! already have moved.
//!
//! Every write is conditional on the booking still awaiting a decision, so a
//! duplicate request loses with `InvalidState` instead of refunding twice.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SettlementError};
use crate::gateway::{PaymentGateway, RefundRequest};
use crate::models::{Booking, BookingStatus, PaymentStatus, RefundAction, RefundStatus};
use crate::store::{BookingStore, RefundClaim, Settlement};

/// Default lifetime of a `refund_pending` claim.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 300;

/// Service-cost portion of a booking: `max(0, total_price - client_fee)`.
pub fn refund_amount(total_price: Decimal, client_fee: Decimal) -> Decimal {
    (total_price - client_fee).max(Decimal::ZERO)
}

/// Convert a major-unit amount to minor units, rounding halves away from zero.
/// Returns `None` if the result does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Result of a successful settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementOutcome {
    pub booking: Booking,
    /// Amount recorded as refunded; `None` on decline.
    pub refund_amount: Option<Decimal>,
    /// Gateway refund id, when money was actually moved.
    pub gateway_refund_id: Option<String>,
}

impl SettlementOutcome {
    pub fn message(&self) -> &'static str {
        match self.booking.refund_status {
            RefundStatus::Declined => "Refund declined. Booking cancelled without refund.",
            _ => "Refund approved and processed.",
        }
    }
}

#[derive(Clone)]
pub struct SettlementService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    claim_lease: Duration,
}

impl SettlementService {
    pub fn new(store: Arc<dyn BookingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            store,
            gateway,
            claim_lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECS),
        }
    }

    /// Set how long a refund claim holds before another approval may take it
    /// over. Must exceed the gateway's request timeout.
    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    /// Settle the cancellation request on `booking_id` on behalf of `actor_id`.
    ///
    /// `requested_amount` is validated but not applied: the full service-cost
    /// refund is always issued.
    pub async fn settle(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        action: RefundAction,
        requested_amount: Option<f64>,
    ) -> Result<SettlementOutcome> {
        if let Some(amount) = requested_amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(SettlementError::InvalidArgument(format!(
                    "Requested refund amount must be a non-negative number, got {}",
                    amount
                )));
            }
            info!(
                booking_id = %booking_id,
                requested_amount = amount,
                "Partial refund amount proposed; applying full service-cost refund"
            );
        }

        let booking = self
            .store
            .find(booking_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound("Booking not found".to_string()))?;

        if booking.carer_id != actor_id {
            return Err(SettlementError::Forbidden(
                "You are not authorized to manage this refund".to_string(),
            ));
        }

        let takeover_before = match action {
            RefundAction::Approve => Some(Utc::now() - self.claim_lease),
            RefundAction::Decline => None,
        };
        ensure_awaiting_decision(&booking, takeover_before)?;

        match action {
            RefundAction::Approve => {
                info!("Carer {} approved refund for {}", actor_id, booking_id);
                self.approve(booking).await
            }
            RefundAction::Decline => {
                info!("Carer {} declined refund for {}", actor_id, booking_id);
                self.decline(booking).await
            }
        }
    }

    async fn approve(&self, booking: Booking) -> Result<SettlementOutcome> {
        let amount = refund_amount(booking.total_price, booking.client_fee);
        let amount_minor = to_minor_units(amount).ok_or_else(|| {
            SettlementError::InvalidArgument(format!("Refund amount {} is out of range", amount))
        })?;

        let mut gateway_refund_id = None;
        let mut payment_status = booking.payment_status;

        if let Some(reference) = refundable_reference(&booking, amount_minor) {
            let claimed_at = Utc::now().trunc_subsecs(6);
            let claim = match self
                .store
                .claim_refund(booking.id, claimed_at, claimed_at - self.claim_lease)
                .await?
            {
                Some(claim) => claim,
                None => return Err(self.lost_race(booking.id).await),
            };
            if booking.payment_status == PaymentStatus::RefundPending {
                warn!(
                    booking_id = %booking.id,
                    attempt = claim.attempt,
                    "Taking over expired refund claim from {:?}",
                    booking.refund_claimed_at
                );
            }

            let request =
                RefundRequest::for_booking(booking.id, reference, amount_minor, claim.attempt);
            match self.gateway.create_refund(&request).await {
                Ok(receipt) => {
                    info!(
                        booking_id = %booking.id,
                        refund_id = %receipt.refund_id,
                        amount_minor,
                        "Gateway refund issued"
                    );
                    gateway_refund_id = Some(receipt.refund_id);
                    payment_status = PaymentStatus::Refunded;
                }
                Err(e) => {
                    let rotate_key = !e.outcome_unknown();
                    if rotate_key {
                        warn!(booking_id = %booking.id, "Gateway refused refund: {}", e);
                    } else {
                        warn!(
                            booking_id = %booking.id,
                            idempotency_key = %request.idempotency_key,
                            "Gateway refund outcome unknown: {}", e
                        );
                    }
                    self.release_claim(booking.id, &claim, rotate_key).await;
                    return Err(e.into());
                }
            }
        }

        let settlement = Settlement {
            refund_status: RefundStatus::Succeeded,
            refund_amount_processed: Some(amount),
            expected_payment_status: if gateway_refund_id.is_some() {
                PaymentStatus::RefundPending
            } else {
                booking.payment_status
            },
            payment_status,
            settled_at: Utc::now(),
        };

        let settled = match self.store.settle(booking.id, &settlement).await {
            Ok(Some(settled)) => settled,
            Ok(None) => {
                if let Some(refund_id) = &gateway_refund_id {
                    error!(
                        booking_id = %booking.id,
                        refund_id = %refund_id,
                        "Refund issued but the booking no longer matched its claim"
                    );
                }
                return Err(self.lost_race(booking.id).await);
            }
            Err(e) => {
                if let Some(refund_id) = &gateway_refund_id {
                    error!(
                        booking_id = %booking.id,
                        refund_id = %refund_id,
                        "Refund issued but booking could not be settled; \
                         it stays refund_pending until the claim expires: {}",
                        e
                    );
                }
                return Err(e.into());
            }
        };

        Ok(SettlementOutcome {
            booking: settled,
            refund_amount: Some(amount),
            gateway_refund_id,
        })
    }

    async fn decline(&self, booking: Booking) -> Result<SettlementOutcome> {
        let settlement = Settlement {
            refund_status: RefundStatus::Declined,
            refund_amount_processed: None,
            expected_payment_status: booking.payment_status,
            payment_status: booking.payment_status,
            settled_at: Utc::now(),
        };

        match self.store.settle(booking.id, &settlement).await? {
            Some(settled) => Ok(SettlementOutcome {
                booking: settled,
                refund_amount: None,
                gateway_refund_id: None,
            }),
            None => Err(self.lost_race(booking.id).await),
        }
    }

    /// Return a claimed booking to `paid` after a failed gateway call.
    ///
    /// Failures are logged, not returned: the caller reports the gateway
    /// error, and an unreleased claim becomes claimable once its lease runs
    /// out.
    async fn release_claim(&self, booking_id: Uuid, claim: &RefundClaim, rotate_key: bool) {
        match self.store.release_refund(booking_id, claim, rotate_key).await {
            Ok(true) => {}
            Ok(false) => {
                error!(booking_id = %booking_id, "Refund claim was not held when releasing it")
            }
            Err(e) => error!(
                booking_id = %booking_id,
                attempt = claim.attempt,
                "Failed to release refund claim; it stays refund_pending until the lease expires: {}",
                e
            ),
        }
    }

    /// Build the error for a conditional write that matched no row, reporting
    /// the booking's state as it is now.
    async fn lost_race(&self, booking_id: Uuid) -> SettlementError {
        match self.store.find(booking_id).await {
            Ok(Some(current)) => match ensure_awaiting_decision(&current, None) {
                Err(e) => e,
                Ok(()) => SettlementError::InvalidState(
                    "Booking changed while the refund was being settled".to_string(),
                ),
            },
            Ok(None) => SettlementError::NotFound("Booking not found".to_string()),
            Err(e) => e.into(),
        }
    }
}

/// Check the booking still awaits the carer's decision.
///
/// A `refund_pending` booking is refused unless `takeover_before` is given
/// and its claim was taken before then.
fn ensure_awaiting_decision(
    booking: &Booking,
    takeover_before: Option<DateTime<Utc>>,
) -> Result<()> {
    if booking.status != BookingStatus::CancellationRequested {
        return Err(SettlementError::InvalidState(format!(
            "Booking status is {}, cannot approve refund.",
            booking.status
        )));
    }
    if booking.payment_status == PaymentStatus::RefundPending {
        let expired = match (takeover_before, booking.refund_claimed_at) {
            (Some(cutoff), Some(claimed_at)) => claimed_at < cutoff,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !expired {
            return Err(SettlementError::InvalidState(
                "A refund for this booking is already being processed".to_string(),
            ));
        }
    }
    Ok(())
}

/// The payment reference to refund against, if this approval moves money.
fn refundable_reference(booking: &Booking, amount_minor: i64) -> Option<&str> {
    let claimable = matches!(
        booking.payment_status,
        PaymentStatus::Paid | PaymentStatus::RefundPending
    );
    if !claimable || amount_minor <= 0 {
        return None;
    }
    booking.payment_reference()
}
