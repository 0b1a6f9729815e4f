//! Domain models for the settlement service.
//!
//! `BookingRow` maps the `bookings` table as stored (statuses are plain text
//! columns). `Booking` is the typed view the settlement logic works with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

// ============================================================================
// Status Fields
// ============================================================================

/// Booking lifecycle status.
///
/// Only the states the settlement flow cares about are named. Any other
/// lifecycle string is carried through untouched so a booking in, say,
/// `in_progress` can still be read and reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CancellationRequested,
    Cancelled,
    Other(String),
}

impl BookingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CancellationRequested => "cancellation_requested",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Other(s) => s,
        }
    }
}

impl From<&str> for BookingStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => BookingStatus::Pending,
            "confirmed" => BookingStatus::Confirmed,
            "cancellation_requested" => BookingStatus::CancellationRequested,
            "cancelled" => BookingStatus::Cancelled,
            other => BookingStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BookingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Error returned when a closed status column holds an unexpected value.
#[derive(Debug, thiserror::Error)]
#[error("unknown {field} value '{value}'")]
pub struct UnknownStatus {
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    RefundPending,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::RefundPending => "refund_pending",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refund_pending" => Ok(PaymentStatus::RefundPending),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownStatus {
                field: "payment_status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    None,
    Succeeded,
    Declined,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::None => "none",
            RefundStatus::Succeeded => "succeeded",
            RefundStatus::Declined => "declined",
        }
    }
}

impl FromStr for RefundStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(RefundStatus::None),
            "succeeded" => Ok(RefundStatus::Succeeded),
            "declined" => Ok(RefundStatus::Declined),
            other => Err(UnknownStatus {
                field: "refund_status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Database Models (sqlx::FromRow)
// ============================================================================

/// A booking as stored in the `bookings` table.
#[derive(Debug, sqlx::FromRow)]
pub struct BookingRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub carer_id: Uuid,
    pub total_price: Option<Decimal>,
    pub client_fee: Option<Decimal>,
    pub status: String,
    pub payment_status: String,
    pub refund_status: String,
    pub refund_amount_processed: Option<Decimal>,
    pub stripe_payment_intent_id: Option<String>,
    pub refund_attempt: i32,
    pub refund_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One scheduled care engagement between a client and a carer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: Uuid,
    pub client_id: Uuid,
    pub carer_id: Uuid,
    pub total_price: Decimal,
    pub client_fee: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub refund_status: RefundStatus,
    pub refund_amount_processed: Option<Decimal>,
    /// Gateway identifier of the captured payment, needed to refund it.
    pub stripe_payment_intent_id: Option<String>,
    /// Bumped each time the gateway definitely refuses a refund, so the next
    /// attempt goes out under a fresh idempotency key.
    pub refund_attempt: i32,
    /// When the current `refund_pending` claim was taken.
    pub refund_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The gateway payment reference, ignoring blank values.
    pub fn payment_reference(&self) -> Option<&str> {
        self.stripe_payment_intent_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = UnknownStatus;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            client_id: row.client_id,
            carer_id: row.carer_id,
            total_price: row.total_price.unwrap_or_default(),
            client_fee: row.client_fee.unwrap_or_default(),
            status: BookingStatus::from(row.status.as_str()),
            payment_status: row.payment_status.parse()?,
            refund_status: row.refund_status.parse()?,
            refund_amount_processed: row.refund_amount_processed,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            refund_attempt: row.refund_attempt,
            refund_claimed_at: row.refund_claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================================================
// Request Models (Deserialize from JSON input)
// ============================================================================

/// The carer's decision on a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundAction {
    Approve,
    Decline,
}

/// Request body for settling a refund request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettleRefundRequest {
    pub booking_id: Uuid,
    pub action: RefundAction,
    /// Proposed partial refund. Validated, then ignored: the full
    /// service-cost refund is always applied.
    #[serde(default)]
    pub amount: Option<f64>,
}

// ============================================================================
// Response Models
// ============================================================================

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub message: String,
}

/// Response for a settled refund request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRefundResponse {
    pub message: String,
    pub status: BookingStatus,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub refund_amount: Option<Decimal>,
}
