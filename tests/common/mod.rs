//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

use care_settlement::gateway::MockGateway;
use care_settlement::models::{Booking, BookingStatus, PaymentStatus, RefundStatus};
use care_settlement::settlement::SettlementService;
use care_settlement::store::{
    BookingStore, MemoryBookingStore, RefundClaim, Settlement, StoreError,
};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// A paid booking awaiting the carer's decision: 100.00 total, 20.00 fee.
pub fn pending_cancellation() -> Booking {
    let now = Utc::now();
    Booking {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        carer_id: Uuid::new_v4(),
        total_price: dec("100.00"),
        client_fee: dec("20.00"),
        status: BookingStatus::CancellationRequested,
        payment_status: PaymentStatus::Paid,
        refund_status: RefundStatus::None,
        refund_amount_processed: None,
        stripe_payment_intent_id: Some("pi_3OqTestIntent".to_string()),
        refund_attempt: 0,
        refund_claimed_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A store write that `FaultyStore` can be told to break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `release_refund` fails with a database error.
    Release,
    /// `settle` fails with a database error.
    Settle,
    /// `settle` reports that the row no longer matched.
    SettleMismatch,
}

/// Memory store that fails selected writes once each.
pub struct FaultyStore {
    inner: Arc<MemoryBookingStore>,
    faults: Mutex<Vec<Fault>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryBookingStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
        }
    }

    pub async fn fail_next(&self, fault: Fault) {
        self.faults.lock().await.push(fault);
    }

    async fn take(&self, wanted: &[Fault]) -> Option<Fault> {
        let mut faults = self.faults.lock().await;
        let pos = faults.iter().position(|f| wanted.contains(f))?;
        Some(faults.remove(pos))
    }
}

fn db_down() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl BookingStore for FaultyStore {
    async fn find(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.inner.find(id).await
    }

    async fn claim_refund(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<RefundClaim>, StoreError> {
        self.inner.claim_refund(id, claimed_at, stale_before).await
    }

    async fn release_refund(
        &self,
        id: Uuid,
        claim: &RefundClaim,
        rotate_key: bool,
    ) -> Result<bool, StoreError> {
        if self.take(&[Fault::Release]).await.is_some() {
            return Err(db_down());
        }
        self.inner.release_refund(id, claim, rotate_key).await
    }

    async fn settle(&self, id: Uuid, settlement: &Settlement) -> Result<Option<Booking>, StoreError> {
        match self.take(&[Fault::Settle, Fault::SettleMismatch]).await {
            Some(Fault::SettleMismatch) => Ok(None),
            Some(_) => Err(db_down()),
            None => self.inner.settle(id, settlement).await,
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryBookingStore>,
    pub faults: Arc<FaultyStore>,
    pub gateway: Arc<MockGateway>,
    pub service: SettlementService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(MockGateway::new())
    }

    pub fn with_gateway(gateway: MockGateway) -> Self {
        let store = Arc::new(MemoryBookingStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let gateway = Arc::new(gateway);
        let service = SettlementService::new(faults.clone(), gateway.clone());
        Self {
            store,
            faults,
            gateway,
            service,
        }
    }

    pub fn with_claim_lease(mut self, lease: chrono::Duration) -> Self {
        self.service = self.service.with_claim_lease(lease);
        self
    }

    pub async fn seed(&self, booking: Booking) -> Booking {
        self.store.insert(booking.clone()).await;
        booking
    }

    pub async fn reload(&self, id: Uuid) -> Booking {
        self.store
            .find(id)
            .await
            .expect("memory store never fails")
            .expect("booking should exist")
    }
}

/// Collects formatted log output for the current test thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

pub struct LogWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(Arc::clone(&self.0))
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Route this thread's tracing output here until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}
