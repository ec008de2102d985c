//! Delay getters: producer-side endpoints that materialise lazy data.
//!
//! A producer that copies a delayed payload hands the service a
//! [`DelayGetterHandle`] and keeps the matching receiver.  When a reader
//! needs a value the service sends a [`DelayRequest`] and waits on its
//! oneshot reply for at most the configured timeout.
//!
//! # Cancellation (for beginners)
//!
//! Every request carries a `oneshot::Sender` for the answer.  If the waiting
//! reader gives up (timeout, or its own task is dropped) the receiving half
//! is dropped too, and the producer can see that with
//! [`DelayRequest::is_cancelled`] and skip the work.

use std::time::Duration;

use pasteboard_core::{EntryValue, PasteData, PasteResult, PasteboardError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default bound on one delay getter round trip.
pub const DEFAULT_DELAY_TIMEOUT: Duration = Duration::from_secs(2);

/// One question asked of a producer.
#[derive(Debug)]
pub enum DelayRequest {
    /// Materialise the whole payload.
    PasteData {
        type_hint: String,
        reply: oneshot::Sender<PasteResult<PasteData>>,
    },
    /// Materialise the whole payload in unified-data form.
    UnifiedData {
        type_hint: String,
        reply: oneshot::Sender<PasteResult<PasteData>>,
    },
    /// Materialise one entry of one record.
    RecordValue {
        record_id: u32,
        utd_id: String,
        reply: oneshot::Sender<PasteResult<EntryValue>>,
    },
}

impl DelayRequest {
    /// `true` once the requesting reader has stopped waiting.
    pub fn is_cancelled(&self) -> bool {
        match self {
            DelayRequest::PasteData { reply, .. } | DelayRequest::UnifiedData { reply, .. } => {
                reply.is_closed()
            }
            DelayRequest::RecordValue { reply, .. } => reply.is_closed(),
        }
    }
}

/// Service-side handle to a producer's delay getter.
#[derive(Debug, Clone)]
pub struct DelayGetterHandle {
    tx: mpsc::Sender<DelayRequest>,
    timeout: Duration,
}

/// Creates a delay getter endpoint.
///
/// The producer keeps the receiver and answers every request it yields.
pub fn delay_getter_channel(capacity: usize) -> (DelayGetterHandle, mpsc::Receiver<DelayRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        DelayGetterHandle {
            tx,
            timeout: DEFAULT_DELAY_TIMEOUT,
        },
        rx,
    )
}

impl DelayGetterHandle {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `true` once the producer dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn get_paste_data(&self, type_hint: &str) -> PasteResult<PasteData> {
        let type_hint = type_hint.to_string();
        self.call(|reply| DelayRequest::PasteData { type_hint, reply })
            .await
    }

    pub async fn get_unified_data(&self, type_hint: &str) -> PasteResult<PasteData> {
        let type_hint = type_hint.to_string();
        self.call(|reply| DelayRequest::UnifiedData { type_hint, reply })
            .await
    }

    pub async fn get_record_value(&self, record_id: u32, utd_id: &str) -> PasteResult<EntryValue> {
        let utd_id = utd_id.to_string();
        self.call(|reply| DelayRequest::RecordValue {
            record_id,
            utd_id,
            reply,
        })
        .await
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<PasteResult<T>>) -> DelayRequest,
    ) -> PasteResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = build(reply_tx);

        let round_trip = async {
            self.tx.send(request).await.map_err(|_| {
                debug!("delay getter endpoint is gone");
                PasteboardError::GetEntryValueFailed
            })?;
            reply_rx.await.map_err(|_| {
                debug!("delay getter dropped the request");
                PasteboardError::GetEntryValueFailed
            })?
        };

        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "delay getter timed out");
                Err(PasteboardError::GetEntryValueFailed)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
