//! Request reader + filtered fan-out (C4).
//!
//! Grounded on `original_source/.../request_reader.py` and
//! `filter_reader.py`. The subscriber list lives on an instance field
//! (`RequestReader::readers`), never a global/static, per `SPEC_FULL.md`
//! §9's rejection of "global class-level subscriber sets."

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::io_server::model::Envelope;
use crate::io_server::writer::ResponseWriter;

type Predicate = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// One registered subscription: a predicate and a bounded queue.
struct Subscription {
    id: u64,
    predicate: Predicate,
    tx: mpsc::Sender<Option<Envelope>>,
}

/// The single background-loop-owned fan-out of decoded envelopes to
/// predicate-filtered subscribers.
///
/// `readers` is an instance field: one `RequestReader` per process, injected
/// into sessions via constructor, never a process-wide global (this is the
/// direct Rust counterpart of the fix already present in
/// `request_reader.py`'s constructor comment: "Convert class variables to
/// instance variables to avoid global lock contention").
pub struct RequestReader {
    readers: Mutex<Vec<Subscription>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl Default for RequestReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestReader {
    pub fn new() -> Self {
        Self {
            readers: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Register a new subscriber matching `predicate`. Returns a guard that
    /// unsubscribes on drop (normal completion, error propagation via `?`,
    /// or task cancellation all run the same deregistration path).
    pub async fn read<F>(self: &Arc<Self>, predicate: F) -> FilterReaderGuard
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(64);
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let subscription = Subscription {
            id,
            predicate: Arc::new(predicate),
            tx,
        };
        self.readers.lock().await.push(subscription);

        FilterReaderGuard {
            id,
            reader: Arc::clone(self),
            rx: Mutex::new(rx),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Process one decoded envelope: snapshot the subscriber list under
    /// lock, release the lock, evaluate every predicate outside the lock,
    /// then enqueue into each matching subscriber. Predicate evaluation
    /// never holds the subscribers-list lock (`SPEC_FULL.md` §4.4
    /// invariant 3).
    pub async fn process_envelope(&self, envelope: Envelope, writer: &ResponseWriter) {
        let snapshot: Vec<(u64, Predicate, mpsc::Sender<Option<Envelope>>)> = {
            let guard = self.readers.lock().await;
            guard
                .iter()
                .map(|s| (s.id, Arc::clone(&s.predicate), s.tx.clone()))
                .collect()
        };

        let mut matched = Vec::new();
        for (id, predicate, tx) in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                predicate(&envelope)
            }));
            match result {
                Ok(true) => matched.push((id, tx)),
                Ok(false) => {}
                Err(_) => {
                    tracing::error!(subscriber_id = id, "predicate panicked, skipping");
                }
            }
        }

        for (id, tx) in matched {
            if tx.send(Some(envelope.clone())).await.is_err() {
                tracing::debug!(subscriber_id = id, "subscriber dropped before delivery");
            }
        }
    }

    /// Report a decode failure: writes an error event scoped to the
    /// offending session id if one could be extracted, otherwise with no
    /// session id (`SPEC_FULL.md` §4.4 invariant 5, §7 Decode error).
    pub async fn report_decode_error(
        &self,
        writer: &ResponseWriter,
        session_id: Option<String>,
        raw_line: &str,
    ) {
        let _ = writer
            .error(
                session_id,
                serde_json::json!({"error": format!("failed to decode record: {raw_line}")}),
            )
            .await;
    }

    async fn unsubscribe(&self, id: u64) {
        let mut guard = self.readers.lock().await;
        if let Some(pos) = guard.iter().position(|s| s.id == id) {
            guard.remove(pos);
        }
    }

    #[cfg(test)]
    async fn subscriber_count(&self) -> usize {
        self.readers.lock().await.len()
    }
}

/// RAII handle for one subscription. Closing sends a sentinel (`None`) and
/// deregisters from the parent reader's subscriber list; both are
/// idempotent.
pub struct FilterReaderGuard {
    id: u64,
    reader: Arc<RequestReader>,
    rx: Mutex<mpsc::Receiver<Option<Envelope>>>,
    closed: std::sync::atomic::AtomicBool,
}

impl FilterReaderGuard {
    /// Untimed read: blocks until the next matching envelope, a sentinel,
    /// or the channel is closed.
    pub async fn read(&self) -> Option<Envelope> {
        self.rx.lock().await.recv().await.flatten()
    }

    /// Timed read: returns `None` on each idle tick without closing the
    /// subscriber, exactly like the Python `FilterReader.read`'s
    /// `queue.Empty -> yield None` path. Returns `Some(None)` is collapsed
    /// into `None` to match the 1-s-round-timeout semantics used by the
    /// backwards-invocation client (`SPEC_FULL.md` §4.8 step 4): the caller
    /// cannot distinguish "no message this tick" from "sentinel" via this
    /// method alone, so sentinel delivery is represented by the stream
    /// simply ending (see [`FilterReaderGuard::closed`]).
    pub async fn read_timed(&self, round: Duration) -> TimedRead {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(round, rx.recv()).await {
            Ok(Some(Some(envelope))) => TimedRead::Envelope(envelope),
            Ok(Some(None)) => TimedRead::Closed,
            Ok(None) => TimedRead::Closed,
            Err(_) => TimedRead::Timeout,
        }
    }

    pub async fn close(&self) {
        if self
            .closed
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return;
        }
        self.reader.unsubscribe(self.id).await;
    }
}

/// Outcome of one timed-read round.
#[derive(Debug)]
pub enum TimedRead {
    Envelope(Envelope),
    Timeout,
    Closed,
}

impl Drop for FilterReaderGuard {
    fn drop(&mut self) {
        if self
            .closed
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return;
        }
        let reader = Arc::clone(&self.reader);
        let id = self.id;
        tokio::spawn(async move {
            reader.unsubscribe(id).await;
        });
    }
}
