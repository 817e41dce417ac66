use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    backend::ProgressBackend, progress::ProgressStore, session::SessionEvent,
};

/// Debounced persistence writer for one lesson.
///
/// Every write — debounced tick, pause flush, unmount flush — funnels
/// through `write_once`, which stamps a sequence number at submit time and
/// refuses to apply any response older than the last applied one. That
/// single funnel is what keeps an auto-save write that was already in
/// flight from landing on top of a fresher pause flush.
///
/// Failed writes are logged, the store is left dirty, and the next natural
/// checkpoint (tick, pause, unmount) retries; playback is never blocked.
#[derive(Debug)]
pub struct ProgressWriter<B> {
    backend: Arc<B>,
    store: Arc<ProgressStore>,
    interval: Duration,
    /// false in preview mode: schedule/flush become no-ops
    enabled: bool,
    next_seq: AtomicU64,
    last_applied: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
    events: UnboundedSender<SessionEvent>,
}

impl<B: ProgressBackend> ProgressWriter<B> {
    pub fn new(
        backend: Arc<B>,
        store: Arc<ProgressStore>,
        interval: Duration,
        enabled: bool,
        events: UnboundedSender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            store,
            interval,
            enabled,
            next_seq: AtomicU64::new(0),
            last_applied: AtomicU64::new(0),
            pending: Mutex::new(None),
            events,
        })
    }

    /// Schedule a write one interval from now. While input keeps arriving,
    /// repeated calls coalesce into the already-pending write; at most one
    /// debounced write is in flight per lesson.
    pub fn schedule(self: &Arc<Self>) {
        if !self.enabled {
            return;
        }
        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let writer = Arc::clone(self);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(writer.interval).await;
            writer.write_once().await;
        }));
    }

    /// Abort the pending debounced write, if any. Callers flushing
    /// immediately (pause, unmount) cancel first so a stale scheduled write
    /// cannot land after the fresh one.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }

    /// Cancel the pending write and flush the current store state now.
    /// Skipped when nothing changed since the last successful write.
    pub async fn flush_now(&self) {
        self.cancel();
        if !self.enabled || !self.store.is_dirty() {
            return;
        }
        self.write_once().await;
    }

    pub fn last_applied_seq(&self) -> u64 {
        self.last_applied.load(Ordering::SeqCst)
    }

    async fn write_once(&self) {
        let update = self.store.flush_payload();
        // sequence stamped at submit time, applied at response time
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        match self.backend.push_progress(update).await {
            Ok(snapshot) => {
                let mut last = self.last_applied.load(Ordering::SeqCst);
                loop {
                    if seq <= last {
                        debug!(
                            lesson = self.store.lesson_id(),
                            seq, last, "dropping stale progress response"
                        );
                        return;
                    }
                    match self.last_applied.compare_exchange(
                        last,
                        seq,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => break,
                        Err(current) => last = current,
                    }
                }
                self.store.reconcile(&snapshot.progress);
                self.store.clear_dirty();
                if snapshot.certificate_issued {
                    let _ = self.events.send(SessionEvent::CertificateIssued);
                }
            }
            Err(e) => {
                warn!(
                    lesson = self.store.lesson_id(),
                    "progress write failed, will retry at next checkpoint: {e}"
                );
                self.store.mark_dirty();
            }
        }
    }
}
