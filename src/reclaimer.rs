use crate::slots::SlotPool;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Something that draws one line per slot and can blank a line.
pub trait SlotCanvas: Send + Sync {
    fn clear(&self, index: usize);
}

#[derive(Debug, Clone, Copy)]
pub struct ReclaimerConfig {
    /// Pause between two scans of the pool.
    pub scan_interval: Duration,
    /// How long the consumer waits for a pending slot's lock per attempt.
    pub claim_timeout: Duration,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(100),
            claim_timeout: Duration::from_millis(100),
        }
    }
}

type PendingSet = Arc<Mutex<BTreeSet<usize>>>;

/// Clears slot lines whose owner went away without cleaning up.
///
/// A producer loop scans the pool and marks every slot it sees locked as
/// pending. A consumer loop waits for each pending slot to become
/// acquirable; once it holds the lock it blanks the slot's line, unmarks it
/// and releases it. A slot is therefore only cleared after it was seen in use
/// and then freed, never while a live worker is drawing on it.
pub struct StaleSlotReclaimer {
    pool: Arc<SlotPool>,
    canvas: Arc<dyn SlotCanvas>,
    pending: PendingSet,
    config: ReclaimerConfig,
}

impl StaleSlotReclaimer {
    pub fn new(pool: Arc<SlotPool>, canvas: Arc<dyn SlotCanvas>, config: ReclaimerConfig) -> Self {
        Self {
            pool,
            canvas,
            pending: Arc::new(Mutex::new(BTreeSet::new())),
            config,
        }
    }

    /// Starts both loops. They stop once `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> ReclaimerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::clone(&self.pending);

        let producer = tokio::spawn(produce(
            Arc::clone(&self.pool),
            Arc::clone(&self.pending),
            tx,
            self.config,
            shutdown.clone(),
        ));
        let consumer = tokio::spawn(consume(
            self.pool,
            self.canvas,
            self.pending,
            rx,
            self.config,
            shutdown.clone(),
        ));

        ReclaimerHandle {
            producer,
            consumer,
            pending,
            shutdown,
        }
    }
}

/// Running reclaimer.
pub struct ReclaimerHandle {
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
    pending: PendingSet,
    shutdown: CancellationToken,
}

impl ReclaimerHandle {
    /// Slot indices currently waiting to be cleared.
    pub fn pending(&self) -> Vec<usize> {
        self.pending.lock().iter().copied().collect()
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.producer.await {
            debug!("Slot scanner ended abnormally: {}", e);
        }
        if let Err(e) = self.consumer.await {
            debug!("Slot eraser ended abnormally: {}", e);
        }
    }
}

#[instrument(skip_all)]
async fn produce(
    pool: Arc<SlotPool>,
    pending: PendingSet,
    tx: mpsc::UnboundedSender<usize>,
    config: ReclaimerConfig,
    shutdown: CancellationToken,
) {
    while !shutdown.is_cancelled() {
        for slot in pool.slots() {
            if shutdown.is_cancelled() {
                return;
            }
            let mut marked = pending.lock();
            if !marked.contains(&slot.index()) && slot.is_locked() {
                marked.insert(slot.index());
                if tx.send(slot.index()).is_err() {
                    return;
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(config.scan_interval) => {}
        }
    }
}

#[instrument(skip_all)]
async fn consume(
    pool: Arc<SlotPool>,
    canvas: Arc<dyn SlotCanvas>,
    pending: PendingSet,
    mut rx: mpsc::UnboundedReceiver<usize>,
    config: ReclaimerConfig,
    shutdown: CancellationToken,
) {
    let mut waiting: BTreeSet<usize> = BTreeSet::new();

    loop {
        if waiting.is_empty() {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                received = rx.recv() => match received {
                    Some(index) => { waiting.insert(index); }
                    None => return,
                },
            }
        }
        while let Ok(index) = rx.try_recv() {
            waiting.insert(index);
        }

        let mut cleared = Vec::new();
        for &index in &waiting {
            if shutdown.is_cancelled() {
                return;
            }
            let Some(slot) = pool.get(index) else {
                cleared.push(index);
                continue;
            };
            if let Some(guard) = slot.claim(config.claim_timeout).await {
                canvas.clear(index);
                // Unmark and unlock under the set lock so the scanner never
                // sees this slot unmarked while we still hold it.
                let mut marked = pending.lock();
                marked.remove(&index);
                drop(guard);
                drop(marked);
                debug!(slot = index, "Cleared slot line");
                cleared.push(index);
            }
        }
        for index in cleared {
            waiting.remove(&index);
        }

        if !waiting.is_empty() {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(config.scan_interval) => {}
            }
        }
    }
}
