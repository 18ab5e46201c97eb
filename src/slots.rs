use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Display slots shared by the download workers.
///
/// A slot is one fixed progress-bar position guarded by its own lock. Workers
/// scan the pool for a free slot, hold it for the lifetime of one video and
/// give it back afterwards. A pool of size zero means "no display": workers
/// skip slot acquisition entirely.

/// How long a worker waits on a slot it just probed as free.
pub const CLAIM_TIMEOUT: Duration = Duration::from_millis(100);

const BACKOFF_START: Duration = Duration::from_millis(1);
const BACKOFF_CAP: Duration = Duration::from_millis(50);

/// One display position and the lock that grants exclusive use of it.
#[derive(Debug)]
pub struct Slot {
    index: usize,
    lock: Arc<Mutex<()>>,
}

impl Slot {
    fn new(index: usize) -> Self {
        Self {
            index,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Non-blocking probe. The probe lock, if obtained, is dropped immediately.
    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Waits up to `timeout` for the lock.
    pub(crate) async fn claim(&self, timeout: Duration) -> Option<OwnedMutexGuard<()>> {
        if let Ok(guard) = Arc::clone(&self.lock).try_lock_owned() {
            return Some(guard);
        }
        tokio::time::timeout(timeout, Arc::clone(&self.lock).lock_owned())
            .await
            .ok()
    }
}

/// Exclusive handle on a slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct AcquiredSlot {
    index: usize,
    _guard: OwnedMutexGuard<()>,
}

impl AcquiredSlot {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Fixed-size registry of display slots.
///
/// # Examples
///
/// ```
/// # #[tokio::main]
/// # async fn main() {
/// use playlist_archiver::SlotPool;
///
/// let pool = SlotPool::new(2);
/// let slot = pool.try_acquire().await.expect("a free slot");
/// assert_eq!(pool.held(), 1);
/// pool.release(slot);
/// assert_eq!(pool.held(), 0);
/// # }
/// ```
#[derive(Debug)]
pub struct SlotPool {
    slots: Vec<Slot>,
}

impl SlotPool {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(Slot::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Number of slots whose lock is currently held.
    pub fn held(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_locked()).count()
    }

    /// Scans every slot once and claims the first free one.
    ///
    /// A slot is first probed without blocking; only a slot that looked free
    /// is then claimed with [`CLAIM_TIMEOUT`], so losing a race to another
    /// worker costs at most that long before the scan moves on.
    pub async fn try_acquire(&self) -> Option<AcquiredSlot> {
        for slot in &self.slots {
            if slot.is_locked() {
                continue;
            }
            if let Some(guard) = slot.claim(CLAIM_TIMEOUT).await {
                return Some(AcquiredSlot {
                    index: slot.index,
                    _guard: guard,
                });
            }
        }
        None
    }

    /// Repeats [`SlotPool::try_acquire`] with a bounded exponential backoff.
    ///
    /// Returns `None` immediately for an empty pool, and when `timeout`
    /// elapses without a free slot. `None` as timeout waits indefinitely.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Option<AcquiredSlot> {
        if self.is_empty() {
            return None;
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut backoff = BACKOFF_START;
        loop {
            if let Some(slot) = self.try_acquire().await {
                return Some(slot);
            }

            let mut pause = backoff;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                pause = pause.min(deadline - now);
            }
            tokio::time::sleep(pause).await;
            backoff = (backoff * 2).min(BACKOFF_CAP);
        }
    }

    /// Gives a slot back to the pool.
    pub fn release(&self, slot: AcquiredSlot) {
        debug_assert!(slot.index < self.slots.len());
        drop(slot);
    }
}
