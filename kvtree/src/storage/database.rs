//! Key-value engine: the transaction manager.
//!
//! Owns the last committed [`Root`] and the single write slot.
//!
//! # Concurrency
//!
//! - Readers capture the last committed root by reference and never block.
//! - Exactly one writer holds the write slot. Further writers queue FIFO and
//!   are granted the slot, against the root just published, by whichever
//!   `commit` or revert releases it.
//! - The mutex only guards capturing and publishing roots; no lock is held
//!   while a tree is traversed or mutated.
//!
//! # Invariants
//!
//! - `waiters` is non-empty only while `writer_active` is set.
//! - A committed root is never mutated; it is only superseded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::config::EngineConfig;
use crate::storage::btree::Root;
use crate::storage::transaction::{ConflictReason, Transaction, TransactionError};

/// An in-memory transactional key-value store.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct KeyValueDb {
    inner: Arc<DbInner>,
}

struct DbInner {
    config: EngineConfig,
    state: Mutex<DbState>,
}

struct DbState {
    last_committed: Arc<Root>,
    writer_active: bool,
    waiters: VecDeque<oneshot::Sender<WriterGrant>>,
}

impl DbState {
    /// Drop waiters whose future was cancelled before being granted.
    fn prune_cancelled_waiters(&mut self) {
        self.waiters.retain(|waiter| !waiter.is_closed());
    }
}

/// The write slot, handed to a queued writer.
///
/// Dropping an armed grant (its waiter gave up after being chosen) passes
/// the slot on to the next waiter.
pub(crate) struct WriterGrant {
    db: KeyValueDb,
    base: Arc<Root>,
    armed: bool,
}

impl WriterGrant {
    /// The writable root this grant entitles its holder to.
    fn into_root(mut self) -> Root {
        self.armed = false;
        self.base.new_transaction_root()
    }
}

impl Drop for WriterGrant {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("granted writer went away before starting");
            self.db.release_writer();
        }
    }
}

impl Default for KeyValueDb {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyValueDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueDb")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl KeyValueDb {
    /// Create an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty store.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(DbInner {
                config,
                state: Mutex::new(DbState {
                    last_committed: Arc::new(Root::new()),
                    writer_active: false,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Begin a transaction on the last committed root.
    ///
    /// It reads without blocking and becomes the writer on its first
    /// mutation, which fails with a retryable conflict if another writer is
    /// active or a commit has happened since this transaction began.
    pub fn start_transaction(&self) -> Result<Transaction, TransactionError> {
        Ok(Transaction::snapshot(self.clone(), self.last_committed()?))
    }

    /// Begin a transaction that can never write.
    pub fn start_read_only_transaction(&self) -> Result<Transaction, TransactionError> {
        Ok(Transaction::read_only(self.clone(), self.last_committed()?))
    }

    /// Begin a writing transaction, waiting for the write slot if needed.
    ///
    /// Waiters are served in FIFO order. Cancelling the returned future gives
    /// up the place in the queue.
    pub async fn start_writing_transaction(&self) -> Result<Transaction, TransactionError> {
        let receiver = {
            let mut state = self.lock_state()?;
            if !state.writer_active {
                state.writer_active = true;
                let root = state.last_committed.new_transaction_root();
                drop(state);
                tracing::debug!(transaction_id = root.transaction_id(), "writer granted");
                return Ok(Transaction::writing(self.clone(), root));
            }
            state.prune_cancelled_waiters();
            if let Some(max) = self.inner.config.max_queued_writers() {
                if state.waiters.len() >= max {
                    return Err(TransactionError::Conflict(ConflictReason::QueueFull));
                }
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            tracing::debug!(queue_depth = state.waiters.len(), "writer queued");
            receiver
        };

        let grant = receiver.await.map_err(|_| TransactionError::Closed)?;
        let root = grant.into_root();
        tracing::debug!(transaction_id = root.transaction_id(), "queued writer granted");
        Ok(Transaction::writing(self.clone(), root))
    }

    /// Begin a writing transaction only if the write slot is free.
    pub fn try_start_writing_transaction(&self) -> Result<Transaction, TransactionError> {
        let mut state = self.lock_state()?;
        if state.writer_active {
            return Err(TransactionError::Conflict(ConflictReason::WriterActive));
        }
        state.writer_active = true;
        let root = state.last_committed.new_transaction_root();
        drop(state);
        tracing::debug!(transaction_id = root.transaction_id(), "writer granted");
        Ok(Transaction::writing(self.clone(), root))
    }

    /// Transaction id of the last committed root.
    pub fn last_committed_transaction_id(&self) -> Result<u64, TransactionError> {
        Ok(self.lock_state()?.last_committed.transaction_id())
    }

    /// Number of writers waiting for the write slot.
    pub fn queued_writers(&self) -> Result<usize, TransactionError> {
        let mut state = self.lock_state()?;
        state.prune_cancelled_waiters();
        Ok(state.waiters.len())
    }

    pub(crate) fn last_committed(&self) -> Result<Arc<Root>, TransactionError> {
        Ok(Arc::clone(&self.lock_state()?.last_committed))
    }

    /// Claim the write slot for a transaction that began on `base`.
    pub(crate) fn try_begin_write(&self, base: &Arc<Root>) -> Result<(), TransactionError> {
        let mut state = self.lock_state()?;
        if state.writer_active {
            return Err(TransactionError::Conflict(ConflictReason::WriterActive));
        }
        if !Arc::ptr_eq(&state.last_committed, base) {
            return Err(TransactionError::Conflict(ConflictReason::StaleSnapshot));
        }
        state.writer_active = true;
        tracing::debug!(
            transaction_id = base.transaction_id() + 1,
            "snapshot transaction became writer"
        );
        Ok(())
    }

    /// Publish `root` as the last committed version and pass the write slot on.
    pub(crate) fn publish(&self, root: Root) -> Result<(), TransactionError> {
        let mut state = self.lock_state()?;
        tracing::debug!(
            transaction_id = root.transaction_id(),
            keys = root.key_count(),
            "committed"
        );
        state.last_committed = Arc::new(root);
        self.grant_next_writer(&mut state);
        Ok(())
    }

    /// Give up the write slot without publishing anything.
    pub(crate) fn release_writer(&self) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!("writer slot released");
        self.grant_next_writer(&mut state);
    }

    fn grant_next_writer(&self, state: &mut DbState) {
        while let Some(waiter) = state.waiters.pop_front() {
            let grant = WriterGrant {
                db: self.clone(),
                base: Arc::clone(&state.last_committed),
                armed: true,
            };
            match waiter.send(grant) {
                Ok(()) => return,
                // The waiter was cancelled; the slot is still ours to hand out.
                Err(mut grant) => grant.armed = false,
            }
        }
        state.writer_active = false;
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, DbState>, TransactionError> {
        self.inner
            .state
            .lock()
            .map_err(|_| TransactionError::LockPoisoned)
    }
}
