//! Transactions over one version of the tree.
//!
//! A transaction pins a root for its lifetime:
//!
//! - Read-only: the last committed root at start; never writes.
//! - Snapshot: starts like a reader and claims the write slot on its first
//!   mutation, switching to a private writable root.
//! - Writing: holds the write slot from the start.
//!
//! Committing publishes the writable root; dropping or aborting a writing
//! transaction discards it and frees the slot.
//!
//! Transactions and their cursors are single-threaded (`!Send`); the store
//! itself is shared across threads.
//!
//! # Invariants
//!
//! - Only a transaction in the writing state holds a mutable root, and it
//!   holds the write slot until it finishes.
//! - A finished transaction answers every request with
//!   [`TransactionError::Finished`].

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::storage::btree::{PathStack, Root, ULONG_SLOTS};
use crate::storage::cursor::{Cursor, CursorPosition};
use crate::storage::database::KeyValueDb;

/// Stacks kept for reuse by a transaction's cursors.
const STACK_POOL_LIMIT: usize = 8;

/// Why a transaction could not obtain the write slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another transaction is writing.
    WriterActive,
    /// A commit happened after this transaction's snapshot was taken.
    StaleSnapshot,
    /// The writer queue is at its configured bound.
    QueueFull,
}

/// Error type for transaction operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The write slot is unavailable; retrying in a new transaction may succeed.
    Conflict(ConflictReason),
    /// The transaction was started read-only.
    ReadOnly,
    /// The transaction already committed or aborted.
    Finished,
    /// Counter index past the per-root bank.
    UlongIndexOutOfRange { index: usize },
    /// The store's state lock was poisoned by a panicking thread.
    LockPoisoned,
    /// The store went away while waiting for the write slot.
    Closed,
}

impl TransactionError {
    /// Whether retrying in a fresh (writable) transaction may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::ReadOnly)
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WriterActive => write!(f, "another transaction is writing"),
            Self::StaleSnapshot => write!(f, "a newer version was committed"),
            Self::QueueFull => write!(f, "writer queue is full"),
        }
    }
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict(reason) => write!(f, "write conflict: {reason}"),
            Self::ReadOnly => write!(f, "transaction is read-only"),
            Self::Finished => write!(f, "transaction already finished"),
            Self::UlongIndexOutOfRange { index } => {
                write!(f, "ulong index {index} out of range (max {})", ULONG_SLOTS - 1)
            }
            Self::LockPoisoned => write!(f, "store lock poisoned"),
            Self::Closed => write!(f, "store closed"),
        }
    }
}

impl std::error::Error for TransactionError {}

enum TxnRoot {
    ReadOnly(Arc<Root>),
    Snapshot(Arc<Root>),
    Writing(Root),
    Finished,
}

/// State shared by a transaction and its cursors.
pub(crate) struct TxnInner {
    db: KeyValueDb,
    root: RefCell<TxnRoot>,
    description: RefCell<Option<String>>,
    cursors: RefCell<Vec<Weak<RefCell<CursorPosition>>>>,
    iteration_depth: Cell<u32>,
    stack_pool: RefCell<Vec<PathStack>>,
}

/// A transaction. See the module documentation for its lifecycle.
pub struct Transaction {
    inner: Rc<TxnInner>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("transaction_number", &self.transaction_number().ok())
            .field("writing", &self.is_writing())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn read_only(db: KeyValueDb, root: Arc<Root>) -> Self {
        Self::with_root(db, TxnRoot::ReadOnly(root))
    }

    pub(crate) fn snapshot(db: KeyValueDb, root: Arc<Root>) -> Self {
        Self::with_root(db, TxnRoot::Snapshot(root))
    }

    pub(crate) fn writing(db: KeyValueDb, root: Root) -> Self {
        Self::with_root(db, TxnRoot::Writing(root))
    }

    fn with_root(db: KeyValueDb, root: TxnRoot) -> Self {
        Self {
            inner: Rc::new(TxnInner {
                db,
                root: RefCell::new(root),
                description: RefCell::new(None),
                cursors: RefCell::new(Vec::new()),
                iteration_depth: Cell::new(0),
                stack_pool: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create an unpositioned cursor over this transaction.
    #[must_use]
    pub fn create_cursor(&self) -> Cursor {
        Cursor::new(Rc::clone(&self.inner))
    }

    /// Number of keys visible to this transaction.
    pub fn key_value_count(&self) -> Result<u64, TransactionError> {
        self.inner.read(Root::key_count)
    }

    /// Id of the version this transaction reads (or, once writing, builds).
    pub fn transaction_number(&self) -> Result<u64, TransactionError> {
        self.inner.read(Root::transaction_id)
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(*self.inner.root.borrow(), TxnRoot::ReadOnly(_))
    }

    #[must_use]
    pub fn is_writing(&self) -> bool {
        matches!(*self.inner.root.borrow(), TxnRoot::Writing(_))
    }

    /// Counter `index` of the visible version.
    pub fn ulong(&self, index: usize) -> Result<u64, TransactionError> {
        self.inner
            .read(|root| root.ulong(index))?
            .ok_or(TransactionError::UlongIndexOutOfRange { index })
    }

    /// Set counter `index`, claiming the write slot if needed.
    pub fn set_ulong(&self, index: usize, value: u64) -> Result<(), TransactionError> {
        if index >= ULONG_SLOTS {
            return Err(TransactionError::UlongIndexOutOfRange { index });
        }
        self.inner.write(|root| root.set_ulong(index, value))?;
        Ok(())
    }

    /// Diagnostic label of this transaction.
    #[must_use]
    pub fn description(&self) -> Option<String> {
        self.inner.description.borrow().clone()
    }

    /// Label this transaction; a committed label is kept on the published root.
    pub fn set_description(&self, description: impl Into<String>) {
        *self.inner.description.borrow_mut() = Some(description.into());
    }

    /// CRC32 over the visible key/value content.
    pub fn fingerprint(&self) -> Result<u32, TransactionError> {
        self.inner.read(Root::fingerprint)
    }

    /// Run `f` against the visible version.
    pub fn inspect<R>(&self, f: impl FnOnce(&Root) -> R) -> Result<R, TransactionError> {
        self.inner.read(f)
    }

    /// Publish the writable root, if any, and end the transaction.
    ///
    /// Committing a transaction that never wrote just ends it.
    pub fn commit(self) -> Result<(), TransactionError> {
        let state = self.inner.root.replace(TxnRoot::Finished);
        match state {
            TxnRoot::Writing(mut root) => {
                root.set_description(self.inner.description.borrow_mut().take());
                self.inner.db.publish(root)
            }
            TxnRoot::ReadOnly(_) | TxnRoot::Snapshot(_) => Ok(()),
            TxnRoot::Finished => Err(TransactionError::Finished),
        }
    }

    /// Discard all changes and end the transaction.
    pub fn abort(self) {
        self.inner.revert();
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.inner.revert();
    }
}

impl TxnInner {
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Root) -> R) -> Result<R, TransactionError> {
        match &*self.root.borrow() {
            TxnRoot::ReadOnly(root) | TxnRoot::Snapshot(root) => Ok(f(&**root)),
            TxnRoot::Writing(root) => Ok(f(root)),
            TxnRoot::Finished => Err(TransactionError::Finished),
        }
    }

    /// Run `f` against the writable root, claiming the write slot first.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Root) -> R) -> Result<R, TransactionError> {
        self.make_writable()?;
        match &mut *self.root.borrow_mut() {
            TxnRoot::Writing(root) => Ok(f(root)),
            TxnRoot::ReadOnly(_) => Err(TransactionError::ReadOnly),
            TxnRoot::Snapshot(_) | TxnRoot::Finished => Err(TransactionError::Finished),
        }
    }

    /// Switch a snapshot transaction to writing.
    pub(crate) fn make_writable(&self) -> Result<(), TransactionError> {
        let mut state = self.root.borrow_mut();
        let base = match &*state {
            TxnRoot::Writing(_) => return Ok(()),
            TxnRoot::ReadOnly(_) => return Err(TransactionError::ReadOnly),
            TxnRoot::Finished => return Err(TransactionError::Finished),
            TxnRoot::Snapshot(base) => Arc::clone(base),
        };
        self.db.try_begin_write(&base)?;
        *state = TxnRoot::Writing(base.new_transaction_root());
        Ok(())
    }

    pub(crate) fn packed_key_limit(&self) -> usize {
        self.db.config().packed_key_limit()
    }

    fn revert(&self) {
        let state = self.root.replace(TxnRoot::Finished);
        if let TxnRoot::Writing(root) = state {
            tracing::debug!(
                transaction_id = root.transaction_id(),
                "transaction reverted"
            );
            drop(root);
            self.db.release_writer();
        }
    }

    pub(crate) fn register_cursor(&self, position: &Rc<RefCell<CursorPosition>>) {
        let mut cursors = self.cursors.borrow_mut();
        cursors.retain(|weak| weak.strong_count() > 0);
        cursors.push(Rc::downgrade(position));
    }

    /// Apply `notify` to every live cursor except `origin`.
    pub(crate) fn notify_others(
        &self,
        origin: &Rc<RefCell<CursorPosition>>,
        mut notify: impl FnMut(&mut CursorPosition),
    ) {
        let mut cursors = self.cursors.borrow_mut();
        cursors.retain(|weak| weak.strong_count() > 0);
        for other in cursors.iter().filter_map(Weak::upgrade) {
            if !Rc::ptr_eq(&other, origin) {
                notify(&mut other.borrow_mut());
            }
        }
    }

    pub(crate) fn is_iterating(&self) -> bool {
        self.iteration_depth.get() > 0
    }

    pub(crate) fn begin_iteration(&self) {
        self.iteration_depth.set(self.iteration_depth.get() + 1);
    }

    pub(crate) fn end_iteration(&self) {
        self.iteration_depth
            .set(self.iteration_depth.get().saturating_sub(1));
    }

    pub(crate) fn take_stack(&self) -> PathStack {
        self.stack_pool.borrow_mut().pop().unwrap_or_default()
    }

    pub(crate) fn return_stack(&self, mut stack: PathStack) {
        stack.clear();
        let mut pool = self.stack_pool.borrow_mut();
        if pool.len() < STACK_POOL_LIMIT {
            pool.push(stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(keys: &[&[u8]]) -> KeyValueDb {
        let db = KeyValueDb::new();
        let txn = db.try_start_writing_transaction().expect("writer");
        let mut cursor = txn.create_cursor();
        for key in keys {
            cursor.upsert(key, b"v").expect("upsert");
        }
        drop(cursor);
        txn.commit().expect("commit");
        db
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let db = seeded(&[b"a"]);
        let txn = db.start_read_only_transaction().expect("reader");
        assert!(txn.is_read_only());
        assert_eq!(txn.set_ulong(0, 1), Err(TransactionError::ReadOnly));
        let mut cursor = txn.create_cursor();
        assert!(cursor.upsert(b"b", b"v").is_err());
        assert_eq!(txn.key_value_count().expect("count"), 1);
    }

    #[test]
    fn test_snapshot_upgrades_on_first_write() {
        let db = seeded(&[b"a"]);
        let txn = db.start_transaction().expect("txn");
        assert!(!txn.is_writing());
        assert_eq!(txn.transaction_number().expect("number"), 1);
        txn.set_ulong(2, 9).expect("write");
        assert!(txn.is_writing());
        assert_eq!(txn.transaction_number().expect("number"), 2);
        txn.commit().expect("commit");
        let reader = db.start_read_only_transaction().expect("reader");
        assert_eq!(reader.ulong(2).expect("ulong"), 9);
    }

    #[test]
    fn test_stale_snapshot_conflicts() {
        let db = seeded(&[b"a"]);
        let stale = db.start_transaction().expect("txn");
        let writer = db.try_start_writing_transaction().expect("writer");
        writer.set_ulong(0, 1).expect("write");

        let error = stale.set_ulong(0, 2).expect_err("writer active");
        assert_eq!(error, TransactionError::Conflict(ConflictReason::WriterActive));

        writer.commit().expect("commit");
        let error = stale.set_ulong(0, 2).expect_err("snapshot is stale");
        assert_eq!(error, TransactionError::Conflict(ConflictReason::StaleSnapshot));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_drop_reverts_and_frees_slot() {
        let db = seeded(&[b"a"]);
        {
            let txn = db.try_start_writing_transaction().expect("writer");
            txn.create_cursor().upsert(b"b", b"v").expect("upsert");
        }
        assert_eq!(db.last_committed_transaction_id().expect("id"), 1);
        let txn = db.try_start_writing_transaction().expect("slot freed");
        assert_eq!(txn.key_value_count().expect("count"), 1);
    }

    #[test]
    fn test_abort_discards_changes() {
        let db = seeded(&[b"a"]);
        let txn = db.start_transaction().expect("txn");
        txn.create_cursor().upsert(b"b", b"v").expect("upsert");
        txn.abort();
        let reader = db.start_read_only_transaction().expect("reader");
        assert_eq!(reader.key_value_count().expect("count"), 1);
    }

    #[test]
    fn test_ulong_bounds() {
        let db = KeyValueDb::new();
        let txn = db.start_transaction().expect("txn");
        assert_eq!(
            txn.ulong(ULONG_SLOTS),
            Err(TransactionError::UlongIndexOutOfRange { index: ULONG_SLOTS })
        );
        assert_eq!(
            txn.set_ulong(ULONG_SLOTS, 1),
            Err(TransactionError::UlongIndexOutOfRange { index: ULONG_SLOTS })
        );
        // Rejected before claiming the write slot.
        assert!(!txn.is_writing());
    }

    #[test]
    fn test_description_is_published_with_commit() {
        let db = KeyValueDb::new();
        let txn = db.try_start_writing_transaction().expect("writer");
        txn.set_description("bulk import");
        assert_eq!(txn.description().as_deref(), Some("bulk import"));
        txn.commit().expect("commit");
        let reader = db.start_read_only_transaction().expect("reader");
        let label = reader
            .inspect(|root| root.description().map(str::to_string))
            .expect("inspect");
        assert_eq!(label.as_deref(), Some("bulk import"));
        assert_eq!(reader.description(), None);
    }

    #[test]
    fn test_fingerprint_matches_between_snapshots() {
        let db = seeded(&[b"a", b"b", b"c"]);
        let first = db.start_read_only_transaction().expect("reader");
        let second = db.start_transaction().expect("txn");
        assert_eq!(
            first.fingerprint().expect("fingerprint"),
            second.fingerprint().expect("fingerprint")
        );
        second.create_cursor().upsert(b"d", b"v").expect("upsert");
        assert_ne!(
            first.fingerprint().expect("fingerprint"),
            second.fingerprint().expect("fingerprint")
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            TransactionError::Conflict(ConflictReason::StaleSnapshot).to_string(),
            "write conflict: a newer version was committed"
        );
        assert_eq!(
            TransactionError::UlongIndexOutOfRange { index: 16 }.to_string(),
            "ulong index 16 out of range (max 15)"
        );
        assert!(TransactionError::ReadOnly.is_retryable());
        assert!(!TransactionError::Finished.is_retryable());
    }
}
