//! Cursors: positioned, ordinal-aware access to a transaction's keys.
//!
//! A cursor remembers where it is as an ordinal plus a cached path stack.
//! Any mutation in the transaction drops the cached stacks of the other
//! cursors and shifts their ordinals, so each cursor keeps pointing at the
//! same key (or, once that key is erased, at the gap it left). A stale
//! cursor rebuilds its stack from the ordinal on next use.
//!
//! # Invariants
//!
//! - A non-empty stack always points at the cursor's ordinal.
//! - A removed cursor has no current key; `find_next` lands on the key that
//!   followed the erased one and `find_previous` on the key before it.

use std::cell::{RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use crate::storage::btree::{CreateOrUpdateCtx, FindResult, PathStack, UpsertResult, stack};
use crate::storage::transaction::{TransactionError, TxnInner};

/// Error type for cursor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// The cursor has no current key.
    NotPositioned,
    /// A mutation was attempted while a cursor of the same transaction is
    /// inside [`Cursor::fast_iterate`].
    ModifiedDuringIteration,
    /// The other cursor belongs to a different transaction.
    ForeignCursor,
    /// Transaction-level failure.
    Transaction(TransactionError),
}

impl std::fmt::Display for CursorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPositioned => write!(f, "cursor is not positioned on a key"),
            Self::ModifiedDuringIteration => {
                write!(f, "transaction modified during fast iteration")
            }
            Self::ForeignCursor => write!(f, "cursor belongs to another transaction"),
            Self::Transaction(e) => write!(f, "transaction error: {e}"),
        }
    }
}

impl std::error::Error for CursorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transaction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransactionError> for CursorError {
    fn from(e: TransactionError) -> Self {
        Self::Transaction(e)
    }
}

/// Position state of a cursor, shared with its transaction for notifications.
///
/// An empty `stack` with `ordinal` set means the stack is stale.
#[derive(Debug, Default)]
pub(crate) struct CursorPosition {
    stack: PathStack,
    ordinal: Option<u64>,
    removed: bool,
}

impl CursorPosition {
    fn invalidate(&mut self) {
        self.stack.clear();
        self.ordinal = None;
        self.removed = false;
    }

    fn settle(&mut self, prefix: &[u8]) -> bool {
        let matches = stack::current_key(&self.stack).is_some_and(|key| key.starts_with(prefix));
        if matches {
            self.ordinal = Some(stack::calc_index(&self.stack));
            self.removed = false;
        } else {
            self.invalidate();
        }
        matches
    }

    /// Another cursor is about to mutate the tree.
    pub(crate) fn pre_notify_upsert(&mut self) {
        self.stack.clear();
    }

    /// A key was inserted at ordinal `at`.
    pub(crate) fn notify_insert(&mut self, at: u64) {
        if let Some(ordinal) = self.ordinal.as_mut() {
            if *ordinal >= at {
                *ordinal += 1;
            }
        }
    }

    /// Ordinals `first..=last` were erased.
    pub(crate) fn notify_remove(&mut self, first: u64, last: u64) {
        let Some(ordinal) = self.ordinal else {
            return;
        };
        if ordinal > last {
            self.ordinal = Some(ordinal - (last - first + 1));
        } else if ordinal >= first {
            self.ordinal = Some(first);
            self.removed = true;
        }
    }
}

struct IterationGuard<'a>(&'a TxnInner);

impl<'a> IterationGuard<'a> {
    fn new(txn: &'a TxnInner) -> Self {
        txn.begin_iteration();
        Self(txn)
    }
}

impl Drop for IterationGuard<'_> {
    fn drop(&mut self) {
        self.0.end_iteration();
    }
}

/// A cursor over one transaction.
pub struct Cursor {
    txn: Rc<TxnInner>,
    position: Rc<RefCell<CursorPosition>>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let position = self.position.borrow();
        f.debug_struct("Cursor")
            .field("ordinal", &position.ordinal)
            .field("removed", &position.removed)
            .finish_non_exhaustive()
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        let stack = std::mem::take(&mut self.position.borrow_mut().stack);
        self.txn.return_stack(stack);
    }
}

impl Cursor {
    pub(crate) fn new(txn: Rc<TxnInner>) -> Self {
        let position = Rc::new(RefCell::new(CursorPosition {
            stack: txn.take_stack(),
            ..CursorPosition::default()
        }));
        txn.register_cursor(&position);
        Self { txn, position }
    }

    /// Whether the cursor has a current key.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let position = self.position.borrow();
        position.ordinal.is_some() && !position.removed
    }

    pub fn invalidate(&mut self) {
        self.position.borrow_mut().invalidate();
    }

    /// Position on the first key starting with `prefix`.
    pub fn find_first(&mut self, prefix: &[u8]) -> Result<bool, CursorError> {
        let mut position = self.position.borrow_mut();
        let (found, _) = self
            .txn
            .read(|root| root.find_key(&mut position.stack, prefix, prefix.len()))?;
        if found == FindResult::NotFound {
            position.invalidate();
            return Ok(false);
        }
        Ok(position.settle(prefix))
    }

    /// Position on the last key starting with `prefix`.
    pub fn find_last(&mut self, prefix: &[u8]) -> Result<bool, CursorError> {
        let mut position = self.position.borrow_mut();
        let found = self.txn.read(|root| {
            root.find_last_with_prefix(prefix)
                .is_some_and(|last| root.fill_stack_by_index(&mut position.stack, last))
        })?;
        if !found {
            position.invalidate();
            return Ok(false);
        }
        Ok(position.settle(prefix))
    }

    /// Move to the next key starting with `prefix`.
    ///
    /// An unpositioned cursor moves to the first such key. Moving past the
    /// prefix or the last key invalidates the cursor.
    pub fn find_next(&mut self, prefix: &[u8]) -> Result<bool, CursorError> {
        self.step(prefix, true)
    }

    /// Move to the previous key starting with `prefix`.
    ///
    /// An unpositioned cursor moves to the last such key.
    pub fn find_previous(&mut self, prefix: &[u8]) -> Result<bool, CursorError> {
        self.step(prefix, false)
    }

    fn step(&mut self, prefix: &[u8], forward: bool) -> Result<bool, CursorError> {
        let mut position = self.position.borrow_mut();
        let Some(ordinal) = position.ordinal else {
            drop(position);
            return if forward {
                self.find_first(prefix)
            } else {
                self.find_last(prefix)
            };
        };
        let removed = position.removed;
        let moved = self.txn.read(|root| {
            if !removed && !position.stack.is_empty() {
                return if forward {
                    root.find_next_key(&mut position.stack)
                } else {
                    root.find_previous_key(&mut position.stack)
                };
            }
            let target = match (forward, removed) {
                (true, true) => Some(ordinal),
                (true, false) => ordinal.checked_add(1),
                (false, _) => ordinal.checked_sub(1),
            };
            target.is_some_and(|target| root.fill_stack_by_index(&mut position.stack, target))
        })?;
        if !moved {
            position.invalidate();
            return Ok(false);
        }
        Ok(position.settle(prefix))
    }

    /// Position exactly on `key`.
    pub fn find_exact(&mut self, key: &[u8]) -> Result<bool, CursorError> {
        if self.find(key, key.len())? == FindResult::Exact {
            return Ok(true);
        }
        self.invalidate();
        Ok(false)
    }

    /// Position on `key` or, failing that, on a neighbour sharing its first
    /// `prefix_len` bytes (the previous key preferred).
    pub fn find(&mut self, key: &[u8], prefix_len: usize) -> Result<FindResult, CursorError> {
        let mut position = self.position.borrow_mut();
        let (found, ordinal) = self
            .txn
            .read(|root| root.find_key(&mut position.stack, key, prefix_len))?;
        if found == FindResult::NotFound {
            position.invalidate();
        } else {
            position.ordinal = Some(ordinal);
            position.removed = false;
        }
        Ok(found)
    }

    /// Position on the key at `ordinal`.
    pub fn find_key_index(&mut self, ordinal: u64) -> Result<bool, CursorError> {
        let mut position = self.position.borrow_mut();
        let found = self
            .txn
            .read(|root| root.fill_stack_by_index(&mut position.stack, ordinal))?;
        if found {
            position.ordinal = Some(ordinal);
            position.removed = false;
        } else {
            position.invalidate();
        }
        Ok(found)
    }

    /// Ordinal of the current key.
    pub fn calc_index(&self) -> Result<u64, CursorError> {
        let position = self.positioned()?;
        Ok(stack::calc_index(&position.stack))
    }

    /// Copy of the current key.
    pub fn key(&self) -> Result<Vec<u8>, CursorError> {
        let position = self.positioned()?;
        stack::current_key(&position.stack)
            .map(<[u8]>::to_vec)
            .ok_or(CursorError::NotPositioned)
    }

    /// The current value, shared with the tree.
    pub fn value(&self) -> Result<Arc<[u8]>, CursorError> {
        let position = self.positioned()?;
        stack::current_value(&position.stack)
            .cloned()
            .ok_or(CursorError::NotPositioned)
    }

    /// Number of keys starting with `prefix`. Does not move the cursor.
    pub fn key_value_count(&self, prefix: &[u8]) -> Result<u64, CursorError> {
        Ok(self
            .prefix_span(prefix)?
            .map_or(0, |(first, last)| last - first + 1))
    }

    /// Insert `key` or replace its value, then position on it.
    pub fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<UpsertResult, CursorError> {
        self.begin_mutation()?;
        self.txn
            .notify_others(&self.position, CursorPosition::pre_notify_upsert);
        let mut position = self.position.borrow_mut();
        position.stack.clear();
        let packed_key_limit = self.txn.packed_key_limit();
        let (result, key_index) = self.txn.write(|root| {
            let mut ctx = CreateOrUpdateCtx::new(
                key,
                Arc::from(value),
                root.transaction_id(),
                packed_key_limit,
            );
            let result = root.create_or_update(&mut ctx);
            if ctx.demoted {
                tracing::debug!(
                    transaction_id = root.transaction_id(),
                    "leaf demoted to spread storage"
                );
            }
            (result, ctx.key_index)
        })?;
        if result == UpsertResult::Created {
            self.txn
                .notify_others(&self.position, |other| other.notify_insert(key_index));
        }
        position.ordinal = Some(key_index);
        position.removed = false;
        Ok(result)
    }

    /// Insert `key` only if it is absent; returns whether it was created.
    ///
    /// Either way the cursor ends up on `key`.
    pub fn create_key(&mut self, key: &[u8], value: &[u8]) -> Result<bool, CursorError> {
        if self.find_exact(key)? {
            return Ok(false);
        }
        Ok(self.upsert(key, value)? == UpsertResult::Created)
    }

    /// Replace the value of the current key.
    pub fn update_value(&mut self, value: &[u8]) -> Result<(), CursorError> {
        let key = self.key()?;
        self.upsert(&key, value)?;
        Ok(())
    }

    /// Erase the current key. The cursor is left on the gap it leaves.
    pub fn erase_current(&mut self) -> Result<(), CursorError> {
        let ordinal = self.current_ordinal()?;
        self.erase_span(ordinal, ordinal)?;
        Ok(())
    }

    /// Erase every key from this cursor up to and including `other`.
    ///
    /// Returns the number of keys erased; zero, with no effect, if `other`
    /// precedes this cursor.
    pub fn erase_up_to(&mut self, other: &Self) -> Result<u64, CursorError> {
        if !Rc::ptr_eq(&self.txn, &other.txn) {
            return Err(CursorError::ForeignCursor);
        }
        let first = self.current_ordinal()?;
        let last = other.current_ordinal()?;
        if last < first {
            return Ok(0);
        }
        self.erase_span(first, last)
    }

    /// Erase every key starting with `prefix`; returns how many were erased.
    pub fn erase_all(&mut self, prefix: &[u8]) -> Result<u64, CursorError> {
        match self.prefix_span(prefix)? {
            Some((first, last)) => self.erase_span(first, last),
            None => Ok(0),
        }
    }

    /// Visit keys starting with `prefix` from the current key onwards until
    /// `visit` returns false or the prefix is exhausted. An unpositioned
    /// cursor starts at the first such key, a removed one at the key that
    /// followed the erased one.
    ///
    /// The cursor is left on the last key visited. Mutating the transaction
    /// from `visit` fails with [`CursorError::ModifiedDuringIteration`].
    /// Returns the number of keys visited.
    pub fn fast_iterate<F>(&mut self, prefix: &[u8], mut visit: F) -> Result<u64, CursorError>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let removed = {
            let position = self.position.borrow();
            position.ordinal.is_some() && position.removed
        };
        let positioned = if removed {
            self.find_next(prefix)?
        } else {
            self.is_valid() || self.find_first(prefix)?
        };
        if !positioned {
            return Ok(0);
        }
        let mut path = std::mem::take(&mut self.positioned()?.stack);
        let guard = IterationGuard::new(&self.txn);
        let mut visited = 0;
        while let Some((key, value)) = stack::current_key(&path).zip(stack::current_value(&path)) {
            if !key.starts_with(prefix) {
                break;
            }
            visited += 1;
            if !visit(key, &value[..]) || !stack::move_next(&mut path) {
                break;
            }
            if !stack::current_key(&path).is_some_and(|key| key.starts_with(prefix)) {
                stack::move_previous(&mut path);
                break;
            }
        }
        drop(guard);

        let mut position = self.position.borrow_mut();
        position.ordinal = Some(stack::calc_index(&path));
        position.removed = false;
        position.stack = path;
        Ok(visited)
    }

    fn positioned(&self) -> Result<RefMut<'_, CursorPosition>, CursorError> {
        let mut position = self.position.borrow_mut();
        let ordinal = match position.ordinal {
            Some(ordinal) if !position.removed => ordinal,
            _ => return Err(CursorError::NotPositioned),
        };
        if position.stack.is_empty() {
            let found = self
                .txn
                .read(|root| root.fill_stack_by_index(&mut position.stack, ordinal))?;
            if !found {
                position.invalidate();
                return Err(CursorError::NotPositioned);
            }
        }
        Ok(position)
    }

    fn current_ordinal(&self) -> Result<u64, CursorError> {
        let position = self.position.borrow();
        match position.ordinal {
            Some(ordinal) if !position.removed => Ok(ordinal),
            _ => Err(CursorError::NotPositioned),
        }
    }

    fn prefix_span(&self, prefix: &[u8]) -> Result<Option<(u64, u64)>, CursorError> {
        let mut scratch = self.txn.take_stack();
        let span = self.txn.read(|root| {
            let (found, first) = root.find_key(&mut scratch, prefix, prefix.len());
            if found == FindResult::NotFound {
                return None;
            }
            root.find_last_with_prefix(prefix).map(|last| (first, last))
        });
        self.txn.return_stack(scratch);
        span.map_err(CursorError::from)
    }

    fn begin_mutation(&self) -> Result<(), CursorError> {
        if self.txn.is_iterating() {
            tracing::error!("mutation attempted during fast iteration");
            return Err(CursorError::ModifiedDuringIteration);
        }
        self.txn.make_writable()?;
        Ok(())
    }

    fn erase_span(&mut self, first: u64, last: u64) -> Result<u64, CursorError> {
        self.begin_mutation()?;
        self.txn.notify_others(&self.position, |other| {
            other.pre_notify_upsert();
            other.notify_remove(first, last);
        });
        let mut position = self.position.borrow_mut();
        position.stack.clear();
        let erased = self.txn.write(|root| {
            if first == last {
                root.erase_one(first)
            } else {
                root.erase_range(first, last)
            }
        })?;
        position.ordinal = Some(first);
        position.removed = true;
        Ok(erased)
    }
}
