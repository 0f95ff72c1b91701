//! In-memory multi-version key-value storage engine.
//!
//! Keys and values are byte strings kept in sorted order in a copy-on-write
//! B-tree. Every commit publishes a new immutable version; readers keep the
//! version they started on for as long as they hold it.
//!
//! # Layers
//!
//! - [`btree`]: nodes, roots, path stacks and structural validation
//! - [`KeyValueDb`]: the transaction manager (last committed root, write slot,
//!   FIFO writer queue)
//! - [`Transaction`]: one pinned version, read-only or writable
//! - [`Cursor`]: positioned, ordinal-aware access within a transaction
//!
//! # Usage
//!
//! ```
//! use kvtree::storage::KeyValueDb;
//!
//! let db = KeyValueDb::new();
//! let txn = db.try_start_writing_transaction()?;
//! let mut cursor = txn.create_cursor();
//! cursor.upsert(b"user/1", b"alice")?;
//! cursor.upsert(b"user/2", b"bob")?;
//! drop(cursor);
//! txn.commit()?;
//!
//! let reader = db.start_read_only_transaction()?;
//! let mut cursor = reader.create_cursor();
//! assert_eq!(cursor.key_value_count(b"user/")?, 2);
//! assert!(cursor.find_exact(b"user/2")?);
//! assert_eq!(&cursor.value()?[..], b"bob");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod btree;
mod cursor;
mod database;
mod transaction;

pub use btree::{FindResult, UpsertResult};
pub use cursor::{Cursor, CursorError};
pub use database::KeyValueDb;
pub use transaction::{ConflictReason, Transaction, TransactionError};
