//! Leaf nodes.
//!
//! A leaf holds up to [`MAX_MEMBERS_IN_LEAF`] key-value members sorted by key.
//! Two key layouts share one API:
//!
//! - **Packed**: all keys live back to back in one byte blob and each member
//!   records a 16-bit `(offset, length)` into it. Valid while the blob fits the
//!   packed budget (at most 65535 bytes).
//! - **Spread**: each member owns its key bytes. A packed leaf is demoted to
//!   this layout when an insert would push its blob past the budget.
//!
//! # Invariants
//!
//! - Members are strictly increasing by key.
//! - In a packed leaf, member `i`'s key starts where member `i - 1`'s key ends,
//!   and the blob holds exactly the keys' bytes.

#![allow(clippy::cast_possible_truncation)]

use std::cmp::Ordering;
use std::sync::Arc;

use crate::storage::btree::node::{CreateOrUpdateCtx, InsertOutcome, Node};

/// Maximum number of members in a leaf before it splits.
pub const MAX_MEMBERS_IN_LEAF: usize = 30;

/// Largest key blob a packed leaf can address with 16-bit offsets.
pub const MAX_PACKED_KEY_BYTES: usize = u16::MAX as usize;

/// A member of a packed leaf: key slice coordinates plus the value.
#[derive(Debug, Clone)]
pub struct PackedMember {
    key_offset: u16,
    key_len: u16,
    value: Arc<[u8]>,
}

/// A member of a spread leaf.
#[derive(Debug, Clone)]
pub struct SpreadMember {
    key: Box<[u8]>,
    value: Arc<[u8]>,
}

/// Key layout of a leaf.
#[derive(Debug, Clone)]
pub enum LeafMembers {
    Packed {
        key_bytes: Vec<u8>,
        members: Vec<PackedMember>,
    },
    Spread(Vec<SpreadMember>),
}

/// A leaf node stamped with the transaction that created it.
#[derive(Debug, Clone)]
pub struct LeafNode {
    txn_id: u64,
    members: LeafMembers,
}

impl LeafNode {
    /// Build a leaf from sorted entries, packed if the keys fit `packed_key_limit`.
    pub fn from_entries<K: AsRef<[u8]>>(
        txn_id: u64,
        entries: Vec<(K, Arc<[u8]>)>,
        packed_key_limit: usize,
    ) -> Self {
        let total: usize = entries.iter().map(|(key, _)| key.as_ref().len()).sum();
        let members = if total <= packed_key_limit.min(MAX_PACKED_KEY_BYTES) {
            let mut key_bytes = Vec::with_capacity(total);
            let mut members = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let key = key.as_ref();
                members.push(PackedMember {
                    key_offset: key_bytes.len() as u16,
                    key_len: key.len() as u16,
                    value,
                });
                key_bytes.extend_from_slice(key);
            }
            LeafMembers::Packed { key_bytes, members }
        } else {
            LeafMembers::Spread(
                entries
                    .into_iter()
                    .map(|(key, value)| SpreadMember {
                        key: key.as_ref().into(),
                        value,
                    })
                    .collect(),
            )
        };
        Self { txn_id, members }
    }

    #[must_use]
    pub const fn txn_id(&self) -> u64 {
        self.txn_id
    }

    pub const fn set_txn_id(&mut self, txn_id: u64) {
        self.txn_id = txn_id;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.members {
            LeafMembers::Packed { members, .. } => members.len(),
            LeafMembers::Spread(members) => members.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the keys are stored in one shared blob.
    #[must_use]
    pub const fn is_packed(&self) -> bool {
        matches!(self.members, LeafMembers::Packed { .. })
    }

    /// Total bytes of all member keys.
    #[must_use]
    pub fn key_bytes_len(&self) -> usize {
        match &self.members {
            LeafMembers::Packed { key_bytes, .. } => key_bytes.len(),
            LeafMembers::Spread(members) => members.iter().map(|m| m.key.len()).sum(),
        }
    }

    /// Key of member `index`.
    #[must_use]
    pub fn key(&self, index: usize) -> &[u8] {
        match &self.members {
            LeafMembers::Packed { key_bytes, members } => {
                let member = &members[index];
                let start = usize::from(member.key_offset);
                &key_bytes[start..start + usize::from(member.key_len)]
            }
            LeafMembers::Spread(members) => &members[index].key,
        }
    }

    /// Value of member `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> &Arc<[u8]> {
        match &self.members {
            LeafMembers::Packed { members, .. } => &members[index].value,
            LeafMembers::Spread(members) => &members[index].value,
        }
    }

    /// Packed member coordinates, for structural validation.
    pub(crate) fn packed_layout(&self) -> Option<(&[u8], Vec<(usize, usize)>)> {
        match &self.members {
            LeafMembers::Packed { key_bytes, members } => Some((
                key_bytes,
                members
                    .iter()
                    .map(|m| (usize::from(m.key_offset), usize::from(m.key_len)))
                    .collect(),
            )),
            LeafMembers::Spread(_) => None,
        }
    }

    /// Binary search for `key`.
    ///
    /// Returns `Ok(index)` on an exact match, otherwise `Err(insertion_point)`.
    pub fn find(&self, key: &[u8]) -> Result<usize, usize> {
        match &self.members {
            LeafMembers::Packed { key_bytes, members } => members.binary_search_by(|m| {
                let start = usize::from(m.key_offset);
                key_bytes[start..start + usize::from(m.key_len)].cmp(key)
            }),
            LeafMembers::Spread(members) => members.binary_search_by(|m| m.key.as_ref().cmp(key)),
        }
    }

    /// Index of the last member whose key, truncated to the prefix length,
    /// sorts at or before `prefix`, provided it actually starts with `prefix`.
    pub fn find_last_with_prefix(&self, prefix: &[u8]) -> Option<usize> {
        let mut low = 0;
        let mut high = self.len();
        while low < high {
            let mid = low + (high - low) / 2;
            if compare_truncated(self.key(mid), prefix) == Ordering::Greater {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        let candidate = low.checked_sub(1)?;
        self.key(candidate).starts_with(prefix).then_some(candidate)
    }

    /// Insert or update `ctx.key`; splits in place when the leaf overflows.
    ///
    /// The caller must already have made this leaf writable for `ctx.txn_id`.
    pub(crate) fn create_or_update(&mut self, ctx: &mut CreateOrUpdateCtx<'_>) -> InsertOutcome {
        match self.find(ctx.key) {
            Ok(index) => {
                self.set_value(index, Arc::clone(&ctx.value));
                ctx.created = false;
                ctx.key_index += index as u64;
                InsertOutcome::Done
            }
            Err(index) => {
                ctx.demoted |=
                    self.insert(index, ctx.key, Arc::clone(&ctx.value), ctx.packed_key_limit);
                ctx.created = true;
                ctx.key_index += index as u64;
                if self.len() > MAX_MEMBERS_IN_LEAF {
                    let keep = self.len().div_ceil(2);
                    InsertOutcome::Split(Arc::new(Node::Leaf(
                        self.split_off(keep, ctx.packed_key_limit),
                    )))
                } else {
                    InsertOutcome::Done
                }
            }
        }
    }

    fn set_value(&mut self, index: usize, value: Arc<[u8]>) {
        match &mut self.members {
            LeafMembers::Packed { members, .. } => members[index].value = value,
            LeafMembers::Spread(members) => members[index].value = value,
        }
    }

    fn insert(
        &mut self,
        index: usize,
        key: &[u8],
        value: Arc<[u8]>,
        packed_key_limit: usize,
    ) -> bool {
        let demote = matches!(
            &self.members,
            LeafMembers::Packed { key_bytes, .. }
                if key_bytes.len() + key.len() > packed_key_limit.min(MAX_PACKED_KEY_BYTES)
        );
        if demote {
            self.demote();
        }
        match &mut self.members {
            LeafMembers::Packed { key_bytes, members } => {
                let at = members
                    .get(index)
                    .map_or(key_bytes.len(), |m| usize::from(m.key_offset));
                key_bytes.splice(at..at, key.iter().copied());
                members.insert(
                    index,
                    PackedMember {
                        key_offset: 0,
                        key_len: key.len() as u16,
                        value,
                    },
                );
                recompute_offsets(members);
            }
            LeafMembers::Spread(members) => members.insert(
                index,
                SpreadMember {
                    key: key.into(),
                    value,
                },
            ),
        }
        demote
    }

    /// Remove members `from..=to`.
    pub(crate) fn erase_range(&mut self, from: usize, to: usize) {
        match &mut self.members {
            LeafMembers::Packed { key_bytes, members } => {
                let start = usize::from(members[from].key_offset);
                let end = usize::from(members[to].key_offset) + usize::from(members[to].key_len);
                key_bytes.drain(start..end);
                members.drain(from..=to);
                recompute_offsets(members);
            }
            LeafMembers::Spread(members) => {
                members.drain(from..=to);
            }
        }
    }

    /// Convert a packed leaf to the spread layout. No-op for spread leaves.
    pub(crate) fn demote(&mut self) {
        if let LeafMembers::Packed { key_bytes, members } = &self.members {
            let spread = members
                .iter()
                .map(|m| {
                    let start = usize::from(m.key_offset);
                    SpreadMember {
                        key: key_bytes[start..start + usize::from(m.key_len)].into(),
                        value: Arc::clone(&m.value),
                    }
                })
                .collect();
            self.members = LeafMembers::Spread(spread);
        }
    }

    /// Move members `at..` into a new leaf with the same stamp.
    fn split_off(&mut self, at: usize, packed_key_limit: usize) -> Self {
        let right: Vec<(Vec<u8>, Arc<[u8]>)> = (at..self.len())
            .map(|i| (self.key(i).to_vec(), Arc::clone(self.value(i))))
            .collect();
        match &mut self.members {
            LeafMembers::Packed { key_bytes, members } => {
                key_bytes.truncate(usize::from(members[at].key_offset));
                members.truncate(at);
            }
            LeafMembers::Spread(members) => members.truncate(at),
        }
        Self::from_entries(self.txn_id, right, packed_key_limit)
    }
}

/// Lay the packed keys out again from offset zero, in member order.
fn recompute_offsets(members: &mut [PackedMember]) {
    let mut offset = 0u16;
    for member in members {
        member.key_offset = offset;
        offset += member.key_len;
    }
}

/// Compare only the first `min(len(key), len(prefix))` bytes.
pub fn compare_truncated(key: &[u8], prefix: &[u8]) -> Ordering {
    let len = key.len().min(prefix.len());
    key[..len].cmp(&prefix[..len])
}
