//! Transactional key-value storage abstraction for the opal ledger core.
//!
//! Every public operation of the state trie and the pending pool executes
//! synchronously inside one storage transaction supplied by the caller: the
//! ledger orchestrator opens a read or write transaction, threads it through
//! the components, and commits (or discards) it as a unit. Components never
//! open transactions themselves.
//!
//! The engine must provide snapshot isolation for read transactions and a
//! single writer at a time. [`MemoryDb`] is the in-process engine used by
//! tests and light deployments; persistent engines plug in by implementing
//! the two transaction traits.

mod memory;

pub use memory::MemoryDb;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by a storage engine. Always fatal to the enclosing call.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing engine failed (I/O, corruption of the engine itself).
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A record was present but structurally invalid.
    #[error("corrupt record under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Read surface of a storage transaction.
///
/// Reads observe a consistent snapshot for the lifetime of the transaction.
/// Entries whose TTL has elapsed are reported as absent.
pub trait ReadTransaction {
    /// Point lookup. `Ok(None)` means the key is not present (or expired).
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Iterate all live entries whose key starts with `prefix`, in ascending
    /// byte order of the full key.
    fn iter_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>>;
}

/// Write surface of a storage transaction.
///
/// Mutations become visible to this transaction's own reads immediately and
/// to other transactions only once the enclosing transaction commits.
pub trait WriteTransaction: ReadTransaction {
    /// Insert or overwrite an entry.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Insert or overwrite an entry that expires `ttl` after the commit.
    fn put_with_ttl(&mut self, key: &[u8], value: &[u8], ttl: std::time::Duration) -> Result<()>;

    /// Remove an entry. Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<()>;
}

/// Two-character ASCII key prefixes partitioning the shared store.
///
/// The layout is bit-exact persisted state: changing any constant is a
/// breaking change to existing databases.
pub mod prefix {
    /// UTXO trie nodes, keyed by node hash.
    pub const UTXO_TRIE: &[u8] = b"ut";
    /// Root of the trie as of the latest committed height.
    pub const CURRENT_STATE_ROOT: &[u8] = b"cs";
    /// Root pinned at the most recent epoch boundary.
    pub const PENDING_STATE_ROOT: &[u8] = b"ps";
    /// Root pinned one epoch boundary back; the rollback-safe anchor.
    pub const CANONICAL_STATE_ROOT: &[u8] = b"ks";
    /// Height -> root log. Suffix: big-endian u32 height.
    pub const TRIE_ROOT_FOR_HEIGHT: &[u8] = b"th";
    /// Pending transaction body. Suffix: tx hash.
    pub const PENDING_TX: &[u8] = b"pt";
    /// Cooldown tombstone blocking re-admission. Suffix: tx hash. TTL entry.
    pub const PENDING_TX_COOLDOWN: &[u8] = b"pc";
    /// Epoch-ordered pool index. Suffix: be32 epoch ++ be64 sequence.
    pub const PENDING_TX_EPOCH: &[u8] = b"pe";
    /// Reverse pool index. Suffix: tx hash.
    pub const PENDING_TX_EPOCH_REF: &[u8] = b"pr";
    /// Consumed-UTXO reservation. Suffix: utxo id.
    pub const PENDING_TX_RESERVATION: &[u8] = b"pv";
    /// Monotonic insertion sequence counter.
    pub const PENDING_TX_SEQ: &[u8] = b"pq";
    /// Live pool entry count.
    pub const PENDING_TX_COUNT: &[u8] = b"pn";
    /// Mined transaction body. Suffix: tx hash.
    pub const MINED_TX: &[u8] = b"mt";
    /// Mined height -> tx hash index. Suffix: be32 height ++ be32 ordinal.
    pub const MINED_TX_INDEX: &[u8] = b"mi";
    /// Mined tx hash -> height back-reference. Suffix: tx hash.
    pub const MINED_TX_INDEX_REF: &[u8] = b"mr";
    /// Mined UTXO body. Suffix: utxo id.
    pub const MINED_UTXO: &[u8] = b"mu";
    /// Deposit body (owned by the external deposit index).
    pub const DEPOSIT: &[u8] = b"dp";
    /// Deposit value index (owned by the external deposit index).
    pub const DEPOSIT_VALUE: &[u8] = b"dv";
    /// Deposit value back-reference (owned by the external deposit index).
    pub const DEPOSIT_VALUE_REF: &[u8] = b"dr";

    /// Concatenate a prefix and a suffix into a full storage key.
    pub fn make_key(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(prefix.len() + suffix.len());
        key.extend_from_slice(prefix);
        key.extend_from_slice(suffix);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_two_bytes_and_unique() {
        let all: &[&[u8]] = &[
            prefix::UTXO_TRIE,
            prefix::CURRENT_STATE_ROOT,
            prefix::PENDING_STATE_ROOT,
            prefix::CANONICAL_STATE_ROOT,
            prefix::TRIE_ROOT_FOR_HEIGHT,
            prefix::PENDING_TX,
            prefix::PENDING_TX_COOLDOWN,
            prefix::PENDING_TX_EPOCH,
            prefix::PENDING_TX_EPOCH_REF,
            prefix::PENDING_TX_RESERVATION,
            prefix::PENDING_TX_SEQ,
            prefix::PENDING_TX_COUNT,
            prefix::MINED_TX,
            prefix::MINED_TX_INDEX,
            prefix::MINED_TX_INDEX_REF,
            prefix::MINED_UTXO,
            prefix::DEPOSIT,
            prefix::DEPOSIT_VALUE,
            prefix::DEPOSIT_VALUE_REF,
        ];
        for p in all {
            assert_eq!(p.len(), 2);
            assert!(p.is_ascii());
        }
        let mut seen = std::collections::HashSet::new();
        for p in all {
            assert!(seen.insert(p.to_vec()), "duplicate prefix {p:?}");
        }
    }

    #[test]
    fn make_key_concatenates() {
        let key = prefix::make_key(prefix::PENDING_TX, &[0xaa, 0xbb]);
        assert_eq!(key, vec![b'p', b't', 0xaa, 0xbb]);
    }
}
