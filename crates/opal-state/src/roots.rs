//! Persistence of the root triple and the height -> root log.

use opal_primitives::{HASH_LEN, LedgerError};
use opal_smt::EMPTY_ROOT;
use opal_storage::{ReadTransaction, WriteTransaction, prefix};

fn read_root(
    txn: &dyn ReadTransaction,
    key_prefix: &'static [u8],
) -> Result<[u8; 32], LedgerError> {
    match txn.get(key_prefix)? {
        None => Ok(EMPTY_ROOT),
        Some(raw) => decode_root(&raw),
    }
}

fn decode_root(raw: &[u8]) -> Result<[u8; 32], LedgerError> {
    if raw.len() != HASH_LEN {
        return Err(LedgerError::Corrupt("state root has wrong length".into()));
    }
    let mut root = [0u8; HASH_LEN];
    root.copy_from_slice(raw);
    Ok(root)
}

/// Root as of the latest committed height. `EMPTY_ROOT` before bootstrap.
pub fn current_state_root(txn: &dyn ReadTransaction) -> Result<[u8; 32], LedgerError> {
    read_root(txn, prefix::CURRENT_STATE_ROOT)
}

/// Root pinned at the most recent epoch boundary.
pub fn pending_state_root(txn: &dyn ReadTransaction) -> Result<[u8; 32], LedgerError> {
    read_root(txn, prefix::PENDING_STATE_ROOT)
}

/// Root pinned one epoch boundary back; the rollback-safe anchor.
pub fn canonical_state_root(txn: &dyn ReadTransaction) -> Result<[u8; 32], LedgerError> {
    read_root(txn, prefix::CANONICAL_STATE_ROOT)
}

pub(crate) fn set_current_state_root(
    txn: &mut dyn WriteTransaction,
    root: &[u8; 32],
) -> Result<(), LedgerError> {
    Ok(txn.put(prefix::CURRENT_STATE_ROOT, root)?)
}

pub(crate) fn set_pending_state_root(
    txn: &mut dyn WriteTransaction,
    root: &[u8; 32],
) -> Result<(), LedgerError> {
    Ok(txn.put(prefix::PENDING_STATE_ROOT, root)?)
}

pub(crate) fn set_canonical_state_root(
    txn: &mut dyn WriteTransaction,
    root: &[u8; 32],
) -> Result<(), LedgerError> {
    Ok(txn.put(prefix::CANONICAL_STATE_ROOT, root)?)
}

/// Root committed at `height`, if any.
pub fn root_for_height(
    txn: &dyn ReadTransaction,
    height: u32,
) -> Result<Option<[u8; 32]>, LedgerError> {
    let key = prefix::make_key(prefix::TRIE_ROOT_FOR_HEIGHT, &height.to_be_bytes());
    txn.get(&key)?.map(|raw| decode_root(&raw)).transpose()
}

pub(crate) fn set_root_for_height(
    txn: &mut dyn WriteTransaction,
    height: u32,
    root: &[u8; 32],
) -> Result<(), LedgerError> {
    let key = prefix::make_key(prefix::TRIE_ROOT_FOR_HEIGHT, &height.to_be_bytes());
    Ok(txn.put(&key, root)?)
}
