//! Key codecs for the epoch-ordered pool index.
//!
//! Index entries sort by `(expiration epoch, insertion sequence)`, both
//! big-endian, so a plain prefix scan visits candidates oldest first and
//! deterministically for a given pool state.

use opal_primitives::{LedgerError, TxHash};
use opal_storage::{ReadTransaction, WriteTransaction, prefix};

/// Position of a pool entry in the epoch index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexPos {
    pub epoch: u32,
    pub seq: u64,
}

impl IndexPos {
    pub(crate) fn suffix(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..4].copy_from_slice(&self.epoch.to_be_bytes());
        out[4..].copy_from_slice(&self.seq.to_be_bytes());
        out
    }

    pub(crate) fn key(&self) -> Vec<u8> {
        prefix::make_key(prefix::PENDING_TX_EPOCH, &self.suffix())
    }

    /// Parse a position back out of a full index key.
    pub(crate) fn from_key(key: &[u8]) -> Result<Self, LedgerError> {
        Self::from_suffix(key.get(2..).unwrap_or_default())
    }

    pub(crate) fn from_suffix(suffix: &[u8]) -> Result<Self, LedgerError> {
        if suffix.len() != 12 {
            return Err(LedgerError::Corrupt("pool index key malformed".into()));
        }
        let mut epoch = [0u8; 4];
        let mut seq = [0u8; 8];
        epoch.copy_from_slice(&suffix[..4]);
        seq.copy_from_slice(&suffix[4..]);
        Ok(Self { epoch: u32::from_be_bytes(epoch), seq: u64::from_be_bytes(seq) })
    }
}

pub(crate) fn decode_hash(raw: &[u8]) -> Result<TxHash, LedgerError> {
    raw.try_into()
        .map_err(|_| LedgerError::Corrupt("pool index value malformed".into()))
}

/// Allocate the next insertion sequence number.
pub(crate) fn next_seq(txn: &mut dyn WriteTransaction) -> Result<u64, LedgerError> {
    let next = match txn.get(prefix::PENDING_TX_SEQ)? {
        Some(raw) => {
            let bytes: [u8; 8] = raw
                .try_into()
                .map_err(|_| LedgerError::Corrupt("pool sequence counter malformed".into()))?;
            u64::from_be_bytes(bytes) + 1
        }
        None => 0,
    };
    txn.put(prefix::PENDING_TX_SEQ, &next.to_be_bytes())?;
    Ok(next)
}

pub(crate) fn entry_count(txn: &dyn ReadTransaction) -> Result<u64, LedgerError> {
    match txn.get(prefix::PENDING_TX_COUNT)? {
        Some(raw) => {
            let bytes: [u8; 8] = raw
                .try_into()
                .map_err(|_| LedgerError::Corrupt("pool entry count malformed".into()))?;
            Ok(u64::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub(crate) fn adjust_count(txn: &mut dyn WriteTransaction, delta: i64) -> Result<(), LedgerError> {
    let count = entry_count(&*txn)?;
    let updated = count
        .checked_add_signed(delta)
        .ok_or_else(|| LedgerError::Corrupt("pool entry count underflow".into()))?;
    txn.put(prefix::PENDING_TX_COUNT, &updated.to_be_bytes())?;
    Ok(())
}
