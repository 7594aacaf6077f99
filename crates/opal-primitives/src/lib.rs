//! Core data model of the opal ledger: transaction and output types, epoch
//! math, canonical hashing, the shared error taxonomy, and the narrow traits
//! the pool consumes from its collaborators.

mod error;
mod owner;
mod traits;
mod transaction;
mod txout;
mod uint256;

pub use error::LedgerError;
pub use owner::{Curve, Owner};
pub use traits::{DepositIndex, DepositLookup, MinedTxArchive, UtxoLiveness};
pub use transaction::{Transaction, TxIn};
pub use txout::{
    DataStore, TxOut, ValueStore, base_deposit_equation, num_epochs_equation,
    reward_deposit_equation,
};
pub use uint256::Uint256;

use sha2::{Digest, Sha256};

/// Length in bytes of every hash, UTXO id and trie key.
pub const HASH_LEN: usize = 32;

/// Number of block heights per epoch.
pub const EPOCH_LENGTH: u32 = 1024;

/// Largest issuance epoch whose mining window still fits in a u32 height.
pub const MAX_ISSUED_AT: u32 = u32::MAX / EPOCH_LENGTH;

/// Sentinel output index marking a consumed deposit.
pub const DEPOSIT_TX_IDX: u32 = u32::MAX;

/// Base size constant of the storage-rent equations.
pub const BASE_DATASIZE: u32 = 376;

/// Upper bound on DataStore raw data.
pub const MAX_DATA_STORE_SIZE: u32 = 2_097_152;

/// 32-byte content hash of a transaction.
pub type TxHash = [u8; HASH_LEN];

/// 32-byte deterministic identifier of a UTXO.
pub type UtxoId = [u8; HASH_LEN];

/// Epoch containing `height`. Epoch 1 spans heights `1..=EPOCH_LENGTH`; a
/// boundary height `k * EPOCH_LENGTH` closes epoch `k`.
pub fn epoch_of_height(height: u32) -> u32 {
    if height == 0 {
        return 0;
    }
    (height - 1) / EPOCH_LENGTH + 1
}

/// Canonical SHA-256 hasher.
pub fn hash(data: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// UTXO id of an ordinary output: `H(tx_hash ++ be32(idx))`.
pub fn utxo_id(tx_hash: &TxHash, tx_out_idx: u32) -> UtxoId {
    let mut buf = [0u8; HASH_LEN + 4];
    buf[..HASH_LEN].copy_from_slice(tx_hash);
    buf[HASH_LEN..].copy_from_slice(&tx_out_idx.to_be_bytes());
    hash(&buf)
}

/// UTXO id of a deposit: the hash of the bridge nonce.
pub fn deposit_utxo_id(nonce: &[u8]) -> UtxoId {
    hash(nonce)
}
