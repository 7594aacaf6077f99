use crate::{LedgerError, Transaction, TxHash, TxOut, UtxoId};
use opal_storage::{ReadTransaction, WriteTransaction};

/// Result of a deposit lookup, partitioned by liveness.
#[derive(Debug, Default)]
pub struct DepositLookup {
    /// Deposits that exist and are unspent, with their bodies.
    pub found: Vec<(UtxoId, TxOut)>,
    /// Ids unknown to the deposit index.
    pub missing: Vec<UtxoId>,
    /// Deposits already spent (present in the state trie).
    pub spent: Vec<UtxoId>,
}

/// Liveness and admission checks the pool consumes from the state trie.
pub trait UtxoLiveness {
    /// Of `ids`, return the subset absent from the current trie.
    fn missing_from_trie(
        &self,
        txn: &dyn ReadTransaction,
        ids: &[UtxoId],
    ) -> Result<Vec<UtxoId>, LedgerError>;

    /// Full batch-level admission of `txs` against the committed state at
    /// `current_height`. `deposits` resolves consumed deposit bodies.
    /// Returns the resolved bodies of every consumed UTXO on success.
    fn validate_batch(
        &self,
        txn: &dyn ReadTransaction,
        txs: &[Transaction],
        current_height: u32,
        deposits: &[(UtxoId, TxOut)],
    ) -> Result<Vec<TxOut>, LedgerError>;
}

/// Bridge-deposit side-index consumed by pool admission.
pub trait DepositIndex {
    /// Partition `ids` into found (with bodies), missing and spent.
    fn get(
        &self,
        txn: &dyn ReadTransaction,
        ids: &[UtxoId],
    ) -> Result<DepositLookup, LedgerError>;
}

/// Archive of confirmed transaction bodies.
pub trait MinedTxArchive {
    fn add(
        &self,
        txn: &mut dyn WriteTransaction,
        height: u32,
        txs: &[Transaction],
    ) -> Result<(), LedgerError>;

    /// Batch lookup; the second element is the missing subset.
    fn get(
        &self,
        txn: &dyn ReadTransaction,
        tx_hashes: &[TxHash],
    ) -> Result<(Vec<Transaction>, Vec<TxHash>), LedgerError>;

    fn height_for_tx(
        &self,
        txn: &dyn ReadTransaction,
        tx_hash: &TxHash,
    ) -> Result<Option<u32>, LedgerError>;
}
