use codec::{Decode, Encode};
use opal_primitives::{LedgerError, MinedTxArchive, Transaction, TxHash};
use opal_storage::{ReadTransaction, WriteTransaction, prefix};

/// Archive of confirmed transaction bodies, indexed by hash and by the
/// `(height, ordinal)` position they were mined at.
pub struct MinedTxHandler;

impl MinedTxHandler {
    pub fn new() -> Self {
        Self
    }

    /// Transaction hashes mined at `height`, in block order.
    pub fn hashes_at_height(
        &self,
        txn: &dyn ReadTransaction,
        height: u32,
    ) -> Result<Vec<TxHash>, LedgerError> {
        let scan = prefix::make_key(prefix::MINED_TX_INDEX, &height.to_be_bytes());
        let mut hashes = Vec::new();
        for (key, value) in txn.iter_prefix(&scan)? {
            let hash: TxHash = value.try_into().map_err(|_| {
                LedgerError::Corrupt(format!("mined index entry {} malformed", hex::encode(key)))
            })?;
            hashes.push(hash);
        }
        Ok(hashes)
    }
}

impl Default for MinedTxHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MinedTxArchive for MinedTxHandler {
    fn add(
        &self,
        txn: &mut dyn WriteTransaction,
        height: u32,
        txs: &[Transaction],
    ) -> Result<(), LedgerError> {
        for (ordinal, tx) in txs.iter().enumerate() {
            txn.put(&prefix::make_key(prefix::MINED_TX, &tx.tx_hash), &tx.encode())?;
            let mut pos = Vec::with_capacity(8);
            pos.extend_from_slice(&height.to_be_bytes());
            pos.extend_from_slice(&(ordinal as u32).to_be_bytes());
            txn.put(&prefix::make_key(prefix::MINED_TX_INDEX, &pos), &tx.tx_hash)?;
            txn.put(&prefix::make_key(prefix::MINED_TX_INDEX_REF, &tx.tx_hash), &pos)?;
        }
        Ok(())
    }

    fn get(
        &self,
        txn: &dyn ReadTransaction,
        tx_hashes: &[TxHash],
    ) -> Result<(Vec<Transaction>, Vec<TxHash>), LedgerError> {
        let mut found = Vec::with_capacity(tx_hashes.len());
        let mut missing = Vec::new();
        for hash in tx_hashes {
            match txn.get(&prefix::make_key(prefix::MINED_TX, hash))? {
                Some(raw) => {
                    let tx = Transaction::decode(&mut &raw[..]).map_err(|e| {
                        LedgerError::Corrupt(format!(
                            "mined tx {} undecodable: {e}",
                            hex::encode(hash)
                        ))
                    })?;
                    found.push(tx);
                }
                None => missing.push(*hash),
            }
        }
        Ok((found, missing))
    }

    fn height_for_tx(
        &self,
        txn: &dyn ReadTransaction,
        tx_hash: &TxHash,
    ) -> Result<Option<u32>, LedgerError> {
        let Some(pos) = txn.get(&prefix::make_key(prefix::MINED_TX_INDEX_REF, tx_hash))? else {
            return Ok(None);
        };
        if pos.len() != 8 {
            return Err(LedgerError::Corrupt(format!(
                "mined index ref {} malformed",
                hex::encode(tx_hash)
            )));
        }
        let mut height = [0u8; 4];
        height.copy_from_slice(&pos[..4]);
        Ok(Some(u32::from_be_bytes(height)))
    }
}
