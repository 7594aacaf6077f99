use crate::{
    DEPOSIT_TX_IDX, LedgerError, TxHash, TxOut, Uint256, UtxoId, epoch_of_height, hash, utxo_id,
};
use codec::{Decode, Encode};
use std::collections::HashSet;

/// Transaction input referencing a previously created output.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TxIn {
    pub chain_id: u32,
    pub consumed_tx_hash: TxHash,
    pub consumed_tx_idx: u32,
    pub signature: Vec<u8>,
}

impl TxIn {
    /// Deposits carry the sentinel index; their consumed hash is the deposit
    /// UTXO id itself.
    pub fn is_deposit(&self) -> bool {
        self.consumed_tx_idx == DEPOSIT_TX_IDX
    }

    pub fn utxo_id(&self) -> UtxoId {
        if self.is_deposit() {
            return self.consumed_tx_hash;
        }
        utxo_id(&self.consumed_tx_hash, self.consumed_tx_idx)
    }

    /// Hash of the input's preimage (signature excluded). Recorded as the
    /// trie leaf value when this input spends a deposit.
    pub fn pre_hash(&self) -> [u8; 32] {
        hash(&(self.chain_id, &self.consumed_tx_hash, self.consumed_tx_idx).encode())
    }
}

/// A ledger transaction: ordered inputs, ordered outputs, explicit fee and a
/// deterministic content hash over its canonical fields.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Transaction {
    pub chain_id: u32,
    pub fee: Uint256,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub tx_hash: TxHash,
}

impl Transaction {
    /// Build a sealed transaction: assigns output indices, computes the
    /// content hash and stamps it into every output.
    pub fn new(chain_id: u32, fee: Uint256, vin: Vec<TxIn>, mut vout: Vec<TxOut>) -> Self {
        for (idx, out) in vout.iter_mut().enumerate() {
            out.set_tx_out_idx(idx as u32);
        }
        let tx_hash = Self::compute_tx_hash(chain_id, &fee, &vin, &vout);
        for out in vout.iter_mut() {
            out.set_tx_hash(tx_hash);
        }
        Self { chain_id, fee, vin, vout, tx_hash }
    }

    /// Content hash over chain id, fee, consumed UTXO ids and output
    /// preimage hashes. Independent of signatures.
    pub fn compute_tx_hash(chain_id: u32, fee: &Uint256, vin: &[TxIn], vout: &[TxOut]) -> TxHash {
        let consumed: Vec<UtxoId> = vin.iter().map(TxIn::utxo_id).collect();
        let generated: Vec<[u8; 32]> = vout.iter().map(TxOut::pre_hash).collect();
        hash(&(chain_id, fee, consumed, generated).encode())
    }

    /// Recompute and compare the stored hash.
    pub fn validate_tx_hash(&self) -> Result<(), LedgerError> {
        let expected = Self::compute_tx_hash(self.chain_id, &self.fee, &self.vin, &self.vout);
        if expected != self.tx_hash {
            return Err(LedgerError::Invalid("transaction hash mismatch".into()));
        }
        for (idx, out) in self.vout.iter().enumerate() {
            if out.tx_hash() != &self.tx_hash || out.tx_out_idx() != idx as u32 {
                return Err(LedgerError::Invalid("output not linked to transaction".into()));
            }
        }
        Ok(())
    }

    pub fn consumed_utxo_ids(&self) -> Vec<UtxoId> {
        self.vin.iter().map(TxIn::utxo_id).collect()
    }

    pub fn consumed_is_deposit(&self) -> Vec<bool> {
        self.vin.iter().map(TxIn::is_deposit).collect()
    }

    pub fn generated_utxo_ids(&self) -> Vec<UtxoId> {
        self.vout.iter().map(TxOut::utxo_id).collect()
    }

    pub fn generated_pre_hashes(&self) -> Vec<[u8; 32]> {
        self.vout.iter().map(TxOut::pre_hash).collect()
    }

    /// Structural admission checks that need no ledger state.
    pub fn pre_validate(&self, chain_id: u32) -> Result<(), LedgerError> {
        if self.vin.is_empty() {
            return Err(LedgerError::Invalid("transaction has no inputs".into()));
        }
        if self.vout.is_empty() {
            return Err(LedgerError::Invalid("transaction has no outputs".into()));
        }
        if self.chain_id != chain_id {
            return Err(LedgerError::Invalid("wrong chain id".into()));
        }
        for txin in &self.vin {
            if txin.chain_id != chain_id {
                return Err(LedgerError::Invalid("input has wrong chain id".into()));
            }
        }
        for out in &self.vout {
            if out.chain_id() != chain_id {
                return Err(LedgerError::Invalid("output has wrong chain id".into()));
            }
            if let Some(ds) = out.data_store() {
                ds.validate_deposit()?;
            }
        }
        self.validate_tx_hash()
    }

    /// Folds this transaction's consumed and generated UTXO ids into `seen`,
    /// failing on any duplicate within the transaction or the batch.
    pub fn validate_unique(&self, seen: &mut HashSet<UtxoId>) -> Result<(), LedgerError> {
        for id in self.consumed_utxo_ids() {
            if !seen.insert(id) {
                return Err(LedgerError::Invalid("duplicate consumed utxo".into()));
            }
        }
        for id in self.generated_utxo_ids() {
            if !seen.insert(id) {
                return Err(LedgerError::Invalid("duplicate generated utxo".into()));
            }
        }
        Ok(())
    }

    /// Folds every generated DataStore's `(owner, index)` hash into `seen`,
    /// failing on a duplicate.
    pub fn validate_datastore_indexes(
        &self,
        seen: &mut HashSet<[u8; 32]>,
    ) -> Result<(), LedgerError> {
        for out in &self.vout {
            let Some(ds) = out.data_store() else { continue };
            let mut buf = Vec::with_capacity(21 + 32);
            buf.extend_from_slice(&out.owner().canonical_bytes());
            buf.extend_from_slice(&ds.index);
            if !seen.insert(hash(&buf)) {
                return Err(LedgerError::Invalid("duplicate datastore index".into()));
            }
        }
        Ok(())
    }

    /// First height at which this transaction may mine, from its outputs'
    /// issuance constraints.
    pub fn cannot_be_mined_until(&self) -> u32 {
        self.vout
            .iter()
            .map(TxOut::cannot_be_mined_before_height)
            .max()
            .unwrap_or(1)
    }

    fn issued_at_bound(&self) -> Result<Option<u32>, LedgerError> {
        let mut bound = None;
        for out in &self.vout {
            let mbh = out.must_be_mined_before_height();
            if mbh == u32::MAX {
                continue;
            }
            match bound {
                None => bound = Some(mbh),
                Some(existing) if existing == mbh => {}
                Some(_) => {
                    return Err(LedgerError::Invalid("conflicting issued-at epochs".into()));
                }
            }
        }
        Ok(bound)
    }

    /// DataStore-bearing transactions only mine inside their issuance epoch.
    pub fn validate_issued_at_for_mining(&self, current_height: u32) -> Result<(), LedgerError> {
        let Some(mbh) = self.issued_at_bound()? else {
            return Ok(());
        };
        if epoch_of_height(mbh) != epoch_of_height(current_height) {
            return Err(LedgerError::Invalid("mining out of issuance epoch".into()));
        }
        Ok(())
    }

    /// Pool expiration epoch: the issuance epoch if any output pins one,
    /// otherwise never.
    pub fn epoch_of_expiration_for_mining(&self) -> Result<u32, LedgerError> {
        match self.issued_at_bound()? {
            Some(mbh) => Ok(epoch_of_height(mbh)),
            None => Ok(u32::MAX),
        }
    }

    /// Balance rule: consumed remaining value equals generated value plus
    /// all fees. `ref_utxos` are the resolved bodies of the consumed UTXOs,
    /// in any order.
    pub fn validate_equal_vin_vout(
        &self,
        current_height: u32,
        ref_utxos: &[TxOut],
    ) -> Result<(), LedgerError> {
        if self.vin.is_empty() || self.vout.is_empty() {
            return Err(LedgerError::Invalid("transaction not initialized".into()));
        }
        // Deposit decay is evaluated at the earliest height the transaction
        // can actually mine.
        let height = current_height.max(self.cannot_be_mined_until());
        let mut value_in = Uint256::ZERO;
        for utxo in ref_utxos {
            value_in = value_in.checked_add(&utxo.remaining_value(height)?)?;
        }
        let mut value_out = self.fee;
        for out in &self.vout {
            value_out = value_out.checked_add(&out.value_plus_fee()?)?;
        }
        if value_in != value_out {
            return Err(LedgerError::Invalid(format!(
                "input value {value_in} does not match output value plus fees {value_out}"
            )));
        }
        Ok(())
    }
}
