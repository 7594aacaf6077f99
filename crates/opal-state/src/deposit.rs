use crate::{roots, smt_err};
use codec::{Decode, Encode};
use opal_primitives::{
    DepositIndex, DepositLookup, LedgerError, Owner, TxOut, Uint256, UtxoId, ValueStore,
    deposit_utxo_id,
};
use opal_storage::{ReadTransaction, WriteTransaction, prefix};

/// Bridge-deposit side-index.
///
/// Deposit bodies are stored under their nonce-hash id; an owner/value index
/// supports funding queries. A deposit's unspent status is inverted relative
/// to ordinary UTXOs: it is unspent while its id is absent from the trie.
pub struct DepositHandler {
    chain_id: u32,
}

impl DepositHandler {
    pub fn new(chain_id: u32) -> Self {
        Self { chain_id }
    }

    /// Record a value bridged in under `nonce`. Returns the deposit's id.
    pub fn add(
        &self,
        txn: &mut dyn WriteTransaction,
        nonce: &[u8],
        value: Uint256,
        owner: Owner,
    ) -> Result<UtxoId, LedgerError> {
        let body = TxOut::Value(ValueStore::new_deposit(self.chain_id, value, owner, nonce));
        let id = deposit_utxo_id(nonce);
        txn.put(&prefix::make_key(prefix::DEPOSIT, &id), &body.encode())?;

        // owner ++ value ++ id orders a per-owner scan by ascending value.
        let mut idx = Vec::with_capacity(21 + 32 + 32);
        idx.extend_from_slice(&owner.canonical_bytes());
        idx.extend_from_slice(&value.to_be_bytes());
        idx.extend_from_slice(&id);
        txn.put(&prefix::make_key(prefix::DEPOSIT_VALUE, &idx), &id)?;
        txn.put(&prefix::make_key(prefix::DEPOSIT_VALUE_REF, &id), &idx)?;
        Ok(id)
    }

    /// Collect unspent deposits of `owner`, smallest first, until their
    /// total reaches `min_value`. Returns the ids and the total gathered.
    pub fn value_for_owner(
        &self,
        txn: &dyn ReadTransaction,
        owner: &Owner,
        min_value: Uint256,
    ) -> Result<(Vec<UtxoId>, Uint256), LedgerError> {
        let root = roots::current_state_root(txn)?;
        let scan = prefix::make_key(prefix::DEPOSIT_VALUE, &owner.canonical_bytes());
        let mut ids = Vec::new();
        let mut total = Uint256::ZERO;
        for (key, value) in txn.iter_prefix(&scan)? {
            let id: UtxoId = value.try_into().map_err(|_| {
                LedgerError::Corrupt(format!("deposit index {} malformed", hex::encode(&key)))
            })?;
            if opal_smt::get(txn, root, &id).map_err(smt_err)?.is_some() {
                // Already spent.
                continue;
            }
            let body = self.body(txn, &id)?;
            total = total.checked_add(body.value())?;
            ids.push(id);
            if total >= min_value {
                break;
            }
        }
        Ok((ids, total))
    }

    fn body(&self, txn: &dyn ReadTransaction, id: &UtxoId) -> Result<TxOut, LedgerError> {
        let raw = txn
            .get(&prefix::make_key(prefix::DEPOSIT, id))?
            .ok_or_else(|| LedgerError::Missing(format!("deposit {}", hex::encode(id))))?;
        TxOut::decode(&mut &raw[..]).map_err(|e| {
            LedgerError::Corrupt(format!("deposit {} undecodable: {e}", hex::encode(id)))
        })
    }
}

impl DepositIndex for DepositHandler {
    fn get(
        &self,
        txn: &dyn ReadTransaction,
        ids: &[UtxoId],
    ) -> Result<DepositLookup, LedgerError> {
        let root = roots::current_state_root(txn)?;
        let mut lookup = DepositLookup::default();
        for id in ids {
            let Some(raw) = txn.get(&prefix::make_key(prefix::DEPOSIT, id))? else {
                lookup.missing.push(*id);
                continue;
            };
            if opal_smt::get(txn, root, id).map_err(smt_err)?.is_some() {
                lookup.spent.push(*id);
                continue;
            }
            let body = TxOut::decode(&mut &raw[..]).map_err(|e| {
                LedgerError::Corrupt(format!("deposit {} undecodable: {e}", hex::encode(id)))
            })?;
            lookup.found.push((*id, body));
        }
        Ok(lookup)
    }
}
