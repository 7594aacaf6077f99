use crate::{roots, smt_err};
use codec::{Decode, Encode};
use opal_primitives::{
    EPOCH_LENGTH, LedgerError, Transaction, TxOut, UtxoId, UtxoLiveness,
};
use opal_smt::Session;
use opal_storage::{ReadTransaction, WriteTransaction, prefix};
use std::collections::{BTreeMap, HashMap, HashSet};

/// The UTXO state trie component.
///
/// Wraps the trie primitive with the ledger's semantics: presence of an
/// ordinary UTXO id means unspent, a consumed deposit is marked by inserting
/// its id, and every committed height appends to the root log. All methods
/// run inside a caller-supplied storage transaction.
pub struct UtxoHandler {
    chain_id: u32,
}

impl UtxoHandler {
    pub fn new(chain_id: u32) -> Self {
        Self { chain_id }
    }

    /// Resolve stored UTXO bodies. Returns the found bodies and the missing
    /// id subset.
    pub fn get(
        &self,
        txn: &dyn ReadTransaction,
        utxo_ids: &[UtxoId],
    ) -> Result<(Vec<TxOut>, Vec<UtxoId>), LedgerError> {
        let mut found = Vec::with_capacity(utxo_ids.len());
        let mut missing = Vec::new();
        for id in utxo_ids {
            match txn.get(&prefix::make_key(prefix::MINED_UTXO, id))? {
                Some(raw) => found.push(decode_txout(id, &raw)?),
                None => missing.push(*id),
            }
        }
        Ok((found, missing))
    }

    /// Of `utxo_ids`, the subset absent from the current trie.
    pub fn trie_missing(
        &self,
        txn: &dyn ReadTransaction,
        utxo_ids: &[UtxoId],
    ) -> Result<Vec<UtxoId>, LedgerError> {
        let root = roots::current_state_root(txn)?;
        let mut missing = Vec::new();
        for id in utxo_ids {
            if opal_smt::get(txn, root, id).map_err(smt_err)?.is_none() {
                missing.push(*id);
            }
        }
        Ok(missing)
    }

    /// Whether `utxo_id` is present in the current trie.
    pub fn trie_contains(
        &self,
        txn: &dyn ReadTransaction,
        utxo_id: &UtxoId,
    ) -> Result<bool, LedgerError> {
        let root = roots::current_state_root(txn)?;
        Ok(opal_smt::get(txn, root, utxo_id).map_err(smt_err)?.is_some())
    }

    /// Full batch admission against the committed state at `current_height`.
    ///
    /// Checks structure, issuance windows, batch-wide uniqueness of UTXO ids
    /// and DataStore indexes, the balance rule against resolved consumed
    /// bodies, and the trie liveness of every consumed and generated id.
    /// Returns the resolved consumed bodies on success.
    pub fn is_valid(
        &self,
        txn: &dyn ReadTransaction,
        txs: &[Transaction],
        current_height: u32,
        deposits: &[(UtxoId, TxOut)],
    ) -> Result<Vec<TxOut>, LedgerError> {
        let deposit_map: HashMap<UtxoId, &TxOut> =
            deposits.iter().map(|(id, out)| (*id, out)).collect();
        let mut seen_utxos = HashSet::new();
        let mut seen_indexes = HashSet::new();
        let mut all_consumed = Vec::new();
        let mut consumed_deposit_ids = Vec::new();
        let mut consumed_ordinary_ids = Vec::new();
        let mut generated_ids = Vec::new();

        for tx in txs {
            tx.pre_validate(self.chain_id)?;
            tx.validate_issued_at_for_mining(current_height)?;
            tx.validate_unique(&mut seen_utxos)?;
            tx.validate_datastore_indexes(&mut seen_indexes)?;

            let mut refs = Vec::with_capacity(tx.vin.len());
            for txin in &tx.vin {
                let id = txin.utxo_id();
                if txin.is_deposit() {
                    let body = deposit_map.get(&id).ok_or_else(|| {
                        LedgerError::Missing(format!("deposit {}", hex::encode(id)))
                    })?;
                    consumed_deposit_ids.push(id);
                    refs.push((*body).clone());
                } else {
                    let (mut found, missing) = self.get(txn, &[id])?;
                    if let Some(body) = found.pop() {
                        consumed_ordinary_ids.push(id);
                        refs.push(body);
                    } else {
                        return Err(LedgerError::Missing(format!(
                            "consumed utxo {}",
                            hex::encode(missing[0])
                        )));
                    }
                }
            }
            tx.validate_equal_vin_vout(current_height, &refs)?;
            generated_ids.extend(tx.generated_utxo_ids());
            all_consumed.extend(refs);
        }

        // Deposit spends flip absence to presence; an id already in the
        // trie is a double-spend.
        for id in &consumed_deposit_ids {
            if self.trie_contains(txn, id)? {
                return Err(LedgerError::Invalid(format!(
                    "deposit {} already spent",
                    hex::encode(id)
                )));
            }
        }
        for id in &generated_ids {
            if self.trie_contains(txn, id)? {
                return Err(LedgerError::Invalid(format!(
                    "generated utxo {} collides with existing state",
                    hex::encode(id)
                )));
            }
        }
        let gone = self.trie_missing(txn, &consumed_ordinary_ids)?;
        if let Some(id) = gone.first() {
            return Err(LedgerError::Missing(format!(
                "consumed utxo {} not in trie",
                hex::encode(id)
            )));
        }
        Ok(all_consumed)
    }

    /// Apply committed transactions at `height`: store generated bodies,
    /// update the trie in one sorted batch, log the new root and rotate the
    /// checkpoint roots at epoch boundaries.
    ///
    /// An empty `txs` performs only the height and rotation bookkeeping.
    pub fn apply_state(
        &self,
        txn: &mut dyn WriteTransaction,
        txs: &[Transaction],
        height: u32,
    ) -> Result<[u8; 32], LedgerError> {
        let current = roots::current_state_root(&*txn)?;
        let new_root = if txs.is_empty() {
            current
        } else {
            self.store_generated(txn, txs)?;
            let (keys, values) = compute_deltas(txs)?;
            let mut session = Session::new(current);
            session.update(&*txn, &keys, &values).map_err(smt_err)?;
            session.commit(txn).map_err(smt_err)?
        };
        self.update_roots(txn, height, &new_root)?;
        tracing::debug!(
            height,
            txs = txs.len(),
            root = %hex::encode(new_root),
            "applied state"
        );
        Ok(new_root)
    }

    /// Root the trie would have after applying `txs`, computed in a scratch
    /// session that is always discarded. Persists nothing.
    pub fn state_root_for_proposal(
        &self,
        txn: &dyn ReadTransaction,
        txs: &[Transaction],
    ) -> Result<[u8; 32], LedgerError> {
        let current = roots::current_state_root(txn)?;
        if txs.is_empty() {
            return Ok(current);
        }
        let (keys, values) = compute_deltas(txs)?;
        let mut session = Session::new(current);
        session.update(txn, &keys, &values).map_err(smt_err)
    }

    /// Ingest a trie node during fast sync; returns the child hashes still
    /// to fetch.
    pub fn store_snapshot_node(
        &self,
        txn: &mut dyn WriteTransaction,
        node_hash: [u8; 32],
        data: &[u8],
    ) -> Result<Vec<[u8; 32]>, LedgerError> {
        opal_smt::store_snapshot_node(txn, node_hash, data).map_err(smt_err)
    }

    /// Serve a trie node to a syncing peer.
    pub fn get_snapshot_node(
        &self,
        txn: &dyn ReadTransaction,
        node_hash: [u8; 32],
    ) -> Result<Vec<u8>, LedgerError> {
        opal_smt::get_snapshot_node(txn, node_hash).map_err(smt_err)
    }

    /// Ingest a full UTXO body during fast sync, verifying both the claimed
    /// id and the claimed preimage hash against the body itself.
    pub fn store_snapshot_state_data(
        &self,
        txn: &mut dyn WriteTransaction,
        utxo_id: UtxoId,
        pre_hash: [u8; 32],
        body: &TxOut,
    ) -> Result<(), LedgerError> {
        if body.utxo_id() != utxo_id {
            return Err(LedgerError::Invalid("snapshot utxo id mismatch".into()));
        }
        if body.pre_hash() != pre_hash {
            return Err(LedgerError::Invalid("snapshot preimage hash mismatch".into()));
        }
        Ok(txn.put(&prefix::make_key(prefix::MINED_UTXO, &utxo_id), &body.encode())?)
    }

    /// Conclude a fast sync: set Current = Pending = Canonical = `root` at
    /// `height`, bypassing `apply_state` entirely.
    pub fn finalize_snapshot_root(
        &self,
        txn: &mut dyn WriteTransaction,
        root: &[u8; 32],
        height: u32,
    ) -> Result<(), LedgerError> {
        roots::set_root_for_height(txn, height, root)?;
        roots::set_current_state_root(txn, root)?;
        roots::set_pending_state_root(txn, root)?;
        roots::set_canonical_state_root(txn, root)?;
        tracing::info!(height, root = %hex::encode(root), "finalized snapshot root");
        Ok(())
    }

    /// Drop all pending-pool and mined-index state ahead of a fast sync.
    pub fn begin_snapshot_sync(
        &self,
        txn: &mut dyn WriteTransaction,
    ) -> Result<(), LedgerError> {
        let doomed: &[&[u8]] = &[
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
        ];
        for p in doomed {
            let keys: Vec<Vec<u8>> = txn.iter_prefix(p)?.map(|(k, _)| k).collect();
            for key in keys {
                txn.delete(&key)?;
            }
        }
        Ok(())
    }

    fn store_generated(
        &self,
        txn: &mut dyn WriteTransaction,
        txs: &[Transaction],
    ) -> Result<(), LedgerError> {
        for tx in txs {
            for out in &tx.vout {
                let key = prefix::make_key(prefix::MINED_UTXO, &out.utxo_id());
                txn.put(&key, &out.encode())?;
            }
        }
        Ok(())
    }

    fn update_roots(
        &self,
        txn: &mut dyn WriteTransaction,
        height: u32,
        root: &[u8; 32],
    ) -> Result<(), LedgerError> {
        roots::set_root_for_height(txn, height, root)?;
        if height == 1 {
            roots::set_current_state_root(txn, root)?;
            roots::set_pending_state_root(txn, root)?;
            roots::set_canonical_state_root(txn, root)?;
            return Ok(());
        }
        roots::set_current_state_root(txn, root)?;
        if height % EPOCH_LENGTH == 0 {
            let pending = roots::pending_state_root(&*txn)?;
            roots::set_canonical_state_root(txn, &pending)?;
            roots::set_pending_state_root(txn, root)?;
        }
        Ok(())
    }
}

impl UtxoLiveness for UtxoHandler {
    fn missing_from_trie(
        &self,
        txn: &dyn ReadTransaction,
        ids: &[UtxoId],
    ) -> Result<Vec<UtxoId>, LedgerError> {
        self.trie_missing(txn, ids)
    }

    fn validate_batch(
        &self,
        txn: &dyn ReadTransaction,
        txs: &[Transaction],
        current_height: u32,
        deposits: &[(UtxoId, TxOut)],
    ) -> Result<Vec<TxOut>, LedgerError> {
        self.is_valid(txn, txs, current_height, deposits)
    }
}

/// Key/value deltas for a committed transaction set, sorted by key.
///
/// Consumed ordinary ids are tombstoned with the default leaf, consumed
/// deposit ids are inserted with the consuming input's preimage hash, and
/// generated ids are inserted with their output's preimage hash.
fn compute_deltas(
    txs: &[Transaction],
) -> Result<(Vec<[u8; 32]>, Vec<[u8; 32]>), LedgerError> {
    let mut deltas: BTreeMap<UtxoId, [u8; 32]> = BTreeMap::new();
    for tx in txs {
        for txin in &tx.vin {
            let value = if txin.is_deposit() {
                txin.pre_hash()
            } else {
                opal_smt::DEFAULT_LEAF
            };
            if deltas.insert(txin.utxo_id(), value).is_some() {
                return Err(LedgerError::Corrupt("duplicate utxo id in state delta".into()));
            }
        }
        for out in &tx.vout {
            if deltas.insert(out.utxo_id(), out.pre_hash()).is_some() {
                return Err(LedgerError::Corrupt("duplicate utxo id in state delta".into()));
            }
        }
    }
    Ok(deltas.into_iter().unzip())
}

fn decode_txout(id: &UtxoId, raw: &[u8]) -> Result<TxOut, LedgerError> {
    TxOut::decode(&mut &raw[..]).map_err(|e| {
        LedgerError::Corrupt(format!("utxo body {} undecodable: {e}", hex::encode(id)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_primitives::{Curve, Owner, TxIn, Uint256, ValueStore, deposit_utxo_id, DEPOSIT_TX_IDX};
    use opal_storage::MemoryDb;

    const CHAIN: u32 = 1;

    fn owner() -> Owner {
        Owner::new(Curve::Secp256k1, [1u8; 20])
    }

    fn value_out(value: u64, fee: u64) -> TxOut {
        TxOut::Value(ValueStore {
            chain_id: CHAIN,
            value: Uint256::from_u64(value),
            fee: Uint256::from_u64(fee),
            owner: owner(),
            tx_hash: [0u8; 32],
            tx_out_idx: 0,
        })
    }

    fn deposit_body(nonce: &[u8], value: u64) -> (UtxoId, TxOut) {
        let vs = ValueStore::new_deposit(CHAIN, Uint256::from_u64(value), owner(), nonce);
        let out = TxOut::Value(vs);
        (out.utxo_id(), out)
    }

    fn spend_deposit(nonce: &[u8], outputs: Vec<TxOut>) -> Transaction {
        let vin = vec![TxIn {
            chain_id: CHAIN,
            consumed_tx_hash: deposit_utxo_id(nonce),
            consumed_tx_idx: DEPOSIT_TX_IDX,
            signature: vec![0xaa; 65],
        }];
        Transaction::new(CHAIN, Uint256::ZERO, vin, outputs)
    }

    fn spend_output(parent: &TxOut, outputs: Vec<TxOut>) -> Transaction {
        let vin = vec![TxIn {
            chain_id: CHAIN,
            consumed_tx_hash: *parent.tx_hash(),
            consumed_tx_idx: parent.tx_out_idx(),
            signature: vec![0xbb; 65],
        }];
        Transaction::new(CHAIN, Uint256::ZERO, vin, outputs)
    }

    #[test]
    fn deposit_spend_flips_absence_to_presence() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let (dep_id, dep_body) = deposit_body(b"genesis-deposit", 100);
        let t1 = spend_deposit(b"genesis-deposit", vec![value_out(100, 0)]);

        db.view::<_, LedgerError>(|txn| {
            assert!(!handler.trie_contains(txn, &dep_id)?);
            handler.is_valid(txn, std::slice::from_ref(&t1), 1, &[(dep_id, dep_body.clone())])?;
            Ok(())
        })
        .unwrap();

        db.update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t1), 1))
            .unwrap();

        db.view::<_, LedgerError>(|txn| {
            assert!(handler.trie_contains(txn, &dep_id)?);
            let u1 = t1.vout[0].utxo_id();
            assert!(handler.trie_contains(txn, &u1)?);
            let (found, missing) = handler.get(txn, &[u1])?;
            assert_eq!(found, vec![t1.vout[0].clone()]);
            assert!(missing.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn spent_deposit_is_rejected() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let (dep_id, dep_body) = deposit_body(b"d", 50);
        let t1 = spend_deposit(b"d", vec![value_out(50, 0)]);
        db.update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t1), 1))
            .unwrap();

        // A second spend of the same deposit fails admission.
        let t2 = spend_deposit(b"d", vec![value_out(49, 1)]);
        let res = db.view::<_, LedgerError>(|txn| {
            handler.is_valid(txn, std::slice::from_ref(&t2), 2, &[(dep_id, dep_body)])
        });
        assert!(matches!(res, Err(LedgerError::Invalid(_))));
    }

    #[test]
    fn missing_consumed_utxo_is_reported_distinctly() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let phantom = value_out(10, 0);
        let mut phantom = phantom;
        phantom.set_tx_hash([0x55; 32]);
        let tx = spend_output(&phantom, vec![value_out(10, 0)]);
        let res = db.view::<_, LedgerError>(|txn| handler.is_valid(txn, &[tx], 1, &[]));
        assert!(matches!(res, Err(LedgerError::Missing(_))));
    }

    #[test]
    fn ordinary_spend_tombstones_consumed_id() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let (dep_id, dep_body) = deposit_body(b"d", 80);
        let t1 = spend_deposit(b"d", vec![value_out(80, 0)]);
        db.update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t1), 1))
            .unwrap();

        let u1 = t1.vout[0].clone();
        let t2 = spend_output(&u1, vec![value_out(80, 0)]);
        db.view::<_, LedgerError>(|txn| {
            handler.is_valid(txn, std::slice::from_ref(&t2), 2, &[])?;
            Ok(())
        })
        .unwrap();
        db.update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t2), 2))
            .unwrap();

        db.view::<_, LedgerError>(|txn| {
            assert!(!handler.trie_contains(txn, &u1.utxo_id())?);
            assert!(handler.trie_contains(txn, &t2.vout[0].utxo_id())?);
            // The deposit stays marked spent.
            assert!(handler.trie_contains(txn, &dep_id)?);
            let _ = dep_body;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn empty_apply_reuses_root_but_logs_height() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let t1 = spend_deposit(b"d", vec![value_out(10, 0)]);
        let r1 = db
            .update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t1), 1))
            .unwrap();
        let r2 = db
            .update::<_, LedgerError>(|txn| handler.apply_state(txn, &[], 2))
            .unwrap();
        assert_eq!(r1, r2);
        db.view::<_, LedgerError>(|txn| {
            assert_eq!(root_for_height_pair(txn)?, (Some(r1), Some(r1)));
            Ok(())
        })
        .unwrap();
    }

    fn root_for_height_pair(
        txn: &dyn ReadTransaction,
    ) -> Result<(Option<[u8; 32]>, Option<[u8; 32]>), LedgerError> {
        Ok((roots::root_for_height(txn, 1)?, roots::root_for_height(txn, 2)?))
    }

    #[test]
    fn bootstrap_sets_all_three_roots() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let t1 = spend_deposit(b"d", vec![value_out(10, 0)]);
        let r1 = db
            .update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t1), 1))
            .unwrap();
        db.view::<_, LedgerError>(|txn| {
            assert_eq!(roots::current_state_root(txn)?, r1);
            assert_eq!(roots::pending_state_root(txn)?, r1);
            assert_eq!(roots::canonical_state_root(txn)?, r1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn epoch_boundary_rotates_checkpoints() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let t1 = spend_deposit(b"d1", vec![value_out(10, 0)]);
        let r1 = db
            .update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t1), 1))
            .unwrap();

        // Mid-epoch heights leave the checkpoint pair alone.
        let t2 = spend_deposit(b"d2", vec![value_out(11, 0)]);
        db.update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t2), 2))
            .unwrap();
        let pending_before = db
            .view::<_, LedgerError>(|txn| roots::pending_state_root(txn))
            .unwrap();
        assert_eq!(pending_before, r1);

        // Scenario: mining at the boundary promotes Pending to Canonical.
        let t3 = spend_deposit(b"d3", vec![value_out(12, 0)]);
        let r1024 = db
            .update::<_, LedgerError>(|txn| {
                handler.apply_state(txn, std::slice::from_ref(&t3), EPOCH_LENGTH)
            })
            .unwrap();
        db.view::<_, LedgerError>(|txn| {
            assert_eq!(roots::current_state_root(txn)?, r1024);
            assert_eq!(roots::pending_state_root(txn)?, r1024);
            assert_eq!(roots::canonical_state_root(txn)?, pending_before);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn proposal_root_never_persists() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let t1 = spend_deposit(b"d", vec![value_out(10, 0)]);
        let r1 = db
            .update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t1), 1))
            .unwrap();

        let u1 = t1.vout[0].clone();
        let t2 = spend_output(&u1, vec![value_out(10, 0)]);
        let speculative = db
            .view::<_, LedgerError>(|txn| {
                handler.state_root_for_proposal(txn, std::slice::from_ref(&t2))
            })
            .unwrap();
        assert_ne!(speculative, r1);

        // The committed state is untouched.
        db.view::<_, LedgerError>(|txn| {
            assert_eq!(roots::current_state_root(txn)?, r1);
            assert!(handler.trie_contains(txn, &u1.utxo_id())?);
            Ok(())
        })
        .unwrap();

        // Actually applying yields the speculative root.
        let committed = db
            .update::<_, LedgerError>(|txn| handler.apply_state(txn, std::slice::from_ref(&t2), 2))
            .unwrap();
        assert_eq!(committed, speculative);
    }

    #[test]
    fn double_spend_within_batch_is_invalid() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let (dep_id, dep_body) = deposit_body(b"d", 20);
        let a = spend_deposit(b"d", vec![value_out(20, 0)]);
        let b = spend_deposit(b"d", vec![value_out(19, 1)]);
        let res = db.view::<_, LedgerError>(|txn| {
            handler.is_valid(txn, &[a, b], 1, &[(dep_id, dep_body)])
        });
        assert!(matches!(res, Err(LedgerError::Invalid(_))));
    }

    #[test]
    fn snapshot_finalize_bypasses_apply() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let root = [0x42; 32];
        db.update::<_, LedgerError>(|txn| handler.finalize_snapshot_root(txn, &root, 5000))
            .unwrap();
        db.view::<_, LedgerError>(|txn| {
            assert_eq!(roots::current_state_root(txn)?, root);
            assert_eq!(roots::pending_state_root(txn)?, root);
            assert_eq!(roots::canonical_state_root(txn)?, root);
            assert_eq!(roots::root_for_height(txn, 5000)?, Some(root));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn snapshot_state_data_is_verified() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        let t1 = spend_deposit(b"d", vec![value_out(10, 0)]);
        let body = t1.vout[0].clone();
        let id = body.utxo_id();
        let pre = body.pre_hash();

        db.update::<_, LedgerError>(|txn| {
            // Wrong id and wrong preimage hash are both rejected.
            assert!(handler
                .store_snapshot_state_data(txn, [0u8; 32], pre, &body)
                .is_err());
            assert!(handler
                .store_snapshot_state_data(txn, id, [0u8; 32], &body)
                .is_err());
            handler.store_snapshot_state_data(txn, id, pre, &body)
        })
        .unwrap();

        db.view::<_, LedgerError>(|txn| {
            let (found, _) = handler.get(txn, &[id])?;
            assert_eq!(found, vec![body.clone()]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn begin_snapshot_sync_drops_pool_and_mined_state() {
        let db = MemoryDb::new();
        let handler = UtxoHandler::new(CHAIN);
        db.update::<_, LedgerError>(|txn| {
            txn.put(&prefix::make_key(prefix::PENDING_TX, &[1u8; 32]), b"tx")?;
            txn.put(&prefix::make_key(prefix::MINED_UTXO, &[2u8; 32]), b"utxo")?;
            txn.put(prefix::CURRENT_STATE_ROOT, &[3u8; 32])?;
            Ok(())
        })
        .unwrap();
        db.update::<_, LedgerError>(|txn| handler.begin_snapshot_sync(txn)).unwrap();
        db.view::<_, LedgerError>(|txn| {
            assert!(txn.get(&prefix::make_key(prefix::PENDING_TX, &[1u8; 32]))?.is_none());
            assert!(txn.get(&prefix::make_key(prefix::MINED_UTXO, &[2u8; 32]))?.is_none());
            // Roots survive; FinalizeSnapShotRoot replaces them later.
            assert!(txn.get(prefix::CURRENT_STATE_ROOT)?.is_some());
            Ok(())
        })
        .unwrap();
    }
}
