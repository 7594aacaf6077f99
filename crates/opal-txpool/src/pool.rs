use crate::index::{self, IndexPos};
use crate::{Deadline, PoolOptions};
use codec::{Decode, Encode};
use opal_primitives::{
    DepositIndex, HASH_LEN, LedgerError, Transaction, TxHash, TxOut, UtxoId, UtxoLiveness,
    epoch_of_height,
};
use opal_storage::{ReadTransaction, WriteTransaction, prefix};
use std::collections::HashSet;

/// Fixed byte cost charged per selected transaction.
pub const PROPOSAL_ENTRY_COST: u32 = HASH_LEN as u32;

/// Outcome of a proposal or gossip scan.
#[derive(Debug)]
pub struct ProposalBatch {
    /// Selected transactions, oldest expiration first.
    pub txs: Vec<Transaction>,
    /// Unused byte budget. Never negative.
    pub remaining_bytes: u32,
    /// Hashes whose entries failed their own liveness check; pass them to
    /// [`PendingTxPool::evict`] in a follow-up write transaction.
    pub to_evict: Vec<TxHash>,
}

/// The pending transaction pool.
///
/// Every method runs inside a caller-supplied storage transaction. The
/// caller serializes mutating calls; read-only scans may run concurrently
/// under snapshot isolation.
pub struct PendingTxPool<L, D> {
    options: PoolOptions,
    liveness: L,
    deposits: D,
}

impl<L: UtxoLiveness, D: DepositIndex> PendingTxPool<L, D> {
    pub fn new(options: PoolOptions, liveness: L, deposits: D) -> Self {
        Self { options, liveness, deposits }
    }

    /// Admit transactions. Each transaction is processed independently; the
    /// first failure aborts the call, and with it the caller's transaction,
    /// so callers wanting partial admission submit one at a time.
    pub fn add(
        &self,
        txn: &mut dyn WriteTransaction,
        txs: &[Transaction],
        current_height: u32,
    ) -> Result<(), LedgerError> {
        for tx in txs {
            self.add_one(txn, tx, current_height)?;
        }
        Ok(())
    }

    fn add_one(
        &self,
        txn: &mut dyn WriteTransaction,
        tx: &Transaction,
        current_height: u32,
    ) -> Result<(), LedgerError> {
        let hash = tx.tx_hash;
        tx.pre_validate(self.options.chain_id)?;
        tx.validate_tx_hash()?;
        if txn.get(&cooldown_key(&hash))?.is_some() {
            return Err(LedgerError::AlreadyMined);
        }
        if txn.get(&body_key(&hash))?.is_some() {
            // Already pooled.
            return Ok(());
        }
        let current_epoch = epoch_of_height(current_height);
        let exp_epoch = tx.epoch_of_expiration_for_mining()?;
        if exp_epoch < current_epoch {
            return Err(LedgerError::Expired(format!(
                "tx {} expired at epoch {exp_epoch}",
                hex::encode(hash)
            )));
        }
        self.check_valid(&*txn, std::slice::from_ref(tx), current_height)?;

        // Consumed-UTXO reservations: the earliest-admitted holder wins
        // unless it has already expired, in which case it is evicted.
        let consumed = tx.consumed_utxo_ids();
        for id in &consumed {
            let Some(holder) = self.reservation(&*txn, id)? else { continue };
            let holder_expired = match self.position(&*txn, &holder)? {
                Some(pos) => pos.epoch < current_epoch,
                None => true,
            };
            if !holder_expired {
                return Err(LedgerError::Invalid(format!(
                    "utxo {} reserved by pending tx {}",
                    hex::encode(id),
                    hex::encode(holder)
                )));
            }
            self.delete_one(txn, &holder)?;
        }

        if index::entry_count(&*txn)? >= self.options.max_entries {
            self.sweep_expired(txn, current_epoch, true)?;
            if index::entry_count(&*txn)? >= self.options.max_entries {
                return Err(LedgerError::Invalid("pool at capacity".into()));
            }
        }

        let pos = IndexPos { epoch: exp_epoch, seq: index::next_seq(txn)? };
        txn.put(&body_key(&hash), &tx.encode())?;
        txn.put(&pos.key(), &hash)?;
        txn.put(&ref_key(&hash), &pos.suffix())?;
        for id in &consumed {
            txn.put(&reservation_key(id), &hash)?;
        }
        index::adjust_count(txn, 1)?;
        tracing::debug!(
            tx = %hex::encode(hash),
            epoch = exp_epoch,
            seq = pos.seq,
            "admitted pending tx"
        );
        Ok(())
    }

    /// Full ledger admission: resolve consumed deposits, then run the state
    /// trie's batch validation.
    fn check_valid(
        &self,
        txn: &dyn ReadTransaction,
        txs: &[Transaction],
        current_height: u32,
    ) -> Result<Vec<TxOut>, LedgerError> {
        let mut deposit_ids: Vec<UtxoId> = Vec::new();
        for tx in txs {
            for txin in &tx.vin {
                if txin.is_deposit() {
                    deposit_ids.push(txin.utxo_id());
                }
            }
        }
        let lookup = self.deposits.get(txn, &deposit_ids)?;
        if let Some(id) = lookup.missing.first() {
            return Err(LedgerError::Missing(format!("deposit {}", hex::encode(id))));
        }
        if let Some(id) = lookup.spent.first() {
            return Err(LedgerError::Invalid(format!(
                "deposit {} already spent",
                hex::encode(id)
            )));
        }
        self.liveness.validate_batch(txn, txs, current_height, &lookup.found)
    }

    /// Unconditional hard removal. No cooldown is set.
    pub fn delete(
        &self,
        txn: &mut dyn WriteTransaction,
        tx_hashes: &[TxHash],
    ) -> Result<(), LedgerError> {
        for hash in tx_hashes {
            self.delete_one(txn, hash)?;
        }
        Ok(())
    }

    /// Remove just-mined hashes, tombstone each for the cooldown window,
    /// then sweep entries whose expiration epoch has passed. The sweep is
    /// bounded by `drop_queue_limit` per call; stragglers stay invisible
    /// through lazy expiry until a later block's sweep reaches them.
    ///
    /// Called once per committed block, after state application.
    pub fn delete_mined(
        &self,
        txn: &mut dyn WriteTransaction,
        current_height: u32,
        tx_hashes: &[TxHash],
    ) -> Result<(), LedgerError> {
        for hash in tx_hashes {
            txn.put_with_ttl(&cooldown_key(hash), &[], self.options.cooldown)?;
            self.delete_one(txn, hash)?;
        }
        let swept = self.sweep_expired(txn, epoch_of_height(current_height), true)?;
        if swept > 0 {
            tracing::debug!(height = current_height, swept, "swept expired pool entries");
        }
        Ok(())
    }

    /// Batch point lookup. Entries past their expiration epoch are reported
    /// missing even though still stored.
    pub fn get(
        &self,
        txn: &dyn ReadTransaction,
        current_height: u32,
        tx_hashes: &[TxHash],
    ) -> Result<(Vec<Transaction>, Vec<TxHash>), LedgerError> {
        let current_epoch = epoch_of_height(current_height);
        let mut found = Vec::with_capacity(tx_hashes.len());
        let mut missing = Vec::new();
        for hash in tx_hashes {
            let live = match self.position(txn, hash)? {
                Some(pos) => pos.epoch >= current_epoch,
                None => false,
            };
            if !live {
                missing.push(*hash);
                continue;
            }
            let raw = txn.get(&body_key(hash))?.ok_or_else(|| {
                LedgerError::Corrupt(format!("pool entry {} has no body", hex::encode(hash)))
            })?;
            found.push(decode_tx(hash, &raw)?);
        }
        Ok((found, missing))
    }

    /// Of `tx_hashes`, the subset not live in the pool.
    pub fn contains(
        &self,
        txn: &dyn ReadTransaction,
        current_height: u32,
        tx_hashes: &[TxHash],
    ) -> Result<Vec<TxHash>, LedgerError> {
        let (_, missing) = self.get(txn, current_height, tx_hashes)?;
        Ok(missing)
    }

    /// Build a pairwise-conflict-free, byte-bounded, deterministically
    /// ordered batch for a new block proposal.
    ///
    /// `seed` is treated as already selected: it is charged against the
    /// byte budget and its conflicts exclude candidates, but it is not
    /// returned in the batch.
    pub fn txs_for_proposal(
        &self,
        txn: &dyn ReadTransaction,
        current_height: u32,
        max_bytes: u32,
        seed: Option<&Transaction>,
        deadline: &Deadline,
    ) -> Result<ProposalBatch, LedgerError> {
        self.scan(txn, current_height, max_bytes, seed, deadline, true)
    }

    /// Same scan as a proposal but without mutual-exclusion checks; the
    /// result may contain transactions that conflict with each other.
    pub fn txs_for_gossip(
        &self,
        txn: &dyn ReadTransaction,
        current_height: u32,
        max_bytes: u32,
        deadline: &Deadline,
    ) -> Result<ProposalBatch, LedgerError> {
        self.scan(txn, current_height, max_bytes, None, deadline, false)
    }

    /// Follow-up removal of entries a scan found dead. No cooldown; a dead
    /// entry cannot re-validate anyway.
    pub fn evict(
        &self,
        txn: &mut dyn WriteTransaction,
        tx_hashes: &[TxHash],
    ) -> Result<(), LedgerError> {
        for hash in tx_hashes {
            self.delete_one(txn, hash)?;
        }
        Ok(())
    }

    /// Number of live pool entries.
    pub fn len(&self, txn: &dyn ReadTransaction) -> Result<u64, LedgerError> {
        index::entry_count(txn)
    }

    pub fn is_empty(&self, txn: &dyn ReadTransaction) -> Result<bool, LedgerError> {
        Ok(self.len(txn)? == 0)
    }

    fn scan(
        &self,
        txn: &dyn ReadTransaction,
        current_height: u32,
        max_bytes: u32,
        seed: Option<&Transaction>,
        deadline: &Deadline,
        mutually_exclusive: bool,
    ) -> Result<ProposalBatch, LedgerError> {
        let current_epoch = epoch_of_height(current_height);
        let mut remaining = max_bytes;
        let mut txs = Vec::new();
        let mut to_evict: Vec<TxHash> = Vec::new();
        let mut seen_hashes: HashSet<TxHash> = HashSet::new();
        let mut seen_utxos: HashSet<UtxoId> = HashSet::new();
        let mut seen_indexes: HashSet<[u8; 32]> = HashSet::new();

        if let Some(seed) = seed {
            seen_hashes.insert(seed.tx_hash);
            if mutually_exclusive {
                seed.validate_unique(&mut seen_utxos)?;
                seed.validate_datastore_indexes(&mut seen_indexes)?;
            }
            remaining = remaining.saturating_sub(PROPOSAL_ENTRY_COST);
        }

        for (key, value) in txn.iter_prefix(prefix::PENDING_TX_EPOCH)? {
            if deadline.expired() {
                break;
            }
            let pos = IndexPos::from_key(&key)?;
            let hash = index::decode_hash(&value)?;
            if pos.epoch < current_epoch {
                if to_evict.len() < self.options.drop_queue_limit {
                    to_evict.push(hash);
                }
                continue;
            }
            // Fixed per-entry cost, so the first over-budget candidate ends
            // the scan.
            if remaining < PROPOSAL_ENTRY_COST {
                break;
            }
            if seen_hashes.contains(&hash) {
                continue;
            }
            let Some(raw) = txn.get(&body_key(&hash))? else {
                if to_evict.len() < self.options.drop_queue_limit {
                    to_evict.push(hash);
                }
                continue;
            };
            let tx = decode_tx(&hash, &raw)?;
            match self.check_valid(txn, std::slice::from_ref(&tx), current_height) {
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(_) => {
                    if to_evict.len() < self.options.drop_queue_limit {
                        to_evict.push(hash);
                    }
                    continue;
                }
            }
            if mutually_exclusive {
                // Batch-level rejection drops the candidate, never the scan.
                let mut trial_utxos = seen_utxos.clone();
                let mut trial_indexes = seen_indexes.clone();
                if tx.validate_unique(&mut trial_utxos).is_err()
                    || tx.validate_datastore_indexes(&mut trial_indexes).is_err()
                {
                    continue;
                }
                seen_utxos = trial_utxos;
                seen_indexes = trial_indexes;
            }
            seen_hashes.insert(hash);
            remaining -= PROPOSAL_ENTRY_COST;
            txs.push(tx);
        }
        Ok(ProposalBatch { txs, remaining_bytes: remaining, to_evict })
    }

    /// Delete every entry whose expiration epoch is strictly before
    /// `current_epoch`, optionally tombstoning each hash. Returns the
    /// number of entries removed; at most `drop_queue_limit` per call.
    fn sweep_expired(
        &self,
        txn: &mut dyn WriteTransaction,
        current_epoch: u32,
        tombstone: bool,
    ) -> Result<usize, LedgerError> {
        let doomed = {
            let mut doomed = Vec::new();
            for (key, value) in txn.iter_prefix(prefix::PENDING_TX_EPOCH)? {
                let pos = IndexPos::from_key(&key)?;
                if pos.epoch >= current_epoch {
                    break;
                }
                doomed.push(index::decode_hash(&value)?);
                if doomed.len() >= self.options.drop_queue_limit {
                    break;
                }
            }
            doomed
        };
        for hash in &doomed {
            if tombstone {
                txn.put_with_ttl(&cooldown_key(hash), &[], self.options.cooldown)?;
            }
            self.delete_one(txn, hash)?;
        }
        Ok(doomed.len())
    }

    fn delete_one(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &TxHash,
    ) -> Result<bool, LedgerError> {
        let body_raw = txn.get(&body_key(hash))?;
        let pos_raw = txn.get(&ref_key(hash))?;
        if body_raw.is_none() && pos_raw.is_none() {
            return Ok(false);
        }
        if let Some(raw) = &body_raw {
            let tx = decode_tx(hash, raw)?;
            for id in tx.consumed_utxo_ids() {
                // Only release reservations this entry still holds.
                if self.reservation(&*txn, &id)?.as_ref() == Some(hash) {
                    txn.delete(&reservation_key(&id))?;
                }
            }
        }
        if let Some(raw) = &pos_raw {
            let pos = IndexPos::from_suffix(raw)?;
            txn.delete(&pos.key())?;
        }
        txn.delete(&body_key(hash))?;
        txn.delete(&ref_key(hash))?;
        index::adjust_count(txn, -1)?;
        Ok(true)
    }

    fn reservation(
        &self,
        txn: &dyn ReadTransaction,
        utxo_id: &UtxoId,
    ) -> Result<Option<TxHash>, LedgerError> {
        txn.get(&reservation_key(utxo_id))?
            .map(|raw| index::decode_hash(&raw))
            .transpose()
    }

    fn position(
        &self,
        txn: &dyn ReadTransaction,
        hash: &TxHash,
    ) -> Result<Option<IndexPos>, LedgerError> {
        txn.get(&ref_key(hash))?
            .map(|raw| IndexPos::from_suffix(&raw))
            .transpose()
    }
}

fn body_key(hash: &TxHash) -> Vec<u8> {
    prefix::make_key(prefix::PENDING_TX, hash)
}

fn cooldown_key(hash: &TxHash) -> Vec<u8> {
    prefix::make_key(prefix::PENDING_TX_COOLDOWN, hash)
}

fn ref_key(hash: &TxHash) -> Vec<u8> {
    prefix::make_key(prefix::PENDING_TX_EPOCH_REF, hash)
}

fn reservation_key(utxo_id: &UtxoId) -> Vec<u8> {
    prefix::make_key(prefix::PENDING_TX_RESERVATION, utxo_id)
}

fn decode_tx(hash: &TxHash, raw: &[u8]) -> Result<Transaction, LedgerError> {
    Transaction::decode(&mut &raw[..]).map_err(|e| {
        LedgerError::Corrupt(format!("pool tx {} undecodable: {e}", hex::encode(hash)))
    })
}
