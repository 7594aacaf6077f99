use crate::{
    DEPOSIT_TX_IDX, EPOCH_LENGTH, LedgerError, MAX_DATA_STORE_SIZE, MAX_ISSUED_AT, Owner, TxHash,
    Uint256, UtxoId, deposit_utxo_id, epoch_of_height, hash, utxo_id,
};
use codec::{Decode, Encode};

/// Value-bearing output.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ValueStore {
    pub chain_id: u32,
    pub value: Uint256,
    pub fee: Uint256,
    pub owner: Owner,
    pub tx_hash: TxHash,
    pub tx_out_idx: u32,
}

/// Data-bearing output paying storage rent through its deposit.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DataStore {
    pub chain_id: u32,
    pub index: [u8; 32],
    pub issued_at: u32,
    pub deposit: Uint256,
    pub raw_data: Vec<u8>,
    pub fee: Uint256,
    pub owner: Owner,
    pub tx_hash: TxHash,
    pub tx_out_idx: u32,
}

/// Transaction output union.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum TxOut {
    Value(ValueStore),
    Data(DataStore),
}

impl ValueStore {
    /// A deposit bridged in from an external ledger. Its UTXO id is the hash
    /// of the bridge nonce and it carries the deposit sentinel index.
    pub fn new_deposit(chain_id: u32, value: Uint256, owner: Owner, nonce: &[u8]) -> Self {
        Self {
            chain_id,
            value,
            fee: Uint256::ZERO,
            owner,
            tx_hash: deposit_utxo_id(nonce),
            tx_out_idx: DEPOSIT_TX_IDX,
        }
    }
}

impl DataStore {
    /// Epoch in which the store may be garbage collected:
    /// `issued_at + num_epochs + 1`.
    pub fn epoch_of_expiration(&self) -> Result<u32, LedgerError> {
        let num_epochs = num_epochs_equation(self.data_size()?, &self.deposit)?;
        Ok(self.issued_at.saturating_add(num_epochs).saturating_add(1))
    }

    /// Remaining deposit value at consumption time. Consuming an expired
    /// store yields only the single-epoch cleanup reward.
    pub fn remaining_value(&self, current_height: u32) -> Result<Uint256, LedgerError> {
        if self.issued_at == 0 {
            return Err(LedgerError::Invalid("datastore issued_at is zero".into()));
        }
        let epoch_final = epoch_of_height(current_height).max(self.issued_at);
        reward_deposit_equation(&self.deposit, self.data_size()?, self.issued_at, epoch_final)
    }

    /// The deposit must exactly fund a whole number of epochs, and
    /// `issued_at` must stay within `1..=MAX_ISSUED_AT` so the mining window
    /// fits in a u32 height.
    pub fn validate_deposit(&self) -> Result<(), LedgerError> {
        if self.issued_at == 0 {
            return Err(LedgerError::Invalid("datastore issued_at is zero".into()));
        }
        if self.issued_at > MAX_ISSUED_AT {
            return Err(LedgerError::Invalid(
                "datastore issued_at beyond representable epoch range".into(),
            ));
        }
        let data_size = self.data_size()?;
        let num_epochs = num_epochs_equation(data_size, &self.deposit)?;
        if num_epochs == 0 {
            return Err(LedgerError::Invalid("datastore deposit funds zero epochs".into()));
        }
        let expected = base_deposit_equation(data_size, num_epochs)?;
        if expected != self.deposit {
            return Err(LedgerError::Invalid(
                "datastore deposit does not match computed value".into(),
            ));
        }
        Ok(())
    }

    fn data_size(&self) -> Result<u32, LedgerError> {
        if self.raw_data.is_empty() {
            return Err(LedgerError::Invalid("datastore raw data is empty".into()));
        }
        if self.raw_data.len() > MAX_DATA_STORE_SIZE as usize {
            return Err(LedgerError::Invalid("datastore raw data too large".into()));
        }
        Ok(self.raw_data.len() as u32)
    }
}

impl TxOut {
    pub fn chain_id(&self) -> u32 {
        match self {
            Self::Value(v) => v.chain_id,
            Self::Data(d) => d.chain_id,
        }
    }

    pub fn tx_hash(&self) -> &TxHash {
        match self {
            Self::Value(v) => &v.tx_hash,
            Self::Data(d) => &d.tx_hash,
        }
    }

    pub fn tx_out_idx(&self) -> u32 {
        match self {
            Self::Value(v) => v.tx_out_idx,
            Self::Data(d) => d.tx_out_idx,
        }
    }

    pub fn set_tx_hash(&mut self, tx_hash: TxHash) {
        match self {
            Self::Value(v) => v.tx_hash = tx_hash,
            Self::Data(d) => d.tx_hash = tx_hash,
        }
    }

    pub fn set_tx_out_idx(&mut self, idx: u32) {
        match self {
            Self::Value(v) => v.tx_out_idx = idx,
            Self::Data(d) => d.tx_out_idx = idx,
        }
    }

    pub fn owner(&self) -> &Owner {
        match self {
            Self::Value(v) => &v.owner,
            Self::Data(d) => &d.owner,
        }
    }

    pub fn is_deposit(&self) -> bool {
        self.tx_out_idx() == DEPOSIT_TX_IDX
    }

    pub fn data_store(&self) -> Option<&DataStore> {
        match self {
            Self::Data(d) => Some(d),
            Self::Value(_) => None,
        }
    }

    /// Deterministic UTXO id. Deposits are identified by their nonce hash,
    /// ordinary outputs by `(origin tx hash, output index)`.
    pub fn utxo_id(&self) -> UtxoId {
        if self.is_deposit() {
            return *self.tx_hash();
        }
        utxo_id(self.tx_hash(), self.tx_out_idx())
    }

    /// Content hash of the output's preimage (everything but the producing
    /// transaction's hash). Stored as the trie leaf value.
    pub fn pre_hash(&self) -> [u8; 32] {
        let encoded = match self {
            Self::Value(v) => {
                (0u8, v.chain_id, v.value, &v.fee, &v.owner, v.tx_out_idx).encode()
            }
            Self::Data(d) => (
                1u8,
                d.chain_id,
                &d.index,
                d.issued_at,
                &d.deposit,
                &d.raw_data,
                &d.fee,
                &d.owner,
                d.tx_out_idx,
            )
                .encode(),
        };
        hash(&encoded)
    }

    /// Value at creation time. For DataStores this is the full deposit.
    pub fn value(&self) -> &Uint256 {
        match self {
            Self::Value(v) => &v.value,
            Self::Data(d) => &d.deposit,
        }
    }

    pub fn fee(&self) -> &Uint256 {
        match self {
            Self::Value(v) => &v.fee,
            Self::Data(d) => &d.fee,
        }
    }

    pub fn value_plus_fee(&self) -> Result<Uint256, LedgerError> {
        self.value().checked_add(self.fee())
    }

    /// Value recovered when this output is consumed at `current_height`.
    pub fn remaining_value(&self, current_height: u32) -> Result<Uint256, LedgerError> {
        match self {
            Self::Value(v) => Ok(v.value),
            Self::Data(d) => d.remaining_value(current_height),
        }
    }

    /// Last height at which a transaction creating this output may mine.
    /// ValueStores never constrain mining. Validated stores keep `issued_at`
    /// within `MAX_ISSUED_AT`; out-of-range values clamp rather than wrap.
    pub fn must_be_mined_before_height(&self) -> u32 {
        match self {
            Self::Value(_) => u32::MAX,
            Self::Data(d) => {
                let last = u64::from(d.issued_at) * u64::from(EPOCH_LENGTH);
                last.saturating_sub(1).min(u64::from(u32::MAX)) as u32
            }
        }
    }

    /// First height at which a transaction creating this output may mine.
    pub fn cannot_be_mined_before_height(&self) -> u32 {
        match self {
            Self::Value(_) => 1,
            Self::Data(d) => {
                let first =
                    u64::from(d.issued_at.saturating_sub(1)) * u64::from(EPOCH_LENGTH) + 1;
                first.min(u64::from(u32::MAX)) as u32
            }
        }
    }
}

/// `deposit = (data_size + BASE_DATASIZE) * (2 + num_epochs)`
pub fn base_deposit_equation(data_size: u32, num_epochs: u32) -> Result<Uint256, LedgerError> {
    if data_size > MAX_DATA_STORE_SIZE {
        return Err(LedgerError::Invalid("datastore raw data too large".into()));
    }
    let epoch_cost = Uint256::from_u32(data_size).checked_add(&Uint256::base_datasize())?;
    epoch_cost.checked_mul(&Uint256::from_u64(2 + u64::from(num_epochs)))
}

/// `num_epochs = deposit / (data_size + BASE_DATASIZE) - 2`
pub fn num_epochs_equation(data_size: u32, deposit: &Uint256) -> Result<u32, LedgerError> {
    if data_size > MAX_DATA_STORE_SIZE {
        return Err(LedgerError::Invalid("datastore raw data too large".into()));
    }
    let epoch_cost = Uint256::from_u32(data_size).checked_add(&Uint256::base_datasize())?;
    let quotient = deposit.checked_div(&epoch_cost)?;
    if quotient < Uint256::from_u64(2) {
        return Err(LedgerError::Invalid("datastore deposit too small".into()));
    }
    quotient.checked_sub(&Uint256::from_u64(2))?.to_u32()
}

/// Deposit value remaining after `epoch_final - epoch_initial` epochs of
/// storage, including the two-epoch-cost cleanup margin.
pub fn reward_deposit_equation(
    deposit: &Uint256,
    data_size: u32,
    epoch_initial: u32,
    epoch_final: u32,
) -> Result<Uint256, LedgerError> {
    if epoch_final < epoch_initial {
        return Err(LedgerError::Invalid("reward epoch_final < epoch_initial".into()));
    }
    let epoch_diff = epoch_final - epoch_initial;
    let epoch_cost = Uint256::from_u32(data_size).checked_add(&Uint256::base_datasize())?;
    let num_epochs = num_epochs_equation(data_size, deposit)?;
    if epoch_diff > num_epochs {
        // Expired; only the single-epoch cleanup reward remains.
        return Ok(epoch_cost);
    }
    let spent = base_deposit_equation(data_size, epoch_diff)?;
    let remainder = deposit.checked_sub(&spent)?;
    remainder.checked_add(&epoch_cost.checked_mul(&Uint256::from_u64(2))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BASE_DATASIZE, Curve};

    fn owner() -> Owner {
        Owner::new(Curve::Secp256k1, [9u8; 20])
    }

    fn data_store(issued_at: u32, num_epochs: u32) -> DataStore {
        let raw_data = vec![0xab; 64];
        let deposit = base_deposit_equation(64, num_epochs).unwrap();
        DataStore {
            chain_id: 1,
            index: [3u8; 32],
            issued_at,
            deposit,
            raw_data,
            fee: Uint256::ZERO,
            owner: owner(),
            tx_hash: [0u8; 32],
            tx_out_idx: 0,
        }
    }

    #[test]
    fn deposit_equations_are_inverse() {
        for num_epochs in [1u32, 5, 100] {
            let deposit = base_deposit_equation(64, num_epochs).unwrap();
            assert_eq!(num_epochs_equation(64, &deposit).unwrap(), num_epochs);
        }
    }

    #[test]
    fn epoch_of_expiration_counts_rent() {
        let ds = data_store(3, 5);
        assert_eq!(ds.epoch_of_expiration().unwrap(), 3 + 5 + 1);
        ds.validate_deposit().unwrap();
    }

    #[test]
    fn remaining_value_decays_and_floors() {
        let ds = data_store(1, 5);
        let fresh = ds.remaining_value(1).unwrap();
        let later = ds.remaining_value(3 * EPOCH_LENGTH).unwrap();
        assert!(later < fresh);
        // Long past expiration only the cleanup reward remains.
        let expired = ds.remaining_value(100 * EPOCH_LENGTH).unwrap();
        assert_eq!(expired, Uint256::from_u64(64 + u64::from(BASE_DATASIZE)));
    }

    #[test]
    fn deposit_utxo_id_is_nonce_hash() {
        let vs = ValueStore::new_deposit(1, Uint256::from_u64(500), owner(), b"nonce");
        let out = TxOut::Value(vs);
        assert!(out.is_deposit());
        assert_eq!(out.utxo_id(), deposit_utxo_id(b"nonce"));
    }

    #[test]
    fn ordinary_utxo_id_uses_index() {
        let mut a = TxOut::Value(ValueStore {
            chain_id: 1,
            value: Uint256::from_u64(10),
            fee: Uint256::ZERO,
            owner: owner(),
            tx_hash: hash(b"tx"),
            tx_out_idx: 0,
        });
        let b = a.clone();
        a.set_tx_out_idx(1);
        assert_ne!(a.utxo_id(), b.utxo_id());
    }

    #[test]
    fn pre_hash_excludes_tx_hash() {
        let mut a = TxOut::Data(data_store(1, 2));
        let before = a.pre_hash();
        a.set_tx_hash(hash(b"other-tx"));
        assert_eq!(a.pre_hash(), before);
        a.set_tx_out_idx(7);
        assert_ne!(a.pre_hash(), before);
    }

    #[test]
    fn issued_at_beyond_epoch_range_fails_validation() {
        let boundary = data_store(MAX_ISSUED_AT, 2);
        boundary.validate_deposit().unwrap();
        let out = TxOut::Data(boundary);
        assert_eq!(out.must_be_mined_before_height(), MAX_ISSUED_AT * EPOCH_LENGTH - 1);

        let over = data_store(MAX_ISSUED_AT + 1, 2);
        assert!(matches!(over.validate_deposit(), Err(LedgerError::Invalid(_))));
        // Window math stays total for out-of-range values instead of
        // wrapping into a bogus constraint.
        let out = TxOut::Data(over);
        assert_eq!(out.must_be_mined_before_height(), u32::MAX);
        assert_eq!(out.cannot_be_mined_before_height(), MAX_ISSUED_AT * EPOCH_LENGTH + 1);
    }

    #[test]
    fn mining_window_brackets_issuance_epoch() {
        let ds = TxOut::Data(data_store(3, 2));
        assert_eq!(ds.cannot_be_mined_before_height(), 2 * EPOCH_LENGTH + 1);
        assert_eq!(ds.must_be_mined_before_height(), 3 * EPOCH_LENGTH - 1);
        let vs = ValueStore::new_deposit(1, Uint256::from_u64(1), owner(), b"n");
        assert_eq!(TxOut::Value(vs).must_be_mined_before_height(), u32::MAX);
    }
}
