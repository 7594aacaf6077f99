//! UTXO state trie component: the canonical UTXOID -> preimage-hash mapping,
//! its three-root checkpoint protocol, UTXO body storage, batch validation,
//! and the fast-sync ingestion surface. Also hosts the deposit side-index
//! and the mined-transaction archive that share the same store.

mod deposit;
mod handler;
mod mined;
mod roots;

pub use deposit::DepositHandler;
pub use handler::UtxoHandler;
pub use mined::MinedTxHandler;
pub use roots::{
    canonical_state_root, current_state_root, pending_state_root, root_for_height,
};

use opal_primitives::LedgerError;
use opal_smt::SmtError;

/// Trie-primitive failures seen from the ledger: storage errors pass
/// through, everything else means the persisted trie is damaged.
pub(crate) fn smt_err(err: SmtError) -> LedgerError {
    match err {
        SmtError::Storage(e) => LedgerError::Storage(e),
        other => LedgerError::Corrupt(other.to_string()),
    }
}
