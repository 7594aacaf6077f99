use opal_storage::StorageError;

/// Shared error taxonomy of the ledger core.
///
/// `Invalid`, `Missing`, `Expired` and `AlreadyMined` are per-transaction
/// verdicts; batch scans exclude the offender and continue. `Storage` and
/// `Corrupt` are fatal to the enclosing call and must propagate.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Semantic rule violation: double-spend, unbalanced value, bad owner.
    #[error("invalid transaction: {0}")]
    Invalid(String),

    /// A referenced transaction, deposit or UTXO was not found.
    #[error("not found: {0}")]
    Missing(String),

    /// A pool entry past its expiration epoch. Reported as missing to
    /// external callers; sweep logic needs the distinction.
    #[error("expired: {0}")]
    Expired(String),

    /// The transaction hash carries an active cooldown tombstone.
    #[error("transaction already mined")]
    AlreadyMined,

    /// Storage engine failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A structural invariant was violated. Halts block processing.
    #[error("corrupt ledger state: {0}")]
    Corrupt(String),
}

impl LedgerError {
    /// True for errors that must abort the enclosing call rather than
    /// excluding a single transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Corrupt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        assert!(!LedgerError::Invalid("x".into()).is_fatal());
        assert!(!LedgerError::Missing("x".into()).is_fatal());
        assert!(!LedgerError::Expired("x".into()).is_fatal());
        assert!(!LedgerError::AlreadyMined.is_fatal());
        assert!(LedgerError::Corrupt("x".into()).is_fatal());
        assert!(LedgerError::Storage(StorageError::Backend("io".into())).is_fatal());
    }
}
