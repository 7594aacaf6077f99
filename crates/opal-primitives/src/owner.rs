use codec::{Decode, Encode};

/// Signature curve of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum Curve {
    Secp256k1,
    Bn256,
}

/// Owner of a transaction output: curve type plus a 20-byte account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Owner {
    pub curve: Curve,
    pub account: [u8; 20],
}

impl Owner {
    pub fn new(curve: Curve, account: [u8; 20]) -> Self {
        Self { curve, account }
    }

    /// Canonical byte rendering used when an owner participates in an index
    /// hash: one curve tag byte followed by the account.
    pub fn canonical_bytes(&self) -> [u8; 21] {
        let tag = match self.curve {
            Curve::Secp256k1 => 1,
            Curve::Bn256 => 2,
        };
        let mut out = [0u8; 21];
        out[0] = tag;
        out[1..].copy_from_slice(&self.account);
        out
    }
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Owner({:?}, 0x{})", self.curve, hex::encode(self.account))
    }
}
