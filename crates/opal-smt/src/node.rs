use crate::SmtError;
use sha2::{Digest, Sha256};

pub(crate) const LEAF_TAG: u8 = 0x00;
pub(crate) const INTERIOR_TAG: u8 = 0x01;

/// A trie node decoded from its stored encoding.
///
/// Leaf: `0x00 ++ key(32) ++ value(32)`. Interior: `0x01 ++ left ++ right`.
/// Node identity is the SHA-256 of the encoding; a leaf's hash is therefore
/// independent of its depth, which is what makes moving a lone leaf up
/// during sibling collapse sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Leaf { key: [u8; 32], value: [u8; 32] },
    Interior { left: [u8; 32], right: [u8; 32] },
}

impl Node {
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65);
        match self {
            Self::Leaf { key, value } => {
                out.push(LEAF_TAG);
                out.extend_from_slice(key);
                out.extend_from_slice(value);
            }
            Self::Interior { left, right } => {
                out.push(INTERIOR_TAG);
                out.extend_from_slice(left);
                out.extend_from_slice(right);
            }
        }
        out
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Self, SmtError> {
        if data.len() != 65 {
            return Err(SmtError::InvalidNode("bad node length".into()));
        }
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a.copy_from_slice(&data[1..33]);
        b.copy_from_slice(&data[33..65]);
        match data[0] {
            LEAF_TAG => Ok(Self::Leaf { key: a, value: b }),
            INTERIOR_TAG => Ok(Self::Interior { left: a, right: b }),
            tag => Err(SmtError::InvalidNode(format!("unknown node tag {tag:#x}"))),
        }
    }

    pub(crate) fn hash(&self) -> [u8; 32] {
        hash_bytes(&self.encode())
    }
}

pub(crate) fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Bit of `key` at `depth`, most significant first.
pub(crate) fn bit(key: &[u8; 32], depth: usize) -> bool {
    (key[depth / 8] >> (7 - depth % 8)) & 1 == 1
}
