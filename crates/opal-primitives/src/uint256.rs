use crate::{BASE_DATASIZE, LedgerError};
use codec::{Decode, Encode};
use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// 256-bit unsigned integer, stored big-endian.
///
/// Arithmetic is checked: overflow past 2^256 - 1, underflow past zero and
/// division by zero are `Invalid` errors, never wrapping.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode)]
pub struct Uint256([u8; 32]);

impl Uint256 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_u64(v: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&v.to_be_bytes());
        Self(bytes)
    }

    pub fn from_u32(v: u32) -> Self {
        Self::from_u64(u64::from(v))
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_u32(&self) -> Result<u32, LedgerError> {
        BigUint::from_bytes_be(&self.0)
            .to_u32()
            .ok_or_else(|| LedgerError::Invalid("uint256 exceeds u32".into()))
    }

    pub fn checked_add(&self, rhs: &Self) -> Result<Self, LedgerError> {
        let sum = self.big() + rhs.big();
        Self::from_big(sum).ok_or_else(|| LedgerError::Invalid("uint256 addition overflow".into()))
    }

    pub fn checked_sub(&self, rhs: &Self) -> Result<Self, LedgerError> {
        let (a, b) = (self.big(), rhs.big());
        if a < b {
            return Err(LedgerError::Invalid("uint256 subtraction underflow".into()));
        }
        // a >= b, so the difference always fits
        Ok(Self::from_big(a - b).unwrap_or(Self::ZERO))
    }

    pub fn checked_mul(&self, rhs: &Self) -> Result<Self, LedgerError> {
        let prod = self.big() * rhs.big();
        Self::from_big(prod)
            .ok_or_else(|| LedgerError::Invalid("uint256 multiplication overflow".into()))
    }

    pub fn checked_div(&self, rhs: &Self) -> Result<Self, LedgerError> {
        if rhs.is_zero() {
            return Err(LedgerError::Invalid("uint256 division by zero".into()));
        }
        Ok(Self::from_big(self.big() / rhs.big()).unwrap_or(Self::ZERO))
    }

    /// Base data size of the storage-rent equations, as a Uint256.
    pub fn base_datasize() -> Self {
        Self::from_u32(BASE_DATASIZE)
    }

    fn big(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    fn from_big(v: BigUint) -> Option<Self> {
        let raw = v.to_bytes_be();
        if raw.len() > 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        Some(Self(bytes))
    }
}

impl From<u64> for Uint256 {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl std::fmt::Debug for Uint256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uint256(0x{})", hex::encode(self.0))
    }
}

impl std::fmt::Display for Uint256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
