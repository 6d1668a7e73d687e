//! Error types shared by the hash engine, the ordering engine and the adapters.

use thiserror::Error;

/// The value kind has no reproducible legacy hash.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum HashError {
    #[error("unhashable type: '{kind}'")]
    Unhashable { kind: &'static str },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum OrderError {
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Strict removal of a key that is not live.
    #[error("key not present")]
    MissingKey,
    /// A persisted mask that is not `2^k - 1` (k >= 3) or cannot hold the keys.
    #[error("snapshot mask {mask:#x} cannot hold {len} keys")]
    InvalidSnapshot { mask: u64, len: usize },
    /// Persisted order and persisted entries disagree on the enumerable keys.
    #[error("snapshot orders {tracked} keys but its entries hold {stored} enumerable keys")]
    StateMismatch { tracked: usize, stored: usize },
}

/// Word widths other than 32 and 64 are rejected.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("unsupported word width {0}; expected 32 or 64")]
pub struct WidthError(pub u32);
