//! Word width of the emulated legacy target.

use crate::error::WidthError;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Integer word width of the legacy target whose hashes are reproduced.
///
/// All hash arithmetic is carried out in `u64` with wrapping semantics and
/// truncated to this width at the end, which gives the same low bits as the
/// native 32-bit or 64-bit computation. The width is never derived from the
/// host; embedders pick it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum WordWidth {
    Bits32,
    Bits64,
}

impl WordWidth {
    pub const fn bits(self) -> u32 {
        match self {
            WordWidth::Bits32 => 32,
            WordWidth::Bits64 => 64,
        }
    }

    /// `2^w - 1`: all ones in the word.
    pub const fn mask(self) -> u64 {
        match self {
            WordWidth::Bits32 => u32::MAX as u64,
            WordWidth::Bits64 => u64::MAX,
        }
    }

    /// Truncate to the word and sign-extend.
    #[inline]
    pub const fn wrap(self, x: u64) -> i64 {
        match self {
            WordWidth::Bits32 => x as u32 as i32 as i64,
            WordWidth::Bits64 => x as i64,
        }
    }

    /// The hash as the legacy table saw it: an unsigned word.
    #[inline]
    pub const fn unsigned(self, hash: i64) -> u64 {
        (hash as u64) & self.mask()
    }

    /// Wrap and apply the reserved-sentinel rule (-1 is never a hash).
    #[inline]
    pub(crate) const fn finish(self, x: u64) -> i64 {
        match self.wrap(x) {
            -1 => -2,
            h => h,
        }
    }
}

impl TryFrom<u32> for WordWidth {
    type Error = WidthError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            32 => Ok(WordWidth::Bits32),
            64 => Ok(WordWidth::Bits64),
            other => Err(WidthError(other)),
        }
    }
}

impl From<WordWidth> for u32 {
    fn from(w: WordWidth) -> u32 {
        w.bits()
    }
}

impl FromStr for WordWidth {
    type Err = WidthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits: u32 = s.trim().parse().map_err(|_| WidthError(0))?;
        WordWidth::try_from(bits)
    }
}

impl fmt::Display for WordWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}
