//! Hash engine: reproduces the legacy runtime's per-kind hash values.
//!
//! Every function here is pure. Arithmetic is done on `u64` with wrapping
//! operations and narrowed through [`WordWidth`] at the end, so the low
//! `w` bits match what the legacy target computed natively.

use crate::error::HashError;
use crate::width::WordWidth;

/// String/bytes multiplier.
const STRING_MULTIPLIER: u64 = 1_000_003;
const TUPLE_SEED: u64 = 0x345678;
const TUPLE_MULTIPLIER: u64 = 1_000_003;
const TUPLE_MULTIPLIER_STEP: u64 = 82_520;
const TUPLE_FINAL_ADD: u64 = 97_531;
const INFINITY_HASH: i64 = 314_159;
const NEG_INFINITY_HASH: i64 = -271_828;
const NAN_HASH: i64 = 0;

/// A value with a reproducible legacy hash.
///
/// `is_falsy` reports whether the legacy runtime treated the value as false
/// in a boolean context; the ordering engine skips such keys.
pub trait LegacyHash {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError>;

    fn is_falsy(&self) -> bool;
}

/// Hash `value` as the legacy runtime of the given width would.
pub fn hash<T>(value: &T, width: WordWidth) -> Result<i64, HashError>
where
    T: LegacyHash + ?Sized,
{
    value.legacy_hash(width)
}

/// Hash an integer given as sign and magnitude.
///
/// Values inside the signed word range hash to themselves. Larger ones take
/// the arbitrary-precision route: the magnitude is folded modulo `2^w - 1`,
/// where a non-zero multiple folds to `2^w - 1` rather than 0.
pub(crate) fn hash_integer(negative: bool, magnitude: u128, width: WordWidth) -> i64 {
    let modulus = u128::from(width.mask());
    fold_residue(negative, magnitude % modulus, magnitude != 0, width)
}

fn fold_residue(negative: bool, residue: u128, nonzero: bool, width: WordWidth) -> i64 {
    let residue = if residue == 0 && nonzero {
        u128::from(width.mask())
    } else {
        residue
    };
    let x = residue as u64;
    let x = if negative { x.wrapping_neg() } else { x };
    width.finish(x)
}

pub(crate) fn hash_float(v: f64, width: WordWidth) -> i64 {
    if v.is_nan() {
        return NAN_HASH;
    }
    if v.is_infinite() {
        return if v < 0.0 {
            NEG_INFINITY_HASH
        } else {
            INFINITY_HASH
        };
    }
    if v.fract() == 0.0 {
        return hash_integral_float(v, width);
    }

    let (mut m, expo) = frexp(v);
    m *= 2147483648.0; // 2**31
    let hipart = m as i64;
    m = (m - hipart as f64) * 2147483648.0;
    let x = (hipart as u64)
        .wrapping_add(m as i64 as u64)
        .wrapping_add((i64::from(expo) << 15) as u64);
    width.finish(x)
}

// Equal to the hash of the same integer, however large.
fn hash_integral_float(v: f64, width: WordWidth) -> i64 {
    if v == 0.0 {
        return 0;
    }
    let bits = v.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let mantissa = (bits & ((1u64 << 52) - 1)) | (1u64 << 52);
    // v == mantissa * 2^exp; integral non-zero values are always normal.
    let exp = biased - 1075;
    let modulus = u128::from(width.mask());
    let residue = if exp >= 0 {
        // 2^w == 1 (mod 2^w - 1)
        let shift = exp as u32 % width.bits();
        (u128::from(mantissa) << shift) % modulus
    } else {
        u128::from(mantissa >> (-exp) as u32) % modulus
    };
    fold_residue(v < 0.0, residue, true, width)
}

/// Split `v` into a fraction in `[0.5, 1)` and a power of two.
fn frexp(v: f64) -> (f64, i32) {
    if v == 0.0 || !v.is_finite() {
        return (v, 0);
    }
    let bits = v.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // subnormal: scale into the normal range first
        let (f, e) = frexp(v * f64::from_bits(0x4350_0000_0000_0000)); // 2**54
        return (f, e - 54);
    }
    let fraction = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (fraction, biased - 1022)
}

/// Hash a sequence of ordinals (Unicode scalar values or bytes).
pub(crate) fn hash_ordinals<I>(ordinals: I, width: WordWidth) -> i64
where
    I: IntoIterator<Item = u64>,
{
    let mut it = ordinals.into_iter().peekable();
    let first = match it.peek() {
        Some(&c) => c,
        None => return 0,
    };
    let mut x = first << 7;
    let mut len = 0u64;
    for c in it {
        x = x.wrapping_mul(STRING_MULTIPLIER) ^ c;
        len += 1;
    }
    width.finish(x ^ len)
}

/// Incremental tuple hash following the legacy per-position multiplier schedule.
pub(crate) struct TupleFold {
    x: u64,
    mult: u64,
    remaining: u64,
    width: WordWidth,
}

impl TupleFold {
    pub(crate) fn new(len: usize, width: WordWidth) -> Self {
        Self {
            x: TUPLE_SEED,
            mult: TUPLE_MULTIPLIER,
            remaining: len as u64,
            width,
        }
    }

    pub(crate) fn push(&mut self, element: i64) {
        self.remaining = self.remaining.saturating_sub(1);
        self.x = (self.x ^ element as u64).wrapping_mul(self.mult);
        self.mult = self
            .mult
            .wrapping_add(TUPLE_MULTIPLIER_STEP + 2 * self.remaining);
    }

    pub(crate) fn finish(self) -> i64 {
        self.width.finish(self.x.wrapping_add(TUPLE_FINAL_ADD))
    }
}

impl<T: LegacyHash + ?Sized> LegacyHash for &T {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        (**self).legacy_hash(width)
    }
    fn is_falsy(&self) -> bool {
        (**self).is_falsy()
    }
}

impl LegacyHash for str {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        Ok(hash_ordinals(self.chars().map(|c| u64::from(c as u32)), width))
    }
    fn is_falsy(&self) -> bool {
        self.is_empty()
    }
}

impl LegacyHash for String {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        self.as_str().legacy_hash(width)
    }
    fn is_falsy(&self) -> bool {
        self.is_empty()
    }
}

impl LegacyHash for [u8] {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        Ok(hash_ordinals(self.iter().map(|&b| u64::from(b)), width))
    }
    fn is_falsy(&self) -> bool {
        self.is_empty()
    }
}

impl LegacyHash for Vec<u8> {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        self.as_slice().legacy_hash(width)
    }
    fn is_falsy(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! signed_impls {
    ($($t:ty)+) => {$(
        impl LegacyHash for $t {
            fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
                let v = *self as i128;
                Ok(hash_integer(v < 0, v.unsigned_abs(), width))
            }
            fn is_falsy(&self) -> bool {
                *self == 0
            }
        }
    )+};
}

macro_rules! unsigned_impls {
    ($($t:ty)+) => {$(
        impl LegacyHash for $t {
            fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
                Ok(hash_integer(false, *self as u128, width))
            }
            fn is_falsy(&self) -> bool {
                *self == 0
            }
        }
    )+};
}

signed_impls!(i8 i16 i32 i64 i128 isize);
unsigned_impls!(u8 u16 u32 u64 u128 usize);

impl LegacyHash for bool {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        Ok(hash_integer(false, u128::from(*self), width))
    }
    fn is_falsy(&self) -> bool {
        !*self
    }
}

impl LegacyHash for f64 {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        Ok(hash_float(*self, width))
    }
    fn is_falsy(&self) -> bool {
        *self == 0.0
    }
}

impl LegacyHash for f32 {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        Ok(hash_float(f64::from(*self), width))
    }
    fn is_falsy(&self) -> bool {
        *self == 0.0
    }
}

impl LegacyHash for () {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        Ok(TupleFold::new(0, width).finish())
    }
    fn is_falsy(&self) -> bool {
        true
    }
}

macro_rules! tuple_impls {
    ($($name:ident)+) => {
        impl<$($name: LegacyHash),+> LegacyHash for ($($name,)+) {
            #[allow(non_snake_case)]
            fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
                let ($($name,)+) = self;
                let len = [$(stringify!($name)),+].len();
                let mut fold = TupleFold::new(len, width);
                $( fold.push($name.legacy_hash(width)?); )+
                Ok(fold.finish())
            }
            fn is_falsy(&self) -> bool {
                false
            }
        }
    };
}

tuple_impls!(A);
tuple_impls!(A B);
tuple_impls!(A B C);
tuple_impls!(A B C D);
tuple_impls!(A B C D E);
tuple_impls!(A B C D E F);
tuple_impls!(A B C D E F G);
tuple_impls!(A B C D E F G H);
