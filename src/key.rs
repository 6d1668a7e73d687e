//! Dynamic key values with legacy equality, hashing and rendering.

use crate::error::HashError;
use crate::legacy_hash::{hash_float, hash_integer, hash_ordinals, LegacyHash, TupleFold};
use crate::width::WordWidth;
use core::fmt::{self, Write as _};
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// A dynamically typed key as found in legacy mappings and sets.
///
/// Equality follows the legacy runtime: `Int(1)`, `Float(1.0)` and
/// `Bool(true)` are the same key, and an ASCII `Str` equals the `Bytes` with
/// the same content. NaN compares equal to NaN so that `Eq` stays reflexive.
/// `None` and `List` are representable but have no reproducible hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Key {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Key>),
    List(Vec<Key>),
}

#[derive(Copy, Clone)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn same(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                // i128 spans every integral f64 below 2^127
                f.fract() == 0.0 && f.abs() < 1.7e38 && f as i128 == i
            }
        }
    }
}

impl Key {
    pub fn tuple<I>(items: I) -> Key
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        Key::Tuple(items.into_iter().map(Into::into).collect())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Key {
        Key::Bytes(b.into())
    }

    /// The legacy type name, as used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Key::None => "NoneType",
            Key::Bool(_) => "bool",
            Key::Int(_) => "int",
            Key::Float(_) => "float",
            Key::Str(_) => "str",
            Key::Bytes(_) => "bytes",
            Key::Tuple(_) => "tuple",
            Key::List(_) => "list",
        }
    }

    fn as_number(&self) -> Option<Number> {
        match *self {
            Key::Bool(b) => Some(Number::Int(i128::from(b))),
            Key::Int(i) => Some(Number::Int(i)),
            Key::Float(f) => Some(Number::Float(f)),
            _ => None,
        }
    }

    /// Render the way the host prints a key nested inside a container.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_repr(&mut out);
        out
    }

    fn write_repr<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        match self {
            Key::Str(s) => write_str_repr(out, s),
            Key::Bytes(b) => write_bytes_repr(out, b),
            other => write!(out, "{}", other),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::None, Key::None) => true,
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Bytes(a), Key::Bytes(b)) => a == b,
            (Key::Str(s), Key::Bytes(b)) | (Key::Bytes(b), Key::Str(s)) => {
                s.is_ascii() && s.as_bytes() == b.as_slice()
            }
            (Key::Tuple(a), Key::Tuple(b)) | (Key::List(a), Key::List(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.same(b),
                _ => false,
            },
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equal keys share a legacy hash; unhashable ones fall back to structure.
        match self.legacy_hash(WordWidth::Bits64) {
            Ok(h) => state.write_i64(h),
            Err(_) => match self {
                Key::Tuple(items) | Key::List(items) => {
                    state.write_u8(if matches!(self, Key::List(_)) { 1 } else { 2 });
                    items.hash(state);
                }
                _ => state.write_u8(0),
            },
        }
    }
}

impl LegacyHash for Key {
    fn legacy_hash(&self, width: WordWidth) -> Result<i64, HashError> {
        match self {
            Key::Bool(b) => Ok(hash_integer(false, u128::from(*b), width)),
            Key::Int(i) => Ok(hash_integer(*i < 0, i.unsigned_abs(), width)),
            Key::Float(f) => Ok(hash_float(*f, width)),
            Key::Str(s) => Ok(hash_ordinals(s.chars().map(|c| u64::from(c as u32)), width)),
            Key::Bytes(b) => Ok(hash_ordinals(b.iter().map(|&c| u64::from(c)), width)),
            Key::Tuple(items) => {
                let mut fold = TupleFold::new(items.len(), width);
                for item in items {
                    fold.push(item.legacy_hash(width)?);
                }
                Ok(fold.finish())
            }
            Key::None | Key::List(_) => Err(HashError::Unhashable { kind: self.kind() }),
        }
    }

    fn is_falsy(&self) -> bool {
        match self {
            Key::None => true,
            Key::Bool(b) => !*b,
            Key::Int(i) => *i == 0,
            Key::Float(f) => *f == 0.0,
            Key::Str(s) => s.is_empty(),
            Key::Bytes(b) => b.is_empty(),
            Key::Tuple(items) | Key::List(items) => items.is_empty(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::None => f.write_str("None"),
            Key::Bool(true) => f.write_str("True"),
            Key::Bool(false) => f.write_str("False"),
            Key::Int(i) => write!(f, "{}", i),
            Key::Float(v) => write_float(f, *v),
            Key::Str(s) => f.write_str(s),
            Key::Bytes(b) => write_bytes_repr(f, b),
            Key::Tuple(items) => {
                f.write_char('(')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_repr(f)?;
                }
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Key::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_repr(f)?;
                }
                f.write_char(']')
            }
        }
    }
}

// Shortest round-trip digits; exponent form outside [1e-4, 1e16).
fn write_float<W: fmt::Write>(out: &mut W, v: f64) -> fmt::Result {
    if v.is_nan() {
        return out.write_str("nan");
    }
    if v.is_infinite() {
        return out.write_str(if v < 0.0 { "-inf" } else { "inf" });
    }
    let sci = format!("{:e}", v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if v != 0.0 && !(-4..16).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        return write!(out, "{}e{}{:02}", mantissa, sign, exp.abs());
    }
    let plain = format!("{}", v);
    out.write_str(&plain)?;
    if !plain.contains('.') {
        out.write_str(".0")?;
    }
    Ok(())
}

fn write_str_repr<W: fmt::Write>(out: &mut W, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if c == quote => {
                out.write_char('\\')?;
                out.write_char(c)?;
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => write!(out, "\\x{:02x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char(quote)
}

fn write_bytes_repr<W: fmt::Write>(out: &mut W, b: &[u8]) -> fmt::Result {
    let quote = if b.contains(&b'\'') && !b.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    out.write_char('b')?;
    out.write_char(quote as char)?;
    for &c in b {
        match c {
            b'\\' => out.write_str("\\\\")?,
            b'\n' => out.write_str("\\n")?,
            b'\r' => out.write_str("\\r")?,
            b'\t' => out.write_str("\\t")?,
            c if c == quote => {
                out.write_char('\\')?;
                out.write_char(c as char)?;
            }
            0x20..=0x7e => out.write_char(c as char)?,
            c => write!(out, "\\x{:02x}", c)?,
        }
    }
    out.write_char(quote as char)
}

impl From<&str> for Key {
    fn from(s: &str) -> Key {
        Key::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Key {
        Key::Str(s)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Key {
        Key::Bool(b)
    }
}

impl From<f64> for Key {
    fn from(v: f64) -> Key {
        Key::Float(v)
    }
}

impl From<f32> for Key {
    fn from(v: f32) -> Key {
        Key::Float(f64::from(v))
    }
}

macro_rules! int_from {
    ($($t:ty)+) => {$(
        impl From<$t> for Key {
            fn from(v: $t) -> Key {
                Key::Int(v as i128)
            }
        }
    )+};
}

int_from!(i8 i16 i32 i64 i128 isize u8 u16 u32 u64 usize);

impl<A: Into<Key>> From<(A,)> for Key {
    fn from((a,): (A,)) -> Key {
        Key::Tuple(vec![a.into()])
    }
}

impl<A: Into<Key>, B: Into<Key>> From<(A, B)> for Key {
    fn from((a, b): (A, B)) -> Key {
        Key::Tuple(vec![a.into(), b.into()])
    }
}

impl<A: Into<Key>, B: Into<Key>, C: Into<Key>> From<(A, B, C)> for Key {
    fn from((a, b, c): (A, B, C)) -> Key {
        Key::Tuple(vec![a.into(), b.into(), c.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy_hash::hash;
    use std::collections::hash_map::DefaultHasher;
    use WordWidth::{Bits32, Bits64};

    fn std_hash(k: &Key) -> u64 {
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        h.finish()
    }

    /// Invariant: dynamic keys hash exactly like the static types they mirror.
    #[test]
    fn dynamic_matches_static() {
        let k = Key::from(("abc", 1));
        assert_eq!(hash(&k, Bits64), hash(&("abc", 1), Bits64));
        assert_eq!(hash(&k, Bits32), Ok(2_037_533_451));
        assert_eq!(hash(&Key::from(3.3), Bits64), hash(&3.3, Bits64));
        assert_eq!(hash(&Key::bytes("test1234"), Bits64), hash("test1234", Bits64));
        assert_eq!(hash(&Key::Bool(true), Bits64), Ok(1));
        assert_eq!(hash(&Key::tuple(Vec::<Key>::new()), Bits64), Ok(3_527_539));
    }

    /// Invariant: none-like values and lists are unhashable, also inside tuples.
    #[test]
    fn unhashable_kinds() {
        assert_eq!(
            hash(&Key::None, Bits64),
            Err(HashError::Unhashable { kind: "NoneType" })
        );
        let list = Key::List(vec![Key::from(1)]);
        assert_eq!(hash(&list, Bits32), Err(HashError::Unhashable { kind: "list" }));
        let nested = Key::Tuple(vec![Key::from("a"), list]);
        assert_eq!(hash(&nested, Bits64), Err(HashError::Unhashable { kind: "list" }));
    }

    /// Invariant: numeric keys compare across kinds; equal keys hash equally.
    #[test]
    fn numeric_cross_kind_equality() {
        let one = [Key::Int(1), Key::Float(1.0), Key::Bool(true)];
        for a in &one {
            for b in &one {
                assert_eq!(a, b);
                assert_eq!(std_hash(a), std_hash(b));
            }
        }
        assert_ne!(Key::Int(1), Key::Float(1.5));
        assert_ne!(Key::Int(1), Key::from("1"));
        assert_eq!(Key::Float(f64::NAN), Key::Float(f64::NAN));
        assert_eq!(Key::Float(-0.0), Key::Int(0));
    }

    /// Invariant: ASCII text equals its bytes; non-ASCII text does not.
    #[test]
    fn str_bytes_equality() {
        assert_eq!(Key::from("abc"), Key::bytes("abc"));
        assert_eq!(std_hash(&Key::from("abc")), std_hash(&Key::bytes("abc")));
        assert_ne!(Key::from("été"), Key::bytes("été"));
    }

    /// Invariant: falsy keys are exactly the empty/zero/none-like values.
    #[test]
    fn falsy_keys() {
        for k in [
            Key::None,
            Key::Bool(false),
            Key::Int(0),
            Key::Float(0.0),
            Key::from(""),
            Key::bytes(""),
            Key::Tuple(vec![]),
            Key::List(vec![]),
        ] {
            assert!(k.is_falsy(), "{:?}", k);
        }
        assert!(!Key::Tuple(vec![Key::Int(0)]).is_falsy());
        assert!(!Key::from("0").is_falsy());
    }

    /// Invariant: rendering matches the host's str() of the same value.
    #[test]
    fn display_rendering() {
        assert_eq!(Key::from(("abc", 1)).to_string(), "('abc', 1)");
        assert_eq!(Key::from(3.3).to_string(), "3.3");
        assert_eq!(Key::from(30.0).to_string(), "30.0");
        assert_eq!(Key::from(1e16).to_string(), "1e+16");
        assert_eq!(Key::from(1e15).to_string(), "1000000000000000.0");
        assert_eq!(Key::from(1e-5).to_string(), "1e-05");
        assert_eq!(Key::from(0.0001).to_string(), "0.0001");
        assert_eq!(Key::from(-2.5e-300).to_string(), "-2.5e-300");
        assert_eq!(Key::from(("x",)).to_string(), "('x',)");
        assert_eq!(Key::from("it's").repr(), "\"it's\"");
        assert_eq!(Key::bytes("a\n").to_string(), "b'a\\n'");
        assert_eq!(Key::None.to_string(), "None");
        assert_eq!(Key::List(vec![Key::Int(1), Key::from("b")]).to_string(), "[1, 'b']");
    }

    /// Invariant: serde round-trips keys structurally.
    #[test]
    fn serde_roundtrip() {
        let k = Key::from(("abc", 2.5));
        let s = serde_json::to_string(&k).unwrap();
        let back: Key = serde_json::from_str(&s).unwrap();
        assert_eq!(back, k);
    }
}
