//! legacy-order: legacy hash values and mapping/set enumeration order,
//! reproduced bit for bit on a modern runtime.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: code and golden files that depend on the enumeration order of a
//!   retired runtime keep producing the same bytes after migration.
//! - Layers:
//!   - `legacy_hash`: pure hash engine, value -> legacy hash, for a chosen
//!     `WordWidth` (32 or 64 bit).
//!   - `KeyOrder<K>`: ordering engine. Keeps live keys in insertion order
//!     with their stored hash and a simulated table mask; reconstructs the
//!     open-addressing slot of every key on demand and yields keys sorted by
//!     slot.
//!   - `LegacyDict<K, V>` / `LegacySet<K>`: adapters that own physical
//!     storage (`hashbrown`) and forward every membership change to a
//!     `KeyOrder`.
//!
//! Constraints
//! - Single-threaded: the order cache is a `OnceCell` (`Send`, `!Sync`).
//! - Width is explicit configuration; nothing is derived from the host.
//! - Resize only changes the mask; the cost is paid on the next read.
//! - Correct order over throughput: removals are O(n).
//!
//! Hasher and rehashing invariants
//! - Each entry stores its unsigned legacy hash, computed once when the key
//!   enters the engine; probing and re-indexing always use the stored hash.
//!   An unhashable key is therefore rejected at `add`, before any state
//!   changes.
//!
//! Preserved legacy quirks
//! - Falsy keys (empty string, zero, `None`, empty tuple) are never tracked
//!   by the ordering engine. Adapters still store them, but they do not
//!   appear in enumeration.
//! - Restoring persisted state replays `add` in the order implied by the
//!   persisted `{keys, mask}`; the result is the legacy post-load order,
//!   which can differ from the order before persisting.

pub mod error;
pub mod key;
pub mod key_order;
mod key_order_proptest;
pub mod legacy_dict;
pub mod legacy_hash;
pub mod legacy_set;
pub mod width;

// Public surface
pub use error::{HashError, OrderError, WidthError};
pub use key::Key;
pub use key_order::{KeyOrder, OrderSnapshot};
pub use legacy_dict::{DictState, LegacyDict};
pub use legacy_hash::{hash, LegacyHash};
pub use legacy_set::{LegacySet, SetState};
pub use width::WordWidth;
