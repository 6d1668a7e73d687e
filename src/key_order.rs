//! KeyOrder: enumeration order of the legacy open-addressing table.
//!
//! The engine never stores values. It keeps the live keys in insertion
//! order together with their legacy hash and the simulated table mask, and
//! reconstructs on demand the slot each key would occupy. Keys sorted by
//! slot are the legacy enumeration order.
//!
//! The reconstruction replays the probe sequence over the live keys only.
//! The real table's layout also depended on deleted-entry history; replaying
//! from the live set is deterministic and is what the legacy golden files
//! were produced against.

use crate::error::{HashError, OrderError};
use crate::legacy_hash::LegacyHash;
use crate::width::WordWidth;
use core::cell::OnceCell;
use hashbrown::{HashSet, HashTable};
use serde::{Deserialize, Serialize};

/// Smallest simulated table.
pub const MIN_SIZE: u64 = 8;
/// Bits dropped from `perturb` on every probe step.
pub const PERTURB_SHIFT: u32 = 5;
/// Above this many live keys the table grows by 2x instead of 4x.
pub const GROWTH_THRESHOLD: usize = 50_000;

#[derive(Debug)]
struct Entry<K> {
    key: K,
    // unsigned word, as the table saw it
    hash: u64,
}

/// Persisted ordering state: insertion list and mask, never the cached order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot<K> {
    pub keys: Vec<K>,
    pub mask: u64,
}

/// Ordering engine reproducing legacy enumeration order for keys `K`.
///
/// Single-threaded: the order cache is a `OnceCell`, so the engine is `Send`
/// but not `Sync`.
#[derive(Debug)]
pub struct KeyOrder<K> {
    width: WordWidth,
    entries: Vec<Entry<K>>,
    // positions into `entries`, keyed by the stored hash
    index: HashTable<usize>,
    mask: u64,
    order: OnceCell<Vec<usize>>,
}

// Spread the legacy hash before it drives the index; small integers hash to
// themselves and would otherwise share control bytes.
#[inline]
fn spread(hash: u64) -> u64 {
    hash.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Slot-sorted positions of `entries` under `mask`.
fn compute_order<K>(entries: &[Entry<K>], mask: u64) -> Vec<usize> {
    let mut taken: HashSet<u64> = HashSet::with_capacity(entries.len());
    let mut slotted: Vec<(u64, usize)> = Vec::with_capacity(entries.len());
    for (pos, e) in entries.iter().enumerate() {
        let mut i = e.hash & mask;
        let mut slot = i;
        let mut perturb = e.hash;
        while taken.contains(&slot) {
            i = (i << 2)
                .wrapping_add(i)
                .wrapping_add(perturb)
                .wrapping_add(1);
            slot = i & mask;
            perturb >>= PERTURB_SHIFT;
        }
        taken.insert(slot);
        slotted.push((slot, pos));
    }
    // slots are unique
    slotted.sort_unstable_by_key(|&(slot, _)| slot);
    slotted.into_iter().map(|(_, pos)| pos).collect()
}

/// Size of the table chosen for a request: the first power of two above it.
fn table_size_for(request: usize) -> u64 {
    let request = request as u64;
    let mut size = MIN_SIZE;
    while size <= request {
        size <<= 1;
    }
    size
}

impl<K> KeyOrder<K>
where
    K: LegacyHash + Eq,
{
    pub fn new(width: WordWidth) -> Self {
        Self {
            width,
            entries: Vec::new(),
            index: HashTable::new(),
            mask: MIN_SIZE - 1,
            order: OnceCell::new(),
        }
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }

    /// Simulated table size minus one.
    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unsigned_hash(&self, key: &K) -> Result<u64, HashError> {
        Ok(self.width.unsigned(key.legacy_hash(self.width)?))
    }

    fn position(&self, key: &K, hash: u64) -> Option<usize> {
        let entries = &self.entries;
        self.index
            .find(spread(hash), |&pos| entries[pos].key == *key)
            .copied()
    }

    /// Whether `key` is live. Falsy keys are never live; an unhashable key
    /// is an error, not an absence.
    pub fn contains(&self, key: &K) -> Result<bool, HashError> {
        if key.is_falsy() {
            return Ok(false);
        }
        let hash = self.unsigned_hash(key)?;
        Ok(self.position(key, hash).is_some())
    }

    fn invalidate(&mut self) {
        self.order.take();
    }

    /// Track a newly inserted key. Returns whether it was appended.
    ///
    /// Falsy keys are skipped without being hashed, matching the legacy
    /// behavior this engine reproduces.
    pub fn add(&mut self, key: K) -> Result<bool, HashError> {
        if key.is_falsy() {
            tracing::trace!("falsy key skipped");
            return Ok(false);
        }
        let hash = self.unsigned_hash(&key)?;
        if self.position(&key, hash).is_some() {
            return Ok(false);
        }
        self.push_entry(Entry { key, hash });
        Ok(true)
    }

    // Append a key known to be absent, then grow at 2/3 load.
    fn push_entry(&mut self, entry: Entry<K>) {
        let pos = self.entries.len();
        let hash = entry.hash;
        self.entries.push(entry);
        let entries = &self.entries;
        self.index
            .insert_unique(spread(hash), pos, |&p| spread(entries[p].hash));
        self.invalidate();

        if self.entries.len() as u64 * 3 >= (self.mask + 1) * 2 {
            self.resize();
        }
    }

    // The legacy table copied live entries into the larger table in slot
    // order; later probes start from that order.
    fn resize(&mut self) {
        let order = self.order.take().unwrap_or_else(|| compute_order(&self.entries, self.mask));
        let mut slots: Vec<Option<Entry<K>>> = self.entries.drain(..).map(Some).collect();
        self.entries = order.into_iter().filter_map(|pos| slots[pos].take()).collect();
        self.rebuild_index();
        let old_mask = self.mask;
        self.set_mask(None);
        tracing::debug!(
            live = self.entries.len(),
            old_mask,
            new_mask = self.mask,
            "simulated table resize"
        );
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        let entries = &self.entries;
        for (pos, e) in entries.iter().enumerate() {
            self.index
                .insert_unique(spread(e.hash), pos, |&p| spread(entries[p].hash));
        }
    }

    /// Grow the mask for `request` keys' worth of slots.
    ///
    /// `None` (or 0) requests `len * 4`, or `len * 2` above
    /// [`GROWTH_THRESHOLD`]. The mask never shrinks.
    pub fn set_mask(&mut self, request: Option<usize>) {
        let request = match request {
            Some(r) if r > 0 => r,
            _ => {
                let len = self.entries.len();
                len * if len > GROWTH_THRESHOLD { 2 } else { 4 }
            }
        };
        let mask = table_size_for(request) - 1;
        if mask > self.mask {
            self.mask = mask;
            self.invalidate();
        }
    }

    // Legacy bulk merge presizing: only when the incoming keys would push
    // the table past 2/3 load.
    fn presize(&mut self, incoming: usize) {
        let wanted = self.entries.len() + incoming;
        if wanted as u64 * 3 >= (self.mask + 1) * 2 {
            let old_mask = self.mask;
            self.set_mask(Some(wanted * 2));
            tracing::debug!(
                live = self.entries.len(),
                incoming,
                old_mask,
                new_mask = self.mask,
                "bulk merge presize"
            );
        }
    }

    /// Presize for `size_hint` incoming keys, then `add` each in order.
    pub fn merge<I>(&mut self, keys: I, size_hint: usize) -> Result<(), HashError>
    where
        I: IntoIterator<Item = K>,
    {
        self.presize(size_hint);
        for key in keys {
            self.add(key)?;
        }
        Ok(())
    }

    fn remove_at(&mut self, pos: usize) -> K {
        let entry = self.entries.remove(pos);
        // positions after `pos` shifted down by one
        self.rebuild_index();
        self.invalidate();
        entry.key
    }

    /// Strict removal: fails with `MissingKey` if `key` is not live.
    pub fn remove(&mut self, key: &K) -> Result<(), OrderError> {
        if self.discard(key)? {
            Ok(())
        } else {
            Err(OrderError::MissingKey)
        }
    }

    /// Lenient removal. Returns whether the key was live; hashing failures
    /// still surface.
    pub fn discard(&mut self, key: &K) -> Result<bool, HashError> {
        if key.is_falsy() {
            return Ok(false);
        }
        let hash = self.unsigned_hash(key)?;
        match self.position(key, hash) {
            Some(pos) => {
                self.remove_at(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove and return the first key in enumeration order.
    pub fn pop(&mut self) -> Option<K> {
        let pos = *self.order().first()?;
        Some(self.remove_at(pos))
    }

    fn order(&self) -> &[usize] {
        self.order.get_or_init(|| {
            tracing::trace!(live = self.entries.len(), mask = self.mask, "order recomputed");
            compute_order(&self.entries, self.mask)
        })
    }

    /// Keys in legacy enumeration order.
    pub fn keys(&self) -> Keys<'_, K> {
        Keys {
            entries: &self.entries,
            order: self.order().iter(),
        }
    }

    /// Insertion list as the engine currently holds it.
    pub fn insertion_order(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.keys().cloned().collect()
    }

    /// An independent engine with the same keys, built by merging this
    /// engine's current order into a fresh one.
    pub fn copy(&self) -> Self
    where
        K: Clone,
    {
        let mut fresh = Self::new(self.width);
        fresh.presize(self.len());
        for &pos in self.order() {
            let e = &self.entries[pos];
            fresh.push_entry(Entry {
                key: e.key.clone(),
                hash: e.hash,
            });
        }
        fresh
    }

    pub fn snapshot(&self) -> OrderSnapshot<K>
    where
        K: Clone,
    {
        OrderSnapshot {
            keys: self.insertion_order().cloned().collect(),
            mask: self.mask,
        }
    }

    /// Rebuild from a snapshot by replaying `add` in the order the snapshot
    /// implies, as legacy deserialization did. No cached state is trusted.
    pub fn restore(snapshot: OrderSnapshot<K>, width: WordWidth) -> Result<Self, OrderError> {
        let OrderSnapshot { keys, mask } = snapshot;
        let size = mask.wrapping_add(1);
        if !size.is_power_of_two() || size < MIN_SIZE || keys.len() as u64 >= size {
            return Err(OrderError::InvalidSnapshot {
                mask,
                len: keys.len(),
            });
        }
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let hash = width.unsigned(key.legacy_hash(width)?);
            entries.push(Entry { key, hash });
        }
        let order = compute_order(&entries, mask);
        let mut slots: Vec<Option<Entry<K>>> = entries.into_iter().map(Some).collect();

        let mut fresh = Self::new(width);
        for pos in order {
            if let Some(e) = slots[pos].take() {
                fresh.add(e.key)?;
            }
        }
        Ok(fresh)
    }
}

/// Iterator over keys in legacy enumeration order.
pub struct Keys<'a, K> {
    entries: &'a [Entry<K>],
    order: core::slice::Iter<'a, usize>,
}

impl<'a, K> Iterator for Keys<'a, K> {
    type Item = &'a K;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.order.next().map(|&pos| &self.entries[pos].key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

impl<K> ExactSizeIterator for Keys<'_, K> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::legacy_hash::hash;
    use WordWidth::{Bits32, Bits64};

    fn joined_hash(order: &KeyOrder<Key>, width: WordWidth) -> i64 {
        let joined: String = order.keys().map(|k| k.to_string()).collect();
        hash(joined.as_str(), width).unwrap()
    }

    fn strings(range: core::ops::Range<u32>) -> impl Iterator<Item = Key> {
        range.map(|x| Key::from(x.to_string()))
    }

    /// Invariant: fifteen string keys enumerate in the legacy order.
    #[test]
    fn small_string_order() {
        let mut o = KeyOrder::new(Bits64);
        for k in strings(0..15) {
            o.add(k).unwrap();
        }
        let got: Vec<String> = o.keys().map(|k| k.to_string()).collect();
        assert_eq!(
            got,
            ["11", "10", "13", "12", "14", "1", "0", "3", "2", "5", "4", "7", "6", "9", "8"]
        );
        assert_eq!(joined_hash(&o, Bits64), 6_636_034_109_572_507_556);
    }

    /// Invariant: the same scenario in 32-bit mode matches the 32-bit vector.
    #[test]
    fn small_string_order_32() {
        let mut o = KeyOrder::new(Bits32);
        for k in strings(0..15) {
            o.add(k).unwrap();
        }
        assert_eq!(joined_hash(&o, Bits32), 175_237_028);
    }

    /// Invariant: merge into a fresh engine below 2/3 load does not presize.
    #[test]
    fn merge_without_resize() {
        let mut o = KeyOrder::new(Bits64);
        let keys: Vec<Key> = [2, 3, 4, 5, 8].into_iter().map(Key::from).collect();
        let n = keys.len();
        o.merge(keys, n).unwrap();
        assert_eq!(o.mask(), 7);
        let got: Vec<Key> = o.to_vec();
        assert_eq!(got, [8, 2, 3, 4, 5].map(Key::from));
        assert_eq!(joined_hash(&o, Bits64), -834_114_354_854_653_831);
    }

    /// Invariant: merge past 2/3 load presizes and orders by the larger table.
    #[test]
    fn merge_with_resize() {
        let mut o = KeyOrder::new(Bits64);
        let keys: Vec<Key> = [2, 3, 4, 5, 8, 9, 10, 11, 12, 13, 14]
            .into_iter()
            .map(Key::from)
            .collect();
        let n = keys.len();
        o.merge(keys, n).unwrap();
        assert_eq!(o.mask(), 31);
        assert_eq!(joined_hash(&o, Bits64), -2_555_609_460_481_043_374);
    }

    /// Invariant: crossing 2/3 load on add grows the table 4x.
    #[test]
    fn add_triggers_resize_at_two_thirds() {
        let mut o = KeyOrder::new(Bits64);
        for k in strings(0..5) {
            o.add(k).unwrap();
        }
        assert_eq!(o.mask(), 7);
        o.add(Key::from("5")).unwrap();
        assert_eq!(o.len(), 6);
        assert_eq!(o.mask(), 31);
    }

    /// Invariant: set_mask picks the first power of two strictly above the request.
    #[test]
    fn set_mask_sizes() {
        let mut o: KeyOrder<Key> = KeyOrder::new(Bits64);
        o.set_mask(Some(8));
        assert_eq!(o.mask(), 15);
        o.set_mask(Some(3));
        assert_eq!(o.mask(), 15, "mask never shrinks");
        o.set_mask(Some(100));
        assert_eq!(o.mask(), 127);
        o.set_mask(None);
        assert_eq!(o.mask(), 127);
        assert_eq!(table_size_for(0), 8);
        assert_eq!(table_size_for(7), 8);
        assert_eq!(table_size_for(200_000), 262_144);
    }

    /// Invariant: falsy keys are never tracked; duplicates are not appended.
    #[test]
    fn falsy_and_duplicate_adds() {
        let mut o = KeyOrder::new(Bits64);
        assert_eq!(o.add(Key::from("")), Ok(false));
        assert_eq!(o.add(Key::Int(0)), Ok(false));
        assert_eq!(o.add(Key::None), Ok(false));
        assert_eq!(o.add(Key::from("a")), Ok(true));
        assert_eq!(o.add(Key::from("a")), Ok(false));
        assert_eq!(o.add(Key::Int(1)), Ok(true));
        assert_eq!(o.add(Key::Float(1.0)), Ok(false));
        assert_eq!(o.len(), 2);
    }

    /// Invariant: adding an unhashable key fails and leaves the engine unchanged.
    #[test]
    fn unhashable_add_fails() {
        let mut o = KeyOrder::new(Bits64);
        o.add(Key::from("a")).unwrap();
        let err = o.add(Key::List(vec![Key::Int(1)]));
        assert_eq!(err, Err(HashError::Unhashable { kind: "list" }));
        assert_eq!(o.len(), 1);
    }

    /// Invariant: strict removal reports missing keys; discard is silent.
    #[test]
    fn remove_and_discard() {
        let mut o = KeyOrder::new(Bits64);
        o.add(Key::from("a")).unwrap();
        o.add(Key::from("b")).unwrap();
        assert_eq!(o.remove(&Key::from("zz")), Err(OrderError::MissingKey));
        assert_eq!(o.discard(&Key::from("zz")), Ok(false));
        assert_eq!(o.discard(&Key::None), Ok(false));
        assert_eq!(o.remove(&Key::from("a")), Ok(()));
        assert_eq!(o.contains(&Key::from("a")), Ok(false));
        assert_eq!(o.contains(&Key::from("b")), Ok(true));
        assert_eq!(o.discard(&Key::from("b")), Ok(true));
        assert!(o.is_empty());
    }

    /// Invariant: lookups and removals of an unhashable key fail with the
    /// hash error instead of reporting the key as absent.
    #[test]
    fn unhashable_lookup_and_removal_fail() {
        let mut o = KeyOrder::new(Bits64);
        o.add(Key::from("a")).unwrap();
        let list = Key::List(vec![Key::Int(1)]);
        let unhashable = HashError::Unhashable { kind: "list" };
        assert_eq!(o.contains(&list), Err(unhashable));
        assert_eq!(o.discard(&list), Err(unhashable));
        assert_eq!(o.remove(&list), Err(OrderError::Hash(unhashable)));
        assert_eq!(o.len(), 1);
        assert_eq!(o.contains(&Key::from("a")), Ok(true));
    }

    /// Invariant: removals keep the index consistent with the insertion list.
    #[test]
    fn index_survives_middle_removals() {
        let mut o = KeyOrder::new(Bits64);
        for k in strings(1..40) {
            o.add(k).unwrap();
        }
        for x in (1..40).step_by(3) {
            o.remove(&Key::from(x.to_string())).unwrap();
        }
        for x in 1..40u32 {
            assert_eq!(o.contains(&Key::from(x.to_string())), Ok((x - 1) % 3 != 0));
        }
        assert_eq!(o.keys().len(), o.len());
    }

    /// Invariant: pop removes the head of the computed order; empty pops None.
    #[test]
    fn pop_takes_head() {
        let mut o = KeyOrder::new(Bits64);
        for k in strings(0..500) {
            o.add(k).unwrap();
        }
        let head = o.keys().next().cloned();
        assert_eq!(o.pop(), head);
        assert_eq!(o.len(), 499);
        assert_eq!(joined_hash(&o, Bits64), -434_207_861_779_954_688);

        let mut empty: KeyOrder<Key> = KeyOrder::new(Bits64);
        assert_eq!(empty.pop(), None);
    }

    /// Invariant: the cache is reused until a mutation, then rebuilt.
    #[test]
    fn cache_invalidation() {
        let mut o = KeyOrder::new(Bits64);
        o.add(Key::from("x")).unwrap();
        let first: Vec<Key> = o.to_vec();
        assert!(o.order.get().is_some());
        assert_eq!(o.to_vec(), first);
        o.add(Key::from("y")).unwrap();
        assert!(o.order.get().is_none());
        assert_eq!(o.keys().len(), 2);
        o.set_mask(Some(1000));
        assert!(o.order.get().is_none());
    }

    /// Invariant: copy is independent and keeps the same key set.
    #[test]
    fn copy_is_independent() {
        let mut o = KeyOrder::new(Bits64);
        for k in strings(0..500) {
            o.add(k).unwrap();
        }
        let mut c = o.copy();
        assert_eq!(joined_hash(&c, Bits64), 1_141_231_293_364_439_680);
        c.remove(&Key::from("1")).unwrap();
        assert_eq!(o.contains(&Key::from("1")), Ok(true));
        assert_eq!(o.len(), 500);
    }

    /// Invariant: snapshot carries the insertion list and mask; restore replays.
    #[test]
    fn snapshot_restore_replay() {
        let mut o = KeyOrder::new(Bits64);
        for k in strings(0..500) {
            o.add(k).unwrap();
        }
        o.remove(&Key::from("300")).unwrap();
        let snap = o.snapshot();
        assert_eq!(snap.mask, o.mask());
        assert_eq!(snap.keys.len(), 499);

        let restored = KeyOrder::restore(snap.clone(), Bits64).unwrap();
        assert_eq!(joined_hash(&restored, Bits64), 6_818_550_152_093_286_356);
        let again = KeyOrder::restore(snap, Bits64).unwrap();
        assert_eq!(again.to_vec(), restored.to_vec());
    }

    /// Invariant: malformed snapshot masks are rejected.
    #[test]
    fn restore_rejects_bad_mask() {
        let keys: Vec<Key> = strings(0..10).collect();
        let bad = OrderSnapshot { keys: keys.clone(), mask: 12 };
        assert_eq!(
            KeyOrder::restore(bad, Bits64).unwrap_err(),
            OrderError::InvalidSnapshot { mask: 12, len: 10 }
        );
        let small = OrderSnapshot { keys, mask: 7 };
        assert!(KeyOrder::restore(small, Bits64).is_err());
        let tiny: OrderSnapshot<Key> = OrderSnapshot { keys: vec![], mask: 3 };
        assert!(KeyOrder::restore(tiny, Bits64).is_err());
    }

    /// Invariant: large tables switch to 2x growth above the threshold.
    #[test]
    fn large_growth_factor() {
        let mut o = KeyOrder::new(Bits64);
        for k in strings(0..60_000) {
            o.add(k).unwrap();
        }
        assert_eq!(joined_hash(&o, Bits64), -35_326_655_653_467_556);

        let mut o32 = KeyOrder::new(Bits32);
        for k in strings(0..60_000) {
            o32.add(k).unwrap();
        }
        assert_eq!(joined_hash(&o32, Bits32), -1_791_340_678);
    }

    /// Invariant: plain string slices work as keys without the dynamic type.
    #[test]
    fn static_keys() {
        let mut o: KeyOrder<&str> = KeyOrder::new(Bits64);
        for k in ["b", "a", "c"] {
            o.add(k).unwrap();
        }
        let got: Vec<&str> = o.to_vec();
        assert_eq!(got.len(), 3);
        assert_eq!(got, ["a", "c", "b"]);
    }
}
