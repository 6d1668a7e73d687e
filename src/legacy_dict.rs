//! LegacyDict: a mapping that enumerates in legacy order.
//!
//! Storage is a plain `hashbrown::HashMap`; a `KeyOrder` alongside it is
//! told about every membership change and decides enumeration order.

use crate::error::{HashError, OrderError};
use crate::key_order::{KeyOrder, Keys, OrderSnapshot};
use crate::legacy_hash::LegacyHash;
use crate::width::WordWidth;
use core::fmt;
use core::hash::Hash;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// A map from `K` to `V` that enumerates in legacy order.
pub struct LegacyDict<K, V> {
    order: KeyOrder<K>,
    map: HashMap<K, V>,
}

/// Persisted form of a [`LegacyDict`]: the ordering snapshot plus entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DictState<K, V> {
    pub order: OrderSnapshot<K>,
    pub items: Vec<(K, V)>,
}

impl<K, V> LegacyDict<K, V>
where
    K: LegacyHash + Eq + Hash + Clone,
{
    pub fn new(width: WordWidth) -> Self {
        Self {
            order: KeyOrder::new(width),
            map: HashMap::new(),
        }
    }

    /// Build from `(key, value)` pairs, inserting one at a time.
    pub fn from_pairs<I>(width: WordWidth, pairs: I) -> Result<Self, HashError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut d = Self::new(width);
        d.extend(pairs)?;
        Ok(d)
    }

    /// Every key mapped to a clone of `value`.
    pub fn from_keys<I>(width: WordWidth, keys: I, value: V) -> Result<Self, HashError>
    where
        I: IntoIterator<Item = K>,
        V: Clone,
    {
        let mut d = Self::new(width);
        for k in keys {
            d.insert(k, value.clone())?;
        }
        Ok(d)
    }

    pub fn width(&self) -> WordWidth {
        self.order.width()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The ordering engine backing this dict.
    pub fn key_order(&self) -> &KeyOrder<K> {
        &self.order
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.map.get_mut(key)
    }

    /// Insert or replace. On a hash failure the dict is left unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, HashError> {
        self.order.add(key.clone())?;
        Ok(self.map.insert(key, value))
    }

    /// Strict delete: `MissingKey` if absent.
    pub fn remove(&mut self, key: &K) -> Result<V, OrderError> {
        self.order.discard(key)?;
        self.map.remove(key).ok_or(OrderError::MissingKey)
    }

    /// Lenient delete. An unhashable key is still an error.
    pub fn pop(&mut self, key: &K) -> Result<Option<V>, HashError> {
        self.order.discard(key)?;
        Ok(self.map.remove(key))
    }

    /// Remove the first entry in enumeration order.
    pub fn pop_item(&mut self) -> Option<(K, V)> {
        let key = self.order.pop()?;
        let value = self.map.remove(&key)?;
        Some((key, value))
    }

    /// Bulk update from another dict: presize by its size, then take its
    /// keys in its enumeration order.
    pub fn update(&mut self, other: &LegacyDict<K, V>) -> Result<(), HashError>
    where
        V: Clone,
    {
        self.order.merge(other.keys().cloned(), other.len())?;
        for (k, v) in other.map.iter() {
            self.map.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    /// Insert pairs one by one, without bulk presizing.
    pub fn extend<I>(&mut self, pairs: I) -> Result<(), HashError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in pairs {
            self.insert(k, v)?;
        }
        Ok(())
    }

    /// Drop all entries; ordering restarts from an empty table.
    pub fn clear(&mut self) {
        self.order = KeyOrder::new(self.order.width());
        self.map.clear();
    }

    pub fn copy(&self) -> Self
    where
        V: Clone,
    {
        Self {
            order: self.order.copy(),
            map: self.map.clone(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K> {
        self.order.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            keys: self.order.keys(),
            map: &self.map,
        }
    }

    pub fn to_state(&self) -> DictState<K, V>
    where
        V: Clone,
    {
        DictState {
            order: self.order.snapshot(),
            items: self
                .map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Rebuild from persisted state; the order is replayed, not copied.
    ///
    /// The replayed order must track exactly the truthy stored keys,
    /// otherwise `StateMismatch`.
    pub fn from_state(state: DictState<K, V>, width: WordWidth) -> Result<Self, OrderError> {
        let order = KeyOrder::restore(state.order, width)?;
        let map: HashMap<K, V> = state.items.into_iter().collect();
        check_restored(&order, map.keys(), |k| map.contains_key(k))?;
        Ok(Self { order, map })
    }
}

// Every ordered key must be stored, and the truthy stored keys must number
// exactly the ordered ones. Ordered keys are distinct and truthy, so the two
// sets are then equal.
pub(crate) fn check_restored<'a, K, I>(
    order: &KeyOrder<K>,
    stored: I,
    is_stored: impl Fn(&K) -> bool,
) -> Result<(), OrderError>
where
    K: LegacyHash + Eq + 'a,
    I: Iterator<Item = &'a K>,
{
    let tracked = order.len();
    let enumerable = stored.filter(|k| !k.is_falsy()).count();
    if enumerable != tracked || !order.keys().all(|k| is_stored(k)) {
        return Err(OrderError::StateMismatch {
            tracked,
            stored: enumerable,
        });
    }
    Ok(())
}

/// Entries in legacy enumeration order.
pub struct Iter<'a, K, V> {
    keys: Keys<'a, K>,
    map: &'a HashMap<K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Eq + Hash,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.map;
        self.keys.by_ref().find_map(|k| map.get_key_value(k))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.keys.size_hint().1)
    }
}

impl<'a, K, V> IntoIterator for &'a LegacyDict<K, V>
where
    K: LegacyHash + Eq + Hash + Clone,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V> PartialEq for LegacyDict<K, V>
where
    K: Eq + Hash,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K, V> fmt::Display for LegacyDict<K, V>
where
    K: LegacyHash + Eq + Hash + Clone + fmt::Display,
    V: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", k, v)?;
        }
        f.write_str("}")
    }
}

impl<K, V> fmt::Debug for LegacyDict<K, V>
where
    K: LegacyHash + Eq + Hash + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
