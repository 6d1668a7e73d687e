//! LegacySet: a set that enumerates in legacy order.

use crate::error::{HashError, OrderError};
use crate::key_order::{KeyOrder, Keys, OrderSnapshot};
use crate::legacy_dict::check_restored;
use crate::legacy_hash::LegacyHash;
use crate::width::WordWidth;
use core::fmt;
use core::hash::Hash;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// A set of `K` that enumerates in legacy order.
pub struct LegacySet<K> {
    order: KeyOrder<K>,
    items: HashSet<K>,
}

/// Persisted form of a [`LegacySet`]: the ordering snapshot plus members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetState<K> {
    pub order: OrderSnapshot<K>,
    pub items: Vec<K>,
}

impl<K> LegacySet<K>
where
    K: LegacyHash + Eq + Hash + Clone,
{
    pub fn new(width: WordWidth) -> Self {
        Self {
            order: KeyOrder::new(width),
            items: HashSet::new(),
        }
    }

    pub fn from_keys<I>(width: WordWidth, keys: I) -> Result<Self, HashError>
    where
        I: IntoIterator<Item = K>,
    {
        let mut s = Self::new(width);
        s.extend(keys)?;
        Ok(s)
    }

    pub fn width(&self) -> WordWidth {
        self.order.width()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn key_order(&self) -> &KeyOrder<K> {
        &self.order
    }

    pub fn contains(&self, key: &K) -> bool {
        self.items.contains(key)
    }

    /// Returns whether the key was newly added.
    pub fn add(&mut self, key: K) -> Result<bool, HashError> {
        self.order.add(key.clone())?;
        Ok(self.items.insert(key))
    }

    /// Strict removal: `MissingKey` if absent.
    pub fn remove(&mut self, key: &K) -> Result<(), OrderError> {
        if self.discard(key)? {
            Ok(())
        } else {
            Err(OrderError::MissingKey)
        }
    }

    /// Lenient removal. Returns whether the key was present; an unhashable
    /// key is still an error.
    pub fn discard(&mut self, key: &K) -> Result<bool, HashError> {
        self.order.discard(key)?;
        Ok(self.items.remove(key))
    }

    /// Remove the first key in enumeration order.
    pub fn pop(&mut self) -> Option<K> {
        let key = self.order.pop()?;
        self.items.remove(&key);
        Some(key)
    }

    /// Bulk update from another set, presized by its size.
    pub fn update(&mut self, other: &LegacySet<K>) -> Result<(), HashError> {
        self.order.merge(other.iter().cloned(), other.len())?;
        self.items.extend(other.items.iter().cloned());
        Ok(())
    }

    pub fn extend<I>(&mut self, keys: I) -> Result<(), HashError>
    where
        I: IntoIterator<Item = K>,
    {
        for k in keys {
            self.add(k)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.order = KeyOrder::new(self.order.width());
        self.items.clear();
    }

    pub fn copy(&self) -> Self {
        Self {
            order: self.order.copy(),
            items: self.items.clone(),
        }
    }

    pub fn iter(&self) -> Keys<'_, K> {
        self.order.keys()
    }

    pub fn to_state(&self) -> SetState<K> {
        SetState {
            order: self.order.snapshot(),
            items: self.items.iter().cloned().collect(),
        }
    }

    /// Rebuild from persisted state by replay; the order must track exactly
    /// the truthy members.
    pub fn from_state(state: SetState<K>, width: WordWidth) -> Result<Self, OrderError> {
        let order = KeyOrder::restore(state.order, width)?;
        let items: HashSet<K> = state.items.into_iter().collect();
        check_restored(&order, items.iter(), |k| items.contains(k))?;
        Ok(Self { order, items })
    }
}

impl<'a, K> IntoIterator for &'a LegacySet<K>
where
    K: LegacyHash + Eq + Hash + Clone,
{
    type Item = &'a K;
    type IntoIter = Keys<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K> PartialEq for LegacySet<K>
where
    K: Eq + Hash,
{
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<K> fmt::Display for LegacySet<K>
where
    K: LegacyHash + Eq + Hash + Clone + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("set([")?;
        for (i, k) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}'", k)?;
        }
        f.write_str("])")
    }
}

impl<K> fmt::Debug for LegacySet<K>
where
    K: LegacyHash + Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
