//! OrderedTable: structural layer with stable handles, insertion order and a
//! debug reentrancy guard.
//!
//! The table never resolves collisions itself: a duplicate insert hands the
//! entry back to the caller so the layer above can derive a new key.

use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_table::Entry as TableEntry;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

/// Stable reference to a live entry. Handles are generational: once the
/// entry is removed the handle never resolves again, even if its slot is
/// reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    fn raw(self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    hash: u64,
}

pub(crate) struct OrderedTable<K, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Slot<K, V>>,
    order: Vec<DefaultKey>,
    reentrancy: DebugReentrancy,
}

/// Returned when the key is already present; carries the rejected entry.
#[derive(Debug)]
pub(crate) struct Occupied<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

impl<K, V, S> OrderedTable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub(crate) fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            slots: SlotMap::with_key(),
            order: Vec::new(),
            reentrancy: DebugReentrancy::new(),
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn locate<Q>(&self, q: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|s| s.key.borrow() == q)
                    .unwrap_or(false)
            })
            .copied()
    }

    pub(crate) fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.locate(q).is_some()
    }

    /// Appends a new entry at the end of the order, or hands the entry back
    /// untouched when the key is already present.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Result<Handle, Occupied<K, V>> {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(&key);
        let slots = &self.slots;
        match self.index.entry(
            hash,
            |&kk| slots.get(kk).map(|s| s.key == key).unwrap_or(false),
            |&kk| slots.get(kk).map(|s| s.hash).unwrap_or(0),
        ) {
            TableEntry::Occupied(_) => Err(Occupied { key, value }),
            TableEntry::Vacant(v) => {
                let k = self.slots.insert(Slot { key, value, hash });
                v.insert(k);
                self.order.push(k);
                Ok(Handle(k))
            }
        }
    }

    pub(crate) fn remove<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let k = self.locate(q)?;
        let slot = self.slots.remove(k)?;
        if let Ok(occupied) = self.index.find_entry(slot.hash, |&kk| kk == k) {
            occupied.remove();
        }
        self.order.retain(|&kk| kk != k);
        Some((slot.key, slot.value))
    }

    pub(crate) fn clear(&mut self) {
        let _g = self.reentrancy.enter();
        self.index.clear();
        self.order.clear();
        self.slots.clear();
    }

    pub(crate) fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let k = self.locate(q)?;
        self.slots.get(k).map(|s| &s.value)
    }

    pub(crate) fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let k = self.locate(q)?;
        self.slots.get_mut(k).map(|s| &mut s.value)
    }

    pub(crate) fn resolve(&self, h: Handle) -> Option<(&K, &V)> {
        self.slots.get(h.raw()).map(|s| (&s.key, &s.value))
    }

    /// Entry at position `i` of the insertion order.
    pub(crate) fn get_index(&self, i: usize) -> Option<(&K, &V)> {
        let &k = self.order.get(i)?;
        self.slots.get(k).map(|s| (&s.key, &s.value))
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            order: self.order.iter(),
            slots: &self.slots,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        // Slot iteration order is not insertion order; rank slots first.
        let mut ranked: Vec<(usize, &K, &mut V)> = Vec::with_capacity(self.order.len());
        let rank: hashbrown::HashMap<DefaultKey, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &k)| (k, i))
            .collect();
        for (k, slot) in self.slots.iter_mut() {
            if let Some(&i) = rank.get(&k) {
                ranked.push((i, &slot.key, &mut slot.value));
            }
        }
        ranked.sort_unstable_by_key(|(i, _, _)| *i);
        IterMut {
            it: ranked.into_iter(),
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.order.len(), self.slots.len(), "order and slots diverge");
        assert_eq!(self.index.len(), self.slots.len(), "index and slots diverge");
        let mut seen = std::collections::HashSet::new();
        for &k in &self.order {
            assert!(seen.insert(k), "duplicate entry in order");
            let slot = self.slots.get(k).expect("order refers to a live slot");
            assert_eq!(self.locate(&slot.key), Some(k), "index does not map key to its slot");
        }
    }
}

/// Insertion-ordered iterator over `(&K, &V)`.
pub struct Iter<'a, K, V> {
    order: core::slice::Iter<'a, DefaultKey>,
    slots: &'a SlotMap<DefaultKey, Slot<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let &k = self.order.next()?;
        self.slots.get(k).map(|s| (&s.key, &s.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Insertion-ordered iterator over `(&K, &mut V)`.
pub struct IterMut<'a, K, V> {
    it: std::vec::IntoIter<(usize, &'a K, &'a mut V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
