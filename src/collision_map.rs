//! CollisionSafeMap: public API over the ordered table.
//!
//! Adds the collision-counter table, bounded key derivation, deferred
//! application of colliding inserts and diagnostic reporting.

use crate::config::{InsertMode, MapConfig};
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{IndexOutOfRange, InsertError};
use crate::key::CollisionKey;
use crate::ordered_table::{Handle, Iter, IterMut, Occupied, OrderedTable};
use crate::pending::{PendingQueue, Ticket};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;
use std::time::Instant;
use tracing::Level;

/// Result of a successful [`CollisionSafeMap::insert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inserted<K> {
    /// Stored under the requested key.
    Direct(Handle),
    /// The requested key was taken; stored under `key` instead.
    Derived { key: K, handle: Handle },
    /// The requested key was taken; the insert is queued.
    Deferred(Ticket),
}

impl<K> Inserted<K> {
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Inserted::Direct(h) | Inserted::Derived { handle: h, .. } => Some(*h),
            Inserted::Deferred(_) => None,
        }
    }

    /// The key the value ended up under, if it differs from the requested one.
    pub fn derived_key(&self) -> Option<&K> {
        match self {
            Inserted::Derived { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Outcome of applying queued inserts.
#[derive(Debug, Default)]
pub struct Settled<K> {
    /// Key each applied insert landed on, in application order.
    pub applied: Vec<K>,
    pub failed: Vec<InsertError>,
}

/// Insertion-ordered map that never overwrites or rejects a duplicate key:
/// the duplicate is stored under a key derived from the requested one.
///
/// ```
/// use collision_map::CollisionSafeMap;
///
/// let mut m = CollisionSafeMap::new();
/// m.insert("a".to_string(), 1).unwrap();
/// m.insert("a".to_string(), 2).unwrap();
/// assert_eq!(m.get("a"), Some(&1));
/// assert_eq!(m.get("a_1"), Some(&2));
/// ```
pub struct CollisionSafeMap<K, V, S = RandomState> {
    table: OrderedTable<K, V, S>,
    collisions: hashbrown::HashMap<K, u32, S>,
    pending: PendingQueue<K, V>,
    config: MapConfig,
    sink: Box<dyn DiagnosticSink>,
}

impl<K, V> CollisionSafeMap<K, V>
where
    K: CollisionKey,
{
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    pub fn with_config(config: MapConfig) -> Self {
        Self::with_config_and_hasher(config, Default::default())
    }

    /// Builds a map through the regular insert path, so duplicate keys in
    /// `pairs` are remapped rather than lost.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut m = Self::new();
        m.extend(pairs);
        m
    }
}

impl<K, V> Default for CollisionSafeMap<K, V>
where
    K: CollisionKey,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> CollisionSafeMap<K, V, S>
where
    K: CollisionKey,
    S: BuildHasher + Clone,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_config_and_hasher(MapConfig::default(), hasher)
    }

    pub fn with_config_and_hasher(config: MapConfig, hasher: S) -> Self {
        Self {
            table: OrderedTable::with_hasher(hasher.clone()),
            collisions: hashbrown::HashMap::with_hasher(hasher),
            pending: PendingQueue::default(),
            config,
            sink: Box::new(TracingSink),
        }
    }

    /// Replaces the diagnostic sink.
    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.contains_key(q)
    }

    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.table.iter().any(|(_, v)| v == value)
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.get(q)
    }

    /// Mutable access to an existing value. Keys cannot be changed in place.
    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.get_mut(q)
    }

    /// Entry behind a handle returned by `insert`, while it is still present.
    pub fn resolve(&self, handle: Handle) -> Option<(&K, &V)> {
        self.table.resolve(handle)
    }

    /// Inserts `value` under `key`, or under a derived key when `key` is
    /// already present. The existing entry is never touched.
    ///
    /// In deferred mode a colliding insert is queued and
    /// [`Inserted::Deferred`] is returned; the entry appears once the queue
    /// is run.
    pub fn insert(&mut self, key: K, value: V) -> Result<Inserted<K>, InsertError> {
        let Occupied { key, value } = match self.table.insert(key, value) {
            Ok(handle) => {
                if let Some(key) = self.table.resolve(handle).map(|(k, _)| k) {
                    self.report(Level::DEBUG, || Diagnostic::NewKey {
                        key: format!("{key:?}"),
                    });
                }
                return Ok(Inserted::Direct(handle));
            }
            Err(occupied) => occupied,
        };

        match self.config.insert_mode {
            InsertMode::Immediate => self.insert_colliding(key, value),
            InsertMode::Deferred { delay } => {
                let requested = self.sink.enabled(Level::INFO).then(|| format!("{key:?}"));
                let ticket = self.pending.push(key, value, Instant::now() + delay);
                if let Some(requested) = requested {
                    self.sink.record(&Diagnostic::Deferred { requested, ticket });
                }
                Ok(Inserted::Deferred(ticket))
            }
        }
    }

    fn insert_colliding(&mut self, key: K, value: V) -> Result<Inserted<K>, InsertError> {
        let derived = self.derive_unique_key(&key)?;
        match self.table.insert(derived.clone(), value) {
            Ok(handle) => {
                self.report(Level::INFO, || Diagnostic::KeyCollision {
                    requested: format!("{key:?}"),
                    derived: format!("{derived:?}"),
                });
                Ok(Inserted::Derived {
                    key: derived,
                    handle,
                })
            }
            // derive_unique_key only returns absent keys.
            Err(Occupied { key: taken, .. }) => Err(self.exhausted(&taken, 0)),
        }
    }

    /// Finds a key derived from `key` that is absent from the map, advancing
    /// `key`'s collision counter once per candidate.
    fn derive_unique_key(&mut self, key: &K) -> Result<K, InsertError> {
        let table = &self.table;
        self.collisions.retain(|k, _| table.contains_key(k));

        let limit = self.config.max_collision_attempts.max(1);
        for _ in 0..limit {
            let n = {
                let counter = self.collisions.entry(key.clone()).or_insert(0);
                *counter = counter.saturating_add(1);
                *counter
            };
            match key.derive_key(n) {
                Ok(Some(candidate)) if !self.table.contains_key(&candidate) => {
                    return Ok(candidate);
                }
                Ok(_) => continue,
                Err(unsupported) => {
                    self.sink.record(&Diagnostic::UnsupportedKeyType {
                        type_name: unsupported.type_name,
                        underlying: unsupported.underlying,
                    });
                    return Err(unsupported.into());
                }
            }
        }
        Err(self.exhausted(key, limit))
    }

    /// Hands the event built by `event` to the sink, if it keeps `level`.
    fn report(&self, level: Level, event: impl FnOnce() -> Diagnostic) {
        if self.sink.enabled(level) {
            self.sink.record(&event());
        }
    }

    fn exhausted(&self, key: &K, attempts: u32) -> InsertError {
        let requested = format!("{key:?}");
        self.sink.record(&Diagnostic::CollisionResolutionExhausted {
            requested: requested.clone(),
            attempts,
        });
        InsertError::CollisionResolutionExhausted {
            key: requested,
            attempts,
        }
    }

    /// Current collision counter for `key`, as last advanced by a colliding
    /// insert. Counters of removed keys are pruned on the next collision.
    pub fn collision_count<Q>(&self, q: &Q) -> u32
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.collisions.get(q).copied().unwrap_or(0)
    }

    /// Removes `key` and its place in the order. Returns whether it was present.
    pub fn remove<Q>(&mut self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove(q).is_some()
    }

    /// Removes `key`, returning its value.
    pub fn take<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove(q).map(|(_, v)| v)
    }

    /// Empties the map, its collision counters and any queued inserts.
    pub fn clear(&mut self) {
        self.table.clear();
        self.collisions.clear();
        self.pending.clear();
    }

    pub fn key_at(&self, index: usize) -> Result<&K, IndexOutOfRange> {
        self.get_index(index).map(|(k, _)| k).ok_or(IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    pub fn value_at(&self, index: usize) -> Result<&V, IndexOutOfRange> {
        self.get_index(index).map(|(_, v)| v).ok_or(IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    pub fn get_index(&self, index: usize) -> Option<(&K, &V)> {
        self.table.get_index(index)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.table.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.table.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.table.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.table.iter().map(|(_, v)| v)
    }

    /// Number of colliding inserts waiting to be applied.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops a queued insert, handing back its entry.
    pub fn cancel(&mut self, ticket: Ticket) -> Option<(K, V)> {
        self.pending.cancel(ticket)
    }

    /// Applies queued inserts whose delay has elapsed by `now`.
    pub fn run_due(&mut self, now: Instant) -> Settled<K> {
        let due = self.pending.take_due(now);
        self.apply(due)
    }

    /// Applies every queued insert regardless of its delay.
    pub fn settle(&mut self) -> Settled<K> {
        let all = self.pending.drain();
        self.apply(all)
    }

    fn apply(&mut self, batch: Vec<crate::pending::PendingInsert<K, V>>) -> Settled<K> {
        let mut out = Settled {
            applied: Vec::with_capacity(batch.len()),
            failed: Vec::new(),
        };
        for p in batch {
            // The requested key may have been removed while queued.
            let result = match self.table.insert(p.key, p.value) {
                Ok(handle) => Ok(self.table.resolve(handle).map(|(k, _)| k.clone())),
                Err(Occupied { key, value }) => {
                    self.insert_colliding(key, value).map(|ins| ins.derived_key().cloned())
                }
            };
            match result {
                Ok(Some(k)) => out.applied.push(k),
                Ok(None) => {}
                Err(e) => out.failed.push(e),
            }
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.table.assert_consistent();
    }
}

impl<K, V, S> Extend<(K, V)> for CollisionSafeMap<K, V, S>
where
    K: CollisionKey,
    S: BuildHasher + Clone,
{
    /// Inserts every pair, discarding the per-pair outcome. Failed colliding
    /// inserts are reported to the sink and skipped. In deferred mode
    /// colliding pairs stay queued without a ticket being handed out, so they
    /// can only be applied with [`run_due`](CollisionSafeMap::run_due) or
    /// [`settle`](CollisionSafeMap::settle), not cancelled. Use
    /// [`insert`](CollisionSafeMap::insert) to keep each outcome.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            let _ = self.insert(k, v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for CollisionSafeMap<K, V>
where
    K: CollisionKey,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl<'a, K, V, S> IntoIterator for &'a CollisionSafeMap<K, V, S>
where
    K: CollisionKey,
    S: BuildHasher + Clone,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S> fmt::Debug for CollisionSafeMap<K, V, S>
where
    K: CollisionKey,
    V: fmt::Debug,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
