//! Persisted form of a map: an ordered list of `{key, value}` pairs.
//!
//! `prepare_for_persist` takes the ordered snapshot; `restore_from_persist`
//! rebuilds the map from one. Restoring goes through the ordinary insert
//! path, so duplicate keys introduced by hand-edited documents are remapped
//! by the collision rule instead of silently overwriting each other.

use crate::collision_map::{CollisionSafeMap, Inserted};
use crate::config::MapConfig;
use crate::error::{InsertError, PersistError};
use crate::key::CollisionKey;
use core::fmt;
use core::hash::BuildHasher;
use core::marker::PhantomData;
use serde::de::{Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// One persisted entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> From<(K, V)> for Pair<K, V> {
    fn from((key, value): (K, V)) -> Self {
        Pair { key, value }
    }
}

#[derive(Serialize)]
struct PairRef<'a, K, V> {
    key: &'a K,
    value: &'a V,
}

/// What `restore_from_persist` did with the pairs it was given.
#[derive(Debug)]
pub struct RestoreReport<K> {
    /// Pairs stored, under their own or a derived key.
    pub restored: usize,
    /// Derived keys assigned to duplicate pairs, in document order.
    pub derived: Vec<K>,
    /// Pairs queued because the map runs in deferred mode.
    pub deferred: usize,
    /// Pairs discarded by the remap filter.
    pub filtered: usize,
    /// Duplicate pairs that could not be placed.
    pub failed: Vec<InsertError>,
}

impl<K> Default for RestoreReport<K> {
    fn default() -> Self {
        Self {
            restored: 0,
            derived: Vec::new(),
            deferred: 0,
            filtered: 0,
            failed: Vec::new(),
        }
    }
}

impl<K, V, S> CollisionSafeMap<K, V, S>
where
    K: CollisionKey,
    S: BuildHasher + Clone,
{
    /// Ordered snapshot of the map for an external persistence layer.
    pub fn prepare_for_persist(&self) -> Vec<Pair<K, V>>
    where
        V: Clone,
    {
        self.iter()
            .map(|(k, v)| Pair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }

    /// Replaces the map's contents with `pairs`.
    ///
    /// Pairs whose key is not present in the current contents are dropped
    /// first, unless that would drop all of them; a fresh map therefore
    /// keeps every pair. The map (counters and queued inserts included) is
    /// then cleared and the surviving pairs are inserted in order.
    pub fn restore_from_persist<I, P>(&mut self, pairs: I) -> RestoreReport<K>
    where
        I: IntoIterator<Item = P>,
        P: Into<Pair<K, V>>,
    {
        let pairs: Vec<Pair<K, V>> = pairs.into_iter().map(Into::into).collect();
        let total = pairs.len();
        let (known, unknown): (Vec<_>, Vec<_>) =
            pairs.into_iter().partition(|p| self.contains_key(&p.key));
        let kept = if known.is_empty() {
            unknown
        } else {
            known
        };

        let mut report = RestoreReport {
            filtered: total - kept.len(),
            ..RestoreReport::default()
        };

        self.clear();
        for Pair { key, value } in kept {
            match self.insert(key, value) {
                Ok(Inserted::Direct(_)) => report.restored += 1,
                Ok(Inserted::Derived { key, .. }) => {
                    report.restored += 1;
                    report.derived.push(key);
                }
                Ok(Inserted::Deferred(_)) => report.deferred += 1,
                Err(e) => report.failed.push(e),
            }
        }
        tracing::debug!(
            restored = report.restored,
            derived = report.derived.len(),
            deferred = report.deferred,
            filtered = report.filtered,
            failed = report.failed.len(),
            "restored map from persisted pairs"
        );
        report
    }

    /// Restores from a JSON document produced by [`to_json`].
    pub fn restore_from_json(&mut self, text: &str) -> Result<RestoreReport<K>, PersistError>
    where
        K: for<'de> Deserialize<'de>,
        V: for<'de> Deserialize<'de>,
    {
        check_size(text, self.config().max_document_bytes)?;
        let pairs: Vec<Pair<K, V>> = serde_json::from_str(text)?;
        Ok(self.restore_from_persist(pairs))
    }
}

fn check_size(text: &str, max: usize) -> Result<(), PersistError> {
    if text.len() > max {
        tracing::error!(len = text.len(), max, "persisted document too large");
        return Err(PersistError::DocumentTooLarge {
            len: text.len(),
            max,
        });
    }
    Ok(())
}

/// Pretty-printed JSON array of `{key, value}` objects in insertion order.
pub fn to_json<K, V, S>(map: &CollisionSafeMap<K, V, S>) -> Result<String, PersistError>
where
    K: CollisionKey + Serialize,
    V: Serialize,
    S: BuildHasher + Clone,
{
    let text = serde_json::to_string_pretty(map)?;
    if text.len() > map.config().max_document_bytes {
        tracing::warn!(
            len = text.len(),
            max = map.config().max_document_bytes,
            "persisted document exceeds the configured load limit"
        );
    }
    Ok(text)
}

/// Builds a fresh map with `config` from a JSON document.
pub fn from_json<K, V>(text: &str, config: MapConfig) -> Result<CollisionSafeMap<K, V>, PersistError>
where
    K: CollisionKey + for<'de> Deserialize<'de>,
    V: for<'de> Deserialize<'de>,
{
    let mut map = CollisionSafeMap::with_config(config);
    map.restore_from_json(text)?;
    Ok(map)
}

impl<K, V, S> Serialize for CollisionSafeMap<K, V, S>
where
    K: CollisionKey + Serialize,
    V: Serialize,
    S: BuildHasher + Clone,
{
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for (key, value) in self.iter() {
            seq.serialize_element(&PairRef { key, value })?;
        }
        seq.end()
    }
}

struct MapVisitor<K, V, S>(PhantomData<fn() -> CollisionSafeMap<K, V, S>>);

impl<'de, K, V, S> Visitor<'de> for MapVisitor<K, V, S>
where
    K: CollisionKey + Deserialize<'de>,
    V: Deserialize<'de>,
    S: BuildHasher + Clone + Default,
{
    type Value = CollisionSafeMap<K, V, S>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence of {key, value} pairs")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut pairs: Vec<Pair<K, V>> = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(pair) = seq.next_element()? {
            pairs.push(pair);
        }
        let mut map = CollisionSafeMap::with_config_and_hasher(MapConfig::default(), S::default());
        map.restore_from_persist(pairs);
        Ok(map)
    }
}

impl<'de, K, V, S> Deserialize<'de> for CollisionSafeMap<K, V, S>
where
    K: CollisionKey + Deserialize<'de>,
    V: Deserialize<'de>,
    S: BuildHasher + Clone + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(MapVisitor(PhantomData))
    }
}
