// Property tests for CollisionSafeMap kept inside the crate so they can
// check the structural invariants of the ordered table directly.

use crate::collision_map::{CollisionSafeMap, Inserted};
use crate::config::MapConfig;
use crate::error::InsertError;
use crate::key::CollisionKey;
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    Remove(usize),
    Contains(usize),
    Clear,
    Settle,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-c]{1,2}", 1..=6).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Contains),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Settle),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

/// Model of the collision rule over an ordered list plus counters.
#[derive(Default)]
struct Model {
    entries: Vec<(String, i32)>,
    counters: HashMap<String, u32>,
}

impl Model {
    fn contains(&self, k: &str) -> bool {
        self.entries.iter().any(|(kk, _)| kk == k)
    }

    fn insert(&mut self, k: String, v: i32) -> Option<String> {
        if !self.contains(&k) {
            self.entries.push((k, v));
            return None;
        }
        let entries = &self.entries;
        self.counters
            .retain(|ck, _| entries.iter().any(|(kk, _)| kk == ck));
        loop {
            let n = self.counters.entry(k.clone()).or_insert(0);
            *n += 1;
            let candidate = format!("{k}_{n}");
            if !self.contains(&candidate) {
                self.entries.push((candidate.clone(), v));
                return Some(candidate);
            }
        }
    }

    fn remove(&mut self, k: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(kk, _)| kk != k);
        before != self.entries.len()
    }
}

// Property: state-machine equivalence against an ordered model of the rule.
// Invariants exercised across random operation sequences:
// - Every insert succeeds for text keys; duplicates land on the model's derived key.
// - The original entry under a requested key is never replaced.
// - Order and contents match the model after each op; index/order never diverge.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut: CollisionSafeMap<String, i32> = CollisionSafeMap::new().with_sink(());
        let mut model = Model::default();

        for op in ops {
            match op {
                OpI::Insert(i, v) => {
                    let k = pool[i].clone();
                    let prior = sut.get(&k).copied();
                    let expected = model.insert(k.clone(), v);
                    match sut.insert(k.clone(), v) {
                        Ok(Inserted::Direct(h)) => {
                            prop_assert!(expected.is_none());
                            prop_assert_eq!(sut.resolve(h), Some((&k, &v)));
                        }
                        Ok(Inserted::Derived { key, .. }) => {
                            prop_assert_eq!(Some(key), expected);
                            prop_assert_eq!(sut.get(&k).copied(), prior, "original entry replaced");
                        }
                        other => prop_assert!(false, "unexpected result: {:?}", other),
                    }
                    prop_assert!(sut.contains_key(&k));
                }
                OpI::Remove(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.remove(k), model.remove(k));
                }
                OpI::Contains(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.contains_key(k), model.contains(k));
                }
                OpI::Clear => {
                    sut.clear();
                    model.entries.clear();
                    model.counters.clear();
                }
                OpI::Settle => {
                    let settled = sut.settle();
                    prop_assert!(settled.applied.is_empty() && settled.failed.is_empty());
                }
            }

            sut.assert_consistent();
            let seen: Vec<(String, i32)> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
            prop_assert_eq!(&seen, &model.entries);
            prop_assert_eq!(sut.len(), model.entries.len());
        }
    }
}

// Property: deferred mode agrees with the model once the queue is settled.
// - A colliding insert is queued, never visible, and never touches the original.
// - Settling applies the queue in order; a key freed meanwhile is used as is.
// - Clear drops queued inserts along with the entries.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_deferred((pool, ops) in arb_scenario()) {
        let mut sut: CollisionSafeMap<String, i32> =
            CollisionSafeMap::with_config(MapConfig::default().deferred(Duration::from_secs(60)))
                .with_sink(());
        let mut model = Model::default();
        let mut queued: Vec<(String, i32)> = Vec::new();

        let settle = |sut: &mut CollisionSafeMap<String, i32>,
                      model: &mut Model,
                      queued: &mut Vec<(String, i32)>|
         -> Result<(), TestCaseError> {
            let settled = sut.settle();
            prop_assert!(settled.failed.is_empty());
            let expected: Vec<String> = queued
                .drain(..)
                .map(|(k, v)| model.insert(k.clone(), v).unwrap_or(k))
                .collect();
            prop_assert_eq!(settled.applied, expected);
            Ok(())
        };

        for op in ops {
            match op {
                OpI::Insert(i, v) => {
                    let k = pool[i].clone();
                    let prior = sut.get(&k).copied();
                    match sut.insert(k.clone(), v) {
                        Ok(Inserted::Direct(_)) => {
                            prop_assert!(!model.contains(&k));
                            prop_assert_eq!(model.insert(k.clone(), v), None);
                        }
                        Ok(Inserted::Deferred(_)) => {
                            prop_assert!(model.contains(&k));
                            prop_assert_eq!(sut.get(&k).copied(), prior, "original entry replaced");
                            queued.push((k, v));
                        }
                        other => prop_assert!(false, "unexpected result: {:?}", other),
                    }
                }
                OpI::Remove(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.remove(k), model.remove(k));
                }
                OpI::Contains(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.contains_key(k), model.contains(k));
                }
                OpI::Clear => {
                    sut.clear();
                    model.entries.clear();
                    model.counters.clear();
                    queued.clear();
                }
                OpI::Settle => settle(&mut sut, &mut model, &mut queued)?,
            }

            prop_assert_eq!(sut.pending_len(), queued.len());
            sut.assert_consistent();
            let seen: Vec<(String, i32)> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
            prop_assert_eq!(&seen, &model.entries);
        }

        settle(&mut sut, &mut model, &mut queued)?;
        prop_assert_eq!(sut.pending_len(), 0);
        let seen: Vec<(String, i32)> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(&seen, &model.entries);
    }
}

// Property: a bounded integer domain either places the value on a fresh key or
// reports exhaustion; it never overwrites and never loops past the bound.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_narrow_domain_terminates(keys in proptest::collection::vec(0u8..4, 1..40), bound in 1u32..6) {
        let mut sut: CollisionSafeMap<u8, usize> =
            CollisionSafeMap::with_config(MapConfig::default().max_collision_attempts(bound)).with_sink(());
        for (i, k) in keys.into_iter().enumerate() {
            let len = sut.len();
            match sut.insert(k, i) {
                Ok(ins) => {
                    prop_assert_eq!(sut.len(), len + 1);
                    let placed = ins.derived_key().copied().unwrap_or(k);
                    prop_assert_eq!(sut.get(&placed), Some(&i));
                }
                Err(InsertError::CollisionResolutionExhausted { attempts, .. }) => {
                    prop_assert_eq!(attempts, bound);
                    prop_assert_eq!(sut.len(), len);
                }
                Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
            }
            sut.assert_consistent();
        }
    }
}

// Property: a snapshot restored into a fresh map (immediate or deferred and
// settled) reproduces the same ordered key/value list.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_snapshot_restore(pairs in proptest::collection::vec((any::<i16>(), any::<u8>()), 0..40)) {
        let src: CollisionSafeMap<i16, u8> = pairs.into_iter().collect();
        let snapshot = src.prepare_for_persist();

        let mut fresh: CollisionSafeMap<i16, u8> = CollisionSafeMap::new();
        let report = fresh.restore_from_persist(snapshot.clone());
        prop_assert!(report.derived.is_empty());
        prop_assert_eq!(fresh.prepare_for_persist(), snapshot.clone());

        let mut deferred: CollisionSafeMap<i16, u8> =
            CollisionSafeMap::with_config(MapConfig::default().deferred(Duration::from_secs(60)));
        deferred.restore_from_persist(snapshot.clone());
        prop_assert_eq!(deferred.pending_len(), 0, "snapshot keys are unique");
        prop_assert_eq!(deferred.prepare_for_persist(), snapshot);
    }
}

#[test]
fn derive_rule_matches_model_for_suffixed_keys() {
    // "a_1" is taken directly, so the first collision on "a" skips to "a_2".
    let mut sut: CollisionSafeMap<String, i32> = CollisionSafeMap::new().with_sink(());
    let mut model = Model::default();
    for (k, v) in [("a", 0), ("a_1", 1), ("a", 2), ("a", 3)] {
        let got = sut.insert(k.to_string(), v).unwrap().derived_key().cloned();
        assert_eq!(got, model.insert(k.to_string(), v));
    }
    assert_eq!(sut.get("a_2"), Some(&2));
    assert_eq!(sut.get("a_3"), Some(&3));
    assert_eq!(String::from("a").derive_key(2), Ok(Some("a_2".to_string())));
}
