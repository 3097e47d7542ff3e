#![cfg(test)]

// Property tests for InsertionOrderedMap kept inside the crate so they can
// observe the exposure flag and check storage invariants.

use crate::{InsertionOrderedMap, KeyNotFound};
use proptest::prelude::*;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

const MAPS: usize = 3;

// Ops address one of MAPS map slots and a key from a small pool.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, usize, i32),
    Remove(usize, usize),
    AtMut(usize, usize, i32),
    Indexed(usize, usize, i32),
    Merge(usize, usize),
    CloneInto(usize, usize),
    Clear(usize),
    Contains(usize, String),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,4}", 1..=6).prop_flat_map(|pool| {
        let key = 0..pool.len();
        let map = 0..MAPS;
        let d = -50i32..50;
        let op = prop_oneof![
            4 => (map.clone(), key.clone(), d.clone()).prop_map(|(m, k, v)| Op::Insert(m, k, v)),
            2 => (map.clone(), key.clone()).prop_map(|(m, k)| Op::Remove(m, k)),
            2 => (map.clone(), key.clone(), d.clone()).prop_map(|(m, k, v)| Op::AtMut(m, k, v)),
            2 => (map.clone(), key.clone(), d.clone()).prop_map(|(m, k, v)| Op::Indexed(m, k, v)),
            1 => (map.clone(), map.clone()).prop_map(|(a, b)| Op::Merge(a, b)),
            2 => (map.clone(), map.clone()).prop_map(|(a, b)| Op::CloneInto(a, b)),
            1 => map.clone().prop_map(Op::Clear),
            1 => (map.clone(), "[a-z]{0,4}").prop_map(|(m, s)| Op::Contains(m, s)),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Reference model: a plain Vec in iteration order.
#[derive(Clone, Default)]
struct Model(Vec<(Key, i32)>);

impl Model {
    fn position(&self, k: &Key) -> Option<usize> {
        self.0.iter().position(|(kk, _)| kk == k)
    }

    fn insert(&mut self, k: Key, v: i32) -> bool {
        let fresh = match self.position(&k) {
            Some(p) => {
                self.0.remove(p);
                false
            }
            None => true,
        };
        self.0.push((k, v));
        fresh
    }

    fn remove(&mut self, k: &Key) -> Option<i32> {
        self.position(k).map(|p| self.0.remove(p).1)
    }

    // Common keys keep this side's value but move to the back.
    fn merge(&mut self, other: &Model) {
        for (k, v) in &other.0 {
            let entry = match self.position(k) {
                Some(p) => self.0.remove(p),
                None => (k.clone(), *v),
            };
            self.0.push(entry);
        }
    }
}

fn check<S: BuildHasher>(
    maps: &[InsertionOrderedMap<Key, i32, S>],
    models: &[Model],
) -> Result<(), TestCaseError> {
    for (m, model) in maps.iter().zip(models) {
        m.assert_consistent();
        let got: Vec<(Key, i32)> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(&got, &model.0);
        prop_assert_eq!(m.len(), model.0.len());
        prop_assert_eq!(m.is_empty(), model.0.is_empty());
    }
    Ok(())
}

fn run<S: BuildHasher + Clone>(
    fresh: impl Fn() -> InsertionOrderedMap<Key, i32, S>,
    pool: Vec<String>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut maps: Vec<InsertionOrderedMap<Key, i32, S>> = (0..MAPS).map(|_| fresh()).collect();
    let mut models: Vec<Model> = vec![Model::default(); MAPS];
    let key = |i: usize| Key(pool[i].clone());

    for op in ops {
        match op {
            Op::Insert(m, i, v) => {
                let expected = models[m].insert(key(i), v);
                prop_assert_eq!(maps[m].insert(key(i), v), expected);
            }
            Op::Remove(m, i) => {
                let expected = models[m].remove(&key(i)).ok_or(KeyNotFound);
                prop_assert_eq!(maps[m].remove(pool[i].as_str()), expected);
            }
            Op::AtMut(m, i, d) => {
                let k = key(i);
                match models[m].position(&k) {
                    Some(p) => {
                        models[m].0[p].1 += d;
                        *maps[m].at_mut(&k).expect("present in model") += d;
                        prop_assert!(maps[m].is_exposed());
                    }
                    None => prop_assert_eq!(maps[m].at_mut(&k), Err(KeyNotFound)),
                }
            }
            Op::Indexed(m, i, d) => {
                let k = key(i);
                let p = match models[m].position(&k) {
                    Some(p) => p,
                    None => {
                        models[m].0.push((k.clone(), 0));
                        models[m].0.len() - 1
                    }
                };
                models[m].0[p].1 += d;
                *maps[m].get_or_insert_default(k) += d;
                prop_assert!(maps[m].is_exposed());
            }
            Op::Merge(a, b) => {
                let other_model = models[b].clone();
                models[a].merge(&other_model);
                let other = maps[b].clone();
                maps[a].merge(&other);
                if a != b && !maps[a].shares_storage_with(&other) {
                    prop_assert!(!maps[a].is_exposed());
                }
            }
            Op::CloneInto(a, b) => {
                models[b] = models[a].clone();
                let exposed = maps[a].is_exposed();
                maps[b] = maps[a].clone();
                // Sharing only when no reference escaped from the source.
                prop_assert_eq!(maps[a].shares_storage_with(&maps[b]), a == b || !exposed);
            }
            Op::Clear(m) => {
                models[m].0.clear();
                maps[m].clear();
                prop_assert!(!maps[m].is_exposed());
            }
            Op::Contains(m, s) => {
                let expected = models[m].0.iter().any(|(k, _)| k.0 == s);
                prop_assert_eq!(maps[m].contains_key(s.as_str()), expected);
            }
        }

        check(&maps, &models)?;
    }
    Ok(())
}

// Property: every map in a family of clones behaves like an independent
// Vec-backed ordered map, whatever the sharing and exposure history.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_family_matches_model((pool, ops) in arb_scenario()) {
        run(InsertionOrderedMap::new, pool, ops)?;
    }
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_family_matches_model_with_collisions((pool, ops) in arb_scenario()) {
        run(|| InsertionOrderedMap::with_hasher(ConstBuildHasher), pool, ops)?;
    }
}
