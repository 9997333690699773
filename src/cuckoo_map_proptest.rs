#![cfg(test)]

// Property tests for CuckooMap kept inside the crate so they can check the
// slot tables directly.

use crate::config::CuckooConfig;
use crate::cuckoo_map::CuckooMap;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, BTreeSet};

// Pool-indexed operations so shrinking moves towards earlier keys.
#[derive(Clone, Debug)]
enum OpI {
    Put(usize, i32),
    Get(usize),
    Remove(usize),
    Mutate(usize, i32),
    Rehash,
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,6}", 1..=40).prop_flat_map(|pool| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Put(i, v)),
            2 => idx.clone().prop_map(OpI::Get),
            2 => idx.clone().prop_map(OpI::Remove),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Rehash),
            1 => Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

type Sut = CuckooMap<String, i32, RandomState, Pcg64>;

fn sut(initial_size: usize, seed: u64) -> Sut {
    CuckooMap::with_config_hasher_and_rng(
        CuckooConfig::default().with_initial_size(initial_size),
        RandomState::new(),
        Pcg64::seed_from_u64(seed),
    )
    .unwrap()
}

// Property: state-machine equivalence against BTreeMap.
// - `put` returns the model's previous value; updates never change `len`.
// - `get`/`remove` agree with the model; removal of absent keys is a no-op.
// - `rehash` leaves the entry set and capacity unchanged.
// - `iter` yields every live pair exactly once.
// - After each op: len parity, every live entry holds exactly one slot, and
//   the load stays under the threshold.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario(), size in 1usize..=16, seed in any::<u64>()) {
        let mut m = sut(size, seed);
        let mut model: BTreeMap<String, i32> = BTreeMap::new();

        for op in ops {
            match op {
                OpI::Put(i, v) => {
                    let k = pool[i].clone();
                    let before = m.len();
                    let prev = m.put(k.clone(), v);
                    let mprev = model.insert(k, v);
                    prop_assert_eq!(prev, mprev);
                    if mprev.is_some() {
                        prop_assert_eq!(m.len(), before);
                    }
                }
                OpI::Get(i) => {
                    prop_assert_eq!(m.get(pool[i].as_str()), model.get(&pool[i]));
                }
                OpI::Remove(i) => {
                    prop_assert_eq!(m.remove(pool[i].as_str()), model.remove(&pool[i]));
                    prop_assert!(!m.contains_key(pool[i].as_str()));
                }
                OpI::Mutate(i, d) => {
                    if let Some(v) = m.get_mut(pool[i].as_str()) {
                        *v = v.wrapping_add(d);
                    }
                    if let Some(v) = model.get_mut(&pool[i]) {
                        *v = v.wrapping_add(d);
                    }
                }
                OpI::Rehash => {
                    let cap = m.capacity();
                    m.rehash();
                    prop_assert_eq!(m.capacity(), cap);
                }
                OpI::Iterate => {
                    let seen: Vec<(String, i32)> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    let set: BTreeSet<_> = seen.iter().cloned().collect();
                    prop_assert_eq!(seen.len(), set.len(), "no duplicates");
                    let expected: BTreeSet<_> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    prop_assert_eq!(set, expected);
                }
            }

            prop_assert_eq!(m.len(), model.len());
            prop_assert_eq!(m.is_empty(), model.is_empty());
            prop_assert_eq!(m.occupied_slots(), m.len());
            prop_assert!(m.current_load() <= m.max_load_factor());
        }
    }
}

// Property: the load bound holds after every insert, for any initial size
// and any sequence of distinct or repeated keys, sampled over 1024 random
// insert sequences.
proptest! {
    #![proptest_config(ProptestConfig { cases: 1024, .. ProptestConfig::default() })]
    #[test]
    fn prop_load_factor_bound(keys in proptest::collection::vec(any::<u32>(), 1..400), size in 1usize..=64, seed in any::<u64>()) {
        let mut m: CuckooMap<u32, (), RandomState, Pcg64> = CuckooMap::with_config_hasher_and_rng(
            CuckooConfig::default().with_initial_size(size),
            RandomState::new(),
            Pcg64::seed_from_u64(seed),
        ).unwrap();
        let mut distinct = BTreeSet::new();
        for k in keys {
            m.put(k, ());
            distinct.insert(k);
            prop_assert!(m.current_load() <= 0.4, "load {} at capacity {}", m.current_load(), m.capacity());
        }
        prop_assert_eq!(m.len(), distinct.len());
        let got: BTreeSet<u32> = m.keys().copied().collect();
        prop_assert_eq!(got, distinct);
    }
}
