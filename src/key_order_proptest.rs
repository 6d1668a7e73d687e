#![cfg(test)]

// Property tests for KeyOrder kept inside the crate so they can look at the
// mask and the insertion list directly.

use crate::error::OrderError;
use crate::key_order::{KeyOrder, MIN_SIZE};
use crate::legacy_hash::LegacyHash;
use crate::width::WordWidth;
use proptest::prelude::*;
use std::collections::BTreeSet;

// Pool-indexed operations: indices shrink to earlier keys, pool length
// shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Add(usize),
    Remove(usize),
    Discard(usize),
    Merge(Vec<usize>, usize),
    Pop,
    Keys,
}

fn arb_scenario<T>(pool: impl Strategy<Value = Vec<T>>) -> impl Strategy<Value = (Vec<T>, Vec<OpI>)>
where
    T: Clone + core::fmt::Debug + 'static,
{
    pool.prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            4 => idx.clone().prop_map(OpI::Add),
            1 => idx.clone().prop_map(OpI::Remove),
            1 => idx.clone().prop_map(OpI::Discard),
            1 => (proptest::collection::vec(idx.clone(), 0..12), 0usize..64)
                .prop_map(|(is, hint)| OpI::Merge(is, hint)),
            1 => Just(OpI::Pop),
            1 => Just(OpI::Keys),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn string_pool() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z0-9]{0,4}", 1..=24)
}

// Integers that share their low bits collide in every small table.
fn colliding_pool() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec((0i64..64).prop_map(|x| x << 10), 1..=24)
}

/// Apply `op` to the engine and the model; check the step's local contract.
fn step<K>(
    sut: &mut KeyOrder<K>,
    model: &mut BTreeSet<K>,
    pool: &[K],
    op: &OpI,
) -> Result<(), TestCaseError>
where
    K: LegacyHash + Eq + Ord + Clone + core::fmt::Debug,
{
    match op {
        OpI::Add(i) => {
            let k = pool[*i].clone();
            let fresh = !k.is_falsy() && !model.contains(&k);
            let appended = sut.add(k.clone()).expect("pool keys are hashable");
            prop_assert_eq!(appended, fresh);
            if fresh {
                model.insert(k);
            }
        }
        OpI::Remove(i) => {
            let k = &pool[*i];
            let res = sut.remove(k);
            if model.remove(k) {
                prop_assert_eq!(res, Ok(()));
            } else {
                prop_assert_eq!(res, Err(OrderError::MissingKey));
            }
        }
        OpI::Discard(i) => {
            let k = &pool[*i];
            prop_assert_eq!(sut.discard(k), Ok(model.remove(k)));
        }
        OpI::Merge(is, hint) => {
            let before = sut.mask();
            let keys: Vec<K> = is.iter().map(|&i| pool[i].clone()).collect();
            sut.merge(keys.iter().cloned(), *hint).expect("pool keys are hashable");
            for k in keys {
                if !k.is_falsy() {
                    model.insert(k);
                }
            }
            prop_assert!(sut.mask() >= before, "mask never shrinks");
        }
        OpI::Pop => {
            let head = sut.keys().next().cloned();
            let popped = sut.pop();
            prop_assert_eq!(&popped, &head);
            match popped {
                Some(k) => {
                    prop_assert!(model.remove(&k));
                }
                None => {
                    prop_assert!(model.is_empty());
                }
            }
        }
        OpI::Keys => {
            let a: Vec<K> = sut.to_vec();
            let b: Vec<K> = sut.to_vec();
            prop_assert_eq!(a, b, "cached order is stable between reads");
        }
    }
    Ok(())
}

/// The engine's order is a permutation of exactly the live set.
fn check_set_preservation<K>(sut: &KeyOrder<K>, model: &BTreeSet<K>) -> Result<(), TestCaseError>
where
    K: LegacyHash + Eq + Ord + Clone + core::fmt::Debug,
{
    let ordered: Vec<K> = sut.to_vec();
    prop_assert_eq!(ordered.len(), model.len());
    let as_set: BTreeSet<K> = ordered.into_iter().collect();
    prop_assert_eq!(&as_set, model);
    prop_assert_eq!(sut.len(), model.len());
    let size = sut.mask() + 1;
    prop_assert!(size.is_power_of_two() && size >= MIN_SIZE);
    prop_assert!((sut.len() as u64) < size);
    Ok(())
}

// Property: state-machine equivalence against a BTreeSet model.
// - `keys()` is always a permutation of the live set (no loss, no dups).
// - Strict removal errors exactly when the model lacks the key.
// - Falsy keys are never tracked.
// - The mask stays a power of two minus one and never shrinks.
// - Two engines fed the same operations agree on order at every step.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario(string_pool())) {
        let mut sut: KeyOrder<String> = KeyOrder::new(WordWidth::Bits64);
        let mut twin: KeyOrder<String> = KeyOrder::new(WordWidth::Bits64);
        let mut model: BTreeSet<String> = BTreeSet::new();
        let mut twin_model: BTreeSet<String> = BTreeSet::new();

        for op in &ops {
            let mask_before = sut.mask();
            step(&mut sut, &mut model, &pool, op)?;
            step(&mut twin, &mut twin_model, &pool, op)?;
            check_set_preservation(&sut, &model)?;
            prop_assert!(sut.mask() >= mask_before);
            prop_assert_eq!(sut.to_vec(), twin.to_vec());
        }
    }
}

// Property: the same invariants in 32-bit mode with keys built to collide,
// which drives the perturbed probe sequence on nearly every insertion.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario(colliding_pool())) {
        let mut sut: KeyOrder<i64> = KeyOrder::new(WordWidth::Bits32);
        let mut model: BTreeSet<i64> = BTreeSet::new();
        for op in &ops {
            step(&mut sut, &mut model, &pool, op)?;
            check_set_preservation(&sut, &model)?;
        }
    }
}

// Property: presizing through a large merge hint keeps the live set and
// only possibly reorders it.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_resize_neutral_on_membership(
        keys in proptest::collection::vec("[a-z]{1,6}", 0..40),
        hint in 64usize..4096,
    ) {
        let mut sut: KeyOrder<String> = KeyOrder::new(WordWidth::Bits64);
        for k in &keys {
            sut.add(k.clone()).unwrap();
        }
        let before: BTreeSet<String> = sut.to_vec().into_iter().collect();
        let mask_before = sut.mask();
        sut.merge(Vec::new(), hint).unwrap();
        prop_assert!(sut.mask() > mask_before);
        let after: BTreeSet<String> = sut.to_vec().into_iter().collect();
        prop_assert_eq!(before, after);
    }
}

// Property: persistence replays deterministically and keeps the live set;
// copies preserve the set and are unaffected by later source mutation.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_snapshot_and_copy((pool, ops) in arb_scenario(string_pool())) {
        let mut sut: KeyOrder<String> = KeyOrder::new(WordWidth::Bits64);
        let mut model: BTreeSet<String> = BTreeSet::new();
        for op in &ops {
            step(&mut sut, &mut model, &pool, op)?;
        }

        let snap = sut.snapshot();
        prop_assert_eq!(snap.mask, sut.mask());
        let a = KeyOrder::restore(snap.clone(), WordWidth::Bits64).unwrap();
        let b = KeyOrder::restore(snap, WordWidth::Bits64).unwrap();
        prop_assert_eq!(a.to_vec(), b.to_vec());
        check_set_preservation(&a, &model)?;

        let copy = sut.copy();
        check_set_preservation(&copy, &model)?;
        let _ = sut.pop();
        check_set_preservation(&copy, &model)?;
    }
}
