mod common;

use std::collections::BTreeMap;

use common::{contents, record, rid, Test};
use rand::{Rng, SeedableRng};
use ridbag::{ChangeOverlay, RidBag};

#[test]
fn large_tree_is_paged() {
    let mut test = Test::new();
    test.prefetch_size(16);
    let pointer = test
        .manager
        .insert_tree((0..1000).map(|i| (rid(i), (i % 3) as i32 + 1)));
    let session = test.session();

    let mut bag = RidBag::with_tree(pointer, ChangeOverlay::new());
    let mut expected_total = 0;
    let mut last = None;
    let mut iter = bag.iter(&session);
    for record in &mut iter {
        let rid = record.unwrap().rid();
        assert!(last <= Some(rid));
        last = Some(rid);
        expected_total += 1;
    }
    assert_eq!(expected_total, (0..1000).map(|i| i % 3 + 1).sum::<i64>());
    assert_eq!(iter.size().unwrap(), expected_total as u64);
    drop(iter);
    assert_eq!(test.manager.outstanding_leases(), 0);
}

#[test]
fn removal_across_batches() {
    let mut test = Test::new();
    test.prefetch_size(3);
    let pointer = test.manager.insert_tree((0..20).map(|i| (rid(i * 2), 1)));
    let session = test.session();

    let mut bag = RidBag::with_tree(pointer, ChangeOverlay::new());
    for i in 0..20 {
        bag.add(&session, &record(i * 2 + 1));
    }

    // drop every third occurrence while iterating.
    let mut iter = bag.iter(&session);
    let mut kept = BTreeMap::new();
    let mut n = 0;
    while let Some(record) = iter.next() {
        let record = record.unwrap();
        if n % 3 == 0 {
            iter.remove().unwrap();
        } else {
            *kept.entry(record.rid()).or_insert(0) += 1;
        }
        n += 1;
    }
    assert_eq!(n, 40);
    drop(iter);

    assert_eq!(contents(&mut bag, &session), kept);
    assert_eq!(bag.size(&session).unwrap(), kept.len() as u64);
}

// A randomized run against a plain map of multiplicities, with periodic commits.
#[test]
fn matches_model() {
    let mut test = Test::new();
    test.prefetch_size(5);
    let mut rng = rand_pcg::Lcg64Xsh32::from_seed([7; 16]);

    let mut initial: BTreeMap<i64, i64> = BTreeMap::new();
    for key in 0..40 {
        if rng.gen_bool(0.5) {
            initial.insert(key, rng.gen_range(1..4));
        }
    }
    let pointer = test
        .manager
        .insert_tree(initial.iter().map(|(&k, &n)| (rid(k), n as i32)));
    let session = test.session();

    let mut bag = RidBag::with_tree(pointer, ChangeOverlay::new());
    let mut model = initial;

    for step in 0..2000 {
        let key = rng.gen_range(0..48);
        match rng.gen_range(0..10) {
            0..=3 => {
                bag.add(&session, &record(key));
                *model.entry(key).or_insert(0) += 1;
            }
            4..=6 => {
                bag.remove(&session, &record(key));
                *model.entry(key).or_insert(0) -= 1;
            }
            7 | 8 => {
                let expected = model.get(&key).map_or(false, |&n| n > 0);
                assert_eq!(bag.contains(&session, &record(key)).unwrap(), expected);
            }
            _ => {
                bag.serialize(&session, &mut Vec::new(), None).unwrap();
                test.commit(&mut bag);
                // the tree only keeps positive multiplicities.
                model.retain(|_, n| *n > 0);
            }
        }

        if step % 50 == 0 {
            let expected: BTreeMap<_, _> = model
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(&k, &n)| (rid(k), n as usize))
                .collect();
            let total: usize = expected.values().sum();
            assert_eq!(contents(&mut bag, &session), expected);
            assert_eq!(bag.size(&session).unwrap(), total as u64);
        }
    }
    assert_eq!(test.manager.outstanding_leases(), 0);
}
