use log::*;
use std::collections::BTreeMap;

use crate::debug::*;
use crate::environment::*;
use crate::*;
use onair_btree_core::btree::TransientBTree;

fn k(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

fn ks<T: LoadPage<Error = Error>>(txn: &T, tree: &TransientBTree) -> Vec<u32> {
    tree.iter(txn, None)
        .unwrap()
        .map(|e| {
            let (k, _) = e.unwrap();
            u32::from_be_bytes([k[0], k[1], k[2], k[3]])
        })
        .collect()
}

fn tree_of<T: LoadPage<Error = Error>>(txn: &T, proto: Prototype, keys: &[u32]) -> TransientBTree {
    let mut tree = TransientBTree::new(proto);
    for &i in keys {
        tree = tree
            .put(txn, &k(i), &(i * 10).to_le_bytes(), true)
            .unwrap()
            .tree_or(&tree);
    }
    tree
}

#[test]
pub fn small_base_grows() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let txn = Env::mut_txn_begin(&env);
    let proto = Prototype::new(4, 4).unwrap();
    let tree = tree_of(&txn, proto, &[1, 2, 3, 4]);
    assert_eq!(tree.height(&txn).unwrap(), 1);
    let tree = tree_of(&txn, proto, &[1, 2, 3, 4, 5]);
    let stats = check_tree(&txn, &tree).unwrap();
    assert_eq!(stats.height, 2);
    assert_eq!(stats.entries, 5);
    assert_eq!(stats.pages, 3);
    for i in 1..=5 {
        assert_eq!(tree.get(&txn, &k(i)).unwrap(), Some((i * 10).to_le_bytes().to_vec()));
    }
    assert_eq!(tree.get(&txn, &k(6)).unwrap(), None);
}

#[test]
pub fn delete_keeps_old_versions() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let txn = Env::txn_begin(&env);
    let proto = Prototype::new(4, 4).unwrap();
    let tree = tree_of(&txn, proto, &[10, 20, 30]);
    let t2 = tree.delete(&txn, &k(20), None).unwrap().unwrap();
    assert_eq!(ks(&txn, &t2), vec![10, 30]);
    assert_eq!(ks(&txn, &tree), vec![10, 20, 30]);
    assert!(t2.delete(&txn, &k(20), None).unwrap().is_none());
}

#[test]
pub fn for_each_from_key() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let txn = Env::txn_begin(&env);
    let tree = tree_of(&txn, Prototype::new(4, 4).unwrap(), &[10, 20, 30, 40]);
    let mut seen = Vec::new();
    let complete = tree
        .for_each(&txn, Some(&k(25)), |k: &[u8], v: &[u8]| {
            seen.push((u32::from_be_bytes([k[0], k[1], k[2], k[3]]), v.to_vec()));
            true
        })
        .unwrap();
    assert!(complete);
    assert_eq!(
        seen,
        vec![(30, 300u32.to_le_bytes().to_vec()), (40, 400u32.to_le_bytes().to_vec())]
    );

    // Stopping early.
    let mut n = 0;
    let complete = tree
        .for_each(&txn, None, |_: &[u8], _: &[u8]| {
            n += 1;
            n < 2
        })
        .unwrap();
    assert!(!complete);
    assert_eq!(n, 2);
}

#[test]
pub fn overwrite_and_filters() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let txn = Env::txn_begin(&env);
    let proto = Prototype::new(4, 8).unwrap();
    let tree = tree_of(&txn, proto, &[1, 2, 3]);

    let r = tree.put(&txn, &k(2), b"other", false).unwrap();
    assert!(r.is_rejected());
    assert_eq!(tree.get(&txn, &k(2)).unwrap(), Some(20u32.to_le_bytes().to_vec()));

    let t2 = tree.put(&txn, &k(2), b"other", true).unwrap().tree_or(&tree);
    assert_eq!(t2.get(&txn, &k(2)).unwrap(), Some(b"other".to_vec()));
    assert_eq!(tree.get(&txn, &k(2)).unwrap(), Some(20u32.to_le_bytes().to_vec()));

    assert!(t2.delete(&txn, &k(2), Some(&20u32.to_le_bytes())).unwrap().is_none());
    let t3 = t2.delete(&txn, &k(2), Some(b"other")).unwrap().unwrap();
    assert_eq!(ks(&txn, &t3), vec![1, 3]);
}

#[test]
pub fn invalid_keys_and_prototypes() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let txn = Env::txn_begin(&env);
    let tree = TransientBTree::new(Prototype::new(4, 4).unwrap());
    match tree.put(&txn, &[1, 2, 3], b"", true) {
        Err(Error::Tree(TreeError::InvalidKeyLength { expected: 4, got: 3 })) => {}
        r => panic!("{:?}", r),
    }
    assert!(tree.get(&txn, &[0; 5]).is_err());
    assert!(tree.delete(&txn, &[], None).is_err());
    assert!(tree.iter(&txn, Some(&[0; 2])).is_err());

    assert!(Prototype::new(0, 4).is_err());
    assert!(Prototype::new(4, 1).is_err());
    assert!(Prototype::new(4, 1 << 20).is_err());
    let p = Prototype::new(1, 2).unwrap();
    assert_eq!(p.min_occupancy(), 1);
    assert_eq!(Prototype::new(8, 7).unwrap().min_occupancy(), 4);
}

#[test]
pub fn delete_everything() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let txn = Env::txn_begin(&env);
    for base in [2, 3, 4, 5, 16] {
        let proto = Prototype::new(4, base).unwrap();
        let keys: Vec<u32> = (0..300).collect();
        let mut tree = tree_of(&txn, proto, &keys);
        check_tree(&txn, &tree).unwrap();
        // Delete from both ends, and from the middle.
        let mut order: Vec<u32> = (0..100).chain((200..300).rev()).chain(100..200).collect();
        let last = order.pop().unwrap();
        for i in order {
            tree = tree.delete(&txn, &k(i), None).unwrap().unwrap();
            check_tree(&txn, &tree).unwrap();
        }
        assert_eq!(ks(&txn, &tree), vec![last]);
        assert_eq!(tree.height(&txn).unwrap(), 1);
        tree = tree.delete(&txn, &k(last), None).unwrap().unwrap();
        assert!(tree.is_empty(&txn).unwrap());
        assert_eq!(check_tree(&txn, &tree).unwrap().entries, 0);
    }
}

#[test]
pub fn random_scenario() {
    env_logger::try_init().unwrap_or(());
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::SmallRng::from_seed(*b"rc',.snjcg'sthomw,.vbw,.p84fcxjw");
    let env = Env::new(1);
    let mut txn = Env::mut_txn_begin(&env);
    let proto = Prototype::new(4, 5).unwrap();
    let mut tree = TransientBTree::new(proto);
    let mut model: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    let mut snapshots = Vec::new();

    for i in 0..20_000 {
        if i % 1000 == 0 {
            info!("========== i = {:?}", i);
            snapshots.push((tree.clone(), model.clone()));
        }
        if i % 4000 == 3999 {
            // Flushing in the middle mixes resolved pages and
            // addresses in the same tree.
            tree = tree.flush(&mut txn).unwrap();
        }
        let key = rng.gen_range(0..2000u32);
        if rng.gen_range(0..3) == 0 {
            let deleted = tree.delete(&txn, &k(key), None).unwrap();
            assert_eq!(deleted.is_some(), model.remove(&key).is_some());
            if let Some(t) = deleted {
                tree = t
            }
        } else {
            let value: Vec<u8> = (0..rng.gen_range(0..20)).map(|_| rng.gen()).collect();
            let overwrite = rng.gen_range(0..4) > 0;
            match tree.put(&txn, &k(key), &value, overwrite).unwrap() {
                btree::PutResult::Stored(t) => {
                    tree = t;
                    model.insert(key, value);
                }
                btree::PutResult::Rejected => {
                    assert!(!overwrite);
                    assert!(model.contains_key(&key))
                }
                btree::PutResult::Unchanged => assert_eq!(model.get(&key), Some(&value)),
            }
        }
        if i % 500 == 0 {
            let stats = check_tree(&txn, &tree).unwrap();
            assert_eq!(stats.entries, model.len());
        }
    }
    check_tree(&txn, &tree).unwrap();
    for (key, value) in model.iter() {
        assert_eq!(tree.get(&txn, &k(*key)).unwrap().as_ref(), Some(value));
    }
    let all: Vec<_> = tree
        .iter(&txn, None)
        .unwrap()
        .map(|e| {
            let (key, value) = e.unwrap();
            (u32::from_be_bytes([key[0], key[1], key[2], key[3]]), value.to_vec())
        })
        .collect();
    assert_eq!(all, model.into_iter().collect::<Vec<_>>());

    // Older versions are unaffected by everything that happened
    // since they were taken.
    for (t, m) in snapshots {
        assert_eq!(ks(&txn, &t), m.keys().cloned().collect::<Vec<_>>());
        for (key, value) in m.iter() {
            assert_eq!(t.get(&txn, &k(*key)).unwrap().as_ref(), Some(value));
        }
    }
}

#[test]
pub fn commit_and_reopen() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(2);
    let proto = Prototype::new(4, 8).unwrap();
    let mut txn = Env::mut_txn_begin(&env);
    assert_eq!(txn.epoch(), 1);
    let tree = tree_of(&txn, proto, &(0..500).collect::<Vec<_>>());
    let flushed = txn.set_root(0, &tree).unwrap();
    let address = flushed.address().unwrap();
    assert!(address.is_novelty());
    assert!(env.novelty_pages() > 0);
    assert_eq!(env.stored_pages(), 0);
    txn.commit().unwrap();
    assert_eq!(env.epoch(), 1);
    assert_eq!(env.novelty_pages(), 0);
    assert!(env.stored_pages() > 0);

    let txn = Env::txn_begin(&env);
    assert!(txn.root_tree(1).is_none());
    assert!(txn.root_tree(5).is_none());
    let tree = txn.root_tree(0).unwrap();
    assert_eq!(tree.address(), Some(address));
    // The novelty address is now resolved from the store.
    let stats = check_tree(&txn, &tree).unwrap();
    assert_eq!(stats.entries, 500);
    assert_eq!(ks(&txn, &tree), (0..500).collect::<Vec<_>>());
    assert_eq!(tree.get(&txn, &k(42)).unwrap(), Some(420u32.to_le_bytes().to_vec()));
}

#[test]
pub fn readers_see_snapshots() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let proto = Prototype::new(4, 6).unwrap();
    {
        let mut txn = Env::mut_txn_begin(&env);
        let tree = tree_of(&txn, proto, &(0..100).collect::<Vec<_>>());
        txn.set_root(0, &tree).unwrap();
        txn.commit().unwrap();
    }
    let reader = Env::txn_begin(&env);
    assert_eq!(reader.epoch(), 1);

    let mut txn = Env::mut_txn_begin(&env);
    let mut tree = txn.root_tree(0).unwrap();
    for i in 0..50 {
        tree = tree.delete(&txn, &k(i), None).unwrap().unwrap();
    }
    for i in 100..200 {
        tree = tree.put(&txn, &k(i), b"new", true).unwrap().tree_or(&tree);
    }
    txn.set_root(0, &tree).unwrap();

    // Before and after the commit, the reader sees the old version.
    assert_eq!(ks(&reader, &reader.root_tree(0).unwrap()), (0..100).collect::<Vec<_>>());
    txn.commit().unwrap();
    assert_eq!(ks(&reader, &reader.root_tree(0).unwrap()), (0..100).collect::<Vec<_>>());

    let reader2 = Env::txn_begin(&env);
    assert_eq!(reader2.epoch(), 2);
    let tree = reader2.root_tree(0).unwrap();
    assert_eq!(ks(&reader2, &tree), (50..200).collect::<Vec<_>>());
    check_tree(&reader2, &tree).unwrap();
}

#[test]
pub fn concurrent_readers() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let proto = Prototype::new(4, 16).unwrap();
    let n = 20u32;
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut last = 0;
                loop {
                    let txn = Env::txn_begin(&env);
                    if let Some(tree) = txn.root_tree(0) {
                        // Each commit adds 100 keys, a reader sees
                        // all of them or none.
                        let keys = ks(&txn, &tree);
                        assert_eq!(keys.len() as u64, txn.epoch() * 100);
                        assert_eq!(keys, (0..keys.len() as u32).collect::<Vec<_>>());
                        assert!(keys.len() >= last);
                        last = keys.len();
                        if keys.len() as u32 == n * 100 {
                            break;
                        }
                    }
                    std::thread::yield_now()
                }
            });
        }
        for epoch in 0..n {
            let mut txn = Env::mut_txn_begin(&env);
            let mut tree = txn
                .root_tree(0)
                .unwrap_or_else(|| TransientBTree::new(proto));
            for i in epoch * 100..(epoch + 1) * 100 {
                tree = tree.put(&txn, &k(i), &k(i), true).unwrap().tree_or(&tree);
            }
            txn.set_root(0, &tree).unwrap();
            txn.commit().unwrap();
        }
    });
    assert_eq!(env.epoch(), n as u64);
}

#[test]
pub fn abort_discards_novelty() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let proto = Prototype::new(4, 4).unwrap();
    let flushed = {
        let mut txn = Env::mut_txn_begin(&env);
        let tree = tree_of(&txn, proto, &(0..50).collect::<Vec<_>>());
        let flushed = txn.set_root(0, &tree).unwrap();
        assert!(env.novelty_pages() > 0);
        flushed
        // Dropped without committing.
    };
    assert_eq!(env.novelty_pages(), 0);
    assert_eq!(env.stored_pages(), 0);
    assert_eq!(env.epoch(), 0);

    let txn = Env::txn_begin(&env);
    assert!(txn.root_tree(0).is_none());
    match flushed.get(&txn, &k(1)) {
        Err(Error::UnknownAddress(a)) => assert_eq!(Some(a), flushed.address()),
        r => panic!("{:?}", r),
    }

    // The next writer reuses the same epoch.
    let txn = Env::mut_txn_begin(&env);
    assert_eq!(txn.epoch(), 1);
}

#[test]
pub fn root_slots() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(2);
    assert_eq!(env.n_roots(), 2);
    let proto = Prototype::new(4, 4).unwrap();
    let mut txn = Env::mut_txn_begin(&env);
    let a = tree_of(&txn, proto, &[1, 2, 3]);
    let b = tree_of(&txn, proto, &[4, 5]);
    assert!(matches!(txn.set_root(2, &a), Err(Error::RootOutOfBounds(2))));
    txn.set_root(0, &a).unwrap();
    txn.set_root(1, &b).unwrap();
    assert_eq!(ks(&txn, &txn.root_tree(1).unwrap()), vec![4, 5]);
    txn.commit().unwrap();

    let mut txn = Env::mut_txn_begin(&env);
    txn.remove_root(0).unwrap();
    assert!(txn.remove_root(3).is_err());
    txn.commit().unwrap();

    let txn = Env::txn_begin(&env);
    assert!(txn.root_tree(0).is_none());
    assert_eq!(ks(&txn, &txn.root_tree(1).unwrap()), vec![4, 5]);
}

#[test]
pub fn corrupt_store() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let proto = Prototype::new(4, 4).unwrap();
    let mut txn = Env::mut_txn_begin(&env);
    let tree = tree_of(&txn, proto, &[1, 2, 3]);
    let tree = txn.set_root(0, &tree).unwrap();
    txn.commit().unwrap();
    let offset = tree.address().unwrap().offset();
    {
        let mut stored = env.stored.write();
        let bytes = stored.get(&offset).unwrap().to_vec();
        stored.insert(offset, bytes[..10].to_vec().into());
    }
    let txn = Env::txn_begin(&env);
    assert!(txn.root_tree(0).unwrap().get(&txn, &k(1)).is_err());
    match txn.load_page(Address::Stored(offset + 1000)) {
        Err(Error::UnknownAddress(Address::Stored(o))) => assert_eq!(o, offset + 1000),
        r => panic!("{:?}", r),
    }
}

#[test]
pub fn debug_graph() {
    env_logger::try_init().unwrap_or(());
    let env = Env::new(1);
    let proto = Prototype::new(4, 4).unwrap();
    let mut txn = Env::mut_txn_begin(&env);
    let tree = tree_of(&txn, proto, &(0..30).collect::<Vec<_>>());
    let flushed = txn.set_root(0, &tree).unwrap();
    let t2 = flushed.put(&txn, &k(100), b"x", true).unwrap().tree_or(&flushed);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.dot");
    debug(&txn, &[&flushed, &t2], &path, true).unwrap();
    let dot = std::fs::read_to_string(&path).unwrap();
    assert!(dot.starts_with("digraph{"));
    assert!(dot.trim_end().ends_with('}'));
    assert!(dot.contains("transient"));
    assert!(dot.contains(&format!("{}", flushed.address().unwrap())));
}
