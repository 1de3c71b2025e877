use hearth::collections::HashMap;
use hearth::Arena;
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Operation {
    Insert(u8),
    Remove(u8),
    Search(u8),
}

proptest! {
    #[test]
    fn test_arena_backed_hash_map_matches_std_set(values in proptest::collection::vec(any::<u16>(), 0..400)) {
        let arena = Arena::new(1024);
        let mut map = HashMap::new_in(&arena);
        let mut model = HashSet::new();
        for (i, &v) in values.iter().enumerate() {
            if i % 4 == 3 {
                prop_assert_eq!(map.remove(&v).is_some(), model.remove(&v));
            } else {
                prop_assert_eq!(map.try_insert(v).1, model.insert(v));
            }
        }
        prop_assert_eq!(map.len(), model.len());
        for v in &model {
            prop_assert!(map.contains(v));
        }
        if map.capacity() > 0 {
            prop_assert!(arena.used_bytes() > 0);
        }
    }

    #[test]
    fn test_hash_map_finds_every_inserted_value(values in proptest::collection::vec(any::<u32>(), 0..300)) {
        let mut map = HashMap::new();
        for &v in &values {
            map.try_insert(v);
            prop_assert!(map.load_factor() <= map.max_load_factor());
        }
        for v in &values {
            prop_assert_eq!(map.search(v), Some(v));
        }
        let distinct: HashSet<u32> = values.iter().copied().collect();
        prop_assert_eq!(map.len(), distinct.len());
    }

    #[test]
    fn test_hash_map_matches_std_set(ops in proptest::collection::vec(
        prop_oneof![
            any::<u8>().prop_map(Operation::Insert),
            any::<u8>().prop_map(Operation::Remove),
            any::<u8>().prop_map(Operation::Search),
        ],
        1..400
    )) {
        let mut model = HashSet::new();
        let mut map = HashMap::new();

        for op in ops {
            match op {
                Operation::Insert(k) => {
                    let (_, inserted) = map.try_insert(k);
                    prop_assert_eq!(inserted, model.insert(k), "insert mismatch for {}", k);
                    prop_assert!(map.load_factor() <= map.max_load_factor());
                }
                Operation::Remove(k) => {
                    prop_assert_eq!(map.remove(&k).is_some(), model.remove(&k), "remove mismatch for {}", k);
                    prop_assert_eq!(map.search(&k), None);
                }
                Operation::Search(k) => {
                    prop_assert_eq!(map.search(&k).is_some(), model.contains(&k), "search mismatch for {}", k);
                }
            }
        }

        prop_assert_eq!(map.len(), model.len());
        let mut stored: Vec<u8> = map.iter().copied().collect();
        stored.sort_unstable();
        let mut expected: Vec<u8> = model.into_iter().collect();
        expected.sort_unstable();
        prop_assert_eq!(stored, expected);
    }

    #[test]
    fn test_hash_map_remove_then_reinsert_is_equivalent(values in proptest::collection::hash_set(any::<u16>(), 1..100)) {
        let mut churned = HashMap::new();
        let mut fresh = HashMap::new();
        for &v in &values {
            churned.insert(v);
            fresh.insert(v);
        }
        for v in &values {
            churned.remove(v);
        }
        for &v in &values {
            churned.insert(v);
        }
        prop_assert_eq!(churned.len(), fresh.len());
        for v in &values {
            prop_assert_eq!(churned.search(v), fresh.search(v));
        }
    }
}

#[test]
fn test_hash_map_with_custom_key_function() {
    #[derive(Debug)]
    struct Asset {
        path: String,
        bytes: usize,
    }

    fn path_hash(path: &str) -> u64 {
        path.bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3))
    }

    let mut assets = HashMap::with_fns(
        0,
        |a: &Asset| path_hash(&a.path),
        |a: &Asset, b: &Asset| a.path == b.path,
    );
    for (i, path) in ["a.png", "b.png", "a.png", "c.wav"].iter().enumerate() {
        assets.try_insert(Asset { path: (*path).to_string(), bytes: i });
    }
    assert_eq!(assets.len(), 3);

    let a = assets.search_hashed(path_hash("a.png"), |a| a.path == "a.png").unwrap();
    assert_eq!(a.bytes, 0);

    let key = Asset { path: "c.wav".to_string(), bytes: 0 };
    assets.search_mut(&key).unwrap().bytes = 99;
    assert_eq!(assets.search(&key).unwrap().bytes, 99);
}
