use hearth::alloc::{Handle, HandlePool};
use hearth::PoolError;
use proptest::prelude::*;
use std::collections::HashMap;

#[test]
fn test_handle_pool_basic() {
    let mut pool: HandlePool<u32, 4> = HandlePool::new();

    let h1 = pool.acquire(10).unwrap();
    let h2 = pool.acquire(20).unwrap();
    assert_eq!(pool.get(h1), Some(&10));
    assert_eq!(pool.get(h2), Some(&20));

    assert_eq!(pool.give_back(h1), Ok(10));
    assert!(pool.get(h1).is_none());

    // Reuse keeps the index, bumps the generation.
    let h3 = pool.acquire(30).unwrap();
    assert_eq!(h1.index(), h3.index());
    assert_ne!(h1.generation(), h3.generation());
    assert!(pool.get(h1).is_none());
    assert_eq!(pool.get(h3), Some(&30));
}

#[test]
fn test_handle_pool_full_then_freed() {
    let mut pool: HandlePool<&str, 2> = HandlePool::new();
    let a = pool.acquire("a").unwrap();
    pool.acquire("b").unwrap();
    assert!(pool.is_full());
    assert_eq!(pool.acquire("c"), Err(PoolError::Exhausted { capacity: 2 }));

    pool.give_back(a).unwrap();
    assert!(pool.acquire("c").is_ok());
}

#[test]
fn test_handle_pool_double_give_back() {
    let mut pool: HandlePool<u8, 1> = HandlePool::new();
    let h = pool.acquire(1).unwrap();
    pool.give_back(h).unwrap();
    assert!(matches!(pool.give_back(h), Err(PoolError::StaleHandle { .. })));
}

#[test]
fn test_handle_pool_for_each_sees_only_live_slots() {
    let mut pool: HandlePool<u32, 8> = HandlePool::new();
    let handles: Vec<Handle> = (0..6).map(|i| pool.acquire(i).unwrap()).collect();
    pool.give_back(handles[1]).unwrap();
    pool.give_back(handles[4]).unwrap();

    let mut seen = Vec::new();
    pool.for_each(|_, v| {
        *v *= 10;
        seen.push(*v);
    });
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 20, 30, 50]);
}

#[derive(Debug, Clone)]
enum Op {
    Acquire(u16),
    GiveBack(usize),
}

proptest! {
    #[test]
    fn test_handle_pool_matches_model(ops in proptest::collection::vec(
        prop_oneof![
            any::<u16>().prop_map(Op::Acquire),
            any::<usize>().prop_map(Op::GiveBack),
        ],
        1..200
    )) {
        const CAP: usize = 16;
        let mut pool: HandlePool<u16, CAP> = HandlePool::new();
        let mut live: HashMap<Handle, u16> = HashMap::new();
        let mut dead: Vec<Handle> = Vec::new();

        for op in ops {
            match op {
                Op::Acquire(v) => match pool.acquire(v) {
                    Ok(h) => {
                        prop_assert!(live.len() < CAP);
                        prop_assert!(live.insert(h, v).is_none());
                    }
                    Err(PoolError::Exhausted { capacity }) => {
                        prop_assert_eq!(capacity, CAP);
                        prop_assert_eq!(live.len(), CAP);
                    }
                    Err(other) => prop_assert!(false, "unexpected {:?}", other),
                },
                Op::GiveBack(pick) => {
                    if live.is_empty() {
                        if let Some(&h) = dead.last() {
                            let stale = matches!(pool.give_back(h), Err(PoolError::StaleHandle { .. }));
                            prop_assert!(stale);
                        }
                        continue;
                    }
                    let h = *live.keys().nth(pick % live.len()).unwrap();
                    let expected = live.remove(&h).unwrap();
                    prop_assert_eq!(pool.give_back(h), Ok(expected));
                    dead.push(h);
                }
            }
            prop_assert_eq!(pool.len(), live.len());
            prop_assert!(pool.len() <= pool.capacity());
        }

        for (h, v) in &live {
            prop_assert_eq!(pool.get(*h), Some(v));
        }
        for h in &dead {
            prop_assert!(!pool.contains(*h));
        }
    }
}
