use hearth::concurrency::{PoolState, ThreadPool};
use hearth::config::ThreadPoolConfig;
use hearth::{Arena, ThreadPoolError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn test_thread_pool_counter_under_external_lock() {
    let mut pool = ThreadPool::new(4);
    pool.start().unwrap();

    let counter = Arc::new(Mutex::new(0usize));
    for _ in 0..100 {
        let counter = Arc::clone(&counter);
        pool.submit(move || {
            *counter.lock().unwrap() += 1;
        })
        .unwrap();
    }
    pool.wait().unwrap();
    assert_eq!(*counter.lock().unwrap(), 100);
    assert_eq!(pool.state(), PoolState::Idle);
    pool.destroy().unwrap();
}

#[test]
fn test_thread_pool_per_task_arenas_fill_slots() {
    let mut pool = ThreadPool::with_config(&ThreadPoolConfig::default().workers(4));
    pool.start().unwrap();

    let slots: Arc<Vec<Mutex<Option<u64>>>> = Arc::new((0..32).map(|_| Mutex::new(None)).collect());
    for i in 0..32usize {
        let slots = Arc::clone(&slots);
        pool.submit(move || {
            let arena = Arena::new(1024);
            let data = arena.alloc_slice_zeroed::<u64>(i + 1).unwrap();
            for (j, v) in data.iter_mut().enumerate() {
                *v = j as u64;
            }
            let sum: u64 = data.iter().sum();
            *slots[i].lock().unwrap() = Some(sum);
        })
        .unwrap();
    }
    pool.wait().unwrap();

    for (i, slot) in slots.iter().enumerate() {
        let n = i as u64;
        assert_eq!(*slot.lock().unwrap(), Some(n * (n + 1) / 2));
    }
}

#[test]
fn test_thread_pool_repeated_wait_cycles() {
    let mut pool = ThreadPool::new(3);
    pool.start().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    for round in 1..=5 {
        for _ in 0..50 {
            let hits = Arc::clone(&hits);
            pool.submit(move || {
                hits.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        pool.wait().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), round * 50);
    }
}

#[test]
fn test_thread_pool_wait_without_workers() {
    let pool = ThreadPool::new(2);
    pool.wait().unwrap();
    pool.submit(|| {}).unwrap();
    assert!(matches!(pool.wait(), Err(ThreadPoolError::NoWorkers { pending: 1 })));
}

#[test]
fn test_thread_pool_drop_joins_workers() {
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let mut pool = ThreadPool::new(2);
        pool.start().unwrap();
        for _ in 0..10 {
            let hits = Arc::clone(&hits);
            pool.submit(move || {
                hits.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
    }
    assert_eq!(hits.load(Ordering::Relaxed), 10);
}
