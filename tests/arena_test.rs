use hearth::alloc::{Arena, MIN_ALIGN};
use hearth::{AllocError, ArenaStats};
use proptest::prelude::*;

#[test]
fn test_arena_scenario_one_kib_blocks() {
    let arena = Arena::new(1024);
    for _ in 0..10 {
        arena.alloc(64, 1).unwrap();
    }
    assert_eq!(arena.block_count(), 1);

    arena.alloc(64, 1).unwrap();
    assert_eq!(arena.block_count(), 1);
    assert_eq!(arena.used_bytes(), 704);

    arena.alloc(2048, 1).unwrap();
    assert_eq!(arena.block_count(), 2);
}

#[test]
fn test_arena_allocations_are_aligned_and_writable() {
    let arena = Arena::new(256);
    let mut ptrs = Vec::new();
    for size in [1usize, 3, 17, 100, 1000, 5000] {
        let ptr = arena.alloc(size, 1).unwrap();
        assert_eq!(ptr.as_ptr() as usize % MIN_ALIGN, 0);
        unsafe { ptr.as_ptr().write_bytes(size as u8, size) };
        ptrs.push((ptr, size));
    }
    for (ptr, size) in ptrs {
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
        assert!(bytes.iter().all(|&b| b == size as u8));
    }
}

#[test]
fn test_arena_reset_then_free_all() {
    let mut arena = Arena::new(4096);
    arena.alloc_slice_copy(&[1u64; 600]).unwrap();
    let before: ArenaStats = arena.stats();
    assert!(before.committed >= before.used);

    arena.reset();
    assert_eq!(arena.used_bytes(), 0);
    assert_eq!(arena.block_count(), before.blocks);

    arena.free_all();
    assert_eq!(arena.block_count(), 0);
    assert_eq!(arena.alloc(8, 1), Err(AllocError::Released));
}

#[test]
fn test_arena_realloc_grows_tail_in_place() {
    let arena = Arena::new(4096);
    let ptr = arena.alloc(32, 1).unwrap();
    unsafe { ptr.as_ptr().write_bytes(0x5A, 32) };
    assert!(arena.can_grow_in_place(ptr, 64, 1));

    let grown = arena.realloc(ptr, 64, 1).unwrap();
    assert_eq!(grown, ptr);

    let moved_from = arena.alloc(16, 1).unwrap();
    assert!(!arena.can_grow_in_place(grown, 128, 1));
    let moved = arena.realloc(grown, 128, 1).unwrap();
    assert_ne!(moved, grown);
    assert_ne!(moved, moved_from);
    let bytes = unsafe { std::slice::from_raw_parts(moved.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0x5A));
}

#[test]
fn test_arena_realloc_rejects_misuse() {
    let arena = Arena::new(4096);
    let ptr = arena.alloc(64, 1).unwrap();
    assert_eq!(
        arena.realloc(ptr, 8, 1),
        Err(AllocError::Shrink { old: 64, new: 8 })
    );

    let mut local = 0u8;
    let foreign = std::ptr::NonNull::from(&mut local);
    assert_eq!(arena.realloc(foreign, 8, 1), Err(AllocError::ForeignPointer));
}

#[test]
fn test_arena_overflowing_request() {
    let arena = Arena::new(4096);
    assert_eq!(arena.alloc(usize::MAX, 2), Err(AllocError::CapacityOverflow));
}

#[test]
fn test_arena_typed_values_live_until_reset() {
    let mut arena = Arena::new(1024);
    {
        let name = arena.alloc_str("terrain/heightmap.r16").unwrap();
        let dims = arena.alloc_value([512u32, 512]).unwrap();
        let texels = arena.alloc_slice_zeroed::<u16>(512).unwrap();
        texels[511] = 9;
        assert_eq!(name, "terrain/heightmap.r16");
        assert_eq!(*dims, [512, 512]);
        assert_eq!(texels[0], 0);
    }
    arena.reset();
    assert_eq!(arena.used_bytes(), 0);
}

#[test]
fn test_arena_moves_between_threads() {
    let arena = Arena::new(1024);
    let used = std::thread::spawn(move || {
        arena.alloc(100, 1).unwrap();
        arena.used_bytes()
    })
    .join()
    .unwrap();
    assert!(used >= 100);
}

proptest! {
    #[test]
    fn test_arena_allocations_never_overlap(sizes in proptest::collection::vec(1usize..3000, 1..60)) {
        let arena = Arena::new(1024);
        let mut spans: Vec<(usize, usize, u8)> = Vec::new();
        for (i, &size) in sizes.iter().enumerate() {
            let ptr = arena.alloc(size, 1).unwrap();
            let tag = i as u8;
            unsafe { ptr.as_ptr().write_bytes(tag, size) };
            spans.push((ptr.as_ptr() as usize, size, tag));
        }

        let mut sorted = spans.clone();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlap between {:?} and {:?}", pair[0], pair[1]);
        }

        for (addr, size, tag) in spans {
            let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, size) };
            prop_assert!(bytes.iter().all(|&b| b == tag));
        }
    }

    #[test]
    fn test_arena_reset_replays_the_same_addresses(sizes in proptest::collection::vec(1usize..2000, 1..40)) {
        let mut arena = Arena::new(1024);
        let first: Vec<usize> = sizes.iter().map(|&s| arena.alloc(s, 1).unwrap().as_ptr() as usize).collect();
        let blocks = arena.block_count();
        arena.reset();
        let second: Vec<usize> = sizes.iter().map(|&s| arena.alloc(s, 1).unwrap().as_ptr() as usize).collect();
        prop_assert_eq!(first, second);
        prop_assert_eq!(arena.block_count(), blocks);
    }
}
