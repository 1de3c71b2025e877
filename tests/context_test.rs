use hearth::concurrency::{ContextLock, ExclusiveContext, ThreadPool};
use std::sync::Arc;
use std::thread::ThreadId;

/// Stand-in for a graphics context that must be current on exactly one thread.
#[derive(Default)]
struct MockGpu {
    current: Option<ThreadId>,
    uploads: Vec<(ThreadId, usize)>,
}

#[derive(Debug, PartialEq)]
struct AlreadyCurrent;

impl ExclusiveContext for MockGpu {
    type Error = AlreadyCurrent;

    fn bind(&mut self) -> Result<(), AlreadyCurrent> {
        if self.current.is_some() {
            return Err(AlreadyCurrent);
        }
        self.current = Some(std::thread::current().id());
        Ok(())
    }

    fn unbind(&mut self) {
        self.current = None;
    }
}

impl MockGpu {
    fn upload(&mut self, bytes: usize) {
        let me = std::thread::current().id();
        assert_eq!(self.current, Some(me), "upload without a current context");
        self.uploads.push((me, bytes));
    }
}

#[test]
fn test_context_uploads_from_pool_workers() {
    let gpu = Arc::new(ContextLock::new(MockGpu::default()));
    let mut pool = ThreadPool::new(4);
    pool.start().unwrap();

    for i in 0..40 {
        let gpu = Arc::clone(&gpu);
        pool.submit(move || {
            gpu.with(|ctx| ctx.upload(i)).unwrap();
        })
        .unwrap();
    }
    pool.wait().unwrap();
    pool.destroy().unwrap();

    let gpu = Arc::try_unwrap(gpu).ok().unwrap().into_inner();
    assert_eq!(gpu.current, None);
    let mut sizes: Vec<usize> = gpu.uploads.iter().map(|&(_, b)| b).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, (0..40).collect::<Vec<_>>());
}

#[test]
fn test_context_guard_derefs_to_context() {
    let gpu = ContextLock::new(MockGpu::default());
    {
        let mut guard = gpu.lock().unwrap();
        guard.upload(16);
        assert!(guard.current.is_some());
    }
    assert!(gpu.lock().unwrap().uploads.len() == 1);
}
