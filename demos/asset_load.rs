//! Loads a batch of mock assets the way a game or tool would at startup.
//!
//! - one [`Arena`] per decode task for scratch memory
//! - a [`ThreadPool`] running the decodes
//! - a [`HandlePool`] holding the loaded assets
//! - a path-keyed [`HashMap`] so each path is decoded once
//! - a mock GPU context behind [`ContextLock`] for uploads
//!
//! ```text
//! RUST_LOG=hearth=debug cargo run --example asset_load [config.json]
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use anyhow::{bail, Context, Result};
use hearth::config::SubstrateConfig;
use hearth::{
    Arena, ContextLock, ExclusiveContext, Handle, HandlePool, HashMap, Probe, Submitter, ThreadPool,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MAX_ASSETS: usize = 64;

#[derive(Debug)]
enum AssetState {
    Pending,
    Ready { bytes: usize, checksum: u64, texture: u32 },
    Failed(String),
}

#[derive(Debug)]
struct Asset {
    path: String,
    state: AssetState,
}

struct PathEntry {
    path: String,
    handle: Handle,
}

fn path_hash(path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

struct PathProbe;

impl Probe<PathEntry> for PathProbe {
    fn hash(&self, entry: &PathEntry) -> u64 {
        path_hash(&entry.path)
    }

    fn eq(&self, a: &PathEntry, b: &PathEntry) -> bool {
        a.path == b.path
    }
}

#[derive(Debug, thiserror::Error)]
#[error("GPU context already current on {0:?}")]
struct GpuBusy(ThreadId);

#[derive(Default)]
struct MockGpu {
    current: Option<ThreadId>,
    next_texture: u32,
    uploaded_bytes: usize,
}

impl ExclusiveContext for MockGpu {
    type Error = GpuBusy;

    fn bind(&mut self) -> Result<(), GpuBusy> {
        if let Some(owner) = self.current {
            return Err(GpuBusy(owner));
        }
        self.current = Some(std::thread::current().id());
        Ok(())
    }

    fn unbind(&mut self) {
        self.current = None;
    }
}

impl MockGpu {
    fn upload(&mut self, texels: &[u32]) -> u32 {
        debug_assert_eq!(self.current, Some(std::thread::current().id()));
        self.uploaded_bytes += std::mem::size_of_val(texels);
        self.next_texture += 1;
        self.next_texture
    }
}

/// Produces pseudo-random "texels" for `path`, expanding them twice through
/// `grow_slice` the way a streaming decoder appends mip levels.
fn decode<'a>(arena: &'a Arena, path: &str) -> Result<&'a [u32]> {
    if path.ends_with(".corrupt") {
        bail!("{path}: bad header");
    }
    let seed = path_hash(path) | 1;
    let base = 256 + (seed % 768) as usize;

    let mut texels = arena.alloc_slice_zeroed::<u32>(base)?;
    let mut state = seed;
    for texel in texels.iter_mut() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *texel = state as u32;
    }
    for _ in 0..2 {
        let filled = texels.len();
        texels = arena.grow_slice(texels, filled + filled / 4)?;
        let (head, tail) = texels.split_at_mut(filled);
        for (i, texel) in tail.iter_mut().enumerate() {
            *texel = head[i * 4].wrapping_add(head[i * 4 + 1]) / 2;
        }
    }
    Ok(texels)
}

struct AssetRegistry {
    index: HashMap<PathEntry, PathProbe>,
    assets: Arc<Mutex<HandlePool<Asset, MAX_ASSETS>>>,
    gpu: Arc<ContextLock<MockGpu>>,
    workers: ThreadPool,
    submitter: Submitter,
    block_size: usize,
}

impl AssetRegistry {
    fn new(config: &SubstrateConfig) -> Result<Self> {
        let mut workers = ThreadPool::with_config(&config.thread_pool);
        workers.start().context("starting decode workers")?;
        let mut index = HashMap::with_probe(config.hash_map.initial_capacity, PathProbe);
        index.set_max_load_factor(config.hash_map.max_load_factor)?;
        Ok(Self {
            index,
            assets: Arc::new(Mutex::new(HandlePool::new())),
            gpu: Arc::new(ContextLock::new(MockGpu::default())),
            submitter: workers.submitter(),
            workers,
            block_size: config.arena.block_size,
        })
    }

    /// Returns the handle for `path`, queueing a decode the first time it is seen.
    ///
    /// If the decode cannot be queued the slot and the index entry are released again,
    /// so a later request for the same path starts over.
    fn request(&mut self, path: &str) -> Result<Handle> {
        if let Some(entry) = self.index.search_hashed(path_hash(path), |e| e.path == path) {
            return Ok(entry.handle);
        }

        let handle = self
            .assets
            .lock()
            .map_err(|_| anyhow::anyhow!("asset pool poisoned"))?
            .acquire(Asset {
                path: path.to_string(),
                state: AssetState::Pending,
            })?;
        self.index.insert(PathEntry {
            path: path.to_string(),
            handle,
        });

        let assets = Arc::clone(&self.assets);
        let gpu = Arc::clone(&self.gpu);
        let owned = path.to_string();
        let block_size = self.block_size;
        let queued = self.submitter.submit(move || {
            let arena = Arena::new(block_size);
            let state = match decode(&arena, &owned) {
                Ok(texels) => {
                    let checksum = texels.iter().fold(0u64, |acc, &t| acc.rotate_left(5) ^ u64::from(t));
                    match gpu.with(|ctx| ctx.upload(texels)) {
                        Ok(texture) => AssetState::Ready {
                            bytes: std::mem::size_of_val(texels),
                            checksum,
                            texture,
                        },
                        Err(err) => AssetState::Failed(err.to_string()),
                    }
                }
                Err(err) => AssetState::Failed(format!("{err:#}")),
            };
            if let Ok(mut assets) = assets.lock() {
                if let Some(asset) = assets.get_mut(handle) {
                    asset.state = state;
                }
            }
        });

        if let Err(err) = queued {
            self.index.remove(&PathEntry {
                path: path.to_string(),
                handle,
            });
            if let Ok(mut assets) = self.assets.lock() {
                // The handle was acquired above and nothing else has seen it.
                let _ = assets.give_back(handle);
            }
            return Err(err).with_context(|| format!("queueing decode of {path}"));
        }
        Ok(handle)
    }

    fn finish(&self) -> Result<()> {
        self.workers.wait()?;
        Ok(())
    }

    fn report(&self) -> Result<()> {
        let assets = self
            .assets
            .lock()
            .map_err(|_| anyhow::anyhow!("asset pool poisoned"))?;
        for (handle, asset) in assets.iter() {
            match &asset.state {
                AssetState::Ready { bytes, checksum, texture } => {
                    info!(%handle, path = %asset.path, bytes, checksum, texture, "loaded");
                }
                AssetState::Failed(reason) => warn!(%handle, path = %asset.path, %reason, "failed"),
                AssetState::Pending => warn!(%handle, path = %asset.path, "never decoded"),
            }
        }
        info!(
            assets = assets.len(),
            unique_paths = self.index.len(),
            load_factor = self.index.load_factor(),
            "registry summary"
        );
        Ok(())
    }

    fn shutdown(self) -> Result<usize> {
        self.workers.destroy()?;
        let gpu = self.gpu.lock().map_err(|err| anyhow::anyhow!(err))?;
        Ok(gpu.uploaded_bytes)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("asset_load=info".parse()?))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SubstrateConfig::from_path(&path).with_context(|| format!("loading {path}"))?,
        None => SubstrateConfig::default(),
    };

    let mut registry = AssetRegistry::new(&config)?;
    let requests = [
        "textures/grass.png",
        "textures/rock.png",
        "textures/grass.png",
        "models/tree.mesh",
        "textures/sky.hdr",
        "models/tree.mesh",
        "audio/wind.corrupt",
        "textures/rock.png",
    ];
    for path in requests {
        let handle = registry.request(path)?;
        info!(path, %handle, "requested");
    }

    registry.finish()?;
    registry.report()?;
    let uploaded = registry.shutdown()?;
    info!(uploaded, "done");
    Ok(())
}
