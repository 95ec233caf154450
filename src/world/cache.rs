use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Default share of the capacity the cache shrinks to when it evicts.
const LOW_WATER_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    VertexBuffer,
    Program,
}

/// A resource living in GPU memory. `handle` is only meaningful on the context that
/// created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuResource {
    pub kind: ResourceKind,
    pub handle: u32,
    pub size: u64,
}

/// Byte-budgeted cache of GPU resources.
pub trait GpuResourceCache: Send {
    fn capacity(&self) -> u64;

    /// Size the cache shrinks to once it evicts.
    fn low_water(&self) -> u64;

    /// Bytes currently held.
    fn used(&self) -> u64;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `resource` under `key`. When the capacity would be exceeded, least recently
    /// used entries are evicted until the new total fits under the low-water mark.
    /// Returns false when the resource alone exceeds the capacity.
    fn put(&mut self, key: &str, resource: GpuResource) -> bool;

    fn get(&mut self, key: &str) -> Option<GpuResource>;

    fn contains(&self, key: &str) -> bool;

    fn remove(&mut self, key: &str) -> Option<GpuResource>;

    /// Drops every entry.
    fn clear(&mut self);
}

pub type SharedGpuResourceCache = Arc<Mutex<dyn GpuResourceCache>>;

struct Entry {
    resource: GpuResource,
    last_used: u64,
}

/// Least-recently-used [`GpuResourceCache`].
pub struct BasicGpuResourceCache {
    capacity: u64,
    low_water: u64,
    used: u64,
    clock: u64,
    entries: HashMap<String, Entry>,
}

impl BasicGpuResourceCache {
    pub fn new(capacity: u64) -> Self {
        Self::with_low_water(capacity, (capacity as f64 * LOW_WATER_RATIO) as u64)
    }

    pub fn with_low_water(capacity: u64, low_water: u64) -> Self {
        Self {
            capacity,
            low_water: low_water.min(capacity),
            used: 0,
            clock: 0,
            entries: HashMap::new(),
        }
    }

    pub fn shared(capacity: u64) -> SharedGpuResourceCache {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn shrink_to(&mut self, target: u64) {
        while self.used > target {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            let Some(key) = oldest else { break };
            if let Some(e) = self.entries.remove(&key) {
                self.used -= e.resource.size;
                log::trace!("gpu cache evicted {key} ({} bytes)", e.resource.size);
            }
        }
    }
}

impl GpuResourceCache for BasicGpuResourceCache {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn low_water(&self) -> u64 {
        self.low_water
    }

    fn used(&self) -> u64 {
        self.used
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn put(&mut self, key: &str, resource: GpuResource) -> bool {
        if resource.size > self.capacity {
            log::warn!("gpu resource {key} ({} bytes) exceeds the cache capacity", resource.size);
            return false;
        }

        self.remove(key);
        if self.used + resource.size > self.capacity {
            self.shrink_to(self.low_water.saturating_sub(resource.size));
        }

        let last_used = self.tick();
        self.used += resource.size;
        self.entries.insert(key.to_string(), Entry { resource, last_used });
        true
    }

    fn get(&mut self, key: &str) -> Option<GpuResource> {
        let now = self.tick();
        let e = self.entries.get_mut(key)?;
        e.last_used = now;
        Some(e.resource)
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> Option<GpuResource> {
        let e = self.entries.remove(key)?;
        self.used -= e.resource.size;
        Some(e.resource)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }
}
