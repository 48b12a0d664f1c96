// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{ResourceError, Result};
use crate::resources::{
    ResourceGuid, ResourceHandle, ResourceId, ResourceInstance, ResourceOwner, ResourceStats,
    ResourceTypeRegistry, StorageType,
};

/// Counters kept up to date by each resource's notification points
#[derive(Debug, Default)]
struct StoreCounters {
    loaded: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Default)]
struct StoreMaps {
    resources: AHashMap<ResourceId, ResourceOwner>,
    guids: AHashMap<ResourceGuid, ResourceId>,
}

/// Owns every live resource, one slot per [`ResourceId`]
pub struct ResourceStore {
    types: Arc<ResourceTypeRegistry>,
    maps: Mutex<StoreMaps>,
    counters: Arc<StoreCounters>,
}

impl ResourceStore {
    pub fn new(types: Arc<ResourceTypeRegistry>) -> Self {
        Self {
            types,
            maps: Mutex::new(StoreMaps::default()),
            counters: Arc::new(StoreCounters::default()),
        }
    }

    pub fn types(&self) -> &Arc<ResourceTypeRegistry> {
        &self.types
    }

    /// Returns the existing entry for `id`, or creates one in `NotLoaded`.
    ///
    /// With `force_new` an existing entry is replaced, which invalidates its
    /// handles; that is only allowed while the old entry may be removed.
    pub fn add_resource(&self, id: &ResourceId, force_new: bool) -> Result<ResourceHandle> {
        if !id.is_valid() {
            return Err(ResourceError::InvalidResourceId(id.to_string()));
        }

        let mut maps = self.maps.lock();
        if let Some(existing) = maps.resources.get(id) {
            if !force_new {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(existing.observe());
            }
            let state = existing.get().map(|res| res.state());
            if let Some(state) = state.filter(|state| !state.can_remove()) {
                return Err(ResourceError::InvalidState {
                    id: id.clone(),
                    state,
                });
            }
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let payload = self.types.create(id.type_id())?;
        let instance = ResourceInstance::new(id.clone(), payload);

        let counters = self.counters.clone();
        instance.on_loaded().subscribe(move |_| {
            counters.loaded.fetch_add(1, Ordering::AcqRel);
        });
        let counters = self.counters.clone();
        instance.on_unloaded().subscribe(move |_| {
            let _ = counters
                .loaded
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        });

        let guid = instance.guid();
        let owner = ResourceOwner::new(instance);
        let handle = owner.observe();

        let replaced = maps.resources.insert(id.clone(), owner);
        if let Some(old_guid) = replaced.as_ref().and_then(|old| old.get().map(|res| res.guid())) {
            maps.guids.remove(&old_guid);
        }
        maps.guids.insert(guid, id.clone());
        drop(maps);

        if let Some(mut replaced) = replaced {
            replaced.reset();
        }
        tracing::trace!(resource = %id, "resource added to store");
        Ok(handle)
    }

    pub fn get_resource(&self, id: &ResourceId) -> Option<ResourceHandle> {
        self.maps.lock().resources.get(id).map(|owner| owner.observe())
    }

    pub fn get_resource_from_guid(&self, guid: &ResourceGuid) -> Option<ResourceHandle> {
        let maps = self.maps.lock();
        let id = maps.guids.get(guid)?;
        maps.resources.get(id).map(|owner| owner.observe())
    }

    pub fn has_resource(&self, id: &ResourceId) -> bool {
        self.maps.lock().resources.contains_key(id)
    }

    /// True when `handle` still points at a resource this store owns
    pub fn has_handle(&self, handle: &ResourceHandle) -> bool {
        let Some(id) = handle.get().map(|res| res.id().clone()) else {
            return false;
        };
        self.maps
            .lock()
            .resources
            .get(&id)
            .is_some_and(|owner| owner.observe().ptr_eq(handle))
    }

    /// Re-keys the guid index for a resource
    pub fn assign_guid(&self, handle: &ResourceHandle, guid: ResourceGuid) -> Result<()> {
        let instance = handle.try_get()?;
        let mut maps = self.maps.lock();
        maps.guids.remove(&instance.guid());
        instance.set_guid(guid);
        maps.guids.insert(guid, instance.id().clone());
        Ok(())
    }

    /// Destroys the entry for `id`, invalidating all of its handles.
    ///
    /// Returns `Ok(false)` if nothing is tracked under `id`.
    pub fn remove_resource(&self, id: &ResourceId) -> Result<bool> {
        let mut owner = {
            let mut maps = self.maps.lock();
            let Some(owner) = maps.resources.get(id) else {
                return Ok(false);
            };
            let (state, guid) = match owner.get() {
                Some(res) => (res.state(), res.guid()),
                None => return Ok(false),
            };
            if !state.can_remove() {
                return Err(ResourceError::InvalidState {
                    id: id.clone(),
                    state,
                });
            }
            maps.guids.remove(&guid);
            match maps.resources.remove(id) {
                Some(owner) => owner,
                None => return Ok(false),
            }
        };

        // Destroy outside the map lock so destroyed-listeners may call back in.
        owner.reset();
        tracing::trace!(resource = %id, "resource removed from store");
        Ok(true)
    }

    pub fn remove_handle(&self, handle: &ResourceHandle) -> Result<bool> {
        let Some(id) = handle.get().map(|res| res.id().clone()) else {
            return Ok(false);
        };
        self.remove_resource(&id)
    }

    pub fn get_all_resource_ids(&self) -> Vec<ResourceId> {
        self.maps.lock().resources.keys().cloned().collect()
    }

    pub fn get_all_resources(&self) -> Vec<ResourceHandle> {
        self.maps
            .lock()
            .resources
            .values()
            .map(|owner| owner.observe())
            .collect()
    }

    pub fn resource_count(&self) -> usize {
        self.maps.lock().resources.len()
    }

    /// Resources currently `Loaded`, maintained from load/unload notifications
    pub fn loaded_count(&self) -> usize {
        self.counters.loaded.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ResourceStats {
        let mut stats = ResourceStats::default();
        let handles = self.get_all_resources();
        for handle in &handles {
            if let Some(res) = handle.get() {
                if res.is_loaded() {
                    stats.total_memory_used += res.payload().memory_size();
                }
                if res.storage_type() == StorageType::Disk {
                    stats.load_time_ms += res.load_time().as_millis() as u64;
                    stats.unload_time_ms += res.unload_time().as_millis() as u64;
                }
            }
        }
        stats.total_resources = handles.len();
        stats.loaded_resources = self.loaded_count();
        stats.cache_hits = self.counters.hits.load(Ordering::Relaxed);
        stats.cache_misses = self.counters.misses.load(Ordering::Relaxed);
        stats
    }

    /// Destroys every entry regardless of state. Callers must drain
    /// in-flight loads first.
    pub fn clear(&self) {
        let owners: Vec<ResourceOwner> = {
            let mut maps = self.maps.lock();
            maps.guids.clear();
            maps.resources.drain().map(|(_, owner)| owner).collect()
        };
        drop(owners);
        self.counters.loaded.store(0, Ordering::Release);
    }
}
