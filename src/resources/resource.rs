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

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::resources::handle::{ObserverPtr, OwnerPtr};
use crate::resources::notify::ListenerSet;
use crate::resources::{
    AtomicResourceState, ResourceGuid, ResourceId, ResourceState, StorageType,
};

/// Owning slot the store keeps for each resource
pub type ResourceOwner = OwnerPtr<ResourceInstance>;

/// Handle given out to callers; nulled when the store destroys the resource
pub type ResourceHandle = ObserverPtr<ResourceInstance>;

/// Core trait for any loadable resource payload
pub trait Resource: Send + Sync + 'static {
    /// Get resource type name
    fn type_name(&self) -> &'static str;

    /// Get approximate size in bytes
    fn memory_size(&self) -> usize {
        0
    }

    /// Serialize into the engine's binary format
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Memory-load entry point, fed engine-format bytes
    fn load_from_memory(&mut self, bytes: &[u8]) -> Result<()>;

    /// Unload resource, freeing memory
    fn unload(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Resource type the type registry can construct
pub trait TypedResource: Resource + Default {
    const TYPE_NAME: &'static str;
}

/// Relationship from one resource to another
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceLinkKind {
    /// This resource only exists inside the target (mesh -> model)
    Dependent,
    /// This resource owns the target; unloading cascades (model -> mesh)
    DependentOwner,
    /// Plain use; unloading does not cascade (material -> texture)
    Reference,
}

#[derive(Clone, Debug)]
pub struct ReferenceLink {
    pub kind: ReferenceLinkKind,
    pub target: ResourceHandle,
}

/// Wall-clock timer for load/unload durations
#[derive(Clone, Debug, Default)]
pub struct LoadTimer {
    started: Option<Instant>,
    elapsed: Duration,
}

impl LoadTimer {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.elapsed = Duration::ZERO;
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed = started.elapsed();
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => started.elapsed(),
            None => self.elapsed,
        }
    }
}

/// A tracked resource: identity, lifecycle bookkeeping and the payload.
///
/// Only the store creates these. The manager's loading pipeline and the
/// loader it dispatches to are the only writers of `state` and payload.
pub struct ResourceInstance {
    id: ResourceId,
    guid: Mutex<ResourceGuid>,
    source_file_path: RwLock<String>,
    state: AtomicResourceState,
    storage_type: RwLock<StorageType>,
    in_pack: AtomicBool,
    reference_links: Mutex<SmallVec<[ReferenceLink; 4]>>,
    load_timer: Mutex<LoadTimer>,
    unload_timer: Mutex<LoadTimer>,
    on_loaded: ListenerSet<ResourceId>,
    on_unloaded: ListenerSet<ResourceId>,
    payload: RwLock<Box<dyn Resource>>,
}

impl ResourceInstance {
    pub(crate) fn new(id: ResourceId, payload: Box<dyn Resource>) -> Self {
        Self {
            source_file_path: RwLock::new(id.path().to_string()),
            id,
            guid: Mutex::new(ResourceGuid::new()),
            state: AtomicResourceState::new(ResourceState::NotLoaded),
            storage_type: RwLock::new(StorageType::Disk),
            in_pack: AtomicBool::new(false),
            reference_links: Mutex::new(SmallVec::new()),
            load_timer: Mutex::new(LoadTimer::default()),
            unload_timer: Mutex::new(LoadTimer::default()),
            on_loaded: ListenerSet::new(),
            on_unloaded: ListenerSet::new(),
            payload: RwLock::new(payload),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Path of the file this resource loads from
    pub fn file_path(&self) -> &str {
        self.id.path()
    }

    /// Pre-conversion origin; equals `file_path` unless converted
    pub fn source_file_path(&self) -> String {
        self.source_file_path.read().clone()
    }

    pub fn guid(&self) -> ResourceGuid {
        *self.guid.lock()
    }

    pub fn state(&self) -> ResourceState {
        self.state.load()
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ResourceState::Loaded
    }

    pub fn storage_type(&self) -> StorageType {
        *self.storage_type.read()
    }

    pub fn is_in_pack(&self) -> bool {
        self.in_pack.load(Ordering::Acquire)
    }

    pub fn reference_links(&self) -> Vec<ReferenceLink> {
        self.reference_links.lock().iter().cloned().collect()
    }

    /// Links of one kind whose target is still alive
    pub fn links_of_kind(&self, kind: ReferenceLinkKind) -> Vec<ResourceHandle> {
        self.reference_links
            .lock()
            .iter()
            .filter(|link| link.kind == kind && link.target.is_valid())
            .map(|link| link.target.clone())
            .collect()
    }

    pub fn load_time(&self) -> Duration {
        self.load_timer.lock().elapsed()
    }

    pub fn unload_time(&self) -> Duration {
        self.unload_timer.lock().elapsed()
    }

    /// Fired once each time the resource reaches `Loaded`
    pub fn on_loaded(&self) -> &ListenerSet<ResourceId> {
        &self.on_loaded
    }

    /// Fired once each time the resource reaches `Unloaded`
    pub fn on_unloaded(&self) -> &ListenerSet<ResourceId> {
        &self.on_unloaded
    }

    pub fn payload(&self) -> RwLockReadGuard<'_, Box<dyn Resource>> {
        self.payload.read()
    }

    pub fn payload_mut(&self) -> RwLockWriteGuard<'_, Box<dyn Resource>> {
        self.payload.write()
    }

    /// Typed read access to the payload
    pub fn read<T: Resource>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.payload.read(), |payload| {
            payload.as_any().downcast_ref::<T>()
        })
        .ok()
    }

    /// Typed write access to the payload
    pub fn write<T: Resource>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.payload.write(), |payload| {
            payload.as_any_mut().downcast_mut::<T>()
        })
        .ok()
    }

    pub(crate) fn state_cell(&self) -> &AtomicResourceState {
        &self.state
    }

    pub(crate) fn set_guid(&self, guid: ResourceGuid) {
        *self.guid.lock() = guid;
    }

    pub(crate) fn set_source_file_path(&self, path: &str) {
        *self.source_file_path.write() = path.to_string();
    }

    pub(crate) fn set_storage_type(&self, storage: StorageType) {
        *self.storage_type.write() = storage;
    }

    /// Claims pack membership; false if already in a pack
    pub(crate) fn enter_pack(&self) -> bool {
        self.in_pack
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn leave_pack(&self) {
        self.in_pack.store(false, Ordering::Release);
    }

    pub(crate) fn add_reference_link(&self, kind: ReferenceLinkKind, target: ResourceHandle) {
        let mut links = self.reference_links.lock();
        if links
            .iter()
            .any(|link| link.kind == kind && link.target.ptr_eq(&target))
        {
            return;
        }
        links.push(ReferenceLink { kind, target });
    }

    pub(crate) fn remove_reference_links_to(&self, target: &ResourceHandle) {
        self.reference_links
            .lock()
            .retain(|link| link.target.is_valid() && !link.target.ptr_eq(target));
    }

    pub(crate) fn start_load_timer(&self) {
        self.load_timer.lock().start();
    }

    pub(crate) fn stop_load_timer(&self) {
        self.load_timer.lock().stop();
    }

    pub(crate) fn start_unload_timer(&self) {
        self.unload_timer.lock().start();
    }

    pub(crate) fn stop_unload_timer(&self) {
        self.unload_timer.lock().stop();
    }
}

impl std::fmt::Debug for ResourceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceInstance")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("storage_type", &self.storage_type())
            .finish()
    }
}

/// Convenience accessors for handles
pub trait ResourceHandleExt {
    /// State, or `None` once the resource was destroyed
    fn state(&self) -> Option<ResourceState>;

    fn resource_id(&self) -> Option<ResourceId>;

    fn is_loaded(&self) -> bool {
        self.state() == Some(ResourceState::Loaded)
    }
}

impl ResourceHandleExt for ResourceHandle {
    fn state(&self) -> Option<ResourceState> {
        self.get().map(|instance| instance.state())
    }

    fn resource_id(&self) -> Option<ResourceId> {
        self.get().map(|instance| instance.id().clone())
    }
}

/// Snapshot of the store, taken by [`ResourceStore::stats`](crate::resources::ResourceStore::stats)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceStats {
    pub total_resources: usize,
    pub loaded_resources: usize,
    /// Sum of `memory_size` over loaded payloads
    pub total_memory_used: usize,
    /// `add_resource` calls answered by an existing entry
    pub cache_hits: u64,
    /// `add_resource` calls that created an entry
    pub cache_misses: u64,
    pub load_time_ms: u64,
    pub unload_time_ms: u64,
}

impl ResourceStats {
    /// Share of lookups deduplicated onto an existing entry
    pub fn cache_hit_ratio(&self) -> f32 {
        match self.cache_hits + self.cache_misses {
            0 => 0.0,
            total => self.cache_hits as f32 / total as f32,
        }
    }

    /// Entries the store tracks without a loaded payload
    pub fn idle_resources(&self) -> usize {
        self.total_resources.saturating_sub(self.loaded_resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::builtin::BinaryResource;

    fn instance(path: &str) -> ResourceInstance {
        ResourceInstance::new(
            ResourceId::of::<BinaryResource>(path),
            Box::new(BinaryResource::default()),
        )
    }

    #[test]
    fn test_new_instance_defaults() {
        let res = instance("data/blob.bin");
        assert_eq!(res.state(), ResourceState::NotLoaded);
        assert_eq!(res.storage_type(), StorageType::Disk);
        assert_eq!(res.source_file_path(), "data/blob.bin");
        assert!(!res.is_in_pack());
    }

    #[test]
    fn test_typed_payload_access() {
        let res = instance("data/blob.bin");
        res.write::<BinaryResource>().unwrap().set_data(vec![1, 2, 3]);
        assert_eq!(res.read::<BinaryResource>().unwrap().data(), &[1, 2, 3]);
        assert!(res.read::<crate::resources::builtin::TextResource>().is_none());
    }

    #[test]
    fn test_pack_membership_is_exclusive() {
        let res = instance("data/blob.bin");
        assert!(res.enter_pack());
        assert!(!res.enter_pack());
        res.leave_pack();
        assert!(res.enter_pack());
    }

    #[test]
    fn test_reference_links_deduplicate() {
        let owner = OwnerPtr::new(instance("models/chair.mdl"));
        let mesh = instance("models/chair.mdl#mesh0");

        mesh.add_reference_link(ReferenceLinkKind::Dependent, owner.observe());
        mesh.add_reference_link(ReferenceLinkKind::Dependent, owner.observe());
        assert_eq!(mesh.reference_links().len(), 1);

        mesh.remove_reference_links_to(&owner.observe());
        assert!(mesh.reference_links().is_empty());
    }

    #[test]
    fn test_load_timer() {
        let mut timer = LoadTimer::default();
        timer.start();
        assert!(timer.is_running());
        timer.stop();
        assert!(!timer.is_running());
        let first = timer.elapsed();
        assert_eq!(timer.elapsed(), first);
    }
}
