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

//! Load/unload orchestration.
//!
//! The manager resolves ids, keeps the FIFO pending queue and runs the
//! loading pipeline, either on the calling thread (`load_sync`) or on the
//! worker pool (`load` + `update`). All resource state changes go through
//! compare-exchange on the resource's atomic state, so a resource is only
//! ever claimed by one pipeline run.

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::error::{ResourceError, Result};
use crate::resources::database::{DatabaseRecord, ResourceDatabase};
use crate::resources::engine_format::{converted_path, is_engine_format, peek_type};
use crate::resources::meta::ResourceMetaData;
use crate::resources::{
    EngineResourceFile, LoadContext, LoaderRegistry, ReferenceLinkKind, ResourceGuid,
    ResourceHandle, ResourceHandleExt, ResourceId, ResourceInstance, ResourceLoader,
    ResourceManagerConfig, ResourcePack, ResourceState, ResourceStats, ResourceStore,
    ResourceTypeRegistry, StorageType, TypedResource,
};

const WAIT_SLICE: Duration = Duration::from_millis(10);

/// A pipeline run that finished, reported through [`ResourceManager::update`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadCompletion {
    pub id: ResourceId,
    pub state: ResourceState,
}

/// What one call to [`ResourceManager::update`] did
#[derive(Clone, Debug, Default)]
pub struct UpdateSummary {
    /// Resources handed to workers
    pub dispatched: usize,
    /// Pipeline runs that finished since the previous update
    pub completed: Vec<LoadCompletion>,
}

/// Result of an unload request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    /// The resource lives inside a still-loaded owner; the owner unloads it
    SkippedDependent,
    /// Nothing to do, the resource was not `Loaded`
    NotLoaded,
}

struct ManagerShared {
    config: ResourceManagerConfig,
    types: Arc<ResourceTypeRegistry>,
    loaders: Arc<LoaderRegistry>,
    store: ResourceStore,
    packs: RwLock<Vec<Arc<ResourcePack>>>,
    pending: Mutex<VecDeque<ResourceHandle>>,
    in_flight: Mutex<usize>,
    idle: Condvar,
    completed_tx: Sender<LoadCompletion>,
    completed_rx: Receiver<LoadCompletion>,
    shutting_down: AtomicBool,
    /// Dispatched loads cancelled by their worker during shutdown
    cancelled_in_flight: AtomicUsize,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl ManagerShared {
    fn cancel_pending(&self) -> usize {
        let drained: Vec<ResourceHandle> = self.pending.lock().drain(..).collect();
        let mut cancelled = 0;
        for handle in drained {
            if let Some(instance) = handle.get() {
                if instance
                    .state_cell()
                    .transition(ResourceState::Queued, ResourceState::Cancelled)
                {
                    tracing::debug!(resource = %instance.id(), "queued load cancelled");
                    cancelled += 1;
                }
            }
        }
        cancelled
    }
}

impl Drop for ManagerShared {
    fn drop(&mut self) {
        self.shutting_down.store(true, Ordering::Release);
        self.cancel_pending();
    }
}

/// Resource manager
///
/// Cheap to clone; every clone drives the same store, queue and worker pool.
#[derive(Clone)]
pub struct ResourceManager {
    shared: Arc<ManagerShared>,
}

impl ResourceManager {
    /// Manager with the built-in resource types and loaders
    pub fn new(config: ResourceManagerConfig) -> Result<Self> {
        Self::with_registries(
            config,
            Arc::new(ResourceTypeRegistry::with_builtin_types()),
            Arc::new(LoaderRegistry::with_builtin_loaders()),
        )
    }

    pub fn with_registries(
        config: ResourceManagerConfig,
        types: Arc<ResourceTypeRegistry>,
        loaders: Arc<LoaderRegistry>,
    ) -> Result<Self> {
        let config = config.sanitized();
        let (completed_tx, completed_rx) = unbounded();

        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|index| format!("resource-loader-{index}"))
            .build()
            .map_err(|e| ResourceError::IoError(format!("failed to start loader pool: {e}")))?;

        tracing::debug!(
            root = %config.project_root.display(),
            max_concurrent_loads = config.max_concurrent_loads,
            "resource manager created"
        );

        Ok(Self {
            shared: Arc::new(ManagerShared {
                store: ResourceStore::new(types.clone()),
                config,
                types,
                loaders,
                packs: RwLock::new(Vec::new()),
                pending: Mutex::new(VecDeque::new()),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
                completed_tx,
                completed_rx,
                shutting_down: AtomicBool::new(false),
                cancelled_in_flight: AtomicUsize::new(0),
                #[cfg(feature = "parallel")]
                pool,
            }),
        })
    }

    pub fn config(&self) -> &ResourceManagerConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &ResourceStore {
        &self.shared.store
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.shared.loaders
    }

    pub fn types(&self) -> &ResourceTypeRegistry {
        &self.shared.types
    }

    /// Registers a resource type; false if the tag was already known
    pub fn register_type<T: TypedResource>(&self) -> bool {
        self.shared.types.register::<T>()
    }

    pub fn register_loader<L: ResourceLoader + Default + 'static>(&self) -> Result<()> {
        self.shared.loaders.register_loader::<L>()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shared.shutting_down.load(Ordering::Acquire) {
            return Err(ResourceError::ShuttingDown);
        }
        Ok(())
    }

    /// Where a resource path lives on disk
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.shared.config.resolve(path)
    }

    /// Fills in a missing type tag from the loader registry (or, for
    /// converted files, from the file header) and checks the tag is known.
    pub fn resolve_id(&self, id: &ResourceId) -> Result<ResourceId> {
        if id.path().is_empty() {
            return Err(ResourceError::InvalidResourceId(id.to_string()));
        }

        let resolved = if id.has_type() {
            id.clone()
        } else {
            let path = Path::new(id.path());
            let type_id = if is_engine_format(path) {
                peek_type(&self.resolve_path(id.path()))
                    .map_err(|_| ResourceError::InvalidResourceId(id.to_string()))?
            } else {
                self.shared.loaders.resolve_type(path).ok_or_else(|| {
                    ResourceError::LoaderNotFound(id.extension().unwrap_or_default())
                })?
            };
            id.with_type(type_id)
        };

        if !self.shared.types.contains(resolved.type_id()) {
            return Err(ResourceError::UnknownResourceType(
                resolved.type_id().to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Gets or creates the store entry, adopting a sidecar guid for new entries
    fn acquire(&self, id: &ResourceId) -> Result<ResourceHandle> {
        let is_new = !self.shared.store.has_resource(id);
        let handle = self.shared.store.add_resource(id, false)?;
        if is_new {
            let sidecar = self.resolve_path(id.path());
            match ResourceMetaData::read_for(&sidecar) {
                Ok(Some(meta)) => self.shared.store.assign_guid(&handle, meta.guid)?,
                Ok(None) => {}
                Err(e) => tracing::warn!(resource = %id, "unreadable meta sidecar: {e}"),
            }
        }
        Ok(handle)
    }

    /// Loads on the calling thread and returns once the resource left
    /// `Queued`/`Loading`. Check the handle's state for the outcome.
    pub fn load_sync(&self, id: &ResourceId) -> Result<ResourceHandle> {
        self.load_sync_with(id, false)
    }

    /// [`load_sync`](Self::load_sync), converting the source to the engine
    /// format first when `convert_to_engine_format` is set
    pub fn load_sync_with(
        &self,
        id: &ResourceId,
        convert_to_engine_format: bool,
    ) -> Result<ResourceHandle> {
        self.ensure_running()?;
        let mut id = self.resolve_id(id)?;
        if convert_to_engine_format {
            id = self.convert_resource(&id)?;
        }

        let handle = self.acquire(&id)?;
        let Some(state) = handle.state() else {
            return Err(ResourceError::ObserverInvalidated);
        };
        if self.is_memory_resource(&handle) {
            return Ok(handle);
        }

        if state.can_start_load() {
            if let Some(instance) = handle.get() {
                instance
                    .state_cell()
                    .transition_from(ResourceState::can_start_load, ResourceState::Queued);
            }
        }
        // An entry still waiting in the async queue is claimed here and taken
        // out of the queue, so a later `load` cannot leave it there twice.
        if state == ResourceState::Queued {
            self.shared
                .pending
                .lock()
                .retain(|queued| !queued.ptr_eq(&handle));
        }
        if handle.state() == Some(ResourceState::Queued) {
            self.begin_flight();
            self.run_claimed(&handle);
        }
        self.wait_for(&handle);
        Ok(handle)
    }

    /// Queues the resource for a worker and returns at once, normally in
    /// `Queued`. Workers pick it up on the next [`update`](Self::update).
    pub fn load(&self, id: &ResourceId) -> Result<ResourceHandle> {
        self.load_with(id, false)
    }

    /// [`load`](Self::load) with optional conversion. Conversion runs on the
    /// calling thread; only the load of the converted file is queued.
    pub fn load_with(
        &self,
        id: &ResourceId,
        convert_to_engine_format: bool,
    ) -> Result<ResourceHandle> {
        self.ensure_running()?;
        let mut id = self.resolve_id(id)?;
        if convert_to_engine_format {
            id = self.convert_resource(&id)?;
        }

        let handle = self.acquire(&id)?;
        if self.is_memory_resource(&handle) {
            return Ok(handle);
        }

        let queued = handle.get().is_some_and(|instance| {
            instance
                .state_cell()
                .transition_from(ResourceState::can_start_load, ResourceState::Queued)
                .is_some()
        });
        if queued {
            self.shared.pending.lock().push_back(handle.clone());
            tracing::trace!(resource = %id, "resource queued");
        }
        Ok(handle)
    }

    fn is_memory_resource(&self, handle: &ResourceHandle) -> bool {
        handle
            .get()
            .is_some_and(|instance| instance.storage_type() == StorageType::Memory)
    }

    /// Main-thread pump: hands queued resources to workers while fewer than
    /// `max_concurrent_loads` are in flight, and collects finished runs.
    pub fn update(&self) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let max = self.shared.config.max_concurrent_loads;

        loop {
            let handle = {
                let mut pending = self.shared.pending.lock();
                let mut in_flight = self.shared.in_flight.lock();
                if *in_flight >= max {
                    break;
                }
                let Some(handle) = pending.pop_front() else {
                    break;
                };
                if handle.state() != Some(ResourceState::Queued) {
                    continue;
                }
                *in_flight += 1;
                handle
            };
            self.dispatch(handle);
            summary.dispatched += 1;
        }

        summary.completed = self.shared.completed_rx.try_iter().collect();
        for completion in &summary.completed {
            tracing::trace!(
                resource = %completion.id,
                state = ?completion.state,
                "load completed"
            );
        }
        summary
    }

    #[cfg(feature = "parallel")]
    fn dispatch(&self, handle: ResourceHandle) {
        let manager = self.clone();
        self.shared.pool.spawn(move || manager.run_claimed(&handle));
    }

    #[cfg(not(feature = "parallel"))]
    fn dispatch(&self, handle: ResourceHandle) {
        self.run_claimed(&handle);
    }

    fn begin_flight(&self) {
        *self.shared.in_flight.lock() += 1;
    }

    /// Runs the pipeline for a slot already counted in `in_flight`
    fn run_claimed(&self, handle: &ResourceHandle) {
        let finished = self.run_pipeline(handle);

        let mut in_flight = self.shared.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        drop(in_flight);
        self.shared.idle.notify_all();

        if let Some(completion) = finished {
            let _ = self.shared.completed_tx.send(completion);
        }
    }

    fn run_pipeline(&self, handle: &ResourceHandle) -> Option<LoadCompletion> {
        let instance = handle.get()?;
        let id = instance.id().clone();

        #[cfg(feature = "profiling")]
        let span = info_span!("resource.load", resource = %id);
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        // Dispatched but not started: shutdown wins
        if self.shared.shutting_down.load(Ordering::Acquire) {
            if instance
                .state_cell()
                .transition(ResourceState::Queued, ResourceState::Cancelled)
            {
                self.shared.cancelled_in_flight.fetch_add(1, Ordering::AcqRel);
                tracing::debug!(resource = %id, "dispatched load cancelled");
                return Some(LoadCompletion {
                    id,
                    state: ResourceState::Cancelled,
                });
            }
            return None;
        }

        let path = self.resolve_path(id.path());
        let pack = self.pack_serving(&id);

        if pack.is_none() && !path.exists() {
            if instance
                .state_cell()
                .transition(ResourceState::Queued, ResourceState::NotFound)
            {
                tracing::warn!(resource = %id, path = %path.display(), "resource file not found");
                return Some(LoadCompletion {
                    id,
                    state: ResourceState::NotFound,
                });
            }
            return None;
        }

        if !instance
            .state_cell()
            .transition(ResourceState::Queued, ResourceState::Loading)
        {
            // Cancelled, or claimed by another run
            return None;
        }
        instance.start_load_timer();

        let result = match &pack {
            Some(pack) => pack
                .read_entry_bytes(&id)
                .and_then(|bytes| instance.payload_mut().load_from_memory(&bytes)),
            None if is_engine_format(&path) => self.load_engine_file(&instance, &path),
            None => self.load_with_loader(&instance, handle, &path),
        };

        instance.stop_load_timer();
        let state = match result {
            Ok(()) => {
                instance
                    .state_cell()
                    .transition(ResourceState::Loading, ResourceState::Loaded);
                self.persist_meta(&instance);
                instance.on_loaded().notify(&id);
                tracing::debug!(
                    resource = %id,
                    elapsed_ms = instance.load_time().as_millis() as u64,
                    from_pack = pack.is_some(),
                    "resource loaded"
                );
                ResourceState::Loaded
            }
            Err(e) => {
                instance
                    .state_cell()
                    .transition(ResourceState::Loading, ResourceState::FailedToLoad);
                tracing::error!(resource = %id, "failed to load resource: {e}");
                ResourceState::FailedToLoad
            }
        };
        Some(LoadCompletion { id, state })
    }

    fn load_engine_file(&self, instance: &ResourceInstance, path: &Path) -> Result<()> {
        let file = EngineResourceFile::read_from(path)?;
        if &file.type_id() != instance.id().type_id() {
            return Err(ResourceError::LoadFailed(format!(
                "{} holds a {} resource, expected {}",
                path.display(),
                file.type_id(),
                instance.id().type_id()
            )));
        }
        instance.set_source_file_path(&file.source_path);
        instance.payload_mut().load_from_memory(&file.payload)
    }

    fn load_with_loader(
        &self,
        instance: &ResourceInstance,
        handle: &ResourceHandle,
        path: &Path,
    ) -> Result<()> {
        let loader = self
            .shared
            .loaders
            .get_loader_from_path(path)
            .ok_or_else(|| {
                ResourceError::LoaderNotFound(instance.id().extension().unwrap_or_default())
            })?;
        let bytes = fs::read(path)?;
        let context = LoadContext {
            path,
            bytes: &bytes,
            id: instance.id(),
            handle,
            manager: self,
        };
        let mut payload = instance.payload_mut();
        loader.load(&mut **payload, &context)
    }

    fn persist_meta(&self, instance: &ResourceInstance) {
        let config = &self.shared.config;
        if !config.write_meta_files || instance.storage_type() != StorageType::Disk {
            return;
        }
        let mut meta = ResourceMetaData::new(instance.guid());
        meta.dependent_guids = instance
            .links_of_kind(ReferenceLinkKind::DependentOwner)
            .iter()
            .filter_map(|child| child.get().map(|child| child.guid()))
            .collect();

        let source = self.resolve_path(&instance.source_file_path());
        if let Err(e) = meta.write_mirrored(
            &source,
            &config.project_root,
            &config.meta_dir(),
            config.write_debug_json,
        ) {
            tracing::warn!(resource = %instance.id(), "failed to write meta sidecar: {e}");
        }
    }

    /// Blocks until every queued and in-flight load has finished
    pub fn wait_for_all(&self) {
        loop {
            self.update();
            let pending = self.shared.pending.lock();
            let mut in_flight = self.shared.in_flight.lock();
            if *in_flight == 0 {
                if pending.is_empty() {
                    break;
                }
                continue;
            }
            drop(pending);
            self.shared.idle.wait_for(&mut in_flight, WAIT_SLICE);
        }
        self.update();
    }

    /// Blocks until `handle` leaves `Queued`/`Loading`. Returns its state,
    /// or `None` if the resource was destroyed.
    pub fn wait_for(&self, handle: &ResourceHandle) -> Option<ResourceState> {
        loop {
            let state = handle.state()?;
            if !state.is_pending() {
                return Some(state);
            }
            self.update();
            let mut in_flight = self.shared.in_flight.lock();
            if handle.state().is_some_and(ResourceState::is_pending) {
                self.shared.idle.wait_for(&mut in_flight, WAIT_SLICE);
            }
        }
    }

    /// Unloads a `Loaded` resource.
    ///
    /// A resource that is the `Dependent` of a still-loaded owner is left
    /// alone; unloading an owner cascades to the resources it owns.
    pub fn unload(&self, handle: &ResourceHandle) -> Result<UnloadOutcome> {
        let instance = handle.try_get()?;
        if instance.state() != ResourceState::Loaded {
            return Ok(UnloadOutcome::NotLoaded);
        }

        let owner_loaded = instance
            .links_of_kind(ReferenceLinkKind::Dependent)
            .iter()
            .any(|owner| owner.is_loaded());
        if owner_loaded {
            tracing::warn!(
                resource = %instance.id(),
                "resource is owned by a loaded resource, unload skipped"
            );
            return Ok(UnloadOutcome::SkippedDependent);
        }

        Ok(self.unload_instance(&instance))
    }

    pub fn unload_id(&self, id: &ResourceId) -> Result<UnloadOutcome> {
        let id = self.resolve_id(id)?;
        let handle = self
            .shared
            .store
            .get_resource(&id)
            .ok_or_else(|| ResourceError::ResourceNotFound(id.to_string()))?;
        self.unload(&handle)
    }

    fn unload_instance(&self, instance: &ResourceInstance) -> UnloadOutcome {
        if !instance
            .state_cell()
            .transition(ResourceState::Loaded, ResourceState::Unloading)
        {
            return UnloadOutcome::NotLoaded;
        }
        instance.start_unload_timer();

        for child in instance.links_of_kind(ReferenceLinkKind::DependentOwner) {
            if let Some(child) = child.get() {
                self.unload_instance(&child);
            }
        }
        instance.payload_mut().unload();

        instance.stop_unload_timer();
        instance
            .state_cell()
            .transition(ResourceState::Unloading, ResourceState::Unloaded);
        instance.on_unloaded().notify(instance.id());
        tracing::debug!(resource = %instance.id(), "resource unloaded");
        UnloadOutcome::Unloaded
    }

    /// Unloads every known resource; returns how many were unloaded
    pub fn unload_all(&self) -> usize {
        let mut unloaded = 0;
        for id in self.shared.store.get_all_resource_ids() {
            let Some(handle) = self.shared.store.get_resource(&id) else {
                continue;
            };
            // Owners cascade to the dependents skipped here.
            if let Ok(UnloadOutcome::Unloaded) = self.unload(&handle) {
                unloaded += 1;
            }
        }
        unloaded
    }

    /// Unloads (if needed) and loads again on the calling thread
    pub fn reload(&self, id: &ResourceId) -> Result<ResourceHandle> {
        let id = self.resolve_id(id)?;
        let handle = self
            .shared
            .store
            .get_resource(&id)
            .ok_or_else(|| ResourceError::ResourceNotFound(id.to_string()))?;
        if self.unload(&handle)? == UnloadOutcome::SkippedDependent {
            return Ok(handle);
        }
        self.load_sync(&id)
    }

    /// Destroys a store entry; the resource must not be loaded or loading
    pub fn remove_resource(&self, id: &ResourceId) -> Result<bool> {
        self.shared.store.remove_resource(id)
    }

    /// Transcodes `id` into the engine format next to its source and returns
    /// the id of the converted file. An existing converted file is reused.
    pub fn convert_resource(&self, id: &ResourceId) -> Result<ResourceId> {
        let id = self.resolve_id(id)?;
        if is_engine_format(Path::new(id.path())) {
            return Ok(id);
        }

        let converted = ResourceId::new(converted_path(id.path()), id.type_id().clone());
        let converted_file = self.resolve_path(converted.path());
        if !converted_file.exists() {
            self.write_converted(&id, &converted_file)?;
            tracing::debug!(source = %id, converted = %converted, "resource converted");
        }

        let handle = self.acquire(&converted)?;
        handle.try_get()?.set_source_file_path(id.path());
        Ok(converted)
    }

    fn write_converted(&self, id: &ResourceId, converted_file: &Path) -> Result<()> {
        let was_tracked = self.shared.store.has_resource(id);
        let handle = self.load_sync(id)?;

        let written = match handle.get() {
            Some(instance) if instance.is_loaded() => instance
                .payload()
                .serialize()
                .and_then(|payload| {
                    EngineResourceFile::new(id.type_id(), id.path(), payload)
                        .write_to(converted_file)
                }),
            Some(instance) => Err(ResourceError::ConversionFailed(format!(
                "{id} ended in state {:?}",
                instance.state()
            ))),
            None => Err(ResourceError::ObserverInvalidated),
        };

        if !was_tracked {
            if let Some(instance) = handle.get() {
                self.unload_instance(&instance);
            }
            if let Err(e) = self.shared.store.remove_resource(id) {
                tracing::warn!(resource = %id, "could not drop conversion source: {e}");
            }
        }

        written.map_err(|e| match e {
            ResourceError::ConversionFailed(_) => e,
            other => ResourceError::ConversionFailed(format!("{id}: {other}")),
        })
    }

    /// Creates a resource that only exists inside its parent's file
    pub fn create_dependent_resource(&self, id: ResourceId) -> Result<ResourceHandle> {
        let id = self.resolve_id(&id)?;
        let handle = self.shared.store.add_resource(&id, false)?;
        handle.try_get()?.set_storage_type(StorageType::Memory);
        tracing::trace!(resource = %id, "dependent resource created");
        Ok(handle)
    }

    /// Marks a dependent resource populated by its parent's loader as loaded
    pub fn finish_dependent_resource(&self, handle: &ResourceHandle) -> Result<()> {
        let instance = handle.try_get()?;
        if instance.storage_type() != StorageType::Memory {
            return Err(ResourceError::InvalidState {
                id: instance.id().clone(),
                state: instance.state(),
            });
        }
        let finished = instance.state_cell().transition_from(
            |state| !state.is_pending() && state != ResourceState::Loaded,
            ResourceState::Loaded,
        );
        if finished.is_some() {
            instance.on_loaded().notify(instance.id());
        }
        Ok(())
    }

    /// Unloads and destroys a dependent resource, dropping its owner's link
    pub fn remove_dependent_resource(&self, id: &ResourceId) -> Result<bool> {
        let id = self.resolve_id(id)?;
        let Some(handle) = self.shared.store.get_resource(&id) else {
            return Ok(false);
        };
        {
            let instance = handle.try_get()?;
            self.unload_instance(&instance);
            for owner in instance.links_of_kind(ReferenceLinkKind::Dependent) {
                if let Some(owner) = owner.get() {
                    owner.remove_reference_links_to(&handle);
                }
            }
        }
        self.shared.store.remove_resource(&id)
    }

    /// Writes every known resource id and its metadata to the database file
    pub fn save_database(&self) -> Result<usize> {
        #[cfg(feature = "profiling")]
        let span = info_span!("database.save", resources = self.resource_count());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let mut database = ResourceDatabase::new();
        for handle in self.shared.store.get_all_resources() {
            if let Some(instance) = handle.get() {
                database.records.push(DatabaseRecord::from_instance(&instance));
            }
        }
        database.records.sort_by(|a, b| a.id.cmp(&b.id));

        let config = &self.shared.config;
        database.save(&config.intermediate_path(), config.write_debug_json)?;
        tracing::debug!(resources = database.len(), "resource database saved");
        Ok(database.len())
    }

    /// Registers every resource in the database file (not loaded).
    /// Returns how many records were restored.
    pub fn load_database(&self) -> Result<usize> {
        let Some(database) = ResourceDatabase::load(&self.shared.config.intermediate_path())?
        else {
            return Ok(0);
        };

        let mut restored = 0;
        for record in database.records {
            if !self.shared.types.contains(record.id.type_id()) {
                tracing::warn!(
                    resource = %record.id,
                    "unknown resource type in database, skipped"
                );
                continue;
            }
            let handle = self.shared.store.add_resource(&record.id, false)?;
            self.shared.store.assign_guid(&handle, record.guid)?;
            let instance = handle.try_get()?;
            instance.set_source_file_path(&record.source_path);
            instance.set_storage_type(record.storage_type);
            restored += 1;
        }
        tracing::debug!(resources = restored, "resource database loaded");
        Ok(restored)
    }

    /// Deletes the database files; returns whether any existed
    pub fn clear_database(&self) -> Result<bool> {
        ResourceDatabase::clear(&self.shared.config.intermediate_path())
    }

    /// Opens a pack and registers its entries. Serialized entries are then
    /// loaded from the pack instead of loose files.
    pub fn mount_pack(&self, path: impl AsRef<Path>) -> Result<Arc<ResourcePack>> {
        let path = path.as_ref();
        let file_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.shared.config.project_root.join(path)
        };
        let pack = Arc::new(ResourcePack::from_file(&file_path)?);

        for entry in pack.entries() {
            if !self.shared.types.contains(entry.id.type_id()) {
                tracing::warn!(resource = %entry.id, "unknown resource type in pack, skipped");
                continue;
            }
            let handle = self.acquire(&entry.id)?;
            self.shared.store.assign_guid(&handle, entry.guid)?;
            if let Err(e) = pack.add_resource(&handle) {
                tracing::warn!(resource = %entry.id, "pack entry not attached: {e}");
            }
        }

        self.shared.packs.write().push(pack.clone());
        tracing::debug!(
            pack = %file_path.display(),
            entries = pack.entry_count(),
            "pack mounted"
        );
        Ok(pack)
    }

    /// Returns false if no mounted pack has that file path
    pub fn unmount_pack(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let removed = {
            let mut packs = self.shared.packs.write();
            let rooted = self.shared.config.project_root.join(path);
            let position = packs
                .iter()
                .position(|pack| pack.file_path() == path || pack.file_path() == rooted);
            position.map(|index| packs.remove(index))
        };
        let Some(pack) = removed else {
            return false;
        };
        for handle in pack.get_all_resources() {
            pack.remove_resource(&handle);
        }
        pack.close();
        true
    }

    pub fn packs(&self) -> Vec<Arc<ResourcePack>> {
        self.shared.packs.read().clone()
    }

    fn pack_serving(&self, id: &ResourceId) -> Option<Arc<ResourcePack>> {
        self.shared
            .packs
            .read()
            .iter()
            .find(|pack| pack.is_serialized(id))
            .cloned()
    }

    /// Stops accepting loads, cancels everything not yet started (queued, or
    /// dispatched to a worker that has not picked it up) and waits for loads
    /// already `Loading` to finish. Returns how many loads were cancelled.
    pub fn shutdown(&self) -> usize {
        self.shared.shutting_down.store(true, Ordering::Release);
        let mut cancelled = self.shared.cancel_pending();

        let mut in_flight = self.shared.in_flight.lock();
        while *in_flight > 0 {
            self.shared.idle.wait_for(&mut in_flight, WAIT_SLICE);
        }
        drop(in_flight);
        cancelled += self.shared.cancelled_in_flight.swap(0, Ordering::AcqRel);

        let _ = self.shared.completed_rx.try_iter().count();
        tracing::debug!(cancelled, "resource manager shut down");
        cancelled
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::Acquire)
    }

    pub fn get_resource(&self, id: &ResourceId) -> Option<ResourceHandle> {
        self.shared.store.get_resource(id)
    }

    pub fn get_resource_from_guid(&self, guid: &ResourceGuid) -> Option<ResourceHandle> {
        self.shared.store.get_resource_from_guid(guid)
    }

    pub fn has_resource(&self, id: &ResourceId) -> bool {
        self.shared.store.has_resource(id)
    }

    /// Resources waiting in the pending queue
    pub fn queued_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Pipeline runs currently in progress
    pub fn loading_count(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    pub fn loaded_count(&self) -> usize {
        self.shared.store.loaded_count()
    }

    pub fn resource_count(&self) -> usize {
        self.shared.store.resource_count()
    }

    pub fn stats(&self) -> ResourceStats {
        self.shared.store.stats()
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("project_root", &self.shared.config.project_root)
            .field("resources", &self.resource_count())
            .field("queued", &self.queued_count())
            .field("loading", &self.loading_count())
            .finish()
    }
}
