use resource_engine::prelude::*;
use resource_engine::{
    BinaryResource, LoaderRegistry, ResourceMetaData, ResourceTypeRegistry, TextResource,
};
use std::any::Any;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn manager(root: &Path) -> ResourceManager {
    ResourceManager::new(ResourceManagerConfig::new(root).with_worker_threads(2)).unwrap()
}

fn write(root: &Path, path: &str, bytes: &[u8]) {
    let file = root.join(path);
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, bytes).unwrap();
}

#[test]
fn test_repeated_loads_share_one_instance() {
    let dir = tempdir().unwrap();
    write(dir.path(), "data/blob.bin", &[7; 16]);
    let manager = manager(dir.path());
    let id = ResourceId::untyped("data/blob.bin");

    let queued = manager.load(&id).unwrap();
    let again = manager.load(&id).unwrap();
    let synced = manager.load_sync(&id).unwrap();
    manager.wait_for_all();

    assert!(queued.ptr_eq(&again));
    assert!(queued.ptr_eq(&synced));
    assert_eq!(manager.resource_count(), 1);
    assert_eq!(queued.state(), Some(ResourceState::Loaded));
    assert_eq!(manager.stats().cache_hits, 2);
}

#[test]
fn test_missing_file_goes_queued_to_not_found() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());

    let handle = manager.load(&ResourceId::untyped("missing.txt")).unwrap();
    assert_eq!(handle.state(), Some(ResourceState::Queued));

    let loading_seen = Arc::new(AtomicUsize::new(0));
    let seen = loading_seen.clone();
    handle.get().unwrap().on_loaded().subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    manager.wait_for_all();

    assert_eq!(handle.state(), Some(ResourceState::NotFound));
    let instance = handle.get().unwrap();
    assert_eq!(instance.load_time(), Duration::ZERO);
    assert_eq!(loading_seen.load(Ordering::SeqCst), 0);
    assert_eq!(manager.loaded_count(), 0);
}

#[test]
fn test_retry_after_file_appears() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    let id = ResourceId::untyped("late.txt");

    let handle = manager.load_sync(&id).unwrap();
    assert_eq!(handle.state(), Some(ResourceState::NotFound));

    write(dir.path(), "late.txt", b"here now");
    manager.load_sync(&id).unwrap();
    assert_eq!(handle.state(), Some(ResourceState::Loaded));
}

#[test]
fn test_removed_resource_invalidates_handles() {
    let dir = tempdir().unwrap();
    write(dir.path(), "notes.txt", b"text");
    let manager = manager(dir.path());

    let handle = manager.load_sync(&ResourceId::untyped("notes.txt")).unwrap();
    let copy = handle.clone();
    let id = handle.resource_id().unwrap();

    assert!(matches!(
        manager.remove_resource(&id),
        Err(ResourceError::InvalidState { .. })
    ));
    manager.unload(&handle).unwrap();
    assert!(manager.remove_resource(&id).unwrap());

    assert!(!handle.is_valid());
    assert!(copy.get().is_none());
    assert!(matches!(
        copy.try_get(),
        Err(ResourceError::ObserverInvalidated)
    ));
    assert!(!manager.has_resource(&id));
}

#[test]
fn test_on_loaded_fires_once_per_load() {
    let dir = tempdir().unwrap();
    write(dir.path(), "notes.txt", b"text");
    let manager = manager(dir.path());

    let handle = manager.load(&ResourceId::untyped("notes.txt")).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let listener = handle.get().unwrap().on_loaded().subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    manager.wait_for_all();
    manager.load_sync(&ResourceId::untyped("notes.txt")).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    assert!(handle.get().unwrap().on_loaded().unsubscribe(listener));
}

#[test]
fn test_shutdown_cancels_queued_loads() {
    let dir = tempdir().unwrap();
    for i in 0..5 {
        write(dir.path(), &format!("{i}.bin"), &[i]);
    }
    let manager = manager(dir.path());

    let handles: Vec<ResourceHandle> = (0..5)
        .map(|i| manager.load(&ResourceId::untyped(format!("{i}.bin"))).unwrap())
        .collect();

    assert_eq!(manager.shutdown(), 5);
    for handle in &handles {
        assert_eq!(handle.state(), Some(ResourceState::Cancelled));
    }
    assert_eq!(manager.queued_count(), 0);
    assert!(matches!(
        manager.load(&ResourceId::untyped("0.bin")),
        Err(ResourceError::ShuttingDown)
    ));

    let id = handles[0].resource_id().unwrap();
    assert!(manager.remove_resource(&id).unwrap());
}

#[test]
fn test_unload_all() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"a");
    write(dir.path(), "b.bin", b"b");
    let manager = manager(dir.path());

    let a = manager.load_sync(&ResourceId::untyped("a.txt")).unwrap();
    let b = manager.load_sync(&ResourceId::untyped("b.bin")).unwrap();
    assert_eq!(manager.loaded_count(), 2);

    assert_eq!(manager.unload_all(), 2);
    assert_eq!(a.state(), Some(ResourceState::Unloaded));
    assert_eq!(b.state(), Some(ResourceState::Unloaded));
    assert_eq!(manager.loaded_count(), 0);
    assert!(a.get().unwrap().read::<TextResource>().unwrap().content().is_empty());
}

#[test]
fn test_database_round_trip() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"a");
    write(dir.path(), "data/b.bin", b"b");

    let guid = {
        let manager = manager(dir.path());
        let a = manager.load_sync(&ResourceId::untyped("a.txt")).unwrap();
        manager.load(&ResourceId::untyped("data/b.bin")).unwrap();
        manager.wait_for_all();
        assert_eq!(manager.save_database().unwrap(), 2);
        let guid = a.get().unwrap().guid();
        guid
    };

    let intermediate = dir.path().join("Intermediate");
    assert!(intermediate.join("resource_database.bin").exists());
    assert!(intermediate.join("resource_database.json").exists());

    let manager = manager(dir.path());
    assert_eq!(manager.load_database().unwrap(), 2);
    assert_eq!(manager.loaded_count(), 0);

    let restored = manager.get_resource_from_guid(&guid).unwrap();
    assert_eq!(restored.state(), Some(ResourceState::NotLoaded));
    assert_eq!(
        restored.resource_id().unwrap(),
        ResourceId::of::<TextResource>("a.txt")
    );
    assert!(manager.has_resource(&ResourceId::of::<BinaryResource>("data/b.bin")));

    assert!(manager.clear_database().unwrap());
    assert_eq!(manager.load_database().unwrap(), 0);
}

#[test]
fn test_meta_sidecar_keeps_guid_stable() {
    let dir = tempdir().unwrap();
    write(dir.path(), "textures/info.json", br#"{"width": 4}"#);
    let config = ResourceManagerConfig::new(dir.path());
    let id = ResourceId::untyped("textures/info.json");

    let first_guid = {
        let manager = ResourceManager::new(config.clone()).unwrap();
        let handle = manager.load_sync(&id).unwrap();
        let guid = handle.get().unwrap().guid();
        guid
    };

    let source = dir.path().join("textures/info.json");
    let meta = ResourceMetaData::read_for(&source).unwrap().unwrap();
    assert_eq!(meta.guid, first_guid);
    assert!(dir
        .path()
        .join("Intermediate/Meta/textures/info.json.is_meta")
        .exists());

    let manager = ResourceManager::new(config).unwrap();
    let handle = manager.load_sync(&id).unwrap();
    assert_eq!(handle.get().unwrap().guid(), first_guid);
    assert!(manager.get_resource_from_guid(&first_guid).is_some());
}

#[derive(Default)]
struct SlowResource {
    bytes: Vec<u8>,
}

impl Resource for SlowResource {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
    fn load_from_memory(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes = bytes.to_vec();
        Ok(())
    }
    fn unload(&mut self) {
        self.bytes.clear();
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TypedResource for SlowResource {
    const TYPE_NAME: &'static str = "Slow";
}

/// Holds its worker long enough for the rest of the batch to sit in the pool
#[derive(Default)]
struct SlowLoader;

impl ResourceLoader for SlowLoader {
    fn name(&self) -> &str {
        "SlowLoader"
    }
    fn resource_types(&self) -> &[&'static str] {
        &[SlowResource::TYPE_NAME]
    }
    fn extensions(&self) -> &[&str] {
        &["slow"]
    }
    fn load(&self, resource: &mut dyn Resource, context: &LoadContext<'_>) -> Result<()> {
        thread::sleep(Duration::from_millis(200));
        resource.load_from_memory(context.bytes)
    }
}

#[cfg(feature = "parallel")]
#[test]
fn test_shutdown_cancels_dispatched_loads_not_yet_started() {
    let dir = tempdir().unwrap();
    for i in 0..4 {
        write(dir.path(), &format!("{i}.slow"), &[i]);
    }
    let types = ResourceTypeRegistry::with_builtin_types();
    types.register::<SlowResource>();
    let loaders = LoaderRegistry::with_builtin_loaders();
    loaders.register_loader::<SlowLoader>().unwrap();
    let manager = ResourceManager::with_registries(
        ResourceManagerConfig::new(dir.path())
            .with_worker_threads(1)
            .with_max_concurrent_loads(4),
        Arc::new(types),
        Arc::new(loaders),
    )
    .unwrap();

    let handles: Vec<ResourceHandle> = (0..4)
        .map(|i| manager.load(&ResourceId::untyped(format!("{i}.slow"))).unwrap())
        .collect();
    assert_eq!(manager.update().dispatched, 4);
    assert_eq!(manager.queued_count(), 0);

    // Wait for the single worker to start one of them
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handles
        .iter()
        .any(|h| h.state() == Some(ResourceState::Loading))
    {
        assert!(Instant::now() < deadline, "no load ever started");
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(manager.shutdown(), 3);
    let count = |state| handles.iter().filter(|h| h.state() == Some(state)).count();
    assert_eq!(count(ResourceState::Loaded), 1);
    assert_eq!(count(ResourceState::Cancelled), 3);
    assert_eq!(manager.loading_count(), 0);
}

#[test]
fn test_claimed_entry_leaves_queue() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.bin", b"a");
    let manager = manager(dir.path());
    let id = ResourceId::untyped("a.bin");

    let handle = manager.load(&id).unwrap();
    assert_eq!(manager.queued_count(), 1);
    manager.load_sync(&id).unwrap();
    assert_eq!(manager.queued_count(), 0);

    manager.unload(&handle).unwrap();
    manager.load(&id).unwrap();
    assert_eq!(manager.queued_count(), 1);

    let summary = manager.update();
    assert_eq!(summary.dispatched, 1);
    manager.wait_for_all();
    assert_eq!(handle.state(), Some(ResourceState::Loaded));
}
