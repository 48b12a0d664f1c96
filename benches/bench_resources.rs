use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use resource_engine::{
    BinaryResource, ResourceId, ResourceManager, ResourceManagerConfig, ResourceStore,
    ResourceTypeRegistry,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write_files(root: &Path, count: usize, size: usize) -> Vec<ResourceId> {
    (0..count)
        .map(|i| {
            let path = format!("data/resource_{i}.bin");
            let file = root.join(&path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, vec![i as u8; size]).unwrap();
            ResourceId::untyped(path)
        })
        .collect()
}

fn bench_store_add_and_lookup(c: &mut Criterion) {
    let types = Arc::new(ResourceTypeRegistry::with_builtin_types());
    let ids: Vec<ResourceId> = (0..1000)
        .map(|i| ResourceId::of::<BinaryResource>(format!("resource_{i}.bin")))
        .collect();

    c.bench_function("store_add_1000", |b| {
        b.iter(|| {
            let store = ResourceStore::new(types.clone());
            for id in &ids {
                store.add_resource(id, false).unwrap();
            }
            black_box(store.resource_count());
        })
    });

    let store = ResourceStore::new(types.clone());
    for id in &ids {
        store.add_resource(id, false).unwrap();
    }
    c.bench_function("store_lookup_1000", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(store.get_resource(id));
            }
        })
    });
}

fn bench_load_sync(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let ids = write_files(dir.path(), 100, 4096);

    c.bench_function("load_sync_100_files", |b| {
        b.iter_batched(
            || ResourceManager::new(ResourceManagerConfig::new(dir.path())).unwrap(),
            |manager| {
                for id in &ids {
                    black_box(manager.load_sync(id).unwrap());
                }
                manager
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_load_async(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let ids = write_files(dir.path(), 100, 4096);

    c.bench_function("load_async_100_files", |b| {
        b.iter_batched(
            || ResourceManager::new(ResourceManagerConfig::new(dir.path())).unwrap(),
            |manager| {
                for id in &ids {
                    manager.load(id).unwrap();
                }
                manager.wait_for_all();
                black_box(manager.loaded_count());
                manager
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_cached_load(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let ids = write_files(dir.path(), 100, 256);
    let manager = ResourceManager::new(ResourceManagerConfig::new(dir.path())).unwrap();
    for id in &ids {
        manager.load_sync(id).unwrap();
    }

    c.bench_function("cached_load_100", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(manager.load(id).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    bench_store_add_and_lookup,
    bench_load_sync,
    bench_load_async,
    bench_cached_load
);
criterion_main!(benches);
