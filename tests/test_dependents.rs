use resource_engine::prelude::*;
use resource_engine::{LoaderRegistry, ResourceTypeRegistry, StorageType};
use std::any::Any;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Default)]
struct SceneResource {
    mesh_names: Vec<String>,
}

#[derive(Default)]
struct MeshResource {
    name: String,
}

macro_rules! impl_test_resource {
    ($ty:ty, $tag:expr) => {
        impl Resource for $ty {
            fn type_name(&self) -> &'static str {
                $tag
            }
            fn serialize(&self) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
            fn load_from_memory(&mut self, _bytes: &[u8]) -> Result<()> {
                Ok(())
            }
            fn unload(&mut self) {
                *self = Self::default();
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }

        impl TypedResource for $ty {
            const TYPE_NAME: &'static str = $tag;
        }
    };
}

impl_test_resource!(SceneResource, "Scene");
impl_test_resource!(MeshResource, "Mesh");

/// One mesh per line of the scene file
#[derive(Default)]
struct SceneLoader;

impl ResourceLoader for SceneLoader {
    fn name(&self) -> &str {
        "SceneLoader"
    }
    fn resource_types(&self) -> &[&'static str] {
        &[SceneResource::TYPE_NAME]
    }
    fn extensions(&self) -> &[&str] {
        &["scene"]
    }
    fn load(&self, resource: &mut dyn Resource, context: &LoadContext<'_>) -> Result<()> {
        let text = String::from_utf8_lossy(context.bytes).to_string();
        let names: Vec<String> = text.lines().map(str::to_string).collect();

        for name in &names {
            let id = ResourceId::new(format!("{}#{name}", context.id.path()), "Mesh");
            let mesh = context.create_dependent(id)?;
            if let Some(mut payload) = mesh.try_get()?.write::<MeshResource>() {
                payload.name = name.clone();
            }
            context.finish_dependent(&mesh)?;
        }

        let scene = resource
            .as_any_mut()
            .downcast_mut::<SceneResource>()
            .ok_or_else(|| ResourceError::LoadFailed("not a scene".to_string()))?;
        scene.mesh_names = names;
        Ok(())
    }
}

fn manager(root: &Path) -> ResourceManager {
    let types = ResourceTypeRegistry::with_builtin_types();
    types.register::<SceneResource>();
    types.register::<MeshResource>();
    let loaders = LoaderRegistry::with_builtin_loaders();
    loaders.register_loader::<SceneLoader>().unwrap();
    ResourceManager::with_registries(
        ResourceManagerConfig::new(root),
        Arc::new(types),
        Arc::new(loaders),
    )
    .unwrap()
}

fn mesh_id(name: &str) -> ResourceId {
    ResourceId::new(format!("level.scene#{name}"), "Mesh")
}

#[test]
fn test_loader_creates_memory_dependents() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("level.scene"), "floor\nwall").unwrap();
    let manager = manager(dir.path());

    let scene = manager.load_sync(&ResourceId::untyped("level.scene")).unwrap();
    assert_eq!(scene.state(), Some(ResourceState::Loaded));

    let floor = manager.get_resource(&mesh_id("floor")).unwrap();
    let instance = floor.get().unwrap();
    assert_eq!(instance.state(), ResourceState::Loaded);
    assert_eq!(instance.storage_type(), StorageType::Memory);
    assert_eq!(instance.read::<MeshResource>().unwrap().name, "floor");

    let owned = scene
        .get()
        .unwrap()
        .links_of_kind(ReferenceLinkKind::DependentOwner);
    assert_eq!(owned.len(), 2);
    assert_eq!(manager.loaded_count(), 3);

    // Memory resources are handed back untouched by the pipeline
    let again = manager.load(&mesh_id("floor")).unwrap();
    assert!(again.ptr_eq(&floor));
    assert_eq!(manager.queued_count(), 0);
}

#[test]
fn test_dependent_unload_waits_for_owner() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("level.scene"), "floor\nwall").unwrap();
    let manager = manager(dir.path());

    let scene = manager.load_sync(&ResourceId::untyped("level.scene")).unwrap();
    let wall = manager.get_resource(&mesh_id("wall")).unwrap();

    assert_eq!(
        manager.unload(&wall).unwrap(),
        UnloadOutcome::SkippedDependent
    );
    assert_eq!(wall.state(), Some(ResourceState::Loaded));

    assert_eq!(manager.unload(&scene).unwrap(), UnloadOutcome::Unloaded);
    assert_eq!(scene.state(), Some(ResourceState::Unloaded));
    assert_eq!(wall.state(), Some(ResourceState::Unloaded));

    assert!(manager.unload(&wall).is_ok());
    assert_eq!(wall.state(), Some(ResourceState::Unloaded));
    assert_eq!(manager.loaded_count(), 0);
}

#[test]
fn test_reload_reuses_dependents() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("level.scene"), "floor").unwrap();
    let manager = manager(dir.path());
    let scene_id = ResourceId::untyped("level.scene");

    let scene = manager.load_sync(&scene_id).unwrap();
    let floor = manager.get_resource(&mesh_id("floor")).unwrap();

    let reloaded = manager.reload(&scene_id).unwrap();
    assert!(reloaded.ptr_eq(&scene));
    assert_eq!(floor.state(), Some(ResourceState::Loaded));
    assert_eq!(
        scene
            .get()
            .unwrap()
            .links_of_kind(ReferenceLinkKind::DependentOwner)
            .len(),
        1
    );
    assert_eq!(manager.resource_count(), 2);
}

#[test]
fn test_remove_dependent_drops_owner_link() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("level.scene"), "floor\nwall").unwrap();
    let manager = manager(dir.path());

    let scene = manager.load_sync(&ResourceId::untyped("level.scene")).unwrap();
    let floor = manager.get_resource(&mesh_id("floor")).unwrap();

    assert!(manager.remove_dependent_resource(&mesh_id("floor")).unwrap());
    assert!(!floor.is_valid());
    assert_eq!(
        scene
            .get()
            .unwrap()
            .links_of_kind(ReferenceLinkKind::DependentOwner)
            .len(),
        1
    );
    assert_eq!(manager.loaded_count(), 2);
}
