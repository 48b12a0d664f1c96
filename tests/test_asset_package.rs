use resource_engine::prelude::*;
use resource_engine::{is_package_file, ResourceMetaData};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_package_carries_meta_guids() {
    let project = tempdir().unwrap();
    let assets = project.path().join("assets");
    fs::create_dir_all(assets.join("textures")).unwrap();
    fs::write(assets.join("textures/wood.json"), r#"{"tint": "brown"}"#).unwrap();
    fs::write(assets.join("readme.txt"), "hello").unwrap();

    let config = ResourceManagerConfig::new(&assets)
        .with_meta_files(true)
        .with_debug_json(false);
    let guid = {
        let manager = ResourceManager::new(config).unwrap();
        manager.load(&ResourceId::untyped("textures/wood.json")).unwrap();
        let handle = manager.load(&ResourceId::untyped("readme.txt")).unwrap();
        manager.wait_for_all();
        let guid = handle.get().unwrap().guid();
        guid
    };

    let mut package = AssetPackage::new(&assets, "starter");
    package.add_asset(assets.join("readme.txt")).unwrap();
    assert_eq!(package.add_path(assets.join("textures")).unwrap(), 2);
    assert_eq!(package.len(), 4);

    let out_dir = project.path().join("dist");
    fs::create_dir_all(&out_dir).unwrap();
    let archive = package.build(&out_dir).unwrap();
    assert_eq!(archive, out_dir.join("starter.isassetpackage"));
    assert!(is_package_file(&archive));

    let entries = AssetPackage::open(&archive).unwrap();
    assert_eq!(entries.len(), 4);
    assert!(entries[0].is_meta());
    assert!(entries[1].is_meta());
    assert!(!entries[2].is_meta());
    assert!(entries.iter().any(|e| e.path == "textures/wood.json"));

    let unpacked = project.path().join("unpacked");
    assert_eq!(AssetPackage::extract_to(&archive, &unpacked).unwrap(), 4);
    let meta = ResourceMetaData::read_for(&unpacked.join("readme.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(meta.guid, guid);

    let manager = ResourceManager::new(ResourceManagerConfig::new(&unpacked)).unwrap();
    let handle = manager.load_sync(&ResourceId::untyped("readme.txt")).unwrap();
    assert_eq!(handle.get().unwrap().guid(), guid);
}

#[test]
fn test_packages_are_not_nested() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.bin"), [1, 2, 3]).unwrap();

    let mut first = AssetPackage::new(dir.path(), "first");
    first.add_path(dir.path()).unwrap();
    let archive = first.build(dir.path()).unwrap();
    assert!(archive.exists());

    let mut second = AssetPackage::new(dir.path(), "second");
    assert_eq!(second.add_path(dir.path()).unwrap(), 1);
    assert_eq!(second.add_path(&archive).unwrap(), 0);
}

#[test]
fn test_missing_asset_is_an_error() {
    let dir = tempdir().unwrap();
    let mut package = AssetPackage::new(dir.path(), "empty");
    assert!(matches!(
        package.add_asset(dir.path().join("nope.txt")),
        Err(ResourceError::ResourceNotFound(_))
    ));
    assert!(package.is_empty());
}
