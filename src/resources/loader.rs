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

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ResourceError, Result};
use crate::resources::builtin::{BinaryResource, JsonResource, TextResource};
use crate::resources::id::extension_of;
use crate::resources::{
    ReferenceLinkKind, Resource, ResourceHandle, ResourceId, ResourceInstance, ResourceManager,
    ResourceTypeId, TypedResource,
};

/// Context provided to resource loaders
pub struct LoadContext<'a> {
    /// Resolved path of the file being loaded
    pub path: &'a Path,
    /// File contents
    pub bytes: &'a [u8],
    pub id: &'a ResourceId,
    pub(crate) handle: &'a ResourceHandle,
    pub(crate) manager: &'a ResourceManager,
}

impl<'a> LoadContext<'a> {
    /// Manager running this load; loaders may request further loads through it
    pub fn manager(&self) -> &ResourceManager {
        self.manager
    }

    /// Handle of the resource being loaded
    pub fn handle(&self) -> &ResourceHandle {
        self.handle
    }

    /// Creates a resource embedded in this one's file and links the pair:
    /// the child is `Dependent` on this resource, this resource is the
    /// child's `DependentOwner`.
    pub fn create_dependent(&self, id: ResourceId) -> Result<ResourceHandle> {
        let child = self.manager.create_dependent_resource(id)?;
        {
            let child_ref = child.try_get()?;
            child_ref.add_reference_link(ReferenceLinkKind::Dependent, self.handle.clone());
        }
        self.handle
            .try_get()?
            .add_reference_link(ReferenceLinkKind::DependentOwner, child.clone());
        Ok(child)
    }

    /// Records that this resource uses `target` without owning it
    pub fn add_reference(&self, target: &ResourceHandle) -> Result<()> {
        self.handle
            .try_get()?
            .add_reference_link(ReferenceLinkKind::Reference, target.clone());
        Ok(())
    }

    /// Marks a dependent child created by this load as loaded
    pub fn finish_dependent(&self, child: &ResourceHandle) -> Result<()> {
        self.manager.finish_dependent_resource(child)
    }
}

/// Format loader for one or more resource types
pub trait ResourceLoader: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Type tags this loader serves; no other loader may claim them
    fn resource_types(&self) -> &[&'static str];

    /// File extensions this loader supports, lowercase, without the dot
    fn extensions(&self) -> &[&str];

    /// Type a file with this extension loads as
    fn resource_type_for_extension(&self, _extension: &str) -> Option<ResourceTypeId> {
        self.resource_types().first().map(|tag| ResourceTypeId::from(*tag))
    }

    /// Populate `resource` from the file in `context`
    fn load(&self, resource: &mut dyn Resource, context: &LoadContext<'_>) -> Result<()>;
}

#[derive(Default)]
struct LoaderTable {
    loaders: Vec<Arc<dyn ResourceLoader>>,
    by_extension: FxHashMap<String, usize>,
}

/// Maps file extensions to loaders
pub struct LoaderRegistry {
    table: RwLock<LoaderTable>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(LoaderTable::default()),
        }
    }

    /// Registry with the binary, text and JSON loaders
    pub fn with_builtin_loaders() -> Self {
        let registry = Self::new();
        for result in [
            registry.register_loader::<BinaryLoader>(),
            registry.register_loader::<TextLoader>(),
            registry.register_loader::<JsonLoader>(),
        ] {
            if let Err(e) = result {
                tracing::warn!("built-in loader rejected: {e}");
            }
        }
        registry
    }

    /// Constructs and registers a loader
    pub fn register_loader<L: ResourceLoader + Default + 'static>(&self) -> Result<()> {
        self.register(L::default())
    }

    /// Registers a loader. Rejected (and dropped) if any of its type tags or
    /// extensions is already served by another loader.
    pub fn register<L: ResourceLoader + 'static>(&self, loader: L) -> Result<()> {
        let mut table = self.table.write();

        for tag in loader.resource_types() {
            let taken = table
                .loaders
                .iter()
                .any(|existing| existing.resource_types().contains(tag));
            if taken {
                tracing::warn!(
                    loader = loader.name(),
                    type_tag = *tag,
                    "resource type already served by another loader, registration rejected"
                );
                return Err(ResourceError::LoaderCollision {
                    loader: loader.name().to_string(),
                    type_tag: tag.to_string(),
                });
            }
        }

        for ext in loader.extensions() {
            if table.by_extension.contains_key(&ext.to_ascii_lowercase()) {
                tracing::warn!(
                    loader = loader.name(),
                    extension = *ext,
                    "extension already mapped to another loader, registration rejected"
                );
                return Err(ResourceError::LoaderCollision {
                    loader: loader.name().to_string(),
                    type_tag: format!(".{ext}"),
                });
            }
        }

        let index = table.loaders.len();
        for ext in loader.extensions() {
            table.by_extension.insert(ext.to_ascii_lowercase(), index);
        }
        tracing::debug!(loader = loader.name(), "registered resource loader");
        table.loaders.push(Arc::new(loader));
        Ok(())
    }

    pub fn get_loader_from_extension(&self, extension: &str) -> Option<Arc<dyn ResourceLoader>> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        let table = self.table.read();
        table
            .by_extension
            .get(&extension)
            .map(|&index| table.loaders[index].clone())
    }

    pub fn get_loader_from_path(&self, path: &Path) -> Option<Arc<dyn ResourceLoader>> {
        extension_of(path).and_then(|ext| self.get_loader_from_extension(&ext))
    }

    pub fn get_loader_from_resource(
        &self,
        resource: &ResourceInstance,
    ) -> Option<Arc<dyn ResourceLoader>> {
        self.get_loader_from_path(Path::new(resource.file_path()))
    }

    /// Type tag for a path, from the loader serving its extension
    pub fn resolve_type(&self, path: &Path) -> Option<ResourceTypeId> {
        let ext = extension_of(path)?;
        self.get_loader_from_extension(&ext)?
            .resource_type_for_extension(&ext)
    }

    pub fn loader_count(&self) -> usize {
        self.table.read().loaders.len()
    }

    pub fn extension_count(&self) -> usize {
        self.table.read().by_extension.len()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_builtin_loaders()
    }
}

fn downcast_target<'r, T: TypedResource>(
    resource: &'r mut dyn Resource,
    loader: &str,
) -> Result<&'r mut T> {
    let found = resource.type_name();
    resource.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
        ResourceError::LoadFailed(format!(
            "{loader} expected a {} resource, got {found}",
            T::TYPE_NAME
        ))
    })
}

/// Binary resource loader
#[derive(Default)]
pub struct BinaryLoader;

impl ResourceLoader for BinaryLoader {
    fn name(&self) -> &str {
        "BinaryLoader"
    }

    fn resource_types(&self) -> &[&'static str] {
        &[BinaryResource::TYPE_NAME]
    }

    fn extensions(&self) -> &[&str] {
        &["bin", "dat"]
    }

    fn load(&self, resource: &mut dyn Resource, context: &LoadContext<'_>) -> Result<()> {
        downcast_target::<BinaryResource>(resource, self.name())?.set_data(context.bytes.to_vec());
        Ok(())
    }
}

/// Text resource loader
#[derive(Default)]
pub struct TextLoader;

impl ResourceLoader for TextLoader {
    fn name(&self) -> &str {
        "TextLoader"
    }

    fn resource_types(&self) -> &[&'static str] {
        &[TextResource::TYPE_NAME]
    }

    fn extensions(&self) -> &[&str] {
        &["txt", "md", "toml", "yaml", "yml"]
    }

    fn load(&self, resource: &mut dyn Resource, context: &LoadContext<'_>) -> Result<()> {
        let content = String::from_utf8(context.bytes.to_vec())
            .map_err(|e| ResourceError::LoadFailed(format!("UTF-8 decode error: {e}")))?;
        downcast_target::<TextResource>(resource, self.name())?.set_content(content);
        Ok(())
    }
}

/// JSON resource loader
#[derive(Default)]
pub struct JsonLoader;

impl ResourceLoader for JsonLoader {
    fn name(&self) -> &str {
        "JsonLoader"
    }

    fn resource_types(&self) -> &[&'static str] {
        &[JsonResource::TYPE_NAME]
    }

    fn extensions(&self) -> &[&str] {
        &["json"]
    }

    fn load(&self, resource: &mut dyn Resource, context: &LoadContext<'_>) -> Result<()> {
        let value: serde_json::Value = serde_json::from_slice(context.bytes)
            .map_err(|e| ResourceError::LoadFailed(format!("JSON parse error: {e}")))?;
        downcast_target::<JsonResource>(resource, self.name())?.set_value(value);
        Ok(())
    }
}
