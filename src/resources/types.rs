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
use parking_lot::RwLock;

use crate::error::{ResourceError, Result};
use crate::resources::builtin::{BinaryResource, JsonResource, TextResource};
use crate::resources::{Resource, ResourceTypeId, TypedResource};

type Factory = fn() -> Box<dyn Resource>;

fn construct<T: TypedResource>() -> Box<dyn Resource> {
    Box::new(T::default())
}

/// Maps type tags to constructors, filled at startup
pub struct ResourceTypeRegistry {
    factories: RwLock<AHashMap<ResourceTypeId, Factory>>,
}

impl ResourceTypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(AHashMap::new()),
        }
    }

    /// Registry pre-filled with the built-in kinds
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        registry.register::<BinaryResource>();
        registry.register::<TextResource>();
        registry.register::<JsonResource>();
        registry
    }

    /// Returns false if the tag was already registered
    pub fn register<T: TypedResource>(&self) -> bool {
        let mut factories = self.factories.write();
        let tag = ResourceTypeId::of::<T>();
        if factories.contains_key(&tag) {
            return false;
        }
        factories.insert(tag, construct::<T>);
        true
    }

    pub fn contains(&self, type_id: &ResourceTypeId) -> bool {
        self.factories.read().contains_key(type_id)
    }

    pub fn create(&self, type_id: &ResourceTypeId) -> Result<Box<dyn Resource>> {
        let factory = self
            .factories
            .read()
            .get(type_id)
            .copied()
            .ok_or_else(|| ResourceError::UnknownResourceType(type_id.to_string()))?;
        Ok(factory())
    }

    pub fn type_ids(&self) -> Vec<ResourceTypeId> {
        self.factories.read().keys().cloned().collect()
    }
}

impl Default for ResourceTypeRegistry {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}
