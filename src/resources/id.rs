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

//! Resource identity: path + type tag, and the stable GUID.

use serde::{Deserialize, Serialize};
use speedy::{Readable, Writable};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::resources::TypedResource;

/// Opaque tag naming a resource type ("Texture", "Model", ...)
///
/// An empty tag is the "unknown" tag; ids carrying it must be resolved
/// before they reach the store.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Readable,
    Writable,
)]
pub struct ResourceTypeId(String);

impl ResourceTypeId {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag of a concrete resource type
    pub fn of<T: TypedResource>() -> Self {
        Self(T::TYPE_NAME.to_string())
    }

    /// The empty tag
    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl From<&str> for ResourceTypeId {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for ResourceTypeId {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl fmt::Display for ResourceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifies a resource by path and type tag
///
/// Equality and hashing cover both fields. Paths are stored with forward
/// slashes so the same file always produces the same id.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Readable, Writable,
)]
pub struct ResourceId {
    path: String,
    type_id: ResourceTypeId,
}

impl ResourceId {
    pub fn new(path: impl AsRef<Path>, type_id: impl Into<ResourceTypeId>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            type_id: type_id.into(),
        }
    }

    /// Id whose type tag still has to be resolved from the extension
    pub fn untyped(path: impl AsRef<Path>) -> Self {
        Self::new(path, ResourceTypeId::unknown())
    }

    pub fn of<T: TypedResource>(path: impl AsRef<Path>) -> Self {
        Self::new(path, ResourceTypeId::of::<T>())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn type_id(&self) -> &ResourceTypeId {
        &self.type_id
    }

    /// Lowercase file extension, without the dot
    pub fn extension(&self) -> Option<String> {
        extension_of(Path::new(&self.path))
    }

    pub fn has_type(&self) -> bool {
        self.type_id.is_valid()
    }

    pub fn is_valid(&self) -> bool {
        !self.path.is_empty() && self.type_id.is_valid()
    }

    /// Same path, different type tag
    pub fn with_type(&self, type_id: impl Into<ResourceTypeId>) -> Self {
        Self {
            path: self.path.clone(),
            type_id: type_id.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.type_id)
    }
}

/// Stable identifier that survives path renames
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceGuid(Uuid);

impl ResourceGuid {
    /// Creates a new, random (version 4) guid
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ResourceGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

pub(crate) fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
