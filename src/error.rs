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

//! Error types

use std::fmt;

use crate::resources::{ResourceId, ResourceState};

/// Resource engine error type
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Id has an empty path or a type tag nothing knows about
    InvalidResourceId(String),

    /// No factory registered for the type tag
    UnknownResourceType(String),

    /// Resource not tracked by the store
    ResourceNotFound(String),

    /// Operation is not legal in the resource's current state
    InvalidState { id: ResourceId, state: ResourceState },

    /// No loader serves the extension
    LoaderNotFound(String),

    /// A loader claims a type tag another loader already serves
    LoaderCollision { loader: String, type_tag: String },

    /// Loader reported failure
    LoadFailed(String),

    /// Conversion into the engine format failed
    ConversionFailed(String),

    /// Resource pack error
    PackError(String),

    /// Pack entry has no serialized payload
    EntryNotSerialized(ResourceId),

    /// Resource already belongs to a pack
    AlreadyInPack(ResourceId),

    /// Observer handle used after its owner was destroyed
    ObserverInvalidated,

    /// Manager no longer accepts work
    ShuttingDown,

    /// Asset package (zip) error
    PackageError(String),

    /// Serialization error
    SerializationError(String),

    /// Deserialization error
    DeserializationError(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::InvalidResourceId(msg) => write!(f, "Invalid resource id: {msg}"),
            ResourceError::UnknownResourceType(tag) => {
                write!(f, "Unknown resource type: '{tag}'")
            }
            ResourceError::ResourceNotFound(msg) => write!(f, "Resource not found: {msg}"),
            ResourceError::InvalidState { id, state } => {
                write!(f, "Resource {id} is in state {state:?}")
            }
            ResourceError::LoaderNotFound(ext) => write!(f, "No loader for extension: {ext}"),
            ResourceError::LoaderCollision { loader, type_tag } => write!(
                f,
                "Loader '{loader}' claims type '{type_tag}' which is already served"
            ),
            ResourceError::LoadFailed(msg) => write!(f, "Resource load error: {msg}"),
            ResourceError::ConversionFailed(msg) => write!(f, "Conversion failed: {msg}"),
            ResourceError::PackError(msg) => write!(f, "Resource pack error: {msg}"),
            ResourceError::EntryNotSerialized(id) => {
                write!(f, "Pack entry {id} has not been serialized")
            }
            ResourceError::AlreadyInPack(id) => write!(f, "Resource {id} is already in a pack"),
            ResourceError::ObserverInvalidated => {
                write!(f, "Observer handle points to a destroyed resource")
            }
            ResourceError::ShuttingDown => write!(f, "Resource manager is shutting down"),
            ResourceError::PackageError(msg) => write!(f, "Asset package error: {msg}"),
            ResourceError::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            ResourceError::DeserializationError(msg) => {
                write!(f, "Deserialization error: {msg}")
            }
            ResourceError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::IoError(err.to_string())
    }
}

impl From<zip::result::ZipError> for ResourceError {
    fn from(err: zip::result::ZipError) -> Self {
        ResourceError::PackageError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ResourceError>;
