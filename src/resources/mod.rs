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

//! Resource identity, lifetime and loading

pub mod builtin;
mod codec;
pub mod config;
pub mod database;
pub mod engine_format;
pub mod handle;
pub mod id;
pub mod loader;
pub mod manager;
pub mod meta;
pub mod notify;
pub mod pack;
pub mod resource;
pub mod state;
pub mod store;
pub mod types;

pub use builtin::{BinaryResource, JsonResource, TextResource};
pub use config::ResourceManagerConfig;
pub use database::{DatabaseRecord, ResourceDatabase};
pub use engine_format::{EngineResourceFile, RESOURCE_FILE_EXTENSION};
pub use handle::{ObserverPtr, ObserverRef, OwnerPtr};
pub use id::{ResourceGuid, ResourceId, ResourceTypeId};
pub use loader::{
    BinaryLoader, JsonLoader, LoadContext, LoaderRegistry, ResourceLoader, TextLoader,
};
pub use manager::{LoadCompletion, ResourceManager, UnloadOutcome, UpdateSummary};
pub use meta::{ResourceMetaData, META_FILE_EXTENSION};
pub use notify::{ListenerId, ListenerSet};
pub use pack::{PackedEntry, ResourcePack, PACK_FILE_EXTENSION};
pub use resource::{
    LoadTimer, ReferenceLink, ReferenceLinkKind, Resource, ResourceHandle, ResourceHandleExt,
    ResourceInstance, ResourceOwner, ResourceStats, TypedResource,
};
pub use state::{AtomicResourceState, ResourceState, StorageType};
pub use store::ResourceStore;
pub use types::ResourceTypeRegistry;
