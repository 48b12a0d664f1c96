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

use serde::{Deserialize, Serialize};
use speedy::{Readable, Writable};
use std::sync::atomic::{AtomicU8, Ordering};

/// Per-resource lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceState {
    NotLoaded = 0,
    Queued = 1,
    Loading = 2,
    Loaded = 3,
    FailedToLoad = 4,
    NotFound = 5,
    Unloading = 6,
    Unloaded = 7,
    Cancelled = 8,
}

impl ResourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ResourceState::NotLoaded,
            1 => ResourceState::Queued,
            2 => ResourceState::Loading,
            3 => ResourceState::Loaded,
            4 => ResourceState::FailedToLoad,
            5 => ResourceState::NotFound,
            6 => ResourceState::Unloading,
            7 => ResourceState::Unloaded,
            _ => ResourceState::Cancelled,
        }
    }

    /// States a load request may start from
    pub fn can_start_load(self) -> bool {
        matches!(
            self,
            ResourceState::NotLoaded
                | ResourceState::FailedToLoad
                | ResourceState::NotFound
                | ResourceState::Unloaded
                | ResourceState::Cancelled
        )
    }

    /// States in which the store may destroy the resource
    pub fn can_remove(self) -> bool {
        matches!(
            self,
            ResourceState::NotLoaded
                | ResourceState::Unloaded
                | ResourceState::FailedToLoad
                | ResourceState::NotFound
                | ResourceState::Cancelled
        )
    }

    /// Queued or Loading
    pub fn is_pending(self) -> bool {
        matches!(self, ResourceState::Queued | ResourceState::Loading)
    }
}

/// Lock-free state cell, readable from any thread
#[derive(Debug)]
pub struct AtomicResourceState(AtomicU8);

impl AtomicResourceState {
    pub fn new(state: ResourceState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> ResourceState {
        ResourceState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: ResourceState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`, failing if another thread got there first
    pub(crate) fn transition(&self, from: ResourceState, to: ResourceState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves to `to` from any state accepted by `allowed`; returns the previous state
    pub(crate) fn transition_from(
        &self,
        allowed: impl Fn(ResourceState) -> bool,
        to: ResourceState,
    ) -> Option<ResourceState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = ResourceState::from_u8(current);
            if !allowed(state) {
                return None;
            }
            match self.0.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(state),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicResourceState {
    fn default() -> Self {
        Self::new(ResourceState::NotLoaded)
    }
}

/// Where a resource's bytes live
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Readable, Writable,
)]
pub enum StorageType {
    /// Standalone file on disk
    #[default]
    Disk,
    /// Embedded in another resource's file
    Memory,
}
