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
use std::path::{Path, PathBuf};

use crate::error::{ResourceError, Result};

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resource manager settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManagerConfig {
    /// Relative resource paths resolve against this directory
    pub project_root: PathBuf,
    /// Database and mirrored meta files; relative paths resolve against `project_root`
    pub intermediate_dir: PathBuf,
    /// Upper bound on resources loading at the same time
    pub max_concurrent_loads: usize,
    /// Worker threads used for asynchronous loads
    pub worker_threads: usize,
    /// Write `.is_meta` sidecars when a load completes (on by default)
    pub write_meta_files: bool,
    /// Write JSON mirrors next to binary database/meta files
    pub write_debug_json: bool,
}

impl ResourceManagerConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ResourceError::DeserializationError(e.to_string()))?;
        Ok(config.sanitized())
    }

    pub fn with_intermediate_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.intermediate_dir = dir.into();
        self
    }

    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.max_concurrent_loads = max;
        self.sanitized()
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self.sanitized()
    }

    pub fn with_meta_files(mut self, enabled: bool) -> Self {
        self.write_meta_files = enabled;
        self
    }

    pub fn with_debug_json(mut self, enabled: bool) -> Self {
        self.write_debug_json = enabled;
        self
    }

    /// Absolute (or root-relative) location of a resource path
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn intermediate_path(&self) -> PathBuf {
        if self.intermediate_dir.is_absolute() {
            self.intermediate_dir.clone()
        } else {
            self.project_root.join(&self.intermediate_dir)
        }
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.intermediate_path().join("Meta")
    }

    /// Zero limits are replaced by one
    pub(crate) fn sanitized(mut self) -> Self {
        self.max_concurrent_loads = self.max_concurrent_loads.max(1);
        self.worker_threads = self.worker_threads.max(1);
        self
    }
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            intermediate_dir: PathBuf::from("Intermediate"),
            max_concurrent_loads: available_threads(),
            worker_threads: available_threads(),
            write_meta_files: true,
            write_debug_json: true,
        }
    }
}
