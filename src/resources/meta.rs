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

//! `.is_meta` sidecars: stable guid plus the guids that depend on an asset.

use serde::{Deserialize, Serialize};
use speedy::{Readable, Writable};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ResourceError, Result};
use crate::resources::codec::{decode, encode};
use crate::resources::ResourceGuid;

pub const META_FILE_EXTENSION: &str = "is_meta";

/// Per-asset identity record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetaData {
    pub guid: ResourceGuid,
    pub dependent_guids: Vec<ResourceGuid>,
}

#[derive(Readable, Writable)]
struct MetaRecord {
    guid: [u8; 16],
    dependent_guids: Vec<[u8; 16]>,
}

impl ResourceMetaData {
    pub fn new(guid: ResourceGuid) -> Self {
        Self {
            guid,
            dependent_guids: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&MetaRecord {
            guid: self.guid.to_bytes(),
            dependent_guids: self.dependent_guids.iter().map(|g| g.to_bytes()).collect(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: MetaRecord = decode(bytes)?;
        Ok(Self {
            guid: ResourceGuid::from_bytes(record.guid),
            dependent_guids: record
                .dependent_guids
                .into_iter()
                .map(ResourceGuid::from_bytes)
                .collect(),
        })
    }

    /// Reads the binary sidecar next to `file`, if there is one
    pub fn read_for(file: &Path) -> Result<Option<Self>> {
        let path = meta_path(file);
        if !path.exists() {
            return Ok(None);
        }
        Self::from_bytes(&fs::read(path)?).map(Some)
    }

    /// Writes the binary sidecar (and optionally its JSON mirror) next to `file`
    pub fn write_for(&self, file: &Path, debug_json: bool) -> Result<()> {
        let path = meta_path(file);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, self.to_bytes()?)?;
        if debug_json {
            let json = serde_json::to_string_pretty(self)
                .map_err(|e| ResourceError::SerializationError(e.to_string()))?;
            fs::write(json_mirror_path(&path), json)?;
        }
        Ok(())
    }

    /// Writes the sidecar next to `file` and mirrors it under `meta_dir`,
    /// keeping `file`'s path relative to `content_root`
    pub fn write_mirrored(
        &self,
        file: &Path,
        content_root: &Path,
        meta_dir: &Path,
        debug_json: bool,
    ) -> Result<()> {
        self.write_for(file, debug_json)?;
        let relative = file.strip_prefix(content_root).unwrap_or(file);
        let relative = if relative.is_absolute() {
            relative.file_name().map(PathBuf::from).unwrap_or_default()
        } else {
            relative.to_path_buf()
        };
        self.write_for(&meta_dir.join(relative), debug_json)
    }
}

/// Sidecar path for `file`
pub fn meta_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".");
    name.push(META_FILE_EXTENSION);
    PathBuf::from(name)
}

/// True for sidecar files (binary or JSON mirror)
pub fn is_meta_file(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(&format!(".{META_FILE_EXTENSION}"))
        || name.ends_with(&format!(".{META_FILE_EXTENSION}.json"))
}

fn json_mirror_path(meta: &Path) -> PathBuf {
    let mut name = meta.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_meta_path() {
        assert_eq!(
            meta_path(Path::new("textures/wood.png")),
            PathBuf::from("textures/wood.png.is_meta")
        );
        assert!(is_meta_file(Path::new("textures/wood.png.is_meta")));
        assert!(is_meta_file(Path::new("textures/wood.png.is_meta.json")));
        assert!(!is_meta_file(Path::new("textures/wood.png")));
    }

    #[test]
    fn test_sidecar_written_and_read() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("wood.png");
        let mut meta = ResourceMetaData::new(ResourceGuid::new());
        meta.dependent_guids.push(ResourceGuid::new());

        meta.write_for(&file, true).unwrap();
        assert!(meta_path(&file).exists());

        let restored = ResourceMetaData::read_for(&file).unwrap().unwrap();
        assert_eq!(restored, meta);
    }

    #[test]
    fn test_missing_sidecar_is_none() {
        let dir = tempdir().unwrap();
        assert!(ResourceMetaData::read_for(&dir.path().join("nothing.png"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_mirror_keeps_relative_layout() {
        let dir = tempdir().unwrap();
        let content = dir.path().join("Content");
        let meta_dir = dir.path().join("Intermediate/Meta");
        let file = content.join("textures/wood.png");

        ResourceMetaData::new(ResourceGuid::new())
            .write_mirrored(&file, &content, &meta_dir, false)
            .unwrap();

        assert!(meta_path(&file).exists());
        assert!(meta_path(&meta_dir.join("textures/wood.png")).exists());
    }
}
