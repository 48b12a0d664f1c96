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

//! Persisted list of known resources (identity and metadata, no payloads).

use serde::{Deserialize, Serialize};
use speedy::{Readable, Writable};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ResourceError, Result};
use crate::resources::codec::{decode, encode};
use crate::resources::{ResourceGuid, ResourceId, ResourceInstance, StorageType};

pub const DATABASE_FILE_NAME: &str = "resource_database.bin";
pub const DATABASE_DEBUG_FILE_NAME: &str = "resource_database.json";

const MAGIC: [u8; 4] = *b"ISDB";
const VERSION: u16 = 1;

/// One known resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: ResourceId,
    pub guid: ResourceGuid,
    pub source_path: String,
    pub storage_type: StorageType,
}

impl DatabaseRecord {
    pub fn from_instance(instance: &ResourceInstance) -> Self {
        Self {
            id: instance.id().clone(),
            guid: instance.guid(),
            source_path: instance.source_file_path(),
            storage_type: instance.storage_type(),
        }
    }
}

#[derive(Readable, Writable)]
struct StoredRecord {
    id: ResourceId,
    guid: [u8; 16],
    source_path: String,
    storage_type: StorageType,
}

#[derive(Readable, Writable)]
struct StoredDatabase {
    magic: [u8; 4],
    version: u16,
    records: Vec<StoredRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDatabase {
    pub records: Vec<DatabaseRecord>,
}

impl ResourceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&StoredDatabase {
            magic: MAGIC,
            version: VERSION,
            records: self
                .records
                .iter()
                .map(|record| StoredRecord {
                    id: record.id.clone(),
                    guid: record.guid.to_bytes(),
                    source_path: record.source_path.clone(),
                    storage_type: record.storage_type,
                })
                .collect(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let stored: StoredDatabase = decode(bytes)?;
        if stored.magic != MAGIC || stored.version != VERSION {
            return Err(ResourceError::DeserializationError(
                "not a resource database (or unsupported version)".to_string(),
            ));
        }
        Ok(Self {
            records: stored
                .records
                .into_iter()
                .map(|record| DatabaseRecord {
                    id: record.id,
                    guid: ResourceGuid::from_bytes(record.guid),
                    source_path: record.source_path,
                    storage_type: record.storage_type,
                })
                .collect(),
        })
    }

    /// Writes the binary file (and the JSON mirror) into `dir`
    pub fn save(&self, dir: &Path, debug_json: bool) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(DATABASE_FILE_NAME), self.to_bytes()?)?;
        if debug_json {
            let json = serde_json::to_string_pretty(self)
                .map_err(|e| ResourceError::SerializationError(e.to_string()))?;
            fs::write(dir.join(DATABASE_DEBUG_FILE_NAME), json)?;
        }
        Ok(())
    }

    /// Reads the binary file from `dir`; `None` if none was saved yet
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(DATABASE_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::from_bytes(&fs::read(path)?).map(Some)
    }

    /// Deletes both database files; returns whether anything was removed
    pub fn clear(dir: &Path) -> Result<bool> {
        let mut removed = false;
        for path in Self::files(dir) {
            if path.exists() {
                fs::remove_file(path)?;
                removed = true;
            }
        }
        Ok(removed)
    }

    fn files(dir: &Path) -> [PathBuf; 2] {
        [
            dir.join(DATABASE_FILE_NAME),
            dir.join(DATABASE_DEBUG_FILE_NAME),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> ResourceDatabase {
        ResourceDatabase {
            records: vec![
                DatabaseRecord {
                    id: ResourceId::new("models/chair.fbx.isres", "Model"),
                    guid: ResourceGuid::new(),
                    source_path: "models/chair.fbx".to_string(),
                    storage_type: StorageType::Disk,
                },
                DatabaseRecord {
                    id: ResourceId::new("models/chair.fbx#mesh0", "Mesh"),
                    guid: ResourceGuid::new(),
                    source_path: "models/chair.fbx#mesh0".to_string(),
                    storage_type: StorageType::Memory,
                },
            ],
        }
    }

    #[test]
    fn test_database_save_and_load() {
        let dir = tempdir().unwrap();
        let db = sample();
        db.save(dir.path(), true).unwrap();

        assert!(dir.path().join(DATABASE_DEBUG_FILE_NAME).exists());
        let loaded = ResourceDatabase::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, db);
    }

    #[test]
    fn test_json_mirror_uses_hyphenated_guids() {
        let dir = tempdir().unwrap();
        let db = sample();
        db.save(dir.path(), true).unwrap();

        let json = fs::read_to_string(dir.path().join(DATABASE_DEBUG_FILE_NAME)).unwrap();
        assert!(json.contains(&db.records[0].guid.to_string()));
    }

    #[test]
    fn test_clear_removes_files() {
        let dir = tempdir().unwrap();
        sample().save(dir.path(), false).unwrap();

        assert!(ResourceDatabase::clear(dir.path()).unwrap());
        assert!(ResourceDatabase::load(dir.path()).unwrap().is_none());
        assert!(!ResourceDatabase::clear(dir.path()).unwrap());
    }
}
