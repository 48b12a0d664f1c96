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

//! Engine binary format: what `convert_resource` writes and the fast load
//! path reads back without a format loader.

use speedy::{Readable, Writable};
use std::fs;
use std::path::Path;

use crate::error::{ResourceError, Result};
use crate::resources::codec::{decode, encode};
use crate::resources::id::extension_of;
use crate::resources::ResourceTypeId;

/// Extension of converted resources
pub const RESOURCE_FILE_EXTENSION: &str = "isres";

const MAGIC: [u8; 4] = *b"ISRS";
const VERSION: u16 = 1;

/// On-disk record of a converted resource
#[derive(Clone, Debug, PartialEq, Eq, Readable, Writable)]
pub struct EngineResourceFile {
    magic: [u8; 4],
    version: u16,
    pub type_tag: String,
    pub source_path: String,
    pub payload: Vec<u8>,
}

impl EngineResourceFile {
    pub fn new(type_tag: &ResourceTypeId, source_path: &str, payload: Vec<u8>) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            type_tag: type_tag.as_str().to_string(),
            source_path: source_path.to_string(),
            payload,
        }
    }

    pub fn type_id(&self) -> ResourceTypeId {
        ResourceTypeId::new(self.type_tag.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file: Self = decode(bytes)?;
        if file.magic != MAGIC {
            return Err(ResourceError::DeserializationError(
                "not an engine resource file".to_string(),
            ));
        }
        if file.version != VERSION {
            return Err(ResourceError::DeserializationError(format!(
                "unsupported engine resource version {}",
                file.version
            )));
        }
        Ok(file)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}

/// True for files the fast path should deserialize directly
pub fn is_engine_format(path: &Path) -> bool {
    extension_of(path).as_deref() == Some(RESOURCE_FILE_EXTENSION)
}

/// Where the converted form of `source` lives
pub fn converted_path(source: &str) -> String {
    format!("{source}.{RESOURCE_FILE_EXTENSION}")
}

/// Reads the type tag recorded in an engine resource file
pub fn peek_type(path: &Path) -> Result<ResourceTypeId> {
    Ok(EngineResourceFile::read_from(path)?.type_id())
}
