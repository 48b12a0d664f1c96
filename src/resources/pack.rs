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

//! Resource pack container.
//!
//! File layout, all records little-endian speedy:
//!
//! ```text
//! PackHeader   magic "ISRP", version, entry count, index length
//! PackIndex    one record per entry: id, guid, offset, length, serialized flag
//! payload      per entry: [ResourceId record][payload bytes]
//! ```
//!
//! Offsets in the index are absolute and point at the payload bytes, so an
//! entry is read with a single seek and `read_exact`.

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use speedy::{Readable, Writable};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::error::{ResourceError, Result};
use crate::resources::codec::{decode, encode, encoded_len};
use crate::resources::{ResourceGuid, ResourceHandle, ResourceHandleExt, ResourceId};

/// Conventional pack file extension
pub const PACK_FILE_EXTENSION: &str = "isResourcePack";

const MAGIC: [u8; 4] = *b"ISRP";
const VERSION: u32 = 1;

#[derive(Readable, Writable)]
struct PackHeader {
    magic: [u8; 4],
    version: u32,
    entry_count: u32,
    index_length: u64,
}

#[derive(Clone, Readable, Writable)]
struct PackIndexEntry {
    path: String,
    type_tag: String,
    guid: [u8; 16],
    data_offset: u64,
    data_length: u64,
    is_serialized: bool,
}

#[derive(Readable, Writable)]
struct PackIndex {
    entries: Vec<PackIndexEntry>,
}

/// One resource tracked by a pack
#[derive(Clone, Debug)]
pub struct PackedEntry {
    pub id: ResourceId,
    pub guid: ResourceGuid,
    /// Null until a live resource is attached
    pub resource: ResourceHandle,
    /// True once the payload bytes exist in the pack file
    pub is_serialized: bool,
    pub data_offset: u64,
    pub data_length: u64,
}

impl PackedEntry {
    fn unbound(index: &PackIndexEntry) -> Self {
        Self {
            id: ResourceId::new(&index.path, index.type_tag.as_str()),
            guid: ResourceGuid::from_bytes(index.guid),
            resource: ResourceHandle::null(),
            is_serialized: index.is_serialized,
            data_offset: index.data_offset,
            data_length: index.data_length,
        }
    }
}

/// Many resources bundled in one file with an offset index
pub struct ResourcePack {
    file_path: PathBuf,
    entries: RwLock<AHashMap<ResourceId, PackedEntry>>,
    reader: Mutex<Option<BufReader<File>>>,
}

impl ResourcePack {
    /// Empty pack that will be saved to `file_path`
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            entries: RwLock::new(AHashMap::new()),
            reader: Mutex::new(None),
        }
    }

    /// Opens an existing pack file and reads its index
    pub fn from_file(file_path: impl Into<PathBuf>) -> Result<Self> {
        let pack = Self::new(file_path);
        pack.open()?;
        Ok(pack)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Adds a live resource. A resource may belong to one pack at a time.
    pub fn add_resource(&self, handle: &ResourceHandle) -> Result<()> {
        let instance = handle.try_get()?;
        let id = instance.id().clone();

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&id) {
            if entry.resource.ptr_eq(handle) {
                return Ok(());
            }
        }
        if !instance.enter_pack() {
            return Err(ResourceError::AlreadyInPack(id));
        }

        match entries.get_mut(&id) {
            // Entry read from the index, now attached to its live resource
            Some(entry) => {
                if let Some(old) = entry.resource.get() {
                    old.leave_pack();
                }
                entry.resource = handle.clone();
            }
            None => {
                entries.insert(
                    id.clone(),
                    PackedEntry {
                        id,
                        guid: instance.guid(),
                        resource: handle.clone(),
                        is_serialized: false,
                        data_offset: 0,
                        data_length: 0,
                    },
                );
            }
        }
        Ok(())
    }

    /// Returns false if the resource was not in this pack
    pub fn remove_resource(&self, handle: &ResourceHandle) -> bool {
        let Some(id) = handle.resource_id() else {
            return false;
        };
        self.remove_resource_id(&id)
    }

    pub fn remove_resource_id(&self, id: &ResourceId) -> bool {
        let Some(entry) = self.entries.write().remove(id) else {
            return false;
        };
        if let Some(instance) = entry.resource.get() {
            instance.leave_pack();
        }
        true
    }

    /// Writes every entry that has a payload to the pack file.
    ///
    /// Loaded resources are serialized from memory; unloaded entries that
    /// were serialized before keep their bytes. Anything else is written to
    /// the index only, unserialized.
    pub fn save(&self) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = info_span!("pack.save", entries = self.entry_count());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let mut snapshot: Vec<PackedEntry> = self.entries.read().values().cloned().collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));

        let mut payloads: Vec<Option<Vec<u8>>> = Vec::with_capacity(snapshot.len());
        for entry in &snapshot {
            payloads.push(self.payload_for(entry)?);
        }

        let mut index = PackIndex {
            entries: snapshot
                .iter()
                .zip(&payloads)
                .map(|(entry, payload)| PackIndexEntry {
                    path: entry.id.path().to_string(),
                    type_tag: entry.id.type_id().as_str().to_string(),
                    guid: entry.guid.to_bytes(),
                    data_offset: 0,
                    data_length: payload.as_ref().map_or(0, |p| p.len() as u64),
                    is_serialized: payload.is_some(),
                })
                .collect(),
        };

        let index_length = encoded_len(&index)? as u64;
        let header = PackHeader {
            magic: MAGIC,
            version: VERSION,
            entry_count: snapshot.len() as u32,
            index_length,
        };

        // Offsets are fixed-width, so the index length does not depend on them.
        let mut cursor = encoded_len(&header)? as u64 + index_length;
        let mut id_records = Vec::with_capacity(snapshot.len());
        for (entry, record) in snapshot.iter().zip(index.entries.iter_mut()) {
            if !record.is_serialized {
                id_records.push(None);
                continue;
            }
            let id_bytes = encode(&entry.id)?;
            record.data_offset = cursor + id_bytes.len() as u64;
            cursor = record.data_offset + record.data_length;
            id_records.push(Some(id_bytes));
        }

        let was_open = self.close();
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(&self.file_path)?);
        writer.write_all(&encode(&header)?)?;
        writer.write_all(&encode(&index)?)?;
        for (id_bytes, payload) in id_records.iter().zip(&payloads) {
            if let (Some(id_bytes), Some(payload)) = (id_bytes, payload) {
                writer.write_all(id_bytes)?;
                writer.write_all(payload)?;
            }
        }
        writer.flush()?;
        drop(writer);

        {
            let mut entries = self.entries.write();
            for record in &index.entries {
                let id = ResourceId::new(&record.path, record.type_tag.as_str());
                if let Some(entry) = entries.get_mut(&id) {
                    entry.is_serialized = record.is_serialized;
                    entry.data_offset = record.data_offset;
                    entry.data_length = record.data_length;
                }
            }
        }

        tracing::debug!(
            pack = %self.file_path.display(),
            entries = snapshot.len(),
            "resource pack saved"
        );
        if was_open {
            self.open_reader()?;
        }
        Ok(())
    }

    fn payload_for(&self, entry: &PackedEntry) -> Result<Option<Vec<u8>>> {
        if let Some(instance) = entry.resource.get() {
            if instance.is_loaded() {
                return instance.payload().serialize().map(Some);
            }
        }
        if entry.is_serialized {
            return self.read_bytes(entry).map(Some);
        }
        tracing::warn!(
            resource = %entry.id,
            "pack entry has no loaded payload, written unserialized"
        );
        Ok(None)
    }

    /// Opens the backing file and merges its index into this pack
    pub fn open(&self) -> Result<()> {
        let indexed = read_index(&self.file_path)?;
        {
            let mut entries = self.entries.write();
            for unbound in indexed {
                match entries.get_mut(&unbound.id) {
                    Some(entry) => {
                        entry.is_serialized = unbound.is_serialized;
                        entry.data_offset = unbound.data_offset;
                        entry.data_length = unbound.data_length;
                    }
                    None => {
                        entries.insert(unbound.id.clone(), unbound);
                    }
                }
            }
        }
        self.open_reader()
    }

    fn open_reader(&self) -> Result<()> {
        let file = File::open(&self.file_path)?;
        *self.reader.lock() = Some(BufReader::new(file));
        Ok(())
    }

    /// Releases the read handle; returns whether one was open
    pub fn close(&self) -> bool {
        self.reader.lock().take().is_some()
    }

    pub fn is_open(&self) -> bool {
        self.reader.lock().is_some()
    }

    /// Reads the entry's bytes and feeds them to its resource's memory loader.
    ///
    /// Does not touch the resource's state; the manager owns that.
    pub fn load_resource(&self, id: &ResourceId) -> Result<()> {
        let entry = self
            .get_entry(id)
            .ok_or_else(|| ResourceError::ResourceNotFound(id.to_string()))?;
        let bytes = self.read_entry_bytes(id)?;
        let instance = entry.resource.try_get()?;
        let result = instance.payload_mut().load_from_memory(&bytes);
        result
    }

    /// Raw payload bytes of a serialized entry
    pub fn read_entry_bytes(&self, id: &ResourceId) -> Result<Vec<u8>> {
        let entry = self
            .get_entry(id)
            .ok_or_else(|| ResourceError::ResourceNotFound(id.to_string()))?;
        if !entry.is_serialized {
            tracing::warn!(resource = %id, "pack entry is not serialized");
            return Err(ResourceError::EntryNotSerialized(id.clone()));
        }
        self.read_bytes(&entry)
    }

    fn read_bytes(&self, entry: &PackedEntry) -> Result<Vec<u8>> {
        let mut reader = self.reader.lock();
        if reader.is_none() {
            *reader = Some(BufReader::new(File::open(&self.file_path)?));
        }
        let Some(reader) = reader.as_mut() else {
            return Err(ResourceError::PackError("pack file is not open".to_string()));
        };
        let file_len = reader.get_ref().metadata()?.len();
        check_range(entry.data_offset, entry.data_length, file_len)
            .map_err(|e| ResourceError::PackError(format!("entry {}: {e}", entry.id)))?;
        let length = usize::try_from(entry.data_length)
            .map_err(|_| ResourceError::PackError(format!("entry {} too large", entry.id)))?;
        let mut bytes = vec![0u8; length];
        reader.seek(SeekFrom::Start(entry.data_offset))?;
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    pub fn get_entry(&self, id: &ResourceId) -> Option<PackedEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn has_resource_id(&self, id: &ResourceId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// True when the pack can serve `id` without touching loose files
    pub fn is_serialized(&self, id: &ResourceId) -> bool {
        self.entries.read().get(id).is_some_and(|e| e.is_serialized)
    }

    pub fn entries(&self) -> Vec<PackedEntry> {
        let mut entries: Vec<PackedEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Live resources attached to this pack
    pub fn get_all_resources(&self) -> Vec<ResourceHandle> {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.resource.is_valid())
            .map(|entry| entry.resource.clone())
            .collect()
    }

    pub fn get_loaded_resource_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.resource.is_loaded())
            .count()
    }

    pub fn get_unloaded_resource_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.resource.is_loaded())
            .count()
    }
}

impl Drop for ResourcePack {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values() {
            if let Some(instance) = entry.resource.get() {
                instance.leave_pack();
            }
        }
    }
}

impl std::fmt::Debug for ResourcePack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePack")
            .field("file_path", &self.file_path)
            .field("entries", &self.entry_count())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Reads a pack file's index without attaching any resources
pub fn read_index(path: &Path) -> Result<Vec<PackedEntry>> {
    let mut file = BufReader::new(File::open(path)?);

    let header_len = encoded_len(&PackHeader {
        magic: MAGIC,
        version: VERSION,
        entry_count: 0,
        index_length: 0,
    })?;
    let mut header_bytes = vec![0u8; header_len];
    file.read_exact(&mut header_bytes)?;
    let header: PackHeader = decode(&header_bytes)?;
    if header.magic != MAGIC {
        return Err(ResourceError::PackError(format!(
            "{} is not a resource pack",
            path.display()
        )));
    }
    if header.version != VERSION {
        return Err(ResourceError::PackError(format!(
            "unsupported pack version {}",
            header.version
        )));
    }

    let file_len = file.get_ref().metadata()?.len();
    let index_end = (header_len as u64).checked_add(header.index_length);
    if index_end.map_or(true, |end| end > file_len) {
        return Err(ResourceError::PackError(format!(
            "{} is truncated: index of {} bytes does not fit",
            path.display(),
            header.index_length
        )));
    }
    let index_length = usize::try_from(header.index_length)
        .map_err(|_| ResourceError::PackError("index too large".to_string()))?;
    let mut index_bytes = vec![0u8; index_length];
    file.read_exact(&mut index_bytes)?;
    let index: PackIndex = decode(&index_bytes)?;
    if index.entries.len() != header.entry_count as usize {
        return Err(ResourceError::PackError(format!(
            "index lists {} entries, header says {}",
            index.entries.len(),
            header.entry_count
        )));
    }

    for entry in index.entries.iter().filter(|entry| entry.is_serialized) {
        check_range(entry.data_offset, entry.data_length, file_len)
            .map_err(|e| ResourceError::PackError(format!("entry {}: {e}", entry.path)))?;
    }

    Ok(index.entries.iter().map(PackedEntry::unbound).collect())
}

fn check_range(offset: u64, length: u64, file_len: u64) -> std::result::Result<(), String> {
    match offset.checked_add(length) {
        Some(end) if end <= file_len => Ok(()),
        _ => Err(format!(
            "range {offset}+{length} lies outside the {file_len} byte pack"
        )),
    }
}
