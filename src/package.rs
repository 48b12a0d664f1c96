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

//! Asset packages: zip archives of source assets and their meta sidecars.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ResourceError, Result};
use crate::resources::id::{extension_of, normalize_path};
use crate::resources::meta::{is_meta_file, meta_path};
use crate::resources::PACK_FILE_EXTENSION;

/// Asset package file extension
pub const PACKAGE_FILE_EXTENSION: &str = "isassetpackage";

/// A source file known to a package
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetInfo {
    /// Entry name inside the archive, relative to the package root
    pub path: String,
    /// File on disk
    pub source: PathBuf,
}

impl AssetInfo {
    pub fn is_meta(&self) -> bool {
        is_meta_file(Path::new(&self.path))
    }
}

/// One entry read back from a package archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl PackageEntry {
    pub fn is_meta(&self) -> bool {
        is_meta_file(Path::new(&self.path))
    }
}

/// In-memory list of assets, built into a `.isassetpackage` archive
#[derive(Debug)]
pub struct AssetPackage {
    root: PathBuf,
    name: String,
    assets: BTreeMap<String, AssetInfo>,
}

impl AssetPackage {
    /// Entry names are made relative to `root`
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            assets: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Adds one file, plus its meta sidecar when there is one
    pub fn add_asset(&mut self, file: impl AsRef<Path>) -> Result<()> {
        let file = file.as_ref();
        if !file.is_file() {
            return Err(ResourceError::ResourceNotFound(file.display().to_string()));
        }
        self.insert(file);

        let sidecar = meta_path(file);
        if sidecar.is_file() {
            self.insert(&sidecar);
        }
        Ok(())
    }

    /// Adds a file, or every file below a directory. Files that are already
    /// packages are skipped. Returns how many assets the package gained.
    pub fn add_path(&mut self, input: impl AsRef<Path>) -> Result<usize> {
        let input = input.as_ref();
        let before = self.assets.len();

        if input.is_dir() {
            for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() && !is_package_file(entry.path()) {
                    self.insert(entry.path());
                }
            }
        } else if is_package_file(input) {
            tracing::debug!(path = %input.display(), "skipping package file");
        } else {
            self.add_asset(input)?;
        }

        Ok(self.assets.len() - before)
    }

    fn insert(&mut self, file: &Path) {
        let relative = file
            .strip_prefix(&self.root)
            .ok()
            .filter(|relative| !relative.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| file.file_name().map(PathBuf::from))
            .unwrap_or_else(|| file.to_path_buf());
        let path = normalize_path(&relative);
        tracing::trace!(asset = %path, "asset added to package");
        self.assets.insert(
            path.clone(),
            AssetInfo {
                path,
                source: file.to_path_buf(),
            },
        );
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetInfo> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Archive path for `output`: used as is, or `<output>/<name>.isassetpackage`
    /// when `output` is a directory
    pub fn output_file(&self, output: &Path) -> PathBuf {
        if output.is_dir() {
            output.join(format!("{}.{PACKAGE_FILE_EXTENSION}", self.name))
        } else {
            output.to_path_buf()
        }
    }

    /// Writes every asset into a zip archive; returns the archive path
    pub fn build(&self, output: impl AsRef<Path>) -> Result<PathBuf> {
        let output = self.output_file(output.as_ref());
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = ZipWriter::new(BufWriter::new(File::create(&output)?));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for asset in self.assets.values() {
            let bytes = fs::read(&asset.source)?;
            writer.start_file(asset.path.as_str(), options)?;
            writer.write_all(&bytes)?;
        }
        writer.finish()?.flush()?;

        tracing::info!(
            package = %self.name,
            assets = self.assets.len(),
            output = %output.display(),
            "asset package built"
        );
        Ok(output)
    }

    /// Reads every entry of a package archive, meta sidecars first
    pub fn open(path: impl AsRef<Path>) -> Result<Vec<PackageEntry>> {
        let mut archive = ZipArchive::new(BufReader::new(File::open(path.as_ref())?))?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            if file.enclosed_name().is_none() {
                return Err(ResourceError::PackageError(format!(
                    "entry '{}' escapes the package",
                    file.name()
                )));
            }
            // Declared sizes come from the archive and are not trusted
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            entries.push(PackageEntry {
                path: file.name().to_string(),
                bytes,
            });
        }
        entries.sort_by_key(|entry| !entry.is_meta());
        Ok(entries)
    }

    /// Unpacks a package archive below `dir`; returns the number of files
    pub fn extract_to(path: impl AsRef<Path>, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let entries = Self::open(path)?;
        for entry in &entries {
            let target = dir.join(&entry.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &entry.bytes)?;
        }
        Ok(entries.len())
    }
}

/// True for files that are themselves packages or resource packs
pub fn is_package_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| {
        ext == PACKAGE_FILE_EXTENSION || ext == PACK_FILE_EXTENSION.to_ascii_lowercase()
    })
}
