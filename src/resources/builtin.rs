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

//! Built-in resource kinds: raw binary blobs, UTF-8 text and JSON documents.

use std::any::Any;

use crate::error::{ResourceError, Result};
use crate::resources::{Resource, TypedResource};

/// Binary resource (generic blob)
#[derive(Clone, Debug, Default)]
pub struct BinaryResource {
    data: Vec<u8>,
}

impl BinaryResource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }
}

impl Resource for BinaryResource {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }
    fn memory_size(&self) -> usize {
        self.data.len()
    }
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
    fn load_from_memory(&mut self, bytes: &[u8]) -> Result<()> {
        self.data = bytes.to_vec();
        Ok(())
    }
    fn unload(&mut self) {
        self.data = Vec::new();
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TypedResource for BinaryResource {
    const TYPE_NAME: &'static str = "Binary";
}

/// Text file resource
#[derive(Clone, Debug, Default)]
pub struct TextResource {
    content: String,
}

impl TextResource {
    pub fn new(content: String) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: String) {
        self.content = content;
    }
}

impl Resource for TextResource {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }
    fn memory_size(&self) -> usize {
        self.content.len()
    }
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.content.as_bytes().to_vec())
    }
    fn load_from_memory(&mut self, bytes: &[u8]) -> Result<()> {
        self.content = String::from_utf8(bytes.to_vec()).map_err(|e| {
            ResourceError::DeserializationError(format!("UTF-8 decode error: {e}"))
        })?;
        Ok(())
    }
    fn unload(&mut self) {
        self.content = String::new();
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TypedResource for TextResource {
    const TYPE_NAME: &'static str = "Text";
}

/// JSON document resource
#[derive(Clone, Debug, Default)]
pub struct JsonResource {
    value: serde_json::Value,
}

impl JsonResource {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn set_value(&mut self, value: serde_json::Value) {
        self.value = value;
    }
}

impl Resource for JsonResource {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }
    fn memory_size(&self) -> usize {
        std::mem::size_of_val(&self.value)
    }
    fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.value)
            .map_err(|e| ResourceError::SerializationError(e.to_string()))
    }
    fn load_from_memory(&mut self, bytes: &[u8]) -> Result<()> {
        self.value = serde_json::from_slice(bytes)
            .map_err(|e| ResourceError::DeserializationError(format!("JSON parse error: {e}")))?;
        Ok(())
    }
    fn unload(&mut self) {
        self.value = serde_json::Value::Null;
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TypedResource for JsonResource {
    const TYPE_NAME: &'static str = "Json";
}
