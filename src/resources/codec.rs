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

//! Little-endian speedy helpers shared by every binary record.

use speedy::{Endianness, Readable, Writable};

use crate::error::{ResourceError, Result};

pub(crate) fn encode<T: Writable<Endianness>>(value: &T) -> Result<Vec<u8>> {
    value
        .write_to_vec_with_ctx(Endianness::LittleEndian)
        .map_err(|e| ResourceError::SerializationError(e.to_string()))
}

pub(crate) fn decode<'a, T: Readable<'a, Endianness>>(bytes: &'a [u8]) -> Result<T> {
    T::read_from_buffer_with_ctx(Endianness::LittleEndian, bytes)
        .map_err(|e| ResourceError::DeserializationError(e.to_string()))
}

/// Serialized size of a record
pub(crate) fn encoded_len<T: Writable<Endianness>>(value: &T) -> Result<usize> {
    value
        .bytes_needed()
        .map_err(|e| ResourceError::SerializationError(e.to_string()))
}
