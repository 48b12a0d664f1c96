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

//! Resource Engine - resource lifetime and loading
//!
//! Deduplicated resource store, asynchronous loading with format conversion,
//! offset-indexed resource packs and zip asset packages.

pub mod error;
pub mod package;
pub mod prelude;
pub mod resources;

pub use error::*;
pub use package::*;
pub use resources::*;
