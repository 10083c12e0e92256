// Copyright 2025 eraflo
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

//! In-process mirror of the driver's mutable global state.
//!
//! Every rendering context owns one [`GpuStateCache`]. Setters compare against
//! the cached value and only reach the driver when the value changes, which
//! removes the redundant state calls that dominate naive draw submission.

mod cache;

pub use self::cache::{GpuState, GpuStateCache, MAX_CLIP_PLANES, MAX_TEXTURE_UNITS};
