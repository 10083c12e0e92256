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

//! A software reference driver.
//!
//! [`HeadlessDriver`] implements [`GraphicsDriver`](crate::renderer::traits::GraphicsDriver)
//! entirely in memory. Each native context owns its own object namespace, so
//! destroying a context really discards its textures and buffers, which makes
//! the driver suitable for exercising context-loss recovery. Every call is
//! counted, so tests can assert on redundant-call elision.

mod driver;

pub use self::driver::{DrawRecord, HeadlessDriver, ObjectCounts, RecordedUniform};
