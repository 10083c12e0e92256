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

//! # Tessera Core
//!
//! Rendering backend layer sitting between a scene renderer and a stateful,
//! OpenGL-family graphics driver. It owns the rendering context lifecycle, a
//! redundant-call-eliding state cache, pooled GPU objects, and the per-instance
//! data streams used for instanced draws, and it recovers all of them when the
//! native context is lost and recreated.

#![warn(missing_docs)]

pub mod event;
pub mod math;
pub mod renderer;

pub use renderer::system::RenderSystem;
