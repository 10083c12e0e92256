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

//! Configuration of the render system.

use serde::{Deserialize, Serialize};

/// Tunables for a [`RenderSystem`](crate::renderer::system::RenderSystem).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use tessera_core::renderer::RenderSystemSettings;
/// let settings = RenderSystemSettings::from_json_str(r#"{ "use_null_contexts": true }"#).unwrap();
/// assert!(settings.use_null_contexts);
/// assert_eq!(settings.uniform_array_max_instances, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSystemSettings {
    /// Lazily create an offscreen context that off-render-thread code can bind
    /// when no other context is available.
    pub use_null_contexts: bool,
    /// Cross-check the state cache against the driver in debug builds.
    pub validate_driver_state: bool,
    /// Use texture-buffer instancing whenever the driver supports it.
    pub prefer_texture_buffer_instancing: bool,
    /// Upper bound on instances per draw call in uniform-array mode.
    pub uniform_array_max_instances: u32,
    /// Instances per frame an instance stream can stage. Also sizes the data
    /// texture of texture-buffer streams.
    pub max_instances_per_frame: u32,
    /// Read texture content back into CPU memory before a context is torn
    /// down when no reload callback is registered.
    pub cache_textures_on_context_loss: bool,
    /// Size in bytes of each buffer allocated by a vertex buffer arena.
    pub vertex_arena_block_size: usize,
}

impl Default for RenderSystemSettings {
    fn default() -> Self {
        Self {
            use_null_contexts: false,
            validate_driver_state: cfg!(debug_assertions),
            prefer_texture_buffer_instancing: true,
            uniform_array_max_instances: 32,
            max_instances_per_frame: 16384,
            cache_textures_on_context_loss: true,
            vertex_arena_block_size: 64 * 1024 * 1024,
        }
    }
}

impl RenderSystemSettings {
    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
