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

//! Capability probe results for a driver context.

/// Limits and optional features of the current driver context.
///
/// Probed once when a context finishes setup. Every optional feature has a
/// degraded fallback path in the resource layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverCapabilities {
    /// Largest supported texture edge, in texels.
    pub max_texture_size: u32,
    /// Number of texture image units available to fragment programs.
    pub max_texture_units: u32,
    /// Number of `vec4` uniform slots available to vertex programs.
    pub max_vertex_uniform_vectors: u32,
    /// Maximum anisotropic filtering level, `1.0` when unsupported.
    pub max_anisotropy: f32,
    /// Number of user clip distances.
    pub max_clip_planes: u32,
    /// Float textures can be sampled with integer texel fetches from vertex
    /// programs, which enables texture-buffer instancing.
    pub texture_buffer_instancing: bool,
    /// Buffers can be mapped into client memory.
    pub buffer_mapping: bool,
    /// Texture images can be read back directly, without a framebuffer.
    pub texture_image_readback: bool,
    /// Multisampled textures can be created.
    pub multisample_textures: bool,
}

impl DriverCapabilities {
    /// A minimal baseline every supported driver satisfies.
    pub const BASELINE: Self = Self {
        max_texture_size: 2048,
        max_texture_units: 8,
        max_vertex_uniform_vectors: 128,
        max_anisotropy: 1.0,
        max_clip_planes: 1,
        texture_buffer_instancing: false,
        buffer_mapping: false,
        texture_image_readback: false,
        multisample_textures: false,
    };
}

impl Default for DriverCapabilities {
    fn default() -> Self {
        Self::BASELINE
    }
}
