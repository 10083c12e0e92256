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

use crate::math::{Extent2D, LinearRgba, Origin2D, Rect2D};
use crate::renderer::api::{
    BlendFactor, BufferTarget, BufferUsage, Capability, CompareFunction, CullMode,
    DriverCapabilities, FrontFace, IndexFormat, NativeContextHandle, NativeHandle, PixelFormat,
    PixelSource, PolygonMode, PrimitiveTopology, ProgramSource, SurfaceId, TextureParameter,
    TextureTarget, UniformData, UniformLocation,
};
use crate::renderer::context::ContextConfig;
use crate::renderer::error::DriverError;
use std::fmt::Debug;

/// A binding the driver can be asked about, used to cross-check the state cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingQuery {
    /// Index of the active texture unit.
    ActiveTextureUnit,
    /// Name of the bound program.
    Program,
    /// Name of the bound framebuffer.
    Framebuffer,
    /// Name of the bound vertex array.
    VertexArray,
}

/// A trait representing a stateful, OpenGL-family graphics driver.
///
/// This is the only seam between the rendering layer and a native graphics API.
/// Every call other than the context-management group applies to the context
/// current on the calling thread, exactly like the native API it wraps.
///
/// Implementations must be thread-safe (`Send + Sync`); callers serialize
/// access through the render system's render lock. Hot-path calls report
/// failure through `bool`/`Option` returns instead of `Result`.
pub trait GraphicsDriver: Send + Sync + Debug {
    // --- Context management ---

    /// Creates a native context, window-bound when `surface` is set and
    /// offscreen otherwise.
    fn create_context(
        &self,
        surface: Option<SurfaceId>,
        config: &ContextConfig,
    ) -> Result<NativeContextHandle, DriverError>;

    /// Destroys a native context and every object it owns.
    fn destroy_context(&self, context: NativeContextHandle);

    /// Makes `context` current on the calling thread, optionally targeting
    /// `surface`. `None` unbinds. Returns `false` if the driver refused.
    fn make_current(&self, context: Option<NativeContextHandle>, surface: Option<SurfaceId>) -> bool;

    /// Probes the limits and optional features of the current context.
    fn capabilities(&self) -> DriverCapabilities;

    // --- Fixed-function state ---

    /// Selects the texture unit affected by [`GraphicsDriver::bind_texture`].
    fn active_texture(&self, unit: u32);
    /// Binds a texture to the active unit.
    fn bind_texture(&self, target: TextureTarget, texture: Option<NativeHandle>);
    /// Binds a program.
    fn use_program(&self, program: Option<NativeHandle>);
    /// Binds a framebuffer; `None` selects the default framebuffer.
    fn bind_framebuffer(&self, framebuffer: Option<NativeHandle>);
    /// Binds a vertex array.
    fn bind_vertex_array(&self, vertex_array: Option<NativeHandle>);
    /// Binds a buffer to a target.
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<NativeHandle>);
    /// Enables or disables a capability.
    fn set_capability(&self, capability: Capability, enabled: bool);
    /// Sets the blend factors.
    fn blend_func(&self, src: BlendFactor, dst: BlendFactor);
    /// Sets the depth comparison.
    fn depth_func(&self, compare: CompareFunction);
    /// Enables or disables depth writes.
    fn depth_mask(&self, write: bool);
    /// Selects the culled faces. Never called with [`CullMode::Off`].
    fn cull_face(&self, mode: CullMode);
    /// Selects the front-face winding.
    fn front_face(&self, face: FrontFace);
    /// Selects the polygon rasterization mode.
    fn polygon_mode(&self, mode: PolygonMode);
    /// Sets the viewport rectangle.
    fn viewport(&self, rect: Rect2D);
    /// Sets the scissor rectangle.
    fn scissor(&self, rect: Rect2D);
    /// Sets the clear color.
    fn clear_color(&self, color: LinearRgba);
    /// Sets the clear depth.
    fn clear_depth(&self, depth: f32);
    /// Clears the bound framebuffer.
    fn clear(&self, color: bool, depth: bool);

    // --- Textures ---

    /// Generates a texture name.
    fn create_texture(&self) -> Option<NativeHandle>;
    /// Deletes a texture.
    fn delete_texture(&self, texture: NativeHandle);
    /// Returns `true` if `texture` names a live texture in the current context.
    fn is_texture(&self, texture: NativeHandle) -> bool;
    /// Defines mip `level` of the texture bound to `target`, optionally with data.
    fn tex_image_2d(
        &self,
        target: TextureTarget,
        level: u32,
        format: PixelFormat,
        extent: Extent2D,
        data: Option<&[u8]>,
    );
    /// Allocates storage for the bound multisampled texture. Returns `false`
    /// when unsupported.
    fn tex_image_2d_multisample(&self, samples: u32, format: PixelFormat, extent: Extent2D) -> bool;
    /// Replaces a region of mip `level` of the bound texture.
    fn tex_sub_image_2d(
        &self,
        target: TextureTarget,
        level: u32,
        origin: Origin2D,
        extent: Extent2D,
        format: PixelFormat,
        source: PixelSource<'_>,
    );
    /// Sets a parameter of the bound texture.
    fn tex_parameter(&self, target: TextureTarget, parameter: TextureParameter);
    /// Regenerates the mip chain of the bound texture.
    fn generate_mipmap(&self, target: TextureTarget);
    /// Reads mip `level` of the bound texture into `out`. Returns `false` when
    /// direct image readback is unsupported.
    fn get_tex_image(&self, target: TextureTarget, level: u32, format: PixelFormat, out: &mut [u8]) -> bool;

    // --- Framebuffers ---

    /// Generates a framebuffer name.
    fn create_framebuffer(&self) -> Option<NativeHandle>;
    /// Deletes a framebuffer.
    fn delete_framebuffer(&self, framebuffer: NativeHandle);
    /// Attaches a texture level as color attachment 0 of the bound framebuffer.
    /// Returns `true` if the framebuffer is complete afterwards.
    fn framebuffer_texture_2d(&self, texture: Option<NativeHandle>, level: u32) -> bool;
    /// Reads a rectangle of the bound framebuffer's color attachment.
    fn read_pixels(&self, rect: Rect2D, format: PixelFormat, out: &mut [u8]);

    // --- Buffers ---

    /// Generates a buffer name.
    fn create_buffer(&self) -> Option<NativeHandle>;
    /// Deletes a buffer.
    fn delete_buffer(&self, buffer: NativeHandle);
    /// (Re)allocates the buffer bound to `target`, optionally initializing it.
    fn buffer_data(&self, target: BufferTarget, size: usize, data: Option<&[u8]>, usage: BufferUsage);
    /// Overwrites part of the buffer bound to `target`.
    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]);
    /// Maps a range of the buffer bound to `target`, lets `write` fill it, then
    /// unmaps. Returns `false` when mapping is unsupported or fails.
    fn map_buffer_range(
        &self,
        target: BufferTarget,
        offset: usize,
        length: usize,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> bool;

    // --- Vertex arrays ---

    /// Generates a vertex array name.
    fn create_vertex_array(&self) -> Option<NativeHandle>;
    /// Deletes a vertex array.
    fn delete_vertex_array(&self, vertex_array: NativeHandle);
    /// Describes a float attribute sourced from the bound array buffer.
    fn vertex_attrib_pointer(&self, location: u32, components: u8, stride: u32, offset: u32);
    /// Enables an attribute location on the bound vertex array.
    fn enable_vertex_attrib_array(&self, location: u32);

    // --- Programs ---

    /// Compiles and links a program.
    fn create_program(&self, source: &ProgramSource) -> Result<NativeHandle, DriverError>;
    /// Deletes a program.
    fn delete_program(&self, program: NativeHandle);
    /// Looks up an active uniform. `None` if it does not exist or was optimized out.
    fn uniform_location(&self, program: NativeHandle, name: &str) -> Option<UniformLocation>;
    /// Uploads a uniform of the bound program.
    fn upload_uniform(&self, location: UniformLocation, data: UniformData<'_>);

    // --- Drawing ---

    /// Issues an indexed, instanced draw using the bound vertex array.
    fn draw_elements_instanced(
        &self,
        topology: PrimitiveTopology,
        index_count: u32,
        index_format: IndexFormat,
        instance_count: u32,
    );

    // --- Validation ---

    /// Reads back a binding from the driver. Slow; debug validation only.
    fn query_binding(&self, query: BindingQuery) -> Option<u32>;
}
