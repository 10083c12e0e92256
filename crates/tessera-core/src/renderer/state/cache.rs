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

use crate::math::{LinearRgba, Rect2D};
use crate::renderer::api::{
    BlendFactor, BufferTarget, Capability, CompareFunction, CullMode, FrontFace, NativeHandle,
    PolygonMode, TextureTarget,
};
use crate::renderer::traits::{BindingQuery, GraphicsDriver};
use std::sync::Arc;

/// Number of texture units tracked per context.
pub const MAX_TEXTURE_UNITS: usize = 16;

/// Number of user clip planes tracked per context.
pub const MAX_CLIP_PLANES: usize = 8;

const TEXTURE_TARGET_COUNT: usize = 2;

fn target_slot(target: TextureTarget) -> usize {
    match target {
        TextureTarget::Texture2D => 0,
        TextureTarget::Texture2DMultisample => 1,
    }
}

/// A full snapshot of the tracked driver state.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuState {
    /// Active texture unit.
    pub active_texture_unit: u32,
    /// Bound texture per unit, then per target.
    pub textures: [[Option<NativeHandle>; TEXTURE_TARGET_COUNT]; MAX_TEXTURE_UNITS],
    /// Bound program.
    pub program: Option<NativeHandle>,
    /// Bound framebuffer (`None` is the default framebuffer).
    pub framebuffer: Option<NativeHandle>,
    /// Bound vertex array.
    pub vertex_array: Option<NativeHandle>,
    /// Bound array buffer.
    pub array_buffer: Option<NativeHandle>,
    /// Bound element array buffer.
    pub element_array_buffer: Option<NativeHandle>,
    /// Bound pixel-unpack buffer.
    pub pixel_unpack_buffer: Option<NativeHandle>,
    /// Bound uniform buffer.
    pub uniform_buffer: Option<NativeHandle>,
    /// Blending enabled.
    pub blend_enabled: bool,
    /// Source and destination blend factors.
    pub blend_factors: (BlendFactor, BlendFactor),
    /// Depth test enabled.
    pub depth_test_enabled: bool,
    /// Depth comparison.
    pub depth_compare: CompareFunction,
    /// Depth writes enabled.
    pub depth_write: bool,
    /// Face culling enabled.
    pub cull_enabled: bool,
    /// Culled faces.
    pub cull_mode: CullMode,
    /// Front-face winding.
    pub front_face: FrontFace,
    /// Scissor test enabled.
    pub scissor_enabled: bool,
    /// Scissor rectangle.
    pub scissor_rect: Rect2D,
    /// Viewport rectangle.
    pub viewport: Rect2D,
    /// Clear color.
    pub clear_color: LinearRgba,
    /// Clear depth.
    pub clear_depth: f32,
    /// Polygon rasterization mode.
    pub polygon_mode: PolygonMode,
    /// Multisample rasterization enabled.
    pub multisample_enabled: bool,
    /// Enabled user clip planes.
    pub clip_planes: [bool; MAX_CLIP_PLANES],
}

impl Default for GpuState {
    fn default() -> Self {
        Self {
            active_texture_unit: 0,
            textures: [[None; TEXTURE_TARGET_COUNT]; MAX_TEXTURE_UNITS],
            program: None,
            framebuffer: None,
            vertex_array: None,
            array_buffer: None,
            element_array_buffer: None,
            pixel_unpack_buffer: None,
            uniform_buffer: None,
            blend_enabled: false,
            blend_factors: (BlendFactor::One, BlendFactor::Zero),
            depth_test_enabled: false,
            depth_compare: CompareFunction::Less,
            depth_write: true,
            cull_enabled: false,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Ccw,
            scissor_enabled: false,
            scissor_rect: Rect2D::default(),
            viewport: Rect2D::default(),
            clear_color: LinearRgba::MAGENTA,
            clear_depth: 1.0,
            polygon_mode: PolygonMode::Fill,
            multisample_enabled: true,
            clip_planes: [false; MAX_CLIP_PLANES],
        }
    }
}

/// Caches driver state for one context and elides redundant driver calls.
///
/// The cache is only correct while every state change goes through it. After
/// the native context is recreated the driver state is unknown, so the owner
/// calls [`GpuStateCache::reset`] on loss and [`GpuStateCache::sync_all`] once
/// the new context is current.
#[derive(Debug)]
pub struct GpuStateCache {
    driver: Arc<dyn GraphicsDriver>,
    state: GpuState,
    /// The element buffer binding belongs to the bound vertex array, so it is
    /// unknown right after a vertex array switch.
    element_buffer_known: bool,
}

macro_rules! cached_capability {
    ($(#[$doc:meta])* $name:ident, $field:ident, $cap:expr) => {
        $(#[$doc])*
        pub fn $name(&mut self, enabled: bool) {
            if self.state.$field != enabled {
                self.state.$field = enabled;
                self.driver.set_capability($cap, enabled);
            }
        }
    };
}

impl GpuStateCache {
    /// Creates a cache holding default values. Nothing is sent to the driver.
    pub fn new(driver: Arc<dyn GraphicsDriver>) -> Self {
        Self {
            driver,
            state: GpuState::default(),
            element_buffer_known: true,
        }
    }

    /// The cached state.
    pub fn state(&self) -> &GpuState {
        &self.state
    }

    /// Forgets everything and returns to defaults without touching the driver.
    pub fn reset(&mut self) {
        self.state = GpuState::default();
        self.element_buffer_known = true;
    }

    // --- Bindings ---

    /// Selects the active texture unit.
    pub fn set_active_texture_unit(&mut self, unit: u32) {
        debug_assert!((unit as usize) < MAX_TEXTURE_UNITS, "texture unit {unit} out of range");
        if self.state.active_texture_unit != unit {
            self.state.active_texture_unit = unit;
            self.driver.active_texture(unit);
        }
    }

    /// Binds `texture` to `target` on the active unit.
    pub fn bind_texture(&mut self, target: TextureTarget, texture: Option<NativeHandle>) {
        let unit = self.state.active_texture_unit as usize;
        let slot = &mut self.state.textures[unit][target_slot(target)];
        if *slot != texture {
            *slot = texture;
            self.driver.bind_texture(target, texture);
        }
    }

    /// Selects `unit` and binds `texture` on it.
    pub fn bind_texture_to_unit(&mut self, unit: u32, target: TextureTarget, texture: Option<NativeHandle>) {
        self.set_active_texture_unit(unit);
        self.bind_texture(target, texture);
    }

    /// Texture bound to `target` on `unit`.
    pub fn bound_texture(&self, unit: u32, target: TextureTarget) -> Option<NativeHandle> {
        self.state
            .textures
            .get(unit as usize)
            .and_then(|slots| slots[target_slot(target)])
    }

    /// Clears every unit binding that refers to `texture`. Called when a
    /// texture is deleted so the name can be reused safely.
    pub fn forget_texture(&mut self, texture: NativeHandle) {
        for slots in self.state.textures.iter_mut() {
            for slot in slots.iter_mut() {
                if *slot == Some(texture) {
                    *slot = None;
                }
            }
        }
    }

    /// Drops the program binding if it refers to `program`.
    pub fn forget_program(&mut self, program: NativeHandle) {
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    /// Drops the vertex array binding if it refers to `vertex_array`.
    pub fn forget_vertex_array(&mut self, vertex_array: NativeHandle) {
        if self.state.vertex_array == Some(vertex_array) {
            self.state.vertex_array = None;
            self.element_buffer_known = false;
        }
    }

    /// Drops the framebuffer binding if it refers to `framebuffer`.
    pub fn forget_framebuffer(&mut self, framebuffer: NativeHandle) {
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
    }

    /// Drops every buffer binding that refers to `buffer`.
    pub fn forget_buffer(&mut self, buffer: NativeHandle) {
        for slot in [
            &mut self.state.array_buffer,
            &mut self.state.element_array_buffer,
            &mut self.state.pixel_unpack_buffer,
            &mut self.state.uniform_buffer,
        ] {
            if *slot == Some(buffer) {
                *slot = None;
            }
        }
    }

    /// Binds a program.
    pub fn use_program(&mut self, program: Option<NativeHandle>) {
        if self.state.program != program {
            self.state.program = program;
            self.driver.use_program(program);
        }
    }

    /// Binds a framebuffer.
    pub fn bind_framebuffer(&mut self, framebuffer: Option<NativeHandle>) {
        if self.state.framebuffer != framebuffer {
            self.state.framebuffer = framebuffer;
            self.driver.bind_framebuffer(framebuffer);
        }
    }

    /// Binds a vertex array.
    pub fn bind_vertex_array(&mut self, vertex_array: Option<NativeHandle>) {
        if self.state.vertex_array != vertex_array {
            self.state.vertex_array = vertex_array;
            self.element_buffer_known = false;
            self.driver.bind_vertex_array(vertex_array);
        }
    }

    /// Binds a buffer to `target`.
    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<NativeHandle>) {
        let known = target != BufferTarget::ElementArray || self.element_buffer_known;
        let slot = match target {
            BufferTarget::Array => &mut self.state.array_buffer,
            BufferTarget::ElementArray => &mut self.state.element_array_buffer,
            BufferTarget::PixelUnpack => &mut self.state.pixel_unpack_buffer,
            BufferTarget::Uniform => &mut self.state.uniform_buffer,
        };
        if !known || *slot != buffer {
            *slot = buffer;
            if target == BufferTarget::ElementArray {
                self.element_buffer_known = true;
            }
            self.driver.bind_buffer(target, buffer);
        }
    }

    // --- Fixed-function state ---

    cached_capability!(
        /// Enables or disables blending.
        set_blend_enabled, blend_enabled, Capability::Blend
    );
    cached_capability!(
        /// Enables or disables the depth test.
        set_depth_test_enabled, depth_test_enabled, Capability::DepthTest
    );
    cached_capability!(
        /// Enables or disables face culling.
        set_cull_enabled, cull_enabled, Capability::CullFace
    );
    cached_capability!(
        /// Enables or disables the scissor test.
        set_scissor_enabled, scissor_enabled, Capability::ScissorTest
    );
    cached_capability!(
        /// Enables or disables multisample rasterization.
        set_multisample_enabled, multisample_enabled, Capability::Multisample
    );

    /// Sets both blend factors as one slot.
    pub fn set_blend_factors(&mut self, src: BlendFactor, dst: BlendFactor) {
        if self.state.blend_factors != (src, dst) {
            self.state.blend_factors = (src, dst);
            self.driver.blend_func(src, dst);
        }
    }

    /// Sets the depth comparison.
    pub fn set_depth_compare(&mut self, compare: CompareFunction) {
        if self.state.depth_compare != compare {
            self.state.depth_compare = compare;
            self.driver.depth_func(compare);
        }
    }

    /// Enables or disables depth writes.
    pub fn set_depth_write(&mut self, write: bool) {
        if self.state.depth_write != write {
            self.state.depth_write = write;
            self.driver.depth_mask(write);
        }
    }

    /// Sets the culled faces. [`CullMode::Off`] disables culling instead.
    pub fn set_cull_mode(&mut self, mode: CullMode) {
        if mode == CullMode::Off {
            self.set_cull_enabled(false);
            return;
        }
        self.set_cull_enabled(true);
        if self.state.cull_mode != mode {
            self.state.cull_mode = mode;
            self.driver.cull_face(mode);
        }
    }

    /// Sets the front-face winding.
    pub fn set_front_face(&mut self, face: FrontFace) {
        if self.state.front_face != face {
            self.state.front_face = face;
            self.driver.front_face(face);
        }
    }

    /// Sets the scissor rectangle.
    pub fn set_scissor_rect(&mut self, rect: Rect2D) {
        if self.state.scissor_rect != rect {
            self.state.scissor_rect = rect;
            self.driver.scissor(rect);
        }
    }

    /// Sets the viewport rectangle.
    pub fn set_viewport(&mut self, rect: Rect2D) {
        if self.state.viewport != rect {
            self.state.viewport = rect;
            self.driver.viewport(rect);
        }
    }

    /// Sets the clear color.
    pub fn set_clear_color(&mut self, color: LinearRgba) {
        if self.state.clear_color != color {
            self.state.clear_color = color;
            self.driver.clear_color(color);
        }
    }

    /// Sets the clear depth.
    pub fn set_clear_depth(&mut self, depth: f32) {
        if self.state.clear_depth != depth {
            self.state.clear_depth = depth;
            self.driver.clear_depth(depth);
        }
    }

    /// Selects fill or wireframe rasterization.
    pub fn set_polygon_mode(&mut self, mode: PolygonMode) {
        if self.state.polygon_mode != mode {
            self.state.polygon_mode = mode;
            self.driver.polygon_mode(mode);
        }
    }

    /// Enables or disables user clip plane `index`.
    pub fn set_clip_plane_enabled(&mut self, index: usize, enabled: bool) {
        let Some(slot) = self.state.clip_planes.get_mut(index) else {
            log::warn!("GpuStateCache: clip plane {index} out of range, ignoring.");
            return;
        };
        if *slot != enabled {
            *slot = enabled;
            self.driver
                .set_capability(Capability::ClipDistance(index as u8), enabled);
        }
    }

    /// Applies every field of `target` through the cached setters, so only the
    /// differences reach the driver.
    pub fn apply(&mut self, target: &GpuState) {
        for unit in 0..MAX_TEXTURE_UNITS {
            for target_kind in [TextureTarget::Texture2D, TextureTarget::Texture2DMultisample] {
                let wanted = target.textures[unit][target_slot(target_kind)];
                if self.state.textures[unit][target_slot(target_kind)] != wanted {
                    self.bind_texture_to_unit(unit as u32, target_kind, wanted);
                }
            }
        }
        self.set_active_texture_unit(target.active_texture_unit);
        self.use_program(target.program);
        self.bind_framebuffer(target.framebuffer);
        self.bind_vertex_array(target.vertex_array);
        self.bind_buffer(BufferTarget::Array, target.array_buffer);
        self.bind_buffer(BufferTarget::PixelUnpack, target.pixel_unpack_buffer);
        self.bind_buffer(BufferTarget::Uniform, target.uniform_buffer);
        self.set_blend_enabled(target.blend_enabled);
        self.set_blend_factors(target.blend_factors.0, target.blend_factors.1);
        self.set_depth_test_enabled(target.depth_test_enabled);
        self.set_depth_compare(target.depth_compare);
        self.set_depth_write(target.depth_write);
        self.set_cull_enabled(target.cull_enabled);
        if target.cull_mode != CullMode::Off && self.state.cull_mode != target.cull_mode {
            self.state.cull_mode = target.cull_mode;
            self.driver.cull_face(target.cull_mode);
        }
        self.set_front_face(target.front_face);
        self.set_scissor_enabled(target.scissor_enabled);
        self.set_scissor_rect(target.scissor_rect);
        self.set_viewport(target.viewport);
        self.set_clear_color(target.clear_color);
        self.set_clear_depth(target.clear_depth);
        self.set_polygon_mode(target.polygon_mode);
        self.set_multisample_enabled(target.multisample_enabled);
        for (index, enabled) in target.clip_planes.iter().enumerate() {
            self.set_clip_plane_enabled(index, *enabled);
        }
    }

    /// Re-applies every slot unconditionally.
    ///
    /// Used right after a native context is (re)created, when the real driver
    /// state no longer matches the cache.
    pub fn sync_all(&mut self) {
        let d = &self.driver;
        let s = &self.state;

        for (unit, slots) in s.textures.iter().enumerate() {
            d.active_texture(unit as u32);
            d.bind_texture(TextureTarget::Texture2D, slots[0]);
            d.bind_texture(TextureTarget::Texture2DMultisample, slots[1]);
        }
        d.active_texture(s.active_texture_unit);
        d.use_program(s.program);
        d.bind_framebuffer(s.framebuffer);
        d.bind_vertex_array(s.vertex_array);
        d.bind_buffer(BufferTarget::Array, s.array_buffer);
        d.bind_buffer(BufferTarget::ElementArray, s.element_array_buffer);
        d.bind_buffer(BufferTarget::PixelUnpack, s.pixel_unpack_buffer);
        d.bind_buffer(BufferTarget::Uniform, s.uniform_buffer);

        d.set_capability(Capability::Blend, s.blend_enabled);
        d.blend_func(s.blend_factors.0, s.blend_factors.1);
        d.set_capability(Capability::DepthTest, s.depth_test_enabled);
        d.depth_func(s.depth_compare);
        d.depth_mask(s.depth_write);
        d.set_capability(Capability::CullFace, s.cull_enabled);
        if s.cull_mode != CullMode::Off {
            d.cull_face(s.cull_mode);
        }
        d.front_face(s.front_face);
        d.set_capability(Capability::ScissorTest, s.scissor_enabled);
        d.scissor(s.scissor_rect);
        d.viewport(s.viewport);
        d.clear_color(s.clear_color);
        d.clear_depth(s.clear_depth);
        d.polygon_mode(s.polygon_mode);
        d.set_capability(Capability::Multisample, s.multisample_enabled);
        for (index, enabled) in s.clip_planes.iter().enumerate() {
            d.set_capability(Capability::ClipDistance(index as u8), *enabled);
        }
        self.element_buffer_known = true;
        log::trace!("GpuStateCache: full state sync issued.");
    }

    /// Compares the bindings the driver can report against the cache and
    /// returns the ones that disagree.
    pub fn mismatches(&self) -> Vec<BindingQuery> {
        let raw = |handle: Option<NativeHandle>| handle.map_or(0, NativeHandle::get);
        let expected = [
            (BindingQuery::ActiveTextureUnit, self.state.active_texture_unit),
            (BindingQuery::Program, raw(self.state.program)),
            (BindingQuery::Framebuffer, raw(self.state.framebuffer)),
            (BindingQuery::VertexArray, raw(self.state.vertex_array)),
        ];
        expected
            .into_iter()
            .filter(|(query, value)| {
                self.driver
                    .query_binding(*query)
                    .is_some_and(|actual| actual != *value)
            })
            .map(|(query, _)| query)
            .collect()
    }

    /// Debug check that the cache matches the driver. A mismatch means some
    /// code changed driver state behind the cache's back.
    pub fn validate_against_driver(&self) {
        if cfg!(debug_assertions) {
            let mismatches = self.mismatches();
            if !mismatches.is_empty() {
                log::error!("GpuStateCache: cache disagrees with the driver on {mismatches:?}");
            }
            debug_assert!(mismatches.is_empty(), "state cache out of sync: {mismatches:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::HeadlessDriver;

    fn cache_with_current_context() -> (Arc<HeadlessDriver>, GpuStateCache) {
        let driver = Arc::new(HeadlessDriver::new());
        let native = driver
            .create_context(None, &ContextConfig::default())
            .unwrap();
        assert!(driver.make_current(Some(native), None));
        driver.reset_counters();
        let cache = GpuStateCache::new(driver.clone());
        (driver, cache)
    }

    #[test]
    fn test_identical_setter_issues_one_driver_call() {
        let (driver, mut cache) = cache_with_current_context();

        cache.set_blend_enabled(true);
        cache.set_blend_enabled(true);
        cache.set_blend_factors(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        cache.set_blend_factors(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

        assert_eq!(driver.call_count("set_capability"), 1);
        assert_eq!(driver.call_count("blend_func"), 1);
    }

    #[test]
    fn test_default_value_is_elided() {
        let (driver, mut cache) = cache_with_current_context();
        cache.set_depth_write(true);
        cache.set_active_texture_unit(0);
        assert_eq!(driver.total_calls(), 0);
    }

    #[test]
    fn test_texture_binding_is_per_unit() {
        let (driver, mut cache) = cache_with_current_context();
        let tex = NativeHandle::new(3);

        cache.bind_texture_to_unit(0, TextureTarget::Texture2D, tex);
        cache.bind_texture_to_unit(1, TextureTarget::Texture2D, tex);
        cache.bind_texture_to_unit(1, TextureTarget::Texture2D, tex);

        assert_eq!(driver.call_count("bind_texture"), 2);
        assert_eq!(driver.call_count("active_texture"), 1);
        assert_eq!(cache.bound_texture(0, TextureTarget::Texture2D), tex);
        assert_eq!(cache.bound_texture(1, TextureTarget::Texture2D), tex);
    }

    #[test]
    fn test_element_buffer_rebinds_after_vertex_array_switch() {
        let (driver, mut cache) = cache_with_current_context();
        let buffer = NativeHandle::new(4);

        cache.bind_buffer(BufferTarget::ElementArray, buffer);
        cache.bind_vertex_array(NativeHandle::new(2));
        cache.bind_buffer(BufferTarget::ElementArray, buffer);

        assert_eq!(driver.call_count("bind_buffer"), 2);
    }

    #[test]
    fn test_cull_mode_off_disables_culling() {
        let (driver, mut cache) = cache_with_current_context();
        cache.set_cull_mode(CullMode::Front);
        assert!(cache.state().cull_enabled);
        cache.set_cull_mode(CullMode::Off);
        assert!(!cache.state().cull_enabled);
        assert_eq!(cache.state().cull_mode, CullMode::Front);
        assert_eq!(driver.call_count("cull_face"), 1);
    }

    #[test]
    fn test_sync_all_always_reaches_driver() {
        let (driver, mut cache) = cache_with_current_context();
        cache.sync_all();
        let first = driver.total_calls();
        cache.sync_all();
        assert!(first > 20);
        assert_eq!(driver.total_calls(), first * 2);
    }

    #[test]
    fn test_reset_forgets_without_driver_calls() {
        let (driver, mut cache) = cache_with_current_context();
        cache.set_clear_color(LinearRgba::BLACK);
        let calls = driver.total_calls();
        cache.reset();
        assert_eq!(cache.state(), &GpuState::default());
        assert_eq!(driver.total_calls(), calls);
    }

    #[test]
    fn test_apply_only_sends_differences() {
        let (driver, mut cache) = cache_with_current_context();
        let mut target = GpuState::default();
        target.depth_test_enabled = true;
        target.viewport = Rect2D::new(0, 0, 640, 480);

        cache.apply(&target);

        assert_eq!(cache.state(), &target);
        assert_eq!(driver.total_calls(), 2);
    }

    #[test]
    fn test_cache_matches_driver_bindings() {
        let (_driver, mut cache) = cache_with_current_context();
        cache.set_active_texture_unit(3);
        cache.bind_framebuffer(None);
        assert!(cache.mismatches().is_empty());
    }
}
