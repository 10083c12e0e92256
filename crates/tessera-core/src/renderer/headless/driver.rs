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
    PixelSheet, PixelSource, PolygonMode, PrimitiveTopology, ProgramSource, SurfaceId,
    TextureParameter, TextureTarget, UniformData, UniformLocation, UniformValue,
};
use crate::renderer::context::ContextConfig;
use crate::renderer::error::DriverError;
use crate::renderer::traits::{BindingQuery, GraphicsDriver};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// A uniform value as last uploaded to a headless program.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedUniform {
    /// A single value.
    Value(UniformValue),
    /// A `vec4` array.
    Vec4Array(Vec<[f32; 4]>),
}

/// One recorded instanced draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    /// Program bound at draw time.
    pub program: Option<NativeHandle>,
    /// Vertex array bound at draw time.
    pub vertex_array: Option<NativeHandle>,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Number of indices.
    pub index_count: u32,
    /// Number of instances.
    pub instance_count: u32,
}

/// Live object counts of one headless context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectCounts {
    /// Live textures.
    pub textures: usize,
    /// Live buffers.
    pub buffers: usize,
    /// Live vertex arrays.
    pub vertex_arrays: usize,
    /// Live programs.
    pub programs: usize,
    /// Live framebuffers.
    pub framebuffers: usize,
}

#[derive(Debug, Default)]
struct TextureObject {
    target: Option<TextureTarget>,
    levels: BTreeMap<u32, PixelSheet>,
    samples: u32,
    parameters: Vec<TextureParameter>,
}

#[derive(Debug, Default)]
struct ProgramObject {
    uniforms: Vec<String>,
    values: HashMap<u32, RecordedUniform>,
}

#[derive(Debug, Default)]
struct Bindings {
    active_unit: u32,
    textures: HashMap<(u32, TextureTarget), u32>,
    program: Option<u32>,
    framebuffer: Option<u32>,
    vertex_array: Option<u32>,
    buffers: HashMap<BufferTarget, u32>,
}

#[derive(Debug, Default)]
struct ContextObjects {
    next_name: u32,
    textures: HashMap<u32, TextureObject>,
    buffers: HashMap<u32, Vec<u8>>,
    vertex_arrays: HashMap<u32, HashSet<u32>>,
    framebuffers: HashMap<u32, Option<(u32, u32)>>,
    programs: HashMap<u32, ProgramObject>,
    bindings: Bindings,
    enabled: HashSet<Capability>,
    draws: Vec<DrawRecord>,
}

impl ContextObjects {
    fn allocate_name(&mut self) -> Option<NativeHandle> {
        self.next_name += 1;
        NativeHandle::new(self.next_name)
    }

    fn bound_texture(&mut self, target: TextureTarget) -> Option<&mut TextureObject> {
        let name = *self
            .bindings
            .textures
            .get(&(self.bindings.active_unit, target))?;
        self.textures.get_mut(&name)
    }

    fn bound_buffer(&mut self, target: BufferTarget) -> Option<&mut Vec<u8>> {
        let name = *self.bindings.buffers.get(&target)?;
        self.buffers.get_mut(&name)
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    contexts: HashMap<NativeContextHandle, ContextObjects>,
    current: HashMap<ThreadId, NativeContextHandle>,
}

/// An in-memory implementation of [`GraphicsDriver`].
#[derive(Debug)]
pub struct HeadlessDriver {
    state: Mutex<HeadlessState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    capabilities: Mutex<DriverCapabilities>,
    fail_next_make_current: AtomicBool,
    fail_next_context_creation: AtomicBool,
    next_context: AtomicU64,
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDriver {
    /// Capabilities reported by [`HeadlessDriver::new`]: every optional feature
    /// enabled.
    pub const FULL_CAPABILITIES: DriverCapabilities = DriverCapabilities {
        max_texture_size: 8192,
        max_texture_units: 16,
        max_vertex_uniform_vectors: 1024,
        max_anisotropy: 16.0,
        max_clip_planes: 8,
        texture_buffer_instancing: true,
        buffer_mapping: true,
        texture_image_readback: true,
        multisample_textures: true,
    };

    /// Creates a driver reporting [`HeadlessDriver::FULL_CAPABILITIES`].
    pub fn new() -> Self {
        Self::with_capabilities(Self::FULL_CAPABILITIES)
    }

    /// Creates a driver reporting `capabilities`.
    pub fn with_capabilities(capabilities: DriverCapabilities) -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
            calls: Mutex::new(HashMap::new()),
            capabilities: Mutex::new(capabilities),
            fail_next_make_current: AtomicBool::new(false),
            fail_next_context_creation: AtomicBool::new(false),
            next_context: AtomicU64::new(1),
        }
    }

    /// Changes the capabilities reported from now on.
    pub fn set_capabilities(&self, capabilities: DriverCapabilities) {
        *self.capabilities.lock() = capabilities;
    }

    // --- Call accounting ---

    fn record(&self, name: &'static str) {
        *self.calls.lock().entry(name).or_insert(0) += 1;
    }

    /// Number of calls of the driver method `name` since the last reset.
    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().get(name).copied().unwrap_or(0)
    }

    /// Number of driver calls of any kind since the last reset.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Zeroes every call counter.
    pub fn reset_counters(&self) {
        self.calls.lock().clear();
    }

    // --- Fault injection ---

    /// Makes the next `make_current` call fail.
    pub fn fail_next_make_current(&self) {
        self.fail_next_make_current.store(true, Ordering::SeqCst);
    }

    /// Makes the next `create_context` call fail.
    pub fn fail_next_context_creation(&self) {
        self.fail_next_context_creation.store(true, Ordering::SeqCst);
    }

    // --- Inspection ---

    fn with_current<R>(&self, f: impl FnOnce(&mut ContextObjects) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let native = *state.current.get(&thread::current().id())?;
        state.contexts.get_mut(&native).map(f)
    }

    /// Number of live native contexts.
    pub fn live_context_count(&self) -> usize {
        self.state.lock().contexts.len()
    }

    /// Native context current on the calling thread.
    pub fn current_native(&self) -> Option<NativeContextHandle> {
        self.state
            .lock()
            .current
            .get(&thread::current().id())
            .copied()
    }

    /// Live object counts of the current context.
    pub fn object_counts(&self) -> ObjectCounts {
        self.with_current(|objects| ObjectCounts {
            textures: objects.textures.len(),
            buffers: objects.buffers.len(),
            vertex_arrays: objects.vertex_arrays.len(),
            programs: objects.programs.len(),
            framebuffers: objects.framebuffers.len(),
        })
        .unwrap_or_default()
    }

    /// Copy of mip `level` of `texture` in the current context.
    pub fn texture_image(&self, texture: NativeHandle, level: u32) -> Option<PixelSheet> {
        self.with_current(|objects| {
            objects
                .textures
                .get(&texture.get())
                .and_then(|t| t.levels.get(&level).cloned())
        })
        .flatten()
    }

    /// Number of defined mip levels of `texture` in the current context.
    pub fn texture_level_count(&self, texture: NativeHandle) -> usize {
        self.with_current(|objects| {
            objects
                .textures
                .get(&texture.get())
                .map_or(0, |t| t.levels.len())
        })
        .unwrap_or(0)
    }

    /// The last value set for a parameter of the same kind as `probe`.
    pub fn texture_parameter(&self, texture: NativeHandle, probe: TextureParameter) -> Option<TextureParameter> {
        self.with_current(|objects| {
            objects.textures.get(&texture.get()).and_then(|t| {
                t.parameters
                    .iter()
                    .rev()
                    .find(|p| std::mem::discriminant(*p) == std::mem::discriminant(&probe))
                    .copied()
            })
        })
        .flatten()
    }

    /// Contents of `buffer` in the current context.
    pub fn buffer_contents(&self, buffer: NativeHandle) -> Option<Vec<u8>> {
        self.with_current(|objects| objects.buffers.get(&buffer.get()).cloned())
            .flatten()
    }

    /// Enabled attribute locations of `vertex_array` in the current context.
    pub fn enabled_attributes(&self, vertex_array: NativeHandle) -> Vec<u32> {
        let mut locations: Vec<u32> = self
            .with_current(|objects| {
                objects
                    .vertex_arrays
                    .get(&vertex_array.get())
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        locations.sort_unstable();
        locations
    }

    /// Last value uploaded to uniform `name` of `program` in the current context.
    pub fn uniform_value(&self, program: NativeHandle, name: &str) -> Option<RecordedUniform> {
        self.with_current(|objects| {
            let program = objects.programs.get(&program.get())?;
            let location = program.uniforms.iter().position(|u| u == name)? as u32;
            program.values.get(&location).cloned()
        })
        .flatten()
    }

    /// Draws recorded in the current context.
    pub fn draw_calls(&self) -> Vec<DrawRecord> {
        self.with_current(|objects| objects.draws.clone())
            .unwrap_or_default()
    }

    /// Whether `capability` is enabled in the current context.
    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.with_current(|objects| objects.enabled.contains(&capability))
            .unwrap_or(false)
    }
}

fn parse_uniform_names(source: &ProgramSource) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.vertex.lines().chain(source.fragment.lines()) {
        let line = line.trim();
        let Some(declaration) = line.strip_prefix("uniform ") else {
            continue;
        };
        let declaration = declaration.split(';').next().unwrap_or_default();
        let Some(name) = declaration.split_whitespace().last() else {
            continue;
        };
        let name = name.split('[').next().unwrap_or(name).to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn downsample(sheet: &PixelSheet) -> PixelSheet {
    let extent = sheet.extent.mip_level(1);
    let bpp = sheet.format.bytes_per_pixel();
    let mut data = Vec::with_capacity(sheet.format.image_size(extent));
    for y in 0..extent.height {
        for x in 0..extent.width {
            let sx = (x * 2).min(sheet.extent.width - 1);
            let sy = (y * 2).min(sheet.extent.height - 1);
            match sheet.texel(sx, sy) {
                Some(texel) => data.extend_from_slice(texel),
                None => data.extend(std::iter::repeat(0).take(bpp)),
            }
        }
    }
    PixelSheet {
        extent,
        format: sheet.format,
        data,
    }
}

impl GraphicsDriver for HeadlessDriver {
    fn create_context(
        &self,
        surface: Option<SurfaceId>,
        config: &ContextConfig,
    ) -> Result<NativeContextHandle, DriverError> {
        self.record("create_context");
        if self.fail_next_context_creation.swap(false, Ordering::SeqCst) {
            return Err(DriverError::ContextCreationFailed(format!(
                "injected failure for '{}'",
                config.label
            )));
        }
        let handle = NativeContextHandle(self.next_context.fetch_add(1, Ordering::Relaxed));
        self.state
            .lock()
            .contexts
            .insert(handle, ContextObjects::default());
        log::trace!("HeadlessDriver: created {handle:?} (surface {surface:?}).");
        Ok(handle)
    }

    fn destroy_context(&self, context: NativeContextHandle) {
        self.record("destroy_context");
        let mut state = self.state.lock();
        state.contexts.remove(&context);
        state.current.retain(|_, current| *current != context);
    }

    fn make_current(&self, context: Option<NativeContextHandle>, _surface: Option<SurfaceId>) -> bool {
        self.record("make_current");
        if self.fail_next_make_current.swap(false, Ordering::SeqCst) {
            return false;
        }
        let mut state = self.state.lock();
        let thread = thread::current().id();
        match context {
            Some(native) if state.contexts.contains_key(&native) => {
                state.current.insert(thread, native);
                true
            }
            Some(_) => false,
            None => {
                state.current.remove(&thread);
                true
            }
        }
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.record("capabilities");
        *self.capabilities.lock()
    }

    fn active_texture(&self, unit: u32) {
        self.record("active_texture");
        self.with_current(|o| o.bindings.active_unit = unit);
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<NativeHandle>) {
        self.record("bind_texture");
        self.with_current(|o| {
            let key = (o.bindings.active_unit, target);
            match texture {
                Some(handle) => {
                    o.bindings.textures.insert(key, handle.get());
                    if let Some(tex) = o.textures.get_mut(&handle.get()) {
                        tex.target.get_or_insert(target);
                    }
                }
                None => {
                    o.bindings.textures.remove(&key);
                }
            }
        });
    }

    fn use_program(&self, program: Option<NativeHandle>) {
        self.record("use_program");
        self.with_current(|o| o.bindings.program = program.map(NativeHandle::get));
    }

    fn bind_framebuffer(&self, framebuffer: Option<NativeHandle>) {
        self.record("bind_framebuffer");
        self.with_current(|o| o.bindings.framebuffer = framebuffer.map(NativeHandle::get));
    }

    fn bind_vertex_array(&self, vertex_array: Option<NativeHandle>) {
        self.record("bind_vertex_array");
        self.with_current(|o| o.bindings.vertex_array = vertex_array.map(NativeHandle::get));
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<NativeHandle>) {
        self.record("bind_buffer");
        self.with_current(|o| match buffer {
            Some(handle) => {
                o.bindings.buffers.insert(target, handle.get());
            }
            None => {
                o.bindings.buffers.remove(&target);
            }
        });
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        self.record("set_capability");
        self.with_current(|o| {
            if enabled {
                o.enabled.insert(capability);
            } else {
                o.enabled.remove(&capability);
            }
        });
    }

    fn blend_func(&self, _src: BlendFactor, _dst: BlendFactor) {
        self.record("blend_func");
    }

    fn depth_func(&self, _compare: CompareFunction) {
        self.record("depth_func");
    }

    fn depth_mask(&self, _write: bool) {
        self.record("depth_mask");
    }

    fn cull_face(&self, mode: CullMode) {
        self.record("cull_face");
        debug_assert_ne!(mode, CullMode::Off, "cull_face called with CullMode::Off");
    }

    fn front_face(&self, _face: FrontFace) {
        self.record("front_face");
    }

    fn polygon_mode(&self, _mode: PolygonMode) {
        self.record("polygon_mode");
    }

    fn viewport(&self, _rect: Rect2D) {
        self.record("viewport");
    }

    fn scissor(&self, _rect: Rect2D) {
        self.record("scissor");
    }

    fn clear_color(&self, _color: LinearRgba) {
        self.record("clear_color");
    }

    fn clear_depth(&self, _depth: f32) {
        self.record("clear_depth");
    }

    fn clear(&self, _color: bool, _depth: bool) {
        self.record("clear");
    }

    fn create_texture(&self) -> Option<NativeHandle> {
        self.record("create_texture");
        self.with_current(|o| {
            let handle = o.allocate_name()?;
            o.textures.insert(handle.get(), TextureObject::default());
            Some(handle)
        })
        .flatten()
    }

    fn delete_texture(&self, texture: NativeHandle) {
        self.record("delete_texture");
        self.with_current(|o| {
            o.textures.remove(&texture.get());
            o.bindings.textures.retain(|_, name| *name != texture.get());
        });
    }

    fn is_texture(&self, texture: NativeHandle) -> bool {
        self.record("is_texture");
        self.with_current(|o| o.textures.contains_key(&texture.get()))
            .unwrap_or(false)
    }

    fn tex_image_2d(
        &self,
        target: TextureTarget,
        level: u32,
        format: PixelFormat,
        extent: Extent2D,
        data: Option<&[u8]>,
    ) {
        self.record("tex_image_2d");
        self.with_current(|o| {
            let Some(texture) = o.bound_texture(target) else {
                return;
            };
            let sheet = data
                .and_then(|d| PixelSheet::from_data(extent, format, d.to_vec()))
                .unwrap_or_else(|| PixelSheet::new(extent, format));
            if level == 0 {
                texture.levels.clear();
            }
            texture.levels.insert(level, sheet);
        });
    }

    fn tex_image_2d_multisample(&self, samples: u32, format: PixelFormat, extent: Extent2D) -> bool {
        self.record("tex_image_2d_multisample");
        if !self.capabilities.lock().multisample_textures {
            return false;
        }
        self.with_current(|o| {
            let Some(texture) = o.bound_texture(TextureTarget::Texture2DMultisample) else {
                return false;
            };
            texture.samples = samples;
            texture.levels.clear();
            texture.levels.insert(0, PixelSheet::new(extent, format));
            true
        })
        .unwrap_or(false)
    }

    fn tex_sub_image_2d(
        &self,
        target: TextureTarget,
        level: u32,
        origin: Origin2D,
        extent: Extent2D,
        format: PixelFormat,
        source: PixelSource<'_>,
    ) {
        self.record("tex_sub_image_2d");
        self.with_current(|o| {
            let bytes = format.image_size(extent);
            let texels: Vec<u8> = match source {
                PixelSource::Slice(data) => data.iter().copied().take(bytes).collect(),
                PixelSource::PixelBuffer { offset } => match o.bound_buffer(BufferTarget::PixelUnpack) {
                    Some(buffer) => buffer.iter().copied().skip(offset).take(bytes).collect(),
                    None => return,
                },
            };
            let Some(texture) = o.bound_texture(target) else {
                return;
            };
            let Some(sheet) = texture.levels.get_mut(&level) else {
                return;
            };
            let bpp = format.bytes_per_pixel();
            let row_bytes = extent.width as usize * bpp;
            for row in 0..extent.height as usize {
                let y = origin.y as usize + row;
                if y >= sheet.extent.height as usize {
                    break;
                }
                let dst_start = (y * sheet.extent.width as usize + origin.x as usize) * bpp;
                let src_start = row * row_bytes;
                let len = row_bytes
                    .min(sheet.data.len().saturating_sub(dst_start))
                    .min(texels.len().saturating_sub(src_start));
                sheet.data[dst_start..dst_start + len]
                    .copy_from_slice(&texels[src_start..src_start + len]);
            }
        });
    }

    fn tex_parameter(&self, target: TextureTarget, parameter: TextureParameter) {
        self.record("tex_parameter");
        self.with_current(|o| {
            if let Some(texture) = o.bound_texture(target) {
                texture.parameters.push(parameter);
            }
        });
    }

    fn generate_mipmap(&self, target: TextureTarget) {
        self.record("generate_mipmap");
        self.with_current(|o| {
            let Some(texture) = o.bound_texture(target) else {
                return;
            };
            let Some(base) = texture.levels.get(&0).cloned() else {
                return;
            };
            texture.levels.retain(|level, _| *level == 0);
            let mut level = 0;
            let mut current = base;
            while current.extent.width > 1 || current.extent.height > 1 {
                level += 1;
                current = downsample(&current);
                texture.levels.insert(level, current.clone());
            }
        });
    }

    fn get_tex_image(&self, target: TextureTarget, level: u32, format: PixelFormat, out: &mut [u8]) -> bool {
        self.record("get_tex_image");
        if !self.capabilities.lock().texture_image_readback {
            return false;
        }
        self.with_current(|o| {
            let Some(sheet) = o.bound_texture(target).and_then(|t| t.levels.get(&level)) else {
                return false;
            };
            if sheet.format != format {
                return false;
            }
            let len = out.len().min(sheet.data.len());
            out[..len].copy_from_slice(&sheet.data[..len]);
            true
        })
        .unwrap_or(false)
    }

    fn create_framebuffer(&self) -> Option<NativeHandle> {
        self.record("create_framebuffer");
        self.with_current(|o| {
            let handle = o.allocate_name()?;
            o.framebuffers.insert(handle.get(), None);
            Some(handle)
        })
        .flatten()
    }

    fn delete_framebuffer(&self, framebuffer: NativeHandle) {
        self.record("delete_framebuffer");
        self.with_current(|o| {
            o.framebuffers.remove(&framebuffer.get());
            if o.bindings.framebuffer == Some(framebuffer.get()) {
                o.bindings.framebuffer = None;
            }
        });
    }

    fn framebuffer_texture_2d(&self, texture: Option<NativeHandle>, level: u32) -> bool {
        self.record("framebuffer_texture_2d");
        self.with_current(|o| {
            let Some(fb) = o.bindings.framebuffer else {
                return false;
            };
            let attachment = texture.map(|t| (t.get(), level));
            let complete = attachment.is_some_and(|(name, level)| {
                o.textures
                    .get(&name)
                    .is_some_and(|t| t.levels.contains_key(&level))
            });
            o.framebuffers.insert(fb, attachment);
            complete
        })
        .unwrap_or(false)
    }

    fn read_pixels(&self, rect: Rect2D, format: PixelFormat, out: &mut [u8]) {
        self.record("read_pixels");
        self.with_current(|o| {
            let Some(&Some((name, level))) = o
                .bindings
                .framebuffer
                .and_then(|fb| o.framebuffers.get(&fb))
            else {
                out.fill(0);
                return;
            };
            let Some(sheet) = o.textures.get(&name).and_then(|t| t.levels.get(&level)) else {
                out.fill(0);
                return;
            };
            let bpp = format.bytes_per_pixel();
            for row in 0..rect.extent.height {
                for col in 0..rect.extent.width {
                    let dst = ((row * rect.extent.width + col) as usize) * bpp;
                    let Some(out_texel) = out.get_mut(dst..dst + bpp) else {
                        return;
                    };
                    match sheet.texel(rect.origin.x + col, rect.origin.y + row) {
                        Some(texel) if texel.len() == bpp => out_texel.copy_from_slice(texel),
                        _ => out_texel.fill(0),
                    }
                }
            }
        });
    }

    fn create_buffer(&self) -> Option<NativeHandle> {
        self.record("create_buffer");
        self.with_current(|o| {
            let handle = o.allocate_name()?;
            o.buffers.insert(handle.get(), Vec::new());
            Some(handle)
        })
        .flatten()
    }

    fn delete_buffer(&self, buffer: NativeHandle) {
        self.record("delete_buffer");
        self.with_current(|o| {
            o.buffers.remove(&buffer.get());
            o.bindings.buffers.retain(|_, name| *name != buffer.get());
        });
    }

    fn buffer_data(&self, target: BufferTarget, size: usize, data: Option<&[u8]>, _usage: BufferUsage) {
        self.record("buffer_data");
        self.with_current(|o| {
            if let Some(buffer) = o.bound_buffer(target) {
                buffer.clear();
                buffer.resize(size, 0);
                if let Some(data) = data {
                    let len = data.len().min(size);
                    buffer[..len].copy_from_slice(&data[..len]);
                }
            }
        });
    }

    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]) {
        self.record("buffer_sub_data");
        self.with_current(|o| {
            if let Some(buffer) = o.bound_buffer(target) {
                let end = (offset + data.len()).min(buffer.len());
                if offset < end {
                    buffer[offset..end].copy_from_slice(&data[..end - offset]);
                }
            }
        });
    }

    fn map_buffer_range(
        &self,
        target: BufferTarget,
        offset: usize,
        length: usize,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> bool {
        self.record("map_buffer_range");
        if !self.capabilities.lock().buffer_mapping {
            return false;
        }
        self.with_current(|o| match o.bound_buffer(target) {
            Some(buffer) if offset + length <= buffer.len() => {
                write(&mut buffer[offset..offset + length]);
                true
            }
            _ => false,
        })
        .unwrap_or(false)
    }

    fn create_vertex_array(&self) -> Option<NativeHandle> {
        self.record("create_vertex_array");
        self.with_current(|o| {
            let handle = o.allocate_name()?;
            o.vertex_arrays.insert(handle.get(), HashSet::new());
            Some(handle)
        })
        .flatten()
    }

    fn delete_vertex_array(&self, vertex_array: NativeHandle) {
        self.record("delete_vertex_array");
        self.with_current(|o| {
            o.vertex_arrays.remove(&vertex_array.get());
            if o.bindings.vertex_array == Some(vertex_array.get()) {
                o.bindings.vertex_array = None;
            }
        });
    }

    fn vertex_attrib_pointer(&self, _location: u32, components: u8, _stride: u32, _offset: u32) {
        self.record("vertex_attrib_pointer");
        debug_assert!((1..=4).contains(&components));
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        self.record("enable_vertex_attrib_array");
        self.with_current(|o| {
            if let Some(vao) = o
                .bindings
                .vertex_array
                .and_then(|name| o.vertex_arrays.get_mut(&name))
            {
                vao.insert(location);
            }
        });
    }

    fn create_program(&self, source: &ProgramSource) -> Result<NativeHandle, DriverError> {
        self.record("create_program");
        if source.vertex.trim().is_empty() || source.fragment.trim().is_empty() {
            return Err(DriverError::ProgramCompilation {
                label: source.label.clone(),
                log: "empty shader stage".to_string(),
            });
        }
        let uniforms = parse_uniform_names(source);
        self.with_current(|o| {
            let handle = o.allocate_name()?;
            o.programs.insert(
                handle.get(),
                ProgramObject {
                    uniforms,
                    values: HashMap::new(),
                },
            );
            Some(handle)
        })
        .flatten()
        .ok_or(DriverError::ObjectCreationFailed("program"))
    }

    fn delete_program(&self, program: NativeHandle) {
        self.record("delete_program");
        self.with_current(|o| {
            o.programs.remove(&program.get());
            if o.bindings.program == Some(program.get()) {
                o.bindings.program = None;
            }
        });
    }

    fn uniform_location(&self, program: NativeHandle, name: &str) -> Option<UniformLocation> {
        self.record("uniform_location");
        self.with_current(|o| {
            o.programs
                .get(&program.get())
                .and_then(|p| p.uniforms.iter().position(|u| u == name))
                .map(|index| UniformLocation(index as u32))
        })
        .flatten()
    }

    fn upload_uniform(&self, location: UniformLocation, data: UniformData<'_>) {
        self.record("upload_uniform");
        self.with_current(|o| {
            let Some(program) = o.bindings.program.and_then(|p| o.programs.get_mut(&p)) else {
                return;
            };
            let value = match data {
                UniformData::Value(value) => RecordedUniform::Value(value),
                UniformData::Vec4Array(values) => RecordedUniform::Vec4Array(values.to_vec()),
            };
            program.values.insert(location.0, value);
        });
    }

    fn draw_elements_instanced(
        &self,
        topology: PrimitiveTopology,
        index_count: u32,
        _index_format: IndexFormat,
        instance_count: u32,
    ) {
        self.record("draw_elements_instanced");
        self.with_current(|o| {
            let record = DrawRecord {
                program: o.bindings.program.and_then(NativeHandle::new),
                vertex_array: o.bindings.vertex_array.and_then(NativeHandle::new),
                topology,
                index_count,
                instance_count,
            };
            o.draws.push(record);
        });
    }

    fn query_binding(&self, query: BindingQuery) -> Option<u32> {
        self.record("query_binding");
        self.with_current(|o| match query {
            BindingQuery::ActiveTextureUnit => o.bindings.active_unit,
            BindingQuery::Program => o.bindings.program.unwrap_or(0),
            BindingQuery::Framebuffer => o.bindings.framebuffer.unwrap_or(0),
            BindingQuery::VertexArray => o.bindings.vertex_array.unwrap_or(0),
        })
    }
}
