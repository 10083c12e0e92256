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

use super::conversions::{native_handle, GlPixelFormat, IntoGl};
use super::platform::{describe_surface, GlPlatform, GlSurface};
use glow::{HasContext, PixelPackData, PixelUnpackData};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::math::{Extent2D, LinearRgba, Origin2D, Rect2D};
use tessera_core::renderer::api::{
    BlendFactor, BufferTarget, BufferUsage, Capability, CompareFunction, CullMode,
    DriverCapabilities, FrontFace, IndexFormat, NativeContextHandle, NativeHandle, PixelFormat,
    PixelSource, PolygonMode, PrimitiveTopology, ProgramSource, SurfaceId, TextureParameter,
    TextureTarget, UniformData, UniformLocation, UniformValue,
};
use tessera_core::renderer::context::ContextConfig;
use tessera_core::renderer::traits::{BindingQuery, GraphicsDriver};
use tessera_core::renderer::DriverError;

static NEXT_DRIVER_ID: AtomicU64 = AtomicU64::new(1);

/// Entry points loaded for one native context.
struct GlFunctions(glow::Context);

// SAFETY: the function table is only called on the thread where its native
// context is current, and the render lock serializes those threads.
unsafe impl Send for GlFunctions {}
unsafe impl Sync for GlFunctions {}

struct CurrentContext {
    driver: u64,
    context: NativeContextHandle,
    gl: Option<Arc<GlFunctions>>,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentContext>> = const { RefCell::new(None) };
}

/// An OpenGL 3.x driver built on `glow`.
///
/// The driver owns the GL function tables (loaded lazily, once per native
/// context) and tracks which context is current on each thread. Native
/// context creation and switching are delegated to a [`GlPlatform`].
/// Calls made while no context of this driver is current are dropped with a
/// trace log, and creation calls return `None`.
pub struct GlowDriver {
    id: u64,
    platform: Box<dyn GlPlatform>,
    surfaces: Mutex<HashMap<SurfaceId, GlSurface>>,
    next_surface: AtomicU64,
    functions: Mutex<HashMap<NativeContextHandle, Option<Arc<GlFunctions>>>>,
}

impl fmt::Debug for GlowDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowDriver")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field("surfaces", &self.surfaces.lock().len())
            .field("contexts", &self.functions.lock().len())
            .finish()
    }
}

fn gl_enum<T: IntoGl<u32>>(value: T) -> i32 {
    value.into_gl() as i32
}

fn has_anisotropy(gl: &glow::Context) -> bool {
    let extensions = gl.supported_extensions();
    extensions.contains("GL_EXT_texture_filter_anisotropic")
        || extensions.contains("GL_ARB_texture_filter_anisotropic")
}

unsafe fn discard_shaders(gl: &glow::Context, program: glow::NativeProgram, shaders: &[glow::NativeShader]) {
    for &shader in shaders {
        gl.detach_shader(program, shader);
        gl.delete_shader(shader);
    }
}

impl GlowDriver {
    /// Creates a driver on top of a windowing platform.
    pub fn new(platform: Box<dyn GlPlatform>) -> Self {
        Self {
            id: NEXT_DRIVER_ID.fetch_add(1, Ordering::Relaxed),
            platform,
            surfaces: Mutex::new(HashMap::new()),
            next_surface: AtomicU64::new(1),
            functions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a window so contexts can be created for it and bound to it.
    pub fn register_surface(&self, surface: GlSurface) -> SurfaceId {
        let id = SurfaceId(self.next_surface.fetch_add(1, Ordering::Relaxed));
        match describe_surface(&surface) {
            Ok(description) => log::info!("GlowDriver: registered surface {} ({description}).", id.0),
            Err(e) => log::warn!("GlowDriver: registered surface {} without native handles: {e:#}", id.0),
        }
        self.surfaces.lock().insert(id, surface);
        id
    }

    /// Forgets a surface. Returns `false` if it was not registered.
    pub fn unregister_surface(&self, id: SurfaceId) -> bool {
        self.surfaces.lock().remove(&id).is_some()
    }

    /// Number of registered surfaces.
    pub fn surface_count(&self) -> usize {
        self.surfaces.lock().len()
    }

    /// The native context of this driver current on the calling thread.
    pub fn current_native_context(&self) -> Option<NativeContextHandle> {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .filter(|c| c.driver == self.id)
                .map(|c| c.context)
        })
    }

    fn surface(&self, id: Option<SurfaceId>) -> Result<Option<GlSurface>, DriverError> {
        match id {
            None => Ok(None),
            Some(id) => self
                .surfaces
                .lock()
                .get(&id)
                .cloned()
                .map(Some)
                .ok_or_else(|| DriverError::ContextCreationFailed(format!("Unknown surface {}", id.0))),
        }
    }

    fn load_functions(&self, context: NativeContextHandle) -> Option<Arc<GlFunctions>> {
        let mut functions = self.functions.lock();
        let slot = functions.get_mut(&context)?;
        if let Some(gl) = slot {
            return Some(gl.clone());
        }
        // SAFETY: `context` is current on this thread, so the platform
        // resolves entry points that belong to it.
        let gl = unsafe {
            glow::Context::from_loader_function_cstr(|symbol| self.platform.get_proc_address(symbol))
        };
        log::info!(
            "GlowDriver: loaded OpenGL {}.{} entry points for native context {} ({}).",
            gl.version().major,
            gl.version().minor,
            context.0,
            gl.version().vendor_info
        );
        let gl = Arc::new(GlFunctions(gl));
        *slot = Some(gl.clone());
        Some(gl)
    }

    fn gl(&self) -> Option<Arc<GlFunctions>> {
        let (context, cached) = CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .filter(|c| c.driver == self.id)
                .map(|c| (c.context, c.gl.clone()))
        })?;
        if cached.is_some() {
            return cached;
        }
        let gl = self.load_functions(context)?;
        CURRENT.with(|current| {
            if let Some(current) = current.borrow_mut().as_mut() {
                current.gl = Some(gl.clone());
            }
        });
        Some(gl)
    }

    fn with_gl<R>(&self, fallback: R, f: impl FnOnce(&glow::Context) -> R) -> R {
        match self.gl() {
            Some(gl) => f(&gl.0),
            None => {
                log::trace!("GlowDriver: no current context, GL call dropped.");
                fallback
            }
        }
    }

    fn create_object<T>(
        &self,
        kind: &'static str,
        create: impl FnOnce(&glow::Context) -> Result<T, String>,
        name: impl FnOnce(T) -> NativeHandle,
    ) -> Option<NativeHandle> {
        self.with_gl(None, |gl| match create(gl) {
            Ok(object) => Some(name(object)),
            Err(e) => {
                log::error!("GlowDriver: failed to create {kind}: {e}");
                None
            }
        })
    }
}

impl GraphicsDriver for GlowDriver {
    fn create_context(
        &self,
        surface: Option<SurfaceId>,
        config: &ContextConfig,
    ) -> Result<NativeContextHandle, DriverError> {
        let target = self.surface(surface)?;
        let candidates = self.platform.pixel_formats(target.as_ref());
        let format = config
            .choose_format(&candidates)
            .ok_or_else(|| DriverError::ContextCreationFailed("No pixel format offered".to_string()))?;
        log::debug!(
            "GlowDriver: '{}' uses pixel format {format:?} (score {}).",
            config.label,
            config.evaluate_format(format)
        );
        let handle = self
            .platform
            .create_context(target.as_ref(), format, config)
            .map_err(|e| DriverError::ContextCreationFailed(format!("{e:#}")))?;
        self.functions.lock().insert(handle, None);
        log::info!("GlowDriver: created native context {} for '{}'.", handle.0, config.label);
        Ok(handle)
    }

    fn destroy_context(&self, context: NativeContextHandle) {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if current
                .as_ref()
                .is_some_and(|c| c.driver == self.id && c.context == context)
            {
                *current = None;
            }
        });
        self.functions.lock().remove(&context);
        self.platform.destroy_context(context);
        log::info!("GlowDriver: destroyed native context {}.", context.0);
    }

    fn make_current(&self, context: Option<NativeContextHandle>, surface: Option<SurfaceId>) -> bool {
        let target = match self.surface(surface) {
            Ok(target) => target,
            Err(e) => {
                log::warn!("GlowDriver: {e}");
                return false;
            }
        };
        if !self.platform.make_current(context, target.as_ref()) {
            return false;
        }
        let next = context.map(|context| CurrentContext {
            driver: self.id,
            context,
            gl: self.functions.lock().get(&context).cloned().flatten(),
        });
        CURRENT.with(|current| *current.borrow_mut() = next);
        true
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.with_gl(DriverCapabilities::BASELINE, |gl| unsafe {
            let version = gl.version();
            let desktop = !version.is_embedded;
            let gl3 = version.major >= 3;
            let query = |parameter| gl.get_parameter_i32(parameter).max(0) as u32;
            DriverCapabilities {
                max_texture_size: query(glow::MAX_TEXTURE_SIZE),
                max_texture_units: query(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS),
                max_vertex_uniform_vectors: query(glow::MAX_VERTEX_UNIFORM_COMPONENTS) / 4,
                max_anisotropy: if has_anisotropy(gl) {
                    gl.get_parameter_f32(glow::MAX_TEXTURE_MAX_ANISOTROPY)
                } else {
                    1.0
                },
                max_clip_planes: if desktop { query(glow::MAX_CLIP_DISTANCES) } else { 0 },
                texture_buffer_instancing: gl3,
                buffer_mapping: gl3,
                texture_image_readback: desktop,
                multisample_textures: desktop && (version.major, version.minor) >= (3, 2),
            }
        })
    }

    // --- Fixed-function state ---

    fn active_texture(&self, unit: u32) {
        self.with_gl((), |gl| unsafe { gl.active_texture(glow::TEXTURE0 + unit) });
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<NativeHandle>) {
        self.with_gl((), |gl| unsafe { gl.bind_texture(target.into_gl(), texture.map(IntoGl::into_gl)) });
    }

    fn use_program(&self, program: Option<NativeHandle>) {
        self.with_gl((), |gl| unsafe { gl.use_program(program.map(IntoGl::into_gl)) });
    }

    fn bind_framebuffer(&self, framebuffer: Option<NativeHandle>) {
        self.with_gl((), |gl| unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer.map(IntoGl::into_gl))
        });
    }

    fn bind_vertex_array(&self, vertex_array: Option<NativeHandle>) {
        self.with_gl((), |gl| unsafe { gl.bind_vertex_array(vertex_array.map(IntoGl::into_gl)) });
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<NativeHandle>) {
        self.with_gl((), |gl| unsafe { gl.bind_buffer(target.into_gl(), buffer.map(IntoGl::into_gl)) });
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        self.with_gl((), |gl| unsafe {
            if enabled {
                gl.enable(capability.into_gl());
            } else {
                gl.disable(capability.into_gl());
            }
        });
    }

    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) {
        self.with_gl((), |gl| unsafe { gl.blend_func(src.into_gl(), dst.into_gl()) });
    }

    fn depth_func(&self, compare: CompareFunction) {
        self.with_gl((), |gl| unsafe { gl.depth_func(compare.into_gl()) });
    }

    fn depth_mask(&self, write: bool) {
        self.with_gl((), |gl| unsafe { gl.depth_mask(write) });
    }

    fn cull_face(&self, mode: CullMode) {
        let face: Option<u32> = mode.into_gl();
        if let Some(face) = face {
            self.with_gl((), |gl| unsafe { gl.cull_face(face) });
        }
    }

    fn front_face(&self, face: FrontFace) {
        self.with_gl((), |gl| unsafe { gl.front_face(face.into_gl()) });
    }

    fn polygon_mode(&self, mode: PolygonMode) {
        self.with_gl((), |gl| unsafe {
            // GLES only rasterizes filled polygons.
            if !gl.version().is_embedded {
                gl.polygon_mode(glow::FRONT_AND_BACK, mode.into_gl());
            }
        });
    }

    fn viewport(&self, rect: Rect2D) {
        self.with_gl((), |gl| unsafe {
            gl.viewport(
                rect.origin.x as i32,
                rect.origin.y as i32,
                rect.extent.width as i32,
                rect.extent.height as i32,
            )
        });
    }

    fn scissor(&self, rect: Rect2D) {
        self.with_gl((), |gl| unsafe {
            gl.scissor(
                rect.origin.x as i32,
                rect.origin.y as i32,
                rect.extent.width as i32,
                rect.extent.height as i32,
            )
        });
    }

    fn clear_color(&self, color: LinearRgba) {
        self.with_gl((), |gl| unsafe { gl.clear_color(color.r, color.g, color.b, color.a) });
    }

    fn clear_depth(&self, depth: f32) {
        self.with_gl((), |gl| unsafe { gl.clear_depth_f32(depth) });
    }

    fn clear(&self, color: bool, depth: bool) {
        let mut mask = 0;
        if color {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if depth {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if mask != 0 {
            self.with_gl((), |gl| unsafe { gl.clear(mask) });
        }
    }

    // --- Textures ---

    fn create_texture(&self) -> Option<NativeHandle> {
        self.create_object("texture", |gl| unsafe { gl.create_texture() }, |t: glow::NativeTexture| native_handle(t.0))
    }

    fn delete_texture(&self, texture: NativeHandle) {
        self.with_gl((), |gl| unsafe { gl.delete_texture(texture.into_gl()) });
    }

    fn is_texture(&self, texture: NativeHandle) -> bool {
        self.with_gl(false, |gl| unsafe { gl.is_texture(texture.into_gl()) })
    }

    fn tex_image_2d(
        &self,
        target: TextureTarget,
        level: u32,
        format: PixelFormat,
        extent: Extent2D,
        data: Option<&[u8]>,
    ) {
        let pixel: GlPixelFormat = format.into_gl();
        self.with_gl((), |gl| unsafe {
            gl.tex_image_2d(
                target.into_gl(),
                level as i32,
                pixel.internal as i32,
                extent.width as i32,
                extent.height as i32,
                0,
                pixel.format,
                pixel.ty,
                PixelUnpackData::Slice(data),
            )
        });
    }

    fn tex_image_2d_multisample(&self, samples: u32, format: PixelFormat, extent: Extent2D) -> bool {
        let pixel: GlPixelFormat = format.into_gl();
        self.with_gl(false, |gl| unsafe {
            let version = gl.version();
            if version.is_embedded || (version.major, version.minor) < (3, 2) {
                return false;
            }
            gl.tex_image_2d_multisample(
                glow::TEXTURE_2D_MULTISAMPLE,
                samples as i32,
                pixel.internal as i32,
                extent.width as i32,
                extent.height as i32,
                true,
            );
            true
        })
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
        let pixel: GlPixelFormat = format.into_gl();
        let pixels = match source {
            PixelSource::Slice(data) => PixelUnpackData::Slice(Some(data)),
            PixelSource::PixelBuffer { offset } => PixelUnpackData::BufferOffset(offset as u32),
        };
        self.with_gl((), |gl| unsafe {
            gl.tex_sub_image_2d(
                target.into_gl(),
                level as i32,
                origin.x as i32,
                origin.y as i32,
                extent.width as i32,
                extent.height as i32,
                pixel.format,
                pixel.ty,
                pixels,
            )
        });
    }

    fn tex_parameter(&self, target: TextureTarget, parameter: TextureParameter) {
        let target = target.into_gl();
        self.with_gl((), |gl| unsafe {
            match parameter {
                TextureParameter::MinFilter(filter) => {
                    gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, gl_enum(filter))
                }
                TextureParameter::MagFilter(filter) => {
                    gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, gl_enum(filter))
                }
                TextureParameter::WrapS(mode) => gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, gl_enum(mode)),
                TextureParameter::WrapT(mode) => gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, gl_enum(mode)),
                TextureParameter::BorderColor(color) => gl.tex_parameter_f32_slice(
                    target,
                    glow::TEXTURE_BORDER_COLOR,
                    &[color.r, color.g, color.b, color.a],
                ),
                TextureParameter::MaxAnisotropy(level) => {
                    if has_anisotropy(gl) {
                        gl.tex_parameter_f32(target, glow::TEXTURE_MAX_ANISOTROPY, level);
                    }
                }
                TextureParameter::MaxLevel(level) => {
                    gl.tex_parameter_i32(target, glow::TEXTURE_MAX_LEVEL, level as i32)
                }
            }
        });
    }

    fn generate_mipmap(&self, target: TextureTarget) {
        self.with_gl((), |gl| unsafe { gl.generate_mipmap(target.into_gl()) });
    }

    fn get_tex_image(&self, target: TextureTarget, level: u32, format: PixelFormat, out: &mut [u8]) -> bool {
        let pixel: GlPixelFormat = format.into_gl();
        self.with_gl(false, |gl| unsafe {
            if gl.version().is_embedded {
                return false;
            }
            gl.get_tex_image(
                target.into_gl(),
                level as i32,
                pixel.format,
                pixel.ty,
                PixelPackData::Slice(Some(out)),
            );
            true
        })
    }

    // --- Framebuffers ---

    fn create_framebuffer(&self) -> Option<NativeHandle> {
        self.create_object("framebuffer", |gl| unsafe { gl.create_framebuffer() }, |f: glow::NativeFramebuffer| native_handle(f.0))
    }

    fn delete_framebuffer(&self, framebuffer: NativeHandle) {
        self.with_gl((), |gl| unsafe { gl.delete_framebuffer(framebuffer.into_gl()) });
    }

    fn framebuffer_texture_2d(&self, texture: Option<NativeHandle>, level: u32) -> bool {
        self.with_gl(false, |gl| unsafe {
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture.map(IntoGl::into_gl),
                level as i32,
            );
            gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE
        })
    }

    fn read_pixels(&self, rect: Rect2D, format: PixelFormat, out: &mut [u8]) {
        let pixel: GlPixelFormat = format.into_gl();
        self.with_gl((), |gl| unsafe {
            gl.read_pixels(
                rect.origin.x as i32,
                rect.origin.y as i32,
                rect.extent.width as i32,
                rect.extent.height as i32,
                pixel.format,
                pixel.ty,
                PixelPackData::Slice(Some(out)),
            )
        });
    }

    // --- Buffers ---

    fn create_buffer(&self) -> Option<NativeHandle> {
        self.create_object("buffer", |gl| unsafe { gl.create_buffer() }, |b: glow::NativeBuffer| native_handle(b.0))
    }

    fn delete_buffer(&self, buffer: NativeHandle) {
        self.with_gl((), |gl| unsafe { gl.delete_buffer(buffer.into_gl()) });
    }

    fn buffer_data(&self, target: BufferTarget, size: usize, data: Option<&[u8]>, usage: BufferUsage) {
        self.with_gl((), |gl| unsafe {
            match data {
                Some(data) => gl.buffer_data_u8_slice(target.into_gl(), data, usage.into_gl()),
                None => gl.buffer_data_size(target.into_gl(), size as i32, usage.into_gl()),
            }
        });
    }

    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]) {
        self.with_gl((), |gl| unsafe { gl.buffer_sub_data_u8_slice(target.into_gl(), offset as i32, data) });
    }

    fn map_buffer_range(
        &self,
        target: BufferTarget,
        offset: usize,
        length: usize,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> bool {
        self.with_gl(false, |gl| unsafe {
            if gl.version().major < 3 {
                return false;
            }
            let target = target.into_gl();
            let ptr = gl.map_buffer_range(
                target,
                offset as i32,
                length as i32,
                glow::MAP_WRITE_BIT | glow::MAP_INVALIDATE_RANGE_BIT,
            );
            if ptr.is_null() {
                log::warn!("GlowDriver: mapping {length} bytes at {offset} failed.");
                return false;
            }
            // SAFETY: the driver mapped `length` writable bytes at `ptr`; the
            // slice does not outlive the unmap below.
            write(std::slice::from_raw_parts_mut(ptr, length));
            gl.unmap_buffer(target);
            true
        })
    }

    // --- Vertex arrays ---

    fn create_vertex_array(&self) -> Option<NativeHandle> {
        self.create_object("vertex array", |gl| unsafe { gl.create_vertex_array() }, |v: glow::NativeVertexArray| native_handle(v.0))
    }

    fn delete_vertex_array(&self, vertex_array: NativeHandle) {
        self.with_gl((), |gl| unsafe { gl.delete_vertex_array(vertex_array.into_gl()) });
    }

    fn vertex_attrib_pointer(&self, location: u32, components: u8, stride: u32, offset: u32) {
        self.with_gl((), |gl| unsafe {
            gl.vertex_attrib_pointer_f32(location, components as i32, glow::FLOAT, false, stride as i32, offset as i32)
        });
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        self.with_gl((), |gl| unsafe { gl.enable_vertex_attrib_array(location) });
    }

    // --- Programs ---

    fn create_program(&self, source: &ProgramSource) -> Result<NativeHandle, DriverError> {
        let gl = self.gl().ok_or(DriverError::ObjectCreationFailed("program"))?;
        let gl = &gl.0;
        let failed = |log: String| DriverError::ProgramCompilation {
            label: source.label.clone(),
            log,
        };
        unsafe {
            let program = gl
                .create_program()
                .map_err(|_| DriverError::ObjectCreationFailed("program"))?;
            let mut shaders = Vec::with_capacity(2);
            for (stage, text) in [
                (glow::VERTEX_SHADER, &source.vertex),
                (glow::FRAGMENT_SHADER, &source.fragment),
            ] {
                let Ok(shader) = gl.create_shader(stage) else {
                    discard_shaders(gl, program, &shaders);
                    gl.delete_program(program);
                    return Err(DriverError::ObjectCreationFailed("shader"));
                };
                gl.shader_source(shader, text);
                gl.compile_shader(shader);
                if !gl.get_shader_compile_status(shader) {
                    let log = gl.get_shader_info_log(shader);
                    gl.delete_shader(shader);
                    discard_shaders(gl, program, &shaders);
                    gl.delete_program(program);
                    return Err(failed(log));
                }
                gl.attach_shader(program, shader);
                shaders.push(shader);
            }
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            let log = if linked { String::new() } else { gl.get_program_info_log(program) };
            discard_shaders(gl, program, &shaders);
            if !linked {
                gl.delete_program(program);
                return Err(failed(log));
            }
            log::debug!("GlowDriver: linked program '{}'.", source.label);
            Ok(native_handle(program.0))
        }
    }

    fn delete_program(&self, program: NativeHandle) {
        self.with_gl((), |gl| unsafe { gl.delete_program(program.into_gl()) });
    }

    fn uniform_location(&self, program: NativeHandle, name: &str) -> Option<UniformLocation> {
        self.with_gl(None, |gl| unsafe {
            gl.get_uniform_location(program.into_gl(), name)
                .map(|location| UniformLocation(location.0))
        })
    }

    fn upload_uniform(&self, location: UniformLocation, data: UniformData<'_>) {
        let location: glow::NativeUniformLocation = location.into_gl();
        let location = Some(&location);
        self.with_gl((), |gl| unsafe {
            match data {
                UniformData::Value(UniformValue::Int(v)) => gl.uniform_1_i32(location, v),
                UniformData::Value(UniformValue::Float(v)) => gl.uniform_1_f32(location, v),
                UniformData::Value(UniformValue::Vec2(v)) => gl.uniform_2_f32_slice(location, &v),
                UniformData::Value(UniformValue::Vec3(v)) => gl.uniform_3_f32_slice(location, &v),
                UniformData::Value(UniformValue::Vec4(v)) => gl.uniform_4_f32_slice(location, &v),
                UniformData::Value(UniformValue::Mat4(m)) => gl.uniform_matrix_4_f32_slice(location, false, &m),
                UniformData::Vec4Array(values) => gl.uniform_4_f32_slice(location, bytemuck::cast_slice(values)),
            }
        });
    }

    // --- Drawing ---

    fn draw_elements_instanced(
        &self,
        topology: PrimitiveTopology,
        index_count: u32,
        index_format: IndexFormat,
        instance_count: u32,
    ) {
        self.with_gl((), |gl| unsafe {
            gl.draw_elements_instanced(
                topology.into_gl(),
                index_count as i32,
                index_format.into_gl(),
                0,
                instance_count as i32,
            )
        });
    }

    // --- Validation ---

    fn query_binding(&self, query: BindingQuery) -> Option<u32> {
        self.with_gl(None, |gl| unsafe {
            let value = match query {
                BindingQuery::ActiveTextureUnit => {
                    gl.get_parameter_i32(glow::ACTIVE_TEXTURE) - glow::TEXTURE0 as i32
                }
                BindingQuery::Program => gl.get_parameter_i32(glow::CURRENT_PROGRAM),
                BindingQuery::Framebuffer => gl.get_parameter_i32(glow::FRAMEBUFFER_BINDING),
                BindingQuery::VertexArray => gl.get_parameter_i32(glow::VERTEX_ARRAY_BINDING),
            };
            u32::try_from(value).ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    };
    use std::ffi::{c_void, CStr};
    use tessera_core::renderer::context::PixelFormatCandidate;

    #[derive(Debug, Default)]
    struct MockPlatform {
        chosen: Arc<Mutex<Vec<PixelFormatCandidate>>>,
        refuse_switch: bool,
        next: AtomicU64,
    }

    impl GlPlatform for MockPlatform {
        fn pixel_formats(&self, surface: Option<&GlSurface>) -> Vec<PixelFormatCandidate> {
            let format = |color_bits, depth_bits| PixelFormatCandidate {
                color_bits,
                depth_bits,
                stencil_bits: 8,
                antialiasing_level: 0,
                accelerated: true,
                srgb_capable: false,
            };
            match surface {
                Some(_) => vec![format(16, 16), format(32, 24), format(32, 32)],
                None => vec![format(32, 24)],
            }
        }

        fn create_context(
            &self,
            _surface: Option<&GlSurface>,
            format: &PixelFormatCandidate,
            _config: &ContextConfig,
        ) -> anyhow::Result<NativeContextHandle> {
            self.chosen.lock().push(*format);
            Ok(NativeContextHandle(self.next.fetch_add(1, Ordering::Relaxed) + 1))
        }

        fn destroy_context(&self, _context: NativeContextHandle) {}

        fn make_current(&self, _context: Option<NativeContextHandle>, _surface: Option<&GlSurface>) -> bool {
            !self.refuse_switch
        }

        fn get_proc_address(&self, _symbol: &CStr) -> *const c_void {
            std::ptr::null()
        }
    }

    struct DetachedWindow;

    impl HasWindowHandle for DetachedWindow {
        fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl HasDisplayHandle for DetachedWindow {
        fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    fn driver(platform: MockPlatform) -> GlowDriver {
        GlowDriver::new(Box::new(platform))
    }

    #[test]
    fn test_surface_registration() {
        let driver = driver(MockPlatform::default());
        let a = driver.register_surface(Arc::new(DetachedWindow));
        let b = driver.register_surface(Arc::new(DetachedWindow));
        assert_ne!(a, b);
        assert_eq!(driver.surface_count(), 2);
        assert!(driver.unregister_surface(a));
        assert!(!driver.unregister_surface(a));
        assert_eq!(driver.surface_count(), 1);
    }

    #[test]
    fn test_context_uses_closest_pixel_format() {
        let platform = MockPlatform::default();
        let chosen = platform.chosen.clone();
        let driver = driver(platform);
        let surface = driver.register_surface(Arc::new(DetachedWindow));
        driver
            .create_context(Some(surface), &ContextConfig::labeled("window"))
            .unwrap();
        let chosen = chosen.lock();
        assert_eq!(chosen.len(), 1);
        assert_eq!((chosen[0].color_bits, chosen[0].depth_bits), (32, 24));
    }

    #[test]
    fn test_unknown_surface_is_rejected() {
        let driver = driver(MockPlatform::default());
        let result = driver.create_context(Some(SurfaceId(99)), &ContextConfig::default());
        assert!(matches!(result, Err(DriverError::ContextCreationFailed(_))));
        assert!(!driver.make_current(None, Some(SurfaceId(99))));
    }

    #[test]
    fn test_current_context_tracking() {
        let driver = driver(MockPlatform::default());
        let context = driver.create_context(None, &ContextConfig::default()).unwrap();
        assert_eq!(driver.current_native_context(), None);
        assert!(driver.make_current(Some(context), None));
        assert_eq!(driver.current_native_context(), Some(context));
        driver.destroy_context(context);
        assert_eq!(driver.current_native_context(), None);
    }

    #[test]
    fn test_refused_switch_keeps_previous_state() {
        let driver = driver(MockPlatform {
            refuse_switch: true,
            ..Default::default()
        });
        let context = driver.create_context(None, &ContextConfig::default()).unwrap();
        assert!(!driver.make_current(Some(context), None));
        assert_eq!(driver.current_native_context(), None);
    }

    #[test]
    fn test_calls_without_current_context_are_dropped() {
        let driver = driver(MockPlatform::default());
        assert_eq!(driver.create_texture(), None);
        assert_eq!(driver.capabilities(), DriverCapabilities::BASELINE);
        assert_eq!(driver.query_binding(BindingQuery::Program), None);
        assert!(matches!(
            driver.create_program(&ProgramSource::default()),
            Err(DriverError::ObjectCreationFailed("program"))
        ));
        driver.clear(true, true);
    }

    #[test]
    fn test_current_context_is_per_driver() {
        let first = driver(MockPlatform::default());
        let second = driver(MockPlatform::default());
        let context = first.create_context(None, &ContextConfig::default()).unwrap();
        assert!(first.make_current(Some(context), None));
        assert_eq!(second.current_native_context(), None);
    }
}
