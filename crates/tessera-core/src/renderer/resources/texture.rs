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

//! Two-dimensional textures with context-loss recovery.

use super::{bind_context, upgrade_context, BoundContext, EpochHandle};
use crate::math::{Extent2D, LinearRgba, Origin2D, Rect2D};
use crate::renderer::api::{
    AddressMode, ContextId, NativeHandle, PixelFormat, PixelSheet, PixelSource, TextureFilter,
    TextureParameter, TextureTarget,
};
use crate::renderer::context::{ContextListener, ListenerId, RenderingContext};
use crate::renderer::error::{ContextError, DriverError, ResourceError};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Re-uploads a texture's content after its native object was recreated.
///
/// The flag is `true` when the reload is forced by a context recreation.
pub type ReloadCallback = Arc<dyn Fn(&Texture2D, bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SamplerState {
    min_filter: TextureFilter,
    mag_filter: TextureFilter,
    wrap_s: AddressMode,
    wrap_t: AddressMode,
    border_color: LinearRgba,
    anisotropy: f32,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            wrap_s: AddressMode::ClampToEdge,
            wrap_t: AddressMode::ClampToEdge,
            border_color: LinearRgba::TRANSPARENT,
            anisotropy: 1.0,
        }
    }
}

impl SamplerState {
    fn parameters(&self) -> [TextureParameter; 6] {
        [
            TextureParameter::MinFilter(self.min_filter),
            TextureParameter::MagFilter(self.mag_filter),
            TextureParameter::WrapS(self.wrap_s),
            TextureParameter::WrapT(self.wrap_t),
            TextureParameter::BorderColor(self.border_color),
            TextureParameter::MaxAnisotropy(self.anisotropy),
        ]
    }
}

#[derive(Debug, Default)]
struct TextureInner {
    handle: Option<EpochHandle>,
    extent: Extent2D,
    format: PixelFormat,
    populated: bool,
    sampler: SamplerState,
    cpu_cache: Option<Vec<PixelSheet>>,
}

/// A 2D texture owned by one rendering context.
///
/// The native object is lost whenever the context is torn down. On the next
/// setup the texture regenerates its handle and restores its content from,
/// in order of priority, the reload callback, the CPU cache filled right
/// before teardown, or an empty allocation of the last size and format.
pub struct Texture2D {
    name: String,
    context: Weak<RenderingContext>,
    context_id: ContextId,
    samples: u32,
    inner: Mutex<TextureInner>,
    reload: Mutex<Option<ReloadCallback>>,
    listener: Mutex<Option<ListenerId>>,
}

impl std::fmt::Debug for Texture2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Texture2D")
            .field("name", &self.name)
            .field("context", &self.context_id)
            .field("extent", &inner.extent)
            .field("format", &inner.format)
            .field("populated", &inner.populated)
            .finish()
    }
}

impl Texture2D {
    /// Creates an empty texture in `context`.
    pub fn new(context: &Arc<RenderingContext>, name: impl Into<String>) -> Result<Arc<Self>, ResourceError> {
        Self::create(context, name.into(), 0)
    }

    /// Creates an empty multisampled texture.
    ///
    /// Fails with [`ResourceError::CapabilityUnsupported`] when the driver
    /// has no multisampled textures.
    pub fn new_multisample(
        context: &Arc<RenderingContext>,
        name: impl Into<String>,
        samples: u32,
    ) -> Result<Arc<Self>, ResourceError> {
        let name = name.into();
        if !context.capabilities().multisample_textures {
            log::warn!("Texture2D '{name}': multisampled textures are not supported by the driver.");
            return Err(ResourceError::CapabilityUnsupported(
                "multisample textures".to_string(),
            ));
        }
        Self::create(context, name, samples.max(1))
    }

    fn create(context: &Arc<RenderingContext>, name: String, samples: u32) -> Result<Arc<Self>, ResourceError> {
        if !context.is_valid() {
            return Err(ResourceError::Context(ContextError::InvalidContext));
        }
        let texture = Arc::new(Self {
            name,
            context: Arc::downgrade(context),
            context_id: context.id(),
            samples,
            inner: Mutex::new(TextureInner::default()),
            reload: Mutex::new(None),
            listener: Mutex::new(None),
        });
        texture.generate(context)?;
        let weak: Weak<dyn ContextListener> = Arc::downgrade(&texture) as Weak<dyn ContextListener>;
        *texture.listener.lock() = Some(context.subscribe(weak));
        Ok(texture)
    }

    fn generate(&self, context: &RenderingContext) -> Result<NativeHandle, ResourceError> {
        let bound = bind_context(context)?;
        let driver = bound.context.driver();
        let handle = driver
            .create_texture()
            .ok_or(DriverError::ObjectCreationFailed("texture"))?;
        debug_assert!(driver.is_texture(handle), "fresh texture {handle:?} is not a texture");
        let mut inner = self.inner.lock();
        inner.handle = Some(EpochHandle::new(handle, context));
        inner.populated = false;
        log::debug!("Texture2D '{}': generated {handle:?} in {}.", self.name, self.context_id);
        Ok(handle)
    }

    // --- Accessors ---

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the owning context.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Size of mip level 0.
    pub fn extent(&self) -> Extent2D {
        self.inner.lock().extent
    }

    /// Texel format.
    pub fn format(&self) -> PixelFormat {
        self.inner.lock().format
    }

    /// Sample count, `0` for a regular texture.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Whether this is a multisampled texture.
    pub fn is_multisample(&self) -> bool {
        self.samples > 0
    }

    /// Driver binding target.
    pub fn target(&self) -> TextureTarget {
        if self.is_multisample() {
            TextureTarget::Texture2DMultisample
        } else {
            TextureTarget::Texture2D
        }
    }

    /// The native handle, if it belongs to the current context epoch.
    pub fn handle(&self) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.handle_in(&context)
    }

    fn handle_in(&self, context: &RenderingContext) -> Option<NativeHandle> {
        self.inner.lock().handle.and_then(|h| h.get(context))
    }

    /// Whether the handle is valid and content was uploaded since the last
    /// recreation.
    pub fn is_valid(&self) -> bool {
        self.handle().is_some() && self.inner.lock().populated
    }

    /// Whether content is waiting in the CPU cache for the next recreation.
    pub fn has_cpu_cache(&self) -> bool {
        self.inner.lock().cpu_cache.is_some()
    }

    /// Current minification filter.
    pub fn min_filter(&self) -> TextureFilter {
        self.inner.lock().sampler.min_filter
    }

    /// Current anisotropy level.
    pub fn anisotropy_level(&self) -> f32 {
        self.inner.lock().sampler.anisotropy
    }

    // --- Reload ---

    /// Registers the callback used to restore content after recreation.
    /// It takes priority over the CPU cache.
    pub fn set_reload_callback(&self, callback: Option<ReloadCallback>) {
        *self.reload.lock() = callback;
    }

    /// Whether a reload callback is registered.
    pub fn has_reload_callback(&self) -> bool {
        self.reload.lock().is_some()
    }

    /// Invokes the reload callback. Returns `false` if none is registered.
    pub fn reload(&self, force: bool) -> bool {
        let callback = self.reload.lock().clone();
        match callback {
            Some(callback) => {
                callback(self, force);
                true
            }
            None => false,
        }
    }

    // --- Content ---

    /// Binds the texture on the active unit of a bound context.
    fn bind_scratch<'a>(&self, bound: &BoundContext<'a>) -> Result<NativeHandle, ResourceError> {
        let handle = self.handle_in(bound.context).ok_or(ResourceError::InvalidHandle)?;
        bound.context.state().bind_texture(self.target(), Some(handle));
        Ok(handle)
    }

    /// Binds the texture to texture `unit`.
    pub fn bind_to_unit(&self, unit: u32) -> Result<(), ResourceError> {
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        let handle = self.handle_in(&context).ok_or(ResourceError::InvalidHandle)?;
        bound
            .context
            .state()
            .bind_texture_to_unit(unit, self.target(), Some(handle));
        Ok(())
    }

    /// Replaces the whole content with `sheets`, one per mip level starting
    /// at level 0.
    ///
    /// Sampler parameters are re-applied, and the mip chain is regenerated
    /// when only level 0 is given and the min filter samples mipmaps.
    pub fn upload(&self, sheets: &[PixelSheet], internal_format: PixelFormat) -> Result<(), ResourceError> {
        if self.is_multisample() {
            return Err(ResourceError::CapabilityUnsupported(
                "pixel upload to a multisampled texture".to_string(),
            ));
        }
        let Some(base) = sheets.first() else {
            return Err(ResourceError::OutOfBounds);
        };
        if sheets.iter().any(|s| s.format != internal_format) {
            return Err(ResourceError::BackendError(format!(
                "texture '{}' expects {internal_format:?} pixels",
                self.name
            )));
        }
        let context = upgrade_context(&self.context)?;
        let max = context.capabilities().max_texture_size;
        if base.extent.width > max || base.extent.height > max {
            return Err(ResourceError::OutOfBounds);
        }

        let bound = bind_context(&context)?;
        self.bind_scratch(&bound)?;
        let driver = bound.context.driver();
        let target = self.target();
        for (level, sheet) in sheets.iter().enumerate() {
            driver.tex_image_2d(target, level as u32, internal_format, sheet.extent, Some(&sheet.data));
        }

        let sampler = {
            let mut inner = self.inner.lock();
            inner.extent = base.extent;
            inner.format = internal_format;
            inner.populated = true;
            inner.sampler
        };
        for parameter in sampler.parameters() {
            driver.tex_parameter(target, parameter);
        }
        if sheets.len() == 1 && sampler.min_filter.uses_mipmaps() {
            driver.generate_mipmap(target);
        } else {
            driver.tex_parameter(target, TextureParameter::MaxLevel(sheets.len() as u32 - 1));
        }
        log::debug!(
            "Texture2D '{}': uploaded {}x{} {internal_format:?} ({} levels).",
            self.name,
            base.extent.width,
            base.extent.height,
            sheets.len()
        );
        Ok(())
    }

    /// Allocates uninitialized storage of `extent` and `format`.
    pub fn allocate(&self, extent: Extent2D, format: PixelFormat) -> Result<(), ResourceError> {
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        self.bind_scratch(&bound)?;
        let driver = bound.context.driver();
        if self.is_multisample() {
            if !driver.tex_image_2d_multisample(self.samples, format, extent) {
                return Err(ResourceError::CapabilityUnsupported(
                    "multisample textures".to_string(),
                ));
            }
        } else {
            driver.tex_image_2d(self.target(), 0, format, extent, None);
            for parameter in self.inner.lock().sampler.parameters() {
                driver.tex_parameter(self.target(), parameter);
            }
        }
        let mut inner = self.inner.lock();
        inner.extent = extent;
        inner.format = format;
        inner.populated = true;
        Ok(())
    }

    /// Overwrites a `width` x `height` region at `(x, y)` of level 0.
    pub fn copy_pixels_from(
        &self,
        pixels: &[u8],
        format: PixelFormat,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
    ) -> Result<(), ResourceError> {
        let extent = Extent2D::new(width, height);
        if pixels.len() < format.image_size(extent) {
            return Err(ResourceError::OutOfBounds);
        }
        let (size, min_filter) = {
            let inner = self.inner.lock();
            (inner.extent, inner.sampler.min_filter)
        };
        let exceeds = |origin: u32, span: u32, limit: u32| {
            origin.checked_add(span).map_or(true, |end| end > limit)
        };
        if exceeds(x, width, size.width) || exceeds(y, height, size.height) {
            return Err(ResourceError::OutOfBounds);
        }

        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        self.bind_scratch(&bound)?;
        let driver = bound.context.driver();
        driver.tex_sub_image_2d(
            self.target(),
            0,
            Origin2D::new(x, y),
            extent,
            format,
            PixelSource::Slice(pixels),
        );
        if min_filter.uses_mipmaps() {
            driver.generate_mipmap(self.target());
        }
        Ok(())
    }

    /// Reads level 0 back in `format`.
    ///
    /// Uses a direct image query when the driver has one, and otherwise
    /// attaches the texture to a temporary framebuffer, which only works for
    /// [`PixelFormat::Rgba8`].
    pub fn read_pixels(&self, format: PixelFormat) -> Option<PixelSheet> {
        let context = upgrade_context(&self.context).ok()?;
        let bound = bind_context(&context).ok()?;
        self.read_level_zero(&bound, format)
    }

    fn read_level_zero(&self, bound: &BoundContext<'_>, format: PixelFormat) -> Option<PixelSheet> {
        if self.is_multisample() {
            log::warn!("Texture2D '{}': cannot read back a multisampled texture.", self.name);
            return None;
        }
        let extent = self.extent();
        if extent.is_empty() {
            return None;
        }
        let handle = self.bind_scratch(bound).ok()?;
        let context = bound.context;
        let driver = context.driver();
        let mut sheet = PixelSheet::new(extent, format);

        if context.capabilities().texture_image_readback
            && driver.get_tex_image(self.target(), 0, format, &mut sheet.data)
        {
            return Some(sheet);
        }

        if format != PixelFormat::Rgba8 {
            log::warn!(
                "Texture2D '{}': no image readback and framebuffer readback needs Rgba8, not {format:?}.",
                self.name
            );
            return None;
        }

        let framebuffer = driver.create_framebuffer()?;
        let previous = context.state().state().framebuffer;
        context.state().bind_framebuffer(Some(framebuffer));
        let complete = driver.framebuffer_texture_2d(Some(handle), 0);
        if complete {
            driver.read_pixels(Rect2D::from_extent(extent), format, &mut sheet.data);
        }
        {
            let mut state = context.state();
            state.bind_framebuffer(previous);
            state.forget_framebuffer(framebuffer);
        }
        driver.delete_framebuffer(framebuffer);

        if complete {
            Some(sheet)
        } else {
            log::warn!("Texture2D '{}': framebuffer readback failed.", self.name);
            None
        }
    }

    // --- Sampler parameters ---

    fn update_sampler(&self, update: impl FnOnce(&mut SamplerState) -> Option<TextureParameter>) {
        let (parameter, regenerate) = {
            let mut inner = self.inner.lock();
            let had_mips = inner.sampler.min_filter.uses_mipmaps();
            let Some(parameter) = update(&mut inner.sampler) else {
                return;
            };
            let regenerate = inner.populated && !had_mips && inner.sampler.min_filter.uses_mipmaps();
            (parameter, regenerate)
        };
        let Ok(context) = upgrade_context(&self.context) else {
            return;
        };
        let Ok(bound) = bind_context(&context) else {
            return;
        };
        if self.bind_scratch(&bound).is_err() {
            return;
        }
        let driver = bound.context.driver();
        driver.tex_parameter(self.target(), parameter);
        if regenerate {
            driver.generate_mipmap(self.target());
        }
    }

    /// Sets the minification filter. Switching to a mip filter regenerates
    /// the mip chain.
    pub fn set_min_filter(&self, filter: TextureFilter) {
        self.update_sampler(|s| {
            (s.min_filter != filter).then(|| {
                s.min_filter = filter;
                TextureParameter::MinFilter(filter)
            })
        });
    }

    /// Sets the magnification filter.
    pub fn set_mag_filter(&self, filter: TextureFilter) {
        self.update_sampler(|s| {
            (s.mag_filter != filter).then(|| {
                s.mag_filter = filter;
                TextureParameter::MagFilter(filter)
            })
        });
    }

    /// Sets the horizontal address mode.
    pub fn set_wrap_s(&self, mode: AddressMode) {
        self.update_sampler(|s| {
            (s.wrap_s != mode).then(|| {
                s.wrap_s = mode;
                TextureParameter::WrapS(mode)
            })
        });
    }

    /// Sets the vertical address mode.
    pub fn set_wrap_t(&self, mode: AddressMode) {
        self.update_sampler(|s| {
            (s.wrap_t != mode).then(|| {
                s.wrap_t = mode;
                TextureParameter::WrapT(mode)
            })
        });
    }

    /// Sets the border color.
    pub fn set_border_color(&self, color: LinearRgba) {
        self.update_sampler(|s| {
            (s.border_color != color).then(|| {
                s.border_color = color;
                TextureParameter::BorderColor(color)
            })
        });
    }

    /// Sets the anisotropy level, clamped to `[1, max_anisotropy]`.
    pub fn set_anisotropy_level(&self, level: f32) {
        let max = self
            .context
            .upgrade()
            .map_or(1.0, |c| c.capabilities().max_anisotropy)
            .max(1.0);
        let level = level.clamp(1.0, max);
        self.update_sampler(|s| {
            (s.anisotropy != level).then(|| {
                s.anisotropy = level;
                TextureParameter::MaxAnisotropy(level)
            })
        });
    }

    // --- Recovery ---

    fn restore(&self, context: &RenderingContext) -> Result<(), ResourceError> {
        self.generate(context)?;
        if self.reload(true) {
            self.inner.lock().cpu_cache = None;
            return Ok(());
        }
        let (cache, extent, format) = {
            let mut inner = self.inner.lock();
            (inner.cpu_cache.take(), inner.extent, inner.format)
        };
        match cache {
            Some(sheets) => self.upload(&sheets, format),
            None if !extent.is_empty() => self.allocate(extent, format),
            None => Ok(()),
        }
    }
}

impl ContextListener for Texture2D {
    fn on_context_setup_complete(&self, context: &RenderingContext) {
        if self.handle_in(context).is_some() {
            return;
        }
        match self.restore(context) {
            Ok(()) => log::debug!("Texture2D '{}': restored after recreation.", self.name),
            Err(e) => log::error!("Texture2D '{}': restore failed: {e}", self.name),
        }
    }

    fn on_context_will_be_destroyed(&self, context: &RenderingContext) {
        let wants_cache = !self.has_reload_callback()
            && context.settings().cache_textures_on_context_loss
            && !self.is_multisample()
            && self.inner.lock().populated;
        if wants_cache && !context.is_destroyed() {
            let snapshot = bind_context(context)
                .ok()
                .and_then(|bound| self.read_level_zero(&bound, self.format()));
            match snapshot {
                Some(sheet) => self.inner.lock().cpu_cache = Some(vec![sheet]),
                None => log::warn!("Texture2D '{}': content lost with the context.", self.name),
            }
        }
        let mut inner = self.inner.lock();
        inner.handle = None;
        inner.populated = false;
    }

    fn on_context_destroyed(&self, context: &RenderingContext) {
        let mut inner = self.inner.lock();
        inner.handle = None;
        inner.populated = false;
        if context.is_destroyed() {
            inner.cpu_cache = None;
        }
    }
}

impl Drop for Texture2D {
    fn drop(&mut self) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        if let Some(id) = self.listener.get_mut().take() {
            context.unsubscribe(id);
        }
        let Some(handle) = self.handle_in(&context) else {
            return;
        };
        match bind_context(&context) {
            Ok(bound) => {
                bound.context.state().forget_texture(handle);
                bound.context.driver().delete_texture(handle);
            }
            Err(e) => log::warn!("Texture2D '{}': leaking {handle:?} ({e}).", self.name),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::DriverCapabilities;
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::HeadlessDriver;
    use crate::renderer::RenderSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn setup(capabilities: DriverCapabilities) -> (Arc<HeadlessDriver>, RenderSystem, Arc<RenderingContext>) {
        let driver = Arc::new(HeadlessDriver::with_capabilities(capabilities));
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("c1")).unwrap();
        (driver, system, context)
    }

    fn red_sheet(size: u32) -> PixelSheet {
        PixelSheet::filled(Extent2D::new(size, size), PixelFormat::Rgba8, &RED)
    }

    #[test]
    fn test_setters_are_idempotent() {
        let (driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(4)], PixelFormat::Rgba8).unwrap();

        driver.reset_counters();
        texture.set_wrap_s(AddressMode::Repeat);
        texture.set_wrap_s(AddressMode::Repeat);
        assert_eq!(driver.call_count("tex_parameter"), 1);
    }

    #[test]
    fn test_mip_filter_regenerates_chain() {
        let (driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(8)], PixelFormat::Rgba8).unwrap();
        texture.set_min_filter(TextureFilter::LinearMipmapLinear);

        let _bind = context.scoped_bind(false).unwrap();
        assert_eq!(driver.texture_level_count(texture.handle().unwrap()), 4);
    }

    #[test]
    fn test_anisotropy_is_clamped() {
        let (_driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.set_anisotropy_level(64.0);
        assert_eq!(texture.anisotropy_level(), 16.0);
        texture.set_anisotropy_level(0.0);
        assert_eq!(texture.anisotropy_level(), 1.0);
    }

    #[test]
    fn test_copy_pixels_out_of_bounds() {
        let (_driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(4)], PixelFormat::Rgba8).unwrap();
        let patch = [0u8; 16];
        assert_eq!(
            texture.copy_pixels_from(&patch, PixelFormat::Rgba8, 2, 2, 3, 0),
            Err(ResourceError::OutOfBounds)
        );
        texture.copy_pixels_from(&patch, PixelFormat::Rgba8, 2, 2, 2, 2).unwrap();
        let sheet = texture.read_pixels(PixelFormat::Rgba8).unwrap();
        assert_eq!(sheet.texel(0, 0), Some(&RED[..]));
        assert_eq!(sheet.texel(3, 3), Some(&[0, 0, 0, 0][..]));
    }

    #[test]
    fn test_copy_pixels_rejects_overflowing_origin() {
        let (_driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(4)], PixelFormat::Rgba8).unwrap();
        let patch = [0u8; 16];
        assert_eq!(
            texture.copy_pixels_from(&patch, PixelFormat::Rgba8, 2, 2, u32::MAX, 0),
            Err(ResourceError::OutOfBounds)
        );
        assert_eq!(
            texture.copy_pixels_from(&patch, PixelFormat::Rgba8, 2, 2, 0, u32::MAX - 1),
            Err(ResourceError::OutOfBounds)
        );
        let sheet = texture.read_pixels(PixelFormat::Rgba8).unwrap();
        assert_eq!(sheet.texel(3, 3), Some(&RED[..]));
    }

    #[test]
    fn test_framebuffer_readback_fallback() {
        let (driver, _system, context) = setup(DriverCapabilities {
            texture_image_readback: false,
            ..HeadlessDriver::FULL_CAPABILITIES
        });
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(4)], PixelFormat::Rgba8).unwrap();

        let sheet = texture.read_pixels(PixelFormat::Rgba8).unwrap();
        assert!(sheet.texels().all(|t| t == RED));
        assert_eq!(driver.call_count("read_pixels"), 1);
        assert!(texture.read_pixels(PixelFormat::Rgba32F).is_none());
    }

    #[test]
    fn test_reload_callback_has_priority() {
        let (_driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(4)], PixelFormat::Rgba8).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        texture.set_reload_callback(Some(Arc::new(move |texture: &Texture2D, force: bool| {
            assert!(force);
            counter.fetch_add(1, Ordering::SeqCst);
            let white = PixelSheet::filled(Extent2D::new(4, 4), PixelFormat::Rgba8, &[255; 4]);
            texture.upload(&[white], PixelFormat::Rgba8).unwrap();
        })));

        context.recreate().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!texture.has_cpu_cache());
        let sheet = texture.read_pixels(PixelFormat::Rgba8).unwrap();
        assert!(sheet.texels().all(|t| t == [255; 4]));
    }

    #[test]
    fn test_empty_allocation_without_cache() {
        let driver = Arc::new(HeadlessDriver::new());
        let settings = crate::renderer::RenderSystemSettings {
            cache_textures_on_context_loss: false,
            ..Default::default()
        };
        let system = RenderSystem::new(driver, settings);
        let context = system.create_context(None, ContextConfig::labeled("c1")).unwrap();
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(4)], PixelFormat::Rgba8).unwrap();

        context.recreate().unwrap();
        assert!(texture.is_valid());
        assert_eq!(texture.extent(), Extent2D::new(4, 4));
        let sheet = texture.read_pixels(PixelFormat::Rgba8).unwrap();
        assert!(sheet.texels().all(|t| t == [0; 4]));
    }

    #[test]
    fn test_multisample_requires_capability() {
        let (_driver, _system, context) = setup(DriverCapabilities::BASELINE);
        assert!(matches!(
            Texture2D::new_multisample(&context, "msaa", 4),
            Err(ResourceError::CapabilityUnsupported(_))
        ));
    }

    #[test]
    fn test_released_context_invalidates_texture() {
        let (_driver, system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let texture = Texture2D::new(&context, "t").unwrap();
        texture.upload(&[red_sheet(2)], PixelFormat::Rgba8).unwrap();
        system.release_context(&context);
        assert!(texture.handle().is_none());
        assert!(!texture.has_cpu_cache());
    }
}
