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

use super::cursor::{Batch, BatchCursor};
use super::{InstancePayload, InstanceStreamEncoder, InstanceStreamKind, InstancingMode, StreamState};
use crate::math::{ceil_sqrt, next_power_of_two, Extent2D, Origin2D};
use crate::renderer::api::{
    BufferTarget, BufferUsage, NativeHandle, PixelFormat, PixelSource, TextureFilter,
    TextureParameter, TextureTarget, UniformValue,
};
use crate::renderer::context::RenderingContext;
use crate::renderer::error::{DriverError, ResourceError, StreamError};
use crate::renderer::resources::{bind_context, upgrade_context, EpochHandle, ShaderProgram};
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

const TEXEL_BYTES: usize = 16;

#[derive(Debug, Clone, Copy)]
struct DataTexture {
    texture: EpochHandle,
    pixel_buffer: Option<EpochHandle>,
}

/// Streams a whole frame of instances into an `RGBA32F` data texture.
///
/// The texture is square with a power-of-two edge large enough for
/// `max_instances_per_frame` instances. Each batch rewrites only the texture
/// rows it touches, through a persistent pixel-unpack buffer when the driver
/// can map buffers. The shader adds the per-batch offset uniform to the
/// instance id.
///
/// GPU objects are created lazily and tagged with the context epoch, so after
/// a native recreation they are rebuilt on the next upload.
#[derive(Debug)]
pub struct TextureBufferStream<P: InstancePayload> {
    context: Weak<RenderingContext>,
    kind: InstanceStreamKind,
    cursor: BatchCursor,
    edge: u32,
    gpu: Option<DataTexture>,
    program: Option<Weak<ShaderProgram>>,
    warned_unmapped: bool,
    _payload: PhantomData<fn() -> P>,
}

/// Edge of a square data texture holding `instances` payloads of
/// `texels_per_instance` texels each.
pub(crate) fn data_texture_edge(texels_per_instance: usize, instances: usize, max_texture_size: u32) -> u32 {
    let texels = (texels_per_instance * instances) as u64;
    let edge = u32::try_from(ceil_sqrt(texels)).unwrap_or(u32::MAX);
    next_power_of_two(edge).min(max_texture_size.max(1))
}

impl<P: InstancePayload> TextureBufferStream<P> {
    /// Sizes a stream for the capabilities and settings of `context`.
    pub fn new(context: &Arc<RenderingContext>, kind: InstanceStreamKind) -> Result<Self, StreamError> {
        let capabilities = context.capabilities();
        if !capabilities.texture_buffer_instancing {
            return Err(StreamError::Resource(ResourceError::CapabilityUnsupported(
                "texture buffer instancing".to_string(),
            )));
        }
        let requested = context.settings().max_instances_per_frame as usize;
        let edge = data_texture_edge(P::TEXELS_PER_INSTANCE, requested, capabilities.max_texture_size);
        let capacity = (edge as usize * edge as usize) / P::TEXELS_PER_INSTANCE;
        if capacity < requested {
            log::warn!(
                "TextureBufferStream {}: data texture clamped to {edge}x{edge}, {capacity} instances per frame instead of {requested}.",
                context.id()
            );
        }
        Ok(Self {
            context: Arc::downgrade(context),
            kind,
            cursor: BatchCursor::new(P::TEXELS_PER_INSTANCE, capacity, capacity),
            edge,
            gpu: None,
            program: None,
            warned_unmapped: false,
            _payload: PhantomData,
        })
    }

    /// Edge length of the data texture in texels.
    pub fn edge(&self) -> u32 {
        self.edge
    }

    /// Native data texture, if created in the current context epoch.
    pub fn data_texture(&self) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.gpu.and_then(|gpu| gpu.texture.get(&context))
    }

    fn program(&self) -> Result<Arc<ShaderProgram>, StreamError> {
        self.program
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(StreamError::Resource(ResourceError::InvalidHandle))
    }

    /// Returns the data texture and pixel buffer, creating them if the
    /// context epoch moved on. `context` must be bound.
    fn ensure_gpu(&mut self, context: &RenderingContext) -> Result<(NativeHandle, Option<NativeHandle>), ResourceError> {
        if let Some(gpu) = self.gpu {
            if let Some(texture) = gpu.texture.get(context) {
                return Ok((texture, gpu.pixel_buffer.and_then(|b| b.get(context))));
            }
        }

        let driver = context.driver();
        let texture = driver
            .create_texture()
            .ok_or(DriverError::ObjectCreationFailed("texture"))?;
        debug_assert!(driver.is_texture(texture));
        let extent = Extent2D::new(self.edge, self.edge);
        let mut state = context.state();
        state.bind_texture_to_unit(self.kind.texture_unit(), TextureTarget::Texture2D, Some(texture));
        driver.tex_image_2d(TextureTarget::Texture2D, 0, PixelFormat::Rgba32F, extent, None);
        for parameter in [
            TextureParameter::MinFilter(TextureFilter::Nearest),
            TextureParameter::MagFilter(TextureFilter::Nearest),
            TextureParameter::MaxLevel(0),
        ] {
            driver.tex_parameter(TextureTarget::Texture2D, parameter);
        }

        let pixel_buffer = if context.capabilities().buffer_mapping {
            let buffer = driver
                .create_buffer()
                .ok_or(DriverError::ObjectCreationFailed("buffer"))?;
            state.bind_buffer(BufferTarget::PixelUnpack, Some(buffer));
            driver.buffer_data(
                BufferTarget::PixelUnpack,
                extent.area() * TEXEL_BYTES,
                None,
                BufferUsage::StreamDraw,
            );
            state.bind_buffer(BufferTarget::PixelUnpack, None);
            Some(buffer)
        } else {
            None
        };
        drop(state);

        log::debug!(
            "TextureBufferStream {}: created {}x{} data texture for {:?} (pixel buffer: {}).",
            context.id(),
            self.edge,
            self.edge,
            self.kind,
            pixel_buffer.is_some()
        );
        self.gpu = Some(DataTexture {
            texture: EpochHandle::new(texture, context),
            pixel_buffer: pixel_buffer.map(|b| EpochHandle::new(b, context)),
        });
        Ok((texture, pixel_buffer))
    }

    /// Uploads the texture rows covering `batch`.
    fn upload_rows(
        &mut self,
        context: &RenderingContext,
        batch: Batch,
        texture: NativeHandle,
        pixel_buffer: Option<NativeHandle>,
    ) {
        let edge = self.edge as usize;
        let tpi = self.cursor.texels_per_instance();
        let first_row = batch.first * tpi / edge;
        let end_row = ((batch.first + batch.count) * tpi).div_ceil(edge);
        let rows = end_row - first_row;
        let texels = self.cursor.staged(first_row * edge..end_row * edge);
        let bytes: &[u8] = bytemuck::cast_slice(texels);
        let offset = first_row * edge * TEXEL_BYTES;
        let length = rows * edge * TEXEL_BYTES;

        let driver = context.driver();
        let mut state = context.state();
        let origin = Origin2D::new(0, first_row as u32);
        let extent = Extent2D::new(self.edge, rows as u32);

        if let Some(buffer) = pixel_buffer {
            state.bind_buffer(BufferTarget::PixelUnpack, Some(buffer));
            let mapped = driver.map_buffer_range(BufferTarget::PixelUnpack, offset, length, &mut |dst: &mut [u8]| {
                dst[..bytes.len()].copy_from_slice(bytes);
            });
            if mapped {
                state.bind_texture_to_unit(self.kind.texture_unit(), TextureTarget::Texture2D, Some(texture));
                driver.tex_sub_image_2d(
                    TextureTarget::Texture2D,
                    0,
                    origin,
                    extent,
                    PixelFormat::Rgba32F,
                    PixelSource::PixelBuffer { offset },
                );
                state.bind_buffer(BufferTarget::PixelUnpack, None);
                return;
            }
            state.bind_buffer(BufferTarget::PixelUnpack, None);
        }

        if !self.warned_unmapped {
            log::warn!(
                "TextureBufferStream {}: pixel buffer mapping unavailable, uploading instance data directly.",
                context.id()
            );
            self.warned_unmapped = true;
        }
        let mut padded = vec![0u8; length];
        padded[..bytes.len()].copy_from_slice(bytes);
        state.bind_texture_to_unit(self.kind.texture_unit(), TextureTarget::Texture2D, Some(texture));
        driver.tex_sub_image_2d(
            TextureTarget::Texture2D,
            0,
            origin,
            extent,
            PixelFormat::Rgba32F,
            PixelSource::Slice(&padded),
        );
    }
}

impl<P: InstancePayload> InstanceStreamEncoder<P> for TextureBufferStream<P> {
    fn mode(&self) -> InstancingMode {
        InstancingMode::TextureBuffer
    }

    fn kind(&self) -> InstanceStreamKind {
        self.kind
    }

    fn state(&self) -> StreamState {
        self.cursor.state()
    }

    fn max_instances_per_draw_call(&self) -> usize {
        self.cursor.per_draw()
    }

    fn max_instances_per_frame(&self) -> usize {
        self.cursor.per_frame()
    }

    fn offset(&self) -> usize {
        self.cursor.offset()
    }

    fn set_offset(&mut self, offset: usize) {
        self.cursor.set_offset(offset);
    }

    fn pending(&self) -> usize {
        self.cursor.pending()
    }

    fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    fn begin_frame(&mut self) {
        self.cursor.begin_frame();
    }

    fn append(&mut self, payload: &P) -> Result<(), StreamError> {
        self.cursor.push(payload)
    }

    fn append_slice(&mut self, payloads: &[P]) -> Result<(), StreamError> {
        self.cursor.push_slice(payloads)
    }

    fn bind_program(&mut self, program: &Arc<ShaderProgram>) -> Result<(), StreamError> {
        self.program = Some(Arc::downgrade(program));
        let unit = self.kind.texture_unit() as i32;
        program.set_uniform(&self.kind.texture_uniform_name(), UniformValue::Int(unit))?;
        Ok(())
    }

    fn prepare_for_render(&mut self, count: usize) -> Result<(), StreamError> {
        let context = upgrade_context(&self.context)?;
        let program = self.program()?;
        let bound = bind_context(&context)?;
        let (texture, pixel_buffer) = self.ensure_gpu(bound.context)?;

        let batch = self.cursor.flush(count)?;
        self.upload_rows(bound.context, batch, texture, pixel_buffer);

        let unit = self.kind.texture_unit() as i32;
        program.set_uniform(&self.kind.texture_uniform_name(), UniformValue::Int(unit))?;
        program.set_uniform(&self.kind.offset_uniform_name(), UniformValue::Int(batch.first as i32))?;
        log::trace!(
            "TextureBufferStream {}: flushed {} instances at offset {}.",
            context.id(),
            batch.count,
            batch.first
        );
        Ok(())
    }

    fn complete_draw(&mut self) {
        self.cursor.complete_draw();
    }
}

impl<P: InstancePayload> Drop for TextureBufferStream<P> {
    fn drop(&mut self) {
        let (Some(gpu), Some(context)) = (self.gpu.take(), self.context.upgrade()) else {
            return;
        };
        let Some(texture) = gpu.texture.get(&context) else {
            return;
        };
        let Ok(bound) = bind_context(&context) else {
            log::warn!("TextureBufferStream {}: leaking data texture, context not bindable.", context.id());
            return;
        };
        let driver = bound.context.driver();
        let mut state = bound.context.state();
        state.forget_texture(texture);
        driver.delete_texture(texture);
        if let Some(buffer) = gpu.pixel_buffer.and_then(|b| b.get(&context)) {
            state.forget_buffer(buffer);
            driver.delete_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::LinearRgba;
    use crate::renderer::api::{DriverCapabilities, ProgramSource};
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::{HeadlessDriver, RecordedUniform};
    use crate::renderer::instancing::{AffineTransform, InstanceColor};
    use crate::renderer::RenderSystem;

    const VERTEX: &str = "uniform sampler2D u_colorStreamTexture;\nuniform int u_colorStreamOffset;\nvoid main() {}";

    fn setup(capabilities: DriverCapabilities) -> (Arc<HeadlessDriver>, RenderSystem, Arc<RenderingContext>) {
        let driver = Arc::new(HeadlessDriver::with_capabilities(capabilities));
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        (driver, system, context)
    }

    #[test]
    fn test_edge_length() {
        assert_eq!(data_texture_edge(4, 16384, 8192), 256);
        assert_eq!(data_texture_edge(1, 16384, 8192), 128);
        assert_eq!(data_texture_edge(4, 1000, 8192), 64);
        assert_eq!(data_texture_edge(4, 16384, 128), 128);
    }

    #[test]
    fn test_capacity_is_edge_squared() {
        let (_driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let stream = TextureBufferStream::<AffineTransform>::new(&context, InstanceStreamKind::ModelMatrix).unwrap();
        assert_eq!(stream.edge(), 256);
        assert_eq!(stream.max_instances_per_draw_call(), 16384);
        assert_eq!(stream.max_instances_per_frame(), 16384);
    }

    #[test]
    fn test_requires_capability() {
        let (_driver, _system, context) = setup(DriverCapabilities::BASELINE);
        assert!(TextureBufferStream::<InstanceColor>::new(&context, InstanceStreamKind::Color).is_err());
    }

    fn run_two_batches(driver: &HeadlessDriver, context: &Arc<RenderingContext>) -> Vec<u8> {
        let program = ShaderProgram::new(context, ProgramSource::new("tb", VERTEX, "void main() {}")).unwrap();
        let mut stream = TextureBufferStream::<InstanceColor>::new(context, InstanceStreamKind::Color).unwrap();
        stream.bind_program(&program).unwrap();
        stream.begin_frame();
        stream.append(&InstanceColor(LinearRgba::RED)).unwrap();
        stream.prepare_for_render(1).unwrap();
        stream.complete_draw();
        stream.append(&InstanceColor(LinearRgba::WHITE)).unwrap();
        stream.prepare_for_render(1).unwrap();

        let _bind = context.scoped_bind(false).unwrap();
        assert_eq!(
            driver.uniform_value(program.handle().unwrap(), "u_colorStreamOffset"),
            Some(RecordedUniform::Value(UniformValue::Int(1)))
        );
        let image = driver.texture_image(stream.data_texture().unwrap(), 0).unwrap();
        image.data[..32].to_vec()
    }

    fn expected_row() -> Vec<u8> {
        let texels = [LinearRgba::RED.to_array(), LinearRgba::WHITE.to_array()];
        bytemuck::cast_slice(&texels).to_vec()
    }

    #[test]
    fn test_mapped_upload_writes_rows() {
        let (driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        assert_eq!(run_two_batches(&driver, &context), expected_row());
        assert!(driver.call_count("map_buffer_range") >= 2);
    }

    #[test]
    fn test_unmapped_upload_falls_back() {
        let (driver, _system, context) = setup(DriverCapabilities {
            buffer_mapping: false,
            ..HeadlessDriver::FULL_CAPABILITIES
        });
        assert_eq!(run_two_batches(&driver, &context), expected_row());
        assert_eq!(driver.call_count("map_buffer_range"), 0);
    }

    #[test]
    fn test_data_texture_rebuilt_after_recreation() {
        let (_driver, _system, context) = setup(HeadlessDriver::FULL_CAPABILITIES);
        let program = ShaderProgram::new(&context, ProgramSource::new("tb", VERTEX, "void main() {}")).unwrap();
        let mut stream = TextureBufferStream::<InstanceColor>::new(&context, InstanceStreamKind::Color).unwrap();
        stream.bind_program(&program).unwrap();
        stream.append(&InstanceColor::default()).unwrap();
        stream.prepare_for_render(1).unwrap();
        assert!(stream.data_texture().is_some());

        context.recreate().unwrap();
        assert!(stream.data_texture().is_none());

        stream.begin_frame();
        stream.append(&InstanceColor::default()).unwrap();
        stream.prepare_for_render(1).unwrap();
        assert!(stream.data_texture().is_some());
    }
}
