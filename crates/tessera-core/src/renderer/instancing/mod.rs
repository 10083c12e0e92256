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

//! Per-instance data streams for instanced draws.
//!
//! Instanced draws read per-instance data (model matrices, colors, UV
//! transforms) that the CPU writes every frame. How that data reaches the GPU
//! depends on the driver, so streaming is a strategy chosen once per context
//! at setup:
//!
//! - [`UniformArrayStream`] uploads each batch to a `vec4` uniform array. It
//!   works everywhere but batches are small.
//! - [`TextureBufferStream`] writes the whole frame into an `RGBA32F` data
//!   texture through a mapped pixel buffer, and the shader fetches texels
//!   from a per-batch offset.
//!
//! Both implement [`InstanceStreamEncoder`].

mod cursor;
mod payload;
mod texture_buffer;
mod uniform_array;

pub use self::payload::{AffineTransform, InstanceColor, InstancePayload, UvRect};
pub use self::texture_buffer::TextureBufferStream;
pub use self::uniform_array::UniformArrayStream;

use crate::renderer::api::{DriverCapabilities, MAX_UV_CHANNELS};
use crate::renderer::context::RenderingContext;
use crate::renderer::error::{ContextError, StreamError};
use crate::renderer::resources::ShaderProgram;
use crate::renderer::settings::RenderSystemSettings;
use std::sync::Arc;

/// How instance data reaches the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstancingMode {
    /// Per-batch upload into a uniform array.
    UniformArray,
    /// Per-frame upload into a data texture.
    TextureBuffer,
}

impl InstancingMode {
    /// Picks the mode for a context from its capability probe.
    pub fn select(capabilities: &DriverCapabilities, settings: &RenderSystemSettings) -> Self {
        if settings.prefer_texture_buffer_instancing && capabilities.texture_buffer_instancing {
            InstancingMode::TextureBuffer
        } else {
            InstancingMode::UniformArray
        }
    }
}

/// Which per-instance attribute a stream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceStreamKind {
    /// Model matrices.
    ModelMatrix,
    /// Instance colors.
    Color,
    /// UV transform of one UV channel.
    Uv(u8),
}

impl InstanceStreamKind {
    /// Base name of the shader-side uniform.
    pub fn uniform_name(&self) -> String {
        match self {
            InstanceStreamKind::ModelMatrix => "u_modelMatrices".to_string(),
            InstanceStreamKind::Color => "u_colorStream".to_string(),
            InstanceStreamKind::Uv(channel) => format!("u_uvStream{channel}"),
        }
    }

    /// Name of the sampler uniform in texture-buffer mode.
    pub fn texture_uniform_name(&self) -> String {
        format!("{}Texture", self.uniform_name())
    }

    /// Name of the batch offset uniform in texture-buffer mode.
    pub fn offset_uniform_name(&self) -> String {
        format!("{}Offset", self.uniform_name())
    }

    /// Texture unit reserved for the stream's data texture.
    pub fn texture_unit(&self) -> u32 {
        match self {
            InstanceStreamKind::ModelMatrix => 10,
            InstanceStreamKind::Color => 11,
            InstanceStreamKind::Uv(channel) => 12 + u32::from(*channel),
        }
    }

    /// Whether the kind names a valid attribute.
    pub fn is_valid(&self) -> bool {
        match self {
            InstanceStreamKind::Uv(channel) => usize::from(*channel) < MAX_UV_CHANNELS,
            _ => true,
        }
    }
}

/// Where a stream is in its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamState {
    /// No instances pending.
    #[default]
    Idle,
    /// Instances appended since the last draw.
    Accumulating,
    /// A batch was uploaded and awaits its draw call.
    FlushedForDraw,
}

/// Encodes per-instance payloads of type `P` for instanced draws.
///
/// A frame looks like:
///
/// 1. [`begin_frame`](Self::begin_frame) rewinds the cursor.
/// 2. [`append`](Self::append) stages instances, up to
///    [`max_instances_per_draw_call`](Self::max_instances_per_draw_call).
/// 3. [`prepare_for_render`](Self::prepare_for_render) uploads the batch.
/// 4. The caller issues the draw, then [`complete_draw`](Self::complete_draw)
///    advances the cursor past the batch.
pub trait InstanceStreamEncoder<P: InstancePayload>: Send {
    /// Strategy of this encoder.
    fn mode(&self) -> InstancingMode;

    /// Attribute the stream feeds.
    fn kind(&self) -> InstanceStreamKind;

    /// Current state.
    fn state(&self) -> StreamState;

    /// Largest batch one draw call can consume.
    fn max_instances_per_draw_call(&self) -> usize;

    /// Instances the stream can stage per frame.
    fn max_instances_per_frame(&self) -> usize;

    /// First instance of the current batch within the frame.
    fn offset(&self) -> usize;

    /// Moves the cursor, dropping pending instances.
    fn set_offset(&mut self, offset: usize);

    /// Instances appended since the last draw.
    fn pending(&self) -> usize;

    /// Instances that can still be appended to the current batch.
    fn remaining(&self) -> usize;

    /// Rewinds the cursor for a new frame.
    fn begin_frame(&mut self);

    /// Stages one instance.
    fn append(&mut self, payload: &P) -> Result<(), StreamError>;

    /// Stages every payload, or none if they do not fit.
    fn append_slice(&mut self, payloads: &[P]) -> Result<(), StreamError>;

    /// Points the stream's uniforms of `program` at this stream.
    fn bind_program(&mut self, program: &Arc<ShaderProgram>) -> Result<(), StreamError>;

    /// Uploads the first `count` pending instances for the next draw.
    fn prepare_for_render(&mut self, count: usize) -> Result<(), StreamError>;

    /// Advances past the batch flushed by `prepare_for_render`.
    fn complete_draw(&mut self);
}

/// Creates the encoder matching the instancing mode of `context`.
pub fn create_instance_stream<P: InstancePayload>(
    context: &Arc<RenderingContext>,
    kind: InstanceStreamKind,
) -> Result<Box<dyn InstanceStreamEncoder<P>>, StreamError> {
    let mode = context
        .instancing_mode()
        .ok_or(StreamError::from(ContextError::InvalidContext))?;
    let stream: Box<dyn InstanceStreamEncoder<P>> = match mode {
        InstancingMode::UniformArray => Box::new(UniformArrayStream::new(context, kind)),
        InstancingMode::TextureBuffer => Box::new(TextureBufferStream::new(context, kind)?),
    };
    log::debug!(
        "RenderingContext {}: created {mode:?} stream for {kind:?} ({} per draw).",
        context.id(),
        stream.max_instances_per_draw_call()
    );
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDriver;

    #[test]
    fn test_select_follows_capability_and_preference() {
        let full = HeadlessDriver::FULL_CAPABILITIES;
        let mut settings = RenderSystemSettings::default();
        assert_eq!(InstancingMode::select(&full, &settings), InstancingMode::TextureBuffer);
        assert_eq!(
            InstancingMode::select(&DriverCapabilities::BASELINE, &settings),
            InstancingMode::UniformArray
        );
        settings.prefer_texture_buffer_instancing = false;
        assert_eq!(InstancingMode::select(&full, &settings), InstancingMode::UniformArray);
    }

    #[test]
    fn test_uniform_names() {
        assert_eq!(InstanceStreamKind::ModelMatrix.texture_uniform_name(), "u_modelMatricesTexture");
        assert_eq!(InstanceStreamKind::Uv(2).offset_uniform_name(), "u_uvStream2Offset");
        assert_eq!(InstanceStreamKind::Uv(2).texture_unit(), 14);
        assert!(!InstanceStreamKind::Uv(4).is_valid());
    }
}
