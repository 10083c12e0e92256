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

use super::cursor::BatchCursor;
use super::{InstancePayload, InstanceStreamEncoder, InstanceStreamKind, InstancingMode, StreamState};
use crate::renderer::api::{ContextId, UniformData};
use crate::renderer::context::RenderingContext;
use crate::renderer::error::{ResourceError, StreamError};
use crate::renderer::resources::ShaderProgram;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// Streams each batch into a `vec4` uniform array.
///
/// The shader indexes the array with the instance id, so a batch is limited
/// by the number of vertex uniform vectors the driver exposes.
#[derive(Debug)]
pub struct UniformArrayStream<P: InstancePayload> {
    context_id: ContextId,
    kind: InstanceStreamKind,
    cursor: BatchCursor,
    program: Option<Weak<ShaderProgram>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: InstancePayload> UniformArrayStream<P> {
    /// Sizes a stream for the capabilities and settings of `context`.
    pub fn new(context: &Arc<RenderingContext>, kind: InstanceStreamKind) -> Self {
        let capabilities = context.capabilities();
        let settings = context.settings();
        let per_draw = (settings.uniform_array_max_instances as usize)
            .min(capabilities.max_vertex_uniform_vectors as usize / P::TEXELS_PER_INSTANCE)
            .max(1);
        let per_frame = (settings.max_instances_per_frame as usize).max(per_draw);
        Self {
            context_id: context.id(),
            kind,
            cursor: BatchCursor::new(P::TEXELS_PER_INSTANCE, per_draw, per_frame),
            program: None,
            _payload: PhantomData,
        }
    }

    fn program(&self) -> Result<Arc<ShaderProgram>, StreamError> {
        self.program
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(StreamError::Resource(ResourceError::InvalidHandle))
    }
}

impl<P: InstancePayload> InstanceStreamEncoder<P> for UniformArrayStream<P> {
    fn mode(&self) -> InstancingMode {
        InstancingMode::UniformArray
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
        Ok(())
    }

    fn prepare_for_render(&mut self, count: usize) -> Result<(), StreamError> {
        let program = self.program()?;
        let batch = self.cursor.flush(count)?;
        let texels = self.cursor.texels(batch);
        let found = program.set_uniform(&self.kind.uniform_name(), UniformData::Vec4Array(texels))?;
        if !found {
            log::trace!(
                "UniformArrayStream {}: program '{}' has no {} uniform.",
                self.context_id,
                program.label(),
                self.kind.uniform_name()
            );
        }
        Ok(())
    }

    fn complete_draw(&mut self) {
        self.cursor.complete_draw();
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

    fn context_with(capabilities: DriverCapabilities) -> (Arc<HeadlessDriver>, RenderSystem, Arc<RenderingContext>) {
        let driver = Arc::new(HeadlessDriver::with_capabilities(capabilities));
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        (driver, system, context)
    }

    #[test]
    fn test_capacity_follows_uniform_vectors() {
        let (_driver, _system, context) = context_with(DriverCapabilities {
            max_vertex_uniform_vectors: 64,
            ..DriverCapabilities::BASELINE
        });
        let matrices = UniformArrayStream::<AffineTransform>::new(&context, InstanceStreamKind::ModelMatrix);
        assert_eq!(matrices.max_instances_per_draw_call(), 16);
        let colors = UniformArrayStream::<InstanceColor>::new(&context, InstanceStreamKind::Color);
        assert_eq!(colors.max_instances_per_draw_call(), 32);
    }

    #[test]
    fn test_exactly_max_appends_succeed() {
        let (_driver, _system, context) = context_with(DriverCapabilities::BASELINE);
        let mut stream = UniformArrayStream::<AffineTransform>::new(&context, InstanceStreamKind::ModelMatrix);
        let max = stream.max_instances_per_draw_call();
        assert_eq!(max, 32);
        for _ in 0..max {
            stream.append(&AffineTransform::IDENTITY).unwrap();
        }
        assert!(matches!(
            stream.append(&AffineTransform::IDENTITY),
            Err(StreamError::CapacityExceeded { requested: 33, capacity: 32 })
        ));
    }

    #[test]
    fn test_prepare_uploads_batch_slice() {
        let (driver, _system, context) = context_with(DriverCapabilities::BASELINE);
        let program = ShaderProgram::new(
            &context,
            ProgramSource::new("tint", "uniform vec4 u_colorStream[32];\nvoid main() {}", "void main() {}"),
        )
        .unwrap();
        let mut stream = UniformArrayStream::<InstanceColor>::new(&context, InstanceStreamKind::Color);
        stream.bind_program(&program).unwrap();

        stream.begin_frame();
        stream.append(&InstanceColor(LinearRgba::RED)).unwrap();
        stream.append(&InstanceColor(LinearRgba::WHITE)).unwrap();
        stream.prepare_for_render(1).unwrap();
        stream.complete_draw();
        stream.prepare_for_render(1).unwrap();
        assert_eq!(stream.offset(), 1);

        let _bind = context.scoped_bind(false).unwrap();
        assert_eq!(
            driver.uniform_value(program.handle().unwrap(), "u_colorStream"),
            Some(RecordedUniform::Vec4Array(vec![[1.0, 1.0, 1.0, 1.0]]))
        );
    }

    #[test]
    fn test_prepare_without_program_fails() {
        let (_driver, _system, context) = context_with(DriverCapabilities::BASELINE);
        let mut stream = UniformArrayStream::<InstanceColor>::new(&context, InstanceStreamKind::Color);
        stream.append(&InstanceColor::default()).unwrap();
        assert_eq!(
            stream.prepare_for_render(1),
            Err(StreamError::Resource(ResourceError::InvalidHandle))
        );
        assert_eq!(stream.state(), StreamState::Accumulating);
    }
}
