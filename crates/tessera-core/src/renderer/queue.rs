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

//! Recorded draw submission.
//!
//! A [`RenderQueue`] records [`RenderCommand`]s during the frame and replays
//! them in [`RenderQueue::draw`], splitting instanced draws into batches that
//! fit the context's instance streams.

use crate::math::{LinearRgba, Rect2D};
use crate::renderer::api::{ContextId, MAX_UV_CHANNELS};
use crate::renderer::context::RenderingContext;
use crate::renderer::error::{ResourceError, StreamError};
use crate::renderer::instancing::{
    create_instance_stream, AffineTransform, InstanceColor, InstanceStreamEncoder,
    InstanceStreamKind, UvRect,
};
use crate::renderer::pool::RenderPass;
use crate::renderer::resources::{bind_context, upgrade_context, ShaderProgram, VertexArray};
use std::sync::{Arc, Weak};

/// Instanced draw of one vertex array.
///
/// `colors` and each present UV channel carry one entry per transform.
#[derive(Debug, Clone)]
pub struct InstancedDraw {
    /// Mesh to draw.
    pub vertex_array: Arc<VertexArray>,
    /// One model transform per instance.
    pub transforms: Vec<AffineTransform>,
    /// Per-instance colors.
    pub colors: Option<Vec<InstanceColor>>,
    /// Per-instance UV rectangles, indexed by UV channel.
    pub uvs: [Option<Vec<UvRect>>; MAX_UV_CHANNELS],
}

impl InstancedDraw {
    /// One instance per transform, no per-instance colors or UVs.
    pub fn new(vertex_array: Arc<VertexArray>, transforms: Vec<AffineTransform>) -> Self {
        Self {
            vertex_array,
            transforms,
            colors: None,
            uvs: Default::default(),
        }
    }

    /// Adds per-instance colors.
    pub fn with_colors(mut self, colors: Vec<InstanceColor>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Adds per-instance UV rectangles for channel 0.
    pub fn with_uvs(self, uvs: Vec<UvRect>) -> Self {
        self.with_uv_channel(0, uvs)
    }

    /// Adds per-instance UV rectangles for `channel`. Channels past
    /// [`MAX_UV_CHANNELS`] are ignored.
    pub fn with_uv_channel(mut self, channel: usize, uvs: Vec<UvRect>) -> Self {
        match self.uvs.get_mut(channel) {
            Some(slot) => *slot = Some(uvs),
            None => log::warn!("InstancedDraw: UV channel {channel} is out of range, ignored."),
        }
        self
    }

    /// Bit `n` is set when UV channel `n` is present.
    pub fn uv_mask(&self) -> u8 {
        self.uvs
            .iter()
            .enumerate()
            .filter(|(_, uvs)| uvs.is_some())
            .fold(0, |mask, (channel, _)| mask | (1 << channel))
    }

    /// Number of instances.
    pub fn instance_count(&self) -> usize {
        self.transforms.len()
    }

    fn is_consistent(&self) -> bool {
        let n = self.transforms.len();
        has_len(&self.colors, n) && self.uvs.iter().all(|uvs| has_len(uvs, n))
    }

    /// Whether `other` feeds the same mesh through the same set of streams.
    fn can_merge(&self, other: &InstancedDraw) -> bool {
        Arc::ptr_eq(&self.vertex_array, &other.vertex_array)
            && self.colors.is_some() == other.colors.is_some()
            && self.uv_mask() == other.uv_mask()
    }

    fn extend(&mut self, other: InstancedDraw) {
        self.transforms.extend(other.transforms);
        if let (Some(colors), Some(more)) = (self.colors.as_mut(), other.colors) {
            colors.extend(more);
        }
        for (uvs, more) in self.uvs.iter_mut().zip(other.uvs) {
            if let (Some(uvs), Some(more)) = (uvs.as_mut(), more) {
                uvs.extend(more);
            }
        }
    }
}

fn has_len<T>(values: &Option<Vec<T>>, len: usize) -> bool {
    values.as_ref().map_or(true, |v| v.len() == len)
}

/// A recorded command.
#[derive(Debug, Clone)]
pub enum RenderCommand {
    /// Clears the color and/or depth attachment.
    Clear {
        /// Clear color, `None` keeps the color attachment.
        color: Option<LinearRgba>,
        /// Clear depth, `None` keeps the depth attachment.
        depth: Option<f32>,
    },
    /// Binds a render pass: fixed-function state, program and pass uniforms.
    SetRenderPass(Box<RenderPass>),
    /// Draws instances with the current render pass.
    DrawInstanced(InstancedDraw),
    /// Pushes a scissor rectangle, intersected with the enclosing one.
    PushScissorRect(Rect2D),
    /// Pops the innermost scissor rectangle.
    PopScissorRect,
    /// Enables a user clip plane.
    EnableClipPlane(usize),
    /// Disables a user clip plane.
    DisableClipPlane(usize),
    /// Sets the viewport.
    SetViewport(Rect2D),
}

/// What a [`RenderQueue::draw`] submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawStats {
    /// Driver draw calls issued.
    pub draw_calls: usize,
    /// Instances drawn.
    pub instances: usize,
}

/// Command recorder bound to one context.
pub struct RenderQueue {
    context: Weak<RenderingContext>,
    context_id: ContextId,
    commands: Vec<RenderCommand>,
    transforms: Box<dyn InstanceStreamEncoder<AffineTransform>>,
    colors: Box<dyn InstanceStreamEncoder<InstanceColor>>,
    uvs: Vec<Box<dyn InstanceStreamEncoder<UvRect>>>,
}

impl std::fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderQueue")
            .field("context", &self.context_id)
            .field("commands", &self.commands.len())
            .field("mode", &self.transforms.mode())
            .finish()
    }
}

impl RenderQueue {
    /// Creates a queue with its instance streams in `context`.
    pub fn new(context: &Arc<RenderingContext>) -> Result<Self, StreamError> {
        Ok(Self {
            context: Arc::downgrade(context),
            context_id: context.id(),
            commands: Vec::new(),
            transforms: create_instance_stream(context, InstanceStreamKind::ModelMatrix)?,
            colors: create_instance_stream(context, InstanceStreamKind::Color)?,
            uvs: (0..MAX_UV_CHANNELS as u8)
                .map(|channel| create_instance_stream::<UvRect>(context, InstanceStreamKind::Uv(channel)))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Id of the owning context.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Recorded commands, in submission order.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Records a raw command.
    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    /// Records a clear.
    pub fn clear(&mut self, color: Option<LinearRgba>, depth: Option<f32>) {
        self.push(RenderCommand::Clear { color, depth });
    }

    /// Records a snapshot of `pass`.
    pub fn set_render_pass(&mut self, pass: &RenderPass) {
        self.push(RenderCommand::SetRenderPass(Box::new(pass.clone())));
    }

    /// Records an instanced draw. Fails with [`ResourceError::OutOfBounds`]
    /// when the per-instance arrays disagree in length.
    ///
    /// A draw directly following one of the same mesh, with the same color and
    /// UV channels, is folded into it while the result still fits one draw
    /// call.
    pub fn draw_instanced(&mut self, draw: InstancedDraw) -> Result<(), ResourceError> {
        if !draw.is_consistent() {
            return Err(ResourceError::OutOfBounds);
        }
        if draw.transforms.is_empty() {
            return Ok(());
        }
        let limit = self.batch_limit(&draw);
        if let Some(RenderCommand::DrawInstanced(last)) = self.commands.last_mut() {
            if last.can_merge(&draw) && last.instance_count() + draw.instance_count() <= limit {
                last.extend(draw);
                return Ok(());
            }
        }
        self.push(RenderCommand::DrawInstanced(draw));
        Ok(())
    }

    /// Records a scissor push.
    pub fn push_scissor_rect(&mut self, rect: Rect2D) {
        self.push(RenderCommand::PushScissorRect(rect));
    }

    /// Records a scissor pop.
    pub fn pop_scissor_rect(&mut self) {
        self.push(RenderCommand::PopScissorRect);
    }

    /// Records enabling clip plane `index`.
    pub fn enable_clip_plane(&mut self, index: usize) {
        self.push(RenderCommand::EnableClipPlane(index));
    }

    /// Records disabling clip plane `index`.
    pub fn disable_clip_plane(&mut self, index: usize) {
        self.push(RenderCommand::DisableClipPlane(index));
    }

    /// Records a viewport change.
    pub fn set_viewport(&mut self, rect: Rect2D) {
        self.push(RenderCommand::SetViewport(rect));
    }

    /// Largest batch every stream used by `draw` can hold.
    fn batch_limit(&self, draw: &InstancedDraw) -> usize {
        let mut limit = self.transforms.max_instances_per_draw_call();
        if draw.colors.is_some() {
            limit = limit.min(self.colors.max_instances_per_draw_call());
        }
        for (stream, uvs) in self.uvs.iter().zip(&draw.uvs) {
            if uvs.is_some() {
                limit = limit.min(stream.max_instances_per_draw_call());
            }
        }
        limit.max(1)
    }

    /// Replays the recorded commands under a scoped bind, then clears them.
    ///
    /// The commands are dropped even when a command fails.
    pub fn draw(&mut self) -> Result<DrawStats, StreamError> {
        let commands = std::mem::take(&mut self.commands);
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        let context = bound.context;

        self.transforms.begin_frame();
        self.colors.begin_frame();
        for stream in &mut self.uvs {
            stream.begin_frame();
        }

        let mut stats = DrawStats::default();
        let mut program: Option<Arc<ShaderProgram>> = None;
        let mut scissors: Vec<Rect2D> = Vec::new();

        for command in &commands {
            match command {
                RenderCommand::Clear { color, depth } => {
                    let mut state = context.state();
                    if let Some(color) = color {
                        state.set_clear_color(*color);
                    }
                    if let Some(depth) = depth {
                        state.set_clear_depth(*depth);
                        state.set_depth_write(true);
                    }
                    drop(state);
                    context.driver().clear(color.is_some(), depth.is_some());
                }
                RenderCommand::SetRenderPass(pass) => {
                    pass.bind(context)?;
                    if let Some(pass_program) = &pass.program {
                        self.transforms.bind_program(pass_program)?;
                        self.colors.bind_program(pass_program)?;
                        for stream in &mut self.uvs {
                            stream.bind_program(pass_program)?;
                        }
                    }
                    program = pass.program.clone();
                }
                RenderCommand::DrawInstanced(draw) => {
                    if program.is_none() {
                        log::warn!(
                            "RenderQueue {}: instanced draw without a render pass, skipped.",
                            self.context_id
                        );
                        continue;
                    }
                    self.submit(context, draw, &mut stats)?;
                }
                RenderCommand::PushScissorRect(rect) => {
                    let rect = scissors.last().map_or(*rect, |outer| outer.intersection(rect));
                    scissors.push(rect);
                    let mut state = context.state();
                    state.set_scissor_enabled(true);
                    state.set_scissor_rect(rect);
                }
                RenderCommand::PopScissorRect => {
                    scissors.pop();
                    let mut state = context.state();
                    match scissors.last() {
                        Some(rect) => state.set_scissor_rect(*rect),
                        None => state.set_scissor_enabled(false),
                    }
                }
                RenderCommand::EnableClipPlane(index) => {
                    context.state().set_clip_plane_enabled(*index, true);
                }
                RenderCommand::DisableClipPlane(index) => {
                    context.state().set_clip_plane_enabled(*index, false);
                }
                RenderCommand::SetViewport(rect) => context.state().set_viewport(*rect),
            }
        }

        // Scissoring never leaks into the next frame.
        if !scissors.is_empty() {
            log::warn!(
                "RenderQueue {}: {} scissor rect(s) left pushed at the end of the frame.",
                self.context_id,
                scissors.len()
            );
            context.state().set_scissor_enabled(false);
        }
        context.validate_state();
        Ok(stats)
    }

    fn submit(&mut self, context: &RenderingContext, draw: &InstancedDraw, stats: &mut DrawStats) -> Result<(), StreamError> {
        let limit = self.batch_limit(draw);
        let index_count = draw.vertex_array.index_count();
        let topology = draw.vertex_array.topology();
        let index_format = draw.vertex_array.index_format();

        let mut first = 0;
        while first < draw.transforms.len() {
            let end = (first + limit).min(draw.transforms.len());
            let count = end - first;

            self.transforms.append_slice(&draw.transforms[first..end])?;
            self.transforms.prepare_for_render(count)?;
            if let Some(colors) = &draw.colors {
                self.colors.append_slice(&colors[first..end])?;
                self.colors.prepare_for_render(count)?;
            }
            for (stream, uvs) in self.uvs.iter_mut().zip(&draw.uvs) {
                if let Some(uvs) = uvs {
                    stream.append_slice(&uvs[first..end])?;
                    stream.prepare_for_render(count)?;
                }
            }

            let handle = draw
                .vertex_array
                .handle()
                .ok_or(StreamError::Resource(ResourceError::InvalidHandle))?;
            context.state().bind_vertex_array(Some(handle));
            context
                .driver()
                .draw_elements_instanced(topology, index_count, index_format, count as u32);

            self.transforms.complete_draw();
            if draw.colors.is_some() {
                self.colors.complete_draw();
            }
            for (stream, uvs) in self.uvs.iter_mut().zip(&draw.uvs) {
                if uvs.is_some() {
                    stream.complete_draw();
                }
            }
            stats.draw_calls += 1;
            stats.instances += count;
            first = end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::{DriverCapabilities, MeshData, ProgramSource, VertexAttributeSemantic};
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::{HeadlessDriver, RecordedUniform};
    use crate::renderer::pool::RenderPassType;
    use crate::renderer::RenderSystem;

    const VERTEX: &str = "uniform vec4 u_modelMatrices[128];
uniform vec4 u_colorStream[32];
uniform vec4 u_uvStream0[32];
uniform vec4 u_uvStream2[32];
void main() {}";

    struct Scene {
        driver: Arc<HeadlessDriver>,
        system: RenderSystem,
        context: Arc<RenderingContext>,
        mesh: Arc<VertexArray>,
        program: Arc<ShaderProgram>,
    }

    fn scene(capabilities: DriverCapabilities) -> Scene {
        let driver = Arc::new(HeadlessDriver::with_capabilities(capabilities));
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("q")).unwrap();
        let mesh = VertexArray::new(&context).unwrap();
        mesh.set_mesh(
            MeshData::new()
                .with_indices(vec![0, 1, 2])
                .with_stream(VertexAttributeSemantic::Position, 2, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]),
        )
        .unwrap();
        let program = ShaderProgram::new(&context, ProgramSource::new("quad", VERTEX, "void main() {}")).unwrap();
        Scene {
            driver,
            system,
            context,
            mesh,
            program,
        }
    }

    fn transforms(n: usize) -> Vec<AffineTransform> {
        (0..n)
            .map(|i| AffineTransform::from_translation(i as f32, 0.0, 0.0))
            .collect()
    }

    #[test]
    fn test_draw_splits_batches_at_stream_limit() {
        let scene = scene(DriverCapabilities::BASELINE);
        let mut pass = scene
            .system
            .create_render_pass(Some(&scene.context), RenderPassType::Default)
            .unwrap();
        pass.program = Some(scene.program.clone());

        let mut queue = RenderQueue::new(&scene.context).unwrap();
        queue.set_render_pass(&pass);
        queue
            .draw_instanced(InstancedDraw::new(scene.mesh.clone(), transforms(70)))
            .unwrap();
        let stats = queue.draw().unwrap();

        // Baseline uniform arrays hold 32 instances per draw.
        assert_eq!(stats, DrawStats { draw_calls: 3, instances: 70 });
        assert!(queue.is_empty());
        let _bind = scene.context.scoped_bind(false).unwrap();
        let counts: Vec<u32> = scene
            .driver
            .draw_calls()
            .iter()
            .map(|d| d.instance_count)
            .collect();
        assert_eq!(counts, vec![32, 32, 6]);
    }

    fn bound_pass(scene: &Scene) -> Box<RenderPass> {
        let mut pass = scene
            .system
            .create_render_pass(Some(&scene.context), RenderPassType::Default)
            .unwrap();
        pass.program = Some(scene.program.clone());
        Box::new(RenderPass::clone(&pass))
    }

    #[test]
    fn test_adjacent_draws_of_same_mesh_are_merged() {
        let scene = scene(DriverCapabilities::BASELINE);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        queue.push(RenderCommand::SetRenderPass(bound_pass(&scene)));
        queue
            .draw_instanced(InstancedDraw::new(scene.mesh.clone(), transforms(10)))
            .unwrap();
        queue
            .draw_instanced(InstancedDraw::new(scene.mesh.clone(), transforms(5)))
            .unwrap();
        assert_eq!(queue.len(), 2);

        // 15 + 30 no longer fits one baseline draw call.
        queue
            .draw_instanced(InstancedDraw::new(scene.mesh.clone(), transforms(30)))
            .unwrap();
        assert_eq!(queue.len(), 3);
        queue
            .draw_instanced(
                InstancedDraw::new(scene.mesh.clone(), transforms(2))
                    .with_colors(vec![InstanceColor::default(); 2]),
            )
            .unwrap();
        assert_eq!(queue.len(), 4);

        let other = VertexArray::new(&scene.context).unwrap();
        other.set_indices(vec![0, 1, 2]).unwrap();
        queue
            .draw_instanced(InstancedDraw::new(other, transforms(1)))
            .unwrap();
        assert_eq!(queue.len(), 5);

        match &queue.commands()[1] {
            RenderCommand::DrawInstanced(draw) => {
                assert_eq!(draw.instance_count(), 15);
                assert_eq!(draw.transforms[10], AffineTransform::from_translation(0.0, 0.0, 0.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
        let stats = queue.draw().unwrap();
        assert_eq!(stats, DrawStats { draw_calls: 4, instances: 48 });
    }

    #[test]
    fn test_uv_channels_feed_their_own_streams() {
        let scene = scene(DriverCapabilities::BASELINE);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        let rect = UvRect {
            offset: [0.5, 0.0],
            scale: [0.5, 1.0],
        };
        let draw = InstancedDraw::new(scene.mesh.clone(), transforms(3)).with_uv_channel(2, vec![rect; 3]);
        assert_eq!(draw.uv_mask(), 0b100);

        queue.push(RenderCommand::SetRenderPass(bound_pass(&scene)));
        queue.draw_instanced(draw).unwrap();
        assert_eq!(queue.draw().unwrap().instances, 3);

        let _bind = scene.context.scoped_bind(false).unwrap();
        let handle = scene.program.handle().unwrap();
        assert_eq!(
            scene.driver.uniform_value(handle, "u_uvStream2"),
            Some(RecordedUniform::Vec4Array(vec![[0.5, 0.0, 0.5, 1.0]; 3]))
        );
        assert_eq!(scene.driver.uniform_value(handle, "u_uvStream0"), None);
    }

    #[test]
    fn test_mismatched_uv_channel_is_rejected() {
        let scene = scene(HeadlessDriver::FULL_CAPABILITIES);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        let draw = InstancedDraw::new(scene.mesh.clone(), transforms(3))
            .with_uvs(vec![UvRect::FULL; 3])
            .with_uv_channel(3, vec![UvRect::FULL; 1]);
        assert_eq!(queue.draw_instanced(draw), Err(ResourceError::OutOfBounds));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_mismatched_instance_arrays_are_rejected() {
        let scene = scene(HeadlessDriver::FULL_CAPABILITIES);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        let draw = InstancedDraw::new(scene.mesh.clone(), transforms(3))
            .with_colors(vec![InstanceColor::default(); 2]);
        assert_eq!(queue.draw_instanced(draw), Err(ResourceError::OutOfBounds));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nested_scissor_rects_intersect() {
        let scene = scene(HeadlessDriver::FULL_CAPABILITIES);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        queue.push_scissor_rect(Rect2D::new(0, 0, 100, 100));
        queue.push_scissor_rect(Rect2D::new(50, 50, 100, 100));
        queue.pop_scissor_rect();
        queue.push_scissor_rect(Rect2D::new(50, 50, 100, 100));
        queue.draw().unwrap();

        let state = scene.context.state().state().clone();
        assert_eq!(state.scissor_rect, Rect2D::new(50, 50, 50, 50));
    }

    #[test]
    fn test_unbalanced_scissor_is_disabled_at_frame_end() {
        let scene = scene(HeadlessDriver::FULL_CAPABILITIES);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        queue.push_scissor_rect(Rect2D::new(0, 0, 100, 100));
        queue.push_scissor_rect(Rect2D::new(50, 50, 100, 100));
        queue.draw().unwrap();

        let state = scene.context.state().state().clone();
        assert!(!state.scissor_enabled);
        assert_eq!(state.scissor_rect, Rect2D::new(50, 50, 50, 50));

        queue.push_scissor_rect(Rect2D::new(10, 10, 20, 20));
        queue.pop_scissor_rect();
        queue.push_scissor_rect(Rect2D::new(0, 0, 10, 10));
        queue.draw().unwrap();
        // Each frame starts from an empty stack.
        assert_eq!(scene.context.state().state().scissor_rect, Rect2D::new(0, 0, 10, 10));
    }

    #[test]
    fn test_pop_restores_outer_scissor() {
        let scene = scene(HeadlessDriver::FULL_CAPABILITIES);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        queue.push_scissor_rect(Rect2D::new(0, 0, 100, 100));
        queue.push_scissor_rect(Rect2D::new(10, 10, 10, 10));
        queue.pop_scissor_rect();
        queue.draw().unwrap();
        assert_eq!(scene.context.state().state().scissor_rect, Rect2D::new(0, 0, 100, 100));

        queue.pop_scissor_rect();
        queue.draw().unwrap();
        assert!(!scene.context.state().state().scissor_enabled);
    }

    #[test]
    fn test_draw_without_pass_is_skipped() {
        let scene = scene(HeadlessDriver::FULL_CAPABILITIES);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        queue
            .draw_instanced(InstancedDraw::new(scene.mesh.clone(), transforms(2)))
            .unwrap();
        assert_eq!(queue.draw().unwrap(), DrawStats::default());
        let _bind = scene.context.scoped_bind(false).unwrap();
        assert!(scene.driver.draw_calls().is_empty());
    }

    #[test]
    fn test_clip_planes_and_viewport() {
        let scene = scene(HeadlessDriver::FULL_CAPABILITIES);
        let mut queue = RenderQueue::new(&scene.context).unwrap();
        queue.enable_clip_plane(2);
        queue.disable_clip_plane(0);
        queue.set_viewport(Rect2D::new(0, 0, 640, 480));
        queue.clear(Some(LinearRgba::BLACK), Some(1.0));
        queue.draw().unwrap();

        let state = scene.context.state().state().clone();
        assert!(state.clip_planes[2]);
        assert!(!state.clip_planes[0]);
        assert_eq!(state.viewport, Rect2D::new(0, 0, 640, 480));
        assert_eq!(scene.driver.call_count("clear"), 1);
    }
}
