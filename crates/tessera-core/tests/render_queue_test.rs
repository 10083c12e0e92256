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

use anyhow::Result;
use std::sync::Arc;
use tessera_core::math::{LinearRgba, Rect2D};
use tessera_core::renderer::headless::RecordedUniform;
use tessera_core::renderer::instancing::{AffineTransform, InstanceColor};
use tessera_core::renderer::pool::RenderPassType;
use tessera_core::renderer::{
    ContextConfig, HeadlessDriver, InstancedDraw, MeshData, ProgramSource, RenderSystem,
    RenderSystemSettings, UniformValue, VertexAttributeSemantic,
};

const VERTEX: &str = "uniform sampler2D u_modelMatricesTexture;
uniform int u_modelMatricesOffset;
uniform sampler2D u_colorStreamTexture;
uniform int u_colorStreamOffset;
void main() {}";

#[test]
fn test_frame_with_texture_buffer_streams() -> Result<()> {
    let driver = Arc::new(HeadlessDriver::new());
    let system = RenderSystem::new(driver.clone(), RenderSystemSettings::default());
    let context = system.create_context(None, ContextConfig::labeled("main"))?;
    system.set_default_context(Some(&context));

    // No explicit context from here on: the default one is resolved.
    let quad = system.create_vertex_array(None)?;
    quad.set_mesh(
        MeshData::new()
            .with_indices(vec![0, 1, 2, 2, 1, 3])
            .with_stream(
                VertexAttributeSemantic::Position,
                2,
                vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            ),
    )?;
    let program = system.create_shader_program(None, ProgramSource::new("sprite", VERTEX, "void main() {}"))?;
    let mut pass = system.create_render_pass(None, RenderPassType::Default)?;
    pass.program = Some(program.clone());

    let mut queue = system.create_render_queue(None)?;
    queue.set_viewport(Rect2D::new(0, 0, 800, 600));
    queue.clear(Some(LinearRgba::BLACK), Some(1.0));
    queue.set_render_pass(&pass);
    queue.draw_instanced(InstancedDraw::new(quad.clone(), vec![AffineTransform::IDENTITY; 10]))?;
    queue.draw_instanced(
        InstancedDraw::new(quad.clone(), vec![AffineTransform::from_translation(1.0, 0.0, 0.0); 5])
            .with_colors(vec![InstanceColor(LinearRgba::RED); 5]),
    )?;
    let stats = queue.draw()?;

    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.instances, 15);

    let _bind = context.scoped_bind(false)?;
    let draws = driver.draw_calls();
    assert_eq!(draws.len(), 2);
    assert!(draws.iter().all(|d| d.index_count == 6 && d.vertex_array == quad.handle()));
    let handle = program.handle().ok_or_else(|| anyhow::anyhow!("program lost"))?;
    // The second batch reads model matrices after the first one's.
    assert_eq!(
        driver.uniform_value(handle, "u_modelMatricesOffset"),
        Some(RecordedUniform::Value(UniformValue::Int(10)))
    );
    assert_eq!(
        driver.uniform_value(handle, "u_colorStreamOffset"),
        Some(RecordedUniform::Value(UniformValue::Int(0)))
    );
    Ok(())
}

#[test]
fn test_queue_keeps_working_after_recreation() -> Result<()> {
    let driver = Arc::new(HeadlessDriver::new());
    let system = RenderSystem::new(driver.clone(), RenderSystemSettings::default());
    let context = system.create_context(None, ContextConfig::labeled("main"))?;

    let quad = system.create_vertex_array(Some(&context))?;
    quad.set_indices(vec![0, 1, 2])?;
    let program = system.create_shader_program(Some(&context), ProgramSource::new("p", VERTEX, "void main() {}"))?;
    let mut pass = system.create_render_pass(Some(&context), RenderPassType::Default)?;
    pass.program = Some(program);
    let mut queue = system.create_render_queue(Some(&context))?;

    for _ in 0..2 {
        queue.set_render_pass(&pass);
        queue.draw_instanced(InstancedDraw::new(quad.clone(), vec![AffineTransform::IDENTITY; 3]))?;
        assert_eq!(queue.draw()?.draw_calls, 1);
        context.recreate()?;
    }
    Ok(())
}
