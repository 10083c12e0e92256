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
use approx::assert_relative_eq;
use std::sync::Arc;
use tessera_core::math::LinearRgba;
use tessera_core::renderer::headless::RecordedUniform;
use tessera_core::renderer::instancing::{
    AffineTransform, InstanceColor, InstanceStreamKind, InstancingMode,
};
use tessera_core::renderer::pool::RenderPassType;
use tessera_core::renderer::{
    ContextConfig, DriverCapabilities, HeadlessDriver, ProgramSource, RenderSystem,
    RenderSystemSettings, StreamError,
};

fn system_with(capabilities: DriverCapabilities) -> (Arc<HeadlessDriver>, RenderSystem) {
    let driver = Arc::new(HeadlessDriver::with_capabilities(capabilities));
    let system = RenderSystem::new(driver.clone(), RenderSystemSettings::default());
    (driver, system)
}

#[test]
fn test_material_round_trip_through_pool() -> Result<()> {
    let (_driver, system) = system_with(HeadlessDriver::FULL_CAPABILITIES);
    let context = system.create_context(None, ContextConfig::labeled("main"))?;

    let mut material = system.create_material(Some(&context))?;
    material.set_name("brick");
    let id = material.id();
    drop(material);
    assert_eq!(system.material_pool().free_count_for(context.id()), 1);

    let again = system.create_material(Some(&context))?;
    assert_eq!(again.id(), id);
    assert_eq!(again.name(), "");
    assert_eq!(system.material_pool().constructed_count(), 1);
    Ok(())
}

#[test]
fn test_material_batch_is_reused_without_construction() -> Result<()> {
    let (_driver, system) = system_with(HeadlessDriver::FULL_CAPABILITIES);
    let context = system.create_context(None, ContextConfig::labeled("main"))?;

    let batch = (0..5)
        .map(|_| system.create_material(Some(&context)))
        .collect::<Result<Vec<_>, _>>()?;
    let mut ids: Vec<u64> = batch.iter().map(|m| m.id()).collect();
    drop(batch);
    assert_eq!(system.material_pool().free_count_for(context.id()), 5);

    let batch = (0..5)
        .map(|_| system.create_material(Some(&context)))
        .collect::<Result<Vec<_>, _>>()?;
    let mut reused: Vec<u64> = batch.iter().map(|m| m.id()).collect();
    ids.sort_unstable();
    reused.sort_unstable();
    assert_eq!(ids, reused);
    assert_eq!(system.material_pool().constructed_count(), 5);
    assert_eq!(system.material_pool().free_count_for(context.id()), 0);
    Ok(())
}

#[test]
fn test_render_passes_are_pooled_per_type() -> Result<()> {
    let (_driver, system) = system_with(HeadlessDriver::FULL_CAPABILITIES);
    let context = system.create_context(None, ContextConfig::labeled("main"))?;

    let shadow = system.create_render_pass(Some(&context), RenderPassType::Shadow)?;
    let shadow_id = shadow.id();
    drop(shadow);
    let main = system.create_render_pass(Some(&context), RenderPassType::Default)?;
    assert_ne!(main.id(), shadow_id);
    assert_eq!(main.render_queue_index, 2000);
    Ok(())
}

#[test]
fn test_texture_buffer_stream_capacity() -> Result<()> {
    let (_driver, system) = system_with(HeadlessDriver::FULL_CAPABILITIES);
    let context = system.create_context(None, ContextConfig::labeled("main"))?;
    assert_eq!(context.instancing_mode(), Some(InstancingMode::TextureBuffer));

    let mut stream = system.create_instance_stream::<AffineTransform>(Some(&context), InstanceStreamKind::ModelMatrix)?;
    assert_eq!(stream.max_instances_per_draw_call(), 16384);

    stream.begin_frame();
    let batch = vec![AffineTransform::IDENTITY; 16384];
    stream.append_slice(&batch)?;
    assert!(matches!(
        stream.append(&AffineTransform::IDENTITY),
        Err(StreamError::CapacityExceeded { .. })
    ));
    Ok(())
}

#[test]
fn test_uniform_array_stream_uploads_colors() -> Result<()> {
    let (driver, system) = system_with(DriverCapabilities::BASELINE);
    let context = system.create_context(None, ContextConfig::labeled("main"))?;
    assert_eq!(context.instancing_mode(), Some(InstancingMode::UniformArray));

    let program = system.create_shader_program(
        Some(&context),
        ProgramSource::new("tint", "uniform vec4 u_colorStream[32];\nvoid main() {}", "void main() {}"),
    )?;
    let mut stream = system.create_instance_stream::<InstanceColor>(Some(&context), InstanceStreamKind::Color)?;
    stream.bind_program(&program)?;
    stream.begin_frame();
    stream.append(&InstanceColor(LinearRgba::new(0.25, 0.5, 0.75, 1.0)))?;
    stream.prepare_for_render(1)?;

    let _bind = context.scoped_bind(false)?;
    let handle = program.handle().ok_or_else(|| anyhow::anyhow!("program lost"))?;
    let Some(RecordedUniform::Vec4Array(values)) = driver.uniform_value(handle, "u_colorStream") else {
        anyhow::bail!("color stream was not uploaded");
    };
    assert_eq!(values.len(), 1);
    assert_relative_eq!(values[0][0], 0.25);
    assert_relative_eq!(values[0][1], 0.5);
    assert_relative_eq!(values[0][2], 0.75);
    Ok(())
}

#[test]
fn test_vertex_arena_coalesces_freed_blocks() -> Result<()> {
    let settings = RenderSystemSettings {
        vertex_arena_block_size: 64 * 1024,
        ..Default::default()
    };
    let system = RenderSystem::new(Arc::new(HeadlessDriver::new()), settings);
    let context = system.create_context(None, ContextConfig::labeled("main"))?;
    let arena = system.vertex_arena(Some(&context))?;
    let total = arena.block_size();

    let blocks = (0..4)
        .map(|_| system.allocate_vertex_block(Some(&context), 1024, 256))
        .collect::<Result<Vec<_>, _>>()?;
    arena.free(blocks[1])?;
    arena.free(blocks[3])?;
    arena.free(blocks[2])?;
    // The three blocks merged with the tail; only block 0 is still in use.
    assert_eq!(arena.free_block_count(), 1);
    arena.free(blocks[0])?;
    assert_eq!(arena.free_bytes(), total);
    Ok(())
}
