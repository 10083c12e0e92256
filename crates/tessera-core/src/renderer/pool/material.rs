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

use super::PooledObject;
use crate::renderer::api::{BufferTarget, BufferUsage, NativeHandle, UniformValue};
use crate::renderer::context::RenderingContext;
use crate::renderer::error::{DriverError, ResourceError};
use crate::renderer::resources::{bind_context, upgrade_context, EpochHandle, ShaderProgram, Texture2D};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Initial size in bytes of a material's uniform buffer.
pub const MATERIAL_UNIFORM_BLOCK_SIZE: usize = 256;

/// A program plus the uniform values and textures to draw with it.
///
/// Uniform values are uploaded to the program and mirrored, packed in
/// `vec4` slots, into a native uniform buffer owned by the material.
#[derive(Debug)]
pub struct Material {
    id: u64,
    context: Weak<RenderingContext>,
    name: String,
    program: Option<Arc<ShaderProgram>>,
    uniforms: BTreeMap<String, UniformValue>,
    textures: BTreeMap<u32, (String, Arc<Texture2D>)>,
    uniform_buffer: Option<EpochHandle>,
    uniform_buffer_size: usize,
}

fn push_uniform(block: &mut Vec<f32>, value: &UniformValue) {
    let mut slot = [0.0f32; 4];
    match value {
        UniformValue::Int(v) => slot[0] = *v as f32,
        UniformValue::Float(v) => slot[0] = *v,
        UniformValue::Vec2(v) => slot[..2].copy_from_slice(v),
        UniformValue::Vec3(v) => slot[..3].copy_from_slice(v),
        UniformValue::Vec4(v) => slot = *v,
        UniformValue::Mat4(m) => {
            block.extend_from_slice(m);
            return;
        }
    }
    block.extend_from_slice(&slot);
}

impl Material {
    /// Pool-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the debug name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Program the material draws with.
    pub fn program(&self) -> Option<&Arc<ShaderProgram>> {
        self.program.as_ref()
    }

    /// Sets the program.
    pub fn set_program(&mut self, program: Arc<ShaderProgram>) {
        self.program = Some(program);
    }

    /// Stores a uniform value, uploaded at the next [`Material::apply`].
    pub fn set_uniform(&mut self, name: impl Into<String>, value: UniformValue) {
        self.uniforms.insert(name.into(), value);
    }

    /// A stored uniform value.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    /// Number of stored uniform values.
    pub fn uniform_count(&self) -> usize {
        self.uniforms.len()
    }

    /// Binds `texture` to `unit` and points sampler `name` at it.
    pub fn set_texture(&mut self, unit: u32, name: impl Into<String>, texture: Arc<Texture2D>) {
        self.textures.insert(unit, (name.into(), texture));
    }

    /// Number of texture bindings.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// The native uniform buffer, if it belongs to the current context epoch.
    pub fn uniform_buffer(&self) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.uniform_buffer.and_then(|b| b.get(&context))
    }

    fn ensure_uniform_buffer(&mut self, context: &RenderingContext, size: usize) -> Result<NativeHandle, ResourceError> {
        let driver = context.driver();
        let mut state = context.state();
        if let Some(buffer) = self.uniform_buffer.and_then(|b| b.get(context)) {
            if size > self.uniform_buffer_size {
                self.uniform_buffer_size = size.next_power_of_two();
                state.bind_buffer(BufferTarget::Uniform, Some(buffer));
                driver.buffer_data(BufferTarget::Uniform, self.uniform_buffer_size, None, BufferUsage::DynamicDraw);
            }
            return Ok(buffer);
        }

        let buffer = driver
            .create_buffer()
            .ok_or(DriverError::ObjectCreationFailed("buffer"))?;
        self.uniform_buffer_size = size.max(MATERIAL_UNIFORM_BLOCK_SIZE).next_power_of_two();
        state.bind_buffer(BufferTarget::Uniform, Some(buffer));
        driver.buffer_data(BufferTarget::Uniform, self.uniform_buffer_size, None, BufferUsage::DynamicDraw);
        self.uniform_buffer = Some(EpochHandle::new(buffer, context));
        Ok(buffer)
    }

    /// Binds the program and textures, uploads every uniform and refreshes
    /// the uniform buffer.
    pub fn apply(&mut self) -> Result<(), ResourceError> {
        let program = self.program.clone().ok_or(ResourceError::InvalidHandle)?;
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        program.bind()?;

        for (unit, (name, texture)) in &self.textures {
            texture.bind_to_unit(*unit)?;
            program.set_uniform(name, UniformValue::Int(*unit as i32))?;
        }

        let mut block = Vec::with_capacity(self.uniforms.len() * 4);
        for (name, value) in &self.uniforms {
            program.set_uniform(name, *value)?;
            push_uniform(&mut block, value);
        }

        let bytes: &[u8] = bytemuck::cast_slice(&block);
        let buffer = self.ensure_uniform_buffer(bound.context, bytes.len())?;
        if !bytes.is_empty() {
            bound.context.state().bind_buffer(BufferTarget::Uniform, Some(buffer));
            bound.context.driver().buffer_sub_data(BufferTarget::Uniform, 0, bytes);
        }
        Ok(())
    }
}

impl PooledObject for Material {
    type Key = ();

    fn create(context: &Arc<RenderingContext>, _key: &(), id: u64) -> Result<Self, ResourceError> {
        let mut material = Self {
            id,
            context: Arc::downgrade(context),
            name: String::new(),
            program: None,
            uniforms: BTreeMap::new(),
            textures: BTreeMap::new(),
            uniform_buffer: None,
            uniform_buffer_size: 0,
        };
        let bound = bind_context(context)?;
        material.ensure_uniform_buffer(bound.context, MATERIAL_UNIFORM_BLOCK_SIZE)?;
        Ok(material)
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn reset(&mut self) {
        self.name.clear();
        self.program = None;
        self.uniforms.clear();
        self.textures.clear();
    }

    fn destroy(self, context: Option<&RenderingContext>) {
        let Some(context) = context else {
            return;
        };
        let Some(buffer) = self.uniform_buffer.and_then(|b| b.get(context)) else {
            return;
        };
        match bind_context(context) {
            Ok(bound) => {
                bound.context.state().forget_buffer(buffer);
                bound.context.driver().delete_buffer(buffer);
            }
            Err(e) => log::warn!("Material {}: leaking uniform buffer ({e}).", self.id),
        }
    }
}
