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
use crate::renderer::api::{BlendFactor, CompareFunction, CullMode, UniformValue};
use crate::renderer::context::RenderingContext;
use crate::renderer::error::ResourceError;
use crate::renderer::resources::ShaderProgram;
use crate::renderer::state::GpuStateCache;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The pass a [`RenderPass`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderPassType {
    /// Main color pass.
    #[default]
    Default,
    /// Depth-only shadow caster pass.
    Shadow,
}

impl RenderPassType {
    /// Queue index a fresh pass of this type sorts at.
    pub fn default_queue_index(&self) -> u16 {
        match self {
            RenderPassType::Default => 2000,
            RenderPassType::Shadow => 1000,
        }
    }
}

/// Fixed-function state and program of one pass of a material.
#[derive(Debug, Clone)]
pub struct RenderPass {
    id: u64,
    pass_type: RenderPassType,
    /// Program drawn with.
    pub program: Option<Arc<ShaderProgram>>,
    /// Source and destination blend factors. `(One, Zero)` disables blending.
    pub blend_factors: (BlendFactor, BlendFactor),
    /// Depth comparison, `None` disables the depth test.
    pub depth_compare: Option<CompareFunction>,
    /// Depth writes.
    pub depth_write: bool,
    /// Culled faces.
    pub cull_mode: CullMode,
    /// Sort key within the render queue.
    pub render_queue_index: u16,
    uniforms: BTreeMap<String, UniformValue>,
}

impl RenderPass {
    fn with_defaults(id: u64, pass_type: RenderPassType) -> Self {
        Self {
            id,
            pass_type,
            program: None,
            blend_factors: (BlendFactor::One, BlendFactor::Zero),
            depth_compare: Some(CompareFunction::LessEqual),
            depth_write: true,
            cull_mode: CullMode::Back,
            render_queue_index: pass_type.default_queue_index(),
            uniforms: BTreeMap::new(),
        }
    }

    /// Pool-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pass type the object was pooled under.
    pub fn pass_type(&self) -> RenderPassType {
        self.pass_type
    }

    /// Stores a uniform value uploaded by [`RenderPass::bind`].
    pub fn set_uniform(&mut self, name: impl Into<String>, value: UniformValue) {
        self.uniforms.insert(name.into(), value);
    }

    /// A stored uniform value.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    /// Whether the blend factors need blending enabled.
    pub fn blend_enabled(&self) -> bool {
        self.blend_factors != (BlendFactor::One, BlendFactor::Zero)
    }

    /// Pushes the pass's fixed-function state through `cache`.
    pub fn apply_state(&self, cache: &mut GpuStateCache) {
        let blend = self.blend_enabled();
        cache.set_blend_enabled(blend);
        if blend {
            cache.set_blend_factors(self.blend_factors.0, self.blend_factors.1);
        }
        match self.depth_compare {
            Some(compare) => {
                cache.set_depth_test_enabled(true);
                cache.set_depth_compare(compare);
            }
            None => cache.set_depth_test_enabled(false),
        }
        cache.set_depth_write(self.depth_write);
        cache.set_cull_mode(self.cull_mode);
    }

    /// Applies the fixed-function state, binds the program and uploads the
    /// pass uniforms. `context` must be bound.
    pub fn bind(&self, context: &RenderingContext) -> Result<(), ResourceError> {
        self.apply_state(&mut context.state());
        let program = self.program.as_ref().ok_or(ResourceError::InvalidHandle)?;
        program.bind()?;
        for (name, value) in &self.uniforms {
            program.set_uniform(name, *value)?;
        }
        Ok(())
    }
}

impl PooledObject for RenderPass {
    type Key = RenderPassType;

    fn create(_context: &Arc<RenderingContext>, key: &RenderPassType, id: u64) -> Result<Self, ResourceError> {
        Ok(Self::with_defaults(id, *key))
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn reset(&mut self) {
        *self = Self::with_defaults(self.id, self.pass_type);
    }

    fn destroy(self, _context: Option<&RenderingContext>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::HeadlessDriver;
    use crate::renderer::pool::ResourcePool;
    use crate::renderer::RenderSystem;

    #[test]
    fn test_reset_restores_defaults() {
        let system = RenderSystem::new(Arc::new(HeadlessDriver::new()), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let pool = ResourcePool::<RenderPass>::new("passes");

        let mut pass = pool.acquire(&context, RenderPassType::Shadow).unwrap();
        pass.cull_mode = CullMode::Front;
        pass.depth_compare = None;
        pass.set_uniform("u_bias", UniformValue::Float(0.01));
        drop(pass);

        let pass = pool.acquire(&context, RenderPassType::Shadow).unwrap();
        assert_eq!(pass.cull_mode, CullMode::Back);
        assert_eq!(pass.depth_compare, Some(CompareFunction::LessEqual));
        assert_eq!(pass.uniform("u_bias"), None);
        assert_eq!(pass.render_queue_index, 1000);
        assert_eq!(pool.constructed_count(), 1);
    }

    #[test]
    fn test_state_rules() {
        let driver = Arc::new(HeadlessDriver::new());
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let _bind = context.scoped_bind(false).unwrap();

        let mut pass = RenderPass::with_defaults(1, RenderPassType::Default);
        pass.cull_mode = CullMode::Off;
        pass.apply_state(&mut context.state());
        assert!(!context.state().state().blend_enabled);
        assert!(context.state().state().depth_test_enabled);
        assert!(!context.state().state().cull_enabled);

        pass.blend_factors = (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        pass.depth_compare = None;
        pass.apply_state(&mut context.state());
        assert!(context.state().state().blend_enabled);
        assert!(!context.state().state().depth_test_enabled);
    }
}
