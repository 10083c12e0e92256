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

//! The render system facade.

use crate::event::EventBus;
use crate::renderer::api::{ContextId, ProgramSource, SurfaceId};
use crate::renderer::context::{
    ContextConfig, ContextDiagnostics, ContextEnvironment, ContextInfo, ContextRegistry,
    RenderingContext,
};
use crate::renderer::error::{ContextError, ResourceError, StreamError};
use crate::renderer::instancing::{
    create_instance_stream, InstancePayload, InstanceStreamEncoder, InstanceStreamKind,
};
use crate::renderer::pool::{Material, Pooled, RenderPass, RenderPassType, ResourcePool};
use crate::renderer::queue::RenderQueue;
use crate::renderer::resources::{
    ArenaAllocation, ShaderProgram, Texture2D, VertexArray, VertexBufferArena,
};
use crate::renderer::settings::RenderSystemSettings;
use crate::renderer::traits::GraphicsDriver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coarse notifications published by a [`RenderSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderSystemEvent {
    /// A context was created and its native side is set up.
    ContextCreated(ContextId),
    /// A context was permanently released.
    ContextReleased(ContextId),
    /// The default context changed.
    DefaultContextSet(Option<ContextId>),
}

/// Owner of every rendering context and the entry point for GPU resources.
///
/// Contexts live in an arena keyed by [`ContextId`]. Factories take an
/// optional explicit context and otherwise resolve one in this order: the
/// context current on the calling thread, the default context (made
/// current), the shared context, then the null context when enabled.
pub struct RenderSystem {
    driver: Arc<dyn GraphicsDriver>,
    settings: Arc<RenderSystemSettings>,
    registry: Arc<ContextRegistry>,
    contexts: Mutex<HashMap<ContextId, Arc<RenderingContext>>>,
    next_context_id: AtomicU64,
    default_context: Mutex<Option<ContextId>>,
    shared_context: Mutex<Option<ContextId>>,
    null_context: Mutex<Option<ContextId>>,
    arenas: Mutex<HashMap<ContextId, Arc<VertexBufferArena>>>,
    materials: Arc<ResourcePool<Material>>,
    render_passes: Arc<ResourcePool<RenderPass>>,
    events: EventBus<RenderSystemEvent>,
}

impl std::fmt::Debug for RenderSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSystem")
            .field("contexts", &self.contexts.lock().len())
            .field("default", &*self.default_context.lock())
            .field("shared", &*self.shared_context.lock())
            .finish()
    }
}

impl RenderSystem {
    /// Creates a render system over `driver`.
    pub fn new(driver: Arc<dyn GraphicsDriver>, settings: RenderSystemSettings) -> Self {
        log::info!("RenderSystem: initializing ({settings:?}).");
        Self {
            registry: Arc::new(ContextRegistry::new(driver.clone())),
            driver,
            settings: Arc::new(settings),
            contexts: Mutex::new(HashMap::new()),
            next_context_id: AtomicU64::new(1),
            default_context: Mutex::new(None),
            shared_context: Mutex::new(None),
            null_context: Mutex::new(None),
            arenas: Mutex::new(HashMap::new()),
            materials: ResourcePool::new("materials"),
            render_passes: ResourcePool::new("render passes"),
            events: EventBus::new(),
        }
    }

    /// The graphics driver.
    pub fn driver(&self) -> &Arc<dyn GraphicsDriver> {
        &self.driver
    }

    /// The settings the system was created with.
    pub fn settings(&self) -> &RenderSystemSettings {
        &self.settings
    }

    /// The per-thread current-context registry.
    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// The material pool.
    pub fn material_pool(&self) -> &Arc<ResourcePool<Material>> {
        &self.materials
    }

    /// The render pass pool.
    pub fn render_pass_pool(&self) -> &Arc<ResourcePool<RenderPass>> {
        &self.render_passes
    }

    // --- Events ---

    /// Returns a receiver for [`RenderSystemEvent`]s.
    pub fn subscribe_events(&self) -> flume::Receiver<RenderSystemEvent> {
        self.events.subscribe()
    }

    /// Drains the events queued on the system's own receiver.
    pub fn drain_events(&self) -> Vec<RenderSystemEvent> {
        self.events.drain()
    }

    // --- Contexts ---

    /// Creates a context and its native side, window-bound when `surface`
    /// is given.
    pub fn create_context(
        &self,
        surface: Option<SurfaceId>,
        config: ContextConfig,
    ) -> Result<Arc<RenderingContext>, ContextError> {
        let id = ContextId(self.next_context_id.fetch_add(1, Ordering::Relaxed));
        let env = ContextEnvironment {
            driver: self.driver.clone(),
            registry: self.registry.clone(),
            settings: self.settings.clone(),
        };
        let context = RenderingContext::new(id, config, surface, env);
        context.create_native()?;
        self.contexts.lock().insert(id, context.clone());
        self.events.publish(RenderSystemEvent::ContextCreated(id));
        Ok(context)
    }

    /// Looks a context up by id.
    pub fn context(&self, id: ContextId) -> Option<Arc<RenderingContext>> {
        self.contexts.lock().get(&id).cloned()
    }

    /// Every live context, in no particular order.
    pub fn contexts(&self) -> Vec<Arc<RenderingContext>> {
        self.contexts.lock().values().cloned().collect()
    }

    fn slot(&self, slot: &Mutex<Option<ContextId>>) -> Option<Arc<RenderingContext>> {
        let id = (*slot.lock())?;
        self.context(id)
    }

    /// The context current on the calling thread.
    pub fn current_context(&self) -> Option<Arc<RenderingContext>> {
        self.registry.current_context()
    }

    /// The default context.
    pub fn default_context(&self) -> Option<Arc<RenderingContext>> {
        self.slot(&self.default_context)
    }

    /// The shared context.
    pub fn shared_context(&self) -> Option<Arc<RenderingContext>> {
        self.slot(&self.shared_context)
    }

    /// Sets (or clears) the default context.
    pub fn set_default_context(&self, context: Option<&Arc<RenderingContext>>) {
        let id = context.map(|c| c.id());
        *self.default_context.lock() = id;
        log::debug!("RenderSystem: default context is now {id:?}.");
        self.events.publish(RenderSystemEvent::DefaultContextSet(id));
    }

    /// Sets (or clears) the shared context.
    pub fn set_shared_context(&self, context: Option<&Arc<RenderingContext>>) {
        *self.shared_context.lock() = context.map(|c| c.id());
    }

    /// Returns the default context, creating an offscreen one when there is
    /// no valid default.
    pub fn ensure_default_context(&self) -> Result<Arc<RenderingContext>, ContextError> {
        if let Some(context) = self.default_context().filter(|c| c.is_valid()) {
            return Ok(context);
        }
        let context = self.create_context(None, ContextConfig::labeled("default"))?;
        self.set_default_context(Some(&context));
        Ok(context)
    }

    /// The offscreen context off-render-thread code binds when nothing else
    /// is available. Created on first use; `None` unless
    /// [`RenderSystemSettings::use_null_contexts`] is set.
    pub fn null_context(&self) -> Option<Arc<RenderingContext>> {
        if !self.settings.use_null_contexts {
            return None;
        }
        if let Some(context) = self.slot(&self.null_context).filter(|c| c.is_valid()) {
            return Some(context);
        }
        match self.create_context(None, ContextConfig::labeled("null")) {
            Ok(context) => {
                *self.null_context.lock() = Some(context.id());
                Some(context)
            }
            Err(e) => {
                log::error!("RenderSystem: could not create the null context: {e}");
                None
            }
        }
    }

    /// Makes sure a valid context is current on the calling thread and
    /// returns it.
    pub fn ensure_current_context(&self) -> Result<Arc<RenderingContext>, ContextError> {
        if let Some(context) = self.current_context().filter(|c| c.is_valid()) {
            return Ok(context);
        }
        let candidates = [self.default_context(), self.shared_context(), self.null_context()];
        for context in candidates.into_iter().flatten().filter(|c| c.is_valid()) {
            match context.make_current(false) {
                Ok(()) => return Ok(context),
                Err(e) => log::warn!("RenderSystem: cannot make {} current: {e}", context.id()),
            }
        }
        Err(ContextError::Unavailable(self.context_diagnostics()))
    }

    /// Status of the current, default and shared contexts.
    pub fn context_diagnostics(&self) -> ContextDiagnostics {
        ContextDiagnostics {
            current: self.current_context().map(|c| ContextInfo::of(&c)),
            default: self.default_context().map(|c| ContextInfo::of(&c)),
            shared: self.shared_context().map(|c| ContextInfo::of(&c)),
        }
    }

    /// Resolves the context a factory works in.
    fn resolve(&self, explicit: Option<&Arc<RenderingContext>>) -> Result<Arc<RenderingContext>, ResourceError> {
        if let Some(context) = explicit {
            if context.is_destroyed() {
                return Err(ResourceError::Context(ContextError::Released));
            }
            if !context.is_valid() {
                return Err(ResourceError::Context(ContextError::InvalidContext));
            }
            return Ok(context.clone());
        }
        if let Some(context) = self.current_context().filter(|c| c.is_valid()) {
            return Ok(context);
        }
        if let Some(context) = self.default_context().filter(|c| c.is_valid()) {
            match context.make_current(false) {
                Ok(()) => return Ok(context),
                Err(e) => log::warn!("RenderSystem: default context {} unusable: {e}", context.id()),
            }
        }
        if let Some(context) = self.shared_context().filter(|c| c.is_valid()) {
            return Ok(context);
        }
        if let Some(context) = self.null_context() {
            return Ok(context);
        }
        let diagnostics = self.context_diagnostics();
        log::error!("RenderSystem: {diagnostics}");
        Err(ResourceError::ContextUnavailable(diagnostics))
    }

    /// Permanently releases `context` and everything pooled for it.
    pub fn release_context(&self, context: &Arc<RenderingContext>) {
        let id = context.id();
        context.release();
        self.contexts.lock().remove(&id);
        self.arenas.lock().remove(&id);
        for slot in [&self.default_context, &self.shared_context, &self.null_context] {
            let mut slot = slot.lock();
            if *slot == Some(id) {
                *slot = None;
            }
        }
        self.events.publish(RenderSystemEvent::ContextReleased(id));
    }

    // --- Factories ---

    /// Creates an empty texture.
    pub fn create_texture(
        &self,
        context: Option<&Arc<RenderingContext>>,
        name: impl Into<String>,
    ) -> Result<Arc<Texture2D>, ResourceError> {
        Texture2D::new(&self.resolve(context)?, name)
    }

    /// Creates an empty multisampled texture.
    pub fn create_texture_multisample(
        &self,
        context: Option<&Arc<RenderingContext>>,
        name: impl Into<String>,
        samples: u32,
    ) -> Result<Arc<Texture2D>, ResourceError> {
        Texture2D::new_multisample(&self.resolve(context)?, name, samples)
    }

    /// Creates an empty vertex array.
    pub fn create_vertex_array(&self, context: Option<&Arc<RenderingContext>>) -> Result<Arc<VertexArray>, ResourceError> {
        VertexArray::new(&self.resolve(context)?)
    }

    /// Compiles a shader program.
    pub fn create_shader_program(
        &self,
        context: Option<&Arc<RenderingContext>>,
        source: ProgramSource,
    ) -> Result<Arc<ShaderProgram>, ResourceError> {
        ShaderProgram::new(&self.resolve(context)?, source)
    }

    /// Takes a material from the pool.
    pub fn create_material(&self, context: Option<&Arc<RenderingContext>>) -> Result<Pooled<Material>, ResourceError> {
        self.materials.acquire(&self.resolve(context)?, ())
    }

    /// Takes a render pass of `pass_type` from the pool.
    pub fn create_render_pass(
        &self,
        context: Option<&Arc<RenderingContext>>,
        pass_type: RenderPassType,
    ) -> Result<Pooled<RenderPass>, ResourceError> {
        self.render_passes.acquire(&self.resolve(context)?, pass_type)
    }

    /// Creates an instance stream in the context's instancing mode.
    pub fn create_instance_stream<P: InstancePayload>(
        &self,
        context: Option<&Arc<RenderingContext>>,
        kind: InstanceStreamKind,
    ) -> Result<Box<dyn InstanceStreamEncoder<P>>, StreamError> {
        create_instance_stream(&self.resolve(context)?, kind)
    }

    /// Creates a render queue.
    pub fn create_render_queue(&self, context: Option<&Arc<RenderingContext>>) -> Result<RenderQueue, StreamError> {
        RenderQueue::new(&self.resolve(context)?)
    }

    /// The vertex buffer arena of a context, created on first use.
    pub fn vertex_arena(&self, context: Option<&Arc<RenderingContext>>) -> Result<Arc<VertexBufferArena>, ResourceError> {
        let context = self.resolve(context)?;
        let mut arenas = self.arenas.lock();
        if let Some(arena) = arenas.get(&context.id()) {
            return Ok(arena.clone());
        }
        let arena = VertexBufferArena::new(&context, self.settings.vertex_arena_block_size)?;
        arenas.insert(context.id(), arena.clone());
        Ok(arena)
    }

    /// Reserves `size` bytes of vertex storage aligned to `alignment`.
    pub fn allocate_vertex_block(
        &self,
        context: Option<&Arc<RenderingContext>>,
        size: usize,
        alignment: usize,
    ) -> Result<ArenaAllocation, ResourceError> {
        self.vertex_arena(context)?.allocate(size, alignment)
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        let contexts: Vec<_> = self.contexts.get_mut().drain().map(|(_, c)| c).collect();
        self.arenas.get_mut().clear();
        for context in &contexts {
            context.release();
        }
        log::info!("RenderSystem: shut down ({} contexts released).", contexts.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDriver;

    fn system(settings: RenderSystemSettings) -> RenderSystem {
        RenderSystem::new(Arc::new(HeadlessDriver::new()), settings)
    }

    #[test]
    fn test_factory_without_context_reports_diagnostics() {
        let system = system(Default::default());
        let err = system.create_texture(None, "orphan").unwrap_err();
        assert_eq!(err, ResourceError::ContextUnavailable(ContextDiagnostics::default()));
        assert_eq!(
            err.to_string(),
            "Context is null! currentContext=null, defaultContext=null, sharedContext=null"
        );
    }

    #[test]
    fn test_diagnostics_name_released_default() {
        let system = system(Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        system.set_default_context(Some(&context));
        system.set_shared_context(Some(&context));
        context.destroy_native();

        let Err(ResourceError::ContextUnavailable(diagnostics)) = system.create_vertex_array(None) else {
            panic!("expected ContextUnavailable");
        };
        let default = diagnostics.default.unwrap();
        assert_eq!(default.id, context.id());
        assert!(!default.is_valid);
        assert!(!default.is_created);
    }

    #[test]
    fn test_default_context_is_made_current() {
        let system = system(Default::default());
        let context = system.ensure_default_context().unwrap();
        assert!(!context.is_current());
        system.create_texture(None, "t").unwrap();
        assert!(context.is_current());
        assert_eq!(system.ensure_default_context().unwrap().id(), context.id());
    }

    #[test]
    fn test_explicit_released_context_is_rejected() {
        let system = system(Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        system.release_context(&context);
        assert_eq!(
            system.create_vertex_array(Some(&context)).unwrap_err(),
            ResourceError::Context(ContextError::Released)
        );
        assert!(system.context(context.id()).is_none());
    }

    #[test]
    fn test_null_context_is_opt_in() {
        assert!(system(Default::default()).null_context().is_none());

        let system = system(RenderSystemSettings {
            use_null_contexts: true,
            ..Default::default()
        });
        let null = system.null_context().unwrap();
        assert_eq!(system.null_context().unwrap().id(), null.id());
        let texture = system.create_texture(None, "late").unwrap();
        assert_eq!(texture.context_id(), null.id());
    }

    #[test]
    fn test_events_are_published() {
        let system = system(Default::default());
        let receiver = system.subscribe_events();
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        system.set_default_context(Some(&context));
        system.release_context(&context);

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(
            events,
            vec![
                RenderSystemEvent::ContextCreated(context.id()),
                RenderSystemEvent::DefaultContextSet(Some(context.id())),
                RenderSystemEvent::ContextReleased(context.id()),
            ]
        );
    }

    #[test]
    fn test_vertex_arena_is_per_context() {
        let system = system(RenderSystemSettings {
            vertex_arena_block_size: 4096,
            ..Default::default()
        });
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let b = system.create_context(None, ContextConfig::labeled("b")).unwrap();
        system.allocate_vertex_block(Some(&a), 128, 16).unwrap();
        let arena_a = system.vertex_arena(Some(&a)).unwrap();
        let arena_b = system.vertex_arena(Some(&b)).unwrap();
        assert_eq!(arena_a.free_bytes(), 4096 - 128);
        assert_eq!(arena_b.buffer_count(), 0);
    }
}
