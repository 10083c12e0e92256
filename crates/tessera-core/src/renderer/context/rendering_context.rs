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

use super::diagnostics::ContextInfo;
use super::listener::{ContextEvent, ContextListener, ListenerId, ListenerList};
use super::registry::{ContextRegistry, ContextScopeBind};
use super::ContextConfig;
use crate::renderer::api::{
    ContextId, DriverCapabilities, FrontFace, NativeContextHandle, RenderTargetId, SurfaceId,
};
use crate::renderer::error::ContextError;
use crate::renderer::instancing::InstancingMode;
use crate::renderer::settings::RenderSystemSettings;
use crate::renderer::state::GpuStateCache;
use crate::renderer::traits::GraphicsDriver;
use parking_lot::{Mutex, MutexGuard, ReentrantMutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Services a context shares with its render system.
#[derive(Debug, Clone)]
pub(crate) struct ContextEnvironment {
    pub(crate) driver: Arc<dyn GraphicsDriver>,
    pub(crate) registry: Arc<ContextRegistry>,
    pub(crate) settings: Arc<RenderSystemSettings>,
}

/// A rendering context: one native driver context plus everything the
/// rendering layer tracks about it.
///
/// The object outlives its native context. Window resizes, device resets and
/// explicit recreation destroy and recreate the native side while the
/// `RenderingContext` (and its [`ContextId`]) stays the same, and dependent
/// resources rebuild themselves from the lifecycle events.
///
/// Each native (re)creation bumps the context **epoch**; native handles carry
/// the epoch they were created in and are stale once it changes.
pub struct RenderingContext {
    id: ContextId,
    config: ContextConfig,
    env: ContextEnvironment,
    self_ref: Weak<RenderingContext>,
    owner_thread: ThreadId,
    native: Mutex<Option<NativeContextHandle>>,
    surface: Mutex<Option<SurfaceId>>,
    is_created: AtomicBool,
    is_destroyed: AtomicBool,
    epoch: AtomicU64,
    state: Mutex<GpuStateCache>,
    capabilities: Mutex<DriverCapabilities>,
    instancing_mode: Mutex<Option<InstancingMode>>,
    listeners: ListenerList,
}

impl std::fmt::Debug for RenderingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderingContext")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("native", &*self.native.lock())
            .field("epoch", &self.epoch())
            .field("is_created", &self.is_created())
            .field("is_destroyed", &self.is_destroyed())
            .finish()
    }
}

impl RenderingContext {
    pub(crate) fn new(
        id: ContextId,
        config: ContextConfig,
        surface: Option<SurfaceId>,
        env: ContextEnvironment,
    ) -> Arc<Self> {
        let state = GpuStateCache::new(env.driver.clone());
        Arc::new_cyclic(|self_ref| Self {
            id,
            config,
            env,
            self_ref: self_ref.clone(),
            owner_thread: thread::current().id(),
            native: Mutex::new(None),
            surface: Mutex::new(surface),
            is_created: AtomicBool::new(false),
            is_destroyed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            state: Mutex::new(state),
            capabilities: Mutex::new(DriverCapabilities::BASELINE),
            instancing_mode: Mutex::new(None),
            listeners: ListenerList::new(),
        })
    }

    // --- Identity and flags ---

    /// Arena id of this context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Creation parameters.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Thread that created the context.
    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    /// The live native handle, if any.
    pub fn native_handle(&self) -> Option<NativeContextHandle> {
        *self.native.lock()
    }

    /// The attached presentation surface, if any.
    pub fn surface(&self) -> Option<SurfaceId> {
        *self.surface.lock()
    }

    /// Current epoch. Bumped at every native (re)creation.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// A native context exists.
    pub fn is_created(&self) -> bool {
        self.is_created.load(Ordering::Acquire)
    }

    /// The context was permanently released.
    pub fn is_destroyed(&self) -> bool {
        self.is_destroyed.load(Ordering::Acquire)
    }

    /// The context can be used for rendering.
    pub fn is_valid(&self) -> bool {
        self.is_created() && !self.is_destroyed()
    }

    /// Status snapshot for diagnostics.
    pub fn info(&self) -> ContextInfo {
        ContextInfo::of(self)
    }

    /// Returns `true` if this context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        self.env.registry.current_context_id() == Some(self.id)
    }

    // --- Shared services ---

    /// The driver this context talks to.
    pub fn driver(&self) -> &Arc<dyn GraphicsDriver> {
        &self.env.driver
    }

    /// Render system settings.
    pub fn settings(&self) -> &RenderSystemSettings {
        &self.env.settings
    }

    /// The registry tracking current contexts.
    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.env.registry
    }

    /// Acquires the process-wide render lock. Reentrant.
    pub fn lock_render(&self) -> ReentrantMutexGuard<'_, ()> {
        self.env.registry.lock_render()
    }

    /// Locks the state cache. Do not hold the guard across calls that may
    /// dispatch lifecycle events.
    pub fn state(&self) -> MutexGuard<'_, GpuStateCache> {
        self.state.lock()
    }

    /// Capabilities probed at the last setup.
    pub fn capabilities(&self) -> DriverCapabilities {
        *self.capabilities.lock()
    }

    /// Instancing mode selected at the last setup. `None` while no native
    /// context exists.
    pub fn instancing_mode(&self) -> Option<InstancingMode> {
        *self.instancing_mode.lock()
    }

    /// Returns a strong reference to this context, or `None` while it is
    /// being dropped.
    pub fn upgrade(&self) -> Option<Arc<RenderingContext>> {
        self.self_ref.upgrade()
    }

    // --- Listeners ---

    /// Subscribes a lifecycle listener.
    pub fn subscribe(&self, listener: Weak<dyn ContextListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Removes a lifecycle listener.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.live_count()
    }

    fn dispatch(&self, event: ContextEvent) {
        if !self.config.owns_native {
            return;
        }
        log::debug!("RenderingContext {}: dispatching {event:?}.", self.id);
        self.listeners.dispatch(event, self);
    }

    // --- Currency ---

    pub(crate) fn notify_will_lose_currency(&self, render_target: Option<RenderTargetId>) {
        self.dispatch(ContextEvent::WillLoseCurrency { render_target });
    }

    /// Makes this context current on the calling thread.
    ///
    /// Succeeds immediately if it already is. On failure the previously
    /// current context stays current.
    pub fn make_current(&self, include_surface: bool) -> Result<(), ContextError> {
        let this = self.upgrade().ok_or(ContextError::Released)?;
        self.env.registry.make_current(Some(&this), include_surface)
    }

    /// Makes this context current until the returned guard is dropped, then
    /// restores the previously current context and render target.
    pub fn scoped_bind(&self, include_surface: bool) -> Result<ContextScopeBind, ContextError> {
        let this = self.upgrade().ok_or(ContextError::Released)?;
        self.env.registry.scoped_bind(&this, include_surface)
    }

    // --- Lifecycle ---

    /// Creates the native context if it does not exist.
    ///
    /// Window-bound when a surface is attached, offscreen otherwise. Emits
    /// `Created`, applies default states, then emits `SetupComplete`. The
    /// calling thread's current context is unchanged afterwards.
    pub fn create_native(&self) -> Result<(), ContextError> {
        let _lock = self.lock_render();
        if self.is_destroyed() {
            return Err(ContextError::Released);
        }
        if self.is_created() {
            return Ok(());
        }

        let surface = self.surface();
        let native = self
            .env
            .driver
            .create_context(surface, &self.config)
            .map_err(|e| {
                log::error!("RenderingContext {}: {e}", self.id);
                ContextError::from(e)
            })?;
        *self.native.lock() = Some(native);
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.is_created.store(true, Ordering::Release);
        log::info!(
            "RenderingContext {} ('{}'): native context created ({}, epoch {epoch}).",
            self.id,
            self.config.label,
            if surface.is_some() { "window" } else { "offscreen" }
        );

        let _bind = self.scoped_bind(surface.is_some())?;
        self.dispatch(ContextEvent::Created);
        self.setup_default_states();
        self.dispatch(ContextEvent::SetupComplete);
        Ok(())
    }

    fn setup_default_states(&self) {
        let capabilities = self.env.driver.capabilities();
        let mode = InstancingMode::select(&capabilities, &self.env.settings);
        *self.capabilities.lock() = capabilities;
        *self.instancing_mode.lock() = Some(mode);

        {
            let mut state = self.state.lock();
            state.reset();
            state.sync_all();
            // Z is inverted on the projection side, so clockwise is front.
            state.set_front_face(FrontFace::Cw);
            state.set_clip_plane_enabled(0, true);
        }
        log::info!(
            "RenderingContext {}: setup complete (instancing {mode:?}, max texture size {}).",
            self.id,
            capabilities.max_texture_size
        );
    }

    /// Destroys the native context, keeping this object alive for recreation.
    ///
    /// Emits `WillBeDestroyed` while the context is still current so that
    /// dependents can read back GPU content, then `Destroyed` once it is gone.
    pub fn destroy_native(&self) {
        let _lock = self.lock_render();
        if !self.is_created() {
            return;
        }

        {
            let _bind = if self.is_destroyed() {
                None
            } else {
                self.scoped_bind(false)
                    .map_err(|e| {
                        log::warn!(
                            "RenderingContext {}: could not bind for teardown ({e}), GPU content will not be cached.",
                            self.id
                        )
                    })
                    .ok()
            };
            self.dispatch(ContextEvent::WillBeDestroyed);
            self.state.lock().reset();
            *self.instancing_mode.lock() = None;
        }

        let native = self.native.lock().take();
        self.is_created.store(false, Ordering::Release);
        self.env.registry.forget(self.id);
        if let Some(native) = native {
            self.env.driver.destroy_context(native);
        }
        log::info!("RenderingContext {}: native context destroyed.", self.id);

        self.dispatch(ContextEvent::Destroyed);
    }

    /// Tears down and recreates the native context, as after a device reset.
    pub fn recreate(&self) -> Result<(), ContextError> {
        let _lock = self.lock_render();
        self.destroy_native();
        self.create_native()
    }

    /// Permanently releases the context. Dependents observe `is_destroyed()`
    /// during the final `WillBeDestroyed`/`Destroyed` events.
    pub fn release(&self) {
        let _lock = self.lock_render();
        if self.is_destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.destroy_native();
        self.listeners.clear();
        log::info!("RenderingContext {}: released.", self.id);
    }

    /// The window owning the surface is about to close: tear the native
    /// context down while the window still exists.
    pub fn notify_window_will_close(&self) {
        log::debug!("RenderingContext {}: window will close.", self.id);
        self.destroy_native();
    }

    /// The window is gone: forget the surface without tearing anything down.
    pub fn notify_window_destroyed(&self) {
        log::debug!("RenderingContext {}: window destroyed.", self.id);
        *self.surface.lock() = None;
    }

    /// Attaches a new presentation surface. Takes effect at the next native
    /// creation or surface-including `make_current`.
    pub fn attach_surface(&self, surface: SurfaceId) {
        *self.surface.lock() = Some(surface);
    }

    /// Re-applies every cached state to the driver.
    pub fn sync_states(&self) -> Result<(), ContextError> {
        let _lock = self.lock_render();
        let _bind = self.scoped_bind(false)?;
        self.state.lock().sync_all();
        Ok(())
    }

    /// Cross-checks the state cache with the driver when validation is
    /// enabled. Debug builds only.
    pub fn validate_state(&self) {
        if self.env.settings.validate_driver_state && self.is_current() {
            self.state.lock().validate_against_driver();
        }
    }
}

impl Drop for RenderingContext {
    fn drop(&mut self) {
        if let Some(native) = self.native.get_mut().take() {
            log::debug!("RenderingContext {}: dropped with a live native context.", self.id);
            self.env.registry.forget(self.id);
            self.env.driver.destroy_context(native);
        }
    }
}
