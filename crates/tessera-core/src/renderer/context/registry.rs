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

//! Tracks which context is current on which thread.

use super::RenderingContext;
use crate::renderer::api::{ContextId, RenderTargetId};
use crate::renderer::error::ContextError;
use crate::renderer::traits::GraphicsDriver;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Default)]
struct ThreadBinding {
    context: Option<(ContextId, Weak<RenderingContext>)>,
    surface_bound: bool,
    render_target: Option<RenderTargetId>,
}

impl ThreadBinding {
    fn context_id(&self) -> Option<ContextId> {
        self.context.as_ref().map(|(id, _)| *id)
    }
}

/// Per-thread record of the current context and render target.
///
/// The registry also owns the render lock: a reentrant mutex that serializes
/// every code path touching the driver, so lifecycle notifications raised from
/// asset code off the render thread are safe.
pub struct ContextRegistry {
    driver: Arc<dyn GraphicsDriver>,
    render_lock: ReentrantMutex<()>,
    bindings: Mutex<HashMap<ThreadId, ThreadBinding>>,
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("threads", &self.bindings.lock().len())
            .finish()
    }
}

impl ContextRegistry {
    /// Creates an empty registry over `driver`.
    pub fn new(driver: Arc<dyn GraphicsDriver>) -> Self {
        Self {
            driver,
            render_lock: ReentrantMutex::new(()),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the render lock.
    pub fn lock_render(&self) -> ReentrantMutexGuard<'_, ()> {
        self.render_lock.lock()
    }

    fn binding(&self) -> ThreadBinding {
        self.bindings
            .lock()
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_default()
    }

    /// Id of the context current on the calling thread.
    pub fn current_context_id(&self) -> Option<ContextId> {
        self.binding().context_id()
    }

    /// The context current on the calling thread.
    pub fn current_context(&self) -> Option<Arc<RenderingContext>> {
        self.binding()
            .context
            .and_then(|(_, weak)| weak.upgrade())
    }

    /// The render target current on the calling thread.
    pub fn current_render_target(&self) -> Option<RenderTargetId> {
        self.binding().render_target
    }

    /// Records the render target current on the calling thread.
    pub fn set_current_render_target(&self, target: Option<RenderTargetId>) {
        let mut bindings = self.bindings.lock();
        let binding = bindings.entry(thread::current().id()).or_default();
        binding.render_target = target;
    }

    /// Makes `target` current on the calling thread, or unbinds with `None`.
    ///
    /// Returns immediately if `target` is already current (and, when
    /// `include_surface` is set, bound to its surface). Before a switch the
    /// previously current context is told it is losing currency, along with
    /// the thread's render target, which the switch resets. On failure the
    /// previous binding stays in place.
    pub fn make_current(
        &self,
        target: Option<&Arc<RenderingContext>>,
        include_surface: bool,
    ) -> Result<(), ContextError> {
        let _lock = self.render_lock.lock();
        let thread = thread::current().id();
        let previous = self.binding();

        let Some(context) = target else {
            if previous.context.is_none() {
                return Ok(());
            }
            Self::notify_will_lose_currency(&previous);
            self.driver.make_current(None, None);
            let mut bindings = self.bindings.lock();
            if let Some(binding) = bindings.get_mut(&thread) {
                binding.context = None;
                binding.surface_bound = false;
                binding.render_target = None;
            }
            return Ok(());
        };

        if previous.context_id() == Some(context.id())
            && (!include_surface || previous.surface_bound || context.surface().is_none())
        {
            return Ok(());
        }
        if context.is_destroyed() {
            return Err(ContextError::Released);
        }
        let Some(native) = context.native_handle() else {
            return Err(ContextError::InvalidContext);
        };
        let bound_elsewhere = self
            .bindings
            .lock()
            .iter()
            .any(|(t, b)| *t != thread && b.context_id() == Some(context.id()));
        if bound_elsewhere {
            return Err(ContextError::CurrentOnAnotherThread);
        }

        if previous.context_id() != Some(context.id()) {
            Self::notify_will_lose_currency(&previous);
        }
        let surface = if include_surface { context.surface() } else { None };
        if !self.driver.make_current(Some(native), surface) {
            log::error!(
                "ContextRegistry: driver refused to make {} current.",
                context.id()
            );
            return Err(ContextError::SwitchFailed);
        }

        log::trace!(
            "ContextRegistry: {:?} -> {} on {thread:?}.",
            previous.context_id(),
            context.id()
        );
        self.bindings.lock().insert(
            thread,
            ThreadBinding {
                context: Some((context.id(), Arc::downgrade(context))),
                surface_bound: surface.is_some(),
                render_target: None,
            },
        );
        Ok(())
    }

    fn notify_will_lose_currency(previous: &ThreadBinding) {
        let Some(context) = previous.context.as_ref().and_then(|(_, weak)| weak.upgrade()) else {
            return;
        };
        log::trace!(
            "ContextRegistry: {} is losing currency (render target {:?}).",
            context.id(),
            previous.render_target
        );
        context.notify_will_lose_currency(previous.render_target);
    }

    /// Makes `context` current until the returned guard drops.
    pub fn scoped_bind(
        self: &Arc<Self>,
        context: &Arc<RenderingContext>,
        include_surface: bool,
    ) -> Result<ContextScopeBind, ContextError> {
        let previous = self.binding();
        self.make_current(Some(context), include_surface)?;
        Ok(ContextScopeBind {
            registry: self.clone(),
            previous: previous.context.map(|(_, weak)| weak),
            previous_surface_bound: previous.surface_bound,
            previous_target: previous.render_target,
            _thread_bound: PhantomData,
        })
    }

    /// Drops every thread binding that refers to `id`. Called once the native
    /// context is gone.
    pub fn forget(&self, id: ContextId) {
        let mut bindings = self.bindings.lock();
        for binding in bindings.values_mut() {
            if binding.context_id() == Some(id) {
                *binding = ThreadBinding::default();
            }
        }
        bindings.retain(|_, b| b.context.is_some() || b.render_target.is_some());
    }
}

/// Restores the previously current context and render target when dropped.
///
/// Restoration also happens on early `?` returns and while unwinding. The
/// guard is tied to the thread that created it.
#[must_use = "the previous context is restored as soon as the guard is dropped"]
pub struct ContextScopeBind {
    registry: Arc<ContextRegistry>,
    previous: Option<Weak<RenderingContext>>,
    previous_surface_bound: bool,
    previous_target: Option<RenderTargetId>,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for ContextScopeBind {
    fn drop(&mut self) {
        let previous = self.previous.as_ref().and_then(Weak::upgrade);
        let restored = match previous.as_ref() {
            Some(context) if context.is_valid() => self
                .registry
                .make_current(Some(context), self.previous_surface_bound),
            Some(context) => {
                log::warn!(
                    "ContextScopeBind: previous context {} is no longer valid, unbinding.",
                    context.id()
                );
                Err(ContextError::InvalidContext)
            }
            None => self.registry.make_current(None, false),
        };
        if let Err(e) = restored {
            if previous.as_ref().is_some_and(|c| c.is_valid()) {
                log::warn!("ContextScopeBind: failed to restore previous context: {e}");
            }
            let _ = self.registry.make_current(None, false);
        }
        self.registry.set_current_render_target(self.previous_target);
    }
}

#[cfg(test)]
mod tests {
    use crate::renderer::api::RenderTargetId;
    use crate::renderer::context::{ContextConfig, ContextListener, RenderingContext};
    use crate::renderer::error::ContextError;
    use crate::renderer::headless::HeadlessDriver;
    use crate::renderer::system::RenderSystem;
    use parking_lot::Mutex;
    use std::sync::{Arc, Weak};

    #[derive(Default)]
    struct CurrencyWatch {
        lost: Mutex<Vec<Option<RenderTargetId>>>,
    }

    impl ContextListener for CurrencyWatch {
        fn on_context_will_lose_currency(
            &self,
            _context: &RenderingContext,
            render_target: Option<RenderTargetId>,
        ) {
            self.lost.lock().push(render_target);
        }
    }

    fn system() -> (Arc<HeadlessDriver>, RenderSystem) {
        let driver = Arc::new(HeadlessDriver::new());
        let system = RenderSystem::new(driver.clone(), Default::default());
        (driver, system)
    }

    #[test]
    fn test_make_current_is_idempotent() {
        let (driver, system) = system();
        let ctx = system
            .create_context(None, ContextConfig::labeled("a"))
            .unwrap();
        ctx.make_current(false).unwrap();
        let switches = driver.call_count("make_current");
        ctx.make_current(false).unwrap();
        assert_eq!(driver.call_count("make_current"), switches);
        assert!(ctx.is_current());
    }

    #[test]
    fn test_switch_notifies_previous_context_with_its_render_target() {
        let (_driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let b = system.create_context(None, ContextConfig::labeled("b")).unwrap();
        a.make_current(false).unwrap();
        system.registry().set_current_render_target(Some(RenderTargetId(9)));

        let watch = Arc::new(CurrencyWatch::default());
        a.subscribe(Arc::downgrade(&watch) as Weak<dyn ContextListener>);

        a.make_current(false).unwrap();
        assert!(watch.lost.lock().is_empty());

        b.make_current(false).unwrap();
        assert_eq!(*watch.lost.lock(), vec![Some(RenderTargetId(9))]);
        assert_eq!(system.registry().current_render_target(), None);

        b.make_current(false).unwrap();
        assert_eq!(watch.lost.lock().len(), 1);
    }

    #[test]
    fn test_unbind_notifies_current_context() {
        let (_driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        a.make_current(false).unwrap();

        let watch = Arc::new(CurrencyWatch::default());
        a.subscribe(Arc::downgrade(&watch) as Weak<dyn ContextListener>);

        system.registry().make_current(None, false).unwrap();
        assert_eq!(*watch.lost.lock(), vec![None]);
        system.registry().make_current(None, false).unwrap();
        assert_eq!(watch.lost.lock().len(), 1);
    }

    #[test]
    fn test_scope_restores_previous_context() {
        let (_driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let b = system.create_context(None, ContextConfig::labeled("b")).unwrap();
        a.make_current(false).unwrap();
        system.registry().set_current_render_target(Some(RenderTargetId(9)));

        {
            let _scope = b.scoped_bind(false).unwrap();
            assert!(b.is_current());
            assert_eq!(system.registry().current_render_target(), None);
        }

        assert!(a.is_current());
        assert_eq!(
            system.registry().current_render_target(),
            Some(RenderTargetId(9))
        );
    }

    #[test]
    fn test_scope_restores_on_early_error_return() {
        let (_driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let b = system.create_context(None, ContextConfig::labeled("b")).unwrap();
        a.make_current(false).unwrap();

        let upload = || -> Result<(), ContextError> { Err(ContextError::SwitchFailed) };
        let work = || -> Result<(), ContextError> {
            let _scope = b.scoped_bind(false)?;
            assert!(b.is_current());
            upload()?;
            Ok(())
        };
        assert_eq!(work(), Err(ContextError::SwitchFailed));
        assert!(a.is_current());
    }

    #[test]
    fn test_scope_restores_while_unwinding() {
        let (_driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let b = system.create_context(None, ContextConfig::labeled("b")).unwrap();
        a.make_current(false).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = b.scoped_bind(false).unwrap();
            panic!("draw failed");
        }));
        assert!(result.is_err());
        assert!(a.is_current());
    }

    #[test]
    fn test_failed_switch_keeps_previous_current() {
        let (driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let b = system.create_context(None, ContextConfig::labeled("b")).unwrap();
        a.make_current(false).unwrap();

        driver.fail_next_make_current();
        assert_eq!(b.make_current(false), Err(ContextError::SwitchFailed));
        assert!(a.is_current());
        assert!(!b.is_current());
    }

    #[test]
    fn test_context_current_on_one_thread_only() {
        let (_driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        a.make_current(false).unwrap();

        let other = a.clone();
        let result = std::thread::spawn(move || other.make_current(false))
            .join()
            .unwrap();
        assert_eq!(result, Err(ContextError::CurrentOnAnotherThread));
    }

    #[test]
    fn test_destroyed_native_is_no_longer_current() {
        let (_driver, system) = system();
        let a = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        a.make_current(false).unwrap();
        a.destroy_native();
        assert!(system.registry().current_context().is_none());
        assert_eq!(a.make_current(false), Err(ContextError::InvalidContext));
    }
}
