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

//! Linked GPU programs.

use super::{bind_context, upgrade_context, EpochHandle};
use crate::renderer::api::{NativeHandle, ProgramSource, UniformData, UniformLocation};
use crate::renderer::context::{ContextListener, ListenerId, RenderingContext};
use crate::renderer::error::ResourceError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
struct ProgramInner {
    handle: Option<EpochHandle>,
    locations: HashMap<String, Option<UniformLocation>>,
}

/// A compiled and linked program bound to one rendering context.
///
/// The source is kept on the CPU side and the program is rebuilt every time
/// the context finishes setup after a native recreation.
#[derive(Debug)]
pub struct ShaderProgram {
    source: ProgramSource,
    context: Weak<RenderingContext>,
    inner: Mutex<ProgramInner>,
    listener: Mutex<Option<ListenerId>>,
}

impl ShaderProgram {
    /// Builds `source` in `context`.
    ///
    /// If the native context does not exist yet the program is built when it
    /// is created. Compilation errors are returned as
    /// [`ResourceError::BackendError`].
    pub fn new(context: &Arc<RenderingContext>, source: ProgramSource) -> Result<Arc<Self>, ResourceError> {
        let program = Arc::new(Self {
            source,
            context: Arc::downgrade(context),
            inner: Mutex::new(ProgramInner::default()),
            listener: Mutex::new(None),
        });
        if context.is_valid() {
            program.build(context)?;
        }
        let weak: Weak<dyn ContextListener> = Arc::downgrade(&program) as Weak<dyn ContextListener>;
        *program.listener.lock() = Some(context.subscribe(weak));
        Ok(program)
    }

    /// Label of the program source.
    pub fn label(&self) -> &str {
        &self.source.label
    }

    /// The program source.
    pub fn source(&self) -> &ProgramSource {
        &self.source
    }

    /// The owning context, if it is still alive.
    pub fn context(&self) -> Option<Arc<RenderingContext>> {
        self.context.upgrade()
    }

    /// The native handle, if it belongs to the current context epoch.
    pub fn handle(&self) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.handle_in(&context)
    }

    fn handle_in(&self, context: &RenderingContext) -> Option<NativeHandle> {
        self.inner.lock().handle.and_then(|h| h.get(context))
    }

    /// Whether the program is usable right now.
    pub fn is_valid(&self) -> bool {
        self.handle().is_some()
    }

    fn build(&self, context: &RenderingContext) -> Result<(), ResourceError> {
        let bound = bind_context(context)?;
        let handle = bound.context.driver().create_program(&self.source)?;
        let mut inner = self.inner.lock();
        inner.handle = Some(EpochHandle::new(handle, context));
        inner.locations.clear();
        log::debug!(
            "ShaderProgram '{}': built as {handle:?} in {}.",
            self.source.label,
            context.id()
        );
        Ok(())
    }

    /// Makes the program current in its context's state cache.
    ///
    /// The caller is expected to hold a bind of the owning context.
    pub fn bind(&self) -> Result<NativeHandle, ResourceError> {
        let context = upgrade_context(&self.context)?;
        let handle = self.handle_in(&context).ok_or(ResourceError::InvalidHandle)?;
        let bound = bind_context(&context)?;
        bound.context.state().use_program(Some(handle));
        Ok(handle)
    }

    /// Location of uniform `name`, cached per build.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        let context = self.context.upgrade()?;
        let handle = self.handle_in(&context)?;
        if let Some(cached) = self.inner.lock().locations.get(name) {
            return *cached;
        }
        let bound = bind_context(&context).ok()?;
        let location = bound.context.driver().uniform_location(handle, name);
        self.inner.lock().locations.insert(name.to_string(), location);
        location
    }

    /// Binds the program and uploads `data` to uniform `name`.
    ///
    /// Returns `Ok(false)` when the program has no such uniform.
    pub fn set_uniform<'a>(&self, name: &str, data: impl Into<UniformData<'a>>) -> Result<bool, ResourceError> {
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        self.bind()?;
        let Some(location) = self.uniform_location(name) else {
            return Ok(false);
        };
        bound.context.driver().upload_uniform(location, data.into());
        Ok(true)
    }
}

impl ContextListener for ShaderProgram {
    fn on_context_setup_complete(&self, context: &RenderingContext) {
        if let Err(e) = self.build(context) {
            log::error!("ShaderProgram '{}': rebuild failed: {e}", self.source.label);
        }
    }

    fn on_context_destroyed(&self, _context: &RenderingContext) {
        let mut inner = self.inner.lock();
        inner.handle = None;
        inner.locations.clear();
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        if let Some(id) = self.listener.get_mut().take() {
            context.unsubscribe(id);
        }
        let Some(handle) = self.handle_in(&context) else {
            return;
        };
        match bind_context(&context) {
            Ok(bound) => {
                bound.context.state().forget_program(handle);
                bound.context.driver().delete_program(handle);
            }
            Err(e) => log::warn!(
                "ShaderProgram '{}': leaking {handle:?}, context not bindable ({e}).",
                self.source.label
            ),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::UniformValue;
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::{HeadlessDriver, RecordedUniform};
    use crate::renderer::RenderSystem;

    fn source() -> ProgramSource {
        ProgramSource::new(
            "flat",
            "uniform mat4 u_viewProjection;\nvoid main() {}",
            "uniform vec4 u_tint;\nvoid main() {}",
        )
    }

    #[test]
    fn test_uniform_upload_reaches_driver() {
        let driver = Arc::new(HeadlessDriver::new());
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let program = ShaderProgram::new(&context, source()).unwrap();

        assert!(program.set_uniform("u_tint", UniformValue::Vec4([1.0, 0.5, 0.0, 1.0])).unwrap());
        assert!(!program.set_uniform("u_missing", UniformValue::Float(1.0)).unwrap());

        let _bind = context.scoped_bind(false).unwrap();
        let handle = program.handle().unwrap();
        assert_eq!(
            driver.uniform_value(handle, "u_tint"),
            Some(RecordedUniform::Value(UniformValue::Vec4([1.0, 0.5, 0.0, 1.0])))
        );
    }

    #[test]
    fn test_compile_error_is_reported() {
        let driver = Arc::new(HeadlessDriver::new());
        let system = RenderSystem::new(driver, Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let broken = ProgramSource::new("broken", "", "void main() {}");
        assert!(matches!(
            ShaderProgram::new(&context, broken),
            Err(ResourceError::BackendError(_))
        ));
    }

    #[test]
    fn test_program_is_rebuilt_after_recreation() {
        let driver = Arc::new(HeadlessDriver::new());
        let system = RenderSystem::new(driver, Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        let program = ShaderProgram::new(&context, source()).unwrap();
        let before = context.epoch();

        context.destroy_native();
        assert!(!program.is_valid());

        context.create_native().unwrap();
        assert!(context.epoch() > before);
        assert!(program.is_valid());
        assert!(program.uniform_location("u_viewProjection").is_some());
    }
}
