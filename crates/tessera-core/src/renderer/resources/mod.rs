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

//! GPU resources that survive context loss.
//!
//! Each resource keeps a weak link to its owning [`RenderingContext`] and
//! subscribes to its lifecycle. Native handles are stored as
//! [`EpochHandle`]s, so a handle created before a native recreation is never
//! handed to the driver again.

mod buffer_arena;
mod program;
mod texture;
mod vertex_array;

pub use self::buffer_arena::{ArenaAllocation, VertexBufferArena};
pub use self::program::ShaderProgram;
pub use self::texture::{ReloadCallback, Texture2D};
pub use self::vertex_array::{MeshReloadCallback, VertexArray};

use crate::renderer::api::NativeHandle;
use crate::renderer::context::{ContextScopeBind, RenderingContext};
use crate::renderer::error::{ContextError, ResourceError};
use parking_lot::ReentrantMutexGuard;
use std::sync::{Arc, Weak};

/// A native handle tagged with the context epoch it was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpochHandle {
    handle: NativeHandle,
    epoch: u64,
}

impl EpochHandle {
    /// Tags `handle` with the current epoch of `context`.
    pub fn new(handle: NativeHandle, context: &RenderingContext) -> Self {
        Self {
            handle,
            epoch: context.epoch(),
        }
    }

    /// The handle, if `context` is still in the epoch it was created in.
    pub fn get(&self, context: &RenderingContext) -> Option<NativeHandle> {
        (context.is_valid() && context.epoch() == self.epoch).then_some(self.handle)
    }

    /// The raw handle, without validation.
    pub fn raw(&self) -> NativeHandle {
        self.handle
    }
}

/// A live context made current for the duration of a resource operation.
pub(crate) struct BoundContext<'a> {
    pub(crate) context: &'a RenderingContext,
    _bind: ContextScopeBind,
    _lock: ReentrantMutexGuard<'a, ()>,
}

/// Upgrades `link` to a context that is still valid.
pub(crate) fn upgrade_context(link: &Weak<RenderingContext>) -> Result<Arc<RenderingContext>, ResourceError> {
    let context = link
        .upgrade()
        .ok_or(ResourceError::Context(ContextError::Released))?;
    if !context.is_valid() {
        return Err(ResourceError::Context(ContextError::InvalidContext));
    }
    Ok(context)
}

/// Takes the render lock and binds `context` until the guard drops.
pub(crate) fn bind_context(context: &RenderingContext) -> Result<BoundContext<'_>, ResourceError> {
    let lock = context.lock_render();
    let bind = context.scoped_bind(false)?;
    Ok(BoundContext {
        context,
        _bind: bind,
        _lock: lock,
    })
}
