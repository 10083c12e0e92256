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

//! The windowing-layer seam of the OpenGL backend.

use anyhow::{anyhow, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_void, CStr};
use std::fmt::Debug;
use std::sync::Arc;
use tessera_core::renderer::api::NativeContextHandle;
use tessera_core::renderer::context::{ContextConfig, PixelFormatCandidate};

/// Combines the handle traits a GL surface must provide into one object-safe trait.
pub trait SurfaceHandle: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle> SurfaceHandle for T {}

/// A window a GL context can render into.
pub type GlSurface = Arc<dyn SurfaceHandle + Send + Sync>;

/// Native context management for one windowing system (WGL, GLX, EGL, ...).
///
/// [`GlowDriver`](super::GlowDriver) picks the pixel format and tracks which
/// context is current; everything that needs the OS goes through this trait.
pub trait GlPlatform: Send + Sync + Debug {
    /// Lists the pixel formats available for `surface`, or for offscreen
    /// contexts when `surface` is `None`.
    fn pixel_formats(&self, surface: Option<&GlSurface>) -> Vec<PixelFormatCandidate>;

    /// Creates a native context with the chosen pixel format.
    fn create_context(
        &self,
        surface: Option<&GlSurface>,
        format: &PixelFormatCandidate,
        config: &ContextConfig,
    ) -> Result<NativeContextHandle>;

    /// Destroys a native context.
    fn destroy_context(&self, context: NativeContextHandle);

    /// Makes `context` current on the calling thread. `None` unbinds.
    fn make_current(&self, context: Option<NativeContextHandle>, surface: Option<&GlSurface>) -> bool;

    /// Resolves a GL entry point for the context current on the calling thread.
    fn get_proc_address(&self, symbol: &CStr) -> *const c_void;
}

/// Short description of a surface's native window, for logs.
pub fn describe_surface(surface: &GlSurface) -> Result<String> {
    let window = surface
        .window_handle()
        .map_err(|e| anyhow!("Surface has no usable window handle: {e:?}"))?;
    let display = surface
        .display_handle()
        .map_err(|e| anyhow!("Surface has no usable display handle: {e:?}"))?;
    Ok(format!("{:?} on {:?}", window.as_raw(), display.as_raw()))
}
