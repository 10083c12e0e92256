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

//! Identifiers for contexts, surfaces and native driver objects.

use std::fmt;
use std::num::NonZeroU32;

/// Arena key of a [`RenderingContext`](crate::renderer::context::RenderingContext)
/// inside its render system. Stable across native context recreation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Opaque driver-side context handle. Changes every time the native context is
/// recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeContextHandle(pub u64);

/// The driver name of a GPU object (texture, buffer, program, framebuffer,
/// vertex array). The null object is represented as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub NonZeroU32);

impl NativeHandle {
    /// Wraps a raw driver name; `0` is the null object and yields `None`.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw driver name.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Opaque identity of a presentation surface (usually a window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Opaque identity of a render target, tracked per thread alongside the current
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u64);

/// A uniform location inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_null_handle() {
        assert!(NativeHandle::new(0).is_none());
        assert_eq!(NativeHandle::new(5).map(NativeHandle::get), Some(5));
    }
}
