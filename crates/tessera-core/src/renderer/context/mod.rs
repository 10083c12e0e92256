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

//! Rendering contexts and their lifecycle.
//!
//! A [`RenderingContext`] wraps one native driver context. Its lifecycle is
//! observable through [`ContextListener`]s: textures, vertex arrays, pools and
//! instance streams subscribe weakly and rebuild themselves when the native
//! context is lost and recreated. The [`ContextRegistry`] tracks the current
//! context per thread and hands out [`ContextScopeBind`] guards.

mod config;
mod diagnostics;
mod listener;
mod registry;
mod rendering_context;

pub use self::config::{ContextConfig, PixelFormatCandidate};
pub use self::diagnostics::{ContextDiagnostics, ContextInfo};
pub use self::listener::{ContextEvent, ContextListener, ListenerId, ListenerList};
pub use self::registry::{ContextRegistry, ContextScopeBind};
pub use self::rendering_context::RenderingContext;
pub(crate) use self::rendering_context::ContextEnvironment;
