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

//! The backend-agnostic rendering layer.
//!
//! Everything above the [`GraphicsDriver`] seam lives here: context lifecycle
//! and currency, the state cache, GPU resources that survive context loss,
//! object pools, instance streams and the render queue. A concrete driver
//! (the in-memory [`HeadlessDriver`] here, or the OpenGL backend in
//! `tessera-infra`) implements the trait and stays ignorant of all of it.

pub mod api;
pub mod context;
pub mod error;
pub mod headless;
pub mod instancing;
pub mod pool;
pub mod queue;
pub mod resources;
pub mod settings;
pub mod state;
pub mod system;
pub mod traits;

// Re-export the types most callers need.
pub use self::api::*;
pub use self::context::{ContextConfig, ContextListener, RenderingContext};
pub use self::error::{ContextError, DriverError, ResourceError, StreamError};
pub use self::headless::HeadlessDriver;
pub use self::queue::{DrawStats, InstancedDraw, RenderCommand, RenderQueue};
pub use self::settings::RenderSystemSettings;
pub use self::system::{RenderSystem, RenderSystemEvent};
pub use self::traits::GraphicsDriver;
