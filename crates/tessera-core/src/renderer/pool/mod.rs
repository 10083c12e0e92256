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

//! Pools of reusable per-context render objects.
//!
//! Materials and render passes are created and released at a high rate by
//! scene code. A [`ResourcePool`] keeps released objects in sub-pools keyed
//! by owning context, context epoch and object key, and hands them out again
//! on the next [`ResourcePool::acquire`]. Objects go back through
//! [`Pooled`]'s `Drop`, so releasing is never forgotten and never doubled.

mod material;
mod render_pass;
mod resource_pool;

pub use self::material::{Material, MATERIAL_UNIFORM_BLOCK_SIZE};
pub use self::render_pass::{RenderPass, RenderPassType};
pub use self::resource_pool::{Pooled, PooledObject, ResourcePool};
