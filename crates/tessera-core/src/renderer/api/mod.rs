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

//! Backend-agnostic data types shared by the driver seam and the resource layer.
//!
//! - **[`handles`]**: Identifiers for contexts, surfaces and native driver objects.
//! - **[`pipeline`]**: Fixed-function state enums (blend, depth, culling, topology).
//! - **[`texture`]**: Pixel formats, sampler parameters and CPU pixel storage.
//! - **[`buffer`]**: Buffer binding targets and usage hints.
//! - **[`program`]**: Opaque program sources and uniform payloads.
//! - **[`mesh`]**: CPU-side mesh data uploaded into vertex arrays.
//! - **[`capabilities`]**: What the current driver context can do.

pub mod buffer;
pub mod capabilities;
pub mod handles;
pub mod mesh;
pub mod pipeline;
pub mod program;
pub mod texture;

pub use self::buffer::{BufferTarget, BufferUsage};
pub use self::capabilities::DriverCapabilities;
pub use self::handles::{
    ContextId, NativeContextHandle, NativeHandle, RenderTargetId, SurfaceId, UniformLocation,
};
pub use self::mesh::{MeshData, VertexAttributeSemantic, VertexStream, MAX_UV_CHANNELS};
pub use self::pipeline::{
    BlendFactor, Capability, CompareFunction, CullMode, FrontFace, IndexFormat, PolygonMode,
    PrimitiveTopology,
};
pub use self::program::{ProgramSource, UniformData, UniformValue};
pub use self::texture::{
    AddressMode, PixelFormat, PixelSheet, PixelSource, TextureFilter, TextureParameter,
    TextureTarget,
};
