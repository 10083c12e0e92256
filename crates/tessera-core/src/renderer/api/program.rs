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

//! Opaque program sources and uniform payloads.

/// Source code of a GPU program. The text is handed to the driver untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProgramSource {
    /// Label used in logs.
    pub label: String,
    /// Vertex stage source.
    pub vertex: String,
    /// Fragment stage source.
    pub fragment: String,
}

impl ProgramSource {
    /// Creates a new program source.
    pub fn new(label: impl Into<String>, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// A single uniform value stored by materials and render passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `int` or `sampler` unit.
    Int(i32),
    /// `float`.
    Float(f32),
    /// `vec2`.
    Vec2([f32; 2]),
    /// `vec3`.
    Vec3([f32; 3]),
    /// `vec4`.
    Vec4([f32; 4]),
    /// Column-major `mat4`.
    Mat4([f32; 16]),
}

/// Data handed to the driver for one uniform upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    /// A single value.
    Value(UniformValue),
    /// An array of `vec4`, starting at the uniform's first element.
    Vec4Array(&'a [[f32; 4]]),
}

impl From<UniformValue> for UniformData<'_> {
    fn from(value: UniformValue) -> Self {
        UniformData::Value(value)
    }
}
