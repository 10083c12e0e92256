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

//! CPU-side mesh data uploaded into vertex arrays.

use super::pipeline::{IndexFormat, PrimitiveTopology};

/// Maximum number of texture coordinate channels a mesh may carry.
pub const MAX_UV_CHANNELS: usize = 4;

/// Meaning of a vertex attribute. Each semantic has a fixed attribute location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexAttributeSemantic {
    /// Object-space position.
    Position,
    /// Normal vector.
    Normal,
    /// Tangent vector.
    Tangent,
    /// Bitangent vector.
    Bitangent,
    /// Vertex color.
    Color,
    /// Texture coordinates for channel `n` (`n < MAX_UV_CHANNELS`).
    Uv(u8),
}

impl VertexAttributeSemantic {
    /// Attribute location used by every program in the engine.
    pub const fn location(self) -> u32 {
        match self {
            VertexAttributeSemantic::Position => 0,
            VertexAttributeSemantic::Normal => 1,
            VertexAttributeSemantic::Tangent => 2,
            VertexAttributeSemantic::Bitangent => 3,
            VertexAttributeSemantic::Color => 4,
            VertexAttributeSemantic::Uv(channel) => 5 + channel as u32,
        }
    }
}

/// One de-interleaved vertex attribute stream of `f32` components.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexStream {
    /// Meaning of the stream.
    pub semantic: VertexAttributeSemantic,
    /// Components per vertex (1..=4).
    pub components: u8,
    /// Packed component data.
    pub data: Vec<f32>,
}

impl VertexStream {
    /// Number of vertices described by the stream.
    pub fn vertex_count(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.data.len() / self.components as usize
        }
    }
}

/// A mesh as uploaded to a vertex array.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    /// Primitive assembly mode.
    pub topology: PrimitiveTopology,
    /// Index data, stored widened to `u32`.
    pub indices: Vec<u32>,
    /// Format used for the GPU index buffer.
    pub index_format: IndexFormat,
    /// Attribute streams, at most one per semantic.
    pub streams: Vec<VertexStream>,
}

impl MeshData {
    /// Creates an empty triangle-list mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the index buffer, choosing the narrowest index format that fits.
    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.index_format = if indices.iter().all(|&i| i <= u16::MAX as u32) {
            IndexFormat::Uint16
        } else {
            IndexFormat::Uint32
        };
        self.indices = indices;
        self
    }

    /// Adds or replaces an attribute stream.
    pub fn with_stream(mut self, semantic: VertexAttributeSemantic, components: u8, data: Vec<f32>) -> Self {
        self.set_stream(VertexStream {
            semantic,
            components,
            data,
        });
        self
    }

    /// Adds or replaces an attribute stream in place.
    pub fn set_stream(&mut self, stream: VertexStream) {
        match self.streams.iter_mut().find(|s| s.semantic == stream.semantic) {
            Some(existing) => *existing = stream,
            None => self.streams.push(stream),
        }
    }

    /// Returns the stream for `semantic`, if any.
    pub fn stream(&self, semantic: VertexAttributeSemantic) -> Option<&VertexStream> {
        self.streams.iter().find(|s| s.semantic == semantic)
    }

    /// Index buffer contents encoded in `index_format`.
    pub fn index_bytes(&self) -> Vec<u8> {
        match self.index_format {
            IndexFormat::Uint16 => self
                .indices
                .iter()
                .flat_map(|&i| (i as u16).to_ne_bytes())
                .collect(),
            IndexFormat::Uint32 => bytemuck::cast_slice(&self.indices).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_format_selection() {
        let small = MeshData::new().with_indices(vec![0, 1, 2]);
        assert_eq!(small.index_format, IndexFormat::Uint16);
        assert_eq!(small.index_bytes().len(), 6);

        let large = MeshData::new().with_indices(vec![0, 70_000, 2]);
        assert_eq!(large.index_format, IndexFormat::Uint32);
        assert_eq!(large.index_bytes().len(), 12);
    }

    #[test]
    fn test_set_stream_replaces_same_semantic() {
        let mesh = MeshData::new()
            .with_stream(VertexAttributeSemantic::Position, 3, vec![0.0; 9])
            .with_stream(VertexAttributeSemantic::Position, 2, vec![0.0; 6]);
        assert_eq!(mesh.streams.len(), 1);
        assert_eq!(mesh.stream(VertexAttributeSemantic::Position).map(|s| s.vertex_count()), Some(3));
    }
}
