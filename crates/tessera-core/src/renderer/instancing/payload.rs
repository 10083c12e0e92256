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

//! Per-instance payload types and their texel encoding.

use crate::math::LinearRgba;

/// Data streamed once per instance.
///
/// Payloads are encoded as `vec4` texels. The encoding is the same for both
/// instancing strategies, only the upload path differs.
pub trait InstancePayload: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// Number of `vec4` texels one instance occupies.
    const TEXELS_PER_INSTANCE: usize;

    /// Writes the instance into `out`, which holds exactly
    /// [`Self::TEXELS_PER_INSTANCE`] texels.
    fn write_texels(&self, out: &mut [[f32; 4]]);
}

/// An affine model transform stored as four `vec3` columns.
///
/// The last column is the translation. The implicit fourth row is
/// `(0, 0, 0, 1)` and is written into the `w` lane of each texel.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct AffineTransform {
    /// Basis columns followed by the translation.
    pub columns: [[f32; 3]; 4],
}

impl AffineTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        columns: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]],
    };

    /// A pure translation.
    pub const fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            columns: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [x, y, z]],
        }
    }

    /// A non-uniform scale followed by a translation.
    pub const fn from_scale_translation(scale: [f32; 3], translation: [f32; 3]) -> Self {
        Self {
            columns: [
                [scale[0], 0.0, 0.0],
                [0.0, scale[1], 0.0],
                [0.0, 0.0, scale[2]],
                translation,
            ],
        }
    }

    /// Expands to a column-major 4x4 matrix.
    pub fn to_mat4(&self) -> [f32; 16] {
        let mut m = [0.0; 16];
        for (i, column) in self.columns.iter().enumerate() {
            m[i * 4..i * 4 + 3].copy_from_slice(column);
        }
        m[15] = 1.0;
        m
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl InstancePayload for AffineTransform {
    const TEXELS_PER_INSTANCE: usize = 4;

    fn write_texels(&self, out: &mut [[f32; 4]]) {
        for (texel, column) in out.iter_mut().zip(self.columns.iter()) {
            *texel = [column[0], column[1], column[2], 0.0];
        }
        out[3][3] = 1.0;
    }
}

/// A per-instance tint.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct InstanceColor(pub LinearRgba);

impl InstancePayload for InstanceColor {
    const TEXELS_PER_INSTANCE: usize = 1;

    fn write_texels(&self, out: &mut [[f32; 4]]) {
        out[0] = self.0.to_array();
    }
}

impl From<LinearRgba> for InstanceColor {
    fn from(color: LinearRgba) -> Self {
        Self(color)
    }
}

/// A per-instance UV transform: `uv * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct UvRect {
    /// Offset added after scaling.
    pub offset: [f32; 2],
    /// Scale applied to the mesh UVs.
    pub scale: [f32; 2],
}

impl UvRect {
    /// The identity mapping.
    pub const FULL: Self = Self {
        offset: [0.0, 0.0],
        scale: [1.0, 1.0],
    };

    /// Creates a UV rect.
    pub const fn new(offset: [f32; 2], scale: [f32; 2]) -> Self {
        Self { offset, scale }
    }
}

impl Default for UvRect {
    fn default() -> Self {
        Self::FULL
    }
}

impl InstancePayload for UvRect {
    const TEXELS_PER_INSTANCE: usize = 1;

    fn write_texels(&self, out: &mut [[f32; 4]]) {
        out[0] = [self.scale[0], self.scale[1], self.offset[0], self.offset[1]];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_texels_carry_implicit_row() {
        let transform = AffineTransform::from_translation(3.0, 4.0, 5.0);
        let mut texels = [[9.0; 4]; 4];
        transform.write_texels(&mut texels);
        assert_eq!(texels[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(texels[3], [3.0, 4.0, 5.0, 1.0]);
    }

    #[test]
    fn test_to_mat4_is_column_major() {
        let m = AffineTransform::from_scale_translation([2.0, 3.0, 4.0], [7.0, 8.0, 9.0]).to_mat4();
        assert_eq!(m[0], 2.0);
        assert_eq!(m[5], 3.0);
        assert_eq!(m[10], 4.0);
        assert_eq!(&m[12..], &[7.0, 8.0, 9.0, 1.0]);
    }

    #[test]
    fn test_uv_rect_packs_scale_first() {
        let mut texel = [[0.0; 4]];
        UvRect::new([0.25, 0.5], [0.5, 0.5]).write_texels(&mut texel);
        assert_eq!(texel[0], [0.5, 0.5, 0.25, 0.5]);
    }
}
