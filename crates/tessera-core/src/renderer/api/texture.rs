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

//! Texture formats, sampler parameters and CPU-side pixel storage.

use crate::math::{Extent2D, LinearRgba};

/// Texel layout of a texture image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// One 8-bit unsigned normalized channel.
    R8,
    /// Three 8-bit unsigned normalized channels.
    Rgb8,
    /// Four 8-bit unsigned normalized channels.
    #[default]
    Rgba8,
    /// Four 16-bit float channels.
    Rgba16F,
    /// One 32-bit float channel.
    R32F,
    /// Four 32-bit float channels.
    Rgba32F,
    /// 32-bit float depth.
    Depth32F,
}

impl PixelFormat {
    /// Size of one texel in bytes.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba16F => 8,
            PixelFormat::R32F => 4,
            PixelFormat::Rgba32F => 16,
            PixelFormat::Depth32F => 4,
        }
    }

    /// Returns `true` for depth formats.
    pub const fn is_depth(self) -> bool {
        matches!(self, PixelFormat::Depth32F)
    }

    /// Byte length of an image of `extent` in this format.
    pub const fn image_size(self, extent: Extent2D) -> usize {
        extent.area() * self.bytes_per_pixel()
    }
}

/// Bind target of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    /// A regular 2D texture.
    #[default]
    Texture2D,
    /// A multisampled 2D texture.
    Texture2DMultisample,
}

/// Minification or magnification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    /// Nearest texel.
    Nearest,
    /// Bilinear.
    #[default]
    Linear,
    /// Nearest texel of the nearest mip level.
    NearestMipmapNearest,
    /// Bilinear in the nearest mip level.
    LinearMipmapNearest,
    /// Nearest texel, blended between two mip levels.
    NearestMipmapLinear,
    /// Trilinear.
    LinearMipmapLinear,
}

impl TextureFilter {
    /// Returns `true` when sampling with this filter reads a mip chain.
    pub const fn uses_mipmaps(self) -> bool {
        !matches!(self, TextureFilter::Nearest | TextureFilter::Linear)
    }
}

/// Behavior when sampling outside the `[0, 1]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Tile.
    Repeat,
    /// Tile, mirroring every other repetition.
    MirrorRepeat,
    /// Return the border color.
    ClampToBorder,
}

/// One sampler or mip-range parameter applied to the bound texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureParameter {
    /// Minification filter.
    MinFilter(TextureFilter),
    /// Magnification filter.
    MagFilter(TextureFilter),
    /// Horizontal address mode.
    WrapS(AddressMode),
    /// Vertical address mode.
    WrapT(AddressMode),
    /// Border color for [`AddressMode::ClampToBorder`].
    BorderColor(LinearRgba),
    /// Anisotropic filtering level.
    MaxAnisotropy(f32),
    /// Highest mip level that may be sampled.
    MaxLevel(u32),
}

/// Where a sub-image upload reads its texels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelSource<'a> {
    /// Client memory.
    Slice(&'a [u8]),
    /// The currently bound pixel-unpack buffer, starting at a byte offset.
    PixelBuffer {
        /// Byte offset into the bound buffer.
        offset: usize,
    },
}

/// A CPU-side image: one mip level worth of texels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSheet {
    /// Dimensions of the image.
    pub extent: Extent2D,
    /// Texel layout.
    pub format: PixelFormat,
    /// Tightly packed rows, bottom row first.
    pub data: Vec<u8>,
}

impl PixelSheet {
    /// Creates a zero-filled sheet.
    pub fn new(extent: Extent2D, format: PixelFormat) -> Self {
        Self {
            extent,
            format,
            data: vec![0; format.image_size(extent)],
        }
    }

    /// Wraps existing texel data. Returns `None` if the length does not match.
    pub fn from_data(extent: Extent2D, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
        (data.len() == format.image_size(extent)).then_some(Self {
            extent,
            format,
            data,
        })
    }

    /// A sheet where every texel is `texel`.
    ///
    /// `texel` must be exactly one texel of `format`.
    pub fn filled(extent: Extent2D, format: PixelFormat, texel: &[u8]) -> Self {
        debug_assert_eq!(texel.len(), format.bytes_per_pixel());
        let data = texel
            .iter()
            .copied()
            .cycle()
            .take(format.image_size(extent))
            .collect();
        Self {
            extent,
            format,
            data,
        }
    }

    /// The bytes of the texel at `(x, y)`.
    pub fn texel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.extent.width || y >= self.extent.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = (y as usize * self.extent.width as usize + x as usize) * bpp;
        self.data.get(start..start + bpp)
    }

    /// Iterates over every texel.
    pub fn texels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.format.bytes_per_pixel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_sheet() {
        let sheet = PixelSheet::filled(Extent2D::new(4, 2), PixelFormat::Rgba8, &[255, 0, 0, 255]);
        assert_eq!(sheet.data.len(), 32);
        assert_eq!(sheet.texel(3, 1), Some(&[255, 0, 0, 255][..]));
        assert_eq!(sheet.texel(4, 0), None);
        assert!(sheet.texels().all(|t| t == [255, 0, 0, 255]));
    }

    #[test]
    fn test_from_data_rejects_wrong_length() {
        assert!(PixelSheet::from_data(Extent2D::new(2, 2), PixelFormat::R8, vec![0; 3]).is_none());
        assert!(PixelSheet::from_data(Extent2D::new(2, 2), PixelFormat::R8, vec![0; 4]).is_some());
    }

    #[test]
    fn test_mip_filters() {
        assert!(!TextureFilter::Linear.uses_mipmaps());
        assert!(TextureFilter::LinearMipmapLinear.uses_mipmaps());
    }
}
