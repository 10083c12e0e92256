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

use tessera_core::renderer::api::{
    AddressMode, BlendFactor, BufferTarget, BufferUsage, Capability, CompareFunction, CullMode,
    FrontFace, IndexFormat, NativeHandle, PixelFormat, PolygonMode, PrimitiveTopology,
    TextureFilter, TextureTarget, UniformLocation,
};

/// A local extension trait to convert engine enums into OpenGL enumerants.
/// Keeps `.into_gl()` call sites readable despite the orphan rules.
pub trait IntoGl<T> {
    /// Consumes self and converts it into its GL counterpart.
    fn into_gl(self) -> T;
}

/// The three enumerants GL needs to describe a pixel transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlPixelFormat {
    /// Sized internal format used for storage.
    pub internal: u32,
    /// Client-side channel layout.
    pub format: u32,
    /// Client-side component type.
    pub ty: u32,
}

// --- Objects ---

impl IntoGl<glow::NativeTexture> for NativeHandle {
    fn into_gl(self) -> glow::NativeTexture {
        glow::NativeTexture(self.0)
    }
}

impl IntoGl<glow::NativeBuffer> for NativeHandle {
    fn into_gl(self) -> glow::NativeBuffer {
        glow::NativeBuffer(self.0)
    }
}

impl IntoGl<glow::NativeVertexArray> for NativeHandle {
    fn into_gl(self) -> glow::NativeVertexArray {
        glow::NativeVertexArray(self.0)
    }
}

impl IntoGl<glow::NativeFramebuffer> for NativeHandle {
    fn into_gl(self) -> glow::NativeFramebuffer {
        glow::NativeFramebuffer(self.0)
    }
}

impl IntoGl<glow::NativeProgram> for NativeHandle {
    fn into_gl(self) -> glow::NativeProgram {
        glow::NativeProgram(self.0)
    }
}

impl IntoGl<glow::NativeUniformLocation> for UniformLocation {
    fn into_gl(self) -> glow::NativeUniformLocation {
        glow::NativeUniformLocation(self.0)
    }
}

// --- Targets and usages ---

impl IntoGl<u32> for TextureTarget {
    fn into_gl(self) -> u32 {
        match self {
            TextureTarget::Texture2D => glow::TEXTURE_2D,
            TextureTarget::Texture2DMultisample => glow::TEXTURE_2D_MULTISAMPLE,
        }
    }
}

impl IntoGl<u32> for BufferTarget {
    fn into_gl(self) -> u32 {
        match self {
            BufferTarget::Array => glow::ARRAY_BUFFER,
            BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
            BufferTarget::PixelUnpack => glow::PIXEL_UNPACK_BUFFER,
            BufferTarget::Uniform => glow::UNIFORM_BUFFER,
        }
    }
}

impl IntoGl<u32> for BufferUsage {
    fn into_gl(self) -> u32 {
        match self {
            BufferUsage::StaticDraw => glow::STATIC_DRAW,
            BufferUsage::DynamicDraw => glow::DYNAMIC_DRAW,
            BufferUsage::StreamDraw => glow::STREAM_DRAW,
        }
    }
}

// --- Fixed-function state ---

impl IntoGl<u32> for Capability {
    fn into_gl(self) -> u32 {
        match self {
            Capability::Blend => glow::BLEND,
            Capability::DepthTest => glow::DEPTH_TEST,
            Capability::CullFace => glow::CULL_FACE,
            Capability::ScissorTest => glow::SCISSOR_TEST,
            Capability::Multisample => glow::MULTISAMPLE,
            Capability::ClipDistance(index) => glow::CLIP_DISTANCE0 + index as u32,
        }
    }
}

impl IntoGl<u32> for BlendFactor {
    fn into_gl(self) -> u32 {
        match self {
            BlendFactor::Zero => glow::ZERO,
            BlendFactor::One => glow::ONE,
            BlendFactor::SrcColor => glow::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => glow::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstColor => glow::DST_COLOR,
            BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => glow::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        }
    }
}

impl IntoGl<u32> for CompareFunction {
    fn into_gl(self) -> u32 {
        match self {
            CompareFunction::Never => glow::NEVER,
            CompareFunction::Less => glow::LESS,
            CompareFunction::Equal => glow::EQUAL,
            CompareFunction::LessEqual => glow::LEQUAL,
            CompareFunction::Greater => glow::GREATER,
            CompareFunction::NotEqual => glow::NOTEQUAL,
            CompareFunction::GreaterEqual => glow::GEQUAL,
            CompareFunction::Always => glow::ALWAYS,
        }
    }
}

/// `None` for [`CullMode::Off`], which maps to disabling `GL_CULL_FACE`.
impl IntoGl<Option<u32>> for CullMode {
    fn into_gl(self) -> Option<u32> {
        match self {
            CullMode::Off => None,
            CullMode::Front => Some(glow::FRONT),
            CullMode::Back => Some(glow::BACK),
            CullMode::FrontAndBack => Some(glow::FRONT_AND_BACK),
        }
    }
}

impl IntoGl<u32> for FrontFace {
    fn into_gl(self) -> u32 {
        match self {
            FrontFace::Ccw => glow::CCW,
            FrontFace::Cw => glow::CW,
        }
    }
}

impl IntoGl<u32> for PolygonMode {
    fn into_gl(self) -> u32 {
        match self {
            PolygonMode::Fill => glow::FILL,
            PolygonMode::Line => glow::LINE,
        }
    }
}

// --- Drawing ---

impl IntoGl<u32> for PrimitiveTopology {
    fn into_gl(self) -> u32 {
        match self {
            PrimitiveTopology::PointList => glow::POINTS,
            PrimitiveTopology::LineList => glow::LINES,
            PrimitiveTopology::LineStrip => glow::LINE_STRIP,
            PrimitiveTopology::TriangleList => glow::TRIANGLES,
            PrimitiveTopology::TriangleStrip => glow::TRIANGLE_STRIP,
        }
    }
}

impl IntoGl<u32> for IndexFormat {
    fn into_gl(self) -> u32 {
        match self {
            IndexFormat::Uint16 => glow::UNSIGNED_SHORT,
            IndexFormat::Uint32 => glow::UNSIGNED_INT,
        }
    }
}

// --- Textures ---

impl IntoGl<GlPixelFormat> for PixelFormat {
    fn into_gl(self) -> GlPixelFormat {
        let (internal, format, ty) = match self {
            PixelFormat::R8 => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
            PixelFormat::Rgb8 => (glow::RGB8, glow::RGB, glow::UNSIGNED_BYTE),
            PixelFormat::Rgba8 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
            PixelFormat::Rgba16F => (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
            PixelFormat::R32F => (glow::R32F, glow::RED, glow::FLOAT),
            PixelFormat::Rgba32F => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
            PixelFormat::Depth32F => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        };
        GlPixelFormat { internal, format, ty }
    }
}

impl IntoGl<u32> for TextureFilter {
    fn into_gl(self) -> u32 {
        match self {
            TextureFilter::Nearest => glow::NEAREST,
            TextureFilter::Linear => glow::LINEAR,
            TextureFilter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
            TextureFilter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
            TextureFilter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
            TextureFilter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
        }
    }
}

impl IntoGl<u32> for AddressMode {
    fn into_gl(self) -> u32 {
        match self {
            AddressMode::ClampToEdge => glow::CLAMP_TO_EDGE,
            AddressMode::Repeat => glow::REPEAT,
            AddressMode::MirrorRepeat => glow::MIRRORED_REPEAT,
            AddressMode::ClampToBorder => glow::CLAMP_TO_BORDER,
        }
    }
}

/// Wraps a GL object name returned by `glow` into an engine handle.
pub fn native_handle(raw: std::num::NonZeroU32) -> NativeHandle {
    NativeHandle(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_distances_are_contiguous() {
        let first: u32 = Capability::ClipDistance(0).into_gl();
        let third: u32 = Capability::ClipDistance(2).into_gl();
        assert_eq!(first, glow::CLIP_DISTANCE0);
        assert_eq!(third, glow::CLIP_DISTANCE2);
    }

    #[test]
    fn test_cull_off_has_no_face() {
        let off: Option<u32> = CullMode::Off.into_gl();
        let back: Option<u32> = CullMode::Back.into_gl();
        assert_eq!(off, None);
        assert_eq!(back, Some(glow::BACK));
    }

    #[test]
    fn test_float_formats_use_float_transfers() {
        let rgba32f: GlPixelFormat = PixelFormat::Rgba32F.into_gl();
        assert_eq!(rgba32f.internal, glow::RGBA32F);
        assert_eq!(rgba32f.ty, glow::FLOAT);
        let rgba8: GlPixelFormat = PixelFormat::Rgba8.into_gl();
        assert_eq!((rgba8.format, rgba8.ty), (glow::RGBA, glow::UNSIGNED_BYTE));
    }

    #[test]
    fn test_handles_keep_their_name() {
        let handle = NativeHandle::new(42).unwrap();
        let texture: glow::NativeTexture = handle.into_gl();
        assert_eq!(native_handle(texture.0), handle);
    }
}
