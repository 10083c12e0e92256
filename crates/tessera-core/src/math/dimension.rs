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

//! Pixel-space sizes, offsets and rectangles.
//!
//! These use integer components and describe texture dimensions, viewports and
//! scissor regions.

/// A two-dimensional extent, typically representing width and height.
///
/// This is commonly used for texture dimensions or surface sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    /// The width component of the extent.
    pub width: u32,
    /// The height component of the extent.
    pub height: u32,
}

impl Extent2D {
    /// Creates a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by the extent.
    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if either side is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Size of mip `level` of a chain starting at this extent.
    pub fn mip_level(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
        }
    }
}

/// A two-dimensional origin, typically representing an (x, y) offset.
///
/// This is often used to specify the top-left corner of a rectangular region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin2D {
    /// The x-coordinate of the origin.
    pub x: u32,
    /// The y-coordinate of the origin.
    pub y: u32,
}

impl Origin2D {
    /// Creates a new origin.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned pixel rectangle, used for viewports and scissor regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    /// Bottom-left corner of the rectangle.
    pub origin: Origin2D,
    /// Size of the rectangle.
    pub extent: Extent2D,
}

impl Rect2D {
    /// Creates a rectangle from its components.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            origin: Origin2D::new(x, y),
            extent: Extent2D::new(width, height),
        }
    }

    /// A rectangle at the origin covering `extent`.
    pub const fn from_extent(extent: Extent2D) -> Self {
        Self {
            origin: Origin2D::new(0, 0),
            extent,
        }
    }

    /// Exclusive right edge.
    pub const fn right(&self) -> u32 {
        self.origin.x + self.extent.width
    }

    /// Exclusive top edge.
    pub const fn top(&self) -> u32 {
        self.origin.y + self.extent.height
    }

    /// Returns the overlap of two rectangles, or an empty rectangle anchored at
    /// the clamped origin when they are disjoint.
    pub fn intersection(&self, other: &Rect2D) -> Rect2D {
        let x0 = self.origin.x.max(other.origin.x);
        let y0 = self.origin.y.max(other.origin.y);
        let x1 = self.right().min(other.right());
        let y1 = self.top().min(other.top());
        Rect2D::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_clamps_to_one() {
        let extent = Extent2D::new(64, 16);
        assert_eq!(extent.mip_level(1), Extent2D::new(32, 8));
        assert_eq!(extent.mip_level(5), Extent2D::new(2, 1));
        assert_eq!(extent.mip_level(10), Extent2D::new(1, 1));
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect2D::new(0, 0, 100, 100);
        let b = Rect2D::new(50, 25, 100, 50);
        assert_eq!(a.intersection(&b), Rect2D::new(50, 25, 50, 50));
    }

    #[test]
    fn test_disjoint_rect_intersection_is_empty() {
        let a = Rect2D::new(0, 0, 10, 10);
        let b = Rect2D::new(20, 20, 5, 5);
        assert!(a.intersection(&b).extent.is_empty());
    }
}
