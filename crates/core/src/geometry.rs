//! Spatial value types carried by entity attributes and entity bodies.
//!
//! These mirror the shapes the wire protocol knows about (packed block
//! positions, six-way directions, Euler rotations) plus the mutable body state
//! that attribute side effects are allowed to touch.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned hit-box dimensions, centred on the entity position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    width: f64,
    height: f64,
    depth: f64,
}

impl BoundingBox {
    /// Create a bounding box from its three extents.
    pub const fn new(width: f64, height: f64, depth: f64) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Extent along the x axis.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Extent along the y axis.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Extent along the z axis.
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Uniformly scale every extent by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(
            self.width * factor,
            self.height * factor,
            self.depth * factor,
        )
    }
}

/// Mutable physical state owned by a live entity.
///
/// Only the entity's own execution context mutates this; foreign code hands
/// mutations off through the entity inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBody {
    /// World-space position of the entity's feet.
    pub position: DVec3,
    /// Current hit-box.
    pub bounding_box: BoundingBox,
}

impl EntityBody {
    /// Body at `position` with the given hit-box.
    pub fn new(position: DVec3, bounding_box: BoundingBox) -> Self {
        Self {
            position,
            bounding_box,
        }
    }

    /// Chunk column `(x, z)` containing the body.
    pub fn chunk(&self) -> (i32, i32) {
        (
            (self.position.x / 16.0).floor() as i32,
            (self.position.z / 16.0).floor() as i32,
        )
    }
}

/// Integer block coordinate.
///
/// Packs into a single `i64` as `x:26 | z:26 | y:12`, so x/z are limited to
/// ±2^25 and y to -2048..=2047.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Whether every axis fits the packed representation.
    pub fn is_packable(&self) -> bool {
        const XZ: std::ops::RangeInclusive<i32> = -(1 << 25)..=(1 << 25) - 1;
        XZ.contains(&self.x) && XZ.contains(&self.z) && (-2048..=2047).contains(&self.y)
    }

    /// Pack into the 64-bit wire representation.
    pub fn pack(self) -> i64 {
        ((self.x as i64 & 0x3FF_FFFF) << 38)
            | ((self.z as i64 & 0x3FF_FFFF) << 12)
            | (self.y as i64 & 0xFFF)
    }

    /// Unpack from the 64-bit wire representation (sign-extending each axis).
    pub fn unpack(packed: i64) -> Self {
        let x = (packed >> 38) as i32;
        let y = ((packed << 52) >> 52) as i32;
        let z = ((packed << 26) >> 38) as i32;
        Self { x, y, z }
    }
}

/// One of the six block faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// -Y
    Down = 0,
    /// +Y
    Up = 1,
    /// -Z
    North = 2,
    /// +Z
    South = 3,
    /// -X
    West = 4,
    /// +X
    East = 5,
}

impl Direction {
    /// Stable numeric representation.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Convert from the stable numeric representation.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Down),
            1 => Some(Self::Up),
            2 => Some(Self::North),
            3 => Some(Self::South),
            4 => Some(Self::West),
            5 => Some(Self::East),
            _ => None,
        }
    }
}

/// Euler rotation in degrees (used by armor-stand style poses).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    /// Rotation around X.
    pub x: f32,
    /// Rotation around Y.
    pub y: f32,
    /// Rotation around Z.
    pub z: f32,
}

impl Rotation {
    /// Create a rotation.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Bitwise comparison, treating NaN payloads and signed zeros as distinct.
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.z.to_bits() == other.z.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_pos_packs_negative_coordinates() {
        for pos in [
            BlockPos::new(0, 0, 0),
            BlockPos::new(-1, -1, -1),
            BlockPos::new(33_554_431, 2047, -33_554_432),
            BlockPos::new(-33_554_432, -2048, 33_554_431),
            BlockPos::new(123, 64, -456),
        ] {
            assert_eq!(BlockPos::unpack(pos.pack()), pos);
        }
    }

    #[test]
    fn packable_range_matches_bit_widths() {
        assert!(BlockPos::new(33_554_431, 2047, -33_554_432).is_packable());
        assert!(!BlockPos::new(33_554_432, 0, 0).is_packable());
        assert!(!BlockPos::new(0, 0, -33_554_433).is_packable());
        assert!(!BlockPos::new(0, 2048, 0).is_packable());
        assert!(!BlockPos::new(0, -2049, 0).is_packable());
    }

    #[test]
    fn direction_is_stable() {
        assert_eq!(Direction::Down.as_u8(), 0);
        assert_eq!(Direction::East.as_u8(), 5);
        assert_eq!(Direction::from_u8(2), Some(Direction::North));
        assert_eq!(Direction::from_u8(6), None);
    }

    #[test]
    fn bounding_box_scales_uniformly() {
        let bb = BoundingBox::new(1.0, 2.0, 1.0).scaled(0.5);
        assert_eq!(bb, BoundingBox::new(0.5, 1.0, 0.5));
    }

    #[test]
    fn body_chunk_floors_negative_positions() {
        let body = EntityBody::new(DVec3::new(-0.5, 64.0, 17.0), BoundingBox::new(1.0, 1.0, 1.0));
        assert_eq!(body.chunk(), (-1, 1));
    }

    #[test]
    fn rotation_bits_eq_distinguishes_signed_zero() {
        assert!(!Rotation::new(0.0, 0.0, 0.0).bits_eq(&Rotation::new(-0.0, 0.0, 0.0)));
        let nan = Rotation::new(f32::NAN, 0.0, 0.0);
        assert!(nan.bits_eq(&nan));
    }
}
