//! # Core Type Definitions
//!
//! Fundamental types used throughout the Worldmirror engine: remote entity
//! identity, session identity, 3D vector math and the skeletal attachment
//! points the visibility engine samples.
//!
//! ## Key Types
//!
//! - [`RemoteAddr`] - Stable remote identity of a mirrored entity
//! - [`SessionId`] - Unique identifier for one mirroring session
//! - [`Vec3`] - 3D position/direction with double precision
//! - [`BoneId`] - Named skeletal attachment point with its own transform

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable remote address identifying an entity in the mirrored process.
///
/// The remote process owns entity memory; this address is the only durable
/// identity the mirror has. It is a wrapper around `u64` so registry keys
/// cannot be confused with offsets or ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteAddr(pub u64);

impl std::fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Unique identifier for one mirroring session.
///
/// A session is bound to one observed remote world; when the world ends a
/// fresh session (with a fresh ID) is constructed from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random session ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 3D vector with double-precision components.
///
/// Used for entity positions, facing directions, attachment-point transforms
/// and the aim-source. Double precision keeps large-world coordinates exact.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    /// Creates a new Vec3 with the specified coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Calculates the distance to another Vec3.
    pub fn distance(&self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Dot product with another Vec3.
    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Euclidean length of the vector.
    pub fn length(&self) -> f64 {
        self.dot(*self).sqrt()
    }

    /// Returns the vector scaled to unit length, or `Vec3::ZERO` if the
    /// vector is degenerate.
    pub fn normalized(&self) -> Vec3 {
        let len = self.length();
        if len <= f64::EPSILON {
            return Vec3::ZERO;
        }
        Vec3::new(self.x / len, self.y / len, self.z / len)
    }

    /// Angular offset in degrees between this direction and the direction
    /// from `from` towards `to`.
    ///
    /// Used to rank visibility candidates by how close they sit to the
    /// viewer's aim. Returns 180.0 when either direction is degenerate so
    /// indeterminate candidates sort last.
    pub fn angle_to_target(&self, from: Vec3, to: Vec3) -> f64 {
        let aim = self.normalized();
        let toward = Vec3::new(to.x - from.x, to.y - from.y, to.z - from.z).normalized();
        if aim == Vec3::ZERO || toward == Vec3::ZERO {
            return 180.0;
        }
        aim.dot(toward).clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// True when all three components are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Named skeletal attachment point on a mirrored entity.
///
/// The sampled set (the first seven, see [`BoneId::SAMPLE_ORDER`]) each have
/// a transform that can be read remotely; the remaining points are never
/// read directly and only become visible through inheritance from a sampled
/// neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoneId {
    Neck,
    SpineUpper,
    Pelvis,
    ForearmLeft,
    ForearmRight,
    ThighLeft,
    ThighRight,
    // Inherited-only points below: no remote read is ever issued for these.
    Head,
    PalmLeft,
    PalmRight,
    CollarboneLeft,
    CollarboneRight,
}

impl BoneId {
    /// Sampled attachment points in anatomical-importance order.
    ///
    /// Tier sample counts trim this list from the front, so the neck and
    /// upper spine are always the first points checked.
    pub const SAMPLE_ORDER: [BoneId; 7] = [
        BoneId::Neck,
        BoneId::SpineUpper,
        BoneId::Pelvis,
        BoneId::ForearmLeft,
        BoneId::ForearmRight,
        BoneId::ThighLeft,
        BoneId::ThighRight,
    ];

    /// Points marked visible for free when this point tests visible.
    ///
    /// A clear line to the neck implies a clear line to the head; a clear
    /// line to a forearm implies the same-side collarbone and palm. No
    /// extra reads or line-of-sight tests are spent on inherited points.
    pub fn inherited(self) -> &'static [BoneId] {
        match self {
            BoneId::Neck => &[BoneId::Head],
            BoneId::ForearmLeft => &[BoneId::CollarboneLeft, BoneId::PalmLeft],
            BoneId::ForearmRight => &[BoneId::CollarboneRight, BoneId::PalmRight],
            _ => &[],
        }
    }

    /// Index of this point within [`BoneId::SAMPLE_ORDER`], if it is a
    /// sampled point.
    pub fn sample_index(self) -> Option<usize> {
        Self::SAMPLE_ORDER.iter().position(|b| *b == self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_addr_displays_as_hex() {
        assert_eq!(RemoteAddr(0xDEAD).to_string(), "0xdead");
    }

    #[test]
    fn session_id_uniqueness() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn vec3_distance() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(1.0, 2.0, 8.0);
        assert_eq!(a.distance(b), 5.0);
    }

    #[test]
    fn angle_to_target_straight_ahead_is_zero() {
        let aim = Vec3::new(0.0, 1.0, 0.0);
        let angle = aim.angle_to_target(Vec3::ZERO, Vec3::new(0.0, 10.0, 0.0));
        assert!(angle.abs() < 1e-9);
    }

    #[test]
    fn angle_to_target_degenerate_sorts_last() {
        let angle = Vec3::ZERO.angle_to_target(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(angle, 180.0);
    }

    #[test]
    fn inherited_points_are_never_sampled() {
        for bone in BoneId::SAMPLE_ORDER {
            for inherited in bone.inherited() {
                assert!(inherited.sample_index().is_none());
            }
        }
    }
}
