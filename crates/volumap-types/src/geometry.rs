//! Rigid-body geometry primitives shared across the workspace.
//!
//! These types travel inside bus payloads, so they are plain serde-derivable
//! structs rather than wrappers around an external linear-algebra type.
//!
//! # Example
//!
//! ```rust
//! use volumap_types::geometry::{Transform3D, Vec3, Quaternion};
//!
//! // camera sits 0.5 m forward of the body, same orientation.
//! let body_to_camera = Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity());
//! let world_to_body = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
//!
//! let world_to_camera = world_to_body.compose(body_to_camera);
//! assert!((world_to_camera.translation.x - 1.5).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        // Express v as a pure quaternion.
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        // Rotate other's translation by self's rotation, then add.
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// The inverse transform: if `self` = T_A_B, returns T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rotation = self.rotation.conjugate();
        let inv_translation = inv_rotation.rotate(self.translation).neg();
        Self::new(inv_translation, inv_rotation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_1_SQRT_2;

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let q = Quaternion::identity();
        let v = Vec3::new(1.0, 2.0, 3.0);
        let r = q.rotate(v);
        assert!((r.x - 1.0).abs() < 1e-9);
        assert!((r.y - 2.0).abs() < 1e-9);
        assert!((r.z - 3.0).abs() < 1e-9);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        // 90° rotation around Z axis: (cos45°, 0, 0, sin45°)
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let v = Vec3::new(1.0, 0.0, 0.0);
        let r = q.rotate(v);
        assert!((r.x).abs() < 1e-9, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-9, "y should be ~1, got {}", r.y);
        assert!((r.z).abs() < 1e-9);
    }

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let prod = q.mul(q.conjugate());
        // q * q* should be identity (w≈1, x≈y≈z≈0)
        assert!((prod.w - 1.0).abs() < 1e-9);
        assert!(prod.x.abs() < 1e-9);
        assert!(prod.y.abs() < 1e-9);
        assert!(prod.z.abs() < 1e-9);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_identity_compose_is_noop() {
        let t = Transform3D::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::identity());
        let composed = Transform3D::identity().compose(t);
        assert!((composed.translation.x - 1.0).abs() < 1e-9);
        assert!((composed.translation.y - 2.0).abs() < 1e-9);
        assert!((composed.translation.z - 3.0).abs() < 1e-9);
    }

    #[test]
    fn transform_compose_translations_add() {
        let t1 = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let t2 = Transform3D::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
        let composed = t1.compose(t2);
        assert!((composed.translation.x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn transform_inverse_undoes_compose() {
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let t = Transform3D::new(Vec3::new(1.0, -2.0, 0.5), q90z);
        let roundtrip = t.compose(t.inverse());
        assert!(roundtrip.translation.x.abs() < 1e-9);
        assert!(roundtrip.translation.y.abs() < 1e-9);
        assert!(roundtrip.translation.z.abs() < 1e-9);
        assert!((roundtrip.rotation.w - 1.0).abs() < 1e-9);
    }

    #[test]
    fn transform_serde_roundtrip() {
        let t = Transform3D::new(Vec3::new(0.1, 0.2, 0.3), Quaternion::identity());
        let json = serde_json::to_string(&t).unwrap();
        let back: Transform3D = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
