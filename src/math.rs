//! Shared vector/quaternion/pose math for the tracking subsystem.
//!
//! Kept minimal and dependency-free (no external linear-algebra crate) to
//! mirror how `hardware::tracking::{Vector3, Quaternion, Pose}` are hand
//! rolled in the teacher's tracking module, extended with the operations
//! the IMU fusion, relation history, and tracking-override composer need:
//! quaternion composition, inversion, shortest-arc slerp, and reconstructing
//! an orientation from a `plus_x`/`plus_z` basis pair (used by the Index
//! config parser).

use serde::{Deserialize, Serialize};

/// 3D Vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag == 0.0 {
            Self::zero()
        } else {
            Self::new(self.x / mag, self.y / mag, self.z / mag)
        }
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn scale(&self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }
}

impl std::ops::Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Quaternion for representing orientation, (x, y, z, w) convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    pub fn from_axis_angle(axis: Vector3, angle_rad: f64) -> Self {
        let axis = axis.normalize();
        let half = angle_rad * 0.5;
        let s = half.sin();
        Self::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag == 0.0 {
            Self::identity()
        } else {
            Self::new(self.x / mag, self.y / mag, self.z / mag, self.w / mag)
        }
    }

    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Inverse; for a unit quaternion this equals the conjugate.
    pub fn inverse(&self) -> Self {
        let norm_sq = self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w;
        if norm_sq == 0.0 {
            return Self::identity();
        }
        let c = self.conjugate();
        Self::new(c.x / norm_sq, c.y / norm_sq, c.z / norm_sq, c.w / norm_sq)
    }

    /// Hamilton product `self * other` (apply `other` first, then `self`).
    pub fn mul(&self, other: &Self) -> Self {
        Self::new(
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        )
    }

    pub fn rotate_vector(&self, v: Vector3) -> Vector3 {
        let qv = Quaternion::new(v.x, v.y, v.z, 0.0);
        let r = self.mul(&qv).mul(&self.conjugate());
        Vector3::new(r.x, r.y, r.z)
    }

    /// Shortest-arc spherical linear interpolation.
    pub fn slerp(&self, other: &Self, t: f64) -> Self {
        let mut b = *other;
        let mut cos_half_theta = self.x * b.x + self.y * b.y + self.z * b.z + self.w * b.w;

        // Take the shortest arc.
        if cos_half_theta < 0.0 {
            b = Quaternion::new(-b.x, -b.y, -b.z, -b.w);
            cos_half_theta = -cos_half_theta;
        }

        if cos_half_theta > 0.9995 {
            return Quaternion::new(
                self.x + (b.x - self.x) * t,
                self.y + (b.y - self.y) * t,
                self.z + (b.z - self.z) * t,
                self.w + (b.w - self.w) * t,
            )
            .normalize();
        }

        let half_theta = cos_half_theta.acos();
        let sin_half_theta = (1.0 - cos_half_theta * cos_half_theta).sqrt();

        let ratio_a = ((1.0 - t) * half_theta).sin() / sin_half_theta;
        let ratio_b = (t * half_theta).sin() / sin_half_theta;

        Quaternion::new(
            self.x * ratio_a + b.x * ratio_b,
            self.y * ratio_a + b.y * ratio_b,
            self.z * ratio_a + b.z * ratio_b,
            self.w * ratio_a + b.w * ratio_b,
        )
    }

    /// Reconstruct a right-handed orientation whose rotated local +x and +z
    /// axes equal the given world-space basis vectors (+y is implied).
    /// Used by the Index config parser for the `head`/`imu` pose blocks.
    pub fn from_plus_x_plus_z(plus_x: Vector3, plus_z: Vector3) -> Self {
        let x_axis = plus_x.normalize();
        let z_axis = plus_z.normalize();
        let y_axis = z_axis.cross(&x_axis).normalize();
        // Re-orthogonalize z against x/y to guard against non-orthogonal input.
        let z_axis = x_axis.cross(&y_axis).normalize();

        // Build the quaternion from the 3x3 rotation matrix whose columns
        // are (x_axis, y_axis, z_axis), via the standard trace method.
        let m = [
            [x_axis.x, y_axis.x, z_axis.x],
            [x_axis.y, y_axis.y, z_axis.y],
            [x_axis.z, y_axis.z, z_axis.z],
        ];
        Quaternion::from_matrix(m)
    }

    pub fn from_matrix(m: [[f64; 3]; 3]) -> Self {
        let trace = m[0][0] + m[1][1] + m[2][2];
        if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Quaternion::new(
                (m[2][1] - m[1][2]) / s,
                (m[0][2] - m[2][0]) / s,
                (m[1][0] - m[0][1]) / s,
                0.25 * s,
            )
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Quaternion::new(
                0.25 * s,
                (m[0][1] + m[1][0]) / s,
                (m[0][2] + m[2][0]) / s,
                (m[2][1] - m[1][2]) / s,
            )
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Quaternion::new(
                (m[0][1] + m[1][0]) / s,
                0.25 * s,
                (m[1][2] + m[2][1]) / s,
                (m[0][2] - m[2][0]) / s,
            )
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Quaternion::new(
                (m[0][2] + m[2][0]) / s,
                (m[1][2] + m[2][1]) / s,
                0.25 * s,
                (m[1][0] - m[0][1]) / s,
            )
        }
        .normalize()
    }
}

/// A 6-DoF rigid transform: orientation applied about the origin, then
/// translated by `position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3,
    pub orientation: Quaternion,
}

impl Pose {
    pub const fn new(position: Vector3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub const fn identity() -> Self {
        Self::new(Vector3::zero(), Quaternion::identity())
    }

    pub fn inverse(&self) -> Self {
        let inv_rot = self.orientation.inverse();
        let inv_pos = inv_rot.rotate_vector(Vector3::new(
            -self.position.x,
            -self.position.y,
            -self.position.z,
        ));
        Self::new(inv_pos, inv_rot)
    }

    /// Compose `self` after `other`, i.e. `self ∘ other`.
    pub fn compose(&self, other: &Self) -> Self {
        let position = self.position + self.orientation.rotate_vector(other.position);
        let orientation = self.orientation.mul(&other.orientation);
        Self::new(position, orientation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_inverse_of_identity_is_identity() {
        let q = Quaternion::identity();
        let inv = q.inverse();
        assert!((inv.w - 1.0).abs() < 1e-9);
    }

    #[test]
    fn slerp_at_zero_and_one_returns_endpoints() {
        let a = Quaternion::identity();
        let b = Quaternion::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), 1.0);
        let at0 = a.slerp(&b, 0.0);
        let at1 = a.slerp(&b, 1.0);
        assert!((at0.w - a.w).abs() < 1e-6);
        assert!((at1.w - b.w).abs() < 1e-6);
    }

    #[test]
    fn pose_compose_with_identity_offset_is_identity() {
        let tracker = Pose::new(Vector3::new(1.0, 2.0, 3.0), Quaternion::identity());
        let identity = Pose::identity();
        let composed = identity.inverse().compose(&tracker);
        assert_eq!(composed.position, tracker.position);
    }

    #[test]
    fn rotate_vector_by_90_degrees_about_z() {
        let q = Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2);
        let v = Vector3::new(1.0, 0.0, 0.0);
        let r = q.rotate_vector(v);
        assert!((r.x).abs() < 1e-9);
        assert!((r.y - 1.0).abs() < 1e-9);
    }
}
