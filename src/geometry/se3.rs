//! SE3: 6-DOF rigid body transformation (rotation + translation).
//!
//! Poses follow the `T_target_source` convention: a frame pose `T_ws`
//! (world-from-sensor) maps sensor coordinates into the world frame, and its
//! inverse is the extrinsic the volumetric engine integrates with.

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};

/// Rigid transformation: p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Construct from rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz)),
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix [R | t; 0 | 1].
    ///
    /// The rotation block is re-orthonormalized through the quaternion.
    pub fn from_matrix(mat: &Matrix4<f64>) -> Self {
        let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(r, t)
    }

    /// Convert to a homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        mat[(0, 3)] = self.translation.x;
        mat[(1, 3)] = self.translation.y;
        mat[(2, 3)] = self.translation.z;
        mat
    }

    /// Inverse transformation: [R^T | -R^T * t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    ///
    /// `T_ab.compose(&T_bc) == T_ac`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a single point: p' = R * p + t.
    #[inline]
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Rotate a direction without translating it.
    #[inline]
    pub fn transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// Rotation as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Translation distance and rotation angle (radians) between two poses.
    pub fn distance_to(&self, other: &SE3) -> (f64, f64) {
        let delta = self.inverse().compose(other);
        (delta.translation.norm(), delta.rotation.angle())
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quarter_turn_z() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_axis_angle(
                &nalgebra::Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0)),
                std::f64::consts::FRAC_PI_2,
            ),
            translation: Vector3::new(1.0, 2.0, 3.0),
        }
    }

    #[test]
    fn test_identity() {
        let pose = SE3::identity();
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(pose.transform_point(&p), p, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse() {
        let pose = quarter_turn_z();
        let composed = pose.compose(&pose.inverse());

        assert_relative_eq!(composed.translation.norm(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(composed.rotation.angle(), 0.0, epsilon = 1e-10);

        let p = Vector3::new(-1.0, 0.5, 4.0);
        let back = pose.inverse().transform_point(&pose.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-10);
    }

    #[test]
    fn test_compose_order() {
        let t_ab = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let t_bc = quarter_turn_z();
        let t_ac = t_ab.compose(&t_bc);

        let p = Vector3::new(1.0, 0.0, 0.0);
        let expected = t_ab.transform_point(&t_bc.transform_point(&p));
        assert_relative_eq!(t_ac.transform_point(&p), expected, epsilon = 1e-10);
    }

    #[test]
    fn test_to_from_matrix() {
        let pose = quarter_turn_z();
        let back = SE3::from_matrix(&pose.to_matrix());

        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-10);
        assert_relative_eq!(
            back.rotation.angle_to(&pose.rotation),
            0.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_distance_to() {
        let a = SE3::identity();
        let b = SE3::from_translation(Vector3::new(3.0, 4.0, 0.0));
        let (dist, angle) = a.distance_to(&b);
        assert_relative_eq!(dist, 5.0, epsilon = 1e-12);
        assert_relative_eq!(angle, 0.0, epsilon = 1e-12);
    }
}
