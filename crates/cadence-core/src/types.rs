//! Spatial types shared by the scene graph and the simulation subsystems

use serde::{Deserialize, Serialize};

/// Column-major 4x4 matrix: `m[col][row]`
pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY_MAT4: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// A 3D vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const ONE: Self = Self {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };
    pub const UP: Self = Self {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Local-space transform: position, quaternion rotation (xyzw) and scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: [f32; 4],
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: [f32; 4]) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Convert to a column-major 4x4 matrix (T * R * S)
    pub fn to_matrix(&self) -> Mat4 {
        let [qx, qy, qz, qw] = self.rotation;
        let x2 = qx + qx;
        let y2 = qy + qy;
        let z2 = qz + qz;
        let xx = qx * x2;
        let xy = qx * y2;
        let xz = qx * z2;
        let yy = qy * y2;
        let yz = qy * z2;
        let zz = qz * z2;
        let wx = qw * x2;
        let wy = qw * y2;
        let wz = qw * z2;
        let Vec3 { x: sx, y: sy, z: sz } = self.scale;
        let Vec3 { x: tx, y: ty, z: tz } = self.position;

        [
            [(1.0 - (yy + zz)) * sx, (xy + wz) * sx, (xz - wy) * sx, 0.0],
            [(xy - wz) * sy, (1.0 - (xx + zz)) * sy, (yz + wx) * sy, 0.0],
            [(xz + wy) * sz, (yz - wx) * sz, (1.0 - (xx + yy)) * sz, 0.0],
            [tx, ty, tz, 1.0],
        ]
    }
}

/// Multiply two 4x4 column-major matrices
pub fn mat4_mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut result = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                result[i][j] += a[k][j] * b[i][k];
            }
        }
    }
    result
}

/// Translation column of a column-major matrix
pub fn mat4_translation(m: &Mat4) -> Vec3 {
    Vec3::new(m[3][0], m[3][1], m[3][2])
}

/// Element-wise comparison with tolerance
pub fn mat4_approx_eq(a: &Mat4, b: &Mat4, epsilon: f32) -> bool {
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .all(|(x, y)| (x - y).abs() <= epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform_matrix() {
        let m = Transform::IDENTITY.to_matrix();
        assert!(mat4_approx_eq(&m, &IDENTITY_MAT4, 1e-6));
    }

    #[test]
    fn test_translation_composes_through_parent() {
        let parent = Transform::from_position(Vec3::new(1.0, 0.0, 0.0)).to_matrix();
        let child = Transform::from_position(Vec3::new(0.0, 2.0, 0.0)).to_matrix();
        let world = mat4_mul(&parent, &child);
        assert_eq!(mat4_translation(&world), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_rotation_about_y() {
        // 90 degrees about +Y maps +X onto -Z
        let half = std::f32::consts::FRAC_PI_4;
        let t = Transform::IDENTITY.with_rotation([0.0, half.sin(), 0.0, half.cos()]);
        let m = t.to_matrix();
        assert!((m[0][0]).abs() < 1e-6);
        assert!((m[0][2] + 1.0).abs() < 1e-6);
    }
}
