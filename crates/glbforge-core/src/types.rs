//! Geometry primitives used across glbforge
//!
//! Plain value types: vectors, quaternions, 4x4 matrices, TRS transforms and
//! bounding boxes. Matrices are column-major (`m[column][row]`), matching the
//! glTF memory layout.

use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// 2D vector (UV coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl Default for Vec2 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[f32; 2]> for Vec2 {
    fn from(v: [f32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

/// 3D vector (position, normal, scale)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                y: self.y / len,
                z: self.z / len,
            }
        } else {
            Self::ZERO
        }
    }

    /// Component-wise product
    pub fn mul_elements(&self, other: Vec3) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    pub fn min(&self, other: Vec3) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(&self, other: Vec3) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Rotation quaternion, stored `x, y, z, w` like glTF
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn normalize(&self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
        } else {
            Self::IDENTITY
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f32; 4]> for Quat {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// 4x4 transformation matrix, column-major
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat4 {
    pub m: [[f32; 4]; 4],
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Create a matrix from 16 column-major values
    pub fn from_cols_array(data: &[f32; 16]) -> Self {
        Self {
            m: [
                [data[0], data[1], data[2], data[3]],
                [data[4], data[5], data[6], data[7]],
                [data[8], data[9], data[10], data[11]],
                [data[12], data[13], data[14], data[15]],
            ],
        }
    }

    /// Flatten to 16 column-major values
    pub fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        for (col, column) in self.m.iter().enumerate() {
            out[col * 4..col * 4 + 4].copy_from_slice(column);
        }
        out
    }

    pub fn from_translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.m[3][0] = t.x;
        m.m[3][1] = t.y;
        m.m[3][2] = t.z;
        m
    }

    pub fn from_scale(s: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.m[0][0] = s.x;
        m.m[1][1] = s.y;
        m.m[2][2] = s.z;
        m
    }

    pub fn from_quat(q: Quat) -> Self {
        let Quat { x, y, z, w } = q.normalize();
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);

        Self {
            m: [
                [1.0 - 2.0 * (yy + zz), 2.0 * (xy + wz), 2.0 * (xz - wy), 0.0],
                [2.0 * (xy - wz), 1.0 - 2.0 * (xx + zz), 2.0 * (yz + wx), 0.0],
                [2.0 * (xz + wy), 2.0 * (yz - wx), 1.0 - 2.0 * (xx + yy), 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Compose `T * R * S`
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self::from_translation(translation) * Self::from_quat(rotation) * Self::from_scale(scale)
    }

    /// Get translation component
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[3][0], self.m[3][1], self.m[3][2])
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// General inverse by Gauss-Jordan elimination, `None` if singular
    pub fn inverse(&self) -> Option<Mat4> {
        // Work on rows of the augmented matrix [A | I]
        let mut a = [[0.0f32; 8]; 4];
        for (row, aug) in a.iter_mut().enumerate() {
            for col in 0..4 {
                aug[col] = self.m[col][row];
            }
            aug[4 + row] = 1.0;
        }

        for col in 0..4 {
            let pivot = (col..4)
                .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
            if a[pivot][col].abs() < 1e-8 {
                return None;
            }
            a.swap(col, pivot);

            let p = a[col][col];
            for v in a[col].iter_mut() {
                *v /= p;
            }
            for row in 0..4 {
                if row != col {
                    let f = a[row][col];
                    if f != 0.0 {
                        let pivot_row = a[col];
                        for (v, p) in a[row].iter_mut().zip(pivot_row.iter()) {
                            *v -= f * p;
                        }
                    }
                }
            }
        }

        let mut out = Mat4::IDENTITY;
        for (row, aug) in a.iter().enumerate() {
            for col in 0..4 {
                out.m[col][row] = aug[4 + col];
            }
        }
        Some(out)
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        let mut out = [[0.0f32; 4]; 4];
        for (col, out_col) in out.iter_mut().enumerate() {
            for (row, value) in out_col.iter_mut().enumerate() {
                *value = (0..4).map(|k| self.m[k][row] * rhs.m[col][k]).sum();
            }
        }
        Mat4 { m: out }
    }
}

/// Local transform: translation, rotation, scale and an optional full matrix
///
/// When `matrix` is present it is authoritative and the TRS fields are ignored
/// on export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Mat4>,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
        matrix: None,
    };

    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
            matrix: None,
        }
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        Self {
            matrix: Some(matrix),
            ..Self::IDENTITY
        }
    }

    pub fn is_identity(&self) -> bool {
        match self.matrix {
            Some(m) => m.is_identity(),
            None => {
                self.translation == Vec3::ZERO
                    && self.rotation == Quat::IDENTITY
                    && self.scale == Vec3::ONE
            }
        }
    }

    /// The transform as a single matrix
    pub fn to_matrix(&self) -> Mat4 {
        self.matrix
            .unwrap_or_else(|| Mat4::from_trs(self.translation, self.rotation, self.scale))
    }

    /// Return a copy with `factor` applied on top of the existing scale
    pub fn scaled(&self, factor: Vec3) -> Self {
        Self {
            translation: self.translation,
            rotation: self.rotation,
            scale: self.scale.mul_elements(factor),
            matrix: self.matrix.map(|m| m * Mat4::from_scale(factor)),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// An inverted box that any point expands
    pub const EMPTY: Self = Self {
        min: Vec3 { x: f32::MAX, y: f32::MAX, z: f32::MAX },
        max: Vec3 { x: f32::MIN, y: f32::MIN, z: f32::MIN },
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut bbox = Self::EMPTY;
        for p in points {
            bbox.expand(*p);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    pub fn size(&self) -> Vec3 {
        Vec3::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Mat4, b: Mat4) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array().iter())
            .all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_cols_array_roundtrip_layout() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let flat = m.to_cols_array();
        assert_eq!(&flat[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(Mat4::from_cols_array(&flat), m);
    }

    #[test]
    fn test_matrix_multiply_order() {
        let t = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let s = Mat4::from_scale(Vec3::splat(2.0));

        // Scale first, then translate: translation is not scaled
        assert_eq!((t * s).translation(), Vec3::new(5.0, 0.0, 0.0));
        // Translate first, then scale: translation is scaled
        assert_eq!((s * t).translation(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_identity_quat_to_matrix() {
        assert!(approx(Mat4::from_quat(Quat::IDENTITY), Mat4::IDENTITY));
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let m = Mat4::from_quat(Quat::new(0.0, 0.0, half, half));
        // X axis maps onto Y
        assert!((m.m[0][0]).abs() < 1e-5);
        assert!((m.m[0][1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_inverse_of_trs() {
        let m = Mat4::from_trs(
            Vec3::new(1.0, -2.0, 3.0),
            Quat::new(0.0, 0.0, std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2),
            Vec3::splat(2.0),
        );
        let inv = m.inverse().unwrap();
        assert!(approx(m * inv, Mat4::IDENTITY));
        assert!(Mat4::from_scale(Vec3::ZERO).inverse().is_none());
    }

    #[test]
    fn test_transform_scaled() {
        let t = Transform::from_trs(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0));
        let scaled = t.scaled(Vec3::new(0.5, 1.0, 3.0));
        assert_eq!(scaled.scale, Vec3::new(1.0, 2.0, 6.0));
        assert_eq!(scaled.translation, t.translation);

        let m = Transform::from_matrix(Mat4::IDENTITY).scaled(Vec3::splat(4.0));
        assert_eq!(m.matrix.unwrap().m[1][1], 4.0);
    }

    #[test]
    fn test_bounding_box_expand() {
        let points = [Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, -2.0, -3.0)];
        let bbox = BoundingBox::from_points(&points);

        assert_eq!(bbox.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(bbox.max, Vec3::new(1.0, 2.0, 3.0));
        assert!(BoundingBox::EMPTY.is_empty());
        assert!(!bbox.is_empty());
    }
}
