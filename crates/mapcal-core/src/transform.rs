use std::fmt;

use nalgebra::{Matrix2, Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Rejections when building an [`AffineTransform`] from a raw matrix.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("bottom row must be [0, 0, 1], got {0:?}")]
    NotAffine([f64; 3]),
    #[error("matrix contains non-finite entries")]
    NonFinite,
}

/// Homogeneous 2-D affine transform.
///
/// Stored as a 3×3 matrix `[A t; 0 0 1]` where `A` is the 2×2 linear part and
/// `t` the translation. The bottom row is always exactly `[0, 0, 1]`.
///
/// Serializes as a row-major `[[f64; 3]; 3]` array.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "[[f64; 3]; 3]", try_from = "[[f64; 3]; 3]")]
pub struct AffineTransform {
    m: Matrix3<f64>,
}

impl AffineTransform {
    /// Build from a linear part and a translation.
    pub fn new(linear: Matrix2<f64>, translation: Vector2<f64>) -> Self {
        Self {
            m: Matrix3::new(
                linear[(0, 0)],
                linear[(0, 1)],
                translation.x,
                linear[(1, 0)],
                linear[(1, 1)],
                translation.y,
                0.0,
                0.0,
                1.0,
            ),
        }
    }

    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    /// Validate a homogeneous matrix as an affine transform.
    pub fn from_matrix(m: Matrix3<f64>) -> Result<Self, TransformError> {
        if !m.iter().all(|v| v.is_finite()) {
            return Err(TransformError::NonFinite);
        }
        let bottom = [m[(2, 0)], m[(2, 1)], m[(2, 2)]];
        if bottom != [0.0, 0.0, 1.0] {
            return Err(TransformError::NotAffine(bottom));
        }
        Ok(Self { m })
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Result<Self, TransformError> {
        Self::from_matrix(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.m[(0, 0)], self.m[(0, 1)], self.m[(0, 2)]],
            [self.m[(1, 0)], self.m[(1, 1)], self.m[(1, 2)]],
            [self.m[(2, 0)], self.m[(2, 1)], self.m[(2, 2)]],
        ]
    }

    /// The full homogeneous matrix.
    #[inline]
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    #[inline]
    pub fn linear(&self) -> Matrix2<f64> {
        self.m.fixed_view::<2, 2>(0, 0).into_owned()
    }

    #[inline]
    pub fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.m[(0, 2)], self.m[(1, 2)])
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.m * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0], v[1])
    }

    /// Inverse transform, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let linear_inv = self.linear().try_inverse()?;
        let t = -(linear_inv * self.translation());
        Some(Self::new(linear_inv, t))
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &AffineTransform) -> Self {
        Self::new(
            self.linear() * other.linear(),
            self.linear() * other.translation() + self.translation(),
        )
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<AffineTransform> for [[f64; 3]; 3] {
    fn from(t: AffineTransform) -> Self {
        t.to_array()
    }
}

impl TryFrom<[[f64; 3]; 3]> for AffineTransform {
    type Error = TransformError;

    fn try_from(rows: [[f64; 3]; 3]) -> Result<Self, Self::Error> {
        Self::from_array(rows)
    }
}

impl fmt::Display for AffineTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.to_array();
        write!(f, "[")?;
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                write!(f, ",\n ")?;
            }
            write!(f, "[{:?}, {:?}, {:?}]", row[0], row[1], row[2])?;
        }
        write!(f, "]")
    }
}
