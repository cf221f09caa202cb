use std::ops::{Add, Mul, Neg, Sub};

use serde::Serialize;

// ─────────────────────────────────────────────────────────────────────────────
// Vec3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// Unit vector along the Y (height) axis.
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    #[must_use]
    pub const fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub const fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len.is_finite() && len > 0.0 {
            Some(Self::new(self.x / len, self.y / len, self.z / len))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn div_scalar(self, s: f64) -> Self {
        Self::new(self.x / s, self.y / s, self.z / s)
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(arr: [f64; 3]) -> Self {
        Self::from_array(arr)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GroundPoint
// ─────────────────────────────────────────────────────────────────────────────

/// A single ground sample.
///
/// `x` and `z` span the triangulation plane, `y` is carried along as height.
/// `original_index` is the position of the sample in the caller's buffer and
/// survives every stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub original_index: usize,
}

impl GroundPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, original_index: usize) -> Self {
        Self {
            x,
            y,
            z,
            original_index,
        }
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[must_use]
    pub const fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// True when every coordinate is neither NaN nor infinite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Spatial-hash cell of the planar (x, z) projection.
    ///
    /// The key is the bit pattern of `floor(c / eps)`, so it never saturates
    /// the way an integer cast does at large magnitudes. Returns `None` for
    /// non-finite coordinates, which never share a cell.
    #[must_use]
    pub fn planar_cell(&self, eps: f64) -> Option<(u64, u64)> {
        if !self.x.is_finite() || !self.z.is_finite() {
            return None;
        }
        Some((cell_key(self.x, eps), cell_key(self.z, eps)))
    }
}

#[inline]
fn cell_key(c: f64, eps: f64) -> u64 {
    // `+ 0.0` folds -0.0 into 0.0.
    ((c / eps).floor() + 0.0).to_bits()
}

// ─────────────────────────────────────────────────────────────────────────────
// GroundBounds
// ─────────────────────────────────────────────────────────────────────────────

/// Axis-aligned bounds of the planar (x, z) projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
    pub width: f64,
    pub height: f64,
}

impl GroundBounds {
    #[must_use]
    pub fn new(min_x: f64, max_x: f64, min_z: f64, max_z: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_z,
            max_z,
            width: max_x - min_x,
            height: max_z - min_z,
        }
    }

    /// Bounds of all finite points. `None` when no finite point exists.
    #[must_use]
    pub fn from_points(points: &[GroundPoint]) -> Option<Self> {
        let mut iter = points
            .iter()
            .filter(|p| p.x.is_finite() && p.z.is_finite());
        let first = iter.next()?;
        let (mut min_x, mut max_x) = (first.x, first.x);
        let (mut min_z, mut max_z) = (first.z, first.z);
        for p in iter {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_z = min_z.min(p.z);
            max_z = max_z.max(p.z);
        }
        Some(Self::new(min_x, max_x, min_z, max_z))
    }

    #[must_use]
    pub fn max_spread(&self) -> f64 {
        self.width.max(self.height)
    }

    #[must_use]
    pub fn min_spread(&self) -> f64 {
        self.width.min(self.height)
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// `min_spread / max_spread`, or 1 for a zero-size box.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        let max = self.max_spread();
        if max > 0.0 { self.min_spread() / max } else { 1.0 }
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) * 0.5,
            (self.min_z + self.max_z) * 0.5,
        )
    }

    /// The four planar corners, counter-clockwise from `(min_x, min_z)`.
    #[must_use]
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.min_z),
            (self.max_x, self.min_z),
            (self.max_x, self.max_z),
            (self.min_x, self.max_z),
        ]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tolerance
// ─────────────────────────────────────────────────────────────────────────────

/// Tolerance configuration for the ground pipeline.
///
/// Use the named constants for specific use cases to avoid epsilon scatter:
/// - `Tolerance::DEDUP` - Spatial-hash cell size and exact collinearity (1e-6)
/// - `Tolerance::MIN_AREA` - Minimum bounding-box area (1e-6)
/// - `Tolerance::MIN_ASPECT` - Minimum bounding-box aspect ratio (1e-3)
/// - `Tolerance::SNAP` - Normalized coordinates snapped to zero (1e-10)
/// - `Tolerance::FACE_NORMAL` - Minimum raw face normal length (1e-4)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub eps: f64,
}

impl Tolerance {
    pub const DEDUP: Self = Self { eps: 1e-6 };

    pub const MIN_AREA: Self = Self { eps: 1e-6 };

    pub const MIN_ASPECT: Self = Self { eps: 1e-3 };

    pub const SNAP: Self = Self { eps: 1e-10 };

    pub const FACE_NORMAL: Self = Self { eps: 1e-4 };

    /// Relative offset used to break exact collinearity and to size jitter (1e-4).
    pub const PERTURBATION: Self = Self { eps: 1e-4 };

    #[must_use]
    pub const fn new(eps: f64) -> Self {
        Self { eps }
    }

    #[must_use]
    pub fn relative_to(self, span: f64) -> f64 {
        self.eps * span.abs()
    }

    #[must_use]
    pub fn approx_eq_f64(self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.eps
    }

    #[must_use]
    pub fn approx_zero_f64(self, a: f64) -> bool {
        a.abs() <= self.eps
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEDUP
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
