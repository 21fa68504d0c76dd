//! Card-space geometry
//!
//! All coordinates are f64 in "card space": y grows upward, positions are
//! bottom-left anchored, rotation is measured in degrees and turns an
//! object's top edge toward +x (clockwise on screen). Degrees are converted
//! to radians only when a matrix is built.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

/// A 2D point or vector in card space
///
/// Serializes as a `[x, y]` pair, the shape saved stacks use.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Serialize for Vec2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.x, self.y).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Vec2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (x, y) = <(f64, f64)>::deserialize(deserializer)?;
        Ok(Vec2::new(x, y))
    }
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Component-wise absolute value
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs())
    }

    /// True if both components are exactly zero
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Component-wise distance to another point
    pub fn abs_diff(self, other: Vec2) -> Vec2 {
        Self::new((self.x - other.x).abs(), (self.y - other.y).abs())
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

impl From<(f64, f64)> for Vec2 {
    fn from((x, y): (f64, f64)) -> Self {
        Vec2::new(x, y)
    }
}

/// Width/height pair, serialized as a `[width, height]` pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.width, self.height).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (width, height) = <(f64, f64)>::deserialize(deserializer)?;
        Ok(Size::new(width, height))
    }
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// The vector from a rect's origin to its center
    pub fn half(self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }
}

impl From<(f64, f64)> for Size {
    fn from((width, height): (f64, f64)) -> Self {
        Size::new(width, height)
    }
}

/// Axis-aligned rectangle, bottom-left anchored
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_origin_size(origin: Vec2, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn origin(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x <= self.max_x() && p.y >= self.y && p.y <= self.max_y()
    }

    /// Corners in counter-clockwise order: bottom-left, bottom-right,
    /// top-right, top-left
    pub fn corners(&self) -> [Vec2; 4] {
        [
            Vec2::new(self.x, self.y),
            Vec2::new(self.max_x(), self.y),
            Vec2::new(self.max_x(), self.max_y()),
            Vec2::new(self.x, self.max_y()),
        ]
    }

    /// Smallest axis-aligned rect covering all points
    pub fn bounding(points: &[Vec2]) -> Rect {
        if points.is_empty() {
            return Rect::default();
        }
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// 2D affine transform
///
/// Stored as `[a, b, c, d, tx, ty]`: `x' = a*x + c*y + tx`,
/// `y' = b*x + d*y + ty`. `a * b` applies `b` first, then `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    m: [f64; 6],
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        m: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    pub fn translate(v: Vec2) -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 1.0, v.x, v.y],
        }
    }

    /// Rotation by `deg` degrees, clockwise in y-up card space
    pub fn rotation_deg(deg: f64) -> Self {
        let (s, c) = (-deg.to_radians()).sin_cos();
        Self {
            m: [c, s, -s, c, 0.0, 0.0],
        }
    }

    /// The transform from an object's local frame into its parent's frame:
    /// rotate about the object's center, then place at `pos`
    pub fn local_to_parent(pos: Vec2, size: Size, rotation_deg: f64) -> Self {
        let c = size.half();
        if rotation_deg == 0.0 {
            return Affine::translate(pos);
        }
        Affine::translate(pos + c) * Affine::rotation_deg(rotation_deg) * Affine::translate(-c)
    }

    pub fn is_identity(&self) -> bool {
        *self == Affine::IDENTITY
    }

    pub fn apply(&self, p: Vec2) -> Vec2 {
        let [a, b, c, d, tx, ty] = self.m;
        Vec2::new(a * p.x + c * p.y + tx, b * p.x + d * p.y + ty)
    }

    /// Inverse transform; `None` if the matrix is singular
    pub fn invert(&self) -> Option<Affine> {
        let [a, b, c, d, tx, ty] = self.m;
        let det = a * d - b * c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            m: [
                d * inv,
                -b * inv,
                -c * inv,
                a * inv,
                (c * ty - d * tx) * inv,
                (b * tx - a * ty) * inv,
            ],
        })
    }

    pub fn transform_quad(&self, quad: [Vec2; 4]) -> [Vec2; 4] {
        quad.map(|p| self.apply(p))
    }
}

impl std::ops::Mul for Affine {
    type Output = Affine;

    fn mul(self, rhs: Affine) -> Affine {
        let [a1, b1, c1, d1, tx1, ty1] = self.m;
        let [a2, b2, c2, d2, tx2, ty2] = rhs.m;
        Affine {
            m: [
                a1 * a2 + c1 * b2,
                b1 * a2 + d1 * b2,
                a1 * c2 + c1 * d2,
                b1 * c2 + d1 * d2,
                a1 * tx2 + c1 * ty2 + tx1,
                b1 * tx2 + d1 * ty2 + ty1,
            ],
        }
    }
}

/// Projects a convex polygon onto an axis, returning (min, max)
fn project(points: &[Vec2], axis: Vec2) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for p in points {
        let d = p.x * axis.x + p.y * axis.y;
        min = min.min(d);
        max = max.max(d);
    }
    (min, max)
}

fn separating_axes(points: &[Vec2]) -> SmallVec<[Vec2; 4]> {
    let mut axes = SmallVec::new();
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        // Edge normal; length is irrelevant for projection overlap checks
        axes.push(Vec2::new(a.y - b.y, b.x - a.x));
    }
    axes
}

/// Separating-axis overlap test for two convex polygons
///
/// Touching boundaries count as overlapping.
pub fn convex_overlap(a: &[Vec2], b: &[Vec2]) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    for axis in separating_axes(a).iter().chain(separating_axes(b).iter()) {
        let (min_a, max_a) = project(a, *axis);
        let (min_b, max_b) = project(b, *axis);
        if max_a < min_b || max_b < min_a {
            return false;
        }
    }
    true
}

/// Point containment for a convex polygon with consistently wound corners
pub fn convex_contains(points: &[Vec2], p: Vec2) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
        if cross != 0.0 {
            if sign != 0.0 && cross.signum() != sign {
                return false;
            }
            sign = cross.signum();
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_rotation_turns_top_toward_plus_x() {
        let rot = Affine::rotation_deg(90.0);
        assert!(approx(rot.apply(Vec2::new(0.0, 1.0)), Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_affine_invert_round_trip() {
        for deg in [0.0, 45.0, 90.0, 180.0, 270.0, 33.3] {
            let aff = Affine::local_to_parent(Vec2::new(12.0, -7.5), Size::new(40.0, 20.0), deg);
            let inv = aff.invert().unwrap();
            let p = Vec2::new(3.25, 9.0);
            assert!(approx(inv.apply(aff.apply(p)), p), "deg {deg}");
        }
    }

    #[test]
    fn test_local_to_parent_rotates_about_center() {
        // A 10x10 object at (0,0) rotated 180 degrees keeps its center at (5,5)
        let aff = Affine::local_to_parent(Vec2::ZERO, Size::new(10.0, 10.0), 180.0);
        assert!(approx(aff.apply(Vec2::new(5.0, 5.0)), Vec2::new(5.0, 5.0)));
        // ...and its bottom-left corner lands at the old top-right
        assert!(approx(aff.apply(Vec2::ZERO), Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn test_convex_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0).corners();
        let b = Rect::new(5.0, 5.0, 10.0, 10.0).corners();
        let c = Rect::new(20.0, 0.0, 5.0, 5.0).corners();
        assert!(convex_overlap(&a, &b));
        assert!(!convex_overlap(&a, &c));
        // Rotated square overlapping the corner of an axis-aligned one
        let rot = Affine::local_to_parent(Vec2::new(8.0, 8.0), Size::new(6.0, 6.0), 45.0);
        let d = rot.transform_quad(Rect::new(0.0, 0.0, 6.0, 6.0).corners());
        assert!(convex_overlap(&a, &d));
    }

    #[test]
    fn test_convex_overlap_touching_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0).corners();
        let b = Rect::new(10.0, 0.0, 10.0, 10.0).corners();
        assert!(convex_overlap(&a, &b));
    }

    #[test]
    fn test_convex_contains() {
        let quad = Rect::new(0.0, 0.0, 10.0, 10.0).corners();
        assert!(convex_contains(&quad, Vec2::new(5.0, 5.0)));
        assert!(!convex_contains(&quad, Vec2::new(15.0, 5.0)));
    }

    #[test]
    fn test_bounding() {
        let pts = [
            Vec2::new(-1.0, 2.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(2.0, 7.0),
        ];
        let r = Rect::bounding(&pts);
        assert_eq!(r, Rect::new(-1.0, 0.0, 5.0, 7.0));
    }
}
