// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Design-space geometry: points, boxes, Manhattan transforms and the
//! transform stack used while descending through instance placements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DisplayError, Result};

/// Internal database units per micron.
pub const RESOLUTION: i32 = 1000;

/// Convert a real-world length in microns to internal units.
pub fn to_internal(microns: f64) -> i32 {
    (microns * RESOLUTION as f64).round() as i32
}

/// Convert internal units to microns.
pub fn to_microns(units: i32) -> f64 {
    units as f64 / RESOLUTION as f64
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned box in design coordinates, `left <= right`, `bottom <= top`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
    pub top: i32,
}

impl BBox {
    /// Creates a box from any two opposite corners.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            left: x1.min(x2),
            bottom: y1.min(y2),
            right: x1.max(x2),
            top: y1.max(y2),
        }
    }

    pub fn from_point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bb = Self::from_point(*first);
        for p in rest {
            bb.add_point(*p);
        }
        Some(bb)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.top - self.bottom
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn center(&self) -> Point {
        Point::new(
            ((self.left as i64 + self.right as i64) / 2) as i32,
            ((self.bottom as i64 + self.top as i64) / 2) as i32,
        )
    }

    pub fn lower_left(&self) -> Point {
        Point::new(self.left, self.bottom)
    }

    pub fn upper_right(&self) -> Point {
        Point::new(self.right, self.top)
    }

    /// Grow to include `other`.
    pub fn add(&mut self, other: &BBox) {
        self.left = self.left.min(other.left);
        self.bottom = self.bottom.min(other.bottom);
        self.right = self.right.max(other.right);
        self.top = self.top.max(other.top);
    }

    pub fn add_point(&mut self, p: Point) {
        self.add(&BBox::from_point(p));
    }

    pub fn union(&self, other: &BBox) -> BBox {
        let mut bb = *self;
        bb.add(other);
        bb
    }

    /// Overlap test. With `touching` set, shared edges count as overlap.
    pub fn intersects(&self, other: &BBox, touching: bool) -> bool {
        if touching {
            self.left <= other.right
                && other.left <= self.right
                && self.bottom <= other.top
                && other.bottom <= self.top
        } else {
            self.left < other.right
                && other.left < self.right
                && self.bottom < other.top
                && other.bottom < self.top
        }
    }

    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        if !self.intersects(other, true) {
            return None;
        }
        Some(BBox {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        })
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.bottom && p.y <= self.top
    }

    pub fn contains(&self, other: &BBox) -> bool {
        other.left >= self.left
            && other.right <= self.right
            && other.bottom >= self.bottom
            && other.top <= self.top
    }

    pub fn bloat(&self, delta: i32) -> BBox {
        BBox::new(
            self.left - delta,
            self.bottom - delta,
            self.right + delta,
            self.top + delta,
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> BBox {
        BBox {
            left: self.left + dx,
            bottom: self.bottom + dy,
            right: self.right + dx,
            top: self.top + dy,
        }
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.left, self.bottom, self.right, self.top
        )
    }
}

/// The eight Manhattan orientations. `MX` reflects across the x axis
/// (y negated) and the `MX90`/`MY90` variants apply that reflection before
/// the rotation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orient {
    #[default]
    R0,
    R90,
    R180,
    R270,
    MX,
    MX90,
    MY,
    MY90,
}

type Matrix = [[i8; 2]; 2];

fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
    [
        [
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
        ],
        [
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        ],
    ]
}

impl Orient {
    pub const ALL: [Orient; 8] = [
        Orient::R0,
        Orient::R90,
        Orient::R180,
        Orient::R270,
        Orient::MX,
        Orient::MX90,
        Orient::MY,
        Orient::MY90,
    ];

    fn matrix(self) -> Matrix {
        match self {
            Orient::R0 => [[1, 0], [0, 1]],
            Orient::R90 => [[0, -1], [1, 0]],
            Orient::R180 => [[-1, 0], [0, -1]],
            Orient::R270 => [[0, 1], [-1, 0]],
            // rotation applied after y -> -y
            Orient::MX => [[1, 0], [0, -1]],
            Orient::MX90 => [[0, 1], [1, 0]],
            Orient::MY => [[-1, 0], [0, 1]],
            Orient::MY90 => [[0, -1], [-1, 0]],
        }
    }

    fn from_matrix(m: &Matrix) -> Orient {
        Orient::ALL
            .into_iter()
            .find(|o| o.matrix() == *m)
            .unwrap_or_default()
    }

    /// True when the orientation swaps the x and y extents.
    pub fn is_rotated90(self) -> bool {
        matches!(
            self,
            Orient::R90 | Orient::R270 | Orient::MX90 | Orient::MY90
        )
    }

    pub fn is_mirrored(self) -> bool {
        matches!(self, Orient::MX | Orient::MX90 | Orient::MY | Orient::MY90)
    }
}

impl FromStr for Orient {
    type Err = DisplayError;

    /// Accepts DEF style names (`N`, `FS`, ...) and the internal names.
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "N" | "R0" => Orient::R0,
            "W" | "R90" => Orient::R90,
            "S" | "R180" => Orient::R180,
            "E" | "R270" => Orient::R270,
            "FS" | "MX" => Orient::MX,
            "FW" | "MX90" => Orient::MX90,
            "FN" | "MY" => Orient::MY,
            "FE" | "MY90" => Orient::MY90,
            _ => return Err(DisplayError::parse("orientation", s)),
        })
    }
}

/// Placement transform: orientation, uniform magnification, then translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub orient: Orient,
    pub mag: f64,
    pub tx: i32,
    pub ty: i32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            orient: Orient::R0,
            mag: 1.0,
            tx: 0,
            ty: 0,
        }
    }

    pub fn translate(tx: i32, ty: i32) -> Self {
        Self {
            tx,
            ty,
            ..Self::identity()
        }
    }

    pub fn new(orient: Orient, mag: f64, tx: i32, ty: i32) -> Self {
        Self { orient, mag, tx, ty }
    }

    pub fn is_identity(&self) -> bool {
        self.orient == Orient::R0 && self.mag == 1.0 && self.tx == 0 && self.ty == 0
    }

    fn linear(&self, x: i64, y: i64) -> (i64, i64) {
        let m = self.orient.matrix();
        let xr = m[0][0] as i64 * x + m[0][1] as i64 * y;
        let yr = m[1][0] as i64 * x + m[1][1] as i64 * y;
        if self.mag == 1.0 {
            (xr, yr)
        } else {
            (
                (xr as f64 * self.mag).round() as i64,
                (yr as f64 * self.mag).round() as i64,
            )
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        let (x, y) = self.linear(p.x as i64, p.y as i64);
        Point::new((x + self.tx as i64) as i32, (y + self.ty as i64) as i32)
    }

    /// Manhattan transforms map boxes to boxes, so the two defining
    /// corners are enough.
    pub fn apply_bbox(&self, bb: &BBox) -> BBox {
        let p0 = self.apply(bb.lower_left());
        let p1 = self.apply(bb.upper_right());
        BBox::new(p0.x, p0.y, p1.x, p1.y)
    }

    /// Transform applying `inner` first, then `self`.
    pub fn compose(&self, inner: &Transform) -> Transform {
        let m = matmul(&self.orient.matrix(), &inner.orient.matrix());
        let t = self.apply(Point::new(inner.tx, inner.ty));
        Transform {
            orient: Orient::from_matrix(&m),
            mag: self.mag * inner.mag,
            tx: t.x,
            ty: t.y,
        }
    }

    pub fn inverse(&self) -> Transform {
        let m = self.orient.matrix();
        let mt = [[m[0][0], m[1][0]], [m[0][1], m[1][1]]];
        let inv = Transform {
            orient: Orient::from_matrix(&mt),
            mag: if self.mag != 0.0 { 1.0 / self.mag } else { 1.0 },
            tx: 0,
            ty: 0,
        };
        let t = inv.apply(Point::new(-self.tx, -self.ty));
        Transform {
            tx: t.x,
            ty: t.y,
            ..inv
        }
    }
}

/// Stack of accumulated transforms, one entry per hierarchy level.
#[derive(Debug, Clone)]
pub struct TransformStack {
    stack: Vec<Transform>,
    max_depth: usize,
}

impl TransformStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::with_capacity(max_depth.min(64)),
            max_depth,
        }
    }

    pub fn with_base(base: Transform, max_depth: usize) -> Self {
        let mut stack = Self::new(max_depth);
        stack.stack.push(base);
        stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current(&self) -> Transform {
        self.stack.last().copied().unwrap_or_default()
    }

    /// Push `local`, composed with the current transform.
    pub fn push(&mut self, local: &Transform) -> Result<()> {
        if self.stack.len() >= self.max_depth {
            return Err(DisplayError::DepthOverflow(self.stack.len()));
        }
        let composed = self.current().compose(local);
        self.stack.push(composed);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Transform> {
        self.stack.pop()
    }

    /// Run `f` with `local` pushed; the entry is popped when `f` returns.
    pub fn with_pushed<R>(&mut self, local: &Transform, f: impl FnOnce(&mut Self) -> R) -> Result<R> {
        self.push(local)?;
        let ret = f(self);
        self.pop();
        Ok(ret)
    }

    pub fn apply(&self, p: Point) -> Point {
        self.current().apply(p)
    }

    pub fn apply_bbox(&self, bb: &BBox) -> BBox {
        self.current().apply_bbox(bb)
    }
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new(40)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orient_parse() {
        assert_eq!("N".parse::<Orient>().unwrap(), Orient::R0);
        assert_eq!("FS".parse::<Orient>().unwrap(), Orient::MX);
        assert_eq!("FN".parse::<Orient>().unwrap(), Orient::MY);
        assert!("Q".parse::<Orient>().is_err());
    }

    #[test]
    fn test_rotation_and_mirror() {
        let p = Point::new(10, 5);
        assert_eq!(Transform::new(Orient::R90, 1.0, 0, 0).apply(p), Point::new(-5, 10));
        assert_eq!(Transform::new(Orient::MX, 1.0, 0, 0).apply(p), Point::new(10, -5));
        assert_eq!(Transform::new(Orient::MY, 1.0, 0, 0).apply(p), Point::new(-10, 5));
    }

    #[test]
    fn test_compose_and_inverse() {
        let a = Transform::new(Orient::R90, 1.0, 100, 0);
        let b = Transform::new(Orient::MX, 2.0, 5, 7);
        let p = Point::new(3, 4);
        let ab = a.compose(&b);
        assert_eq!(ab.apply(p), a.apply(b.apply(p)));

        for o in Orient::ALL {
            let t = Transform::new(o, 1.0, 17, -23);
            let inv = t.inverse();
            assert_eq!(inv.apply(t.apply(p)), p, "orientation {o:?}");
        }
    }

    #[test]
    fn test_bbox_transform_keeps_order() {
        let bb = BBox::new(0, 0, 10, 20);
        let t = Transform::new(Orient::R270, 1.0, 0, 0);
        let out = t.apply_bbox(&bb);
        assert_eq!(out, BBox::new(0, 0, 20, -10));
        assert!(out.left <= out.right && out.bottom <= out.top);
    }

    #[test]
    fn test_stack_depth_limit() {
        let mut stack = TransformStack::new(2);
        let t = Transform::translate(1, 1);
        stack.push(&t).unwrap();
        stack.push(&t).unwrap();
        assert!(matches!(stack.push(&t), Err(DisplayError::DepthOverflow(2))));
        assert_eq!(stack.apply(Point::new(0, 0)), Point::new(2, 2));
    }

    #[test]
    fn test_with_pushed_pops() {
        let mut stack = TransformStack::new(8);
        let p = stack
            .with_pushed(&Transform::translate(5, 0), |s| s.apply(Point::new(1, 1)))
            .unwrap();
        assert_eq!(p, Point::new(6, 1));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(10, 5, 20, 20);
        assert!(a.intersects(&b, true));
        assert!(!a.intersects(&b, false));
        assert_eq!(a.intersection(&b), Some(BBox::new(10, 5, 10, 10)));
    }
}
