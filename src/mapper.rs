// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Mapping between window (design) coordinates and viewport pixels.
//!
//! The mapping is uniform: `ratio` is viewport pixels per design unit in
//! both directions. Pixel y grows downward from the window top, so
//! `yp = (top - y) * ratio`. Only cross-section views override the y
//! scale.

use crate::backend::{PixPoint, PixRect};
use crate::geom::{BBox, Point};

/// Mapped coordinates are clamped to this many pixels either side of
/// the viewport origin, leaving headroom for pixel arithmetic.
pub const PIXEL_LIMIT: i32 = 1 << 24;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordMap {
    window: BBox,
    width: i32,
    height: i32,
    ratio: f64,
    yscale: f64,
    clip: PixRect,
}

impl CoordMap {
    /// Map `window` into a `width` x `height` viewport. The window is
    /// widened or heightened about its center to match the viewport aspect.
    pub fn new(width: i32, height: i32, window: BBox) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut map = Self {
            window,
            width,
            height,
            ratio: 1.0,
            yscale: 1.0,
            clip: PixRect::from_size(width, height),
        };
        map.set_window(window);
        map
    }

    pub fn window(&self) -> BBox {
        self.window
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn viewport(&self) -> PixRect {
        PixRect::from_size(self.width, self.height)
    }

    pub fn clip(&self) -> PixRect {
        self.clip
    }

    pub fn set_clip(&mut self, clip: PixRect) {
        self.clip = clip.intersection(&self.viewport()).unwrap_or(clip);
    }

    pub fn reset_clip(&mut self) {
        self.clip = self.viewport();
    }

    /// Cross-section views stretch y independently.
    pub fn set_yscale(&mut self, yscale: f64) {
        self.yscale = if yscale > 0.0 { yscale } else { 1.0 };
    }

    pub fn yscale(&self) -> f64 {
        self.yscale
    }

    /// Show `area` at `viewport width / area width`. The window height
    /// follows from the viewport aspect, centered on `area`.
    pub fn set_window(&mut self, area: BBox) {
        self.ratio = self.width as f64 / area.width().max(1) as f64;
        self.recenter(area.center());
    }

    /// Like `set_window`, but picks the ratio so that all of `area` is
    /// visible.
    pub fn fit_window(&mut self, area: BBox) {
        let aw = area.width().max(1) as f64;
        let ah = area.height().max(1) as f64;
        self.ratio = (self.width as f64 / aw).min(self.height as f64 / (ah * self.yscale));
        self.recenter(area.center());
    }

    /// Keep the ratio and place `center` in the middle of the viewport.
    pub fn recenter(&mut self, center: Point) {
        let w = (self.width as f64 / self.ratio).round() as i32;
        let h = (self.height as f64 / (self.ratio * self.yscale)).round() as i32;
        let left = center.x - w / 2;
        let bottom = center.y - h / 2;
        self.window = BBox::new(left, bottom, left + w, bottom + h);
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        if ratio > 0.0 && ratio.is_finite() {
            let c = self.window.center();
            self.ratio = ratio;
            self.recenter(c);
        }
    }

    /// Zoom about the window center, `factor > 1` zooms in.
    pub fn zoom(&mut self, factor: f64) {
        self.set_ratio(self.ratio * factor);
    }

    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.window = self.window.translate(dx, dy);
    }

    /// Resize the viewport, keeping the center and ratio.
    pub fn set_viewport(&mut self, width: i32, height: i32) {
        let c = self.window.center();
        self.width = width.max(1);
        self.height = height.max(1);
        self.clip = self.viewport();
        self.recenter(c);
    }

    pub fn window_to_pixel(&self, p: Point) -> PixPoint {
        let limit = PIXEL_LIMIT as f64;
        let x = (p.x as f64 - self.window.left as f64) * self.ratio;
        let y = (self.window.top as f64 - p.y as f64) * self.ratio * self.yscale;
        PixPoint::new(
            x.round().clamp(-limit, limit) as i32,
            y.round().clamp(-limit, limit) as i32,
        )
    }

    pub fn pixel_to_window(&self, p: PixPoint) -> Point {
        Point::new(
            self.window.left + (p.x as f64 / self.ratio).round() as i32,
            self.window.top - (p.y as f64 / (self.ratio * self.yscale)).round() as i32,
        )
    }

    /// Maps the upper-left and lower-right corners independently.
    pub fn bbox_to_pixel(&self, bb: &BBox) -> PixRect {
        let ul = self.window_to_pixel(Point::new(bb.left, bb.top));
        let lr = self.window_to_pixel(Point::new(bb.right, bb.bottom));
        PixRect::new(ul.x, ul.y, lr.x, lr.y)
    }

    pub fn pixel_to_bbox(&self, r: &PixRect) -> BBox {
        let ul = self.pixel_to_window(PixPoint::new(r.left, r.top));
        let lr = self.pixel_to_window(PixPoint::new(r.right, r.bottom));
        BBox::new(ul.x, ul.y, lr.x, lr.y)
    }

    /// Length in design units to pixels.
    pub fn to_pixels(&self, len: i32) -> f64 {
        len as f64 * self.ratio
    }

    /// Length in pixels to design units, at least one unit.
    pub fn to_window(&self, pixels: i32) -> i32 {
        ((pixels as f64 / self.ratio).round() as i32).max(1)
    }

    /// Design-space area covered by the current clip rectangle.
    pub fn clip_area(&self) -> BBox {
        self.pixel_to_bbox(&self.clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_points_clamped() {
        let map = CoordMap::new(100, 100, BBox::new(0, 0, 10, 10));
        let p = map.window_to_pixel(Point::new(i32::MAX, i32::MIN));
        assert_eq!(p, PixPoint::new(PIXEL_LIMIT, PIXEL_LIMIT));
        let r = map.bbox_to_pixel(&BBox::new(-1_000_000_000, -1_000_000_000, 1_000_000_000, 1_000_000_000));
        assert_eq!(r.width(), 2 * PIXEL_LIMIT);
        assert_eq!(r.height(), 2 * PIXEL_LIMIT);
    }

    #[test]
    fn test_unit_ratio_flip() {
        let map = CoordMap::new(500, 500, BBox::new(0, 0, 500, 500));
        assert_eq!(map.ratio(), 1.0);
        assert_eq!(map.window_to_pixel(Point::new(100, 100)), PixPoint::new(100, 400));
        assert_eq!(
            map.bbox_to_pixel(&BBox::new(100, 100, 150, 150)),
            PixRect::new(100, 350, 150, 400)
        );
    }

    #[test]
    fn test_round_trip_within_one_pixel() {
        let map = CoordMap::new(640, 480, BBox::new(-3000, -2000, 9000, 7000));
        let tol = (1.0 / map.ratio()).ceil() as i32;
        let w = map.window();
        let mut y = w.bottom;
        while y <= w.top {
            let mut x = w.left;
            while x <= w.right {
                let p = Point::new(x, y);
                let back = map.pixel_to_window(map.window_to_pixel(p));
                assert!((back.x - x).abs() <= tol && (back.y - y).abs() <= tol, "{p} -> {back}");
                x += 137;
            }
            y += 211;
        }
    }

    #[test]
    fn test_viewport_resize_keeps_center() {
        let mut map = CoordMap::new(200, 100, BBox::new(0, 0, 2000, 1000));
        let c = map.window().center();
        let r = map.ratio();
        map.set_viewport(400, 400);
        assert_eq!(map.ratio(), r);
        assert_eq!(map.window().center(), c);
        assert_eq!(map.window().width(), 4000);
    }

    #[test]
    fn test_ratio_from_width() {
        let map = CoordMap::new(100, 50, BBox::new(0, 0, 100, 100));
        assert_eq!(map.ratio(), 1.0);
        assert_eq!(map.window(), BBox::new(0, 25, 100, 75));
        assert_eq!(map.aspect(), 2.0);
    }

    #[test]
    fn test_fit_window() {
        let mut map = CoordMap::new(100, 50, BBox::new(0, 0, 100, 100));
        map.fit_window(BBox::new(0, 0, 100, 100));
        // height limits: ratio = 0.5, window widened to 200 units
        assert_eq!(map.ratio(), 0.5);
        assert_eq!(map.window(), BBox::new(-50, 0, 150, 100));
    }
}
