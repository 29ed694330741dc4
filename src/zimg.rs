// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! In-memory raster with per-pixel priority levels.
//!
//! Each write carries the current level and only lands if that level is
//! at least the level already stored for the pixel. Drawing every layer
//! at its own level in a single traversal therefore gives the same raster
//! as drawing the layers one after another in order.

use egui::{Color32, ColorImage};

use crate::backend::{Backend, FillPattern, LineStyle, PixPoint, PixRect, PixSeg, TextStyle};

#[derive(Debug, Clone)]
pub struct LeveledImage {
    width: i32,
    height: i32,
    pixels: Vec<Color32>,
    levels: Vec<u32>,
    leveled: bool,
    color: Color32,
    fill: Option<FillPattern>,
    style: Option<LineStyle>,
    clip: PixRect,
    level: u32,
}

impl LeveledImage {
    /// Image whose writes are level-tested.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let n = (width * height) as usize;
        Self {
            width,
            height,
            pixels: vec![Color32::BLACK; n],
            levels: vec![0; n],
            leveled: true,
            color: Color32::WHITE,
            fill: None,
            style: None,
            clip: PixRect::from_size(width, height),
            level: 0,
        }
    }

    /// Plain image: reports itself as unleveled so renderers draw layer
    /// by layer, and every write lands.
    pub fn flat(width: i32, height: i32) -> Self {
        Self {
            leveled: false,
            ..Self::new(width, height)
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Color32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    pub fn level_at(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|i| self.levels[i])
    }

    pub fn pixels(&self) -> &[Color32] {
        &self.pixels
    }

    pub fn count_color(&self, color: Color32) -> usize {
        self.pixels.iter().filter(|c| **c == color).count()
    }

    /// Smallest rectangle containing every pixel of `color`.
    pub fn extent_of(&self, color: Color32) -> Option<PixRect> {
        let mut r: Option<PixRect> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.pixels[(y * self.width + x) as usize] == color {
                    let p = PixRect::new(x, y, x, y);
                    r = Some(r.map_or(p, |acc| acc.union(&p)));
                }
            }
        }
        r
    }

    pub fn clear(&mut self, color: Color32) {
        self.pixels.fill(color);
        self.levels.fill(0);
    }

    pub fn to_color_image(&self) -> ColorImage {
        let rgba: Vec<u8> = self
            .pixels
            .iter()
            .flat_map(|c| [c.r(), c.g(), c.b(), 255])
            .collect();
        ColorImage::from_rgba_unmultiplied([self.width as usize, self.height as usize], &rgba)
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        (x >= 0 && y >= 0 && x < self.width && y < self.height)
            .then(|| (y * self.width + x) as usize)
    }

    fn put(&mut self, x: i32, y: i32) {
        if !self.clip.contains(x, y) {
            return;
        }
        if let Some(i) = self.index(x, y) {
            if !self.leveled || self.level >= self.levels[i] {
                self.pixels[i] = self.color;
                self.levels[i] = self.level;
            }
        }
    }

    fn put_filled(&mut self, x: i32, y: i32) {
        let opaque = self.fill.as_ref().map_or(true, |f| f.is_set(x, y));
        if opaque {
            self.put(x, y);
        }
    }

    fn span(&mut self, y: i32, x1: i32, x2: i32) {
        let lo = x1.max(self.clip.left);
        let hi = x2.min(self.clip.right);
        for x in lo..=hi {
            self.put_filled(x, y);
        }
    }
}

impl Backend for LeveledImage {
    fn set_color(&mut self, color: Color32) {
        self.color = color;
    }

    fn set_fill(&mut self, fill: Option<&FillPattern>) {
        self.fill = fill.cloned();
    }

    fn set_line_style(&mut self, style: Option<LineStyle>) {
        self.style = style;
    }

    fn set_clip(&mut self, clip: Option<PixRect>) {
        let full = PixRect::from_size(self.width, self.height);
        self.clip = clip
            .and_then(|c| c.intersection(&full))
            .unwrap_or(full);
    }

    fn draw_box(&mut self, rect: PixRect) {
        let top = rect.top.max(self.clip.top);
        let bottom = rect.bottom.min(self.clip.bottom);
        for y in top..=bottom {
            self.span(y, rect.left, rect.right);
        }
    }

    /// Bresenham over the part of the segment inside the clip, dashed by
    /// the current line style counted from the first endpoint.
    fn draw_line(&mut self, seg: PixSeg) {
        let Some((t0, t1)) = seg.clip_range(&self.clip) else {
            return;
        };
        let (fx, fy) = (seg.x1 as f64, seg.y1 as f64);
        let (fdx, fdy) = (seg.x2 as f64 - fx, seg.y2 as f64 - fy);
        let at = |t: f64| ((fx + t * fdx).round() as i64, (fy + t * fdy).round() as i64);
        let (mut x, mut y) = at(t0);
        let (ex, ey) = at(t1);
        let period = self.style.map_or(1, |s| s.period().max(1)) as i64;
        let mut n = ((t0 * fdx.abs().max(fdy.abs())).round() as i64).rem_euclid(period);

        let dx = (ex - x).abs();
        let dy = -(ey - y).abs();
        let sx = if x < ex { 1 } else { -1 };
        let sy = if y < ey { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            if self.style.map_or(true, |s| s.is_on(n as i32)) {
                self.put(x as i32, y as i32);
            }
            if x == ex && y == ey {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
            n = (n + 1) % period;
        }
    }

    fn draw_pixel(&mut self, p: PixPoint) {
        self.put(p.x, p.y);
    }

    /// Even-odd scanline fill sampled at pixel centers.
    fn draw_polygon(&mut self, points: &[PixPoint]) {
        if points.len() < 3 {
            self.draw_polyline(points);
            return;
        }
        let ymin = points.iter().map(|p| p.y).min().unwrap_or(0).max(self.clip.top);
        let ymax = points.iter().map(|p| p.y).max().unwrap_or(0).min(self.clip.bottom);
        let mut xs: Vec<f64> = Vec::new();
        for y in ymin..=ymax {
            let yc = y as f64 + 0.5;
            xs.clear();
            for i in 0..points.len() {
                let a = points[i];
                let b = points[(i + 1) % points.len()];
                let (ay, by) = (a.y as f64, b.y as f64);
                if (ay <= yc && by > yc) || (by <= yc && ay > yc) {
                    let t = (yc - ay) / (by - ay);
                    xs.push(a.x as f64 + t * (b.x - a.x) as f64);
                }
            }
            xs.sort_by(|a, b| a.total_cmp(b));
            for pair in xs.chunks_exact(2) {
                let x1 = (pair[0] - 0.5).ceil() as i32;
                let x2 = (pair[1] - 0.5).floor() as i32;
                if x1 <= x2 {
                    self.span(y, x1, x2);
                }
            }
        }
    }

    fn draw_ellipse(&mut self, center: PixPoint, rx: i32, ry: i32, filled: bool) {
        let (rx, ry) = (rx.abs(), ry.abs());
        if rx == 0 || ry == 0 {
            self.draw_line(PixSeg::new(center.x - rx, center.y - ry, center.x + rx, center.y + ry));
            return;
        }
        let half = |dy: i32| -> i32 {
            let t = dy as f64 / ry as f64;
            (rx as f64 * (1.0 - t * t).max(0.0).sqrt()).round() as i32
        };
        if filled {
            for dy in -ry..=ry {
                let w = half(dy);
                self.span(center.y + dy, center.x - w, center.x + w);
            }
            return;
        }
        // connect consecutive rows so steep parts have no gaps
        let mut prev: Option<(i32, i32)> = None;
        for dy in -ry..=ry {
            let w = half(dy);
            if let Some((pdy, pw)) = prev {
                for sign in [-1, 1] {
                    self.draw_line(PixSeg::new(
                        center.x + sign * pw,
                        center.y + pdy,
                        center.x + sign * w,
                        center.y + dy,
                    ));
                }
            }
            prev = Some((dy, w));
        }
    }

    /// No font rasterizer here, text is stood in for by its baseline.
    fn draw_text(&mut self, text: &str, x: i32, y: i32, style: &TextStyle) {
        let (w, h) = self.text_extent(text, style);
        let (x, y) = if style.centered {
            (x - w / 2, y + h / 2)
        } else {
            (x, y)
        };
        let saved = self.style.take();
        if style.vertical {
            self.draw_line(PixSeg::new(x, y, x, y - h));
        } else {
            self.draw_line(PixSeg::new(x, y, x + w, y));
        }
        self.style = saved;
    }

    fn leveled(&self) -> bool {
        self.leveled
    }

    fn set_level(&mut self, level: u32) {
        self.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_level_wins_regardless_of_order() {
        let mut img = LeveledImage::new(10, 10);
        img.set_level(2);
        img.set_color(Color32::RED);
        img.draw_box(PixRect::new(0, 0, 4, 4));
        img.set_level(1);
        img.set_color(Color32::GREEN);
        img.draw_box(PixRect::new(2, 2, 6, 6));
        assert_eq!(img.pixel(3, 3), Some(Color32::RED));
        assert_eq!(img.pixel(5, 5), Some(Color32::GREEN));
        assert_eq!(img.level_at(3, 3), Some(2));
    }

    #[test]
    fn test_equal_level_later_wins() {
        let mut img = LeveledImage::new(4, 4);
        img.set_level(1);
        img.set_color(Color32::RED);
        img.draw_pixel(PixPoint::new(1, 1));
        img.set_color(Color32::BLUE);
        img.draw_pixel(PixPoint::new(1, 1));
        assert_eq!(img.pixel(1, 1), Some(Color32::BLUE));
    }

    #[test]
    fn test_flat_image_ignores_levels() {
        let mut img = LeveledImage::flat(4, 4);
        assert!(!img.leveled());
        img.set_level(5);
        img.set_color(Color32::RED);
        img.draw_pixel(PixPoint::new(0, 0));
        img.set_level(0);
        img.set_color(Color32::BLUE);
        img.draw_pixel(PixPoint::new(0, 0));
        assert_eq!(img.pixel(0, 0), Some(Color32::BLUE));
    }

    #[test]
    fn test_box_is_inclusive_and_clipped() {
        let mut img = LeveledImage::new(10, 10);
        img.set_color(Color32::WHITE);
        img.set_clip(Some(PixRect::new(0, 0, 5, 9)));
        img.draw_box(PixRect::new(2, 2, 8, 3));
        assert_eq!(img.count_color(Color32::WHITE), 4 * 2);
        assert_eq!(img.extent_of(Color32::WHITE), Some(PixRect::new(2, 2, 5, 3)));
    }

    #[test]
    fn test_dashed_line() {
        let mut img = LeveledImage::new(8, 1);
        img.set_color(Color32::WHITE);
        img.set_line_style(Some(LineStyle::new(0b01)));
        img.draw_line(PixSeg::new(0, 0, 7, 0));
        // mask 0b01 has period 1 and is solid
        assert_eq!(img.count_color(Color32::WHITE), 8);
        img.clear(Color32::BLACK);
        img.set_line_style(Some(LineStyle::new(0b10)));
        img.draw_line(PixSeg::new(0, 0, 7, 0));
        assert_eq!(img.count_color(Color32::WHITE), 4);
        assert_eq!(img.pixel(1, 0), Some(Color32::WHITE));
    }

    #[test]
    fn test_line_far_outside_is_clipped() {
        let mut img = LeveledImage::new(10, 10);
        img.set_color(Color32::WHITE);
        img.draw_line(PixSeg::new(i32::MIN, 5, i32::MAX, 5));
        assert_eq!(img.count_color(Color32::WHITE), 10);
        img.draw_line(PixSeg::new(-1_000_000_000, -3, 1_000_000_000, -3));
        assert_eq!(img.count_color(Color32::WHITE), 10);
    }

    #[test]
    fn test_clipped_dash_keeps_phase() {
        let mut img = LeveledImage::new(4, 1);
        img.set_color(Color32::WHITE);
        img.set_line_style(Some(LineStyle::new(0b10)));
        // pixel 0 of the image is pixel 3 of the line, which is on
        img.draw_line(PixSeg::new(-3, 0, 3, 0));
        assert_eq!(img.pixel(0, 0), Some(Color32::WHITE));
        assert_eq!(img.pixel(1, 0), Some(Color32::BLACK));
        assert_eq!(img.pixel(2, 0), Some(Color32::WHITE));
    }

    #[test]
    fn test_polygon_fill_matches_rectangle() {
        let mut img = LeveledImage::new(10, 10);
        img.set_color(Color32::WHITE);
        img.draw_polygon(&[
            PixPoint::new(1, 1),
            PixPoint::new(5, 1),
            PixPoint::new(5, 4),
            PixPoint::new(1, 4),
        ]);
        assert_eq!(img.extent_of(Color32::WHITE), Some(PixRect::new(1, 1, 4, 3)));
        assert_eq!(img.count_color(Color32::WHITE), 12);
    }

    #[test]
    fn test_stipple_fill() {
        let mut img = LeveledImage::new(4, 4);
        img.set_color(Color32::WHITE);
        img.set_fill(Some(&FillPattern::checker()));
        img.draw_box(PixRect::new(0, 0, 3, 3));
        assert_eq!(img.count_color(Color32::WHITE), 8);
    }

    #[test]
    fn test_filled_ellipse_symmetric() {
        let mut img = LeveledImage::new(21, 21);
        img.set_color(Color32::WHITE);
        img.draw_ellipse(PixPoint::new(10, 10), 6, 3, true);
        assert_eq!(img.extent_of(Color32::WHITE), Some(PixRect::new(4, 7, 16, 13)));
    }
}
