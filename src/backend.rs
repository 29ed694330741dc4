// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Graphics backend seam.
//!
//! The compositor draws exclusively through [`Backend`]. Concrete
//! backends are the egui painter, the in-memory leveled image used for
//! thumbnails, and [`DrawList`], which records calls for inspection.

use egui::Color32;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixPoint {
    pub x: i32,
    pub y: i32,
}

impl PixPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixSeg {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixSeg {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Parameter range `t0..=t1` of the part of the segment inside
    /// `clip` (Liang-Barsky), 0 being the first endpoint.
    pub fn clip_range(&self, clip: &PixRect) -> Option<(f64, f64)> {
        let (x1, y1) = (self.x1 as f64, self.y1 as f64);
        let (dx, dy) = (self.x2 as f64 - x1, self.y2 as f64 - y1);
        let edges = [
            (-dx, x1 - clip.left as f64),
            (dx, clip.right as f64 - x1),
            (-dy, y1 - clip.top as f64),
            (dy, clip.bottom as f64 - y1),
        ];
        let (mut t0, mut t1) = (0.0f64, 1.0f64);
        for (p, q) in edges {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
            } else if p < 0.0 {
                t0 = t0.max(q / p);
            } else {
                t1 = t1.min(q / p);
            }
        }
        (t0 <= t1).then_some((t0, t1))
    }
}

/// Device rectangle, y grows downward, both edges inclusive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            left: x1.min(x2),
            top: y1.min(y2),
            right: x1.max(x2),
            bottom: y1.max(y2),
        }
    }

    pub fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width - 1, height - 1)
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn intersection(&self, other: &PixRect) -> Option<PixRect> {
        let r = PixRect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };
        (r.left <= r.right && r.top <= r.bottom).then_some(r)
    }

    pub fn union(&self, other: &PixRect) -> PixRect {
        PixRect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn intersects(&self, other: &PixRect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn bloat(&self, d: i32) -> PixRect {
        PixRect::new(
            self.left.saturating_sub(d),
            self.top.saturating_sub(d),
            self.right.saturating_add(d),
            self.bottom.saturating_add(d),
        )
    }
}

/// Dash pattern: bit `n` of `mask` turns pixel `n` of each period on.
/// The period is the position of the highest set bit plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineStyle {
    pub mask: u32,
    pub offset: u32,
}

impl LineStyle {
    pub fn new(mask: u32) -> Self {
        Self { mask, offset: 0 }
    }

    pub fn period(&self) -> u32 {
        32 - self.mask.leading_zeros()
    }

    pub fn is_solid(&self) -> bool {
        let p = self.period();
        p == 0 || self.mask == u32::MAX >> (32 - p)
    }

    pub fn with_offset(self, offset: u32) -> Self {
        let p = self.period().max(1);
        Self {
            mask: self.mask,
            offset: offset % p,
        }
    }

    /// Whether the `n`th pixel along a line is drawn.
    pub fn is_on(&self, n: i32) -> bool {
        let p = self.period();
        if p == 0 {
            return true;
        }
        let i = (n as i64 + self.offset as i64).rem_euclid(p as i64) as u32;
        self.mask & (1 << i) != 0
    }
}

/// Stipple pattern, `rows[y % height]` bit `x % width` set means opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FillPattern {
    pub width: u32,
    pub height: u32,
    pub rows: Vec<u32>,
}

impl FillPattern {
    pub fn new(width: u32, rows: Vec<u32>) -> Self {
        let width = width.clamp(1, 32);
        let height = rows.len().max(1) as u32;
        Self {
            width,
            height,
            rows,
        }
    }

    /// 50% checkerboard.
    pub fn checker() -> Self {
        Self::new(2, vec![0b01, 0b10])
    }

    pub fn is_set(&self, x: i32, y: i32) -> bool {
        let row = self
            .rows
            .get(y.rem_euclid(self.height as i32) as usize)
            .copied()
            .unwrap_or(0);
        row & (1 << x.rem_euclid(self.width as i32)) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Glyph height in pixels.
    pub height: i32,
    /// Rotate 90 degrees, reading upward.
    pub vertical: bool,
    /// Anchor at the text center rather than the lower-left corner.
    pub centered: bool,
}

impl TextStyle {
    pub fn new(height: i32) -> Self {
        Self {
            height,
            vertical: false,
            centered: false,
        }
    }

    pub fn centered(mut self) -> Self {
        self.centered = true;
        self
    }

    pub fn vertical(mut self, vertical: bool) -> Self {
        self.vertical = vertical;
        self
    }
}

/// Estimate used by backends without font metrics.
pub fn estimate_text_extent(text: &str, style: &TextStyle) -> (i32, i32) {
    let w = (text.chars().count() as i32 * style.height * 3 + 4) / 5;
    if style.vertical {
        (style.height, w)
    } else {
        (w, style.height)
    }
}

/// Primitive drawing services supplied by a graphics backend.
///
/// Boxes are filled with the current fill pattern (solid when none is
/// set). Lines use the current line style.
pub trait Backend {
    fn set_color(&mut self, color: Color32);

    fn set_fill(&mut self, fill: Option<&FillPattern>);

    fn set_line_style(&mut self, style: Option<LineStyle>);

    fn set_clip(&mut self, _clip: Option<PixRect>) {}

    fn draw_box(&mut self, rect: PixRect);

    fn draw_boxes(&mut self, rects: &[PixRect]) {
        for r in rects {
            self.draw_box(*r);
        }
    }

    fn draw_line(&mut self, seg: PixSeg);

    fn draw_lines(&mut self, segs: &[PixSeg]) {
        for s in segs {
            self.draw_line(*s);
        }
    }

    fn draw_pixel(&mut self, p: PixPoint);

    fn draw_pixels(&mut self, points: &[PixPoint]) {
        for p in points {
            self.draw_pixel(*p);
        }
    }

    /// Filled polygon, the vertex list is implicitly closed.
    fn draw_polygon(&mut self, points: &[PixPoint]);

    fn draw_polyline(&mut self, points: &[PixPoint]) {
        for w in points.windows(2) {
            self.draw_line(PixSeg::new(w[0].x, w[0].y, w[1].x, w[1].y));
        }
    }

    /// Full ellipse centered at `center`.
    fn draw_ellipse(&mut self, center: PixPoint, rx: i32, ry: i32, filled: bool);

    fn draw_text(&mut self, text: &str, x: i32, y: i32, style: &TextStyle);

    fn text_extent(&self, text: &str, style: &TextStyle) -> (i32, i32) {
        estimate_text_extent(text, style)
    }

    /// Enter or leave XOR/ghost drawing. Only meaningful on dual-plane
    /// backends, where drawing twice restores the pixels.
    fn set_ghost(&mut self, _on: bool) {}

    fn dual_plane(&self) -> bool {
        false
    }

    fn has_pixmap(&self) -> bool {
        false
    }

    /// Redirect drawing to the backing pixmap. Returns false if the
    /// backend has none.
    fn switch_to_pixmap(&mut self, _area: PixRect) -> bool {
        false
    }

    /// Resume drawing on screen and copy `area` from the pixmap.
    fn switch_from_pixmap(&mut self, _area: PixRect) {}

    /// Refresh `area` of the screen from the backing pixmap.
    fn copy_pixmap(&mut self, _area: PixRect) {}

    /// Whether writes carry priority levels (see `LeveledImage`).
    fn leveled(&self) -> bool {
        false
    }

    fn set_level(&mut self, _level: u32) {}

    fn update(&mut self) {}
}

/// Scoped pixmap acquisition. Drawing goes to the backing pixmap while
/// the guard lives and is copied to screen when it drops, including on
/// early returns.
pub struct PixmapGuard<'a> {
    backend: &'a mut dyn Backend,
    area: PixRect,
    active: bool,
}

impl<'a> PixmapGuard<'a> {
    pub fn acquire(backend: &'a mut dyn Backend, area: PixRect) -> Self {
        let active = backend.has_pixmap() && backend.switch_to_pixmap(area);
        Self {
            backend,
            area,
            active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<'a> Deref for PixmapGuard<'a> {
    type Target = dyn Backend + 'a;

    fn deref(&self) -> &Self::Target {
        self.backend
    }
}

impl<'a> DerefMut for PixmapGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.backend
    }
}

impl Drop for PixmapGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.backend.switch_from_pixmap(self.area);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Box {
        rect: PixRect,
        color: Color32,
        stippled: bool,
    },
    Line {
        seg: PixSeg,
        color: Color32,
        style: Option<LineStyle>,
    },
    Pixel {
        p: PixPoint,
        color: Color32,
    },
    Polygon {
        points: Vec<PixPoint>,
        color: Color32,
    },
    Ellipse {
        center: PixPoint,
        rx: i32,
        ry: i32,
        filled: bool,
        color: Color32,
    },
    Text {
        text: String,
        x: i32,
        y: i32,
        color: Color32,
    },
    Ghost(bool),
    ToPixmap(PixRect),
    FromPixmap(PixRect),
    CopyPixmap(PixRect),
}

/// Backend that records every primitive along with the state it was
/// drawn with. `calls` counts backend entry points, so one batched
/// `draw_boxes` call counts once.
#[derive(Debug, Default)]
pub struct DrawList {
    pub ops: Vec<DrawOp>,
    pub calls: usize,
    pub dual_plane: bool,
    pub pixmap: bool,
    color: Color32,
    stippled: bool,
    style: Option<LineStyle>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dual_plane(mut self) -> Self {
        self.dual_plane = true;
        self
    }

    pub fn with_pixmap(mut self) -> Self {
        self.pixmap = true;
        self
    }

    pub fn boxes(&self) -> impl Iterator<Item = (&PixRect, Color32)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Box { rect, color, .. } => Some((rect, *color)),
            _ => None,
        })
    }

    pub fn boxes_with_color(&self, color: Color32) -> Vec<PixRect> {
        self.boxes()
            .filter(|(_, c)| *c == color)
            .map(|(r, _)| *r)
            .collect()
    }

    pub fn lines_with_color(&self, color: Color32) -> Vec<PixSeg> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Line { seg, color: c, .. } if *c == color => Some(*seg),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.calls = 0;
    }

    fn push_box(&mut self, rect: PixRect) {
        self.ops.push(DrawOp::Box {
            rect,
            color: self.color,
            stippled: self.stippled,
        });
    }

    fn push_line(&mut self, seg: PixSeg) {
        self.ops.push(DrawOp::Line {
            seg,
            color: self.color,
            style: self.style,
        });
    }
}

impl Backend for DrawList {
    fn set_color(&mut self, color: Color32) {
        self.color = color;
    }

    fn set_fill(&mut self, fill: Option<&FillPattern>) {
        self.stippled = fill.is_some();
    }

    fn set_line_style(&mut self, style: Option<LineStyle>) {
        self.style = style;
    }

    fn draw_box(&mut self, rect: PixRect) {
        self.calls += 1;
        self.push_box(rect);
    }

    fn draw_boxes(&mut self, rects: &[PixRect]) {
        self.calls += 1;
        for r in rects {
            self.push_box(*r);
        }
    }

    fn draw_line(&mut self, seg: PixSeg) {
        self.calls += 1;
        self.push_line(seg);
    }

    fn draw_lines(&mut self, segs: &[PixSeg]) {
        self.calls += 1;
        for s in segs {
            self.push_line(*s);
        }
    }

    fn draw_pixel(&mut self, p: PixPoint) {
        self.calls += 1;
        self.ops.push(DrawOp::Pixel {
            p,
            color: self.color,
        });
    }

    fn draw_pixels(&mut self, points: &[PixPoint]) {
        self.calls += 1;
        for p in points {
            self.ops.push(DrawOp::Pixel {
                p: *p,
                color: self.color,
            });
        }
    }

    fn draw_polygon(&mut self, points: &[PixPoint]) {
        self.calls += 1;
        self.ops.push(DrawOp::Polygon {
            points: points.to_vec(),
            color: self.color,
        });
    }

    fn draw_ellipse(&mut self, center: PixPoint, rx: i32, ry: i32, filled: bool) {
        self.calls += 1;
        self.ops.push(DrawOp::Ellipse {
            center,
            rx,
            ry,
            filled,
            color: self.color,
        });
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, _style: &TextStyle) {
        self.calls += 1;
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            x,
            y,
            color: self.color,
        });
    }

    fn set_ghost(&mut self, on: bool) {
        self.ops.push(DrawOp::Ghost(on));
    }

    fn dual_plane(&self) -> bool {
        self.dual_plane
    }

    fn has_pixmap(&self) -> bool {
        self.pixmap
    }

    fn switch_to_pixmap(&mut self, area: PixRect) -> bool {
        if self.pixmap {
            self.ops.push(DrawOp::ToPixmap(area));
        }
        self.pixmap
    }

    fn switch_from_pixmap(&mut self, area: PixRect) {
        self.ops.push(DrawOp::FromPixmap(area));
    }

    fn copy_pixmap(&mut self, area: PixRect) {
        self.ops.push(DrawOp::CopyPixmap(area));
    }
}
