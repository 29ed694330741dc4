// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! [`Backend`] over an egui painter.
//!
//! Pixel coordinates are relative to the painter's allocated rectangle,
//! y growing downward. Stipple patterns are approximated by a half
//! transparent fill and ghost drawing is not available, so the
//! compositor falls back to damage repaints for rubber-banding.

use egui::epaint::{Mesh, Vertex, WHITE_UV};
use egui::{Color32, FontId, Pos2, Rect, Stroke};
use lyon_tessellation::math::point;
use lyon_tessellation::path::Path;
use lyon_tessellation::{
    BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers,
};

use crate::backend::{
    Backend, FillPattern, LineStyle, PixPoint, PixRect, PixSeg, TextStyle,
};

const ELLIPSE_SEGMENTS: usize = 48;

pub struct EguiBackend {
    base: egui::Painter,
    painter: egui::Painter,
    origin: Pos2,
    color: Color32,
    stippled: bool,
    style: Option<LineStyle>,
    tessellator: FillTessellator,
}

impl EguiBackend {
    /// `origin` is the screen position of pixel (0, 0).
    pub fn new(painter: egui::Painter, origin: Pos2) -> Self {
        Self {
            base: painter.clone(),
            painter,
            origin,
            color: Color32::WHITE,
            stippled: false,
            style: None,
            tessellator: FillTessellator::new(),
        }
    }

    /// Swap in the painter of a new frame, keeping the drawing state.
    pub fn set_painter(&mut self, painter: egui::Painter, origin: Pos2) {
        self.origin = origin;
        self.base = painter.clone();
        self.painter = painter;
    }

    fn pos(&self, x: i32, y: i32) -> Pos2 {
        egui::pos2(self.origin.x + x as f32, self.origin.y + y as f32)
    }

    fn rect(&self, r: PixRect) -> Rect {
        Rect::from_min_max(self.pos(r.left, r.top), self.pos(r.right + 1, r.bottom + 1))
    }

    fn fill_color(&self) -> Color32 {
        if self.stippled {
            self.color.gamma_multiply(0.5)
        } else {
            self.color
        }
    }

    fn stroke(&self) -> Stroke {
        Stroke::new(1.0, self.color)
    }

    fn segment(&self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let off = egui::vec2(self.origin.x + 0.5, self.origin.y + 0.5);
        self.painter.line_segment(
            [egui::pos2(x1, y1) + off, egui::pos2(x2, y2) + off],
            self.stroke(),
        );
    }

    /// Dashed line as runs of lit pixels along its major axis.
    fn dashed(&self, seg: PixSeg, style: LineStyle) {
        let (dx, dy) = (seg.x2 - seg.x1, seg.y2 - seg.y1);
        let n = dx.abs().max(dy.abs());
        if n == 0 {
            if style.is_on(0) {
                self.draw_dot(seg.x1, seg.y1);
            }
            return;
        }
        let at = |i: i32| {
            (
                seg.x1 as f32 + dx as f32 * i as f32 / n as f32,
                seg.y1 as f32 + dy as f32 * i as f32 / n as f32,
            )
        };
        let mut start = None;
        for i in 0..=n + 1 {
            let on = i <= n && style.is_on(i);
            match (on, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    let (x1, y1) = at(s);
                    let (x2, y2) = at(i - 1);
                    if s == i - 1 {
                        self.draw_dot(x1.round() as i32, y1.round() as i32);
                    } else {
                        self.segment(x1, y1, x2, y2);
                    }
                    start = None;
                }
                _ => {}
            }
        }
    }

    fn draw_dot(&self, x: i32, y: i32) {
        let r = self.rect(PixRect::new(x, y, x, y));
        self.painter.rect_filled(r, 0.0, self.color);
    }

    fn tessellate(&mut self, points: &[PixPoint]) -> Option<Mesh> {
        let mut builder = Path::builder();
        let mut iter = points.iter();
        let first = iter.next()?;
        builder.begin(point(first.x as f32, first.y as f32));
        for p in iter {
            builder.line_to(point(p.x as f32, p.y as f32));
        }
        builder.end(true);
        let path = builder.build();

        let mut buffers: VertexBuffers<Pos2, u32> = VertexBuffers::new();
        let origin = self.origin;
        let result = self.tessellator.tessellate_path(
            &path,
            &FillOptions::default(),
            &mut BuffersBuilder::new(&mut buffers, |v: FillVertex| {
                let p = v.position();
                egui::pos2(origin.x + p.x, origin.y + p.y)
            }),
        );
        if let Err(e) = result {
            log::warn!("[EGUI] polygon tessellation failed: {:?}", e);
            return None;
        }
        let color = self.fill_color();
        Some(Mesh {
            indices: buffers.indices,
            vertices: buffers
                .vertices
                .into_iter()
                .map(|pos| Vertex {
                    pos,
                    uv: WHITE_UV,
                    color,
                })
                .collect(),
            ..Default::default()
        })
    }

    fn ellipse_points(&self, center: PixPoint, rx: i32, ry: i32) -> Vec<Pos2> {
        let c = self.pos(center.x, center.y) + egui::vec2(0.5, 0.5);
        (0..ELLIPSE_SEGMENTS)
            .map(|i| {
                let a = i as f32 * std::f32::consts::TAU / ELLIPSE_SEGMENTS as f32;
                egui::pos2(c.x + rx as f32 * a.cos(), c.y + ry as f32 * a.sin())
            })
            .collect()
    }
}

impl Backend for EguiBackend {
    fn set_color(&mut self, color: Color32) {
        self.color = color;
    }

    fn set_fill(&mut self, fill: Option<&FillPattern>) {
        self.stippled = fill.is_some();
    }

    fn set_line_style(&mut self, style: Option<LineStyle>) {
        self.style = style.filter(|s| !s.is_solid());
    }

    fn set_clip(&mut self, clip: Option<PixRect>) {
        self.painter = match clip {
            Some(r) => {
                let rect = self.rect(r);
                self.base.with_clip_rect(rect)
            }
            None => self.base.clone(),
        };
    }

    fn draw_box(&mut self, rect: PixRect) {
        let r = self.rect(rect);
        self.painter.rect_filled(r, 0.0, self.fill_color());
    }

    fn draw_line(&mut self, seg: PixSeg) {
        match self.style {
            Some(style) => self.dashed(seg, style),
            None => self.segment(
                seg.x1 as f32,
                seg.y1 as f32,
                seg.x2 as f32,
                seg.y2 as f32,
            ),
        }
    }

    fn draw_pixel(&mut self, p: PixPoint) {
        self.draw_dot(p.x, p.y);
    }

    fn draw_polygon(&mut self, points: &[PixPoint]) {
        if points.len() < 3 {
            self.draw_polyline(points);
            return;
        }
        if let Some(mesh) = self.tessellate(points) {
            self.painter.add(egui::Shape::mesh(mesh));
        }
    }

    fn draw_ellipse(&mut self, center: PixPoint, rx: i32, ry: i32, filled: bool) {
        let points = self.ellipse_points(center, rx.max(0), ry.max(0));
        let shape = if filled {
            egui::Shape::convex_polygon(points, self.fill_color(), Stroke::NONE)
        } else {
            egui::Shape::closed_line(points, self.stroke())
        };
        self.painter.add(shape);
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, style: &TextStyle) {
        let font = FontId::monospace(style.height.max(1) as f32);
        let pos = self.pos(x, y);
        if !style.vertical {
            let anchor = if style.centered {
                egui::Align2::CENTER_CENTER
            } else {
                egui::Align2::LEFT_BOTTOM
            };
            self.painter.text(pos, anchor, text, font, self.color);
            return;
        }
        // rotated a quarter turn counter-clockwise, reading upward
        let galley = self.painter.layout_no_wrap(text.to_string(), font, self.color);
        let size = galley.size();
        let pos = if style.centered {
            egui::pos2(pos.x - size.y / 2.0, pos.y + size.x / 2.0)
        } else {
            pos
        };
        let shape = egui::epaint::TextShape::new(pos, galley, self.color)
            .with_angle(-std::f32::consts::FRAC_PI_2);
        self.painter.add(shape);
    }

    fn text_extent(&self, text: &str, style: &TextStyle) -> (i32, i32) {
        let font = FontId::monospace(style.height.max(1) as f32);
        let size = self
            .painter
            .layout_no_wrap(text.to_string(), font, self.color)
            .size();
        let (w, h) = (size.x.ceil() as i32, size.y.ceil() as i32);
        if style.vertical {
            (h, w)
        } else {
            (w, h)
        }
    }
}
