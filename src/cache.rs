// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Draw-call cache.
//!
//! Primitives sharing the current color, fill and line style are collected
//! into fixed-capacity buffers and handed to the backend in one call. A
//! buffer that fills up is flushed on the spot. With caching disabled every
//! `add_*` becomes an immediate single-primitive backend call; the final
//! raster is the same either way.

use egui::Color32;

use crate::backend::{Backend, FillPattern, LineStyle, PixPoint, PixRect, PixSeg};

pub const DEFAULT_CACHE_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Batched backend calls issued by flushes.
    pub batches: usize,
    /// Flushes forced by a full buffer.
    pub overflows: usize,
}

#[derive(Debug, Clone)]
pub struct DrawCache {
    capacity: usize,
    enabled: bool,
    boxes: Vec<PixRect>,
    solid_boxes: Vec<PixRect>,
    lines: Vec<PixSeg>,
    pixels: Vec<PixPoint>,
    fill: Option<FillPattern>,
    color: Option<Color32>,
    line_style: Option<LineStyle>,
    stats: CacheStats,
}

impl Default for DrawCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl DrawCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            enabled: false,
            boxes: Vec::with_capacity(capacity),
            solid_boxes: Vec::with_capacity(capacity),
            lines: Vec::with_capacity(capacity),
            pixels: Vec::with_capacity(capacity),
            fill: None,
            color: None,
            line_style: None,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Start a caching scope. Anything pending from an earlier scope is
    /// discarded, so call `flush` to end each scope.
    pub fn init(&mut self) {
        self.boxes.clear();
        self.solid_boxes.clear();
        self.lines.clear();
        self.pixels.clear();
        self.color = None;
        self.stats = CacheStats::default();
    }

    /// Turn batching on or off, flushing pending primitives first.
    pub fn enable(&mut self, be: &mut dyn Backend, on: bool) {
        if self.enabled && !on {
            self.flush(be);
        }
        self.enabled = on;
    }

    pub fn pending(&self) -> usize {
        self.boxes.len() + self.solid_boxes.len() + self.lines.len() + self.pixels.len()
    }

    pub fn set_color(&mut self, be: &mut dyn Backend, color: Color32) {
        if self.color == Some(color) {
            return;
        }
        self.flush_buffers(be);
        be.set_color(color);
        self.color = Some(color);
    }

    pub fn set_fill(&mut self, be: &mut dyn Backend, fill: Option<&FillPattern>) {
        if self.fill.as_ref() == fill {
            return;
        }
        self.flush_boxes(be);
        self.fill = fill.cloned();
    }

    pub fn set_line_style(&mut self, be: &mut dyn Backend, style: Option<LineStyle>) {
        if self.line_style == style {
            return;
        }
        self.flush_lines(be);
        be.set_line_style(style);
        self.line_style = style;
    }

    /// Box filled with the current fill pattern.
    pub fn add_box(&mut self, be: &mut dyn Backend, r: PixRect) {
        if self.degenerate(be, r) {
            return;
        }
        if !self.enabled {
            be.set_fill(self.fill.as_ref());
            be.draw_box(r);
            return;
        }
        self.boxes.push(r);
        if self.boxes.len() >= self.capacity {
            self.stats.overflows += 1;
            self.flush_boxes(be);
        }
    }

    /// Box filled solid regardless of the fill pattern.
    pub fn add_solid_box(&mut self, be: &mut dyn Backend, r: PixRect) {
        if self.degenerate(be, r) {
            return;
        }
        if !self.enabled {
            be.set_fill(None);
            be.draw_box(r);
            return;
        }
        self.solid_boxes.push(r);
        if self.solid_boxes.len() >= self.capacity {
            self.stats.overflows += 1;
            self.flush_solid_boxes(be);
        }
    }

    pub fn add_line(&mut self, be: &mut dyn Backend, seg: PixSeg) {
        if seg.x1 == seg.x2 && seg.y1 == seg.y2 {
            self.add_pixel(be, PixPoint::new(seg.x1, seg.y1));
            return;
        }
        if !self.enabled {
            be.draw_line(seg);
            return;
        }
        self.lines.push(seg);
        if self.lines.len() >= self.capacity {
            self.stats.overflows += 1;
            self.flush_lines(be);
        }
    }

    pub fn add_pixel(&mut self, be: &mut dyn Backend, p: PixPoint) {
        if !self.enabled {
            be.draw_pixel(p);
            return;
        }
        self.pixels.push(p);
        if self.pixels.len() >= self.capacity {
            self.stats.overflows += 1;
            self.flush_pixels(be);
        }
    }

    /// Box outline as four lines.
    pub fn add_outline(&mut self, be: &mut dyn Backend, r: PixRect) {
        if r.width() == 0 || r.height() == 0 {
            self.add_line(be, PixSeg::new(r.left, r.top, r.right, r.bottom));
            return;
        }
        self.add_line(be, PixSeg::new(r.left, r.top, r.right, r.top));
        self.add_line(be, PixSeg::new(r.right, r.top, r.right, r.bottom));
        self.add_line(be, PixSeg::new(r.right, r.bottom, r.left, r.bottom));
        self.add_line(be, PixSeg::new(r.left, r.bottom, r.left, r.top));
    }

    /// Polygons are never batched, but must see the pending primitives
    /// of the same color drawn first.
    pub fn add_polygon(&mut self, be: &mut dyn Backend, points: &[PixPoint]) {
        self.flush_buffers(be);
        be.set_fill(self.fill.as_ref());
        be.draw_polygon(points);
    }

    /// Flush every buffer and reset the color, fill and line style state.
    pub fn flush(&mut self, be: &mut dyn Backend) {
        self.flush_buffers(be);
        if self.line_style.is_some() {
            be.set_line_style(None);
        }
        self.color = None;
        self.fill = None;
        self.line_style = None;
    }

    fn flush_buffers(&mut self, be: &mut dyn Backend) {
        self.flush_boxes(be);
        self.flush_solid_boxes(be);
        self.flush_lines(be);
        self.flush_pixels(be);
    }

    fn degenerate(&mut self, be: &mut dyn Backend, r: PixRect) -> bool {
        if r.width() == 0 && r.height() == 0 {
            self.add_pixel(be, PixPoint::new(r.left, r.top));
            true
        } else if r.width() == 0 || r.height() == 0 {
            self.add_line(be, PixSeg::new(r.left, r.top, r.right, r.bottom));
            true
        } else {
            false
        }
    }

    fn flush_boxes(&mut self, be: &mut dyn Backend) {
        if self.boxes.is_empty() {
            return;
        }
        be.set_fill(self.fill.as_ref());
        be.draw_boxes(&self.boxes);
        self.boxes.clear();
        self.stats.batches += 1;
    }

    fn flush_solid_boxes(&mut self, be: &mut dyn Backend) {
        if self.solid_boxes.is_empty() {
            return;
        }
        be.set_fill(None);
        be.draw_boxes(&self.solid_boxes);
        self.solid_boxes.clear();
        self.stats.batches += 1;
    }

    fn flush_lines(&mut self, be: &mut dyn Backend) {
        if self.lines.is_empty() {
            return;
        }
        be.draw_lines(&self.lines);
        self.lines.clear();
        self.stats.batches += 1;
    }

    fn flush_pixels(&mut self, be: &mut dyn Backend) {
        if self.pixels.is_empty() {
            return;
        }
        be.draw_pixels(&self.pixels);
        self.pixels.clear();
        self.stats.batches += 1;
    }
}
