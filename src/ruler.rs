// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Measurement rulers.

use crate::backend::{Backend, PixRect, PixSeg, TextStyle};
use crate::color::DisplayColor;
use crate::db::DisplayMode;
use crate::geom::{Point, RESOLUTION};
use crate::mapper::CoordMap;
use crate::marks::MarkContext;

/// Closest tick spacing allowed, in pixels.
pub const MIN_TICK_PIXELS: i32 = 10;

/// Every fifth tick is long and labeled.
const MAJOR_EVERY: usize = 5;

/// Smallest 1, 2 or 5 times a power of ten not below `x`.
pub fn nice_step(x: f64) -> f64 {
    if x.is_nan() || x <= 0.0 {
        return 1.0;
    }
    let exp = 10f64.powf(x.log10().floor());
    let m = x / exp;
    let nice = if m <= 1.0 {
        1.0
    } else if m <= 2.0 {
        2.0
    } else if m <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * exp
}

/// Tick distances from the ruler start up to `len`, flagged major.
pub fn ticks(len: f64, step: f64) -> Vec<(f64, bool)> {
    ticks_within(len, step, 0.0, len)
}

/// The ticks of [`ticks`] whose distance lies in `lo..=hi`.
pub fn ticks_within(len: f64, step: f64, lo: f64, hi: f64) -> Vec<(f64, bool)> {
    if len <= 0.0 || step <= 0.0 {
        return vec![(0.0, true)];
    }
    let n = (len / step + 1e-9).floor() as i64;
    let first = (lo.max(0.0) / step - 1e-9).ceil().max(0.0) as i64;
    let last = ((hi.min(len) / step + 1e-9).floor() as i64).min(n);
    (first..=last)
        .map(|i| (i as f64 * step, i % MAJOR_EVERY as i64 == 0))
        .collect()
}

/// Microns with trailing zeros dropped.
pub fn format_microns(units: f64) -> String {
    let s = format!("{:.3}", units / RESOLUTION as f64);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ruler {
    pub id: u64,
    pub window: usize,
    pub mode: DisplayMode,
    pub from: Point,
    pub to: Point,
    /// Perpendicular displacement of the measuring line, in pixels.
    pub offset: i32,
}

/// Pixel geometry of a ruler in one window.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RulerLayout {
    pub segs: Vec<PixSeg>,
    /// Text and its lower-left anchor.
    pub labels: Vec<(String, i32, i32)>,
}

impl Ruler {
    pub fn length(&self) -> f64 {
        let dx = (self.to.x - self.from.x) as f64;
        let dy = (self.to.y - self.from.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn layout(&self, map: &CoordMap, size: i32) -> RulerLayout {
        let mut out = RulerLayout::default();
        let a = map.window_to_pixel(self.from);
        let b = map.window_to_pixel(self.to);
        let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
        let plen = (dx * dx + dy * dy).sqrt();
        let len = self.length();
        if plen < 1.0 {
            out.segs.push(PixSeg::new(a.x - size, a.y, a.x + size, a.y));
            out.segs.push(PixSeg::new(a.x, a.y - size, a.x, a.y + size));
            out.labels.push((format_microns(len), a.x + size, a.y - size));
            return out;
        }
        let (ux, uy) = (dx / plen, dy / plen);
        // normal pointing to the left of the direction of travel
        let (nx, ny) = (uy, -ux);
        let off = self.offset as f64;
        let at = |t: f64, n: f64| {
            (
                (a.x as f64 + ux * t + nx * n).round() as i32,
                (a.y as f64 + uy * t + ny * n).round() as i32,
            )
        };
        let (x1, y1) = at(0.0, off);
        let (x2, y2) = at(plen, off);
        if self.offset != 0 {
            out.segs.push(PixSeg::new(a.x, a.y, x1, y1));
            out.segs.push(PixSeg::new(b.x, b.y, x2, y2));
        }
        out.segs.push(PixSeg::new(x1, y1, x2, y2));

        let step = nice_step(map.to_window(MIN_TICK_PIXELS).max(1) as f64);
        let scale = plen / len.max(1.0);
        let major = size as f64;
        // only the stretch that can show, with room for ticks and labels
        let visible = map.viewport().bloat(size * 3 + 2);
        let (lo, hi) = match PixSeg::new(x1, y1, x2, y2).clip_range(&visible) {
            Some((t0, t1)) => (t0 * len, t1 * len),
            None => (1.0, 0.0),
        };
        let marks = if lo <= hi { ticks_within(len, step, lo, hi) } else { Vec::new() };
        for (d, is_major) in marks {
            let t = d * scale;
            let h = if is_major { major } else { major / 2.0 };
            let (tx1, ty1) = at(t, off);
            let (tx2, ty2) = at(t, off + h);
            out.segs.push(PixSeg::new(tx1, ty1, tx2, ty2));
            if is_major && d > 0.0 && len - d >= step {
                let (lx, ly) = at(t, off + h + 2.0);
                out.labels.push((format_microns(d), lx, ly));
            }
        }
        let (lx, ly) = at(plen, off + major + 2.0);
        out.labels.push((format_microns(len), lx, ly));
        out
    }

    pub fn pixel_bbox(&self, map: &CoordMap, size: i32, backend: &dyn Backend) -> PixRect {
        let layout = self.layout(map, size);
        let style = TextStyle::new(size * 2);
        let mut rects = layout
            .segs
            .iter()
            .map(|s| PixRect::new(s.x1, s.y1, s.x2, s.y2))
            .chain(layout.labels.iter().map(|(text, x, y)| {
                let (w, h) = backend.text_extent(text, &style);
                PixRect::new(*x, *y - h, *x + w, *y)
            }));
        let first = rects.next().unwrap_or_default();
        rects.fold(first, |acc, r| acc.union(&r)).bloat(1)
    }

    pub fn show(&self, ctx: &mut MarkContext<'_>) {
        let layout = self.layout(ctx.map, ctx.size);
        ctx.color(DisplayColor::Ruler);
        for s in &layout.segs {
            ctx.line(s.x1, s.y1, s.x2, s.y2);
        }
        let style = TextStyle::new(ctx.size * 2);
        for (text, x, y) in &layout.labels {
            ctx.text(text, *x, *y, &style);
        }
    }
}

/// Rulers of all windows.
#[derive(Debug, Default, Clone)]
pub struct RulerSet {
    rulers: Vec<Ruler>,
    next_id: u64,
}

impl RulerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, window: usize, mode: DisplayMode, from: Point, to: Point) -> &Ruler {
        self.push(Ruler {
            id: 0,
            window,
            mode,
            from,
            to,
            offset: 0,
        })
    }

    /// Continue ruler `id` from its end point to `to`, keeping its offset.
    pub fn chain(&mut self, id: u64, to: Point) -> Option<&Ruler> {
        let prev = self.get(id)?.clone();
        Some(self.push(Ruler {
            id: 0,
            from: prev.to,
            to,
            ..prev
        }))
    }

    fn push(&mut self, mut ruler: Ruler) -> &Ruler {
        self.next_id += 1;
        ruler.id = self.next_id;
        self.rulers.push(ruler);
        &self.rulers[self.rulers.len() - 1]
    }

    pub fn get(&self, id: u64) -> Option<&Ruler> {
        self.rulers.iter().find(|r| r.id == id)
    }

    pub fn set_offset(&mut self, id: u64, offset: i32) -> Option<Ruler> {
        let r = self.rulers.iter_mut().find(|r| r.id == id)?;
        let old = r.clone();
        r.offset = offset;
        Some(old)
    }

    pub fn remove(&mut self, id: u64) -> Option<Ruler> {
        let i = self.rulers.iter().position(|r| r.id == id)?;
        Some(self.rulers.remove(i))
    }

    pub fn for_window(&self, window: usize) -> impl Iterator<Item = &Ruler> {
        self.rulers.iter().filter(move |r| r.window == window)
    }

    /// Drop every ruler bound to `window`.
    pub fn drop_window(&mut self, window: usize) -> Vec<Ruler> {
        let (gone, kept): (Vec<Ruler>, Vec<Ruler>) = std::mem::take(&mut self.rulers)
            .into_iter()
            .partition(|r| r.window == window);
        self.rulers = kept;
        gone
    }

    pub fn len(&self) -> usize {
        self.rulers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rulers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::BBox;
    use approx::assert_relative_eq;

    #[test]
    fn test_nice_step() {
        assert_relative_eq!(nice_step(1.0), 1.0);
        assert_relative_eq!(nice_step(3.0), 5.0);
        assert_relative_eq!(nice_step(7.0), 10.0);
        assert_relative_eq!(nice_step(101.0), 200.0);
        assert_relative_eq!(nice_step(0.13), 0.2, epsilon = 1e-12);
        assert_relative_eq!(nice_step(0.0), 1.0);
    }

    #[test]
    fn test_ticks() {
        let t = ticks(10.0, 1.0);
        assert_eq!(t.len(), 11);
        let majors: Vec<f64> = t.iter().filter(|(_, m)| *m).map(|(d, _)| *d).collect();
        assert_eq!(majors, vec![0.0, 5.0, 10.0]);
        assert_eq!(ticks(0.0, 1.0), vec![(0.0, true)]);
    }

    #[test]
    fn test_format_microns() {
        assert_eq!(format_microns(1500.0), "1.5");
        assert_eq!(format_microns(2000.0), "2");
        assert_eq!(format_microns(0.0), "0");
        assert_eq!(format_microns(-250.0), "-0.25");
    }

    #[test]
    fn test_horizontal_layout() {
        let map = CoordMap::new(200, 200, BBox::new(0, 0, 200, 200));
        let r = Ruler {
            id: 1,
            window: 0,
            mode: DisplayMode::Physical,
            from: Point::new(20, 100),
            to: Point::new(120, 100),
            offset: 0,
        };
        let layout = r.layout(&map, 6);
        assert_eq!(layout.segs[0], PixSeg::new(20, 100, 120, 100));
        // 10 unit step, ticks at 0..=100
        assert_eq!(layout.segs.len(), 1 + 11);
        assert_eq!(layout.labels.last().map(|l| l.0.as_str()), Some("0.1"));
    }

    #[test]
    fn test_ticks_within() {
        let t = ticks_within(100.0, 10.0, 25.0, 61.0);
        let d: Vec<f64> = t.iter().map(|(d, _)| *d).collect();
        assert_eq!(d, vec![30.0, 40.0, 50.0, 60.0]);
        assert!(t[2].1);
        assert!(ticks_within(100.0, 10.0, 200.0, 300.0).is_empty());
    }

    #[test]
    fn test_long_ruler_ticks_only_on_screen() {
        let map = CoordMap::new(200, 200, BBox::new(0, 0, 200, 200));
        let r = Ruler {
            id: 1,
            window: 0,
            mode: DisplayMode::Physical,
            from: Point::new(20, 100),
            to: Point::new(1_000_000, 100),
            offset: 0,
        };
        let layout = r.layout(&map, 6);
        // the line plus ticks at 0..=190 units along it
        assert_eq!(layout.segs.len(), 1 + 20);
        assert_eq!(layout.labels.last().map(|l| l.0.as_str()), Some("999.98"));
    }

    #[test]
    fn test_offset_adds_extensions() {
        let map = CoordMap::new(200, 200, BBox::new(0, 0, 200, 200));
        let r = Ruler {
            id: 1,
            window: 0,
            mode: DisplayMode::Physical,
            from: Point::new(20, 100),
            to: Point::new(120, 100),
            offset: 10,
        };
        let layout = r.layout(&map, 6);
        assert_eq!(layout.segs[0], PixSeg::new(20, 100, 20, 90));
        assert_eq!(layout.segs[2], PixSeg::new(20, 90, 120, 90));
    }

    #[test]
    fn test_chain_and_drop_window() {
        let mut set = RulerSet::new();
        let id = set
            .add(1, DisplayMode::Physical, Point::new(0, 0), Point::new(10, 0))
            .id;
        let next = set.chain(id, Point::new(10, 10)).unwrap();
        assert_eq!(next.from, Point::new(10, 0));
        assert_eq!(next.window, 1);
        set.add(0, DisplayMode::Physical, Point::new(0, 0), Point::new(5, 5));
        assert_eq!(set.drop_window(1).len(), 2);
        assert_eq!(set.len(), 1);
    }
}
