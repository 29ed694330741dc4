// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Overlay marks.
//!
//! Marks are drawn over the rendered geometry and are never part of the
//! database. Showing a mark paints it; erasing one asks for a redisplay
//! of the pixels it covered, so whatever was underneath comes back.

pub mod user;

use egui::Color32;

use crate::backend::{Backend, FillPattern, LineStyle, PixPoint, PixRect, PixSeg, TextStyle};
use crate::cache::DrawCache;
use crate::color::{ColorTable, DisplayColor};
use crate::db::{DisplayMode, InstId, TermId};
use crate::geom::{BBox, Point};
use crate::mapper::CoordMap;
use crate::redisplay::AreaList;

pub use user::{UserMark, UserMarkAttr, UserMarkTable, UserShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkKind {
    Cross,
    Box,
    Arrow,
    Eterm,
    Pterm,
    Ilab,
    Bsc,
    Fence,
    Plot,
}

impl MarkKind {
    pub const ALL: [MarkKind; 9] = [
        MarkKind::Cross,
        MarkKind::Box,
        MarkKind::Arrow,
        MarkKind::Eterm,
        MarkKind::Pterm,
        MarkKind::Ilab,
        MarkKind::Bsc,
        MarkKind::Fence,
        MarkKind::Plot,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Kinds drawn next to a terminal and spread over quadrants.
    pub fn is_terminal(self) -> bool {
        matches!(self, MarkKind::Eterm | MarkKind::Pterm | MarkKind::Bsc)
    }
}

/// Where a terminal label sits relative to its point, assigned in this
/// order as marks pile up on one point.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    #[default]
    UpperRight,
    UpperLeft,
    LowerRight,
    LowerLeft,
}

impl Quadrant {
    pub fn from_count(count: usize) -> Self {
        match count % 4 {
            0 => Quadrant::UpperRight,
            1 => Quadrant::UpperLeft,
            2 => Quadrant::LowerRight,
            _ => Quadrant::LowerLeft,
        }
    }

    /// Pixel direction, y down.
    fn signs(self) -> (i32, i32) {
        match self {
            Quadrant::UpperRight => (1, -1),
            Quadrant::UpperLeft => (-1, -1),
            Quadrant::LowerRight => (1, 1),
            Quadrant::LowerLeft => (-1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    Cross {
        pos: Point,
        mode: DisplayMode,
    },
    /// Outline box; `selected` boxes are selection highlights.
    Box {
        bbox: BBox,
        mode: DisplayMode,
        selected: bool,
    },
    Arrow {
        from: Point,
        to: Point,
        mode: DisplayMode,
    },
    /// Electrical terminal.
    Eterm {
        term: TermId,
        pos: Point,
        name: String,
        quadrant: Quadrant,
    },
    /// Physical terminal.
    Pterm {
        term: TermId,
        pos: Point,
        name: String,
        quadrant: Quadrant,
    },
    /// Instance label.
    Ilab {
        inst: InstId,
        bbox: BBox,
        label: String,
        mode: DisplayMode,
    },
    /// Bus connector terminal.
    Bsc {
        id: u64,
        term: Option<TermId>,
        pos: Point,
        name: String,
        quadrant: Quadrant,
    },
    /// Stretch fence with corner handles.
    Fence {
        id: u64,
        bbox: BBox,
        mode: DisplayMode,
    },
    Plot {
        id: u64,
        pos: Point,
        index: u32,
    },
}

impl Mark {
    pub fn kind(&self) -> MarkKind {
        match self {
            Mark::Cross { .. } => MarkKind::Cross,
            Mark::Box { .. } => MarkKind::Box,
            Mark::Arrow { .. } => MarkKind::Arrow,
            Mark::Eterm { .. } => MarkKind::Eterm,
            Mark::Pterm { .. } => MarkKind::Pterm,
            Mark::Ilab { .. } => MarkKind::Ilab,
            Mark::Bsc { .. } => MarkKind::Bsc,
            Mark::Fence { .. } => MarkKind::Fence,
            Mark::Plot { .. } => MarkKind::Plot,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        match self {
            Mark::Cross { mode, .. }
            | Mark::Box { mode, .. }
            | Mark::Arrow { mode, .. }
            | Mark::Ilab { mode, .. }
            | Mark::Fence { mode, .. } => *mode,
            Mark::Eterm { .. } | Mark::Bsc { .. } | Mark::Plot { .. } => DisplayMode::Electrical,
            Mark::Pterm { .. } => DisplayMode::Physical,
        }
    }

    /// Anchor point of point-like marks.
    pub fn position(&self) -> Option<Point> {
        match self {
            Mark::Cross { pos, .. }
            | Mark::Eterm { pos, .. }
            | Mark::Pterm { pos, .. }
            | Mark::Bsc { pos, .. }
            | Mark::Plot { pos, .. } => Some(*pos),
            Mark::Arrow { from, .. } => Some(*from),
            Mark::Box { .. } | Mark::Ilab { .. } | Mark::Fence { .. } => None,
        }
    }

    pub fn quadrant(&self) -> Option<Quadrant> {
        match self {
            Mark::Eterm { quadrant, .. } | Mark::Pterm { quadrant, .. } | Mark::Bsc { quadrant, .. } => {
                Some(*quadrant)
            }
            _ => None,
        }
    }

    fn set_quadrant(&mut self, q: Quadrant) {
        if let Mark::Eterm { quadrant, .. } | Mark::Pterm { quadrant, .. } | Mark::Bsc { quadrant, .. } =
            self
        {
            *quadrant = q;
        }
    }

    pub fn terminal(&self) -> Option<TermId> {
        match self {
            Mark::Eterm { term, .. } | Mark::Pterm { term, .. } => Some(*term),
            Mark::Bsc { term, .. } => *term,
            _ => None,
        }
    }

    pub fn instance(&self) -> Option<InstId> {
        match self {
            Mark::Ilab { inst, .. } => Some(*inst),
            _ => None,
        }
    }

    /// Erase identity. Crosses match on position and mode, terminals on
    /// their terminal, instance labels on their instance, and bus
    /// connectors, fences and plot marks on id.
    pub fn matches(&self, other: &Mark) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        match (self, other) {
            (Mark::Eterm { term: a, .. }, Mark::Eterm { term: b, .. })
            | (Mark::Pterm { term: a, .. }, Mark::Pterm { term: b, .. }) => a == b,
            (Mark::Bsc { id: a, term: ta, .. }, Mark::Bsc { id: b, term: tb, .. }) => {
                a == b && ta == tb
            }
            (Mark::Ilab { inst: a, .. }, Mark::Ilab { inst: b, .. }) => a == b,
            (Mark::Fence { id: a, .. }, Mark::Fence { id: b, .. }) => a == b,
            (Mark::Plot { id: a, .. }, Mark::Plot { id: b, .. }) => a == b,
            (Mark::Box { bbox: a, mode: ma, .. }, Mark::Box { bbox: b, mode: mb, .. }) => {
                a == b && ma == mb
            }
            (Mark::Arrow { from: a, to: at, mode: ma }, Mark::Arrow { from: b, to: bt, mode: mb }) => {
                a == b && at == bt && ma == mb
            }
            _ => self.position() == other.position() && self.mode() == other.mode(),
        }
    }

    /// Pixel area covered when drawn in `map`, including labels.
    pub fn pixel_bbox(&self, map: &CoordMap, size: i32, backend: &dyn Backend) -> PixRect {
        let pt = |p: Point| map.window_to_pixel(p);
        let around = |p: PixPoint, d: i32| PixRect::new(p.x - d, p.y - d, p.x + d, p.y + d);
        match self {
            Mark::Cross { pos, .. } | Mark::Plot { pos, .. } => {
                let r = around(pt(*pos), size);
                match self {
                    Mark::Plot { index, .. } => {
                        let style = TextStyle::new(size * 2);
                        let (w, h) = backend.text_extent(&index.to_string(), &style);
                        r.union(&PixRect::new(r.right, r.top - h, r.right + w, r.top))
                    }
                    _ => r,
                }
            }
            Mark::Box { bbox, .. } => map.bbox_to_pixel(bbox).bloat(1),
            Mark::Fence { bbox, .. } => map.bbox_to_pixel(bbox).bloat(size / 2 + 1),
            Mark::Arrow { from, to, .. } => {
                let (a, b) = (pt(*from), pt(*to));
                PixRect::new(a.x, a.y, b.x, b.y).bloat(size)
            }
            Mark::Ilab { bbox, label, .. } => {
                let r = map.bbox_to_pixel(bbox);
                let style = TextStyle::new(size * 2).centered();
                let (w, h) = backend.text_extent(label, &style);
                let cx = (r.left + r.right) / 2;
                let cy = (r.top + r.bottom) / 2;
                r.union(&PixRect::new(cx - w / 2, cy - h / 2, cx + w / 2, cy + h / 2))
                    .bloat(1)
            }
            Mark::Eterm { pos, name, quadrant, .. }
            | Mark::Pterm { pos, name, quadrant, .. }
            | Mark::Bsc { pos, name, quadrant, .. } => {
                let p = pt(*pos);
                let r = around(p, size / 2);
                r.union(&label_rect(p, name, *quadrant, size, backend))
            }
        }
    }

    /// Paint the mark.
    pub fn show(&self, ctx: &mut MarkContext<'_>) {
        let size = ctx.size;
        let map = ctx.map;
        let pt = |p: Point| map.window_to_pixel(p);
        match self {
            Mark::Cross { pos, .. } => {
                let p = pt(*pos);
                ctx.color(DisplayColor::Marker);
                ctx.line(p.x - size, p.y - size, p.x + size, p.y + size);
                ctx.line(p.x - size, p.y + size, p.x + size, p.y - size);
            }
            Mark::Box { bbox, selected, .. } => {
                let r = map.bbox_to_pixel(bbox);
                if *selected && ctx.backend.dual_plane() {
                    ctx.cache.flush(ctx.backend);
                    ctx.backend.set_ghost(true);
                    let c = ctx.colors.get(ctx.mode, DisplayColor::Ghost);
                    ctx.cache.set_color(ctx.backend, c);
                    ctx.cache.add_outline(ctx.backend, r);
                    ctx.cache.flush(ctx.backend);
                    ctx.backend.set_ghost(false);
                } else {
                    ctx.color(if *selected {
                        DisplayColor::Select
                    } else {
                        DisplayColor::Highlighting
                    });
                    ctx.cache.add_outline(ctx.backend, r);
                }
            }
            Mark::Arrow { from, to, .. } => {
                let (a, b) = (pt(*from), pt(*to));
                ctx.color(DisplayColor::Marker);
                ctx.line(a.x, a.y, b.x, b.y);
                let (dx, dy) = ((a.x - b.x) as f64, (a.y - b.y) as f64);
                let len = (dx * dx + dy * dy).sqrt();
                if len >= 1.0 {
                    let (ux, uy) = (dx / len, dy / len);
                    let s = size as f64;
                    for sign in [-1.0, 1.0] {
                        // head barbs at +-30 degrees from the shaft
                        let (c, sn) = (0.866, 0.5 * sign);
                        let hx = (ux * c - uy * sn) * s;
                        let hy = (ux * sn + uy * c) * s;
                        ctx.line(b.x, b.y, b.x + hx.round() as i32, b.y + hy.round() as i32);
                    }
                }
            }
            Mark::Eterm { pos, name, quadrant, .. } | Mark::Pterm { pos, name, quadrant, .. } => {
                let p = pt(*pos);
                let d = (size / 2).max(1);
                ctx.color(DisplayColor::Terminal);
                ctx.cache
                    .add_outline(ctx.backend, PixRect::new(p.x - d, p.y - d, p.x + d, p.y + d));
                ctx.label(p, name, *quadrant);
            }
            Mark::Bsc { pos, name, quadrant, .. } => {
                let p = pt(*pos);
                let d = (size / 2).max(1);
                ctx.color(DisplayColor::Terminal);
                let diamond = [
                    PixPoint::new(p.x, p.y - d),
                    PixPoint::new(p.x + d, p.y),
                    PixPoint::new(p.x, p.y + d),
                    PixPoint::new(p.x - d, p.y),
                ];
                for i in 0..4 {
                    let (a, b) = (diamond[i], diamond[(i + 1) % 4]);
                    ctx.line(a.x, a.y, b.x, b.y);
                }
                ctx.label(p, name, *quadrant);
            }
            Mark::Ilab { bbox, label, .. } => {
                let r = map.bbox_to_pixel(bbox);
                ctx.color(DisplayColor::Highlighting);
                ctx.cache.add_outline(ctx.backend, r);
                ctx.text(
                    label,
                    (r.left + r.right) / 2,
                    (r.top + r.bottom) / 2,
                    &TextStyle::new(size * 2).centered(),
                );
            }
            Mark::Fence { bbox, .. } => {
                let r = map.bbox_to_pixel(bbox);
                ctx.color(DisplayColor::Marker);
                ctx.cache.set_line_style(ctx.backend, Some(LineStyle::new(0b1100_1100)));
                ctx.cache.add_outline(ctx.backend, r);
                ctx.cache.set_line_style(ctx.backend, None);
                let h = (size / 2).max(1);
                for (x, y) in [(r.left, r.top), (r.right, r.top), (r.left, r.bottom), (r.right, r.bottom)] {
                    ctx.cache
                        .add_solid_box(ctx.backend, PixRect::new(x - h, y - h, x + h, y + h));
                }
            }
            Mark::Plot { pos, index, .. } => {
                let p = pt(*pos);
                ctx.color(DisplayColor::Plot);
                ctx.line(p.x - size, p.y, p.x + size, p.y);
                ctx.line(p.x, p.y - size, p.x, p.y + size);
                let r = PixRect::new(p.x - size, p.y - size, p.x + size, p.y + size);
                ctx.text(&index.to_string(), r.right, r.top, &TextStyle::new(size * 2));
            }
        }
    }
}

fn label_rect(p: PixPoint, name: &str, q: Quadrant, size: i32, backend: &dyn Backend) -> PixRect {
    let style = TextStyle::new(size * 2);
    let (w, h) = backend.text_extent(name, &style);
    let (sx, sy) = q.signs();
    let gap = size / 2 + 1;
    let x0 = p.x + sx * gap;
    let y0 = p.y + sy * gap;
    PixRect::new(x0, y0, x0 + sx * w, y0 + sy * h)
}

/// Drawing state for marks in one window.
pub struct MarkContext<'a> {
    pub map: &'a CoordMap,
    pub cache: &'a mut DrawCache,
    pub backend: &'a mut dyn Backend,
    pub colors: &'a ColorTable,
    pub mode: DisplayMode,
    pub size: i32,
}

impl MarkContext<'_> {
    pub fn color(&mut self, c: DisplayColor) {
        let color = self.colors.get(self.mode, c);
        self.set_color(color);
    }

    pub fn set_color(&mut self, color: Color32) {
        self.cache.set_color(self.backend, color);
    }

    pub fn line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        self.cache.add_line(self.backend, PixSeg::new(x1, y1, x2, y2));
    }

    pub fn fill(&mut self, fill: Option<&FillPattern>) {
        self.cache.set_fill(self.backend, fill);
    }

    pub fn text(&mut self, text: &str, x: i32, y: i32, style: &TextStyle) {
        self.cache.flush(self.backend);
        self.backend.draw_text(text, x, y, style);
    }

    /// Terminal name placed in its quadrant, anchored at its lower-left
    /// corner.
    fn label(&mut self, p: PixPoint, name: &str, q: Quadrant) {
        if name.is_empty() {
            return;
        }
        let r = label_rect(p, name, q, self.size, self.backend);
        self.text(name, r.left, r.bottom, &TextStyle::new(self.size * 2));
    }
}

/// Every mark currently shown, one list per kind.
#[derive(Debug, Default, Clone)]
pub struct MarkRegistry {
    lists: [Vec<Mark>; 9],
    erase_behind: bool,
}

impl MarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_erase_behind(&mut self, on: bool) {
        self.erase_behind = on;
    }

    pub fn erase_behind(&self) -> bool {
        self.erase_behind
    }

    pub fn list(&self, kind: MarkKind) -> &[Mark] {
        &self.lists[kind.slot()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mark> {
        self.lists.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    /// Register a mark. Terminal marks landing on a point that already
    /// carries marks of the same kind and mode get the next quadrant.
    pub fn add(&mut self, mut mark: Mark) -> &Mark {
        let kind = mark.kind();
        if kind.is_terminal() {
            let pos = mark.position();
            let mode = mark.mode();
            let count = self.lists[kind.slot()]
                .iter()
                .filter(|m| m.position() == pos && m.mode() == mode)
                .count();
            mark.set_quadrant(Quadrant::from_count(count));
        }
        let list = &mut self.lists[kind.slot()];
        list.push(mark);
        &list[list.len() - 1]
    }

    /// Remove every mark matching `mark`, returning them so their areas
    /// can be redisplayed.
    pub fn remove(&mut self, mark: &Mark) -> Vec<Mark> {
        self.remove_where(mark.kind(), |m| m.matches(mark))
    }

    pub fn remove_where(&mut self, kind: MarkKind, mut pred: impl FnMut(&Mark) -> bool) -> Vec<Mark> {
        let list = &mut self.lists[kind.slot()];
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(list.len());
        for m in list.drain(..) {
            if pred(&m) {
                removed.push(m);
            } else {
                kept.push(m);
            }
        }
        *list = kept;
        removed
    }

    pub fn clear_kind(&mut self, kind: MarkKind) -> Vec<Mark> {
        std::mem::take(&mut self.lists[kind.slot()])
    }

    pub fn clear(&mut self) -> Vec<Mark> {
        self.lists.iter_mut().flat_map(std::mem::take).collect()
    }

    /// Drop marks attached to a terminal that no longer exists.
    pub fn purge_terminal(&mut self, term: TermId) -> Vec<Mark> {
        let mut removed = Vec::new();
        for kind in [MarkKind::Eterm, MarkKind::Pterm, MarkKind::Bsc] {
            removed.extend(self.remove_where(kind, |m| m.terminal() == Some(term)));
        }
        removed
    }

    pub fn purge_instance(&mut self, inst: InstId) -> Vec<Mark> {
        self.remove_where(MarkKind::Ilab, |m| m.instance() == Some(inst))
    }

    /// Paint all marks of the context's mode overlapping `area`. With
    /// erase-behind on, the areas under terminal marks are cleared to the
    /// background first.
    pub fn show_all(&self, ctx: &mut MarkContext<'_>, area: &PixRect) {
        let mode = ctx.mode;
        let visible = move |m: &&Mark| m.mode() == mode;
        if self.erase_behind {
            let mut behind = AreaList::new();
            for kind in MarkKind::ALL.into_iter().filter(|k| k.is_terminal()) {
                for m in self.list(kind).iter().filter(visible) {
                    let r = m.pixel_bbox(ctx.map, ctx.size, ctx.backend);
                    if let Some(r) = r.intersection(area) {
                        behind.add(r);
                    }
                }
            }
            if !behind.is_empty() {
                ctx.color(DisplayColor::Background);
                for r in behind.rects() {
                    ctx.cache.add_solid_box(ctx.backend, *r);
                }
            }
        }
        for kind in MarkKind::ALL {
            for m in self.list(kind).iter().filter(visible) {
                if m.pixel_bbox(ctx.map, ctx.size, ctx.backend).intersects(area) {
                    m.show(ctx);
                }
            }
        }
        ctx.cache.flush(ctx.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawList, DrawOp};

    fn eterm(id: u64, pos: Point) -> Mark {
        Mark::Eterm {
            term: TermId(id),
            pos,
            name: format!("t{id}"),
            quadrant: Quadrant::default(),
        }
    }

    #[test]
    fn test_quadrant_order() {
        let mut reg = MarkRegistry::new();
        let p = Point::new(100, 100);
        let quads: Vec<_> = (0..5)
            .map(|i| reg.add(eterm(i, p)).quadrant().unwrap())
            .collect();
        assert_eq!(
            quads,
            vec![
                Quadrant::UpperRight,
                Quadrant::UpperLeft,
                Quadrant::LowerRight,
                Quadrant::LowerLeft,
                Quadrant::UpperRight,
            ]
        );
        // another point starts over
        assert_eq!(reg.add(eterm(9, Point::new(0, 0))).quadrant(), Some(Quadrant::UpperRight));
    }

    #[test]
    fn test_quadrant_counts_same_kind_only() {
        let mut reg = MarkRegistry::new();
        let p = Point::new(5, 5);
        reg.add(Mark::Pterm {
            term: TermId(1),
            pos: p,
            name: "a".into(),
            quadrant: Quadrant::default(),
        });
        assert_eq!(reg.add(eterm(2, p)).quadrant(), Some(Quadrant::UpperRight));
    }

    #[test]
    fn test_erase_match_uses_identity_per_kind() {
        let a = Mark::Cross {
            pos: Point::new(1, 1),
            mode: DisplayMode::Physical,
        };
        let b = Mark::Cross {
            pos: Point::new(1, 1),
            mode: DisplayMode::Electrical,
        };
        assert!(a.matches(&a.clone()));
        assert!(!a.matches(&b));
        let bsc = Mark::Bsc {
            id: 1,
            term: None,
            pos: Point::new(1, 1),
            name: String::new(),
            quadrant: Quadrant::default(),
        };
        let et = eterm(1, Point::new(1, 1));
        assert!(!bsc.matches(&et));
        assert!(!et.matches(&eterm(2, Point::new(1, 1))));
        // same terminal, moved
        assert!(et.matches(&eterm(1, Point::new(9, 9))));
    }

    #[test]
    fn test_remove_one_of_coincident_terminals() {
        let mut reg = MarkRegistry::new();
        let p = Point::new(50, 50);
        for i in 0..4 {
            reg.add(eterm(i, p));
        }
        let removed = reg.remove(&eterm(2, p));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].terminal(), Some(TermId(2)));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_purge_by_referent() {
        let mut reg = MarkRegistry::new();
        reg.add(eterm(1, Point::new(0, 0)));
        reg.add(eterm(2, Point::new(0, 0)));
        reg.add(Mark::Ilab {
            inst: InstId(7),
            bbox: BBox::new(0, 0, 10, 10),
            label: "x".into(),
            mode: DisplayMode::Physical,
        });
        assert_eq!(reg.purge_terminal(TermId(1)).len(), 1);
        assert_eq!(reg.purge_instance(InstId(7)).len(), 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_selected_box_ghost_or_select_color() {
        let map = CoordMap::new(100, 100, BBox::new(0, 0, 100, 100));
        let colors = ColorTable::default();
        let mark = Mark::Box {
            bbox: BBox::new(10, 10, 20, 20),
            mode: DisplayMode::Physical,
            selected: true,
        };
        for dual in [false, true] {
            let mut be = if dual { DrawList::new().with_dual_plane() } else { DrawList::new() };
            let mut cache = DrawCache::default();
            let mut ctx = MarkContext {
                map: &map,
                cache: &mut cache,
                backend: &mut be,
                colors: &colors,
                mode: DisplayMode::Physical,
                size: 4,
            };
            mark.show(&mut ctx);
            ctx.cache.flush(ctx.backend);
            let ghosted = be.ops.contains(&DrawOp::Ghost(true));
            assert_eq!(ghosted, dual);
            let select = colors.get(DisplayMode::Physical, DisplayColor::Select);
            assert_eq!(be.lines_with_color(select).len(), if dual { 0 } else { 4 });
        }
    }

    #[test]
    fn test_erase_behind_clears_first() {
        let map = CoordMap::new(200, 200, BBox::new(0, 0, 200, 200));
        let colors = ColorTable::default();
        let mut reg = MarkRegistry::new();
        reg.set_erase_behind(true);
        reg.add(eterm(1, Point::new(100, 100)));
        reg.add(eterm(2, Point::new(100, 100)));
        let mut be = DrawList::new();
        let mut cache = DrawCache::default();
        let mut ctx = MarkContext {
            map: &map,
            cache: &mut cache,
            backend: &mut be,
            colors: &colors,
            mode: DisplayMode::Electrical,
            size: 4,
        };
        reg.show_all(&mut ctx, &map.viewport());
        let bg = colors.get(DisplayMode::Electrical, DisplayColor::Background);
        let first_box = be.ops.iter().position(|op| matches!(op, DrawOp::Box { color, .. } if *color == bg));
        let first_line = be.ops.iter().position(|op| matches!(op, DrawOp::Line { .. }));
        assert!(first_box.is_some());
        assert!(first_box < first_line);
        assert_eq!(be.texts().len(), 2);
    }
}
