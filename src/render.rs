// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Hierarchy traversal.
//!
//! A [`RenderPass`] walks the displayed source inside an area of interest
//! and feeds primitives to the draw cache. On ordinary backends it makes
//! one traversal per visible layer followed by a structure traversal for
//! instance outlines and labels. On leveled backends it makes a single
//! traversal and tags every write with a priority level instead; both
//! orders give the same raster.

use egui::Color32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::attrib::{DspAttrib, InstLabels, LabelDisplay};
use crate::backend::{Backend, PixPoint, PixRect, PixSeg, TextStyle};
use crate::cache::DrawCache;
use crate::color::{ColorTable, DarkPalette, DisplayColor};
use crate::config::DisplayConfig;
use crate::db::{
    CellDesc, CellId, Database, DisplayMode, DisplaySource, InstanceDesc, LayerBox,
    LayerGeometry, LayerId, Shape, SourceKind,
};
use crate::geom::{to_microns, BBox, Orient, Transform, TransformStack};
use crate::mapper::CoordMap;

/// Level used for overlays that must land on top of everything.
pub const TOP_LEVEL: u32 = u32::MAX;

/// Shared interrupt flag, polled by traversals at a fixed object cadence.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Editing inside a sub-cell of `top`: `top_to_cell` maps the edited
/// cell's coordinates into `top`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextView {
    pub top: CellId,
    pub top_to_cell: Transform,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// Shapes and instances visited.
    pub objects: usize,
    /// Array elements descended into.
    pub elements: usize,
    pub interrupted: bool,
    pub depth_overflow: bool,
}

/// Everything a pass reads but never changes.
#[derive(Clone, Copy)]
pub struct RenderInput<'a> {
    pub source: &'a DisplaySource,
    pub map: &'a CoordMap,
    pub attrib: &'a DspAttrib,
    pub mode: DisplayMode,
    pub colors: &'a ColorTable,
    pub config: &'a DisplayConfig,
    /// Index of the window, for per-window expansion flags.
    pub window: usize,
    pub context: Option<&'a ContextView>,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Layer(LayerId),
    Structure,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Interrupted,
    Overflow,
}

type Flow = std::result::Result<(), Stop>;

pub struct RenderPass<'a> {
    input: RenderInput<'a>,
    cache: &'a mut DrawCache,
    backend: &'a mut dyn Backend,
    stack: TransformStack,
    phase: Phase,
    palette: Option<DarkPalette>,
    level_base: u32,
    cur_level: Option<u32>,
    aoi: BBox,
    stats: RenderStats,
}

impl<'a> RenderPass<'a> {
    pub fn new(input: RenderInput<'a>, cache: &'a mut DrawCache, backend: &'a mut dyn Backend) -> Self {
        let max_depth = input.config.max_depth;
        Self {
            input,
            cache,
            backend,
            stack: TransformStack::with_base(Transform::identity(), max_depth),
            phase: Phase::All,
            palette: None,
            level_base: 0,
            cur_level: None,
            aoi: BBox::default(),
            stats: RenderStats::default(),
        }
    }

    /// Draw everything of the source overlapping `aoi`. An interrupt or a
    /// depth overflow ends the traversal early; what was drawn stays.
    pub fn run(mut self, aoi: BBox) -> RenderStats {
        self.aoi = aoi;
        match self.render_source() {
            Ok(()) => {}
            Err(Stop::Interrupted) => {
                self.stats.interrupted = true;
                log::warn!("[RENDER] interrupted after {} objects", self.stats.objects);
            }
            Err(Stop::Overflow) => {
                self.stats.depth_overflow = true;
                log::warn!("[RENDER] transform depth overflow in {}", self.input.source.name());
            }
        }
        self.cache.flush(self.backend);
        log::debug!(
            "[RENDER] {} area {}: {} objects, {} elements",
            self.input.source.name(),
            aoi,
            self.stats.objects,
            self.stats.elements
        );
        self.stats
    }

    fn layer_count(&self) -> u32 {
        self.input.source.db.layers().len() as u32
    }

    fn render_source(&mut self) -> Flow {
        let source: &'a DisplaySource = self.input.source;
        let db: &'a Database = &source.db;
        match &source.kind {
            SourceKind::Cell(id) => {
                let Some(cell) = db.cell(*id) else {
                    return Ok(());
                };
                let context = self
                    .input
                    .context
                    .filter(|_| self.input.attrib.context)
                    .and_then(|ctx| db.cell(ctx.top).map(|top| (ctx, top)))
                    .filter(|(_, top)| !std::ptr::eq(*top, cell));
                if let Some((ctx, top)) = context {
                    let colors = self.input.colors.mode(self.input.mode);
                    self.palette = Some(DarkPalette::new(
                        db.layers(),
                        colors,
                        self.input.config.context_darkening,
                    ));
                    self.stack = TransformStack::with_base(
                        ctx.top_to_cell.inverse(),
                        self.input.config.max_depth,
                    );
                    self.passes(|pass| pass.draw_cell(db, top, 0))?;
                    self.palette = None;
                    self.level_base = self.layer_count() + 2;
                    self.stack = TransformStack::with_base(
                        Transform::identity(),
                        self.input.config.max_depth,
                    );
                }
                self.passes(|pass| pass.draw_cell(db, cell, 0))
            }
            SourceKind::Digest(digest) => self.passes(|pass| pass.draw_flat(&digest.layers)),
            SourceKind::Boxes(list) => self.passes(|pass| pass.draw_boxes(list)),
        }
    }

    fn passes(&mut self, mut f: impl FnMut(&mut Self) -> Flow) -> Flow {
        if self.backend.leveled() {
            self.phase = Phase::All;
            return f(self);
        }
        let source: &'a DisplaySource = self.input.source;
        for (i, layer) in source.db.layers().iter().enumerate() {
            if layer.invisible {
                continue;
            }
            self.phase = Phase::Layer(LayerId(i));
            f(self)?;
        }
        self.phase = Phase::Structure;
        f(self)
    }

    fn wants_layer(&self, layer: LayerId) -> bool {
        match self.phase {
            Phase::All => true,
            Phase::Layer(l) => l == layer,
            Phase::Structure => false,
        }
    }

    fn wants_structure(&self) -> bool {
        matches!(self.phase, Phase::All | Phase::Structure)
    }

    fn enter_level(&mut self, level: u32) {
        if self.backend.leveled() && self.cur_level != Some(level) {
            self.cache.flush(self.backend);
            self.backend.set_level(level);
            self.cur_level = Some(level);
        }
    }

    fn enter_structure(&mut self) {
        let level = self.level_base + self.layer_count() + 1;
        self.enter_level(level);
    }

    fn tick(&mut self) -> Flow {
        self.stats.objects += 1;
        let cadence = self.input.config.interrupt_cadence.max(1);
        if self.stats.objects % cadence == 0 && self.input.cancel.is_cancelled() {
            return Err(Stop::Interrupted);
        }
        Ok(())
    }

    fn color(&self, c: DisplayColor) -> Color32 {
        match (&self.palette, c) {
            (Some(p), DisplayColor::InstanceBB) => p.instance_bb(),
            _ => self.input.colors.get(self.input.mode, c),
        }
    }

    /// Pixels of `bb`, given in top-level coordinates, after trimming it
    /// to the area of interest plus a two pixel margin. Trimmed edges
    /// land outside the clip, so outlines look the same.
    fn trimmed_pixels(&self, bb: &BBox) -> Option<PixRect> {
        let map = self.input.map;
        let margin = map.to_window(2);
        bb.intersection(&self.aoi.bloat(margin))
            .map(|b| map.bbox_to_pixel(&b))
    }

    /// Area of interest in the coordinates of the cell on top of the stack.
    fn local_aoi(&self) -> BBox {
        self.stack.current().inverse().apply_bbox(&self.aoi)
    }

    fn layer_visible(&self, db: &Database, layer: LayerId, hierlev: u32) -> bool {
        match db.layer(layer) {
            Some(l) => {
                !l.invisible
                    && !(self.input.mode == DisplayMode::Electrical && l.no_inst_view && hierlev > 0)
            }
            None => false,
        }
    }

    fn draw_cell(&mut self, db: &'a Database, cell: &'a CellDesc, hierlev: u32) -> Flow {
        let local = self.local_aoi();
        self.draw_geometry(db, &cell.geometry, &local, hierlev)?;
        for inst in &cell.instances {
            self.draw_instance(db, inst, &local, hierlev)?;
        }
        Ok(())
    }

    fn draw_geometry(
        &mut self,
        db: &Database,
        geometry: &[LayerGeometry],
        local: &BBox,
        hierlev: u32,
    ) -> Flow {
        for g in geometry {
            if !self.wants_layer(g.layer) || !self.layer_visible(db, g.layer, hierlev) {
                continue;
            }
            for shape in &g.shapes {
                if !shape.bbox().intersects(local, true) {
                    continue;
                }
                self.tick()?;
                self.draw_shape(db, g.layer, shape, hierlev);
            }
        }
        Ok(())
    }

    fn draw_flat(&mut self, layers: &[LayerGeometry]) -> Flow {
        let db: &'a Database = &self.input.source.db;
        let aoi = self.aoi;
        self.draw_geometry(db, layers, &aoi, 0)
    }

    fn draw_boxes(&mut self, list: &[LayerBox]) -> Flow {
        let db: &'a Database = &self.input.source.db;
        for lb in list {
            if !self.wants_layer(lb.layer)
                || !self.layer_visible(db, lb.layer, 0)
                || !lb.bbox.intersects(&self.aoi, true)
            {
                continue;
            }
            self.tick()?;
            self.draw_shape(db, lb.layer, &Shape::Box(lb.bbox), 0);
        }
        Ok(())
    }

    fn set_layer_state(&mut self, db: &Database, layer: LayerId) -> Option<(bool, bool)> {
        let desc = db.layer(layer)?;
        let color = self
            .palette
            .as_ref()
            .and_then(|p| p.layer(layer.0))
            .unwrap_or(desc.color);
        self.enter_level(self.level_base + layer.0 as u32 + 1);
        self.cache.set_color(self.backend, color);
        self.cache.set_line_style(self.backend, None);
        if desc.filled {
            self.cache.set_fill(self.backend, desc.fill.as_ref());
        }
        Some((desc.filled, desc.outlined || !desc.filled))
    }

    fn draw_shape(&mut self, db: &Database, layer: LayerId, shape: &Shape, hierlev: u32) {
        let show = self.input.attrib.show;
        let visible = match shape {
            Shape::Box(_) => show.boxes,
            Shape::Poly(_) => show.polys,
            Shape::Wire { .. } => show.wires,
            Shape::Label { .. } => {
                show.labels
                    && match self.input.attrib.labels {
                        LabelDisplay::Off => false,
                        LabelDisplay::TopOnly => hierlev == 0,
                        LabelDisplay::All => true,
                    }
            }
        };
        if !visible {
            return;
        }
        let Some((filled, outlined)) = self.set_layer_state(db, layer) else {
            return;
        };
        let tf = self.stack.current();
        let map = self.input.map;
        match shape {
            Shape::Box(bb) => {
                let Some(r) = self.trimmed_pixels(&tf.apply_bbox(bb)) else {
                    return;
                };
                if filled {
                    self.cache.add_box(self.backend, r);
                }
                if outlined {
                    self.cache.add_outline(self.backend, r);
                }
            }
            Shape::Poly(points) => {
                let pts: Vec<PixPoint> = points
                    .iter()
                    .map(|p| map.window_to_pixel(tf.apply(*p)))
                    .collect();
                if filled {
                    self.cache.add_polygon(self.backend, &pts);
                }
                if outlined {
                    self.add_closed(&pts);
                }
            }
            Shape::Wire { points, width } => {
                let pts: Vec<PixPoint> = points
                    .iter()
                    .map(|p| map.window_to_pixel(tf.apply(*p)))
                    .collect();
                let half = map.to_pixels((*width as f64 * tf.mag).round() as i32) / 2.0;
                self.draw_wire(&pts, half, filled);
            }
            Shape::Label {
                text,
                pos,
                height,
                orient,
            } => {
                let h = map.to_pixels((*height as f64 * tf.mag).round() as i32).round() as i32;
                if h < 1 {
                    return;
                }
                let p = map.window_to_pixel(tf.apply(*pos));
                let o = tf.compose(&Transform::new(*orient, 1.0, 0, 0)).orient;
                let style = TextStyle::new(h).vertical(o.is_rotated90());
                self.cache.flush(self.backend);
                self.backend.draw_text(text, p.x, p.y, &style);
            }
        }
    }

    fn add_closed(&mut self, pts: &[PixPoint]) {
        for (i, a) in pts.iter().enumerate() {
            let b = pts[(i + 1) % pts.len()];
            self.cache.add_line(self.backend, PixSeg::new(a.x, a.y, b.x, b.y));
        }
    }

    /// Thin wires draw as their center line, wide ones as one box or
    /// quadrilateral per segment.
    fn draw_wire(&mut self, pts: &[PixPoint], half: f64, filled: bool) {
        if pts.len() == 1 {
            self.cache.add_pixel(self.backend, pts[0]);
            return;
        }
        for w in pts.windows(2) {
            let (a, b) = (w[0], w[1]);
            if half < 1.0 {
                self.cache.add_line(self.backend, PixSeg::new(a.x, a.y, b.x, b.y));
                continue;
            }
            let hw = half.round() as i32;
            if a.x == b.x || a.y == b.y {
                let r = PixRect::new(a.x, a.y, b.x, b.y).bloat(hw);
                if filled {
                    self.cache.add_box(self.backend, r);
                } else {
                    self.cache.add_outline(self.backend, r);
                }
                continue;
            }
            let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
            let len = (dx * dx + dy * dy).sqrt();
            let (nx, ny) = ((-dy / len * half).round() as i32, (dx / len * half).round() as i32);
            let quad = [
                PixPoint::new(a.x + nx, a.y + ny),
                PixPoint::new(b.x + nx, b.y + ny),
                PixPoint::new(b.x - nx, b.y - ny),
                PixPoint::new(a.x - nx, a.y - ny),
            ];
            if filled {
                self.cache.add_polygon(self.backend, &quad);
            } else {
                self.add_closed(&quad);
            }
        }
    }

    fn draw_instance(
        &mut self,
        db: &'a Database,
        inst: &'a InstanceDesc,
        local: &BBox,
        hierlev: u32,
    ) -> Flow {
        let inst_bb = db.instance_bbox(inst);
        if !inst_bb.intersects(local, true) {
            return Ok(());
        }
        let Some(master) = db.cell(inst.master) else {
            return Ok(());
        };
        self.tick()?;
        let footprint = self.stack.apply_bbox(&inst_bb);
        let pix = self.input.map.bbox_to_pixel(&footprint);
        let config = self.input.config;
        let attrib = self.input.attrib;

        if master.is_empty() {
            if !config.suppress_unexpand && self.wants_structure() {
                self.draw_empty_marker(&pix);
            }
            return Ok(());
        }

        let min = config.min_cell_pixels;
        if pix.width() < min && pix.height() < min {
            if attrib.tiny_bb && self.wants_structure() {
                self.enter_structure();
                self.cache.set_line_style(self.backend, None);
                let c = self.color(DisplayColor::InstanceBB);
                self.cache.set_color(self.backend, c);
                if let Some(r) = self.trimmed_pixels(&footprint) {
                    self.cache.add_outline(self.backend, r);
                }
            }
            return Ok(());
        }

        let symbolic = if self.input.mode == DisplayMode::Electrical && attrib.symbolic {
            master.symbolic.as_ref()
        } else {
            None
        };
        let expand = master.device
            || symbolic.is_some()
            || attrib.expansion(self.input.mode).permits(hierlev)
            || inst.expanded_in(self.input.window);
        if !expand {
            if !config.suppress_unexpand && self.wants_structure() {
                self.draw_unexpanded(inst, master, &footprint, &pix);
            }
            return Ok(());
        }

        let Some(range) = db.array_range(inst, local) else {
            return Ok(());
        };
        for iy in range.y1..=range.y2 {
            for ix in range.x1..=range.x2 {
                self.stats.elements += 1;
                let etf = Database::element_transform(inst, ix, iy);
                self.stack.push(&etf).map_err(|_| Stop::Overflow)?;
                let flow = match symbolic {
                    Some(_) => self.draw_symbolic(db, master, hierlev + 1),
                    None => self.draw_cell(db, master, hierlev + 1),
                };
                self.stack.pop();
                flow?;
            }
        }
        Ok(())
    }

    fn draw_empty_marker(&mut self, pix: &PixRect) {
        self.enter_structure();
        let d = self.input.config.empty_marker_size.max(1);
        let cx = (pix.left + pix.right) / 2;
        let cy = (pix.top + pix.bottom) / 2;
        self.cache.set_line_style(self.backend, None);
        let c = self.color(DisplayColor::Marker);
        self.cache.set_color(self.backend, c);
        let corners = [
            PixPoint::new(cx, cy - d),
            PixPoint::new(cx + d, cy),
            PixPoint::new(cx, cy + d),
            PixPoint::new(cx - d, cy),
        ];
        self.add_closed(&corners);
    }

    /// Outline plus a name (and optionally size) label sized to fit the
    /// footprint, turned vertical for tall instances.
    fn draw_unexpanded(
        &mut self,
        inst: &InstanceDesc,
        master: &CellDesc,
        footprint: &BBox,
        pix: &PixRect,
    ) {
        self.enter_structure();
        self.cache.set_line_style(self.backend, None);
        let c = self.color(DisplayColor::InstanceBB);
        self.cache.set_color(self.backend, c);
        if let Some(r) = self.trimmed_pixels(footprint) {
            self.cache.add_outline(self.backend, r);
        }

        if self.input.attrib.inst_labels == InstLabels::Off {
            return;
        }
        let mut lines: Vec<(String, DisplayColor)> = Vec::new();
        let name = inst.name.as_deref().unwrap_or(&master.name);
        lines.push((name.to_string(), DisplayColor::InstanceName));
        if self.input.attrib.inst_labels == InstLabels::NameAndSize {
            let bb = master.bbox();
            lines.push((
                format!("{}x{}", to_microns(bb.width()), to_microns(bb.height())),
                DisplayColor::InstanceSize,
            ));
        }

        let vertical = pix.height() > pix.width();
        let (long, short) = if vertical {
            (pix.height(), pix.width())
        } else {
            (pix.width(), pix.height())
        };
        let n = lines.len() as i32;
        let chars = lines
            .iter()
            .map(|(l, _)| l.chars().count() as i32)
            .max()
            .unwrap_or(1)
            .max(1);
        let h = (short * 2 / (3 * n)).min(long * 4 / (3 * chars)).min(48);
        if h < self.input.config.label_min_pixels {
            return;
        }
        let cx = (pix.left + pix.right) / 2;
        let cy = (pix.top + pix.bottom) / 2;
        let step = h * 6 / 5;
        let style = TextStyle::new(h).centered().vertical(vertical);
        for (i, (text, color)) in lines.iter().enumerate() {
            let off = (2 * i as i32 - (n - 1)) * step / 2;
            let (x, y) = if vertical { (cx + off, cy) } else { (cx, cy + off) };
            let c = self.color(*color);
            self.cache.set_color(self.backend, c);
            self.cache.flush(self.backend);
            self.backend.draw_text(text, x, y, &style);
        }
    }

    /// Symbol body and pins, plus a scaled preview of the real cell once
    /// the symbol is large enough on screen.
    fn draw_symbolic(&mut self, db: &'a Database, master: &'a CellDesc, hierlev: u32) -> Flow {
        let Some(symbol) = master.symbolic.as_ref() else {
            return Ok(());
        };
        let local = self.local_aoi();
        self.draw_geometry(db, &symbol.geometry, &local, hierlev)?;

        let tf = self.stack.current();
        let map = self.input.map;
        if self.wants_structure() {
            self.enter_structure();
            self.cache.set_line_style(self.backend, None);
            let c = self.color(DisplayColor::Terminal);
            self.cache.set_color(self.backend, c);
            for pin in &symbol.pins {
                let p = map.window_to_pixel(tf.apply(pin.pos));
                self.cache.add_outline(self.backend, PixRect::new(p.x - 1, p.y - 1, p.x + 1, p.y + 1));
            }
        }

        let sym_pix = map.bbox_to_pixel(&tf.apply_bbox(&symbol.bbox));
        if sym_pix.width().max(sym_pix.height()) < self.input.config.symbolic_preview_pixels {
            return Ok(());
        }
        let Some(preview) = preview_transform(&master.bbox(), &symbol.bbox) else {
            return Ok(());
        };
        self.stack.push(&preview).map_err(|_| Stop::Overflow)?;
        let local = self.local_aoi();
        let flow = self.draw_geometry(db, &master.geometry, &local, hierlev);
        self.stack.pop();
        flow?;

        if self.wants_structure() {
            self.enter_structure();
            self.cache.set_line_style(self.backend, None);
            let c = self.color(DisplayColor::Terminal);
            self.cache.set_color(self.backend, c);
            for pin in &symbol.pins {
                let Some(term) = master.terminal(pin.term) else {
                    continue;
                };
                let a = map.window_to_pixel(tf.apply(preview.apply(term.pos)));
                let b = map.window_to_pixel(tf.apply(pin.pos));
                self.cache.add_line(self.backend, PixSeg::new(a.x, a.y, b.x, b.y));
            }
        }
        Ok(())
    }
}

/// Uniform scale and translation fitting `body` centered inside 80% of
/// `frame`.
fn preview_transform(body: &BBox, frame: &BBox) -> Option<Transform> {
    if body.width() <= 0 || body.height() <= 0 || frame.width() <= 0 || frame.height() <= 0 {
        return None;
    }
    let mag = 0.8
        * (frame.width() as f64 / body.width() as f64)
            .min(frame.height() as f64 / body.height() as f64);
    let bc = body.center();
    let fc = frame.center();
    let tx = fc.x - (bc.x as f64 * mag).round() as i32;
    let ty = fc.y - (bc.y as f64 * mag).round() as i32;
    Some(Transform::new(Orient::R0, mag, tx, ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DrawList;
    use crate::db::{CellDesc, InstanceDesc, LayerDesc};
    use crate::zimg::LeveledImage;
    use std::rc::Rc;

    struct Scene {
        source: DisplaySource,
        map: CoordMap,
        attrib: DspAttrib,
        colors: ColorTable,
        config: DisplayConfig,
        cancel: CancelToken,
    }

    impl Scene {
        fn new(db: Database, top: CellId, window: BBox, w: i32, h: i32) -> Self {
            Self {
                source: DisplaySource::cell(Rc::new(db), top),
                map: CoordMap::new(w, h, window),
                attrib: DspAttrib::default(),
                colors: ColorTable::default(),
                config: DisplayConfig::default(),
                cancel: CancelToken::new(),
            }
        }

        fn input(&self) -> RenderInput<'_> {
            RenderInput {
                source: &self.source,
                map: &self.map,
                attrib: &self.attrib,
                mode: DisplayMode::Physical,
                colors: &self.colors,
                config: &self.config,
                window: 0,
                context: None,
                cancel: &self.cancel,
            }
        }

        fn render(&self, be: &mut dyn Backend) -> RenderStats {
            let mut cache = DrawCache::default();
            let aoi = self.map.window();
            RenderPass::new(self.input(), &mut cache, be).run(aoi)
        }
    }

    fn single_instance() -> (Database, CellId) {
        let mut db = Database::new();
        let m1 = db.add_layer(LayerDesc::new("M1", Color32::BLUE));
        let leaf = db
            .add_cell(CellDesc::new("leaf", DisplayMode::Physical).with_box(m1, BBox::new(0, 0, 50, 50)))
            .unwrap();
        let top = db
            .add_cell(
                CellDesc::new("top", DisplayMode::Physical)
                    .with_instance(InstanceDesc::new(1, leaf, Transform::translate(100, 100))),
            )
            .unwrap();
        (db, top)
    }

    #[test]
    fn test_expanded_instance_box_lands_flipped() {
        let (db, top) = single_instance();
        let mut scene = Scene::new(db, top, BBox::new(0, 0, 500, 500), 500, 500);
        scene.attrib.set_expand_level(DisplayMode::Physical, -1);
        let mut be = DrawList::new();
        scene.render(&mut be);
        assert_eq!(
            be.boxes_with_color(Color32::BLUE),
            vec![PixRect::new(100, 350, 150, 400)]
        );
        assert_eq!(be.boxes().count(), 1);
    }

    #[test]
    fn test_unexpanded_instance_outline_only() {
        let (db, top) = single_instance();
        let scene = Scene::new(db, top, BBox::new(0, 0, 500, 500), 500, 500);
        let mut be = DrawList::new();
        scene.render(&mut be);
        assert!(be.boxes_with_color(Color32::BLUE).is_empty());
        let bb = scene.colors.get(DisplayMode::Physical, DisplayColor::InstanceBB);
        assert_eq!(be.lines_with_color(bb).len(), 4);
        assert_eq!(be.texts(), vec!["leaf"]);
    }

    #[test]
    fn test_tiny_instance_outline_or_nothing() {
        let (db, top) = single_instance();
        let mut scene = Scene::new(db, top, BBox::new(0, 0, 50_000, 50_000), 100, 100);
        scene.attrib.set_expand_level(DisplayMode::Physical, -1);
        let mut be = DrawList::new();
        scene.render(&mut be);
        assert!(be.boxes().next().is_none());
        assert!(!be.ops.is_empty());

        scene.attrib.tiny_bb = false;
        let mut be = DrawList::new();
        scene.render(&mut be);
        assert!(be.ops.is_empty());
    }

    #[test]
    fn test_empty_cell_diamond() {
        let mut db = Database::new();
        db.add_layer(LayerDesc::new("M1", Color32::BLUE));
        let empty = db.add_cell(CellDesc::new("empty", DisplayMode::Physical)).unwrap();
        let top = db
            .add_cell(
                CellDesc::new("top", DisplayMode::Physical)
                    .with_instance(InstanceDesc::new(1, empty, Transform::translate(50, 50))),
            )
            .unwrap();
        let mut scene = Scene::new(db, top, BBox::new(0, 0, 100, 100), 100, 100);
        let marker = scene.colors.get(DisplayMode::Physical, DisplayColor::Marker);
        let mut be = DrawList::new();
        scene.render(&mut be);
        assert_eq!(be.lines_with_color(marker).len(), 4);

        scene.config.suppress_unexpand = true;
        let mut be = DrawList::new();
        scene.render(&mut be);
        assert!(be.ops.is_empty());
    }

    #[test]
    fn test_depth_overflow_stops() {
        let mut db = Database::new();
        let m1 = db.add_layer(LayerDesc::new("M1", Color32::BLUE));
        let mut prev = db
            .add_cell(CellDesc::new("c0", DisplayMode::Physical).with_box(m1, BBox::new(0, 0, 100, 100)))
            .unwrap();
        for i in 1..10 {
            prev = db
                .add_cell(
                    CellDesc::new(&format!("c{i}"), DisplayMode::Physical)
                        .with_instance(InstanceDesc::new(i, prev, Transform::identity())),
                )
                .unwrap();
        }
        let mut scene = Scene::new(db, prev, BBox::new(0, 0, 100, 100), 100, 100);
        scene.attrib.set_expand_level(DisplayMode::Physical, -1);
        scene.config.max_depth = 4;
        let stats = scene.render(&mut DrawList::new());
        assert!(stats.depth_overflow);

        scene.config.max_depth = 40;
        let stats = scene.render(&mut DrawList::new());
        assert!(!stats.depth_overflow);
    }

    #[test]
    fn test_interrupt_returns_partial_count() {
        let mut db = Database::new();
        let m1 = db.add_layer(LayerDesc::new("M1", Color32::BLUE));
        let mut cell = CellDesc::new("many", DisplayMode::Physical);
        for i in 0..1000 {
            cell.add_shape(m1, Shape::Box(BBox::new(i, 0, i + 1, 1)));
        }
        let top = db.add_cell(cell).unwrap();
        let scene = Scene::new(db, top, BBox::new(0, 0, 1000, 1000), 100, 100);
        scene.cancel.cancel();
        let stats = scene.render(&mut DrawList::new());
        assert!(stats.interrupted);
        assert_eq!(stats.objects, 256);
    }

    #[test]
    fn test_leveled_matches_multipass() {
        let mut db = Database::new();
        let m1 = db.add_layer(LayerDesc::new("M1", Color32::BLUE));
        let m2 = db.add_layer(LayerDesc::new("M2", Color32::RED));
        let leaf = db
            .add_cell(
                CellDesc::new("leaf", DisplayMode::Physical)
                    .with_box(m2, BBox::new(0, 0, 30, 30))
                    .with_box(m1, BBox::new(10, 10, 40, 40)),
            )
            .unwrap();
        let top = db
            .add_cell(
                CellDesc::new("top", DisplayMode::Physical)
                    .with_box(m2, BBox::new(0, 0, 20, 90))
                    .with_instance(InstanceDesc::new(1, leaf, Transform::translate(5, 5)).arrayed(2, 2, 45, 45)),
            )
            .unwrap();
        let mut scene = Scene::new(db, top, BBox::new(0, 0, 100, 100), 100, 100);
        scene.attrib.set_expand_level(DisplayMode::Physical, -1);
        let mut flat = LeveledImage::flat(100, 100);
        let mut leveled = LeveledImage::new(100, 100);
        scene.render(&mut flat);
        scene.render(&mut leveled);
        assert_eq!(flat.pixels(), leveled.pixels());
        // M2 is later in layer order, so it covers M1 where they overlap
        assert_eq!(leveled.pixel(20, 75), Some(Color32::RED));
    }
}
