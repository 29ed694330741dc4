// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Read-only hierarchical design database consumed by the compositor.
//!
//! Cells hold per-layer geometry and instances of other cells. Cells are
//! added leaf-first so that every cell's bounding box can be computed from
//! its own geometry and its already-known masters at insertion time. The
//! compositor never mutates a database; sharing happens through `Rc`.

use egui::Color32;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::FillPattern;
use crate::error::{DisplayError, Result};
use crate::geom::{BBox, Orient, Point, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId(pub usize);

/// Stable instance identity, used by marks as a back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermId(pub u64);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Physical,
    Electrical,
}

impl DisplayMode {
    pub fn index(self) -> usize {
        match self {
            DisplayMode::Physical => 0,
            DisplayMode::Electrical => 1,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            DisplayMode::Physical => "phys",
            DisplayMode::Electrical => "elec",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "phys" => Some(DisplayMode::Physical),
            "elec" => Some(DisplayMode::Electrical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDesc {
    pub name: String,
    pub color: Color32,
    pub fill: Option<FillPattern>,
    /// Draw boxes and polygons filled; otherwise outlines only.
    pub filled: bool,
    /// Also draw the outline of filled shapes.
    pub outlined: bool,
    pub invisible: bool,
    /// Electrical mode: show only in the top-level cell.
    pub no_inst_view: bool,
    pub via: bool,
    pub conductor: bool,
}

impl LayerDesc {
    pub fn new(name: &str, color: Color32) -> Self {
        Self {
            name: name.to_string(),
            color,
            fill: None,
            filled: true,
            outlined: false,
            invisible: false,
            no_inst_view: false,
            via: false,
            conductor: false,
        }
    }

    pub fn outline_only(mut self) -> Self {
        self.filled = false;
        self.outlined = true;
        self
    }

    pub fn with_fill(mut self, fill: FillPattern) -> Self {
        self.fill = Some(fill);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Box(BBox),
    Poly(Vec<Point>),
    Wire { points: Vec<Point>, width: i32 },
    Label {
        text: String,
        pos: Point,
        height: i32,
        orient: Orient,
    },
}

impl Shape {
    pub fn bbox(&self) -> BBox {
        match self {
            Shape::Box(bb) => *bb,
            Shape::Poly(points) => BBox::from_points(points).unwrap_or_default(),
            Shape::Wire { points, width } => BBox::from_points(points)
                .unwrap_or_default()
                .bloat(width / 2),
            Shape::Label {
                text, pos, height, ..
            } => {
                // crude estimate, labels are roughly square per character
                let w = *height * text.chars().count().max(1) as i32 * 3 / 4;
                BBox::new(pos.x, pos.y, pos.x + w, pos.y + height)
            }
        }
    }

    pub fn transformed(&self, tf: &Transform) -> Shape {
        match self {
            Shape::Box(bb) => Shape::Box(tf.apply_bbox(bb)),
            Shape::Poly(points) => Shape::Poly(points.iter().map(|p| tf.apply(*p)).collect()),
            Shape::Wire { points, width } => Shape::Wire {
                points: points.iter().map(|p| tf.apply(*p)).collect(),
                width: (*width as f64 * tf.mag).round() as i32,
            },
            Shape::Label {
                text,
                pos,
                height,
                orient,
            } => Shape::Label {
                text: text.clone(),
                pos: tf.apply(*pos),
                height: (*height as f64 * tf.mag).round() as i32,
                orient: tf.compose(&Transform::new(*orient, 1.0, 0, 0)).orient,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerGeometry {
    pub layer: LayerId,
    pub shapes: Vec<Shape>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayParams {
    pub nx: u32,
    pub ny: u32,
    pub dx: i32,
    pub dy: i32,
}

/// Inclusive index window into an instance array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    pub x1: u32,
    pub x2: u32,
    pub y1: u32,
    pub y2: u32,
}

impl ArrayRange {
    pub fn count(&self) -> usize {
        (self.x2 - self.x1 + 1) as usize * (self.y2 - self.y1 + 1) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDesc {
    pub id: InstId,
    pub master: CellId,
    pub name: Option<String>,
    pub transform: Transform,
    pub array: Option<ArrayParams>,
    /// Bit `n` set forces expansion in window `n`.
    pub expand: u8,
}

impl InstanceDesc {
    pub fn new(id: u64, master: CellId, transform: Transform) -> Self {
        Self {
            id: InstId(id),
            master,
            name: None,
            transform,
            array: None,
            expand: 0,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn arrayed(mut self, nx: u32, ny: u32, dx: i32, dy: i32) -> Self {
        self.array = Some(ArrayParams { nx, ny, dx, dy });
        self
    }

    pub fn expanded_in(&self, window: usize) -> bool {
        window < 8 && self.expand & (1 << window) != 0
    }

    fn dims(&self) -> (u32, u32, i32, i32) {
        match self.array {
            Some(a) => (a.nx.max(1), a.ny.max(1), a.dx, a.dy),
            None => (1, 1, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Terminal {
    pub id: TermId,
    pub name: String,
    pub pos: Point,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolPin {
    pub term: TermId,
    pub pos: Point,
}

/// Schematic symbol shown for an electrical cell in place of its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolicRep {
    pub geometry: Vec<LayerGeometry>,
    pub pins: Vec<SymbolPin>,
    pub bbox: BBox,
}

impl SymbolicRep {
    pub fn new(geometry: Vec<LayerGeometry>, pins: Vec<SymbolPin>) -> Self {
        let mut bbox: Option<BBox> = None;
        for shape in geometry.iter().flat_map(|g| g.shapes.iter()) {
            let sb = shape.bbox();
            bbox = Some(bbox.map_or(sb, |b| b.union(&sb)));
        }
        for pin in &pins {
            let pb = BBox::from_point(pin.pos);
            bbox = Some(bbox.map_or(pb, |b| b.union(&pb)));
        }
        Self {
            geometry,
            pins,
            bbox: bbox.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellDesc {
    pub name: String,
    pub mode: DisplayMode,
    pub geometry: Vec<LayerGeometry>,
    pub instances: Vec<InstanceDesc>,
    pub terminals: Vec<Terminal>,
    /// Device cells are always expanded.
    pub device: bool,
    pub symbolic: Option<SymbolicRep>,
    bbox: BBox,
}

impl CellDesc {
    pub fn new(name: &str, mode: DisplayMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            geometry: Vec::new(),
            instances: Vec::new(),
            terminals: Vec::new(),
            device: false,
            symbolic: None,
            bbox: BBox::default(),
        }
    }

    pub fn add_shape(&mut self, layer: LayerId, shape: Shape) {
        if let Some(g) = self.geometry.iter_mut().find(|g| g.layer == layer) {
            g.shapes.push(shape);
        } else {
            self.geometry.push(LayerGeometry {
                layer,
                shapes: vec![shape],
            });
        }
    }

    pub fn with_box(mut self, layer: LayerId, bb: BBox) -> Self {
        self.add_shape(layer, Shape::Box(bb));
        self
    }

    pub fn with_instance(mut self, inst: InstanceDesc) -> Self {
        self.instances.push(inst);
        self
    }

    pub fn with_terminal(mut self, id: u64, name: &str, pos: Point) -> Self {
        self.terminals.push(Terminal {
            id: TermId(id),
            name: name.to_string(),
            pos,
        });
        self
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// An empty cell has a degenerate (point) bounding box.
    pub fn is_empty(&self) -> bool {
        self.bbox.width() == 0 && self.bbox.height() == 0
    }

    pub fn shapes_on(&self, layer: LayerId) -> &[Shape] {
        self.geometry
            .iter()
            .find(|g| g.layer == layer)
            .map(|g| g.shapes.as_slice())
            .unwrap_or(&[])
    }

    pub fn terminal(&self, id: TermId) -> Option<&Terminal> {
        self.terminals.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Database {
    layers: Vec<LayerDesc>,
    cells: Vec<CellDesc>,
    by_name: HashMap<String, CellId>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: LayerDesc) -> LayerId {
        self.layers.push(layer);
        LayerId(self.layers.len() - 1)
    }

    /// Add a cell whose masters are already present, computing its
    /// bounding box.
    pub fn add_cell(&mut self, mut cell: CellDesc) -> Result<CellId> {
        if self.by_name.contains_key(&cell.name) {
            return Err(DisplayError::InvalidInput(format!(
                "duplicate cell {}",
                cell.name
            )));
        }
        let mut bbox: Option<BBox> = None;
        for g in &cell.geometry {
            if g.layer.0 >= self.layers.len() {
                return Err(DisplayError::InvalidInput(format!(
                    "cell {} uses unknown layer {}",
                    cell.name, g.layer.0
                )));
            }
            for shape in &g.shapes {
                let sb = shape.bbox();
                bbox = Some(bbox.map_or(sb, |b| b.union(&sb)));
            }
        }
        for inst in &cell.instances {
            if inst.master.0 >= self.cells.len() {
                return Err(DisplayError::InvalidInput(format!(
                    "cell {} instantiates unknown master {}",
                    cell.name, inst.master.0
                )));
            }
            let ib = self.instance_bbox(inst);
            bbox = Some(bbox.map_or(ib, |b| b.union(&ib)));
        }
        cell.bbox = bbox.unwrap_or_default();
        log::debug!("[DB] cell {} bbox {}", cell.name, cell.bbox);

        let id = CellId(self.cells.len());
        self.by_name.insert(cell.name.clone(), id);
        self.cells.push(cell);
        Ok(id)
    }

    pub fn cell(&self, id: CellId) -> Option<&CellDesc> {
        self.cells.get(id.0)
    }

    pub fn find_cell(&self, name: &str) -> Option<CellId> {
        self.by_name.get(name).copied()
    }

    pub fn layers(&self) -> &[LayerDesc] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerDesc> {
        self.layers.get(id.0)
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &CellDesc)> {
        self.cells.iter().enumerate().map(|(i, c)| (CellId(i), c))
    }

    /// Bounding box of the master, in master coordinates, covering every
    /// array element.
    fn array_extent(&self, inst: &InstanceDesc) -> BBox {
        let master = match self.cell(inst.master) {
            Some(m) => m.bbox,
            None => return BBox::default(),
        };
        let (nx, ny, dx, dy) = inst.dims();
        let far = master.translate(dx * (nx as i32 - 1), dy * (ny as i32 - 1));
        master.union(&far)
    }

    /// Instance footprint in the parent cell's coordinates.
    pub fn instance_bbox(&self, inst: &InstanceDesc) -> BBox {
        inst.transform.apply_bbox(&self.array_extent(inst))
    }

    /// Index window of the array elements of `inst` overlapping `aoi`,
    /// which is given in parent coordinates. Computed directly from the
    /// lattice, without visiting elements outside the window.
    pub fn array_range(&self, inst: &InstanceDesc, aoi: &BBox) -> Option<ArrayRange> {
        let master = self.cell(inst.master)?.bbox;
        let local = inst.transform.inverse().apply_bbox(aoi);
        let (nx, ny, dx, dy) = inst.dims();
        let (x1, x2) = lattice_span(local.left - master.right, local.right - master.left, dx, nx)?;
        let (y1, y2) = lattice_span(local.bottom - master.top, local.top - master.bottom, dy, ny)?;
        Some(ArrayRange { x1, x2, y1, y2 })
    }

    /// Per-element transform for array element (`ix`, `iy`).
    pub fn element_transform(inst: &InstanceDesc, ix: u32, iy: u32) -> Transform {
        let (_, _, dx, dy) = inst.dims();
        inst.transform.compose(&Transform::translate(
            dx * ix as i32,
            dy * iy as i32,
        ))
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    a.div_euclid(b) - if b < 0 && a.rem_euclid(b) != 0 { 1 } else { 0 }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -floor_div(-a, b)
}

/// Indices `i` in `0..n` with `lo <= i * step <= hi`.
fn lattice_span(lo: i32, hi: i32, step: i32, n: u32) -> Option<(u32, u32)> {
    let (lo, hi, step) = (lo as i64, hi as i64, step as i64);
    let last = n as i64 - 1;
    let (first, end) = if step == 0 || n <= 1 {
        if lo <= 0 && hi >= 0 {
            (0, last)
        } else {
            return None;
        }
    } else if step > 0 {
        (ceil_div(lo, step), floor_div(hi, step))
    } else {
        (ceil_div(hi, step), floor_div(lo, step))
    };
    let first = first.max(0);
    let end = end.min(last);
    if first > end {
        return None;
    }
    Some((first as u32, end as u32))
}

/// A hierarchy resolved into per-layer shapes in top-level coordinates.
#[derive(Debug, Clone, Default)]
pub struct HierDigest {
    pub name: String,
    pub layers: Vec<LayerGeometry>,
    pub bbox: BBox,
}

impl HierDigest {
    /// Flatten `root` down to `max_depth` levels of instances.
    pub fn build(db: &Database, root: CellId, max_depth: usize) -> Result<HierDigest> {
        let cell = db
            .cell(root)
            .ok_or_else(|| DisplayError::UnknownCell(format!("#{}", root.0)))?;
        let mut digest = HierDigest {
            name: cell.name.clone(),
            layers: Vec::new(),
            bbox: cell.bbox(),
        };
        digest.flatten(db, root, &Transform::identity(), 0, max_depth)?;
        log::info!(
            "[DIGEST] {}: {} layers, {} shapes",
            digest.name,
            digest.layers.len(),
            digest.layers.iter().map(|g| g.shapes.len()).sum::<usize>()
        );
        Ok(digest)
    }

    fn flatten(
        &mut self,
        db: &Database,
        cell_id: CellId,
        tf: &Transform,
        depth: usize,
        max_depth: usize,
    ) -> Result<()> {
        if depth > 64 {
            return Err(DisplayError::DepthOverflow(depth));
        }
        let Some(cell) = db.cell(cell_id) else {
            return Ok(());
        };
        for g in &cell.geometry {
            for shape in &g.shapes {
                self.push(g.layer, shape.transformed(tf));
            }
        }
        if depth >= max_depth {
            return Ok(());
        }
        for inst in &cell.instances {
            let (nx, ny, _, _) = inst.dims();
            for iy in 0..ny {
                for ix in 0..nx {
                    let etf = tf.compose(&Database::element_transform(inst, ix, iy));
                    self.flatten(db, inst.master, &etf, depth + 1, max_depth)?;
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, layer: LayerId, shape: Shape) {
        match self.layers.iter_mut().find(|g| g.layer == layer) {
            Some(g) => g.shapes.push(shape),
            None => self.layers.push(LayerGeometry {
                layer,
                shapes: vec![shape],
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerBox {
    pub layer: LayerId,
    pub bbox: BBox,
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    /// A live database cell, rendered by hierarchy traversal.
    Cell(CellId),
    Digest(Rc<HierDigest>),
    Boxes(Rc<Vec<LayerBox>>),
}

/// What a window displays. Every kind carries the database for its layer
/// table.
#[derive(Debug, Clone)]
pub struct DisplaySource {
    pub db: Rc<Database>,
    pub kind: SourceKind,
}

impl DisplaySource {
    pub fn cell(db: Rc<Database>, cell: CellId) -> Self {
        Self {
            db,
            kind: SourceKind::Cell(cell),
        }
    }

    pub fn digest(db: Rc<Database>, digest: HierDigest) -> Self {
        Self {
            db,
            kind: SourceKind::Digest(Rc::new(digest)),
        }
    }

    pub fn boxes(db: Rc<Database>, boxes: Vec<LayerBox>) -> Self {
        Self {
            db,
            kind: SourceKind::Boxes(Rc::new(boxes)),
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        match &self.kind {
            SourceKind::Cell(id) => self.db.cell(*id).map(|c| c.bbox()),
            SourceKind::Digest(d) => Some(d.bbox),
            SourceKind::Boxes(list) => {
                let mut it = list.iter();
                let first = it.next()?.bbox;
                Some(it.fold(first, |acc, b| acc.union(&b.bbox)))
            }
        }
    }

    pub fn top_cell(&self) -> Option<&CellDesc> {
        match self.kind {
            SourceKind::Cell(id) => self.db.cell(id),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        match &self.kind {
            SourceKind::Cell(id) => self
                .db
                .cell(*id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            SourceKind::Digest(d) => d.name.clone(),
            SourceKind::Boxes(_) => "<boxes>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level() -> (Database, LayerId, CellId, CellId) {
        let mut db = Database::new();
        let m1 = db.add_layer(LayerDesc::new("M1", Color32::BLUE));
        let leaf = db
            .add_cell(CellDesc::new("leaf", DisplayMode::Physical).with_box(m1, BBox::new(0, 0, 10, 10)))
            .unwrap();
        let top = db
            .add_cell(
                CellDesc::new("top", DisplayMode::Physical).with_instance(
                    InstanceDesc::new(1, leaf, Transform::translate(100, 0)).arrayed(10, 5, 20, 20),
                ),
            )
            .unwrap();
        (db, m1, leaf, top)
    }

    #[test]
    fn test_bbox_includes_array() {
        let (db, _, _, top) = two_level();
        assert_eq!(db.cell(top).unwrap().bbox(), BBox::new(100, 0, 290, 90));
    }

    #[test]
    fn test_array_range_subwindow() {
        let (db, _, _, top) = two_level();
        let inst = &db.cell(top).unwrap().instances[0];
        // elements 2..=3 in x (x = 140..170), 1 in y (y = 20..30)
        let aoi = BBox::new(145, 22, 165, 28);
        let r = db.array_range(inst, &aoi).unwrap();
        assert_eq!(r, ArrayRange { x1: 2, x2: 3, y1: 1, y2: 1 });
        assert_eq!(r.count(), 2);
    }

    #[test]
    fn test_array_range_outside() {
        let (db, _, _, top) = two_level();
        let inst = &db.cell(top).unwrap().instances[0];
        assert!(db.array_range(inst, &BBox::new(0, 0, 50, 50)).is_none());
    }

    #[test]
    fn test_unknown_master_rejected() {
        let mut db = Database::new();
        let res = db.add_cell(
            CellDesc::new("bad", DisplayMode::Physical)
                .with_instance(InstanceDesc::new(1, CellId(7), Transform::identity())),
        );
        assert!(matches!(res, Err(DisplayError::InvalidInput(_))));
    }

    #[test]
    fn test_digest_flattens() {
        let (db, m1, _, top) = two_level();
        let digest = HierDigest::build(&db, top, 4).unwrap();
        assert_eq!(digest.layers.len(), 1);
        assert_eq!(digest.layers[0].layer, m1);
        assert_eq!(digest.layers[0].shapes.len(), 50);
    }
}
