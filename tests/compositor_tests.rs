//! End-to-end tests for window composition
//!
//! Tests cover:
//! - Hierarchy expansion through a display window
//! - Draw cache transparency
//! - Array element culling
//! - Grid visibility threshold and manufacturing grid
//! - Terminal mark label placement and erasure
//! - Single-pass leveled images versus layer-by-layer windows
//! - Geometry far outside a deeply zoomed view
//! - Interrupt requests made between redraws

use approx::assert_relative_eq;
use egui::Color32;
use std::rc::Rc;

use layout_compositor::backend::DrawOp;
use layout_compositor::cache::DrawCache;
use layout_compositor::color::ColorTable;
use layout_compositor::db::{CellId, TermId};
use layout_compositor::grid::AxesStyle;
use layout_compositor::marks::{MarkKind, Quadrant};
use layout_compositor::render::{CancelToken, RenderInput, RenderPass};
use layout_compositor::{
    BBox, CellDesc, CoordMap, Database, Display, DisplayConfig, DisplayMode, DisplaySource,
    DrawList, DspAttrib, InstanceDesc, LayerDesc, LeveledImage, Mark, PixRect, Point, Transform,
};

const LEAF_COLOR: Color32 = Color32::from_rgb(1, 2, 3);

fn single_instance() -> DisplaySource {
    let mut db = Database::new();
    let m1 = db.add_layer(LayerDesc::new("M1", LEAF_COLOR));
    let leaf = db
        .add_cell(CellDesc::new("leaf", DisplayMode::Physical).with_box(m1, BBox::new(0, 0, 50, 50)))
        .unwrap();
    let top = db
        .add_cell(
            CellDesc::new("top", DisplayMode::Physical)
                .with_instance(InstanceDesc::new(1, leaf, Transform::translate(100, 100))),
        )
        .unwrap();
    DisplaySource::cell(Rc::new(db), top)
}

fn array_design() -> (Database, CellId) {
    let mut db = Database::new();
    let m1 = db.add_layer(LayerDesc::new("M1", Color32::BLUE));
    let m2 = db.add_layer(LayerDesc::new("M2", Color32::RED));
    let leaf = db
        .add_cell(
            CellDesc::new("leaf", DisplayMode::Physical)
                .with_box(m1, BBox::new(0, 0, 5, 5))
                .with_box(m2, BBox::new(2, 2, 8, 8)),
        )
        .unwrap();
    let top = db
        .add_cell(
            CellDesc::new("top", DisplayMode::Physical)
                .with_box(m1, BBox::new(0, 0, 1000, 3))
                .with_instance(
                    InstanceDesc::new(1, leaf, Transform::translate(0, 0)).arrayed(100, 100, 10, 10),
                ),
        )
        .unwrap();
    (db, top)
}

fn render_into(
    source: &DisplaySource,
    map: &CoordMap,
    cache: &mut DrawCache,
    be: &mut dyn layout_compositor::Backend,
) -> layout_compositor::render::RenderStats {
    let mut attrib = DspAttrib::default();
    attrib.set_expand_level(DisplayMode::Physical, -1);
    let colors = ColorTable::default();
    let config = DisplayConfig::default();
    let cancel = CancelToken::new();
    let input = RenderInput {
        source,
        map,
        attrib: &attrib,
        mode: DisplayMode::Physical,
        colors: &colors,
        config: &config,
        window: 0,
        context: None,
        cancel: &cancel,
    };
    RenderPass::new(input, cache, be).run(map.clip_area())
}

#[test]
fn test_expanded_box_reaches_window_pixels() {
    let mut d = Display::new(DrawList::new(), 500, 500, DisplayConfig::default()).unwrap();
    d.set_source(0, Some(single_instance())).unwrap();
    d.window_mut(0)
        .unwrap()
        .attrib_mut()
        .set_expand_level(DisplayMode::Physical, -1);
    d.window_mut(0).unwrap().backend_mut().clear();
    d.set_view(0, BBox::new(0, 0, 500, 500)).unwrap();

    let win = d.window(0).unwrap();
    assert_relative_eq!(win.map().ratio(), 1.0);
    assert_eq!(
        win.backend().boxes_with_color(LEAF_COLOR),
        vec![PixRect::new(100, 350, 150, 400)]
    );
}

#[test]
fn test_cache_does_not_change_raster() {
    let (db, top) = array_design();
    let source = DisplaySource::cell(Rc::new(db), top);
    let map = CoordMap::new(120, 120, BBox::new(0, 0, 200, 200));

    let mut direct = LeveledImage::flat(120, 120);
    render_into(&source, &map, &mut DrawCache::default(), &mut direct);

    let mut cached = LeveledImage::flat(120, 120);
    let mut cache = DrawCache::new(16);
    cache.enable(&mut cached, true);
    render_into(&source, &map, &mut cache, &mut cached);
    cache.flush(&mut cached);

    assert_eq!(direct.pixels(), cached.pixels());
    assert!(cache.stats().batches > 0);
}

#[test]
fn test_array_elements_outside_view_are_skipped() {
    let (db, top) = array_design();
    let source = DisplaySource::cell(Rc::new(db), top);

    let whole = CoordMap::new(100, 100, BBox::new(0, 0, 1000, 1000));
    let stats = render_into(&source, &whole, &mut DrawCache::default(), &mut DrawList::new());
    assert_eq!(stats.elements, 10_000);

    let corner = CoordMap::new(100, 100, BBox::new(0, 0, 50, 50));
    let stats = render_into(&source, &corner, &mut DrawCache::default(), &mut DrawList::new());
    assert!(stats.elements > 0);
    assert!(stats.elements <= 36, "visited {} elements", stats.elements);
}

#[test]
fn test_grid_hidden_below_threshold() {
    let mut d = Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap();
    {
        let grid = d.window_mut(0).unwrap().attrib_mut().grid_mut(DisplayMode::Physical);
        grid.axes = AxesStyle::None;
        grid.spacing = 1.0;
    }
    let dots = |d: &Display<DrawList>| {
        d.window(0)
            .unwrap()
            .backend()
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Pixel { .. }))
            .count()
    };

    // 1 um fine grid at 0.001 px/unit: 1 px fine, 5 px coarse
    d.set_view(0, BBox::new(0, 0, 100_000, 100_000)).unwrap();
    assert_eq!(dots(&d), 0);

    // 10 px fine spacing is above the 8 px threshold
    d.window_mut(0).unwrap().backend_mut().clear();
    d.set_view(0, BBox::new(0, 0, 10_000, 10_000)).unwrap();
    assert!(dots(&d) > 0);
}

#[test]
fn test_mfg_grid_rounds_spacing() {
    let mut d = Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap();
    d.set_mfg_grid(DisplayMode::Physical, 0.7);
    let mfg = *d.mfg_grid();
    let grid = d.window(0).unwrap().attrib().grid(DisplayMode::Physical).clone();
    assert_relative_eq!(grid.spacing(DisplayMode::Physical, &mfg), 0.7, epsilon = 1e-9);

    let mut coarse = grid.clone();
    coarse.spacing = 2.0;
    assert_relative_eq!(coarse.spacing(DisplayMode::Physical, &mfg), 2.1, epsilon = 1e-9);
    // the electrical grid is corrected separately
    assert_relative_eq!(coarse.spacing(DisplayMode::Electrical, &mfg), 2.0);
}

#[test]
fn test_terminal_labels_take_turns_around_a_point() {
    let mut d = Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap();
    for i in 0..5 {
        d.add_mark(Mark::Pterm {
            term: TermId(i),
            pos: Point::new(10, 10),
            name: format!("t{i}"),
            quadrant: Quadrant::default(),
        });
    }
    let quadrants: Vec<Quadrant> = d
        .marks()
        .list(MarkKind::Pterm)
        .iter()
        .filter_map(|m| m.quadrant())
        .collect();
    assert_eq!(
        quadrants,
        vec![
            Quadrant::UpperRight,
            Quadrant::UpperLeft,
            Quadrant::LowerRight,
            Quadrant::LowerLeft,
            Quadrant::UpperRight,
        ]
    );
    assert_eq!(d.purge_terminal(TermId(2)), 1);
    assert_eq!(d.marks().list(MarkKind::Pterm).len(), 4);
}

#[test]
fn test_leveled_image_matches_window() {
    let (db, top) = array_design();
    let source = DisplaySource::cell(Rc::new(db), top);
    let area = source.bbox().unwrap();
    assert_eq!(area, BBox::new(0, 0, 1000, 998));

    let mut d = Display::new(LeveledImage::flat(100, 100), 100, 100, DisplayConfig::default())
        .unwrap();
    {
        let attrib = d.window_mut(0).unwrap().attrib_mut();
        attrib.set_expand_level(DisplayMode::Physical, -1);
        let grid = attrib.grid_mut(DisplayMode::Physical);
        grid.displayed = false;
        grid.axes = AxesStyle::None;
    }
    d.set_source(0, Some(source.clone())).unwrap();
    d.set_view(0, area).unwrap();

    let image = d.compose_image(&source, area, 100, 100).unwrap();
    let window = d.window(0).unwrap().backend();
    assert_eq!(image.pixels(), window.pixels());
    assert!(image.count_color(Color32::RED) > 0);
}

const EDGE_COLOR: Color32 = Color32::from_rgb(9, 8, 7);

fn huge_outline(half: i32) -> DisplaySource {
    let mut db = Database::new();
    let edge = db.add_layer(LayerDesc::new("edge", EDGE_COLOR).outline_only());
    let top = db
        .add_cell(
            CellDesc::new("top", DisplayMode::Physical)
                .with_box(edge, BBox::new(-half, -half, half, half)),
        )
        .unwrap();
    DisplaySource::cell(Rc::new(db), top)
}

#[test]
fn test_image_of_a_corner_of_a_huge_box() {
    let d = Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap();
    let src = huge_outline(1_000_000_000);
    let area = BBox::new(-1_000_000_000, -5, -1_000_000_000 + 10, 5);
    let image = d.compose_image(&src, area, 100, 100).unwrap();
    // only the left edge crosses the area, as column 0
    assert_eq!(image.count_color(EDGE_COLOR), 100);
    assert_eq!(image.pixel(0, 50), Some(EDGE_COLOR));
}

#[test]
fn test_zoomed_in_window_trims_far_edges() {
    let mut d = Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap();
    d.set_source(0, Some(huge_outline(500_000_000))).unwrap();
    d.window_mut(0).unwrap().backend_mut().clear();
    d.set_view(0, BBox::new(-5, -5, 5, 5)).unwrap();
    let segs = d.window(0).unwrap().backend().lines_with_color(EDGE_COLOR);
    assert!(!segs.is_empty());
    for s in segs {
        for v in [s.x1, s.y1, s.x2, s.y2] {
            assert!((-50..=150).contains(&v), "{s:?} reaches far off screen");
        }
    }
}

#[test]
fn test_erasing_one_of_coincident_terminals() {
    let mut d = Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap();
    let pterm = |i: u64| Mark::Pterm {
        term: TermId(i),
        pos: Point::new(50, 50),
        name: format!("t{i}"),
        quadrant: Quadrant::default(),
    };
    for i in 0..4 {
        d.add_mark(pterm(i));
    }
    assert_eq!(d.erase_mark(&pterm(2)), 1);
    let left: Vec<Option<TermId>> = d
        .marks()
        .list(MarkKind::Pterm)
        .iter()
        .map(|m| m.terminal())
        .collect();
    assert_eq!(left, vec![Some(TermId(0)), Some(TermId(1)), Some(TermId(3))]);
}

#[test]
fn test_interrupt_between_redraws_is_forgotten() {
    let mut d = Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap();
    d.interrupt();
    d.set_source(0, Some(single_instance())).unwrap();
    assert!(!d.window(0).unwrap().last_stats().interrupted);

    let mut db = Database::new();
    let m1 = db.add_layer(LayerDesc::new("M1", LEAF_COLOR));
    let mut cell = CellDesc::new("many", DisplayMode::Physical);
    for i in 0..1000 {
        let (x, y) = ((i % 40) * 3, (i / 40) * 3);
        cell = cell.with_box(m1, BBox::new(x, y, x + 2, y + 2));
    }
    let top = db.add_cell(cell).unwrap();
    d.interrupt();
    d.set_source(0, Some(DisplaySource::cell(Rc::new(db), top))).unwrap();
    let stats = d.window(0).unwrap().last_stats();
    assert!(!stats.interrupted);
    assert!(stats.objects >= 1000);
}
