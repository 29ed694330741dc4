// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

use eframe::egui;
use rfd::FileDialog;
use std::rc::Rc;
use std::time::{Duration, Instant};

use layout_compositor::attrib::Expansion;
use layout_compositor::backend::{FillPattern, PixPoint};
use layout_compositor::db::{CellId, InstanceDesc};
use layout_compositor::geom::{to_microns, Orient, RESOLUTION};
use layout_compositor::marks::{UserMarkAttr, UserShape};
use layout_compositor::window::WindowDesc;
use layout_compositor::{
    BBox, CellDesc, Database, Display, DisplayConfig, DisplayHost, DisplayMode, DisplaySource,
    EguiBackend, ErrorLog, LayerDesc, Mark, Point, Result, Transform, UserMark,
};

const BLINK_INTERVAL: Duration = Duration::from_millis(500);
const THUMBNAIL_SIZE: i32 = 160;

/// Pointer tool for clicks in the layout area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    Pan,
    Ruler,
    Mark,
    UserBox,
}

/// Collects compositor messages for the status line.
struct StatusHost(Rc<std::cell::RefCell<Option<String>>>);

impl DisplayHost for StatusHost {
    fn show_message(&mut self, msg: &str) {
        log::warn!("[VIEWER] {msg}");
        *self.0.borrow_mut() = Some(msg.to_string());
    }
}

/// Small two-level design used when no other source is loaded.
fn demo_database() -> Result<(Rc<Database>, CellId)> {
    let um = RESOLUTION;
    let mut db = Database::new();
    let diff = db.add_layer(LayerDesc::new("diff", egui::Color32::from_rgb(60, 160, 60)));
    let poly = db.add_layer(LayerDesc::new("poly", egui::Color32::from_rgb(200, 60, 60)));
    let m1 = db.add_layer(
        LayerDesc::new("metal1", egui::Color32::from_rgb(70, 110, 230))
            .with_fill(FillPattern::checker()),
    );
    let outline = db.add_layer(
        LayerDesc::new("outline", egui::Color32::from_rgb(180, 180, 180)).outline_only(),
    );

    let inv = db.add_cell(
        CellDesc::new("inv", DisplayMode::Physical)
            .with_box(outline, BBox::new(0, 0, 4 * um, 8 * um))
            .with_box(diff, BBox::new(um / 2, um, 7 * um / 2, 3 * um))
            .with_box(diff, BBox::new(um / 2, 5 * um, 7 * um / 2, 7 * um))
            .with_box(poly, BBox::new(9 * um / 5, um / 2, 11 * um / 5, 15 * um / 2))
            .with_box(m1, BBox::new(0, 0, 4 * um, um / 2))
            .with_box(m1, BBox::new(0, 15 * um / 2, 4 * um, 8 * um))
            .with_terminal(1, "A", Point::new(2 * um, 4 * um)),
    )?;
    let row = db.add_cell(
        CellDesc::new("row", DisplayMode::Physical)
            .with_instance(
                InstanceDesc::new(1, inv, Transform::translate(0, 0))
                    .named("inv_row")
                    .arrayed(16, 1, 5 * um, 0),
            )
            .with_box(m1, BBox::new(0, 3 * um, 80 * um, 4 * um)),
    )?;
    let mut top = CellDesc::new("chip", DisplayMode::Physical)
        .with_box(outline, BBox::new(-5 * um, -5 * um, 85 * um, 60 * um))
        .with_terminal(10, "VDD", Point::new(-5 * um, 55 * um))
        .with_terminal(11, "VSS", Point::new(-5 * um, -5 * um));
    for i in 0..5 {
        let orient = if i % 2 == 0 { Orient::R0 } else { Orient::MX };
        let y = if i % 2 == 0 { i * 11 * um } else { i * 11 * um + 8 * um };
        top = top.with_instance(
            InstanceDesc::new(100 + i as u64, row, Transform::new(orient, 1.0, 0, y))
                .named(&format!("row{i}")),
        );
    }
    let chip = db.add_cell(top)?;
    Ok((Rc::new(db), chip))
}

pub struct CompositorViewer {
    display: Display<EguiBackend>,
    source: Option<DisplaySource>,
    messages: Rc<std::cell::RefCell<Option<String>>>,
    tool: Tool,
    drag_start: Option<Point>,
    last_ruler: Option<u64>,
    expand_level: i32,
    last_blink: Instant,
    thumbnail: Option<egui::TextureHandle>,
    thumbnail_dirty: bool,
    cursor: Option<Point>,
    error_message: Option<String>,
    success_message: Option<String>,
}

impl CompositorViewer {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Result<Self> {
        let initial = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(800.0, 600.0));
        let painter = egui::Painter::new(cc.egui_ctx.clone(), egui::LayerId::background(), initial);
        let messages = Rc::new(std::cell::RefCell::new(None));
        let mut error_message = None;
        let config = match DisplayConfig::load(std::path::Path::new("compositor.toml")) {
            Ok(config) => config,
            Err(e) => {
                log::info!("[VIEWER] using default configuration: {e}");
                DisplayConfig::default()
            }
        };
        let display = match Display::new(EguiBackend::new(painter.clone(), initial.min), 800, 600, config) {
            Ok(d) => d,
            Err(e) => {
                error_message = Some(format!("Invalid configuration: {e}"));
                Display::new(EguiBackend::new(painter, initial.min), 800, 600, DisplayConfig::default())?
            }
        };
        let mut viewer = Self {
            display: display.with_host(Box::new(StatusHost(messages.clone()))),
            source: None,
            messages,
            tool: Tool::Pan,
            drag_start: None,
            last_ruler: None,
            expand_level: 1,
            last_blink: Instant::now(),
            thumbnail: None,
            thumbnail_dirty: true,
            cursor: None,
            error_message,
            success_message: None,
        };
        viewer.load_demo();
        Ok(viewer)
    }

    fn load_demo(&mut self) {
        match demo_database() {
            Ok((db, chip)) => {
                let source = DisplaySource::cell(db, chip);
                self.source = Some(source.clone());
                if let Err(e) = self.display.set_source(0, Some(source)) {
                    self.error_message = Some(format!("Failed to show demo: {e}"));
                }
                self.apply_expansion();
                self.thumbnail_dirty = true;
            }
            Err(e) => self.error_message = Some(format!("Failed to build demo: {e}")),
        }
    }

    fn apply_expansion(&mut self) {
        let level = self.expand_level;
        if let Ok(win) = self.display.window_mut(0) {
            let mode = win.mode();
            win.attrib_mut()
                .set_expansion(mode, Expansion::from_level(level));
        }
    }

    fn save_marks(&mut self) {
        if let Some(path) = FileDialog::new()
            .add_filter("Mark files", &["marks"])
            .save_file()
        {
            match self.display.save_user_marks(0, &path) {
                Ok(n) => self.success_message = Some(format!("Saved {n} marks")),
                Err(e) => self.error_message = Some(format!("Failed to save marks: {e}")),
            }
        }
    }

    fn load_marks(&mut self) {
        if let Some(path) = FileDialog::new()
            .add_filter("Mark files", &["marks"])
            .pick_file()
        {
            let mut log = ErrorLog::new();
            match self.display.load_user_marks(&path, &mut log) {
                Ok(n) if log.is_empty() => {
                    self.success_message = Some(format!("Loaded {n} marks"));
                }
                Ok(n) => {
                    self.error_message = Some(format!(
                        "Loaded {n} marks, skipped {} lines:\n{}",
                        log.messages().len(),
                        log.messages().join("\n")
                    ));
                }
                Err(e) => self.error_message = Some(format!("Failed to load marks: {e}")),
            }
        }
    }

    fn render_menu_bar(&mut self, ui: &mut egui::Ui) {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Reload Demo").clicked() {
                    self.load_demo();
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Load User Marks").clicked() {
                    self.load_marks();
                    ui.close_menu();
                }
                if ui.button("Save User Marks").clicked() {
                    self.save_marks();
                    ui.close_menu();
                }
            });

            ui.menu_button("View", |ui| {
                if ui.button("Fit (F)").clicked() {
                    self.run(|d| d.fit(0));
                    ui.close_menu();
                }
                if ui.button("Previous View").clicked() {
                    self.run(|d| d.previous_view(0).map(|_| ()));
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Clear Marks").clicked() {
                    self.display.clear_marks(None);
                    ui.close_menu();
                }
            });
        });
    }

    fn render_side_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Tool");
        ui.radio_value(&mut self.tool, Tool::Pan, "Pan / Zoom");
        ui.radio_value(&mut self.tool, Tool::Ruler, "Ruler");
        ui.radio_value(&mut self.tool, Tool::Mark, "Cross Mark");
        ui.radio_value(&mut self.tool, Tool::UserBox, "User Box");
        ui.separator();

        ui.heading("Expansion");
        if ui
            .add(egui::Slider::new(&mut self.expand_level, -1..=8).text("levels"))
            .changed()
        {
            self.apply_expansion();
            self.thumbnail_dirty = true;
        }

        ui.separator();
        ui.heading("Grid");
        if let Ok(win) = self.display.window_mut(0) {
            let mode = win.mode();
            let attrib = win.attrib_mut();
            let grid = attrib.grid_mut(mode);
            ui.checkbox(&mut grid.displayed, "Show grid");
            ui.checkbox(&mut grid.on_top, "Grid on top");
            ui.add(
                egui::DragValue::new(&mut grid.spacing)
                    .speed(0.1)
                    .range(0.001..=1000.0)
                    .prefix("spacing "),
            );
            let mut dashed = grid.linestyle != 0;
            if ui.checkbox(&mut dashed, "Line grid").changed() {
                grid.linestyle = if dashed { 0b1100 } else { 0 };
            }
            ui.checkbox(&mut attrib.show.labels, "Labels");
        }

        ui.separator();
        ui.heading("Overview");
        if let Some(texture) = &self.thumbnail {
            ui.image((texture.id(), texture.size_vec2()));
        }
    }

    fn refresh_thumbnail(&mut self, ctx: &egui::Context) {
        if !self.thumbnail_dirty {
            return;
        }
        self.thumbnail_dirty = false;
        let Some(source) = self.source.clone() else {
            return;
        };
        let Some(area) = source.bbox() else {
            return;
        };
        if let Some(image) = self
            .display
            .thumbnail(&source, area, THUMBNAIL_SIZE, THUMBNAIL_SIZE)
        {
            self.thumbnail = Some(ctx.load_texture(
                "overview",
                image.to_color_image(),
                egui::TextureOptions::NEAREST,
            ));
        }
    }

    fn run(&mut self, f: impl FnOnce(&mut Display<EguiBackend>) -> Result<()>) {
        if let Err(e) = f(&mut self.display) {
            self.error_message = Some(e.to_string());
        }
    }

    fn render_layout(&mut self, ui: &mut egui::Ui) {
        let available_size = ui.available_size();
        let (response, painter) = ui.allocate_painter(available_size, egui::Sense::click_and_drag());
        let rect = response.rect;
        let (w, h) = (rect.width() as i32, rect.height() as i32);

        let Ok(win) = self.display.window_mut(0) else {
            return;
        };
        win.backend_mut().set_painter(painter, rect.min);
        if win.map().width() != w || win.map().height() != h {
            win.resize(w, h);
        }
        let to_window = |win: &WindowDesc<EguiBackend>, p: egui::Pos2| {
            win.map().pixel_to_window(PixPoint::new(
                (p.x - rect.min.x) as i32,
                (p.y - rect.min.y) as i32,
            ))
        };
        self.cursor = response.hover_pos().map(|p| to_window(&*win, p));

        // Everything below only queues damage; one pass repaints the frame.
        self.run(|d| d.push_redisplay(0));

        if ui.input(|i| i.key_pressed(egui::Key::F)) {
            self.run(|d| d.fit(0));
        }
        if let Some(hover) = response.hover_pos() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let factor = if scroll > 0.0 { 1.1 } else { 1.0 / 1.1 };
                if let Ok(win) = self.display.window_mut(0) {
                    let before = to_window(&*win, hover);
                    win.zoom(factor);
                    let after = to_window(&*win, hover);
                    win.pan(before.x - after.x, before.y - after.y);
                }
            }
        }

        match self.tool {
            Tool::Pan => {
                if response.dragged() {
                    let delta = response.drag_delta();
                    if let Ok(win) = self.display.window_mut(0) {
                        let ratio = win.map().ratio();
                        win.pan(
                            (-delta.x as f64 / ratio).round() as i32,
                            (delta.y as f64 / ratio).round() as i32,
                        );
                    }
                }
            }
            Tool::Ruler => self.ruler_tool(&response),
            Tool::Mark => {
                if response.clicked() {
                    if let Some(pos) = self.pointer_point(&response) {
                        let mode = self.display.window(0).map(|w| w.mode()).unwrap_or_default();
                        self.display.add_mark(Mark::Cross { pos, mode });
                    }
                }
            }
            Tool::UserBox => self.user_box_tool(&response),
        }

        self.run(|d| d.redisplay(0, None));
        self.run(|d| d.pop_redisplay(0));
    }

    fn pointer_point(&self, response: &egui::Response) -> Option<Point> {
        let p = response.interact_pointer_pos()?;
        let win = self.display.window(0).ok()?;
        Some(win.map().pixel_to_window(PixPoint::new(
            (p.x - response.rect.min.x) as i32,
            (p.y - response.rect.min.y) as i32,
        )))
    }

    fn ruler_tool(&mut self, response: &egui::Response) {
        if response.drag_started() {
            self.drag_start = self.pointer_point(response);
        }
        if let Some(from) = self.drag_start {
            if response.dragged() {
                let span = self.pointer_point(response).map(|to| (from, to));
                self.run(|d| d.set_ghost_ruler(0, span));
            }
            if response.drag_stopped() {
                self.drag_start = None;
                self.run(|d| d.set_ghost_ruler(0, None));
                if let Some(to) = self.pointer_point(response) {
                    match self.display.add_ruler(0, from, to) {
                        Ok(id) => self.last_ruler = Some(id),
                        Err(e) => self.error_message = Some(e.to_string()),
                    }
                }
            }
        } else if response.clicked() {
            // click continues the last ruler
            if let (Some(id), Some(to)) = (self.last_ruler, self.pointer_point(response)) {
                self.last_ruler = self.display.chain_ruler(id, to);
            }
        }
        if response.secondary_clicked() {
            if let Some(id) = self.last_ruler.take() {
                self.run(|d| d.remove_ruler(id).map(|_| ()));
            }
        }
    }

    fn user_box_tool(&mut self, response: &egui::Response) {
        if response.drag_started() {
            self.drag_start = self.pointer_point(response);
        }
        if response.drag_stopped() {
            if let (Some(from), Some(to)) = (self.drag_start.take(), self.pointer_point(response)) {
                let bbox = BBox::new(from.x, from.y, to.x, to.y);
                let mut attr = UserMarkAttr::TEXTURED;
                if response.ctx.input(|i| i.modifiers.shift) {
                    attr |= UserMarkAttr::BLINK;
                }
                let mark = UserMark::new(UserShape::Box(bbox)).with_attr(attr);
                self.run(|d| d.add_user_mark(0, mark));
            }
        }
    }

    fn render_status(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if let Some(p) = self.cursor {
                ui.label(format!("{:.3}, {:.3}", to_microns(p.x), to_microns(p.y)));
                ui.separator();
            }
            if let Ok(win) = self.display.window(0) {
                let stats = win.last_stats();
                ui.label(format!(
                    "{} objects, {} array elements",
                    stats.objects, stats.elements
                ));
            }
            if let Some(msg) = self.messages.borrow().as_ref() {
                ui.separator();
                ui.colored_label(egui::Color32::from_rgb(255, 193, 7), msg);
            }
        });
    }
}

impl eframe::App for CompositorViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(error) = &self.error_message.clone() {
            egui::Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.colored_label(egui::Color32::from_rgb(244, 67, 54), error);
                    ui.separator();
                    if ui.button("OK").clicked() {
                        self.error_message = None;
                    }
                });
        }

        if let Some(success) = &self.success_message.clone() {
            egui::Window::new("Success")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.colored_label(egui::Color32::from_rgb(76, 175, 80), success);
                    ui.separator();
                    if ui.button("OK").clicked() {
                        self.success_message = None;
                    }
                });
        }

        if self.last_blink.elapsed() >= BLINK_INTERVAL {
            self.last_blink = Instant::now();
            self.display.blink_tick();
        }
        self.refresh_thumbnail(ctx);

        egui::TopBottomPanel::top("menu").show(ctx, |ui| self.render_menu_bar(ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| self.render_status(ui));
        egui::SidePanel::left("controls")
            .default_width(200.0)
            .show(ctx, |ui| self.render_side_panel(ui));
        egui::CentralPanel::default()
            .frame(egui::Frame::default())
            .show(ctx, |ui| self.render_layout(ui));

        ctx.request_repaint_after(BLINK_INTERVAL);
    }
}
