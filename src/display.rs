// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! The display context: window table, overlay registries and the
//! redisplay pump.
//!
//! One [`Display`] is owned by the host application. Every drawing
//! request goes through it: callers queue damaged areas with
//! [`Display::redisplay`] and the pump recomposes them, one pass per
//! batch, unless a guard taken with [`Display::push_redisplay`] defers the
//! work until the matching [`Display::pop_redisplay`].

use std::path::Path;

use crate::attrib::DspAttrib;
use crate::backend::{Backend, PixRect, PixmapGuard};
use crate::cache::DrawCache;
use crate::color::{ColorTable, DisplayColor};
use crate::config::DisplayConfig;
use crate::db::{DisplayMode, DisplaySource, InstId, TermId};
use crate::error::{DisplayError, ErrorLog, Result};
use crate::geom::{BBox, Point};
use crate::grid::{GridContext, MfgGrid};
use crate::mapper::CoordMap;
use crate::marks::{
    Mark, MarkContext, MarkKind, MarkRegistry, UserMark, UserMarkAttr, UserMarkTable,
};
use crate::render::{CancelToken, ContextView, RenderInput, RenderPass, RenderStats, TOP_LEVEL};
use crate::ruler::{Ruler, RulerSet};
use crate::window::WindowDesc;
use crate::zimg::LeveledImage;

/// Notifications from the compositor to the application.
pub trait DisplayHost {
    fn show_message(&mut self, msg: &str);

    fn depth_overflow(&mut self, window: usize, depth: usize) {
        self.show_message(&format!(
            "Window {window}: hierarchy deeper than {depth} levels, display is incomplete."
        ));
    }

    fn redraw_interrupted(&mut self, window: usize) {
        self.show_message(&format!("Window {window}: redraw interrupted."));
    }
}

/// Host that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHost;

impl DisplayHost for LogHost {
    fn show_message(&mut self, msg: &str) {
        log::info!("[DISPLAY] {msg}");
    }
}

pub struct Display<B: Backend> {
    windows: Vec<Option<WindowDesc<B>>>,
    config: DisplayConfig,
    colors: ColorTable,
    mfg: MfgGrid,
    marks: MarkRegistry,
    user_marks: UserMarkTable,
    rulers: RulerSet,
    ghost: Option<Ruler>,
    host: Box<dyn DisplayHost>,
    cancel: CancelToken,
    overflow_reported: bool,
    blink_phase: bool,
}

impl<B: Backend> Display<B> {
    /// Create the display with its main window, index 0.
    pub fn new(main: B, width: i32, height: i32, config: DisplayConfig) -> Result<Self> {
        let config = config.validated()?;
        let mut windows = Vec::with_capacity(config.max_subwindows + 1);
        windows.push(Some(WindowDesc::new(0, main, width, height, &config)));
        windows.resize_with(config.max_subwindows + 1, || None);
        let mut marks = MarkRegistry::new();
        marks.set_erase_behind(config.erase_behind);
        Ok(Self {
            windows,
            config,
            colors: ColorTable::default(),
            mfg: MfgGrid::default(),
            marks,
            user_marks: UserMarkTable::new(),
            rulers: RulerSet::new(),
            ghost: None,
            host: Box::new(LogHost),
            cancel: CancelToken::new(),
            overflow_reported: false,
            blink_phase: false,
        })
    }

    pub fn with_host(mut self, host: Box<dyn DisplayHost>) -> Self {
        self.host = host;
        self
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn colors_mut(&mut self) -> &mut ColorTable {
        &mut self.colors
    }

    pub fn mfg_grid(&self) -> &MfgGrid {
        &self.mfg
    }

    /// Set the manufacturing grid of `mode`, in microns, and redraw.
    pub fn set_mfg_grid(&mut self, mode: DisplayMode, microns: f64) {
        self.mfg.set(mode, microns);
        self.redisplay_all();
    }

    pub fn marks(&self) -> &MarkRegistry {
        &self.marks
    }

    pub fn user_marks(&self) -> &UserMarkTable {
        &self.user_marks
    }

    pub fn rulers(&self) -> &RulerSet {
        &self.rulers
    }

    /// Token that interrupts the running redraw when cancelled. Every
    /// redraw and image composition starts with it cleared, so a request
    /// made while idle is dropped.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    // Window table

    pub fn window(&self, idx: usize) -> Result<&WindowDesc<B>> {
        self.windows
            .get(idx)
            .and_then(Option::as_ref)
            .ok_or(DisplayError::NoWindow(idx))
    }

    pub fn window_mut(&mut self, idx: usize) -> Result<&mut WindowDesc<B>> {
        self.windows
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or(DisplayError::NoWindow(idx))
    }

    pub fn windows(&self) -> impl Iterator<Item = &WindowDesc<B>> {
        self.windows.iter().flatten()
    }

    fn indices(&self) -> Vec<usize> {
        self.windows().map(|w| w.index()).collect()
    }

    /// Open a sub-window showing what the main window shows. Attributes
    /// are copied, later changes to either window stay local.
    pub fn open_window(&mut self, backend: B, width: i32, height: i32) -> Result<usize> {
        let slot = self
            .windows
            .iter()
            .skip(1)
            .position(Option::is_none)
            .map(|i| i + 1)
            .ok_or(DisplayError::WindowLimit(self.windows.len()))?;
        let main = self.window(0)?;
        let attrib: DspAttrib = main.attrib().clone();
        let source = main.source().cloned();
        let mode = main.mode();
        let view = main.map().window();
        let mut win = WindowDesc::new(slot, backend, width, height, &self.config);
        win.attrib = attrib;
        win.set_mode(mode);
        win.set_source(source);
        win.map.set_window(view);
        self.windows[slot] = Some(win);
        log::info!("[DISPLAY] opened window {slot}");
        self.redisplay(slot, None)?;
        Ok(slot)
    }

    pub fn close_window(&mut self, idx: usize) -> Result<WindowDesc<B>> {
        if idx == 0 {
            return Err(DisplayError::MainWindow);
        }
        let win = self
            .windows
            .get_mut(idx)
            .and_then(Option::take)
            .ok_or(DisplayError::NoWindow(idx))?;
        self.rulers.drop_window(idx);
        if self.ghost.as_ref().is_some_and(|g| g.window == idx) {
            self.ghost = None;
        }
        log::info!("[DISPLAY] closed window {idx}");
        Ok(win)
    }

    pub fn set_source(&mut self, idx: usize, source: Option<DisplaySource>) -> Result<()> {
        let win = self.window_mut(idx)?;
        if let Some(mode) = source.as_ref().and_then(|s| s.top_cell()).map(|c| c.mode) {
            win.set_mode(mode);
        }
        win.set_source(source);
        self.redisplay(idx, None)
    }

    pub fn set_context(&mut self, idx: usize, context: Option<ContextView>) -> Result<()> {
        self.window_mut(idx)?.set_context(context);
        self.redisplay(idx, None)
    }

    pub fn set_mode(&mut self, idx: usize, mode: DisplayMode) -> Result<()> {
        self.window_mut(idx)?.set_mode(mode);
        self.redisplay(idx, None)
    }

    pub fn set_view(&mut self, idx: usize, view: BBox) -> Result<()> {
        self.window_mut(idx)?.set_view(view);
        self.redisplay(idx, None)
    }

    pub fn center_view(&mut self, idx: usize, center: Point) -> Result<()> {
        self.window_mut(idx)?.center_view(center);
        self.redisplay(idx, None)
    }

    pub fn zoom(&mut self, idx: usize, factor: f64) -> Result<()> {
        self.window_mut(idx)?.zoom(factor);
        self.redisplay(idx, None)
    }

    pub fn pan(&mut self, idx: usize, dx: i32, dy: i32) -> Result<()> {
        self.window_mut(idx)?.pan(dx, dy);
        self.redisplay(idx, None)
    }

    pub fn fit(&mut self, idx: usize) -> Result<()> {
        self.window_mut(idx)?.fit();
        self.redisplay(idx, None)
    }

    pub fn previous_view(&mut self, idx: usize) -> Result<bool> {
        let moved = self.window_mut(idx)?.previous_view();
        if moved {
            self.redisplay(idx, None)?;
        }
        Ok(moved)
    }

    pub fn resize(&mut self, idx: usize, width: i32, height: i32) -> Result<()> {
        self.window_mut(idx)?.resize(width, height);
        self.redisplay(idx, None)
    }

    // Redisplay

    /// Recompose `area` of window `idx`, the whole window when `None`.
    /// While the window's guard is held the area is only queued.
    pub fn redisplay(&mut self, idx: usize, area: Option<BBox>) -> Result<()> {
        let win = self.window_mut(idx)?;
        let view = win.viewport();
        let rect = match area {
            Some(bb) => win.map.bbox_to_pixel(&bb).bloat(1).intersection(&view),
            None => Some(view),
        };
        if let Some(r) = rect {
            self.damage(idx, r)?;
        }
        Ok(())
    }

    /// Queue a pixel area for recomposition.
    pub fn damage(&mut self, idx: usize, r: PixRect) -> Result<()> {
        let win = self.window_mut(idx)?;
        win.redisplay.add_redisplay(r);
        if !win.redisplay.is_active() {
            self.pump(idx);
        }
        Ok(())
    }

    pub fn redisplay_all(&mut self) {
        for idx in self.indices() {
            // indices() only lists open windows
            let _ = self.redisplay(idx, None);
        }
    }

    pub fn push_redisplay(&mut self, idx: usize) -> Result<()> {
        self.window_mut(idx)?.redisplay.push();
        Ok(())
    }

    /// Release the guard; the outermost release services everything
    /// queued meanwhile.
    pub fn pop_redisplay(&mut self, idx: usize) -> Result<()> {
        if self.window_mut(idx)?.redisplay.pop() {
            self.pump(idx);
        }
        Ok(())
    }

    /// Refresh `area` of the screen from the backing pixmap.
    pub fn update(&mut self, idx: usize, area: Option<PixRect>) -> Result<()> {
        let win = self.window_mut(idx)?;
        let r = area.unwrap_or_else(|| win.viewport());
        win.redisplay.add_update(r);
        if !win.redisplay.is_active() {
            for r in win.redisplay.take_updates() {
                win.backend.copy_pixmap(r);
            }
            win.backend.update();
        }
        Ok(())
    }

    fn pump(&mut self, idx: usize) {
        self.cancel.reset();
        let mut interrupted = false;
        let mut overflow = false;
        loop {
            let Some(rects) = self
                .windows
                .get_mut(idx)
                .and_then(Option::as_mut)
                .and_then(|w| w.redisplay.begin_pass())
            else {
                break;
            };
            for r in rects {
                let stats = self.render_area(idx, r);
                overflow |= stats.depth_overflow;
                if stats.interrupted {
                    interrupted = true;
                    break;
                }
            }
            if let Some(w) = self.windows.get_mut(idx).and_then(Option::as_mut) {
                w.redisplay.end_pass();
            }
        }
        if let Some(w) = self.windows.get_mut(idx).and_then(Option::as_mut) {
            for r in w.redisplay.take_updates() {
                w.backend.copy_pixmap(r);
            }
            w.backend.update();
        }
        if overflow && !self.overflow_reported {
            self.overflow_reported = true;
            self.host.depth_overflow(idx, self.config.max_depth);
        }
        if interrupted {
            self.cancel.reset();
            self.host.redraw_interrupted(idx);
        }
    }

    /// Compose one clip rectangle: background, grid, geometry, overlays.
    fn render_area(&mut self, idx: usize, clip: PixRect) -> RenderStats {
        let Self {
            windows,
            config,
            colors,
            mfg,
            marks,
            user_marks,
            rulers,
            ghost,
            cancel,
            blink_phase,
            ..
        } = self;
        let Some(win) = windows.get_mut(idx).and_then(Option::as_mut) else {
            return RenderStats::default();
        };
        let WindowDesc {
            map,
            mode,
            source,
            context,
            attrib,
            cache,
            backend,
            last_stats,
            ..
        } = win;
        let mode = *mode;
        let Some(clip) = clip.intersection(&map.viewport()) else {
            return RenderStats::default();
        };
        map.set_clip(clip);
        backend.set_clip(Some(clip));

        let stats = {
            let view: &CoordMap = map;
            let attrib: &DspAttrib = attrib;
            let colors: &ColorTable = colors;
            let config: &DisplayConfig = config;
            let mfg: &MfgGrid = mfg;
            let be: &mut dyn Backend = &mut *backend;
            let mut guard = PixmapGuard::acquire(be, clip);
            let be: &mut dyn Backend = &mut *guard;
            cache.init();
            cache.enable(be, true);
            if be.leveled() {
                be.set_level(0);
            }
            cache.set_color(be, colors.get(mode, DisplayColor::Background));
            cache.add_solid_box(be, clip);

            let grid = attrib.grid(mode).clone();
            let draw_grid = |cache: &mut DrawCache, be: &mut dyn Backend| {
                GridContext {
                    map: view,
                    cache,
                    backend: be,
                    colors,
                    mode,
                    mfg,
                    threshold: config.grid_threshold,
                    origin: config.grid_origin,
                }
                .show_grid(&grid);
            };
            if !grid.on_top {
                draw_grid(&mut *cache, &mut *be);
            }

            let stats = match source.as_ref() {
                Some(src) => {
                    let input = RenderInput {
                        source: src,
                        map: view,
                        attrib,
                        mode,
                        colors,
                        config,
                        window: idx,
                        context: context.as_ref(),
                        cancel,
                    };
                    RenderPass::new(input, cache, be).run(view.clip_area())
                }
                None => RenderStats::default(),
            };

            if be.leveled() {
                cache.flush(be);
                be.set_level(TOP_LEVEL);
            }
            if grid.on_top {
                draw_grid(&mut *cache, &mut *be);
            }

            let mut ctx = MarkContext {
                map: view,
                cache,
                backend: be,
                colors,
                mode,
                size: config.mark_size,
            };
            marks.show_all(&mut ctx, &clip);
            if let Some(src) = source.as_ref() {
                for m in user_marks.marks(&src.name(), mode) {
                    if m.pixel_bbox(view).intersects(&clip) {
                        m.show(&mut ctx, *blink_phase);
                    }
                }
            }
            for r in rulers.for_window(idx).filter(|r| r.mode == mode) {
                r.show(&mut ctx);
            }
            if let Some(g) = ghost.as_ref().filter(|g| g.window == idx) {
                if !ctx.backend.dual_plane() {
                    g.show(&mut ctx);
                }
            }
            ctx.cache.flush(ctx.backend);
            ctx.cache.enable(ctx.backend, false);
            stats
        };

        backend.set_clip(None);
        map.reset_clip();
        *last_stats = stats;
        stats
    }

    // Image composition

    /// Render `area` of `source` into a `width` x `height` image in one
    /// leveled traversal, using the main window's attributes.
    pub fn compose_image(
        &self,
        source: &DisplaySource,
        area: BBox,
        width: i32,
        height: i32,
    ) -> Result<LeveledImage> {
        if width < 1 || height < 1 {
            return Err(DisplayError::InvalidInput(format!(
                "image size {width}x{height}"
            )));
        }
        let area = source
            .bbox()
            .and_then(|bb| bb.intersection(&area))
            .ok_or(DisplayError::NoIntersection)?;
        self.cancel.reset();
        let mode = source
            .top_cell()
            .map(|c| c.mode)
            .unwrap_or(DisplayMode::Physical);
        let attrib = self.window(0)?.attrib().clone();
        let map = CoordMap::new(width, height, area);
        let mut image = LeveledImage::new(width, height);
        let mut cache = DrawCache::new(self.config.cache_size);
        cache.enable(&mut image, true);
        image.set_level(0);
        cache.set_color(&mut image, self.colors.get(mode, DisplayColor::Background));
        cache.add_solid_box(&mut image, map.viewport());
        cache.flush(&mut image);
        let input = RenderInput {
            source,
            map: &map,
            attrib: &attrib,
            mode,
            colors: &self.colors,
            config: &self.config,
            window: usize::MAX,
            context: None,
            cancel: &self.cancel,
        };
        let stats = RenderPass::new(input, &mut cache, &mut image).run(map.clip_area());
        if stats.depth_overflow {
            return Err(DisplayError::DepthOverflow(self.config.max_depth));
        }
        log::debug!(
            "[DISPLAY] composed {}x{} image of {}: {} objects",
            width,
            height,
            source.name(),
            stats.objects
        );
        Ok(image)
    }

    /// Like [`Display::compose_image`], but failures are reported through
    /// the host. An area that misses the source is not a failure.
    pub fn thumbnail(
        &mut self,
        source: &DisplaySource,
        area: BBox,
        width: i32,
        height: i32,
    ) -> Option<LeveledImage> {
        match self.compose_image(source, area, width, height) {
            Ok(image) => Some(image),
            Err(DisplayError::NoIntersection) => {
                log::debug!("[DISPLAY] thumbnail area misses {}", source.name());
                None
            }
            Err(e) => {
                self.host.show_message(&format!("Image creation failed: {e}"));
                None
            }
        }
    }

    // Marks

    /// Register and paint a mark in every window of its mode.
    pub fn add_mark(&mut self, mark: Mark) {
        let mark = self.marks.add(mark).clone();
        if self.marks.erase_behind() && mark.kind().is_terminal() {
            self.damage_marks(std::slice::from_ref(&mark));
            return;
        }
        for idx in self.indices() {
            self.paint(idx, |ctx| {
                if ctx.mode == mark.mode() {
                    mark.show(ctx);
                }
            });
        }
    }

    /// Remove marks matching `mark` and restore what they covered.
    pub fn erase_mark(&mut self, mark: &Mark) -> usize {
        let removed = self.marks.remove(mark);
        self.damage_marks(&removed);
        removed.len()
    }

    pub fn clear_marks(&mut self, kind: Option<MarkKind>) -> usize {
        let removed = match kind {
            Some(k) => self.marks.clear_kind(k),
            None => self.marks.clear(),
        };
        self.damage_marks(&removed);
        removed.len()
    }

    /// Forget marks of a terminal that was deleted.
    pub fn purge_terminal(&mut self, term: TermId) -> usize {
        let removed = self.marks.purge_terminal(term);
        self.damage_marks(&removed);
        removed.len()
    }

    pub fn purge_instance(&mut self, inst: InstId) -> usize {
        let removed = self.marks.purge_instance(inst);
        self.damage_marks(&removed);
        removed.len()
    }

    fn damage_marks(&mut self, marks: &[Mark]) {
        if marks.is_empty() {
            return;
        }
        let size = self.config.mark_size;
        for idx in self.indices() {
            let released = {
                let colors = &self.colors;
                let Some(win) = self.windows.get_mut(idx).and_then(Option::as_mut) else {
                    continue;
                };
                let mode = win.mode;
                let mut xor_erased = false;
                win.redisplay.push();
                for m in marks.iter().filter(|m| m.mode() == mode) {
                    // XOR ghosts vanish when drawn again
                    if matches!(m, Mark::Box { selected: true, .. }) && win.backend.dual_plane() {
                        let mut ctx = MarkContext {
                            map: &win.map,
                            cache: &mut win.cache,
                            backend: &mut win.backend,
                            colors,
                            mode,
                            size,
                        };
                        m.show(&mut ctx);
                        ctx.cache.flush(ctx.backend);
                        xor_erased = true;
                        continue;
                    }
                    let r = m.pixel_bbox(&win.map, size, &win.backend);
                    if let Some(r) = r.intersection(&win.map.viewport()) {
                        win.redisplay.add_redisplay(r);
                    }
                }
                if xor_erased {
                    win.backend.update();
                }
                win.redisplay.pop()
            };
            if released {
                self.pump(idx);
            }
        }
    }

    /// Draw directly on window `idx` outside a redisplay pass.
    fn paint(&mut self, idx: usize, f: impl FnOnce(&mut MarkContext<'_>)) {
        let size = self.config.mark_size;
        let colors = &self.colors;
        let Some(win) = self.windows.get_mut(idx).and_then(Option::as_mut) else {
            return;
        };
        let mode = win.mode;
        let mut ctx = MarkContext {
            map: &win.map,
            cache: &mut win.cache,
            backend: &mut win.backend,
            colors,
            mode,
            size,
        };
        if ctx.backend.leveled() {
            ctx.backend.set_level(TOP_LEVEL);
        }
        f(&mut ctx);
        ctx.cache.flush(ctx.backend);
        win.backend.update();
    }

    // User marks

    fn cell_of(&self, idx: usize) -> Result<(String, DisplayMode)> {
        let win = self.window(idx)?;
        let src = win
            .source()
            .ok_or_else(|| DisplayError::UnknownCell(format!("<none in window {idx}>")))?;
        Ok((src.name(), win.mode()))
    }

    /// Windows showing `cell` in `mode`.
    fn showing(&self, cell: &str, mode: DisplayMode) -> Vec<usize> {
        self.windows()
            .filter(|w| w.mode() == mode && w.source().is_some_and(|s| s.name() == cell))
            .map(|w| w.index())
            .collect()
    }

    /// Attach a user mark to the cell shown in window `idx`.
    pub fn add_user_mark(&mut self, idx: usize, mark: UserMark) -> Result<()> {
        let (cell, mode) = self.cell_of(idx)?;
        self.user_marks.add(&cell, mode, mark.clone());
        let phase = self.blink_phase;
        for w in self.showing(&cell, mode) {
            self.paint(w, |ctx| mark.show(ctx, phase));
        }
        Ok(())
    }

    pub fn remove_user_mark(&mut self, idx: usize, index: usize) -> Result<Option<UserMark>> {
        let (cell, mode) = self.cell_of(idx)?;
        let removed = self.user_marks.remove(&cell, mode, index);
        if let Some(m) = &removed {
            for w in self.showing(&cell, mode) {
                let r = m.pixel_bbox(&self.window(w)?.map);
                self.damage(w, r)?;
            }
        }
        Ok(removed)
    }

    pub fn save_user_marks(&self, idx: usize, path: &Path) -> Result<usize> {
        let (cell, mode) = self.cell_of(idx)?;
        self.user_marks.save(path, &cell, mode)
    }

    /// Load a mark file and redraw the windows that show its cell. Bad
    /// lines are collected in `log`.
    pub fn load_user_marks(&mut self, path: &Path, log: &mut ErrorLog) -> Result<usize> {
        let n = self.user_marks.load(path, log)?;
        self.redisplay_all();
        Ok(n)
    }

    /// Advance the blink phase and repaint blinking user marks. Returns
    /// true if any were repainted.
    pub fn blink_tick(&mut self) -> bool {
        self.blink_phase = !self.blink_phase;
        let phase = self.blink_phase;
        let mut any = false;
        for idx in self.indices() {
            let Ok((cell, mode)) = self.cell_of(idx) else {
                continue;
            };
            if !self.user_marks.has_blinking(&cell, mode) {
                continue;
            }
            any = true;
            let blinking: Vec<UserMark> = self
                .user_marks
                .marks(&cell, mode)
                .iter()
                .filter(|m| m.attr.contains(UserMarkAttr::BLINK))
                .cloned()
                .collect();
            self.paint(idx, |ctx| {
                for m in &blinking {
                    m.show(ctx, phase);
                }
            });
        }
        any
    }

    // Rulers

    pub fn add_ruler(&mut self, idx: usize, from: Point, to: Point) -> Result<u64> {
        let mode = self.window(idx)?.mode();
        let ruler = self.rulers.add(idx, mode, from, to).clone();
        self.paint(idx, |ctx| ruler.show(ctx));
        Ok(ruler.id)
    }

    /// Continue ruler `id` to `to`.
    pub fn chain_ruler(&mut self, id: u64, to: Point) -> Option<u64> {
        let ruler = self.rulers.chain(id, to)?.clone();
        self.paint(ruler.window, |ctx| ruler.show(ctx));
        Some(ruler.id)
    }

    pub fn set_ruler_offset(&mut self, id: u64, offset: i32) -> Result<()> {
        let Some(old) = self.rulers.set_offset(id, offset) else {
            return Ok(());
        };
        self.damage_ruler(&old)?;
        if let Some(new) = self.rulers.get(id).cloned() {
            self.damage_ruler(&new)?;
        }
        Ok(())
    }

    pub fn remove_ruler(&mut self, id: u64) -> Result<bool> {
        match self.rulers.remove(id) {
            Some(r) => {
                self.damage_ruler(&r)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn damage_ruler(&mut self, ruler: &Ruler) -> Result<()> {
        let size = self.config.mark_size;
        let win = self.window(ruler.window)?;
        let r = ruler.pixel_bbox(&win.map, size, &win.backend);
        self.damage(ruler.window, r)
    }

    /// Move the rubber-band ruler of window `idx`, or remove it with
    /// `None`. Dual-plane backends redraw it in XOR, others recompose the
    /// damaged area.
    pub fn set_ghost_ruler(&mut self, idx: usize, span: Option<(Point, Point)>) -> Result<()> {
        let mode = self.window(idx)?.mode();
        let old = self.ghost.take();
        let new = span.map(|(from, to)| Ruler {
            id: 0,
            window: idx,
            mode,
            from,
            to,
            offset: 0,
        });
        if self.window(idx)?.backend().dual_plane() {
            self.ghost = new.clone();
            let stale = old.filter(|g| g.window == idx);
            self.paint(idx, |ctx| {
                ctx.backend.set_ghost(true);
                for g in stale.iter().chain(new.iter()) {
                    g.show(ctx);
                    ctx.cache.flush(ctx.backend);
                }
                ctx.backend.set_ghost(false);
            });
            return Ok(());
        }
        self.ghost = new;
        let size = self.config.mark_size;
        self.push_redisplay(idx)?;
        for g in old.iter().chain(self.ghost.clone().iter()) {
            if let Ok(win) = self.window(g.window) {
                let r = g.pixel_bbox(&win.map, size, &win.backend);
                self.damage(g.window, r)?;
            }
        }
        self.pop_redisplay(idx)
    }

    pub fn ghost_ruler(&self) -> Option<&Ruler> {
        self.ghost.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawList, DrawOp, FillPattern, LineStyle, PixPoint, PixSeg, TextStyle};
    use crate::db::{CellDesc, Database, InstanceDesc, LayerDesc};
    use crate::geom::Transform;
    use egui::Color32;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct Messages(Rc<RefCell<Vec<String>>>);

    impl DisplayHost for Messages {
        fn show_message(&mut self, msg: &str) {
            self.0.borrow_mut().push(msg.to_string());
        }
    }

    fn display() -> Display<DrawList> {
        Display::new(DrawList::new(), 100, 100, DisplayConfig::default()).unwrap()
    }

    fn source() -> DisplaySource {
        let mut db = Database::new();
        let m1 = db.add_layer(LayerDesc::new("M1", Color32::RED));
        let leaf = db
            .add_cell(CellDesc::new("leaf", DisplayMode::Physical).with_box(m1, BBox::new(0, 0, 50, 50)))
            .unwrap();
        let top = db
            .add_cell(
                CellDesc::new("top", DisplayMode::Physical)
                    .with_instance(InstanceDesc::new(1, leaf, Transform::translate(10, 10))),
            )
            .unwrap();
        DisplaySource::cell(Rc::new(db), top)
    }

    #[test]
    fn test_window_limit_and_close() {
        let mut d = display();
        for _ in 0..4 {
            d.open_window(DrawList::new(), 50, 50).unwrap();
        }
        assert!(matches!(
            d.open_window(DrawList::new(), 50, 50),
            Err(DisplayError::WindowLimit(5))
        ));
        assert!(matches!(d.close_window(0), Err(DisplayError::MainWindow)));
        d.close_window(2).unwrap();
        assert!(matches!(d.window(2), Err(DisplayError::NoWindow(2))));
        assert_eq!(d.open_window(DrawList::new(), 50, 50).unwrap(), 2);
    }

    #[test]
    fn test_sub_window_copies_attributes() {
        let mut d = display();
        d.window_mut(0).unwrap().attrib_mut().tiny_bb = false;
        let idx = d.open_window(DrawList::new(), 50, 50).unwrap();
        assert!(!d.window(idx).unwrap().attrib().tiny_bb);
        d.window_mut(idx).unwrap().attrib_mut().tiny_bb = true;
        assert!(!d.window(0).unwrap().attrib().tiny_bb);
    }

    #[test]
    fn test_guard_coalesces() {
        let mut d = display();
        d.set_source(0, Some(source())).unwrap();
        let before = d.window(0).unwrap().redisplay_state().passes();
        d.push_redisplay(0).unwrap();
        d.redisplay(0, Some(BBox::new(10, 10, 15, 15))).unwrap();
        d.redisplay(0, Some(BBox::new(50, 50, 55, 55))).unwrap();
        assert_eq!(d.window(0).unwrap().redisplay_state().passes(), before);
        assert_eq!(d.window(0).unwrap().redisplay_state().pending().len(), 2);
        d.pop_redisplay(0).unwrap();
        assert_eq!(d.window(0).unwrap().redisplay_state().passes(), before + 1);
        assert!(!d.window(0).unwrap().redisplay_state().has_work());
    }

    /// Recording backend that requests an interrupt on its first box,
    /// as a user would while a redraw runs.
    #[derive(Default)]
    struct Interrupting {
        list: DrawList,
        cancel: Option<CancelToken>,
    }

    impl Backend for Interrupting {
        fn set_color(&mut self, color: Color32) {
            self.list.set_color(color);
        }

        fn set_fill(&mut self, fill: Option<&FillPattern>) {
            self.list.set_fill(fill);
        }

        fn set_line_style(&mut self, style: Option<LineStyle>) {
            self.list.set_line_style(style);
        }

        fn draw_box(&mut self, rect: PixRect) {
            if let Some(c) = self.cancel.take() {
                c.cancel();
            }
            self.list.draw_box(rect);
        }

        fn draw_line(&mut self, seg: PixSeg) {
            self.list.draw_line(seg);
        }

        fn draw_pixel(&mut self, p: PixPoint) {
            self.list.draw_pixel(p);
        }

        fn draw_polygon(&mut self, points: &[PixPoint]) {
            self.list.draw_polygon(points);
        }

        fn draw_ellipse(&mut self, center: PixPoint, rx: i32, ry: i32, filled: bool) {
            self.list.draw_ellipse(center, rx, ry, filled);
        }

        fn draw_text(&mut self, text: &str, x: i32, y: i32, style: &TextStyle) {
            self.list.draw_text(text, x, y, style);
        }
    }

    fn many_boxes(n: i32) -> DisplaySource {
        let mut db = Database::new();
        let m1 = db.add_layer(LayerDesc::new("M1", Color32::RED));
        let mut cell = CellDesc::new("big", DisplayMode::Physical);
        for i in 0..n {
            let x = (i % 40) * 2;
            let y = (i / 40) * 2;
            cell = cell.with_box(m1, BBox::new(x, y, x + 1, y + 1));
        }
        let top = db.add_cell(cell).unwrap();
        DisplaySource::cell(Rc::new(db), top)
    }

    #[test]
    fn test_interrupt_notifies_host() {
        let msgs = Messages::default();
        let mut d = Display::new(
            Interrupting::default(),
            100,
            100,
            DisplayConfig {
                interrupt_cadence: 1,
                ..DisplayConfig::default()
            },
        )
        .unwrap()
        .with_host(Box::new(msgs.clone()));
        let token = d.cancel_token();
        d.window_mut(0).unwrap().backend_mut().cancel = Some(token);
        d.set_source(0, Some(many_boxes(50))).unwrap();
        assert!(d.window(0).unwrap().last_stats().interrupted);
        assert_eq!(msgs.0.borrow().len(), 1);
        assert!(!d.cancel_token().is_cancelled());
    }

    #[test]
    fn test_idle_interrupt_is_dropped() {
        let msgs = Messages::default();
        let mut d = display().with_host(Box::new(msgs.clone()));
        d.interrupt();
        d.set_source(0, Some(many_boxes(1000))).unwrap();
        let stats = d.window(0).unwrap().last_stats();
        assert!(!stats.interrupted);
        assert!(stats.objects >= 1000);
        assert!(msgs.0.borrow().is_empty());

        d.interrupt();
        let src = many_boxes(1000);
        let area = src.bbox().unwrap();
        assert!(d.compose_image(&src, area, 50, 50).is_ok());
        assert!(!d.cancel_token().is_cancelled());
    }

    #[test]
    fn test_thumbnail_misses_silently() {
        let msgs = Messages::default();
        let mut d = display().with_host(Box::new(msgs.clone()));
        let src = source();
        assert!(d.thumbnail(&src, BBox::new(1000, 1000, 2000, 2000), 10, 10).is_none());
        assert!(msgs.0.borrow().is_empty());
        assert!(d.thumbnail(&src, BBox::new(0, 0, 100, 100), 0, 10).is_none());
        assert_eq!(msgs.0.borrow().len(), 1);
        assert!(d.thumbnail(&src, BBox::new(0, 0, 100, 100), 20, 20).is_some());
    }

    #[test]
    fn test_erase_mark_redisplays_its_area() {
        let mut d = display();
        let mark = Mark::Cross {
            pos: Point::new(50, 50),
            mode: DisplayMode::Physical,
        };
        d.add_mark(mark.clone());
        d.window_mut(0).unwrap().backend_mut().clear();
        assert_eq!(d.erase_mark(&mark), 1);
        let be = d.window(0).unwrap().backend();
        let bg = d.colors().get(DisplayMode::Physical, DisplayColor::Background);
        let cleared = be.boxes_with_color(bg);
        assert_eq!(cleared.len(), 1);
        let size = d.config().mark_size;
        assert!(cleared[0].contains(50 - size, 50 - size));
        assert!(cleared[0].contains(50 + size, 50 + size));
        assert!(!be.ops.iter().any(|op| matches!(op, DrawOp::Line { .. })));
    }
}
