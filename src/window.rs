// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Per-window view state.

use std::collections::VecDeque;

use crate::attrib::DspAttrib;
use crate::backend::{Backend, PixRect};
use crate::cache::DrawCache;
use crate::config::DisplayConfig;
use crate::db::{DisplayMode, DisplaySource};
use crate::geom::{BBox, Point};
use crate::mapper::CoordMap;
use crate::redisplay::RedisplayController;
use crate::render::{ContextView, RenderStats};

pub const VIEW_HISTORY_DEPTH: usize = 16;

/// Previously shown window rectangles, most recent last.
#[derive(Debug, Default, Clone)]
pub struct ViewHistory {
    views: VecDeque<BBox>,
}

impl ViewHistory {
    pub fn push(&mut self, view: BBox) {
        if self.views.back() == Some(&view) {
            return;
        }
        if self.views.len() == VIEW_HISTORY_DEPTH {
            self.views.pop_front();
        }
        self.views.push_back(view);
    }

    pub fn pop(&mut self) -> Option<BBox> {
        self.views.pop_back()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }
}

/// One drawing surface: its mapping, attributes, source and backend.
pub struct WindowDesc<B: Backend> {
    index: usize,
    pub(crate) map: CoordMap,
    pub(crate) mode: DisplayMode,
    pub(crate) source: Option<DisplaySource>,
    pub(crate) context: Option<ContextView>,
    pub(crate) attrib: DspAttrib,
    history: ViewHistory,
    pub(crate) cache: DrawCache,
    pub(crate) redisplay: RedisplayController,
    pub(crate) backend: B,
    pub(crate) last_stats: RenderStats,
}

impl<B: Backend> WindowDesc<B> {
    pub fn new(index: usize, backend: B, width: i32, height: i32, config: &DisplayConfig) -> Self {
        Self {
            index,
            map: CoordMap::new(width, height, BBox::new(0, 0, width.max(1), height.max(1))),
            mode: DisplayMode::Physical,
            source: None,
            context: None,
            attrib: DspAttrib::default(),
            history: ViewHistory::default(),
            cache: DrawCache::new(config.cache_size),
            redisplay: RedisplayController::new(),
            backend,
            last_stats: RenderStats::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn map(&self) -> &CoordMap {
        &self.map
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    pub fn source(&self) -> Option<&DisplaySource> {
        self.source.as_ref()
    }

    /// Show `source`, fitted to the window, and forget the view history.
    pub fn set_source(&mut self, source: Option<DisplaySource>) {
        self.source = source;
        self.context = None;
        self.history.clear();
        self.fit();
    }

    pub fn context(&self) -> Option<&ContextView> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: Option<ContextView>) {
        self.context = context;
    }

    pub fn attrib(&self) -> &DspAttrib {
        &self.attrib
    }

    pub fn attrib_mut(&mut self) -> &mut DspAttrib {
        &mut self.attrib
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn cache(&self) -> &DrawCache {
        &self.cache
    }

    pub fn redisplay_state(&self) -> &RedisplayController {
        &self.redisplay
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    pub fn history(&self) -> &ViewHistory {
        &self.history
    }

    pub fn viewport(&self) -> PixRect {
        self.map.viewport()
    }

    /// Show `view`, remembering the current one.
    pub fn set_view(&mut self, view: BBox) {
        self.history.push(self.map.window());
        self.map.set_window(view);
    }

    pub fn center_view(&mut self, center: Point) {
        self.history.push(self.map.window());
        self.map.recenter(center);
    }

    pub fn zoom(&mut self, factor: f64) {
        self.history.push(self.map.window());
        self.map.zoom(factor);
    }

    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.map.pan(dx, dy);
    }

    /// Back to the view before the last `set_view`, `center_view` or `zoom`.
    pub fn previous_view(&mut self) -> bool {
        match self.history.pop() {
            Some(view) => {
                let ratio = self.map.width() as f64 / view.width().max(1) as f64;
                self.map.set_ratio(ratio);
                self.map.recenter(view.center());
                true
            }
            None => false,
        }
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        self.map.set_viewport(width, height);
    }

    /// Fit the whole source, with a small margin.
    pub fn fit(&mut self) {
        if let Some(bb) = self.source.as_ref().and_then(|s| s.bbox()) {
            let margin = (bb.width().max(bb.height()) / 20).max(1);
            self.map.fit_window(bb.bloat(margin));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DrawList;

    #[test]
    fn test_history_capped() {
        let mut h = ViewHistory::default();
        for i in 0..20 {
            h.push(BBox::new(0, 0, 10 + i, 10));
        }
        assert_eq!(h.len(), VIEW_HISTORY_DEPTH);
        assert_eq!(h.pop(), Some(BBox::new(0, 0, 29, 10)));
    }

    #[test]
    fn test_previous_view_restores() {
        let mut w = WindowDesc::new(0, DrawList::new(), 100, 100, &DisplayConfig::default());
        w.set_view(BBox::new(0, 0, 1000, 1000));
        let before = w.map().window();
        w.zoom(2.0);
        assert_ne!(w.map().window(), before);
        assert!(w.previous_view());
        assert_eq!(w.map().window(), before);
    }
}
