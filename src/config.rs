// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Display tunables, loaded from and saved to TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::cache::DEFAULT_CACHE_SIZE;
use crate::error::{DisplayError, Result};
use crate::geom::Point;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Grid spacing in pixels below which a grid level is not drawn.
    pub grid_threshold: f64,
    /// Instances narrower and shorter than this many pixels are shown as
    /// outlines only.
    pub min_cell_pixels: i32,
    /// Half-size of the diamond shown for empty cells.
    pub empty_marker_size: i32,
    pub context_darkening: u8,
    pub erase_behind: bool,
    /// Skip the empty-cell and unexpanded-instance representations.
    pub suppress_unexpand: bool,
    pub interrupt_cadence: usize,
    pub max_depth: usize,
    pub cache_size: usize,
    /// Symbolic preview is drawn once the symbol spans this many pixels.
    pub symbolic_preview_pixels: i32,
    pub label_min_pixels: i32,
    pub mark_size: i32,
    pub max_subwindows: usize,
    pub grid_origin: Point,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            grid_threshold: 8.0,
            min_cell_pixels: 4,
            empty_marker_size: 4,
            context_darkening: 50,
            erase_behind: false,
            suppress_unexpand: false,
            interrupt_cadence: 256,
            max_depth: 40,
            cache_size: DEFAULT_CACHE_SIZE,
            symbolic_preview_pixels: 120,
            label_min_pixels: 6,
            mark_size: 6,
            max_subwindows: 4,
            grid_origin: Point::new(0, 0),
        }
    }
}

impl DisplayConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: DisplayConfig =
            toml::from_str(text).map_err(|e| DisplayError::Config(e.to_string()))?;
        config.validated()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DisplayError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        log::info!("[CONFIG] loaded {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        log::info!("[CONFIG] saved {}", path.display());
        Ok(())
    }

    pub(crate) fn validated(mut self) -> Result<Self> {
        if self.grid_threshold.is_nan() || self.grid_threshold < 0.0 {
            return Err(DisplayError::Config(format!(
                "grid_threshold must be non-negative, got {}",
                self.grid_threshold
            )));
        }
        if self.max_depth == 0 {
            return Err(DisplayError::Config("max_depth must be at least 1".into()));
        }
        self.context_darkening = self.context_darkening.min(100);
        self.interrupt_cadence = self.interrupt_cadence.max(1);
        self.cache_size = self.cache_size.max(1);
        Ok(self)
    }
}
