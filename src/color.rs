// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Display color table and the darkened palette used for context display.

use egui::Color32;
use serde::{Deserialize, Serialize};

use crate::db::{DisplayMode, LayerDesc};

/// Fixed display colors, separate from layer colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayColor {
    Background,
    Ghost,
    Highlighting,
    Select,
    Marker,
    InstanceBB,
    InstanceName,
    InstanceSize,
    FineGrid,
    CoarseGrid,
    Axes,
    Ruler,
    Terminal,
    Plot,
    UserMark,
    UserMarkAlt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeColors {
    pub background: Color32,
    pub ghost: Color32,
    pub highlighting: Color32,
    pub select: Color32,
    pub marker: Color32,
    pub instance_bb: Color32,
    pub instance_name: Color32,
    pub instance_size: Color32,
    pub fine_grid: Color32,
    pub coarse_grid: Color32,
    pub axes: Color32,
    pub ruler: Color32,
    pub terminal: Color32,
    pub plot: Color32,
    pub user_mark: Color32,
    pub user_mark_alt: Color32,
}

impl ModeColors {
    fn physical() -> Self {
        Self {
            background: Color32::BLACK,
            ghost: Color32::WHITE,
            highlighting: Color32::from_rgb(255, 255, 255),
            select: Color32::from_rgb(255, 255, 0),
            marker: Color32::from_rgb(255, 165, 0),
            instance_bb: Color32::from_rgb(255, 255, 255),
            instance_name: Color32::from_rgb(255, 255, 255),
            instance_size: Color32::from_rgb(160, 160, 160),
            fine_grid: Color32::from_rgb(90, 90, 90),
            coarse_grid: Color32::from_rgb(140, 140, 140),
            axes: Color32::from_rgb(200, 200, 200),
            ruler: Color32::from_rgb(255, 255, 160),
            terminal: Color32::from_rgb(255, 80, 80),
            plot: Color32::from_rgb(0, 255, 255),
            user_mark: Color32::from_rgb(255, 128, 255),
            user_mark_alt: Color32::from_rgb(128, 255, 128),
        }
    }

    fn electrical() -> Self {
        Self {
            background: Color32::from_rgb(16, 16, 40),
            instance_bb: Color32::from_rgb(200, 200, 255),
            terminal: Color32::from_rgb(255, 100, 100),
            ..Self::physical()
        }
    }

    pub fn get(&self, c: DisplayColor) -> Color32 {
        match c {
            DisplayColor::Background => self.background,
            DisplayColor::Ghost => self.ghost,
            DisplayColor::Highlighting => self.highlighting,
            DisplayColor::Select => self.select,
            DisplayColor::Marker => self.marker,
            DisplayColor::InstanceBB => self.instance_bb,
            DisplayColor::InstanceName => self.instance_name,
            DisplayColor::InstanceSize => self.instance_size,
            DisplayColor::FineGrid => self.fine_grid,
            DisplayColor::CoarseGrid => self.coarse_grid,
            DisplayColor::Axes => self.axes,
            DisplayColor::Ruler => self.ruler,
            DisplayColor::Terminal => self.terminal,
            DisplayColor::Plot => self.plot,
            DisplayColor::UserMark => self.user_mark,
            DisplayColor::UserMarkAlt => self.user_mark_alt,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorTable {
    modes: [ModeColors; 2],
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            modes: [ModeColors::physical(), ModeColors::electrical()],
        }
    }
}

impl ColorTable {
    pub fn get(&self, mode: DisplayMode, c: DisplayColor) -> Color32 {
        self.modes[mode.index()].get(c)
    }

    pub fn mode(&self, mode: DisplayMode) -> &ModeColors {
        &self.modes[mode.index()]
    }

    pub fn mode_mut(&mut self, mode: DisplayMode) -> &mut ModeColors {
        &mut self.modes[mode.index()]
    }
}

/// Blend `color` toward `background` by `percent` (0 leaves it unchanged,
/// 100 yields the background).
pub fn darken(color: Color32, background: Color32, percent: u8) -> Color32 {
    let p = percent.min(100) as u32;
    let mix = |c: u8, b: u8| ((c as u32 * (100 - p) + b as u32 * p) / 100) as u8;
    Color32::from_rgb(
        mix(color.r(), background.r()),
        mix(color.g(), background.g()),
        mix(color.b(), background.b()),
    )
}

/// Dark variants of every layer color, computed once per context pass.
#[derive(Debug, Clone)]
pub struct DarkPalette {
    layers: Vec<Color32>,
    instance_bb: Color32,
}

impl DarkPalette {
    pub fn new(layers: &[LayerDesc], colors: &ModeColors, percent: u8) -> Self {
        Self {
            layers: layers
                .iter()
                .map(|l| darken(l.color, colors.background, percent))
                .collect(),
            instance_bb: darken(colors.instance_bb, colors.background, percent),
        }
    }

    pub fn layer(&self, index: usize) -> Option<Color32> {
        self.layers.get(index).copied()
    }

    pub fn instance_bb(&self) -> Color32 {
        self.instance_bb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_darken_extremes() {
        let c = Color32::from_rgb(200, 100, 50);
        assert_eq!(darken(c, Color32::BLACK, 0), c);
        assert_eq!(darken(c, Color32::BLACK, 100), Color32::BLACK);
        assert_eq!(darken(c, Color32::BLACK, 50), Color32::from_rgb(100, 50, 25));
    }

    #[test]
    fn test_palette_per_layer() {
        let layers = vec![
            LayerDesc::new("M1", Color32::from_rgb(0, 150, 254)),
            LayerDesc::new("M2", Color32::from_rgb(254, 100, 100)),
        ];
        let table = ColorTable::default();
        let pal = DarkPalette::new(&layers, table.mode(DisplayMode::Physical), 50);
        assert_eq!(pal.layer(0), Some(Color32::from_rgb(0, 75, 127)));
        assert_eq!(pal.layer(1), Some(Color32::from_rgb(127, 50, 50)));
        assert_eq!(pal.layer(2), None);
    }
}
