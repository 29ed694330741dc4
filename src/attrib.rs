// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

use serde::{Deserialize, Serialize};

use crate::db::DisplayMode;
use crate::grid::GridDesc;

/// Instance expansion depth.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expansion {
    #[default]
    None,
    Levels(u32),
    Unlimited,
}

impl Expansion {
    /// Signed encoding: -1 unlimited, 0 none, N levels.
    pub fn from_level(level: i32) -> Self {
        match level {
            l if l < 0 => Expansion::Unlimited,
            0 => Expansion::None,
            l => Expansion::Levels(l as u32),
        }
    }

    pub fn level(self) -> i32 {
        match self {
            Expansion::None => 0,
            Expansion::Levels(n) => n as i32,
            Expansion::Unlimited => -1,
        }
    }

    /// Whether an instance found at hierarchy depth `hierlev` is drawn in
    /// full.
    pub fn permits(self, hierlev: u32) -> bool {
        match self {
            Expansion::None => false,
            Expansion::Levels(n) => hierlev < n,
            Expansion::Unlimited => true,
        }
    }
}

/// What unexpanded instances show besides their outline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstLabels {
    Off,
    #[default]
    Name,
    NameAndSize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelDisplay {
    Off,
    /// Top-level labels only.
    TopOnly,
    #[default]
    All,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeSnap {
    Off,
    #[default]
    Some,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowFlags {
    pub boxes: bool,
    pub polys: bool,
    pub wires: bool,
    pub labels: bool,
    pub highlighting: bool,
}

impl Default for ShowFlags {
    fn default() -> Self {
        Self {
            boxes: true,
            polys: true,
            wires: true,
            labels: true,
            highlighting: true,
        }
    }
}

/// Per-window display attributes, copied by value into new sub-windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DspAttrib {
    grids: [GridDesc; 2],
    expansion: [Expansion; 2],
    pub labels: LabelDisplay,
    pub inst_labels: InstLabels,
    pub context: bool,
    pub tiny_bb: bool,
    pub edge_snap: EdgeSnap,
    pub show: ShowFlags,
    /// Draw the symbolic representation of electrical cells.
    pub symbolic: bool,
}

impl Default for DspAttrib {
    fn default() -> Self {
        Self {
            grids: [GridDesc::default(), GridDesc::electrical()],
            expansion: [Expansion::None; 2],
            labels: LabelDisplay::default(),
            inst_labels: InstLabels::default(),
            context: true,
            tiny_bb: true,
            edge_snap: EdgeSnap::default(),
            show: ShowFlags::default(),
            symbolic: true,
        }
    }
}

impl DspAttrib {
    pub fn grid(&self, mode: DisplayMode) -> &GridDesc {
        &self.grids[mode.index()]
    }

    pub fn grid_mut(&mut self, mode: DisplayMode) -> &mut GridDesc {
        &mut self.grids[mode.index()]
    }

    pub fn set_grid(&mut self, mode: DisplayMode, grid: GridDesc) {
        self.grids[mode.index()] = grid;
    }

    pub fn expansion(&self, mode: DisplayMode) -> Expansion {
        self.expansion[mode.index()]
    }

    pub fn set_expansion(&mut self, mode: DisplayMode, exp: Expansion) {
        self.expansion[mode.index()] = exp;
    }

    pub fn set_expand_level(&mut self, mode: DisplayMode, level: i32) {
        self.set_expansion(mode, Expansion::from_level(level));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expansion_levels() {
        assert_eq!(Expansion::from_level(-1), Expansion::Unlimited);
        assert_eq!(Expansion::from_level(0), Expansion::None);
        assert_eq!(Expansion::from_level(2).level(), 2);
        assert!(!Expansion::None.permits(0));
        assert!(Expansion::Levels(2).permits(1));
        assert!(!Expansion::Levels(2).permits(2));
        assert!(Expansion::Unlimited.permits(1000));
    }

    #[test]
    fn test_copy_is_independent() {
        let mut main = DspAttrib::default();
        main.set_expand_level(DisplayMode::Physical, 3);
        let mut sub = main.clone();
        sub.grid_mut(DisplayMode::Physical).spacing = 2.0;
        assert_eq!(sub.expansion(DisplayMode::Physical), Expansion::Levels(3));
        assert_eq!(main.grid(DisplayMode::Physical).spacing, 1.0);
    }
}
