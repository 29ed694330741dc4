// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Layout Compositor Library
//!
//! This library draws hierarchical IC layout and schematic cells into
//! one or more windows: coordinate mapping, instance expansion, grids,
//! marks, rulers and damage-driven redisplay over a pluggable graphics
//! backend.

pub mod attrib;
pub mod backend;
pub mod cache;
pub mod color;
pub mod config;
pub mod db;
pub mod display;
pub mod egui_backend;
pub mod error;
pub mod geom;
pub mod grid;
pub mod mapper;
pub mod marks;
pub mod redisplay;
pub mod render;
pub mod ruler;
pub mod window;
pub mod zimg;

// Re-export commonly used types
pub use attrib::{DspAttrib, Expansion};
pub use backend::{Backend, DrawList, PixPoint, PixRect, PixSeg};
pub use config::DisplayConfig;
pub use db::{CellDesc, Database, DisplayMode, DisplaySource, InstanceDesc, LayerDesc};
pub use display::{Display, DisplayHost, LogHost};
pub use egui_backend::EguiBackend;
pub use error::{DisplayError, ErrorLog, Result};
pub use geom::{BBox, Point, Transform};
pub use grid::GridDesc;
pub use mapper::CoordMap;
pub use marks::{Mark, MarkKind, UserMark, UserMarkTable};
pub use ruler::Ruler;
pub use zimg::LeveledImage;
