// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Grid descriptors, manufacturing grid correction, grid snapping and the
//! grid drawing engine.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{hex_digit1, i32 as parse_i32, multispace0, multispace1, u32 as parse_u32},
    combinator::map_res,
    number::complete::double,
    sequence::preceded,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::backend::{Backend, LineStyle, PixPoint, PixSeg};
use crate::cache::DrawCache;
use crate::color::{ColorTable, DisplayColor};
use crate::db::DisplayMode;
use crate::error::{DisplayError, Result};
use crate::geom::{BBox, Point, RESOLUTION};
use crate::mapper::CoordMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxesStyle {
    None,
    /// Full-width lines through the origin.
    #[default]
    Plain,
    /// Small cross mark at the origin.
    Mark,
}

impl AxesStyle {
    fn code(self) -> i32 {
        match self {
            AxesStyle::None => 0,
            AxesStyle::Plain => 1,
            AxesStyle::Mark => 2,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AxesStyle::None),
            1 => Some(AxesStyle::Plain),
            2 => Some(AxesStyle::Mark),
            _ => None,
        }
    }
}

/// Mode-global manufacturing grid, in microns. Zero disables correction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MfgGrid {
    values: [f64; 2],
}

impl MfgGrid {
    pub fn get(&self, mode: DisplayMode) -> f64 {
        self.values[mode.index()]
    }

    /// Values at or below zero disable the correction, positive values
    /// below one internal unit become exactly one unit.
    pub fn set(&mut self, mode: DisplayMode, microns: f64) {
        let unit = 1.0 / RESOLUTION as f64;
        self.values[mode.index()] = if microns.is_nan() || microns <= 0.0 {
            0.0
        } else if microns < unit {
            unit
        } else {
            microns
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDesc {
    /// Grid spacing in microns.
    pub spacing: f64,
    /// Positive: snap points per grid interval. Negative: grid intervals
    /// per snap point.
    pub snap: i32,
    /// Dash mask for line mode, zero selects dot mode.
    pub linestyle: u32,
    /// Dot mode: 0 draws single pixels, otherwise crosses of this radius.
    pub dotsize: i32,
    pub coarse_mult: i32,
    pub axes: AxesStyle,
    pub displayed: bool,
    pub on_top: bool,
}

impl Default for GridDesc {
    fn default() -> Self {
        Self {
            spacing: 1.0,
            snap: 1,
            linestyle: 0,
            dotsize: 0,
            coarse_mult: 5,
            axes: AxesStyle::Plain,
            displayed: true,
            on_top: false,
        }
    }
}

impl PartialEq for GridDesc {
    fn eq(&self, other: &Self) -> bool {
        self.spacing == other.spacing
            && self.snap == other.snap
            && self.linestyle == other.linestyle
            && self.coarse_mult == other.coarse_mult
            && (self.linestyle != 0 || self.dotsize == other.dotsize)
    }
}

impl GridDesc {
    pub fn electrical() -> Self {
        Self {
            snap: 2,
            axes: AxesStyle::None,
            ..Self::default()
        }
    }

    /// Effective spacing in microns, rounded to the manufacturing grid.
    pub fn spacing(&self, mode: DisplayMode, mfg: &MfgGrid) -> f64 {
        let m = mfg.get(mode);
        if m > 0.0 {
            let n = (self.spacing / m).round().max(1.0);
            n * m
        } else {
            self.spacing
        }
    }

    pub fn snap(&self) -> i32 {
        self.snap
    }

    /// Distance between snap points in microns.
    pub fn snap_resolution(&self, mode: DisplayMode, mfg: &MfgGrid) -> f64 {
        let sp = self.spacing(mode, mfg);
        match self.snap {
            0 => sp,
            n if n > 0 => sp / n as f64,
            n => sp * n.unsigned_abs() as f64,
        }
    }

    /// Snap a design point to the nearest snap point, relative to `origin`.
    pub fn snap_point(&self, p: Point, mode: DisplayMode, mfg: &MfgGrid, origin: Point) -> Point {
        let res = self.snap_resolution(mode, mfg) * RESOLUTION as f64;
        if res < 1.0 {
            return p;
        }
        let snap = |v: i32, o: i32| o + (((v - o) as f64 / res).round() * res).round() as i32;
        Point::new(snap(p.x, origin.x), snap(p.y, origin.y))
    }

    pub fn coarse_mult(&self) -> i32 {
        self.coarse_mult.max(1)
    }

    pub fn set_mfg_corrected(&mut self, mode: DisplayMode, mfg: &MfgGrid) {
        self.spacing = self.spacing(mode, mfg);
    }
}

impl fmt::Display for GridDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.spacing, self.snap)?;
        if self.linestyle == 0 {
            write!(f, "0 {}", self.dotsize)?;
        } else {
            write!(f, "0x{:x}", self.linestyle)?;
        }
        write!(
            f,
            " -a {} -d {} -t {} -m {}",
            self.axes.code(),
            self.displayed as i32,
            self.on_top as i32,
            self.coarse_mult
        )
    }
}

fn line_mask(input: &str) -> IResult<&str, u32> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |s: &str| {
            u32::from_str_radix(s, 16)
        }),
        parse_u32,
    ))
    .parse(input)
}

fn leading<'a, T>(
    input: &'a str,
    line: &str,
    name: &'static str,
    mut parser: impl FnMut(&'a str) -> IResult<&'a str, T>,
) -> Result<(&'a str, T)> {
    parser(input).map_err(|_| DisplayError::parse(name, line))
}

impl FromStr for GridDesc {
    type Err = DisplayError;

    /// Parse `<spacing> <snap> <linestyle> [<dotsize>] -a <axes> -d <0|1>
    /// -t <0|1> -m <coarse>`. The first three fields are required, each
    /// flagged option may be omitted.
    fn from_str(line: &str) -> Result<Self> {
        let (rest, spacing) = leading(line, line, "spacing", |i| {
            preceded(multispace0, double).parse(i)
        })?;
        let (rest, snap) = leading(rest, line, "snap", |i| {
            preceded(multispace1, parse_i32).parse(i)
        })?;
        let (rest, linestyle) = leading(rest, line, "linestyle", |i| {
            preceded(multispace1, line_mask).parse(i)
        })?;
        if spacing.is_nan() || spacing <= 0.0 {
            return Err(DisplayError::parse("spacing", line));
        }
        if snap == 0 {
            return Err(DisplayError::parse("snap", line));
        }

        let mut desc = GridDesc {
            spacing,
            snap,
            linestyle,
            ..GridDesc::default()
        };

        let mut tokens = rest.split_whitespace();
        while let Some(tok) = tokens.next() {
            let mut flag_value = |field: &'static str| -> Result<i32> {
                tokens
                    .next()
                    .and_then(|v| v.parse::<i32>().ok())
                    .ok_or_else(|| DisplayError::parse(field, line))
            };
            match tok {
                "-a" => {
                    desc.axes = AxesStyle::from_code(flag_value("axes")?)
                        .ok_or_else(|| DisplayError::parse("axes", line))?;
                }
                "-d" => desc.displayed = flag_value("displayed")? != 0,
                "-t" => desc.on_top = flag_value("on-top")? != 0,
                "-m" => desc.coarse_mult = flag_value("coarse multiple")?.max(1),
                other => {
                    desc.dotsize = other
                        .parse::<i32>()
                        .map_err(|_| DisplayError::parse("dot size", line))?
                        .max(0);
                }
            }
        }
        Ok(desc)
    }
}

/// Grid spacings, in internal units, that pass the pixel threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPlan {
    pub fine: Option<f64>,
    pub coarse: Option<f64>,
}

impl GridPlan {
    pub fn compute(
        grid: &GridDesc,
        mode: DisplayMode,
        mfg: &MfgGrid,
        ratio: f64,
        threshold: f64,
    ) -> GridPlan {
        let fine = grid.spacing(mode, mfg) * RESOLUTION as f64;
        let cmult = grid.coarse_mult();
        let coarse = fine * cmult as f64;
        let visible = |step: f64| step > 0.0 && step * ratio >= threshold;
        if cmult == 1 {
            return GridPlan {
                fine: None,
                coarse: visible(coarse).then_some(coarse),
            };
        }
        GridPlan {
            fine: visible(fine).then_some(fine),
            coarse: visible(coarse).then_some(coarse),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fine.is_none() && self.coarse.is_none()
    }
}

/// Lattice coordinates `origin + k * step` within `[lo, hi]`.
fn lattice(lo: i32, hi: i32, origin: i32, step: f64) -> impl Iterator<Item = i32> {
    let first = ((lo - origin) as f64 / step).ceil() as i64;
    let last = ((hi - origin) as f64 / step).floor() as i64;
    (first..=last.max(first - 1)).map(move |k| origin + (k as f64 * step).round() as i32)
}

fn on_lattice(v: i32, origin: i32, step: f64) -> bool {
    let k = ((v - origin) as f64 / step).round();
    (origin as f64 + k * step - v as f64).abs() < 0.5
}

/// Everything the grid engine needs from its window.
pub struct GridContext<'a> {
    pub map: &'a CoordMap,
    pub cache: &'a mut DrawCache,
    pub backend: &'a mut dyn Backend,
    pub colors: &'a ColorTable,
    pub mode: DisplayMode,
    pub mfg: &'a MfgGrid,
    pub threshold: f64,
    pub origin: Point,
}

const AXES_MARK_SIZE: i32 = 8;

impl GridContext<'_> {
    /// Draw the grid and axes over the clip area. Returns the plan that was
    /// used so callers can tell what was visible.
    pub fn show_grid(&mut self, grid: &GridDesc) -> GridPlan {
        let plan = GridPlan::compute(grid, self.mode, self.mfg, self.map.ratio(), self.threshold);
        let area = match self.map.clip_area().intersection(&self.map.window()) {
            Some(a) => a,
            None => return plan,
        };

        if grid.displayed && !plan.is_empty() {
            if grid.linestyle == 0 {
                self.show_dots(grid, &plan, &area);
            } else {
                self.show_lines(grid, &plan, &area);
            }
        }
        if self.mode == DisplayMode::Physical && grid.axes != AxesStyle::None {
            self.show_axes(grid.axes, &area);
        }
        self.cache.set_line_style(self.backend, None);
        plan
    }

    fn draw_dot(&mut self, x: i32, y: i32, dotsize: i32) {
        let p = self.map.window_to_pixel(Point::new(x, y));
        if dotsize <= 0 {
            self.cache.add_pixel(self.backend, p);
        } else {
            self.cache
                .add_line(self.backend, PixSeg::new(p.x - dotsize, p.y, p.x + dotsize, p.y));
            self.cache
                .add_line(self.backend, PixSeg::new(p.x, p.y - dotsize, p.x, p.y + dotsize));
        }
    }

    fn show_dots(&mut self, grid: &GridDesc, plan: &GridPlan, area: &BBox) {
        let o = self.origin;
        if let Some(fine) = plan.fine {
            let color = self.colors.get(self.mode, DisplayColor::FineGrid);
            self.cache.set_color(self.backend, color);
            for y in lattice(area.bottom, area.top, o.y, fine) {
                let ycoarse = plan.coarse.is_some_and(|c| on_lattice(y, o.y, c));
                for x in lattice(area.left, area.right, o.x, fine) {
                    if ycoarse && plan.coarse.is_some_and(|c| on_lattice(x, o.x, c)) {
                        continue;
                    }
                    self.draw_dot(x, y, grid.dotsize);
                }
            }
        }
        if let Some(coarse) = plan.coarse {
            let color = self.colors.get(self.mode, DisplayColor::CoarseGrid);
            self.cache.set_color(self.backend, color);
            for y in lattice(area.bottom, area.top, o.y, coarse) {
                for x in lattice(area.left, area.right, o.x, coarse) {
                    self.draw_dot(x, y, grid.dotsize);
                }
            }
        }
    }

    /// Line mode. Each direction is drawn separately so that the dash
    /// phase can be anchored to the viewport edge, which lets partial
    /// redraws line up with dashes drawn earlier.
    fn show_lines(&mut self, grid: &GridDesc, plan: &GridPlan, area: &BBox) {
        let clip = self.map.clip();
        let style = LineStyle::new(grid.linestyle);
        let passes = [
            (plan.fine, DisplayColor::FineGrid, true),
            (plan.coarse, DisplayColor::CoarseGrid, false),
        ];
        for (step, color, skip_coarse) in passes {
            let Some(step) = step else { continue };
            let color = self.colors.get(self.mode, color);
            self.cache.set_color(self.backend, color);
            let skip = |v: i32, o: i32| {
                skip_coarse && plan.coarse.is_some_and(|c| on_lattice(v, o, c))
            };

            let vstyle = style.with_offset(clip.top.max(0) as u32);
            self.cache.set_line_style(self.backend, Some(vstyle));
            for x in lattice(area.left, area.right, self.origin.x, step) {
                if skip(x, self.origin.x) {
                    continue;
                }
                let px = self.map.window_to_pixel(Point::new(x, 0)).x;
                self.cache
                    .add_line(self.backend, PixSeg::new(px, clip.top, px, clip.bottom));
            }

            let hstyle = style.with_offset(clip.left.max(0) as u32);
            self.cache.set_line_style(self.backend, Some(hstyle));
            for y in lattice(area.bottom, area.top, self.origin.y, step) {
                if skip(y, self.origin.y) {
                    continue;
                }
                let py = self.map.window_to_pixel(Point::new(0, y)).y;
                self.cache
                    .add_line(self.backend, PixSeg::new(clip.left, py, clip.right, py));
            }
        }
    }

    fn show_axes(&mut self, axes: AxesStyle, area: &BBox) {
        let color = self.colors.get(self.mode, DisplayColor::Axes);
        self.cache.set_color(self.backend, color);
        self.cache.set_line_style(self.backend, None);
        let clip = self.map.clip();
        let o: PixPoint = self.map.window_to_pixel(Point::new(0, 0));
        match axes {
            AxesStyle::None => {}
            AxesStyle::Plain => {
                if area.left <= 0 && area.right >= 0 {
                    self.cache
                        .add_line(self.backend, PixSeg::new(o.x, clip.top, o.x, clip.bottom));
                }
                if area.bottom <= 0 && area.top >= 0 {
                    self.cache
                        .add_line(self.backend, PixSeg::new(clip.left, o.y, clip.right, o.y));
                }
            }
            AxesStyle::Mark => {
                if clip.contains(o.x, o.y) {
                    let d = AXES_MARK_SIZE;
                    self.cache
                        .add_line(self.backend, PixSeg::new(o.x - d, o.y, o.x + d, o.y));
                    self.cache
                        .add_line(self.backend, PixSeg::new(o.x, o.y - d, o.x, o.y + d));
                }
            }
        }
    }
}
