// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! User marks: free annotations attached to a cell in one display mode,
//! saved as text.
//!
//! The file starts with `<cellname> <phys|elec>`, followed by one mark per
//! line. Each line is a type letter, its fields in microns and a trailing
//! attribute integer:
//!
//! ```text
//! l x1 y1 x2 y2 attr                 line
//! b l b r t attr                     box
//! t x1 y1 x2 y2 x3 y3 attr           triangle, three vertices
//! u xl yb xr yt attr                 isosceles triangle, base xl..xr at yb, apex at yt
//! c xc yc rad attr                   circle
//! e xc yc rx ry attr                 ellipse
//! p n x1 y1 .. xn yn attr            polygon
//! s "label" x y w h xform attr       text
//! ```

use bitflags::bitflags;
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{char, multispace0, multispace1, none_of, one_of, u32 as parse_u32},
    combinator::value,
    multi::count,
    number::complete::double,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::backend::{FillPattern, PixPoint, PixRect, PixSeg, TextStyle};
use crate::color::DisplayColor;
use crate::db::DisplayMode;
use crate::error::{DisplayError, ErrorLog, Result};
use crate::geom::{to_internal, to_microns, BBox, Point};
use crate::mapper::CoordMap;

use super::MarkContext;

/// Longest polygon accepted from a file.
const MAX_POLY_POINTS: u32 = 10_000;

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UserMarkAttr: u32 {
        /// Closed shapes are filled with a stipple.
        const TEXTURED = 1;
        const BLINK = 2;
        /// Drawn in the alternate user-mark color.
        const ALTCOLOR = 4;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserShape {
    Line(Point, Point),
    Box(BBox),
    Triangle([Point; 3]),
    /// Base from `left` to `right` at `base_y`, apex centered at `apex_y`.
    Isosceles {
        left: i32,
        right: i32,
        base_y: i32,
        apex_y: i32,
    },
    Circle {
        center: Point,
        radius: i32,
    },
    Ellipse {
        center: Point,
        rx: i32,
        ry: i32,
    },
    Polygon(Vec<Point>),
    Text {
        label: String,
        pos: Point,
        width: i32,
        height: i32,
        /// Bit 0 rotates by 90 degrees.
        xform: u32,
    },
}

impl UserShape {
    pub fn code(&self) -> char {
        match self {
            UserShape::Line(..) => 'l',
            UserShape::Box(_) => 'b',
            UserShape::Triangle(_) => 't',
            UserShape::Isosceles { .. } => 'u',
            UserShape::Circle { .. } => 'c',
            UserShape::Ellipse { .. } => 'e',
            UserShape::Polygon(_) => 'p',
            UserShape::Text { .. } => 's',
        }
    }

    /// Outline vertices of the polygonal shapes.
    fn vertices(&self) -> Option<Vec<Point>> {
        match self {
            UserShape::Box(bb) => Some(vec![
                bb.lower_left(),
                Point::new(bb.right, bb.bottom),
                bb.upper_right(),
                Point::new(bb.left, bb.top),
            ]),
            UserShape::Triangle(p) => Some(p.to_vec()),
            UserShape::Isosceles {
                left,
                right,
                base_y,
                apex_y,
            } => Some(vec![
                Point::new(*left, *base_y),
                Point::new(*right, *base_y),
                Point::new((left + right) / 2, *apex_y),
            ]),
            UserShape::Polygon(p) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn bbox(&self) -> BBox {
        match self {
            UserShape::Line(a, b) => BBox::new(a.x, a.y, b.x, b.y),
            UserShape::Circle { center, radius } => {
                BBox::from_point(*center).bloat(*radius)
            }
            UserShape::Ellipse { center, rx, ry } => BBox::new(
                center.x - rx,
                center.y - ry,
                center.x + rx,
                center.y + ry,
            ),
            UserShape::Text {
                pos,
                width,
                height,
                xform,
                ..
            } => {
                let (w, h) = if xform & 1 != 0 {
                    (*height, *width)
                } else {
                    (*width, *height)
                };
                BBox::new(pos.x, pos.y, pos.x + w, pos.y + h)
            }
            _ => self
                .vertices()
                .and_then(|v| BBox::from_points(&v))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserMark {
    pub shape: UserShape,
    pub attr: UserMarkAttr,
}

fn um(v: i32) -> f64 {
    to_microns(v)
}

impl UserMark {
    pub fn new(shape: UserShape) -> Self {
        Self {
            shape,
            attr: UserMarkAttr::empty(),
        }
    }

    pub fn with_attr(mut self, attr: UserMarkAttr) -> Self {
        self.attr = attr;
        self
    }

    /// One line of the mark file, without the newline.
    pub fn to_text(&self) -> String {
        let mut s = String::new();
        s.push(self.shape.code());
        let mut num = |v: i32| {
            let _ = write!(s, " {}", um(v));
        };
        match &self.shape {
            UserShape::Line(a, b) => {
                for v in [a.x, a.y, b.x, b.y] {
                    num(v);
                }
            }
            UserShape::Box(bb) => {
                for v in [bb.left, bb.bottom, bb.right, bb.top] {
                    num(v);
                }
            }
            UserShape::Triangle(p) => {
                for q in p {
                    num(q.x);
                    num(q.y);
                }
            }
            UserShape::Isosceles {
                left,
                right,
                base_y,
                apex_y,
            } => {
                for v in [*left, *base_y, *right, *apex_y] {
                    num(v);
                }
            }
            UserShape::Circle { center, radius } => {
                for v in [center.x, center.y, *radius] {
                    num(v);
                }
            }
            UserShape::Ellipse { center, rx, ry } => {
                for v in [center.x, center.y, *rx, *ry] {
                    num(v);
                }
            }
            UserShape::Polygon(points) => {
                let _ = write!(s, " {}", points.len());
                for p in points {
                    let _ = write!(s, " {} {}", um(p.x), um(p.y));
                }
            }
            UserShape::Text {
                label,
                pos,
                width,
                height,
                xform,
            } => {
                let escaped = label
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"")
                    .replace('\n', "\\n")
                    .replace('\r', "\\r");
                let _ = write!(
                    s,
                    " \"{}\" {} {} {} {} {}",
                    escaped,
                    um(pos.x),
                    um(pos.y),
                    um(*width),
                    um(*height),
                    xform
                );
            }
        }
        let _ = write!(s, " {}", self.attr.bits());
        s
    }

    /// Parse one mark line.
    pub fn from_text(line: &str) -> Result<UserMark> {
        let err = |field: &'static str| DisplayError::parse(field, line);
        let (rest, code) = mark_code(line).map_err(|_| err("mark type"))?;
        let (rest, shape) = match code {
            'l' => {
                let (rest, v) = coords(rest, 4).map_err(|_| err("line coordinates"))?;
                (
                    rest,
                    UserShape::Line(Point::new(v[0], v[1]), Point::new(v[2], v[3])),
                )
            }
            'b' => {
                let (rest, v) = coords(rest, 4).map_err(|_| err("box coordinates"))?;
                (rest, UserShape::Box(BBox::new(v[0], v[1], v[2], v[3])))
            }
            't' => {
                let (rest, v) = coords(rest, 6).map_err(|_| err("triangle coordinates"))?;
                (
                    rest,
                    UserShape::Triangle([
                        Point::new(v[0], v[1]),
                        Point::new(v[2], v[3]),
                        Point::new(v[4], v[5]),
                    ]),
                )
            }
            'u' => {
                let (rest, v) = coords(rest, 4).map_err(|_| err("triangle coordinates"))?;
                (
                    rest,
                    UserShape::Isosceles {
                        left: v[0].min(v[2]),
                        right: v[0].max(v[2]),
                        base_y: v[1],
                        apex_y: v[3],
                    },
                )
            }
            'c' => {
                let (rest, v) = coords(rest, 3).map_err(|_| err("circle"))?;
                if v[2] <= 0 {
                    return Err(err("circle radius"));
                }
                (
                    rest,
                    UserShape::Circle {
                        center: Point::new(v[0], v[1]),
                        radius: v[2],
                    },
                )
            }
            'e' => {
                let (rest, v) = coords(rest, 4).map_err(|_| err("ellipse"))?;
                if v[2] <= 0 || v[3] <= 0 {
                    return Err(err("ellipse radii"));
                }
                (
                    rest,
                    UserShape::Ellipse {
                        center: Point::new(v[0], v[1]),
                        rx: v[2],
                        ry: v[3],
                    },
                )
            }
            'p' => {
                let (rest, n) = field_u32(rest).map_err(|_| err("polygon point count"))?;
                if !(3..=MAX_POLY_POINTS).contains(&n) {
                    return Err(err("polygon point count"));
                }
                let (rest, v) = coords(rest, 2 * n as usize).map_err(|_| err("polygon points"))?;
                let points = v.chunks(2).map(|c| Point::new(c[0], c[1])).collect();
                (rest, UserShape::Polygon(points))
            }
            's' => {
                let (rest, label) = preceded(multispace1, quoted)
                    .parse(rest)
                    .map_err(|_| err("label"))?;
                let (rest, v) = coords(rest, 4).map_err(|_| err("text position"))?;
                let (rest, xform) = field_u32(rest).map_err(|_| err("text transform"))?;
                (
                    rest,
                    UserShape::Text {
                        label,
                        pos: Point::new(v[0], v[1]),
                        width: v[2],
                        height: v[3],
                        xform,
                    },
                )
            }
            _ => return Err(err("mark type")),
        };
        let (rest, bits) = field_u32(rest).map_err(|_| err("attributes"))?;
        if !rest.trim().is_empty() {
            return Err(err("trailing text"));
        }
        Ok(UserMark {
            shape,
            attr: UserMarkAttr::from_bits_truncate(bits),
        })
    }

    pub fn pixel_bbox(&self, map: &CoordMap) -> PixRect {
        map.bbox_to_pixel(&self.shape.bbox()).bloat(1)
    }

    /// Paint the mark. Blinking marks swap to the other user-mark color
    /// while `blink_phase` is set.
    pub fn show(&self, ctx: &mut MarkContext<'_>, blink_phase: bool) {
        let alt = self.attr.contains(UserMarkAttr::ALTCOLOR)
            ^ (self.attr.contains(UserMarkAttr::BLINK) && blink_phase);
        ctx.color(if alt {
            DisplayColor::UserMarkAlt
        } else {
            DisplayColor::UserMark
        });
        let textured = self.attr.contains(UserMarkAttr::TEXTURED);
        let stipple = FillPattern::checker();
        let map = ctx.map;
        let pt = |p: Point| map.window_to_pixel(p);
        match &self.shape {
            UserShape::Line(a, b) => {
                let (a, b) = (pt(*a), pt(*b));
                ctx.line(a.x, a.y, b.x, b.y);
            }
            UserShape::Circle { center, radius } => {
                let r = map.to_pixels(*radius).round() as i32;
                ellipse(ctx, pt(*center), r, r, textured.then_some(&stipple));
            }
            UserShape::Ellipse { center, rx, ry } => {
                let rx = map.to_pixels(*rx).round() as i32;
                let ry = map.to_pixels(*ry).round() as i32;
                ellipse(ctx, pt(*center), rx, ry, textured.then_some(&stipple));
            }
            UserShape::Text {
                label,
                pos,
                height,
                xform,
                ..
            } => {
                let p = pt(*pos);
                let h = (map.to_pixels(*height).round() as i32).max(1);
                ctx.text(label, p.x, p.y, &TextStyle::new(h).vertical(xform & 1 != 0));
            }
            UserShape::Box(bb) if !textured => {
                ctx.cache.add_outline(ctx.backend, map.bbox_to_pixel(bb));
            }
            UserShape::Box(bb) => {
                ctx.fill(Some(&stipple));
                ctx.cache.add_box(ctx.backend, map.bbox_to_pixel(bb));
                ctx.fill(None);
            }
            shape => {
                let Some(v) = shape.vertices() else {
                    return;
                };
                let pix: Vec<PixPoint> = v.into_iter().map(pt).collect();
                if textured {
                    ctx.fill(Some(&stipple));
                    ctx.cache.add_polygon(ctx.backend, &pix);
                    ctx.fill(None);
                }
                for (i, a) in pix.iter().enumerate() {
                    let b = pix[(i + 1) % pix.len()];
                    ctx.cache.add_line(ctx.backend, PixSeg::new(a.x, a.y, b.x, b.y));
                }
            }
        }
    }
}

fn ellipse(ctx: &mut MarkContext<'_>, c: PixPoint, rx: i32, ry: i32, fill: Option<&FillPattern>) {
    ctx.cache.flush(ctx.backend);
    if let Some(fill) = fill {
        ctx.backend.set_fill(Some(fill));
        ctx.backend.draw_ellipse(c, rx, ry, true);
        ctx.backend.set_fill(None);
    }
    ctx.backend.draw_ellipse(c, rx, ry, false);
}

fn mark_code(input: &str) -> IResult<&str, char> {
    preceded(multispace0, one_of("lbtuceps")).parse(input)
}

fn field_u32(input: &str) -> IResult<&str, u32> {
    preceded(multispace1, parse_u32).parse(input)
}

fn coords(input: &str, n: usize) -> IResult<&str, Vec<i32>> {
    let (rest, values) = count(preceded(multispace1, double), n).parse(input)?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        )));
    }
    Ok((rest, values.into_iter().map(to_internal).collect()))
}

fn quoted(input: &str) -> IResult<&str, String> {
    alt((
        value(String::new(), tag("\"\"")),
        delimited(
            char('"'),
            escaped_transform(
                none_of("\\\""),
                '\\',
                alt((
                    value('\n', char('n')),
                    value('\r', char('r')),
                    one_of("\\\""),
                )),
            ),
            char('"'),
        ),
    ))
    .parse(input)
}

/// User marks for every (cell, mode) pair.
#[derive(Debug, Default, Clone)]
pub struct UserMarkTable {
    marks: HashMap<(String, DisplayMode), Vec<UserMark>>,
}

impl UserMarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cell: &str, mode: DisplayMode, mark: UserMark) {
        self.marks
            .entry((cell.to_string(), mode))
            .or_default()
            .push(mark);
    }

    pub fn marks(&self, cell: &str, mode: DisplayMode) -> &[UserMark] {
        self.marks
            .get(&(cell.to_string(), mode))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn remove(&mut self, cell: &str, mode: DisplayMode, index: usize) -> Option<UserMark> {
        let list = self.marks.get_mut(&(cell.to_string(), mode))?;
        (index < list.len()).then(|| list.remove(index))
    }

    pub fn clear(&mut self, cell: &str, mode: DisplayMode) -> Vec<UserMark> {
        self.marks
            .remove(&(cell.to_string(), mode))
            .unwrap_or_default()
    }

    pub fn has_blinking(&self, cell: &str, mode: DisplayMode) -> bool {
        self.marks(cell, mode)
            .iter()
            .any(|m| m.attr.contains(UserMarkAttr::BLINK))
    }

    pub fn to_text(&self, cell: &str, mode: DisplayMode) -> String {
        let mut out = format!("{} {}\n", cell, mode.keyword());
        for m in self.marks(cell, mode) {
            out.push_str(&m.to_text());
            out.push('\n');
        }
        out
    }

    /// Parse a mark file. A bad header fails the whole load; bad mark lines
    /// are reported to `log` and skipped.
    pub fn parse_text(text: &str, log: &mut ErrorLog) -> Result<(String, DisplayMode, Vec<UserMark>)> {
        let mut lines = text.lines();
        let header = lines.next().unwrap_or_default();
        let mut fields = header.split_whitespace();
        let (Some(cell), Some(mode), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(DisplayError::BadHeader(header.to_string()));
        };
        let mode = DisplayMode::from_keyword(mode)
            .ok_or_else(|| DisplayError::BadHeader(header.to_string()))?;
        let mut marks = Vec::new();
        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match UserMark::from_text(trimmed) {
                Ok(m) => marks.push(m),
                Err(e) => log.push(&e),
            }
        }
        Ok((cell.to_string(), mode, marks))
    }

    /// Replace the marks of the file's cell and mode with its contents.
    /// Returns the number of marks read.
    pub fn load_text(&mut self, text: &str, log: &mut ErrorLog) -> Result<usize> {
        let (cell, mode, marks) = Self::parse_text(text, log)?;
        let n = marks.len();
        self.marks.insert((cell, mode), marks);
        Ok(n)
    }

    pub fn load(&mut self, path: &Path, log: &mut ErrorLog) -> Result<usize> {
        let text = fs::read_to_string(path)?;
        let n = self.load_text(&text, log)?;
        log::info!("[MARKS] loaded {} user marks from {}", n, path.display());
        Ok(n)
    }

    pub fn save(&self, path: &Path, cell: &str, mode: DisplayMode) -> Result<usize> {
        fs::write(path, self.to_text(cell, mode))?;
        let n = self.marks(cell, mode).len();
        log::info!("[MARKS] saved {} user marks to {}", n, path.display());
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawList, DrawOp};
    use crate::cache::DrawCache;
    use crate::color::ColorTable;

    #[test]
    fn test_line_format() {
        let m = UserMark::new(UserShape::Line(Point::new(0, 0), Point::new(1500, -2000)))
            .with_attr(UserMarkAttr::BLINK);
        assert_eq!(m.to_text(), "l 0 0 1.5 -2 2");
        assert_eq!(UserMark::from_text("l 0 0 1.5 -2 2").unwrap(), m);
    }

    #[test]
    fn test_text_label_escapes() {
        let m = UserMark::new(UserShape::Text {
            label: "say \"hi\"".into(),
            pos: Point::new(100, 200),
            width: 3000,
            height: 1000,
            xform: 1,
        });
        let line = m.to_text();
        assert_eq!(UserMark::from_text(&line).unwrap(), m);
    }

    #[test]
    fn test_multiline_label_stays_on_one_line() {
        let m = UserMark::new(UserShape::Text {
            label: "two\nlines\r\\n".into(),
            pos: Point::new(0, 0),
            width: 1000,
            height: 1000,
            xform: 0,
        });
        let line = m.to_text();
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
        assert_eq!(UserMark::from_text(&line).unwrap(), m);
    }

    #[test]
    fn test_empty_label() {
        let m = UserMark::from_text("s \"\" 0 0 1 1 0 0").unwrap();
        assert!(matches!(m.shape, UserShape::Text { ref label, .. } if label.is_empty()));
    }

    #[test]
    fn test_bad_lines_name_field() {
        for (line, field) in [
            ("x 1 2", "mark type"),
            ("l 1 2 3", "line coordinates"),
            ("c 0 0 -1 0", "circle radius"),
            ("p 2 0 0 1 1 0", "polygon point count"),
            ("b 0 0 1 1", "attributes"),
            ("b 0 0 1 1 0 junk", "trailing text"),
        ] {
            match UserMark::from_text(line) {
                Err(DisplayError::Parse { field: f, .. }) => assert_eq!(f, field, "{line}"),
                other => panic!("{line}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_load_skips_bad_lines() {
        let text = "inv phys\nb 0 0 1 1 0\nnonsense\n\nc 0 0 2 5\n";
        let mut table = UserMarkTable::new();
        let mut log = ErrorLog::new();
        assert_eq!(table.load_text(text, &mut log).unwrap(), 2);
        assert_eq!(log.messages().len(), 1);
        let marks = table.marks("inv", DisplayMode::Physical);
        assert_eq!(
            marks[1].attr,
            UserMarkAttr::TEXTURED | UserMarkAttr::ALTCOLOR
        );
    }

    #[test]
    fn test_bad_header() {
        let mut log = ErrorLog::new();
        for text in ["", "inv", "inv sideways\n", "a b c\n"] {
            assert!(matches!(
                UserMarkTable::parse_text(text, &mut log),
                Err(DisplayError::BadHeader(_))
            ));
        }
    }

    #[test]
    fn test_isosceles_vertices() {
        let s = UserShape::Isosceles {
            left: 0,
            right: 10,
            base_y: 0,
            apex_y: 8,
        };
        assert_eq!(s.bbox(), BBox::new(0, 0, 10, 8));
    }

    #[test]
    fn test_blink_swaps_color() {
        let map = CoordMap::new(100, 100, BBox::new(0, 0, 100, 100));
        let colors = ColorTable::default();
        let mark = UserMark::new(UserShape::Line(Point::new(0, 0), Point::new(50, 50)))
            .with_attr(UserMarkAttr::BLINK);
        let mut seen = Vec::new();
        for phase in [false, true] {
            let mut be = DrawList::new();
            let mut cache = DrawCache::default();
            let mut ctx = MarkContext {
                map: &map,
                cache: &mut cache,
                backend: &mut be,
                colors: &colors,
                mode: DisplayMode::Physical,
                size: 4,
            };
            mark.show(&mut ctx, phase);
            let color = be.ops.iter().find_map(|op| match op {
                DrawOp::Line { color, .. } => Some(*color),
                _ => None,
            });
            seen.push(color);
        }
        assert_eq!(seen[0], Some(colors.get(DisplayMode::Physical, DisplayColor::UserMark)));
        assert_eq!(seen[1], Some(colors.get(DisplayMode::Physical, DisplayColor::UserMarkAlt)));
    }
}
