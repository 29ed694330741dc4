//! Test cases for user mark files
//!
//! Tests cover:
//! - Text form of every shape type
//! - Saving and loading through a display window
//! - Tolerance of malformed lines

use std::fs;
use std::rc::Rc;

use egui::Color32;
use layout_compositor::marks::{UserMarkAttr, UserShape};
use layout_compositor::{
    BBox, CellDesc, Database, Display, DisplayConfig, DisplayError, DisplayMode, DisplaySource,
    DrawList, ErrorLog, LayerDesc, Point, UserMark, UserMarkTable,
};

fn every_shape() -> Vec<UserMark> {
    vec![
        UserMark::new(UserShape::Line(Point::new(0, 0), Point::new(1500, -2000))),
        UserMark::new(UserShape::Box(BBox::new(-1000, -500, 2250, 4000)))
            .with_attr(UserMarkAttr::TEXTURED),
        UserMark::new(UserShape::Triangle([
            Point::new(0, 0),
            Point::new(3000, 0),
            Point::new(1000, 2500),
        ])),
        UserMark::new(UserShape::Isosceles {
            left: 0,
            right: 4000,
            base_y: 100,
            apex_y: 3100,
        })
        .with_attr(UserMarkAttr::ALTCOLOR),
        UserMark::new(UserShape::Circle {
            center: Point::new(500, 500),
            radius: 250,
        }),
        UserMark::new(UserShape::Ellipse {
            center: Point::new(-500, 800),
            rx: 1200,
            ry: 300,
        })
        .with_attr(UserMarkAttr::BLINK | UserMarkAttr::ALTCOLOR),
        UserMark::new(UserShape::Polygon(vec![
            Point::new(0, 0),
            Point::new(2000, 0),
            Point::new(2000, 1000),
            Point::new(1000, 1500),
        ])),
        UserMark::new(UserShape::Text {
            label: "clock \"root\"".to_string(),
            pos: Point::new(1000, 2000),
            width: 5000,
            height: 1000,
            xform: 1,
        }),
    ]
}

fn display_with_cell(name: &str) -> Display<DrawList> {
    let mut db = Database::new();
    let m1 = db.add_layer(LayerDesc::new("M1", Color32::BLUE));
    let top = db
        .add_cell(CellDesc::new(name, DisplayMode::Physical).with_box(m1, BBox::new(0, 0, 5000, 5000)))
        .unwrap();
    let mut d = Display::new(DrawList::new(), 200, 200, DisplayConfig::default()).unwrap();
    d.set_source(0, Some(DisplaySource::cell(Rc::new(db), top))).unwrap();
    d
}

#[test]
fn test_every_shape_survives_text_form() {
    for mark in every_shape() {
        let line = mark.to_text();
        let parsed = UserMark::from_text(&line).unwrap();
        assert_eq!(parsed, mark, "line: {line}");
    }
}

#[test]
fn test_shape_codes() {
    let codes: String = every_shape().iter().map(|m| m.shape.code()).collect();
    assert_eq!(codes, "lbtucesp");
    let polygon = &every_shape()[6];
    assert!(polygon.to_text().starts_with("p 4 0 0 2 0"));
}

#[test]
fn test_save_and_load_through_display() {
    let path = std::env::temp_dir().join("layout_compositor_user_marks.txt");
    let mut d = display_with_cell("adder");
    for mark in every_shape() {
        d.add_user_mark(0, mark).unwrap();
    }
    assert_eq!(d.save_user_marks(0, &path).unwrap(), 8);

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("adder phys\n"));
    assert_eq!(content.lines().count(), 9);

    let mut other = display_with_cell("adder");
    let mut log = ErrorLog::new();
    assert_eq!(other.load_user_marks(&path, &mut log).unwrap(), 8);
    assert!(log.is_empty());
    assert_eq!(
        other.user_marks().marks("adder", DisplayMode::Physical),
        every_shape().as_slice()
    );
    fs::remove_file(&path).unwrap();
}

#[test]
fn test_malformed_lines_are_reported_and_skipped() {
    let text = "\
adder phys
b 0 0 1 1 0
c 0 0 -1 0
p 2 0 0 1 1 0
s \"unterminated 0 0 1 1 0 0
l 0 0 1 1 2
";
    let mut table = UserMarkTable::new();
    let mut log = ErrorLog::new();
    assert_eq!(table.load_text(text, &mut log).unwrap(), 2);
    assert_eq!(log.messages().len(), 3);
    let marks = table.marks("adder", DisplayMode::Physical);
    assert!(marks[1].attr.contains(UserMarkAttr::BLINK));
}

#[test]
fn test_unknown_mode_header_rejected() {
    let mut table = UserMarkTable::new();
    let mut log = ErrorLog::new();
    assert!(matches!(
        table.load_text("adder sideways\nb 0 0 1 1 0\n", &mut log),
        Err(DisplayError::BadHeader(_))
    ));
    assert!(table.marks("adder", DisplayMode::Physical).is_empty());
}

#[test]
fn test_remove_user_mark() {
    let mut d = display_with_cell("adder");
    for mark in every_shape() {
        d.add_user_mark(0, mark).unwrap();
    }
    let removed = d.remove_user_mark(0, 1).unwrap().unwrap();
    assert_eq!(removed.shape.code(), 'b');
    assert_eq!(d.user_marks().marks("adder", DisplayMode::Physical).len(), 7);
    assert!(d.remove_user_mark(0, 99).unwrap().is_none());
}
