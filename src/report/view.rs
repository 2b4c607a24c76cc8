//! The rendered result view as a single tall PDF page.
//!
//! The analysis Markdown is parsed into blocks ([`crate::pipeline::markdown`]),
//! word-wrapped at the report's content width with Helvetica metrics and set
//! as text on one page whose height grows with the content. That page is the
//! surface [`super::capture`] rasterises, so what ends up in the report is a
//! picture of the view, not re-flowed text.

use crate::config::PageGeometry;
use crate::error::ExportError;
use crate::pipeline::llm::AnalysisResult;
use crate::pipeline::markdown::{render, Block, MAX_LIST_DEPTH};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

pub const VIEW_TITLE: &str = "Analysis Result:";

const PADDING: f32 = 12.0;
const BODY_SIZE: f32 = 10.5;
const LINE_FACTOR: f32 = 1.35;
const INDENT: f32 = 14.0;
const MIN_HEIGHT: f32 = 72.0;

fn indent_x(depth: u8) -> f32 {
    PADDING + INDENT * (depth.min(MAX_LIST_DEPTH) as f32 + 1.0) - 8.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }
}

/// One line of set text. `baseline` is measured from the top of the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewLine {
    pub face: Face,
    pub size: f32,
    pub x: f32,
    pub baseline: f32,
    pub text: String,
}

/// A horizontal rule, `y` measured from the top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRule {
    pub y: f32,
}

/// The laid-out view. Width equals the report's content width.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportView {
    pub width_pt: f32,
    pub height_pt: f32,
    pub lines: Vec<ViewLine>,
    pub rules: Vec<ViewRule>,
}

// Helvetica advance widths for U+0020..=U+007E, per 1000 em.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

fn char_width(c: char) -> u16 {
    match c as u32 {
        cp @ 0x20..=0x7E => HELVETICA[(cp - 0x20) as usize],
        _ => 556,
    }
}

/// Width of `text` in points. Bold is approximated from the regular metrics.
pub fn text_width(text: &str, face: Face, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c) as u32).sum();
    let factor = match face {
        Face::Regular => 1.0,
        Face::Bold => 1.08,
    };
    units as f32 * size / 1000.0 * factor
}

/// Greedy word wrap. Words longer than the line are broken by character.
pub fn wrap(text: &str, face: Face, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, face, size) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if text_width(word, face, size) <= max_width {
            current = word.to_string();
            continue;
        }
        for c in word.chars() {
            current.push(c);
            if text_width(&current, face, size) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn heading_size(level: u8) -> f32 {
    match level {
        1 => 15.0,
        2 => 13.0,
        _ => 11.5,
    }
}

struct Cursor {
    y: f32,
    lines: Vec<ViewLine>,
    rules: Vec<ViewRule>,
    width: f32,
}

impl Cursor {
    fn set(&mut self, text: &str, face: Face, size: f32, x: f32, prefix: Option<&str>) {
        let leading = size * LINE_FACTOR;
        let (first_x, text_x) = match prefix {
            Some(p) => (x, x + text_width(p, face, size) + 3.0),
            None => (x, x),
        };
        let avail = (self.width - PADDING - text_x).max(size);
        for (i, line) in wrap(text, face, size, avail).into_iter().enumerate() {
            self.y += leading;
            if i == 0 {
                if let Some(p) = prefix {
                    self.lines.push(ViewLine {
                        face,
                        size,
                        x: first_x,
                        baseline: self.y,
                        text: p.to_string(),
                    });
                }
            }
            self.lines.push(ViewLine {
                face,
                size,
                x: text_x,
                baseline: self.y,
                text: line,
            });
        }
    }

    fn gap(&mut self, points: f32) {
        self.y += points;
    }
}

impl ReportView {
    /// Lay out `result` for a page of the given geometry.
    pub fn layout(result: &AnalysisResult, geometry: &PageGeometry) -> Self {
        let width = geometry.content_width();
        let mut cur = Cursor {
            y: PADDING,
            lines: Vec::new(),
            rules: Vec::new(),
            width,
        };

        cur.set(VIEW_TITLE, Face::Bold, 16.0, PADDING, None);
        cur.gap(6.0);

        let rendered = render(&result.markdown);
        for block in &rendered.blocks {
            match block {
                Block::Heading { level, text } => {
                    cur.gap(6.0);
                    cur.set(text, Face::Bold, heading_size(*level), PADDING, None);
                    cur.gap(2.0);
                }
                Block::Bullet { depth, text } => {
                    let x = indent_x(*depth);
                    cur.set(text, Face::Regular, BODY_SIZE, x, Some("-"));
                }
                Block::Numbered {
                    depth,
                    number,
                    text,
                } => {
                    let x = indent_x(*depth);
                    let marker = format!("{number}.");
                    cur.set(text, Face::Regular, BODY_SIZE, x, Some(&marker));
                }
                Block::Paragraph { text } => {
                    cur.gap(3.0);
                    cur.set(text, Face::Regular, BODY_SIZE, PADDING, None);
                    cur.gap(3.0);
                }
                Block::Rule => {
                    cur.gap(6.0);
                    cur.rules.push(ViewRule { y: cur.y });
                    cur.gap(6.0);
                }
            }
        }

        let height = (cur.y + PADDING * 1.5).max(MIN_HEIGHT);
        debug!(
            "Laid out view: {} lines, {:.0}x{:.0}pt",
            cur.lines.len(),
            width,
            height
        );

        Self {
            width_pt: width,
            height_pt: height,
            lines: cur.lines,
            rules: cur.rules,
        }
    }

    /// The view as a one-page PDF, ready for rasterising.
    pub fn to_pdf_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font = |base: &str| {
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => Object::Name(base.as_bytes().to_vec()),
                "Encoding" => "WinAnsiEncoding",
            }
        };
        let regular_id = doc.add_object(font("Helvetica"));
        let bold_id = doc.add_object(font("Helvetica-Bold"));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular_id,
                "F2" => bold_id,
            },
        });

        let content = Content {
            operations: self.operations(),
        };
        let encoded = content
            .encode()
            .map_err(|e| ExportError::Layout(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(self.width_pt as _),
                Object::Real(self.height_pt as _),
            ],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| ExportError::Layout(e.to_string()))?;
        Ok(bytes)
    }

    fn operations(&self) -> Vec<Operation> {
        let mut ops = vec![
            // white background
            Operation::new("rg", vec![1.into(), 1.into(), 1.into()]),
            Operation::new(
                "re",
                vec![
                    0.into(),
                    0.into(),
                    Object::Real(self.width_pt as _),
                    Object::Real(self.height_pt as _),
                ],
            ),
            Operation::new("f", vec![]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        ];

        for rule in &self.rules {
            let y = self.height_pt - rule.y;
            ops.push(Operation::new("RG", vec![Object::Real(0.7), Object::Real(0.7), Object::Real(0.7)]));
            ops.push(Operation::new("w", vec![Object::Real(0.5)]));
            ops.push(Operation::new("m", vec![Object::Real(PADDING as _), Object::Real(y as _)]));
            ops.push(Operation::new(
                "l",
                vec![Object::Real((self.width_pt - PADDING) as _), Object::Real(y as _)],
            ));
            ops.push(Operation::new("S", vec![]));
        }

        for line in &self.lines {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![line.face.resource().into(), Object::Real(line.size as _)],
            ));
            ops.push(Operation::new(
                "Td",
                vec![
                    Object::Real(line.x as _),
                    Object::Real((self.height_pt - line.baseline) as _),
                ],
            ));
            ops.push(Operation::new(
                "Tj",
                vec![Object::string_literal(win_ansi(&line.text))],
            ));
            ops.push(Operation::new("ET", vec![]));
        }
        ops
    }
}

/// Encode for the standard fonts' WinAnsi encoding. Latin-1 passes through,
/// typographic punctuation is mapped, anything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => b'\'',
            '\u{201C}' | '\u{201D}' => b'"',
            '\u{2013}' | '\u{2014}' => b'-',
            '\u{2022}' => 0x95,
            '\u{2026}' => 0x85,
            c if (c as u32) < 0x80 => c as u8,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}
