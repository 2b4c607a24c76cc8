//! Render the analysis Markdown into display blocks.
//!
//! The model is asked for a small Markdown subset: `##` headings, bullet and
//! numbered lists, short paragraphs, inline emphasis. This module turns that
//! subset into a flat list of [`Block`]s that both the terminal view and the
//! report layout draw from. Inline markers are removed rather than styled;
//! emphasis inside a line does not survive into either surface.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// One displayable unit of the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, text: String },
    Bullet { depth: u8, text: String },
    Numbered { depth: u8, number: u32, text: String },
    Paragraph { text: String },
    Rule,
}

/// The analysis as rendered blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedMarkdown {
    pub blocks: Vec<Block>,
}

impl RenderedMarkdown {
    pub fn headings(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Heading { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Plain-text rendering (no colours), one block per line group.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            match block {
                Block::Heading { text, .. } => {
                    if i > 0 {
                        out.push('\n');
                    }
                    out.push_str(text);
                    out.push('\n');
                    out.push_str(&"=".repeat(text.chars().count()));
                }
                Block::Bullet { depth, text } => {
                    out.push_str(&"  ".repeat(*depth as usize));
                    out.push_str("• ");
                    out.push_str(text);
                }
                Block::Numbered {
                    depth,
                    number,
                    text,
                } => {
                    out.push_str(&"  ".repeat(*depth as usize));
                    out.push_str(&format!("{number}. {text}"));
                }
                Block::Paragraph { text } => out.push_str(text),
                Block::Rule => out.push_str(&"─".repeat(40)),
            }
            out.push('\n');
        }
        out
    }
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").unwrap());
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)[-*+]\s+(.*)$").unwrap());
static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)(\d{1,4})[.)]\s+(.*)$").unwrap());
static RE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:-{3,}|\*{3,}|_{3,})\s*$").unwrap());
static RE_BOLD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\*\*|__)([^*_]+?)(?:\*\*|__)\s*$").unwrap());

static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").unwrap());
static RE_STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)").unwrap());
static RE_EM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s][^*]*?)\*").unwrap());
static RE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());

/// Remove inline Markdown markers, keeping their text.
pub fn strip_inline(text: &str) -> String {
    let s = RE_LINK.replace_all(text, "$1");
    let s = RE_CODE.replace_all(&s, "$1");
    let s = RE_STRONG.replace_all(&s, "$2");
    let s = RE_EM.replace_all(&s, "$1");
    s.trim().to_string()
}

/// Deepest list nesting kept; deeper items are drawn at this depth.
pub const MAX_LIST_DEPTH: u8 = 6;

fn depth_of(indent: &str) -> u8 {
    let width: usize = indent.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum();
    (width / 2).min(MAX_LIST_DEPTH as usize) as u8
}

/// Parse Markdown into blocks.
pub fn render(markdown: &str) -> RenderedMarkdown {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();

    let flush = |paragraph: &mut Vec<String>, blocks: &mut Vec<Block>| {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph {
                text: paragraph.join(" "),
            });
            paragraph.clear();
        }
    };

    for line in markdown.lines() {
        if line.trim().is_empty() {
            flush(&mut paragraph, &mut blocks);
            continue;
        }

        if let Some(caps) = RE_HEADING.captures(line) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Heading {
                level: caps[1].len() as u8,
                text: strip_inline(&caps[2]),
            });
        } else if RE_RULE.is_match(line) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Rule);
        } else if let Some(caps) = RE_BOLD_LINE.captures(line) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Heading {
                level: 3,
                text: caps[1].trim().trim_end_matches(':').to_string(),
            });
        } else if let Some(caps) = RE_BULLET.captures(line) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Bullet {
                depth: depth_of(&caps[1]),
                text: strip_inline(&caps[2]),
            });
        } else if let Some(caps) = RE_NUMBERED.captures(line) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Numbered {
                depth: depth_of(&caps[1]),
                number: caps[2].parse().unwrap_or(1),
                text: strip_inline(&caps[3]),
            });
        } else {
            paragraph.push(strip_inline(line));
        }
    }
    flush(&mut paragraph, &mut blocks);

    RenderedMarkdown { blocks }
}
