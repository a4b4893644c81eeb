//! Splits a markdown report into ordered text, diagram and equation segments.
//!
//! Diagram and equation segments keep their delimiters, so concatenating
//! every segment's source gives back the original document.

use enum_as_inner::EnumAsInner;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const MERMAID_FENCE: &str = "```mermaid";
const FENCE: &str = "```";
const EQUATION_DELIMITER: &str = "$$";

fn mermaid_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```mermaid.*?```").expect("valid mermaid pattern"))
}

fn equation_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\$\$.*?\$\$").expect("valid equation pattern"))
}

fn mermaid_body() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```mermaid\n(.*?)```").expect("valid mermaid body pattern"))
}

fn block_equation_body() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\$\$(.*?)\$\$").expect("valid block equation pattern"))
}

pub(crate) fn inline_equation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([^\$]+)\$").expect("valid inline equation pattern"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Text,
    Diagram,
    Equation,
}

/// A contiguous region of a report, borrowed from the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumAsInner)]
pub enum Segment<'a> {
    Text(&'a str),
    Diagram(&'a str),
    Equation(&'a str),
}

impl<'a> Segment<'a> {
    pub fn kind(&self) -> SegmentKind {
        match *self {
            Segment::Text(_) => SegmentKind::Text,
            Segment::Diagram(_) => SegmentKind::Diagram,
            Segment::Equation(_) => SegmentKind::Equation,
        }
    }

    /// The exact slice of the document this segment covers, delimiters included.
    pub fn source(&self) -> &'a str {
        match *self {
            Segment::Text(s) | Segment::Diagram(s) | Segment::Equation(s) => s,
        }
    }

    /// Content without fence or `$$` delimiters, trimmed.
    pub fn body(&self) -> &'a str {
        match *self {
            Segment::Text(s) => s,
            Segment::Diagram(s) => strip_diagram_fence(s),
            Segment::Equation(s) => strip_equation_delimiters(s),
        }
    }

    /// Markdown for this segment, with the body wrapped in the delimiters
    /// it was found with.
    pub fn to_markdown(&self) -> String {
        let source = self.source();
        let body = self.body();
        match source.find(body) {
            Some(start) => {
                let (open, rest) = source.split_at(start);
                format!("{open}{body}{}", &rest[body.len()..])
            }
            None => source.to_string(),
        }
    }
}

pub fn strip_diagram_fence(block: &str) -> &str {
    let mut code = block.trim();
    if let Some(rest) = code.strip_prefix(MERMAID_FENCE) {
        code = rest.trim();
    }
    if let Some(rest) = code.strip_suffix(FENCE) {
        code = rest.trim();
    }
    code
}

pub fn strip_equation_delimiters(block: &str) -> &str {
    block
        .strip_prefix(EQUATION_DELIMITER)
        .and_then(|rest| rest.strip_suffix(EQUATION_DELIMITER))
        .unwrap_or(block)
        .trim()
}

/// Partition `markdown` into segments in document order.
///
/// Scanning restarts after every accepted block, so a delimiter inside a
/// diagram never pairs with one outside it. When a diagram and an equation
/// start at the same offset the longer match wins.
pub fn extract_segments(markdown: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    loop {
        let diagram = mermaid_block().find_at(markdown, cursor);
        let equation = equation_block().find_at(markdown, cursor);
        let (m, kind) = match (diagram, equation) {
            (None, None) => break,
            (Some(d), None) => (d, SegmentKind::Diagram),
            (None, Some(e)) => (e, SegmentKind::Equation),
            (Some(d), Some(e)) => {
                if e.start() < d.start() || (e.start() == d.start() && e.end() > d.end()) {
                    (e, SegmentKind::Equation)
                } else {
                    (d, SegmentKind::Diagram)
                }
            }
        };
        if m.start() > cursor {
            segments.push(Segment::Text(&markdown[cursor..m.start()]));
        }
        segments.push(match kind {
            SegmentKind::Diagram => Segment::Diagram(m.as_str()),
            _ => Segment::Equation(m.as_str()),
        });
        cursor = m.end();
    }
    if cursor < markdown.len() {
        segments.push(Segment::Text(&markdown[cursor..]));
    }
    segments
}

/// Bodies of every "```mermaid" block whose fence line ends right after the tag.
pub fn extract_mermaid_diagrams(markdown: &str) -> Vec<&str> {
    first_groups(mermaid_body(), markdown)
}

fn first_groups<'a>(re: &Regex, text: &'a str) -> Vec<&'a str> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatexEquations<'a> {
    pub inline: Vec<&'a str>,
    pub block: Vec<&'a str>,
}

/// Inline (`$…$`) and block (`$$…$$`) equation bodies, scanned independently.
pub fn extract_latex_equations(markdown: &str) -> LatexEquations<'_> {
    LatexEquations {
        inline: first_groups(inline_equation(), markdown),
        block: first_groups(block_equation_body(), markdown),
    }
}
