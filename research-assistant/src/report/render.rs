//! Dispatches report segments to presentation routines.

use serde::Serialize;
use std::borrow::Cow;
use std::convert::Infallible;

use super::segment::{extract_segments, inline_equation, Segment, SegmentKind};

/// A presentation target for report segments.
///
/// Errors from a sink are not handled by the renderer; they abort rendering
/// and are returned to the caller unchanged.
pub trait SegmentSink {
    type Error;

    /// Markdown text with inline math already rewritten to `\(…\)`.
    fn text(&mut self, markdown: &str) -> Result<(), Self::Error>;

    /// Mermaid source without its fence.
    fn diagram(&mut self, code: &str, key: &str) -> Result<(), Self::Error>;

    /// LaTeX source of a display equation without its `$$` delimiters.
    fn equation(&mut self, latex: &str) -> Result<(), Self::Error>;
}

/// Rewrite `$x$` into the `\(x\)` inline math syntax understood by KaTeX.
pub fn rewrite_inline_math(text: &str) -> Cow<'_, str> {
    inline_equation().replace_all(text, r"\(${1}\)")
}

pub fn render_segments<S: SegmentSink>(
    segments: &[Segment<'_>],
    sink: &mut S,
) -> Result<(), S::Error> {
    for (idx, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Diagram(_) => sink.diagram(segment.body(), &format!("report_mermaid_{idx}"))?,
            Segment::Equation(_) => sink.equation(segment.body())?,
            Segment::Text(text) => sink.text(&rewrite_inline_math(text))?,
        }
    }
    Ok(())
}

pub fn render_report<S: SegmentSink>(markdown: &str, sink: &mut S) -> Result<(), S::Error> {
    render_segments(&extract_segments(markdown), sink)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedSection {
    pub kind: SegmentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub body: String,
}

/// Collects segments as sections for the browser, which renders markdown,
/// mermaid and KaTeX client-side.
#[derive(Debug, Default)]
pub struct HtmlSink {
    sections: Vec<RenderedSection>,
}

impl HtmlSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sections for every segment of `markdown`.
    pub fn from_markdown(markdown: &str) -> Self {
        let mut sink = Self::new();
        if let Err(never) = render_report(markdown, &mut sink) {
            match never {}
        }
        sink
    }

    pub fn sections(&self) -> &[RenderedSection] {
        &self.sections
    }

    pub fn into_sections(self) -> Vec<RenderedSection> {
        self.sections
    }

    /// HTML fragment with one element per section.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for (idx, section) in self.sections.iter().enumerate() {
            let body = escape_html(&section.body);
            let fragment = match section.kind {
                SegmentKind::Text => {
                    format!("<div class=\"section markdown\" id=\"section_{idx}\">{body}</div>\n")
                }
                SegmentKind::Diagram => format!(
                    "<pre class=\"section mermaid\" id=\"{}\">{body}</pre>\n",
                    section.key.as_deref().unwrap_or("diagram")
                ),
                SegmentKind::Equation => {
                    format!("<div class=\"section equation\" id=\"section_{idx}\">{body}</div>\n")
                }
            };
            html.push_str(&fragment);
        }
        html
    }

    /// Standalone page that renders the sections with CDN-hosted libraries.
    pub fn to_document(&self, title: &str) -> String {
        format!(
            include_str!("../../static/report.html"),
            title = escape_html(title),
            sections = self.to_html()
        )
    }
}

impl SegmentSink for HtmlSink {
    type Error = Infallible;

    fn text(&mut self, markdown: &str) -> Result<(), Self::Error> {
        self.sections.push(RenderedSection {
            kind: SegmentKind::Text,
            key: None,
            body: markdown.to_string(),
        });
        Ok(())
    }

    fn diagram(&mut self, code: &str, key: &str) -> Result<(), Self::Error> {
        self.sections.push(RenderedSection {
            kind: SegmentKind::Diagram,
            key: Some(key.to_string()),
            body: code.to_string(),
        });
        Ok(())
    }

    fn equation(&mut self, latex: &str) -> Result<(), Self::Error> {
        self.sections.push(RenderedSection {
            kind: SegmentKind::Equation,
            key: None,
            body: latex.to_string(),
        });
        Ok(())
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
