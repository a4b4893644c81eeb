pub mod render;
pub mod segment;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub use render::{render_report, render_segments, HtmlSink, RenderedSection, SegmentSink};
pub use segment::{
    extract_latex_equations, extract_mermaid_diagrams, extract_segments, LatexEquations, Segment,
    SegmentKind,
};

/// A finished markdown report. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    content: String,
    #[serde(skip)]
    created: NaiveDate,
}

impl Report {
    pub fn new(content: impl Into<String>) -> Self {
        Self::dated(content, Local::now().date_naive())
    }

    pub fn dated(content: impl Into<String>, created: NaiveDate) -> Self {
        Self {
            content: content.into(),
            created,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_string(self) -> String {
        self.content
    }

    pub fn created(&self) -> NaiveDate {
        self.created
    }

    pub fn file_name(&self) -> String {
        report_file_name(self.created)
    }

    pub fn segments(&self) -> Vec<Segment<'_>> {
        extract_segments(&self.content)
    }

    /// Write the report into `dir` under its dated file name.
    pub async fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &self.content).await?;
        Ok(path)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

pub fn report_file_name(date: NaiveDate) -> String {
    format!("research_report_{}.md", date.format("%Y%m%d"))
}

/// Fold optional free-text context into the topic handed to the pipeline.
pub fn combine_topic(topic: &str, additional_context: &str) -> String {
    if additional_context.trim().is_empty() {
        topic.to_string()
    } else {
        format!("{topic}. Additional context: {additional_context}")
    }
}
