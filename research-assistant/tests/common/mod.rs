#![allow(dead_code)]

use async_trait::async_trait;
use research_assistant::assistant::llm::LanguageModel;
use research_assistant::assistant::search::{Citation, SearchResponse, SearchResult, WebSearch};
use research_assistant::ReportError;
use std::sync::Mutex;

pub const REPORT: &str = "# Fusion\n\nEnergy $E=mc^2$.\n```mermaid\ngraph TD\nA-->B\n```\n$$P = IV$$\nDone.";

/// Records every prompt and answers with the system role plus a fixed report.
pub struct ScriptedModel {
    pub calls: Mutex<Vec<(String, String)>>,
    pub fail_on_call: Option<usize>,
    pub report: String,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on_call: None,
            report: REPORT.to_string(),
        }
    }

    pub fn writing(report: &str) -> Self {
        Self {
            report: report.to_string(),
            ..Self::new()
        }
    }

    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new()
        }
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ReportError> {
        let mut calls = self.calls.lock().unwrap();
        let idx = calls.len();
        calls.push((system.to_string(), prompt.to_string()));
        if self.fail_on_call == Some(idx) {
            return Err(ReportError::Upstream {
                service: "OpenAI",
                message: "rate limited".to_string(),
            });
        }
        Ok(match idx {
            0 => "{\"findings\": [\"tokamaks\"]}".to_string(),
            _ if system.starts_with("You are Technical Writer.") => self.report.clone(),
            _ => "```mermaid\ngraph LR\nX-->Y\n```".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct StaticSearch {
    pub scholar_fails: bool,
    pub queries: Mutex<Vec<(String, u32)>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self {
            scholar_fails: false,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WebSearch for StaticSearch {
    async fn search(&self, query: &str, num_results: u32) -> Result<SearchResponse, ReportError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), num_results));
        Ok(SearchResponse {
            results: vec![SearchResult {
                title: "ITER overview".to_string(),
                url: "https://iter.example".to_string(),
                content: "tokamak construction".to_string(),
            }],
        })
    }

    async fn scholar(&self, _query: &str) -> Result<Vec<Citation>, ReportError> {
        if self.scholar_fails {
            return Err(ReportError::Upstream {
                service: "Serper",
                message: "scholar unavailable".to_string(),
            });
        }
        Ok(vec![Citation {
            title: "Plasma confinement".to_string(),
            author: "L Spitzer".to_string(),
            year: "1958".to_string(),
        }])
    }
}
