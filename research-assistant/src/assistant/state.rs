use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::configuration::ResearchSettings;
use super::prompts::Stage;
use super::search::{Citation, SearchResponse};

#[derive(Debug, Clone)]
pub struct ReportInput {
    pub topic: String,
    pub settings: ResearchSettings,
}

impl ReportInput {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            settings: ResearchSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ResearchSettings) -> Self {
        self.settings = settings.clamped();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutput {
    pub stage: Stage,
    pub output: String,
}

/// Everything a run accumulates before the writer produces the report.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub topic: String,
    pub sources: SearchResponse,
    pub citations: Vec<Citation>,
    pub outputs: Vec<StageOutput>,
}

impl PipelineState {
    pub fn with_topic(topic: String) -> Self {
        Self {
            topic,
            ..Default::default()
        }
    }

    pub fn record(&mut self, stage: Stage, output: String) {
        self.outputs.push(StageOutput { stage, output });
    }

    pub fn output_of(&self, stage: Stage) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.stage == stage)
            .map(|o| o.output.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    Stage,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Run this update belongs to, when the caller tagged its pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub timestamp: u64,
}

impl StatusUpdate {
    pub fn new(phase: Phase, message: impl Into<String>, stage: Option<Stage>) -> Self {
        Self {
            run_id: None,
            phase,
            message: message.into(),
            stage,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn for_run(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn belongs_to(&self, run_id: &str) -> bool {
        self.run_id.as_deref() == Some(run_id)
    }
}
