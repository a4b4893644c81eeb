use std::sync::Arc;
use tokio::sync::broadcast::Sender;
use tracing::{debug, error, info};

use super::configuration::{Configuration, ResearchSettings};
use super::llm::{language_model, LanguageModel};
use super::prompts::{
    depth_instruction, tagged, Stage, DIAGRAM_FORMAT_INSTRUCTION, NO_DIAGRAMS_INSTRUCTION,
};
use super::search::{
    deduplicate_and_format_sources, fetch_citations, format_citations, format_sources,
    SerperClient, WebSearch,
};
use super::state::{Phase, PipelineState, ReportInput, StatusUpdate};
use crate::error::Result;
use crate::report::Report;

/// Runs research, visualization and writing in order for one topic.
pub struct ReportPipeline {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn WebSearch>,
    status_tx: Option<Sender<StatusUpdate>>,
    run_id: Option<String>,
}

impl ReportPipeline {
    pub fn new(config: &Configuration) -> Self {
        Self::with_backends(
            language_model(config),
            Arc::new(SerperClient::from_config(config)),
        )
    }

    pub fn with_backends(llm: Arc<dyn LanguageModel>, search: Arc<dyn WebSearch>) -> Self {
        Self {
            llm,
            search,
            status_tx: None,
            run_id: None,
        }
    }

    pub fn set_status_sender(&mut self, tx: Sender<StatusUpdate>) {
        self.status_tx = Some(tx);
    }

    /// Tag every status update from this pipeline with `run_id`.
    pub fn set_run_id(&mut self, run_id: impl Into<String>) {
        self.run_id = Some(run_id.into());
    }

    fn send_status(&self, phase: Phase, message: &str, stage: Option<Stage>) {
        info!(?phase, ?stage, "{message}");
        if let Some(tx) = &self.status_tx {
            // no subscribers is fine; the run never depends on listeners
            let update = StatusUpdate::new(phase, message, stage).for_run(self.run_id.clone());
            if tx.send(update).is_err() {
                debug!(?phase, "no status listeners");
            }
        }
    }

    /// Number of search results requested for a depth setting.
    pub fn results_for_depth(depth: u8) -> u32 {
        4 + 2 * u32::from(depth)
    }

    pub fn stages(settings: &ResearchSettings) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| *stage != Stage::Visualize || settings.include_visualizations)
            .collect()
    }

    pub async fn run(&self, input: ReportInput) -> Result<Report> {
        self.send_status(Phase::Start, "Starting the research process...", None);
        match self.process(&input).await {
            Ok(report) => {
                self.send_status(Phase::Complete, "Research completed successfully!", None);
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "research run failed");
                self.send_status(Phase::Error, &format!("Error: {e}"), None);
                Err(e)
            }
        }
    }

    async fn process(&self, input: &ReportInput) -> Result<Report> {
        let mut state = PipelineState::with_topic(input.topic.clone());
        self.send_status(Phase::Stage, "Research in progress...", None);

        for stage in Self::stages(&input.settings) {
            self.send_status(
                Phase::Stage,
                &format!("{} is working...", stage.role()),
                Some(stage),
            );
            let output = self.run_stage(stage, &mut state, &input.settings).await?;
            state.record(stage, output);
        }

        let content = state.output_of(Stage::Write).unwrap_or_default().to_string();
        Ok(Report::new(content))
    }

    async fn run_stage(
        &self,
        stage: Stage,
        state: &mut PipelineState,
        settings: &ResearchSettings,
    ) -> Result<String> {
        let prompt = match stage {
            Stage::Research => {
                let num = Self::results_for_depth(settings.depth);
                state.sources = self.search.search(&state.topic, num).await?;
                debug!(sources = %format_sources(&state.sources), "gathered sources");
                if settings.include_citations {
                    state.citations = fetch_citations(self.search.as_ref(), &state.topic).await;
                }
                research_prompt(state, settings)
            }
            Stage::Visualize => visualize_prompt(state),
            Stage::Write => write_prompt(state, settings),
        };
        self.llm.complete(&stage.system_prompt(), &prompt).await
    }
}

fn task_header(stage: Stage, topic: &str) -> String {
    format!(
        "{}\n\nExpected output: {}",
        stage.task_description(topic),
        stage.expected_output()
    )
}

fn previous_outputs(state: &PipelineState) -> Vec<String> {
    state
        .outputs
        .iter()
        .map(|o| tagged(o.stage.context_tag(), &o.output))
        .collect()
}

pub fn research_prompt(state: &PipelineState, settings: &ResearchSettings) -> String {
    let mut parts = vec![
        task_header(Stage::Research, &state.topic),
        depth_instruction(settings.depth),
        tagged("Search Results", &deduplicate_and_format_sources(&state.sources)),
    ];
    if !state.citations.is_empty() {
        parts.push(tagged("Citations", &format_citations(&state.citations)));
    }
    parts.join("\n\n")
}

pub fn visualize_prompt(state: &PipelineState) -> String {
    let mut parts = vec![task_header(Stage::Visualize, &state.topic)];
    parts.extend(previous_outputs(state));
    parts.push(DIAGRAM_FORMAT_INSTRUCTION.to_string());
    parts.join("\n\n")
}

pub fn write_prompt(state: &PipelineState, settings: &ResearchSettings) -> String {
    let mut parts = vec![task_header(Stage::Write, &state.topic)];
    parts.extend(previous_outputs(state));
    if settings.include_citations && !state.citations.is_empty() {
        parts.push(tagged("Citations", &format_citations(&state.citations)));
    }
    parts.push(if settings.include_visualizations {
        DIAGRAM_FORMAT_INSTRUCTION.to_string()
    } else {
        NO_DIAGRAMS_INSTRUCTION.to_string()
    });
    parts.join("\n\n")
}
