use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::assistant::configuration::{
    Configuration, CredentialOverrides, LlmProvider, ResearchSettings, MODEL_OPTIONS,
};
use crate::assistant::llm::LanguageModel;
use crate::assistant::pipeline::ReportPipeline;
use crate::assistant::search::WebSearch;
use crate::assistant::state::{ReportInput, StatusUpdate};
use crate::error::ReportError;
use crate::report::{
    combine_topic, extract_latex_equations, extract_mermaid_diagrams, report_file_name, HtmlSink,
    RenderedSection, Report,
};

const STATUS_CHANNEL_CAPACITY: usize = 64;

pub struct AppState {
    config: Configuration,
    status_tx: broadcast::Sender<StatusUpdate>,
    backends: Option<(Arc<dyn LanguageModel>, Arc<dyn WebSearch>)>,
    next_run: AtomicU64,
}

impl AppState {
    pub fn new(config: Configuration) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            config,
            status_tx,
            backends: None,
            next_run: AtomicU64::new(1),
        }
    }

    /// Use fixed backends for every run instead of building clients per request.
    pub fn with_backends(
        config: Configuration,
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn WebSearch>,
    ) -> Self {
        Self {
            backends: Some((llm, search)),
            ..Self::new(config)
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    fn new_run_id(&self) -> String {
        format!("run-{}", self.next_run.fetch_add(1, Ordering::Relaxed))
    }

    fn pipeline(&self, config: &Configuration, run_id: &str) -> ReportPipeline {
        let mut pipeline = match &self.backends {
            Some((llm, search)) => ReportPipeline::with_backends(llm.clone(), search.clone()),
            None => ReportPipeline::new(config),
        };
        pipeline.set_status_sender(self.status_tx.clone());
        pipeline.set_run_id(run_id);
        pipeline
    }
}

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    topic: String,
    #[serde(default)]
    context: String,
    /// Chosen by the browser so it can subscribe to `/api/status` first.
    #[serde(default)]
    run_id: Option<String>,
    #[serde(flatten)]
    credentials: CredentialOverrides,
    #[serde(default)]
    settings: ResearchSettings,
}

#[derive(Debug, Serialize)]
struct Equations {
    inline: Vec<String>,
    block: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ResearchResponse {
    run_id: String,
    report: String,
    file_name: String,
    sections: Vec<RenderedSection>,
    diagrams: Vec<String>,
    equations: Equations,
    status: String,
}

impl ResearchResponse {
    fn from_report(report: &Report, run_id: String) -> Self {
        let markdown = report.as_str();
        let to_owned = |items: Vec<&str>| -> Vec<String> {
            items.into_iter().map(str::to_string).collect()
        };
        let equations = extract_latex_equations(markdown);
        Self {
            run_id,
            report: markdown.to_string(),
            file_name: report.file_name(),
            sections: HtmlSink::from_markdown(markdown).into_sections(),
            diagrams: to_owned(extract_mermaid_diagrams(markdown)),
            equations: Equations {
                inline: to_owned(equations.inline),
                block: to_owned(equations.block),
            },
            status: "Research completed successfully!".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RenderRequest {
    markdown: String,
}

#[derive(Debug, Serialize)]
struct RenderResponse {
    sections: Vec<RenderedSection>,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    run: String,
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    report: String,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    model_options: [&'static str; 4],
    selected_model: &'static str,
    llm_provider: LlmProvider,
    has_serper_key: bool,
    has_openai_key: bool,
    settings: ResearchSettings,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    status: String,
}

pub enum ApiError {
    BadRequest(String),
    Research(ReportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Research(e) => {
                error!("Research error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("An error occurred during the research process: {e}"),
                )
            }
        };
        (
            code,
            Json(ErrorResponse {
                error,
                status: "Error occurred".to_string(),
            }),
        )
            .into_response()
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Research(err)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/research", post(handle_research))
        .route("/api/render", post(handle_render))
        .route("/api/download", post(handle_download))
        .route("/api/status", get(status_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: Configuration) -> anyhow::Result<()> {
    let addr = config.bind_addr;
    let app = router(Arc::new(AppState::new(config)));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting server on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        model_options: MODEL_OPTIONS,
        selected_model: MODEL_OPTIONS[config.selected_model_index()],
        llm_provider: config.llm_provider,
        has_serper_key: !config.serper_api_key.is_empty(),
        has_openai_key: !config.openai_api_key.is_empty(),
        settings: ResearchSettings::default(),
    })
}

async fn handle_research(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let config = state.config.with_overrides(&request.credentials);
    let missing = config.missing_inputs(&request.topic);
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Missing required input: {}",
            missing.join(", ")
        )));
    }

    let run_id = match request.run_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => state.new_run_id(),
    };
    let topic = combine_topic(&request.topic, &request.context);
    info!(%topic, %run_id, model = config.active_model(), "research requested");
    let input = ReportInput::new(topic).with_settings(request.settings);
    let report = state.pipeline(&config, &run_id).run(input).await?;

    Ok(Json(ResearchResponse::from_report(&report, run_id)))
}

async fn handle_render(Json(request): Json<RenderRequest>) -> Json<RenderResponse> {
    Json(RenderResponse {
        sections: HtmlSink::from_markdown(&request.markdown).into_sections(),
    })
}

async fn handle_download(Json(request): Json<DownloadRequest>) -> impl IntoResponse {
    let file_name = report_file_name(chrono::Local::now().date_naive());
    (
        [
            (CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        request.report,
    )
}

/// Updates from `rx` that belong to `run_id`; other runs are skipped.
pub fn run_updates(
    mut rx: broadcast::Receiver<StatusUpdate>,
    run_id: String,
) -> impl Stream<Item = StatusUpdate> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(update) if update.belongs_to(&run_id) => {
                    yield update;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "status listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }
}

async fn status_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = run_updates(state.subscribe(), query.run);
    let stream = updates.filter_map(|update| async move {
        match Event::default().event("status").json_data(&update) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                warn!(error = %e, "failed to encode status update");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
