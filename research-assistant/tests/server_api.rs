mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{ScriptedModel, StaticSearch};
use research_assistant::server::{router, AppState};
use research_assistant::Configuration;
use futures::StreamExt;
use research_assistant::server::run_updates;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn configured() -> Configuration {
    Configuration {
        serper_api_key: "serper".to_string(),
        openai_api_key: "openai".to_string(),
        ..Default::default()
    }
}

fn app(config: Configuration, model: Arc<ScriptedModel>) -> axum::Router {
    router(Arc::new(AppState::with_backends(
        config,
        model,
        Arc::new(StaticSearch::new()),
    )))
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, axum::body::Bytes) {
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    (status, body)
}

async fn send_json(app: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn index_serves_form() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(app(configured(), Arc::new(ScriptedModel::new())), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("Start Research"));
}

#[tokio::test]
async fn config_hides_keys_and_lists_models() {
    let request = Request::builder().uri("/api/config").body(Body::empty()).unwrap();
    let (status, json) = send_json(app(configured(), Arc::new(ScriptedModel::new())), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["selected_model"], "gpt-4o-mini");
    assert_eq!(json["model_options"].as_array().unwrap().len(), 4);
    assert_eq!(json["has_serper_key"], true);
    assert!(!json.to_string().contains("\"serper\""));
}

#[tokio::test]
async fn research_returns_report_with_sections() {
    let model = Arc::new(ScriptedModel::new());
    let request = post_json(
        "/api/research",
        serde_json::json!({ "topic": "fusion", "context": "focus on ITER" }),
    );
    let (status, json) = send_json(app(configured(), model.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["report"], common::REPORT);
    assert!(json["file_name"].as_str().unwrap().starts_with("research_report_"));
    let kinds: Vec<_> = json["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["text", "diagram", "text", "equation", "text"]);
    assert_eq!(json["sections"][0]["body"], "# Fusion\n\nEnergy \\(E=mc^2\\).\n");
    assert_eq!(json["sections"][1]["key"], "report_mermaid_1");
    assert_eq!(json["diagrams"][0], "graph TD\nA-->B\n");
    assert_eq!(json["equations"]["block"][0], "P = IV");
    assert!(model.prompts()[0]
        .1
        .contains("fusion. Additional context: focus on ITER"));
}

#[tokio::test]
async fn research_requires_topic_and_keys() {
    let request = post_json("/api/research", serde_json::json!({ "topic": "fusion" }));
    let model = Arc::new(ScriptedModel::new());
    let (status, json) = send_json(app(Configuration::default(), model.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "Missing required input: Serper API key, OpenAI API key"
    );
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn keys_from_request_unlock_research() {
    let request = post_json(
        "/api/research",
        serde_json::json!({
            "topic": "fusion",
            "serper_api_key": "typed-serper",
            "openai_api_key": "typed-openai"
        }),
    );
    let (status, _) = send_json(app(Configuration::default(), Arc::new(ScriptedModel::new())), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn pipeline_failure_is_reported_generically() {
    let request = post_json("/api/research", serde_json::json!({ "topic": "fusion" }));
    let (status, json) = send_json(app(configured(), Arc::new(ScriptedModel::failing_at(0))), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("An error occurred during the research process:"));
    assert_eq!(json["status"], "Error occurred");
}

#[tokio::test]
async fn render_splits_markdown() {
    let request = post_json(
        "/api/render",
        serde_json::json!({ "markdown": "$$a$$ and $b$" }),
    );
    let (status, json) = send_json(app(configured(), Arc::new(ScriptedModel::new())), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sections"][0]["kind"], "equation");
    assert_eq!(json["sections"][0]["body"], "a");
    assert_eq!(json["sections"][1]["body"], " and \\(b\\)");
}

#[tokio::test]
async fn download_is_dated_markdown_attachment() {
    let request = post_json("/api/download", serde_json::json!({ "report": "# Saved" }));
    let resp = app(configured(), Arc::new(ScriptedModel::new()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"research_report_"));
    assert!(disposition.ends_with(".md\""));
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/markdown"));
    let body = axum::body::to_bytes(resp.into_body(), 1_000).await.unwrap();
    assert_eq!(&body[..], b"# Saved");
}

#[tokio::test]
async fn empty_diagram_still_returns_report() {
    let report = "# Draft\n```mermaid\n```\nMore text.";
    let request = post_json("/api/research", serde_json::json!({ "topic": "fusion" }));
    let (status, json) = send_json(app(configured(), Arc::new(ScriptedModel::writing(report))), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["report"], report);
    assert!(json["file_name"].as_str().unwrap().ends_with(".md"));
    assert_eq!(json["sections"][1]["kind"], "diagram");
    assert_eq!(json["sections"][1]["body"], "");
}

#[tokio::test]
async fn status_subscribers_only_see_their_run() {
    let state = Arc::new(AppState::with_backends(
        configured(),
        Arc::new(ScriptedModel::new()),
        Arc::new(StaticSearch::new()),
    ));
    let updates = run_updates(state.subscribe(), "alpha".to_string());
    futures::pin_mut!(updates);

    for run_id in ["alpha", "beta"] {
        let request = post_json(
            "/api/research",
            serde_json::json!({ "topic": "fusion", "run_id": run_id }),
        );
        let (status, json) = send_json(router(state.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["run_id"], run_id);
    }

    let mut seen = Vec::new();
    while let Ok(Some(update)) = tokio::time::timeout(Duration::from_millis(100), updates.next()).await {
        seen.push(update);
    }
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|u| u.run_id.as_deref() == Some("alpha")));
    assert_eq!(seen.last().unwrap().message, "Research completed successfully!");
}

#[tokio::test]
async fn research_assigns_run_id_when_missing() {
    let request = post_json("/api/research", serde_json::json!({ "topic": "fusion" }));
    let (status, json) = send_json(app(configured(), Arc::new(ScriptedModel::new())), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["run_id"].as_str().unwrap().starts_with("run-"));
}
