use std::sync::Arc;

use askagent_api::{AppState, build_router};
use askagent_core::{
    Agent, Config, ModelBackend, ModelInvocationError, ModelReply, ModelRequest, ModelResponse,
    SearchBackend, SearchError, SearchResult,
};
use async_trait::async_trait;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::{Value, json};

struct EchoModel;

#[async_trait]
impl ModelBackend for EchoModel {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelInvocationError> {
        let last = request
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        Ok(ModelResponse {
            reply: ModelReply::FinalAnswer(format!("echo: {last}")),
            raw: json!({"model": "echo"}),
        })
    }
}

struct StaticSearch;

#[async_trait]
impl SearchBackend for StaticSearch {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn search(
        &self,
        query: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        Ok(vec![SearchResult::new(
            format!("About {query}"),
            "https://example.com/about",
            "static body",
        )])
    }
}

fn server() -> TestServer {
    let agent = Agent::builder(Config::default())
        .with_model_backend(Arc::new(EchoModel))
        .with_search_backend(Some(Arc::new(StaticSearch)))
        .build()
        .expect("agent should build");
    TestServer::new(build_router(AppState::new(agent, 4))).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let server = server();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["capacity"]["max_requests"], 4);
}

#[tokio::test]
async fn empty_question_is_bad_request() {
    let server = server();

    let response = server.post("/agent").json(&json!({"question": "   "})).await;
    assert_eq!(response.status_code(), 400);
    let body = response.json::<Value>();
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn general_question_returns_agent_response() {
    let server = server();

    let response = server
        .post("/agent")
        .json(&json!({"question": "hello there"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["answer"], "echo: hello there");
    assert_eq!(body["used_search"], false);
    assert!(body.get("sources").is_none());
    assert!(body["request_id"].as_str().is_some());
    assert!(body.get("explanation").is_none());
}

#[tokio::test]
async fn research_question_includes_sources_and_explanation() {
    let server = server();

    let response = server
        .post("/agent")
        .json(&json!({"question": "deep research: tides", "explain": true}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["used_search"], true);
    assert_eq!(body["sources"].as_array().unwrap().len(), 2);
    assert!(
        body["explanation"]
            .as_str()
            .unwrap()
            .contains("### Trace Summary")
    );
}

#[tokio::test]
async fn document_without_question_is_translated() {
    let server = server();

    let response = server
        .post("/agent")
        .json(&json!({"question": "", "document": "Good morning"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.contains("Good morning"));
    assert!(answer.ends_with("이 문서 번역해줘"));
}

#[tokio::test]
async fn uploaded_text_file_is_truncated_and_answered() {
    let server = server();

    let text = "x".repeat(20_000);
    let form = MultipartForm::new()
        .add_text("question", "요약해줘")
        .add_part(
            "file",
            Part::bytes(text.into_bytes())
                .file_name("notes.txt")
                .mime_type("text/plain"),
        );

    let response = server.post("/agent/file").multipart(form).await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    let answer = body["answer"].as_str().unwrap();
    assert_eq!(answer.matches('x').count(), 15_000);
    assert!(answer.ends_with("요약해줘"));
    assert_eq!(body["used_search"], false);
}

#[tokio::test]
async fn uploaded_file_without_question_is_translated() {
    let server = server();

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes("Good morning".as_bytes()).file_name("hello.txt"),
    );

    let response = server.post("/agent/file").multipart(form).await;
    assert_eq!(response.status_code(), 200);
    let answer = response.json::<Value>()["answer"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(answer.contains("Good morning"));
    assert!(answer.ends_with("이 문서 번역해줘"));
}

#[tokio::test]
async fn non_text_upload_is_rejected() {
    let server = server();

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"%PDF-1.7".to_vec()).file_name("report.pdf"),
    );

    let response = server.post("/agent/file").multipart(form).await;
    assert_eq!(response.status_code(), 415);
    let body = response.json::<Value>();
    assert!(body["error"].as_str().unwrap().contains("지원하지 않는 파일 형식"));
}

#[tokio::test]
async fn blank_upload_is_bad_request() {
    let server = server();

    let form = MultipartForm::new()
        .add_text("question", "what is this?")
        .add_part("file", Part::bytes(b"  \n".to_vec()).file_name("empty.txt"));

    let response = server.post("/agent/file").multipart(form).await;
    assert_eq!(response.status_code(), 400);
    let body = response.json::<Value>();
    assert!(body["error"].as_str().unwrap().contains("빈 파일"));
}
