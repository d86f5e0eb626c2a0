//! HTTP surface for the agent: `POST /agent`, `POST /agent/file` and `GET /health`.

use std::sync::Arc;

use askagent_core::{Agent, AgentResponse, AskAgentError};
use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    agent: Arc<Agent>,
    request_permits: Arc<Semaphore>,
    max_requests: usize,
}

impl AppState {
    pub fn new(agent: Agent, max_requests: usize) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            agent: Arc::new(agent),
            request_permits: Arc::new(Semaphore::new(max_requests)),
            max_requests,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/agent", post(handle_agent))
        .route("/agent/file", post(handle_agent_file))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<AskAgentError> for AppError {
    fn from(error: AskAgentError) -> Self {
        let status = match error {
            AskAgentError::EmptyQuestion => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, AppError>;

fn acquire_request_permit(state: &AppState) -> ApiResult<OwnedSemaphorePermit> {
    match state.request_permits.clone().try_acquire_owned() {
        Ok(permit) => Ok(permit),
        Err(TryAcquireError::NoPermits) => Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "request capacity reached; retry once a slot frees up",
        )),
        Err(TryAcquireError::Closed) => Err(AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "agent executor unavailable",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct AgentRequest {
    #[serde(default)]
    question: String,
    /// Pre-extracted document text.
    document: Option<String>,
    explain: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AgentPayload {
    request_id: String,
    #[serde(flatten)]
    response: AgentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
}

#[derive(Debug, Serialize)]
struct CapacityReport {
    max_requests: usize,
    available_requests: usize,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    capacity: CapacityReport,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        capacity: CapacityReport {
            max_requests: state.max_requests,
            available_requests: state.request_permits.available_permits(),
        },
    })
}

async fn handle_agent(
    State(state): State<AppState>,
    Json(request): Json<AgentRequest>,
) -> ApiResult<Json<AgentPayload>> {
    let _permit = acquire_request_permit(&state)?;
    let payload = answer(
        &state,
        &request.question,
        request.document.as_deref(),
        request.explain.unwrap_or(false),
    )
    .await?;
    Ok(Json(payload))
}

/// Multipart upload: a `file` part (plain text, `.txt`) plus optional
/// `question` and `explain` fields. Length is capped by the agent.
async fn handle_agent_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<AgentPayload>> {
    let _permit = acquire_request_permit(&state)?;

    let mut question = String::new();
    let mut explain = false;
    let mut document = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?
    {
        match field.name() {
            Some("question") => {
                question = field
                    .text()
                    .await
                    .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
            }
            Some("explain") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
                explain = matches!(value.trim(), "true" | "1");
            }
            Some("file") => {
                if !is_text_upload(field.file_name()) {
                    return Err(AppError::new(
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "지원하지 않는 파일 형식입니다. txt 파일만 업로드해 주세요.",
                    ));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
                document = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            _ => {}
        }
    }

    let document = document
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| {
            AppError::new(
                StatusCode::BAD_REQUEST,
                "빈 파일이거나 내용을 읽을 수 없습니다.",
            )
        })?;

    let payload = answer(&state, &question, Some(&document), explain).await?;
    Ok(Json(payload))
}

fn is_text_upload(file_name: Option<&str>) -> bool {
    file_name
        .map(|name| name.to_ascii_lowercase().ends_with(".txt"))
        .unwrap_or(false)
}

async fn answer(
    state: &AppState,
    question: &str,
    document: Option<&str>,
    explain: bool,
) -> ApiResult<AgentPayload> {
    let outcome = state
        .agent
        .run_with_report(question, document)
        .await
        .inspect_err(|err| warn!(error = %err, "agent request rejected"))?;

    info!(
        request_id = %outcome.request_id,
        used_search = outcome.response.used_search,
        document = document.is_some(),
        "agent request served"
    );

    let explanation = explain.then(|| outcome.trace_summary().render_markdown());

    Ok(AgentPayload {
        request_id: outcome.request_id,
        response: outcome.response,
        explanation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use askagent_core::{
        Config, ModelBackend, ModelInvocationError, ModelReply, ModelRequest, ModelResponse,
    };
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl ModelBackend for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn complete(
            &self,
            _request: &ModelRequest,
        ) -> Result<ModelResponse, ModelInvocationError> {
            Ok(ModelResponse {
                reply: ModelReply::FinalAnswer(String::new()),
                raw: serde_json::Value::Null,
            })
        }
    }

    fn state(max_requests: usize) -> AppState {
        let agent = Agent::builder(Config::default())
            .with_model_backend(Arc::new(Silent))
            .with_search_backend(None)
            .build()
            .expect("agent");
        AppState::new(agent, max_requests)
    }

    #[test]
    fn capacity_limit_returns_429() {
        let state = state(1);

        let permit = acquire_request_permit(&state).expect("first permit should succeed");
        let err = acquire_request_permit(&state).expect_err("second permit should fail");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        drop(permit);
    }

    #[test]
    fn only_txt_uploads_are_accepted() {
        assert!(is_text_upload(Some("notes.TXT")));
        assert!(!is_text_upload(Some("report.pdf")));
        assert!(!is_text_upload(None));
    }

    #[test]
    fn empty_question_maps_to_400() {
        let response = AppError::from(AskAgentError::EmptyQuestion).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            AppError::from(AskAgentError::InvalidConfiguration("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
