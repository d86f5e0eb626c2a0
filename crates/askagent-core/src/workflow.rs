use std::sync::Arc;

use anyhow::anyhow;
use graph_flow::{
    ExecutionStatus, FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session,
    SessionStorage, Task,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capability::{CapabilityRegistry, WebSearchCapability};
use crate::classifier::{Mode, ModeClassifier};
use crate::config::{Config, SearchProviderKind};
use crate::controller::{ControllerSettings, ResearchController, StopCondition};
use crate::detector::SearchUsageDetector;
use crate::formatter::ContextFormatter;
use crate::logging::{RequestLogInput, log_request_completion};
use crate::metrics;
use crate::model::{DynModelBackend, ModelInvoker};
use crate::prompt::DEFAULT_DOCUMENT_QUESTION;
use crate::search::{DynSearchBackend, SearchProvider};
use crate::state::{AgentResponse, AgentState, Phase};
use crate::tasks::{
    AnswerTask, ClassifyTask, DOCUMENT_KEY, FinalizeTask, QUESTION_KEY, RESPONSE_KEY, STATE_KEY,
    SearchTask, TRACE_KEY, routes_to,
};
use crate::trace::{TraceEvent, TraceSummary};
use crate::AskAgentError;

/// Upper bound on runner invocations per request; the graph normally
/// completes in a single call.
const MAX_RUNNER_STEPS: usize = 16;

const INTERNAL_ERROR_PREFIX: &str = "에이전트 실행 중 오류가 발생했습니다";

struct AgentTasks {
    classify: Arc<ClassifyTask>,
    search: Arc<SearchTask>,
    answer: Arc<AnswerTask>,
    finalize: Arc<FinalizeTask>,
}

/// Build the immutable control-flow graph:
/// `classify → (search | answer)`, `search → answer`, `answer → (search | finalize)`.
fn build_graph(tasks: &AgentTasks) -> Arc<Graph> {
    let builder = GraphBuilder::new("askagent_workflow")
        .add_task(tasks.classify.clone())
        .add_task(tasks.search.clone())
        .add_task(tasks.answer.clone())
        .add_task(tasks.finalize.clone())
        .add_conditional_edge(
            tasks.classify.id(),
            |ctx| routes_to(ctx, Phase::Searching),
            tasks.search.id(),
            tasks.answer.id(),
        )
        .add_edge(tasks.search.id(), tasks.answer.id())
        .add_conditional_edge(
            tasks.answer.id(),
            |ctx| routes_to(ctx, Phase::Searching),
            tasks.search.id(),
            tasks.finalize.id(),
        )
        .set_start_task(tasks.classify.id());

    Arc::new(builder.build())
}

/// Everything a run produced, for callers that want more than the response.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub request_id: String,
    pub mode: Option<Mode>,
    pub response: AgentResponse,
    pub trace_events: Vec<TraceEvent>,
}

impl AgentOutcome {
    pub fn trace_summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.trace_events)
    }
}

/// Assembles an [`Agent`] from configuration plus optional injected backends.
pub struct AgentBuilder {
    config: Config,
    model: Option<DynModelBackend>,
    search: Option<Option<DynSearchBackend>>,
}

impl AgentBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            model: None,
            search: None,
        }
    }

    pub fn with_model_backend(mut self, backend: DynModelBackend) -> Self {
        self.model = Some(backend);
        self
    }

    /// Override the search backend; `None` runs without search.
    pub fn with_search_backend(mut self, backend: Option<DynSearchBackend>) -> Self {
        self.search = Some(backend);
        self
    }

    pub fn build(self) -> Result<Agent, AskAgentError> {
        let config = self.config;

        let model = match self.model {
            Some(model) => model,
            None => model_backend_from_config(&config)?,
        };
        let search_backend = match self.search {
            Some(search) => search,
            None => search_backend_from_config(&config),
        };

        let search = SearchProvider::new(search_backend).with_hard_limit(config.search.hard_limit);
        let formatter = ContextFormatter::new(config.research.snippet_chars);
        let invoker = ModelInvoker::new(model);

        let settings = ControllerSettings {
            iteration_budget: config.research.iteration_budget,
            max_results: config.search.max_results,
            followup_suffix: config.research.followup_suffix.trim().to_string(),
            capability_rounds: if config.capabilities.enabled {
                config.capabilities.max_rounds
            } else {
                0
            },
        };
        let stop = StopCondition::new(
            config.research.answer_length_threshold,
            config.lexicon.report_markers.clone(),
        );
        let capabilities = CapabilityRegistry::new().with(Arc::new(WebSearchCapability::new(
            search.clone(),
            formatter,
            config.search.max_results,
        )));

        info!(
            model_backend = invoker.backend_name(),
            search_backend = search.backend_name(),
            iteration_budget = settings.iteration_budget,
            capability_rounds = settings.capability_rounds,
            "agent configured"
        );

        let controller = Arc::new(
            ResearchController::new(settings, stop, search, formatter, invoker)
                .with_capabilities(capabilities),
        );

        let tasks = AgentTasks {
            classify: Arc::new(ClassifyTask::new(
                ModeClassifier::new(config.lexicon.clone()),
                controller.clone(),
            )),
            search: Arc::new(SearchTask::new(controller.clone())),
            answer: Arc::new(AnswerTask::new(controller)),
            finalize: Arc::new(FinalizeTask::new(SearchUsageDetector::new(
                config.lexicon.disclosure_phrases.clone(),
            ))),
        };
        let graph = build_graph(&tasks);

        Ok(Agent {
            graph,
            start_task: tasks.classify.id().to_string(),
            document_max_chars: config.document.max_chars,
            include_raw_model: config.logging.include_raw_model,
            request_log: config.logging.request_log,
        })
    }
}

fn model_backend_from_config(config: &Config) -> Result<DynModelBackend, AskAgentError> {
    match config.llm.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => {
            let api_key = config.llm_api_key()?;
            Ok(Arc::new(crate::model::OpenAiBackend::new(
                &api_key,
                config.llm.model.clone(),
                config.llm.base_url.as_deref(),
            )))
        }
        other => Err(AskAgentError::InvalidConfiguration(format!(
            "unsupported llm provider `{other}`"
        ))),
    }
}

fn search_backend_from_config(config: &Config) -> Option<DynSearchBackend> {
    let Some(api_key) = config.search_api_key() else {
        if config.search.provider != SearchProviderKind::None {
            warn!(
                env = %config.search.api_key_env,
                "search credentials not set; research mode will answer without web context"
            );
        }
        return None;
    };

    match config.search.provider {
        #[cfg(feature = "tavily")]
        SearchProviderKind::Tavily => {
            let mut backend = crate::search::TavilyBackend::new(api_key)
                .with_search_depth(config.search.search_depth.clone());
            if let Some(endpoint) = &config.search.endpoint {
                backend = backend.with_endpoint(endpoint.clone());
            }
            Some(Arc::new(backend))
        }
        #[cfg(not(feature = "tavily"))]
        SearchProviderKind::Tavily => {
            let _ = api_key;
            warn!("built without the tavily feature; search disabled");
            None
        }
        SearchProviderKind::None => None,
    }
}

/// Entry point. Built once, shared across concurrent requests; each run owns
/// its own session and state.
pub struct Agent {
    graph: Arc<Graph>,
    start_task: String,
    document_max_chars: usize,
    include_raw_model: bool,
    request_log: bool,
}

impl Agent {
    pub fn builder(config: Config) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    pub fn from_config(config: Config) -> Result<Self, AskAgentError> {
        AgentBuilder::new(config).build()
    }

    /// Answer a question. Only an empty question is an error; every other
    /// failure becomes a well-formed response carrying an error message.
    pub async fn run(&self, question: &str) -> Result<AgentResponse, AskAgentError> {
        self.run_with_document(question, None).await
    }

    /// Like [`Agent::run`], with pre-extracted document text as extra context.
    pub async fn run_with_document(
        &self,
        question: &str,
        document: Option<&str>,
    ) -> Result<AgentResponse, AskAgentError> {
        Ok(self.run_with_report(question, document).await?.response)
    }

    pub async fn run_with_report(
        &self,
        question: &str,
        document: Option<&str>,
    ) -> Result<AgentOutcome, AskAgentError> {
        let document = document
            .filter(|text| !text.trim().is_empty())
            .map(|text| truncate_document(text, self.document_max_chars));
        let question = normalize_question(question, document.is_some())?;
        let request_id = Uuid::new_v4().to_string();

        // A panicking backend or task surfaces as a JoinError instead of unwinding.
        let run = tokio::spawn(execute(
            self.graph.clone(),
            self.start_task.clone(),
            request_id.clone(),
            question.clone(),
            document,
        ));
        let result = match run.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow!("agent task aborted: {}", join_failure(join_err))),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(request_id = %request_id, error = %err, "agent run failed");
                AgentOutcome {
                    request_id: request_id.clone(),
                    mode: None,
                    response: AgentResponse::internal_error(format!(
                        "{INTERNAL_ERROR_PREFIX}: {err}"
                    )),
                    trace_events: Vec::new(),
                }
            }
        };

        metrics::record_request(
            outcome.mode.map(|mode| mode.as_str()).unwrap_or("unknown"),
            if outcome.mode.is_some() { "ok" } else { "error" },
        );

        if self.request_log {
            let input = RequestLogInput {
                request_id: outcome.request_id.clone(),
                mode: outcome.mode.map(|mode| mode.to_string()),
                question: question.clone(),
                answer: outcome.response.answer.clone(),
                used_search: outcome.response.used_search,
                sources: outcome
                    .response
                    .sources
                    .iter()
                    .flatten()
                    .map(|source| source.url.clone())
                    .collect(),
            };
            match tokio::task::spawn_blocking(move || log_request_completion(input)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "failed to append request log"),
                Err(err) => warn!(error = %err, "request log writer aborted"),
            }
        }

        if self.include_raw_model {
            Ok(outcome)
        } else {
            Ok(AgentOutcome {
                response: outcome.response.without_raw_model(),
                ..outcome
            })
        }
    }
}

/// Drives one request through the shared graph on a fresh session.
async fn execute(
    graph: Arc<Graph>,
    start_task: String,
    request_id: String,
    question: String,
    document: Option<String>,
) -> anyhow::Result<AgentOutcome> {
    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());

    let session = Session::new_from_task(request_id.clone(), &start_task);
    session.context.set(QUESTION_KEY, question).await;
    session.context.set(DOCUMENT_KEY, document).await;

    storage
        .save(session)
        .await
        .map_err(|err| anyhow!("failed to persist session: {err}"))?;

    let mut completed = false;
    for _ in 0..MAX_RUNNER_STEPS {
        let result = runner
            .run(&request_id)
            .await
            .map_err(|err| anyhow!("graph execution failure: {err}"))?;

        match result.status {
            ExecutionStatus::Completed => {
                completed = true;
                break;
            }
            ExecutionStatus::Error(message) => return Err(anyhow!(message)),
            _ => continue,
        }
    }
    if !completed {
        return Err(anyhow!(
            "graph did not complete within {MAX_RUNNER_STEPS} runner steps"
        ));
    }

    let session = storage
        .get(&request_id)
        .await
        .map_err(|err| anyhow!("failed to reload session: {err}"))?
        .ok_or_else(|| anyhow!("session missing after execution"))?;

    let response: AgentResponse = session
        .context
        .get(RESPONSE_KEY)
        .await
        .ok_or_else(|| anyhow!("no response recorded"))?;
    let mode = session
        .context
        .get::<AgentState>(STATE_KEY)
        .await
        .map(|state| state.mode());
    let trace_events: Vec<TraceEvent> =
        session.context.get(TRACE_KEY).await.unwrap_or_default();

    Ok(AgentOutcome {
        request_id,
        mode,
        response,
        trace_events,
    })
}

fn join_failure(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

/// Trim and reject empty input. A document with no instruction defaults to
/// a translation request.
fn normalize_question(question: &str, has_document: bool) -> Result<String, AskAgentError> {
    let trimmed = question.trim();
    if !trimmed.is_empty() {
        return Ok(trimmed.to_string());
    }
    if has_document {
        return Ok(DEFAULT_DOCUMENT_QUESTION.to_string());
    }
    Err(AskAgentError::EmptyQuestion)
}

fn truncate_document(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_question_is_rejected() {
        assert!(matches!(
            normalize_question("   ", false),
            Err(AskAgentError::EmptyQuestion)
        ));
        assert_eq!(normalize_question("  hi \n", false).unwrap(), "hi");
    }

    #[test]
    fn document_without_question_defaults_to_translation() {
        assert_eq!(
            normalize_question("", true).unwrap(),
            DEFAULT_DOCUMENT_QUESTION
        );
    }

    #[test]
    fn document_truncates_on_char_boundary() {
        assert_eq!(truncate_document("가나다라", 2), "가나");
        assert_eq!(truncate_document("abc", 10), "abc");
    }
}
