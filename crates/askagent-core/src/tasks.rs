use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument};

use crate::classifier::ModeClassifier;
use crate::controller::ResearchController;
use crate::detector::SearchUsageDetector;
use crate::state::{AgentResponse, AgentState, Phase};
use crate::trace::{TraceCollector, TraceEvent};

pub(crate) const QUESTION_KEY: &str = "request.question";
pub(crate) const DOCUMENT_KEY: &str = "request.document";
pub(crate) const STATE_KEY: &str = "agent.state";
pub(crate) const NEXT_PHASE_KEY: &str = "flow.next";
pub(crate) const RESPONSE_KEY: &str = "agent.response";
pub(crate) const TRACE_KEY: &str = "trace.events";

async fn load_state(context: &Context) -> graph_flow::Result<AgentState> {
    context.get::<AgentState>(STATE_KEY).await.ok_or_else(|| {
        GraphError::TaskExecutionFailed("agent state missing from session context".to_string())
    })
}

/// Persist the successor state together with the controller's routing decision.
async fn store_state(context: &Context, state: &AgentState, next: Phase) {
    context.set(STATE_KEY, state).await;
    context.set(NEXT_PHASE_KEY, next).await;
}

async fn record_trace(context: &Context, task_id: &str, message: String) {
    let events: Vec<TraceEvent> = context.get(TRACE_KEY).await.unwrap_or_default();
    let mut trace = TraceCollector::from_events(events);
    trace.record(task_id, message);
    context.set(TRACE_KEY, trace.events()).await;
}

/// Edge predicate: did the last task route into `phase`?
pub(crate) fn routes_to(context: &Context, phase: Phase) -> bool {
    context.get_sync::<Phase>(NEXT_PHASE_KEY) == Some(phase)
}

/// Classifies the question and seeds the agent state (`NotStarted`).
pub struct ClassifyTask {
    classifier: ModeClassifier,
    controller: Arc<ResearchController>,
}

impl ClassifyTask {
    pub fn new(classifier: ModeClassifier, controller: Arc<ResearchController>) -> Self {
        Self {
            classifier,
            controller,
        }
    }
}

#[async_trait]
impl Task for ClassifyTask {
    fn id(&self) -> &str {
        "classify"
    }

    #[instrument(name = "task.classify", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let question: String = context.get(QUESTION_KEY).await.unwrap_or_default();
        let document: Option<String> = context.get(DOCUMENT_KEY).await.unwrap_or_default();

        let mode = self.classifier.classify(&question);
        let state = self.controller.initial_state(&question, document, mode);
        let next = self.controller.next_phase(&state);

        info!(%mode, next = next.as_str(), "question classified");

        store_state(&context, &state, next).await;
        record_trace(&context, self.id(), format!("mode {mode}")).await;

        Ok(TaskResult::new(
            Some(format!("Classified as {mode}")),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// One research search attempt (`Searching`).
pub struct SearchTask {
    controller: Arc<ResearchController>,
}

impl SearchTask {
    pub fn new(controller: Arc<ResearchController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Task for SearchTask {
    fn id(&self) -> &str {
        "search"
    }

    #[instrument(name = "task.search", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let state = load_state(&context).await?;
        let before = state.search_results().len();

        let state = self.controller.search_step(state).await;
        let next = self.controller.next_phase(&state);
        let fetched = state.search_results().len() - before;

        store_state(&context, &state, next).await;
        record_trace(
            &context,
            self.id(),
            format!("iteration {}: {fetched} results", state.iteration()),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Search iteration {} complete", state.iteration())),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// One model call (`Answering`).
pub struct AnswerTask {
    controller: Arc<ResearchController>,
}

impl AnswerTask {
    pub fn new(controller: Arc<ResearchController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Task for AnswerTask {
    fn id(&self) -> &str {
        "answer"
    }

    #[instrument(name = "task.answer", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let state = load_state(&context).await?;

        let state = self.controller.answer_step(state).await;
        let next = self.controller.next_phase(&state);

        debug!(
            answer_chars = state.answer().chars().count(),
            failed = state.failed(),
            next = next.as_str(),
            "answer pass complete"
        );

        store_state(&context, &state, next).await;
        record_trace(
            &context,
            self.id(),
            format!(
                "pass {}: {} chars{}",
                state.answer_passes(),
                state.answer().chars().count(),
                if state.failed() { " (model failure)" } else { "" }
            ),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Answer pass {} complete", state.answer_passes())),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Runs the search-usage detector and assembles the response (`Done`).
pub struct FinalizeTask {
    detector: SearchUsageDetector,
}

impl FinalizeTask {
    pub fn new(detector: SearchUsageDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl Task for FinalizeTask {
    fn id(&self) -> &str {
        "finalize"
    }

    #[instrument(name = "task.finalize", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let state = load_state(&context).await?.finish();

        let used_search = self.detector.detect(state.answer(), state.used_search());
        let sources = (!state.search_results().is_empty()).then(|| state.search_results().to_vec());
        let raw_model = (!state.raw_model().is_null()).then(|| state.raw_model().clone());

        let response = AgentResponse {
            answer: state.answer().to_string(),
            used_search,
            raw_model,
            sources,
        };

        info!(
            mode = %state.mode(),
            used_search,
            iterations = state.iteration(),
            sources = state.search_results().len(),
            "agent run finalized"
        );

        store_state(&context, &state, Phase::Done).await;
        context.set(RESPONSE_KEY, &response).await;
        record_trace(
            &context,
            self.id(),
            format!("used_search={used_search}"),
        )
        .await;

        Ok(TaskResult::new(Some(response.answer), NextAction::End))
    }
}
