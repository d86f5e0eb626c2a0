//! Research iteration controller.
//!
//! [`ResearchController::next_phase`] is the whole transition table; it is
//! pure and reads nothing but the state. The step methods perform the two
//! external calls and return the successor state. Graph tasks in
//! [`crate::tasks`] only sequence these calls.

use serde_json::Value;
use tracing::{error, info, instrument};

use crate::capability::CapabilityRegistry;
use crate::classifier::Mode;
use crate::error::ModelInvocationError;
use crate::formatter::ContextFormatter;
use crate::lexicon::PhraseSet;
use crate::model::{ChatMessage, ModelInvoker, ModelReply, ModelRequest, ModelResponse};
use crate::prompt::{compose_user_content, system_instruction};
use crate::search::SearchProvider;
use crate::state::{AgentState, Phase};

/// Heuristic for "the model judged it had enough": a long answer or a
/// finished report structure.
#[derive(Debug, Clone)]
pub struct StopCondition {
    length_threshold: usize,
    report_markers: PhraseSet,
}

impl StopCondition {
    pub fn new(length_threshold: usize, report_markers: PhraseSet) -> Self {
        Self {
            length_threshold,
            report_markers,
        }
    }

    pub fn is_satisfied(&self, answer: &str) -> bool {
        answer.chars().count() > self.length_threshold || self.report_markers.matches(answer)
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub iteration_budget: u32,
    pub max_results: usize,
    pub followup_suffix: String,
    pub capability_rounds: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            iteration_budget: 2,
            max_results: 5,
            followup_suffix: "상세 정보".to_string(),
            capability_rounds: 0,
        }
    }
}

pub(crate) fn model_failure_message(err: &ModelInvocationError) -> String {
    format!("모델 호출 중 오류가 발생했습니다: {err}")
}

pub struct ResearchController {
    settings: ControllerSettings,
    stop: StopCondition,
    search: SearchProvider,
    formatter: ContextFormatter,
    invoker: ModelInvoker,
    capabilities: CapabilityRegistry,
}

impl ResearchController {
    pub fn new(
        settings: ControllerSettings,
        stop: StopCondition,
        search: SearchProvider,
        formatter: ContextFormatter,
        invoker: ModelInvoker,
    ) -> Self {
        Self {
            settings,
            stop,
            search,
            formatter,
            invoker,
            capabilities: CapabilityRegistry::new(),
        }
    }

    /// Capabilities are offered to the model only when `capability_rounds > 0`.
    pub fn with_capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn initial_state(&self, question: &str, document: Option<String>, mode: Mode) -> AgentState {
        AgentState::new(
            question,
            mode,
            system_instruction(mode),
            self.settings.iteration_budget,
        )
        .with_document(document)
    }

    pub fn next_phase(&self, state: &AgentState) -> Phase {
        let research = state.mode() == Mode::Research;
        let budget_left = state.iteration() < state.iteration_budget();

        match state.phase() {
            Phase::NotStarted if research && budget_left => Phase::Searching,
            Phase::NotStarted => Phase::Answering,
            Phase::Searching => Phase::Answering,
            Phase::Answering if state.failed() => Phase::Done,
            Phase::Answering if research && budget_left && !self.stop.is_satisfied(state.answer()) => {
                Phase::Searching
            }
            Phase::Answering | Phase::Done => Phase::Done,
        }
    }

    /// Iteration 0 searches the raw question; later iterations append the
    /// fixed follow-up qualifier.
    pub fn query_for(&self, state: &AgentState) -> String {
        if state.iteration() == 0 || self.settings.followup_suffix.is_empty() {
            state.question().to_string()
        } else {
            format!("{} {}", state.question(), self.settings.followup_suffix)
        }
    }

    #[instrument(name = "controller.search", skip(self, state), fields(iteration = state.iteration()))]
    pub async fn search_step(&self, state: AgentState) -> AgentState {
        let query = self.query_for(&state);
        let results = self.search.search(&query, self.settings.max_results).await;
        info!(
            %query,
            results = results.len(),
            accumulated = state.search_results().len() + results.len(),
            "research search attempted"
        );
        state.after_search(results)
    }

    #[instrument(name = "controller.answer", skip(self, state), fields(mode = %state.mode()))]
    pub async fn answer_step(&self, state: AgentState) -> AgentState {
        let context = self.formatter.format(state.search_results());
        let content = compose_user_content(state.question(), state.document(), &context);

        if self.offers_capabilities(&state) {
            return self.answer_with_capabilities(state, content).await;
        }

        let mut messages = vec![ChatMessage::user(content.clone())];
        match self
            .invoker
            .invoke(state.system_instruction(), &content)
            .await
        {
            Ok((answer, raw)) => {
                messages.push(ChatMessage::assistant(answer.clone()));
                state.after_answer(messages, answer, raw)
            }
            Err(err) => {
                error!(error = %err, "model invocation failed; ending request");
                state.after_failure(messages, model_failure_message(&err))
            }
        }
    }

    fn offers_capabilities(&self, state: &AgentState) -> bool {
        state.mode() == Mode::General
            && self.settings.capability_rounds > 0
            && !self.capabilities.is_empty()
    }

    async fn answer_with_capabilities(&self, mut state: AgentState, content: String) -> AgentState {
        let mut messages = vec![ChatMessage::user(content)];
        let rounds = self.settings.capability_rounds;

        for round in 0..=rounds {
            let mut request = ModelRequest::new(state.system_instruction(), messages.clone());
            // The last round withholds capabilities so the model has to answer.
            if round < rounds {
                request = request.with_capabilities(self.capabilities.specs());
            }

            match self.invoker.converse(&request).await {
                Ok(ModelResponse {
                    reply: ModelReply::FinalAnswer(answer),
                    raw,
                }) => {
                    messages.push(ChatMessage::assistant(answer.clone()));
                    return state.after_answer(messages, answer, raw);
                }
                Ok(ModelResponse {
                    reply: ModelReply::CapabilityRequest(call),
                    raw,
                }) => {
                    if round == rounds {
                        return state.after_answer(messages, String::new(), raw);
                    }
                    let output = self.capabilities.dispatch(&call).await;
                    info!(
                        capability = %call.name,
                        round,
                        results = output.search_results.len(),
                        "capability result fed back to model"
                    );
                    let call_id = call.id.clone();
                    messages.push(ChatMessage::capability_request(call));
                    messages.push(ChatMessage::capability_result(call_id, output.content));
                    state = state.with_capability_results(output.search_results);
                }
                Err(err) => {
                    error!(error = %err, round, "model invocation failed; ending request");
                    return state.after_failure(messages, model_failure_message(&err));
                }
            }
        }

        state.after_answer(messages, String::new(), Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Lexicon;
    use crate::model::{ModelBackend, ModelRequest};
    use crate::search::SearchResult;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl ModelBackend for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn complete(
            &self,
            request: &ModelRequest,
        ) -> Result<ModelResponse, ModelInvocationError> {
            Ok(ModelResponse {
                reply: ModelReply::FinalAnswer(request.messages[0].content.clone()),
                raw: Value::Null,
            })
        }
    }

    fn controller() -> ResearchController {
        ResearchController::new(
            ControllerSettings::default(),
            StopCondition::new(1500, Lexicon::default().report_markers),
            SearchProvider::disabled(),
            ContextFormatter::default(),
            ModelInvoker::new(Arc::new(Echo)),
        )
    }

    fn answered(state: AgentState, answer: &str) -> AgentState {
        state.after_answer(Vec::new(), answer.to_string(), Value::Null)
    }

    #[test]
    fn stop_condition_on_length_or_markers() {
        let stop = StopCondition::new(10, Lexicon::default().report_markers);
        assert!(stop.is_satisfied("x".repeat(11).as_str()));
        assert!(!stop.is_satisfied("x".repeat(10).as_str()));
        assert!(stop.is_satisfied("intro\n## Summary\nshort"));
        assert!(stop.is_satisfied("## 요약\n짧음"));
    }

    #[test]
    fn non_research_modes_answer_once() {
        let controller = controller();
        for mode in [Mode::General, Mode::Translate] {
            let state = controller.initial_state("q", None, mode);
            assert_eq!(controller.next_phase(&state), Phase::Answering);
            let state = answered(state, "short");
            assert_eq!(controller.next_phase(&state), Phase::Done);
        }
    }

    #[test]
    fn research_loops_until_budget() {
        let controller = controller();
        let state = controller.initial_state("q", None, Mode::Research);
        assert_eq!(controller.next_phase(&state), Phase::Searching);

        let state = state.after_search(vec![]);
        assert_eq!(controller.next_phase(&state), Phase::Answering);

        let state = answered(state, "short");
        assert_eq!(controller.next_phase(&state), Phase::Searching);

        let state = answered(state.after_search(vec![]), "still short");
        assert_eq!(state.iteration(), 2);
        assert_eq!(controller.next_phase(&state), Phase::Done);
    }

    #[test]
    fn research_stops_on_long_answer() {
        let controller = controller();
        let state = controller
            .initial_state("q", None, Mode::Research)
            .after_search(vec![]);
        let state = answered(state, &"가".repeat(1501));
        assert_eq!(controller.next_phase(&state), Phase::Done);
    }

    #[test]
    fn research_stops_on_report_markers() {
        let controller = controller();
        let state = controller
            .initial_state("q", None, Mode::Research)
            .after_search(vec![]);
        let state = answered(state, "## 요약\n...\n## 출처\n[1]");
        assert_eq!(controller.next_phase(&state), Phase::Done);
    }

    #[test]
    fn model_failure_is_terminal() {
        let controller = controller();
        let state = controller
            .initial_state("q", None, Mode::Research)
            .after_search(vec![])
            .after_failure(Vec::new(), "err".into());
        assert_eq!(controller.next_phase(&state), Phase::Done);
    }

    #[test]
    fn zero_budget_research_answers_without_searching() {
        let controller = ResearchController::new(
            ControllerSettings {
                iteration_budget: 0,
                ..ControllerSettings::default()
            },
            StopCondition::new(1500, PhraseSet::default()),
            SearchProvider::disabled(),
            ContextFormatter::default(),
            ModelInvoker::new(Arc::new(Echo)),
        );
        let state = controller.initial_state("q", None, Mode::Research);
        assert_eq!(controller.next_phase(&state), Phase::Answering);
    }

    #[test]
    fn followup_query_appends_suffix() {
        let controller = controller();
        let state = controller.initial_state("전기차 시장", None, Mode::Research);
        assert_eq!(controller.query_for(&state), "전기차 시장");
        let state = state.after_search(vec![]);
        assert_eq!(controller.query_for(&state), "전기차 시장 상세 정보");
    }

    #[tokio::test]
    async fn answer_without_context_sends_bare_question() {
        let controller = controller();
        let state = controller.initial_state("plain question", None, Mode::General);
        let state = controller.answer_step(state).await;
        assert_eq!(state.answer(), "plain question");
        assert_eq!(state.messages().len(), 2);
    }

    #[tokio::test]
    async fn answer_includes_accumulated_context() {
        let controller = controller();
        let state = controller
            .initial_state("q", None, Mode::Research)
            .after_search(vec![SearchResult::new("Title", "https://t", "body")]);
        let state = controller.answer_step(state).await;
        assert!(state.answer().contains("[1] Title"));
        assert!(state.answer().ends_with("q"));
    }
}
