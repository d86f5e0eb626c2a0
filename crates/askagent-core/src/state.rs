//! Per-request agent state and the external response shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::Mode;
use crate::model::ChatMessage;
use crate::search::SearchResult;

/// Controller phase the state was left in by the last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    NotStarted,
    Searching,
    Answering,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotStarted => "not_started",
            Phase::Searching => "searching",
            Phase::Answering => "answering",
            Phase::Done => "done",
        }
    }
}

/// Record threaded through the control loop.
///
/// Fields are private; every transition consumes the state and returns the
/// next value, so a step can never mutate a state another step still holds.
/// Search results are append-only and the iteration count never exceeds the
/// budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    question: String,
    document: Option<String>,
    mode: Mode,
    system_instruction: String,
    messages: Vec<ChatMessage>,
    answer: String,
    used_search: bool,
    raw_model: Value,
    search_results: Vec<SearchResult>,
    iteration: u32,
    iteration_budget: u32,
    answer_passes: u32,
    failed: bool,
    phase: Phase,
}

impl AgentState {
    pub fn new(
        question: impl Into<String>,
        mode: Mode,
        system_instruction: impl Into<String>,
        iteration_budget: u32,
    ) -> Self {
        Self {
            question: question.into(),
            document: None,
            mode,
            system_instruction: system_instruction.into(),
            messages: Vec::new(),
            answer: String::new(),
            used_search: false,
            raw_model: Value::Null,
            search_results: Vec::new(),
            iteration: 0,
            iteration_budget,
            answer_passes: 0,
            failed: false,
            phase: Phase::NotStarted,
        }
    }

    pub fn with_document(mut self, document: Option<String>) -> Self {
        self.document = document.filter(|text| !text.trim().is_empty());
        self
    }

    /// One research search attempt, successful or not.
    pub fn after_search(mut self, results: Vec<SearchResult>) -> Self {
        self.iteration = (self.iteration + 1).min(self.iteration_budget);
        self.record_results(results);
        self.phase = Phase::Searching;
        self
    }

    /// Results fetched on the model's behalf through a capability call.
    pub fn with_capability_results(mut self, results: Vec<SearchResult>) -> Self {
        self.record_results(results);
        self
    }

    pub fn after_answer(mut self, messages: Vec<ChatMessage>, answer: String, raw: Value) -> Self {
        self.messages = messages;
        self.answer = answer;
        self.raw_model = raw;
        self.answer_passes += 1;
        self.phase = Phase::Answering;
        self
    }

    /// Terminal model failure: the answer becomes a user-visible message.
    pub fn after_failure(mut self, messages: Vec<ChatMessage>, message: String) -> Self {
        self.messages = messages;
        self.answer = message;
        self.answer_passes += 1;
        self.failed = true;
        self.phase = Phase::Answering;
        self
    }

    pub fn finish(mut self) -> Self {
        self.phase = Phase::Done;
        self
    }

    fn record_results(&mut self, results: Vec<SearchResult>) {
        if !results.is_empty() {
            self.used_search = true;
        }
        self.search_results.extend(results);
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn used_search(&self) -> bool {
        self.used_search
    }

    pub fn raw_model(&self) -> &Value {
        &self.raw_model
    }

    pub fn search_results(&self) -> &[SearchResult] {
        &self.search_results
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn iteration_budget(&self) -> u32 {
        self.iteration_budget
    }

    pub fn answer_passes(&self) -> u32 {
        self.answer_passes
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// Result handed back to external callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub answer: String,
    pub used_search: bool,
    /// Raw model payload for debugging; usually stripped in production.
    pub raw_model: Option<Value>,
    /// Present only when the research path accumulated at least one result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SearchResult>>,
}

impl AgentResponse {
    /// Structurally valid response for a failure that escaped the controller.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            answer: message.into(),
            used_search: false,
            raw_model: None,
            sources: None,
        }
    }

    pub fn without_raw_model(mut self) -> Self {
        self.raw_model = None;
        self
    }
}
