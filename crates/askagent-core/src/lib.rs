//! AskAgent core built directly on top of `graph_flow`.
//!
//! A question is classified into general, translate, or research mode. The
//! research mode loops search and answer passes over a bounded budget before
//! a single response is returned. The graph tasks live in [`tasks`] and are
//! wired once per [`Agent`].

mod capability;
mod classifier;
mod config;
mod controller;
mod detector;
mod error;
mod formatter;
mod lexicon;
mod logging;
pub mod metrics;
pub mod model;
mod prompt;
pub mod search;
mod security;
mod state;
pub mod tasks;
mod telemetry;
mod trace;
mod workflow;

pub use capability::{
    Capability, CapabilityOutput, CapabilityRegistry, WEB_SEARCH, WebSearchCapability,
};
pub use classifier::{Mode, ModeClassifier};
pub use config::{
    CapabilityConfig, Config, ConfigLoader, DocumentConfig, LlmConfig, LoggingConfig,
    ResearchConfig, SearchConfig, SearchProviderKind,
};
pub use controller::{ControllerSettings, ResearchController, StopCondition};
pub use detector::SearchUsageDetector;
pub use error::{AskAgentError, ModelInvocationError, SearchError};
pub use formatter::{ContextFormatter, DEFAULT_SNIPPET_CHARS};
pub use lexicon::{Lexicon, PhraseSet};
pub use logging::{RequestLogInput, log_request_completion};
pub use model::{
    CapabilityCall, CapabilitySpec, ChatMessage, DynModelBackend, ModelBackend, ModelInvoker,
    ModelReply, ModelRequest, ModelResponse, Role,
};
pub use prompt::{DEFAULT_DOCUMENT_QUESTION, compose_user_content, system_instruction};
pub use search::{DynSearchBackend, SearchBackend, SearchProvider, SearchResult};
pub use security::{SecretValue, optional_env, require_env};
pub use state::{AgentResponse, AgentState, Phase};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceStep, TraceSummary, persist_trace};
pub use workflow::{Agent, AgentBuilder, AgentOutcome};
