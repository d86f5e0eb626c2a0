//! Capabilities the model may request mid-answer via function calling.
//!
//! The registry is an open set keyed by name; the controller only ever talks
//! to [`CapabilityRegistry::dispatch`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::formatter::ContextFormatter;
use crate::model::{CapabilityCall, CapabilitySpec};
use crate::search::{SearchProvider, SearchResult};

/// What a capability hands back: text for the conversation plus any search
/// results that should join the request's sources.
#[derive(Debug, Clone, Default)]
pub struct CapabilityOutput {
    pub content: String,
    pub search_results: Vec<SearchResult>,
}

impl CapabilityOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            search_results: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn spec(&self) -> CapabilitySpec;

    /// Must not fail; problems are reported back to the model as text.
    async fn invoke(&self, arguments: &Value) -> CapabilityOutput;
}

#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.entries.insert(capability.spec().name, capability);
    }

    pub fn with(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn specs(&self) -> Vec<CapabilitySpec> {
        self.entries.values().map(|entry| entry.spec()).collect()
    }

    pub async fn dispatch(&self, call: &CapabilityCall) -> CapabilityOutput {
        let Some(capability) = self.entries.get(&call.name) else {
            warn!(capability = %call.name, "model requested unknown capability");
            return CapabilityOutput::text(format!("unknown capability: {}", call.name));
        };

        let arguments = match serde_json::from_str::<Value>(&call.arguments) {
            Ok(value) => value,
            Err(err) => {
                warn!(capability = %call.name, error = %err, "capability arguments are not JSON");
                return CapabilityOutput::text(format!("invalid arguments: {err}"));
            }
        };

        info!(capability = %call.name, "dispatching capability request");
        capability.invoke(&arguments).await
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

pub const WEB_SEARCH: &str = "web_search";

/// `web_search` backed by the fail-soft search adapter.
pub struct WebSearchCapability {
    provider: SearchProvider,
    formatter: ContextFormatter,
    max_results: usize,
}

impl WebSearchCapability {
    pub fn new(provider: SearchProvider, formatter: ContextFormatter, max_results: usize) -> Self {
        Self {
            provider,
            formatter,
            max_results,
        }
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
    max_results: Option<usize>,
}

#[async_trait]
impl Capability for WebSearchCapability {
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: WEB_SEARCH.to_string(),
            description: "Search the web for up-to-date information.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "max_results": {"type": "integer", "minimum": 1}
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, arguments: &Value) -> CapabilityOutput {
        let args: WebSearchArgs = match serde_json::from_value(arguments.clone()) {
            Ok(args) => args,
            Err(err) => return CapabilityOutput::text(format!("invalid arguments: {err}")),
        };

        let results = self
            .provider
            .search(&args.query, args.max_results.unwrap_or(self.max_results))
            .await;
        let content = if results.is_empty() {
            "검색 결과가 없습니다.".to_string()
        } else {
            self.formatter.format(&results)
        };

        CapabilityOutput {
            content,
            search_results: results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: &str) -> CapabilityCall {
        CapabilityCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new().with(Arc::new(WebSearchCapability::new(
            SearchProvider::disabled(),
            ContextFormatter::default(),
            5,
        )))
    }

    #[test]
    fn registry_advertises_web_search() {
        let specs = registry().specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, WEB_SEARCH);
    }

    #[tokio::test]
    async fn unknown_capability_is_reported_as_text() {
        let output = registry().dispatch(&call("calculator", "{}")).await;
        assert!(output.content.contains("unknown capability"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported_as_text() {
        let output = registry().dispatch(&call(WEB_SEARCH, "not json")).await;
        assert!(output.content.starts_with("invalid arguments"));

        let output = registry().dispatch(&call(WEB_SEARCH, r#"{"q": 1}"#)).await;
        assert!(output.content.starts_with("invalid arguments"));
    }

    #[tokio::test]
    async fn search_without_backend_reports_no_results() {
        let output = registry()
            .dispatch(&call(WEB_SEARCH, r#"{"query":"rust"}"#))
            .await;
        assert!(output.search_results.is_empty());
        assert_eq!(output.content, "검색 결과가 없습니다.");
    }
}
