//! Vision backend capability
//!
//! The cache layer only sees the [`Analyzer`] trait. Concrete adapters are
//! selected from configuration at startup.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::AnalyzerConfig;
use crate::errors::BackendResult;

pub mod chat_completions;
pub mod json_reply;
pub mod provider;

pub use chat_completions::ChatCompletionsAnalyzer;
pub use provider::Provider;

/// Turns image bytes into a structured description
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one image. The result is an opaque JSON object.
    async fn analyze(&self, image: &[u8], mime_type: &str) -> BackendResult<Value>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Build the analyzer configured in `[analyzer]`
pub fn build_analyzer(config: &AnalyzerConfig) -> BackendResult<Arc<dyn Analyzer>> {
    Ok(Arc::new(ChatCompletionsAnalyzer::new(config)?))
}
