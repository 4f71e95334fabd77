//! OpenAI-compatible chat-completions adapter

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::Analyzer;
use super::json_reply::parse_json_reply;
use super::provider::Provider;
use crate::config::AnalyzerConfig;
use crate::errors::{BackendError, BackendResult};

/// Analyzer that sends the image as a data URL to a chat-completions API
pub struct ChatCompletionsAnalyzer {
    client: reqwest::Client,
    provider: Provider,
    endpoint: String,
    model: String,
    api_key_env: String,
    max_tokens: u32,
    temperature: f32,
    thinking: bool,
    system_prompt: String,
    user_prompt: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatCompletionsAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> BackendResult<Self> {
        let provider: Provider = config.provider.parse()?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(provider.default_base_url())
            .trim_end_matches('/');
        let api_key_env = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| provider.api_key_env().to_string());

        if std::env::var(&api_key_env).is_err() {
            warn!(
                "Environment variable {} is not set; analysis requests will fail",
                api_key_env
            );
        }

        let analyzer = Self {
            client: reqwest::Client::builder().build()?,
            provider,
            endpoint: format!("{base_url}/chat/completions"),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
            api_key_env,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            thinking: config.thinking,
            system_prompt: config.system_prompt.clone(),
            user_prompt: config.user_prompt.clone(),
        };
        info!(
            "Analyzer ready: provider={} model={} endpoint={}",
            analyzer.provider.as_str(),
            analyzer.model,
            analyzer.endpoint
        );
        Ok(analyzer)
    }

    /// Build the JSON request body for one image
    pub fn request_body(&self, image: &[u8], mime_type: &str) -> Value {
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(image));
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert(
            "messages".to_string(),
            json!([
                { "role": "system", "content": self.system_prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": data_url } },
                        { "type": "text", "text": self.user_prompt }
                    ]
                }
            ]),
        );
        body.insert(
            "response_format".to_string(),
            json!({ "type": "json_object" }),
        );
        body.insert("max_tokens".to_string(), json!(self.max_tokens));
        body.insert("temperature".to_string(), json!(self.temperature));
        body.insert("stream".to_string(), json!(false));
        self.provider.apply_thinking(&mut body, self.thinking);
        Value::Object(body)
    }
}

#[async_trait]
impl Analyzer for ChatCompletionsAnalyzer {
    async fn analyze(&self, image: &[u8], mime_type: &str) -> BackendResult<Value> {
        let api_key = std::env::var(&self.api_key_env).map_err(|_| BackendError::MissingApiKey {
            env_var: self.api_key_env.clone(),
        })?;

        debug!(
            "Sending {} bytes ({}) to {}",
            image.len(),
            mime_type,
            self.endpoint
        );
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(image, mime_type))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect();
            return Err(BackendError::Status {
                provider: self.provider.as_str().to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| BackendError::invalid_response("reply carried no content"))?;

        parse_json_reply(&content)
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let config = AnalyzerConfig {
            provider: "deepseek".to_string(),
            model: Some("custom-model".to_string()),
            ..AnalyzerConfig::default()
        };
        let analyzer = ChatCompletionsAnalyzer::new(&config).unwrap();
        let body = analyzer.request_body(b"abc", "image/png");

        assert_eq!(body["model"], "custom-model");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["thinking"]["type"], "disabled");
        assert_eq!(
            body["messages"][1]["content"][0]["image_url"]["url"],
            "data:image/png;base64,YWJj"
        );
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn test_endpoint_from_base_url_override() {
        let config = AnalyzerConfig {
            provider: "openai".to_string(),
            base_url: Some("http://localhost:11434/v1/".to_string()),
            ..AnalyzerConfig::default()
        };
        let analyzer = ChatCompletionsAnalyzer::new(&config).unwrap();
        assert_eq!(analyzer.endpoint, "http://localhost:11434/v1/chat/completions");
        assert_eq!(analyzer.model, "gpt-4o-mini");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = AnalyzerConfig {
            provider: "nope".to_string(),
            ..AnalyzerConfig::default()
        };
        assert!(matches!(
            ChatCompletionsAnalyzer::new(&config),
            Err(BackendError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let config = AnalyzerConfig {
            provider: "openai".to_string(),
            api_key_env: Some("AIMGLYZE_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            ..AnalyzerConfig::default()
        };
        let analyzer = ChatCompletionsAnalyzer::new(&config).unwrap();
        let err = analyzer.analyze(b"abc", "image/png").await.unwrap_err();
        assert!(matches!(err, BackendError::MissingApiKey { .. }));
    }
}
