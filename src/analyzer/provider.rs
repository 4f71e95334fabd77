//! Provider presets for OpenAI-compatible chat-completions endpoints

use serde_json::{Map, Value, json};
use std::str::FromStr;

use crate::errors::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Zhipu,
    Gemini,
    Deepseek,
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Zhipu => "zhipu",
            Provider::Gemini => "gemini",
            Provider::Deepseek => "deepseek",
            Provider::OpenAi => "openai",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::Deepseek => "https://api.deepseek.com",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Zhipu => "glm-4.6v-flash",
            Provider::Gemini => "gemini-2.5-flash",
            Provider::Deepseek => "deepseek-chat",
            Provider::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Zhipu => "ZAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Deepseek => "DEEPSEEK_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Add the provider's reasoning switch to a request body
    pub fn apply_thinking(&self, body: &mut Map<String, Value>, thinking: bool) {
        match self {
            Provider::Zhipu | Provider::Deepseek => {
                let mode = if thinking { "enabled" } else { "disabled" };
                body.insert("thinking".to_string(), json!({ "type": mode }));
            }
            Provider::Gemini => {
                if thinking {
                    body.insert(
                        "extra_body".to_string(),
                        json!({
                            "google": {
                                "thinking_config": {
                                    "thinking_budget": "low",
                                    "include_thoughts": true
                                }
                            }
                        }),
                    );
                } else {
                    body.insert("reasoning_effort".to_string(), json!("none"));
                }
            }
            Provider::OpenAi => {}
        }
    }
}

impl FromStr for Provider {
    type Err = BackendError;

    /// Accepts preset names case-insensitively, with or without an
    /// `Analyzer` suffix; `default` selects zhipu.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let name = name.strip_suffix("analyzer").unwrap_or(&name);
        match name {
            "zhipu" | "default" => Ok(Provider::Zhipu),
            "gemini" => Ok(Provider::Gemini),
            "deepseek" => Ok(Provider::Deepseek),
            "openai" => Ok(Provider::OpenAi),
            _ => Err(BackendError::UnknownProvider(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        assert_eq!("zhipu".parse::<Provider>().unwrap(), Provider::Zhipu);
        assert_eq!("default".parse::<Provider>().unwrap(), Provider::Zhipu);
        assert_eq!("GeminiAnalyzer".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("DeepSeek".parse::<Provider>().unwrap(), Provider::Deepseek);
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_thinking_fields() {
        let mut body = Map::new();
        Provider::Zhipu.apply_thinking(&mut body, false);
        assert_eq!(body["thinking"], json!({"type": "disabled"}));

        let mut body = Map::new();
        Provider::Gemini.apply_thinking(&mut body, false);
        assert_eq!(body["reasoning_effort"], json!("none"));

        let mut body = Map::new();
        Provider::OpenAi.apply_thinking(&mut body, true);
        assert!(body.is_empty());
    }
}
