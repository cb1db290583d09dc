//! LLM 클라이언트 - OpenAI Chat Completions
//!
//! source: https://platform.openai.com/docs/api-reference/chat

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 초기 백오프 (밀리초)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 채팅 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 프롬프트에 대한 응답 생성
    async fn generate(&self, prompt: &str, system_message: Option<&str>) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// OpenAI 채팅 클라이언트
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChat {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("OpenAI API key is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// 환경변수(OPENAI_API_KEY)에서 키를 읽어 생성
    pub fn from_env(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "OpenAI API key not found.\n\
                     Set the OPENAI_API_KEY environment variable"
                )
            })?;
        Self::new(api_key, config)
    }

    fn build_request<'a>(&'a self, prompt: &'a str, system_message: Option<&'a str>) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_message {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn generate(&self, prompt: &str, system_message: Option<&str>) -> Result<String> {
        let request = self.build_request(prompt, system_message);
        let request_id = uuid::Uuid::new_v4();
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=MAX_RETRIES {
            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
            tracing::debug!("Chat request {} (attempt {})", request_id, attempt + 1);

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send chat request: {}", e));
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Chat request {} failed, retrying in {:?} ({}/{})",
                            request_id,
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: ChatResponse =
                    serde_json::from_str(&body).context("Failed to parse chat response")?;
                return first_choice_text(parsed);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!(
                    "OpenAI returned {}, backing off {:?} ({}/{})",
                    status,
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("OpenAI API error ({})", status));
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                if let Ok(error) = serde_json::from_str::<OpenAiError>(&body) {
                    anyhow::bail!("OpenAI API error ({}): {}", status, error.error.message);
                }
                anyhow::bail!("OpenAI API error ({}): {}", status, body);
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Chat request failed after {} retries", MAX_RETRIES)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow::anyhow!("OpenAI response contained no choices"))
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiChat {
        let config = LlmConfig {
            base_url: "https://llm.example.com/v1/".to_string(),
            ..Default::default()
        };
        OpenAiChat::new("sk-test".to_string(), &config).unwrap()
    }

    #[test]
    fn test_endpoint_and_request_shape() {
        let chat = client();
        assert_eq!(chat.endpoint, "https://llm.example.com/v1/chat/completions");
        assert_eq!(chat.model_name(), "gpt-4-turbo");

        let request = chat.build_request("What is Mach 1?", Some("You are an expert."));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "What is Mach 1?");
        assert_eq!(json["max_tokens"], 1000);

        let bare = serde_json::to_value(chat.build_request("hi", None)).unwrap();
        assert_eq!(bare["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Lift equals weight."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(first_choice_text(parsed).unwrap(), "Lift equals weight.");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice_text(empty).is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(OpenAiChat::new(String::new(), &LlmConfig::default()).is_err());
    }
}
