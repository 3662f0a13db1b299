//! LLM 모듈 - Gemini generateContent 기반 답변 생성
//!
//! 시스템 프롬프트와 대화 히스토리를 받아 완성 텍스트를 반환합니다.
//! 에러는 일시적(재시도 가능)/영구적(즉시 실패)으로 구분해
//! 호출자가 분기 없이 처리할 수 있게 합니다.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::{ConversationTurn, Role};
use crate::embedding::get_api_key;

// ============================================================================
// Error Taxonomy
// ============================================================================

/// 완성 호출 에러
///
/// Transient는 타임아웃/쿼터/네트워크처럼 재시도 여지가 있는 실패,
/// Permanent는 잘못된 입력처럼 재시도해도 소용없는 실패입니다.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transient completion failure: {0}")]
    Transient(String),

    #[error("permanent completion failure: {0}")]
    Permanent(String),
}

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 완성 프로바이더 트레이트
///
/// Synthesizer가 이 트레이트에만 의존합니다.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 시스템 프롬프트 + 대화 히스토리로 완성 생성
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<String, LlmError>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Chat
// ============================================================================

/// Gemini generateContent 엔드포인트
/// source: https://ai.google.dev/gemini-api/docs/text-generation
const GEMINI_CHAT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// 일시 에러 최대 재시도 횟수
const MAX_RETRIES: u32 = 2;
/// 재시도 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 1500;
/// 답변 최대 토큰
const MAX_OUTPUT_TOKENS: u32 = 1000;
/// 낮은 온도 - 데이터셋 추천은 사실 기반이어야 함
const TEMPERATURE: f32 = 0.1;

/// Google Gemini 챗 구현체
#[derive(Debug)]
pub struct GeminiChat {
    api_key: String,
    client: reqwest::Client,
}

impl GeminiChat {
    /// 새 인스턴스 생성
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::Permanent(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { api_key, client })
    }

    /// 환경변수에서 API 키를 읽어 생성 (임베딩과 같은 키 사용)
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key).context("Failed to create Gemini chat client")
    }

    /// 대화 히스토리를 Gemini contents로 변환
    ///
    /// user -> "user", assistant -> "model"
    fn build_contents(history: &[ConversationTurn]) -> Vec<ChatContent> {
        history
            .iter()
            .map(|turn| ChatContent {
                role: match turn.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "model".to_string(),
                },
                parts: vec![ChatPart {
                    text: turn.content.clone(),
                }],
            })
            .collect()
    }

    /// 1회 호출 수행
    async fn call_once(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(GEMINI_CHAT_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    LlmError::Transient(format!("Request failed: {}", e))
                } else {
                    LlmError::Permanent(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Transient(format!("Failed to read response body: {}", e)))?;

        if status.is_success() {
            let parsed: ChatResponse = serde_json::from_str(&body)
                .map_err(|e| LlmError::Permanent(format!("Failed to parse response: {}", e)))?;

            return parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text)
                .ok_or_else(|| LlmError::Permanent("Empty completion candidates".to_string()));
        }

        // 429/5xx는 일시, 그 외 4xx는 영구
        if status.as_u16() == 429 || status.is_server_error() {
            Err(LlmError::Transient(format!(
                "Gemini API error ({}): {}",
                status, body
            )))
        } else {
            Err(LlmError::Permanent(format!(
                "Gemini API error ({}): {}",
                status, body
            )))
        }
    }
}

#[async_trait]
impl CompletionProvider for GeminiChat {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<String, LlmError> {
        if history.is_empty() {
            return Err(LlmError::Permanent("Empty conversation history".to_string()));
        }

        let request = ChatRequest {
            system_instruction: ChatSystemInstruction {
                parts: vec![ChatPart {
                    text: system_prompt.to_string(),
                }],
            },
            contents: Self::build_contents(history),
            generation_config: ChatGenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let mut last_error = LlmError::Transient("No attempt made".to_string());

        for attempt in 0..=MAX_RETRIES {
            match self.call_once(&request).await {
                Ok(text) => return Ok(text),
                Err(LlmError::Transient(msg)) => {
                    last_error = LlmError::Transient(msg);
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Transient completion failure, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(permanent) => return Err(permanent),
            }
        }

        Err(last_error)
    }

    fn name(&self) -> &str {
        "gemini-2.0-flash"
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: ChatSystemInstruction,
    contents: Vec<ChatContent>,
    #[serde(rename = "generationConfig")]
    generation_config: ChatGenerationConfig,
}

#[derive(Debug, Serialize)]
struct ChatSystemInstruction {
    parts: Vec<ChatPart>,
}

#[derive(Debug, Serialize)]
struct ChatContent {
    role: String,
    parts: Vec<ChatPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    candidates: Vec<ChatCandidate>,
}

#[derive(Debug, Deserialize)]
struct ChatCandidate {
    content: ChatCandidateContent,
}

#[derive(Debug, Deserialize)]
struct ChatCandidateContent {
    #[serde(default)]
    parts: Vec<ChatPart>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_contents_role_mapping() {
        let history = vec![
            ConversationTurn::user("해양 데이터 추천해줘"),
            ConversationTurn::assistant("해양환경정보를 추천드립니다."),
        ];

        let contents = GeminiChat::build_contents(&history);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn test_error_display() {
        let transient = LlmError::Transient("timeout".to_string());
        assert!(transient.to_string().contains("transient"));

        let permanent = LlmError::Permanent("bad input".to_string());
        assert!(permanent.to_string().contains("permanent"));
    }

    #[tokio::test]
    async fn test_empty_history_is_permanent_error() {
        let chat = GeminiChat::new("fake_key".to_string()).unwrap();
        let result = chat.complete("system", &[]).await;
        assert!(matches!(result, Err(LlmError::Permanent(_))));
    }
}
