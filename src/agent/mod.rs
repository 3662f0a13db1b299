//! Agent 모듈 - 라우팅/검색/답변 생성 파이프라인
//!
//! 사용자 발화를 받아 (1) 검색이 필요한지 판단하고, (2) 필요하면
//! 카탈로그를 검색하고, (3) 최종 답변을 생성하는 오케스트레이션
//! 그래프입니다. 요청 하나 = 상태 머신 1회 선형 순회입니다.

mod router;
mod retriever;
mod synthesizer;
mod orchestrator;

use serde::{Deserialize, Serialize};

// Re-exports
pub use router::{IntentRouter, RouteDecision, RouterKeywords};
pub use retriever::{DatasetRetriever, RetrievalOutcome};
pub use synthesizer::{AnswerSynthesizer, AssistantTurn, Provenance};
pub use orchestrator::{Orchestrator, DEFAULT_MAX_STEPS, DEFAULT_TOP_K};

// ============================================================================
// Conversation Model
// ============================================================================

/// 대화 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// 저장된 역할 문자열 파싱 (알 수 없는 값은 assistant로 처리)
    pub fn from_str_lossy(s: &str) -> Role {
        match s {
            "user" => Role::User,
            _ => Role::Assistant,
        }
    }
}

/// 대화 턴 - 세션 히스토리의 한 항목
///
/// 히스토리는 append-only이며 매 요청마다 전체가 LLM 컨텍스트로
/// 재생됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 히스토리에서 가장 최근 user 턴의 텍스트
pub fn latest_user_text(history: &[ConversationTurn]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(|turn| turn.content.as_str())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_user_text() {
        let history = vec![
            ConversationTurn::user("첫 질문"),
            ConversationTurn::assistant("답변"),
            ConversationTurn::user("두 번째 질문"),
        ];
        assert_eq!(latest_user_text(&history), Some("두 번째 질문"));
    }

    #[test]
    fn test_latest_user_text_empty() {
        assert_eq!(latest_user_text(&[]), None);

        let only_assistant = vec![ConversationTurn::assistant("안내")];
        assert_eq!(latest_user_text(&only_assistant), None);
    }

    #[test]
    fn test_role_roundtrip() {
        assert_eq!(Role::from_str_lossy("user"), Role::User);
        assert_eq!(Role::from_str_lossy("assistant"), Role::Assistant);
        assert_eq!(Role::from_str_lossy("??"), Role::Assistant);
    }
}
