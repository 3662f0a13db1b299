//! Answer Synthesizer - 검색 결과 기반 최종 답변 생성
//!
//! 검색 경로에서는 레코드 메타데이터를 고정 불릿 형식으로 프롬프트에
//! 넣어 검색 근거 답변을, 대화 경로에서는 데이터셋을 지어내지 않는
//! 일반 응대를 생성합니다. 모든 답변에는 출처 태그가 붙습니다.

use std::sync::Arc;

use crate::catalog::CatalogRecord;
use crate::llm::{CompletionProvider, LlmError};

use super::{ConversationTurn, RetrievalOutcome};

// ============================================================================
// Prompts
// ============================================================================

/// 일반 대화용 시스템 프롬프트
///
/// 이 경로에서는 검색 도구가 없으므로 데이터셋 정보를 자체 지식으로
/// 제공하는 것을 금지합니다.
const CHAT_SYSTEM_PROMPT: &str = r#"당신은 "Dataset Explorer"입니다. 공공데이터 포털(data.go.kr)의 데이터셋을 추천하는 전문 에이전트입니다.

이 대화에서는 데이터셋 검색 결과가 제공되지 않습니다. 다음을 지키세요:
1. 인사, 감사, 안부 같은 일반 대화에만 친절하게 응대하세요.
2. 절대로 존재하지 않는 데이터셋 이름이나 URL을 만들어내지 마세요.
3. 데이터셋이 필요해 보이면 "환경 데이터 추천해줘"처럼 구체적으로 질문하도록 안내하세요.
답변은 항상 한국어로, 친절하고 전문적인 톤을 유지하세요."#;

/// 검색 결과 분석용 시스템 프롬프트
const RAG_SYSTEM_PROMPT: &str = r#"당신은 공공데이터 포털 검색 결과를 분석하는 전문가입니다.

사용자 질문과 [공공데이터 포털 검색결과]를 비교하여 답변하세요.

필수 지침:
1. 검색 결과와 질문의 주제가 일치하는 데이터셋만 소개하세요.
2. 주제가 전혀 일치하지 않으면 "죄송합니다. 공공데이터 포털에서 해당 주제의 데이터셋을 찾을 수 없습니다."라고만 답하세요.
3. 소개할 때는 반드시 다음 형식을 따르세요:
   1. **데이터셋명**
      - 제공기관: XXX
      - 분류: XXX
      - 수정일: YYYY-MM-DD
      - URL: https://www.data.go.kr/... (필수, 절대 생략 금지)
4. 검색 결과에 없는 정보는 만들어내지 마세요."#;

/// 검색 결과 없음 - LLM 호출 없이 고정 메시지
const NOT_FOUND_MESSAGE: &str =
    "죄송합니다. 공공데이터 포털에서 관련 데이터셋을 찾을 수 없습니다. \
     다른 키워드로 다시 질문해주세요.";

/// 완성 호출 실패 - 고정 에러 메시지
const SYNTHESIS_ERROR_MESSAGE: &str =
    "죄송합니다. 답변 생성 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.";

// ============================================================================
// Types
// ============================================================================

/// 출처 태그 - 답변이 검색에 근거했는지, 일반 지식인지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// 카탈로그 검색 결과에 근거한 답변
    Retrieval,
    /// 일반 지식 답변 (검색 미사용)
    GeneralKnowledge,
}

/// 합성된 assistant 턴
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub content: String,
    pub provenance: Provenance,
}

impl AssistantTurn {
    pub fn into_turn(self) -> ConversationTurn {
        ConversationTurn::assistant(self.content)
    }
}

// ============================================================================
// AnswerSynthesizer
// ============================================================================

/// 답변 합성기
pub struct AnswerSynthesizer {
    llm: Arc<dyn CompletionProvider>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    /// 최종 답변 생성
    ///
    /// - retrieved가 Some이고 레코드가 있으면: 검색 근거 답변
    /// - retrieved가 Some이지만 비어 있으면: 고정 "결과 없음" 메시지
    /// - retrieved가 None이면 (대화 경로): 일반 응대
    ///
    /// 완성 호출 실패는 여기서 회수되어 고정 에러 문자열이 됩니다.
    pub async fn synthesize(
        &self,
        history: &[ConversationTurn],
        retrieved: Option<&RetrievalOutcome>,
    ) -> AssistantTurn {
        match retrieved {
            Some(outcome) => {
                let context = build_context(outcome.records());
                if context.is_empty() {
                    // 결과 없음 (또는 URL 없는 레코드뿐) - 지어내지 않는다
                    return AssistantTurn {
                        content: NOT_FOUND_MESSAGE.to_string(),
                        provenance: Provenance::Retrieval,
                    };
                }
                self.grounded_answer(history, &context).await
            }
            None => self.chat_answer(history).await,
        }
    }

    /// 검색 근거 답변
    async fn grounded_answer(
        &self,
        history: &[ConversationTurn],
        context: &str,
    ) -> AssistantTurn {
        let question = super::latest_user_text(history).unwrap_or_default();

        // 검색 결과를 마지막 user 턴으로 주입 (원 히스토리는 변경하지 않음)
        let mut augmented: Vec<ConversationTurn> = history.to_vec();
        augmented.push(ConversationTurn::user(format!(
            "사용자 질문: {}\n\n[공공데이터 포털 검색결과]:\n{}\n\n\
             제공된 검색 결과를 기반으로 최종 답변을 해주세요.",
            question, context
        )));

        match self.llm.complete(RAG_SYSTEM_PROMPT, &augmented).await {
            Ok(content) => AssistantTurn {
                content,
                provenance: Provenance::Retrieval,
            },
            Err(e) => self.error_turn(e),
        }
    }

    /// 일반 대화 답변
    async fn chat_answer(&self, history: &[ConversationTurn]) -> AssistantTurn {
        match self.llm.complete(CHAT_SYSTEM_PROMPT, history).await {
            Ok(content) => AssistantTurn {
                content,
                provenance: Provenance::GeneralKnowledge,
            },
            Err(e) => self.error_turn(e),
        }
    }

    /// 완성 실패를 사용자 메시지로 변환
    fn error_turn(&self, error: LlmError) -> AssistantTurn {
        tracing::error!("Completion failed: {}", error);
        AssistantTurn {
            content: SYNTHESIS_ERROR_MESSAGE.to_string(),
            provenance: Provenance::GeneralKnowledge,
        }
    }
}

// ============================================================================
// Context Construction
// ============================================================================

/// 레코드를 고정 불릿 형식의 프롬프트 컨텍스트로 변환
///
/// URL 불변식: URL이 비어 있는 레코드는 통째로 건너뜁니다.
/// 검색 근거 답변의 모든 데이터셋 항목에는 URL이 있어야 합니다.
fn build_context(records: &[CatalogRecord]) -> String {
    let mut lines = Vec::new();
    let mut index = 0;

    for record in records {
        if record.url.trim().is_empty() {
            tracing::debug!("Skipping record without URL: {}", record.title);
            continue;
        }

        index += 1;
        lines.push(format!(
            "{}. {}\n   제공기관: {}\n   분류: {}\n   수정일: {}\n   URL: {}",
            index,
            display_or_na(&record.title),
            display_or_na(&record.provider),
            display_or_na(&record.category),
            record.updated_display(),
            record.url.trim(),
        ));
    }

    lines.join("\n\n")
}

fn display_or_na(field: &str) -> &str {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        "N/A"
    } else {
        trimmed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::catalog::DATE_SENTINEL;

    /// 받은 프롬프트를 기록하고 고정 답변 또는 에러를 돌려주는 목업
    struct MockLlm {
        reply: Result<String, ()>,
        seen: Mutex<Vec<(String, Vec<ConversationTurn>)>>,
    }

    impl MockLlm {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(vec![]),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                seen: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for MockLlm {
        async fn complete(
            &self,
            system_prompt: &str,
            history: &[ConversationTurn],
        ) -> Result<String, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), history.to_vec()));

            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(LlmError::Transient("mock failure".to_string())),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn record(title: &str, url: &str) -> CatalogRecord {
        CatalogRecord {
            id: 1,
            title: title.to_string(),
            description: String::new(),
            keywords: String::new(),
            provider: "해양환경공단".to_string(),
            category: "환경".to_string(),
            format: "CSV".to_string(),
            updated_at: DATE_SENTINEL,
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_grounded_answer_uses_rag_prompt() {
        let llm = Arc::new(MockLlm::replying("추천드립니다."));
        let synthesizer = AnswerSynthesizer::new(llm.clone());

        let history = vec![ConversationTurn::user("해양 데이터 추천해줘")];
        let outcome = RetrievalOutcome::Hits(vec![record(
            "해양환경정보",
            "https://www.data.go.kr/data/15002978",
        )]);

        let turn = synthesizer.synthesize(&history, Some(&outcome)).await;
        assert_eq!(turn.provenance, Provenance::Retrieval);
        assert_eq!(turn.content, "추천드립니다.");

        let seen = llm.seen.lock().unwrap();
        let (system, augmented) = &seen[0];
        assert!(system.contains("검색 결과"));
        // 검색 결과가 추가 user 턴으로 주입됨
        assert_eq!(augmented.len(), 2);
        assert!(augmented[1].content.contains("해양환경정보"));
        assert!(augmented[1].content.contains("https://www.data.go.kr/data/15002978"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_fixed_message() {
        let llm = Arc::new(MockLlm::replying("호출되면 안 됨"));
        let synthesizer = AnswerSynthesizer::new(llm.clone());

        let history = vec![ConversationTurn::user("의료 데이터 추천해줘")];
        let turn = synthesizer
            .synthesize(&history, Some(&RetrievalOutcome::NoResults))
            .await;

        assert_eq!(turn.content, NOT_FOUND_MESSAGE);
        assert_eq!(turn.provenance, Provenance::Retrieval);
        // LLM 미호출 - 지어낼 기회 자체가 없음
        assert!(llm.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_answer_general_knowledge() {
        let llm = Arc::new(MockLlm::replying("안녕하세요!"));
        let synthesizer = AnswerSynthesizer::new(llm.clone());

        let history = vec![ConversationTurn::user("안녕")];
        let turn = synthesizer.synthesize(&history, None).await;

        assert_eq!(turn.provenance, Provenance::GeneralKnowledge);
        assert_eq!(turn.content, "안녕하세요!");

        let seen = llm.seen.lock().unwrap();
        assert!(seen[0].0.contains("Dataset Explorer"));
    }

    #[tokio::test]
    async fn test_completion_failure_becomes_error_string() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(MockLlm::failing()));

        let history = vec![ConversationTurn::user("안녕")];
        let turn = synthesizer.synthesize(&history, None).await;

        assert_eq!(turn.content, SYNTHESIS_ERROR_MESSAGE);
    }

    #[test]
    fn test_context_skips_records_without_url() {
        let records = vec![
            record("URL 있는 데이터셋", "https://www.data.go.kr/data/1"),
            record("URL 없는 데이터셋", ""),
            record("공백 URL 데이터셋", "   "),
        ];

        let context = build_context(&records);
        assert!(context.contains("URL 있는 데이터셋"));
        assert!(!context.contains("URL 없는 데이터셋"));
        assert!(!context.contains("공백 URL 데이터셋"));

        // 모든 항목에 URL 라인이 있음
        for entry in context.split("\n\n") {
            assert!(entry.contains("URL: https://"), "entry missing URL: {}", entry);
        }
    }

    #[tokio::test]
    async fn test_all_records_without_url_becomes_not_found() {
        let llm = Arc::new(MockLlm::replying("호출되면 안 됨"));
        let synthesizer = AnswerSynthesizer::new(llm.clone());

        let history = vec![ConversationTurn::user("데이터 추천해줘")];
        let outcome = RetrievalOutcome::Hits(vec![record("URL 없음", "")]);

        let turn = synthesizer.synthesize(&history, Some(&outcome)).await;
        assert_eq!(turn.content, NOT_FOUND_MESSAGE);
        assert!(llm.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_context_format() {
        let mut with_date = record("해양환경정보", "https://www.data.go.kr/data/15002978");
        with_date.updated_at = crate::catalog::parse_update_date("2025-09-02");

        let context = build_context(&[with_date]);
        assert!(context.starts_with("1. 해양환경정보"));
        assert!(context.contains("제공기관: 해양환경공단"));
        assert!(context.contains("분류: 환경"));
        assert!(context.contains("수정일: 2025-09-02"));
    }
}
