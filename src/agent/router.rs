//! Intent Router - 데이터셋 검색 의도 판별
//!
//! 최신 user 턴에 검색 트리거 키워드가 포함돼 있으면 검색 경로,
//! 아니면 일반 대화 경로로 분기합니다. 키워드 집합은 코드가 아닌
//! 데이터이므로 로케일/도메인별로 교체할 수 있습니다.

use super::{latest_user_text, ConversationTurn};

// ============================================================================
// Types
// ============================================================================

/// 라우팅 결정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// 카탈로그 검색 필요
    Search,
    /// 일반 대화
    Chat,
}

/// 검색 트리거 키워드 집합
///
/// 기본값은 포털 사용 패턴에서 수집한 한국어 동사/명사/의문사와
/// 영어 명사입니다.
#[derive(Debug, Clone)]
pub struct RouterKeywords {
    keywords: Vec<String>,
}

impl RouterKeywords {
    /// 커스텀 키워드 집합으로 생성 (소문자로 정규화)
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    /// 소문자 텍스트에 트리거 키워드가 포함돼 있는지
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

impl Default for RouterKeywords {
    fn default() -> Self {
        Self::new([
            // 동사
            "찾아", "찾기", "찾고", "찾을", "찾는",
            "추천", "검색",
            "보여", "알려",
            "구해", "구할", "구하고", "구하는",
            "원해", "원하는",
            "필요",
            "있어", "있나", "있는지", "있을",
            "줘", "주세요",
            // 명사
            "데이터", "데이타", "data", "dataset",
            "정보", "info", "information",
            "자료",
            "통계",
            "목록", "리스트", "list",
            "db", "database",
            // 의문사
            "뭐", "무엇", "어디", "어떤",
        ])
    }
}

// ============================================================================
// IntentRouter
// ============================================================================

/// 의도 라우터
///
/// 전체 함수이며 실패하지 않습니다. 부수효과 없음.
#[derive(Debug, Clone, Default)]
pub struct IntentRouter {
    keywords: RouterKeywords,
}

impl IntentRouter {
    pub fn new(keywords: RouterKeywords) -> Self {
        Self { keywords }
    }

    /// 라우팅 결정
    ///
    /// 가장 최근 user 턴만 검사합니다. user 턴이 없으면 Chat.
    pub fn route(&self, history: &[ConversationTurn]) -> RouteDecision {
        let Some(text) = latest_user_text(history) else {
            return RouteDecision::Chat;
        };

        let lowered = text.to_lowercase();
        if self.keywords.matches(&lowered) {
            tracing::debug!("Route decision: search ({:?})", text);
            RouteDecision::Search
        } else {
            tracing::debug!("Route decision: chat ({:?})", text);
            RouteDecision::Chat
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(text: &str) -> Vec<ConversationTurn> {
        vec![ConversationTurn::user(text)]
    }

    #[test]
    fn test_keyword_routes_to_search() {
        let router = IntentRouter::default();

        for text in [
            "환경 데이터 추천해줘",
            "교통 통계 찾아줘",
            "미세먼지 정보 있어?",
            "카페 관련 자료 보여줘",
        ] {
            assert_eq!(
                router.route(&history_of(text)),
                RouteDecision::Search,
                "expected search for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_english_keyword_case_insensitive() {
        let router = IntentRouter::default();
        assert_eq!(router.route(&history_of("DATASET plz")), RouteDecision::Search);
        assert_eq!(router.route(&history_of("open DB 추천")), RouteDecision::Search);
    }

    #[test]
    fn test_plain_chat_routes_to_chat() {
        let router = IntentRouter::default();

        for text in ["안녕", "고마워", "잘 지내?"] {
            assert_eq!(
                router.route(&history_of(text)),
                RouteDecision::Chat,
                "expected chat for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_empty_history_defaults_to_chat() {
        let router = IntentRouter::default();
        assert_eq!(router.route(&[]), RouteDecision::Chat);

        let only_assistant = vec![ConversationTurn::assistant("무엇을 도와드릴까요?")];
        assert_eq!(router.route(&only_assistant), RouteDecision::Chat);
    }

    #[test]
    fn test_only_latest_user_turn_is_consulted() {
        let router = IntentRouter::default();

        // 이전 턴에 키워드가 있어도 최신 턴만 본다
        let history = vec![
            ConversationTurn::user("환경 데이터 추천해줘"),
            ConversationTurn::assistant("추천드립니다."),
            ConversationTurn::user("고마워"),
        ];
        assert_eq!(router.route(&history), RouteDecision::Chat);
    }

    #[test]
    fn test_custom_keywords() {
        let router = IntentRouter::new(RouterKeywords::new(["météo"]));
        assert_eq!(router.route(&history_of("la Météo aujourd'hui")), RouteDecision::Search);
        assert_eq!(router.route(&history_of("환경 데이터 추천해줘")), RouteDecision::Chat);
    }
}
