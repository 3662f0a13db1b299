//! Orchestrator - 라우팅/검색/합성 상태 머신
//!
//! ROUTING -> {RETRIEVING, SYNTHESIZING} -> SYNTHESIZING_FINAL -> DONE
//!
//! 요청 하나당 선형 순회 한 번이며, 전이 횟수에 상한을 둬서
//! 어떤 입력에서도 무한 루프가 불가능합니다.

use super::retriever::{DatasetRetriever, RetrievalOutcome};
use super::router::{IntentRouter, RouteDecision};
use super::synthesizer::{AnswerSynthesizer, AssistantTurn, Provenance};
use super::{latest_user_text, ConversationTurn};

// ============================================================================
// Constants
// ============================================================================

/// 기본 전이 상한 (원형의 recursion_limit와 동일)
pub const DEFAULT_MAX_STEPS: usize = 5;

/// 검색 시 기본 반환 개수
pub const DEFAULT_TOP_K: usize = 5;

/// 전이 상한 초과 시 고정 메시지
const STEP_BUDGET_MESSAGE: &str =
    "죄송합니다. 요청을 완료하지 못했습니다. 질문을 조금 더 간단하게 다시 시도해주세요.";

// ============================================================================
// State Machine
// ============================================================================

/// 상태 머신 상태
#[derive(Debug)]
enum AgentState {
    /// 초기 상태 - 라우팅 결정
    Routing,
    /// 검색 경로 - 카탈로그 검색
    Retrieving,
    /// 대화 경로 - 바로 합성
    Synthesizing,
    /// 검색 결과를 들고 최종 합성
    SynthesizingFinal(RetrievalOutcome),
    /// 종료 - 합성된 턴 반환
    Done(AssistantTurn),
}

/// 오케스트레이터
///
/// 협력자는 컴포지션 루트에서 생성해 주입합니다.
/// 전역 싱글턴이나 암묵적 상태는 없습니다.
pub struct Orchestrator {
    router: IntentRouter,
    retriever: DatasetRetriever,
    synthesizer: AnswerSynthesizer,
    max_steps: usize,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        router: IntentRouter,
        retriever: DatasetRetriever,
        synthesizer: AnswerSynthesizer,
    ) -> Self {
        Self {
            router,
            retriever,
            synthesizer,
            max_steps: DEFAULT_MAX_STEPS,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// 전이 상한 변경
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// 검색 반환 개수 변경
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// 상태 머신 1회 순회
    ///
    /// 경계에서 실패하지 않습니다. 모든 실패 경로는 각 컴포넌트가
    /// 문자열 답변으로 회수하며, 전이 상한 초과만이 강제 종료 사유입니다.
    pub async fn run(&self, history: &[ConversationTurn]) -> AssistantTurn {
        let mut state = AgentState::Routing;
        let mut steps = 0;

        loop {
            match state {
                AgentState::Done(turn) => {
                    tracing::debug!("State machine done in {} steps", steps);
                    return turn;
                }
                current => {
                    if steps >= self.max_steps {
                        tracing::warn!("Step budget exceeded ({} steps), aborting", steps);
                        return AssistantTurn {
                            content: STEP_BUDGET_MESSAGE.to_string(),
                            provenance: Provenance::GeneralKnowledge,
                        };
                    }
                    steps += 1;
                    state = self.step(current, history).await;
                }
            }
        }
    }

    /// 단일 전이
    async fn step(&self, state: AgentState, history: &[ConversationTurn]) -> AgentState {
        match state {
            AgentState::Routing => match self.router.route(history) {
                RouteDecision::Search => AgentState::Retrieving,
                RouteDecision::Chat => AgentState::Synthesizing,
            },

            AgentState::Retrieving => {
                let query = latest_user_text(history).unwrap_or_default();
                let outcome = self.retriever.retrieve(query, self.top_k).await;
                AgentState::SynthesizingFinal(outcome)
            }

            AgentState::Synthesizing => {
                let turn = self.synthesizer.synthesize(history, None).await;
                AgentState::Done(turn)
            }

            AgentState::SynthesizingFinal(outcome) => {
                let turn = self.synthesizer.synthesize(history, Some(&outcome)).await;
                AgentState::Done(turn)
            }

            // run()에서 걸러짐
            AgentState::Done(turn) => AgentState::Done(turn),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
