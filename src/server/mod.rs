//! HTTP 서버 - 로그인 / 챗 / 히스토리 엔드포인트
//!
//! POST /login    {username, password} -> {message}
//! POST /chat     {username, question} -> {response}
//! GET  /history/:username             -> {history: [{role, content}]}
//!
//! /chat은 실패를 표면화하지 않습니다. 내부 장애는 모두 사용자에게
//! 보여줄 수 있는 한국어 문장으로 회수됩니다.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{ConversationTurn, Orchestrator};
use crate::history::{ChatHistoryStore, LoginOutcome};

// ============================================================================
// State & Wire Types
// ============================================================================

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub history: Arc<ChatHistoryStore>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub username: String,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ConversationTurn>,
}

// ============================================================================
// Router & Serve
// ============================================================================

/// 애플리케이션 라우터 생성
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/chat", post(chat))
        .route("/history/:username", get(history))
        .with_state(state)
}

/// 서버 시작
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address: {}:{}", host, port))?;

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /login - 없는 사용자는 등록 후 수락
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, Json<LoginResponse>) {
    let username = req.username.trim();
    if username.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse {
                message: "사용자 이름을 입력해주세요.".to_string(),
            }),
        );
    }

    match state.history.login(username, &req.password) {
        Ok(LoginOutcome::Accepted) => (
            StatusCode::OK,
            Json(LoginResponse {
                message: format!("{}님, 다시 오신 것을 환영합니다.", username),
            }),
        ),
        Ok(LoginOutcome::Created) => (
            StatusCode::OK,
            Json(LoginResponse {
                message: format!("{}님, 계정이 생성되었습니다.", username),
            }),
        ),
        Ok(LoginOutcome::Rejected) => (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                message: "비밀번호가 올바르지 않습니다.".to_string(),
            }),
        ),
        Err(e) => {
            tracing::error!("Login failed for {}: {}", username, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LoginResponse {
                    message: "로그인 처리 중 오류가 발생했습니다.".to_string(),
                }),
            )
        }
    }
}

/// POST /chat - 질문 하나를 처리하고 교환을 기록
///
/// 히스토리 로드 실패는 빈 히스토리로 진행하고, 기록 실패는
/// 응답을 막지 않습니다. 항상 200과 문자열 답변을 돌려줍니다.
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Json<ChatResponse> {
    let username = req.username.trim();
    let question = req.question.trim();

    if question.is_empty() {
        return Json(ChatResponse {
            response: "질문을 입력해주세요.".to_string(),
        });
    }

    let mut history = match state.history.load_history(username) {
        Ok(turns) => turns,
        Err(e) => {
            tracing::warn!("Failed to load history for {}: {}", username, e);
            vec![]
        }
    };
    history.push(ConversationTurn::user(question));

    let turn = state.orchestrator.run(&history).await;

    if let Err(e) = state.history.append_exchange(username, question, &turn.content) {
        tracing::warn!("Failed to persist exchange for {}: {}", username, e);
    }

    Json(ChatResponse {
        response: turn.content,
    })
}

/// GET /history/:username - 대화 기록 조회
async fn history(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> (StatusCode, Json<HistoryResponse>) {
    match state.history.load_history(username.trim()) {
        Ok(turns) => (StatusCode::OK, Json(HistoryResponse { history: turns })),
        Err(e) => {
            tracing::error!("Failed to load history for {}: {}", username, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HistoryResponse { history: vec![] }),
            )
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::agent::{
        AnswerSynthesizer, DatasetRetriever, IntentRouter, Role,
    };
    use crate::catalog::{CatalogStore, IndexEntry, SimilarityHit, VectorStore};
    use crate::embedding::EmbeddingProvider;
    use crate::llm::{CompletionProvider, LlmError};

    struct EmptyIndex;

    #[async_trait]
    impl VectorStore for EmptyIndex {
        async fn insert_batch(&self, _entries: &[IndexEntry]) -> Result<usize> {
            Ok(0)
        }

        async fn search(&self, _query: &[f32], _limit: usize) -> Result<Vec<SimilarityHit>> {
            Ok(vec![])
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    struct MockEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        async fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 4])
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct FixedLlm;

    #[async_trait]
    impl CompletionProvider for FixedLlm {
        async fn complete(
            &self,
            _system_prompt: &str,
            _history: &[ConversationTurn],
        ) -> Result<String, LlmError> {
            Ok("테스트 답변입니다.".to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn test_state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let catalog = CatalogStore::open(&dir.path().join("catalog.db")).unwrap();
        let history = ChatHistoryStore::open(&dir.path().join("chat.db")).unwrap();

        let retriever =
            DatasetRetriever::new(catalog, Arc::new(EmptyIndex), Arc::new(MockEmbedder));
        let orchestrator = Orchestrator::new(
            IntentRouter::default(),
            retriever,
            AnswerSynthesizer::new(Arc::new(FixedLlm)),
        );

        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            history: Arc::new(history),
        };
        (dir, state)
    }

    #[tokio::test]
    async fn test_login_flow() {
        let (_dir, state) = test_state();

        let (status, _) = login(
            State(state.clone()),
            Json(LoginRequest {
                username: "admin".to_string(),
                password: "1234".to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = login(
            State(state),
            Json(LoginRequest {
                username: "admin".to_string(),
                password: "wrong".to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.message.contains("비밀번호"));
    }

    #[tokio::test]
    async fn test_chat_records_exchange() {
        let (_dir, state) = test_state();

        let body = chat(
            State(state.clone()),
            Json(ChatRequest {
                username: "admin".to_string(),
                question: "안녕".to_string(),
            }),
        )
        .await;
        assert_eq!(body.response, "테스트 답변입니다.");

        let (status, history_body) =
            history(State(state), Path("admin".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history_body.history.len(), 2);
        assert_eq!(history_body.history[0].role, Role::User);
        assert_eq!(history_body.history[0].content, "안녕");
        assert_eq!(history_body.history[1].content, "테스트 답변입니다.");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_question() {
        let (_dir, state) = test_state();

        let body = chat(
            State(state.clone()),
            Json(ChatRequest {
                username: "admin".to_string(),
                question: "   ".to_string(),
            }),
        )
        .await;
        assert!(body.response.contains("질문"));

        // 빈 질문은 기록하지 않는다
        assert_eq!(state.history.turn_count("admin").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_for_unknown_user_is_empty() {
        let (_dir, state) = test_state();

        let (status, body) = history(State(state), Path("nobody".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.history.is_empty());
    }
}
