//! dataset-explorer - 공공데이터 포털 데이터셋 추천 RAG 챗봇
//!
//! 키워드 의도 라우팅 + LanceDB 벡터 검색 + 최신순 재정렬로
//! 포털 데이터셋을 추천하고, Gemini로 답변을 합성합니다.

pub mod agent;
pub mod catalog;
pub mod cli;
pub mod embedding;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod server;

// Re-exports
pub use agent::{
    AnswerSynthesizer, AssistantTurn, ConversationTurn, DatasetRetriever, IntentRouter,
    Orchestrator, Provenance, RetrievalOutcome, Role, RouteDecision, RouterKeywords,
};
pub use catalog::{
    CatalogRecord, CatalogStore, IndexEntry, LanceCatalogIndex, NewCatalogRecord, SimilarityHit,
    VectorStore, get_data_dir, parse_update_date,
};
pub use embedding::{EmbeddingProvider, GeminiEmbedding, get_api_key, has_api_key};
pub use history::{ChatHistoryStore, LoginOutcome};
pub use ingest::{IngestPipeline, IngestReport, parse_portal_csv};
pub use llm::{CompletionProvider, GeminiChat, LlmError};
