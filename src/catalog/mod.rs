//! Catalog 모듈 - 데이터셋 카탈로그 저장소와 유사도 색인
//!
//! - SQLite: 레코드 메타데이터 저장 + LIKE 폴백 검색
//! - LanceDB: 검색 텍스트 임베딩에 대한 벡터 검색 (ANN)
//!
//! 인제스트 이후에는 읽기 전용입니다. 질의 경로에서 카탈로그를
//! 변경하는 코드는 없습니다.

mod record;
mod store;
mod vector;
mod lance;

// Re-exports
pub use record::{parse_update_date, CatalogRecord, NewCatalogRecord, DATE_SENTINEL};
pub use store::{get_data_dir, CatalogStats, CatalogStore};
pub use vector::{
    validate_dimension, IndexEntry, SimilarityHit, VectorStore, EMBEDDING_DIMENSION,
};
pub use lance::LanceCatalogIndex;
