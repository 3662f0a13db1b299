//! Vector Store - 카탈로그 유사도 색인 트레이트
//!
//! 카탈로그 레코드의 검색 텍스트 임베딩에 대한 최근접 이웃 검색 인터페이스입니다.
//! 색인은 append-only이며, 레코드 수정은 재색인으로만 가능합니다.

use anyhow::Result;
use async_trait::async_trait;

/// 벡터 임베딩 차원 (Gemini gemini-embedding-001 기본값)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
pub const EMBEDDING_DIMENSION: i32 = 768;

// ============================================================================
// Types
// ============================================================================

/// 색인 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// 카탈로그 레코드 ID (datasets.id)
    pub record_id: i64,
    /// 임베딩 대상이 된 검색 텍스트
    pub search_text: String,
    /// 임베딩 벡터 (EMBEDDING_DIMENSION 차원)
    pub embedding: Vec<f32>,
}

/// 유사도 검색 결과
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    /// 카탈로그 레코드 ID
    pub record_id: i64,
    /// 유사도 스코어 (높을수록 가까움)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// 유사도 색인 트레이트 (async)
///
/// 레코드 임베딩을 저장하고 쿼리 임베딩으로 최근접 이웃을 찾습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 엔트리 배치 삽입
    ///
    /// 모든 엔트리의 임베딩 차원이 색인 차원과 일치해야 합니다.
    async fn insert_batch(&self, entries: &[IndexEntry]) -> Result<usize>;

    /// 유사도 검색 - 유사도 내림차순으로 최대 limit개 반환
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SimilarityHit>>;

    /// 색인된 엔트리 개수
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 삽입 전 차원 검증
pub fn validate_dimension(entries: &[IndexEntry]) -> Result<()> {
    for entry in entries {
        if entry.embedding.len() != EMBEDDING_DIMENSION as usize {
            anyhow::bail!(
                "Embedding dimension mismatch for record {}: expected {}, got {}",
                entry.record_id,
                EMBEDDING_DIMENSION,
                entry.embedding.len()
            );
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dimension() {
        let good = IndexEntry {
            record_id: 1,
            search_text: "해양 환경".to_string(),
            embedding: vec![0.0; EMBEDDING_DIMENSION as usize],
        };
        assert!(validate_dimension(&[good]).is_ok());

        let bad = IndexEntry {
            record_id: 2,
            search_text: "해양 환경".to_string(),
            embedding: vec![0.0; 3],
        };
        assert!(validate_dimension(&[bad]).is_err());
    }
}
