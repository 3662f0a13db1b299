//! Dataset Retriever - 유사도 검색 + 최신순 재정렬
//!
//! 순수 유사도 검색은 갱신이 멈춘 데이터셋을 걸러내지 못하므로,
//! 2k개를 과추출한 뒤 수정일 내림차순으로 재정렬해 상위 k개를
//! 돌려줍니다. 색인 장애 시에는 카탈로그 LIKE 검색으로 폴백합니다.

use std::sync::Arc;

use crate::catalog::{CatalogRecord, CatalogStore, VectorStore};
use crate::embedding::EmbeddingProvider;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
///
/// 폴백과 "결과 없음"을 예외가 아닌 명시적 변형으로 표현합니다.
/// NoResults는 빈 히트 목록과 구분되는 일급 마커입니다.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// 유사도 색인 검색 성공 (유사도 순 -> 최신순 재정렬 완료)
    Hits(Vec<CatalogRecord>),
    /// 색인 장애로 키워드 폴백 검색 사용 (카탈로그 순)
    Fallback(Vec<CatalogRecord>),
    /// 폴백까지 실패 - 관련 데이터셋 없음
    NoResults,
}

impl RetrievalOutcome {
    /// 결과 레코드 참조 (NoResults는 빈 슬라이스)
    pub fn records(&self) -> &[CatalogRecord] {
        match self {
            RetrievalOutcome::Hits(records) | RetrievalOutcome::Fallback(records) => records,
            RetrievalOutcome::NoResults => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

// ============================================================================
// DatasetRetriever
// ============================================================================

/// 기본 과추출 배수 - k*2개를 가져와 최신순 재정렬 후 k개 반환
pub const DEFAULT_OVERSAMPLE: usize = 2;

/// 데이터셋 검색기
///
/// 협력자(색인, 임베더, 카탈로그)는 생성자로 주입받습니다.
pub struct DatasetRetriever {
    catalog: CatalogStore,
    index: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    oversample: usize,
}

impl DatasetRetriever {
    pub fn new(
        catalog: CatalogStore,
        index: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            catalog,
            index,
            embedder,
            oversample: DEFAULT_OVERSAMPLE,
        }
    }

    /// 과추출 배수 변경 (기본 2)
    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample.max(1);
        self
    }

    /// 카탈로그 검색
    ///
    /// 1. 쿼리 임베딩 후 색인에서 oversample*k개 후보를 유사도 순으로 획득
    /// 2. 수정일 내림차순 안정 정렬 (센티널 날짜는 마지막)
    /// 3. 상위 k개 반환
    ///
    /// 색인/임베딩 실패는 여기서 회수하고 폴백으로 내려갑니다.
    /// 호출자에게 에러가 전파되는 일은 없습니다.
    pub async fn retrieve(&self, query: &str, k: usize) -> RetrievalOutcome {
        let query = query.trim();
        if query.is_empty() || k == 0 {
            return RetrievalOutcome::NoResults;
        }

        match self.similarity_search(query, k).await {
            Ok(records) if !records.is_empty() => {
                tracing::info!("Similarity search: {} hits for {:?}", records.len(), query);
                return RetrievalOutcome::Hits(records);
            }
            Ok(_) => {
                tracing::debug!("Similarity search empty for {:?}, trying fallback", query);
            }
            Err(e) => {
                tracing::warn!("Similarity search failed for {:?}: {}", query, e);
            }
        }

        self.fallback_search(query, k)
    }

    /// 유사도 검색 + 최신순 재정렬
    async fn similarity_search(&self, query: &str, k: usize) -> anyhow::Result<Vec<CatalogRecord>> {
        let query_embedding = self.embedder.embed_query(query).await?;

        let candidate_count = k.saturating_mul(self.oversample);
        let hits = self.index.search(&query_embedding, candidate_count).await?;

        let ids: Vec<i64> = hits.iter().map(|h| h.record_id).collect();
        let mut records = self.catalog.get_records(&ids)?;

        // 안정 정렬: 수정일이 같으면 유사도 순위 유지
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(k);

        Ok(records)
    }

    /// 키워드 폴백 검색
    ///
    /// 폴백 자체가 실패해도 에러 대신 NoResults를 돌려줍니다.
    fn fallback_search(&self, query: &str, k: usize) -> RetrievalOutcome {
        match self.catalog.search_like(query, k) {
            Ok(records) if !records.is_empty() => {
                tracing::info!("Fallback search: {} hits for {:?}", records.len(), query);
                RetrievalOutcome::Fallback(records)
            }
            Ok(_) => RetrievalOutcome::NoResults,
            Err(e) => {
                tracing::warn!("Fallback search failed for {:?}: {}", query, e);
                RetrievalOutcome::NoResults
            }
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

    use crate::catalog::{IndexEntry, NewCatalogRecord, SimilarityHit};

    /// 고정 히트 목록 또는 에러를 돌려주는 색인 목업
    struct MockIndex {
        hits: Vec<SimilarityHit>,
        fail: bool,
    }

    #[async_trait]
    impl VectorStore for MockIndex {
        async fn insert_batch(&self, _entries: &[IndexEntry]) -> Result<usize> {
            Ok(0)
        }

        async fn search(&self, _query: &[f32], limit: usize) -> Result<Vec<SimilarityHit>> {
            if self.fail {
                anyhow::bail!("index unavailable");
            }
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.hits.len())
        }
    }

    /// 고정 벡터를 돌려주는 임베더 목업
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

    fn catalog_with(records: &[(&str, &str)]) -> (TempDir, CatalogStore, Vec<i64>) {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(&dir.path().join("test.db")).unwrap();

        let new_records: Vec<NewCatalogRecord> = records
            .iter()
            .map(|(title, updated)| NewCatalogRecord {
                title: title.to_string(),
                description: format!("{} 설명", title),
                updated_raw: updated.to_string(),
                url: format!("https://www.data.go.kr/data/{}", title),
                ..Default::default()
            })
            .collect();

        let ids = store.add_records(&new_records).unwrap();
        (dir, store, ids)
    }

    fn retriever_with(
        catalog: CatalogStore,
        hits: Vec<SimilarityHit>,
        fail: bool,
    ) -> DatasetRetriever {
        DatasetRetriever::new(
            catalog,
            Arc::new(MockIndex { hits, fail }),
            Arc::new(MockEmbedder),
        )
    }

    #[tokio::test]
    async fn test_recency_rerank() {
        // 유사도 순: 오래된 레코드가 먼저
        let (_dir, catalog, ids) =
            catalog_with(&[("오래된 환경정보", "2023-01-01"), ("최신 환경정보", "2024-01-01")]);

        let hits = vec![
            SimilarityHit { record_id: ids[0], similarity: 0.9 },
            SimilarityHit { record_id: ids[1], similarity: 0.9 },
        ];

        let retriever = retriever_with(catalog, hits, false);
        let outcome = retriever.retrieve("환경", 2).await;

        let records = outcome.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "최신 환경정보");
        assert_eq!(records[1].title, "오래된 환경정보");
        assert!(matches!(outcome, RetrievalOutcome::Hits(_)));
    }

    #[tokio::test]
    async fn test_sentinel_dates_sort_last() {
        let (_dir, catalog, ids) =
            catalog_with(&[("날짜없음", "없음"), ("날짜있음", "2020-06-01")]);

        let hits = vec![
            SimilarityHit { record_id: ids[0], similarity: 0.9 },
            SimilarityHit { record_id: ids[1], similarity: 0.8 },
        ];

        let retriever = retriever_with(catalog, hits, false);
        let outcome = retriever.retrieve("날짜", 2).await;

        let records = outcome.records();
        assert_eq!(records[0].title, "날짜있음");
        assert_eq!(records[1].title, "날짜없음");
    }

    #[tokio::test]
    async fn test_oversample_then_truncate() {
        let (_dir, catalog, ids) = catalog_with(&[
            ("A", "2021-01-01"),
            ("B", "2024-01-01"),
            ("C", "2022-01-01"),
            ("D", "2023-01-01"),
        ]);

        let hits: Vec<SimilarityHit> = ids
            .iter()
            .map(|&id| SimilarityHit { record_id: id, similarity: 0.9 })
            .collect();

        let retriever = retriever_with(catalog, hits, false);
        let outcome = retriever.retrieve("데이터", 2).await;

        // 4개 후보 중 최신 2개만
        let records = outcome.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "B");
        assert_eq!(records[1].title, "D");
    }

    #[tokio::test]
    async fn test_fallback_on_index_failure() {
        let (_dir, catalog, _ids) = catalog_with(&[("해양환경정보", "2025-09-02")]);

        let retriever = retriever_with(catalog, vec![], true);
        let outcome = retriever.retrieve("해양", 5).await;

        assert!(matches!(outcome, RetrievalOutcome::Fallback(_)));
        assert_eq!(outcome.records()[0].title, "해양환경정보");
    }

    #[tokio::test]
    async fn test_no_results_marker() {
        let (_dir, catalog, _ids) = catalog_with(&[("해양환경정보", "2025-09-02")]);

        let retriever = retriever_with(catalog, vec![], true);
        let outcome = retriever.retrieve("의료", 5).await;

        assert!(matches!(outcome, RetrievalOutcome::NoResults));
        assert!(outcome.is_empty());
    }

    #[tokio::test]
    async fn test_blank_query() {
        let (_dir, catalog, _ids) = catalog_with(&[("해양환경정보", "2025-09-02")]);

        let retriever = retriever_with(catalog, vec![], false);
        assert!(matches!(
            retriever.retrieve("   ", 5).await,
            RetrievalOutcome::NoResults
        ));
    }
}
