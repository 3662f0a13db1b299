//! LanceDB 기반 카탈로그 색인
//!
//! 레코드 임베딩을 Arrow 컬럼 포맷으로 저장하고 ANN 검색을 제공합니다.
//! 테이블은 첫 삽입 때 생성되며, 그 전의 검색은 빈 결과를 돌려줍니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{validate_dimension, IndexEntry, SimilarityHit, VectorStore, EMBEDDING_DIMENSION};

/// 색인 테이블 이름
const TABLE_NAME: &str = "catalog_index";

// ============================================================================
// LanceCatalogIndex
// ============================================================================

/// LanceDB 카탈로그 색인
pub struct LanceCatalogIndex {
    db: lancedb::connection::Connection,
}

impl LanceCatalogIndex {
    /// `.lance` 디렉토리를 열거나 생성
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create index directory")?;
            }
        }

        let uri = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Index path is not valid UTF-8"))?;

        let db = lancedb::connect(uri)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 테이블이 이미 만들어졌으면 연다
    async fn existing_table(&self) -> Result<Option<lancedb::table::Table>> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list index tables")?;

        if !names.iter().any(|n| n == TABLE_NAME) {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open index table")?;
        Ok(Some(table))
    }

    fn schema() -> Arc<Schema> {
        let item = Arc::new(Field::new("item", DataType::Float32, true));
        Arc::new(Schema::new(vec![
            Field::new("record_id", DataType::Int64, false),
            Field::new("search_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(item, EMBEDDING_DIMENSION),
                false,
            ),
        ]))
    }

    /// 엔트리 슬라이스 -> Arrow RecordBatch
    fn build_batch(entries: &[IndexEntry]) -> Result<RecordBatch> {
        let ids = Int64Array::from(entries.iter().map(|e| e.record_id).collect::<Vec<_>>());
        let texts = StringArray::from(
            entries
                .iter()
                .map(|e| e.search_text.as_str())
                .collect::<Vec<_>>(),
        );

        let flat: Float32Array = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect::<Vec<f32>>()
            .into();
        let embeddings = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            EMBEDDING_DIMENSION,
            Arc::new(flat) as Arc<dyn Array>,
            None,
        )
        .context("Failed to build embedding column")?;

        RecordBatch::try_new(
            Self::schema(),
            vec![Arc::new(ids), Arc::new(texts), Arc::new(embeddings)],
        )
        .context("Failed to build index batch")
    }
}

#[async_trait]
impl VectorStore for LanceCatalogIndex {
    async fn insert_batch(&self, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        // 색인 불변식: 모든 임베딩은 색인 차원과 일치
        validate_dimension(entries)?;

        let batch = Self::build_batch(entries)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.existing_table().await? {
            Some(table) => {
                table
                    .add(reader)
                    .execute()
                    .await
                    .context("Failed to append to index table")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, reader)
                    .execute()
                    .await
                    .context("Failed to create index table")?;
            }
        }

        tracing::debug!("Indexed {} embeddings", entries.len());
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SimilarityHit>> {
        let Some(table) = self.existing_table().await? else {
            return Ok(vec![]);
        };

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to build vector query")?
            .limit(limit)
            .execute()
            .await
            .context("Vector query failed")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut hits = Vec::new();
        for batch in batches {
            let ids = batch
                .column_by_name("record_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("record_id column missing from result"))?;

            // LanceDB가 결과에 _distance 컬럼을 붙여준다 (L2)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("_distance column missing from result"))?;

            for row in 0..batch.num_rows() {
                hits.push(SimilarityHit {
                    record_id: ids.value(row),
                    // 거리 -> 유사도. 단조 감소이기만 하면 순위에는 충분.
                    similarity: 1.0 / (1.0 + distances.value(row)),
                });
            }
        }

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        match self.existing_table().await? {
            Some(table) => table
                .count_rows(None)
                .await
                .context("Failed to count index rows"),
            None => Ok(0),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
