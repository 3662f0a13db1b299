//! Ingest 파이프라인 - 포털 목록개방현황 CSV -> 카탈로그 + 벡터 색인
//!
//! CSV 파싱, SQLite 저장, 배치 임베딩, 색인 삽입을 한 번에 수행합니다.
//! URL이 없는 행은 답변에서 인용할 수 없으므로 파싱 단계에서 버립니다.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::catalog::{CatalogStore, IndexEntry, NewCatalogRecord, VectorStore};
use crate::embedding::EmbeddingProvider;

// ============================================================================
// Constants
// ============================================================================

/// 임베딩 배치 크기
const EMBED_BATCH_SIZE: usize = 32;

/// 포털 CSV 컬럼명 (헤더 기준 매핑, 순서 무관)
const COL_TITLE: &str = "목록명";
const COL_DESCRIPTION: &str = "설명";
const COL_KEYWORDS: &str = "키워드";
const COL_PROVIDER: &str = "제공기관";
const COL_CATEGORY: &str = "분류체계";
const COL_FORMAT: &str = "제공형태";
const COL_EXTENSION: &str = "확장자";
const COL_UPDATED: &str = "수정일";
const COL_URL: &str = "목록 URL";

// ============================================================================
// CSV Parsing
// ============================================================================

/// CSV 파싱 결과
#[derive(Debug, Default)]
pub struct ParseReport {
    pub records: Vec<NewCatalogRecord>,
    /// 목록명 또는 URL이 없어 버린 행 수
    pub skipped: usize,
}

/// 포털 목록개방현황 CSV 파싱
///
/// 헤더 이름으로 컬럼을 찾으므로 컬럼 순서가 바뀌어도 동작합니다.
/// 제공형태가 비어 있으면 확장자 컬럼을 대신 사용합니다.
pub fn parse_portal_csv<R: Read>(reader: R) -> Result<ParseReport> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let idx_title = column(COL_TITLE)
        .with_context(|| format!("CSV missing required column: {}", COL_TITLE))?;
    let idx_url = column(COL_URL)
        .with_context(|| format!("CSV missing required column: {}", COL_URL))?;
    let idx_description = column(COL_DESCRIPTION);
    let idx_keywords = column(COL_KEYWORDS);
    let idx_provider = column(COL_PROVIDER);
    let idx_category = column(COL_CATEGORY);
    let idx_format = column(COL_FORMAT);
    let idx_extension = column(COL_EXTENSION);
    let idx_updated = column(COL_UPDATED);

    let field = |row: &csv::StringRecord, idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let mut report = ParseReport::default();

    for (line, row) in csv_reader.records().enumerate() {
        let row = row.with_context(|| format!("Failed to parse CSV row {}", line + 2))?;

        let title = field(&row, Some(idx_title));
        let url = field(&row, Some(idx_url));

        // 제목이나 URL이 없으면 인용 불가능한 레코드
        if title.is_empty() || url.is_empty() {
            report.skipped += 1;
            continue;
        }

        let mut format = field(&row, idx_format);
        if format.is_empty() {
            format = field(&row, idx_extension);
        }

        report.records.push(NewCatalogRecord {
            title,
            description: field(&row, idx_description),
            keywords: field(&row, idx_keywords),
            provider: field(&row, idx_provider),
            category: field(&row, idx_category),
            format,
            updated_raw: field(&row, idx_updated),
            url,
        });
    }

    tracing::info!(
        "Parsed {} records from CSV ({} skipped)",
        report.records.len(),
        report.skipped
    );
    Ok(report)
}

// ============================================================================
// IngestPipeline
// ============================================================================

/// 인제스트 실행 결과
#[derive(Debug, Clone, Copy)]
pub struct IngestReport {
    /// CSV에서 파싱된 행 수
    pub parsed: usize,
    /// 제목/URL 누락으로 버린 행 수
    pub skipped: usize,
    /// 카탈로그에 저장된 레코드 수
    pub stored: usize,
    /// 벡터 색인에 삽입된 엔트리 수
    pub indexed: usize,
}

/// 인제스트 파이프라인
pub struct IngestPipeline {
    catalog: CatalogStore,
    index: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IngestPipeline {
    pub fn new(
        catalog: CatalogStore,
        index: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            catalog,
            index,
            embedder,
        }
    }

    /// CSV 파일 인제스트
    ///
    /// limit이 있으면 앞에서부터 그 개수만 처리합니다 (테스트/미리보기용).
    pub async fn ingest_file(&self, path: &Path, limit: Option<usize>) -> Result<IngestReport> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

        let mut report = parse_portal_csv(file)?;
        if let Some(limit) = limit {
            report.records.truncate(limit);
        }

        self.ingest_records(report.records, report.skipped).await
    }

    /// 파싱된 레코드 저장 + 색인
    async fn ingest_records(
        &self,
        records: Vec<NewCatalogRecord>,
        skipped: usize,
    ) -> Result<IngestReport> {
        let parsed = records.len();
        if records.is_empty() {
            tracing::warn!("No records to ingest");
            return Ok(IngestReport {
                parsed: 0,
                skipped,
                stored: 0,
                indexed: 0,
            });
        }

        let ids = self.catalog.add_records(&records)?;
        tracing::info!("Stored {} records in catalog", ids.len());

        let stored = self.catalog.get_records(&ids)?;
        let mut indexed = 0;

        for chunk in stored.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(|r| r.search_text()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .context("Batch embedding failed")?;

            let entries: Vec<IndexEntry> = chunk
                .iter()
                .zip(embeddings)
                .zip(texts)
                .map(|((record, embedding), search_text)| IndexEntry {
                    record_id: record.id,
                    search_text,
                    embedding,
                })
                .collect();

            indexed += self.index.insert_batch(&entries).await?;
            tracing::info!("Indexed {}/{} records", indexed, stored.len());
        }

        Ok(IngestReport {
            parsed,
            skipped,
            stored: ids.len(),
            indexed,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
