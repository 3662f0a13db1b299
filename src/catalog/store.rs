//! Catalog Store - rusqlite 기반 데이터셋 카탈로그 저장소
//!
//! 포털에서 인제스트한 데이터셋 레코드를 저장하고,
//! 색인 장애 시 폴백으로 쓰는 LIKE 키워드 검색을 제공합니다.
//! 저장 위치: ~/.dataset-explorer/catalog.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::Serialize;

use super::record::{parse_update_date, CatalogRecord, NewCatalogRecord, DATE_SENTINEL};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.dataset-explorer/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dataset-explorer")
}

// ============================================================================
// Types
// ============================================================================

/// 카탈로그 통계
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub record_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// CatalogStore
// ============================================================================

/// 카탈로그 저장소
///
/// SQLite 기반 레코드 저장소입니다. 색인과 마찬가지로 append-only이며,
/// 질의 시점에는 읽기 전용으로만 접근합니다.
#[derive(Clone)]
pub struct CatalogStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl CatalogStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기본 위치에서 열기 (~/.dataset-explorer/catalog.db)
    pub fn open_default() -> Result<Self> {
        let data_dir = get_data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .context("Failed to create data directory")?;
        }
        Self::open(&data_dir.join("catalog.db"))
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS datasets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                keywords TEXT NOT NULL DEFAULT '',
                provider TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                format TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT ''
            )",
            [],
        )
        .context("Failed to create datasets table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_datasets_updated ON datasets(updated_at)",
            [],
        )
        .context("Failed to create updated_at index")?;

        tracing::debug!("Catalog store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 레코드 배치 추가 (append-only)
    ///
    /// # Returns
    /// 부여된 레코드 ID 목록 (입력 순서와 동일)
    pub fn add_records(&self, records: &[NewCatalogRecord]) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let tx = conn.transaction().context("Failed to begin transaction")?;
        let mut ids = Vec::with_capacity(records.len());

        {
            let mut stmt = tx.prepare(
                "INSERT INTO datasets
                 (title, description, keywords, provider, category, format, updated_at, url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for record in records {
                // 파싱 실패 시 빈 문자열 저장 -> 조회 시 센티널로 복원
                let updated = match parse_update_date(&record.updated_raw) {
                    d if d == DATE_SENTINEL => String::new(),
                    d => d.format("%Y-%m-%d").to_string(),
                };

                stmt.execute(params![
                    record.title,
                    record.description,
                    record.keywords,
                    record.provider,
                    record.category,
                    record.format,
                    updated,
                    record.url,
                ])
                .context("Failed to insert dataset record")?;

                ids.push(tx.last_insert_rowid());
            }
        }

        tx.commit().context("Failed to commit record batch")?;
        tracing::info!("Added {} catalog records", ids.len());

        Ok(ids)
    }

    /// ID로 레코드 조회
    pub fn get_record(&self, id: i64) -> Result<Option<CatalogRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_RECORD))?;
        let record = stmt.query_row(params![id], row_to_record).ok();

        Ok(record)
    }

    /// ID 목록으로 레코드 조회 (입력 순서 유지, 없는 ID는 건너뜀)
    pub fn get_records(&self, ids: &[i64]) -> Result<Vec<CatalogRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(record) = self.get_record(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// 레코드 목록 조회 (카탈로그 순)
    pub fn list_records(&self, limit: usize) -> Result<Vec<CatalogRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(&format!("{} ORDER BY id LIMIT ?1", SELECT_RECORD))?;

        let records = stmt
            .query_map(params![limit as i64], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// 키워드 폴백 검색
    ///
    /// 색인이 불가할 때 쓰는 대소문자 무시 부분 문자열 검색입니다.
    /// 검색 가능한 필드를 이어 붙인 텍스트에서 쿼리를 찾고,
    /// 카탈로그 순서(id 오름차순)로 최대 limit개를 반환합니다.
    pub fn search_like(&self, query: &str, limit: usize) -> Result<Vec<CatalogRecord>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let pattern = format!("%{}%", trimmed.to_lowercase());

        let mut stmt = conn.prepare(&format!(
            "{} WHERE LOWER(title || ' ' || description || ' ' || keywords || ' ' ||
                            provider || ' ' || category || ' ' || format) LIKE ?1
             ORDER BY id LIMIT ?2",
            SELECT_RECORD
        ))?;

        let records = stmt
            .query_map(params![pattern, limit as i64], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM datasets", [], |row| row.get(0))
            .unwrap_or(0);

        Ok(CatalogStats {
            record_count: count as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const SELECT_RECORD: &str =
    "SELECT id, title, description, keywords, provider, category, format, updated_at, url
     FROM datasets";

/// SQL 행을 CatalogRecord로 변환
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CatalogRecord> {
    let updated: String = row.get(7)?;
    Ok(CatalogRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: row.get(3)?,
        provider: row.get(4)?,
        category: row.get(5)?,
        format: row.get(6)?,
        updated_at: parse_update_date(&updated),
        url: row.get(8)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
