//! History 모듈 - 사용자별 대화 기록과 간단한 로그인
//!
//! 세션 히스토리는 사용자별 append-only 로그입니다.
//! 한 요청의 질문/답변 쌍은 하나의 트랜잭션으로 기록되므로
//! 중간에 중단된 요청은 아무것도 남기지 않습니다.
//! 저장 위치: ~/.dataset-explorer/chat.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use sha2::{Digest, Sha256};

use crate::agent::{ConversationTurn, Role};
use crate::catalog::get_data_dir;

// ============================================================================
// Types
// ============================================================================

/// 로그인 결과
///
/// 원형과 동일하게, 모르는 사용자는 첫 로그인에서 등록됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// 기존 사용자 - 비밀번호 일치
    Accepted,
    /// 신규 사용자 - 계정 생성 후 수락
    Created,
    /// 기존 사용자 - 비밀번호 불일치
    Rejected,
}

// ============================================================================
// ChatHistoryStore
// ============================================================================

/// 대화 기록 저장소
///
/// 쓰기는 커넥션 뮤텍스로 직렬화됩니다.
#[derive(Clone)]
pub struct ChatHistoryStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl ChatHistoryStore {
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

    /// 기본 위치에서 열기 (~/.dataset-explorer/chat.db)
    pub fn open_default() -> Result<Self> {
        let data_dir = get_data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .context("Failed to create data directory")?;
        }
        Self::open(&data_dir.join("chat.db"))
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_history_user
                ON chat_history(username, id);",
        )
        .context("Failed to create history tables")?;

        tracing::debug!("Chat history store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 로그인 (없는 사용자는 등록)
    pub fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let hash = hash_password(password);

        let stored: Option<String> = conn
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .ok();

        match stored {
            Some(existing) if existing == hash => Ok(LoginOutcome::Accepted),
            Some(_) => Ok(LoginOutcome::Rejected),
            None => {
                conn.execute(
                    "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
                    params![username, hash],
                )
                .context("Failed to register user")?;

                tracing::info!("Registered new user: {}", username);
                Ok(LoginOutcome::Created)
            }
        }
    }

    /// 질문/답변 쌍을 하나의 트랜잭션으로 기록
    ///
    /// 요청이 중간에 중단되면 어느 쪽 턴도 남지 않습니다.
    pub fn append_exchange(&self, username: &str, question: &str, answer: &str) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let tx = conn.transaction().context("Failed to begin transaction")?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO chat_history (username, role, content, created_at)
             VALUES (?1, 'user', ?2, ?3)",
            params![username, question, now],
        )
        .context("Failed to append user turn")?;

        tx.execute(
            "INSERT INTO chat_history (username, role, content, created_at)
             VALUES (?1, 'assistant', ?2, ?3)",
            params![username, answer, now],
        )
        .context("Failed to append assistant turn")?;

        tx.commit().context("Failed to commit exchange")?;
        Ok(())
    }

    /// 사용자 히스토리 로드 (시간순)
    pub fn load_history(&self, username: &str) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT role, content FROM chat_history
             WHERE username = ?1 ORDER BY id",
        )?;

        let turns = stmt
            .query_map(params![username], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                Ok(ConversationTurn {
                    role: Role::from_str_lossy(&role),
                    content,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(turns)
    }

    /// 사용자 턴 수
    pub fn turn_count(&self, username: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_history WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 비밀번호 해시 (SHA-256 hex)
fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, ChatHistoryStore) {
        let dir = TempDir::new().unwrap();
        let store = ChatHistoryStore::open(&dir.path().join("chat.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_login_registers_new_user() {
        let (_dir, store) = create_test_store();

        assert_eq!(store.login("admin", "1234").unwrap(), LoginOutcome::Created);
        assert_eq!(store.login("admin", "1234").unwrap(), LoginOutcome::Accepted);
        assert_eq!(store.login("admin", "wrong").unwrap(), LoginOutcome::Rejected);
    }

    #[test]
    fn test_append_and_load_history() {
        let (_dir, store) = create_test_store();

        store
            .append_exchange("admin", "환경 데이터 추천해줘", "해양환경정보를 추천드립니다.")
            .unwrap();
        store.append_exchange("admin", "고마워", "천만에요!").unwrap();

        let history = store.load_history("admin").unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "환경 데이터 추천해줘");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[3].content, "천만에요!");
    }

    #[test]
    fn test_history_is_per_user() {
        let (_dir, store) = create_test_store();

        store.append_exchange("a", "질문 A", "답변 A").unwrap();
        store.append_exchange("b", "질문 B", "답변 B").unwrap();

        assert_eq!(store.turn_count("a").unwrap(), 2);
        assert_eq!(store.load_history("b").unwrap()[0].content, "질문 B");
        assert!(store.load_history("c").unwrap().is_empty());
    }

    #[test]
    fn test_hash_password_is_stable() {
        assert_eq!(hash_password("1234"), hash_password("1234"));
        assert_ne!(hash_password("1234"), hash_password("12345"));
    }
}
