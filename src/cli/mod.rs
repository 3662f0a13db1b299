//! CLI 모듈
//!
//! dataset-explorer CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::agent::{
    AnswerSynthesizer, ConversationTurn, DatasetRetriever, IntentRouter, Orchestrator, Provenance,
    RetrievalOutcome,
};
use crate::catalog::{get_data_dir, CatalogStore, LanceCatalogIndex, VectorStore};
use crate::embedding::{has_api_key, GeminiEmbedding};
use crate::history::ChatHistoryStore;
use crate::ingest::IngestPipeline;
use crate::llm::GeminiChat;
use crate::server::{self, AppState};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "dataset-explorer")]
#[command(version, about = "공공데이터 포털 데이터셋 추천 챗봇", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 포털 목록개방현황 CSV를 카탈로그에 적재
    Ingest {
        /// CSV 파일 경로
        csv: PathBuf,

        /// 적재할 최대 행 수 (미리보기용)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// 질문 하나를 처리하고 답변 출력
    Ask {
        /// 질문
        question: String,

        /// 대화 기록에 사용할 사용자 이름
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// 카탈로그 검색 (답변 합성 없이 결과만)
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// HTTP 서버 시작
    Serve {
        /// 바인드 주소
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// 포트
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// 저장된 데이터셋 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest { csv, limit } => cmd_ingest(&csv, limit).await,
        Commands::Ask { question, user } => cmd_ask(&question, &user).await,
        Commands::Search { query, limit } => cmd_search(&query, limit).await,
        Commands::Serve { host, port } => cmd_serve(&host, port).await,
        Commands::List { limit } => cmd_list(limit).await,
        Commands::Status => cmd_status().await,
    }
}

// ============================================================================
// Composition Root
// ============================================================================

/// 카탈로그 + 색인 + 임베더 묶음 생성
async fn build_retriever() -> Result<(CatalogStore, DatasetRetriever)> {
    let catalog = CatalogStore::open_default().context("카탈로그 열기 실패")?;
    let index = LanceCatalogIndex::open(&get_data_dir().join("catalog.lance"))
        .await
        .context("벡터 색인 열기 실패")?;
    let embedder = GeminiEmbedding::from_env().context("임베딩 클라이언트 생성 실패")?;

    let retriever =
        DatasetRetriever::new(catalog.clone(), Arc::new(index), Arc::new(embedder));
    Ok((catalog, retriever))
}

/// 전체 에이전트 조립
async fn build_orchestrator() -> Result<Orchestrator> {
    let (_catalog, retriever) = build_retriever().await?;
    let llm = GeminiChat::from_env().context("LLM 클라이언트 생성 실패")?;

    Ok(Orchestrator::new(
        IntentRouter::default(),
        retriever,
        AnswerSynthesizer::new(Arc::new(llm)),
    ))
}

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "Gemini API 키가 필요합니다.\n\
             export GEMINI_API_KEY=... (또는 GOOGLE_AI_API_KEY=...)\n\
             발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인제스트 명령어 (ingest)
///
/// 포털 CSV를 파싱하여 SQLite 카탈로그에 저장하고 임베딩을 색인합니다.
async fn cmd_ingest(csv: &PathBuf, limit: Option<usize>) -> Result<()> {
    require_api_key()?;

    if !csv.exists() {
        bail!("CSV 파일을 찾을 수 없습니다: {:?}", csv);
    }

    println!("[*] CSV 적재 중: {:?}", csv);

    let catalog = CatalogStore::open_default().context("카탈로그 열기 실패")?;
    let index = LanceCatalogIndex::open(&get_data_dir().join("catalog.lance"))
        .await
        .context("벡터 색인 열기 실패")?;
    let embedder = GeminiEmbedding::from_env().context("임베딩 클라이언트 생성 실패")?;

    let pipeline = IngestPipeline::new(catalog, Arc::new(index), Arc::new(embedder));
    let report = pipeline.ingest_file(csv, limit).await.context("인제스트 실패")?;

    println!("[OK] 적재 완료");
    println!("     파싱: {} 행 (건너뜀: {})", report.parsed, report.skipped);
    println!("     저장: {} 건, 색인: {} 건", report.stored, report.indexed);

    Ok(())
}

/// 질문 명령어 (ask)
///
/// 라우팅 -> 검색 -> 합성 전체 파이프라인을 한 번 실행합니다.
async fn cmd_ask(question: &str, user: &str) -> Result<()> {
    require_api_key()?;

    let question = question.trim();
    if question.is_empty() {
        bail!("질문을 입력해주세요");
    }

    let orchestrator = build_orchestrator().await?;
    let history_store = ChatHistoryStore::open_default().context("히스토리 열기 실패")?;

    let mut history = history_store
        .load_history(user)
        .context("히스토리 로드 실패")?;
    history.push(ConversationTurn::user(question));

    println!("[*] 질문 처리 중...\n");

    let turn = orchestrator.run(&history).await;

    let provenance = match turn.provenance {
        Provenance::Retrieval => "검색 기반",
        Provenance::GeneralKnowledge => "일반 지식",
    };
    println!("{}", turn.content);
    println!("\n[{}]", provenance);

    history_store
        .append_exchange(user, question, &turn.content)
        .context("대화 기록 저장 실패")?;

    Ok(())
}

/// 검색 명령어 (search)
///
/// 답변 합성 없이 검색 결과만 출력합니다.
async fn cmd_search(query: &str, limit: usize) -> Result<()> {
    require_api_key()?;

    println!("[*] 검색 중: \"{}\"", query);

    let (_catalog, retriever) = build_retriever().await?;
    let outcome = retriever.retrieve(query, limit).await;

    let method = match &outcome {
        RetrievalOutcome::Hits(_) => "벡터",
        RetrievalOutcome::Fallback(_) => "키워드 폴백",
        RetrievalOutcome::NoResults => {
            println!("\n[!] 검색 결과가 없습니다.");
            return Ok(());
        }
    };

    let records = outcome.records();
    println!("\n[OK] 검색 결과 ({} 건, {}):\n", records.len(), method);

    for (i, record) in records.iter().enumerate() {
        println!("{}. {}", i + 1, record.title);
        if !record.description.is_empty() {
            println!("   설명: {}", truncate_text(&record.description, 200));
        }
        println!("   제공기관: {}", display_or_dash(&record.provider));
        println!("   분류: {}", display_or_dash(&record.category));
        println!("   수정일: {}", record.updated_display());
        println!("   URL: {}", record.url);
        println!();
    }

    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(host: &str, port: u16) -> Result<()> {
    require_api_key()?;

    let orchestrator = build_orchestrator().await?;
    let history = ChatHistoryStore::open_default().context("히스토리 열기 실패")?;

    println!("[*] 서버 시작: http://{}:{}", host, port);

    server::serve(
        AppState {
            orchestrator: Arc::new(orchestrator),
            history: Arc::new(history),
        },
        host,
        port,
    )
    .await
}

/// 목록 명령어 (list)
async fn cmd_list(limit: usize) -> Result<()> {
    let store = CatalogStore::open_default().context("카탈로그 열기 실패")?;

    let records = store.list_records(limit).context("목록 조회 실패")?;

    if records.is_empty() {
        println!("[!] 저장된 데이터셋이 없습니다.");
        println!("    먼저 `dataset-explorer ingest <CSV>`로 카탈로그를 적재하세요.");
        return Ok(());
    }

    println!("[OK] 저장된 데이터셋 ({} 건):\n", records.len());

    for record in records {
        println!("  #{:<5} {}", record.id, truncate_text(&record.title, 50));
        println!(
            "         {} | {} | 수정일: {}",
            display_or_dash(&record.provider),
            display_or_dash(&record.category),
            record.updated_display()
        );
        println!("         URL: {}", record.url);
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("dataset-explorer v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match CatalogStore::open_default() {
        Ok(store) => match store.stats() {
            Ok(stats) => {
                println!("[OK] 카탈로그: {} 건", stats.record_count);
            }
            Err(e) => {
                println!("[!] 카탈로그 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            println!("[!] 카탈로그 열기 실패: {}", e);
        }
    }

    match LanceCatalogIndex::open(&data_dir.join("catalog.lance")).await {
        Ok(index) => match index.count().await {
            Ok(count) => {
                println!("[OK] 벡터 색인: {} 건", count);
            }
            Err(e) => {
                tracing::debug!("벡터 색인 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            tracing::debug!("벡터 색인 열기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 한 줄 미리보기 (문자 단위 절단, 멀티바이트 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut chars = flat.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// 빈 필드는 대시로 표시
fn display_or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

// ============================================================================
// Tests
// ============================================================================
