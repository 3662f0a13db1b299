//! 임베딩 모듈 - 카탈로그 검색 텍스트와 사용자 쿼리의 벡터화
//!
//! 색인 경로는 RETRIEVAL_DOCUMENT, 질의 경로는 RETRIEVAL_QUERY 태스크로
//! 임베딩합니다. 두 태스크를 섞으면 유사도 스코어가 왜곡되므로
//! 호출부는 반드시 용도에 맞는 메서드를 써야 합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// Retriever와 인제스트 파이프라인은 이 트레이트에만 의존합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 색인용 임베딩 (레코드 검색 텍스트)
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// 질의용 임베딩 (사용자 질문)
    ///
    /// 태스크 구분이 없는 구현체는 문서 임베딩을 그대로 씁니다.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_document(text).await
    }

    /// 배치 임베딩
    ///
    /// 기본 구현은 순차 호출입니다. API 쿼터가 호출 단위라서
    /// 병렬화해도 얻는 것이 없습니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding {}/{}", i + 1, texts.len());
            vectors.push(self.embed_document(text).await?);
        }
        Ok(vectors)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// gemini-embedding-001 embedContent 엔드포인트
/// ref: https://ai.google.dev/gemini-api/docs/embeddings
const EMBED_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 기본 임베딩 차원 (catalog::EMBEDDING_DIMENSION과 일치해야 함)
pub const DEFAULT_DIMENSION: usize = 768;

/// 모델이 지원하는 출력 차원
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 호출 간 최소 간격 (무료 티어 분당 쿼터 준수)
const MIN_REQUEST_GAP: Duration = Duration::from_millis(1000);
/// 429/네트워크 실패 최대 재시도
const MAX_RETRIES: u32 = 3;
/// 재시도 초기 백오프 (ms), 시도마다 2배
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 임베딩 태스크 타입
/// ref: https://ai.google.dev/gemini-api/docs/embeddings#task-types
#[derive(Debug, Clone, Copy)]
enum EmbedTask {
    Document,
    Query,
}

impl EmbedTask {
    fn as_str(self) -> &'static str {
        match self {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Gemini 임베딩 클라이언트
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    // 호출 간격 유지용. 마지막 요청 시각을 뮤텍스로 공유.
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl GeminiEmbedding {
    /// 기본 차원(768)으로 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 출력 차원을 지정해 생성
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Unsupported embedding dimension {} (supported: {:?})",
                dimension,
                SUPPORTED_DIMENSIONS
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            last_request: Arc::new(Mutex::new(None)),
        })
    }

    /// 환경변수에서 API 키를 읽어 생성 (GEMINI_API_KEY > GOOGLE_AI_API_KEY)
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    /// 직전 호출에서 최소 간격이 지날 때까지 대기
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_GAP {
                tokio::time::sleep(MIN_REQUEST_GAP - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// 단일 API 호출. Ok(None)은 재시도 가치가 있는 실패.
    async fn try_embed(&self, payload: &EmbeddingRequest) -> Result<Option<Vec<f32>>> {
        let response = match self
            .client
            .post(EMBED_ENDPOINT)
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Embedding request failed: {}", e);
                return Ok(None);
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read embedding response body")?;

        if status.is_success() {
            let parsed: EmbeddingResponse =
                serde_json::from_str(&body).context("Failed to parse embedding response")?;
            return Ok(Some(parsed.embedding.values));
        }

        if status.as_u16() == 429 {
            tracing::warn!("Embedding rate limit hit (429)");
            return Ok(None);
        }

        // 재시도 불가 에러 - 서버 메시지가 있으면 그대로 전달
        if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(&body) {
            anyhow::bail!(
                "Gemini API error ({}): {}",
                api_error.error.status,
                api_error.error.message
            );
        }
        anyhow::bail!("Gemini API error ({}): {}", status, body)
    }

    /// 임베딩 본체 (페이싱 + 지수 백오프 재시도)
    async fn embed_with_task(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
        // 빈 텍스트는 호출 없이 영벡터
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let payload = EmbeddingRequest {
            model: "models/gemini-embedding-001".to_string(),
            content: RequestContent {
                parts: vec![RequestPart {
                    text: text.to_string(),
                }],
            },
            task_type: task.as_str().to_string(),
            output_dimensionality: Some(self.dimension),
        };

        for attempt in 0..=MAX_RETRIES {
            self.pace().await;

            if let Some(vector) = self.try_embed(&payload).await? {
                return Ok(vector);
            }

            if attempt < MAX_RETRIES {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "Retrying embedding in {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
            }
        }

        anyhow::bail!("Embedding failed after {} retries", MAX_RETRIES)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, EmbedTask::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, EmbedTask::Query).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    content: RequestContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: EmbeddingVector,
}

#[derive(Debug, Deserialize)]
struct EmbeddingVector {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// API Key
// ============================================================================

/// 환경변수에서 API 키 로드
///
/// `GEMINI_API_KEY`를 먼저 보고, 없으면 `GOOGLE_AI_API_KEY`를 봅니다.
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부
pub fn has_api_key() -> bool {
    ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Tests
// ============================================================================
