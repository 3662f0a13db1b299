//! 카탈로그 레코드 - 공공데이터 포털 데이터셋 메타데이터
//!
//! 포털 목록개방현황 CSV의 한 행이 하나의 레코드가 됩니다.
//! 인제스트 이후에는 불변이며, 수정이 필요하면 재색인해야 합니다.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 날짜 센티널 - 수정일이 없거나 파싱 불가한 레코드는 항상 뒤로 정렬됩니다.
pub const DATE_SENTINEL: NaiveDate = NaiveDate::MIN;

// ============================================================================
// Types
// ============================================================================

/// 데이터셋 카탈로그 레코드
///
/// 텍스트 필드는 모두 생략 가능하며, 없으면 빈 문자열로 저장합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// 레코드 ID (datasets.id)
    pub id: i64,
    /// 목록명
    pub title: String,
    /// 설명
    pub description: String,
    /// 키워드
    pub keywords: String,
    /// 제공기관
    pub provider: String,
    /// 분류체계
    pub category: String,
    /// 제공형태/확장자
    pub format: String,
    /// 수정일 (파싱 실패 시 센티널)
    pub updated_at: NaiveDate,
    /// 포털 상세 페이지 URL
    pub url: String,
}

/// 새 레코드 입력용 구조체 (ID는 저장 시 부여)
#[derive(Debug, Clone, Default)]
pub struct NewCatalogRecord {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub provider: String,
    pub category: String,
    pub format: String,
    /// 수정일 원문 (예: "2025-09-02", "20250902", "2025.09.02")
    pub updated_raw: String,
    pub url: String,
}

impl CatalogRecord {
    /// 임베딩/폴백 검색용 텍스트 프로젝션
    ///
    /// 설명이 있으면 설명을 본문으로, 없으면 "목록명 키워드"를 사용하고
    /// 나머지 메타데이터 필드를 뒤에 붙입니다.
    pub fn search_text(&self) -> String {
        let body = if self.description.trim().is_empty() {
            format!("{} {}", self.title, self.keywords)
        } else {
            self.description.clone()
        };

        let mut text = body.trim().to_string();
        for field in [
            &self.title,
            &self.keywords,
            &self.provider,
            &self.category,
            &self.format,
        ] {
            let field = field.trim();
            if !field.is_empty() && !text.contains(field) {
                text.push(' ');
                text.push_str(field);
            }
        }
        text
    }

    /// 수정일 표시 문자열 (센티널은 "N/A")
    pub fn updated_display(&self) -> String {
        if self.updated_at == DATE_SENTINEL {
            "N/A".to_string()
        } else {
            self.updated_at.format("%Y-%m-%d").to_string()
        }
    }
}

// ============================================================================
// Date Parsing
// ============================================================================

/// 수정일 파싱
///
/// 포털 CSV에 섞여 있는 세 가지 형식을 순서대로 시도합니다:
/// `YYYY-MM-DD`, `YYYYMMDD`, `YYYY.MM.DD`
///
/// 전부 실패하거나 비어 있으면 센티널을 반환해 최신순 정렬에서
/// 마지막으로 밀립니다.
pub fn parse_update_date(raw: &str) -> NaiveDate {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "N/A" {
        return DATE_SENTINEL;
    }

    for fmt in ["%Y-%m-%d", "%Y%m%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date;
        }
    }

    DATE_SENTINEL
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(description: &str, title: &str, keywords: &str) -> CatalogRecord {
        CatalogRecord {
            id: 1,
            title: title.to_string(),
            description: description.to_string(),
            keywords: keywords.to_string(),
            provider: "해양환경공단".to_string(),
            category: "환경".to_string(),
            format: "CSV".to_string(),
            updated_at: parse_update_date("2025-09-02"),
            url: "https://www.data.go.kr/data/15002978".to_string(),
        }
    }

    #[test]
    fn test_parse_update_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap();
        assert_eq!(parse_update_date("2025-09-02"), expected);
        assert_eq!(parse_update_date("20250902"), expected);
        assert_eq!(parse_update_date("2025.09.02"), expected);
        assert_eq!(parse_update_date(" 2025-09-02 "), expected);
    }

    #[test]
    fn test_parse_update_date_sentinel() {
        assert_eq!(parse_update_date(""), DATE_SENTINEL);
        assert_eq!(parse_update_date("N/A"), DATE_SENTINEL);
        assert_eq!(parse_update_date("unknown"), DATE_SENTINEL);
        assert_eq!(parse_update_date("2025/09/02"), DATE_SENTINEL);
    }

    #[test]
    fn test_sentinel_sorts_last() {
        let known = parse_update_date("1990-01-01");
        assert!(known > DATE_SENTINEL);
    }

    #[test]
    fn test_search_text_prefers_description() {
        let record = record_with("해양 환경 측정 정보", "해양환경정보", "해양,환경");
        let text = record.search_text();
        assert!(text.starts_with("해양 환경 측정 정보"));
        assert!(text.contains("해양환경공단"));
    }

    #[test]
    fn test_search_text_falls_back_to_title_keywords() {
        let record = record_with("", "해양환경정보", "해양,환경");
        let text = record.search_text();
        assert!(text.starts_with("해양환경정보 해양,환경"));
    }

    #[test]
    fn test_updated_display() {
        let record = record_with("설명", "제목", "");
        assert_eq!(record.updated_display(), "2025-09-02");

        let mut missing = record.clone();
        missing.updated_at = DATE_SENTINEL;
        assert_eq!(missing.updated_display(), "N/A");
    }
}
