//! Vector Store - 벡터 레코드 타입, 저장소 트레이트, 유사도 계산
//!
//! 텍스트 인덱스와 이미지 인덱스를 분리해서 관리합니다.
//! 검색은 인덱스 전체를 선형 스캔하는 코사인 유사도 방식입니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 청크 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// 페이지 본문 텍스트 윈도우
    Text,
    /// 표로 감지된 텍스트 블록
    Table,
    /// 수식으로 감지된 줄
    Formula,
    /// 이미지 OCR 텍스트
    ImageText,
    /// 이미지 자체 (캡션 임베딩)
    Image,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Text => "text",
            ChunkType::Table => "table",
            ChunkType::Formula => "formula",
            ChunkType::ImageText => "image_text",
            ChunkType::Image => "image",
        }
    }
}

/// 벡터 레코드 (저장 단위)
///
/// JSON 인덱스 파일에 그대로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// 원본 PDF 파일명
    pub document_id: String,
    /// 페이지 번호 (1부터 시작)
    pub page_num: usize,
    /// 문서 내 청크 식별자 (예: `page_3_chunk_2`)
    pub chunk_id: String,
    pub chunk_type: ChunkType,
    /// LLM 컨텍스트로 쓰이는 텍스트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// 이미지 OCR 결과
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    /// 텍스트 계열 레코드 생성
    pub fn text(
        document_id: &str,
        page_num: usize,
        chunk_id: String,
        chunk_type: ChunkType,
        content: String,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            page_num,
            chunk_id,
            chunk_type,
            content: Some(content),
            width: None,
            height: None,
            extracted_text: None,
            embedding,
        }
    }

    /// 임베딩을 제거한 사본 (검색 결과용)
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: Vec::new(),
            ..self.clone()
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 매칭된 레코드 (임베딩 제외)
    pub record: VectorRecord,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 텍스트/이미지 두 인덱스를 가진 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 텍스트 인덱스에 추가
    async fn add_text_vectors(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// 이미지 인덱스에 추가
    async fn add_image_vectors(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// 텍스트 인덱스 검색
    async fn search_text(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// 이미지 인덱스 검색
    async fn search_images(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// 문서의 모든 벡터 삭제 (두 인덱스 모두)
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    async fn text_count(&self) -> usize;

    async fn image_count(&self) -> usize;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 누적은 f64로 합니다. 길이가 다르거나 비어있거나 노름이 0이면 0.0,
/// 결과가 유한하지 않으면 (NaN/inf 성분) 역시 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a.sqrt() * norm_b.sqrt());
    // -0.0은 0.0으로 정규화
    if !similarity.is_finite() || similarity == 0.0 {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0) as f32
}

/// 선형 스캔 top-k
///
/// 모든 레코드와 유사도를 계산하고 내림차순으로 정렬합니다.
/// 정렬은 stable이라 동점이면 삽입 순서를 유지합니다.
/// 쿼리와 차원이 다른 레코드는 건너뜁니다.
pub fn rank_top_k(records: &[VectorRecord], query: &[f32], top_k: usize) -> Vec<SearchResult> {
    if records.is_empty() || top_k == 0 || query.is_empty() {
        return vec![];
    }

    let mut skipped = 0usize;
    let mut scored: Vec<(usize, f32)> = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        if record.embedding.len() != query.len() {
            skipped += 1;
            continue;
        }
        scored.push((idx, cosine_similarity(query, &record.embedding)));
    }

    if skipped > 0 {
        tracing::warn!(
            "Skipped {} vectors with mismatched dimension (query dim = {})",
            skipped,
            query.len()
        );
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(idx, similarity)| SearchResult {
            record: records[idx].without_embedding(),
            similarity,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chunk_id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord::text(
            "manual.pdf",
            1,
            chunk_id.to_string(),
            ChunkType::Text,
            format!("content of {}", chunk_id),
            embedding,
        )
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_and_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.0001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_large_components() {
        let a = vec![1e20, 1e20];
        let b = vec![2e20, 2e20];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rank_top_k_with_non_finite_vectors() {
        let records = vec![
            record("nan", vec![f32::NAN, 0.0]),
            record("huge", vec![1e30, 0.0]),
            record("opposite", vec![-1.0, 0.0]),
        ];

        let results = rank_top_k(&records, &[1.0, 0.0], 3);
        let ids: Vec<&str> = results.iter().map(|r| r.record.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["huge", "nan", "opposite"]);
        assert!(results.iter().all(|r| r.similarity.is_finite()));
    }

    #[test]
    fn test_rank_top_k_orders_by_similarity() {
        let records = vec![
            record("far", vec![0.0, 1.0]),
            record("exact", vec![1.0, 0.0]),
            record("close", vec![0.9, 0.1]),
        ];

        let results = rank_top_k(&records, &[1.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.chunk_id, "exact");
        assert_eq!(results[1].record.chunk_id, "close");
        assert!(results[0].similarity >= results[1].similarity);
        assert!(results[0].record.embedding.is_empty());
    }

    #[test]
    fn test_rank_top_k_ties_keep_insertion_order() {
        let records = vec![
            record("first", vec![2.0, 0.0]),
            record("second", vec![1.0, 0.0]),
            record("third", vec![3.0, 0.0]),
        ];

        let results = rank_top_k(&records, &[1.0, 0.0], 3);
        let ids: Vec<&str> = results.iter().map(|r| r.record.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rank_top_k_edge_cases() {
        let records = vec![record("a", vec![1.0, 0.0])];
        assert!(rank_top_k(&[], &[1.0, 0.0], 5).is_empty());
        assert!(rank_top_k(&records, &[1.0, 0.0], 0).is_empty());
        assert_eq!(rank_top_k(&records, &[1.0, 0.0], 10).len(), 1);
    }

    #[test]
    fn test_rank_top_k_skips_mismatched_dimension() {
        let records = vec![
            record("short", vec![1.0]),
            record("ok", vec![1.0, 0.0]),
        ];
        let results = rank_top_k(&records, &[1.0, 0.0], 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.chunk_id, "ok");
    }

    #[test]
    fn test_chunk_type_serialization() {
        let json = serde_json::to_string(&ChunkType::ImageText).unwrap();
        assert_eq!(json, "\"image_text\"");
        assert_eq!(ChunkType::Formula.as_str(), "formula");
    }

    #[test]
    fn test_record_json_omits_empty_optionals() {
        let json = serde_json::to_value(record("x", vec![0.5])).unwrap();
        assert!(json.get("width").is_none());
        assert_eq!(json["chunk_type"], "text");
        assert_eq!(json["page_num"], 1);
    }
}
