//! Retrieval 모듈 - 벡터 저장소와 멀티모달 검색
//!
//! - vector: 레코드 타입, `VectorStore` 트레이트, 코사인 유사도
//! - flat: JSON 파일 기반 선형 스캔 저장소
//! - retriever: 텍스트/이미지/하이브리드 모드 검색
//! - registry: SQLite 문서 레지스트리

mod flat;
mod registry;
mod retriever;
mod vector;

use serde::{Deserialize, Serialize};

pub use flat::FlatVectorStore;
pub use registry::{DocumentRecord, DocumentRegistry, NewDocumentRecord, RegistryStats};
pub use retriever::{MultimodalRetriever, QueryImage};
pub use vector::{
    cosine_similarity, rank_top_k, ChunkType, SearchResult, VectorRecord, VectorStore,
};

/// 검색 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// 텍스트 인덱스만
    #[default]
    Text,
    /// 이미지 인덱스만
    Image,
    /// 두 인덱스를 합쳐서 정렬
    Hybrid,
}

impl RetrievalMode {
    pub fn searches_text(&self) -> bool {
        matches!(self, RetrievalMode::Text | RetrievalMode::Hybrid)
    }

    pub fn searches_images(&self) -> bool {
        matches!(self, RetrievalMode::Image | RetrievalMode::Hybrid)
    }
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RetrievalMode::Text => "text",
            RetrievalMode::Image => "image",
            RetrievalMode::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags() {
        assert!(RetrievalMode::Text.searches_text());
        assert!(!RetrievalMode::Text.searches_images());
        assert!(RetrievalMode::Hybrid.searches_text());
        assert!(RetrievalMode::Hybrid.searches_images());
        assert!(!RetrievalMode::Image.searches_text());
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let json = serde_json::to_string(&RetrievalMode::Hybrid).unwrap();
        assert_eq!(json, "\"hybrid\"");
        let mode: RetrievalMode = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(mode, RetrievalMode::Image);
        assert_eq!(RetrievalMode::default().to_string(), "text");
    }
}
