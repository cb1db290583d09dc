//! 멀티모달 검색기
//!
//! 쿼리 텍스트와 (선택) 쿼리 이미지를 임베딩해서 텍스트/이미지 인덱스를 검색합니다.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::{RetrievalMode, SearchResult, VectorStore};
use crate::embedding::{EmbeddingProvider, ImageEmbedder};
use crate::ingestion::mime_type_for_path;

/// 이미지 쿼리 입력
#[derive(Debug, Clone)]
pub struct QueryImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl QueryImage {
    /// 파일에서 로드 (확장자로 MIME 결정)
    pub async fn from_path(path: &Path) -> Result<Self> {
        let mime_type = mime_type_for_path(path)?.to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read query image: {:?}", path))?;
        Ok(Self { bytes, mime_type })
    }
}

/// 멀티모달 검색기
pub struct MultimodalRetriever {
    store: Arc<dyn VectorStore>,
    text: Arc<dyn EmbeddingProvider>,
    image: Option<Arc<dyn ImageEmbedder>>,
}

impl MultimodalRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        text: Arc<dyn EmbeddingProvider>,
        image: Option<Arc<dyn ImageEmbedder>>,
    ) -> Self {
        Self { store, text, image }
    }

    /// 모드에 따라 검색
    ///
    /// 텍스트 임베딩 실패는 에러, 이미지 임베딩 실패는 로그만 남기고 건너뜁니다.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        mode: RetrievalMode,
        image: Option<&QueryImage>,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(vec![]);
        }

        let mut results = Vec::new();

        if mode.searches_text() {
            let embedding = self
                .text
                .embed_query(query)
                .await
                .context("Failed to embed query text")?;
            results.extend(self.store.search_text(&embedding, top_k).await?);
        }

        if mode.searches_images() {
            if let Some(hits) = self.search_by_image(image, top_k).await? {
                results.extend(hits);
            }
        }

        // stable sort: 동점이면 텍스트 결과가 먼저
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);

        tracing::debug!("Retrieved {} results (mode = {})", results.len(), mode);
        Ok(results)
    }

    async fn search_by_image(
        &self,
        image: Option<&QueryImage>,
        top_k: usize,
    ) -> Result<Option<Vec<SearchResult>>> {
        let (Some(embedder), Some(image)) = (self.image.as_ref(), image) else {
            tracing::debug!("Image search skipped (no image embedder or query image)");
            return Ok(None);
        };

        let embedded = match embedder.embed_image(&image.bytes, &image.mime_type).await {
            Ok(embedded) => embedded,
            Err(e) => {
                tracing::warn!("Error generating query image embedding: {}", e);
                return Ok(None);
            }
        };

        let hits = self.store.search_images(&embedded.vector, top_k).await?;
        Ok(Some(hits))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::ImageEmbedding;
    use crate::retrieval::{ChunkType, FlatVectorStore, VectorRecord};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 쿼리 문자열과 무관하게 고정 벡터를 돌려주는 임베더
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
        fn dimension(&self) -> usize {
            self.0.len()
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FixedImageEmbedder {
        vector: Option<Vec<f32>>,
    }

    #[async_trait]
    impl ImageEmbedder for FixedImageEmbedder {
        async fn embed_image(&self, _image: &[u8], _mime: &str) -> Result<ImageEmbedding> {
            match &self.vector {
                Some(v) => Ok(ImageEmbedding {
                    caption: "query image".to_string(),
                    vector: v.clone(),
                }),
                None => anyhow::bail!("vision offline"),
            }
        }
    }

    fn record(id: &str, chunk_type: ChunkType, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord::text(
            "manual.pdf",
            1,
            id.to_string(),
            chunk_type,
            format!("content of {}", id),
            embedding,
        )
    }

    async fn seeded_store(dir: &TempDir) -> Arc<dyn VectorStore> {
        let store = FlatVectorStore::open(dir.path()).await.unwrap();
        store
            .add_text_vectors(vec![
                record("page_1_chunk_1", ChunkType::Text, vec![1.0, 0.0]),
                record("page_1_chunk_2", ChunkType::Text, vec![0.6, 0.8]),
            ])
            .await
            .unwrap();
        store
            .add_image_vectors(vec![
                record("page_1_img_1", ChunkType::Image, vec![0.8, 0.6]),
                record("page_2_img_1", ChunkType::Image, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        Arc::new(store)
    }

    fn query_image() -> QueryImage {
        QueryImage {
            bytes: vec![0xFF, 0xD8, 0xFF],
            mime_type: "image/jpeg".to_string(),
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.record.chunk_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_text_mode_ignores_image_index() {
        let dir = TempDir::new().unwrap();
        let retriever = MultimodalRetriever::new(
            seeded_store(&dir).await,
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            Some(Arc::new(FixedImageEmbedder {
                vector: Some(vec![1.0, 0.0]),
            })),
        );

        let results = retriever
            .retrieve("wing spar", 5, RetrievalMode::Text, Some(&query_image()))
            .await
            .unwrap();

        assert_eq!(ids(&results), vec!["page_1_chunk_1", "page_1_chunk_2"]);
    }

    #[tokio::test]
    async fn test_hybrid_merges_and_truncates() {
        let dir = TempDir::new().unwrap();
        let retriever = MultimodalRetriever::new(
            seeded_store(&dir).await,
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            Some(Arc::new(FixedImageEmbedder {
                vector: Some(vec![1.0, 0.0]),
            })),
        );

        let results = retriever
            .retrieve("nacelle", 3, RetrievalMode::Hybrid, Some(&query_image()))
            .await
            .unwrap();

        // 1.0 (text), 0.8 (image), 0.6 (text)
        assert_eq!(
            ids(&results),
            vec!["page_1_chunk_1", "page_1_img_1", "page_1_chunk_2"]
        );
        assert!(results[0].similarity >= results[1].similarity);
        assert!(results.iter().all(|r| r.record.embedding.is_empty()));
    }

    #[tokio::test]
    async fn test_image_mode_without_image_returns_empty() {
        let dir = TempDir::new().unwrap();
        let retriever = MultimodalRetriever::new(
            seeded_store(&dir).await,
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            Some(Arc::new(FixedImageEmbedder {
                vector: Some(vec![1.0, 0.0]),
            })),
        );

        let results = retriever
            .retrieve("fuselage", 5, RetrievalMode::Image, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_image_embedding_failure_falls_back_to_text() {
        let dir = TempDir::new().unwrap();
        let retriever = MultimodalRetriever::new(
            seeded_store(&dir).await,
            Arc::new(FixedEmbedder(vec![0.0, 1.0])),
            Some(Arc::new(FixedImageEmbedder { vector: None })),
        );

        let results = retriever
            .retrieve("rudder", 5, RetrievalMode::Hybrid, Some(&query_image()))
            .await
            .unwrap();

        assert_eq!(ids(&results), vec!["page_1_chunk_2", "page_1_chunk_1"]);
    }

    #[tokio::test]
    async fn test_zero_top_k() {
        let dir = TempDir::new().unwrap();
        let retriever = MultimodalRetriever::new(
            seeded_store(&dir).await,
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            None,
        );

        let results = retriever
            .retrieve("anything", 0, RetrievalMode::Hybrid, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
