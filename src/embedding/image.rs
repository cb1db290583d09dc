//! 이미지 임베딩
//!
//! Vision 모델로 이미지 캡션을 만든 뒤 텍스트 임베딩으로 변환합니다.
//! 이미지 벡터가 텍스트 벡터와 같은 공간에 놓여서 두 인덱스 결과를 같은 척도로 비교할 수 있습니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::ingestion::VisionClient;

/// 이미지 임베딩 결과
#[derive(Debug, Clone)]
pub struct ImageEmbedding {
    /// 임베딩 근거가 된 캡션
    pub caption: String,
    pub vector: Vec<f32>,
}

/// 이미지 임베딩 트레이트
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed_image(&self, image: &[u8], mime_type: &str) -> Result<ImageEmbedding>;
}

/// 캡션 기반 이미지 임베더
pub struct CaptionImageEmbedder {
    vision: VisionClient,
    text: Arc<dyn EmbeddingProvider>,
}

impl CaptionImageEmbedder {
    pub fn new(vision: VisionClient, text: Arc<dyn EmbeddingProvider>) -> Self {
        Self { vision, text }
    }
}

#[async_trait]
impl ImageEmbedder for CaptionImageEmbedder {
    async fn embed_image(&self, image: &[u8], mime_type: &str) -> Result<ImageEmbedding> {
        let caption = self
            .vision
            .describe(image, mime_type)
            .await
            .context("Failed to caption image")?;

        if caption.is_empty() {
            anyhow::bail!("Vision model returned an empty caption");
        }

        let vector = self
            .text
            .embed(&caption)
            .await
            .context("Failed to embed image caption")?;

        Ok(ImageEmbedding { caption, vector })
    }
}
