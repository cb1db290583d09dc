//! 문서 임베딩 파이프라인
//!
//! `ProcessedDocument`를 텍스트 인덱스용 레코드와 이미지 인덱스용 레코드로 변환합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::{Chunker, EmbeddingProvider, ImageEmbedder};
use crate::ingestion::ProcessedDocument;
use crate::retrieval::{ChunkType, VectorRecord};

/// 문서 임베더
pub struct DocumentEmbedder {
    text: Arc<dyn EmbeddingProvider>,
    image: Option<Arc<dyn ImageEmbedder>>,
    chunker: Box<dyn Chunker>,
}

/// 임베딩 대기 중인 텍스트 조각
struct Piece {
    page_num: usize,
    chunk_id: String,
    chunk_type: ChunkType,
    content: String,
}

impl DocumentEmbedder {
    pub fn new(
        text: Arc<dyn EmbeddingProvider>,
        image: Option<Arc<dyn ImageEmbedder>>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self {
            text,
            image,
            chunker,
        }
    }

    /// 텍스트 계열 레코드 생성 (본문 청크, 표, 수식, 이미지 OCR 텍스트)
    ///
    /// 공백뿐인 조각은 건너뛰지만 청크 번호는 그대로 증가합니다.
    pub async fn embed_document(&self, doc: &ProcessedDocument) -> Result<Vec<VectorRecord>> {
        let pieces = self.collect_pieces(doc);
        let document_id = doc.metadata.filename.as_str();

        let mut records = Vec::with_capacity(pieces.len());
        for (i, piece) in pieces.into_iter().enumerate() {
            tracing::debug!("Embedding {} [{}]", piece.chunk_id, i + 1);
            let embedding = self
                .text
                .embed(&piece.content)
                .await
                .with_context(|| format!("Failed to embed {} of {}", piece.chunk_id, document_id))?;

            records.push(VectorRecord::text(
                document_id,
                piece.page_num,
                piece.chunk_id,
                piece.chunk_type,
                piece.content,
                embedding,
            ));
        }

        Ok(records)
    }

    /// 이미지 레코드 생성
    ///
    /// 이미지 임베더가 없으면 빈 결과, 개별 실패는 로그만 남기고 건너뜁니다.
    pub async fn embed_document_images(&self, doc: &ProcessedDocument) -> Vec<VectorRecord> {
        let Some(embedder) = self.image.as_ref() else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for page in &doc.pages {
            for image in &page.images {
                let (Some(bytes), Some(mime)) = (image.bytes.as_ref(), image.mime_type()) else {
                    continue;
                };

                match embedder.embed_image(bytes, mime).await {
                    Ok(embedded) => records.push(VectorRecord {
                        document_id: doc.metadata.filename.clone(),
                        page_num: page.page_num,
                        chunk_id: image.id.clone(),
                        chunk_type: ChunkType::Image,
                        content: Some(embedded.caption),
                        width: Some(image.width),
                        height: Some(image.height),
                        extracted_text: Some(image.extracted_text.clone()),
                        embedding: embedded.vector,
                    }),
                    Err(e) => {
                        tracing::warn!("Error generating image embedding for {}: {}", image.id, e);
                    }
                }
            }
        }

        records
    }

    fn collect_pieces(&self, doc: &ProcessedDocument) -> Vec<Piece> {
        let mut pieces = Vec::new();

        for page in &doc.pages {
            let p = page.page_num;

            for (i, chunk) in self.chunker.chunk(&page.text).into_iter().enumerate() {
                if chunk.trim().is_empty() {
                    continue;
                }
                pieces.push(Piece {
                    page_num: p,
                    chunk_id: format!("page_{}_chunk_{}", p, i + 1),
                    chunk_type: ChunkType::Text,
                    content: chunk,
                });
            }

            for (i, table) in page.tables.iter().enumerate() {
                if table.text.trim().is_empty() {
                    continue;
                }
                pieces.push(Piece {
                    page_num: p,
                    chunk_id: format!("page_{}_table_{}", p, i + 1),
                    chunk_type: ChunkType::Table,
                    content: table.text.clone(),
                });
            }

            for (i, formula) in page.formulas.iter().enumerate() {
                if formula.text.trim().is_empty() {
                    continue;
                }
                pieces.push(Piece {
                    page_num: p,
                    chunk_id: format!("page_{}_formula_{}", p, i + 1),
                    chunk_type: ChunkType::Formula,
                    content: formula.text.clone(),
                });
            }

            for (i, image) in page.images.iter().enumerate() {
                if image.extracted_text.trim().is_empty() {
                    continue;
                }
                pieces.push(Piece {
                    page_num: p,
                    chunk_id: format!("page_{}_img_{}_text", p, i + 1),
                    chunk_type: ChunkType::ImageText,
                    content: image.extracted_text.clone(),
                });
            }
        }

        pieces
    }
}

// ============================================================================
// Tests
// ============================================================================
