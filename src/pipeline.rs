//! RAG 파이프라인
//!
//! 수집(PDF → 청크 → 벡터 → 저장)과 질의(검색 → 응답 생성)를 하나로 묶습니다.
//!
//! - `KnowledgeBase`: 벡터 저장소 + 문서 레지스트리 + 스냅샷 (API 키 불필요)
//! - `RagPipeline`: 처리기, 임베더, 검색기, 응답 빌더까지 포함한 전체 파이프라인

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::Instrument;

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::{AppConfig, DataLayout};
use crate::embedding::{
    create_embedder, CaptionImageEmbedder, DocumentEmbedder, EmbeddingProvider, ImageEmbedder,
    SlidingWindowChunker,
};
use crate::generation::{ChatModel, OpenAiChat, RagResponse, ResponseBuilder};
use crate::ingestion::{OcrEngine, PdfProcessor, VisionClient, VisionOcr};
use crate::retrieval::{
    DocumentRecord, DocumentRegistry, FlatVectorStore, MultimodalRetriever, NewDocumentRecord,
    QueryImage, RetrievalMode, SearchResult, VectorStore,
};

// ============================================================================
// Errors
// ============================================================================

/// 질의 오류
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("no documents have been processed yet")]
    NoDocuments,
    #[error("language model is not configured")]
    NoLanguageModel,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ============================================================================
// Reports & Options
// ============================================================================

/// 수집 결과 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Ingested,
    /// 같은 내용이 이미 등록됨
    Skipped,
}

/// 파일 하나의 수집 결과
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub filename: String,
    pub status: IngestStatus,
    pub pages: usize,
    pub text_vectors: usize,
    pub image_vectors: usize,
}

/// raw/ 스캔 결과
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub found: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 질의 옵션
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub mode: RetrievalMode,
    pub image: Option<QueryImage>,
    pub include_images: bool,
}

impl QueryOptions {
    /// 설정 기본값 (top_k, mode)
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            mode: config.retrieval.mode,
            image: None,
            include_images: true,
        }
    }
}

/// 시스템 통계
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub documents: usize,
    pub pages: usize,
    pub text_vectors: usize,
    pub image_vectors: usize,
    pub data_dir: PathBuf,
}

// ============================================================================
// KnowledgeBase
// ============================================================================

/// 저장 계층 (벡터 인덱스 + 레지스트리 + 스냅샷)
pub struct KnowledgeBase {
    layout: DataLayout,
    store: Arc<dyn VectorStore>,
    registry: DocumentRegistry,
}

impl KnowledgeBase {
    /// 데이터 디렉토리에서 열기 (디렉토리 생성 포함)
    pub async fn open(layout: DataLayout) -> Result<Self> {
        layout.ensure()?;
        let store = FlatVectorStore::open(&layout.embeddings_dir)
            .await
            .context("Failed to open vector store")?;
        Self::with_store(layout, Arc::new(store))
    }

    /// 저장소를 지정해서 열기
    pub fn with_store(layout: DataLayout, store: Arc<dyn VectorStore>) -> Result<Self> {
        layout.ensure()?;
        let registry = DocumentRegistry::open(&layout.registry_path())
            .context("Failed to open document registry")?;
        Ok(Self {
            layout,
            store,
            registry,
        })
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    /// 등록 문서 목록
    pub fn list(&self, limit: usize) -> Result<Vec<DocumentRecord>> {
        self.registry.list(limit)
    }

    /// 문서 삭제 (벡터, 레지스트리 행, 스냅샷)
    ///
    /// 아무것도 지워지지 않았으면 false
    pub async fn delete_document(&self, filename: &str) -> Result<bool> {
        let vectors = self.store.delete_document(filename).await?;
        let registered = self.registry.delete(filename)?;

        let snapshot = self.layout.snapshot_path(filename);
        let had_snapshot = match tokio::fs::remove_file(&snapshot).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove snapshot: {:?}", snapshot))
            }
        };

        tracing::info!(
            "Deleted {} ({} vectors, registry={}, snapshot={})",
            filename,
            vectors,
            registered,
            had_snapshot
        );
        Ok(vectors > 0 || registered || had_snapshot)
    }

    /// 통계
    pub async fn stats(&self) -> Result<PipelineStats> {
        let registry = self.registry.stats()?;
        Ok(PipelineStats {
            documents: registry.document_count,
            pages: registry.total_pages,
            text_vectors: self.store.text_count().await,
            image_vectors: self.store.image_count().await,
            data_dir: self.layout.root.clone(),
        })
    }
}

// ============================================================================
// RagPipeline
// ============================================================================

/// 외부 서비스 구성 요소 (테스트에서 가짜 구현 주입)
pub struct PipelineParts {
    pub text_embedder: Arc<dyn EmbeddingProvider>,
    pub image_embedder: Option<Arc<dyn ImageEmbedder>>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub chat: Option<Arc<dyn ChatModel>>,
}

/// 멀티모달 RAG 파이프라인
pub struct RagPipeline {
    config: AppConfig,
    kb: KnowledgeBase,
    processor: PdfProcessor,
    embedder: DocumentEmbedder,
    retriever: MultimodalRetriever,
    responder: Option<ResponseBuilder>,
}

impl RagPipeline {
    /// 설정과 환경변수로 실제 클라이언트를 만들어 생성
    ///
    /// `with_llm`이 true면 OpenAI 키가 없을 때 에러입니다.
    pub async fn from_config(config: AppConfig, with_llm: bool) -> Result<Self> {
        let text_embedder: Arc<dyn EmbeddingProvider> = Arc::new(
            create_embedder(config.embedding.dimension)
                .context("Failed to create embedding client")?,
        );

        let vision = if config.vision.enable_ocr || config.vision.embed_images {
            Some(VisionClient::from_env().context("Failed to create vision client")?)
        } else {
            None
        };

        let ocr = match (&vision, config.vision.enable_ocr) {
            (Some(client), true) => Some(Arc::new(VisionOcr::new(client.clone())) as Arc<dyn OcrEngine>),
            _ => None,
        };
        let image_embedder = match (vision, config.vision.embed_images) {
            (Some(client), true) => Some(Arc::new(CaptionImageEmbedder::new(
                client,
                text_embedder.clone(),
            )) as Arc<dyn ImageEmbedder>),
            _ => None,
        };

        let chat = if with_llm {
            Some(Arc::new(OpenAiChat::from_env(&config.llm)?) as Arc<dyn ChatModel>)
        } else {
            None
        };

        let kb = KnowledgeBase::open(config.layout()).await?;
        Ok(Self::new(
            config,
            kb,
            PipelineParts {
                text_embedder,
                image_embedder,
                ocr,
                chat,
            },
        ))
    }

    /// 구성 요소를 직접 지정해서 생성
    pub fn new(config: AppConfig, kb: KnowledgeBase, parts: PipelineParts) -> Self {
        let processor = PdfProcessor::new(
            parts.ocr,
            config.vision.clone(),
            config.ingestion.clone(),
        );
        let embedder = DocumentEmbedder::new(
            parts.text_embedder.clone(),
            parts.image_embedder.clone(),
            Box::new(SlidingWindowChunker::from_config(&config.chunking)),
        );
        let retriever =
            MultimodalRetriever::new(kb.store(), parts.text_embedder, parts.image_embedder);
        let responder = parts.chat.map(ResponseBuilder::new);

        Self {
            config,
            kb,
            processor,
            embedder,
            retriever,
            responder,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// PDF 하나 수집
    ///
    /// 같은 해시가 이미 등록돼 있으면 `force`가 아닌 한 건너뜁니다.
    /// 재수집 시 해당 문서의 기존 벡터를 교체합니다.
    pub async fn ingest_file(&self, path: &Path, force: bool) -> Result<IngestReport> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read PDF: {:?}", path))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("PDF path has no file name")?
            .to_string();
        let content_hash = hex_digest(&bytes);

        if !force {
            if let Some(existing) = self.kb.registry.get_by_hash(&content_hash)? {
                tracing::info!(
                    "Skipping {} (same content already registered as {})",
                    filename,
                    existing.filename
                );
                return Ok(IngestReport {
                    filename,
                    status: IngestStatus::Skipped,
                    pages: existing.page_count,
                    text_vectors: existing.text_vectors,
                    image_vectors: existing.image_vectors,
                });
            }
        }

        let doc = self.processor.process_bytes(bytes, filename.clone()).await?;
        doc.save_snapshot(&self.kb.layout.snapshot_path(&filename))
            .await?;

        let text_records = self.embedder.embed_document(&doc).await?;
        let image_records = if self.config.vision.embed_images {
            self.embedder.embed_document_images(&doc).await
        } else {
            Vec::new()
        };

        // 벡터 교체 도중 실패하면 다음 수집 때 다시 처리되도록 등록 정보를 먼저 삭제
        if self.kb.registry.delete(&filename)? {
            tracing::debug!("Unregistered {} before replacing its vectors", filename);
        }

        let replaced = self.kb.store.delete_document(&filename).await?;
        if replaced > 0 {
            tracing::info!("Replacing {} existing vectors for {}", replaced, filename);
        }

        let text_vectors = self.kb.store.add_text_vectors(text_records).await?;
        let image_vectors = self.kb.store.add_image_vectors(image_records).await?;

        self.kb.registry.upsert(&NewDocumentRecord {
            filename: filename.clone(),
            content_hash,
            title: doc.metadata.title.clone(),
            author: doc.metadata.author.clone(),
            creation_date: doc.metadata.creation_date.clone(),
            page_count: doc.metadata.pages,
            text_vectors,
            image_vectors,
        })?;

        tracing::info!(
            "Ingested {} ({} pages, {} text vectors, {} image vectors)",
            filename,
            doc.metadata.pages,
            text_vectors,
            image_vectors
        );

        Ok(IngestReport {
            filename,
            status: IngestStatus::Ingested,
            pages: doc.metadata.pages,
            text_vectors,
            image_vectors,
        })
    }

    /// raw/ 폴더의 미등록 PDF 일괄 수집
    ///
    /// 파일별 오류는 로그만 남기고 계속 진행합니다.
    pub async fn process_existing_pdfs(&self) -> Result<ScanReport> {
        let collector =
            FileCollector::new(CollectorConfig::from_ingestion(&self.config.ingestion));
        let files = collector.collect_directory(&self.kb.layout.raw_dir)?;

        let mut report = ScanReport {
            found: files.len(),
            ..Default::default()
        };

        for file in files {
            let filename = file.filename();
            if self.kb.registry.get_by_filename(&filename)?.is_some() {
                report.skipped += 1;
                continue;
            }

            match self.ingest_file(&file.path, false).await {
                Ok(r) if r.status == IngestStatus::Skipped => report.skipped += 1,
                Ok(_) => report.ingested += 1,
                Err(e) => {
                    tracing::warn!("Error processing {}: {:#}", filename, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Scan complete: found={}, ingested={}, skipped={}, failed={}",
            report.found,
            report.ingested,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// 질의 → 검색 → 응답 생성
    pub async fn query(
        &self,
        text: &str,
        options: &QueryOptions,
    ) -> std::result::Result<RagResponse, PipelineError> {
        let query_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("query", id = %query_id);

        async {
            let text = text.trim();
            if text.is_empty() {
                return Err(PipelineError::EmptyQuery);
            }
            if self.kb.store.text_count().await == 0 {
                return Err(PipelineError::NoDocuments);
            }
            let responder = self
                .responder
                .as_ref()
                .ok_or(PipelineError::NoLanguageModel)?;

            let items = self.search(text, options).await?;
            tracing::info!("Retrieved {} items", items.len());

            let response = responder
                .build_response(text, &items, options.include_images)
                .await?;
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// 검색만 수행 (LLM 호출 없음)
    pub async fn retrieve_only(
        &self,
        text: &str,
        options: &QueryOptions,
    ) -> std::result::Result<Vec<SearchResult>, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }
        Ok(self.search(text, options).await?)
    }

    async fn search(&self, text: &str, options: &QueryOptions) -> Result<Vec<SearchResult>> {
        self.retriever
            .retrieve(text, options.top_k, options.mode, options.image.as_ref())
            .await
    }

    /// 문서 삭제
    pub async fn delete_document(&self, filename: &str) -> Result<bool> {
        self.kb.delete_document(filename).await
    }

    /// 통계
    pub async fn stats(&self) -> Result<PipelineStats> {
        self.kb.stats().await
    }
}

/// sha256 hex
fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
