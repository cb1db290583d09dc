//! aero-rag - 항공우주 PDF 멀티모달 RAG 시스템
//!
//! PDF에서 텍스트/표/수식/이미지를 추출해 임베딩하고,
//! 코사인 유사도 선형 스캔으로 검색한 결과를 LLM 답변의 근거로 사용합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod retrieval;

// Re-exports
pub use config::{AppConfig, DataLayout};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use generation::{ChatModel, OpenAiChat, RagResponse, ResponseBuilder};
pub use ingestion::{PdfProcessor, ProcessedDocument};
pub use pipeline::{
    IngestReport, KnowledgeBase, PipelineError, QueryOptions, RagPipeline, ScanReport,
};
pub use retrieval::{
    ChunkType, DocumentRegistry, FlatVectorStore, MultimodalRetriever, RetrievalMode,
    SearchResult, VectorRecord, VectorStore,
};
