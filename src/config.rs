//! 설정 모듈
//!
//! TOML 설정 파일 + 환경변수로 동작을 제어합니다.
//! 기본 위치: `<config_dir>/aero-rag/config.toml`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::retrieval::RetrievalMode;

/// 데이터 디렉토리 재정의 환경변수
pub const DATA_DIR_ENV: &str = "AERO_RAG_DATA_DIR";

// ============================================================================
// AppConfig
// ============================================================================

/// 전체 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// 데이터 디렉토리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// 루트 데이터 디렉토리 (raw/, processed/, embeddings/ 포함)
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// 텍스트 청킹 설정 (문자 단위)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub mode: RetrievalMode,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            mode: RetrievalMode::Text,
        }
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// 768, 1536, 3072 중 하나
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: crate::embedding::DEFAULT_DIMENSION,
        }
    }
}

/// Vision (OCR / 이미지 캡션) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enable_ocr: bool,
    pub embed_images: bool,
    /// 이 크기 이하의 이미지는 OCR 생략
    pub ocr_min_width: u32,
    pub ocr_min_height: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enable_ocr: true,
            embed_images: true,
            ocr_min_width: 100,
            ocr_min_height: 100,
        }
    }
}

/// LLM 설정 (OpenAI 호환 chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// PDF 수집 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub extract_tables: bool,
    pub extract_formulas: bool,
    /// 최대 PDF 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            extract_tables: true,
            extract_formulas: true,
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// TOML 파일에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        tracing::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// 설정 해석
    ///
    /// 우선순위: 명시 경로 > 기본 위치 > 기본값. 이후 환경변수 재정의를 적용합니다.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                tracing::debug!("Using data dir from {}", DATA_DIR_ENV);
                config.data.data_dir = PathBuf::from(dir);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be greater than 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be greater than 0");
        }
        Ok(())
    }

    /// TOML 문자열로 직렬화
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// 데이터 디렉토리 레이아웃
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data.data_dir)
    }
}

/// 기본 설정 파일 경로
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("aero-rag").join("config.toml"))
}

// ============================================================================
// Data Layout
// ============================================================================

/// 데이터 디렉토리 구조
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
    /// 자동 처리 대상 PDF 수신함
    pub raw_dir: PathBuf,
    /// 처리된 문서 JSON 스냅샷
    pub processed_dir: PathBuf,
    /// 벡터 인덱스 + 레지스트리
    pub embeddings_dir: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            raw_dir: root.join("raw"),
            processed_dir: root.join("processed"),
            embeddings_dir: root.join("embeddings"),
        }
    }

    /// 모든 디렉토리 생성
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.raw_dir,
            &self.processed_dir,
            &self.embeddings_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
        Ok(())
    }

    pub fn registry_path(&self) -> PathBuf {
        self.embeddings_dir.join("documents.db")
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(".chat_history")
    }

    /// 처리된 문서 스냅샷 경로 (`processed/<stem>.json`)
    pub fn snapshot_path(&self, filename: &str) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        self.processed_dir.join(format!("{}.json", stem))
    }
}

// ============================================================================
// Tests
// ============================================================================
