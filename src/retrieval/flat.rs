//! Flat Vector Store - JSON 파일 기반 선형 스캔 저장소
//!
//! 인덱스 구조 없이 모든 벡터를 메모리에 올려두고 전수 비교합니다.
//! 저장 위치: `<embeddings_dir>/text_index.json`, `<embeddings_dir>/image_index.json`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector::{rank_top_k, SearchResult, VectorRecord, VectorStore};

const TEXT_INDEX_FILE: &str = "text_index.json";
const IMAGE_INDEX_FILE: &str = "image_index.json";

#[derive(Debug, Default)]
struct Indices {
    text: Vec<VectorRecord>,
    image: Vec<VectorRecord>,
}

// ============================================================================
// FlatVectorStore
// ============================================================================

/// JSON 파일 기반 벡터 저장소
///
/// 모든 변경 후 두 인덱스 파일을 다시 씁니다 (임시 파일 + rename).
/// 메모리 인덱스는 파일 기록이 성공한 뒤에만 교체됩니다.
pub struct FlatVectorStore {
    storage_dir: PathBuf,
    indices: RwLock<Indices>,
}

impl FlatVectorStore {
    /// 저장소 열기 (디렉토리가 없으면 생성, 기존 인덱스 로드)
    pub async fn open(storage_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(storage_dir)
            .await
            .with_context(|| format!("Failed to create vector directory: {:?}", storage_dir))?;

        let text = load_index(&storage_dir.join(TEXT_INDEX_FILE)).await?;
        let image = load_index(&storage_dir.join(IMAGE_INDEX_FILE)).await?;

        tracing::debug!(
            "Vector store loaded from {:?} (text={}, image={})",
            storage_dir,
            text.len(),
            image.len()
        );

        Ok(Self {
            storage_dir: storage_dir.to_path_buf(),
            indices: RwLock::new(Indices { text, image }),
        })
    }

    /// 두 인덱스를 디스크에 기록
    async fn save(&self, text: &[VectorRecord], image: &[VectorRecord]) -> Result<()> {
        write_index(&self.storage_dir.join(TEXT_INDEX_FILE), text).await?;
        write_index(&self.storage_dir.join(IMAGE_INDEX_FILE), image).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn add_text_vectors(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let count = records.len();
        let mut indices = self.indices.write().await;
        let mut text = indices.text.clone();
        text.extend(records);
        self.save(&text, &indices.image).await?;
        indices.text = text;
        Ok(count)
    }

    async fn add_image_vectors(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let count = records.len();
        let mut indices = self.indices.write().await;
        let mut image = indices.image.clone();
        image.extend(records);
        self.save(&indices.text, &image).await?;
        indices.image = image;
        Ok(count)
    }

    async fn search_text(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let indices = self.indices.read().await;
        Ok(rank_top_k(&indices.text, query, top_k))
    }

    async fn search_images(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let indices = self.indices.read().await;
        Ok(rank_top_k(&indices.image, query, top_k))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut indices = self.indices.write().await;
        let before = indices.text.len() + indices.image.len();

        let keep = |r: &&VectorRecord| r.document_id != document_id;
        let text: Vec<VectorRecord> = indices.text.iter().filter(keep).cloned().collect();
        let image: Vec<VectorRecord> = indices.image.iter().filter(keep).cloned().collect();

        let removed = before - (text.len() + image.len());
        if removed > 0 {
            self.save(&text, &image).await?;
            indices.text = text;
            indices.image = image;
            tracing::info!("Removed {} vectors for {}", removed, document_id);
        }
        Ok(removed)
    }

    async fn text_count(&self) -> usize {
        self.indices.read().await.text.len()
    }

    async fn image_count(&self) -> usize {
        self.indices.read().await.image.len()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 인덱스 파일 로드 (없으면 빈 인덱스)
async fn load_index(path: &Path) -> Result<Vec<VectorRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read index: {:?}", path))?;

    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&data).with_context(|| format!("Failed to parse index: {:?}", path))
}

/// 임시 파일에 쓴 뒤 rename
async fn write_index(path: &Path, records: &[VectorRecord]) -> Result<()> {
    let json = serde_json::to_vec(records).context("Failed to serialize index")?;
    let tmp = path.with_extension("json.tmp");

    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write index: {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace index: {:?}", path))?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
