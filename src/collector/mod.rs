//! 파일 수집 모듈
//!
//! 수집 대상 PDF를 찾고 쿼리 이미지 파일을 판별합니다.
//! .gitignore 패턴을 존중하고, 숨김 파일은 기본으로 건너뜁니다.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use ignore::WalkBuilder;

use crate::config::IngestionConfig;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 수집 대상 PDF
    Pdf,
    /// 이미지 쿼리용 파일
    Image,
}

impl FileType {
    /// 확장자로 파일 타입 결정 (대소문자 무시)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" => Some(FileType::Image),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// 쿼리 이미지로 쓸 수 있는 파일인지
pub fn is_query_image(path: &Path) -> bool {
    FileType::from_path(path) == Some(FileType::Image)
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 PDF 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 절대 경로
    pub path: PathBuf,
    /// 파일 크기 (바이트)
    pub size: u64,
    /// 수정 시간
    pub modified_at: Option<SystemTime>,
}

impl CollectedFile {
    /// PDF 파일이면 CollectedFile 생성
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        if FileType::from_path(&path) != Some(FileType::Pdf) {
            return Ok(None);
        }

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            size: metadata.len(),
            modified_at: metadata.modified().ok(),
        }))
    }

    /// 파일명 (문서 ID)
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

impl CollectorConfig {
    pub fn from_ingestion(config: &IngestionConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            ..Default::default()
        }
    }
}

/// PDF 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 경로가 파일이면 단일 수집, 폴더면 재귀 수집
    pub fn collect(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if path.is_dir() {
            self.collect_directory(path)
        } else {
            Ok(self.collect_file(path)?.into_iter().collect())
        }
    }

    /// 단일 파일 수집 (PDF가 아니거나 크기 초과면 None)
    pub fn collect_file(&self, path: &Path) -> Result<Option<CollectedFile>> {
        let abs_path = absolute(path)?;

        if !abs_path.exists() {
            anyhow::bail!("File not found: {:?}", abs_path);
        }

        if !abs_path.is_file() {
            anyhow::bail!("Not a file: {:?}", abs_path);
        }

        let file = CollectedFile::from_path(abs_path)?;
        Ok(file.filter(|f| self.should_include(f)))
    }

    /// 폴더 재귀 수집 (경로순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let abs_path = absolute(path)?;

        if !abs_path.exists() {
            anyhow::bail!("Directory not found: {:?}", abs_path);
        }

        if !abs_path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", abs_path);
        }

        let mut files = Vec::new();

        // ignore 크레이트로 .gitignore 지원 (git 저장소 밖에서도)
        let walker = WalkBuilder::new(&abs_path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .require_git(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to collect file: {}", e);
                }
            }
        }

        tracing::info!("Collected {} PDFs from {:?}", files.len(), abs_path);
        Ok(files)
    }

    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::warn!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }
        true
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    pub fn from_files(files: &[CollectedFile]) -> Self {
        Self {
            total_files: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, size: usize) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, vec![b'x'; size]).unwrap();
    }

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("pdf"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("jpeg"), Some(FileType::Image));
        assert_eq!(FileType::from_extension("md"), None);
        assert!(is_query_image(Path::new("diagram.WEBP")));
        assert!(!is_query_image(Path::new("manual.pdf")));
    }

    #[test]
    fn test_collect_directory_filters() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.pdf", 10);
        touch(dir.path(), "nested/a.PDF", 10);
        touch(dir.path(), "notes.txt", 10);
        touch(dir.path(), ".hidden.pdf", 10);
        touch(dir.path(), "ignored/c.pdf", 10);
        touch(dir.path(), "huge.pdf", 500);
        std::fs::write(dir.path().join(".gitignore"), "ignored/\n").unwrap();

        let collector = FileCollector::new(CollectorConfig {
            max_file_size: 100,
            ..Default::default()
        });
        let files = collector.collect(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|f| f.filename()).collect();

        assert_eq!(names, vec!["b.pdf", "a.PDF"]);
        assert_eq!(CollectionStats::from_files(&files).total_size, 20);
    }

    #[test]
    fn test_collect_single_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "manual.pdf", 10);
        touch(dir.path(), "photo.png", 10);

        let collector = FileCollector::with_defaults();
        assert_eq!(collector.collect(&dir.path().join("manual.pdf")).unwrap().len(), 1);
        assert!(collector.collect(&dir.path().join("photo.png")).unwrap().is_empty());
        assert!(collector.collect(&dir.path().join("missing.pdf")).is_err());
    }
}
