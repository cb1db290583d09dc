//! Document Registry - rusqlite 기반 문서 레지스트리
//!
//! 수집된 PDF마다 한 행을 유지합니다 (파일명, 내용 해시, 메타데이터, 벡터 수).
//! 저장 위치: <data_dir>/embeddings/documents.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

// ============================================================================
// Types
// ============================================================================

/// 등록된 문서
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    /// sha256 hex
    pub content_hash: String,
    pub title: String,
    pub author: String,
    pub creation_date: String,
    pub page_count: usize,
    pub text_vectors: usize,
    pub image_vectors: usize,
    pub processed_at: DateTime<Utc>,
}

/// 새 문서 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewDocumentRecord {
    pub filename: String,
    pub content_hash: String,
    pub title: String,
    pub author: String,
    pub creation_date: String,
    pub page_count: usize,
    pub text_vectors: usize,
    pub image_vectors: usize,
}

/// 레지스트리 통계
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub document_count: usize,
    pub total_pages: usize,
    pub total_text_vectors: usize,
    pub total_image_vectors: usize,
    pub db_path: PathBuf,
}

const SELECT_COLUMNS: &str = "SELECT id, filename, content_hash, title, author, creation_date,
        page_count, text_vectors, image_vectors, processed_at FROM documents";

// ============================================================================
// DocumentRegistry
// ============================================================================

/// SQLite 문서 레지스트리
pub struct DocumentRegistry {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DocumentRegistry {
    /// 레지스트리 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create registry directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        registry.initialize()?;
        Ok(registry)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL UNIQUE,
                content_hash TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                creation_date TEXT NOT NULL DEFAULT '',
                page_count INTEGER NOT NULL DEFAULT 0,
                text_vectors INTEGER NOT NULL DEFAULT 0,
                image_vectors INTEGER NOT NULL DEFAULT 0,
                processed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(content_hash);",
        )
        .context("Failed to create documents table")?;

        tracing::debug!("Document registry initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 문서 등록 (파일명이 같으면 갱신, id 유지)
    pub fn upsert(&self, doc: &NewDocumentRecord) -> Result<i64> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO documents (filename, content_hash, title, author, creation_date,
                page_count, text_vectors, image_vectors, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(filename) DO UPDATE SET
                content_hash = excluded.content_hash,
                title = excluded.title,
                author = excluded.author,
                creation_date = excluded.creation_date,
                page_count = excluded.page_count,
                text_vectors = excluded.text_vectors,
                image_vectors = excluded.image_vectors,
                processed_at = excluded.processed_at",
            params![
                doc.filename,
                doc.content_hash,
                doc.title,
                doc.author,
                doc.creation_date,
                doc.page_count as i64,
                doc.text_vectors as i64,
                doc.image_vectors as i64,
                now
            ],
        )
        .context("Failed to upsert document")?;

        let id: i64 = conn
            .query_row(
                "SELECT id FROM documents WHERE filename = ?1",
                params![doc.filename],
                |row| row.get(0),
            )
            .context("Failed to read document id")?;

        tracing::info!("Registered document: {} (id={})", doc.filename, id);
        Ok(id)
    }

    /// ID로 조회
    pub fn get_by_id(&self, id: i64) -> Result<Option<DocumentRecord>> {
        let conn = self.lock()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        conn.query_row(&sql, params![id], map_row)
            .optional()
            .context("Failed to query document by id")
    }

    /// 파일명으로 조회
    pub fn get_by_filename(&self, filename: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.lock()?;
        let sql = format!("{} WHERE filename = ?1", SELECT_COLUMNS);
        conn.query_row(&sql, params![filename], map_row)
            .optional()
            .context("Failed to query document by filename")
    }

    /// 내용 해시로 조회 (가장 최근 처리본)
    pub fn get_by_hash(&self, content_hash: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "{} WHERE content_hash = ?1 ORDER BY processed_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        conn.query_row(&sql, params![content_hash], map_row)
            .optional()
            .context("Failed to query document by hash")
    }

    /// 문서 목록 (최근 처리 순)
    pub fn list(&self, limit: usize) -> Result<Vec<DocumentRecord>> {
        let conn = self.lock()?;
        let sql = format!("{} ORDER BY processed_at DESC, id DESC LIMIT ?1", SELECT_COLUMNS);

        let mut stmt = conn.prepare(&sql)?;
        let docs = stmt
            .query_map(params![limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(docs)
    }

    /// 파일명으로 삭제
    pub fn delete(&self, filename: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM documents WHERE filename = ?1",
            params![filename],
        )?;
        Ok(rows > 0)
    }

    /// 레지스트리 통계
    pub fn stats(&self) -> Result<RegistryStats> {
        let conn = self.lock()?;

        let (count, pages, text, image): (i64, i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(page_count), 0),
                        COALESCE(SUM(text_vectors), 0), COALESCE(SUM(image_vectors), 0)
                 FROM documents",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .context("Failed to compute registry stats")?;

        Ok(RegistryStats {
            document_count: count as usize,
            total_pages: pages as usize,
            total_text_vectors: text as usize,
            total_image_vectors: image as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn map_row(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        content_hash: row.get(2)?,
        title: row.get(3)?,
        author: row.get(4)?,
        creation_date: row.get(5)?,
        page_count: row.get::<_, i64>(6)? as usize,
        text_vectors: row.get::<_, i64>(7)? as usize,
        image_vectors: row.get::<_, i64>(8)? as usize,
        processed_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_registry() -> (TempDir, DocumentRegistry) {
        let dir = TempDir::new().unwrap();
        let registry = DocumentRegistry::open(&dir.path().join("nested/documents.db")).unwrap();
        (dir, registry)
    }

    fn new_doc(filename: &str, hash: &str) -> NewDocumentRecord {
        NewDocumentRecord {
            filename: filename.to_string(),
            content_hash: hash.to_string(),
            title: "Flight Manual".to_string(),
            author: "Ops".to_string(),
            creation_date: "D:20240101".to_string(),
            page_count: 12,
            text_vectors: 40,
            image_vectors: 3,
        }
    }

    #[test]
    fn test_upsert_and_lookup() {
        let (_dir, registry) = create_test_registry();

        let id = registry.upsert(&new_doc("a320.pdf", "abc")).unwrap();
        let by_name = registry.get_by_filename("a320.pdf").unwrap().unwrap();
        assert_eq!(by_name.id, id);
        assert_eq!(by_name.page_count, 12);
        assert_eq!(by_name.title, "Flight Manual");

        let by_hash = registry.get_by_hash("abc").unwrap().unwrap();
        assert_eq!(by_hash.filename, "a320.pdf");
        assert!(registry.get_by_id(id).unwrap().is_some());
        assert!(registry.get_by_filename("missing.pdf").unwrap().is_none());
    }

    #[test]
    fn test_upsert_same_filename_keeps_id() {
        let (_dir, registry) = create_test_registry();

        let first = registry.upsert(&new_doc("a320.pdf", "abc")).unwrap();
        let mut updated = new_doc("a320.pdf", "def");
        updated.text_vectors = 7;
        let second = registry.upsert(&updated).unwrap();

        assert_eq!(first, second);
        let doc = registry.get_by_filename("a320.pdf").unwrap().unwrap();
        assert_eq!(doc.content_hash, "def");
        assert_eq!(doc.text_vectors, 7);
        assert!(registry.get_by_hash("abc").unwrap().is_none());
    }

    #[test]
    fn test_list_delete_and_stats() {
        let (_dir, registry) = create_test_registry();
        registry.upsert(&new_doc("a.pdf", "1")).unwrap();
        registry.upsert(&new_doc("b.pdf", "2")).unwrap();

        assert_eq!(registry.list(10).unwrap().len(), 2);
        assert_eq!(registry.list(1).unwrap().len(), 1);

        let stats = registry.stats().unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.total_pages, 24);
        assert_eq!(stats.total_image_vectors, 6);

        assert!(registry.delete("a.pdf").unwrap());
        assert!(!registry.delete("a.pdf").unwrap());
        assert_eq!(registry.stats().unwrap().document_count, 1);
    }

    #[test]
    fn test_empty_stats() {
        let (_dir, registry) = create_test_registry();
        let stats = registry.stats().unwrap();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.total_text_vectors, 0);
    }
}
