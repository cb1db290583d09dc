//! PDF 수집(ingestion) 모듈
//!
//! PDF에서 텍스트, 이미지, 표, 수식을 추출해 `ProcessedDocument`로 만듭니다.
//! - pdf: 페이지 텍스트 / 메타데이터 / 이미지 XObject
//! - vision: Gemini Vision OCR 및 캡션
//! - layout: 표/수식 휴리스틱

pub mod layout;
pub mod pdf;
pub mod vision;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{IngestionConfig, VisionConfig};

pub use vision::{mime_type_for_path, VisionClient, VisionOcr};

// ============================================================================
// Processed Document
// ============================================================================

/// 처리된 문서
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageContent>,
}

/// 문서 메타데이터 (Info 딕셔너리에 없으면 빈 문자열)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub pages: usize,
    pub title: String,
    pub author: String,
    pub creation_date: String,
}

/// 페이지 콘텐츠
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContent {
    /// 1부터 시작
    pub page_num: usize,
    pub text: String,
    pub images: Vec<PageImage>,
    pub tables: Vec<TextBlock>,
    pub formulas: Vec<TextBlock>,
}

/// 페이지 이미지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    /// `page_{p}_img_{i}`
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub extracted_text: String,
    pub format: ImageFormat,
    /// 원본 바이트 (스냅샷에는 저장하지 않음)
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
}

impl PageImage {
    /// Vision API에 보낼 수 있는 MIME 타입
    pub fn mime_type(&self) -> Option<&'static str> {
        match self.format {
            ImageFormat::Jpeg => Some("image/jpeg"),
            _ => None,
        }
    }
}

/// 이미지 스트림 포맷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// DCTDecode 단독 (원본 JPEG 바이트)
    Jpeg,
    /// JPXDecode
    Jpeg2000,
    /// 필터 없음 또는 Flate 등 원시 픽셀
    Raw,
    /// 그 외 필터 조합
    Other,
}

/// 표/수식 텍스트 블록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

// ============================================================================
// OCR
// ============================================================================

/// OCR 엔진 트레이트
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// 이미지 바이트에서 텍스트 추출
    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String>;
}

// ============================================================================
// PdfProcessor
// ============================================================================

/// PDF 처리기
pub struct PdfProcessor {
    ocr: Option<Arc<dyn OcrEngine>>,
    vision: VisionConfig,
    ingestion: IngestionConfig,
}

impl PdfProcessor {
    pub fn new(
        ocr: Option<Arc<dyn OcrEngine>>,
        vision: VisionConfig,
        ingestion: IngestionConfig,
    ) -> Self {
        Self {
            ocr,
            vision,
            ingestion,
        }
    }

    /// 파일에서 PDF 처리
    pub async fn process_pdf(&self, path: &Path) -> Result<ProcessedDocument> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read PDF: {:?}", path))?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.pdf")
            .to_string();

        self.process_bytes(bytes, filename).await
    }

    /// 메모리의 PDF 처리
    pub async fn process_bytes(&self, bytes: Vec<u8>, filename: String) -> Result<ProcessedDocument> {
        // PDF 파싱은 CPU 바운드이므로 spawn_blocking 사용
        let name = filename.clone();
        let parsed = tokio::task::spawn_blocking(move || pdf::parse_pdf(&bytes, &name))
            .await
            .context("PDF parsing task failed")??;

        let mut pages = Vec::with_capacity(parsed.pages.len());

        for page in parsed.pages {
            let mut images = Vec::with_capacity(page.images.len());

            for (idx, raw) in page.images.into_iter().enumerate() {
                let mut image = PageImage {
                    id: format!("page_{}_img_{}", page.page_num, idx + 1),
                    width: raw.width,
                    height: raw.height,
                    extracted_text: String::new(),
                    format: raw.format,
                    bytes: raw.bytes,
                };
                image.extracted_text = self.ocr_image(&image).await;
                images.push(image);
            }

            let tables = if self.ingestion.extract_tables {
                layout::detect_tables(&page.text)
            } else {
                Vec::new()
            };
            let formulas = if self.ingestion.extract_formulas {
                layout::detect_formulas(&page.text)
            } else {
                Vec::new()
            };

            pages.push(PageContent {
                page_num: page.page_num,
                text: page.text,
                images,
                tables,
                formulas,
            });
        }

        tracing::info!(
            "Processed {} ({} pages, {} images)",
            filename,
            pages.len(),
            pages.iter().map(|p| p.images.len()).sum::<usize>()
        );

        Ok(ProcessedDocument {
            metadata: parsed.metadata,
            pages,
        })
    }

    /// OCR 대상 이미지면 텍스트 추출 (실패 시 빈 문자열)
    async fn ocr_image(&self, image: &PageImage) -> String {
        let Some(ocr) = self.ocr.as_ref() else {
            return String::new();
        };
        if !self.vision.enable_ocr || !self.should_ocr(image) {
            return String::new();
        }
        let (Some(bytes), Some(mime)) = (image.bytes.as_ref(), image.mime_type()) else {
            tracing::debug!("Skipping OCR for {} ({:?} stream)", image.id, image.format);
            return String::new();
        };

        match ocr.extract_text(bytes, mime).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("OCR error on {}: {}", image.id, e);
                String::new()
            }
        }
    }

    /// 텍스트를 담기에 충분히 큰 이미지인지
    fn should_ocr(&self, image: &PageImage) -> bool {
        image.width > self.vision.ocr_min_width && image.height > self.vision.ocr_min_height
    }
}

impl ProcessedDocument {
    /// JSON 스냅샷 저장 (이미지 바이트 제외)
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize document")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write snapshot: {:?}", path))
    }

    /// 전체 이미지 수
    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOcr {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for CountingOcr {
        async fn extract_text(&self, _image: &[u8], mime_type: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(mime_type, "image/jpeg");
            Ok("  FIG 3 - Nacelle  ".to_string())
        }
    }

    struct FailingOcr;

    #[async_trait]
    impl OcrEngine for FailingOcr {
        async fn extract_text(&self, _image: &[u8], _mime_type: &str) -> Result<String> {
            anyhow::bail!("vision unavailable")
        }
    }

    fn processor(ocr: Option<Arc<dyn OcrEngine>>, min: u32) -> PdfProcessor {
        let vision = VisionConfig {
            ocr_min_width: min,
            ocr_min_height: min,
            ..Default::default()
        };
        PdfProcessor::new(ocr, vision, IngestionConfig::default())
    }

    #[test]
    fn test_snapshot_skips_image_bytes() {
        let doc = ProcessedDocument {
            metadata: DocumentMetadata {
                filename: "a.pdf".to_string(),
                pages: 1,
                ..Default::default()
            },
            pages: vec![PageContent {
                page_num: 1,
                images: vec![PageImage {
                    id: "page_1_img_1".to_string(),
                    width: 10,
                    height: 10,
                    extracted_text: String::new(),
                    format: ImageFormat::Jpeg,
                    bytes: Some(vec![1, 2, 3]),
                }],
                ..Default::default()
            }],
        };

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["pages"][0]["images"][0].get("bytes").is_none());
        assert_eq!(json["pages"][0]["images"][0]["format"], "jpeg");
        assert_eq!(doc.image_count(), 1);
    }

    #[tokio::test]
    async fn test_process_runs_ocr_on_large_jpeg() {
        let ocr = Arc::new(CountingOcr {
            calls: AtomicUsize::new(0),
        });
        let bytes = pdf::tests::build_test_pdf(&["Nacelle layout"], true);

        let doc = processor(Some(ocr.clone() as Arc<dyn OcrEngine>), 100)
            .process_bytes(bytes, "nacelle.pdf".to_string())
            .await
            .unwrap();

        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
        let image = &doc.pages[0].images[0];
        assert_eq!(image.id, "page_1_img_1");
        assert_eq!(image.extracted_text, "FIG 3 - Nacelle");
    }

    #[tokio::test]
    async fn test_process_pdf_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flaps.pdf");
        std::fs::write(
            &path,
            pdf::tests::build_test_pdf(&["Flap deflection", "Slat schedule"], false),
        )
        .unwrap();

        let doc = processor(None, 100).process_pdf(&path).await.unwrap();

        assert_eq!(doc.metadata.filename, "flaps.pdf");
        assert_eq!(doc.metadata.pages, 2);
        assert!(doc.pages[0].text.contains("Flap deflection"));
        assert!(doc.pages[1].text.contains("Slat schedule"));

        assert!(processor(None, 100)
            .process_pdf(&dir.path().join("missing.pdf"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_small_images_skip_ocr() {
        let ocr = Arc::new(CountingOcr {
            calls: AtomicUsize::new(0),
        });
        let bytes = pdf::tests::build_test_pdf(&["Tiny icon"], true);

        // 320x240 이미지, 기준 400 초과 필요
        let doc = processor(Some(ocr.clone() as Arc<dyn OcrEngine>), 400)
            .process_bytes(bytes, "icon.pdf".to_string())
            .await
            .unwrap();

        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(doc.pages[0].images[0].extracted_text, "");
    }

    #[tokio::test]
    async fn test_ocr_failure_is_logged_not_fatal() {
        let bytes = pdf::tests::build_test_pdf(&["Broken vision"], true);

        let doc = processor(Some(Arc::new(FailingOcr)), 100)
            .process_bytes(bytes, "broken.pdf".to_string())
            .await
            .unwrap();

        assert_eq!(doc.pages[0].images[0].extracted_text, "");
    }
}
