//! PDF 파싱 모듈
//!
//! pdf-extract로 페이지 텍스트를, lopdf로 메타데이터와 이미지 XObject를 추출합니다.
//! CPU 바운드 작업이라 호출자는 `spawn_blocking`에서 실행해야 합니다.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::{DocumentMetadata, ImageFormat};

/// 페이지 트리 상속을 따라갈 최대 깊이
const MAX_PARENT_DEPTH: usize = 32;

// ============================================================================
// Parsed Types
// ============================================================================

/// 파싱된 PDF (OCR/레이아웃 분석 전)
#[derive(Debug, Clone)]
pub struct ParsedPdf {
    pub metadata: DocumentMetadata,
    pub pages: Vec<ParsedPage>,
}

/// 파싱된 페이지
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// 1부터 시작
    pub page_num: usize,
    pub text: String,
    pub images: Vec<RawImage>,
}

/// 페이지에서 찾은 이미지 XObject
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// JPEG 스트림일 때만 원본 바이트를 보관
    pub bytes: Option<Vec<u8>>,
}

// ============================================================================
// Parsing
// ============================================================================

/// PDF 바이트 파싱
pub fn parse_pdf(bytes: &[u8], filename: &str) -> Result<ParsedPdf> {
    let doc = Document::load_mem(bytes)
        .with_context(|| format!("Failed to load PDF structure: {}", filename))?;

    let page_ids = doc.get_pages();
    let page_count = page_ids.len();

    let metadata = read_metadata(&doc, filename, page_count);
    let texts = extract_page_texts(bytes, &doc, filename, page_count)?;

    let mut pages = Vec::with_capacity(page_count);
    for ((page_no, page_id), text) in page_ids.iter().zip(texts) {
        let images = match page_images(&doc, *page_id) {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!("Failed to read images on page {} of {}: {}", page_no, filename, e);
                Vec::new()
            }
        };

        pages.push(ParsedPage {
            page_num: *page_no as usize,
            text,
            images,
        });
    }

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        tracing::warn!(
            "No text extracted from PDF: {}. It might be a scanned document.",
            filename
        );
    }

    Ok(ParsedPdf { metadata, pages })
}

/// 페이지별 텍스트 추출
///
/// pdf-extract 전체 텍스트를 폼피드로 분리해서 페이지 수와 맞으면 사용하고,
/// 아니면 lopdf로 페이지마다 추출합니다.
fn extract_page_texts(
    bytes: &[u8],
    doc: &Document,
    filename: &str,
    page_count: usize,
) -> Result<Vec<String>> {
    if page_count == 0 {
        return Ok(vec![]);
    }

    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => {
            if page_count == 1 {
                return Ok(vec![text.trim().to_string()]);
            }
            let pages = split_pdf_pages(&text);
            if pages.len() == page_count {
                return Ok(pages);
            }
            tracing::debug!(
                "Form feed split gave {} pages, expected {} ({}); falling back to per-page extraction",
                pages.len(),
                page_count,
                filename
            );
        }
        Err(e) => {
            tracing::warn!("pdf-extract failed for {}: {}. Falling back to lopdf", filename, e);
        }
    }

    Ok(per_page_texts(doc, filename))
}

/// lopdf로 페이지마다 텍스트 추출 (실패한 페이지는 빈 문자열)
fn per_page_texts(doc: &Document, filename: &str) -> Vec<String> {
    doc.get_pages()
        .keys()
        .map(|page_no| {
            doc.extract_text(&[*page_no])
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to extract text on page {} of {}: {}", page_no, filename, e);
                    String::new()
                })
        })
        .collect()
}

/// 폼피드 문자 (\x0c)로 페이지 분리 (빈 페이지 유지)
fn split_pdf_pages(text: &str) -> Vec<String> {
    let trimmed = text.trim_end_matches(['\x0c', '\n', ' ']);
    trimmed
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .collect()
}

/// Info 딕셔너리에서 메타데이터 읽기
fn read_metadata(doc: &Document, filename: &str, page_count: usize) -> DocumentMetadata {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok());

    let field = |key: &[u8]| -> String {
        info.and_then(|dict| dict.get(key).ok())
            .and_then(|obj| resolve(doc, obj).ok())
            .and_then(pdf_string)
            .unwrap_or_default()
    };

    DocumentMetadata {
        filename: filename.to_string(),
        pages: page_count,
        title: field(b"Title"),
        author: field(b"Author"),
        creation_date: field(b"CreationDate"),
    }
}

/// 페이지의 이미지 XObject 목록
fn page_images(doc: &Document, page_id: ObjectId) -> Result<Vec<RawImage>> {
    let Some(resources) = page_resources(doc, page_id)? else {
        return Ok(vec![]);
    };

    let xobjects = match resources.get(b"XObject") {
        Ok(obj) => resolve(doc, obj)?.as_dict()?,
        Err(_) => return Ok(vec![]),
    };

    let mut seen = BTreeSet::new();
    let mut images = Vec::new();

    for (_, obj) in xobjects.iter() {
        if let Object::Reference(id) = obj {
            if !seen.insert(*id) {
                continue;
            }
        }

        let stream = match resolve(doc, obj)?.as_stream() {
            Ok(stream) => stream,
            Err(_) => continue,
        };

        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(|s| s.as_name())
            .map(|name| name == b"Image")
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        let width = dimension(doc, &stream.dict, b"Width");
        let height = dimension(doc, &stream.dict, b"Height");
        let format = image_format(doc, &stream.dict);

        let bytes = match format {
            ImageFormat::Jpeg => Some(stream.content.clone()),
            _ => None,
        };

        images.push(RawImage {
            width,
            height,
            format,
            bytes,
        });
    }

    Ok(images)
}

/// 페이지 리소스 딕셔너리 (Parent 상속 포함)
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>> {
    let mut node = doc.get_dictionary(page_id)?;

    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(obj) = node.get(b"Resources") {
            return Ok(Some(resolve(doc, obj)?.as_dict()?));
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => node = doc.get_dictionary(*parent)?,
            _ => return Ok(None),
        }
    }

    Ok(None)
}

/// 스트림 필터로 이미지 포맷 판별
fn image_format(doc: &Document, dict: &Dictionary) -> ImageFormat {
    let filters: Vec<Vec<u8>> = match dict.get(b"Filter").ok().and_then(|f| resolve(doc, f).ok()) {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => vec![],
    };

    match filters.as_slice() {
        [only] if only.as_slice() == b"DCTDecode" => ImageFormat::Jpeg,
        [.., last] if last.as_slice() == b"JPXDecode" => ImageFormat::Jpeg2000,
        [] => ImageFormat::Raw,
        _ if filters.iter().any(|f| f.as_slice() == b"DCTDecode") => ImageFormat::Other,
        _ => ImageFormat::Raw,
    }
}

fn dimension(doc: &Document, dict: &Dictionary, key: &[u8]) -> u32 {
    dict.get(key)
        .ok()
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_i64().ok())
        .map(|v| v.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(0)
}

/// 간접 참조 해제
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// PDF 문자열 디코딩 (UTF-16BE BOM 지원, 나머지는 Latin-1)
fn pdf_string(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_text(bytes)),
        _ => None,
    }
}

pub(crate) fn decode_pdf_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units).trim().to_string();
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.trim().to_string();
    }

    bytes.iter().map(|&b| b as char).collect::<String>().trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
