//! Vision 모듈
//!
//! Gemini Vision API를 사용하여 이미지에서 텍스트를 추출(OCR)하거나
//! 이미지 내용을 설명하는 캡션을 생성합니다.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use super::OcrEngine;

/// Gemini Vision API 엔드포인트
const GEMINI_VISION_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Vision 응답의 "텍스트 없음" 표식
const NO_TEXT_MARKER: &str = "[NO TEXT]";

// ============================================================================
// VisionClient
// ============================================================================

/// Gemini Vision 클라이언트
#[derive(Debug, Clone)]
pub struct VisionClient {
    api_key: String,
    client: reqwest::Client,
}

impl VisionClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { api_key, client })
    }

    /// 환경변수에서 API 키 로드
    pub fn from_env() -> Result<Self> {
        Self::new(crate::embedding::get_api_key()?)
    }

    /// 이미지 텍스트 추출 (OCR)
    pub async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String> {
        let text = self.generate(EXTRACTION_PROMPT, image, mime_type, 0.1).await?;
        let text = text.trim();
        if text == NO_TEXT_MARKER {
            return Ok(String::new());
        }
        Ok(text.to_string())
    }

    /// 이미지 캡션 생성 (이미지 임베딩용)
    pub async fn describe(&self, image: &[u8], mime_type: &str) -> Result<String> {
        let text = self.generate(CAPTION_PROMPT, image, mime_type, 0.2).await?;
        Ok(text.trim().to_string())
    }

    /// 프롬프트 + 인라인 이미지로 generateContent 호출
    async fn generate(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        temperature: f32,
    ) -> Result<String> {
        let request = VisionRequest {
            contents: vec![VisionContent {
                parts: vec![
                    VisionPart::Text {
                        text: prompt.to_string(),
                    },
                    VisionPart::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: STANDARD.encode(image),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: 4096,
            },
        };

        let response = self
            .client
            .post(GEMINI_VISION_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send Vision API request")?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<crate::embedding::GeminiError>(&body) {
                anyhow::bail!(
                    "Vision API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("Vision API error ({}): {}", status, body);
        }

        let vision_response: VisionResponse =
            serde_json::from_str(&body).context("Failed to parse Vision API response")?;

        Ok(first_candidate_text(vision_response))
    }
}

/// 첫 번째 후보의 텍스트 파트를 이어붙임
fn first_candidate_text(response: VisionResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .map(|c| {
            c.content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

// ============================================================================
// VisionOcr
// ============================================================================

/// Gemini Vision 기반 OCR 엔진
pub struct VisionOcr {
    client: VisionClient,
}

impl VisionOcr {
    pub fn new(client: VisionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String> {
        self.client.extract_text(image, mime_type).await
    }
}

/// 파일 경로에서 MIME 타입 결정
pub fn mime_type_for_path(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "webp" => Ok("image/webp"),
        "gif" => Ok("image/gif"),
        "bmp" => Ok("image/bmp"),
        _ => anyhow::bail!("Unsupported image format: {}", ext),
    }
}

/// OCR 프롬프트
const EXTRACTION_PROMPT: &str = r#"Extract all text visible in this image taken from an aerospace technical document.

Instructions:
1. Include labels, callouts, axis titles, table cells and equations
2. Preserve the reading order and line structure
3. Output plain text only, with no commentary
4. If the image contains no text, answer exactly "[NO TEXT]"
"#;

/// 캡션 프롬프트
const CAPTION_PROMPT: &str = r#"Describe this figure from an aerospace technical document in 2-4 sentences.
Name the kind of figure (diagram, plot, photo, schematic, table), the components or
quantities it shows, and any visible labels or units. Output the description only."#;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct VisionRequest {
    contents: Vec<VisionContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct VisionContent {
    parts: Vec<VisionPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum VisionPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_for_path() {
        assert_eq!(mime_type_for_path(Path::new("fig.png")).unwrap(), "image/png");
        assert_eq!(mime_type_for_path(Path::new("fig.JPEG")).unwrap(), "image/jpeg");
        assert!(mime_type_for_path(Path::new("fig.tiff")).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let request = VisionRequest {
            contents: vec![VisionContent {
                parts: vec![
                    VisionPart::Text {
                        text: "prompt".to_string(),
                    },
                    VisionPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: STANDARD.encode([0xff, 0xd8]),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 4096,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "prompt");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "/9g=");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn test_first_candidate_text_joins_parts() {
        let response: VisionResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Wing "},{"text":"spar"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(first_candidate_text(response), "Wing spar");

        let empty: VisionResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(first_candidate_text(empty), "");
    }
}
