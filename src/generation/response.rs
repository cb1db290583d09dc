//! 응답 빌더
//!
//! 검색 결과로 LLM 컨텍스트를 만들고 출처/이미지 정보를 붙여 최종 응답을 구성합니다.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use super::ChatModel;
use crate::retrieval::{ChunkType, SearchResult};

const SYSTEM_MESSAGE: &str = "You are an aerospace expert assistant. Answer the user's query based on the provided context.
If the context doesn't contain enough information to answer, say so clearly.
If relevant images were found, refer to them in your response.
Provide specific and accurate information, citing sources where appropriate.";

/// 출처 (문서, 페이지)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceRef {
    pub document_id: String,
    pub page_num: usize,
}

/// 응답에 포함된 이미지 정보
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub id: String,
    pub document_id: String,
    pub page_num: usize,
    pub extracted_text: String,
}

/// 최종 RAG 응답
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub text_response: String,
    /// 검색 순서 유지, 중복 제거
    pub sources: Vec<SourceRef>,
    pub images: Vec<ImageRef>,
}

impl RagResponse {
    /// 화면 출력용 문자열 (출처 목록 포함)
    pub fn format_for_display(&self) -> String {
        let mut out = self.text_response.clone();

        if !self.sources.is_empty() {
            out.push_str("\n\nSources:");
            for source in &self.sources {
                out.push_str(&format!("\n- {}, Page {}", source.document_id, source.page_num));
            }
        }

        out
    }
}

/// 응답 빌더
pub struct ResponseBuilder {
    llm: Arc<dyn ChatModel>,
}

impl ResponseBuilder {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// 검색 결과로 응답 생성
    pub async fn build_response(
        &self,
        query: &str,
        items: &[SearchResult],
        include_images: bool,
    ) -> Result<RagResponse> {
        let context = build_context(items);
        let images = if include_images {
            collect_images(items)
        } else {
            Vec::new()
        };

        let prompt = build_prompt(query, &context, !images.is_empty());
        tracing::debug!(
            "Generating answer with {} ({} context items)",
            self.llm.model_name(),
            items.len()
        );
        let text_response = self.llm.generate(&prompt, Some(SYSTEM_MESSAGE)).await?;

        Ok(RagResponse {
            text_response,
            sources: collect_sources(items),
            images,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_context(items: &[SearchResult]) -> String {
    items
        .iter()
        .filter_map(|item| {
            let record = &item.record;
            let content = record.content.as_deref().filter(|c| !c.is_empty())?;
            Some(format!(
                "{} [Source: {}, Page {}]",
                content, record.document_id, record.page_num
            ))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect_images(items: &[SearchResult]) -> Vec<ImageRef> {
    items
        .iter()
        .filter(|item| item.record.chunk_type == ChunkType::Image)
        .map(|item| ImageRef {
            id: item.record.chunk_id.clone(),
            document_id: item.record.document_id.clone(),
            page_num: item.record.page_num,
            extracted_text: item.record.extracted_text.clone().unwrap_or_default(),
        })
        .collect()
}

fn collect_sources(items: &[SearchResult]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| SourceRef {
            document_id: item.record.document_id.clone(),
            page_num: item.record.page_num,
        })
        .filter(|source| seen.insert(source.clone()))
        .collect()
}

fn build_prompt(query: &str, context: &str, has_images: bool) -> String {
    let image_note = if has_images {
        "Images were also found relevant to this query."
    } else {
        "No relevant images were found."
    };

    format!(
        "User Query: {}\n\n\
         Context Information:\n{}\n\n\
         {}\n\n\
         Please provide a comprehensive and accurate response to the query.",
        query, context, image_note
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::VectorRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 받은 프롬프트를 기록하는 가짜 모델
    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn generate(&self, prompt: &str, system_message: Option<&str>) -> Result<String> {
            assert!(system_message.unwrap().contains("aerospace expert"));
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("The spar carries bending loads.".to_string())
        }
        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn hit(doc: &str, page: usize, id: &str, chunk_type: ChunkType, content: &str) -> SearchResult {
        let mut record = VectorRecord::text(doc, page, id.to_string(), chunk_type, content.to_string(), vec![]);
        if chunk_type == ChunkType::Image {
            record.extracted_text = Some("FIG 2".to_string());
        }
        SearchResult {
            record,
            similarity: 0.9,
        }
    }

    fn items() -> Vec<SearchResult> {
        vec![
            hit("wing.pdf", 3, "page_3_chunk_1", ChunkType::Text, "The main spar carries bending."),
            hit("wing.pdf", 3, "page_3_img_1", ChunkType::Image, "Cutaway of a wing box"),
            hit("wing.pdf", 4, "page_4_table_1", ChunkType::Table, ""),
        ]
    }

    #[tokio::test]
    async fn test_build_response() {
        let chat = Arc::new(RecordingChat::default());
        let builder = ResponseBuilder::new(chat.clone());

        let response = builder
            .build_response("What carries bending?", &items(), true)
            .await
            .unwrap();

        assert_eq!(response.text_response, "The spar carries bending loads.");
        assert_eq!(
            response.sources,
            vec![
                SourceRef {
                    document_id: "wing.pdf".to_string(),
                    page_num: 3
                },
                SourceRef {
                    document_id: "wing.pdf".to_string(),
                    page_num: 4
                },
            ]
        );
        assert_eq!(response.images.len(), 1);
        assert_eq!(response.images[0].extracted_text, "FIG 2");

        let prompts = chat.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert!(prompt.contains("User Query: What carries bending?"));
        assert!(prompt.contains("The main spar carries bending. [Source: wing.pdf, Page 3]"));
        assert!(prompt.contains("Images were also found relevant"));
        // 빈 content는 컨텍스트에서 제외
        assert!(!prompt.contains("Page 4]"));
    }

    #[tokio::test]
    async fn test_without_images() {
        let chat = Arc::new(RecordingChat::default());
        let builder = ResponseBuilder::new(chat.clone());

        let response = builder.build_response("q", &items(), false).await.unwrap();
        assert!(response.images.is_empty());
        assert!(chat.prompts.lock().unwrap()[0].contains("No relevant images were found."));
    }

    #[test]
    fn test_format_for_display() {
        let response = RagResponse {
            text_response: "Answer.".to_string(),
            sources: vec![SourceRef {
                document_id: "a.pdf".to_string(),
                page_num: 2,
            }],
            images: vec![],
        };
        assert_eq!(response.format_for_display(), "Answer.\n\nSources:\n- a.pdf, Page 2");

        let bare = RagResponse {
            sources: vec![],
            ..response
        };
        assert_eq!(bare.format_for_display(), "Answer.");
    }
}
