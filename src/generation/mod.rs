//! 응답 생성 모듈
//!
//! - llm: OpenAI 호환 채팅 클라이언트
//! - response: 검색 결과 기반 프롬프트 구성 및 출처 정리

mod llm;
mod response;

pub use llm::{ChatModel, OpenAiChat};
pub use response::{ImageRef, RagResponse, ResponseBuilder, SourceRef};
