//! 대화형 질의 모드 (chat)
//!
//! rustyline으로 입력을 받고 질문마다 검색 + 응답 생성을 수행합니다.
//! 히스토리는 데이터 디렉토리의 `.chat_history`에 저장됩니다.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::{print_response, report_query_error};
use crate::config::AppConfig;
use crate::pipeline::{QueryOptions, RagPipeline};

const PROMPT: &str = "aero-rag> ";

/// 입력 핸들러
struct InputHandler {
    editor: DefaultEditor,
    history_path: PathBuf,
}

impl InputHandler {
    fn with_history(history_path: PathBuf) -> Result<Self> {
        let mut editor = DefaultEditor::new().context("Failed to create line editor")?;
        if history_path.exists() {
            let _ = editor.load_history(&history_path);
        }
        Ok(Self {
            editor,
            history_path,
        })
    }

    /// 한 줄 읽기 (Ctrl-C / Ctrl-D면 None)
    fn read_line(&mut self) -> Result<Option<String>> {
        match self.editor.readline(PROMPT) {
            Ok(line) => {
                let trimmed = line.trim().to_string();
                if !trimmed.is_empty() {
                    let _ = self.editor.add_history_entry(trimmed.as_str());
                }
                Ok(Some(trimmed))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(anyhow::anyhow!("Readline error: {}", err)),
        }
    }

    fn save_history(&mut self) {
        if let Err(e) = self.editor.save_history(&self.history_path) {
            tracing::warn!("Failed to save chat history: {}", e);
        }
    }
}

/// 종료 명령어인지
fn is_exit_command(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit" | ":q")
}

/// 대화형 모드 실행
pub(super) async fn run(config: AppConfig, options: QueryOptions) -> Result<()> {
    super::require_gemini_key()?;

    let history_path = config.layout().history_path();
    let pipeline = RagPipeline::from_config(config, true)
        .await
        .context("파이프라인 초기화 실패")?;

    println!("[*] raw/ 폴더의 새 PDF 확인 중...");
    let scan = pipeline.process_existing_pdfs().await?;
    if scan.ingested > 0 || scan.failed > 0 {
        println!(
            "[OK] 새 문서 처리: {} (실패 {})",
            scan.ingested, scan.failed
        );
    }

    let stats = pipeline.stats().await?;
    println!(
        "[OK] 문서 {} 건, 텍스트 벡터 {} / 이미지 벡터 {}",
        stats.documents, stats.text_vectors, stats.image_vectors
    );
    println!(
        "    mode={}, top_k={} | 종료: exit 또는 quit",
        options.mode, options.top_k
    );
    println!();

    let mut input = InputHandler::with_history(history_path)?;

    while let Some(line) = input.read_line()? {
        if line.is_empty() {
            continue;
        }
        if is_exit_command(&line) {
            break;
        }

        match pipeline.query(&line, &options).await {
            Ok(response) => {
                println!();
                print_response(&response);
                println!();
            }
            Err(e) => {
                if let Err(e) = report_query_error(e) {
                    println!("[!] 오류: {:#}", e);
                }
            }
        }
    }

    input.save_history();
    println!("[*] 종료합니다.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(is_exit_command(":q"));
        assert!(!is_exit_command("what is an exit door?"));
    }
}
