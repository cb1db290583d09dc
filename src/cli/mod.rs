//! CLI 모듈
//!
//! aero-rag CLI 명령어 정의 및 구현

mod chat;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};

use crate::collector::{is_query_image, CollectionStats, CollectorConfig, FileCollector};
use crate::config::{default_config_path, AppConfig};
use crate::embedding::has_api_key;
use crate::generation::RagResponse;
use crate::pipeline::{
    IngestStatus, KnowledgeBase, PipelineError, QueryOptions, RagPipeline,
};
use crate::retrieval::{QueryImage, RetrievalMode, SearchResult};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "aero-rag")]
#[command(version, about = "항공우주 PDF 멀티모달 RAG 시스템", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: <config_dir>/aero-rag/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF 파일 또는 폴더를 수집
    #[command(group(ArgGroup::new("source").required(true).args(["file", "dir"])))]
    Ingest {
        /// 수집할 PDF 파일
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 강제 재수집 (이미 등록된 내용도 다시 처리)
        #[arg(long)]
        force: bool,
    },

    /// raw/ 폴더의 미처리 PDF 수집
    Scan,

    /// 질문하고 답변 생성
    Query {
        /// 질문
        query: String,

        /// 검색 결과 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 검색 모드
        #[arg(short, long, value_enum)]
        mode: Option<RetrievalMode>,

        /// 이미지 쿼리 파일
        #[arg(long)]
        image: Option<PathBuf>,

        /// 응답에서 이미지 정보 제외
        #[arg(long)]
        no_images: bool,
    },

    /// 검색만 수행 (LLM 호출 없음)
    Search {
        /// 검색 쿼리
        query: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(short, long, value_enum)]
        mode: Option<RetrievalMode>,

        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// 등록된 문서 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서 삭제
    Delete {
        /// 삭제할 문서 파일명
        #[arg(short, long)]
        name: Option<String>,

        /// 삭제할 문서 ID
        #[arg(short, long)]
        id: Option<i64>,
    },

    /// 상태 확인
    Status,

    /// 대화형 질의 모드
    Chat {
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(short, long, value_enum)]
        mode: Option<RetrievalMode>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::resolve(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest { file, dir, force } => cmd_ingest(config, file, dir, force).await,
        Commands::Scan => cmd_scan(config).await,
        Commands::Query {
            query,
            top_k,
            mode,
            image,
            no_images,
        } => {
            let mut options = build_options(&config, top_k, mode, image.as_deref()).await?;
            options.include_images = !no_images;
            cmd_query(config, &query, options).await
        }
        Commands::Search {
            query,
            top_k,
            mode,
            image,
        } => {
            let options = build_options(&config, top_k, mode, image.as_deref()).await?;
            cmd_search(config, &query, options).await
        }
        Commands::List { limit } => cmd_list(config, limit).await,
        Commands::Delete { name, id } => cmd_delete(config, name, id).await,
        Commands::Status => cmd_status(config, cli.config.as_deref()).await,
        Commands::Chat { top_k, mode } => {
            let options = build_options(&config, top_k, mode, None).await?;
            chat::run(config, options).await
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    config: AppConfig,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    require_gemini_key()?;

    let collector = FileCollector::new(CollectorConfig::from_ingestion(&config.ingestion));
    let files = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(f) => vec![f],
            None => {
                println!("[!] PDF 파일이 아니거나 크기 제한을 넘었습니다: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--file 또는 --dir를 지정해야 합니다");
    };

    if files.is_empty() {
        println!("[!] 수집할 PDF가 없습니다.");
        return Ok(());
    }

    let stats = CollectionStats::from_files(&files);
    println!("[*] 수집 대상: PDF {} 개", stats.total_files);
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    if config.vision.enable_ocr || config.vision.embed_images {
        println!("[!] 이미지는 Gemini Vision으로 처리합니다. API 호출이 발생합니다.");
    }
    println!();

    let pipeline = RagPipeline::from_config(config, false)
        .await
        .context("파이프라인 초기화 실패")?;

    let mut ingested = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for (i, collected) in files.iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, files.len(), collected.filename());

        match pipeline.ingest_file(&collected.path, force).await {
            Ok(report) if report.status == IngestStatus::Skipped => {
                println!("건너뜀 (이미 등록됨)");
                skipped += 1;
            }
            Ok(report) => {
                println!(
                    "완료 ({} 페이지, 텍스트 {} / 이미지 {} 벡터)",
                    report.pages, report.text_vectors, report.image_vectors
                );
                ingested += 1;
            }
            Err(e) => {
                println!("실패: {:#}", e);
                failed += 1;
            }
        }
    }

    println!();
    println!(
        "[OK] 완료: 성공 {}, 건너뜀 {}, 실패 {}",
        ingested, skipped, failed
    );

    Ok(())
}

/// raw/ 스캔 명령어 (scan)
async fn cmd_scan(config: AppConfig) -> Result<()> {
    require_gemini_key()?;

    let pipeline = RagPipeline::from_config(config, false)
        .await
        .context("파이프라인 초기화 실패")?;

    println!(
        "[*] 스캔 중: {}",
        pipeline.knowledge_base().layout().raw_dir.display()
    );
    let report = pipeline.process_existing_pdfs().await?;

    println!(
        "[OK] PDF {} 개 발견: 처리 {}, 건너뜀 {}, 실패 {}",
        report.found, report.ingested, report.skipped, report.failed
    );
    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(config: AppConfig, query: &str, options: QueryOptions) -> Result<()> {
    require_gemini_key()?;

    let pipeline = RagPipeline::from_config(config, true)
        .await
        .context("파이프라인 초기화 실패")?;

    println!("[*] 검색 중: \"{}\" (mode: {})", query, options.mode);

    match pipeline.query(query, &options).await {
        Ok(response) => {
            println!();
            print_response(&response);
            Ok(())
        }
        Err(e) => report_query_error(e),
    }
}

/// 검색 명령어 (search)
async fn cmd_search(config: AppConfig, query: &str, options: QueryOptions) -> Result<()> {
    require_gemini_key()?;

    let pipeline = RagPipeline::from_config(config, false)
        .await
        .context("파이프라인 초기화 실패")?;

    println!("[*] 검색 중: \"{}\" (mode: {})", query, options.mode);

    let results = match pipeline.retrieve_only(query, &options).await {
        Ok(results) => results,
        Err(e) => return report_query_error(e),
    };

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, result) in results.iter().enumerate() {
        print_search_result(i + 1, result);
    }

    Ok(())
}

/// 목록 명령어 (list)
async fn cmd_list(config: AppConfig, limit: usize) -> Result<()> {
    let kb = KnowledgeBase::open(config.layout())
        .await
        .context("저장소 열기 실패")?;

    let docs = kb.list(limit).context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 등록된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 등록된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        let title = if doc.title.is_empty() {
            "-".to_string()
        } else {
            truncate_text(&doc.title, 40)
        };

        println!("  #{:<4} {} [{}]", doc.id, doc.filename, title);
        println!(
            "        {} 페이지 | 텍스트 {} / 이미지 {} 벡터",
            doc.page_count, doc.text_vectors, doc.image_vectors
        );
        println!("        {}", doc.processed_at.format("%Y-%m-%d %H:%M"));
        println!();
    }

    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(config: AppConfig, name: Option<String>, id: Option<i64>) -> Result<()> {
    let kb = KnowledgeBase::open(config.layout())
        .await
        .context("저장소 열기 실패")?;

    let filename = if let Some(id) = id {
        kb.registry()
            .get_by_id(id)
            .context("문서 조회 실패")?
            .map(|doc| doc.filename)
            .ok_or_else(|| anyhow::anyhow!("ID {}인 문서를 찾을 수 없습니다", id))?
    } else if let Some(name) = name {
        name
    } else {
        bail!("--id 또는 --name 중 하나를 지정해야 합니다");
    };

    if kb
        .delete_document(&filename)
        .await
        .context("문서 삭제 실패")?
    {
        println!("[OK] 문서 삭제됨: {}", filename);
    } else {
        println!("[!] 삭제할 문서를 찾을 수 없습니다: {}", filename);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: AppConfig, explicit_config: Option<&Path>) -> Result<()> {
    println!("aero-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    match explicit_config
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .filter(|p| p.exists())
    {
        Some(path) => println!("[*] 설정 파일: {}", path.display()),
        None => println!("[*] 설정 파일: 없음 (기본값 사용)"),
    }
    println!("[*] 데이터 디렉토리: {}", config.data.data_dir.display());
    println!(
        "[*] 검색: top_k={}, mode={} | 청크: {}자 (겹침 {})",
        config.retrieval.top_k,
        config.retrieval.mode,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );

    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[!] Gemini API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }
    if std::env::var("OPENAI_API_KEY").map(|k| !k.is_empty()).unwrap_or(false) {
        println!("[OK] OpenAI API 키: 설정됨 (모델: {})", config.llm.model);
    } else {
        println!("[!] OpenAI API 키: 미설정 (query/chat 사용 불가)");
    }

    match KnowledgeBase::open(config.layout()).await {
        Ok(kb) => match kb.stats().await {
            Ok(stats) => {
                println!(
                    "[OK] 등록 문서: {} 건 ({} 페이지)",
                    stats.documents, stats.pages
                );
                println!(
                    "[OK] 벡터 인덱스: 텍스트 {} / 이미지 {}",
                    stats.text_vectors, stats.image_vectors
                );
            }
            Err(e) => println!("[!] 통계 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 저장소 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 명령줄 인자와 설정으로 질의 옵션 구성
///
/// 이미지가 주어지고 모드가 없으면 hybrid로 검색합니다.
async fn build_options(
    config: &AppConfig,
    top_k: Option<usize>,
    mode: Option<RetrievalMode>,
    image: Option<&Path>,
) -> Result<QueryOptions> {
    let mut options = QueryOptions::from_config(config);

    if let Some(k) = top_k {
        if k == 0 {
            bail!("--top-k는 1 이상이어야 합니다");
        }
        options.top_k = k;
    }

    if let Some(path) = image {
        if !is_query_image(path) {
            bail!("지원하지 않는 이미지 형식입니다: {:?}", path);
        }
        options.image = Some(QueryImage::from_path(path).await?);
    }

    options.mode = match (mode, options.image.is_some()) {
        (Some(m), _) => m,
        (None, true) => RetrievalMode::Hybrid,
        (None, false) => options.mode,
    };

    if options.mode == RetrievalMode::Image && options.image.is_none() {
        println!("[!] image 모드에는 --image가 필요합니다. 결과가 비어 있을 수 있습니다.");
    }

    Ok(options)
}

fn require_gemini_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

/// 사용자 입력 오류는 안내만 출력하고 나머지는 에러로 전달
fn report_query_error(err: PipelineError) -> Result<()> {
    match err {
        PipelineError::EmptyQuery => {
            println!("[!] 질문을 입력하세요.");
            Ok(())
        }
        PipelineError::NoDocuments => {
            println!("[!] 처리된 문서가 없습니다. 먼저 PDF를 수집하세요 (aero-rag ingest / scan).");
            Ok(())
        }
        other => Err(other.into()),
    }
}

fn print_response(response: &RagResponse) {
    println!("{}", response.format_for_display());

    if !response.images.is_empty() {
        println!("\nImages:");
        for image in &response.images {
            let text = if image.extracted_text.is_empty() {
                String::new()
            } else {
                format!(" - {}", truncate_text(&image.extracted_text, 80))
            };
            println!(
                "- {} ({}, Page {}){}",
                image.id, image.document_id, image.page_num, text
            );
        }
    }
}

fn print_search_result(rank: usize, result: &SearchResult) {
    let record = &result.record;
    println!(
        "{}. [{}] [유사도: {:.4}] {} p.{} ({})",
        rank,
        record.chunk_type.as_str(),
        result.similarity,
        record.document_id,
        record.page_num,
        record.chunk_id
    );
    if let Some(ref content) = record.content {
        println!("   내용: {}", truncate_text(content, 200));
    }
    if let Some(ref text) = record.extracted_text {
        if !text.is_empty() {
            println!("   OCR: {}", truncate_text(text, 120));
        }
    }
    println!();
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::parse_from([
            "aero-rag", "query", "What is a winglet?", "-k", "3", "--mode", "hybrid", "--no-images",
        ]);
        match cli.command {
            Commands::Query {
                query,
                top_k,
                mode,
                no_images,
                ..
            } => {
                assert_eq!(query, "What is a winglet?");
                assert_eq!(top_k, Some(3));
                assert_eq!(mode, Some(RetrievalMode::Hybrid));
                assert!(no_images);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_ingest_requires_exactly_one_source() {
        let cli = Cli::try_parse_from(["aero-rag", "ingest", "--file", "wing.pdf", "--force"]).unwrap();
        match cli.command {
            Commands::Ingest { file, dir, force } => {
                assert_eq!(file, Some(PathBuf::from("wing.pdf")));
                assert!(dir.is_none());
                assert!(force);
            }
            _ => panic!("expected ingest command"),
        }

        assert!(Cli::try_parse_from(["aero-rag", "ingest", "-d", "manuals"]).is_ok());
        assert!(Cli::try_parse_from(["aero-rag", "ingest"]).is_err());
        assert!(Cli::try_parse_from([
            "aero-rag", "ingest", "--file", "wing.pdf", "--dir", "manuals",
        ])
        .is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["aero-rag", "status", "--config", "/tmp/aero.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/aero.toml")));
    }

    #[tokio::test]
    async fn test_build_options_defaults_and_overrides() {
        let config = AppConfig::default();

        let options = build_options(&config, None, None, None).await.unwrap();
        assert_eq!(options.top_k, 5);
        assert_eq!(options.mode, RetrievalMode::Text);

        let options = build_options(&config, Some(2), Some(RetrievalMode::Image), None)
            .await
            .unwrap();
        assert_eq!(options.top_k, 2);
        assert_eq!(options.mode, RetrievalMode::Image);

        assert!(build_options(&config, Some(0), None, None).await.is_err());
        assert!(build_options(&config, None, None, Some(Path::new("notes.txt")))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_build_options_image_implies_hybrid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fig.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let options = build_options(&AppConfig::default(), None, None, Some(&path))
            .await
            .unwrap();
        assert_eq!(options.mode, RetrievalMode::Hybrid);
        assert_eq!(options.image.unwrap().mime_type, "image/png");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "받음각과 양력 계수";
        let truncated = truncate_text(korean, 3);
        assert_eq!(truncated, "받음각...");
    }
}
