//! CLI 모듈
//!
//! palank-assist CLI 명령어 정의 및 구현
//!
//! 리트리벌 인덱스는 메모리에만 있으므로 문서가 필요한 명령은 `--doc`으로
//! 실행할 때마다 인제스트합니다.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::agents::GeneratorRegistry;
use crate::assistant::Assistant;
use crate::collector::{CollectorConfig, FileCollector};
use crate::config::{get_data_dir, AssistConfig};
use crate::domain::Domain;
use crate::embedding::{self, create_embedder};
use crate::knowledge::{
    word_chunker, DocumentLoader, IngestOutcome, IngestReport, RetrievalPipeline,
};
use crate::llm::{self, create_completion_provider, CompletionProvider, OfflineCompletion};
use crate::memory::ExportFormat;
use crate::protocol::{ServiceRequest, ServiceResponse};
use crate::router::{DomainRouter, RouteOutcome};
use crate::service::ChatService;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "palank-assist")]
#[command(version, about = "멀티 도메인 어시스턴트 (도메인 라우터 + 로컬 RAG)", long_about = None)]
pub struct Cli {
    /// JSON 설정 파일
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 완성 백엔드 없이 실행 (라우터는 키워드 폴백)
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문 한 번 하기
    Ask {
        /// 질문
        query: String,

        /// 사용자가 고른 도메인
        #[arg(short, long)]
        domain: Option<String>,

        /// 먼저 인제스트할 문서 (파일 또는 폴더, 반복 가능)
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,
    },

    /// 대화형 채팅 (/clear, /export json|txt, /domain <d>, /quit)
    Chat {
        /// 시작 도메인
        #[arg(short, long)]
        domain: Option<String>,

        /// 먼저 인제스트할 문서
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,
    },

    /// stdin/stdout JSON-lines 서비스 (chat, stream, upload, health, end)
    Serve {
        /// 먼저 인제스트할 문서
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,
    },

    /// 도메인 분류만 수행
    Classify {
        /// 분류할 질의
        query: String,

        /// 허용 도메인 (반복 가능, 생략 시 전체)
        #[arg(short, long = "allow")]
        allow: Vec<String>,
    },

    /// 문서를 인제스트하고 결과 보고
    Ingest {
        /// 파일 또는 폴더 경로
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// PDF 파일 건너뛰기 (폴더 수집 시)
        #[arg(long)]
        skip_pdfs: bool,
    },

    /// 문서 검색
    Query {
        /// 검색 쿼리
        question: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// 검색 대상 문서
        #[arg(long = "doc", required = true)]
        docs: Vec<PathBuf>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = AssistConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;
    let offline = cli.offline;

    match cli.command {
        Commands::Ask {
            query,
            domain,
            docs,
        } => cmd_ask(&config, offline, &query, domain.as_deref(), &docs).await,
        Commands::Chat { domain, docs } => cmd_chat(&config, offline, domain, &docs).await,
        Commands::Serve { docs } => cmd_serve(&config, offline, &docs).await,
        Commands::Classify { query, allow } => cmd_classify(&config, offline, &query, &allow).await,
        Commands::Ingest { paths, skip_pdfs } => cmd_ingest(&config, &paths, skip_pdfs).await,
        Commands::Query {
            question,
            limit,
            docs,
        } => cmd_query(&config, &question, limit, &docs).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Component Wiring
// ============================================================================

/// 완성 프로바이더 (오프라인이면 항상 실패하는 프로바이더)
fn completion_provider(
    config: &AssistConfig,
    offline: bool,
) -> Result<Arc<dyn CompletionProvider>> {
    if offline {
        tracing::info!("Running offline: router uses keyword fallback");
        return Ok(Arc::new(OfflineCompletion));
    }
    create_completion_provider(config.temperature)
}

/// 리트리벌 파이프라인 생성
fn build_pipeline(config: &AssistConfig) -> Result<Arc<RetrievalPipeline>> {
    let loader = DocumentLoader::new(word_chunker(config.chunk.clone()));
    let pipeline = RetrievalPipeline::new(loader, create_embedder(config)?)
        .with_upload_dir(config.upload_dir());
    Ok(Arc::new(pipeline))
}

/// 문서 인자를 펼쳐 인제스트 (문서가 없으면 아무것도 안 함)
async fn ingest_docs(
    pipeline: &RetrievalPipeline,
    docs: &[PathBuf],
    collector: &FileCollector,
) -> Result<Option<IngestReport>> {
    if docs.is_empty() {
        return Ok(None);
    }

    let paths = collector.expand(docs)?;
    if paths.is_empty() {
        println!("[!] 수집할 문서가 없습니다.");
        return Ok(None);
    }

    println!("[*] 문서 인제스트 중: {} 건", paths.len());
    let report = pipeline.ingest(&paths).await.context("문서 인제스트 실패")?;
    print_report(&report);
    Ok(Some(report))
}

fn print_report(report: &IngestReport) {
    for outcome in &report.outcomes {
        match outcome {
            IngestOutcome::Indexed {
                filename,
                chunks,
                saved_to,
            } => {
                println!("    [OK] {} ({} 청크)", filename, chunks);
                if let Some(path) = saved_to {
                    println!("         저장: {}", path.display());
                }
            }
            IngestOutcome::Failed { filename, error } => {
                println!("    [!] {}: {}", filename, error);
            }
        }
    }

    if report.ready {
        println!("[OK] 인덱스 준비 완료: {} 청크", report.total_chunks);
    } else {
        println!("[!] 인덱싱된 청크가 없습니다 (검색 비활성)");
    }
    println!();
}

/// 라우터 + 생성기 + 파이프라인 구성
struct Components {
    router: Arc<DomainRouter>,
    generators: Arc<GeneratorRegistry>,
    pipeline: Arc<RetrievalPipeline>,
}

fn build_components(config: &AssistConfig, offline: bool) -> Result<Components> {
    let llm = completion_provider(config, offline)?;
    let pipeline = build_pipeline(config)?;
    let router = DomainRouter::new(Arc::clone(&llm)).with_max_tokens(config.router_max_tokens);
    let generators = GeneratorRegistry::standard(llm, Some(Arc::clone(&pipeline)), config);

    Ok(Components {
        router: Arc::new(router),
        generators: Arc::new(generators),
        pipeline,
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 단건 질문 명령어 (ask)
async fn cmd_ask(
    config: &AssistConfig,
    offline: bool,
    query: &str,
    domain: Option<&str>,
    docs: &[PathBuf],
) -> Result<()> {
    let components = build_components(config, offline)?;
    ingest_docs(&components.pipeline, docs, &FileCollector::with_defaults()).await?;

    let assistant = Assistant::from_config(components.router, components.generators, config);
    let reply = assistant.ask(query, domain).await;

    println!("{}", reply.encode());
    println!("Router reason: {}", reply.reason);
    Ok(())
}

/// 대화형 채팅 명령어 (chat)
async fn cmd_chat(
    config: &AssistConfig,
    offline: bool,
    domain: Option<String>,
    docs: &[PathBuf],
) -> Result<()> {
    let components = build_components(config, offline)?;
    ingest_docs(&components.pipeline, docs, &FileCollector::with_defaults()).await?;

    let assistant = Assistant::from_config(components.router, components.generators, config);
    let mut selected = domain;

    println!("palank-assist chat (종료: /quit)");
    println!("    /clear, /export json|txt, /domain <도메인|none>");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}> ", selected.as_deref().unwrap_or("auto"));
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match ChatCommand::parse(input) {
            Some(ChatCommand::Quit) => break,
            Some(ChatCommand::Clear) => {
                assistant.memory().clear();
                println!("[OK] 대화 메모리를 비웠습니다.");
            }
            Some(ChatCommand::Export(format)) => match assistant.memory().export(format) {
                Ok(exported) => {
                    let path = export_path(format);
                    write_export(&path, &exported).await?;
                    println!("[OK] 대화 내보내기: {}", path.display());
                }
                Err(e) => println!("[!] 내보내기 실패: {}", e),
            },
            Some(ChatCommand::Domain(next)) => {
                println!(
                    "[OK] 도메인: {}",
                    next.as_ref().map(Domain::as_str).unwrap_or("auto")
                );
                selected = next.map(|d| d.as_str().to_string());
            }
            Some(ChatCommand::Invalid(message)) => println!("[!] {}", message),
            None => {
                let reply = assistant.ask(input, selected.as_deref()).await;
                println!("[{} {:.2}] {}", reply.responder, reply.confidence, reply.text);
                println!();
            }
        }
    }

    Ok(())
}

/// JSON-lines 서비스 명령어 (serve)
///
/// 한 줄에 요청 하나, 응답도 한 줄에 하나씩 씁니다.
async fn cmd_serve(config: &AssistConfig, offline: bool, docs: &[PathBuf]) -> Result<()> {
    let components = build_components(config, offline)?;
    if !docs.is_empty() {
        let paths = FileCollector::with_defaults().expand(docs)?;
        let report = components.pipeline.ingest(&paths).await?;
        tracing::info!("Preloaded {} chunks (ready: {})", report.total_chunks, report.ready);
    }

    let service = ChatService::new(
        config.clone(),
        components.router,
        components.generators,
        components.pipeline,
    );

    tracing::info!("Serving JSON lines on stdin/stdout");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let responses = match serde_json::from_str::<ServiceRequest>(&line) {
            Ok(request) => service.dispatch(request).await,
            Err(e) => vec![ServiceResponse::Error {
                message: format!("invalid request: {}", e),
            }],
        };

        for response in responses {
            let mut encoded = serde_json::to_string(&response)?;
            encoded.push('\n');
            stdout.write_all(encoded.as_bytes()).await?;
        }
        stdout.flush().await?;
    }

    Ok(())
}

/// 분류 명령어 (classify)
async fn cmd_classify(
    config: &AssistConfig,
    offline: bool,
    query: &str,
    allow: &[String],
) -> Result<()> {
    let allowed = allow
        .iter()
        .map(|d| d.parse::<Domain>())
        .collect::<Result<Vec<_>, _>>()
        .context("허용 도메인 파싱 실패")?;

    let router = DomainRouter::new(completion_provider(config, offline)?)
        .with_max_tokens(config.router_max_tokens);
    let outcome = router.classify_outcome(query, &allowed).await;
    let result = outcome.result();

    println!("[OK] 도메인: {}", result.domain);
    println!("     신뢰도: {:.2}", result.confidence);
    println!("     근거: {}", result.reason);
    match &outcome {
        RouteOutcome::Fallback { cause, .. } => {
            println!("     경로: 키워드 폴백 ({})", cause);
        }
        RouteOutcome::Model(_) => println!("     경로: 모델"),
    }

    Ok(())
}

/// 인제스트 명령어 (ingest)
async fn cmd_ingest(config: &AssistConfig, paths: &[PathBuf], skip_pdfs: bool) -> Result<()> {
    let collector = FileCollector::new(CollectorConfig {
        skip_pdfs,
        ..Default::default()
    });
    let pipeline = build_pipeline(config)?;

    if ingest_docs(&pipeline, paths, &collector).await?.is_none() {
        bail!("인제스트할 문서가 없습니다");
    }

    let stats = pipeline.stats().await;
    println!("[*] 임베딩 차원: {}", stats.dimension);
    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(
    config: &AssistConfig,
    question: &str,
    limit: usize,
    docs: &[PathBuf],
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    ingest_docs(&pipeline, docs, &FileCollector::with_defaults()).await?;

    println!("[*] 검색 중: \"{}\"", question);
    let results = pipeline.query(question, limit).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, chunk) in results.iter().enumerate() {
        println!("{}. {}", i + 1, truncate_text(chunk, 200));
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &AssistConfig) -> Result<()> {
    println!("palank-assist v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());

    match llm::detect_provider() {
        Some(kind) => println!("[OK] 완성 백엔드: {:?}", kind),
        None => {
            println!("[!] 완성 백엔드: 미설정 (--offline 으로 실행 가능)");
            println!("    설정: export GROQ_API_KEY=your-key 또는 OPENAI_API_KEY");
        }
    }

    println!("[*] 임베딩: {:?} ({} 차원)", config.embedder, config.embedding_dimension);
    if embedding::has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    }

    println!(
        "[*] 청크: 최대 {} 자, 오버랩 {} 단어",
        config.chunk.max_characters, config.chunk.overlap_words
    );
    println!(
        "[*] 메모리 {} 항목, top_k {}, 임계값 {:.2}",
        config.memory_cap, config.top_k, config.confidence_threshold
    );
    let domains = config
        .retrieval_domains
        .iter()
        .map(Domain::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    println!("[*] 리트리벌 도메인: {}", domains);

    Ok(())
}

// ============================================================================
// Chat Commands
// ============================================================================

/// REPL 슬래시 명령
#[derive(Debug, PartialEq)]
enum ChatCommand {
    Quit,
    Clear,
    Export(ExportFormat),
    /// None = 자동 라우팅
    Domain(Option<Domain>),
    Invalid(String),
}

impl ChatCommand {
    /// 슬래시로 시작하지 않으면 None (일반 질문)
    fn parse(input: &str) -> Option<Self> {
        let rest = input.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or("");
        let arg = parts.next();

        let command = match (name, arg) {
            ("quit" | "exit", _) => ChatCommand::Quit,
            ("clear", _) => ChatCommand::Clear,
            ("export", format) => match format.unwrap_or("json").parse() {
                Ok(format) => ChatCommand::Export(format),
                Err(e) => ChatCommand::Invalid(e.to_string()),
            },
            ("domain", None) | ("domain", Some("none" | "auto")) => ChatCommand::Domain(None),
            ("domain", Some(d)) => match d.parse() {
                Ok(domain) => ChatCommand::Domain(Some(domain)),
                Err(e) => ChatCommand::Invalid(format!("{}", e)),
            },
            (other, _) => ChatCommand::Invalid(format!("unknown command: /{}", other)),
        };
        Some(command)
    }
}

fn export_path(format: ExportFormat) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(format!("chat_history-{}.{}", stamp, format))
}

async fn write_export(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write export: {:?}", path))
}

// ============================================================================
// Helper Functions
// ============================================================================

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

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
        assert_eq!(truncate_text("안녕하세요 세계", 5), "안녕하세요...");
    }

    #[test]
    fn test_chat_command_parse() {
        assert_eq!(ChatCommand::parse("what is BFS?"), None);
        assert_eq!(ChatCommand::parse("/quit"), Some(ChatCommand::Quit));
        assert_eq!(ChatCommand::parse("/clear"), Some(ChatCommand::Clear));
        assert_eq!(
            ChatCommand::parse("/export txt"),
            Some(ChatCommand::Export(ExportFormat::Txt))
        );
        assert_eq!(
            ChatCommand::parse("/export"),
            Some(ChatCommand::Export(ExportFormat::Json))
        );
        assert_eq!(
            ChatCommand::parse("/domain Legal"),
            Some(ChatCommand::Domain(Some(Domain::Legal)))
        );
        assert_eq!(ChatCommand::parse("/domain none"), Some(ChatCommand::Domain(None)));
        assert!(matches!(
            ChatCommand::parse("/domain finance"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(ChatCommand::parse("/nope"), Some(ChatCommand::Invalid(_))));
    }

    #[test]
    fn test_export_path_extension() {
        assert!(export_path(ExportFormat::Txt).to_string_lossy().ends_with(".txt"));
        assert!(export_path(ExportFormat::Json).to_string_lossy().ends_with(".json"));
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::parse_from(["palank-assist", "ask", "hello", "--offline", "--doc", "a.md"]);
        assert!(cli.offline);
        match cli.command {
            Commands::Ask { query, docs, domain } => {
                assert_eq!(query, "hello");
                assert_eq!(docs, vec![PathBuf::from("a.md")]);
                assert!(domain.is_none());
            }
            _ => panic!("expected ask"),
        }
    }

    #[tokio::test]
    async fn test_ingest_docs_reports_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("notes.txt");
        std::fs::write(&doc, "binary search halves the range").unwrap();

        let pipeline = build_pipeline(&AssistConfig::default()).unwrap();
        let report = ingest_docs(&pipeline, &[doc], &FileCollector::with_defaults())
            .await
            .unwrap()
            .unwrap();
        assert!(report.ready);
        assert_eq!(report.total_chunks, 1);
        assert!(ingest_docs(&pipeline, &[], &FileCollector::with_defaults())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_build_pipeline_saves_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let config = AssistConfig {
            upload_dir: Some(dir.path().join("uploads")),
            ..Default::default()
        };
        let pipeline = build_pipeline(&config).unwrap();
        assert_eq!(pipeline.upload_dir(), Some(dir.path().join("uploads").as_path()));

        let pipeline = build_pipeline(&AssistConfig::default()).unwrap();
        assert_eq!(
            pipeline.upload_dir(),
            Some(get_data_dir().join("uploads").as_path())
        );
    }
}
