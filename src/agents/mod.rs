//! 도메인 생성기 (에이전트)
//!
//! 다섯 도메인이 하나의 `Generator` 인터페이스를 공유합니다.
//! 도메인별 차이는 프롬프트 템플릿(데이터)과 리트리벌 사용 여부뿐입니다.
//!
//! 리트리벌이 켜진 도메인은 먼저 파이프라인에 질의해 결과를 질의 뒤에 붙이고,
//! 리트리벌이 실패하면 실패 메모만 붙인 채 계속 진행합니다.

pub mod prompts;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::AssistConfig;
use crate::domain::Domain;
use crate::knowledge::RetrievalPipeline;
use crate::llm::CompletionProvider;
use crate::memory::{render_entries, MemoryEntry};

pub use prompts::{template_for, PromptTemplate};

/// 리트리벌 기본 청크 수
pub const DEFAULT_TOP_K: usize = 5;
/// 생성 호출 기본 출력 토큰 한도
pub const DEFAULT_GENERATION_MAX_TOKENS: u32 = 512;

// ============================================================================
// Types
// ============================================================================

/// 생성기에 넘기는 공유 컨텍스트
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// 현재 메모리 스냅샷 (오래된 순)
    pub memory: Vec<MemoryEntry>,
}

/// 도메인 생성기 트레이트
#[async_trait]
pub trait Generator: Send + Sync {
    /// 담당 도메인
    fn domain(&self) -> Domain;

    /// 질의에 대한 답변 생성 (완성 실패는 Err)
    async fn run(&self, query: &str, context: &GenerationContext) -> Result<String>;
}

// ============================================================================
// DomainAgent
// ============================================================================

/// 템플릿 기반 도메인 에이전트
pub struct DomainAgent {
    domain: Domain,
    template: PromptTemplate,
    llm: Arc<dyn CompletionProvider>,
    retrieval: Option<Arc<RetrievalPipeline>>,
    top_k: usize,
    max_tokens: u32,
}

impl DomainAgent {
    /// 도메인 기본 템플릿으로 생성 (리트리벌 없음)
    pub fn new(domain: Domain, llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            domain,
            template: template_for(domain),
            llm,
            retrieval: None,
            top_k: DEFAULT_TOP_K,
            max_tokens: DEFAULT_GENERATION_MAX_TOKENS,
        }
    }

    /// 리트리벌 파이프라인 연결
    pub fn with_retrieval(mut self, pipeline: Arc<RetrievalPipeline>, top_k: usize) -> Self {
        self.retrieval = Some(pipeline);
        self.top_k = top_k;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn retrieval_enabled(&self) -> bool {
        self.retrieval.is_some()
    }

    /// 리트리벌 결과로 질의 보강
    ///
    /// - 결과 없음(not-ready 포함): 질의 그대로
    /// - 결과 있음: `Relevant document excerpts:` 아래 번호 붙은 발췌
    /// - 실패: `[Document retrieval failed: ...]` 메모
    async fn enrich(&self, query: &str) -> String {
        let pipeline = match &self.retrieval {
            Some(pipeline) => pipeline,
            None => return query.to_string(),
        };

        match pipeline.query(query, self.top_k).await {
            Ok(excerpts) if excerpts.is_empty() => query.to_string(),
            Ok(excerpts) => {
                tracing::debug!(
                    domain = %self.domain,
                    "Enriching query with {} excerpts",
                    excerpts.len()
                );
                let numbered = excerpts
                    .iter()
                    .enumerate()
                    .map(|(i, text)| format!("[{}] {}", i + 1, text))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{}\n\nRelevant document excerpts:\n{}", query, numbered)
            }
            Err(e) => {
                tracing::warn!(domain = %self.domain, "Retrieval degraded: {:#}", e);
                format!("{}\n\n[Document retrieval failed: {:#}]", query, e)
            }
        }
    }
}

#[async_trait]
impl Generator for DomainAgent {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn run(&self, query: &str, context: &GenerationContext) -> Result<String> {
        let enriched = self.enrich(query).await;
        let prompt = self
            .template
            .build(&enriched, &render_entries(&context.memory));

        tracing::debug!(domain = %self.domain, "Prompt size: {} chars", prompt.len());

        let output = self.llm.complete(&prompt, self.max_tokens).await?;
        Ok(output.trim().to_string())
    }
}

// ============================================================================
// GeneratorRegistry
// ============================================================================

/// 도메인 → 생성기 매핑
#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<Domain, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 다섯 도메인 에이전트를 설정대로 구성
    ///
    /// `retrieval_domains`에 포함된 도메인에만 파이프라인을 연결합니다.
    pub fn standard(
        llm: Arc<dyn CompletionProvider>,
        pipeline: Option<Arc<RetrievalPipeline>>,
        config: &AssistConfig,
    ) -> Self {
        let mut registry = Self::new();

        for domain in Domain::ALL {
            let mut agent = DomainAgent::new(domain, Arc::clone(&llm))
                .with_max_tokens(config.generation_max_tokens);
            if let Some(pipeline) = &pipeline {
                if config.retrieval_enabled(domain) {
                    agent = agent.with_retrieval(Arc::clone(pipeline), config.top_k);
                }
            }
            registry.register(Arc::new(agent));
        }

        registry
    }

    /// 생성기 등록 (같은 도메인은 교체)
    pub fn register(&mut self, generator: Arc<dyn Generator>) {
        self.generators.insert(generator.domain(), generator);
    }

    /// 도메인의 생성기 (없으면 general로 대체)
    pub fn resolve(&self, domain: Domain) -> Option<Arc<dyn Generator>> {
        self.generators
            .get(&domain)
            .or_else(|| self.generators.get(&Domain::General))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::FlakyEmbedding;
    use crate::knowledge::{word_chunker, ChunkConfig, DocumentLoader};
    use crate::llm::testing::{FailingCompletion, ScriptedCompletion};
    use crate::memory::ConversationMemory;

    async fn pipeline_with(text: &str, embedder: Arc<FlakyEmbedding>) -> Arc<RetrievalPipeline> {
        let pipeline = RetrievalPipeline::new(
            DocumentLoader::new(word_chunker(ChunkConfig::without_overlap(200))),
            embedder,
        );
        pipeline
            .ingest_uploads(vec![("notes.txt".to_string(), text.as_bytes().to_vec())])
            .await
            .unwrap();
        Arc::new(pipeline)
    }

    #[tokio::test]
    async fn test_run_trims_output_and_includes_memory() {
        let llm = Arc::new(ScriptedCompletion::new(["  Use a HashMap.  \n"]));
        let agent = DomainAgent::new(Domain::Coding, llm.clone()).with_max_tokens(64);

        let memory = ConversationMemory::default();
        memory.record("earlier question", "earlier answer");
        let context = GenerationContext {
            memory: memory.snapshot(),
        };

        let output = agent.run("how do I count words", &context).await.unwrap();
        assert_eq!(output, "Use a HashMap.");

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.starts_with("You are a Senior Software Engineer."));
        assert!(prompt.contains("User: earlier question\nAssistant: earlier answer"));
        assert!(prompt.contains("User Query:\nhow do I count words\n"));
        assert_eq!(llm.prompts.lock().unwrap()[0].1, 64);
    }

    #[tokio::test]
    async fn test_retrieval_enriches_query() {
        let llm = Arc::new(ScriptedCompletion::new(["ok"]));
        let pipeline = pipeline_with(
            "Offer acceptance and consideration form a contract.",
            Arc::new(FlakyEmbedding::new(64)),
        )
        .await;
        let agent = DomainAgent::new(Domain::Legal, llm.clone()).with_retrieval(pipeline, 5);

        agent.run("what forms a contract", &GenerationContext::default()).await.unwrap();

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains(
            "what forms a contract\n\nRelevant document excerpts:\n[1] Offer acceptance"
        ));
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_note() {
        let llm = Arc::new(ScriptedCompletion::new(["still answered"]));
        let embedder = Arc::new(FlakyEmbedding::new(64));
        let pipeline = pipeline_with("some notes", embedder.clone()).await;
        embedder.set_failing(true);

        let agent = DomainAgent::new(Domain::Education, llm.clone()).with_retrieval(pipeline, 5);
        let output = agent.run("teach me", &GenerationContext::default()).await.unwrap();

        assert_eq!(output, "still answered");
        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("teach me\n\n[Document retrieval failed: "));
        assert!(prompt.contains("embedding backend down"));
    }

    #[tokio::test]
    async fn test_not_ready_pipeline_leaves_query_unchanged() {
        let llm = Arc::new(ScriptedCompletion::new(["fine"]));
        let pipeline = Arc::new(RetrievalPipeline::new(
            DocumentLoader::with_defaults(),
            Arc::new(FlakyEmbedding::new(16)),
        ));
        let agent = DomainAgent::new(Domain::Medical, llm.clone()).with_retrieval(pipeline, 5);

        agent.run("fever", &GenerationContext::default()).await.unwrap();
        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("User Query:\nfever\n\nRespond safely"));
        assert!(!prompt.contains("excerpts"));
    }

    #[tokio::test]
    async fn test_completion_failure_is_error() {
        let agent = DomainAgent::new(Domain::General, Arc::new(FailingCompletion::default()));
        let err = agent.run("hi", &GenerationContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("completion capability failed"));
    }

    #[tokio::test]
    async fn test_standard_registry_wires_retrieval_by_policy() {
        let llm = Arc::new(ScriptedCompletion::new(["x"]));
        let pipeline = pipeline_with(
            "Shared notes about fevers, contracts and algebra.",
            Arc::new(FlakyEmbedding::new(16)),
        )
        .await;
        let registry =
            GeneratorRegistry::standard(llm.clone(), Some(pipeline), &AssistConfig::default());
        assert_eq!(registry.len(), 5);

        for domain in Domain::ALL {
            let generator = registry.resolve(domain).unwrap();
            assert_eq!(generator.domain(), domain);
            generator
                .run("tell me about the notes", &GenerationContext::default())
                .await
                .unwrap();

            let prompt = llm.last_prompt().unwrap();
            let enriched = prompt.contains("Relevant document excerpts:\n[1] Shared notes");
            match domain {
                Domain::Education | Domain::Medical | Domain::Legal => {
                    assert!(enriched, "{} prompt should carry excerpts", domain)
                }
                Domain::Coding | Domain::General => {
                    assert!(!enriched, "{} prompt should not carry excerpts", domain)
                }
            }
        }
    }

    #[test]
    fn test_resolve_falls_back_to_general() {
        let llm: Arc<dyn CompletionProvider> = Arc::new(ScriptedCompletion::new(["x"]));
        let mut registry = GeneratorRegistry::new();
        assert!(registry.resolve(Domain::Legal).is_none());

        registry.register(Arc::new(DomainAgent::new(Domain::General, llm)));
        assert_eq!(registry.resolve(Domain::Legal).unwrap().domain(), Domain::General);
    }
}
