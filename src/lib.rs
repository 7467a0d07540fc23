//! palank-assist - 멀티 도메인 어시스턴트
//!
//! 자유 텍스트 질의를 도메인(education, coding, medical, legal, general)으로
//! 라우팅하고, 필요한 도메인은 로컬 리트리벌 파이프라인의 문서 발췌로
//! 질의를 보강한 뒤 도메인 전용 프롬프트로 답변을 생성합니다.
//!
//! - `router`: LLM 분류 + 결정적 키워드 폴백 (절대 실패하지 않음)
//! - `knowledge`: 청킹 → 임베딩 → 정확한 L2 검색
//! - `assistant`: 도메인 판정 정책 + 생성기 디스패치 + 메모리

pub mod agents;
pub mod assistant;
pub mod cli;
pub mod collector;
pub mod config;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod protocol;
pub mod router;
pub mod service;

// Re-exports
pub use agents::{DomainAgent, GenerationContext, Generator, GeneratorRegistry, PromptTemplate};
pub use assistant::{Assistant, AssistantReply};
pub use config::{get_data_dir, AssistConfig, EmbedderKind};
pub use domain::{Domain, Responder};
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, HashEmbedding};
pub use error::AssistError;
pub use knowledge::{
    ChunkConfig, Chunker, DocumentChunk, DocumentLoader, FlatL2Index, IngestOutcome, IngestReport,
    RetrievalPipeline, VectorIndex,
};
pub use llm::{create_completion_provider, CompletionProvider, OfflineCompletion, OpenAiCompatible};
pub use memory::{ConversationMemory, ExportFormat, MemoryEntry, Role};
pub use protocol::{encode_reply, parse_header, strip_header, ChatRequest, ChatResponse, END_MARKER};
pub use router::{classify_via_keywords, DomainRouter, RouteOutcome, RoutingResult};
pub use service::ChatService;
