//! Knowledge 모듈 - 문서 리트리벌
//!
//! - Chunker: 단어 누적 + 오버랩 청킹
//! - Loader: PDF/TXT/MD → 청크
//! - Vector: 정확한 L2 최근접 이웃 인덱스
//! - Pipeline: 인제스트/질의 + ready 상태 관리

mod chunker;
mod loader;
mod pipeline;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, word_chunker, ChunkConfig, Chunker, DocumentChunk, WordWindowChunker,
};
pub use loader::DocumentLoader;
pub use pipeline::{IngestOutcome, IngestReport, PipelineStats, RetrievalPipeline};
pub use vector::{euclidean_distance, FlatL2Index, SearchHit, VectorIndex};
