//! 채팅 서비스
//!
//! 세션별 어시스턴트(메모리 분리)를 관리합니다.
//! 라우터, 생성기 레지스트리, 리트리벌 파이프라인은 모든 세션이 공유합니다.
//! 세션 수는 `max_sessions`로 제한하며, 넘치면 가장 오래 쓰지 않은 세션을 버립니다.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agents::GeneratorRegistry;
use crate::assistant::Assistant;
use crate::config::AssistConfig;
use crate::knowledge::{IngestReport, RetrievalPipeline};
use crate::llm::CompletionProvider;
use crate::protocol::{
    stream_lines, ChatRequest, ChatResponse, HealthStatus, ServiceRequest, ServiceResponse,
    UploadFile,
};
use crate::router::DomainRouter;

/// 세션 슬롯 (`last_used`는 단조 증가 카운터)
struct Session {
    assistant: Arc<Assistant>,
    last_used: u64,
}

#[derive(Default)]
struct SessionTable {
    entries: HashMap<String, Session>,
    clock: u64,
}

impl SessionTable {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// 가장 오래 쓰지 않은 세션 제거
    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, session)| session.last_used)
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

/// 세션 관리 채팅 서비스
pub struct ChatService {
    config: AssistConfig,
    router: Arc<DomainRouter>,
    generators: Arc<GeneratorRegistry>,
    pipeline: Arc<RetrievalPipeline>,
    sessions: Mutex<SessionTable>,
}

impl ChatService {
    /// 공유 컴포넌트로 생성
    pub fn new(
        config: AssistConfig,
        router: Arc<DomainRouter>,
        generators: Arc<GeneratorRegistry>,
        pipeline: Arc<RetrievalPipeline>,
    ) -> Self {
        Self {
            config,
            router,
            generators,
            pipeline,
            sessions: Mutex::new(SessionTable::default()),
        }
    }

    /// 완성 프로바이더 + 파이프라인에서 표준 구성으로 생성
    pub fn standard(
        config: AssistConfig,
        llm: Arc<dyn CompletionProvider>,
        pipeline: Arc<RetrievalPipeline>,
    ) -> Self {
        let router = DomainRouter::new(Arc::clone(&llm)).with_max_tokens(config.router_max_tokens);
        let generators =
            GeneratorRegistry::standard(llm, Some(Arc::clone(&pipeline)), &config);
        Self::new(config, Arc::new(router), Arc::new(generators), pipeline)
    }

    pub fn pipeline(&self) -> &Arc<RetrievalPipeline> {
        &self.pipeline
    }

    /// 세션 어시스턴트 (없으면 생성)
    pub async fn session(&self, session_id: &str) -> Arc<Assistant> {
        let mut sessions = self.sessions.lock().await;
        let now = sessions.tick();
        if let Some(session) = sessions.entries.get_mut(session_id) {
            session.last_used = now;
            return Arc::clone(&session.assistant);
        }

        while sessions.entries.len() >= self.config.max_sessions.max(1) {
            match sessions.evict_oldest() {
                Some(evicted) => tracing::info!(session = %evicted, "Evicted idle session"),
                None => break,
            }
        }

        tracing::debug!(session = session_id, "Creating session");
        let assistant = Arc::new(Assistant::from_config(
            Arc::clone(&self.router),
            Arc::clone(&self.generators),
            &self.config,
        ));
        sessions.entries.insert(
            session_id.to_string(),
            Session {
                assistant: Arc::clone(&assistant),
                last_used: now,
            },
        );
        assistant
    }

    /// 세션 종료 (메모리 폐기)
    pub async fn end_session(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .entries
            .remove(session_id)
            .is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.entries.len()
    }

    /// 채팅 요청 처리 (세션 ID가 없으면 새로 발급)
    pub async fn handle(&self, request: &ChatRequest) -> ChatResponse {
        let session_id = match request.session_id.trim() {
            "" => Uuid::new_v4().to_string(),
            id => id.to_string(),
        };

        let assistant = self.session(&session_id).await;
        let encoded = assistant
            .ask(request.message.trim(), request.selected_domain.as_deref())
            .await
            .encode();
        ChatResponse::from_encoded(session_id, &encoded)
    }

    /// 줄 단위 스트리밍 응답 (헤더 제외 본문, 마지막은 `[[END]]`)
    pub async fn handle_stream(&self, request: &ChatRequest) -> impl Stream<Item = String> {
        let response = self.handle(request).await;
        stream_lines(&response.response)
    }

    /// base64 업로드 인제스트
    pub async fn upload(&self, files: &[UploadFile]) -> Result<IngestReport> {
        let decoded = files
            .iter()
            .map(UploadFile::decode)
            .collect::<Result<Vec<_>>>()?;
        let report = self.pipeline.ingest_uploads(decoded).await?;
        tracing::info!(
            "Upload ingested: {} files, {} chunks (ready: {})",
            report.outcomes.len(),
            report.total_chunks,
            report.ready
        );
        Ok(report)
    }

    /// 상태 확인
    pub async fn health(&self) -> HealthStatus {
        let stats = self.pipeline.stats().await;
        HealthStatus {
            status: "ok".to_string(),
            sessions: self.session_count().await,
            retrieval_ready: stats.ready,
            chunk_count: stats.chunk_count,
        }
    }

    /// JSON-lines 요청 하나 처리 → 응답 목록
    ///
    /// 스트리밍 요청은 줄마다 `line` 응답을 하나씩 돌려줍니다.
    pub async fn dispatch(&self, request: ServiceRequest) -> Vec<ServiceResponse> {
        match request {
            ServiceRequest::Chat(req) if req.message.trim().is_empty() => {
                vec![empty_message()]
            }
            ServiceRequest::Stream(req) if req.message.trim().is_empty() => {
                vec![empty_message()]
            }
            ServiceRequest::Chat(req) => vec![ServiceResponse::Chat(self.handle(&req).await)],
            ServiceRequest::Stream(req) => {
                self.handle_stream(&req)
                    .await
                    .map(|text| ServiceResponse::Line { text })
                    .collect::<Vec<_>>()
                    .await
            }
            ServiceRequest::Upload { files } => match self.upload(&files).await {
                Ok(report) => vec![ServiceResponse::Upload(report)],
                Err(e) => vec![ServiceResponse::Error {
                    message: format!("{:#}", e),
                }],
            },
            ServiceRequest::Health => vec![ServiceResponse::Health(self.health().await)],
            ServiceRequest::End { session_id } => {
                let existed = self.end_session(session_id.trim()).await;
                vec![ServiceResponse::Ended {
                    session_id,
                    existed,
                }]
            }
        }
    }
}

fn empty_message() -> ServiceResponse {
    ServiceResponse::Error {
        message: "empty message".to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
