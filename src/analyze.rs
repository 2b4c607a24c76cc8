//! Analysis entry points.
//!
//! [`run_analysis`] is the whole request path for one ticket:
//!
//! ```text
//! ticket.asset ──▶ encode ──▶ build_request ──▶ backend call ──▶ Completion
//!                 (file read)   (template)        (one shot)
//! ```
//!
//! It never touches the session, so a caller can hold the future while the
//! session keeps accepting selections (a newer selection makes the completion
//! stale). [`Analyzer::analyze`] is the simple begin → run → finish form for
//! callers that have nothing else to do while waiting.

use crate::backend::{resolve_backend, VisionBackend};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisFailure, AnalyzerError, SessionError};
use crate::pipeline::encode::encode;
use crate::pipeline::llm::{AnalysisClient, AnalysisResult};
use crate::session::{AnalysisTicket, Completion, Session, Transition};
use std::sync::Arc;
use tracing::{debug, info};

/// Run one ticket to completion. Ordering is encode, build request, call.
pub async fn run_analysis(client: &AnalysisClient, ticket: AnalysisTicket) -> Completion {
    let generation = ticket.generation;
    let outcome = analyze_asset(client, &ticket).await;
    Completion {
        generation,
        outcome,
    }
}

async fn analyze_asset(
    client: &AnalysisClient,
    ticket: &AnalysisTicket,
) -> Result<AnalysisResult, AnalysisFailure> {
    let payload = encode(&ticket.asset).await?;
    debug!(
        "Encoded '{}' as {} ({} base64 chars)",
        ticket.asset.name,
        payload.mime,
        payload.base64.len()
    );

    let request = client.build_request(&payload);
    Ok(client.analyze(&request).await?)
}

/// Configuration plus a ready analysis client.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
    client: AnalysisClient,
}

impl Analyzer {
    /// Build the backend the configuration names. Fails fast on a missing
    /// credential or an unusable provider, before any network activity.
    pub fn from_config(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let backend = resolve_backend(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Use a caller-supplied backend.
    pub fn with_backend(config: AnalyzerConfig, backend: Arc<dyn VisionBackend>) -> Self {
        let client = AnalysisClient::new(backend, &config);
        info!(
            "Analyzer ready: backend={}, model={}",
            client.backend_name(),
            config.model
        );
        Self { config, client }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn client(&self) -> &AnalysisClient {
        &self.client
    }

    /// Begin, run and finish an analysis on `session`.
    pub async fn analyze(&self, session: &mut Session) -> Result<Transition, SessionError> {
        let ticket = session.begin_analysis()?;
        let completion = run_analysis(&self.client, ticket).await;
        Ok(session.finish(completion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ModelReply;
    use crate::error::AnalysisError;
    use crate::pipeline::ingest::FileCandidate;
    use crate::pipeline::llm::AnalysisRequest;
    use crate::session::{Phase, MSG_READ_FAILED};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &AnalysisRequest) -> Result<ModelReply, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mime = request.image().map(|p| p.mime.clone()).unwrap_or_default();
            Ok(ModelReply {
                content: Some(format!("## Key Structures\n- {mime}")),
                ..Default::default()
            })
        }
    }

    fn analyzer(backend: Arc<Echo>) -> Analyzer {
        let config = AnalyzerConfig::builder().api_key("test").build().unwrap();
        Analyzer::with_backend(config, backend)
    }

    #[tokio::test]
    async fn analyze_runs_to_success() {
        let backend = Arc::new(Echo::default());
        let a = analyzer(backend.clone());
        let mut session = Session::new();
        session
            .select_file(FileCandidate::from_bytes("e.webp", "image/webp", vec![1u8, 2]))
            .unwrap();

        let t = a.analyze(&mut session).await.unwrap();
        assert_eq!(t, Transition::Applied(Phase::Success));
        assert_eq!(
            session.result().unwrap().markdown,
            "## Key Structures\n- image/webp\n"
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreadable_file_fails_without_calling_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embryo.jpg");
        std::fs::write(&path, [0xFFu8, 0xD8, 0xFF]).unwrap();

        let backend = Arc::new(Echo::default());
        let a = analyzer(backend.clone());
        let mut session = Session::new();
        session
            .select_file(FileCandidate::from_path(&path).await.unwrap())
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        a.analyze(&mut session).await.unwrap();
        assert_eq!(session.phase(), Phase::Failed);
        assert_eq!(session.error_message(), Some(MSG_READ_FAILED));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analyze_with_no_image_is_refused() {
        let backend = Arc::new(Echo::default());
        let a = analyzer(backend.clone());
        let mut session = Session::new();
        assert_eq!(
            a.analyze(&mut session).await.unwrap_err(),
            SessionError::NoImage
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_credential_fails_before_any_backend_exists() {
        let config = AnalyzerConfig::builder()
            .ambient_credentials(false)
            .build()
            .unwrap();
        assert!(matches!(
            Analyzer::from_config(config),
            Err(AnalyzerError::MissingCredential)
        ));
    }

    #[test]
    fn explicit_credential_builds_the_http_backend() {
        let config = AnalyzerConfig::builder()
            .api_key("sk-test")
            .ambient_credentials(false)
            .build()
            .unwrap();
        let a = Analyzer::from_config(config).unwrap();
        assert_eq!(a.client().backend_name(), "chat-completions");
    }
}
