//! Integration tests for the analyse → display → export flow.
//!
//! The vision service and pdfium are replaced by scripted doubles, so these
//! run offline. The HTTP backend is exercised against a mockito server.

use async_trait::async_trait;
use embryo_analyzer::backend::http::ChatCompletionsBackend;
use embryo_analyzer::pipeline::markdown::render;
use embryo_analyzer::report::view::ReportView;
use embryo_analyzer::session::{MSG_ANALYSIS_FAILED, STATUS_ANALYZING};
use embryo_analyzer::{
    build_report, export_report, run_analysis, AnalysisError, AnalysisRequest, Analyzer,
    AnalyzerConfig, ExportError, FileCandidate, ModelReply, OverflowPolicy, Phase, Rasterizer,
    Session, SessionError, SessionObserver, Transition, VisionBackend,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

// ── Doubles ──────────────────────────────────────────────────────────────────

/// Replies with the same scripted outcome every time and counts calls.
struct Scripted {
    outcome: Result<ModelReply, AnalysisError>,
    calls: AtomicUsize,
}

impl Scripted {
    fn ok(markdown: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(ModelReply {
                content: Some(markdown.to_string()),
                model: Some("scripted".into()),
                input_tokens: 900,
                output_tokens: 120,
            }),
            calls: AtomicUsize::new(0),
        })
    }

    fn err(error: AnalysisError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &AnalysisRequest) -> Result<ModelReply, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Produces a white raster of the view's size at 2 px/pt, like pdfium would.
struct FakeRasterizer {
    height_px: Option<u32>,
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn capture(&self, view: &ReportView) -> Result<DynamicImage, ExportError> {
        let w = (view.width_pt * 2.0) as u32;
        let h = self.height_px.unwrap_or((view.height_pt * 2.0) as u32);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            w,
            h,
            image::Rgb([255, 255, 255]),
        )))
    }
}

#[derive(Default)]
struct PhaseLog(Mutex<Vec<Phase>>);

impl SessionObserver for PhaseLog {
    fn on_phase_change(&self, _from: Phase, to: Phase) {
        self.0.lock().unwrap().push(to);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const KEY_STRUCTURES: &str = "## Key Structures\n- zona pellucida visible";

fn image_bytes(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(48, 48, |x, y| {
        image::Rgb([(x * 5) as u8, (y * 5) as u8, ((x * y) % 251) as u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

/// A real PNG of roughly 2 KB.
fn png_bytes() -> Vec<u8> {
    image_bytes(ImageFormat::Png)
}

fn png_candidate() -> FileCandidate {
    FileCandidate::from_bytes("embryo.png", "image/png", png_bytes())
}

fn config() -> AnalyzerConfig {
    AnalyzerConfig::builder().api_key("test-key").build().unwrap()
}

fn analyzer(backend: Arc<Scripted>) -> Analyzer {
    Analyzer::with_backend(config(), backend)
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_analysis_walks_all_phases() {
    let log = Arc::new(PhaseLog::default());
    let backend = Scripted::ok(KEY_STRUCTURES);
    let analyzer = analyzer(backend.clone());
    let mut session = Session::new().with_observer(log.clone());
    assert_eq!(session.phase(), Phase::Idle);

    assert_ok!(session.select_file(png_candidate()));
    let ticket = assert_ok!(session.begin_analysis());
    assert_eq!(session.status_line(), Some(STATUS_ANALYZING));

    let completion = run_analysis(analyzer.client(), ticket).await;
    assert_eq!(session.finish(completion), Transition::Applied(Phase::Success));

    assert_eq!(
        *log.0.lock().unwrap(),
        vec![Phase::Ready, Phase::Requesting, Phase::Success]
    );
    let result = session.result().expect("result stored");
    let rendered = render(&result.markdown);
    assert_eq!(rendered.headings().next(), Some("Key Structures"));
    assert!(session.can_export());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn transport_error_fails_with_generic_message() {
    let backend = Scripted::err(AnalysisError::Network("connection reset".into()));
    let analyzer = analyzer(backend.clone());
    let mut session = Session::new();
    session.select_file(png_candidate()).unwrap();

    analyzer.analyze(&mut session).await.unwrap();

    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.error_message(), Some(MSG_ANALYSIS_FAILED));
    assert!(session.diagnostic().unwrap().contains("connection reset"));
    assert!(session.result().is_none());
    assert!(!session.can_export());

    let raster = FakeRasterizer { height_px: None };
    let err = assert_err!(build_report(&session, &raster, &config()).await);
    assert!(matches!(err, ExportError::NotReady));
}

#[tokio::test]
async fn response_for_replaced_image_is_discarded() {
    let backend = Scripted::ok(KEY_STRUCTURES);
    let analyzer = analyzer(backend.clone());
    let mut session = Session::new();
    session.select_file(png_candidate()).unwrap();
    let ticket = session.begin_analysis().unwrap();

    // The user picks another file while the call is outstanding.
    session
        .select_file(FileCandidate::from_bytes("second.jpg", "image/jpeg", png_bytes()))
        .unwrap();

    let completion = run_analysis(analyzer.client(), ticket).await;
    let transition = session.finish(completion);
    assert!(matches!(transition, Transition::Discarded { .. }));
    assert_eq!(session.phase(), Phase::Ready);
    assert_eq!(session.asset().unwrap().name, "second.jpg");
    assert!(session.result().is_none());
}

#[tokio::test]
async fn no_second_call_while_requesting() {
    let backend = Scripted::ok(KEY_STRUCTURES);
    let analyzer = analyzer(backend.clone());
    let mut session = Session::new();
    session.select_file(png_candidate()).unwrap();

    let ticket = session.begin_analysis().unwrap();
    for _ in 0..3 {
        assert!(matches!(
            analyzer.analyze(&mut session).await,
            Err(SessionError::AnalysisInFlight { .. })
        ));
    }
    assert_eq!(backend.calls(), 0);

    let completion = run_analysis(analyzer.client(), ticket).await;
    session.finish(completion);
    assert_eq!(backend.calls(), 1);
    assert_eq!(session.phase(), Phase::Success);
}

#[tokio::test]
async fn invalid_file_is_rejected() {
    let mut session = Session::new();
    session.select_file(png_candidate()).unwrap();
    assert!(session
        .select_file(FileCandidate::from_bytes("report.pdf", "application/pdf", vec![b'%']))
        .is_err());
    assert!(session.asset().is_none());
    assert_eq!(session.phase(), Phase::Idle);
}

// ── Export ───────────────────────────────────────────────────────────────────

async fn successful_session() -> Session {
    let analyzer = analyzer(Scripted::ok(KEY_STRUCTURES));
    let mut session = Session::new();
    session.select_file(png_candidate()).unwrap();
    analyzer.analyze(&mut session).await.unwrap();
    session
}

#[tokio::test]
async fn export_writes_result_and_original_pages() {
    let session = successful_session().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embryo_analysis_report.pdf");

    let saved = export_report(
        &session,
        &FakeRasterizer { height_px: None },
        &config(),
        Some(&path),
    )
    .await
    .unwrap();

    assert_eq!(saved, path);
    let pdf = lopdf::Document::load(&path).unwrap();
    assert_eq!(pdf.get_pages().len(), 2);
}

#[tokio::test]
async fn export_handles_non_png_uploads() {
    for (name, mime, format) in [
        ("embryo.tiff", "image/tiff", ImageFormat::Tiff),
        ("embryo.bmp", "image/bmp", ImageFormat::Bmp),
        ("embryo.jpg", "image/jpeg", ImageFormat::Jpeg),
    ] {
        let analyzer = analyzer(Scripted::ok(KEY_STRUCTURES));
        let mut session = Session::new();
        session
            .select_file(FileCandidate::from_bytes(name, mime, image_bytes(format)))
            .unwrap();
        analyzer.analyze(&mut session).await.unwrap();
        assert!(session.can_export(), "{mime}");

        let doc = build_report(&session, &FakeRasterizer { height_px: None }, &config())
            .await
            .unwrap_or_else(|e| panic!("{mime}: {e}"));
        assert_eq!(doc.page_count(), 2, "{mime}");
    }
}

#[tokio::test]
async fn empty_capture_is_an_error() {
    let session = successful_session().await;
    let blank = FakeRasterizer {
        height_px: Some(0),
    };
    let err = assert_err!(build_report(&session, &blank, &config()).await);
    assert!(matches!(err, ExportError::Capture(_)), "{err:?}");
}

#[tokio::test]
async fn tall_view_splits_or_clamps() {
    let session = successful_session().await;
    // about 3.2 pages of content at A4
    let tall = FakeRasterizer {
        height_px: Some(5000),
    };

    let split = build_report(&session, &tall, &config()).await.unwrap();
    assert_eq!(split.page_count(), 4 + 1);

    let clamp_config = AnalyzerConfig::builder()
        .api_key("test-key")
        .overflow(OverflowPolicy::Clamp)
        .build()
        .unwrap();
    let clamped = build_report(&session, &tall, &clamp_config).await.unwrap();
    assert_eq!(clamped.page_count(), 1 + 1);
}

// ── HTTP backend against a mock server ───────────────────────────────────────

fn http_request() -> AnalysisRequest {
    let analyzer = analyzer(Scripted::ok(""));
    analyzer
        .client()
        .build_request(&embryo_analyzer::pipeline::encode::EncodedPayload {
            mime: "image/png".into(),
            base64: "iVBORw0KGgo=".into(),
        })
}

#[tokio::test]
async fn http_backend_reads_first_choice() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r###"{"model":"gpt-4-turbo","choices":[{"message":{"role":"assistant","content":"## Key Structures\n- zona pellucida visible"}}],"usage":{"prompt_tokens":812,"completion_tokens":64}}"###,
        )
        .create_async()
        .await;

    let backend = ChatCompletionsBackend::new(&server.url(), "sk-test", 5).unwrap();
    let reply = backend.complete(&http_request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(reply.content.as_deref(), Some(KEY_STRUCTURES));
    assert_eq!(reply.input_tokens, 812);
    assert_eq!(reply.output_tokens, 64);
}

#[tokio::test]
async fn http_backend_maps_error_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
        .create_async()
        .await;

    let backend = ChatCompletionsBackend::new(&server.url(), "bad", 5).unwrap();
    let err = backend.complete(&http_request()).await.unwrap_err();
    assert_eq!(
        err,
        AnalysisError::Model {
            status: Some(401),
            detail: "Incorrect API key provided".into()
        }
    );
}

#[tokio::test]
async fn http_backend_unreachable_is_network_error() {
    // Port 9 (discard) on localhost is closed on test machines.
    let backend = ChatCompletionsBackend::new("http://127.0.0.1:9", "k", 5).unwrap();
    let err = backend.complete(&http_request()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Network(_)), "{err:?}");
}
