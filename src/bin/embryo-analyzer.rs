//! Terminal front end for embryo-analyzer.
//!
//! An interactive view over one [`Session`]: pick an image, trigger the
//! analysis, read the result, export the PDF. Flags only choose the model,
//! provider and export options; every action happens at the prompt.

use anyhow::{Context, Result};
use clap::Parser;
use embryo_analyzer::pipeline::markdown::{render, Block};
use embryo_analyzer::session::STATUS_ANALYZING;
use embryo_analyzer::{
    export_report, run_analysis, Analyzer, AnalyzerConfig, Completion, FileCandidate,
    OverflowPolicy, PageGeometry, PdfiumRasterizer, Phase, Session, SessionError,
    SessionObserver, Transition,
};
use futures::future::{BoxFuture, FutureExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Spinner driven by session phase changes ──────────────────────────────────

/// Shows an indicatif spinner for as long as the session is `Requesting`.
struct SpinnerObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl SpinnerObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }
}

impl SessionObserver for SpinnerObserver {
    fn on_phase_change(&self, from: Phase, to: Phase) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        if to == Phase::Requesting {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.set_message(STATUS_ANALYZING);
            bar.enable_steady_tick(Duration::from_millis(80));
            *slot = Some(bar);
        } else if from == Phase::Requesting {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn on_stale_response(&self, stale: u64, current: u64) {
        eprintln!(
            "{}",
            dim(&format!(
                "(discarded the answer to request #{stale}; the image changed since, now at #{current})"
            ))
        );
    }
}

const AFTER_HELP: &str = r#"COMMANDS (at the prompt):
  open <path>      Select an embryo image (png, jpeg, gif, webp, bmp, ...)
  analyze          Send the selected image for analysis
  show             Print the last analysis
  status           Show the session state
  export [path]    Save the PDF report (default: embryo_analysis_report.pdf)
  help             List commands
  quit             Leave

ENVIRONMENT VARIABLES:
  EMBRYO_ANALYZER_API_KEY   Credential for the vision service
  OPENAI_API_KEY            Used when EMBRYO_ANALYZER_API_KEY is unset
  ANTHROPIC_API_KEY, GEMINI_API_KEY, ...
                            Credentials for --provider backends
  PDFIUM_LIB_PATH           libpdfium to load for PDF export
  RUST_LOG                  Log filter (overrides --verbose)

The analysis is informational only and is not a medical assessment.
"#;

/// Analyse an embryo image with a vision model and export a PDF report.
#[derive(Parser, Debug)]
#[command(
    name = "embryo-analyzer",
    version,
    about = "Analyse an embryo image with a vision model and export a PDF report",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Vision model ID.
    #[arg(long, env = "EMBRYO_ANALYZER_MODEL", default_value = "gpt-4-turbo")]
    model: String,

    /// edgequake-llm provider (anthropic, gemini, ollama, ...). Default: the
    /// built-in chat-completions backend.
    #[arg(long, env = "EMBRYO_ANALYZER_PROVIDER")]
    provider: Option<String>,

    /// Base URL of the chat-completions endpoint.
    #[arg(long, env = "EMBRYO_ANALYZER_API_BASE")]
    api_base: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "EMBRYO_ANALYZER_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Max output tokens of the analysis.
    #[arg(long, env = "EMBRYO_ANALYZER_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Timeout of the analysis call in seconds.
    #[arg(long, env = "EMBRYO_ANALYZER_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Report page size.
    #[arg(long, value_enum, default_value = "a4")]
    page: PageArg,

    /// What to do when the analysis is taller than one page.
    #[arg(long, value_enum, default_value = "split")]
    overflow: OverflowArg,

    /// Default export path.
    #[arg(short, long, env = "EMBRYO_ANALYZER_OUTPUT")]
    output: Option<PathBuf>,

    /// libpdfium to load (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Image to select on startup.
    #[arg(long)]
    open: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EMBRYO_ANALYZER_VERBOSE")]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageArg {
    A4,
    Letter,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OverflowArg {
    Split,
    Clamp,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(v: OverflowArg) -> Self {
        match v {
            OverflowArg::Split => OverflowPolicy::Split,
            OverflowArg::Clamp => OverflowPolicy::Clamp,
        }
    }
}

/// Map CLI args to `AnalyzerConfig`.
fn build_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let page = match cli.page {
        PageArg::A4 => PageGeometry::a4(),
        PageArg::Letter => PageGeometry::letter(),
    };

    let mut builder = AnalyzerConfig::builder()
        .model(&cli.model)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .request_timeout_secs(cli.timeout)
        .page(page)
        .overflow(cli.overflow.into());

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(name) = cli.output.as_ref().and_then(|p| p.to_str()) {
        builder = builder.report_file_name(name);
    }

    builder.build().context("Invalid configuration")
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Open(PathBuf),
    Analyze,
    Show,
    Status,
    Export(Option<PathBuf>),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, unquote(r)),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "" => Command::Empty,
        "open" | "o" if !rest.is_empty() => Command::Open(PathBuf::from(rest)),
        "open" | "o" => Command::Unknown("open needs a path".into()),
        "analyze" | "analyse" | "a" => Command::Analyze,
        "show" | "s" => Command::Show,
        "status" => Command::Status,
        "export" | "e" => Command::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "help" | "h" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Unknown(format!("unknown command '{other}'")),
    }
}

fn print_help() {
    println!("{}", bold("Commands"));
    for (cmd, what) in [
        ("open <path>", "select an embryo image"),
        ("analyze", "analyse the selected image"),
        ("show", "print the last analysis"),
        ("status", "show the session state"),
        ("export [path]", "save the PDF report"),
        ("quit", "leave"),
    ] {
        println!("  {:<16}{}", cyan(cmd), dim(what));
    }
}

fn prompt(session: &Session) {
    let tag = match session.phase() {
        Phase::Idle => dim("idle"),
        Phase::Ready => cyan("ready"),
        Phase::Requesting => cyan("analyzing"),
        Phase::Success => green("done"),
        Phase::Failed => red("failed"),
    };
    print!("[{tag}] > ");
    io::stdout().flush().ok();
}

fn print_result(session: &Session) {
    let Some(result) = session.result() else {
        println!("{}", dim("No analysis yet. Use 'open <path>' then 'analyze'."));
        return;
    };

    println!("\n{}\n", bold("Analysis Result:"));
    for block in render(&result.markdown).blocks {
        match block {
            Block::Heading { text, .. } => println!("\n{}", bold(&cyan(&text))),
            Block::Bullet { depth, text } => {
                println!("{}• {}", "  ".repeat(depth as usize + 1), text)
            }
            Block::Numbered {
                depth,
                number,
                text,
            } => println!("{}{}. {}", "  ".repeat(depth as usize + 1), number, text),
            Block::Paragraph { text } => println!("{text}"),
            Block::Rule => println!("{}", dim(&"─".repeat(40))),
        }
    }
    println!(
        "\n{}",
        dim(&format!(
            "{} tokens in / {} tokens out, {}ms",
            result.input_tokens, result.output_tokens, result.duration_ms
        ))
    );
}

fn print_status(session: &Session, analyzer: &Analyzer) {
    println!("  phase       {}", session.phase());
    match session.asset() {
        Some(a) => println!("  image       {} ({})", a.name, a.mime),
        None => println!("  image       {}", dim("none")),
    }
    println!(
        "  backend     {} / {}",
        analyzer.client().backend_name(),
        analyzer.config().model
    );
    println!("  request     #{}", session.generation());
    if let Some(status) = session.status_line() {
        println!("  status      {}", status);
    }
    if let Some(msg) = session.error_message() {
        println!("  message     {}", red(msg));
    }
    if let Some(diag) = session.diagnostic() {
        println!("  detail      {}", dim(diag));
    }
    println!(
        "  export      {}",
        if session.can_export() {
            green("available")
        } else {
            dim("disabled")
        }
    );
}

async fn open_file(session: &mut Session, path: PathBuf) {
    let candidate = match FileCandidate::from_path(&path).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", red("✗"), e);
            return;
        }
    };
    match session.select_file(candidate) {
        Ok(asset) => println!("{} Selected {} ({})", green("✓"), bold(&asset.name), asset.mime),
        Err(_) => eprintln!("{} {}", red("✗"), session.error_message().unwrap_or_default()),
    }
}

/// Resolve once the in-flight analysis completes; never, if there is none.
async fn next_completion(pending: &mut Option<BoxFuture<'static, Completion>>) -> Completion {
    match pending {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library logs stay quiet by default; the spinner and the prompt carry
    // the feedback that matters.
    let filter = if cli.verbose { "debug" } else { "error" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and backend (fails fast without a credential) ───────
    let config = build_config(&cli)?;
    let analyzer = Analyzer::from_config(config).context("Cannot start the analyzer")?;
    let rasterizer = PdfiumRasterizer::from_config(analyzer.config());

    let observer = SpinnerObserver::new();
    let mut session = Session::new().with_observer(observer);

    println!(
        "{} {}  {}",
        cyan("◆"),
        bold("Embryo Analyzer"),
        dim(&format!(
            "{} via {}",
            analyzer.config().model,
            analyzer.client().backend_name()
        ))
    );
    println!("{}", dim("Type 'help' for commands."));

    if let Some(path) = cli.open.clone() {
        open_file(&mut session, path).await;
    }

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut pending: Option<BoxFuture<'static, Completion>> = None;

    loop {
        prompt(&session);

        tokio::select! {
            line = lines.next() => {
                let Some(line) = line else { break };
                let line = line.context("Failed to read from stdin")?;

                match parse_command(&line) {
                    Command::Empty => {}
                    Command::Help => print_help(),
                    Command::Quit => break,
                    Command::Unknown(msg) => eprintln!("{} {}", red("✗"), msg),
                    Command::Open(path) => open_file(&mut session, path).await,
                    Command::Show => print_result(&session),
                    Command::Status => print_status(&session, &analyzer),
                    Command::Analyze => match session.begin_analysis() {
                        Ok(ticket) => {
                            let client = analyzer.client().clone();
                            pending = Some(async move { run_analysis(&client, ticket).await }.boxed());
                        }
                        Err(SessionError::NoImage) => {
                            eprintln!("{} {}", red("✗"), session.error_message().unwrap_or_default());
                        }
                        Err(e) => eprintln!("{} {}", cyan("⚠"), e),
                    },
                    Command::Export(path) => {
                        if !session.can_export() {
                            eprintln!("{} Nothing to export yet: run a successful analysis first.", cyan("⚠"));
                            continue;
                        }
                        let target = path.as_deref();
                        match export_report(&session, &rasterizer, analyzer.config(), target).await {
                            Ok(saved) => println!("{} Report saved to {}", green("✔"), bold(&saved.display().to_string())),
                            Err(e) => eprintln!("{} Export failed: {}", red("✘"), e),
                        }
                    }
                }
            }
            completion = next_completion(&mut pending) => {
                pending = None;
                match session.finish(completion) {
                    Transition::Applied(Phase::Success) => print_result(&session),
                    Transition::Applied(_) => {
                        eprintln!("{} {}", red("✘"), session.error_message().unwrap_or_default());
                    }
                    Transition::Discarded { .. } => {}
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert_eq!(parse_command("  analyze "), Command::Analyze);
        assert_eq!(
            parse_command("open \"my embryo.png\""),
            Command::Open(PathBuf::from("my embryo.png"))
        );
        assert_eq!(parse_command("export"), Command::Export(None));
        assert_eq!(
            parse_command("export out/r.pdf"),
            Command::Export(Some(PathBuf::from("out/r.pdf")))
        );
        assert_eq!(parse_command(""), Command::Empty);
        assert!(matches!(parse_command("open"), Command::Unknown(_)));
        assert!(matches!(parse_command("frobnicate"), Command::Unknown(_)));
    }
}
