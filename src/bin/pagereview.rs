//! CLI binary for edgequake-pagereview.
//!
//! A thin shim over the library crate: `run` maps flags to the orchestrator
//! and prints results, `serve` starts the analysis endpoint.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pagereview::config::FALLBACK_MODEL;
use edgequake_pagereview::export::infer_mode;
use edgequake_pagereview::server::{self, AppState};
use edgequake_pagereview::{
    docx_report, json_report, report_file_name, write_report, AccessPolicy, GatewayConfig,
    GeminiClient, GeminiClientFactory, LlmProviderModel, ModelGateway, Orchestrator,
    PageAnalyzer, PageStatus, RemoteAnalyzer, ReviewConfig, ReviewError, RunSummary, Snapshot,
    TaskMode, VisionModel,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate every page title, print the table
  pagereview run deck.pdf

  # Proofread and write a Word report
  pagereview run --task proofread brochure.pdf -o proofreading-report.docx

  # Retry failed pages up to twice more within the same invocation
  pagereview run --retries 2 deck.pdf -o report.docx

  # Use a shared server instead of a local key
  pagereview run --server http://review.internal:3000 --access-code "$ACCESS_CODE" deck.pdf

  # Another vision provider through edgequake-llm
  pagereview run --provider openai --model gpt-4.1-mini deck.pdf

  # Start the analysis endpoint
  pagereview serve --port 3000

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY      Default Gemini API key (run, serve)
  GOOGLE_MODEL_NAME   Primary model; the fallback is gemini-1.5-pro
  ACCESS_CODE         serve: phrase that unlocks the server key
                      run:   phrase sent to --server
  PDFIUM_LIB_PATH     pdfium shared library, or the directory holding it
"#;

/// Translate titles or proofread PDF pages with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pagereview",
    version,
    about = "Translate titles or proofread PDF pages with Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGEREVIEW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "PAGEREVIEW_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse every page of a PDF and report the findings.
    Run(RunArgs),
    /// Serve POST /api/analyze-page.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Primary model ID. A failed call is retried once on the fixed fallback.
    #[arg(long, env = "GOOGLE_MODEL_NAME", default_value = FALLBACK_MODEL)]
    model: String,

    /// Max model output tokens per page.
    #[arg(long, env = "PAGEREVIEW_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "PAGEREVIEW_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Ceiling for one page analysis in seconds, fallback included.
    #[arg(long, env = "PAGEREVIEW_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

impl ModelArgs {
    fn gateway_config(&self) -> Result<GatewayConfig> {
        GatewayConfig::builder()
            .primary_model(&self.model)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .api_timeout_secs(self.api_timeout)
            .build()
            .context("Invalid model configuration")
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Analysis to perform on every page.
    #[arg(long, value_enum, env = "PAGEREVIEW_TASK", default_value = "translate")]
    task: TaskArg,

    /// Write a Word report to this file.
    #[arg(short, long, env = "PAGEREVIEW_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the page records as JSON instead of a table.
    #[arg(long, env = "PAGEREVIEW_JSON")]
    json: bool,

    #[command(flatten)]
    model: ModelArgs,

    /// Vision provider: google (Gemini REST with GOOGLE_API_KEY) or any
    /// edgequake-llm provider (openai, anthropic, gemini, ollama, ...).
    #[arg(long, env = "PAGEREVIEW_PROVIDER", default_value = "google")]
    provider: String,

    /// Gemini API key for the google provider.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Send pages to a running `pagereview serve` instead of a model.
    #[arg(long, env = "PAGEREVIEW_SERVER")]
    server: Option<String>,

    /// Access phrase (or own API key) sent to --server.
    #[arg(long, env = "ACCESS_CODE", hide_env_values = true)]
    access_code: Option<String>,

    /// Page scale factor relative to 72 DPI (0.25–5.0).
    #[arg(long, env = "PAGEREVIEW_SCALE", default_value_t = 1.5)]
    scale: f32,

    /// JPEG quality of the page image (1–100).
    #[arg(long, env = "PAGEREVIEW_QUALITY", default_value_t = 80)]
    quality: u8,

    /// Number of pages analysed at once.
    #[arg(short, long, env = "PAGEREVIEW_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Extra runs over pages that failed.
    #[arg(long, env = "PAGEREVIEW_RETRIES", default_value_t = 0)]
    retries: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGEREVIEW_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// pdfium shared library, or the directory holding it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAGEREVIEW_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PAGEREVIEW_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "PAGEREVIEW_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    #[command(flatten)]
    model: ModelArgs,

    /// Server-side Gemini API key.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Phrase that unlocks the server key. Unset: every caller may use it.
    #[arg(long, env = "ACCESS_CODE", hide_env_values = true)]
    access_code: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TaskArg {
    Translate,
    Proofread,
}

impl From<TaskArg> for TaskMode {
    fn from(v: TaskArg) -> Self {
        match v {
            TaskArg::Translate => TaskMode::Translate,
            TaskArg::Proofread => TaskMode::Proofread,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Run(args) => !cli.quiet && !args.no_progress,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => run(args, show_progress, cli.quiet).await,
        Command::Serve(args) => serve(args).await,
    }
}

// ── serve ────────────────────────────────────────────────────────────────────

async fn serve(args: ServeArgs) -> Result<()> {
    let state = AppState::new(
        AccessPolicy::new(args.access_code, args.api_key),
        Arc::new(GeminiClientFactory::new(reqwest::Client::new())),
        args.model.gateway_config()?,
    );
    server::serve(state, &args.host, args.port)
        .await
        .context("Server failed")
}

// ── run ──────────────────────────────────────────────────────────────────────

async fn run(args: RunArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let mode = TaskMode::from(args.task);
    let analyzer = build_analyzer(&args)?;
    let config = build_config(&args)?;

    let mut review = Orchestrator::new(config, analyzer);
    let pages = review
        .load_pdf(&args.input)
        .await
        .with_context(|| format!("Failed to load '{}'", args.input))?;

    if !quiet {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{} of {} pages ({})…", capitalise(mode.as_str()), pages, args.input))
        );
    }

    let mut total = RunSummary::default();
    for pass in 0..=args.retries {
        if pass > 0 {
            if review.stats().failed == 0 || total.cancelled {
                break;
            }
            if !quiet {
                eprintln!(
                    "{} retrying {} failed pages (pass {}/{})",
                    cyan("↻"),
                    review.stats().failed,
                    pass,
                    args.retries
                );
            }
        }

        let handle = review.start(mode).context("Failed to start run")?;
        let stop = handle.stop_handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} stopping after in-flight pages…", cyan("■"));
                stop.stop();
            }
        });
        let progress = show_progress.then(|| spawn_progress(&review));

        let summary = handle.wait().await.context("Run failed")?;
        ctrl_c.abort();
        if let Some(progress) = progress {
            progress.await.ok();
        }

        total.attempted += summary.attempted;
        total.cancelled |= summary.cancelled;
    }

    let snapshot = review.snapshot();
    let stats = snapshot.stats();
    total.completed = stats.completed;
    total.failed = stats.failed;

    // ── Results ──────────────────────────────────────────────────────────
    if args.json {
        println!("{}", json_report(&snapshot.pages, mode)?);
    } else {
        print_table(&snapshot, mode);
    }

    if let Some(ref path) = args.output {
        let report_mode = infer_mode(&snapshot.pages).unwrap_or(mode);
        let bytes = docx_report(&snapshot.pages, report_mode)?;
        write_report(path, &bytes).await?;
    }

    if !quiet {
        print_summary(&total, stats.total, args.output.as_ref(), mode);
    }

    Ok(())
}

/// Pick the page analyzer from `--server` / `--provider`.
fn build_analyzer(args: &RunArgs) -> Result<Arc<dyn PageAnalyzer>> {
    if let Some(ref url) = args.server {
        let mut remote = RemoteAnalyzer::new(url)
            .with_timeout(args.model.api_timeout + 10)
            .context("Failed to build HTTP client")?;
        if let Some(ref code) = args.access_code {
            remote = remote.with_access_code(code);
        }
        return Ok(Arc::new(remote));
    }

    let gateway_config = args.model.gateway_config()?;
    let model: Arc<dyn VisionModel> = match args.provider.as_str() {
        "google" => {
            let key = args
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ReviewError::ProviderNotConfigured {
                    provider: "google".into(),
                    hint: "Set GOOGLE_API_KEY, pass --api-key, or use --server.".into(),
                })?;
            Arc::new(GeminiClient::new(reqwest::Client::new(), key))
        }
        other => Arc::new(LlmProviderModel::new(other)),
    };

    Ok(Arc::new(ModelGateway::new(model, gateway_config)))
}

/// Map CLI args to `ReviewConfig`.
fn build_config(args: &RunArgs) -> Result<ReviewConfig> {
    let mut builder = ReviewConfig::builder()
        .render_scale(args.scale)
        .jpeg_quality(args.quality)
        .concurrency(args.concurrency)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }

    builder.build().context("Invalid configuration")
}

// ── Progress ─────────────────────────────────────────────────────────────────

/// Render a progress bar and per-page log lines from store snapshots until
/// the run ends.
fn spawn_progress(review: &Orchestrator) -> JoinHandle<()> {
    let Ok(store) = review.store() else {
        return tokio::spawn(async {});
    };
    let mut updates = store.updates();
    let total = store.page_count();

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix("Analysing");
    bar.enable_steady_tick(Duration::from_millis(80));

    tokio::spawn(async move {
        let mut seen: HashMap<usize, PageStatus> = HashMap::new();
        while let Some(snap) = updates.next().await {
            for page in &snap.pages {
                let before = seen.insert(page.page_number, page.status);
                if before == Some(page.status) {
                    continue;
                }
                match page.status {
                    PageStatus::Completed if before.is_some() => bar.println(format!(
                        "  {} Page {:>3}/{:<3}  {}",
                        green("✓"),
                        page.page_number,
                        total,
                        dim(&format!("{} items", page.items.len())),
                    )),
                    PageStatus::Failed if before.is_some() => bar.println(format!(
                        "  {} Page {:>3}/{:<3}  {}",
                        red("✗"),
                        page.page_number,
                        total,
                        red(&truncate(page.error.as_deref().unwrap_or("unknown error"), 80)),
                    )),
                    _ => {}
                }
            }

            let stats = snap.stats();
            bar.set_position(stats.settled() as u64);
            let current = snap
                .pages
                .iter()
                .find(|p| p.status == PageStatus::Processing)
                .map(|p| format!("page {}", p.page_number))
                .unwrap_or_default();
            bar.set_message(current);

            if !snap.running {
                break;
            }
        }
        bar.finish_and_clear();
    })
}

// ── Output ───────────────────────────────────────────────────────────────────

fn print_table(snapshot: &Snapshot, mode: TaskMode) {
    let headers = match mode {
        TaskMode::Translate => "Page\tOriginal\tTranslated",
        TaskMode::Proofread => "Page\tContext\tCorrection\tExplanation",
    };
    println!("{headers}");
    for page in &snapshot.pages {
        if page.items.is_empty() {
            println!("{}\t{}", page.page_number, page.placeholder());
            continue;
        }
        for (i, item) in page.items.iter().enumerate() {
            let number = if i == 0 {
                page.page_number.to_string()
            } else {
                String::new()
            };
            println!("{}\t{}", number, item.cells().join("\t"));
        }
    }
}

fn print_summary(total: &RunSummary, pages: usize, output: Option<&PathBuf>, mode: TaskMode) {
    let icon = if total.failed == 0 && !total.cancelled {
        green("✔")
    } else if total.completed == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{}  {}/{} pages completed{}{}",
        icon,
        bold(&total.completed.to_string()),
        pages,
        if total.failed > 0 {
            format!("  ({} failed)", red(&total.failed.to_string()))
        } else {
            String::new()
        },
        if total.cancelled { "  (stopped)" } else { "" },
    );
    match output {
        Some(path) => eprintln!("   →  {}", bold(&path.display().to_string())),
        None if total.completed > 0 => eprintln!(
            "   {}",
            dim(&format!("pass -o {} to save a Word report", report_file_name(mode)))
        ),
        None => {}
    }
    if total.failed > 0 && !total.cancelled {
        eprintln!("   {}", dim("pass --retries N to retry failed pages"));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
