//! CLI binary for pdf2xlsx.
//!
//! `convert` runs one conversion in the foreground; `serve` starts the HTTP
//! service. Both are thin shims that map flags onto the library config.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2xlsx::pipeline::input::default_output_path;
use pdf2xlsx::server::{self, AppState};
use pdf2xlsx::{
    ConversionConfig, ConversionProgressCallback, Converter, Locale, NoopProgressCallback,
    PageSelection, ServerConfig,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Percent bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
    empty_pages: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Self {
            bar,
            page_started: Mutex::new(None),
            empty_pages: AtomicUsize::new(0),
        }
    }

    fn page_elapsed(&self) -> String {
        let secs = self
            .page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: Option<usize>) {
        let pages = total_pages.map_or_else(|| "?".to_string(), |n| n.to_string());
        self.bar
            .println(format!("{} {}", bold("◆"), bold(&format!("Extracting tables from {pages} pages…"))));
    }

    fn on_page_start(&self, _page_num: usize, _total: Option<usize>) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
    }

    fn on_page_complete(&self, page_num: usize, _total: Option<usize>, rows_added: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}  {:<10}  {}",
            green("✓"),
            page_num,
            dim(&format!("{rows_added:>4} rows")),
            self.page_elapsed(),
        ));
    }

    fn on_page_empty(&self, page_num: usize, _total: Option<usize>, reason: &str) {
        self.empty_pages.fetch_add(1, Ordering::Relaxed);
        let reason: String = if reason.chars().count() > 80 {
            reason.chars().take(79).chain(['…']).collect()
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            yellow("–"),
            page_num,
            dim(&reason),
            self.page_elapsed(),
        ));
    }

    fn on_progress(&self, percent: u8, message: &str) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_conversion_complete(&self, row_count: usize) {
        self.bar.finish_and_clear();
        let empty = self.empty_pages.load(Ordering::Relaxed);
        let note = if empty > 0 {
            format!("  ({empty} pages without a table)")
        } else {
            String::new()
        };
        eprintln!("{} {} rows extracted{}", green("✔"), bold(&row_count.to_string()), note);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a statement; writes statement.xlsx next to it
  pdf2xlsx convert statement.pdf

  # Pick the output path and a page range
  pdf2xlsx convert --pages 2-9 report.pdf -o tables.xlsx

  # Use a specific provider/model
  pdf2xlsx convert --provider openai --model gpt-4.1-mini scan.pdf

  # Print merged rows and stats as JSON
  pdf2xlsx convert --json invoice.pdf > rows.json

  # Run the HTTP service on port 8080 with English messages
  pdf2xlsx serve --port 8080 --locale en

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama, …)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise the system library is used)
  RUST_LOG                Log filter, e.g. pdf2xlsx=debug
"#;

/// Extract tables from PDF files into Excel workbooks using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2xlsx",
    version,
    about = "Extract tables from PDFs into Excel workbooks using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2XLSX_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one PDF file or URL.
    Convert(ConvertArgs),
    /// Run the HTTP conversion service.
    Serve(ServeArgs),
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
struct ModelArgs {
    /// Vision model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure, …
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2XLSX_DPI", default_value_t = 144,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Language of progress and error messages: en, pt-br.
    #[arg(long, env = "PDF2XLSX_LOCALE", default_value = "pt-br")]
    locale: Locale,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2XLSX_MAX_TOKENS", default_value_t = 8000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2XLSX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDF2XLSX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Worksheet name (defaults to a localised "Table").
    #[arg(long, env = "PDF2XLSX_SHEET_NAME")]
    sheet_name: Option<String>,

    /// Path to libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output workbook. Default: input name with `.pdf` replaced by `.xlsx`.
    #[arg(short, long, env = "PDF2XLSX_OUTPUT")]
    output: Option<PathBuf>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2XLSX_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2XLSX_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2XLSX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print merged rows and stats as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "PDF2XLSX_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PDF2XLSX_PORT", default_value_t = 3000)]
    port: u16,

    /// Seconds a job is kept after its last update.
    #[arg(long, env = "PDF2XLSX_JOB_TTL", default_value_t = 1800)]
    job_ttl: u64,

    /// Seconds between expired-job sweeps.
    #[arg(long, env = "PDF2XLSX_SWEEP_INTERVAL", default_value_t = 60)]
    sweep_interval: u64,

    /// Milliseconds between progress polls per stream.
    #[arg(long, env = "PDF2XLSX_PROGRESS_POLL_MS", default_value_t = 500)]
    progress_poll_ms: u64,

    /// Seconds between SSE keep-alive comments.
    #[arg(long, env = "PDF2XLSX_KEEP_ALIVE", default_value_t = 15)]
    keep_alive: u64,

    /// Upload size limit in MiB.
    #[arg(long, env = "PDF2XLSX_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during a foreground conversion.
    let default_filter = match &cli.command {
        _ if cli.verbose => "debug",
        Command::Convert(args) if args.quiet || show_progress(args) => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Convert(args) => run_convert(args).await,
        Command::Serve(args) => run_serve(args).await,
    }
}

fn show_progress(args: &ConvertArgs) -> bool {
    !args.quiet && !args.no_progress && !args.json
}

async fn run_convert(args: ConvertArgs) -> Result<()> {
    let mut builder = model_config(&args.model)
        .pages(parse_pages(&args.pages)?)
        .download_timeout_secs(args.download_timeout);
    if let Some(ref password) = args.password {
        builder = builder.password(password);
    }
    let config = builder.build().context("Invalid configuration")?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    let converter = Converter::from_config(config).context("No vision model available")?;

    let result = if show_progress(&args) {
        let cb = CliProgressCallback::new();
        let result = converter
            .convert_to_file(&args.input, &output_path, &cb)
            .await;
        if result.is_err() {
            cb.bar.finish_and_clear();
        }
        result
    } else {
        converter
            .convert_to_file(&args.input, &output_path, &NoopProgressCallback)
            .await
    };
    let output = result.context("Conversion failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !args.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} rows × {} cols  {}/{} pages with a table  {}ms  →  {}",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            stats.row_count,
            stats.column_count,
            stats.pages_with_table,
            stats.processed_pages,
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        if stats.failed_pages > 0 {
            eprintln!("   {}", red(&format!("{} pages failed", stats.failed_pages)));
        }
    }

    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let conversion = model_config(&args.model)
        .build()
        .context("Invalid configuration")?;

    let server_config = ServerConfig {
        host: args.host,
        port: args.port,
        job_ttl_secs: args.job_ttl,
        sweep_interval_secs: args.sweep_interval,
        progress_poll_ms: args.progress_poll_ms,
        keep_alive_secs: args.keep_alive,
        max_upload_mb: args.max_upload_mb,
    };

    let state = AppState::from_config(conversion, server_config.clone());
    server::serve(state, &server_config)
        .await
        .context("Server failed")
}

/// Map the shared model flags onto a config builder.
fn model_config(args: &ModelArgs) -> pdf2xlsx::ConversionConfigBuilder {
    let mut builder = ConversionConfig::builder()
        .dpi(args.dpi)
        .locale(args.locale)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref name) = args.sheet_name {
        builder = builder.sheet_name(name);
    }
    if let Some(ref path) = args.pdfium_lib {
        builder = builder.pdfium_library(path);
    }
    builder
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if pages.contains(&0) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got 0)");
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_selections() {
        assert!(matches!(parse_pages("all").unwrap(), PageSelection::All));
        assert!(matches!(parse_pages(" 7 ").unwrap(), PageSelection::Single(7)));
        assert!(matches!(parse_pages("2-4").unwrap(), PageSelection::Range(2, 4)));
        assert!(matches!(parse_pages("1,3").unwrap(), PageSelection::Set(ref v) if v == &[1, 3]));
    }

    #[test]
    fn rejects_bad_page_selections() {
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("5-2").is_err());
        assert!(parse_pages("1,x").is_err());
        assert!(parse_pages("0,2").is_err());
    }

    #[test]
    fn cli_parses_convert_and_serve() {
        let cli = Cli::try_parse_from(["pdf2xlsx", "convert", "a.pdf", "--locale", "en", "--json"])
            .unwrap();
        match cli.command {
            Command::Convert(args) => {
                assert_eq!(args.input, "a.pdf");
                assert_eq!(args.model.locale, Locale::En);
                assert!(args.json);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from(["pdf2xlsx", "serve", "--port", "8080"]).unwrap();
        assert!(matches!(cli.command, Command::Serve(ref s) if s.port == 8080));
    }
}
