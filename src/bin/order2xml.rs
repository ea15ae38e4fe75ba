//! CLI binary for edgequake-order2xml.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs one order and writes `<stem>_processed.xml`.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_order2xml::schema;
use edgequake_order2xml::{
    process_order_to_file, AuxiliaryContent, ExtractionConfig, PipelineProgressCallback, ProcessedOrder,
    ProgressCallback, SourceDocument, Stage, DEFAULT_MODEL,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing the running stage, with one log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<18} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_pipeline_complete(&self, _well_formed: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # PDF only; writes order123_processed.xml
  order2xml order123.pdf

  # With the e-mail the order arrived with
  order2xml order123.pdf --email-file mail.txt
  order2xml order123.pdf --email-text "Klantnummer: 111507, Referentie: 01443196"

  # Merge the customer's own XML export
  order2xml order123.pdf --secondary PO_12345.xml -o out/order.xml

  # Send the embedded text layer too and report schema deviations
  order2xml order123.pdf --include-text --check-schema

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (default provider)
  EDGEQUAKE_LLM_PROVIDER  Override provider (anthropic, openai, gemini, …)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise next to the binary, ./ or system)
  RUST_LOG                Log filter, e.g. RUST_LOG=edgequake_order2xml=debug
"#;

/// Extract a purchase-order PDF into an <XML_order> document.
#[derive(Parser, Debug)]
#[command(
    name = "order2xml",
    version,
    about = "Extract purchase-order PDFs into <XML_order> documents using multimodal LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Order PDF.
    input: PathBuf,

    /// E-mail text that accompanied the order.
    #[arg(long, conflicts_with_all = ["email_file", "secondary"])]
    email_text: Option<String>,

    /// File holding the e-mail text.
    #[arg(long, conflicts_with = "secondary")]
    email_file: Option<PathBuf>,

    /// Secondary file to merge (typically the customer's XML export).
    #[arg(long)]
    secondary: Option<PathBuf>,

    /// Output path. Default: <stem>_processed.xml in the current directory.
    #[arg(short, long, env = "ORDER2XML_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID.
    #[arg(long, env = "ORDER2XML_MODEL", long_help = "LLM model ID. Default: claude-sonnet-4-20250514.")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long, env = "ORDER2XML_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "ORDER2XML_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Also send the PDF's embedded text layer.
    #[arg(long, env = "ORDER2XML_INCLUDE_TEXT")]
    include_text: bool,

    /// Max LLM output tokens.
    #[arg(long, env = "ORDER2XML_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Retries on a transient LLM failure.
    #[arg(long, env = "ORDER2XML_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "ORDER2XML_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Text file replacing the built-in instruction document.
    #[arg(long, env = "ORDER2XML_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Report deviations from the order schema (never changes the output).
    #[arg(long)]
    check_schema: bool,

    /// Print a JSON summary to stdout.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ORDER2XML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ORDER2XML_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    output: &'a Path,
    #[serde(flatten)]
    order: &'a ProcessedOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    findings: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep INFO logs out of
    // its way unless asked for.
    let show_progress = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let document = SourceDocument::from_path(&cli.input)
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;
    let auxiliary = auxiliary_from_cli(&cli)?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    let output_path = output_path(&cli, &document);

    // ── Run ──────────────────────────────────────────────────────────────
    // The file is written even when the XML is not well-formed.
    let order = process_order_to_file(&document, &auxiliary, &output_path, &config)
        .await
        .context("Order extraction failed")?;

    let findings = if cli.check_schema {
        Some(match schema::inspect(&order.xml) {
            Ok(found) => found.iter().map(ToString::to_string).collect(),
            Err(e) => vec![format!("not parseable: {e}")],
        })
    } else {
        None
    };

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let summary = JsonSummary {
            output: &output_path,
            order: &order,
            findings,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
        return Ok(());
    }

    if !order.is_well_formed() {
        eprintln!(
            "{} returned XML is not well-formed: {}",
            yellow("⚠"),
            order.validation.diagnostic.as_deref().unwrap_or("unknown error"),
        );
    }

    if let Some(findings) = findings {
        if findings.is_empty() {
            if !cli.quiet {
                eprintln!("{} schema check passed", green("✔"));
            }
        } else {
            eprintln!("{} {} schema deviation(s):", yellow("⚠"), findings.len());
            for f in &findings {
                eprintln!("    {f}");
            }
        }
    }

    if !cli.quiet {
        eprintln!(
            "{}  {} page(s)  {}ms  →  {}",
            if order.is_well_formed() {
                green("✔")
            } else {
                yellow("⚠")
            },
            order.stats.page_count,
            order.stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  ({} attempt(s))",
            dim(&order.stats.input_tokens.to_string()),
            dim(&order.stats.output_tokens.to_string()),
            order.stats.attempts,
        );
    }

    Ok(())
}

/// Map the mutually exclusive auxiliary flags to `AuxiliaryContent`.
fn auxiliary_from_cli(cli: &Cli) -> Result<AuxiliaryContent> {
    if let Some(ref text) = cli.email_text {
        return Ok(AuxiliaryContent::free_text(text.as_str()));
    }
    if let Some(ref path) = cli.email_file {
        return AuxiliaryContent::free_text_from_file(path)
            .with_context(|| format!("Failed to read e-mail text from {}", path.display()));
    }
    if let Some(ref path) = cli.secondary {
        return AuxiliaryContent::from_file(path)
            .with_context(|| format!("Failed to read secondary file {}", path.display()));
    }
    Ok(AuxiliaryContent::None)
}

fn output_path(cli: &Cli, document: &SourceDocument) -> PathBuf {
    cli.output
        .clone()
        .unwrap_or_else(|| PathBuf::from(document.download_name()))
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .include_page_text(cli.include_text)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.instructions(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    } else if cli.provider.is_some() {
        builder = builder.model(DEFAULT_MODEL);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
