//! CLI binary for invoice-analyst.
//!
//! A thin shim over the library crate: it loads the config, binds PDFium,
//! and drives one of three surfaces (terminal analysis, metadata inspection,
//! or the web page).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use invoice_analyst::analyst::PROCESSING_MESSAGE;
use invoice_analyst::config::{apply_process_env, current_surface, DEFAULT_CONFIG_FILE};
use invoice_analyst::web::SharedAnalyst;
use invoice_analyst::{
    AnalysisDisplay, AnalysisOutcome, AppConfig, ChatClient, DocumentConverter, InvoiceAnalyst,
    InvoiceServer, OllamaChatClient, PdfEngine, PdfiumConverter, Surface, Upload, VisionOcr,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

// ── Terminal display using indicatif ─────────────────────────────────────────

/// Spinner and banners on stderr, the model's answer on stdout.
///
/// Fragments are written as they arrive, so piping stdout to a file yields
/// exactly the concatenated response. The spinner stays up while the model
/// is thinking and is cleared by the first fragment.
struct TerminalDisplay {
    bar: ProgressBar,
    quiet: bool,
    wrote_output: AtomicBool,
    ends_with_newline: AtomicBool,
}

impl TerminalDisplay {
    fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        Self {
            bar,
            quiet,
            wrote_output: AtomicBool::new(false),
            ends_with_newline: AtomicBool::new(true),
        }
    }
}

impl AnalysisDisplay for TerminalDisplay {
    fn on_processing_start(&self, filename: &str) {
        self.bar
            .set_message(format!("{} {}", PROCESSING_MESSAGE, dim(filename)));
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_success(&self, message: &str) {
        if !self.quiet {
            self.bar
                .suspend(|| eprintln!("{} {}", green("✔"), green(message)));
        }
    }

    fn on_error(&self, message: &str) {
        self.bar.finish_and_clear();
        if self.wrote_output.load(Ordering::SeqCst) && !self.ends_with_newline.load(Ordering::SeqCst)
        {
            println!();
            self.ends_with_newline.store(true, Ordering::SeqCst);
        }
        eprintln!("{} {}", red("✘"), red(message));
    }

    fn render(&self, fragment: &str, _buffer: &str) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
        let mut out = io::stdout().lock();
        if out.write_all(fragment.as_bytes()).is_ok() {
            let _ = out.flush();
            self.wrote_output.store(true, Ordering::SeqCst);
            self.ends_with_newline
                .store(fragment.ends_with('\n'), Ordering::SeqCst);
        }
    }

    fn on_processing_end(&self) {
        self.bar.finish_and_clear();
        if self.wrote_output.load(Ordering::SeqCst) && !self.ends_with_newline.load(Ordering::SeqCst)
        {
            println!();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse one invoice in the terminal
  invoice-analyst analyze invoice.pdf

  # Save only the model's answer
  invoice-analyst analyze invoice.pdf > analysis.md

  # Show PDF metadata (no model call)
  invoice-analyst inspect --json invoice.pdf

  # Serve the upload page on http://127.0.0.1:8501
  invoice-analyst serve

  # Use another config file
  invoice-analyst --config /etc/invoice-analyst.toml serve --port 9000

CONFIGURATION (config.toml):
  [ollama]
  host  = "http://localhost:11434"
  model = "llama3"

  Optional tables: [engine] library_path, [ocr] enabled/provider/model,
  [server] host/port/max_upload_mb.

ENVIRONMENT VARIABLES:
  INVOICE_ANALYST_CONFIG  Config file path (same as --config)
  PDFIUM_LIB_PATH         Path to libpdfium or its directory
  RUST_LOG                Log filter, e.g. invoice_analyst=debug
"#;

/// Analyse invoice PDFs with a local LLM.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-analyst",
    version,
    about = "Extract an invoice PDF's text and stream an LLM table, summary and risk analysis",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "INVOICE_ANALYST_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress everything except errors and the analysis itself.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one invoice and stream the result to stdout.
    Analyze {
        /// Invoice PDF.
        pdf: PathBuf,
    },

    /// Print PDF metadata without calling the model.
    Inspect {
        /// Invoice PDF.
        pdf: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Serve the upload page.
    Serve {
        /// Override `[server] host`.
        #[arg(long)]
        host: Option<String>,

        /// Override `[server] port`.
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Process-wide variables go in before any other thread exists.
    let surface = match cli.command {
        Command::Serve { .. } => Surface::Web,
        _ => Surface::Terminal,
    };
    apply_process_env(surface);
    init_logging(&cli);

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let engine = PdfEngine::load(&config.engine).context("Failed to start the PDF engine")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(run(cli, config, engine))
}

fn init_logging(cli: &Cli) {
    let default = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        match cli.command {
            // The spinner and banners carry the feedback in the terminal.
            Command::Analyze { .. } | Command::Inspect { .. } => "warn",
            Command::Serve { .. } => "info",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_ansi(current_surface() != Some(Surface::Web))
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli, config: AppConfig, engine: PdfEngine) -> Result<ExitCode> {
    match cli.command {
        Command::Inspect { ref pdf, json } => {
            let meta = engine
                .inspect(pdf)
                .await
                .with_context(|| format!("Failed to inspect {}", pdf.display()))?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
                );
            } else {
                println!("File:         {}", pdf.display());
                let optional = [
                    ("Title:", &meta.title),
                    ("Author:", &meta.author),
                    ("Subject:", &meta.subject),
                    ("Creator:", &meta.creator),
                    ("Producer:", &meta.producer),
                    ("Created:", &meta.creation_date),
                    ("Modified:", &meta.modification_date),
                ];
                for (label, value) in optional {
                    if let Some(v) = value {
                        println!("{label:<14}{v}");
                    }
                }
                println!("Pages:        {}", meta.page_count);
                println!("PDF Version:  {}", meta.pdf_version);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Analyze { ref pdf } => {
            let upload = Upload::from_path(pdf)
                .with_context(|| format!("Failed to read {}", pdf.display()))?;
            let analyst = InvoiceAnalyst::new(
                build_converter(&config, engine)?,
                OllamaChatClient::new(&config.ollama).context("Failed to build chat client")?,
            );

            let display = TerminalDisplay::new(cli.quiet);
            let outcome = analyst.analyze(upload, &display).await;
            Ok(match outcome {
                AnalysisOutcome::Completed { .. } => ExitCode::SUCCESS,
                AnalysisOutcome::EmptyDocument | AnalysisOutcome::Failed { .. } => {
                    ExitCode::FAILURE
                }
            })
        }

        Command::Serve { host, port } => {
            let chat = OllamaChatClient::new(&config.ollama).context("Failed to build chat client")?;
            match chat.health().await {
                Ok(models) if models.iter().any(|m| model_matches(m, chat.model())) => {
                    tracing::info!("Ollama at {} has model '{}'", chat.base_url(), chat.model());
                }
                Ok(_) => tracing::warn!(
                    "Ollama at {} does not list model '{}'; run `ollama pull {}`",
                    chat.base_url(),
                    chat.model(),
                    chat.model()
                ),
                Err(e) => tracing::warn!("Ollama health check failed: {}", e),
            }

            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }

            let model = chat.model().to_string();
            let converter: Arc<dyn DocumentConverter> = Arc::new(build_converter(&config, engine)?);
            let chat: Arc<dyn ChatClient> = Arc::new(chat);
            let analyst: SharedAnalyst = InvoiceAnalyst::new(converter, chat);

            let server = InvoiceServer::new(analyst, model, server_config);
            if !cli.quiet {
                eprintln!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!("Invoice Processing on http://{}", server.address()))
                );
            }
            server.start().await.context("Server error")?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_converter(config: &AppConfig, engine: PdfEngine) -> Result<PdfiumConverter> {
    let converter = PdfiumConverter::new(engine);
    if !config.ocr.enabled {
        return Ok(converter);
    }
    let ocr = VisionOcr::from_config(&config.ocr).context("Failed to set up OCR")?;
    Ok(converter.with_ocr(ocr))
}

/// `llama3` matches `llama3:latest`.
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted || (!wanted.contains(':') && listed == format!("{wanted}:latest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_outlives_success_banner() {
        let display = TerminalDisplay::new(true);
        display.on_processing_start("invoice.pdf");
        display.on_success("Invoice processed successfully!");
        assert!(!display.bar.is_finished());

        display.render("", "");
        assert!(display.bar.is_finished());
    }

    #[test]
    fn spinner_cleared_at_end_without_output() {
        let display = TerminalDisplay::new(true);
        display.on_processing_start("invoice.pdf");
        display.on_success("Invoice processed successfully!");
        display.on_processing_end();
        assert!(display.bar.is_finished());
        assert!(!display.wrote_output.load(Ordering::SeqCst));
    }

    #[test]
    fn model_tag_defaults_to_latest() {
        assert!(model_matches("llama3:latest", "llama3"));
        assert!(model_matches("llama3:8b", "llama3:8b"));
        assert!(!model_matches("llama3:8b", "llama3"));
    }
}
