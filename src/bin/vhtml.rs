//! CLI binary for vhtml.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalyzerConfig`, runs one of the four commands and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use vhtml::{
    generate_archive, generate_standalone, AnalysisProgressCallback, AnalyzerConfig,
    BatchAnalyzer, DocumentAnalyzer, DocumentStatus, ImageEmbedding, Language, LayoutBackend,
    OcrBackend, PackageOutcome, ProgressCallback, Stage,
};

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar at the bottom and one log line per
/// finished document. Documents finish out of order in batch mode.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<PathBuf, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` reports the document count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
    }

    fn elapsed(&self, source: &Path) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(source))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }

    /// Stops the spinner of a single-document run.
    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, source: &Path) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(source.to_path_buf(), Instant::now());
        }
        self.bar.set_message(file_name(source));
    }

    fn on_stage(&self, source: &Path, stage: Stage) {
        self.bar.set_message(format!("{}  {}", file_name(source), dim(&stage.to_string())));
    }

    fn on_document_complete(&self, source: &Path, html_path: &Path) {
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            green("✓"),
            file_name(source),
            dim(&html_path.display().to_string()),
            self.elapsed(source),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, source: &Path, stage: Stage, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<32}  {} {}  {}",
            red("✗"),
            file_name(source),
            dim(&format!("[{stage}]")),
            red(&msg),
            self.elapsed(source),
        ));
        self.bar.inc(1);
    }

    fn on_document_skipped(&self, source: &Path) {
        self.bar.println(format!(
            "  {} {:<32}  {}",
            cyan("–"),
            file_name(source),
            dim("skipped (deadline)")
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if success_count == total_documents {
            eprintln!(
                "{} {} documents analysed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents analysed  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse one scan into out/invoice/
  vhtml analyze invoice.pdf -o out/invoice

  # Analyse a whole folder, 8 at a time, stop launching after 10 minutes
  vhtml batch scans/ out/ --workers 8 --deadline-secs 600

  # Machine-readable batch report
  vhtml batch scans/ out/ --json > report.json

  # Package a rendered folder
  vhtml archive out/invoice                 # → out/invoice.mhtml
  vhtml standalone out/invoice -o inv.html  # single HTML, images inlined

  # Inline page images at analysis time
  vhtml --inline-images analyze receipt.pdf -o out/receipt

  # Classify layout with a vision model (needs the `vision-layout` feature)
  vhtml --layout vision --model gpt-4.1-nano analyze invoice.pdf -o out/inv

OUTPUT FOLDER:
  <stem>.html            page images with positioned, typed text blocks
  <stem>_metadata.json   doc_type, language, layout, confidence, blocks[]
  page_<n>.png           rasterised pages (linked mode only)
  viewer.js              overlay toggling and confidence highlighting

ENVIRONMENT VARIABLES:
  VHTML_DPI, VHTML_WORKERS, VHTML_LANGUAGES, ...   see --help for each flag
  VHTML_PDFIUM_DIR        Directory containing libpdfium
  EDGEQUAKE_LLM_PROVIDER  Provider for --layout vision
  EDGEQUAKE_MODEL         Model for --layout vision
  RUST_LOG                Overrides the log filter

SETUP:
  1. Install tesseract with the pol, eng and deu traineddata.
  2. Put libpdfium next to the binary, on the library path, or in
     VHTML_PDFIUM_DIR.
"#;

/// Turn scanned PDFs into annotated HTML and MHTML archives.
#[derive(Parser, Debug)]
#[command(
    name = "vhtml",
    version,
    about = "Turn scanned PDFs into annotated HTML and MHTML archives",
    long_about = "Rasterise PDF documents, segment every page into header, table, content and \
footer blocks, read each block with OCR (Polish, English, German), and write an HTML page \
overlaying the text, language and confidence on the page images. Rendered folders can be \
packaged as single-file MHTML archives or standalone HTML.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    analysis: AnalysisArgs,

    /// Disable progress bar.
    #[arg(long, global = true, env = "VHTML_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "VHTML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "VHTML_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one PDF into an output folder.
    Analyze {
        /// PDF file to analyse.
        pdf: PathBuf,

        /// Output folder. Default: `<stem>` next to the PDF.
        #[arg(short, long, env = "VHTML_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Analyse every PDF in a folder, one sub-folder per document.
    Batch {
        /// Folder containing the PDFs.
        input_dir: PathBuf,

        /// Root folder for the per-document outputs.
        output_dir: PathBuf,

        /// Documents analysed at the same time.
        #[arg(short, long, env = "VHTML_WORKERS", default_value_t = 4)]
        workers: usize,

        /// Stop launching documents after this many seconds.
        #[arg(long, env = "VHTML_DEADLINE_SECS")]
        deadline_secs: Option<u64>,

        /// Print the batch report as JSON on stdout.
        #[arg(long, env = "VHTML_JSON")]
        json: bool,
    },

    /// Package a rendered folder as a single-file MHTML archive.
    Archive {
        /// Folder written by `analyze`.
        source_dir: PathBuf,

        /// Archive path. Default: `<source_dir>.mhtml`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Package a rendered folder as one HTML file with everything inlined.
    Standalone {
        /// Folder written by `analyze`.
        source_dir: PathBuf,

        /// Output path. Default: `<source_dir>_standalone.html`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// Rendering DPI (72–400).
    #[arg(long, global = true, env = "VHTML_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Directory containing the pdfium shared library.
    #[arg(long, global = true, env = "VHTML_PDFIUM_DIR")]
    pdfium_dir: Option<PathBuf>,

    /// OCR languages, comma-separated: pl, en, de.
    #[arg(long, global = true, env = "VHTML_LANGUAGES", value_delimiter = ',',
          default_value = "pl,en,de")]
    languages: Vec<String>,

    /// Tesseract binary.
    #[arg(long, global = true, env = "VHTML_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Tesseract page segmentation mode.
    #[arg(long, global = true, env = "VHTML_PSM", default_value_t = 6,
          value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: u8,

    /// Inline page images as data URIs instead of writing page_<n>.png.
    #[arg(long, global = true, env = "VHTML_INLINE_IMAGES")]
    inline_images: bool,

    /// Do not write viewer.js next to the HTML.
    #[arg(long, global = true, env = "VHTML_NO_VIEWER_SCRIPT")]
    no_viewer_script: bool,

    /// Layout classifier: rule or vision.
    #[arg(long, global = true, env = "VHTML_LAYOUT", value_enum, default_value = "rule")]
    layout: LayoutArg,

    /// LLM provider for `--layout vision`.
    #[arg(long, global = true, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model for `--layout vision`.
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Rule,
    Vision,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is shown.
    let json_out = matches!(cli.command, Command::Batch { json: true, .. });
    let analyses = matches!(cli.command, Command::Analyze { .. } | Command::Batch { .. });
    let show_progress = analyses && !cli.quiet && !cli.no_progress && !json_out;
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

    match &cli.command {
        Command::Analyze { pdf, output } => {
            let output = output.clone().unwrap_or_else(|| default_analyze_dir(pdf));
            let progress = show_progress.then(CliProgressCallback::new_dynamic);
            let config = build_config(
                &cli.analysis,
                None,
                None,
                progress.clone().map(|p| p as ProgressCallback),
            )?;
            let analyzer = DocumentAnalyzer::new(config).context("Failed to set up analyzer")?;
            let pdf = pdf.clone();
            let result = tokio::task::spawn_blocking(move || analyzer.analyze(&pdf, &output))
                .await
                .context("Analysis task panicked")?;
            if let Some(p) = &progress {
                p.finish();
            }
            let html = result.context("Analysis failed")?;
            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&html.display().to_string()));
            }
        }

        Command::Batch {
            input_dir,
            output_dir,
            workers,
            deadline_secs,
            json,
        } => {
            let progress = show_progress.then(CliProgressCallback::new_dynamic);
            let config = build_config(
                &cli.analysis,
                Some(*workers),
                deadline_secs.map(Duration::from_secs),
                progress.map(|p| p as ProgressCallback),
            )?;
            let report = BatchAnalyzer::new(config)
                .context("Failed to set up analyzer")?
                .batch_analyze(input_dir, output_dir)
                .await
                .context("Batch failed")?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else if !cli.quiet && !show_progress {
                for (source, status) in report.iter() {
                    let (mark, detail) = match status {
                        DocumentStatus::Success { html_path } => {
                            (green("✓"), dim(&html_path.display().to_string()))
                        }
                        DocumentStatus::Error { error } => (red("✗"), red(error)),
                        DocumentStatus::Skipped => (cyan("–"), String::new()),
                    };
                    eprintln!(
                        "  {} {:<7} {}  {}",
                        mark,
                        status.label(),
                        source.display(),
                        detail
                    );
                }
            }
            if !cli.quiet {
                eprintln!(
                    "{} ok  {} failed  {} skipped  of {}",
                    green(&report.success_count().to_string()),
                    red(&report.error_count().to_string()),
                    cyan(&report.skipped_count().to_string()),
                    report.len()
                );
            }
            if report.success_count() < report.len() {
                bail!(
                    "{} of {} documents were not analysed",
                    report.len() - report.success_count(),
                    report.len()
                );
            }
        }

        Command::Archive { source_dir, output } => {
            let output = output
                .clone()
                .unwrap_or_else(|| sibling_with_suffix(source_dir, ".mhtml"));
            finish_package(generate_archive(source_dir, &output), cli.quiet)?;
        }

        Command::Standalone { source_dir, output } => {
            let output = output
                .clone()
                .unwrap_or_else(|| sibling_with_suffix(source_dir, "_standalone.html"));
            finish_package(generate_standalone(source_dir, &output), cli.quiet)?;
        }
    }

    Ok(())
}

/// Map CLI args to `AnalyzerConfig`.
fn build_config(
    args: &AnalysisArgs,
    workers: Option<usize>,
    deadline: Option<Duration>,
    progress: Option<ProgressCallback>,
) -> Result<AnalyzerConfig> {
    let languages = args
        .languages
        .iter()
        .map(|code| {
            Language::from_code(code.trim())
                .filter(|l| *l != Language::Unknown)
                .with_context(|| format!("Unsupported language {code:?} (expected pl, en or de)"))
        })
        .collect::<Result<Vec<_>>>()?;

    let layout_backend = match args.layout {
        LayoutArg::Rule => LayoutBackend::RuleBased,
        LayoutArg::Vision => LayoutBackend::Vision {
            provider: args.provider.clone(),
            model: args.model.clone(),
        },
    };

    let mut builder = AnalyzerConfig::builder()
        .dpi(args.dpi)
        .languages(languages)
        .ocr_backend(OcrBackend::Tesseract {
            binary: args.tesseract.clone(),
            psm: args.psm,
        })
        .layout_backend(layout_backend)
        .image_embedding(if args.inline_images {
            ImageEmbedding::Inline
        } else {
            ImageEmbedding::Linked
        })
        .write_viewer_script(!args.no_viewer_script);

    if let Some(dir) = &args.pdfium_dir {
        builder = builder.pdfium_dir(dir.clone());
    }
    if let Some(n) = workers {
        builder = builder.workers(n);
    }
    if let Some(d) = deadline {
        builder = builder.batch_deadline(d);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `scans/invoice.pdf` → `scans/invoice/`.
fn default_analyze_dir(pdf: &Path) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    pdf.with_file_name(stem)
}

/// `out/invoice` + `.mhtml` → `out/invoice.mhtml`.
fn sibling_with_suffix(dir: &Path, suffix: &str) -> PathBuf {
    let trimmed: PathBuf = dir.components().collect();
    let mut name = trimmed
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "document".into());
    name.push(suffix);
    trimmed.with_file_name(name)
}

fn finish_package(outcome: PackageOutcome, quiet: bool) -> Result<()> {
    match outcome {
        PackageOutcome::Written { path } => {
            if !quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
            Ok(())
        }
        PackageOutcome::Failed(e) => Err(e).context("Packaging failed"),
    }
}
