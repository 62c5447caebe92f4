use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use unifex_core::config_file::{self, ConfigFile};
use unifex_core::{
    CharacterMerger, CoordinateUnit, ExecutorKind, ExtractOptions, ExtractionUnit, ExtractorKind,
    ExtractorOptions, ProgressEvent, ScopedUnit, extract_async,
};
use unifex_ingest::create_extractor;

mod output;

use output::ColorMode;

/// Exit code when the job could not be opened or started.
const EXIT_FATAL: u8 = 2;
/// Exit code when some pages failed.
const EXIT_PARTIAL: u8 = 1;

/// Unified document-text extraction - text with coordinates from PDFs and images
#[derive(Parser, Debug)]
#[command(name = "unifex", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text blocks with coordinates from a PDF or image
    Extract(ExtractArgs),

    /// Serve the process-pool worker protocol on stdin/stdout
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Path to the PDF or image file
    input: PathBuf,

    /// Backend: pdf, tesseract, azure-di, google-docai (default: pdf)
    #[arg(short, long)]
    extractor: Option<ExtractorKind>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Comma-separated ISO 639-1 language codes
    #[arg(long, value_delimiter = ',')]
    lang: Vec<String>,

    /// Comma-separated 0-based page indices (default: all pages)
    #[arg(long, value_delimiter = ',')]
    pages: Vec<usize>,

    /// Maximum parallel workers (0 or 1 runs sequentially)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Worker pool flavor: thread or process
    #[arg(long)]
    executor: Option<ExecutorKind>,

    /// Rendering resolution for image-based backends
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    dpi: Option<u32>,

    /// Output unit: points, pixels, inches, normalized
    #[arg(long)]
    unit: Option<CoordinateUnit>,

    /// One text block per character (native PDF backend)
    #[arg(long)]
    chars: bool,

    /// Azure endpoint URL (or AZURE_DI_ENDPOINT env var)
    #[arg(long)]
    azure_endpoint: Option<String>,

    /// Azure API key (or AZURE_DI_KEY env var)
    #[arg(long)]
    azure_key: Option<String>,

    /// Azure model ID (or AZURE_DI_MODEL env var, default: prebuilt-read)
    #[arg(long)]
    azure_model: Option<String>,

    /// Google processor name (or GOOGLE_DOCAI_PROCESSOR_NAME env var)
    #[arg(long)]
    google_processor_name: Option<String>,

    /// Google credentials JSON path (or GOOGLE_DOCAI_CREDENTIALS_PATH env var)
    #[arg(long)]
    google_credentials_path: Option<PathBuf>,

    /// Write results to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Show a progress bar on stderr
    #[arg(long)]
    progress: bool,
}

fn init_tracing() {
    // stdout carries results and the worker protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Worker => match unifex_ingest::worker::serve_stdio() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("worker error: {e}");
                ExitCode::from(EXIT_FATAL)
            }
        },
        Command::Extract(args) => match run_extract(args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::from(EXIT_FATAL)
            }
        },
    }
}

/// Resolved job configuration: CLI flags > config file > defaults.
struct Job {
    kind: ExtractorKind,
    extractor: ExtractorOptions,
    extract: ExtractOptions,
}

fn resolve(args: &ExtractArgs, config: ConfigFile) -> Job {
    let extraction = config.extraction.unwrap_or_default();
    let concurrency = config.concurrency.unwrap_or_default();
    let mut credentials = config.credentials.unwrap_or_default();
    if args.azure_endpoint.is_some() {
        credentials.azure_di_endpoint = args.azure_endpoint.clone();
    }
    if args.azure_key.is_some() {
        credentials.azure_di_key = args.azure_key.clone();
    }
    if args.azure_model.is_some() {
        credentials.azure_di_model = args.azure_model.clone();
    }
    if args.google_processor_name.is_some() {
        credentials.google_docai_processor_name = args.google_processor_name.clone();
    }
    if let Some(path) = &args.google_credentials_path {
        credentials.google_docai_credentials_path = Some(path.to_string_lossy().into_owned());
    }

    let mut extractor = ExtractorOptions::default();
    if !args.lang.is_empty() {
        extractor = extractor.with_languages(args.lang.iter().map(|l| l.trim().to_string()));
    } else if let Some(languages) = extraction.languages {
        extractor = extractor.with_languages(languages);
    }
    if let Some(dpi) = args.dpi.or(extraction.dpi) {
        extractor = extractor.with_dpi(dpi);
    }
    if let Some(unit) = args.unit.or(extraction.output_unit) {
        extractor = extractor.with_output_unit(unit);
    }
    let merger = if args.chars {
        CharacterMerger::Characters
    } else {
        extraction.character_merger.unwrap_or_default()
    };
    extractor = extractor.with_character_merger(merger);
    for (key, value) in credentials.to_env_map() {
        extractor = extractor.with_credential(&key, value);
    }

    let mut extract = ExtractOptions::new()
        .with_executor(args.executor.or(concurrency.executor).unwrap_or_default());
    if let Some(workers) = args.workers.or(concurrency.max_workers) {
        extract = extract.with_max_workers(workers);
    }
    if !args.pages.is_empty() {
        extract = extract.with_pages(args.pages.iter().copied());
    }

    Job {
        kind: args
            .extractor
            .or(extraction.extractor)
            .unwrap_or(ExtractorKind::Pdf),
        extractor,
        extract,
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:40.cyan/dim}] {pos}/{len} pages")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn run_extract(args: ExtractArgs) -> anyhow::Result<ExitCode> {
    if !args.input.exists() {
        anyhow::bail!("File not found: {}", args.input.display());
    }
    let job = resolve(&args, config_file::load_config());

    // Backends may hold blocking clients, so they are opened and closed
    // outside the async runtime. The scoped handle closes on every exit path.
    let unit = Arc::new(ScopedUnit::new(
        create_extractor(&args.input, job.kind, job.extractor)
            .map_err(|e| anyhow::anyhow!("cannot open {}: {}", args.input.display(), e))?,
    ));
    tracing::info!(
        path = %args.input.display(),
        kind = %job.kind,
        pages = unit.page_count(),
        "extractor opened"
    );

    let bar = args.progress.then(progress_bar);
    let mut options = job.extract;
    if let Some(bar) = &bar {
        let bar = bar.clone();
        options = options.with_progress(move |event| match event {
            ProgressEvent::Started { total, workers } => {
                bar.set_length(total as u64);
                bar.set_message(format!("{workers} worker(s)"));
            }
            ProgressEvent::PageFinished { completed, .. } => bar.set_position(completed as u64),
        });
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let cancel = CancellationToken::new();
    options = options.with_cancel(cancel.clone());
    let outcome = runtime.block_on(async {
        // Set up Ctrl+C handler
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, finishing pages in flight");
                cancel_clone.cancel();
            }
        });
        extract_async(Arc::clone(&unit), options).await
    });
    runtime.shutdown_background();

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    drop(unit);
    let result = outcome.map_err(|e| anyhow::anyhow!("extraction failed: {e}"))?;

    let use_color = !args.no_color && args.output.is_none() && !args.json;
    let mut writer: Box<dyn Write> = if let Some(ref output_path) = args.output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };
    if args.json {
        output::print_json(&mut writer, &result)?;
    } else {
        output::print_result(&mut writer, &result, ColorMode(use_color))?;
    }
    writer.flush()?;

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use unifex_core::config_file::{ConcurrencyConfig, CredentialsConfig, ExtractionConfig};

    fn args(extra: &[&str]) -> ExtractArgs {
        let mut argv = vec!["unifex", "extract", "doc.pdf"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Extract(args) => args,
            Command::Worker => panic!("parsed worker"),
        }
    }

    #[test]
    fn flags_override_config_file() {
        let config = ConfigFile {
            extraction: Some(ExtractionConfig {
                extractor: Some(ExtractorKind::Tesseract),
                dpi: Some(300),
                languages: Some(vec!["de".into()]),
                ..Default::default()
            }),
            concurrency: Some(ConcurrencyConfig {
                max_workers: Some(8),
                executor: Some(ExecutorKind::Process),
            }),
            credentials: Some(CredentialsConfig {
                azure_di_key: Some("from-file".into()),
                ..Default::default()
            }),
        };
        let job = resolve(
            &args(&["--dpi", "150", "--workers", "2", "--azure-key", "from-flag", "--chars"]),
            config,
        );
        assert_eq!(job.kind, ExtractorKind::Tesseract);
        assert_eq!(job.extractor.dpi, 150);
        assert_eq!(job.extractor.languages, vec!["de".to_string()]);
        assert_eq!(job.extractor.character_merger, CharacterMerger::Characters);
        assert_eq!(job.extractor.credentials["AZURE_DI_KEY"], "from-flag");
        assert_eq!(job.extract.max_workers, Some(2));
        assert_eq!(job.extract.executor, ExecutorKind::Process);
    }

    #[test]
    fn zero_dpi_is_rejected_by_the_parser() {
        let err = Cli::try_parse_from(["unifex", "extract", "doc.pdf", "--dpi", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(Cli::try_parse_from(["unifex", "extract", "doc.pdf", "--dpi", "1"]).is_ok());
    }

    #[test]
    fn list_flags_split_on_commas() {
        let job = resolve(
            &args(&["--lang", "en, fr", "--pages", "0,2", "--unit", "inches"]),
            ConfigFile::default(),
        );
        assert_eq!(job.kind, ExtractorKind::Pdf);
        assert_eq!(job.extractor.languages, vec!["en".to_string(), "fr".to_string()]);
        assert_eq!(job.extractor.output_unit, Some(CoordinateUnit::Inches));
        assert_eq!(job.extract.pages, Some(vec![0, 2]));
    }

    #[test]
    fn google_flags_become_credentials() {
        let job = resolve(
            &args(&[
                "-e",
                "google-docai",
                "--google-processor-name",
                "projects/p/locations/us/processors/abc",
                "--google-credentials-path",
                "/etc/unifex/creds.json",
            ]),
            ConfigFile::default(),
        );
        assert_eq!(job.kind, ExtractorKind::GoogleDocai);
        assert_eq!(
            job.extractor.credentials["GOOGLE_DOCAI_PROCESSOR_NAME"],
            "projects/p/locations/us/processors/abc"
        );
        assert_eq!(
            job.extractor.credentials["GOOGLE_DOCAI_CREDENTIALS_PATH"],
            "/etc/unifex/creds.json"
        );
    }
}
