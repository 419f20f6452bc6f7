//! Server binary for revision-tutor.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServerConfig`, validates readiness and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use revision_tutor::{
    serve, AppState, ArchiveMode, Collaborators, OcrReadiness, ServerConfig, Tutor,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default address (127.0.0.1:5001), reading secrets from .env
  revision-tutor

  # Listen on all interfaces with an explicit OCR key file
  revision-tutor --bind 0.0.0.0:8080 --ocr-key keys/vision.json

  # Await archival before answering (easier to debug storage problems)
  revision-tutor --archive blocking -v

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY                  Gemini API key (required for the default provider)
  SUPABASE_URL                    Supabase project URL (required)
  SUPABASE_KEY                    Supabase service key (required)
  CGP_KEYFILE                     Google Cloud service-account JSON for Vision OCR
  GOOGLE_APPLICATION_CREDENTIALS  Fallback for CGP_KEYFILE
  PDFIUM_LIB_PATH                 Path to libpdfium; defaults to the system library
  RUST_LOG                        Log filter, overrides --verbose

Without an OCR key file the server still starts, reports "degraded" on
/health, and answers OCR requests with 500 ocr_failed.
"#;

/// Serve handwriting OCR + LLM tutoring feedback over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "revision-tutor",
    version,
    about = "Serve handwriting OCR + LLM tutoring feedback over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "TUTOR_BIND", default_value = "127.0.0.1:5001")]
    bind: SocketAddr,

    /// Extra route prefix (e.g. /api). Use an empty string to disable.
    #[arg(long, env = "TUTOR_ROUTE_PREFIX", default_value = "/api")]
    route_prefix: String,

    /// Google Cloud service-account JSON for Vision OCR.
    #[arg(long, env = "CGP_KEYFILE")]
    ocr_key: Option<PathBuf>,

    /// LLM provider: gemini, openai, anthropic, ollama, ...
    #[arg(long, env = "TUTOR_LLM_PROVIDER", default_value = "gemini")]
    provider: String,

    /// LLM model ID.
    #[arg(long, env = "TUTOR_LLM_MODEL", default_value = "gemini-2.5-flash")]
    model: String,

    /// API key for the LLM provider (gemini, openai, anthropic, openrouter).
    /// Overrides the provider's own variable, e.g. GEMINI_API_KEY.
    #[arg(long, env = "TUTOR_LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// LLM temperature (0.0 to 2.0).
    #[arg(long, env = "TUTOR_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries on LLM failure.
    #[arg(long, env = "TUTOR_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Supabase project URL.
    #[arg(long, env = "SUPABASE_URL")]
    storage_url: Option<String>,

    /// Supabase service key.
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    storage_key: Option<String>,

    /// Bucket for whiteboard snapshots.
    #[arg(long, env = "TUTOR_WHITEBOARD_BUCKET", default_value = "WhiteBoardImages")]
    whiteboard_bucket: String,

    /// Bucket for uploaded worksheets (also read by /analyze-file).
    #[arg(long, env = "TUTOR_DOCUMENT_BUCKET", default_value = "PDFBucket")]
    document_bucket: String,

    /// Maximum request body in MiB.
    #[arg(long, env = "TUTOR_MAX_UPLOAD_MB", default_value_t = 20)]
    max_upload_mb: usize,

    /// Longest rendered edge of a PDF page in pixels.
    #[arg(long, env = "TUTOR_PDF_MAX_PIXELS", default_value_t = 2000)]
    pdf_max_pixels: u32,

    /// Maximum PDF pages processed per upload.
    #[arg(long, env = "TUTOR_PDF_MAX_PAGES", default_value_t = 20)]
    pdf_max_pages: usize,

    /// Concurrent per-page OCR calls.
    #[arg(short, long, env = "TUTOR_PAGE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Path to libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Archive uploads detached (default) or before answering.
    #[arg(long, env = "TUTOR_ARCHIVE", value_enum, default_value = "detached")]
    archive: ArchiveArg,

    /// Disable permissive CORS.
    #[arg(long, env = "TUTOR_NO_CORS")]
    no_cors: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TUTOR_VERBOSE")]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ArchiveArg {
    Detached,
    Blocking,
}

impl From<ArchiveArg> for ArchiveMode {
    fn from(v: ArchiveArg) -> Self {
        match v {
            ArchiveArg::Detached => ArchiveMode::Detached,
            ArchiveArg::Blocking => ArchiveMode::Blocking,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; variables may come from the environment.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "revision_tutor=debug,tower_http=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;

    // ── Startup validation ───────────────────────────────────────────────
    let readiness = match config.check_readiness() {
        Ok(r) => r,
        Err(e) => {
            error!("{}", e);
            return Err(e).context("Refusing to start with incomplete configuration");
        }
    };
    if let OcrReadiness::Degraded(reason) = &readiness.ocr {
        warn!(
            "OCR is unavailable ({}); set CGP_KEYFILE to a service-account key. \
             Requests that need OCR will fail until then.",
            reason
        );
    }

    let collaborators =
        Collaborators::from_config(&config).context("Failed to initialise service clients")?;
    let tutor = Tutor::new(collaborators, &config);

    info!(
        "Using {} / {} for feedback, buckets {} and {}",
        config.llm_provider, config.llm_model, config.whiteboard_bucket, config.document_bucket
    );

    serve(AppState::new(tutor), &config, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ServerConfig> {
    let ocr_key = cli.ocr_key.clone().or_else(|| {
        std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from)
    });
    let prefix = Some(cli.route_prefix.trim().to_string()).filter(|p| !p.is_empty());

    let mut builder = ServerConfig::builder()
        .bind_addr(cli.bind)
        .route_prefix_alias(prefix)
        .llm_provider(&cli.provider)
        .llm_model(&cli.model)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .whiteboard_bucket(&cli.whiteboard_bucket)
        .document_bucket(&cli.document_bucket)
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
        .pdf_max_pixels(cli.pdf_max_pixels)
        .pdf_max_pages(cli.pdf_max_pages)
        .page_concurrency(cli.concurrency)
        .archive_mode(cli.archive.into())
        .cors_permissive(!cli.no_cors);

    if let Some(path) = ocr_key {
        builder = builder.ocr_credentials_path(path);
    }
    if let Some(path) = &cli.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(url) = &cli.storage_url {
        builder = builder.storage(url, cli.storage_key.clone().unwrap_or_default());
    }
    if let Some(key) = &cli.api_key {
        builder = builder.llm_api_key(key);
    }

    builder.build().context("Invalid configuration")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
