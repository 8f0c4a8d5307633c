//! Pilgrimage overlay CLI
//!
//! Composes an anime screenshot and a real-world location photo into the
//! two-pane comparison image, optionally cutting the character out locally
//! or asking the generative backend to blend it into the photo.

use super::config::{resolve_api_key, CliConfigBuilder, API_KEY_ENV};
use crate::{
    backends::{available_backends, create_backend, BackendType},
    cache::{format_size, ModelCache},
    compositor::ActiveTab,
    config::Language,
    download::ModelDownloader,
    error::{InputSlot, OverlayError},
    extractor::CharacterExtractor,
    generative::{GeminiClient, ImageGenerator},
    image_io::SourceImage,
    models::{ModelManager, ModelSource, ModelSpec},
    preferences::PreferenceStore,
    progress::ConsoleProgressReporter,
    session::{Export, ExportKind, OverlaySession},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Anime pilgrimage comparison tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "pilgrimage-overlay")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Console, global = true)]
    pub log_format: LogFormat,

    /// Use custom model cache directory
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum LogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<LogFormat> for TracingFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Console => Self::Console,
            LogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            LogFormat::Json => Self::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose a screenshot and a location photo into the comparison image
    Compose(ComposeArgs),
    /// Show or change stored preferences
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Download the segmentation model without composing anything
    DownloadModel {
        /// Model path or HuggingFace `owner/repo[:file]`
        #[arg(short, long)]
        model: Option<String>,
    },
    /// List cached models
    ListModels,
    /// Clear cached models (combine with --model to clear one repository)
    ClearCache {
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Show current cache directory
    CacheDir,
    /// Show execution provider diagnostics
    Providers,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the stored preferences
    Show,
    /// Set the interface language (zh-CN or en-US)
    SetLanguage { language: String },
    /// Switch between the two interface languages
    ToggleLanguage,
    /// Store the generative API key
    SetApiKey { key: String },
    /// Forget the stored API key
    ClearApiKey,
    /// Print the preferences file location
    Path,
}

/// How the bottom pane should be filled
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum OverlayMode {
    /// Screenshot and photo only
    Static,
    /// Cut the character out locally and overlay it on the photo
    Local,
    /// Let the generative backend blend the character into the photo
    Ai,
    /// Run both; --tab picks the displayed result
    Both,
}

impl OverlayMode {
    fn extracts(self) -> bool {
        matches!(self, Self::Local | Self::Both)
    }

    fn generates(self) -> bool {
        matches!(self, Self::Ai | Self::Both)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum TabArg {
    Local,
    Ai,
}

impl From<TabArg> for ActiveTab {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::Local => Self::Local,
            TabArg::Ai => Self::Ai,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum ExportTarget {
    Comparison,
    Composite,
    Cutout,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Anime screenshot (top pane)
    #[arg(long, value_name = "FILE")]
    pub screenshot: PathBuf,

    /// Real-world photo (bottom pane)
    #[arg(long, value_name = "FILE")]
    pub photo: PathBuf,

    /// Directory receiving the exported PNG files
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OverlayMode::Local)]
    pub mode: OverlayMode,

    /// Displayed result when both overlays exist
    #[arg(long, value_enum)]
    pub tab: Option<TabArg>,

    /// Exports to write, comma separated
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [ExportTarget::Comparison, ExportTarget::Composite, ExportTarget::Cutout])]
    pub exports: Vec<ExportTarget>,

    /// Segmentation backend (onnx, tract, mock)
    #[arg(short, long, default_value = "onnx")]
    pub backend: String,

    /// ONNX execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Model path or HuggingFace `owner/repo[:file]`
    #[arg(short, long)]
    pub model: Option<String>,

    /// Number of threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Padding around the detected character in pixels
    #[arg(long, default_value_t = crate::bounds::DEFAULT_PADDING)]
    pub padding: u32,

    #[arg(long)]
    pub pane_height: Option<u32>,

    #[arg(long)]
    pub margin: Option<u32>,

    /// Background colour as #RRGGBB
    #[arg(long)]
    pub background: Option<String>,

    /// Caption language (zh-CN or en-US) [default: stored preference]
    #[arg(long)]
    pub language: Option<String>,

    /// Overlay scale relative to the screenshot-to-photo ratio
    #[arg(long)]
    pub scale: Option<f64>,

    /// Overlay opacity (0.0 - 1.0)
    #[arg(long)]
    pub opacity: Option<f64>,

    /// Overlay centre in photo pixels
    #[arg(long, requires = "center_y")]
    pub center_x: Option<f64>,

    #[arg(long, requires = "center_x")]
    pub center_y: Option<f64>,

    /// Generative API key [default: $GEMINI_API_KEY, then stored key]
    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(long)]
    pub prompt: Option<String>,

    /// Generative model name
    #[arg(long)]
    pub generation_model: Option<String>,
}

/// Main entry point for the CLI application
///
/// # Errors
/// - Tracing initialization failed
/// - Any failure of the selected command
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;
    let span = spans::session(&session_id, command_name(&cli.command));
    run(&cli).instrument(span).await
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Compose(args) => compose(cli, args).await,
        Command::Config { action } => run_config(action),
        Command::DownloadModel { model } => download_model_only(cli, model.as_deref()).await,
        Command::ListModels => list_cached_models(cli),
        Command::ClearCache { model } => clear_cache_models(cli, model.as_deref()),
        Command::CacheDir => show_current_cache_dir(cli),
        Command::Providers => {
            show_provider_diagnostics();
            Ok(())
        },
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Compose(_) => "compose",
        Command::Config { .. } => "config",
        Command::DownloadModel { .. } => "download-model",
        Command::ListModels => "list-models",
        Command::ClearCache { .. } => "clear-cache",
        Command::CacheDir => "cache-dir",
        Command::Providers => "providers",
    }
}

fn open_cache(cli: &Cli) -> Result<ModelCache> {
    match &cli.cache_dir {
        Some(dir) => ModelCache::at(dir.clone())
            .with_context(|| format!("Failed to open model cache at {}", dir.display())),
        None => ModelCache::new().context("Failed to initialize model cache"),
    }
}

async fn compose(cli: &Cli, args: &ComposeArgs) -> Result<()> {
    let start_time = Instant::now();
    let store = PreferenceStore::new().context("Failed to locate preferences")?;
    let preferences = store.load().context("Failed to load preferences")?;
    let config = CliConfigBuilder::from_compose(args, &preferences)?;

    info!("Screenshot: {}", args.screenshot.display());
    info!("Photo: {}", args.photo.display());
    info!("Mode: {:?}, language: {}", args.mode, config.language);

    // Resolve the key before any slow work so a missing key fails fast
    let api_key = if args.mode.generates() {
        let env_key = std::env::var(API_KEY_ENV).ok();
        let key = resolve_api_key(args.api_key.as_deref(), env_key.as_deref(), &preferences)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key available. Pass --api-key, set {API_KEY_ENV}, or run `config set-api-key`."
                )
            })?;
        Some(key)
    } else {
        None
    };

    let reporter = Arc::new(ConsoleProgressReporter::new(cli.verbose > 0));
    let mut session = OverlaySession::new(config.clone())
        .context("Failed to create overlay session")?
        .with_progress_reporter(reporter);

    if args.mode.extracts() {
        let backend_type = CliConfigBuilder::backend_type(&args.backend)?;
        let cache = open_cache(cli)?;
        if backend_type != BackendType::Mock {
            ensure_model_available(&cache, &config.extraction.model)
                .await
                .context("Failed to ensure model is available")?;
        }
        let manager = ModelManager::new(config.extraction.model.clone())
            .with_cache_dir(cache.cache_dir().to_path_buf());
        let backend = create_backend(backend_type, &config.extraction, manager)
            .context("Failed to create segmentation backend")?;
        info!("Backend: {backend_type}, provider: {}", config.extraction.execution_provider);
        session = session.with_extractor(CharacterExtractor::new(backend, config.extraction.padding));
    }

    if args.mode.generates() {
        let client =
            GeminiClient::new(&config.generation).context("Failed to create generative client")?;
        session = session.with_generator(ImageGenerator::new(Arc::new(client)));
    }

    let screenshot = SourceImage::open(&args.screenshot)
        .with_context(|| format!("Failed to load screenshot {}", args.screenshot.display()))?;
    let photo = SourceImage::open(&args.photo)
        .with_context(|| format!("Failed to load photo {}", args.photo.display()))?;
    session.set_screenshot(screenshot)?;
    session.set_photo(photo)?;

    if args.mode.extracts() {
        session.extract().await.context("Character extraction failed")?;
        apply_overlay_arguments(&mut session, args)?;
    }

    if let Some(key) = &api_key {
        println!("Generating composite with {}...", config.generation.model_name);
        session.generate(key).await.context("Generative composite failed")?;
    }

    if let Some(tab) = args.tab {
        session.set_tab(tab.into())?;
    }

    let mode = session.render_mode()?.kind();
    info!("Render mode: {mode}");

    let written = write_exports(&mut session, &args.exports, &args.output_dir)?;
    info!(
        "Wrote {written} file(s) in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn apply_overlay_arguments(session: &mut OverlaySession, args: &ComposeArgs) -> Result<()> {
    if let Some(scale) = args.scale {
        session.set_scale(scale)?;
    }
    if let Some(opacity) = args.opacity {
        session.set_opacity(opacity)?;
    }
    if let (Some(x), Some(y)) = (args.center_x, args.center_y) {
        session.set_overlay_center(x, y)?;
    }
    Ok(())
}

fn write_exports(
    session: &mut OverlaySession,
    targets: &[ExportTarget],
    output_dir: &Path,
) -> Result<usize> {
    let mut written = 0;
    for target in targets {
        let export = match target {
            ExportTarget::Comparison => session.export_comparison(),
            ExportTarget::Composite => session.export_photo_composite(),
            ExportTarget::Cutout => session.export_cutout(),
        };
        let export: Export = match export {
            Ok(export) => export,
            Err(OverlayError::MissingInput(InputSlot::Cutout)) => {
                warn!("Skipping cutout export: no character has been extracted");
                continue;
            },
            Err(e) => return Err(e).context("Failed to prepare export"),
        };

        let span = spans::export(export.kind.label(), output_dir);
        let _entered = span.enter();
        let path = export
            .save_to_dir(output_dir)
            .with_context(|| format!("Failed to write {} export", export.kind.label()))?;
        println!("✅ {}: {}", describe_export(export.kind), path.display());
        written += 1;
    }
    Ok(written)
}

fn describe_export(kind: ExportKind) -> &'static str {
    match kind {
        ExportKind::Comparison => "Comparison",
        ExportKind::PhotoComposite => "Photo composite",
        ExportKind::Cutout => "Cutout",
    }
}

fn run_config(action: &ConfigAction) -> Result<()> {
    let store = PreferenceStore::new().context("Failed to locate preferences")?;

    match action {
        ConfigAction::Show => {
            let preferences = store.load().context("Failed to load preferences")?;
            println!("⚙️  Preferences ({})", store.path().display());
            println!("  └─ Language: {}", preferences.language);
            let key_status = if preferences.api_key().is_some() {
                "stored"
            } else {
                "not set"
            };
            println!("  └─ API key: {key_status}");
        },
        ConfigAction::SetLanguage { language } => {
            let language: Language = language
                .parse()
                .with_context(|| format!("Invalid language '{language}'"))?;
            store
                .update(|p| p.language = language)
                .context("Failed to save preferences")?;
            println!("Language set to {language}");
        },
        ConfigAction::ToggleLanguage => {
            let updated = store
                .update(|p| p.language = p.language.toggled())
                .context("Failed to save preferences")?;
            println!("Language set to {}", updated.language);
        },
        ConfigAction::SetApiKey { key } => {
            if key.trim().is_empty() {
                anyhow::bail!("API key must not be empty");
            }
            store
                .update(|p| p.set_api_key(Some(key)))
                .context("Failed to save preferences")?;
            println!("API key stored in {}", store.path().display());
        },
        ConfigAction::ClearApiKey => {
            store
                .update(|p| p.set_api_key(None))
                .context("Failed to save preferences")?;
            println!("API key cleared");
        },
        ConfigAction::Path => println!("{}", store.path().display()),
    }
    Ok(())
}

/// Download a HuggingFace model into the cache if it is not there yet
async fn ensure_model_available(cache: &ModelCache, spec: &ModelSpec) -> Result<()> {
    if let ModelSource::HuggingFace { repo, file } = &spec.source {
        if !cache.is_cached(repo, file) {
            println!("📥 Model {} not cached, downloading...", spec.source.display_name());
        }
    }
    let downloader = ModelDownloader::with_cache(cache.clone())
        .context("Failed to create model downloader")?;
    let path = downloader
        .ensure_model(&spec.source, true)
        .await
        .with_context(|| format!("Failed to fetch {}", spec.source.display_name()))?;
    info!("Using model at {}", path.display());
    Ok(())
}

async fn download_model_only(cli: &Cli, model: Option<&str>) -> Result<()> {
    let spec = model.map(ModelSpec::parse).unwrap_or_default();
    if let Some(url) = spec.source.download_url() {
        println!("📥 Downloading model from: {url}");
    }
    let cache = open_cache(cli)?;
    ensure_model_available(&cache, &spec).await?;
    println!("✅ Model ready: {}", spec.source.display_name());
    Ok(())
}

fn list_cached_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("📦 Cached Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if models.is_empty() {
        println!("No cached models found.");
        println!("\n💡 To download the default model, use:");
        println!("  pilgrimage-overlay download-model");
        return Ok(());
    }

    for model in models {
        println!("📁 Model ID: {}", model.model_id);
        println!("  └─ Cache location: {}", model.path.display());
        println!("  └─ Size: {}", format_size(model.size_bytes));
        println!();
    }

    Ok(())
}

fn clear_cache_models(cli: &Cli, model: Option<&str>) -> Result<()> {
    let cache = open_cache(cli)?;

    match model {
        Some(model) => {
            let repo = match ModelSpec::parse(model).source {
                ModelSource::HuggingFace { repo, .. } => repo,
                ModelSource::Path(path) => {
                    anyhow::bail!("'{}' is a local file, not a cached model", path.display())
                },
            };
            if cache.clear_model(&repo).context("Failed to clear model")? {
                println!("🗑️  Removed cached model {repo}");
            } else {
                println!("Model {repo} is not cached");
            }
        },
        None => {
            let models = cache
                .scan_cached_models()
                .context("Failed to list cached models")?;
            if models.is_empty() {
                println!("Cache is already empty");
                return Ok(());
            }
            for info in &models {
                let repo = info.model_id.replace("--", "/");
                cache
                    .clear_model(&repo)
                    .with_context(|| format!("Failed to clear {repo}"))?;
                println!("🗑️  Removed {}", info.model_id);
            }
            println!("Cleared {} model(s)", models.len());
        },
    }
    Ok(())
}

fn show_current_cache_dir(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    println!("📂 Model cache: {}", cache.cache_dir().display());
    if cli.cache_dir.is_none() {
        println!(
            "💡 Override with --cache-dir or {}",
            crate::cache::CACHE_DIR_ENV
        );
    }
    Ok(())
}

fn show_provider_diagnostics() {
    println!("🔍 Segmentation backends");
    for backend in available_backends() {
        println!("  └─ {backend}");
    }

    #[cfg(feature = "onnx")]
    {
        use crate::backends::OnnxBackend;

        println!("\n🖥️  ONNX Runtime execution providers");
        for (name, available, description) in OnnxBackend::list_providers() {
            let status = if available { "✅" } else { "❌" };
            println!("  {status} {name}: {description}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compose_defaults() {
        let cli = Cli::parse_from([
            "pilgrimage-overlay",
            "compose",
            "--screenshot",
            "a.png",
            "--photo",
            "b.jpg",
        ]);
        let Command::Compose(args) = cli.command else {
            panic!("expected compose");
        };
        assert_eq!(args.mode, OverlayMode::Local);
        assert_eq!(
            args.exports,
            vec![ExportTarget::Comparison, ExportTarget::Composite, ExportTarget::Cutout]
        );
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert!(args.tab.is_none());
    }

    #[test]
    fn test_compose_export_list_and_global_flags() {
        let cli = Cli::parse_from([
            "pilgrimage-overlay",
            "compose",
            "--screenshot",
            "a.png",
            "--photo",
            "b.jpg",
            "--mode",
            "both",
            "--tab",
            "local",
            "--exports",
            "comparison,cutout",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Compose(args) = cli.command else {
            panic!("expected compose");
        };
        assert!(args.mode.extracts());
        assert!(args.mode.generates());
        assert_eq!(ActiveTab::from(args.tab.unwrap()), ActiveTab::Local);
        assert_eq!(args.exports, vec![ExportTarget::Comparison, ExportTarget::Cutout]);
    }

    #[test]
    fn test_center_requires_both_coordinates() {
        let result = Cli::try_parse_from([
            "pilgrimage-overlay",
            "compose",
            "--screenshot",
            "a.png",
            "--photo",
            "b.jpg",
            "--center-x",
            "10",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::parse_from(["pilgrimage-overlay", "config", "set-language", "en-US"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::SetLanguage { ref language }
            } if language == "en-US"
        ));
        assert_eq!(command_name(&cli.command), "config");
    }

    #[test]
    fn test_mode_flags() {
        assert!(!OverlayMode::Static.extracts());
        assert!(!OverlayMode::Static.generates());
        assert!(OverlayMode::Local.extracts());
        assert!(!OverlayMode::Local.generates());
        assert!(OverlayMode::Ai.generates());
        assert!(!OverlayMode::Ai.extracts());
    }
}
