//! Background replacement CLI tool
//!
//! Resolves inputs, builds one [`BackgroundReplacer`] for the whole run and
//! processes files one after another, reporting and skipping failures.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache},
    config::{OutputFormat, ProcessorConfig},
    download::ModelDownloader,
    models::{default_model, ModelSource, MODEL_REGISTRY},
    processor::BackgroundReplacer,
    responsive,
    services::ImageIOService,
    tracing_config::init_cli_tracing,
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info_span;

/// Replace image backgrounds with a color or another image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgreplace")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input files, glob patterns or directories
    #[arg(value_name = "INPUT", required_unless_present_any = &["list_models", "show_cache_dir", "show_providers", "clear_cache"])]
    pub input: Vec<String>,

    /// Output file (only with a single input)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Output directory (default: next to each input)
    #[arg(short = 'd', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: PNG, JPG, JPEG, WEBP or AVIF (lowercased, it is also the file extension)
    #[arg(short, long, default_value = "PNG", value_parser = parse_output_format)]
    pub format: String,

    /// Suffix appended to the input file stem
    #[arg(long, default_value = "_no_bg")]
    pub suffix: String,

    /// Lossy encoder quality (1-100)
    #[arg(short, long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Background color: #RRGGBB, #RRGGBBAA, R,G,B, R,G,B,A or a color name
    #[arg(short, long)]
    pub color: Option<String>,

    /// Background image, resized to the input
    #[arg(short, long, value_name = "IMAGE")]
    pub bg_image: Option<PathBuf>,

    /// Segmentation model name or path to an .onnx file
    #[arg(short, long, default_value = crate::models::DEFAULT_MODEL)]
    pub model: String,

    /// Refine mask edges with alpha matting
    #[arg(short, long)]
    pub alpha_matting: bool,

    /// Write the segmentation mask instead of a composite
    #[arg(long)]
    pub mask_only: bool,

    /// Brightness factor (1.0 = unchanged)
    #[arg(long, default_value_t = 1.0)]
    pub brightness: f32,

    /// Contrast factor (1.0 = unchanged)
    #[arg(long, default_value_t = 1.0)]
    pub contrast: f32,

    /// Sharpness factor (1.0 = unchanged)
    #[arg(long, default_value_t = 1.0)]
    pub sharpness: f32,

    /// Alpha edge blur radius in pixels
    #[arg(long, default_value_t = 0)]
    pub feather: u32,

    /// Color filter: warm, cool, cold, sepia, vintage, vibrant or muted
    #[arg(long)]
    pub filter: Option<String>,

    /// Saturation factor (1.0 = unchanged)
    #[arg(long, default_value_t = 1.0)]
    pub saturation: f32,

    /// Output width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Uniform scale factor, overrides width and height
    #[arg(long)]
    pub scale: Option<f32>,

    /// Stretch to exactly --width x --height
    #[arg(long)]
    pub no_aspect: bool,

    /// Progressive JPEG
    #[arg(long)]
    pub progressive: bool,

    /// Do not embed the input's color profile
    #[arg(long)]
    pub strip_metadata: bool,

    /// Shorthand for --progressive --strip-metadata
    #[arg(long)]
    pub web_optimized: bool,

    /// Write one copy per breakpoint width instead of a single output
    #[arg(long)]
    pub responsive: bool,

    /// Comma-separated breakpoint widths for --responsive
    #[arg(long, value_name = "WIDTHS")]
    pub breakpoints: Option<String>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Recurse into directory inputs
    #[arg(short, long)]
    pub recursive: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List known models and whether they are cached
    #[arg(long)]
    pub list_models: bool,

    /// Print the model cache directory
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Show backends and execution providers available on this machine
    #[arg(long)]
    pub show_providers: bool,

    /// Remove cached models and exit; `--clear-cache=NAME` removes only NAME
    #[arg(long, value_name = "MODEL", num_args = 0..=1, require_equals = true)]
    pub clear_cache: Option<Option<String>>,
}

/// Accepts any spelling of a supported format and keeps it, lowercased
fn parse_output_format(value: &str) -> std::result::Result<String, String> {
    value.parse::<OutputFormat>().map_err(|e| format!("{e}"))?;
    Ok(value.trim().to_ascii_lowercase())
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    if cli.show_cache_dir {
        return show_current_cache_dir();
    }

    if cli.list_models {
        return list_models();
    }

    if let Some(target) = &cli.clear_cache {
        return clear_cache_models(target.as_deref());
    }

    let config = CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let breakpoints = CliConfigBuilder::breakpoints(&cli)?;

    let files = resolve_inputs(&cli.input, cli.recursive)?;
    if files.is_empty() {
        anyhow::bail!("No supported image files found in: {}", cli.input.join(", "));
    }
    info!("Found {} image(s) to process", files.len());
    if cli.output.is_some() && (files.len() > 1 || cli.responsive) {
        warn!("--output is ignored with several inputs or --responsive");
    }

    info!(
        "Backend: {}, provider: {}, model: {}",
        config.backend_type,
        config.inference.execution_provider,
        config.model.display_name()
    );

    let mut replacer = create_replacer(config).await?;

    let start_time = Instant::now();
    let (processed, failed) = process_files(&cli, &files, &breakpoints, &mut replacer);

    info!(
        "Processed {} of {} image(s) in {:.2}s",
        processed,
        files.len(),
        start_time.elapsed().as_secs_f64()
    );
    if failed > 0 {
        warn!("{failed} file(s) failed");
    }

    Ok(())
}

/// Download the model when needed and open the processor
///
/// A model that cannot be fetched or loaded is replaced by the default model.
async fn create_replacer(mut config: ProcessorConfig) -> Result<BackgroundReplacer> {
    let downloader = ModelDownloader::new().context("Failed to create model downloader")?;

    if let ModelSource::Named(name) = &config.model {
        let fetched = match config.model.descriptor() {
            Some(descriptor) => downloader
                .ensure_model(descriptor, true)
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from),
            None => Err(anyhow::anyhow!(
                "unknown model (available: {})",
                crate::models::available_model_names()
            )),
        };
        if let Err(e) = fetched {
            if config.model == ModelSource::default() {
                return Err(e.context("Failed to download the default model"));
            }
            warn!("Model '{name}' unavailable ({e:#}), falling back to {}", default_model().name);
            config.model = ModelSource::default();
        }
    }

    match BackgroundReplacer::with_cache(config.clone(), downloader.cache()) {
        Ok(replacer) => Ok(replacer),
        Err(e) if !downloader.cache().is_model_cached(default_model().name) => {
            // The fallback needs the default model on disk
            warn!("{e}; fetching {} to fall back on", default_model().name);
            downloader
                .ensure_model(default_model(), true)
                .await
                .context("Failed to download the default model")?;
            BackgroundReplacer::with_cache(config, downloader.cache())
                .context("Failed to create background replacer")
        },
        Err(e) => Err(e).context("Failed to create background replacer"),
    }
}

/// Run every file through the processor, returning (processed, failed)
fn process_files(
    cli: &Cli,
    files: &[PathBuf],
    breakpoints: &[u32],
    replacer: &mut BackgroundReplacer,
) -> (usize, usize) {
    let progress = (files.len() > 1).then(|| {
        let pb = ProgressBar::new(files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    });

    let single_output = if files.len() == 1 && !cli.responsive {
        cli.output.as_deref()
    } else {
        None
    };

    let mut processed = 0;
    let mut failed = 0;
    for input in files {
        let _span = info_span!("process_file", input = %input.display()).entered();
        if let Some(pb) = &progress {
            pb.set_message(format!("{}", input.display()));
        }

        let result = if cli.responsive {
            let dir = cli
                .output_dir
                .clone()
                .unwrap_or_else(|| responsive::default_output_dir(input));
            replacer.process_responsive(input, &dir, breakpoints)
        } else {
            let output = single_output.map_or_else(
                || output_path(input, cli.output_dir.as_deref(), &cli.suffix, replacer.config().extension()),
                Path::to_path_buf,
            );
            replacer.process_file(input, &output)
        };

        match result.with_context(|| format!("Failed to process {}", input.display())) {
            Ok(report) => {
                processed += 1;
                if report.outputs.is_empty() {
                    warn!("{}: every breakpoint is wider than the image", input.display());
                }
                for output in &report.outputs {
                    println!("{} -> {}", input.display(), output.display());
                }
                log::debug!(
                    "{}: {} written, timings {:?}",
                    input.display(),
                    format_size(report.bytes_written),
                    report.timings
                );
            },
            Err(e) => {
                failed += 1;
                error!("{e:#}");
            },
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message("done");
    }
    (processed, failed)
}

/// `<dir>/<stem><suffix>.<extension>`, where `dir` defaults to the input's directory
pub(crate) fn output_path(input: &Path, output_dir: Option<&Path>, suffix: &str, extension: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let dir = output_dir.unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")));
    dir.join(format!("{stem}{suffix}.{extension}"))
}

/// Expand files, directories and glob patterns into a sorted, deduplicated list
pub(crate) fn resolve_inputs(inputs: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_file() {
            if ImageIOService::is_supported_format(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, recursive));
        } else if is_glob_pattern(input) {
            let matches = glob::glob(input).with_context(|| format!("Invalid glob pattern '{input}'"))?;
            let before = files.len();
            for entry in matches {
                match entry {
                    Ok(p) if p.is_file() && ImageIOService::is_supported_format(&p) => files.push(p),
                    Ok(_) => {},
                    Err(e) => warn!("Cannot read {}: {}", e.path().display(), e.error()),
                }
            }
            if files.len() == before {
                warn!("No images match '{input}'");
            }
        } else {
            warn!("Input not found: {input}");
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

fn find_image_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 });

    walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", dir.display());
                None
            },
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| ImageIOService::is_supported_format(path))
        .collect()
}

fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("==========================================");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nBackends:");
    println!("  onnx   ONNX Runtime (default), hardware acceleration where available");
    println!("  tract  Pure Rust inference, CPU only");

    println!("\nExecution providers:");
    for provider in ExecutionProviderManager::list_all_providers() {
        let status = if provider.available { "available" } else { "not available" };
        println!("  {:<12} {:<14} {}", provider.name, status, provider.description);
    }

    println!("\nUsage:");
    println!("  --execution-provider onnx:auto    # best ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Apple CoreML");
    println!("  --execution-provider tract:cpu    # pure Rust backend");
}

fn show_current_cache_dir() -> Result<()> {
    let dir = ModelCache::default_cache_dir().context("Failed to determine cache directory")?;
    println!("{}", dir.display());
    Ok(())
}

/// Remove one cached model, or all of them when `model` is `None`
fn clear_cache_models(model: Option<&str>) -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;

    match model {
        Some(name) => {
            if cache
                .clear_specific_model(name)
                .with_context(|| format!("Failed to clear model '{name}'"))?
            {
                println!("Removed {name}");
            } else {
                println!("{name} is not cached (see --list-models)");
            }
        },
        None => {
            let removed = cache.clear_all_models().context("Failed to clear model cache")?;
            if removed.is_empty() {
                println!("Cache was already empty");
            }
            for name in &removed {
                println!("Removed {name}");
            }
        },
    }
    println!("Cache: {}", cache.cache_dir().display());
    Ok(())
}

fn list_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;

    println!("Models (cache: {})", cache.cache_dir().display());
    for model in MODEL_REGISTRY {
        let state = if cache.is_model_cached(model.name) {
            let size = std::fs::metadata(cache.model_path(model.name))
                .map(|m| m.len())
                .unwrap_or(0);
            format!("cached, {}", format_size(size))
        } else {
            "not downloaded".to_string()
        };
        let marker = if model.name == default_model().name { "*" } else { " " };
        println!("{marker} {:<24} {:<20} {}", model.name, state, model.description);
    }

    let extra: Vec<_> = cache
        .scan_cached_models()
        .context("Failed to list cached models")?
        .into_iter()
        .filter(|cached| crate::models::find_model(&cached.name).is_none())
        .collect();
    if !extra.is_empty() {
        println!("\nOther cached files:");
        for cached in extra {
            println!("  {:<24} {}", cached.name, format_size(cached.size_bytes));
        }
    }

    println!("\n* default model; models download on first use");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_output_path_naming() {
        let input = Path::new("/photos/cat.jpeg");
        assert_eq!(
            output_path(input, None, "_no_bg", "png"),
            PathBuf::from("/photos/cat_no_bg.png")
        );
        assert_eq!(
            output_path(input, Some(Path::new("/out")), "", "jpg"),
            PathBuf::from("/out/cat.jpg")
        );
    }

    #[test]
    fn test_output_path_keeps_requested_format_spelling() {
        let cli = Cli::try_parse_from(["bgreplace", "photo.png", "-f", "JPEG"]).unwrap();
        let config = CliConfigBuilder::validate_cli(&cli).unwrap();
        assert_eq!(
            output_path(Path::new("/in/photo.png"), None, "_processed", config.extension()),
            PathBuf::from("/in/photo_processed.jpeg")
        );
        assert_eq!(
            responsive::output_path(Path::new("/in/responsive"), "photo", 640, config.extension()),
            PathBuf::from("/in/responsive/photo_640w.jpeg")
        );
    }

    #[test]
    fn test_resolve_directory_inputs() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.png"));
        touch(&dir.path().join("a.JPG"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("nested/c.webp"));

        let root = dir.path().to_string_lossy().to_string();
        let flat = resolve_inputs(&[root.clone()], false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.JPG"), dir.path().join("b.png")]);

        let deep = resolve_inputs(&[root], true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("nested/c.webp")));
    }

    #[test]
    fn test_resolve_glob_and_dedup() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("one.png"));
        touch(&dir.path().join("two.png"));
        touch(&dir.path().join("three.gif"));

        let pattern = format!("{}/*.png", dir.path().display());
        let explicit = dir.path().join("one.png").to_string_lossy().to_string();
        let files = resolve_inputs(&[pattern, explicit], false).unwrap();
        assert_eq!(files, vec![dir.path().join("one.png"), dir.path().join("two.png")]);
    }

    #[test]
    fn test_resolve_missing_inputs_is_empty() {
        let files = resolve_inputs(&["/definitely/not/here.png".to_string()], false).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_info_flags_need_no_input() {
        assert!(Cli::try_parse_from(["bgreplace", "--list-models"]).is_ok());
        assert!(Cli::try_parse_from(["bgreplace", "--show-cache-dir"]).is_ok());
        assert!(Cli::try_parse_from(["bgreplace"]).is_err());

        let cli = Cli::try_parse_from(["bgreplace", "--clear-cache"]).unwrap();
        assert_eq!(cli.clear_cache, Some(None));
        let cli = Cli::try_parse_from(["bgreplace", "--clear-cache=u2net"]).unwrap();
        assert_eq!(cli.clear_cache, Some(Some("u2net".to_string())));
    }
}
