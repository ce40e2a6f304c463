//! Conversion of parsed CLI arguments into a [`ProcessorConfig`]

use crate::cli::main_impl::Cli;
use crate::{
    color::parse_color,
    config::{BackgroundSource, EncodeOptions, OutputFormat, ProcessorConfig},
    filters::ColorFilter,
    models::ModelSource,
    resize::ResizeSpec,
    responsive::{self, DEFAULT_BREAKPOINTS},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to the library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated [`ProcessorConfig`] from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<ProcessorConfig> {
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let filter = cli
            .filter
            .as_deref()
            .map(str::parse::<ColorFilter>)
            .transpose()
            .context("Invalid --filter")?;

        let format: OutputFormat = cli.format.parse().context("Invalid --format")?;

        let encode = if cli.web_optimized {
            EncodeOptions::web_optimized(cli.quality)
        } else {
            EncodeOptions {
                quality: cli.quality,
                progressive: cli.progressive,
                strip_metadata: cli.strip_metadata,
            }
        };

        ProcessorConfig::builder()
            .model(ModelSource::parse(&cli.model))
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .num_threads(cli.threads)
            .alpha_matting(cli.alpha_matting)
            .mask_only(cli.mask_only)
            .color_filter(filter)
            .saturation(cli.saturation)
            .brightness(cli.brightness)
            .contrast(cli.contrast)
            .sharpness(cli.sharpness)
            .feather(cli.feather)
            .background(Self::background(cli)?)
            .resize(Self::resize(cli))
            .output_format(format)
            .file_extension(cli.format.as_str())
            .encode_options(encode)
            .build()
            .context("Invalid processing options")
    }

    /// A background image wins over a color
    fn background(cli: &Cli) -> Result<BackgroundSource> {
        if let Some(path) = &cli.bg_image {
            if cli.color.is_some() {
                log::warn!("Both --color and --bg-image given, using the image");
            }
            return Ok(BackgroundSource::Image(path.clone()));
        }

        match &cli.color {
            Some(color) => {
                let rgba = parse_color(color).with_context(|| format!("Invalid --color '{color}'"))?;
                Ok(BackgroundSource::Color(rgba.0))
            },
            None => Ok(BackgroundSource::default()),
        }
    }

    fn resize(cli: &Cli) -> ResizeSpec {
        ResizeSpec {
            width: cli.width,
            height: cli.height,
            scale: cli.scale,
            maintain_aspect: !cli.no_aspect,
        }
    }

    /// Breakpoints for `--responsive`, the standard set when none are given
    pub(crate) fn breakpoints(cli: &Cli) -> Result<Vec<u32>> {
        match &cli.breakpoints {
            Some(list) => responsive::parse_breakpoints(list).context("Invalid --breakpoints"),
            None => Ok(DEFAULT_BREAKPOINTS.to_vec()),
        }
    }

    /// Checks that must pass before any file is touched, returning the
    /// configuration they produced
    pub(crate) fn validate_cli(cli: &Cli) -> Result<ProcessorConfig> {
        if cli.breakpoints.is_some() && !cli.responsive {
            log::warn!("--breakpoints has no effect without --responsive");
        }
        Self::breakpoints(cli)?;
        Self::from_cli(cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendType, ExecutionProvider};
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["bgreplace"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_config_defaults() {
        let cli = parse(&["photo.jpg"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.backend_type, BackendType::Onnx);
        assert_eq!(config.inference.execution_provider, ExecutionProvider::Auto);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert_eq!(config.encode.quality, 90);
        assert_eq!(config.model, ModelSource::default());
        assert_eq!(config.background, BackgroundSource::Color([255, 255, 255, 255]));
        assert!(config.resize.is_empty());
    }

    #[test]
    fn test_cli_config_conversion() {
        let cli = parse(&[
            "photo.jpg", "-f", "webp", "-q", "75", "-c", "#00FF0080", "--filter", "cold",
            "--saturation", "1.3", "--width", "800", "-e", "tract:cpu", "--web-optimized",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.output_format, OutputFormat::WebP);
        assert_eq!(config.encode.quality, 75);
        assert_eq!(config.encode, EncodeOptions::web_optimized(75));
        assert_eq!(config.background, BackgroundSource::Color([0, 255, 0, 128]));
        assert_eq!(config.adjustments.filter, Some(ColorFilter::Cool));
        assert_eq!(config.resize, ResizeSpec::width(800));
    }

    #[test]
    fn test_bg_image_takes_precedence() {
        let cli = parse(&["photo.jpg", "-c", "red", "-b", "beach.jpg"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.background, BackgroundSource::Image("beach.jpg".into()));
    }

    #[test]
    fn test_format_aliases() {
        assert_eq!(parse(&["a.png", "-f", "JPG"]).format, "jpg");
        assert_eq!(parse(&["a.png", "-f", "jpeg"]).format, "jpeg");
        assert_eq!(parse(&["a.png"]).format, "png");
        assert!(Cli::try_parse_from(["bgreplace", "a.png", "-f", "tiff"]).is_err());

        let config = CliConfigBuilder::from_cli(&parse(&["a.png", "-f", "JPEG"])).unwrap();
        assert_eq!(config.output_format, OutputFormat::Jpeg);
        assert_eq!(config.extension(), "jpeg");
        let config = CliConfigBuilder::from_cli(&parse(&["a.png", "-f", "AVIF"])).unwrap();
        assert_eq!(config.output_format, OutputFormat::Avif);
        assert_eq!(config.extension(), "avif");
    }

    #[test]
    fn test_encode_options_without_web_preset() {
        let cli = parse(&["a.png", "-q", "60", "--progressive"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(
            config.encode,
            EncodeOptions {
                quality: 60,
                progressive: true,
                strip_metadata: false,
            }
        );
    }

    #[test]
    fn test_cli_validation() {
        let cli = parse(&["a.png", "-c", "navy", "--feather", "2"]);
        let config = CliConfigBuilder::validate_cli(&cli).unwrap();
        assert_eq!(config, CliConfigBuilder::from_cli(&cli).unwrap());
        assert_eq!(config.enhancements.feather, 2);
        assert_eq!(config.background, BackgroundSource::Color([255, 255, 255, 255]));

        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "-e", "invalid:provider"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "--responsive", "--breakpoints", "640,abc"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "-c", "300,0,0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "--filter", "neon"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "--brightness=-1"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "--scale", "0"])).is_err());
        assert!(Cli::try_parse_from(["bgreplace", "a.png", "-q", "0"]).is_err());
        assert!(Cli::try_parse_from(["bgreplace", "a.png", "-q", "101"]).is_err());
    }

    #[test]
    fn test_breakpoints_default_and_custom() {
        let cli = parse(&["a.png", "--responsive"]);
        assert_eq!(CliConfigBuilder::breakpoints(&cli).unwrap(), DEFAULT_BREAKPOINTS.to_vec());

        let cli = parse(&["a.png", "--responsive", "--breakpoints", "320, 640"]);
        assert_eq!(CliConfigBuilder::breakpoints(&cli).unwrap(), vec![320, 640]);
    }
}
