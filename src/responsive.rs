//! Responsive image sets: one encoded copy per breakpoint width

use crate::error::{BgReplaceError, Result};
use std::path::{Path, PathBuf};

/// Widths generated when none are given
pub const DEFAULT_BREAKPOINTS: [u32; 6] = [640, 768, 1024, 1280, 1920, 2560];

/// Parse a comma-separated breakpoint list such as `"640,1024,1920"`
///
/// # Errors
/// - Any entry that is not a positive integer
/// - An empty list
pub fn parse_breakpoints(input: &str) -> Result<Vec<u32>> {
    let breakpoints = input
        .split(',')
        .map(str::trim)
        .map(|part| match part.parse::<u32>() {
            Ok(0) | Err(_) => Err(BgReplaceError::invalid_config(format!(
                "Invalid breakpoint '{part}' in '{input}' (expected comma-separated positive integers)"
            ))),
            Ok(width) => Ok(width),
        })
        .collect::<Result<Vec<_>>>()?;

    if breakpoints.is_empty() {
        return Err(BgReplaceError::invalid_config("No breakpoints given"));
    }
    Ok(breakpoints)
}

/// Breakpoints that fit within an image `width` pixels wide, in input order
///
/// Larger breakpoints are skipped, never upscaled.
#[must_use]
pub fn plan(width: u32, breakpoints: &[u32]) -> Vec<u32> {
    breakpoints
        .iter()
        .copied()
        .filter(|&bp| {
            let fits = bp <= width;
            if !fits {
                log::info!("Skipping {bp}w (image is only {width}px wide)");
            }
            fits
        })
        .collect()
}

/// `<dir>/<stem>_<width>w.<extension>`
#[must_use]
pub fn output_path(dir: &Path, stem: &str, width: u32, extension: &str) -> PathBuf {
    dir.join(format!("{stem}_{width}w.{extension}"))
}

/// Default output directory: `responsive/` next to the input
#[must_use]
pub fn default_output_dir(input: &Path) -> PathBuf {
    input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("responsive")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_breakpoints() {
        assert_eq!(parse_breakpoints("640,1024").unwrap(), vec![640, 1024]);
        assert_eq!(parse_breakpoints(" 320 , 480 ").unwrap(), vec![320, 480]);
        assert!(parse_breakpoints("640,abc").is_err());
        assert!(parse_breakpoints("640,,1024").is_err());
        assert!(parse_breakpoints("-5").is_err());
        assert!(parse_breakpoints("0").is_err());
        assert!(parse_breakpoints("").is_err());
    }

    #[test]
    fn test_plan_skips_larger_breakpoints() {
        assert_eq!(plan(1920, &[640, 4000]), vec![640]);
        assert_eq!(plan(1920, &DEFAULT_BREAKPOINTS), vec![640, 768, 1024, 1280, 1920]);
        assert!(plan(300, &DEFAULT_BREAKPOINTS).is_empty());
    }

    #[test]
    fn test_output_naming() {
        let path = output_path(Path::new("/out"), "portrait", 640, "webp");
        assert_eq!(path, PathBuf::from("/out/portrait_640w.webp"));
        let path = output_path(Path::new("out"), "photo", 640, "jpeg");
        assert_eq!(path, PathBuf::from("out/photo_640w.jpeg"));
    }

    #[test]
    fn test_default_output_dir() {
        assert_eq!(
            default_output_dir(Path::new("/photos/cat.jpg")),
            PathBuf::from("/photos/responsive")
        );
    }
}
