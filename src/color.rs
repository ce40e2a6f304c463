//! Background color parsing
//!
//! Accepted forms: `#RRGGBB`, `#RRGGBBAA`, `R,G,B`, `R,G,B,A` and a small set
//! of color names. Anything unrecognised resolves to opaque white.

use crate::error::{BgReplaceError, Result};
use image::Rgba;

/// Opaque white, the default background
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

const NAMED_COLORS: &[(&str, [u8; 4])] = &[
    ("white", [255, 255, 255, 255]),
    ("black", [0, 0, 0, 255]),
    ("red", [255, 0, 0, 255]),
    ("green", [0, 255, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
];

/// Parse a background color string into RGBA
///
/// Hex strings of any length other than 6 or 8 digits, component lists that
/// are not 3 or 4 long, and unknown names fall back to white with a warning.
///
/// # Errors
/// - Non-hex digits in a 6 or 8 digit hex string
/// - Non-numeric or out-of-range (> 255) components in a comma list
///
/// # Examples
/// ```rust
/// use bgreplace::color::parse_color;
/// use image::Rgba;
///
/// assert_eq!(parse_color("#FF8000").unwrap(), Rgba([255, 128, 0, 255]));
/// assert_eq!(parse_color("0,0,0").unwrap(), Rgba([0, 0, 0, 255]));
/// assert_eq!(parse_color("cyan").unwrap(), Rgba([0, 255, 255, 255]));
/// ```
pub fn parse_color(input: &str) -> Result<Rgba<u8>> {
    let trimmed = input.trim();

    if let Some(hex) = trimmed.strip_prefix('#') {
        if let Some(color) = parse_hex(hex)? {
            return Ok(color);
        }
    } else if trimmed.contains(',') {
        if let Some(color) = parse_components(trimmed)? {
            return Ok(color);
        }
    }

    let lowered = trimmed.to_ascii_lowercase();
    if let Some((_, rgba)) = NAMED_COLORS.iter().find(|(name, _)| *name == lowered) {
        return Ok(Rgba(*rgba));
    }

    log::warn!("Unrecognised color '{trimmed}', using white");
    Ok(WHITE)
}

fn parse_hex(hex: &str) -> Result<Option<Rgba<u8>>> {
    if hex.len() != 6 && hex.len() != 8 {
        return Ok(None);
    }

    let mut channels = [255u8; 4];
    for (slot, start) in channels.iter_mut().zip((0..hex.len()).step_by(2)) {
        let pair = hex
            .get(start..start + 2)
            .ok_or_else(|| BgReplaceError::invalid_config(format!("Invalid hex color: #{hex}")))?;
        *slot = u8::from_str_radix(pair, 16).map_err(|e| {
            BgReplaceError::invalid_config(format!("Invalid hex color '#{hex}': {e}"))
        })?;
    }

    Ok(Some(Rgba(channels)))
}

fn parse_components(list: &str) -> Result<Option<Rgba<u8>>> {
    let values = list
        .split(',')
        .map(|part| {
            part.trim().parse::<u8>().map_err(|e| {
                BgReplaceError::invalid_config(format!(
                    "Invalid color component '{}' in '{list}': {e}",
                    part.trim()
                ))
            })
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok(match values.as_slice() {
        [r, g, b] => Some(Rgba([*r, *g, *b, 255])),
        [r, g, b, a] => Some(Rgba([*r, *g, *b, *a])),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_colors() {
        assert_eq!(parse_color("#FFFFFF").unwrap(), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("#00ff7f").unwrap(), Rgba([0, 255, 127, 255]));
        assert_eq!(parse_color("#11223344").unwrap(), Rgba([0x11, 0x22, 0x33, 0x44]));
    }

    #[test]
    fn test_component_lists() {
        assert_eq!(parse_color("0,0,0").unwrap(), Rgba([0, 0, 0, 255]));
        assert_eq!(parse_color(" 10, 20 ,30 ,40").unwrap(), Rgba([10, 20, 30, 40]));
    }

    #[test]
    fn test_named_colors_case_insensitive() {
        assert_eq!(parse_color("white").unwrap(), WHITE);
        assert_eq!(parse_color("Magenta").unwrap(), Rgba([255, 0, 255, 255]));
        assert_eq!(parse_color("BLACK").unwrap(), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_unknown_forms_fall_back_to_white() {
        assert_eq!(parse_color("chartreuse").unwrap(), WHITE);
        assert_eq!(parse_color("#abc").unwrap(), WHITE);
        assert_eq!(parse_color("1,2").unwrap(), WHITE);
        assert_eq!(parse_color("").unwrap(), WHITE);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(parse_color("#GG0000").is_err());
        assert!(parse_color("300,0,0").is_err());
        assert!(parse_color("red,green,blue").is_err());
    }
}
