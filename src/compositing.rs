//! Foreground over background compositing

use crate::{
    color::WHITE,
    config::BackgroundSource,
    error::Result,
    services::io::ImageIOService,
};
use image::{imageops::FilterType, DynamicImage, Rgba, RgbaImage};
use tracing::instrument;

/// A ready-to-use background
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// Solid RGBA fill
    Color(Rgba<u8>),
    /// Decoded image, resized to the foreground on use
    Image(DynamicImage),
}

impl Default for Background {
    fn default() -> Self {
        Self::Color(WHITE)
    }
}

impl Background {
    /// Resolve a configured source, decoding a background image from disk
    ///
    /// # Errors
    /// - The background image cannot be read or decoded
    pub fn from_source(source: &BackgroundSource) -> Result<Self> {
        match source {
            BackgroundSource::Color(rgba) => Ok(Self::Color(Rgba(*rgba))),
            BackgroundSource::Image(path) => {
                log::info!("Using background image: {}", path.display());
                let loaded = ImageIOService::load_image(path)?;
                Ok(Self::Image(loaded.image))
            },
        }
    }

    /// Background pixels at exactly `width` x `height`
    fn render(&self, width: u32, height: u32) -> RgbaImage {
        match self {
            Self::Color(color) => RgbaImage::from_pixel(width, height, *color),
            Self::Image(image) => {
                if image.width() == width && image.height() == height {
                    image.to_rgba8()
                } else {
                    image
                        .resize_exact(width, height, FilterType::Lanczos3)
                        .to_rgba8()
                }
            },
        }
    }
}

/// Place `foreground` over `background` with Porter-Duff "over"
///
/// A background image is stretched (Lanczos3) to the foreground size.
/// Foreground pixels with full alpha are copied unchanged.
#[must_use]
#[instrument(skip_all, fields(width = foreground.width(), height = foreground.height()))]
pub fn composite(foreground: &DynamicImage, background: &Background) -> RgbaImage {
    let fg = foreground.to_rgba8();
    let mut out = background.render(fg.width(), fg.height());

    for (dst, src) in out.pixels_mut().zip(fg.pixels()) {
        *dst = over(*src, *dst);
    }
    out
}

fn over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let [sr, sg, sb, sa] = src.0;
    match sa {
        255 => return src,
        0 => return dst,
        _ => {},
    }

    let src_a = f32::from(sa) / 255.0;
    let dst_a = f32::from(dst.0[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| {
        let value = (f32::from(s) * src_a + f32::from(d) * dst_a * (1.0 - src_a)) / out_a;
        (value + 0.5).clamp(0.0, 255.0) as u8
    };
    let [dr, dg, db, _] = dst.0;
    Rgba([
        blend(sr, dr),
        blend(sg, dg),
        blend(sb, db),
        (out_a * 255.0 + 0.5).clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_opaque_foreground_is_reproduced() {
        let mut fg = RgbaImage::new(8, 6);
        for (x, y, p) in fg.enumerate_pixels_mut() {
            *p = Rgba([(x * 30) as u8, (y * 40) as u8, 7, 255]);
        }
        let out = composite(
            &DynamicImage::ImageRgba8(fg.clone()),
            &Background::Color(Rgba([1, 2, 3, 255])),
        );
        assert_eq!(out, fg);
    }

    #[test]
    fn test_transparent_foreground_shows_background() {
        let fg = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([200, 10, 10, 0])));
        let out = composite(&fg, &Background::default());
        assert!(out.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn test_half_alpha_blends_over_opaque_color() {
        let fg = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 128])));
        let out = composite(&fg, &Background::Color(Rgba([0, 0, 255, 255])));
        let [r, g, b, a] = out.get_pixel(0, 0).0;
        assert_eq!(a, 255);
        assert_eq!(g, 0);
        assert!((127..=129).contains(&r), "r = {r}");
        assert!((126..=128).contains(&b), "b = {b}");
    }

    #[test]
    fn test_background_image_is_stretched_to_foreground() {
        let bg = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 10, image::Rgb([0, 200, 0])));
        let fg = DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 16, Rgba([0, 0, 0, 0])));
        let out = composite(&fg, &Background::Image(bg));
        assert_eq!(out.dimensions(), (12, 16));
        let center = out.get_pixel(6, 8).0;
        assert_eq!(center[3], 255);
        assert!(center[1] > 190);
    }

    #[test]
    fn test_rgb_foreground_covers_background() {
        let fg = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([9, 9, 9])));
        let out = composite(&fg, &Background::default());
        assert!(out.pixels().all(|p| p.0 == [9, 9, 9, 255]));
    }

    #[test]
    fn test_background_from_color_source() {
        let bg = Background::from_source(&BackgroundSource::Color([1, 2, 3, 4])).unwrap();
        assert_eq!(bg, Background::Color(Rgba([1, 2, 3, 4])));
        assert!(Background::from_source(&BackgroundSource::Image("/no/such/bg.png".into())).is_err());
    }
}
