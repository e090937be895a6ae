//! Image transform kernels
//!
//! The generation dispatch treats these as opaque: PNG bytes in, PNG bytes
//! out, parameters from the node config. [`PngTransforms`] implements the
//! set with the `image` crate; tests that only exercise graph semantics
//! substitute their own [`ImageTransforms`].
//!
//! Palette operations work in the Oklab perceptual color space so "nearest
//! color" matches what an eye would pick; the conversion is the standard
//! sRGB ↔ Oklab pair and lives at the bottom of this module.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use pixelgraph_core::{HexColor, Interpolation, NormalizeMode, PaletteMethod};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

/// Largest edge of generated preview thumbnails
const THUMBNAIL_EDGE: u32 = 160;

/// Edge length of one palette swatch
const SWATCH_EDGE: u32 = 32;

/// Upper bound on any produced image edge
const MAX_EDGE: u32 = 8192;

pub type TransformResult<T> = std::result::Result<T, TransformError>;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// The transform surface the generation dispatch calls
pub trait ImageTransforms: Send + Sync {
    fn blur(&self, png: &[u8], radius: u32) -> TransformResult<Vec<u8>>;

    fn crop(&self, png: &[u8], left: u32, right: u32, top: u32, bottom: u32)
        -> TransformResult<Vec<u8>>;

    fn resize(
        &self,
        png: &[u8],
        width: Option<u32>,
        height: Option<u32>,
        interpolation: Interpolation,
    ) -> TransformResult<Vec<u8>>;

    fn resize_to_match(
        &self,
        png: &[u8],
        size_match: &[u8],
        interpolation: Interpolation,
    ) -> TransformResult<Vec<u8>>;

    fn pixel_inflate(
        &self,
        png: &[u8],
        width: u32,
        line_width: u32,
        line_color: HexColor,
    ) -> TransformResult<Vec<u8>>;

    fn extract_palette(
        &self,
        png: &[u8],
        num_colors: u32,
        method: PaletteMethod,
    ) -> TransformResult<Vec<u8>>;

    fn apply_palette(
        &self,
        source: &[u8],
        palette: &[u8],
        normalize: Option<NormalizeMode>,
    ) -> TransformResult<Vec<u8>>;

    fn render_palette(&self, colors: &[HexColor]) -> TransformResult<Vec<u8>>;

    /// Distinct colors of a palette image, in first-seen order
    fn palette_colors(&self, palette_png: &[u8]) -> TransformResult<Vec<HexColor>>;

    /// Normalize arbitrary input bytes into PNG
    fn reencode(&self, png: &[u8]) -> TransformResult<Vec<u8>>;

    fn thumbnail(&self, png: &[u8]) -> TransformResult<Vec<u8>>;
}

/// `image`-crate implementation
#[derive(Default)]
pub struct PngTransforms;

impl PngTransforms {
    pub fn new() -> Self {
        Self
    }
}

fn decode(png: &[u8]) -> TransformResult<DynamicImage> {
    image::load_from_memory(png).map_err(|err| TransformError::Decode(err.to_string()))
}

fn encode(image: &DynamicImage) -> TransformResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| TransformError::Encode(err.to_string()))?;
    Ok(out.into_inner())
}

fn filter_for(interpolation: Interpolation) -> FilterType {
    // Closest kernels the codec offers.
    match interpolation {
        Interpolation::NearestNeighbor => FilterType::Nearest,
        Interpolation::Bilinear => FilterType::Triangle,
        Interpolation::Bicubic => FilterType::CatmullRom,
        Interpolation::MitchellNetravali => FilterType::CatmullRom,
        Interpolation::Lanczos2 => FilterType::Lanczos3,
        Interpolation::Lanczos3 => FilterType::Lanczos3,
    }
}

impl ImageTransforms for PngTransforms {
    fn blur(&self, png: &[u8], radius: u32) -> TransformResult<Vec<u8>> {
        let image = decode(png)?;
        if radius == 0 {
            return encode(&image);
        }
        encode(&image.blur(radius as f32))
    }

    fn crop(
        &self,
        png: &[u8],
        left: u32,
        right: u32,
        top: u32,
        bottom: u32,
    ) -> TransformResult<Vec<u8>> {
        let image = decode(png)?;
        let (width, height) = image.dimensions();
        let new_width = width
            .checked_sub(left.saturating_add(right))
            .filter(|w| *w > 0)
            .ok_or_else(|| {
                TransformError::InvalidParams(format!(
                    "crop insets {left}+{right} consume the whole width {width}"
                ))
            })?;
        let new_height = height
            .checked_sub(top.saturating_add(bottom))
            .filter(|h| *h > 0)
            .ok_or_else(|| {
                TransformError::InvalidParams(format!(
                    "crop insets {top}+{bottom} consume the whole height {height}"
                ))
            })?;
        encode(&image.crop_imm(left, top, new_width, new_height))
    }

    fn resize(
        &self,
        png: &[u8],
        width: Option<u32>,
        height: Option<u32>,
        interpolation: Interpolation,
    ) -> TransformResult<Vec<u8>> {
        if width == Some(0) || height == Some(0) {
            return Err(TransformError::InvalidParams(
                "resize dimensions must be positive".to_string(),
            ));
        }
        let image = decode(png)?;
        let (orig_width, orig_height) = image.dimensions();
        let (target_width, target_height) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            // One dimension given: the other follows the aspect ratio.
            (Some(w), None) => {
                let h = ((orig_height as u64 * w as u64) / orig_width.max(1) as u64) as u32;
                (w, h.max(1))
            }
            (None, Some(h)) => {
                let w = ((orig_width as u64 * h as u64) / orig_height.max(1) as u64) as u32;
                (w.max(1), h)
            }
            (None, None) => return encode(&image),
        };
        if target_width > MAX_EDGE || target_height > MAX_EDGE {
            return Err(TransformError::InvalidParams(format!(
                "resize target {target_width}x{target_height} exceeds {MAX_EDGE}"
            )));
        }
        encode(&image.resize_exact(target_width, target_height, filter_for(interpolation)))
    }

    fn resize_to_match(
        &self,
        png: &[u8],
        size_match: &[u8],
        interpolation: Interpolation,
    ) -> TransformResult<Vec<u8>> {
        let (width, height) = decode(size_match)?.dimensions();
        self.resize(png, Some(width), Some(height), interpolation)
    }

    fn pixel_inflate(
        &self,
        png: &[u8],
        width: u32,
        line_width: u32,
        line_color: HexColor,
    ) -> TransformResult<Vec<u8>> {
        if width == 0 {
            return Err(TransformError::InvalidParams(
                "pixel width must be positive".to_string(),
            ));
        }
        let source = decode(png)?.to_rgba8();
        let (src_width, src_height) = source.dimensions();
        let cell = width + line_width;
        let out_width = src_width * cell + line_width;
        let out_height = src_height * cell + line_width;
        if out_width > MAX_EDGE || out_height > MAX_EDGE {
            return Err(TransformError::InvalidParams(format!(
                "inflated size {out_width}x{out_height} exceeds {MAX_EDGE}"
            )));
        }

        let [r, g, b] = line_color.channels();
        let mut out = RgbaImage::from_pixel(out_width, out_height, Rgba([r, g, b, 255]));
        for (x, y, pixel) in source.enumerate_pixels() {
            let base_x = line_width + x * cell;
            let base_y = line_width + y * cell;
            for dy in 0..width {
                for dx in 0..width {
                    out.put_pixel(base_x + dx, base_y + dy, *pixel);
                }
            }
        }
        encode(&DynamicImage::ImageRgba8(out))
    }

    fn extract_palette(
        &self,
        png: &[u8],
        num_colors: u32,
        method: PaletteMethod,
    ) -> TransformResult<Vec<u8>> {
        if num_colors == 0 {
            return Err(TransformError::InvalidParams(
                "palette needs at least one color".to_string(),
            ));
        }
        let source = decode(png)?.to_rgba8();
        let opaque: Vec<[u8; 3]> = source
            .pixels()
            .filter(|p| p.0[3] >= 128)
            .map(|p| [p.0[0], p.0[1], p.0[2]])
            .collect();
        if opaque.is_empty() {
            return Err(TransformError::InvalidParams(
                "image has no opaque pixels to sample".to_string(),
            ));
        }
        let colors = match method {
            PaletteMethod::OklabClusters => oklab_clusters(&opaque, num_colors as usize),
            PaletteMethod::DominantFrequency => dominant_colors(&opaque, num_colors as usize),
        };
        self.render_palette(&colors)
    }

    fn apply_palette(
        &self,
        source: &[u8],
        palette: &[u8],
        normalize: Option<NormalizeMode>,
    ) -> TransformResult<Vec<u8>> {
        let palette_colors = self.palette_colors(palette)?;
        if palette_colors.is_empty() {
            return Err(TransformError::InvalidParams(
                "palette image has no colors".to_string(),
            ));
        }
        let palette_lab: Vec<[f32; 3]> = palette_colors
            .iter()
            .map(|c| srgb_to_oklab(c.r, c.g, c.b))
            .collect();

        let mut image = decode(source)?.to_rgba8();
        for pixel in image.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let lab = srgb_to_oklab(r, g, b);
            let mut nearest = 0;
            let mut nearest_distance = f32::MAX;
            for (index, candidate) in palette_lab.iter().enumerate() {
                let distance = (lab[0] - candidate[0]).powi(2)
                    + (lab[1] - candidate[1]).powi(2)
                    + (lab[2] - candidate[2]).powi(2);
                if distance < nearest_distance {
                    nearest_distance = distance;
                    nearest = index;
                }
            }
            let chosen = palette_lab[nearest];
            let mapped = match normalize {
                // Keep the source pixel's lightness, take the palette hue.
                Some(NormalizeMode::Lightness) => oklab_to_srgb(lab[0], chosen[1], chosen[2]),
                None => oklab_to_srgb(chosen[0], chosen[1], chosen[2]),
            };
            pixel.0 = [mapped[0], mapped[1], mapped[2], a];
        }
        encode(&DynamicImage::ImageRgba8(image))
    }

    fn render_palette(&self, colors: &[HexColor]) -> TransformResult<Vec<u8>> {
        if colors.is_empty() {
            return Err(TransformError::InvalidParams(
                "palette has no enabled colors".to_string(),
            ));
        }
        let width = SWATCH_EDGE * colors.len() as u32;
        let mut out = RgbaImage::new(width, SWATCH_EDGE);
        for (index, color) in colors.iter().enumerate() {
            let [r, g, b] = color.channels();
            let base_x = index as u32 * SWATCH_EDGE;
            for y in 0..SWATCH_EDGE {
                for x in 0..SWATCH_EDGE {
                    out.put_pixel(base_x + x, y, Rgba([r, g, b, 255]));
                }
            }
        }
        encode(&DynamicImage::ImageRgba8(out))
    }

    fn palette_colors(&self, palette_png: &[u8]) -> TransformResult<Vec<HexColor>> {
        let image = decode(palette_png)?.to_rgba8();
        let mut seen = Vec::new();
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            if a < 128 {
                continue;
            }
            let color = HexColor::rgb(r, g, b);
            if !seen.contains(&color) {
                seen.push(color);
                if seen.len() >= 256 {
                    break;
                }
            }
        }
        Ok(seen)
    }

    fn reencode(&self, png: &[u8]) -> TransformResult<Vec<u8>> {
        encode(&decode(png)?)
    }

    fn thumbnail(&self, png: &[u8]) -> TransformResult<Vec<u8>> {
        let image = decode(png)?;
        encode(&image.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE))
    }
}

/// Most frequent colors after 4-bit-per-channel quantization
fn dominant_colors(pixels: &[[u8; 3]], count: usize) -> Vec<HexColor> {
    let mut buckets: HashMap<(u8, u8, u8), (u64, [u64; 3])> = HashMap::new();
    for [r, g, b] in pixels {
        let key = (r >> 4, g >> 4, b >> 4);
        let entry = buckets.entry(key).or_insert((0, [0, 0, 0]));
        entry.0 += 1;
        entry.1[0] += *r as u64;
        entry.1[1] += *g as u64;
        entry.1[2] += *b as u64;
    }
    let mut ranked: Vec<(u64, [u64; 3])> = buckets.into_values().collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked
        .into_iter()
        .take(count)
        .map(|(n, [r, g, b])| HexColor::rgb((r / n) as u8, (g / n) as u8, (b / n) as u8))
        .collect()
}

/// k-means in Oklab; centers start from a random pixel sample
fn oklab_clusters(pixels: &[[u8; 3]], k: usize) -> Vec<HexColor> {
    let samples: Vec<[f32; 3]> = pixels
        .iter()
        .map(|[r, g, b]| srgb_to_oklab(*r, *g, *b))
        .collect();
    let k = k.min(samples.len());
    let mut rng = rand::thread_rng();
    let mut centers: Vec<[f32; 3]> = samples.choose_multiple(&mut rng, k).copied().collect();

    let mut assignments = vec![0usize; samples.len()];
    for _ in 0..12 {
        for (pixel_index, sample) in samples.iter().enumerate() {
            let mut nearest = 0;
            let mut nearest_distance = f32::MAX;
            for (center_index, center) in centers.iter().enumerate() {
                let distance = (sample[0] - center[0]).powi(2)
                    + (sample[1] - center[1]).powi(2)
                    + (sample[2] - center[2]).powi(2);
                if distance < nearest_distance {
                    nearest_distance = distance;
                    nearest = center_index;
                }
            }
            assignments[pixel_index] = nearest;
        }
        let mut sums = vec![[0f64; 3]; centers.len()];
        let mut counts = vec![0u64; centers.len()];
        for (sample, center_index) in samples.iter().zip(&assignments) {
            counts[*center_index] += 1;
            sums[*center_index][0] += sample[0] as f64;
            sums[*center_index][1] += sample[1] as f64;
            sums[*center_index][2] += sample[2] as f64;
        }
        for (center_index, center) in centers.iter_mut().enumerate() {
            if counts[center_index] > 0 {
                let n = counts[center_index] as f64;
                *center = [
                    (sums[center_index][0] / n) as f32,
                    (sums[center_index][1] / n) as f32,
                    (sums[center_index][2] / n) as f32,
                ];
            }
        }
    }

    centers
        .into_iter()
        .map(|[l, a, b]| {
            let [r, g, bl] = oklab_to_srgb(l, a, b);
            HexColor::rgb(r, g, bl)
        })
        .collect()
}

fn srgb_channel_to_linear(channel: u8) -> f32 {
    let c = channel as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_channel_to_srgb(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let s = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (s * 255.0).round().clamp(0.0, 255.0) as u8
}

fn srgb_to_oklab(r: u8, g: u8, b: u8) -> [f32; 3] {
    let lr = srgb_channel_to_linear(r);
    let lg = srgb_channel_to_linear(g);
    let lb = srgb_channel_to_linear(b);

    let l = 0.412_221_47 * lr + 0.536_332_54 * lg + 0.051_445_995 * lb;
    let m = 0.211_903_5 * lr + 0.680_699_55 * lg + 0.107_396_96 * lb;
    let s = 0.088_302_46 * lr + 0.281_718_84 * lg + 0.629_978_7 * lb;

    let l_ = l.cbrt();
    let m_ = m.cbrt();
    let s_ = s.cbrt();

    [
        0.210_454_26 * l_ + 0.793_617_8 * m_ - 0.004_072_047 * s_,
        1.977_998_5 * l_ - 2.428_592_2 * m_ + 0.450_593_7 * s_,
        0.025_904_037 * l_ + 0.782_771_77 * m_ - 0.808_675_77 * s_,
    ]
}

fn oklab_to_srgb(l: f32, a: f32, b: f32) -> [u8; 3] {
    let l_ = l + 0.396_337_78 * a + 0.215_803_76 * b;
    let m_ = l - 0.105_561_346 * a - 0.063_854_17 * b;
    let s_ = l - 0.089_484_18 * a - 1.291_485_5 * b;

    let lc = l_ * l_ * l_;
    let mc = m_ * m_ * m_;
    let sc = s_ * s_ * s_;

    let lr = 4.076_741_7 * lc - 3.307_711_6 * mc + 0.230_969_94 * sc;
    let lg = -1.268_438 * lc + 2.609_757_4 * mc - 0.341_319_38 * sc;
    let lb = -0.004_196_086 * lc - 0.703_418_6 * mc + 1.707_614_7 * sc;

    [
        linear_channel_to_srgb(lr),
        linear_channel_to_srgb(lg),
        linear_channel_to_srgb(lb),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        encode(&DynamicImage::ImageRgba8(image)).unwrap()
    }

    fn dimensions(png: &[u8]) -> (u32, u32) {
        decode(png).unwrap().dimensions()
    }

    #[test]
    fn test_crop_insets() {
        let transforms = PngTransforms::new();
        let source = solid(8, 6, [10, 20, 30, 255]);
        let cropped = transforms.crop(&source, 1, 2, 1, 1).unwrap();
        assert_eq!(dimensions(&cropped), (5, 4));

        assert!(matches!(
            transforms.crop(&source, 4, 4, 0, 0),
            Err(TransformError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_resize_rules() {
        let transforms = PngTransforms::new();
        let source = solid(8, 4, [0, 0, 0, 255]);

        let exact = transforms
            .resize(&source, Some(16), Some(16), Interpolation::NearestNeighbor)
            .unwrap();
        assert_eq!(dimensions(&exact), (16, 16));

        // One dimension given: aspect preserved.
        let scaled = transforms
            .resize(&source, Some(16), None, Interpolation::Bilinear)
            .unwrap();
        assert_eq!(dimensions(&scaled), (16, 8));

        let passthrough = transforms
            .resize(&source, None, None, Interpolation::Lanczos3)
            .unwrap();
        assert_eq!(dimensions(&passthrough), (8, 4));

        assert!(matches!(
            transforms.resize(&source, Some(0), None, Interpolation::Bilinear),
            Err(TransformError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_resize_to_match_uses_reference_dimensions() {
        let transforms = PngTransforms::new();
        let source = solid(8, 8, [1, 2, 3, 255]);
        let reference = solid(3, 5, [0, 0, 0, 255]);
        let resized = transforms
            .resize_to_match(&source, &reference, Interpolation::NearestNeighbor)
            .unwrap();
        assert_eq!(dimensions(&resized), (3, 5));
    }

    #[test]
    fn test_pixel_inflate_geometry() {
        let transforms = PngTransforms::new();
        let source = solid(2, 3, [200, 0, 0, 255]);
        let inflated = transforms
            .pixel_inflate(&source, 4, 1, HexColor::rgb(0, 0, 0))
            .unwrap();
        // 2*(4+1)+1 x 3*(4+1)+1
        assert_eq!(dimensions(&inflated), (11, 16));

        let image = decode(&inflated).unwrap().to_rgba8();
        // Grid line at the border, cell content inside.
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(1, 1).0, [200, 0, 0, 255]);
    }

    #[test]
    fn test_palette_render_and_read_back() {
        let transforms = PngTransforms::new();
        let colors = vec![HexColor::rgb(255, 0, 0), HexColor::rgb(0, 0, 255)];
        let palette = transforms.render_palette(&colors).unwrap();
        assert_eq!(dimensions(&palette), (64, 32));
        assert_eq!(transforms.palette_colors(&palette).unwrap(), colors);

        assert!(matches!(
            transforms.render_palette(&[]),
            Err(TransformError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_dominant_frequency_extraction() {
        let transforms = PngTransforms::new();
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([250, 10, 10, 255]));
        image.put_pixel(0, 0, Rgba([10, 10, 250, 255]));
        let source = encode(&DynamicImage::ImageRgba8(image)).unwrap();

        let palette = transforms
            .extract_palette(&source, 2, PaletteMethod::DominantFrequency)
            .unwrap();
        let colors = transforms.palette_colors(&palette).unwrap();
        assert_eq!(colors.len(), 2);
        // The dominant red bucket comes first.
        assert!(colors[0].r > 200 && colors[0].b < 50);
        assert!(colors[1].b > 200 && colors[1].r < 50);
    }

    #[test]
    fn test_oklab_clusters_on_two_tone_image() {
        let transforms = PngTransforms::new();
        let mut image = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        for x in 0..4 {
            image.put_pixel(x, 1, Rgba([0, 0, 0, 255]));
        }
        let source = encode(&DynamicImage::ImageRgba8(image)).unwrap();

        let palette = transforms
            .extract_palette(&source, 2, PaletteMethod::OklabClusters)
            .unwrap();
        let mut colors = transforms.palette_colors(&palette).unwrap();
        colors.sort_by_key(|c| c.r);
        assert_eq!(colors.len(), 2);
        assert!(colors[0].r < 30, "one cluster should settle near black");
        assert!(colors[1].r > 225, "one cluster should settle near white");
    }

    #[test]
    fn test_apply_palette_snaps_to_nearest() {
        let transforms = PngTransforms::new();
        let palette = transforms
            .render_palette(&[HexColor::rgb(255, 0, 0), HexColor::rgb(0, 0, 255)])
            .unwrap();
        let source = solid(2, 2, [200, 40, 40, 255]);

        let mapped = transforms.apply_palette(&source, &palette, None).unwrap();
        let image = decode(&mapped).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_oklab_round_trip_is_close() {
        for color in [[0u8, 0, 0], [255, 255, 255], [255, 0, 0], [17, 120, 200]] {
            let [l, a, b] = srgb_to_oklab(color[0], color[1], color[2]);
            let back = oklab_to_srgb(l, a, b);
            for channel in 0..3 {
                let delta = (color[channel] as i16 - back[channel] as i16).abs();
                assert!(delta <= 2, "channel drifted: {color:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_blur_and_thumbnail_keep_decodable_output() {
        let transforms = PngTransforms::new();
        let source = solid(320, 200, [90, 120, 30, 255]);
        let blurred = transforms.blur(&source, 2).unwrap();
        assert_eq!(dimensions(&blurred), (320, 200));

        let thumb = transforms.thumbnail(&source).unwrap();
        let (width, height) = dimensions(&thumb);
        assert!(width <= THUMBNAIL_EDGE && height <= THUMBNAIL_EDGE);

        assert!(matches!(
            transforms.reencode(b"not a png"),
            Err(TransformError::Decode(_))
        ));
    }
}
