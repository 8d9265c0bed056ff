//! Image normalization: prepare a recipe photo for OCR.
//!
//! Five steps in a fixed order, each relying on the previous one's output:
//!
//! 1. Decode the bytes (JPEG/PNG) and read the EXIF orientation tag.
//! 2. Reduce to one luminance channel.
//! 3. Stretch contrast so the 1st–99th percentile span covers 0–255.
//! 4. Binarize with a single global Otsu threshold: every pixel becomes 0 or 255.
//! 5. Rotate/flip upright according to the orientation tag, if any.
//!
//! The transform is a pure function of the input bytes: identical bytes give
//! byte-identical PNG output. Decoding and pixel work are CPU-bound, so the
//! async entry point runs on the blocking pool.

use crate::error::LarderError;
use crate::model::{NormalizedImage, RawImage};
use image::metadata::Orientation;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat, ImageReader, Luma};
use std::io::Cursor;
use tracing::debug;

/// Percentage of darkest and brightest pixels clipped by the contrast stretch.
const CLIP_PERCENT: u64 = 1;

/// Normalize `raw` on the blocking thread pool.
pub async fn normalize_image(raw: RawImage) -> Result<NormalizedImage, LarderError> {
    tokio::task::spawn_blocking(move || normalize(&raw))
        .await
        .map_err(|e| LarderError::Internal(format!("Normalize task panicked: {e}")))?
}

/// Decode, greyscale, stretch, binarize and orient `raw`.
pub fn normalize(raw: &RawImage) -> Result<NormalizedImage, LarderError> {
    let (decoded, orientation) = decode(&raw.bytes)?;
    let (w, h) = (decoded.width(), decoded.height());

    let grey = decoded.to_luma8();
    let stretched = stretch_contrast(grey);
    let (binary, level) = binarize(stretched);

    let mut upright = DynamicImage::ImageLuma8(binary);
    upright.apply_orientation(orientation);

    let mut png = Vec::new();
    upright
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| LarderError::Internal(format!("PNG encoding failed: {e}")))?;

    debug!(
        "Normalized {}: {}x{} px, threshold {}, orientation {:?}, {} bytes",
        raw.source,
        w,
        h,
        level,
        orientation,
        png.len()
    );

    Ok(NormalizedImage {
        source: raw.source.clone(),
        png,
        width: upright.width(),
        height: upright.height(),
    })
}

/// Decode the pixel grid and read the orientation tag in one pass.
fn decode(bytes: &[u8]) -> Result<(DynamicImage, Orientation), LarderError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(decode_err)?;
    if reader.format().is_none() {
        return Err(LarderError::Decode {
            detail: "unrecognised image format".to_string(),
        });
    }

    let mut decoder = reader.into_decoder().map_err(decode_err)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let image = DynamicImage::from_decoder(decoder).map_err(decode_err)?;

    Ok((image, orientation))
}

fn decode_err(e: impl std::fmt::Display) -> LarderError {
    LarderError::Decode {
        detail: e.to_string(),
    }
}

fn histogram(img: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[p[0] as usize] += 1;
    }
    hist
}

/// Linear stretch so the clipped intensity range spans 0..=255.
fn stretch_contrast(mut img: GrayImage) -> GrayImage {
    let hist = histogram(&img);
    let total: u64 = hist.iter().sum();
    let cut = total * CLIP_PERCENT / 100;

    let lo = first_above(hist.iter().enumerate(), cut).unwrap_or(0);
    let hi = first_above(hist.iter().enumerate().rev(), cut).unwrap_or(255);
    if hi <= lo {
        return img;
    }

    let span = u32::from(hi - lo);
    for p in img.pixels_mut() {
        let v = u32::from(p[0].clamp(lo, hi) - lo);
        *p = Luma([((v * 255 + span / 2) / span) as u8]);
    }
    img
}

/// First intensity at which the running pixel count exceeds `cut`.
fn first_above<'a>(bins: impl Iterator<Item = (usize, &'a u64)>, cut: u64) -> Option<u8> {
    let mut acc = 0u64;
    for (value, &count) in bins {
        acc += count;
        if acc > cut {
            return Some(value as u8);
        }
    }
    None
}

/// Global Otsu threshold: maximise between-class variance.
fn otsu_level(hist: &[u64; 256]) -> u8 {
    let total: f64 = hist.iter().sum::<u64>() as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut best = 0.0;
    let mut level = 0u8;

    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best {
            best = between;
            level = t as u8;
        }
    }
    level
}

/// Map every pixel to 0 (ink) or 255 (paper).
fn binarize(mut img: GrayImage) -> (GrayImage, u8) {
    let level = otsu_level(&histogram(&img));
    for p in img.pixels_mut() {
        p[0] = if p[0] > level { 255 } else { 0 };
    }
    (img, level)
}
