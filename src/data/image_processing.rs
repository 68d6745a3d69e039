// ============================================================
// Layer 4 — Image Processing
// ============================================================
// Decodes an encoded image and produces the float tensor data
// fed to the encoder:
//
//   bytes ─decode─▶ RGB f32 [0,1] ─resize 346x346─▶ crop 299x299
//         ─(train: flip + colour distortion)─▶ rescale to [-1,1]
//         ─▶ channel-major Vec<f32> of length 3*H*W
//
// Train mode crops at a random offset; Eval and Inference take
// the central crop. Colour distortion order depends on the
// preprocessing thread id so neighbouring workers see different
// augmentations:
//   ordering 0: brightness → saturation → hue → contrast
//   ordering 1: brightness → contrast → saturation → hue
//
// Reference: Szegedy et al. (2016) Rethinking the Inception
//            Architecture (input preprocessing)

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb32FImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::mode::Mode;
use crate::error::CaptionError;

pub const DEFAULT_RESIZE: u32 = 346;

const MAX_BRIGHTNESS_DELTA: f32 = 32.0 / 255.0;
const MAX_HUE_DELTA:        f32 = 0.032;
const SATURATION_RANGE:     (f32, f32) = (0.5, 1.5);
const CONTRAST_RANGE:       (f32, f32) = (0.5, 1.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatKind {
    Jpeg,
    Png,
}

impl ImageFormatKind {
    fn as_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormatKind::Jpeg => image::ImageFormat::Jpeg,
            ImageFormatKind::Png  => image::ImageFormat::Png,
        }
    }

    /// Decode bytes with this format's decoder only; other formats fail.
    pub fn decode(self, encoded: &[u8]) -> Result<DynamicImage, CaptionError> {
        Ok(image::load_from_memory_with_format(encoded, self.as_image_format())?)
    }
}

impl FromStr for ImageFormatKind {
    type Err = CaptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormatKind::Jpeg),
            "png"          => Ok(ImageFormatKind::Png),
            other          => Err(CaptionError::InvalidImageFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for ImageFormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormatKind::Jpeg => write!(f, "jpeg"),
            ImageFormatKind::Png  => write!(f, "png"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageProcessor {
    height:        u32,
    width:         u32,
    resize_height: u32,
    resize_width:  u32,
    format:        ImageFormatKind,
}

impl ImageProcessor {
    pub fn new(height: u32, width: u32, format: ImageFormatKind) -> Self {
        Self::with_resize(height, width, DEFAULT_RESIZE, DEFAULT_RESIZE, format)
    }

    /// The resize target never drops below the crop size.
    pub fn with_resize(
        height:        u32,
        width:         u32,
        resize_height: u32,
        resize_width:  u32,
        format:        ImageFormatKind,
    ) -> Self {
        Self {
            height,
            width,
            resize_height: resize_height.max(height),
            resize_width:  resize_width.max(width),
            format,
        }
    }

    pub fn height(&self) -> usize { self.height as usize }
    pub fn width(&self)  -> usize { self.width as usize }

    /// Number of floats produced per image (3 * H * W)
    pub fn output_len(&self) -> usize {
        3 * self.height() * self.width()
    }

    /// Decode bytes in the configured format into RGB floats in [0, 1].
    pub fn decode(&self, encoded: &[u8]) -> Result<Rgb32FImage, CaptionError> {
        Ok(self.format.decode(encoded)?.to_rgb32f())
    }

    /// Full preprocessing for one image.
    pub fn process<R: Rng + ?Sized>(
        &self,
        encoded:   &[u8],
        mode:      Mode,
        thread_id: usize,
        rng:       &mut R,
    ) -> Result<Vec<f32>, CaptionError> {
        let image = self.decode(encoded)?;

        let resized = imageops::resize(
            &image, self.resize_width, self.resize_height, FilterType::Triangle,
        );

        // ── Crop ──────────────────────────────────────────────────────────────
        let max_x = self.resize_width  - self.width;
        let max_y = self.resize_height - self.height;
        let (x, y) = if mode.is_training() {
            (rng.gen_range(0..=max_x), rng.gen_range(0..=max_y))
        } else {
            (max_x / 2, max_y / 2)
        };
        let mut cropped = imageops::crop_imm(&resized, x, y, self.width, self.height).to_image();

        // ── Augment ───────────────────────────────────────────────────────────
        if mode.is_training() && rng.gen_bool(0.5) {
            cropped = imageops::flip_horizontal(&cropped);
        }
        let mut pixels = cropped.into_raw();
        if mode.is_training() {
            distort_colors(&mut pixels, thread_id, rng);
        }

        Ok(to_chw_scaled(&pixels, self.height(), self.width()))
    }
}

/// HWC [0,1] → CHW [-1,1]
fn to_chw_scaled(hwc: &[f32], height: usize, width: usize) -> Vec<f32> {
    let plane = height * width;
    let mut chw = vec![0.0f32; 3 * plane];
    for (i, px) in hwc.chunks_exact(3).enumerate() {
        for c in 0..3 {
            chw[c * plane + i] = (px[c] - 0.5) * 2.0;
        }
    }
    chw
}

// ─── Colour Distortion ────────────────────────────────────────────────────────
fn distort_colors<R: Rng + ?Sized>(pixels: &mut [f32], thread_id: usize, rng: &mut R) {
    let brightness = rng.gen_range(-MAX_BRIGHTNESS_DELTA..=MAX_BRIGHTNESS_DELTA);
    let saturation = rng.gen_range(SATURATION_RANGE.0..=SATURATION_RANGE.1);
    let hue        = rng.gen_range(-MAX_HUE_DELTA..=MAX_HUE_DELTA);
    let contrast   = rng.gen_range(CONTRAST_RANGE.0..=CONTRAST_RANGE.1);

    adjust_brightness(pixels, brightness);
    if thread_id % 2 == 0 {
        adjust_saturation(pixels, saturation);
        adjust_hue(pixels, hue);
        adjust_contrast(pixels, contrast);
    } else {
        adjust_contrast(pixels, contrast);
        adjust_saturation(pixels, saturation);
        adjust_hue(pixels, hue);
    }

    for v in pixels.iter_mut() {
        *v = v.clamp(0.0, 1.0);
    }
}

fn adjust_brightness(pixels: &mut [f32], delta: f32) {
    for v in pixels.iter_mut() {
        *v += delta;
    }
}

/// Scale each channel's distance from its mean
fn adjust_contrast(pixels: &mut [f32], factor: f32) {
    let n = (pixels.len() / 3).max(1) as f32;
    let mut mean = [0.0f32; 3];
    for px in pixels.chunks_exact(3) {
        for c in 0..3 {
            mean[c] += px[c];
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }
    for px in pixels.chunks_exact_mut(3) {
        for c in 0..3 {
            px[c] = (px[c] - mean[c]) * factor + mean[c];
        }
    }
}

fn adjust_saturation(pixels: &mut [f32], factor: f32) {
    for px in pixels.chunks_exact_mut(3) {
        let (h, s, v) = rgb_to_hsv(px[0], px[1], px[2]);
        let (r, g, b) = hsv_to_rgb(h, (s * factor).clamp(0.0, 1.0), v);
        px.copy_from_slice(&[r, g, b]);
    }
}

fn adjust_hue(pixels: &mut [f32], delta: f32) {
    for px in pixels.chunks_exact_mut(3) {
        let (h, s, v) = rgb_to_hsv(px[0], px[1], px[2]);
        let (r, g, b) = hsv_to_rgb((h + delta).rem_euclid(1.0), s, v);
        px.copy_from_slice(&[r, g, b]);
    }
}

/// Hue in [0, 1)
fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max   = r.max(g).max(b);
    let min   = r.min(g).min(b);
    let delta = max - min;

    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h6 = (h * 6.0).rem_euclid(6.0);
    let c  = v * s;
    let x  = c * (1.0 - (h6.rem_euclid(2.0) - 1.0).abs());
    let m  = v - c;
    let (r, g, b) = match h6 as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    (r + m, g + m, b + m)
}
