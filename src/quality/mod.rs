//! Best-effort photo quality heuristics.
//!
//! None of these reject a photo. They travel with the enhanced submission
//! so the server can weigh each pose.

use image::{imageops::FilterType, DynamicImage, GrayImage, RgbImage};
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::Serialize;

/// Consecutive poses whose hashes differ by less than this probably show the
/// same orientation (the user did not turn).
pub const POSE_CHANGE_THRESHOLD: u32 = 8;

const SHARPNESS_SAMPLE_WIDTH: u32 = 320;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhotoQuality {
    /// Mean luma, 0-255.
    pub brightness: f32,
    /// Standard deviation of luma.
    pub contrast: f32,
    /// Variance of the Laplacian on a downscaled luma plane.
    pub sharpness: f32,
    pub phash: String,
    pub width: u32,
    pub height: u32,
}

impl PhotoQuality {
    pub fn exposure_label(&self) -> &'static str {
        match self.brightness {
            b if b < 60.0 => "dark",
            b if b > 200.0 => "bright",
            _ => "ok",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoseChange {
    pub from: String,
    pub to: String,
    pub distance: u32,
    pub changed: bool,
}

pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

pub fn assess(frame: &RgbImage) -> PhotoQuality {
    let (brightness, contrast) = luma_stats(frame);
    let dynamic = DynamicImage::ImageRgb8(frame.clone());
    let sharpness = laplacian_variance(&dynamic);

    PhotoQuality {
        brightness,
        contrast,
        sharpness,
        phash: perceptual_hash(&dynamic),
        width: frame.width(),
        height: frame.height(),
    }
}

pub fn perceptual_hash(image: &DynamicImage) -> String {
    HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher()
        .hash_image(image)
        .to_base64()
}

pub fn hash_distance(lhs: &str, rhs: &str) -> u32 {
    match (
        ImageHash::<Vec<u8>>::from_base64(lhs),
        ImageHash::<Vec<u8>>::from_base64(rhs),
    ) {
        (Ok(a), Ok(b)) => a.dist(&b),
        _ => u32::MAX,
    }
}

/// Compare each captured pose with the next captured one.
pub fn pose_changes<'a, I>(poses: I) -> Vec<PoseChange>
where
    I: IntoIterator<Item = (&'a str, &'a PhotoQuality)>,
{
    let captured: Vec<_> = poses.into_iter().collect();
    captured
        .windows(2)
        .map(|pair| {
            let (from, a) = pair[0];
            let (to, b) = pair[1];
            let distance = hash_distance(&a.phash, &b.phash);
            PoseChange {
                from: from.to_string(),
                to: to.to_string(),
                distance,
                changed: distance >= POSE_CHANGE_THRESHOLD,
            }
        })
        .collect()
}

fn luma_stats(frame: &RgbImage) -> (f32, f32) {
    let count = (frame.width() as u64 * frame.height() as u64).max(1) as f64;
    let (mut sum, mut sum_sq) = (0.0f64, 0.0f64);
    for pixel in frame.pixels() {
        let y = luma(pixel[0], pixel[1], pixel[2]) as f64;
        sum += y;
        sum_sq += y * y;
    }
    let mean = sum / count;
    let variance = (sum_sq / count - mean * mean).max(0.0);
    (mean as f32, variance.sqrt() as f32)
}

fn laplacian_variance(image: &DynamicImage) -> f32 {
    let gray: GrayImage = if image.width() > SHARPNESS_SAMPLE_WIDTH {
        let height = (image.height() as u64 * SHARPNESS_SAMPLE_WIDTH as u64
            / image.width().max(1) as u64)
            .max(1) as u32;
        image
            .resize_exact(SHARPNESS_SAMPLE_WIDTH, height, FilterType::Triangle)
            .to_luma8()
    } else {
        image.to_luma8()
    };

    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f64;
    let mut responses = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            responses.push(lap);
        }
    }

    let n = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / n;
    let variance = responses.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance as f32
}
