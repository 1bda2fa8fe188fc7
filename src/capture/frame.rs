use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, RgbImage};

use crate::{
    camera::FrameReceiver,
    error::{AppError, Result},
    quality::{self, PhotoQuality},
};

pub const JPEG_QUALITY: u8 = 90;
/// Anything smaller than this is not a real camera frame.
pub const MIN_ENCODED_BYTES: usize = 1000;

const SAMPLE_STRIDE: usize = 16;
const NEAR_BLACK_LUMA: f32 = 10.0;
const NEAR_WHITE_LUMA: f32 = 245.0;
const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub quality: PhotoQuality,
}

/// Wait for a requested frame. A stream that stopped or never produced a
/// frame is reported as a capture failure, not a media error.
pub async fn await_frame(receiver: FrameReceiver) -> Result<RgbImage> {
    match tokio::time::timeout(FRAME_TIMEOUT, receiver).await {
        Ok(Ok(Ok(frame))) => Ok(frame),
        Ok(Ok(Err(err))) => Err(AppError::CaptureValidationFailed(err.to_string())),
        Ok(Err(_)) => Err(AppError::CaptureValidationFailed(
            "camera stream closed before delivering a frame".into(),
        )),
        Err(_) => Err(AppError::CaptureValidationFailed(
            "timed out waiting for a camera frame".into(),
        )),
    }
}

/// Validate and encode a raw frame.
pub fn process_frame(frame: &RgbImage) -> Result<EncodedFrame> {
    check_not_blank(frame)?;

    let jpeg = encode_jpeg(frame)?;
    if jpeg.len() < MIN_ENCODED_BYTES {
        return Err(AppError::CaptureValidationFailed(format!(
            "encoded image is implausibly small ({} bytes)",
            jpeg.len()
        )));
    }

    Ok(EncodedFrame {
        jpeg,
        quality: quality::assess(frame),
    })
}

/// Reject frames that are uniformly near-black or near-white, which is what
/// a stream that is not ready yet hands back.
pub fn check_not_blank(frame: &RgbImage) -> Result<()> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(AppError::CaptureValidationFailed("frame has no pixels".into()));
    }

    let (sum, samples) = frame
        .pixels()
        .step_by(SAMPLE_STRIDE)
        .fold((0.0f32, 0u32), |(sum, n), px| {
            (sum + quality::luma(px[0], px[1], px[2]), n + 1)
        });
    let mean = sum / samples.max(1) as f32;

    if mean < NEAR_BLACK_LUMA {
        return Err(AppError::CaptureValidationFailed(
            "camera frame is black; the stream may not be ready".into(),
        ));
    }
    if mean > NEAR_WHITE_LUMA {
        return Err(AppError::CaptureValidationFailed(
            "camera frame is blank white".into(),
        ));
    }
    Ok(())
}

pub fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| AppError::CaptureValidationFailed(format!("JPEG encoding failed: {e}")))?;
    Ok(buffer)
}

pub fn preview_data_uri(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    /// High-frequency pattern that survives JPEG well above the size floor.
    pub(crate) fn busy_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 37) ^ (y * 91)).wrapping_mul(2654435761) >> 24;
            Rgb([v as u8, (v as u8).wrapping_add(80), 255 - v as u8])
        })
    }

    #[test]
    fn black_frame_is_rejected() {
        let black = RgbImage::from_pixel(160, 120, Rgb([2, 2, 2]));
        let err = process_frame(&black).unwrap_err();
        assert!(matches!(err, AppError::CaptureValidationFailed(msg) if msg.contains("black")));
    }

    #[test]
    fn white_frame_is_rejected() {
        let white = RgbImage::from_pixel(160, 120, Rgb([252, 252, 252]));
        assert!(matches!(
            check_not_blank(&white),
            Err(AppError::CaptureValidationFailed(_))
        ));
    }

    #[test]
    fn tiny_flat_frame_fails_size_floor() {
        let gray = RgbImage::from_pixel(16, 16, Rgb([120, 120, 120]));
        let err = process_frame(&gray).unwrap_err();
        assert!(matches!(err, AppError::CaptureValidationFailed(msg) if msg.contains("small")));
    }

    #[test]
    fn busy_frame_encodes() {
        let encoded = process_frame(&busy_frame(160, 120)).unwrap();
        assert!(encoded.jpeg.len() >= MIN_ENCODED_BYTES);
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(encoded.quality.width, 160);
    }

    #[test]
    fn preview_is_a_jpeg_data_uri() {
        assert!(preview_data_uri(&[0xFF, 0xD8]).starts_with("data:image/jpeg;base64,"));
    }
}
