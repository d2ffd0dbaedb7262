use billscan_core::{ErrorClass, ErrorKind};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Image has no pixels ({0}x{1})")]
    EmptyImage(u32, u32),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

impl ErrorClass for PreprocessError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::PreprocessError
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Longest side after down-scaling (OCR engines do best around 300 DPI).
    pub max_dimension: u32,
    pub denoise: bool,
    pub binarize: bool,
    pub deskew: bool,
    /// Largest skew angle searched, in degrees.
    pub max_skew_degrees: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2800,
            denoise: true,
            binarize: true,
            deskew: true,
            max_skew_degrees: 10.0,
        }
    }
}

/// Skew below this is left alone.
const MIN_SKEW_DEGREES: f32 = 0.5;
const SKEW_STEP_DEGREES: f32 = 0.25;
/// Deskew estimation runs on a copy no larger than this.
const SKEW_SAMPLE_DIMENSION: u32 = 1000;
/// Fewer dark pixels than this and there is no text to align.
const MIN_INK_PIXELS: usize = 100;

/// Grayscale → contrast stretch → denoise → binarize → deskew.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn clean(&self, img: &DynamicImage) -> Result<DynamicImage, PreprocessError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(PreprocessError::EmptyImage(img.width(), img.height()));
        }

        let max = self.config.max_dimension;
        let mut gray = if img.width() > max || img.height() > max {
            img.resize(max, max, image::imageops::FilterType::Lanczos3).to_luma8()
        } else {
            img.to_luma8()
        };

        gray = stretch_contrast(gray);
        if self.config.denoise {
            gray = median_filter(&gray, 1, 1);
        }
        if self.config.binarize {
            gray = binarize(&gray);
        }
        if self.config.deskew {
            let angle = estimate_skew(&gray, self.config.max_skew_degrees);
            if angle.abs() >= MIN_SKEW_DEGREES {
                debug!(angle, "Correcting skew");
                gray = rotate_about_center(
                    &gray,
                    angle.to_radians(),
                    Interpolation::Nearest,
                    Luma([255u8]),
                );
            }
        }

        Ok(DynamicImage::ImageLuma8(gray))
    }
}

/// Encode an image as PNG bytes for an OCR backend.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

fn stretch_contrast(gray: GrayImage) -> GrayImage {
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px == min_px {
        return gray;
    }

    let range = (max_px - min_px) as u32;
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        Luma([((p - min_px) as u32 * 255 / range) as u8])
    })
}

fn binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Angle in degrees that, passed to `rotate_about_center`, makes text rows
/// horizontal. Chosen by maximising the sharpness of the row projection
/// profile of dark pixels.
fn estimate_skew(gray: &GrayImage, max_degrees: f32) -> f32 {
    let sample = if gray.width() > SKEW_SAMPLE_DIMENSION || gray.height() > SKEW_SAMPLE_DIMENSION {
        DynamicImage::ImageLuma8(gray.clone())
            .resize(
                SKEW_SAMPLE_DIMENSION,
                SKEW_SAMPLE_DIMENSION,
                image::imageops::FilterType::Nearest,
            )
            .to_luma8()
    } else {
        gray.clone()
    };

    let cx = sample.width() as f32 / 2.0;
    let cy = sample.height() as f32 / 2.0;
    let ink: Vec<(f32, f32)> = sample
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] < 128)
        .map(|(x, y, _)| (x as f32 - cx, y as f32 - cy))
        .collect();

    if ink.len() < MIN_INK_PIXELS || max_degrees <= 0.0 {
        return 0.0;
    }

    let rows = (sample.width() + sample.height()) as usize * 2;
    let offset = rows as f32 / 2.0;
    let steps = (max_degrees / SKEW_STEP_DEGREES).round() as i32;

    let score = |degrees: f32| -> f64 {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let mut histogram = vec![0u32; rows];
        for &(x, y) in &ink {
            // Row this pixel lands on after rotate_about_center(degrees).
            let row = (x * sin + y * cos + offset) as usize;
            if let Some(bin) = histogram.get_mut(row) {
                *bin += 1;
            }
        }
        histogram.iter().map(|&c| (c as f64) * (c as f64)).sum()
    };

    let mut best = (0.0f32, score(0.0));
    for step in -steps..=steps {
        let degrees = step as f32 * SKEW_STEP_DEGREES;
        let s = score(degrees);
        if s > best.1 {
            best = (degrees, s);
        }
    }
    best.0
}
