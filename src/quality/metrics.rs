use crate::config::QualityConfig;
use image::DynamicImage;
use imageproc::gradients::sobel_gradients;
use serde::{Deserialize, Serialize};

/// Normalized image measurements, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageMetrics {
    pub sharpness: f32,
    pub contrast: f32,
    pub brightness: f32,
    /// Unweighted mean of the three metrics
    pub overall_quality: f32,
}

impl ImageMetrics {
    pub fn measure(image: &DynamicImage, config: &QualityConfig) -> Self {
        let gray = image.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return Self::default();
        }

        let (mean, std_dev) = mean_and_std(gray.pixels().map(|p| f64::from(p.0[0])));

        let gradients = sobel_gradients(&gray);
        let (_, gradient_std) = mean_and_std(gradients.pixels().map(|p| f64::from(p.0[0])));

        let sharpness = normalize(gradient_std.powi(2), config.sharpness_normalizer);
        let contrast = normalize(std_dev, config.contrast_normalizer);

        let target = f64::from(config.brightness_target);
        let brightness = if target > 0.0 {
            (1.0 - (mean - target).abs() / target).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };

        Self {
            sharpness,
            contrast,
            brightness,
            overall_quality: (sharpness + contrast + brightness) / 3.0,
        }
    }
}

fn normalize(value: f64, scale: f32) -> f32 {
    if scale <= 0.0 {
        return 0.0;
    }
    (value / f64::from(scale)).min(1.0) as f32
}

fn mean_and_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (count, sum, sum_sq) = values.fold((0u64, 0.0, 0.0), |(n, s, sq), v| {
        (n + 1, s + v, sq + v * v)
    });
    if count == 0 {
        return (0.0, 0.0);
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn flat(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([value])))
    }

    #[test]
    fn test_flat_image_has_no_sharpness_or_contrast() {
        let metrics = ImageMetrics::measure(&flat(200), &QualityConfig::default());

        assert_eq!(metrics.sharpness, 0.0);
        assert_eq!(metrics.contrast, 0.0);
    }

    #[test]
    fn test_mid_gray_brightness_near_one() {
        let metrics = ImageMetrics::measure(&flat(128), &QualityConfig::default());
        assert!(metrics.brightness > 0.99, "got {}", metrics.brightness);
    }

    #[test]
    fn test_black_image_brightness_zero() {
        let metrics = ImageMetrics::measure(&flat(0), &QualityConfig::default());
        assert_eq!(metrics.brightness, 0.0);
    }

    #[test]
    fn test_checkerboard_is_sharp_and_contrasty() {
        let board = GrayImage::from_fn(64, 64, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });
        let metrics =
            ImageMetrics::measure(&DynamicImage::ImageLuma8(board), &QualityConfig::default());

        assert_eq!(metrics.sharpness, 1.0);
        assert_eq!(metrics.contrast, 1.0);
        assert!(metrics.brightness > 0.99);
    }

    #[test]
    fn test_empty_image() {
        let metrics =
            ImageMetrics::measure(&DynamicImage::new_luma8(0, 0), &QualityConfig::default());
        assert_eq!(metrics, ImageMetrics::default());
    }
}
