use std::path::PathBuf;

use tracing::warn;

use crate::assets::decode::image_dimensions;
use crate::foundation::core::Canvas;

/// Crop window in source-image pixels (`f64`, not yet rounded).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    /// Round to whole pixels, clamped so the window is non-empty and inside the image.
    pub fn to_pixels(self, img_w: u32, img_h: u32) -> (u32, u32, u32, u32) {
        let img_w = img_w.max(1);
        let img_h = img_h.max(1);
        let w = (self.width.round() as i64).clamp(1, i64::from(img_w)) as u32;
        let h = (self.height.round() as i64).clamp(1, i64::from(img_h)) as u32;
        let x = (self.x.round() as i64).clamp(0, i64::from(img_w - w)) as u32;
        let y = (self.y.round() as i64).clamp(0, i64::from(img_h - h)) as u32;
        (x, y, w, h)
    }
}

/// Largest window with the target aspect ratio, centered in the image.
///
/// Wider than the target: crop width to `img_h * ratio`, full height. Otherwise crop height to
/// `img_w / ratio`, full width.
pub fn center_crop(img_w: u32, img_h: u32, target: Canvas) -> CropRect {
    let (w, h) = (f64::from(img_w), f64::from(img_h));
    if w <= 0.0 || h <= 0.0 || target.width == 0 || target.height == 0 {
        return CropRect {
            x: 0.0,
            y: 0.0,
            width: w,
            height: h,
        };
    }
    let ratio = target.aspect_ratio();
    if w / h > ratio {
        let cw = h * ratio;
        CropRect {
            x: (w - cw) / 2.0,
            y: 0.0,
            width: cw,
            height: h,
        }
    } else {
        let ch = w / ratio;
        CropRect {
            x: 0.0,
            y: (h - ch) / 2.0,
            width: w,
            height: ch,
        }
    }
}

/// A resolved image with its native dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Measure resolved images, dropping any that cannot be read.
pub fn measure_images(paths: Vec<PathBuf>) -> Vec<PlannedImage> {
    paths
        .into_iter()
        .filter_map(|path| match image_dimensions(&path) {
            Ok((width, height)) => Some(PlannedImage {
                path,
                width,
                height,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "dropping undecodable image");
                None
            }
        })
        .collect()
}

/// One image shown for a contiguous part of a segment.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualSlice {
    pub image: PlannedImage,
    /// Offset from the start of the segment.
    pub start_sec: f64,
    pub duration_sec: f64,
    pub crop: CropRect,
    pub target: Canvas,
}

/// Partition `total_sec` equally across `images`, each cropped to the target aspect ratio.
///
/// Returns an empty plan when there are no images; the caller drops the segment.
pub fn build_plan(images: &[PlannedImage], total_sec: f64, target: Canvas) -> Vec<VisualSlice> {
    if images.is_empty() {
        return Vec::new();
    }
    let total_sec = total_sec.max(0.0);
    let n = images.len();
    let each = total_sec / n as f64;
    images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let start_sec = each * i as f64;
            let duration_sec = if i + 1 == n {
                total_sec - start_sec
            } else {
                each
            };
            VisualSlice {
                image: image.clone(),
                start_sec,
                duration_sec,
                crop: center_crop(image.width, image.height, target),
                target,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTRAIT: Canvas = Canvas {
        width: 1080,
        height: 1920,
    };

    fn img(w: u32, h: u32) -> PlannedImage {
        PlannedImage {
            path: PathBuf::from(format!("{w}x{h}.png")),
            width: w,
            height: h,
        }
    }

    #[test]
    fn wide_image_crops_width_centered() {
        let c = center_crop(3000, 1000, PORTRAIT);
        assert!((c.width - 1000.0 * 0.5625).abs() < 1e-9);
        assert_eq!(c.height, 1000.0);
        assert!((c.x - (3000.0 - c.width) / 2.0).abs() < 1e-9);
        assert_eq!(c.y, 0.0);
    }

    #[test]
    fn square_image_crops_width_for_portrait_target() {
        let c = center_crop(1000, 1000, PORTRAIT);
        assert!((c.width - 562.5).abs() < 1e-9);
        assert!((c.x - 218.75).abs() < 1e-9);
    }

    #[test]
    fn tall_image_crops_height_centered() {
        let c = center_crop(1000, 4000, PORTRAIT);
        assert_eq!(c.width, 1000.0);
        let expected_h = 1000.0 / 0.5625;
        assert!((c.height - expected_h).abs() < 1e-9);
        assert!((c.y - (4000.0 - expected_h) / 2.0).abs() < 1e-9);
        assert_eq!(c.x, 0.0);
    }

    #[test]
    fn extreme_ratios_never_go_negative() {
        for (w, h) in [(1, 10_000), (10_000, 1), (3, 1), (1, 1), (2, 3)] {
            let c = center_crop(w, h, PORTRAIT);
            assert!(c.x >= 0.0 && c.y >= 0.0);
            assert!(c.width > 0.0 && c.height > 0.0);
            assert!(c.width <= f64::from(w) + 1e-9 && c.height <= f64::from(h) + 1e-9);
            let (px, py, pw, ph) = c.to_pixels(w, h);
            assert!(pw >= 1 && ph >= 1);
            assert!(px + pw <= w && py + ph <= h);
        }
    }

    #[test]
    fn slices_partition_duration() {
        let images = vec![img(100, 100), img(200, 100), img(100, 300)];
        let plan = build_plan(&images, 4.5, PORTRAIT);
        assert_eq!(plan.len(), 3);
        let sum: f64 = plan.iter().map(|s| s.duration_sec).sum();
        assert!((sum - 4.5).abs() < 1e-12);
        assert!((plan[1].start_sec - 1.5).abs() < 1e-12);
        assert_eq!(plan[2].image, images[2]);
    }

    #[test]
    fn no_images_no_plan() {
        assert!(build_plan(&[], 3.0, PORTRAIT).is_empty());
    }

    #[test]
    fn unreadable_images_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 255]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"nope").unwrap();
        let measured = measure_images(vec![bad, good.clone()]);
        assert_eq!(
            measured,
            vec![PlannedImage {
                path: good,
                width: 4,
                height: 2
            }]
        );
    }
}
