//! Overlay images for planar compositing.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};

#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    #[error("failed to load overlay image {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("overlay image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// Immutable RGB overlay.
///
/// Images with an alpha channel are premultiplied on load
/// (`c' = floor(c * a / 255)`), so fully transparent pixels become black.
#[derive(Clone, Debug)]
pub struct OverlayAsset {
    image: RgbImage,
}

impl OverlayAsset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| AssetError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let asset = Self::from_dynamic(img)?;
        log::info!(
            "loaded overlay {} ({}x{})",
            path.display(),
            asset.width(),
            asset.height()
        );
        Ok(asset)
    }

    pub fn from_dynamic(img: DynamicImage) -> Result<Self, AssetError> {
        if !img.color().has_alpha() {
            return Self::from_rgb(img.to_rgb8());
        }

        let rgba = img.to_rgba8();
        let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let [r, g, b, a] = rgba.get_pixel(x, y).0;
            let premul = |c: u8| ((c as u16 * a as u16) / 255) as u8;
            image::Rgb([premul(r), premul(g), premul(b)])
        });
        Self::from_rgb(rgb)
    }

    pub fn from_rgb(image: RgbImage) -> Result<Self, AssetError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AssetError::Empty {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self { image })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Bilinear sample at `(x, y)` with pixel centers at integer
    /// coordinates; coordinates are clamped to the image.
    pub fn sample(&self, x: f64, y: f64) -> [u8; 3] {
        let max_x = (self.image.width() - 1) as f64;
        let max_y = (self.image.height() - 1) as f64;
        let x = if x.is_finite() { x.clamp(0.0, max_x) } else { 0.0 };
        let y = if y.is_finite() { y.clamp(0.0, max_y) } else { 0.0 };

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.image.width() - 1);
        let y1 = (y0 + 1).min(self.image.height() - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let p00 = self.image.get_pixel(x0, y0).0;
        let p10 = self.image.get_pixel(x1, y0).0;
        let p01 = self.image.get_pixel(x0, y1).0;
        let p11 = self.image.get_pixel(x1, y1).0;

        std::array::from_fn(|c| {
            let top = p00[c] as f64 + fx * (p10[c] as f64 - p00[c] as f64);
            let bottom = p01[c] as f64 + fx * (p11[c] as f64 - p01[c] as f64);
            (top + fy * (bottom - top)).round().clamp(0.0, 255.0) as u8
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    #[test]
    fn alpha_is_premultiplied_with_floor() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([200, 100, 255, 128]));
        rgba.put_pixel(1, 0, Rgba([255, 255, 255, 0]));
        let asset = OverlayAsset::from_dynamic(DynamicImage::ImageRgba8(rgba)).expect("asset");

        // 200 * 128 / 255 = 100.39, 100 * 128 / 255 = 50.19, 255 * 128 / 255 = 128
        assert_eq!(asset.image().get_pixel(0, 0), &Rgb([100, 50, 128]));
        assert_eq!(asset.image().get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn empty_images_are_rejected() {
        let err = OverlayAsset::from_rgb(RgbImage::new(0, 5)).unwrap_err();
        assert!(matches!(err, AssetError::Empty { width: 0, height: 5 }));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = OverlayAsset::load("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, AssetError::Load { .. }));
    }

    #[test]
    fn sampling_clamps_to_edges() {
        let img = RgbImage::from_fn(2, 2, |x, _| if x == 0 { Rgb([0, 0, 0]) } else { Rgb([200, 100, 50]) });
        let asset = OverlayAsset::from_rgb(img).expect("asset");
        assert_eq!(asset.sample(-3.0, 0.0), [0, 0, 0]);
        assert_eq!(asset.sample(9.0, 9.0), [200, 100, 50]);
        assert_eq!(asset.sample(0.5, 0.5), [100, 50, 25]);
        assert_eq!(asset.sample(2.0, 1.0), [200, 100, 50]);
    }
}
