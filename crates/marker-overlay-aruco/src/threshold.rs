//! Local-mean binarization for candidate extraction.

use image::{GrayImage, Luma};
use imageproc::integral_image::{integral_image, sum_image_pixels};

use marker_overlay_core::GrayImageView;

/// Copy a borrowed view into an `image` buffer.
pub(crate) fn to_luma(img: &GrayImageView<'_>) -> Option<GrayImage> {
    let len = img.width * img.height;
    GrayImage::from_raw(img.width as u32, img.height as u32, img.data.get(..len)?.to_vec())
}

/// Dark-foreground mask (255 = dark).
///
/// A pixel is dark when it is at least `constant` below the mean of the
/// `window x window` box around it; the box is clipped at the image edges.
pub(crate) fn adaptive_threshold(gray: &GrayImage, window: u32, constant: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut mask = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return mask;
    }

    let integral = integral_image::<_, u64>(gray);
    let half = window / 2;
    for y in 0..h {
        let (top, bottom) = (y.saturating_sub(half), (y + half).min(h - 1));
        for x in 0..w {
            let (left, right) = (x.saturating_sub(half), (x + half).min(w - 1));
            let [sum] = sum_image_pixels(&integral, left, top, right, bottom);
            let area = ((right - left + 1) * (bottom - top + 1)) as f32;
            let mean = sum as f32 / area;
            if gray.get_pixel(x, y)[0] as f32 <= mean - constant {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_overlay_core::GrayImage as CoreGray;

    #[test]
    fn view_conversion_keeps_pixels() {
        let img = CoreGray {
            width: 3,
            height: 2,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        let luma = to_luma(&img.view()).expect("buffer");
        assert_eq!(luma.dimensions(), (3, 2));
        assert_eq!(luma.get_pixel(2, 1)[0], 6);

        let short = GrayImageView {
            width: 4,
            height: 4,
            data: &img.data,
        };
        assert!(to_luma(&short).is_none());
    }

    #[test]
    fn dark_square_edges_are_foreground() {
        let gray = GrayImage::from_fn(20, 20, |x, y| {
            if (6..14).contains(&x) && (6..14).contains(&y) {
                Luma([10])
            } else {
                Luma([230])
            }
        });
        let mask = adaptive_threshold(&gray, 7, 7.0);
        assert_eq!(mask.get_pixel(6, 6)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(2, 10)[0], 0);
    }

    #[test]
    fn flat_image_has_no_foreground() {
        let gray = GrayImage::from_pixel(16, 9, Luma([128]));
        let mask = adaptive_threshold(&gray, 5, 7.0);
        assert!(mask.pixels().all(|p| p[0] == 0));
    }
}
