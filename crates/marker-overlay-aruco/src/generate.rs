//! Printable marker images.

use calib_targets_aruco::Dictionary;
use marker_overlay_core::GrayImage;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("marker id {id} is out of range for {dictionary} ({len} markers)")]
    UnknownId {
        id: u32,
        dictionary: &'static str,
        len: usize,
    },
    #[error("{side_px} px is too small for a {cells}x{cells} cell marker")]
    TooSmall { side_px: u32, cells: usize },
}

/// Render marker `id` as a `side_px x side_px` image: black border of
/// `border_bits` cells around the code bits (black = 0, white = 255).
///
/// Cells are mapped with integer division, so sides that are not a
/// multiple of the cell count get cells differing by at most one pixel.
pub fn generate_marker(
    dict: &Dictionary,
    id: u32,
    side_px: u32,
    border_bits: usize,
) -> Result<GrayImage, GenerateError> {
    let code = *dict
        .codes
        .get(id as usize)
        .ok_or(GenerateError::UnknownId {
            id,
            dictionary: dict.name,
            len: dict.codes.len(),
        })?;

    let bits = dict.marker_size;
    let cells = bits + 2 * border_bits;
    let side = side_px as usize;
    if side < cells {
        return Err(GenerateError::TooSmall { side_px, cells });
    }

    let mut img = GrayImage::filled(side, side, 255);
    for y in 0..side {
        let cy = y * cells / side;
        for x in 0..side {
            let cx = x * cells / side;
            let border = cx < border_bits
                || cy < border_bits
                || cx >= cells - border_bits
                || cy >= cells - border_bits;
            let black = border || {
                let idx = (cy - border_bits) * bits + (cx - border_bits);
                (code >> idx) & 1 == 1
            };
            if black {
                img.data[y * side + x] = 0;
            }
        }
    }
    Ok(img)
}

/// Surround `marker` with a white margin of `margin_px` pixels.
pub fn with_quiet_zone(marker: &GrayImage, margin_px: usize) -> GrayImage {
    let w = marker.width + 2 * margin_px;
    let h = marker.height + 2 * margin_px;
    let mut out = GrayImage::filled(w, h, 255);
    for y in 0..marker.height {
        let src = &marker.data[y * marker.width..(y + 1) * marker.width];
        let start = (y + margin_px) * w + margin_px;
        out.data[start..start + marker.width].copy_from_slice(src);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary_by_name;

    #[test]
    fn border_is_black_and_bits_follow_the_code() {
        let dict = dictionary_by_name("DICT_6X6_250").expect("dict");
        let img = generate_marker(&dict, 5, 80, 1).expect("marker");
        assert_eq!((img.width, img.height), (80, 80));

        // Cell size 10 px; border cells are the outermost ring.
        for i in 0..80 {
            assert_eq!(img.data[i], 0);
            assert_eq!(img.data[79 * 80 + i], 0);
            assert_eq!(img.data[i * 80], 0);
        }

        let code = dict.codes[5];
        for by in 0..6 {
            for bx in 0..6 {
                let (x, y) = ((bx + 1) * 10 + 5, (by + 1) * 10 + 5);
                let black = (code >> (by * 6 + bx)) & 1 == 1;
                assert_eq!(img.data[y * 80 + x] == 0, black, "bit ({bx},{by})");
            }
        }
    }

    #[test]
    fn out_of_range_id_is_an_error() {
        let dict = dictionary_by_name("DICT_6X6_250").expect("dict");
        assert!(matches!(
            generate_marker(&dict, 250, 100, 1),
            Err(GenerateError::UnknownId { id: 250, .. })
        ));
        assert!(matches!(
            generate_marker(&dict, 0, 4, 1),
            Err(GenerateError::TooSmall { .. })
        ));
    }

    #[test]
    fn quiet_zone_pads_with_white() {
        let marker = GrayImage::filled(4, 3, 0);
        let padded = with_quiet_zone(&marker, 2);
        assert_eq!((padded.width, padded.height), (8, 7));
        assert_eq!(padded.data[0], 255);
        assert_eq!(padded.data[2 * 8 + 2], 0);
        assert_eq!(padded.data[4 * 8 + 5], 0);
        assert_eq!(padded.data[4 * 8 + 6], 255);
    }
}
