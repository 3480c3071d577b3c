//! Sharpening enhancement applied to resized glyphs before binarization.
//!
//! Downscaling a glyph to a few dozen pixels smears stroke edges into mid-grey.
//! A Laplacian sharpen pushes those pixels back toward ink or paper so the
//! global threshold in [`crate::threshold`] sees cleaner strokes.

use crate::image::ImageView;
use rayon::prelude::*;

/// Apply a 3x3 Laplacian sharpen: `5*center - (north + south + east + west)`.
///
/// Border pixels replicate their nearest neighbor. `output` must hold
/// `img.width * img.height` bytes and is written packed.
pub fn laplacian_sharpen(img: &ImageView, output: &mut [u8]) {
    let w = img.width;
    let h = img.height;
    assert_eq!(output.len(), w * h, "output buffer must be width * height");
    if w == 0 || h == 0 {
        return;
    }

    output
        .par_chunks_exact_mut(w)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let r0 = img.get_row(y.saturating_sub(1));
            let r1 = img.get_row(y);
            let r2 = img.get_row((y + 1).min(h - 1));

            for (x, dst) in dst_row.iter_mut().enumerate() {
                let x0 = x.saturating_sub(1);
                let x2 = (x + 1).min(w - 1);

                let center = i32::from(r1[x]);
                let neighbors =
                    i32::from(r0[x]) + i32::from(r1[x0]) + i32::from(r1[x2]) + i32::from(r2[x]);

                *dst = (5 * center - neighbors).clamp(0, 255) as u8;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uniform_image_unchanged() {
        let data = vec![90u8; 6 * 4];
        let img = ImageView::new(&data, 6, 4).unwrap();
        let mut out = vec![0u8; 24];
        laplacian_sharpen(&img, &mut out);
        assert!(out.iter().all(|&p| p == 90));
    }

    #[test]
    fn test_edge_contrast_increases() {
        // Left half dark grey, right half light grey.
        let w = 6;
        let h = 3;
        let data: Vec<u8> = (0..w * h)
            .map(|i| if i % w < 3 { 80 } else { 170 })
            .collect();
        let img = ImageView::new(&data, w, h).unwrap();
        let mut out = vec![0u8; w * h];
        laplacian_sharpen(&img, &mut out);

        // Pixels adjacent to the edge move away from each other.
        assert!(out[w + 2] < 80);
        assert!(out[w + 3] > 170);
    }

    proptest! {
        #[test]
        fn prop_constant_rows_are_fixed_points(v in 0..=255u8, w in 1..12usize, h in 1..12usize) {
            let data = vec![v; w * h];
            let img = ImageView::new(&data, w, h).unwrap();
            let mut out = vec![0u8; w * h];
            laplacian_sharpen(&img, &mut out);
            prop_assert!(out.iter().all(|&p| p == v));
        }
    }
}
