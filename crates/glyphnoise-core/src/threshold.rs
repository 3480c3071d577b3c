//! Global binarization of normalized glyph intensities.

use crate::error::Result;
use crate::image::{ImageMatrix, ImageView};
use multiversion::multiversion;

/// Smallest 8-bit value that is NOT ink for a normalized threshold.
///
/// A pixel `p` is ink when `p / 255 < threshold`; the rule is monotonic in `p`,
/// so the row kernel only needs this one comparison value.
#[must_use]
pub fn ink_cutoff(threshold: f64) -> u8 {
    let threshold = threshold.clamp(0.0, 1.0);
    (0..=u8::MAX)
        .find(|&p| f64::from(p) / 255.0 >= threshold)
        .unwrap_or(u8::MAX)
}

/// Binarize a grayscale view: dark pixels (`intensity < threshold`) become 1, the rest 0.
pub fn binarize(img: &ImageView, threshold: f64) -> Result<ImageMatrix> {
    let cutoff = ink_cutoff(threshold);
    let mut cells = vec![0u8; img.width * img.height];
    if img.width > 0 {
        for (y, dst) in cells.chunks_exact_mut(img.width).enumerate() {
            ink_row_simd(img.get_row(y), dst, cutoff);
        }
    }
    ImageMatrix::from_row_major(img.width, img.height, cells)
}

#[multiversion(targets(
    "x86_64+avx2+bmi1+bmi2+popcnt+lzcnt",
    "x86_64+avx512f+avx512bw+avx512dq+avx512vl",
    "aarch64+neon"
))]
fn ink_row_simd(src: &[u8], dst: &mut [u8], cutoff: u8) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = u8::from(s < cutoff);
    }
}
