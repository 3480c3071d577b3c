//! Synthetic glyph generation for tests and benchmarks.

use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};

/// Ink intensity used by the generators.
pub const INK: u8 = 0;
/// Paper intensity used by the generators.
pub const PAPER: u8 = 255;

/// Render an ASCII pattern (`#` = ink, anything else = paper) with each cell
/// blown up to `cell x cell` pixels.
///
/// # Panics
/// Panics if the pattern is empty or its rows differ in length.
#[must_use]
pub fn render_pattern(pattern: &[&str], cell: u32) -> GrayImage {
    assert!(!pattern.is_empty(), "pattern needs at least one row");
    let cols = pattern[0].chars().count();
    assert!(
        pattern.iter().all(|row| row.chars().count() == cols),
        "pattern rows must have equal length"
    );
    let rows: Vec<Vec<bool>> = pattern
        .iter()
        .map(|row| row.chars().map(|c| c == '#').collect())
        .collect();

    GrayImage::from_fn(cols as u32 * cell, rows.len() as u32 * cell, |x, y| {
        let ink = rows[(y / cell) as usize][(x / cell) as usize];
        Luma([if ink { INK } else { PAPER }])
    })
}

/// Uniform image.
#[must_use]
pub fn solid(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
}

/// Photographic negative.
#[must_use]
pub fn complement(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
    out
}

/// Save `img` as PNG under `dir`.
///
/// # Panics
/// Panics if the file cannot be written.
#[must_use]
pub fn write_png(dir: &Path, name: &str, img: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).expect("failed to write test image");
    path
}

/// A small alphabet of 5x7 dot-matrix glyphs.
#[must_use]
pub fn dot_matrix_alphabet() -> Vec<(&'static str, [&'static str; 7])> {
    vec![
        (
            "A",
            [".###.", "#...#", "#...#", "#####", "#...#", "#...#", "#...#"],
        ),
        (
            "B",
            ["####.", "#...#", "#...#", "####.", "#...#", "#...#", "####."],
        ),
        (
            "C",
            [".###.", "#...#", "#....", "#....", "#....", "#...#", ".###."],
        ),
        (
            "H",
            ["#...#", "#...#", "#...#", "#####", "#...#", "#...#", "#...#"],
        ),
        (
            "O",
            [".###.", "#...#", "#...#", "#...#", "#...#", "#...#", ".###."],
        ),
    ]
}
