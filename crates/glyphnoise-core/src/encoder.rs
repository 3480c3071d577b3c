//! Image-to-vector encoding.
//!
//! Every glyph goes through the same fixed pipeline:
//!
//! 1. decode and convert to 8-bit luma,
//! 2. resize to the target [`GridSize`] (Catmull-Rom),
//! 3. optional Laplacian sharpening ([`crate::filter`]),
//! 4. binarize against a normalized ink threshold ([`crate::threshold`]).
//!
//! The result is an [`ImageMatrix`] (rows x columns) plus its column-major
//! flattening as a `DVector<f64>`. Downstream code relies on the column-major
//! order: element `col * height + row` is cell `(row, col)`.

use crate::config::{EncoderConfig, GridSize};
use crate::error::{AnalysisError, Result};
use crate::image::{ImageMatrix, ImageView};
use image::imageops::FilterType;
use image::DynamicImage;
use nalgebra::DVector;
use std::path::{Path, PathBuf};

/// A glyph flattened column by column; 0/1 before noise, real-valued after.
pub type ImageVector = DVector<f64>;

/// One encoded input image.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodedGlyph {
    /// Where the glyph was loaded from (or a caller-chosen label for in-memory images).
    pub path: PathBuf,
    /// Binary grid, `height` rows by `width` columns.
    pub matrix: ImageMatrix,
    /// Column-major flattening of `matrix`.
    pub vector: ImageVector,
}

impl EncodedGlyph {
    /// Build from an already binarized matrix.
    #[must_use]
    pub fn from_matrix(path: impl Into<PathBuf>, matrix: ImageMatrix) -> Self {
        let vector = DVector::from_vec(matrix.to_column_major());
        Self {
            path: path.into(),
            matrix,
            vector,
        }
    }
}

/// Encode the image at `path` with the default encoder settings.
pub fn encode(path: impl AsRef<Path>, size: GridSize) -> Result<EncodedGlyph> {
    encode_with_config(path, size, &EncoderConfig::default())
}

/// Encode the image at `path`.
///
/// Any open or decode failure is reported as [`AnalysisError::Load`] naming the path.
pub fn encode_with_config(
    path: impl AsRef<Path>,
    size: GridSize,
    config: &EncoderConfig,
) -> Result<EncodedGlyph> {
    let path = path.as_ref();
    size.validate()?;
    let img = image::open(path).map_err(|e| AnalysisError::load(path, e))?;
    let (matrix, vector) =
        encode_image(&img, size, config).map_err(|e| AnalysisError::load(path, e))?;
    Ok(EncodedGlyph {
        path: path.to_path_buf(),
        matrix,
        vector,
    })
}

/// Encode an in-memory image.
pub fn encode_image(
    img: &DynamicImage,
    size: GridSize,
    config: &EncoderConfig,
) -> Result<(ImageMatrix, ImageVector)> {
    size.validate()?;
    if img.width() == 0 || img.height() == 0 {
        return Err(AnalysisError::Validation("image has no pixels".into()));
    }

    let luma = img.to_luma8();
    let resized = image::imageops::resize(
        &luma,
        size.width as u32,
        size.height as u32,
        FilterType::CatmullRom,
    );
    let view = ImageView::from_luma(&resized);

    let matrix = if config.sharpen {
        let mut sharpened = vec![0u8; size.len()];
        crate::filter::laplacian_sharpen(&view, &mut sharpened);
        let sharpened_view = ImageView::new(&sharpened, size.width, size.height)?;
        crate::threshold::binarize(&sharpened_view, config.ink_threshold)?
    } else {
        crate::threshold::binarize(&view, config.ink_threshold)?
    };

    let vector = DVector::from_vec(matrix.to_column_major());
    if vector.len() != size.len() {
        return Err(AnalysisError::DimensionMismatch {
            context: "encoded vector",
            expected: size.len(),
            actual: vector.len(),
        });
    }
    Ok((matrix, vector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn vertical_bar(w: u32, h: u32) -> DynamicImage {
        // Ink in the left third, paper elsewhere.
        DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, _| {
            if x < w / 3 {
                Luma([0])
            } else {
                Luma([255])
            }
        }))
    }

    #[test]
    fn test_encode_shape_and_values() {
        let size = GridSize::new(5, 7).unwrap();
        let (m, v) = encode_image(&vertical_bar(60, 84), size, &EncoderConfig::default()).unwrap();
        assert_eq!(m.width(), 5);
        assert_eq!(m.height(), 7);
        assert_eq!(v.len(), 35);
        assert!(v.iter().all(|&x| x == 0.0 || x == 1.0));
    }

    #[test]
    fn test_dark_pixels_are_ink() {
        let size = GridSize::new(6, 6).unwrap();
        let config = EncoderConfig {
            sharpen: false,
            ..EncoderConfig::default()
        };
        let (m, v) = encode_image(&vertical_bar(60, 60), size, &config).unwrap();
        // Column 0 is ink in every row, the last column never is.
        for row in 0..6 {
            assert_eq!(m.get(row, 0), 1);
            assert_eq!(m.get(row, 5), 0);
        }
        // Column-major: the first `height` entries are column 0.
        assert!(v.rows(0, 6).iter().all(|&x| x == 1.0));
        assert!(v.rows(30, 6).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_blank_and_solid() {
        let size = GridSize::new(4, 4).unwrap();
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([255])));
        let black = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([0])));
        let (mw, _) = encode_image(&white, size, &EncoderConfig::default()).unwrap();
        let (mb, _) = encode_image(&black, size, &EncoderConfig::default()).unwrap();
        assert_eq!(mw.ink_count(), 0);
        assert_eq!(mb.ink_count(), 16);
    }

    #[test]
    fn test_invalid_grid_rejected() {
        let size = GridSize {
            width: 2,
            height: 2,
        };
        let result = encode_image(&vertical_bar(10, 10), size, &EncoderConfig::default());
        assert!(matches!(result, Err(AnalysisError::Validation(_))));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = encode("/definitely/not/here.png", GridSize::default()).unwrap_err();
        match err {
            AnalysisError::Load { path, .. } => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.png"));
            }
            other => panic!("expected load error, got {other:?}"),
        }
    }
}
