//! Image buffer abstractions: a borrowed grayscale view and the owned binary glyph grid.

use crate::error::{AnalysisError, Result};

/// A borrowed, packed 8-bit grayscale buffer: `width * height` bytes, row after row.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    /// Pixel data, row by row.
    pub data: &'a [u8],
    /// Columns per row.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl<'a> ImageView<'a> {
    /// Create a view over exactly `width * height` bytes.
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Result<Self> {
        if data.len() != width * height {
            return Err(AnalysisError::DimensionMismatch {
                context: "image buffer",
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// View a decoded luma image.
    #[must_use]
    pub fn from_luma(img: &'a image::GrayImage) -> Self {
        Self {
            data: img.as_raw(),
            width: img.width() as usize,
            height: img.height() as usize,
        }
    }

    /// Row `y`.
    #[inline]
    pub fn get_row(&self, y: usize) -> &'a [u8] {
        assert!(y < self.height, "Row index {y} out of bounds");
        let start = y * self.width;
        &self.data[start..start + self.width]
    }
}

/// Binary glyph grid: `height` rows by `width` columns of {0, 1}, stored row-major.
///
/// A 1 marks ink (a pixel darker than the binarization threshold).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageMatrix {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl ImageMatrix {
    /// Wrap row-major cells. Both dimensions must be non-zero and every cell 0 or 1.
    pub fn from_row_major(width: usize, height: usize, cells: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::Validation(format!(
                "image matrix needs non-zero dimensions, got {width}x{height}"
            )));
        }
        if cells.len() != width * height {
            return Err(AnalysisError::DimensionMismatch {
                context: "image matrix",
                expected: width * height,
                actual: cells.len(),
            });
        }
        if cells.iter().any(|&c| c > 1) {
            return Err(AnalysisError::Validation(
                "image matrix cells must be 0 or 1".into(),
            ));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Number of columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell at `row`, `col`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        assert!(row < self.height && col < self.width);
        self.cells[row * self.width + col]
    }

    /// Iterate rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.cells.chunks_exact(self.width)
    }

    /// Number of ink cells.
    #[must_use]
    pub fn ink_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == 1).count()
    }

    /// Flatten column by column: every row of column 0, then column 1, and so on.
    #[must_use]
    pub fn to_column_major(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.cells.len());
        for col in 0..self.width {
            for row in 0..self.height {
                out.push(f64::from(self.get(row, col)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_rows_of_decoded_image() {
        let img = image::GrayImage::from_raw(3, 2, vec![10, 20, 30, 40, 50, 60]).unwrap();
        let view = ImageView::from_luma(&img);
        assert_eq!(view.get_row(1), &[40, 50, 60]);
    }

    #[test]
    fn test_view_requires_packed_buffer() {
        let data = vec![1, 2, 3];
        assert!(ImageView::new(&data, 2, 2).is_err());
        assert!(ImageView::new(&data, 3, 1).is_ok());
    }

    #[test]
    fn test_column_major_flatten() {
        // 2 rows x 3 columns:
        // 1 0 1
        // 0 1 1
        let m = ImageMatrix::from_row_major(3, 2, vec![1, 0, 1, 0, 1, 1]).unwrap();
        assert_eq!(m.to_column_major(), vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(m.ink_count(), 4);
        assert_eq!(m.rows().count(), 2);
    }

    #[test]
    fn test_matrix_rejects_non_binary() {
        assert!(ImageMatrix::from_row_major(2, 1, vec![0, 2]).is_err());
        assert!(ImageMatrix::from_row_major(2, 2, vec![0, 1]).is_err());
    }

    #[test]
    fn test_matrix_rejects_zero_dimensions() {
        assert!(matches!(
            ImageMatrix::from_row_major(0, 3, vec![]),
            Err(AnalysisError::Validation(_))
        ));
        assert!(ImageMatrix::from_row_major(4, 0, vec![]).is_err());
    }
}
