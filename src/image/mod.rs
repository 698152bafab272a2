//! Image views and preprocessing.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! Owned pixel matrices are `image::GrayImage`; kernels scan views so that
//! ROI windows stay zero-copy and keep the parent stride.

use crate::util::{GlyphError, GlyphResult};
use image::GrayImage;

#[cfg(feature = "image-io")]
pub mod io;
pub mod ops;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> GlyphResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> GlyphResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(GlyphError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy window into the same backing buffer.
    pub fn roi(&self, x: usize, y: usize, width: usize, height: usize) -> GlyphResult<Self> {
        if width == 0 || height == 0 {
            return Err(GlyphError::InvalidDimensions { width, height });
        }
        let out_of_bounds = GlyphError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or_else(|| out_of_bounds.clone())?;
        let end_y = y.checked_add(height).ok_or_else(|| out_of_bounds.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(out_of_bounds);
        }

        let start = y * self.stride + x;
        let data = self.data.get(start..).ok_or(GlyphError::BufferTooSmall {
            needed: start.saturating_add(1),
            got: self.data.len(),
        })?;
        ImageView::new(data, width, height, self.stride)
    }
}

impl<'a> ImageView<'a, u8> {
    /// Borrows a grayscale image buffer as a contiguous view.
    pub fn from_gray(img: &'a GrayImage) -> GlyphResult<Self> {
        Self::from_slice(img.as_raw(), img.width() as usize, img.height() as usize)
    }

    /// Number of non-zero pixels.
    pub fn count_nonzero(&self) -> usize {
        (0..self.height)
            .filter_map(|y| self.row(y))
            .map(|row| row.iter().filter(|&&v| v != 0).count())
            .sum()
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> GlyphResult<usize> {
    if width == 0 || height == 0 {
        return Err(GlyphError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(GlyphError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(GlyphError::InvalidDimensions { width, height })
}
