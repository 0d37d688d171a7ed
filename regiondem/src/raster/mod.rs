//! In-memory rasters and the operations that produce them.
//!
//! A [`RasterDataset`] is an immutable-by-convention grid: every operation in
//! this module ([`mosaic::assemble`], [`clip::clip`], [`reproject::reproject`])
//! returns a new dataset and leaves its input untouched.

pub mod clip;
pub mod geotiff;
pub mod mosaic;
pub mod reproject;

use serde::Serialize;

use crate::error::{DemError, Result};

/// Nodata value used for elevation rasters.
pub const DEFAULT_NODATA: f32 = -32768.0;

/// North-up affine transform.
///
/// `pixel_height` is negative: rows advance southwards from `origin_y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoTransform {
    /// X coordinate of the top-left corner of the top-left pixel.
    pub origin_x: f64,
    /// Y coordinate of the top-left corner of the top-left pixel.
    pub origin_y: f64,
    /// Pixel width in CRS units.
    pub pixel_width: f64,
    /// Pixel height in CRS units (negative for north-up).
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a transform; `pixel_height` should be negative.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// World coordinate of a fractional pixel position (`0.5, 0.5` is the first centre).
    #[inline]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Fractional pixel position of a world coordinate.
    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }
}

/// A band-sequential `f32` raster with georeferencing.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDataset {
    width: usize,
    height: usize,
    bands: usize,
    data: Vec<f32>,
    transform: GeoTransform,
    epsg: u32,
    nodata: f32,
}

impl RasterDataset {
    /// A raster of the given shape filled with `nodata`.
    pub fn filled(
        width: usize,
        height: usize,
        bands: usize,
        transform: GeoTransform,
        epsg: u32,
        nodata: f32,
    ) -> Self {
        Self {
            width,
            height,
            bands,
            data: vec![nodata; width * height * bands],
            transform,
            epsg,
            nodata,
        }
    }

    /// Wrap an existing pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::MalformedPayload`] if the buffer length does not
    /// match `width * height * bands` or the raster is empty.
    pub fn from_data(
        width: usize,
        height: usize,
        bands: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        epsg: u32,
        nodata: f32,
    ) -> Result<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(DemError::malformed(
                "raster",
                format!("empty raster {}x{}x{}", width, height, bands),
            ));
        }
        if data.len() != width * height * bands {
            return Err(DemError::malformed(
                "raster",
                format!(
                    "buffer holds {} values, expected {}x{}x{}",
                    data.len(),
                    width,
                    height,
                    bands
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            bands,
            data,
            transform,
            epsg,
            nodata,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// EPSG code of the raster CRS.
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    /// All pixels, band after band.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Pixels of one band, row-major from the north-west corner.
    pub fn band(&self, band: usize) -> &[f32] {
        let size = self.width * self.height;
        &self.data[band * size..(band + 1) * size]
    }

    #[inline]
    fn index(&self, band: usize, row: usize, col: usize) -> usize {
        (band * self.height + row) * self.width + col
    }

    /// Pixel value, or `None` when out of range.
    #[inline]
    pub fn get(&self, band: usize, row: usize, col: usize) -> Option<f32> {
        if band >= self.bands || row >= self.height || col >= self.width {
            return None;
        }
        Some(self.data[self.index(band, row, col)])
    }

    #[inline]
    pub(crate) fn set(&mut self, band: usize, row: usize, col: usize, value: f32) {
        let idx = self.index(band, row, col);
        self.data[idx] = value;
    }

    /// Whether `value` is this raster's nodata (NaN always counts).
    #[inline]
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || value == self.nodata
    }

    /// `(min_x, min_y, max_x, max_y)` of the pixel edges.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.transform.pixel_to_world(0.0, 0.0);
        let (x1, y1) = self
            .transform
            .pixel_to_world(self.width as f64, self.height as f64);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Summary statistics of the first band, ignoring nodata.
    pub fn stats(&self) -> RasterStats {
        let mut stats = RasterStats {
            valid: 0,
            nodata: 0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            mean: 0.0,
        };
        let mut sum = 0.0f64;
        for &v in self.band(0) {
            if self.is_nodata(v) {
                stats.nodata += 1;
                continue;
            }
            stats.valid += 1;
            stats.min = stats.min.min(v);
            stats.max = stats.max.max(v);
            sum += v as f64;
        }
        if stats.valid > 0 {
            stats.mean = sum / stats.valid as f64;
        } else {
            stats.min = self.nodata;
            stats.max = self.nodata;
        }
        stats
    }
}

/// Pixel statistics of one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RasterStats {
    /// Pixels holding data.
    pub valid: usize,
    /// Pixels equal to nodata.
    pub nodata: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f64,
}
