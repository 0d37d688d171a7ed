//! SRTM `.hgt` decoding.
//!
//! An `.hgt` file is a square grid of big-endian `i16` elevations, stored
//! north to south, west to east. Edge samples are shared with neighbouring
//! tiles, so a grid of `n` samples spans exactly one degree with a spacing of
//! `1 / (n - 1)` degrees and pixel centres sitting on the tile edges.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Serialize;

use crate::crs::WGS84;
use crate::error::{DemError, Result};
use crate::raster::{GeoTransform, RasterDataset};
use crate::tile_id::TileId;

/// File size for SRTM1 (1 arc-second, ~30m resolution): 3601 × 3601 × 2 bytes
pub const SRTM1_SIZE: usize = 3601 * 3601 * 2; // 25,934,402 bytes

/// File size for SRTM3 (3 arc-second, ~90m resolution): 1201 × 1201 × 2 bytes
pub const SRTM3_SIZE: usize = 1201 * 1201 * 2; // 2,884,802 bytes

/// Value indicating no data (void) in SRTM files
pub const VOID_VALUE: i16 = -32768;

/// Resolution class of a decoded tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SrtmResolution {
    /// SRTM1: 1 arc-second (~30m) resolution
    Srtm1,
    /// SRTM3: 3 arc-second (~90m) resolution
    Srtm3,
    /// A size that matches neither product.
    Nonstandard,
}

impl SrtmResolution {
    /// Classify a payload length.
    pub fn from_len(len: usize) -> Self {
        match len {
            SRTM1_SIZE => SrtmResolution::Srtm1,
            SRTM3_SIZE => SrtmResolution::Srtm3,
            _ => SrtmResolution::Nonstandard,
        }
    }

    /// Returns the approximate resolution in meters.
    pub fn meters(&self) -> Option<f64> {
        match self {
            SrtmResolution::Srtm1 => Some(30.0),
            SrtmResolution::Srtm3 => Some(90.0),
            SrtmResolution::Nonstandard => None,
        }
    }
}

/// Samples per side inferred from a payload length: `floor(sqrt(len / 2))`.
pub fn infer_samples(len: usize) -> usize {
    let cells = len / 2;
    let mut n = (cells as f64).sqrt() as usize;
    // Correct float rounding at perfect squares.
    while n * n > cells {
        n -= 1;
    }
    while (n + 1) * (n + 1) <= cells {
        n += 1;
    }
    n
}

/// Affine transform of a tile with `samples` per side.
///
/// Pixel centres of the first row and column fall on the north and west
/// tile edges, so the raster extends half a pixel beyond the cell.
pub fn georeference(id: TileId, samples: usize) -> GeoTransform {
    let res = 1.0 / (samples as f64 - 1.0);
    GeoTransform::new(
        id.lon() as f64 - res / 2.0,
        id.lat() as f64 + 1.0 + res / 2.0,
        res,
        -res,
    )
}

/// Decode an in-memory `.hgt` payload into a geographic raster.
///
/// A length that is not one of the two standard sizes is logged and decoded
/// with the inferred sample count; trailing bytes are ignored.
///
/// # Errors
///
/// Returns [`DemError::MalformedPayload`] when fewer than 2 samples per side
/// can be inferred.
pub fn decode(id: TileId, bytes: &[u8]) -> Result<RasterDataset> {
    let samples = infer_samples(bytes.len());
    if samples < 2 {
        return Err(DemError::malformed(
            id.hgt_filename(),
            format!("{} bytes is too small for an elevation grid", bytes.len()),
        ));
    }
    if SrtmResolution::from_len(bytes.len()) == SrtmResolution::Nonstandard {
        tracing::warn!(
            tile = %id,
            size = bytes.len(),
            samples,
            "Unexpected .hgt size, decoding with inferred sample count"
        );
    }

    let data: Vec<f32> = bytes[..samples * samples * 2]
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]) as f32)
        .collect();

    RasterDataset::from_data(
        samples,
        samples,
        1,
        data,
        georeference(id, samples),
        WGS84,
        VOID_VALUE as f32,
    )
}

/// Read a cached `.hgt` file through a memory map.
pub fn read_file<P: AsRef<Path>>(path: P, id: TileId) -> Result<RasterDataset> {
    let file = File::open(&path)?;

    // SAFETY: the file is opened read-only and the mapping does not outlive
    // this function; the decoded raster owns its own buffer.
    let mmap = unsafe { Mmap::map(&file)? };
    decode(id, &mmap)
}

/// Summary of a tile on disk, used by the `info` command.
#[derive(Debug, Clone, Serialize)]
pub struct TileInfo {
    /// Tile code.
    pub tile: String,
    /// File size in bytes.
    pub size: usize,
    /// Samples per side.
    pub samples: usize,
    pub resolution: SrtmResolution,
    /// `(min_lon, min_lat, max_lon, max_lat)` of the 1° cell.
    pub bounds: (f64, f64, f64, f64),
    /// Minimum valid elevation.
    pub min: f32,
    /// Maximum valid elevation.
    pub max: f32,
    /// Number of void samples.
    pub voids: usize,
}

/// Inspect a cached tile.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<TileInfo> {
    let path = path.as_ref();
    let id = TileId::parse(&path.to_string_lossy())?;
    let size = std::fs::metadata(path)?.len() as usize;
    let raster = read_file(path, id)?;
    let stats = raster.stats();

    Ok(TileInfo {
        tile: id.to_string(),
        size,
        samples: raster.width(),
        resolution: SrtmResolution::from_len(size),
        bounds: id.bounds(),
        min: stats.min,
        max: stats.max,
        voids: stats.nodata,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Encode a `samples` × `samples` grid where each value is produced by `f(row, col)`.
    pub(crate) fn synthetic_hgt(samples: usize, f: impl Fn(usize, usize) -> i16) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples * samples * 2);
        for row in 0..samples {
            for col in 0..samples {
                bytes.extend_from_slice(&f(row, col).to_be_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_infer_samples() {
        assert_eq!(infer_samples(SRTM3_SIZE), 1201);
        assert_eq!(infer_samples(SRTM1_SIZE), 3601);
        assert_eq!(infer_samples(8), 2);
        assert_eq!(infer_samples(9), 2);
        assert_eq!(infer_samples(7), 1);
        assert_eq!(infer_samples(0), 0);
    }

    #[test]
    fn test_resolution_from_len() {
        assert_eq!(SrtmResolution::from_len(SRTM1_SIZE), SrtmResolution::Srtm1);
        assert_eq!(SrtmResolution::from_len(SRTM3_SIZE), SrtmResolution::Srtm3);
        assert_eq!(SrtmResolution::from_len(100), SrtmResolution::Nonstandard);
        assert_eq!(SrtmResolution::Srtm3.meters(), Some(90.0));
    }

    #[test]
    fn test_decode_layout() {
        let id = TileId::new(-35, -72);
        let bytes = synthetic_hgt(3, |row, col| (row * 10 + col) as i16);
        let raster = decode(id, &bytes).unwrap();

        assert_eq!((raster.width(), raster.height()), (3, 3));
        assert_eq!(raster.epsg(), 4326);
        assert_eq!(raster.nodata(), -32768.0);
        // Row 0 is the north edge.
        assert_eq!(raster.get(0, 0, 0), Some(0.0));
        assert_eq!(raster.get(0, 0, 2), Some(2.0));
        assert_eq!(raster.get(0, 2, 1), Some(21.0));
    }

    #[test]
    fn test_decode_negative_and_void() {
        let bytes = synthetic_hgt(2, |row, col| match (row, col) {
            (0, 0) => -5,
            (1, 1) => VOID_VALUE,
            _ => 1000,
        });
        let raster = decode(TileId::new(0, 0), &bytes).unwrap();
        assert_eq!(raster.get(0, 0, 0), Some(-5.0));
        assert!(raster.is_nodata(raster.get(0, 1, 1).unwrap()));
    }

    #[test]
    fn test_georeference_centres_on_edges() {
        let id = TileId::new(-35, -72);
        let t = georeference(id, 1201);
        let res = 1.0 / 1200.0;
        assert_relative_eq!(t.pixel_width, res);
        assert_relative_eq!(t.pixel_height, -res);

        let (x, y) = t.pixel_to_world(0.5, 0.5);
        assert_relative_eq!(x, -72.0, epsilon = 1e-12);
        assert_relative_eq!(y, -34.0, epsilon = 1e-12);

        let (x, y) = t.pixel_to_world(1200.5, 1200.5);
        assert_relative_eq!(x, -71.0, epsilon = 1e-9);
        assert_relative_eq!(y, -35.0, epsilon = 1e-9);
    }

    #[test]
    fn test_decode_rejects_tiny_payload() {
        let err = decode(TileId::new(0, 0), &[0u8; 5]).unwrap_err();
        assert!(matches!(err, DemError::MalformedPayload { .. }));
    }

    #[test]
    fn test_decode_nonstandard_size_ignores_trailing_bytes() {
        let mut bytes = synthetic_hgt(4, |_, _| 7);
        bytes.extend_from_slice(&[1, 2, 3]);
        let raster = decode(TileId::new(10, 10), &bytes).unwrap();
        assert_eq!(raster.width(), 4);
        assert!(raster.data().iter().all(|v| *v == 7.0));
    }

    #[test]
    fn test_read_file_and_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S35W072.hgt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&synthetic_hgt(5, |row, _| row as i16 * 100))
            .unwrap();
        drop(file);

        let raster = read_file(&path, TileId::new(-35, -72)).unwrap();
        assert_eq!(raster.width(), 5);

        let info = inspect(&path).unwrap();
        assert_eq!(info.tile, "S35W072");
        assert_eq!(info.samples, 5);
        assert_eq!(info.size, 50);
        assert_eq!(info.resolution, SrtmResolution::Nonstandard);
        assert_eq!(info.min, 0.0);
        assert_eq!(info.max, 400.0);
        assert_eq!(info.voids, 0);
    }

    #[test]
    fn test_read_missing_file() {
        let file = NamedTempFile::new().unwrap();
        let missing = file.path().with_extension("missing");
        assert!(matches!(
            read_file(missing, TileId::new(0, 0)),
            Err(DemError::Io(_))
        ));
    }
}
