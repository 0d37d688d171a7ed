//! Warping a raster into another CRS.

use crate::crs::Projector;
use crate::error::{DemError, Result};
use crate::raster::{GeoTransform, RasterDataset};

/// Points sampled along each edge of the source extent.
const EDGE_SAMPLES: usize = 21;

/// Reproject `raster` to `target_epsg` with bilinear resampling.
///
/// The output grid covers the projected extent of the input with square
/// pixels, sized so the diagonal spans the same number of pixels as the
/// input's. Nodata neighbours are left out of the interpolation and the
/// remaining weights renormalized; pixels with no valid neighbour are nodata.
///
/// Reprojecting to the raster's own CRS returns a copy.
pub fn reproject(raster: &RasterDataset, target_epsg: u32) -> Result<RasterDataset> {
    if raster.epsg() == target_epsg {
        return Ok(raster.clone());
    }
    let forward = Projector::new(raster.epsg(), target_epsg)?;
    let inverse = Projector::new(target_epsg, raster.epsg())?;

    let (min_x, min_y, max_x, max_y) = projected_extent(raster, &forward)?;
    let src_diagonal = ((raster.width().pow(2) + raster.height().pow(2)) as f64).sqrt();
    let dst_diagonal = ((max_x - min_x).powi(2) + (max_y - min_y).powi(2)).sqrt();
    let res = dst_diagonal / src_diagonal;
    if !res.is_finite() || res <= 0.0 {
        return Err(DemError::Projection(format!(
            "degenerate extent after projecting to EPSG:{target_epsg}"
        )));
    }

    let width = ((max_x - min_x) / res).ceil().max(1.0) as usize;
    let height = ((max_y - min_y) / res).ceil().max(1.0) as usize;
    let transform = GeoTransform::new(min_x, max_y, res, -res);
    let mut out = RasterDataset::filled(
        width,
        height,
        raster.bands(),
        transform,
        target_epsg,
        raster.nodata(),
    );

    let src = raster.transform();
    for row in 0..height {
        for col in 0..width {
            let (x, y) = transform.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5);
            let Ok((sx, sy)) = inverse.transform(x, y) else {
                continue;
            };
            let (sc, sr) = src.world_to_pixel(sx, sy);
            if sc < 0.0 || sr < 0.0 || sc > raster.width() as f64 || sr > raster.height() as f64 {
                continue;
            }
            for band in 0..raster.bands() {
                if let Some(v) = bilinear(raster, band, sc, sr) {
                    out.set(band, row, col, v);
                }
            }
        }
    }

    tracing::debug!(
        from = raster.epsg(),
        to = target_epsg,
        width,
        height,
        res,
        "Raster reprojected"
    );
    Ok(out)
}

/// Bounding box of the densified source outline in the target CRS.
fn projected_extent(raster: &RasterDataset, forward: &Projector) -> Result<(f64, f64, f64, f64)> {
    let (x0, y0, x1, y1) = raster.bounds();
    let mut extent = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    let mut last_error = None;

    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
        let x = x0 + t * (x1 - x0);
        let y = y0 + t * (y1 - y0);
        for (px, py) in [(x, y0), (x, y1), (x0, y), (x1, y)] {
            match forward.transform(px, py) {
                Ok((tx, ty)) => {
                    extent.0 = extent.0.min(tx);
                    extent.1 = extent.1.min(ty);
                    extent.2 = extent.2.max(tx);
                    extent.3 = extent.3.max(ty);
                }
                Err(e) => last_error = Some(e),
            }
        }
    }

    if !extent.0.is_finite() {
        return Err(last_error.unwrap_or_else(|| {
            DemError::Projection("raster extent could not be projected".to_string())
        }));
    }
    Ok(extent)
}

/// Interpolate band `band` at fractional pixel position `(col, row)`.
fn bilinear(raster: &RasterDataset, band: usize, col: f64, row: f64) -> Option<f32> {
    // Pixel centres sit at +0.5.
    let px = col - 0.5;
    let py = row - 0.5;
    let c0 = px.floor();
    let r0 = py.floor();
    let fx = px - c0;
    let fy = py - r0;

    let mut sum = 0.0f64;
    let mut weight = 0.0f64;
    for (dc, dr, w) in [
        (0.0, 0.0, (1.0 - fx) * (1.0 - fy)),
        (1.0, 0.0, fx * (1.0 - fy)),
        (0.0, 1.0, (1.0 - fx) * fy),
        (1.0, 1.0, fx * fy),
    ] {
        let (c, r) = (c0 + dc, r0 + dr);
        if w <= 0.0 || c < 0.0 || r < 0.0 {
            continue;
        }
        let Some(v) = raster.get(band, r as usize, c as usize) else {
            continue;
        };
        if raster.is_nodata(v) {
            continue;
        }
        sum += v as f64 * w;
        weight += w;
    }

    (weight > 0.0).then(|| (sum / weight) as f32)
}
