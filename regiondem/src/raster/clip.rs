//! Cropping and masking a raster to a boundary.

use geo::{BoundingRect, MultiPolygon};

use crate::boundary::BoundaryGeometry;
use crate::crs::{Projector, WGS84};
use crate::error::{DemError, Result};
use crate::raster::{GeoTransform, RasterDataset};

/// Crop `raster` to the bounding window of `boundary` and set every pixel
/// whose centre lies outside the polygon to nodata.
///
/// The boundary is projected into the raster's CRS first. The result is
/// never larger than the input and keeps its resolution.
///
/// # Errors
///
/// Returns [`DemError::Geometry`] when the boundary does not overlap the
/// raster and [`DemError::Projection`] when it cannot be projected.
pub fn clip(raster: &RasterDataset, boundary: &BoundaryGeometry) -> Result<RasterDataset> {
    let shape = if raster.epsg() == WGS84 {
        boundary.shape().clone()
    } else {
        Projector::new(WGS84, raster.epsg())?.transform_multipolygon(boundary.shape())?
    };
    clip_to_shape(raster, &shape)
}

/// [`clip`] with a shape already in the raster's CRS.
pub fn clip_to_shape(raster: &RasterDataset, shape: &MultiPolygon<f64>) -> Result<RasterDataset> {
    let rect = shape
        .bounding_rect()
        .ok_or_else(|| DemError::Geometry("cannot clip to an empty shape".to_string()))?;

    let t = raster.transform();
    let res_x = t.pixel_width;
    let res_y = t.pixel_height.abs();

    // Window in source pixels, rounded outwards and intersected with the raster.
    let col_start = ((rect.min().x - t.origin_x) / res_x).floor().max(0.0);
    let col_end = ((rect.max().x - t.origin_x) / res_x)
        .ceil()
        .min(raster.width() as f64);
    let row_start = ((t.origin_y - rect.max().y) / res_y).floor().max(0.0);
    let row_end = ((t.origin_y - rect.min().y) / res_y)
        .ceil()
        .min(raster.height() as f64);
    if col_end <= col_start || row_end <= row_start {
        let (x0, y0, x1, y1) = raster.bounds();
        return Err(DemError::Geometry(format!(
            "boundary ({:.4}, {:.4}, {:.4}, {:.4}) does not overlap raster ({x0:.4}, {y0:.4}, {x1:.4}, {y1:.4})",
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y
        )));
    }
    let (col_start, row_start) = (col_start as usize, row_start as usize);
    let width = col_end as usize - col_start;
    let height = row_end as usize - row_start;

    let (origin_x, origin_y) = t.pixel_to_world(col_start as f64, row_start as f64);
    let transform = GeoTransform::new(origin_x, origin_y, res_x, t.pixel_height);
    let mut out = RasterDataset::filled(
        width,
        height,
        raster.bands(),
        transform,
        raster.epsg(),
        raster.nodata(),
    );

    let edges = collect_edges(shape);
    let mut crossings = Vec::new();
    let mut inside = 0usize;

    for row in 0..height {
        let (_, y) = transform.pixel_to_world(0.0, row as f64 + 0.5);
        crossings.clear();
        for &((x0, y0), (x1, y1)) in &edges {
            // Half-open rule so a vertex on the scanline is counted once.
            if (y0 <= y) != (y1 <= y) {
                crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let first = ((span[0] - origin_x) / res_x - 0.5).ceil().max(0.0) as usize;
            let last = (((span[1] - origin_x) / res_x - 0.5).ceil().max(0.0) as usize).min(width);
            for col in first..last {
                inside += 1;
                for band in 0..raster.bands() {
                    if let Some(v) = raster.get(band, row_start + row, col_start + col) {
                        out.set(band, row, col, v);
                    }
                }
            }
        }
    }

    tracing::debug!(width, height, inside, "Raster clipped");
    if inside == 0 {
        tracing::warn!("No pixel centre falls inside the boundary");
    }
    Ok(out)
}

type Edge = ((f64, f64), (f64, f64));

/// Every ring segment of every polygon, exteriors and holes alike.
fn collect_edges(shape: &MultiPolygon<f64>) -> Vec<Edge> {
    shape
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|ring| ring.lines())
        .filter(|line| line.start.y != line.end.y)
        .map(|line| ((line.start.x, line.start.y), (line.end.x, line.end.y)))
        .collect()
}
