//! Merging tiles onto one grid.

use std::borrow::Borrow;

use crate::error::{DemError, Result};
use crate::raster::{GeoTransform, RasterDataset};

/// Merge `tiles` onto a common grid.
///
/// The grid takes its resolution, nodata value and CRS from the first tile and
/// spans the union of all extents. Each destination pixel centre is looked up
/// in the tiles in order and the first valid value wins, so earlier tiles take
/// priority along shared edges.
///
/// A single tile is returned unchanged.
///
/// # Errors
///
/// - [`DemError::EmptyResult`] when `tiles` is empty
/// - [`DemError::Geometry`] when the tiles disagree on CRS or band count
pub fn assemble<R: Borrow<RasterDataset>>(tiles: &[R]) -> Result<RasterDataset> {
    let first = match tiles.first() {
        Some(first) => first.borrow(),
        None => return Err(DemError::empty("mosaic", "no tiles to assemble")),
    };
    if tiles.len() == 1 {
        return Ok(first.clone());
    }

    for tile in &tiles[1..] {
        let tile = tile.borrow();
        if tile.epsg() != first.epsg() {
            return Err(DemError::Geometry(format!(
                "cannot mosaic EPSG:{} with EPSG:{}",
                first.epsg(),
                tile.epsg()
            )));
        }
        if tile.bands() != first.bands() {
            return Err(DemError::Geometry(format!(
                "cannot mosaic {} bands with {} bands",
                first.bands(),
                tile.bands()
            )));
        }
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = first.bounds();
    for tile in &tiles[1..] {
        let (x0, y0, x1, y1) = tile.borrow().bounds();
        min_x = min_x.min(x0);
        min_y = min_y.min(y0);
        max_x = max_x.max(x1);
        max_y = max_y.max(y1);
    }

    let res_x = first.transform().pixel_width;
    let res_y = first.transform().pixel_height.abs();
    let width = ((max_x - min_x) / res_x).round().max(1.0) as usize;
    let height = ((max_y - min_y) / res_y).round().max(1.0) as usize;
    let transform = GeoTransform::new(min_x, max_y, res_x, -res_y);

    let mut out = RasterDataset::filled(
        width,
        height,
        first.bands(),
        transform,
        first.epsg(),
        first.nodata(),
    );

    for tile in tiles {
        let tile = tile.borrow();
        let (tx0, ty0, tx1, ty1) = tile.bounds();

        // Destination window covering this tile.
        let (c0, r0) = transform.world_to_pixel(tx0, ty1);
        let (c1, r1) = transform.world_to_pixel(tx1, ty0);
        let col_start = c0.floor().max(0.0) as usize;
        let row_start = r0.floor().max(0.0) as usize;
        let col_end = (c1.ceil() as usize).min(width);
        let row_end = (r1.ceil() as usize).min(height);

        for row in row_start..row_end {
            for col in col_start..col_end {
                let (x, y) = transform.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5);
                let (sc, sr) = tile.transform().world_to_pixel(x, y);
                if sc < 0.0 || sr < 0.0 {
                    continue;
                }
                let (sc, sr) = (sc.floor() as usize, sr.floor() as usize);
                for band in 0..out.bands() {
                    let current = out.get(band, row, col).unwrap_or(out.nodata());
                    if !out.is_nodata(current) {
                        continue;
                    }
                    if let Some(value) = tile.get(band, sr, sc) {
                        if !tile.is_nodata(value) {
                            out.set(band, row, col, value);
                        }
                    }
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hgt;
    use crate::hgt::tests::synthetic_hgt;
    use crate::tile_id::TileId;

    #[test]
    fn test_single_tile_unchanged() {
        let tile = hgt::decode(TileId::new(-35, -72), &synthetic_hgt(5, |r, c| (r * c) as i16))
            .unwrap();
        let merged = assemble(&[tile.clone()]).unwrap();
        assert_eq!(merged, tile);
    }

    #[test]
    fn test_empty_input() {
        let tiles: Vec<RasterDataset> = Vec::new();
        assert!(matches!(
            assemble(&tiles),
            Err(DemError::EmptyResult { .. })
        ));
    }

    #[test]
    fn test_two_adjacent_tiles_reproduce_sources() {
        let n = 5;
        let west = hgt::decode(
            TileId::new(-35, -72),
            &synthetic_hgt(n, |r, c| (100 + r * 10 + c) as i16),
        )
        .unwrap();
        let east = hgt::decode(
            TileId::new(-35, -71),
            &synthetic_hgt(n, |r, c| (500 + r * 10 + c) as i16),
        )
        .unwrap();

        let merged = assemble(&[&west, &east]).unwrap();
        // Shared edge column counted once.
        assert_eq!(merged.width(), 2 * n - 1);
        assert_eq!(merged.height(), n);
        assert_eq!(merged.transform().origin_x, west.transform().origin_x);

        for row in 0..n {
            for col in 0..n {
                assert_eq!(merged.get(0, row, col), west.get(0, row, col));
            }
            // East tile fills everything past the shared column.
            for col in 1..n {
                assert_eq!(merged.get(0, row, n - 1 + col), east.get(0, row, col));
            }
        }
    }

    #[test]
    fn test_later_tile_fills_voids() {
        let north = hgt::decode(
            TileId::new(-34, -72),
            &synthetic_hgt(3, |r, _| if r == 2 { hgt::VOID_VALUE } else { 1 }),
        )
        .unwrap();
        let south = hgt::decode(TileId::new(-35, -72), &synthetic_hgt(3, |_, _| 2)).unwrap();

        let merged = assemble(&[north, south]).unwrap();
        assert_eq!(merged.height(), 5);
        // Row 2 is the shared edge: void in the north tile, filled from the south.
        assert_eq!(merged.get(0, 2, 0), Some(2.0));
        assert_eq!(merged.get(0, 0, 0), Some(1.0));
        assert_eq!(merged.get(0, 4, 2), Some(2.0));
    }

    #[test]
    fn test_gap_stays_nodata() {
        let a = hgt::decode(TileId::new(0, 0), &synthetic_hgt(3, |_, _| 1)).unwrap();
        let b = hgt::decode(TileId::new(0, 2), &synthetic_hgt(3, |_, _| 2)).unwrap();
        let merged = assemble(&[a, b]).unwrap();
        // Cell 0E001 was never fetched.
        assert_eq!(merged.width(), 7);
        assert!(merged.is_nodata(merged.get(0, 1, 3).unwrap()));
    }

    #[test]
    fn test_crs_mismatch() {
        let a = hgt::decode(TileId::new(0, 0), &synthetic_hgt(3, |_, _| 1)).unwrap();
        let b = RasterDataset::filled(
            3,
            3,
            1,
            GeoTransform::new(0.0, 0.0, 1.0, -1.0),
            32719,
            -32768.0,
        );
        assert!(matches!(assemble(&[a, b]), Err(DemError::Geometry(_))));
    }
}
