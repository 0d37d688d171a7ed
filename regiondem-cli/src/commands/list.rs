use anyhow::{Context, Result};
use regiondem::hgt::SrtmResolution;
use regiondem::{PipelineConfig, TileId};
use std::fs;

use super::format_size;
use super::info::cache_dir;

pub fn run(config: &PipelineConfig) -> Result<bool> {
    let dir = cache_dir(config)?;
    if !dir.exists() {
        println!("No tile cache at: {}", dir.display());
        return Ok(true);
    }

    let mut tiles: Vec<_> = fs::read_dir(&dir)
        .context("Failed to read tile cache directory")?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|e| e.eq_ignore_ascii_case("hgt"))
                .unwrap_or(false)
        })
        .collect();

    if tiles.is_empty() {
        println!("No .hgt files found in: {}", dir.display());
        return Ok(true);
    }
    tiles.sort_by_key(|e| e.file_name());

    let mut srtm1_count = 0;
    let mut srtm3_count = 0;
    let mut unknown_count = 0;
    let mut total_size: u64 = 0;

    println!("{:<12} {:>8} {:>24}", "TILE", "TYPE", "COVERAGE");
    println!("{}", "-".repeat(46));

    for entry in &tiles {
        let filename = entry.file_name();
        let filename = filename.to_string_lossy();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        total_size += size;

        let resolution = match SrtmResolution::from_len(size as usize) {
            SrtmResolution::Srtm1 => {
                srtm1_count += 1;
                "SRTM1"
            }
            SrtmResolution::Srtm3 => {
                srtm3_count += 1;
                "SRTM3"
            }
            SrtmResolution::Nonstandard => {
                unknown_count += 1;
                "???"
            }
        };

        let coverage = match TileId::parse(&filename) {
            Ok(id) => {
                let (min_lon, min_lat, max_lon, max_lat) = id.bounds();
                format!("{min_lat:.0}..{max_lat:.0}, {min_lon:.0}..{max_lon:.0}")
            }
            Err(_) => "Unknown".to_string(),
        };

        println!("{:<12} {:>8} {:>24}", filename, resolution, coverage);
    }

    println!();
    println!("Summary:");
    println!("  Total tiles: {}", tiles.len());
    if srtm1_count > 0 {
        println!("  SRTM1 (30m): {}", srtm1_count);
    }
    if srtm3_count > 0 {
        println!("  SRTM3 (90m): {}", srtm3_count);
    }
    if unknown_count > 0 {
        println!("  Unknown: {}", unknown_count);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Cache directory: {}", dir.display());

    Ok(true)
}
