use anyhow::{bail, Context, Result};
use regiondem::hgt::{self, SrtmResolution};
use regiondem::{PipelineConfig, TileId};
use std::path::PathBuf;

use super::format_size;

pub fn run(config: &PipelineConfig, tile: &str, json: bool) -> Result<bool> {
    let path = if tile.to_ascii_lowercase().ends_with(".hgt") {
        PathBuf::from(tile)
    } else {
        let id = TileId::parse(tile).context("Invalid tile name")?;
        cache_dir(config)?.join(id.hgt_filename())
    };

    if !path.exists() {
        bail!("Tile not found: {}", path.display());
    }

    let info = hgt::inspect(&path).context("Failed to load tile")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(true);
    }

    let resolution = match info.resolution {
        SrtmResolution::Srtm1 => "SRTM1 (~30m)",
        SrtmResolution::Srtm3 => "SRTM3 (~90m)",
        SrtmResolution::Nonstandard => "nonstandard",
    };
    let (min_lon, min_lat, max_lon, max_lat) = info.bounds;

    println!("Tile: {}", info.tile);
    println!("Path: {}", path.display());
    println!();
    println!(
        "Resolution: {} ({}x{} samples)",
        resolution, info.samples, info.samples
    );
    println!(
        "Coverage: {:.0} to {:.0} lat, {:.0} to {:.0} lon",
        min_lat, max_lat, min_lon, max_lon
    );
    println!("File size: {}", format_size(info.size as u64));
    println!();

    if info.min <= info.max {
        println!("Min elevation: {}m", info.min);
        println!("Max elevation: {}m", info.max);
    }
    if info.voids > 0 {
        let total = (info.samples * info.samples) as f64;
        println!(
            "Void samples: {} ({:.1}%)",
            info.voids,
            info.voids as f64 / total * 100.0
        );
    }
    Ok(true)
}

pub(crate) fn cache_dir(config: &PipelineConfig) -> Result<PathBuf> {
    config
        .fetch
        .cache_dir
        .clone()
        .context("No tile cache directory. Use --cache-dir or set REGIONDEM_CACHE_DIR")
}
