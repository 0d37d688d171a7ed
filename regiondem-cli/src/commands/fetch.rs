use anyhow::{Context, Result};
use regiondem::{HttpTransport, PipelineConfig, TileFetcher, TileId};

use super::spinner;

/// Fetch one tile through the mirror list. The raw tile lands in the cache directory.
pub fn run(config: PipelineConfig, tile: &str) -> Result<bool> {
    let id = TileId::parse(tile).context("Invalid tile name")?;
    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    let fetcher = TileFetcher::new(transport, config.fetch);

    let pb = spinner(&format!("Fetching {id}"));
    let outcome = fetcher.fetch(id);
    pb.finish_and_clear();

    match outcome {
        Ok(raster) => {
            let stats = fetcher.stats();
            let origin = if stats.disk_hits > 0 { "cache" } else { "mirror" };
            println!(
                "{}: {}x{} samples from {}",
                id,
                raster.width(),
                raster.height(),
                origin
            );
            if let Some(dir) = &fetcher.config().cache_dir {
                println!("Cached at: {}", dir.join(id.hgt_filename()).display());
            }
            Ok(true)
        }
        Err(e) => {
            eprintln!("{}: not available from any mirror ({}): {}", id, e.reason(), e);
            Ok(false)
        }
    }
}
