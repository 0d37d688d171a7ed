use anyhow::{Context, Result};
use regiondem::{HttpTransport, Pipeline, PipelineConfig, PipelineResult};

use super::spinner;

/// Run the whole pipeline. Returns `false` when the run failed.
pub fn run(config: PipelineConfig, region: &str, json: bool) -> Result<bool> {
    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    let pipeline = Pipeline::new(transport, config);

    let pb = spinner(&format!("Processing {region}"));
    let result = pipeline.run(region);
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(result.success)
}

fn print_summary(result: &PipelineResult) {
    println!("Region: {}", result.region);
    if let Some(failure) = &result.failure {
        match failure.stage {
            Some(stage) => println!(
                "Failed: all {} sources exhausted ({})",
                stage, failure.last_reason
            ),
            None => println!("Failed: {}", failure.reason),
        }
        println!("  {}", failure.message);
        return;
    }

    if let Some(source) = result.boundary_source {
        println!("Boundary: {}", source);
    }
    if let Some(source) = result.elevation_source {
        println!("Elevation: {:?}", source);
    }
    if !result.tiles.is_empty() {
        println!("Tiles: {}", result.tiles.join(", "));
    }
    if let Some(epsg) = result.target_epsg {
        println!("Projected CRS: EPSG:{}", epsg);
    }
    println!();
    for path in &result.outputs {
        println!("  {}", path.display());
    }
    let stats = &result.fetch_stats;
    println!();
    println!(
        "Tiles: {} downloaded, {} from cache, {} failed attempts",
        stats.downloads,
        stats.disk_hits + stats.memory_hits,
        stats.failed_attempts
    );
}
