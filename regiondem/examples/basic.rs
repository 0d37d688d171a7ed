//! Basic example demonstrating regiondem library usage.
//!
//! Run with: cargo run --example basic -- "San Joaquín" ./out

use regiondem::{DemError, HttpTransport, Pipeline, PipelineConfig};
use std::env;

fn main() -> Result<(), DemError> {
    let mut args = env::args().skip(1);
    let region = args.next().unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- <region> [output-dir]");
        std::process::exit(1);
    });
    let output_dir = args.next().unwrap_or_else(|| "./out".to_string());

    let config = PipelineConfig::new(&output_dir).with_cache_dir(format!("{output_dir}/tiles"));
    let pipeline = Pipeline::new(HttpTransport::new()?, config);

    let result = pipeline.run(&region);

    println!("Region: {}", result.region);
    println!("{:-<50}", "");
    match &result.failure {
        None => {
            println!("Boundary source:  {:?}", result.boundary_source);
            println!("Elevation source: {:?}", result.elevation_source);
            println!("Tiles:            {}", result.tiles.join(", "));
            if let Some(epsg) = result.target_epsg {
                println!("Projected CRS:    EPSG:{epsg}");
            }
            println!("\nOutputs:");
            for path in &result.outputs {
                println!("  {}", path.display());
            }
        }
        Some(failure) => {
            println!("Failed ({}): {}", failure.reason, failure.message);
        }
    }

    let stats = &result.fetch_stats;
    println!("\nTile statistics:");
    println!("  Memory hits: {}", stats.memory_hits);
    println!("  Disk hits: {}", stats.disk_hits);
    println!("  Downloads: {}", stats.downloads);
    println!("  Failed attempts: {}", stats.failed_attempts);

    Ok(())
}
