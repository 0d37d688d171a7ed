use anyhow::{Context, Result};
use regiondem::{HttpTransport, Pipeline, PipelineConfig};
use serde::Serialize;
use std::path::PathBuf;

use super::spinner;

#[derive(Serialize)]
struct BoundaryResponse {
    region: String,
    source: String,
    bbox: [f64; 4],
    path: PathBuf,
}

/// Resolve the boundary and write `boundary.geojson`.
pub fn run(config: PipelineConfig, region: &str, json: bool) -> Result<bool> {
    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    let pipeline = Pipeline::new(transport, config);

    let pb = spinner(&format!("Resolving boundary of {region}"));
    let outcome = pipeline.write_boundary(region);
    pb.finish_and_clear();

    let (boundary, path) = match outcome {
        Ok(found) => found,
        Err(e) => {
            eprintln!("Boundary not resolved ({}): {}", e.reason(), e);
            return Ok(false);
        }
    };

    let bbox = boundary.bbox();
    if json {
        let response = BoundaryResponse {
            region: boundary.name().to_string(),
            source: boundary.source().to_string(),
            bbox: [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat],
            path,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("Region: {}", boundary.name());
        println!("Source: {}", boundary.source());
        println!(
            "Extent: {:.4},{:.4} to {:.4},{:.4}",
            bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
        );
        println!("Output written to: {}", path.display());
    }
    Ok(true)
}
