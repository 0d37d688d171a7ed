use anyhow::{Context, Result};
use regiondem::{plan, BoundingBox, PlanMode};

pub fn run(bbox: &str, exhaustive: bool, json: bool) -> Result<bool> {
    let bbox = BoundingBox::parse_xy(bbox)
        .with_context(|| format!("Invalid bounding box '{}', expected minx,miny,maxx,maxy", bbox))?;
    let mode = if exhaustive {
        PlanMode::Exhaustive
    } else {
        PlanMode::Corners
    };

    let tiles: Vec<String> = plan(&bbox, mode).iter().map(|t| t.to_string()).collect();
    if json {
        println!("{}", serde_json::to_string(&tiles)?);
    } else {
        for tile in &tiles {
            println!("{}", tile);
        }
    }
    Ok(true)
}
