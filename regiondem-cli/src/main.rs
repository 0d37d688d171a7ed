use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regiondem::PipelineConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// Region boundary and elevation raster preparation
#[derive(Parser)]
#[command(name = "regiondem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory receiving boundary.geojson and the rasters
    #[arg(short, long, env = "REGIONDEM_OUTPUT_DIR", default_value = ".", global = true)]
    output: PathBuf,

    /// Directory holding raw .hgt tiles (defaults to <output>/tiles)
    #[arg(short, long, env = "REGIONDEM_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Log every attempted URL
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the boundary and produce the clipped, projected elevation raster
    Run {
        /// Region name, e.g. "San Joaquín"
        #[arg(short, long)]
        region: String,

        /// EPSG code of the projected raster (default: UTM zone of the region)
        #[arg(long)]
        target_epsg: Option<u32>,

        /// Skip the administrative WFS service
        #[arg(long)]
        skip_admin: bool,

        /// Override the administrative WFS endpoint
        #[arg(long)]
        admin_url: Option<String>,

        /// Override the official boundary archive URL
        #[arg(long)]
        archive_url: Option<String>,

        /// Do not write the unclipped tile mosaic
        #[arg(long)]
        no_mosaic: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Resolve the region boundary and write boundary.geojson only
    Boundary {
        /// Region name
        #[arg(short, long)]
        region: String,

        /// Skip the administrative WFS service
        #[arg(long)]
        skip_admin: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print the tiles covering a bounding box
    Plan {
        /// Bounding box as minx,miny,maxx,maxy (lon/lat)
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        /// Use every cell of the range plus a one-cell halo
        #[arg(long)]
        exhaustive: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Download one tile through the mirror list into the cache
    Fetch {
        /// Tile name, e.g. S35W072
        tile: String,
    },

    /// Display information about a cached tile
    Info {
        /// Path to .hgt file, or tile name (e.g., S35W072)
        tile: String,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List cached tiles
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = load_config(cli.output, cli.cache_dir)?;

    let ok = match cli.command {
        Commands::Run {
            region,
            target_epsg,
            skip_admin,
            admin_url,
            archive_url,
            no_mosaic,
            json,
        } => {
            let mut config = config.with_skip_admin(skip_admin).with_write_mosaic(!no_mosaic);
            if let Some(epsg) = target_epsg {
                config = config.with_target_epsg(epsg);
            }
            if let Some(url) = admin_url {
                config = config.with_admin_url(url);
            }
            if let Some(url) = archive_url {
                config = config.with_archive_url(url);
            }
            commands::run::run(config, &region, json)?
        }
        Commands::Boundary {
            region,
            skip_admin,
            json,
        } => commands::boundary::run(config.with_skip_admin(skip_admin), &region, json)?,
        Commands::Plan {
            bbox,
            exhaustive,
            json,
        } => commands::plan::run(&bbox, exhaustive, json)?,
        Commands::Fetch { tile } => commands::fetch::run(config, &tile)?,
        Commands::Info { tile, json } => commands::info::run(&config, &tile, json)?,
        Commands::List => commands::list::run(&config)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(debug: bool) {
    let default = if debug { "regiondem=debug" } else { "regiondem=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Command-line values first, then `REGIONDEM_*` variables, then defaults.
fn load_config(output: PathBuf, cache_dir: Option<PathBuf>) -> Result<PipelineConfig> {
    let config = PipelineConfig::new(&output)
        .with_env()
        .context("Invalid REGIONDEM_* environment variable")?;
    let cache_dir = cache_dir
        .or_else(|| config.fetch.cache_dir.clone())
        .unwrap_or_else(|| output.join("tiles"));
    tracing::debug!(
        output = %output.display(),
        cache_dir = %cache_dir.display(),
        mirrors = config.fetch.mirrors.len(),
        "Configuration loaded"
    );
    Ok(config.with_cache_dir(cache_dir))
}
