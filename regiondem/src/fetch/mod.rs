//! Elevation tile acquisition from unreliable mirrors.

pub mod fetcher;
pub mod mirror;

pub use fetcher::{FetchStats, FetchTier, FetchedTiles, TileFetcher};
pub use mirror::{default_mirrors, skadi, Compression, Mirror};
