use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo::{polygon, MultiPolygon};

use regiondem::raster::{clip, mosaic, reproject};
use regiondem::{hgt, BoundaryGeometry, BoundarySource, RasterDataset, TileId};

const SRTM3_SAMPLES: usize = 1201;

/// Decode a synthetic SRTM3 tile with a simple elevation gradient.
fn create_tile(id: TileId) -> RasterDataset {
    let mut data = Vec::with_capacity(SRTM3_SAMPLES * SRTM3_SAMPLES * 2);
    for row in 0..SRTM3_SAMPLES {
        for col in 0..SRTM3_SAMPLES {
            let elev = ((row + col) % 4000) as i16;
            data.extend_from_slice(&elev.to_be_bytes());
        }
    }
    hgt::decode(id, &data).unwrap()
}

fn boundary() -> BoundaryGeometry {
    let shape = polygon![
        (x: -71.9, y: -34.9),
        (x: -71.1, y: -34.8),
        (x: -70.6, y: -34.4),
        (x: -71.2, y: -34.1),
        (x: -71.8, y: -34.3),
        (x: -71.9, y: -34.9),
    ];
    BoundaryGeometry::new(
        MultiPolygon(vec![shape]),
        4326,
        BoundarySource::AdminService,
        "BENCH",
    )
    .unwrap()
}

fn bench_mosaic(c: &mut Criterion) {
    let west = create_tile(TileId::new(-35, -72));
    let east = create_tile(TileId::new(-35, -71));

    c.bench_function("mosaic_two_srtm3_tiles", |b| {
        b.iter(|| black_box(mosaic::assemble(&[&west, &east]).unwrap()));
    });
}

fn bench_clip(c: &mut Criterion) {
    let merged = mosaic::assemble(&[
        create_tile(TileId::new(-35, -72)),
        create_tile(TileId::new(-35, -71)),
    ])
    .unwrap();
    let region = boundary();

    c.bench_function("clip_polygon_two_tiles", |b| {
        b.iter(|| black_box(clip::clip(&merged, &region).unwrap()));
    });
}

fn bench_reproject(c: &mut Criterion) {
    let tile = create_tile(TileId::new(-35, -72));
    let clipped = clip::clip(&tile, &boundary()).unwrap();

    let mut group = c.benchmark_group("reproject");
    group.sample_size(10);
    group.bench_function("clipped_tile_to_utm", |b| {
        b.iter(|| black_box(reproject::reproject(&clipped, 32719).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_mosaic, bench_clip, bench_reproject);
criterion_main!(benches);
