use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flymap::{
    markers::{Diff, MarkerEngine, MarkerStyle, Rebuild, ReconcileInput, ReconcileStrategy},
    overlay::SpatialOverlayCache,
    surface::{HeadlessSurface, MapSurface},
    types::{Event, LandingSite, ReferenceLocation, lat_lon},
};
use geo::{Coord, Rect};
use rand::{Rng, rng};

const STYLE: MarkerStyle = MarkerStyle {
    dimmed_opacity: 0.35,
    description_limit: 120,
};

fn random_events(count: usize) -> Vec<Event> {
    let mut rng = rng();
    (0..count)
        .map(|n| Event {
            id: n.to_string().as_str().into(),
            lat: Some(rng.random_range(45.0..55.0_f64).to_string()),
            lon: Some(rng.random_range(5.0..15.0_f64).to_string()),
            title: format!("Event {n}"),
            description: "Fly-in with breakfast and vintage aircraft on display".to_string(),
            event_type: Some(if n % 3 == 0 { "airshow" } else { "fly-in" }.to_string()),
            ..Default::default()
        })
        .collect()
}

fn random_sites(count: usize) -> Vec<LandingSite> {
    let mut rng = rng();
    (0..count)
        .map(|n| LandingSite {
            icao_code: format!("X{n:05}"),
            iata_code: None,
            name: format!("Airfield {n}"),
            lat: rng.random_range(35.0..70.0),
            lon: rng.random_range(-10.0..30.0),
            site_type: "small_airport".to_string(),
            municipality: None,
            country: None,
        })
        .collect()
}

pub fn reconcile_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let reference = ReferenceLocation::Device {
        position: lat_lon(50.0, 10.0),
    };

    for count in [100, 1_000, 5_000] {
        let events = random_events(count);
        let strategies: [(&str, fn() -> Box<dyn ReconcileStrategy>); 2] = [
            ("rebuild", || Box::new(Rebuild) as Box<dyn ReconcileStrategy>),
            ("diff", || Box::new(Diff) as Box<dyn ReconcileStrategy>),
        ];

        for (name, strategy) in strategies {
            let mut surface = HeadlessSurface::new(1024, 768);
            surface.initialize(lat_lon(50.0, 10.0), 6).unwrap();
            let mut engine = MarkerEngine::with_strategy(STYLE, strategy());
            let mut radius = 0.0;

            group.sample_size(20);
            group.bench_with_input(BenchmarkId::new(name, count), &events, |b, events| {
                b.iter(|| {
                    // Alternate the radius so every pass has something to change.
                    radius = if radius == 0.0 { 200.0 } else { 0.0 };
                    engine.reconcile(
                        &mut surface,
                        &ReconcileInput {
                            events,
                            category: None,
                            reference: Some(&reference),
                            radius_km: radius,
                        },
                    )
                })
            });
        }
    }

    group.finish();
}

pub fn overlay_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlay");
    let view = Rect::new(Coord { x: 8.0, y: 47.0 }, Coord { x: 12.0, y: 50.0 });

    for count in [1_000, 20_000] {
        let mut overlay = SpatialOverlayCache::new(0.1);
        overlay.enable();
        overlay.load_finished(Ok(random_sites(count)), None);

        group.bench_with_input(BenchmarkId::new("settle", count), &view, |b, view| {
            b.iter(|| overlay.on_settled(view))
        });
    }

    group.finish();
}

criterion_group!(benches, reconcile_strategies, overlay_filter);
criterion_main!(benches);
