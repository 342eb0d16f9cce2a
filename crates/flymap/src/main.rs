use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use flymap::{
    MapConfig, MapError,
    error::OverlayError,
    geocoding::{GeocodingClient, NominatimSearch},
    markers::{Diff, MarkerEngine, Rebuild, ReconcileInput, ReconcileStrategy},
    overlay::{GlyphSize, HttpSiteSource, SiteSource, SpatialOverlayCache},
    surface::{HeadlessSurface, MapSurface},
    types::{Event, ReferenceLocation, lat_lon},
};
use geo::{Coord, Point, Rect};
use tokio::task::LocalSet;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;

#[derive(Parser)]
struct Cli {
    /// Read settings from <FILE> (JSON). Missing keys keep their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Resolve a place name to coordinates
    Geocode {
        query: String,

        /// Comma separated country codes. Disables the worldwide fallback.
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Fetch landing sites and filter them like the overlay does
    Sites {
        /// Dataset endpoint. Defaults to 'sites_url' from the config.
        #[arg(short, long)]
        url: Option<String>,

        /// Viewport as 'minLon,minLat,maxLon,maxLat'
        #[arg(short, long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<Rect>,

        #[arg(short, long)]
        zoom: Option<u8>,
    },
    /// Reconcile an event list on a headless map and print the markers
    Markers {
        /// JSON array of events
        events: PathBuf,

        /// Reference location as 'LAT,LON'
        #[arg(short, long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        reference: Option<Point>,

        /// Radius around the reference in km
        #[arg(long, value_name = "KM", default_value_t = 0.0)]
        radius: f64,

        #[arg(short = 't', long)]
        category: Option<String>,

        /// Use the diffing reconcile strategy
        #[arg(short, long)]
        diff: bool,
    },
}

fn parse_numbers<const N: usize>(raw: &str) -> Result<[f64; N], String> {
    let numbers = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|err| format!("'{part}': {err}")))
        .collect::<Result<Vec<_>, _>>()?;

    numbers
        .try_into()
        .map_err(|numbers: Vec<f64>| format!("expected {N} numbers, got {}", numbers.len()))
}

fn parse_bbox(raw: &str) -> Result<Rect, String> {
    let [min_lon, min_lat, max_lon, max_lat] = parse_numbers::<4>(raw)?;
    Ok(Rect::new(
        Coord {
            x: min_lon,
            y: min_lat,
        },
        Coord {
            x: max_lon,
            y: max_lat,
        },
    ))
}

fn parse_lat_lon(raw: &str) -> Result<Point, String> {
    let [lat, lon] = parse_numbers::<2>(raw)?;
    Ok(lat_lon(lat, lon))
}

fn main() -> ExitCode {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish()
        .with(tracing_tracy::TracyLayer::default());

    tracing::subscriber::set_global_default(subscriber).expect("tracing subscriber already set");
    tracing_log::LogTracer::init().expect("log tracer already set");

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match LocalSet::new().block_on(&runtime, run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), MapError> {
    let config = match &cli.config {
        Some(path) => MapConfig::from_path(path)?,
        None => MapConfig::default(),
    };

    match cli.command {
        Commands::Geocode { query, region } => {
            let client = GeocodingClient::new(
                NominatimSearch::new(&config.geocoder)?,
                config.geocoder.country_codes(),
            );
            let place = client.resolve(&query, region.as_deref()).await?;

            println!(
                "{:.6},{:.6}\t{}",
                place.position.y(),
                place.position.x(),
                place.display_name
            );
        }
        Commands::Sites { url, bbox, zoom } => {
            let url = url
                .or_else(|| config.sites_url.clone())
                .ok_or(OverlayError::NotConfigured)?;
            let source = HttpSiteSource::new(
                url,
                &config.geocoder.user_agent,
                config.geocoder.timeout(),
            )?;
            let sites = source.fetch_sites(None).await?;

            let bounds = bbox.unwrap_or(Rect::new(
                Coord { x: -180.0, y: -90.0 },
                Coord { x: 180.0, y: 90.0 },
            ));
            let mut overlay = SpatialOverlayCache::new(config.overlay_padding);
            overlay.enable();
            overlay.load_finished(Ok(sites), Some(&bounds));
            let glyph = GlyphSize::for_zoom(zoom.unwrap_or(config.initial_zoom));

            info!(
                "{} of {} landing sites, glyph {}px",
                overlay.subset().len(),
                overlay.master_len(),
                glyph.pixels()
            );
            for site in overlay.subset() {
                println!(
                    "{}\t{:.6},{:.6}\t{}",
                    site.icao_code, site.lat, site.lon, site.name
                );
            }
        }
        Commands::Markers {
            events: path,
            reference,
            radius,
            category,
            diff,
        } => {
            let raw = std::fs::read_to_string(&path).map_err(|source| MapError::Events {
                path: path.clone(),
                source,
            })?;
            let events: Vec<Event> = serde_json::from_str(&raw)
                .map_err(|source| MapError::EventsFormat { path, source })?;

            let mut surface = HeadlessSurface::new(1024, 768);
            surface.initialize(config.initial_center(), config.initial_zoom)?;
            let strategy: Box<dyn ReconcileStrategy> = if diff {
                Box::new(Diff)
            } else {
                Box::new(Rebuild)
            };
            let mut engine = MarkerEngine::with_strategy(config.marker_style(), strategy);
            let reference = reference.map(|position| ReferenceLocation::Custom {
                position,
                label: "command line".to_string(),
            });

            engine.reconcile(
                &mut surface,
                &ReconcileInput {
                    events: &events,
                    category: category.as_deref(),
                    reference: reference.as_ref(),
                    radius_km: radius,
                },
            );

            let mut markers: Vec<_> = engine.registry().iter().collect();
            markers.sort_by(|(l, _), (r, _)| l.cmp(r));
            info!("{} of {} events mapped", markers.len(), events.len());
            for (id, marker) in markers {
                println!(
                    "{id}\t{:.6},{:.6}\t{:.2}\t{}",
                    marker.position.y(),
                    marker.position.x(),
                    marker.opacity,
                    marker.callout.title
                );
            }
        }
    }

    Ok(())
}
