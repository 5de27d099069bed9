mod api;
mod config;
mod error;
mod eta;
mod gtfs;
mod model;
mod planner;
mod realtime;
mod reports;
mod safety;
mod walk;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api::AppState;
use config::Config;
use eta::Estimator;
use gtfs::GtfsIndex;
use planner::Planner;
use realtime::DelayCache;
use reports::{InMemoryReportStore, ReportStore};
use safety::SafetyOverlay;
use walk::{MapboxWalkProvider, WalkDirectionsProvider};

#[derive(OpenApi)]
#[openapi(
    info(title = "Transit ETA API", version = "0.1.0"),
    paths(
        api::plan::plan,
        api::eta::eta,
        api::reports::create_report,
        api::health::health_check,
    ),
    components(schemas(
        planner::PlanRequest,
        planner::Itinerary,
        planner::Leg,
        planner::LegMode,
        planner::SafetyMode,
        planner::WalkAltOption,
        walk::WalkStep,
        eta::EtaResult,
        eta::EtaSource,
        reports::CrowdReport,
        reports::CrowdReportIn,
        api::health::HealthResponse,
    )),
    tags(
        (name = "plan", description = "Door-to-door itinerary planning"),
        (name = "eta", description = "Fused next-arrival estimates"),
        (name = "reports", description = "Crowd-sourced arrival observations"),
        (name = "health", description = "Service health check"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().expect("Failed to load configuration from environment");
    tracing::info!(gtfs_dir = %config.gtfs_dir, "Loaded configuration");

    let index = Arc::new(
        GtfsIndex::load_from_dir(&config.gtfs_dir).expect("Failed to load GTFS static feed"),
    );
    tracing::info!(
        stops = index.stops.len(),
        routes = index.routes.len(),
        trips = index.trips.len(),
        "GTFS static feed loaded"
    );

    let realtime_configured = config.trip_updates_url.is_some();
    let delays = Arc::new(DelayCache::new(config.trip_updates_url.clone()));
    delays.clone().spawn(config.poll_interval());

    let safety = Arc::new(
        SafetyOverlay::load(config.danger_map_path.clone(), config.safety_zones_path.clone())
            .await,
    );

    let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());

    let walk_provider: Option<Arc<dyn WalkDirectionsProvider>> = config
        .walk_directions_token
        .clone()
        .map(|token| Arc::new(MapboxWalkProvider::new(token)) as Arc<dyn WalkDirectionsProvider>);
    if walk_provider.is_none() {
        tracing::warn!(
            "WALK_DIRECTIONS_TOKEN not set: walk legs will use straight-line estimates only"
        );
    }

    let estimator = Arc::new(Estimator::new(
        index.clone(),
        delays.clone(),
        reports.clone(),
        config.report_decay_secs,
    ));
    let planner = Arc::new(Planner::new(
        index.clone(),
        delays.clone(),
        safety.clone(),
        walk_provider.clone(),
        config.max_walk_meters,
    ));

    let state = Arc::new(AppState {
        index,
        estimator,
        planner,
        reports,
        realtime_configured,
        walk_provider,
    });

    let cors_layer = CorsLayer::permissive();

    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.bind_addr));

    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Transit ETA API"
}
