use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use calendar_cell::GoogleCalendarClient;
use meeting_room_cell::DailyRoomClient;
use notification_cell::HttpMailer;
use scheduling_cell::BookingOrchestrator;
use shared_config::AppConfig;
use shared_database::PostgrestClient;
use webhook_cell::{ReprocessingTool, WebhookLedger, WebhookProcessor};

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Solace booking API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Wire up the services once at startup; routers receive constructed
    // components rather than building their own per request.
    let storage = Arc::new(PostgrestClient::new(&config));

    let calendar = Arc::new(
        GoogleCalendarClient::new(&config).expect("calendar provider configuration is incomplete"),
    );
    let rooms = Arc::new(
        DailyRoomClient::new(&config).expect("meeting room provider configuration is incomplete"),
    );
    let notifier =
        Arc::new(HttpMailer::new(&config).expect("notification configuration is incomplete"));

    let orchestrator = Arc::new(
        BookingOrchestrator::new(
            &config,
            Arc::clone(&storage),
            rooms,
            calendar,
            notifier,
        )
        .expect("scheduling configuration is invalid"),
    );

    let ledger = WebhookLedger::new(Arc::clone(&storage));
    let processor = Arc::new(WebhookProcessor::new(ledger, Arc::clone(&orchestrator)));
    let reprocessor = Arc::new(ReprocessingTool::new(Arc::clone(&processor)));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(Arc::new(config), orchestrator, processor, reprocessor)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
