use axum::{routing::get, Router};
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use excursion_system::{config::Config, controllers, AppState};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Excursion Booking API ({})", config.app.environment);

    // Состояние приложения: БД + миграции + сервисы
    let app_state = AppState::new(config.clone())
        .await
        .expect("Failed to initialize application state");
    info!("Database connected, migrations applied");

    // --- Start background tasks ---

    // Периодический отбор броней, которым пора напомнить о поездке
    if config.reminder.enabled {
        let reminders = app_state.reminders.clone();
        let window_hours = config.reminder.window_hours;
        let interval = Duration::from_secs(config.reminder.poll_interval_secs);
        task::spawn(async move {
            loop {
                reminders.emit_due_reminders(window_hours).await;
                tokio::time::sleep(interval).await;
            }
        });
    }

    // --- Start the web server ---

    let app = Router::new()
        .route("/", get(|| async { "Excursion Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        // Mount the routes from the controllers module
        .nest("/api", controllers::routes())
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .expect("HOST/PORT must form a valid socket address");
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server error");
}
