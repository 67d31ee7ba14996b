use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::routes;
use crate::api::state::AppState;
use crate::core::{AppConfig, InMemoryRateLimiter};

/// How often expired admission-gate entries are swept.
const GATE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub fn app(shared_state: Arc<RwLock<AppState>>) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        // API routes
        .nest("/api", routes::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::clone(&shared_state))
}

// Run the server
pub async fn serve(host: String, port: String, config: AppConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                format! {
                    "{}=debug,tower_http=debug,axum::rejection=trace",
                    env!("CARGO_CRATE_NAME")
                }
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let chat_gate = Arc::new(InMemoryRateLimiter::new(config.chat_rate_limit));
    let calendar_gate = Arc::new(InMemoryRateLimiter::new(config.calendar_rate_limit));

    // Sweep expired admission entries in the background so the store
    // doesn't grow with every identity ever seen.
    let sweep_gates = [Arc::clone(&chat_gate), Arc::clone(&calendar_gate)];
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(GATE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            for gate in &sweep_gates {
                gate.cleanup();
            }
        }
    });

    let app_state = AppState::with_gates(config, chat_gate, calendar_gate);
    let shared_state = Arc::new(RwLock::new(app_state));
    let app = app(Arc::clone(&shared_state));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .expect("Failed to bind server address");

    tracing::debug!(
        "Server started. Listening on {}",
        listener.local_addr().expect("Failed to read local address")
    );

    axum::serve(listener, app).await.expect("Server error");
}
