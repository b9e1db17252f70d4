pub mod handlers;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

use peerai_core::config::ServerConfig;

pub use handlers::ApiState;

/// Build the full application: `/ws` signaling, `/api/*` JSON, and the
/// optional static frontend.
pub fn router(state: ApiState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers));

    let mut app = Router::new()
        .route("/ws", get(handlers::handle_ws))
        .nest("/api", api_routes)
        .with_state(state);

    if let Some(dir) = &server.static_dir {
        tracing::info!(dir = %dir.display(), "serving static frontend");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(cors_layer(&server.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "invalid CORS origin ignored");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

pub async fn serve(state: ApiState, server: &ServerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", server.bind_addr, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(listener, state, server).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: ApiState,
    server: &ServerConfig,
) -> anyhow::Result<()> {
    let app = router(state, server);
    tracing::info!(addr = %listener.local_addr()?, "signaling server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
