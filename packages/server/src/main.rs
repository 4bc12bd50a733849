use anyhow::Context;
use axum::http::{self, HeaderValue, Method};
use dotenvy::dotenv;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use werewolf_server::{app, state::AppState, utils::config::CONFIG};

// ログ出力の設定
fn init_logger() {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter_module("werewolf_server", LevelFilter::Debug)
        .filter_module("tower_http", LevelFilter::Debug)
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .format_target(true)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // CONFIGを最初に読む前に.envを読み込む
    if let Err(e) = dotenv() {
        eprintln!("Warning: failed to load .env: {}", e);
    }

    init_logger();
    // リクエストのスパンはtracing、それ以外はlogで出力
    if let Err(e) = tracing::subscriber::set_global_default(tracing_subscriber::fmt().finish()) {
        warn!("Tracing subscriber was not installed: {e}");
    }

    let origin = CONFIG
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid CORS_ORIGIN {}", CONFIG.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin([origin])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([http::header::CONTENT_TYPE]);

    let state = AppState::new();
    let app = app::create_app_with_state(state.clone())
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
                tracing::info_span!(
                    "HTTP request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        );

    let listener = tokio::net::TcpListener::bind(&CONFIG.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", CONFIG.server_addr))?;
    info!("Server listening on http://{}", CONFIG.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    state.shutdown();
    info!("Server stopped");
    Ok(())
}
