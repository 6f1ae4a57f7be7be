//! Minimal HTTP introspection surface (spec §4.10), adapted from the
//! teacher's `api.rs`. Read-only: it never exposes endpoint contents, only
//! aggregate counters and per-IP live-entry counts, since this server
//! carries no authentication of its own.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::registrations::LiveCounts;
use crate::stats::Stats;

struct ApiState {
    config: Arc<Config>,
    stats: Arc<Stats>,
    live_counts: LiveCounts,
    uptime: Instant,
}

async fn info(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot();
    Json(json!({
        "bind": state.config.bind.to_string(),
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "posts": snapshot.posts,
        "refreshes": snapshot.refreshes,
        "ask_hits": snapshot.ask_hits,
        "ask_misses": snapshot.ask_misses,
        "cap_evictions": snapshot.cap_evictions,
        "malformed_frames": snapshot.malformed_frames,
    }))
}

async fn registrations(Path(ip): Path<String>, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match ip.parse::<Ipv4Addr>() {
        Ok(ip) => Json(json!({ "ip": ip.to_string(), "live": state.live_counts.get(ip) })).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Start the introspection HTTP server. Binds on `config.bind`'s address
/// with the next port up, so it shares a host without colliding with the
/// UDP/TCP rendezvous port.
pub async fn start_server(config: Arc<Config>, stats: Arc<Stats>, live_counts: LiveCounts) -> anyhow::Result<()> {
    let mut api_addr = config.bind;
    api_addr.set_port(api_addr.port() + 1);

    let state = Arc::new(ApiState {
        config,
        stats,
        live_counts,
        uptime: Instant::now(),
    });

    let app = Router::new()
        .route("/info", get(info))
        .route("/registrations/{ip}", get(registrations))
        .with_state(state);

    let listener = TcpListener::bind(api_addr).await?;
    log::info!("introspection api listening on {api_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
