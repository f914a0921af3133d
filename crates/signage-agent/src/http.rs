//! Local read-only status API.
//!
//! One endpoint, loopback by default: `GET /api/state` returns the
//! agent's current snapshot. Handy for fleet health checks over SSH and
//! for poking at a misbehaving unit without touching playback.

use axum::{extract::State, response::Json, routing::get, Router};
use signage_core::state::{AgentState, StateManager};
use tokio::net::TcpListener;
use tracing::{error, info};

pub fn start_server(
    bind_address: String,
    port: u16,
    state: StateManager,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = Router::new()
            .route("/api/state", get(get_state))
            .with_state(state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind status API to {}: {}", addr, e);
                return;
            }
        };

        info!("Status API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("Status API error: {}", e);
        }
    })
}

async fn get_state(State(state): State<StateManager>) -> Json<AgentState> {
    Json(state.get_state().await)
}
