//! HTTP side channel: ban status lookups and a health probe.
//!
//! Reads the same [`BanStore`] as the real-time path, so a ban is visible
//! here the moment it is issued.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::Method;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use duochat_moderation::BanStore;
use duochat_protocol::UserId;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

/// Body of `GET /check-ban/{user_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BanCheck {
    pub banned: bool,
    /// Whole seconds left, rounded up. 0 when not banned.
    pub remaining_time: u64,
}

/// Builds the HTTP router.
///
/// A non-numeric `user_id` is rejected by the path extractor with 400.
pub fn router(bans: Arc<BanStore>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/check-ban/{user_id}", get(check_ban))
        .layer(cors_layer())
        .with_state(bans)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn check_ban(
    State(bans): State<Arc<BanStore>>,
    Path(user_id): Path<u64>,
) -> Json<BanCheck> {
    let user_id = UserId(user_id);
    let status = bans.is_banned(user_id).await;
    tracing::debug!(%user_id, banned = status.banned, "ban check");
    Json(BanCheck {
        banned: status.banned,
        remaining_time: status.remaining_secs,
    })
}
