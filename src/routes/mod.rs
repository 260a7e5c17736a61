mod api;
mod pages;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Multipart framing and the metadata part on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(api::health))
        .route("/verify/:verification_id", get(pages::verify_page))
        .route("/verify/:verification_id/artifact", get(pages::download_artifact))
        .route("/api/verify/:verification_id", get(api::verify))
        .route("/api/verify/:verification_id/integrity", get(api::integrity))
        .route("/api/institutions", post(api::create_institution))
        .route("/api/institutions/:id/certificates", get(api::list_certificates))
        .route("/api/institutions/:id/activity", get(api::list_activity))
        .route("/api/certificates", post(api::create_certificate))
        .route("/api/certificates/upload", post(api::upload_certificate))
        .route(
            "/api/certificates/:id",
            get(api::get_certificate).patch(api::update_certificate),
        )
        .route(
            "/api/certificates/:id/verification",
            get(api::certificate_verification),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
