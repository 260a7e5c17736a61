use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
};
use std::sync::Arc;
use tera::Context;

use crate::error::{ApiError, CertError};
use crate::state::AppState;
use crate::templates::{NOT_FOUND_PAGE, VERIFY_PAGE};

/// Human-readable verification page, the target of the QR code.
pub async fn verify_page(
    State(state): State<Arc<AppState>>,
    Path(verification_id): Path<String>,
) -> impl IntoResponse {
    match state.service.verify(&verification_id).await {
        Ok(view) => {
            let mut ctx = Context::new();
            ctx.insert("cert", &view);
            render_template(&state, VERIFY_PAGE, ctx).into_response()
        }
        Err(CertError::NotFound) => {
            let mut ctx = Context::new();
            ctx.insert("verification_id", &verification_id);
            (StatusCode::NOT_FOUND, render_template(&state, NOT_FOUND_PAGE, ctx)).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(verification_id): Path<String>,
) -> impl IntoResponse {
    match state.service.artifact(&verification_id).await {
        Ok(download) => (
            [
                (header::CONTENT_TYPE, download.content_type),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"{}\"", download.filename),
                ),
            ],
            download.bytes,
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn render_template(state: &AppState, name: &str, ctx: Context) -> Html<String> {
    let rendered = state.tera.render(name, &ctx).unwrap_or_else(|e| {
        tracing::error!("Failed to render template {}: {}", name, e);
        format!("Template error: {}", name)
    });
    Html(rendered)
}
