use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::Caller;
use crate::certificates::{
    IntegrityReport, IssuedCertificate, NewCertificate, NewInstitution, UpdateCertificate,
    UploadedFile, VerificationView,
};
use crate::db::{ActivityLog, Certificate, Institution};
use crate::error::{ApiError, CertError, ErrorCode};
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(verification_id): Path<String>,
) -> Result<Json<VerificationView>, ApiError> {
    Ok(Json(state.service.verify(&verification_id).await?))
}

pub async fn integrity(
    State(state): State<Arc<AppState>>,
    Path(verification_id): Path<String>,
) -> Result<Json<IntegrityReport>, ApiError> {
    Ok(Json(state.service.check_integrity(&verification_id).await?))
}

pub async fn create_institution(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<NewInstitution>, JsonRejection>,
) -> Result<(StatusCode, Json<Institution>), ApiError> {
    let Json(input) = payload.map_err(json_error)?;
    let institution = state.service.create_institution(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(institution)))
}

pub async fn list_certificates(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<Certificate>>, ApiError> {
    let institution_id = parse_id(&id)?;
    Ok(Json(state.service.list(&caller, institution_id).await?))
}

pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActivityLog>>, ApiError> {
    let institution_id = parse_id(&id)?;
    Ok(Json(state.service.activity(&caller, institution_id).await?))
}

pub async fn create_certificate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<NewCertificate>, JsonRejection>,
) -> Result<(StatusCode, Json<IssuedCertificate>), ApiError> {
    let Json(input) = payload.map_err(json_error)?;
    let issued = state.service.create(&caller, input, None).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// Multipart issuance: a `metadata` part holding the JSON request and a
/// `file` part that becomes the artifact as-is.
pub async fn upload_certificate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IssuedCertificate>), ApiError> {
    let mut metadata: Option<NewCertificate> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        if name == "metadata" {
            let text = field.text().await.map_err(multipart_error)?;
            let parsed = serde_json::from_str(&text).map_err(|e| {
                ApiError::new(
                    ErrorCode::InvalidRequestBody,
                    format!("metadata is not a valid certificate request: {}", e),
                )
            })?;
            metadata = Some(parsed);
        } else if name == "file" {
            let filename = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .map(str::to_string)
                .or_else(|| {
                    filename
                        .as_deref()
                        .and_then(|f| mime_guess::from_path(f).first_raw())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let bytes = field.bytes().await.map_err(multipart_error)?;
            file = Some(UploadedFile {
                bytes: bytes.to_vec(),
                content_type,
                filename,
            });
        }
    }

    let metadata = metadata.ok_or_else(|| {
        ApiError::new(ErrorCode::InvalidRequestBody, "missing 'metadata' part")
    })?;
    let file = file.ok_or_else(|| ApiError::from(CertError::invalid("file", "is required")))?;

    let issued = state.service.create(&caller, metadata, Some(file)).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

pub async fn get_certificate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Certificate>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.get(&caller, id).await?))
}

pub async fn certificate_verification(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<VerificationView>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.verify_by_id(&caller, id).await?))
}

pub async fn update_certificate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateCertificate>, JsonRejection>,
) -> Result<Json<Certificate>, ApiError> {
    let id = parse_id(&id)?;
    let Json(patch) = payload.map_err(json_error)?;
    Ok(Json(state.service.update(&caller, id, patch).await?))
}

/// Malformed internal ids are reported like unknown ones.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::from(CertError::NotFound))
}

fn json_error(rejection: JsonRejection) -> ApiError {
    ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(ErrorCode::PayloadTooLarge, "upload exceeds the size limit")
    } else {
        ApiError::new(ErrorCode::InvalidRequestBody, err.body_text())
    }
}
