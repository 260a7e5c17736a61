use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ArtifactFormat;
use crate::db::{Certificate, CertificateStatus, CertificateType};
use crate::raster::CertificateDesign;

/// Issuance request. Text fields default to empty so that missing values are
/// reported by validation alongside every other problem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewCertificate {
    pub institution_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub certificate_type: CertificateType,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub issue_date: String,
    pub expiry_date: Option<String>,
    /// `pending` or `issued` (default).
    pub status: Option<CertificateStatus>,
    /// Overrides the configured artifact format.
    pub format: Option<ArtifactFormat>,
    /// Only used for image artifacts.
    pub design: Option<CertificateDesign>,
}

/// Metadata and status changes. Empty `description` or `expiry_date`
/// clears the field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateCertificate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub certificate_type: Option<CertificateType>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
    pub status: Option<CertificateStatus>,
}

/// A file supplied by the issuer in place of a rendered artifact.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInstitution {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub verification_url: String,
    /// `data:image/png;base64,...` for image artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_data_url: Option<String>,
}

/// Fields safe to show anyone holding the verification link.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationView {
    pub verification_id: String,
    pub verification_url: String,
    pub title: String,
    pub description: Option<String>,
    pub recipient_name: String,
    pub institution_name: String,
    pub issuer_name: String,
    pub certificate_type: CertificateType,
    pub status: CertificateStatus,
    pub valid: bool,
    pub issue_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub content_hash: String,
    pub anchor_tx: Option<String>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnchorCheck {
    pub transaction_id: String,
    /// `None` when no anchor service is configured to ask.
    pub confirmed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub verification_id: String,
    pub stored_hash: String,
    pub computed_hash: String,
    pub intact: bool,
    pub anchor: Option<AnchorCheck>,
}

#[derive(Debug, Clone)]
pub struct ArtifactDownload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}
