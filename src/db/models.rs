use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Pending,
    Issued,
    Revoked,
    Expired,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Issued => "issued",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Expired => "expired",
        }
    }

    /// Status only moves forward: pending -> issued -> (revoked | expired),
    /// with pending -> revoked for withdrawn drafts. Staying put is allowed.
    pub fn can_transition_to(self, next: CertificateStatus) -> bool {
        use CertificateStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Issued, Issued)
                | (Revoked, Revoked)
                | (Expired, Expired)
                | (Pending, Issued)
                | (Pending, Revoked)
                | (Issued, Revoked)
                | (Issued, Expired)
        )
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CertificateStatus::Pending),
            "issued" => Ok(CertificateStatus::Issued),
            "revoked" => Ok(CertificateStatus::Revoked),
            "expired" => Ok(CertificateStatus::Expired),
            other => Err(format!("unknown certificate status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    #[default]
    Completion,
    Achievement,
    Participation,
    Degree,
    Training,
    Other,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Completion => "completion",
            CertificateType::Achievement => "achievement",
            CertificateType::Participation => "participation",
            CertificateType::Degree => "degree",
            CertificateType::Training => "training",
            CertificateType::Other => "other",
        }
    }
}

impl FromStr for CertificateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(CertificateType::Completion),
            "achievement" => Ok(CertificateType::Achievement),
            "participation" => Ok(CertificateType::Participation),
            "degree" => Ok(CertificateType::Degree),
            "training" => Ok(CertificateType::Training),
            "other" => Ok(CertificateType::Other),
            other => Err(format!("unknown certificate type '{}'", other)),
        }
    }
}

/// Where the certificate's artifact bytes live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum ArtifactRef {
    Blob {
        file_id: String,
        content_type: String,
    },
    Inline {
        content_type: String,
        #[serde(skip)]
        data: Vec<u8>,
    },
}

impl ArtifactRef {
    pub fn content_type(&self) -> &str {
        match self {
            ArtifactRef::Blob { content_type, .. } | ArtifactRef::Inline { content_type, .. } => {
                content_type
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Institution {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Certificate {
    pub id: Uuid,
    pub verification_id: String,
    pub institution_id: Uuid,
    pub issued_by: Uuid,
    pub issuer_name: String,
    pub title: String,
    pub description: Option<String>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub certificate_type: CertificateType,
    pub status: CertificateStatus,
    pub issue_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub content_hash: String,
    pub anchor_tx: Option<String>,
    pub artifact: ArtifactRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// Stored status adjusted for the calendar: an issued certificate whose
    /// expiry date has passed reads as expired.
    pub fn effective_status(&self, today: NaiveDate) -> CertificateStatus {
        match (self.status, self.expiry_date) {
            (CertificateStatus::Issued, Some(expiry)) if today > expiry => {
                CertificateStatus::Expired
            }
            (status, _) => status,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CertificateRow {
    pub id: Uuid,
    pub verification_id: String,
    pub institution_id: Uuid,
    pub issued_by: Uuid,
    pub issuer_name: String,
    pub title: String,
    pub description: Option<String>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub certificate_type: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub content_hash: String,
    pub anchor_tx: Option<String>,
    pub artifact_file_id: Option<String>,
    pub artifact_inline: Option<Vec<u8>>,
    pub artifact_content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CertificateRow> for Certificate {
    type Error = StoreError;

    fn try_from(row: CertificateRow) -> Result<Self, Self::Error> {
        let artifact = match (row.artifact_file_id, row.artifact_inline) {
            (Some(file_id), _) => ArtifactRef::Blob {
                file_id,
                content_type: row.artifact_content_type,
            },
            (None, Some(data)) => ArtifactRef::Inline {
                content_type: row.artifact_content_type,
                data,
            },
            (None, None) => {
                return Err(StoreError::Corrupt(format!(
                    "certificate {} has no artifact",
                    row.id
                )))
            }
        };

        Ok(Certificate {
            id: row.id,
            verification_id: row.verification_id,
            institution_id: row.institution_id,
            issued_by: row.issued_by,
            issuer_name: row.issuer_name,
            title: row.title,
            description: row.description,
            recipient_name: row.recipient_name,
            recipient_email: row.recipient_email,
            certificate_type: row.certificate_type.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            issue_date: row.issue_date,
            expiry_date: row.expiry_date,
            content_hash: row.content_hash,
            anchor_tx: row.anchor_tx,
            artifact,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    InstitutionCreated,
    CertificateCreated,
    CertificateUpdated,
    CertificateRevoked,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::InstitutionCreated => "institution_created",
            ActivityAction::CertificateCreated => "certificate_created",
            ActivityAction::CertificateUpdated => "certificate_updated",
            ActivityAction::CertificateRevoked => "certificate_revoked",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "institution_created" => Ok(ActivityAction::InstitutionCreated),
            "certificate_created" => Ok(ActivityAction::CertificateCreated),
            "certificate_updated" => Ok(ActivityAction::CertificateUpdated),
            "certificate_revoked" => Ok(ActivityAction::CertificateRevoked),
            other => Err(format!("unknown activity action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub institution_id: Uuid,
    pub action: ActivityAction,
    pub certificate_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct ActivityRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub institution_id: Uuid,
    pub action: String,
    pub certificate_id: Option<Uuid>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityLog {
    type Error = StoreError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(ActivityLog {
            id: row.id,
            user_id: row.user_id,
            institution_id: row.institution_id,
            action: row.action.parse().map_err(StoreError::Corrupt)?,
            certificate_id: row.certificate_id,
            details: serde_json::from_str(&row.details)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            created_at: row.created_at,
        })
    }
}
