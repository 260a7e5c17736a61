use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ActivityLog, ActivityRow, ArtifactRef, Certificate, CertificateRow, Institution, Store,
    StoreError,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                && db.constraint() == Some("certificates_verification_id_key") =>
        {
            StoreError::DuplicateVerificationId
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_institution(&self, institution: &Institution) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO institutions (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(institution.id)
            .bind(&institution.name)
            .bind(institution.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_institution(&self, id: Uuid) -> Result<Option<Institution>, StoreError> {
        let institution =
            sqlx::query_as::<_, Institution>("SELECT id, name, created_at FROM institutions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(institution)
    }

    async fn insert_certificate(&self, cert: &Certificate) -> Result<(), StoreError> {
        let (file_id, inline) = match &cert.artifact {
            ArtifactRef::Blob { file_id, .. } => (Some(file_id.as_str()), None),
            ArtifactRef::Inline { data, .. } => (None, Some(data.as_slice())),
        };

        sqlx::query(
            r#"
            INSERT INTO certificates (
                id, verification_id, institution_id, issued_by, issuer_name,
                title, description, recipient_name, recipient_email, certificate_type,
                status, issue_date, expiry_date, content_hash, anchor_tx,
                artifact_file_id, artifact_inline, artifact_content_type, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(cert.id)
        .bind(&cert.verification_id)
        .bind(cert.institution_id)
        .bind(cert.issued_by)
        .bind(&cert.issuer_name)
        .bind(&cert.title)
        .bind(&cert.description)
        .bind(&cert.recipient_name)
        .bind(&cert.recipient_email)
        .bind(cert.certificate_type.as_str())
        .bind(cert.status.as_str())
        .bind(cert.issue_date)
        .bind(cert.expiry_date)
        .bind(&cert.content_hash)
        .bind(&cert.anchor_tx)
        .bind(file_id)
        .bind(inline)
        .bind(cert.artifact.content_type())
        .bind(cert.created_at)
        .bind(cert.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StoreError> {
        sqlx::query_as::<_, CertificateRow>("SELECT * FROM certificates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Certificate::try_from)
            .transpose()
    }

    async fn find_by_verification_id(
        &self,
        verification_id: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        sqlx::query_as::<_, CertificateRow>("SELECT * FROM certificates WHERE verification_id = $1")
            .bind(verification_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Certificate::try_from)
            .transpose()
    }

    async fn update_certificate(
        &self,
        cert: &Certificate,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE certificates
            SET title = $2, description = $3, recipient_name = $4, recipient_email = $5,
                certificate_type = $6, status = $7, issue_date = $8, expiry_date = $9,
                updated_at = $10
            WHERE id = $1 AND updated_at = $11
            "#,
        )
        .bind(cert.id)
        .bind(&cert.title)
        .bind(&cert.description)
        .bind(&cert.recipient_name)
        .bind(&cert.recipient_email)
        .bind(cert.certificate_type.as_str())
        .bind(cert.status.as_str())
        .bind(cert.issue_date)
        .bind(cert.expiry_date)
        .bind(cert.updated_at)
        .bind(expected_updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn list_certificates(&self, institution_id: Uuid) -> Result<Vec<Certificate>, StoreError> {
        sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE institution_id = $1 ORDER BY created_at DESC",
        )
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Certificate::try_from)
        .collect()
    }

    async fn append_activity(&self, entry: &ActivityLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, user_id, institution_id, action, certificate_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.institution_id)
        .bind(entry.action.as_str())
        .bind(entry.certificate_id)
        .bind(entry.details.to_string())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_activity(&self, institution_id: Uuid) -> Result<Vec<ActivityLog>, StoreError> {
        sqlx::query_as::<_, ActivityRow>(
            "SELECT * FROM activity_logs WHERE institution_id = $1 ORDER BY created_at DESC",
        )
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ActivityLog::try_from)
        .collect()
    }
}
