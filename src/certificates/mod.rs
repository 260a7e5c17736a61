//! Certificate lifecycle: issuance, updates, lookups and public verification.
//!
//! Every operation authorizes the caller before touching renderers, blob
//! storage or the database. Artifacts written during a failed issuance are
//! removed again so storage never holds bytes without a certificate row.

mod types;
pub mod validation;

pub use types::*;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use image::DynamicImage;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::activity::ActivitySink;
use crate::anchor::AnchorService;
use crate::artifact::{ArtifactFormat, RenderError, RenderedArtifact};
use crate::auth::Caller;
use crate::db::{
    ActivityAction, ActivityLog, ArtifactRef, Certificate, CertificateStatus, Institution,
    Store, StoreError,
};
use crate::error::CertError;
use crate::fonts::Fonts;
use crate::hashing::{hash_matches, sha256_hex};
use crate::pdf::{PdfCertificate, PdfRenderer};
use crate::raster::{CertificateDesign, ImageCertificate, ImageRenderer, LogoLoader};
use crate::storage::BlobStore;
use crate::verification::{generate_verification_id, is_verification_id, verification_url};
use validation::ValidCertificate;

/// A colliding verification id gets one fresh token before issuance gives up.
const MAX_INSERT_ATTEMPTS: usize = 2;
/// Conditional writes that lose a race re-read and re-apply the patch.
const MAX_UPDATE_ATTEMPTS: usize = 3;
const MAX_INSTITUTION_NAME: usize = 200;

pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone)]
pub struct IssuanceSettings {
    /// Public origin used to build verification links.
    pub base_url: String,
    pub default_format: ArtifactFormat,
    /// Keep generated artifacts in the certificate row instead of blob storage.
    pub inline_artifacts: bool,
    pub max_upload_bytes: usize,
}

pub struct CertificateService {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    pdf: PdfRenderer,
    images: ImageRenderer,
    logos: LogoLoader,
    anchor: Option<Arc<dyn AnchorService>>,
    activity: ActivitySink,
    settings: IssuanceSettings,
    generate_id: IdGenerator,
}

impl CertificateService {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        fonts: Arc<Fonts>,
        logos: LogoLoader,
        activity: ActivitySink,
        settings: IssuanceSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            pdf: PdfRenderer::new(fonts.clone()),
            images: ImageRenderer::new(fonts),
            logos,
            anchor: None,
            activity,
            settings,
            generate_id: Arc::new(generate_verification_id),
        }
    }

    pub fn with_anchor(mut self, anchor: Arc<dyn AnchorService>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_id_generator(mut self, generate_id: IdGenerator) -> Self {
        self.generate_id = generate_id;
        self
    }

    pub async fn create_institution(
        &self,
        caller: &Caller,
        input: NewInstitution,
    ) -> Result<Institution, CertError> {
        if !caller.is_admin() {
            return Err(CertError::Forbidden);
        }
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CertError::invalid("name", "is required"));
        }
        if name.chars().count() > MAX_INSTITUTION_NAME {
            return Err(CertError::invalid(
                "name",
                format!("must be at most {} characters", MAX_INSTITUTION_NAME),
            ));
        }

        let institution = Institution {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_institution(&institution).await?;
        info!("Created institution {} ({})", institution.name, institution.id);
        self.activity.record(
            caller.user_id,
            institution.id,
            ActivityAction::InstitutionCreated,
            None,
            json!({ "name": institution.name }),
        );
        Ok(institution)
    }

    /// Issue a certificate. With `upload` the supplied file becomes the
    /// artifact; otherwise one is rendered in the requested format.
    pub async fn create(
        &self,
        caller: &Caller,
        input: NewCertificate,
        upload: Option<UploadedFile>,
    ) -> Result<IssuedCertificate, CertError> {
        let institution_id = input
            .institution_id
            .ok_or_else(|| CertError::invalid("institution_id", "is required"))?;
        if !caller.can_manage(institution_id) {
            return Err(CertError::Forbidden);
        }

        let valid = validation::validate_new(&input, upload.as_ref(), self.settings.max_upload_bytes)?;
        let institution = self
            .store
            .get_institution(institution_id)
            .await?
            .ok_or_else(|| CertError::invalid("institution_id", "unknown institution"))?;

        let id = Uuid::new_v4();
        let format = valid.format.unwrap_or(self.settings.default_format);
        let logo = match &upload {
            None if format == ArtifactFormat::Png => self.load_logo(&valid.design, id).await,
            _ => None,
        };
        let (folder, inline) = match &upload {
            Some(_) => (format!("uploads/{}", institution.id), false),
            None => (
                format!("certificates/{}", institution.id),
                self.settings.inline_artifacts,
            ),
        };

        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            let verification_id = (self.generate_id)();
            let url = verification_url(&self.settings.base_url, &verification_id);

            let artifact = match &upload {
                Some(file) => RenderedArtifact::new(file.bytes.clone(), file.content_type.clone()),
                None => {
                    self.render(format, &valid, &institution, id, &url, logo.clone())
                        .await?
                }
            };
            let artifact_ref = self.persist_artifact(&artifact, &folder, inline).await?;
            let anchor_tx = self.anchor_hash(&artifact.content_hash, id).await;

            let now = Utc::now().trunc_subsecs(6);
            let cert = Certificate {
                id,
                verification_id: verification_id.clone(),
                institution_id: institution.id,
                issued_by: caller.user_id,
                issuer_name: caller.display_name.clone(),
                title: valid.title.clone(),
                description: valid.description.clone(),
                recipient_name: valid.recipient_name.clone(),
                recipient_email: valid.recipient_email.clone(),
                certificate_type: valid.certificate_type,
                status: valid.status,
                issue_date: valid.issue_date,
                expiry_date: valid.expiry_date,
                content_hash: artifact.content_hash.clone(),
                anchor_tx,
                artifact: artifact_ref,
                created_at: now,
                updated_at: now,
            };

            match self.store.insert_certificate(&cert).await {
                Ok(()) => {
                    info!(
                        "Issued certificate {} for institution {} (verification id {})",
                        cert.id, cert.institution_id, cert.verification_id
                    );
                    self.activity.record(
                        caller.user_id,
                        cert.institution_id,
                        ActivityAction::CertificateCreated,
                        Some(cert.id),
                        json!({
                            "title": cert.title,
                            "verification_id": cert.verification_id,
                            "content_hash": cert.content_hash,
                        }),
                    );
                    return Ok(IssuedCertificate {
                        certificate: cert,
                        verification_url: url,
                        preview_data_url: artifact.data_url,
                    });
                }
                Err(StoreError::DuplicateVerificationId) if attempt < MAX_INSERT_ATTEMPTS => {
                    warn!(
                        "Verification id {} already taken, retrying certificate {} with a new one",
                        verification_id, id
                    );
                    self.discard_artifact(&cert.artifact).await;
                }
                Err(e) => {
                    self.discard_artifact(&cert.artifact).await;
                    return Err(e.into());
                }
            }
        }

        Err(CertError::Internal(format!(
            "no unique verification id for certificate {} after {} attempts",
            id, MAX_INSERT_ATTEMPTS
        )))
    }

    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: UpdateCertificate,
    ) -> Result<Certificate, CertError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let found = self.store.get_certificate(id).await?;
            let existing = authorize(caller, found, Caller::can_manage)?;

            let mut updated = validation::apply_update(&existing, &patch)?;
            updated.updated_at = next_revision(existing.updated_at);
            match self.store.update_certificate(&updated, existing.updated_at).await {
                Ok(()) => {
                    self.record_update(caller, &existing, &updated);
                    return Ok(updated);
                }
                Err(StoreError::Conflict) => warn!(
                    "Certificate {} changed while updating (attempt {}), re-reading",
                    id, attempt
                ),
                Err(e) => return Err(e.into()),
            }
        }
        Err(CertError::Conflict)
    }

    fn record_update(&self, caller: &Caller, existing: &Certificate, updated: &Certificate) {
        let action = if updated.status == CertificateStatus::Revoked
            && existing.status != CertificateStatus::Revoked
        {
            ActivityAction::CertificateRevoked
        } else {
            ActivityAction::CertificateUpdated
        };
        info!("Certificate {} {}", updated.id, action.as_str());
        self.activity.record(
            caller.user_id,
            updated.institution_id,
            action,
            Some(updated.id),
            json!({
                "from_status": existing.status,
                "status": updated.status,
                "changed": changed_fields(existing, updated),
            }),
        );
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<Certificate, CertError> {
        let found = self.store.get_certificate(id).await?;
        authorize(caller, found, Caller::can_read)
    }

    pub async fn list(
        &self,
        caller: &Caller,
        institution_id: Uuid,
    ) -> Result<Vec<Certificate>, CertError> {
        if !caller.can_read(institution_id) {
            return Err(CertError::Forbidden);
        }
        Ok(self.store.list_certificates(institution_id).await?)
    }

    pub async fn activity(
        &self,
        caller: &Caller,
        institution_id: Uuid,
    ) -> Result<Vec<ActivityLog>, CertError> {
        if !caller.can_read(institution_id) {
            return Err(CertError::Forbidden);
        }
        Ok(self.store.list_activity(institution_id).await?)
    }

    /// Public lookup by verification token. No caller identity required.
    pub async fn verify(&self, verification_id: &str) -> Result<VerificationView, CertError> {
        let cert = self.find_public(verification_id).await?;
        self.public_view(cert).await
    }

    /// The public view of a certificate looked up by internal id, for callers
    /// allowed to read it.
    pub async fn verify_by_id(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<VerificationView, CertError> {
        let found = self.store.get_certificate(id).await?;
        let cert = authorize(caller, found, Caller::can_read)?;
        self.public_view(cert).await
    }

    async fn public_view(&self, cert: Certificate) -> Result<VerificationView, CertError> {
        let institution_name = match self.store.get_institution(cert.institution_id).await? {
            Some(institution) => institution.name,
            None => "Unknown institution".to_string(),
        };
        let status = cert.effective_status(Utc::now().date_naive());

        Ok(VerificationView {
            verification_url: verification_url(&self.settings.base_url, &cert.verification_id),
            verification_id: cert.verification_id,
            title: cert.title,
            description: cert.description,
            recipient_name: cert.recipient_name,
            institution_name,
            issuer_name: cert.issuer_name,
            certificate_type: cert.certificate_type,
            status,
            valid: status == CertificateStatus::Issued,
            issue_date: cert.issue_date,
            expiry_date: cert.expiry_date,
            content_hash: cert.content_hash,
            anchor_tx: cert.anchor_tx,
            issued_at: cert.created_at,
        })
    }

    /// Re-hash the stored artifact and compare it with the hash recorded at
    /// issuance.
    pub async fn check_integrity(&self, verification_id: &str) -> Result<IntegrityReport, CertError> {
        let cert = self.find_public(verification_id).await?;
        let bytes = self.load_artifact(&cert).await?;
        let computed_hash = sha256_hex(&bytes);
        let intact = hash_matches(&bytes, &cert.content_hash);
        if !intact {
            warn!(
                "Artifact of certificate {} does not match its recorded hash (stored {}, computed {})",
                cert.id, cert.content_hash, computed_hash
            );
        }

        let anchor = match &cert.anchor_tx {
            Some(tx) => Some(AnchorCheck {
                transaction_id: tx.clone(),
                confirmed: self.confirm_anchor(tx, &cert.content_hash).await,
            }),
            None => None,
        };

        Ok(IntegrityReport {
            verification_id: cert.verification_id,
            stored_hash: cert.content_hash,
            computed_hash,
            intact,
            anchor,
        })
    }

    pub async fn artifact(&self, verification_id: &str) -> Result<ArtifactDownload, CertError> {
        let cert = self.find_public(verification_id).await?;
        let bytes = self.load_artifact(&cert).await?;
        let content_type = cert.artifact.content_type().to_string();
        let extension = mime_guess::get_mime_extensions_str(&content_type)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        Ok(ArtifactDownload {
            bytes,
            filename: format!("certificate-{}.{}", cert.verification_id, extension),
            content_type,
        })
    }

    async fn find_public(&self, verification_id: &str) -> Result<Certificate, CertError> {
        if !is_verification_id(verification_id) {
            return Err(CertError::NotFound);
        }
        self.store
            .find_by_verification_id(verification_id)
            .await?
            .ok_or(CertError::NotFound)
    }

    async fn load_artifact(&self, cert: &Certificate) -> Result<Vec<u8>, CertError> {
        match &cert.artifact {
            ArtifactRef::Inline { data, .. } => Ok(data.clone()),
            ArtifactRef::Blob { file_id, .. } => Ok(self.blobs.get(file_id).await?),
        }
    }

    async fn render(
        &self,
        format: ArtifactFormat,
        valid: &ValidCertificate,
        institution: &Institution,
        id: Uuid,
        url: &str,
        logo: Option<DynamicImage>,
    ) -> Result<RenderedArtifact, CertError> {
        let rendered = match format {
            ArtifactFormat::Pdf => {
                let renderer = self.pdf.clone();
                let input = PdfCertificate {
                    title: valid.title.clone(),
                    recipient_name: valid.recipient_name.clone(),
                    issue_date: valid.issue_date,
                    expiry_date: valid.expiry_date,
                    institution_name: institution.name.clone(),
                    certificate_id: id.to_string(),
                    verification_url: url.to_string(),
                };
                tokio::task::spawn_blocking(move || renderer.render(&input))
                    .await
                    .map_err(RenderError::from)?
            }
            ArtifactFormat::Png => {
                let renderer = self.images.clone();
                let input = ImageCertificate {
                    title: valid.title.clone(),
                    recipient_name: valid.recipient_name.clone(),
                    recipient_email: valid.recipient_email.clone(),
                    description: valid.description.clone(),
                    issued_date: valid.issue_date,
                    certificate_id: id.to_string(),
                    verification_url: Some(url.to_string()),
                    design: valid.design.clone(),
                };
                tokio::task::spawn_blocking(move || renderer.render(&input, logo.as_ref()))
                    .await
                    .map_err(RenderError::from)?
            }
        };
        Ok(rendered?)
    }

    /// Logo problems never fail issuance, the certificate is drawn without it.
    async fn load_logo(&self, design: &CertificateDesign, id: Uuid) -> Option<DynamicImage> {
        if !design.show_logo {
            return None;
        }
        let source = design.logo_url.as_deref()?;
        match self.logos.load(source).await {
            Ok(logo) => Some(logo),
            Err(e) => {
                warn!("Rendering certificate {} without logo: {}", id, e);
                None
            }
        }
    }

    async fn persist_artifact(
        &self,
        artifact: &RenderedArtifact,
        folder: &str,
        inline: bool,
    ) -> Result<ArtifactRef, CertError> {
        if inline {
            return Ok(ArtifactRef::Inline {
                content_type: artifact.content_type.clone(),
                data: artifact.bytes.clone(),
            });
        }
        let file_id = self
            .blobs
            .put(&artifact.bytes, &artifact.content_type, folder)
            .await?;
        Ok(ArtifactRef::Blob {
            file_id,
            content_type: artifact.content_type.clone(),
        })
    }

    async fn discard_artifact(&self, artifact: &ArtifactRef) {
        if let ArtifactRef::Blob { file_id, .. } = artifact {
            if let Err(e) = self.blobs.delete(file_id).await {
                warn!("Failed to remove orphaned artifact {}: {}", file_id, e);
            }
        }
    }

    async fn anchor_hash(&self, content_hash: &str, id: Uuid) -> Option<String> {
        let anchor = self.anchor.as_ref()?;
        match anchor.submit(content_hash).await {
            Ok(receipt) => Some(receipt.transaction_id),
            Err(e) => {
                warn!("Anchoring failed for certificate {}: {}", id, e);
                None
            }
        }
    }

    async fn confirm_anchor(&self, transaction_id: &str, content_hash: &str) -> Option<bool> {
        let anchor = self.anchor.as_ref()?;
        match anchor.verify(transaction_id, content_hash).await {
            Ok(confirmed) => Some(confirmed),
            Err(e) => {
                warn!("Anchor lookup failed for {}: {}", transaction_id, e);
                None
            }
        }
    }
}

/// Admins learn whether a certificate exists; everyone else gets Forbidden
/// for both missing and foreign certificates.
fn authorize(
    caller: &Caller,
    found: Option<Certificate>,
    allowed: fn(&Caller, Uuid) -> bool,
) -> Result<Certificate, CertError> {
    match found {
        Some(cert) if allowed(caller, cert.institution_id) => Ok(cert),
        Some(_) => Err(CertError::Forbidden),
        None if caller.is_admin() => Err(CertError::NotFound),
        None => Err(CertError::Forbidden),
    }
}

/// Microsecond precision to match Postgres, and strictly after `previous` so
/// every successful write moves the revision forward.
fn next_revision(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now()
        .trunc_subsecs(6)
        .max(previous.trunc_subsecs(6) + Duration::microseconds(1))
}

fn changed_fields(before: &Certificate, after: &Certificate) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if before.title != after.title {
        changed.push("title");
    }
    if before.description != after.description {
        changed.push("description");
    }
    if before.recipient_name != after.recipient_name {
        changed.push("recipient_name");
    }
    if before.recipient_email != after.recipient_email {
        changed.push("recipient_email");
    }
    if before.certificate_type != after.certificate_type {
        changed.push("certificate_type");
    }
    if before.issue_date != after.issue_date {
        changed.push("issue_date");
    }
    if before.expiry_date != after.expiry_date {
        changed.push("expiry_date");
    }
    if before.status != after.status {
        changed.push("status");
    }
    changed
}
