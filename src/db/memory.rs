// In-process store with the same uniqueness rules as the Postgres schema.
// Used for local runs (STORE_BACKEND=memory) and tests.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ActivityLog, Certificate, Institution, Store, StoreError};

#[derive(Default)]
struct Tables {
    institutions: HashMap<Uuid, Institution>,
    certificates: HashMap<Uuid, Certificate>,
    by_verification_id: HashMap<String, Uuid>,
    activity: Vec<ActivityLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_institution(&self, institution: &Institution) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.institutions.insert(institution.id, institution.clone());
        Ok(())
    }

    async fn get_institution(&self, id: Uuid) -> Result<Option<Institution>, StoreError> {
        Ok(self.tables.read().await.institutions.get(&id).cloned())
    }

    async fn insert_certificate(&self, cert: &Certificate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.by_verification_id.contains_key(&cert.verification_id) {
            return Err(StoreError::DuplicateVerificationId);
        }
        if !tables.institutions.contains_key(&cert.institution_id) {
            return Err(StoreError::Corrupt(format!(
                "institution {} does not exist",
                cert.institution_id
            )));
        }
        tables
            .by_verification_id
            .insert(cert.verification_id.clone(), cert.id);
        tables.certificates.insert(cert.id, cert.clone());
        Ok(())
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StoreError> {
        Ok(self.tables.read().await.certificates.get(&id).cloned())
    }

    async fn find_by_verification_id(
        &self,
        verification_id: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_verification_id
            .get(verification_id)
            .and_then(|id| tables.certificates.get(id))
            .cloned())
    }

    async fn update_certificate(
        &self,
        cert: &Certificate,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let existing = match tables.certificates.get_mut(&cert.id) {
            Some(existing) if existing.updated_at == expected_updated_at => existing,
            _ => return Err(StoreError::Conflict),
        };
        existing.title = cert.title.clone();
        existing.description = cert.description.clone();
        existing.recipient_name = cert.recipient_name.clone();
        existing.recipient_email = cert.recipient_email.clone();
        existing.certificate_type = cert.certificate_type;
        existing.status = cert.status;
        existing.issue_date = cert.issue_date;
        existing.expiry_date = cert.expiry_date;
        existing.updated_at = cert.updated_at;
        Ok(())
    }

    async fn list_certificates(&self, institution_id: Uuid) -> Result<Vec<Certificate>, StoreError> {
        let tables = self.tables.read().await;
        let mut certs: Vec<Certificate> = tables
            .certificates
            .values()
            .filter(|c| c.institution_id == institution_id)
            .cloned()
            .collect();
        certs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(certs)
    }

    async fn append_activity(&self, entry: &ActivityLog) -> Result<(), StoreError> {
        self.tables.write().await.activity.push(entry.clone());
        Ok(())
    }

    async fn list_activity(&self, institution_id: Uuid) -> Result<Vec<ActivityLog>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .activity
            .iter()
            .rev()
            .filter(|entry| entry.institution_id == institution_id)
            .cloned()
            .collect())
    }
}
