#![allow(dead_code)]

use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use certhub::activity;
use certhub::artifact::ArtifactFormat;
use certhub::auth::Caller;
use certhub::certificates::{CertificateService, IdGenerator, IssuanceSettings, NewCertificate};
use certhub::db::{ActivityLog, Institution, MemoryStore, Store};
use certhub::fonts::Fonts;
use certhub::raster::LogoLoader;
use certhub::storage::{BlobStore, FileStorage};

pub const BASE_URL: &str = "https://certs.example.org";

pub struct Harness {
    pub service: CertificateService,
    pub store: Arc<MemoryStore>,
    pub fonts: Arc<Fonts>,
    pub storage_dir: TempDir,
    pub institution: Institution,
    pub admin: Caller,
    pub issuer: Caller,
}

pub struct Options {
    pub inline_artifacts: bool,
    pub default_format: ArtifactFormat,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            inline_artifacts: false,
            default_format: ArtifactFormat::Pdf,
        }
    }
}

/// `None` when the machine has no usable system fonts. Under CI a missing
/// font is a failure rather than a skip.
pub fn fonts() -> Option<Arc<Fonts>> {
    match Fonts::discover(None) {
        Ok(fonts) => Some(Arc::new(fonts)),
        Err(e) if std::env::var_os("CI").is_some() => panic!("fonts required under CI: {}", e),
        Err(e) => {
            eprintln!("skipping: {}", e);
            None
        }
    }
}

pub async fn harness() -> Option<Harness> {
    harness_with(Options::default(), |service| service).await
}

pub async fn harness_with(
    options: Options,
    configure: impl FnOnce(CertificateService) -> CertificateService,
) -> Option<Harness> {
    let fonts = fonts()?;
    let store = Arc::new(MemoryStore::new());
    let storage_dir = TempDir::new().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FileStorage::new(storage_dir.path()).unwrap());

    let institution = Institution {
        id: Uuid::new_v4(),
        name: "Acme University".to_string(),
        created_at: Utc::now(),
    };
    store.insert_institution(&institution).await.unwrap();

    let service = build_service(store.clone(), blobs, fonts.clone(), &options);

    Some(Harness {
        service: configure(service),
        store,
        fonts,
        institution: institution.clone(),
        admin: Caller::admin(Uuid::new_v4()),
        issuer: Caller::institution(Uuid::new_v4(), institution.id, "Registrar Office"),
        storage_dir,
    })
}

pub fn build_service(
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    fonts: Arc<Fonts>,
    options: &Options,
) -> CertificateService {
    let (sink, _writer) = activity::spawn_writer(store.clone(), 64);
    CertificateService::new(
        store,
        blobs,
        fonts,
        LogoLoader::new(Duration::from_secs(2), false).unwrap(),
        sink,
        IssuanceSettings {
            base_url: BASE_URL.to_string(),
            default_format: options.default_format,
            inline_artifacts: options.inline_artifacts,
            max_upload_bytes: 1024 * 1024,
        },
    )
}

impl Harness {
    /// A second service over the same data, reading through `store`.
    pub fn service_over(&self, store: Arc<dyn Store>) -> CertificateService {
        let blobs: Arc<dyn BlobStore> =
            Arc::new(FileStorage::new(self.storage_dir.path()).unwrap());
        build_service(store, blobs, self.fonts.clone(), &Options::default())
    }

    pub fn request(&self) -> NewCertificate {
        NewCertificate {
            institution_id: Some(self.institution.id),
            title: "Certificate of Completion".to_string(),
            recipient_name: "Jane Doe".to_string(),
            recipient_email: "jane@example.org".to_string(),
            issue_date: "2024-01-01".to_string(),
            ..Default::default()
        }
    }

    pub fn stored_files(&self) -> usize {
        count_files(self.storage_dir.path())
    }

    /// Activity is written by a background task, so poll for it.
    pub async fn wait_for_activity(&self, expected: usize) -> Vec<ActivityLog> {
        for _ in 0..100 {
            let entries = self.store.list_activity(self.institution.id).await.unwrap();
            if entries.len() >= expected {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} activity entries", expected);
    }
}

/// Hands out `ids` in order, repeating the last one.
pub fn scripted_ids(ids: &[&str]) -> IdGenerator {
    let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
    let next = AtomicUsize::new(0);
    Arc::new(move || {
        let i = next.fetch_add(1, Ordering::SeqCst).min(ids.len() - 1);
        ids[i].clone()
    })
}

pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
