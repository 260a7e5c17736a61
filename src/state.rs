use crate::certificates::CertificateService;
use crate::config::Config;
use std::sync::Arc;
use tera::Tera;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CertificateService>,
    pub config: Arc<Config>,
    pub tera: Arc<Tera>,
}
