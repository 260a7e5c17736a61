// Rendered certificate artifacts shared by the PDF and raster renderers
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::hashing::sha256_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Pdf,
    Png,
}

impl ArtifactFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "application/pdf",
            ArtifactFormat::Png => "image/png",
        }
    }
}

impl FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ArtifactFormat::Pdf),
            "png" | "image" => Ok(ArtifactFormat::Png),
            other => Err(format!("unknown artifact format '{}'", other)),
        }
    }
}

/// Bytes of a rendered certificate together with their integrity hash.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub content_hash: String,
    pub content_type: String,
    /// `data:` URL of the same bytes, only produced for images.
    pub data_url: Option<String>,
}

impl RenderedArtifact {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        let content_hash = sha256_hex(&bytes);
        Self {
            bytes,
            content_hash,
            content_type: content_type.into(),
            data_url: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no usable fonts: {0}")]
    Fonts(String),

    #[error("pdf rendering failed: {0}")]
    Pdf(#[from] genpdf::error::Error),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
