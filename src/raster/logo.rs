// Logo loading for image certificates. Failures here never fail a render,
// callers log them and draw without the logo.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::DynamicImage;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

const MAX_LOGO_BYTES: usize = 5 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum LogoError {
    #[error("malformed data url")]
    MalformedDataUrl,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported logo source: {0}")]
    UnsupportedSource(String),

    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("logo exceeds the size limit")]
    TooLarge,

    #[error("refusing to fetch from internal host {0}")]
    InternalHost(String),

    #[error("undecodable image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Clone)]
pub struct LogoLoader {
    client: Client,
    allow_private_hosts: bool,
}

impl LogoLoader {
    /// Remote fetches are bounded by `timeout` (connect and body). Unless
    /// `allow_private_hosts` is set, loopback and private addresses are
    /// refused, including as redirect targets.
    pub fn new(timeout: Duration, allow_private_hosts: bool) -> Result<Self, reqwest::Error> {
        let redirects = if allow_private_hosts {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::custom(|attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if is_internal_target(attempt.url()) {
                    attempt.error("redirect to an internal host")
                } else {
                    attempt.follow()
                }
            })
        };
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirects)
            .build()?;
        Ok(Self {
            client,
            allow_private_hosts,
        })
    }

    /// Load a logo from a `data:` URL or an `http(s)` URL.
    pub async fn load(&self, source: &str) -> Result<DynamicImage, LogoError> {
        let source = source.trim();
        let bytes = if let Some(rest) = source.strip_prefix("data:") {
            decode_data_url(rest)?
        } else if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch(source).await?
        } else {
            let scheme = source.split(':').next().unwrap_or_default();
            return Err(LogoError::UnsupportedSource(scheme.to_string()));
        };

        if bytes.len() > MAX_LOGO_BYTES {
            return Err(LogoError::TooLarge);
        }
        Ok(image::load_from_memory(&bytes)?)
    }

    /// Download with a running byte cap; a missing or lying Content-Length
    /// does not get past it.
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, LogoError> {
        let url =
            Url::parse(source).map_err(|_| LogoError::UnsupportedSource(source.to_string()))?;
        if !self.allow_private_hosts && is_internal_target(&url) {
            return Err(LogoError::InternalHost(
                url.host_str().unwrap_or_default().to_string(),
            ));
        }

        let mut response = self.client.get(url).send().await?.error_for_status()?;
        if response
            .content_length()
            .map_or(false, |len| len > MAX_LOGO_BYTES as u64)
        {
            return Err(LogoError::TooLarge);
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > MAX_LOGO_BYTES {
                return Err(LogoError::TooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Literal loopback, private, link-local or unspecified addresses, and
/// `localhost` names. Names are not resolved here.
fn is_internal_target(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return true;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let lowered = host.to_ascii_lowercase();
    if lowered == "localhost" || lowered.ends_with(".localhost") {
        return true;
    }
    host.parse::<IpAddr>().map_or(false, is_internal_ip)
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // unique local fc00::/7 and link-local fe80::/10
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().map_or(false, |v4| is_internal_ip(IpAddr::V4(v4)))
        }
    }
}

fn decode_data_url(rest: &str) -> Result<Vec<u8>, LogoError> {
    let (meta, payload) = rest.split_once(',').ok_or(LogoError::MalformedDataUrl)?;
    if !meta.ends_with(";base64") {
        return Err(LogoError::MalformedDataUrl);
    }
    Ok(STANDARD.decode(payload.trim())?)
}
