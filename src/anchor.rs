//! Optional external anchoring of certificate hashes.
//!
//! Anchoring records a content hash somewhere tamper-evident and hands back an
//! opaque transaction id. The only bundled implementation is an in-process
//! ledger, so a receipt is metadata, never a trust root. A real ledger client
//! plugs in behind [`AnchorService`] without touching issuance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::hashing::sha256_hex;

#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("anchor submission rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AnchorReceipt {
    pub transaction_id: String,
    pub anchored_at: DateTime<Utc>,
}

#[async_trait]
pub trait AnchorService: Send + Sync {
    async fn submit(&self, content_hash: &str) -> Result<AnchorReceipt, AnchorError>;

    /// Whether `transaction_id` records exactly `content_hash`.
    async fn verify(&self, transaction_id: &str, content_hash: &str) -> Result<bool, AnchorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    Disabled,
    Ledger,
}

impl FromStr for AnchorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "disabled" | "off" | "none" => Ok(AnchorMode::Disabled),
            "ledger" | "memory" => Ok(AnchorMode::Ledger),
            other => Err(format!("unknown anchor mode '{}'", other)),
        }
    }
}

/// In-process stand-in ledger. Entries vanish on restart.
#[derive(Default)]
pub struct LedgerAnchor {
    entries: RwLock<HashMap<String, String>>,
}

impl LedgerAnchor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnchorService for LedgerAnchor {
    async fn submit(&self, content_hash: &str) -> Result<AnchorReceipt, AnchorError> {
        if content_hash.len() != 64 || !content_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AnchorError::Rejected("not a sha-256 hex digest".to_string()));
        }
        let nonce = Uuid::new_v4();
        let transaction_id = format!(
            "0x{}",
            sha256_hex(format!("{}:{}", content_hash, nonce).as_bytes())
        );
        self.entries
            .write()
            .await
            .insert(transaction_id.clone(), content_hash.to_ascii_lowercase());

        tracing::info!("Anchored hash {} as {}", content_hash, transaction_id);
        Ok(AnchorReceipt {
            transaction_id,
            anchored_at: Utc::now(),
        })
    }

    async fn verify(&self, transaction_id: &str, content_hash: &str) -> Result<bool, AnchorError> {
        Ok(self
            .entries
            .read()
            .await
            .get(transaction_id)
            .map_or(false, |stored| stored.eq_ignore_ascii_case(content_hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_verify() {
        let ledger = LedgerAnchor::new();
        let hash = sha256_hex(b"certificate bytes");
        let receipt = ledger.submit(&hash).await.unwrap();

        assert!(receipt.transaction_id.starts_with("0x"));
        assert!(ledger.verify(&receipt.transaction_id, &hash).await.unwrap());
        assert!(!ledger
            .verify(&receipt.transaction_id, &sha256_hex(b"other"))
            .await
            .unwrap());
        assert!(!ledger.verify("0xdeadbeef", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_non_digests() {
        let ledger = LedgerAnchor::new();
        assert!(ledger.submit("not-a-hash").await.is_err());
    }

    #[test]
    fn parses_modes() {
        assert_eq!("".parse::<AnchorMode>(), Ok(AnchorMode::Disabled));
        assert_eq!("Ledger".parse::<AnchorMode>(), Ok(AnchorMode::Ledger));
        assert!("iota".parse::<AnchorMode>().is_err());
    }
}
