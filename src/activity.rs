//! Fire-and-forget activity logging.
//!
//! Handlers push entries onto a bounded channel and move on; a single writer
//! task appends them to the store. A full channel or a failed write is logged
//! and the entry dropped, the primary operation has already succeeded.
//! The writer exits once every [`ActivitySink`] is dropped, after draining
//! whatever is still queued.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::{ActivityAction, ActivityLog, Store};

#[derive(Clone)]
pub struct ActivitySink {
    tx: mpsc::Sender<ActivityLog>,
}

impl ActivitySink {
    pub fn record(
        &self,
        user_id: Uuid,
        institution_id: Uuid,
        action: ActivityAction,
        certificate_id: Option<Uuid>,
        details: serde_json::Value,
    ) {
        let entry = ActivityLog {
            id: Uuid::new_v4(),
            user_id,
            institution_id,
            action,
            certificate_id,
            details,
            created_at: Utc::now(),
        };
        if let Err(e) = self.tx.try_send(entry) {
            tracing::warn!("Dropping activity log entry: {}", e);
        }
    }
}

/// Start the writer task. Await the handle after dropping all sinks to flush.
pub fn spawn_writer(store: Arc<dyn Store>, capacity: usize) -> (ActivitySink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ActivityLog>(capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Err(e) = store.append_activity(&entry).await {
                tracing::error!(
                    "Failed to write activity log {} ({}): {}",
                    entry.id,
                    entry.action.as_str(),
                    e
                );
            }
        }
        tracing::debug!("Activity writer stopped");
    });
    (ActivitySink { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Institution, MemoryStore};

    #[tokio::test]
    async fn entries_are_flushed_when_sinks_drop() {
        let store = Arc::new(MemoryStore::new());
        let institution = Institution {
            id: Uuid::new_v4(),
            name: "Acme University".to_string(),
            created_at: Utc::now(),
        };
        store.insert_institution(&institution).await.unwrap();

        let (sink, writer) = spawn_writer(store.clone(), 8);
        let user = Uuid::new_v4();
        sink.record(
            user,
            institution.id,
            ActivityAction::InstitutionCreated,
            None,
            serde_json::json!({ "name": institution.name }),
        );
        sink.clone().record(
            user,
            institution.id,
            ActivityAction::CertificateCreated,
            Some(Uuid::new_v4()),
            serde_json::json!({}),
        );
        drop(sink);
        writer.await.unwrap();

        let entries = store.list_activity(institution.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ActivityAction::CertificateCreated);
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = ActivitySink { tx };
        for _ in 0..5 {
            sink.record(
                Uuid::new_v4(),
                Uuid::new_v4(),
                ActivityAction::CertificateUpdated,
                None,
                serde_json::Value::Null,
            );
        }
    }
}
