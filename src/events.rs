//! Backup lifecycle events
//!
//! Subscribers register a callback on an [`EventBus`]; services publish
//! [`BackupEvent`]s at fixed points. A subscriber returning an error is
//! logged and skipped, the publisher carries on.

use std::path::PathBuf;
use std::sync::RwLock;

use serde::Serialize;
use tracing::warn;

use crate::error::BackupResult;

/// Events published by the backup services
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackupEvent {
    /// A backup run is about to scan its source tree
    PreBackup {
        profile: String,
        source_dir: PathBuf,
    },
    /// A backup was uploaded and recorded in the ledger
    PostBackup {
        profile: String,
        backup_id: String,
        file_count: usize,
        size: u64,
    },
    BackupFailed {
        profile: String,
        error: String,
    },
    /// Entries removed by retention
    Pruned {
        repo: String,
        backup_ids: Vec<String>,
    },
    Restored {
        backup_id: String,
        destination: PathBuf,
        files_restored: usize,
    },
    Verified {
        backup_id: String,
        passed: bool,
    },
}

impl BackupEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            BackupEvent::PreBackup { .. } => "pre_backup",
            BackupEvent::PostBackup { .. } => "post_backup",
            BackupEvent::BackupFailed { .. } => "backup_failed",
            BackupEvent::Pruned { .. } => "pruned",
            BackupEvent::Restored { .. } => "restored",
            BackupEvent::Verified { .. } => "verified",
        }
    }
}

type Subscriber = Box<dyn Fn(&BackupEvent) -> BackupResult<()> + Send + Sync>;

/// Registry of named event subscribers
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(String, Subscriber)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber under a name used in failure logs
    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&BackupEvent) -> BackupResult<()> + Send + Sync + 'static,
    {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push((name.into(), Box::new(callback)));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Deliver to every subscriber; returns how many succeeded
    pub fn publish(&self, event: &BackupEvent) -> usize {
        let Ok(subs) = self.subscribers.read() else {
            warn!(event = event.kind(), "Event bus lock poisoned, event dropped");
            return 0;
        };

        let mut delivered = 0;
        for (name, callback) in subs.iter() {
            match callback(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(subscriber = %name, event = event.kind(), error = %e, "Event subscriber failed");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
