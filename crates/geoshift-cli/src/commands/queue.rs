use async_trait::async_trait;
use chrono::Utc;
use clap::Subcommand;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use geoshift_core::{OfflineEventQueue, SyncCoordinator, SyncError};

#[derive(Subcommand)]
pub enum QueueAction {
    /// Show pending/exhausted/synced counts
    Status {
        /// Queue file to inspect (defaults to the app data dir)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List every queued event with its retry state
    List {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Drain the queue into a JSON document store on disk
    Drain {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Output store file, a JSON object keyed by event id
        #[arg(long)]
        out: PathBuf,
    },
}

fn open_queue(file: Option<PathBuf>) -> Result<OfflineEventQueue, Box<dyn std::error::Error>> {
    let mut queue = match file {
        Some(path) => OfflineEventQueue::new_with_path(path),
        None => OfflineEventQueue::new(),
    };
    queue.load()?;
    Ok(queue)
}

pub fn run(action: QueueAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        QueueAction::Status { file } => {
            let queue = open_queue(file)?;
            let status = serde_json::json!({
                "pending": queue.pending_count(),
                "exhausted": queue.exhausted_count(),
                "synced": queue.synced_count(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        QueueAction::List { file } => {
            let queue = open_queue(file)?;
            println!("{}", serde_json::to_string_pretty(queue.entries())?);
        }
        QueueAction::Drain { file, out } => {
            let queue = open_queue(file)?;
            let shared = Arc::new(tokio::sync::Mutex::new(queue));
            let store = Arc::new(JsonFileStore::open(&out)?);
            let coordinator = SyncCoordinator::new(store.clone(), shared.clone());

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let report = runtime.block_on(coordinator.run_once(Utc::now()));
            store.flush(&out)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// Remote store backed by a single JSON object file. Stands in for the
/// real backend when testing a device's queue offline.
struct JsonFileStore {
    documents: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    fn open(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let documents = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(_) => BTreeMap::new(),
        };
        Ok(Self {
            documents: Mutex::new(documents),
        })
    }

    fn flush(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| "document store poisoned")?;
        std::fs::write(path, serde_json::to_string_pretty(&*documents)?)?;
        Ok(())
    }
}

#[async_trait]
impl geoshift_core::RemoteStore for JsonFileStore {
    async fn upsert(&self, collection: &str, id: &str, payload: Value) -> Result<(), SyncError> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| SyncError::Unavailable("document store poisoned".to_string()))?;
        documents.insert(format!("{collection}/{id}"), payload);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, SyncError> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| SyncError::Unavailable("document store poisoned".to_string()))?;
        let prefix = format!("{collection}/");
        Ok(documents
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, doc)| doc.get(field).and_then(Value::as_str) == Some(value))
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}
