use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use svo_audit::EventJournal;
use svo_config::JournalConfig;
use svo_schemas::DispatchEvent;

/// Fire-and-forget notification sink, called after a successful commit.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: &DispatchEvent) -> Result<()>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

impl EventDispatcher for NullDispatcher {
    fn dispatch(&self, _event: &DispatchEvent) -> Result<()> {
        Ok(())
    }
}

/// Appends every event to a (hash-chained) JSONL journal.
pub struct JournalDispatcher {
    journal: Mutex<EventJournal>,
}

impl JournalDispatcher {
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        Ok(Self {
            journal: Mutex::new(EventJournal::open(path, hash_chain)?),
        })
    }

    pub fn from_config(cfg: &JournalConfig) -> Result<Self> {
        Self::open(&cfg.path, cfg.hash_chain)
    }
}

impl EventDispatcher for JournalDispatcher {
    fn dispatch(&self, event: &DispatchEvent) -> Result<()> {
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| anyhow!("event journal lock poisoned"))?;
        journal.append(event)?;
        Ok(())
    }
}
