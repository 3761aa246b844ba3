use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};

use svo_runtime::EventDispatcher;
use svo_schemas::DispatchEvent;

/// Keeps every dispatched event in memory.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }
}

impl EventDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: &DispatchEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow!("recording dispatcher poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// Refuses every event, counting the attempts.
#[derive(Debug, Default)]
pub struct FailingDispatcher {
    attempts: Mutex<usize>,
}

impl FailingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|n| *n).unwrap_or(0)
    }
}

impl EventDispatcher for FailingDispatcher {
    fn dispatch(&self, event: &DispatchEvent) -> Result<()> {
        if let Ok(mut n) = self.attempts.lock() {
            *n += 1;
        }
        bail!("notification channel down: {}", event.name)
    }
}
