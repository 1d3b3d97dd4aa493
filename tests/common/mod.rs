//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::{Mutex, OnceLock};

use team_coordinator::{Event, Publisher, Topic};
use tracing_subscriber::{EnvFilter, fmt};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initializes logging once per test binary
///
/// The level comes from `TEST_LOG`, then `RUST_LOG`, and defaults to `warn`.
pub fn init_logging() {
    INITIALIZED.get_or_init(|| {
        let filter = std::env::var("TEST_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .try_init()
            .ok();
    });
}

/// Publisher that keeps every event in order
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(Topic, Event)>>,
}

impl RecordingPublisher {
    /// Everything published so far
    pub fn events(&self) -> Vec<(Topic, Event)> {
        self.events.lock().unwrap().clone()
    }

    /// Events published on `topic`
    pub fn on(&self, topic: Topic) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|(published, _)| *published == topic)
            .map(|(_, event)| event)
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn broadcast(&self, topic: &Topic, event: &Event) {
        self.events.lock().unwrap().push((*topic, event.clone()));
    }
}
