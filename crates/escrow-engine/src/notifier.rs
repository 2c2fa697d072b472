//! Event notifier
//!
//! Notification is a side channel. `notify` is called after a transition has
//! been committed, returns nothing, and must not block.

use std::sync::{Arc, Mutex};

use escrow_types::AgreementEvent;
use tokio::sync::broadcast;
use tracing::info;

/// Receives one record per committed transition
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: &AgreementEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn notify(&self, _event: &AgreementEvent) {}
}

/// Writes each event as a structured log record
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl EventNotifier for TracingNotifier {
    fn notify(&self, event: &AgreementEvent) {
        info!(
            agreement_id = %event.agreement_id,
            kind = ?event.kind,
            resolution_target = ?event.resolution_target,
            "Agreement event"
        );
    }
}

/// Fans events out to live subscribers over a tokio broadcast channel.
///
/// Slow subscribers lag and drop old events; with no subscribers the event
/// is simply discarded.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<AgreementEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgreementEvent> {
        self.sender.subscribe()
    }
}

impl EventNotifier for BroadcastNotifier {
    fn notify(&self, event: &AgreementEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<AgreementEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first
    pub fn events(&self) -> Vec<AgreementEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventNotifier for RecordingNotifier {
    fn notify(&self, event: &AgreementEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Dispatches each event to several sinks in order
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn EventNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventNotifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventNotifier for FanoutNotifier {
    fn notify(&self, event: &AgreementEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
