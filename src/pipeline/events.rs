//! Communication between the batch worker and whoever is watching it.
//!
//! The worker sends an ordered stream of [`BatchEvent`]s and never touches
//! UI state directly. The only thing flowing the other way is a [`StopFlag`].

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::mpsc;

use crate::prelude::*;

/// Something the batch worker wants the reporting surface to know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchEvent {
    /// A general log line.
    Log(String),
    /// We're about to process page `current` of `total` in `document`.
    PageProgress {
        document: String,
        current: usize,
        total: usize,
    },
    /// Something went wrong.
    Error(String),
    /// The run is over, however it ended. Always the last event.
    Finished,
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchEvent::Log(msg) => write!(f, "{msg}"),
            BatchEvent::PageProgress {
                document,
                current,
                total,
            } => write!(f, "[{document}] Page {current}/{total}"),
            BatchEvent::Error(msg) => write!(f, "Error: {msg}"),
            BatchEvent::Finished => write!(f, "All tasks finished."),
        }
    }
}

/// Sending half of the event channel.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl EventSink {
    /// Create a connected sink and receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send an event. If nobody is listening any more we keep going anyway;
    /// the work itself is still worth finishing.
    pub fn send(&self, event: BatchEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }

    /// Send a log line.
    pub fn log(&self, msg: impl Into<String>) {
        self.send(BatchEvent::Log(msg.into()));
    }

    /// Send an error message.
    pub fn error(&self, msg: impl Into<String>) {
        self.send(BatchEvent::Error(msg.into()));
    }
}

/// Cooperative cancellation flag. Set by the reporting surface, polled by the
/// worker before each document and before each page.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a new, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop at its next poll point.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has anyone asked us to stop?
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
