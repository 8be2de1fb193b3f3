use crate::types::{Frame, ReviewEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("connection buffer full")]
    Full,
}

/// The write half of one viewer connection.
pub trait EventSink: Send {
    fn send(&mut self, frame: &Frame) -> Result<(), SinkError>;

    fn close(&mut self) {}
}

/// Sink feeding a bounded channel whose receiver is the viewer's stream.
///
/// Sends never wait: a full buffer is reported as a failure so one slow
/// viewer cannot hold up the rest.
pub struct ChannelSink {
    sender: mpsc::Sender<Frame>,
}

pub fn channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<Frame>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelSink { sender }, receiver)
}

impl EventSink for ChannelSink {
    fn send(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.sender.try_send(frame.clone()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

#[derive(Default)]
struct Connections {
    next_id: u64,
    open: HashMap<ConnectionId, Box<dyn EventSink>>,
}

/// The set of live viewer connections. Cheap to clone; clones share the set.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<Connections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Connections> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection and greets it with a `connected` event. A sink
    /// that cannot take the greeting is never added.
    pub fn join(&self, mut sink: Box<dyn EventSink>) -> Option<ConnectionId> {
        if let Err(err) = sink.send(&ReviewEvent::Connected.to_frame()) {
            debug!(error = %err, "viewer dropped before greeting");
            sink.close();
            return None;
        }
        let mut connections = self.lock();
        connections.next_id += 1;
        let id = ConnectionId(connections.next_id);
        connections.open.insert(id, sink);
        debug!(connections = connections.open.len(), "viewer connected");
        Some(id)
    }

    pub fn leave(&self, id: ConnectionId) -> bool {
        let removed = self.lock().open.remove(&id);
        match removed {
            Some(mut sink) => {
                sink.close();
                true
            }
            None => false,
        }
    }

    /// Delivers `event` to every connection, dropping the ones whose write
    /// fails. Returns how many connections received it.
    pub fn broadcast(&self, event: &ReviewEvent) -> usize {
        let frame = event.to_frame();
        let mut connections = self.lock();
        let mut failed = Vec::new();
        for (id, sink) in &mut connections.open {
            if let Err(err) = sink.send(&frame) {
                warn!(event = frame.event, error = %err, "dropping viewer connection");
                failed.push(*id);
            }
        }
        for id in &failed {
            if let Some(mut sink) = connections.open.remove(id) {
                sink.close();
            }
        }
        connections.open.len()
    }

    /// Ends every connection. Used at shutdown.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.lock().open.drain().collect();
        for (_, mut sink) in drained {
            sink.close();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
