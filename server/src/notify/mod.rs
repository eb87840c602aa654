//! Notification delivery with startup queuing.
//!
//! Best-effort push of async events (friend request sent/responded) to a
//! user's room. The REST layer can run before the WebSocket transport is
//! wired up during process startup; events emitted in that window are
//! buffered FIFO and drained exactly once when the transport is attached.
//! The queue is process-lifetime only; the persisted friend-request row is
//! the durable record clients reconcile against on reload.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::ws::{broadcast, SessionRegistry};

#[derive(Debug)]
struct Pending {
    user_id: String,
    event: String,
    payload: Value,
}

#[derive(Default)]
struct Inner {
    transport: Option<SessionRegistry>,
    queue: VecDeque<Pending>,
}

/// Process-wide notification dispatcher.
#[derive(Default)]
pub struct Notifier {
    inner: Mutex<Inner>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a named event to a user's room, or buffer it if the live
    /// transport has not been attached yet.
    pub fn emit_to_user(&self, user_id: &str, event: &str, payload: Value) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        match &inner.transport {
            Some(registry) => {
                broadcast::emit_to_user(registry, user_id, event, &payload);
            }
            None => {
                tracing::debug!(user_id = %user_id, event = event, "Transport not ready, queuing notification");
                inner.queue.push_back(Pending {
                    user_id: user_id.to_string(),
                    event: event.to_string(),
                    payload,
                });
            }
        }
    }

    /// Attach the live transport and drain any buffered notifications in
    /// FIFO order, each exactly once. Subsequent emits deliver immediately.
    pub fn attach_transport(&self, registry: SessionRegistry) {
        let drained: Vec<Pending> = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            inner.transport = Some(registry.clone());
            inner.queue.drain(..).collect()
        };

        if !drained.is_empty() {
            tracing::info!("Flushing {} queued notifications", drained.len());
        }
        for pending in drained {
            broadcast::emit_to_user(&registry, &pending.user_id, &pending.event, &pending.payload);
        }
    }
}
