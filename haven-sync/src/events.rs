//! Notification bus: synchronous fan-out to registered observers.
//!
//! Three independent channels — document changes, conflicts, presence
//! changes. Listeners are plain boxed closures invoked in registration order;
//! each invocation is individually isolated with `catch_unwind`, so one
//! panicking listener cannot block the rest or reach the publisher.
//!
//! Telemetry attaches here too: the host subscribes its own counters for
//! conflicts raised/resolved — this core emits discrete events only.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::change::ChangeOperation;
use crate::conflict::ConflictResolution;
use crate::presence::PresenceInfo;

/// Which channel a subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    DocumentChanged,
    Conflict,
    PresenceChanged,
}

/// Handle returned by `on_*`; pass it to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId {
    channel: Channel,
    id: u64,
}

struct ListenerSet<T> {
    listeners: Vec<(u64, Box<dyn Fn(&T) + Send>)>,
    next_id: u64,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> ListenerSet<T> {
    fn subscribe(&mut self, listener: Box<dyn Fn(&T) + Send>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Invoke every listener in registration order, isolating panics.
    fn emit(&self, event: &T, channel: &str) {
        for (id, listener) in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::warn!("{channel} listener {id} panicked; continuing delivery");
            }
        }
    }
}

/// The three-channel observer registry.
#[derive(Default)]
pub struct EventBus {
    document: ListenerSet<ChangeOperation>,
    conflict: ListenerSet<ConflictResolution>,
    presence: ListenerSet<PresenceInfo>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_document_change(
        &mut self,
        listener: impl Fn(&ChangeOperation) + Send + 'static,
    ) -> SubscriptionId {
        SubscriptionId {
            channel: Channel::DocumentChanged,
            id: self.document.subscribe(Box::new(listener)),
        }
    }

    /// Conflict listeners fire both when a conflict is detected and when it
    /// is settled; check `resolved` to tell the two apart.
    pub fn on_conflict(
        &mut self,
        listener: impl Fn(&ConflictResolution) + Send + 'static,
    ) -> SubscriptionId {
        SubscriptionId {
            channel: Channel::Conflict,
            id: self.conflict.subscribe(Box::new(listener)),
        }
    }

    pub fn on_presence_change(
        &mut self,
        listener: impl Fn(&PresenceInfo) + Send + 'static,
    ) -> SubscriptionId {
        SubscriptionId {
            channel: Channel::PresenceChanged,
            id: self.presence.subscribe(Box::new(listener)),
        }
    }

    /// Remove a listener. Returns `false` for an already-removed handle.
    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        match subscription.channel {
            Channel::DocumentChanged => self.document.unsubscribe(subscription.id),
            Channel::Conflict => self.conflict.unsubscribe(subscription.id),
            Channel::PresenceChanged => self.presence.unsubscribe(subscription.id),
        }
    }

    pub(crate) fn emit_document_change(&self, change: &ChangeOperation) {
        self.document.emit(change, "document-change");
    }

    pub(crate) fn emit_conflict(&self, conflict: &ConflictResolution) {
        self.conflict.emit(conflict, "conflict");
    }

    pub(crate) fn emit_presence_change(&self, presence: &PresenceInfo) {
        self.presence.emit(presence, "presence-change");
    }

    /// Listener counts per channel `(document, conflict, presence)`.
    pub fn listener_counts(&self) -> (usize, usize, usize) {
        (
            self.document.listeners.len(),
            self.conflict.listeners.len(),
            self.presence.listeners.len(),
        )
    }
}
