//! Lifecycle notifications: an observer list owned by each composite.
//!
//! Subscribers register a callback and keep the returned [`SubscriptionId`]
//! so they can unregister when their owner goes away.

use serde::Serialize;

/// The lifecycle points a composite reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NotificationKind {
    Play,
    Pause,
    Resume,
    Revert,
    Complete,
    RestoreInitialValues,
}

/// What observers receive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Notification<'a> {
    pub kind: NotificationKind,
    /// Label of the composite that emitted it.
    pub label: &'a str,
    /// Feedback time at emission.
    pub time: f64,
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&Notification<'_>)>;

/// Ordered observer list.
#[derive(Default)]
pub struct Notifier {
    next_id: u64,
    observers: Vec<(SubscriptionId, Observer)>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; it is called in subscription order.
    pub fn subscribe(&mut self, observer: impl FnMut(&Notification<'_>) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Call every observer in subscription order.
    pub fn emit(&mut self, kind: NotificationKind, label: &str, time: f64) {
        let notification = Notification { kind, label, time };
        log::debug!("{label}: {kind:?} at {time}");
        for (_, observer) in self.observers.iter_mut() {
            observer(&notification);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}
