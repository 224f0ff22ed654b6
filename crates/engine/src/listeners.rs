//! Listener registry: per-session change-event queues
//!
//! Sessions subscribe with `AddListener` and the session layer pulls their
//! queues between commands. The registry owns nothing about session
//! lifetime: the consensus layer signals open/close and refers to sessions
//! by id only.
//!
//! Queues are bounded. When a queue is full the oldest event is dropped and
//! counted; the next drain reports the loss as a leading
//! [`QueuedEvent::Lagged`] marker so a slow consumer learns it must
//! resynchronize instead of silently missing changes.

use lockstep_core::{MapEvent, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

/// Registry tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Maximum events buffered per session before the oldest is dropped
    pub queue_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            queue_capacity: 1024,
        }
    }
}

impl ListenerConfig {
    /// A tiny queue for exercising overflow in tests
    pub fn for_testing() -> Self {
        ListenerConfig { queue_capacity: 4 }
    }
}

/// One element pulled from a session's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuedEvent {
    /// Events were dropped since the last drain; `missed` counts them
    Lagged {
        /// Number of dropped events
        missed: u64,
    },
    /// A change notification, in publication order
    Event(MapEvent),
}

#[derive(Debug, Clone, Default)]
struct ListenerQueue {
    events: VecDeque<MapEvent>,
    missed: u64,
}

/// Tracks subscribed sessions and queues events for each
#[derive(Debug, Clone)]
pub struct ListenerRegistry {
    config: ListenerConfig,
    queues: BTreeMap<SessionId, ListenerQueue>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        ListenerRegistry::new(ListenerConfig::default())
    }
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new(config: ListenerConfig) -> Self {
        ListenerRegistry {
            config,
            queues: BTreeMap::new(),
        }
    }

    /// Rebuild from snapshotted subscriptions (queues start empty;
    /// undelivered events belong to the session channel, not the snapshot)
    pub fn from_sessions(config: ListenerConfig, sessions: Vec<SessionId>) -> Self {
        let mut registry = ListenerRegistry::new(config);
        for session in sessions {
            registry.subscribe(session);
        }
        registry
    }

    /// Subscribe a session. Idempotent; re-subscribing keeps the queue.
    pub fn subscribe(&mut self, session: SessionId) {
        self.queues.entry(session).or_default();
    }

    /// Unsubscribe a session, dropping its queue.
    ///
    /// Returns whether the session was subscribed.
    pub fn unsubscribe(&mut self, session: SessionId) -> bool {
        self.queues.remove(&session).is_some()
    }

    /// Whether `session` is subscribed
    pub fn is_subscribed(&self, session: SessionId) -> bool {
        self.queues.contains_key(&session)
    }

    /// Subscribed sessions in ascending order
    pub fn sessions(&self) -> Vec<SessionId> {
        self.queues.keys().copied().collect()
    }

    /// Queue `event` for every subscribed session
    pub fn publish(&mut self, event: &MapEvent) {
        let capacity = self.config.queue_capacity;
        for (session, queue) in &mut self.queues {
            if queue.events.len() >= capacity {
                queue.events.pop_front();
                queue.missed += 1;
                if queue.missed == 1 {
                    warn!(%session, capacity, "listener queue overflow, dropping oldest events");
                }
            }
            queue.events.push_back(event.clone());
        }
    }

    /// Drain a session's queue.
    ///
    /// If events were dropped since the last drain, the first element is a
    /// [`QueuedEvent::Lagged`] marker carrying the count.
    pub fn drain(&mut self, session: SessionId) -> Vec<QueuedEvent> {
        let Some(queue) = self.queues.get_mut(&session) else {
            return Vec::new();
        };
        let mut drained = Vec::with_capacity(queue.events.len() + 1);
        if queue.missed > 0 {
            drained.push(QueuedEvent::Lagged {
                missed: queue.missed,
            });
            queue.missed = 0;
        }
        drained.extend(queue.events.drain(..).map(QueuedEvent::Event));
        drained
    }

    /// Drop a closed session's subscription and queue
    pub fn drop_session(&mut self, session: SessionId) {
        self.queues.remove(&session);
    }

    /// Number of subscribed sessions
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Whether no sessions are subscribed
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{Key, Timestamp, Versioned};

    fn event(n: u64) -> MapEvent {
        MapEvent::inserted(
            Key::from(format!("k{}", n)),
            Versioned::new(vec![n as u8], n, Timestamp::from_millis(n)),
        )
    }

    #[test]
    fn test_publish_and_drain_in_order() {
        let mut registry = ListenerRegistry::default();
        let session = SessionId::new(1);
        registry.subscribe(session);

        registry.publish(&event(1));
        registry.publish(&event(2));

        let drained = registry.drain(session);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], QueuedEvent::Event(event(1)));
        assert_eq!(drained[1], QueuedEvent::Event(event(2)));

        // Queue is now empty
        assert!(registry.drain(session).is_empty());
    }

    #[test]
    fn test_unsubscribed_sessions_receive_nothing() {
        let mut registry = ListenerRegistry::default();
        registry.publish(&event(1));
        assert!(registry.drain(SessionId::new(1)).is_empty());
    }

    #[test]
    fn test_overflow_reports_lagged_once() {
        let mut registry = ListenerRegistry::new(ListenerConfig::for_testing());
        let session = SessionId::new(1);
        registry.subscribe(session);

        // Capacity 4; publish 7: events 1..=3 are dropped
        for n in 1..=7 {
            registry.publish(&event(n));
        }

        let drained = registry.drain(session);
        assert_eq!(drained[0], QueuedEvent::Lagged { missed: 3 });
        assert_eq!(drained.len(), 5);
        assert_eq!(drained[1], QueuedEvent::Event(event(4)));
        assert_eq!(drained[4], QueuedEvent::Event(event(7)));

        // The marker is consumed by the drain
        registry.publish(&event(8));
        let drained = registry.drain(session);
        assert_eq!(drained, vec![QueuedEvent::Event(event(8))]);
    }

    #[test]
    fn test_drop_session_discards_queue() {
        let mut registry = ListenerRegistry::default();
        let session = SessionId::new(1);
        registry.subscribe(session);
        registry.publish(&event(1));

        registry.drop_session(session);
        assert!(!registry.is_subscribed(session));
        assert!(registry.drain(session).is_empty());
    }

    #[test]
    fn test_from_sessions_starts_empty() {
        let registry = ListenerRegistry::from_sessions(
            ListenerConfig::default(),
            vec![SessionId::new(3), SessionId::new(1)],
        );
        assert_eq!(registry.sessions(), vec![SessionId::new(1), SessionId::new(3)]);
    }
}
