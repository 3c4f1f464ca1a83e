//! Registry of output sinks that receive broadcast audio.
//!
//! The registry only holds weak references: a sink lives as long as its
//! transport connection does. Broadcasts iterate over a snapshot, so sinks may
//! register or unregister while a broadcast is in flight.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::base::RelayResult;

/// Identifier handed out on registration.
pub type SubscriberId = Uuid;

/// An output endpoint able to accept serialised envelopes.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Deliver one serialised message.
    async fn send(&self, message: &str) -> RelayResult<()>;

    /// Close the underlying connection.
    async fn close(&self);
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Weakly-held set of output sinks.
#[derive(Default)]
pub struct SubscriberRegistry {
    sinks: DashMap<SubscriberId, Weak<dyn AudioSink>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink. The registry does not keep it alive.
    pub fn register(&self, sink: &Arc<dyn AudioSink>) -> SubscriberId {
        let id = Uuid::new_v4();
        self.sinks.insert(id, Arc::downgrade(sink));
        debug!(subscriber_id = %id, "Subscriber registered");
        id
    }

    /// Remove a sink. Returns false if it was not registered.
    pub fn unregister(&self, id: &SubscriberId) -> bool {
        let removed = self.sinks.remove(id).is_some();
        if removed {
            debug!(subscriber_id = %id, "Subscriber unregistered");
        }
        removed
    }

    /// Live sinks at this instant. Dead entries are pruned.
    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn AudioSink>)> {
        let mut live = Vec::with_capacity(self.sinks.len());
        let mut dead = Vec::new();

        for entry in self.sinks.iter() {
            match entry.value().upgrade() {
                Some(sink) => live.push((*entry.key(), sink)),
                None => dead.push(*entry.key()),
            }
        }

        // Iteration guards are released before removal.
        for id in dead {
            self.sinks.remove(&id);
        }

        live
    }

    /// Number of live sinks.
    pub fn len(&self) -> usize {
        self.sinks
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `message` to every live sink. A failing sink does not affect the
    /// others and is not removed.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, sink) in self.snapshot() {
            match sink.send(message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber_id = %id, error = %e, "Failed to deliver to subscriber");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Close every live sink and empty the registry.
    pub async fn close_all(&self) -> usize {
        let sinks = self.snapshot();
        self.sinks.clear();

        let count = sinks.len();
        for (id, sink) in sinks {
            debug!(subscriber_id = %id, "Closing subscriber");
            sink.close().await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::base::RelayError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
        closed: AtomicBool,
        fail: bool,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn send(&self, message: &str) -> RelayResult<()> {
            if self.fail {
                return Err(RelayError::SubscriberDelivery("broken pipe".to_string()));
            }
            self.messages.lock().push(message.to_string());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn sink(fail: bool) -> (Arc<RecordingSink>, Arc<dyn AudioSink>) {
        let concrete = Arc::new(RecordingSink {
            fail,
            ..Default::default()
        });
        let dynamic: Arc<dyn AudioSink> = concrete.clone();
        (concrete, dynamic)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let registry = SubscriberRegistry::new();
        let (a, a_dyn) = sink(false);
        let (b, b_dyn) = sink(false);
        registry.register(&a_dyn);
        registry.register(&b_dyn);

        let report = registry.broadcast("hello").await;
        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        assert_eq!(*a.messages.lock(), vec!["hello".to_string()]);
        assert_eq!(*b.messages.lock(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_sink_is_isolated() {
        let registry = SubscriberRegistry::new();
        let (_bad, bad_dyn) = sink(true);
        let (good, good_dyn) = sink(false);
        registry.register(&bad_dyn);
        registry.register(&good_dyn);

        let report = registry.broadcast("one").await;
        let report2 = registry.broadcast("two").await;

        assert_eq!(report.failed, 1);
        assert_eq!(report2.delivered, 1);
        assert_eq!(*good.messages.lock(), vec!["one".to_string(), "two".to_string()]);
        // Failing sinks stay registered.
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_sink_is_pruned() {
        let registry = SubscriberRegistry::new();
        let (_keep, keep_dyn) = sink(false);
        registry.register(&keep_dyn);
        {
            let (_gone, gone_dyn) = sink(false);
            registry.register(&gone_dyn);
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.sinks.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = SubscriberRegistry::new();
        let (_s, s_dyn) = sink(false);
        let id = registry.register(&s_dyn);

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
        assert_eq!(registry.broadcast("x").await, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = SubscriberRegistry::new();
        let (a, a_dyn) = sink(false);
        let (b, b_dyn) = sink(false);
        registry.register(&a_dyn);
        registry.register(&b_dyn);

        assert_eq!(registry.close_all().await, 2);
        assert!(a.closed.load(Ordering::SeqCst));
        assert!(b.closed.load(Ordering::SeqCst));
        assert!(registry.is_empty());
    }
}
