#![allow(dead_code)]

//! Event Bus - In-Process Pub/Sub
//!
//! Fire-and-forget notification fabric between the detection loop and the
//! response side. Components receive a bus handle at construction; there is
//! no ambient global. Subscribers match on exact channel names, the `*`
//! wildcard, or a `prefix.*` pattern.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Channel names
pub mod channels {
    pub const BEHAVIOR_DETECTED: &str = "behavior.detected";
    pub const BEHAVIOR_BLOCKED: &str = "behavior.blocked";
}

/// Discriminator carried in `behavior.blocked` payloads published by the
/// kill switch.
pub const ACTION_KILL_SWITCH: &str = "kill_switch";

// ============================================================================
// EVENT & SUBSCRIPTIONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct BusEvent {
    pub channel: String,
    pub payload: Value,
}

type Callback = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Subscription {
    pattern: String,
    callback: Callback,
}

// ============================================================================
// EVENT BUS
// ============================================================================

pub struct EventBus {
    subs: RwLock<Vec<Subscription>>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subs: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Register a callback for every event whose channel matches `pattern`.
    pub fn subscribe<F>(&self, pattern: &str, callback: F)
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.subs.write().push(Subscription {
            pattern: pattern.to_string(),
            callback: Arc::new(callback),
        });
    }

    /// Deliver an event to all matching subscribers. At-least-once within
    /// the process lifetime; delivery order follows subscription order.
    pub fn publish(&self, channel: &str, payload: Value) {
        self.published.fetch_add(1, Ordering::SeqCst);

        // Snapshot matching callbacks so a subscriber may publish again
        // without re-entering the lock.
        let matching: Vec<Callback> = self
            .subs
            .read()
            .iter()
            .filter(|s| pattern_matches(&s.pattern, channel))
            .map(|s| s.callback.clone())
            .collect();

        if matching.is_empty() {
            log::debug!("No subscribers for '{}', event dropped", channel);
            return;
        }

        let event = BusEvent {
            channel: channel.to_string(),
            payload,
        };
        for callback in matching {
            callback(&event);
        }
    }

    /// Total events published on this bus.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact match, `*`, or `prefix.*`.
fn pattern_matches(pattern: &str, channel: &str) -> bool {
    if pattern == "*" || pattern == channel {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return channel
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with('.'));
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn collector(bus: &EventBus, pattern: &str) -> Arc<Mutex<Vec<BusEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(pattern, move |event| sink.lock().push(event.clone()));
        seen
    }

    #[test]
    fn test_exact_match() {
        let bus = EventBus::new();
        let seen = collector(&bus, channels::BEHAVIOR_DETECTED);

        bus.publish(channels::BEHAVIOR_DETECTED, json!({"x": 1}));
        bus.publish(channels::BEHAVIOR_BLOCKED, json!({"x": 2}));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload["x"], 1);
    }

    #[test]
    fn test_wildcard_match() {
        let bus = EventBus::new();
        let seen = collector(&bus, "*");

        bus.publish(channels::BEHAVIOR_DETECTED, json!({}));
        bus.publish("session.started", json!({}));

        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_prefix_match() {
        let bus = EventBus::new();
        let seen = collector(&bus, "behavior.*");

        bus.publish(channels::BEHAVIOR_DETECTED, json!({}));
        bus.publish(channels::BEHAVIOR_BLOCKED, json!({}));
        bus.publish("session.started", json!({}));
        // Prefix must stop at a segment boundary.
        bus.publish("behaviorx.detected", json!({}));

        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let a = collector(&bus, channels::BEHAVIOR_BLOCKED);
        let b = collector(&bus, "behavior.*");

        bus.publish(channels::BEHAVIOR_BLOCKED, json!({}));

        assert_eq!(a.lock().len(), 1);
        assert_eq!(b.lock().len(), 1);
        assert_eq!(bus.published_count(), 1);
    }

    #[test]
    fn test_subscriber_may_republish() {
        let bus = Arc::new(EventBus::new());
        let seen = collector(&bus, "behavior.blocked");

        let inner = bus.clone();
        bus.subscribe(channels::BEHAVIOR_DETECTED, move |_| {
            inner.publish(channels::BEHAVIOR_BLOCKED, json!({"relayed": true}));
        });

        bus.publish(channels::BEHAVIOR_DETECTED, json!({}));
        assert_eq!(seen.lock().len(), 1);
    }
}
