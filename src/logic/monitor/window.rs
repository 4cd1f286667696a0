//! Per-Session Cost Window
//!
//! Sliding token-spend window used to derive spike multipliers. The mean
//! excludes the current sample so a single huge sample cannot normalize
//! its own spike ratio.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct CostSample {
    at: DateTime<Utc>,
    tokens: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CostStats {
    /// Mean of the other samples in the window (1.0 when none).
    pub average: f64,
    /// Current sample over the trailing average.
    pub spike_multiplier: f64,
    /// Samples in the window, current one included.
    pub sample_count: usize,
}

#[derive(Default)]
pub struct CostWindows {
    windows: Mutex<HashMap<String, Vec<CostSample>>>,
}

impl CostWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample and return the trailing statistics.
    pub fn observe(&self, session_id: &str, tokens: u64, window_secs: u64) -> CostStats {
        self.observe_at(session_id, tokens, window_secs, Utc::now())
    }

    fn observe_at(
        &self,
        session_id: &str,
        tokens: u64,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> CostStats {
        let mut windows = self.windows.lock();
        let samples = windows.entry(session_id.to_string()).or_default();

        let cutoff = now - Duration::seconds(window_secs as i64);
        samples.retain(|s| s.at > cutoff);

        // Mean of all *other* samples - the current one must not dilute
        // its own spike ratio. A session's first sample establishes the
        // baseline and can never spike against itself.
        let (average, spike_multiplier) = if samples.is_empty() {
            (1.0, 1.0)
        } else {
            let avg = samples.iter().map(|s| s.tokens as f64).sum::<f64>() / samples.len() as f64;
            (avg, tokens as f64 / avg)
        };

        samples.push(CostSample { at: now, tokens });

        CostStats {
            average,
            spike_multiplier,
            sample_count: samples.len(),
        }
    }

    /// Number of sessions with live windows.
    pub fn session_count(&self) -> usize {
        self.windows.lock().len()
    }

    /// Drop a session's window (after termination).
    pub fn forget(&self, session_id: &str) {
        self.windows.lock().remove(session_id);
    }
}

// ============================================================================
// TESTS
// ============================================================================
