//! Live contact-quality metrics: the impedance → tier classifier and the
//! rolling window backing the presentation layer's chart.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Discrete electrode-contact tier derived from the latest impedance reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityTier {
    Excellent,
    Good,
    Insufficient,
    /// No impedance has been observed yet this connection.
    Unknown,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Insufficient => "insufficient",
            QualityTier::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// Tier cut points, in the same units the decoder produces.
///
/// These are policy, not protocol: firmware revisions reporting raw device
/// units and revisions reporting kΩ need different cut points, so the values
/// are carried in configuration rather than compiled in. The defaults match
/// raw-unit firmware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Strictly below this value: [`QualityTier::Excellent`].
    pub excellent_below: f64,
    /// Below this value (and at/above `excellent_below`): [`QualityTier::Good`].
    /// At or above it: [`QualityTier::Insufficient`].
    pub good_below: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent_below: 50.0,
            good_below: 200.0,
        }
    }
}

impl QualityThresholds {
    /// Map the latest impedance reading to a tier; `None` before the first
    /// reading of a connection.
    pub fn classify(&self, impedance: Option<f64>) -> QualityTier {
        match impedance {
            None => QualityTier::Unknown,
            Some(v) if v < self.excellent_below => QualityTier::Excellent,
            Some(v) if v < self.good_below => QualityTier::Good,
            Some(_) => QualityTier::Insufficient,
        }
    }
}

/// Fixed-capacity sliding window of recent impedance readings.
///
/// Insertion order is arrival order; the oldest reading is evicted once
/// capacity is exceeded. Display-only: never persisted, and mutated solely
/// from the single sample-delivery path.
#[derive(Debug)]
pub struct RollingWindow {
    buf: VecDeque<f64>,
    capacity: usize,
}

/// Default window capacity, sized for the live chart.
pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest when full. Amortized O(1).
    pub fn push(&mut self, value: f64) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    /// The current contents in arrival order, without mutation.
    pub fn snapshot(&self) -> Vec<f64> {
        self.buf.iter().copied().collect()
    }

    /// The most recent reading, if any.
    pub fn latest(&self) -> Option<f64> {
        self.buf.back().copied()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all readings, e.g. when a connection is torn down.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_default_cut_points() {
        let t = QualityThresholds::default();
        assert_eq!(t.classify(None), QualityTier::Unknown);
        assert_eq!(t.classify(Some(0.0)), QualityTier::Excellent);
        assert_eq!(t.classify(Some(49.0)), QualityTier::Excellent);
        assert_eq!(t.classify(Some(50.0)), QualityTier::Good);
        assert_eq!(t.classify(Some(199.0)), QualityTier::Good);
        assert_eq!(t.classify(Some(200.0)), QualityTier::Insufficient);
        assert_eq!(t.classify(Some(2000.0)), QualityTier::Insufficient);
    }

    // The unit scale of the cut points is ambiguous across firmware
    // revisions: some report raw device units (defaults above), some report
    // kΩ. The classifier therefore takes its thresholds from configuration;
    // a kΩ deployment swaps in its own cut points like this.
    #[test]
    fn classify_with_kohm_scaled_thresholds() {
        let kohm = QualityThresholds {
            excellent_below: 5.0,
            good_below: 20.0,
        };
        assert_eq!(kohm.classify(Some(4.9)), QualityTier::Excellent);
        assert_eq!(kohm.classify(Some(12.0)), QualityTier::Good);
        assert_eq!(kohm.classify(Some(20.0)), QualityTier::Insufficient);
    }

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let mut w = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.push(v);
        }
        assert_eq!(w.snapshot(), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.latest(), Some(5.0));
    }

    #[test]
    fn window_holds_most_recent_min_pushes_capacity() {
        // For any number of pushes, the snapshot is the most recent
        // min(pushes, capacity) values in arrival order.
        for pushes in 0..130usize {
            let mut w = RollingWindow::new(DEFAULT_WINDOW_CAPACITY);
            for i in 0..pushes {
                w.push(i as f64);
            }
            let snap = w.snapshot();
            assert!(snap.len() <= DEFAULT_WINDOW_CAPACITY);
            let expect: Vec<f64> = (pushes.saturating_sub(DEFAULT_WINDOW_CAPACITY)..pushes)
                .map(|i| i as f64)
                .collect();
            assert_eq!(snap, expect);
        }
    }

    #[test]
    fn window_snapshot_does_not_mutate() {
        let mut w = RollingWindow::new(2);
        w.push(7.0);
        assert_eq!(w.snapshot(), w.snapshot());
        assert_eq!(w.len(), 1);
    }
}
