use std::collections::HashMap;

use crate::types::ProgressEvent;

/// Overall percentage of a multi-layer model pull.
///
/// Totals are summed across layer digests. The reported value never goes
/// down and stays below 100 while events arrive, since later layers may
/// still be announced. Only `finish` reports 100.
#[derive(Debug, Default)]
pub struct PullProgress {
    layers: HashMap<String, (u64, u64)>,
    reported: f64,
}

impl PullProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event. Returns the updated percentage for events that carry totals.
    pub fn observe(&mut self, event: &ProgressEvent) -> Option<f64> {
        let total = event.total.filter(|t| *t > 0)?;
        let completed = event.completed.unwrap_or(0).min(total);
        let key = event.digest.clone().unwrap_or_default();

        let layer = self.layers.entry(key).or_insert((0, total));
        layer.0 = layer.0.max(completed);
        layer.1 = total;

        let (done, all) = self
            .layers
            .values()
            .fold((0u64, 0u64), |(d, a), (c, t)| (d.saturating_add(*c), a.saturating_add(*t)));

        let raw = (done as f64 / all as f64 * 100.0).min(99.9);
        self.reported = self.reported.max(raw);
        Some(self.reported)
    }

    /// The pull reported success or its stream ended cleanly.
    pub fn finish(&mut self) -> f64 {
        self.reported = 100.0;
        self.reported
    }
}
