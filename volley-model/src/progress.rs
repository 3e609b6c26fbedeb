use std::fmt;

/// Point-in-time view of job completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    /// `completed / total * 100`, rounded to two decimals. An empty run is 100%.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let raw = self.completed as f64 / self.total as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completed: {:.2}% ({}/{})",
            self.percentage(),
            self.completed,
            self.total
        )
    }
}
