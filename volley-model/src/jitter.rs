use std::{fmt, str::FromStr, time::Duration};

use crate::error::{ModelError, Result};

/// Window, in whole seconds, from which each job draws its start delay.
///
/// Delays are sampled from the half-open range `[min, max)`. A window with
/// `min == max` is a fixed delay of `min` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JitterWindow {
    min_secs: u64,
    max_secs: u64,
}

impl JitterWindow {
    pub fn new(min_secs: u64, max_secs: u64) -> Result<Self> {
        if min_secs > max_secs {
            return Err(ModelError::InvalidJitter(format!(
                "lower bound {min_secs} exceeds upper bound {max_secs}"
            )));
        }
        Ok(Self { min_secs, max_secs })
    }

    /// Parses `"lo-hi"` or a bare `"hi"` (meaning `0-hi`).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let parse_bound = |value: &str| {
            value.trim().parse::<u64>().map_err(|_| {
                ModelError::InvalidJitter(format!("'{value}' is not a whole number of seconds"))
            })
        };

        match raw.split_once('-') {
            Some((lo, hi)) => Self::new(parse_bound(lo)?, parse_bound(hi)?),
            None => Self::new(0, parse_bound(raw)?),
        }
    }

    pub fn min(&self) -> Duration {
        Duration::from_secs(self.min_secs)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }

    pub fn is_fixed(&self) -> bool {
        self.min_secs == self.max_secs
    }

    /// Whether an observed delay falls inside the window.
    pub fn contains(&self, delay: Duration) -> bool {
        if self.is_fixed() {
            return delay == self.min();
        }
        delay >= self.min() && delay < self.max()
    }
}

impl FromStr for JitterWindow {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for JitterWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min_secs, self.max_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_value_starts_at_zero() {
        let window = JitterWindow::parse("5").unwrap();
        assert_eq!(window.min(), Duration::ZERO);
        assert_eq!(window.max(), Duration::from_secs(5));
    }

    #[test]
    fn range_value_keeps_both_bounds() {
        let window: JitterWindow = "2-7".parse().unwrap();
        assert_eq!(window.min(), Duration::from_secs(2));
        assert_eq!(window.max(), Duration::from_secs(7));
        assert!(window.contains(Duration::from_millis(2_500)));
        assert!(!window.contains(Duration::from_secs(7)));
    }

    #[test]
    fn inverted_or_garbage_windows_are_rejected() {
        assert!(JitterWindow::parse("9-3").is_err());
        assert!(JitterWindow::parse("a-3").is_err());
        assert!(JitterWindow::parse("").is_err());
    }

    #[test]
    fn equal_bounds_mean_fixed_delay() {
        let window = JitterWindow::parse("3-3").unwrap();
        assert!(window.is_fixed());
        assert!(window.contains(Duration::from_secs(3)));
        assert!(!window.contains(Duration::from_secs(2)));
    }
}
