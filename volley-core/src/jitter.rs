use std::time::Duration;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use volley_model::JitterWindow;

/// Random source for per-job start delays.
///
/// Shared by every job of a run; seeding it makes the drawn delays reproducible.
#[derive(Debug)]
pub struct JitterSource {
    rng: Mutex<StdRng>,
}

impl JitterSource {
    pub fn from_os_rng() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draws a delay uniformly from `[min, max)`. No window means no delay.
    pub fn sample(&self, window: Option<&JitterWindow>) -> Duration {
        match window {
            None => Duration::ZERO,
            Some(window) if window.is_fixed() => window.min(),
            Some(window) => self.rng.lock().random_range(window.min()..window.max()),
        }
    }
}

impl Default for JitterSource {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_inside_window() {
        let source = JitterSource::seeded(7);
        let window = JitterWindow::new(1, 4).unwrap();
        for _ in 0..500 {
            let delay = source.sample(Some(&window));
            assert!(window.contains(delay), "{delay:?} escaped {window}");
        }
    }

    #[test]
    fn same_seed_draws_same_sequence() {
        let window = JitterWindow::new(0, 30).unwrap();
        let a = JitterSource::seeded(42);
        let b = JitterSource::seeded(42);
        let left: Vec<_> = (0..16).map(|_| a.sample(Some(&window))).collect();
        let right: Vec<_> = (0..16).map(|_| b.sample(Some(&window))).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn disabled_and_fixed_windows() {
        let source = JitterSource::seeded(1);
        assert_eq!(source.sample(None), Duration::ZERO);
        let fixed = JitterWindow::new(3, 3).unwrap();
        assert_eq!(source.sample(Some(&fixed)), Duration::from_secs(3));
        let zero = JitterWindow::new(0, 0).unwrap();
        assert_eq!(source.sample(Some(&zero)), Duration::ZERO);
    }
}
