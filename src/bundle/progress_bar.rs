//! Iteration progress display.
//!
//! With the `progress` feature the driver shows an `indicatif` bar over the iteration budget,
//! with the last and smoothed iteration durations and the current σ₀. Without the feature
//! [`IterationProgress`] is a no-op.
//!
//! The smoothing is an exponential moving average `ema ← α·dt + (1–α)·ema`, seeded by the first
//! lap.
#[cfg(feature = "progress")]
use std::time::{Duration, Instant};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// Wall-clock time per bundle iteration, smoothed with weight `alpha` on the latest lap.
#[cfg(feature = "progress")]
pub struct IterationClock {
    started: Instant,
    smoothed: Option<f64>,
    alpha: f64,
}

#[cfg(feature = "progress")]
impl IterationClock {
    pub fn new(alpha: f64) -> Self {
        Self {
            started: Instant::now(),
            smoothed: None,
            alpha: alpha.clamp(f64::EPSILON, 1.0),
        }
    }

    /// Close the current lap and return its duration.
    pub fn lap(&mut self) -> Duration {
        let dt = self.started.elapsed();
        self.started = Instant::now();
        let secs = dt.as_secs_f64();
        self.smoothed = Some(match self.smoothed {
            None => secs,
            Some(ema) => self.alpha * secs + (1.0 - self.alpha) * ema,
        });
        dt
    }

    pub fn smoothed(&self) -> Duration {
        self.smoothed.map_or(Duration::ZERO, Duration::from_secs_f64)
    }
}

/// `"253µs"`, `"42ms"` or `"3.14s"` depending on the scale.
#[cfg(feature = "progress")]
pub fn short_duration(d: Duration) -> String {
    match d.as_micros() {
        us @ 0..=999 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}

pub struct IterationProgress {
    #[cfg(feature = "progress")]
    bar: ProgressBar,
    #[cfg(feature = "progress")]
    clock: IterationClock,
}

impl IterationProgress {
    #[cfg(feature = "progress")]
    pub fn new(max_iterations: usize) -> Self {
        let bar = ProgressBar::new((max_iterations as u64).max(1));
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
        ) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        Self {
            bar,
            clock: IterationClock::new(0.2),
        }
    }

    #[cfg(not(feature = "progress"))]
    pub fn new(_max_iterations: usize) -> Self {
        Self {}
    }

    /// Record the end of an iteration.
    #[cfg(feature = "progress")]
    pub fn iteration_done(&mut self, sigma0: f64) {
        let last = self.clock.lap();
        self.bar.set_message(format!(
            "sigma0: {sigma0:.6e}, last: {}, avg: {}",
            short_duration(last),
            short_duration(self.clock.smoothed())
        ));
        self.bar.inc(1);
    }

    #[cfg(not(feature = "progress"))]
    pub fn iteration_done(&mut self, _sigma0: f64) {}

    #[cfg(feature = "progress")]
    pub fn finish(&self, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }

    #[cfg(not(feature = "progress"))]
    pub fn finish(&self, _message: &str) {}
}

#[cfg(all(test, feature = "progress"))]
mod tests {
    use super::*;

    #[test]
    fn test_short_duration_scales() {
        assert_eq!(short_duration(Duration::from_micros(253)), "253µs");
        assert_eq!(short_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(short_duration(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_clock_smoothing_starts_at_first_lap() {
        let mut clock = IterationClock::new(0.5);
        assert_eq!(clock.smoothed(), Duration::ZERO);
        let first = clock.lap();
        let diff = clock.smoothed().as_secs_f64() - first.as_secs_f64();
        assert!(diff.abs() < 1.0e-9);
    }
}
