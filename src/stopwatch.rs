use std::time::Duration;
use tokio::time::Instant;

/// Study timer. Paused time does not count.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started() -> Self {
        let mut stopwatch = Self::new();
        stopwatch.start();
        stopwatch
    }

    /// Starts or resumes. No-op while running.
    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        self.start();
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated
            + self
                .running_since
                .map(|since| since.elapsed())
                .unwrap_or_default()
    }

    /// Returns the total and resets to zero.
    pub fn stop(&mut self) -> Duration {
        let total = self.elapsed();
        *self = Self::default();
        total
    }
}

/// Hours rounded to two decimals, the precision study logs are recorded at.
pub fn hours(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() / 3600.0 * 100.0).round() / 100.0
}

pub fn format_hms(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
