/// Performance profiling helpers for tracking solver timing.
///
/// Provides RAII-style profiling scopes and the wall-clock frame timer that feeds the
/// quality controller.
use std::time::Instant;
use tracing::trace;

/// A profiling scope that measures elapsed time using RAII.
///
/// The elapsed time is emitted at `trace` level when dropped.
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
}

impl ProfilerScope {
    /// Creates a new profiling scope.
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Gets elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        trace!("{} took {:.3} ms", self.name, self.elapsed_ms());
    }
}

/// Wall-clock tick timer.
///
/// Tracks the previous tick timestamp to derive `dt`, and the duration of the last
/// completed frame.
pub struct FrameTimer {
    last_tick: Option<Instant>,
    last_frame_time_ms: f64,
}

impl FrameTimer {
    /// Creates a new frame timer.
    pub fn new() -> Self {
        Self {
            last_tick: None,
            last_frame_time_ms: 0.0,
        }
    }

    /// Seconds since the previous tick, or `None` on the first tick after a reset.
    pub fn advance(&mut self, now: Instant) -> Option<f32> {
        let elapsed = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f32());
        self.last_tick = Some(now);
        elapsed
    }

    /// Forget the previous tick so the next one does not see a large `dt`.
    pub fn reset(&mut self) {
        self.last_tick = None;
    }

    /// Records frame time in milliseconds.
    pub fn record(&mut self, time_ms: f64) {
        self.last_frame_time_ms = time_ms;
    }

    /// Gets the last recorded frame time.
    pub fn last_frame_time_ms(&self) -> f64 {
        self.last_frame_time_ms
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_profiler_scope_measures_time() {
        let scope = ProfilerScope::new("test");
        thread::sleep(Duration::from_millis(10));
        let elapsed = scope.elapsed_ms();
        assert!(elapsed >= 10.0, "Expected at least 10ms, got {elapsed}");
    }

    #[test]
    fn test_frame_timer_advance_and_reset() {
        let mut timer = FrameTimer::new();
        let start = Instant::now();
        assert_eq!(timer.advance(start), None);

        let dt = timer.advance(start + Duration::from_millis(16)).unwrap();
        assert!((dt - 0.016).abs() < 1e-6);

        timer.reset();
        assert_eq!(timer.advance(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_frame_timer_record() {
        let mut timer = FrameTimer::new();
        assert_eq!(timer.last_frame_time_ms(), 0.0);
        timer.record(16.7);
        assert_eq!(timer.last_frame_time_ms(), 16.7);
    }
}
