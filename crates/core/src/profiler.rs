/// Timing helpers for loads and frame builds.
///
/// Provides RAII-style profiling scopes and a frame timer with a budget.
use std::time::Instant;

/// A profiling scope that measures elapsed time using RAII.
///
/// Elapsed time is emitted at `trace` level when dropped.
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
        tracing::trace!(scope = self.name, elapsed_ms = self.elapsed_ms());
    }
}

/// Frame timer tracking build times against a budget.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    budget_ms: f64,
    worst_frame_time_ms: f64,
    frames: u64,
    over_budget: u64,
}

impl FrameTimer {
    /// Creates a new frame timer with the given per-frame budget.
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            worst_frame_time_ms: 0.0,
            frames: 0,
            over_budget: 0,
        }
    }

    /// Records frame time in milliseconds. Returns `true` if it exceeded the budget.
    pub fn record(&mut self, time_ms: f64) -> bool {
        self.worst_frame_time_ms = self.worst_frame_time_ms.max(time_ms);
        self.frames += 1;
        let over = time_ms > self.budget_ms;
        if over {
            self.over_budget += 1;
        }
        over
    }

    /// Slowest frame so far.
    pub fn worst_frame_time_ms(&self) -> f64 {
        self.worst_frame_time_ms
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames that exceeded the budget.
    pub fn over_budget(&self) -> u64 {
        self.over_budget
    }

    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }
}

impl Default for FrameTimer {
    /// 30fps budget
    fn default() -> Self {
        Self::new(33.0)
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
    fn test_frame_timer() {
        let mut timer = FrameTimer::new(20.0);
        assert_eq!(timer.worst_frame_time_ms(), 0.0);

        assert!(!timer.record(16.7));
        assert_eq!(timer.worst_frame_time_ms(), 16.7);

        assert!(timer.record(25.0));
        assert!(!timer.record(8.3));
        assert_eq!(timer.worst_frame_time_ms(), 25.0);
        assert_eq!(timer.frames(), 3);
        assert_eq!(timer.over_budget(), 1);
    }
}
