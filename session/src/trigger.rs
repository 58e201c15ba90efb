use std::time::Duration;

/// Fires at most once per `interval` of accumulated frame time.
#[derive(Debug, Clone)]
pub struct TickTrigger {
    interval: f32,
    elapsed: f32,
}

impl TickTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.as_secs_f32(),
            elapsed: 0.0,
        }
    }

    /// Adds `dt` seconds and reports whether the interval has passed.
    pub fn test(&mut self, dt: f32) -> bool {
        self.elapsed += dt.max(0.0);
        if self.elapsed >= self.interval {
            self.elapsed = 0.0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}
