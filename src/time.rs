use std::time::{Duration, Instant};

/// Frame clock feeding camera movement.
pub struct Time {
    start: Instant,
    last: Instant,
    pub delta: Duration,
    frames: u64,
}

impl Time {
    /// Deltas above this are clamped so a stalled frame does not teleport the camera.
    const MAX_DELTA: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO, frames: 0 }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = (now - self.last).min(Self::MAX_DELTA);
        self.last = now;
        self.frames += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}
