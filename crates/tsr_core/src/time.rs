//! Fixed-timestep clock.
//!
//! Wall-clock frame time feeds an accumulator measured in integer
//! microseconds; the shell drains it in `fixed_dt_us` slices. Animated tile
//! sequences advance with the same integer slices, so their frame counters do
//! not drift with floating-point rounding.

use std::time::Instant;

const FPS_SAMPLE_COUNT: usize = 60;

/// 60 Hz simulation step.
pub const DEFAULT_FIXED_DT_US: u64 = 16_667;

pub struct TimeState {
    pub fixed_dt_us: u64,
    pub max_frame_us: u64,
    accumulator_us: u64,
    pub total_time_us: u64,
    pub fixed_step_count: u64,
    pub frame_count: u64,
    pub steps_this_frame: u32,
    pub real_dt_us: u64,
    last_instant: Instant,

    fps_samples: [u64; FPS_SAMPLE_COUNT],
    fps_sample_index: usize,
    pub smoothed_fps: f64,
    pub smoothed_frame_time_ms: f64,
}

impl TimeState {
    pub fn new() -> Self {
        Self {
            fixed_dt_us: DEFAULT_FIXED_DT_US,
            max_frame_us: 250_000,
            accumulator_us: 0,
            total_time_us: 0,
            fixed_step_count: 0,
            frame_count: 0,
            steps_this_frame: 0,
            real_dt_us: 0,
            last_instant: Instant::now(),
            fps_samples: [DEFAULT_FIXED_DT_US; FPS_SAMPLE_COUNT],
            fps_sample_index: 0,
            smoothed_fps: 60.0,
            smoothed_frame_time_ms: 16.667,
        }
    }

    /// Measure wall-clock time since the previous frame and feed it in.
    pub fn begin_frame(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_instant).as_micros();
        self.last_instant = now;
        self.advance(u64::try_from(elapsed).unwrap_or(u64::MAX));
    }

    /// Feed an explicit frame duration. `begin_frame` goes through here too.
    pub fn advance(&mut self, elapsed_us: u64) {
        // Spiral-of-death cap
        self.real_dt_us = if elapsed_us > self.max_frame_us {
            log::warn!(
                "Frame took {:.1}ms, capping to {:.1}ms",
                elapsed_us as f64 / 1000.0,
                self.max_frame_us as f64 / 1000.0
            );
            self.max_frame_us
        } else {
            elapsed_us
        };

        self.accumulator_us += self.real_dt_us;
        self.steps_this_frame = 0;
        self.frame_count += 1;

        self.fps_samples[self.fps_sample_index] = self.real_dt_us;
        self.fps_sample_index = (self.fps_sample_index + 1) % FPS_SAMPLE_COUNT;
        let avg_us = self.fps_samples.iter().sum::<u64>() as f64 / FPS_SAMPLE_COUNT as f64;
        self.smoothed_frame_time_ms = avg_us / 1000.0;
        self.smoothed_fps = if avg_us > 0.0 { 1_000_000.0 / avg_us } else { 0.0 };
    }

    pub fn should_step(&mut self) -> bool {
        if self.accumulator_us >= self.fixed_dt_us {
            self.accumulator_us -= self.fixed_dt_us;
            self.total_time_us += self.fixed_dt_us;
            self.fixed_step_count += 1;
            self.steps_this_frame += 1;
            true
        } else {
            false
        }
    }

    /// Fixed step length in seconds, for velocity integration.
    pub fn fixed_dt_secs(&self) -> f32 {
        self.fixed_dt_us as f32 / 1_000_000.0
    }
}

impl Default for TimeState {
    fn default() -> Self {
        Self::new()
    }
}
