use std::time::Duration;

use crate::colors::VisualizationMode;
use crate::error::{LightbarError, Result};

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub spectrum: SpectrumSettings,
    pub amplitude: AmplitudeSettings,
    pub render: RenderSettings,
    pub strip: StripSettings,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    /// Substring of the input device name; `None` picks the host default.
    pub device: Option<String>,
    pub window_size: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            window_size: 4096,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpectrumSettings {
    pub min_frequency: f32,
    pub max_frequency: f32,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        // Below 16 Hz is inaudible, above 5 kHz is mostly hiss for a light show.
        Self {
            min_frequency: 16.0,
            max_frequency: 5_000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmplitudeSettings {
    pub attack_weight: f32,
    pub decay_weight: f32,
    /// Number of recent frame peaks the ceiling is averaged over.
    pub history_len: usize,
    /// Number of weight tiers across the history; tier `t` weighs `2^t`.
    pub tiers: usize,
    /// Multiplier applied to the weighted peak average, in `(0, 1)`.
    pub margin: f32,
    /// Seed for the history and lower bound for the ceiling.
    pub ceiling_floor: f32,
}

impl Default for AmplitudeSettings {
    fn default() -> Self {
        Self {
            attack_weight: 1.0,
            decay_weight: 2.0,
            history_len: 30,
            tiers: 3,
            margin: 0.9,
            ceiling_floor: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub mode: VisualizationMode,
    pub target_fps: u32,
    /// How long one iteration may wait on the control channel.
    pub control_poll: Duration,
    /// Log measured FPS every this many iterations; 0 disables it.
    pub fps_log_interval: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: VisualizationMode::default(),
            target_fps: 60,
            control_poll: Duration::from_millis(1),
            fps_log_interval: 300,
        }
    }
}

impl RenderSettings {
    /// Frame budget implied by `target_fps`; zero means "run unthrottled".
    pub fn frame_budget(&self) -> Duration {
        if self.target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.target_fps as f64)
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripSettings {
    pub led_count: usize,
    pub brightness: u8,
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            led_count: 300,
            brightness: 255,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.strip.led_count == 0 {
            return Err(LightbarError::config("led count must be at least 1"));
        }
        if self.audio.window_size < 2 || self.audio.window_size % 2 != 0 {
            return Err(LightbarError::config(format!(
                "window size must be an even number of samples, got {}",
                self.audio.window_size
            )));
        }

        let s = &self.spectrum;
        if !(s.min_frequency >= 0.0 && s.max_frequency > s.min_frequency) {
            return Err(LightbarError::config(format!(
                "frequency range {}..{} Hz is empty",
                s.min_frequency, s.max_frequency
            )));
        }

        let a = &self.amplitude;
        if !(a.attack_weight > 0.0 && a.decay_weight >= a.attack_weight) {
            return Err(LightbarError::config(
                "decay weight must be at least the (positive) attack weight",
            ));
        }
        if !(a.margin > 0.0 && a.margin < 1.0) {
            return Err(LightbarError::config(format!(
                "ceiling margin must lie strictly between 0 and 1, got {}",
                a.margin
            )));
        }
        if !(a.ceiling_floor > 0.0) {
            return Err(LightbarError::config("ceiling floor must be positive"));
        }
        if a.history_len == 0 || a.tiers == 0 || a.tiers > a.history_len {
            return Err(LightbarError::config(format!(
                "{} tiers cannot partition a history of {}",
                a.tiers, a.history_len
            )));
        }
        Ok(())
    }
}
