use std::path::PathBuf;

use clap::Parser;
use lightbar::VisualizationMode;
use lightbar::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "lightbar")]
#[command(about = "Turns live microphone audio into colors on a light strip", long_about = None)]
pub struct Args {
    /// Number of pixels; one spectrum bucket drives each
    #[arg(long, env = "LED_COUNT", default_value_t = 300)]
    pub led_count: usize,

    /// Global brightness, 0 (off) to 255 (full)
    #[arg(long, env = "LED_BRIGHTNESS", default_value_t = 255)]
    pub led_brightness: u8,

    /// Input device to capture from (case-insensitive name substring)
    #[arg(long, env = "LIGHTBAR_DEVICE")]
    pub device: Option<String>,

    /// Samples per capture window
    #[arg(long, env = "LIGHTBAR_WINDOW_SIZE", default_value_t = 4096)]
    pub window_size: usize,

    /// Ignore frequencies below this (Hz)
    #[arg(long, env = "LIGHTBAR_MIN_FREQUENCY", default_value_t = 16.0)]
    pub min_frequency: f32,

    /// Ignore frequencies above this (Hz)
    #[arg(long, env = "LIGHTBAR_MAX_FREQUENCY", default_value_t = 5000.0)]
    pub max_frequency: f32,

    /// Starting visualization mode
    #[arg(long, env = "LIGHTBAR_MODE", default_value_t = VisualizationMode::default())]
    pub mode: VisualizationMode,

    /// Target frames per second, 0 for unthrottled
    #[arg(long, env = "LIGHTBAR_FPS", default_value_t = 60)]
    pub fps: u32,

    /// Log measured FPS every this many frames, 0 to disable
    #[arg(long, env = "LIGHTBAR_FPS_LOG_INTERVAL", default_value_t = 300)]
    pub fps_log_interval: u64,

    /// Log file (the terminal is busy drawing the grid)
    #[arg(long, env = "LIGHTBAR_LOG", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.audio.device = self.device.clone();
        settings.audio.window_size = self.window_size;
        settings.spectrum.min_frequency = self.min_frequency;
        settings.spectrum.max_frequency = self.max_frequency;
        settings.render.mode = self.mode;
        settings.render.target_fps = self.fps;
        settings.render.fps_log_interval = self.fps_log_interval;
        settings.strip.led_count = self.led_count;
        settings.strip.brightness = self.led_brightness;
        settings
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("lightbar.log"))
    }
}
