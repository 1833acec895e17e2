use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::types::Rgb;

const HUE_ROTATION_SECS: f64 = 8.0;

const QUIET_HUE: f64 = 0.7;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VisualizationMode {
    FrequencyColor,
    SingleFrequencyAmplitude,
    ColorChangeFrequencyAmplitude,
    #[default]
    FrequencyColorFrequencyAmplitude,
    FrequencyColorShiftFrequencyAmplitude,
}

const MODE_CHOICES: [(&str, &str); 5] = [
    ("frequency_color", "Frequency Color"),
    ("single_frequency_amplitude", "Single Frequency Color"),
    (
        "color_change_frequency_amplitude",
        "Color Change Frequency Amplitude",
    ),
    (
        "frequency_color_frequency_amplitude",
        "Frequency Color Frequency Amplitude",
    ),
    (
        "frequency_color_shift_frequency_amplitude",
        "Frequency Color Shift Frequency Amplitude",
    ),
];

/// `(key, label)` pairs in the order a control surface should list them.
pub fn current_modes() -> &'static [(&'static str, &'static str)] {
    &MODE_CHOICES
}

impl VisualizationMode {
    pub const ALL: [VisualizationMode; 5] = [
        VisualizationMode::FrequencyColor,
        VisualizationMode::SingleFrequencyAmplitude,
        VisualizationMode::ColorChangeFrequencyAmplitude,
        VisualizationMode::FrequencyColorFrequencyAmplitude,
        VisualizationMode::FrequencyColorShiftFrequencyAmplitude,
    ];

    pub(crate) fn position(self) -> usize {
        match self {
            VisualizationMode::FrequencyColor => 0,
            VisualizationMode::SingleFrequencyAmplitude => 1,
            VisualizationMode::ColorChangeFrequencyAmplitude => 2,
            VisualizationMode::FrequencyColorFrequencyAmplitude => 3,
            VisualizationMode::FrequencyColorShiftFrequencyAmplitude => 4,
        }
    }

    pub fn key(self) -> &'static str {
        MODE_CHOICES[self.position()].0
    }

    pub fn label(self) -> &'static str {
        MODE_CHOICES[self.position()].1
    }

    pub fn next(self) -> VisualizationMode {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    /// Color of pixel `index` out of `count` for a normalized `level`.
    pub fn color(self, level: f32, index: usize, count: usize, elapsed: Duration) -> Rgb {
        let level = (level as f64).clamp(0.0, 1.0);
        let position = index as f64 / count.max(1) as f64;
        let rotation = elapsed.as_secs_f64() / HUE_ROTATION_SECS;

        match self {
            VisualizationMode::FrequencyColor => {
                hue_to_rgb((QUIET_HUE - level).rem_euclid(1.0))
            }
            VisualizationMode::SingleFrequencyAmplitude => scale_base(Rgb::WHITE, level),
            VisualizationMode::ColorChangeFrequencyAmplitude => {
                let [r, g, b] = hsv_channels(rotation.rem_euclid(1.0));
                let scale = |c: f64| ((c * 255.0 * level) as u32).min(255) as u8;
                Rgb::new(scale(r), scale(g), scale(b))
            }
            VisualizationMode::FrequencyColorFrequencyAmplitude => {
                scale_base(hue_to_rgb(position), level)
            }
            VisualizationMode::FrequencyColorShiftFrequencyAmplitude => {
                scale_base(hue_to_rgb((position + rotation).rem_euclid(1.0)), level)
            }
        }
    }
}

impl fmt::Display for VisualizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown visualization mode `{0}`")]
pub struct UnknownMode(pub String);

impl FromStr for VisualizationMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.key() == key)
            .ok_or_else(|| UnknownMode(key.to_string()))
    }
}

fn scale_base(base: Rgb, level: f64) -> Rgb {
    let scale = |c: u8| ((c as f64 * level) as u32).min(c as u32) as u8;
    Rgb::new(scale(base.r), scale(base.g), scale(base.b))
}

/// HSV to RGB at full saturation and value, channels in `[0, 1]`.
///
/// Follows the textbook six-sector construction, including computing the
/// rising channel as `1 - (1 - f)`, so the truncated 8-bit values match other
/// standard implementations bit for bit at the sector boundaries.
pub fn hsv_channels(hue: f64) -> [f64; 3] {
    let scaled = hue * 6.0;
    let sector = scaled as i64;
    let f = scaled - sector as f64;
    let q = 1.0 - f;
    let t = 1.0 - (1.0 - f);
    match sector.rem_euclid(6) {
        0 => [1.0, t, 0.0],
        1 => [q, 1.0, 0.0],
        2 => [0.0, 1.0, t],
        3 => [0.0, q, 1.0],
        4 => [t, 0.0, 1.0],
        _ => [1.0, 0.0, q],
    }
}

pub fn hue_to_rgb(hue: f64) -> Rgb {
    let [r, g, b] = hsv_channels(hue.clamp(0.0, 1.0));
    Rgb::new((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}
