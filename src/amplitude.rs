use std::collections::VecDeque;

use crate::config::AmplitudeSettings;

pub struct AmplitudeNormalizer {
    levels: Vec<f32>,
    normalized: Vec<f32>,
    /// Oldest peak at the front.
    history: VecDeque<f32>,
    /// Same length as `history`, non-decreasing from oldest to newest.
    weights: Vec<f32>,
    weight_total: f32,
    ceiling: f32,
    attack_weight: f32,
    decay_weight: f32,
    margin: f32,
    floor: f32,
}

impl AmplitudeNormalizer {
    pub fn new(bucket_count: usize, settings: &AmplitudeSettings) -> AmplitudeNormalizer {
        let history_len = settings.history_len.max(1);
        let weights = tier_weights(history_len, settings.tiers);
        let weight_total = weights.iter().sum();

        AmplitudeNormalizer {
            levels: vec![0.0; bucket_count],
            normalized: vec![0.0; bucket_count],
            history: VecDeque::from(vec![settings.ceiling_floor; history_len]),
            weights,
            weight_total,
            ceiling: settings.ceiling_floor,
            attack_weight: settings.attack_weight,
            decay_weight: settings.decay_weight,
            margin: settings.margin,
            floor: settings.ceiling_floor,
        }
    }

    /// Folds one frame of raw magnitudes into the smoothed levels and returns
    /// the normalized levels for this frame.
    pub fn update(&mut self, magnitudes: &[f32]) -> &[f32] {
        let mut peak = 0.0f32;
        for (level, &magnitude) in self.levels.iter_mut().zip(magnitudes) {
            let magnitude = magnitude.max(0.0);
            *level = if magnitude > *level {
                magnitude
            } else {
                (*level * self.decay_weight + magnitude * self.attack_weight)
                    / (self.decay_weight + self.attack_weight)
            };
            peak = peak.max(*level);
        }

        self.push_peak(peak);

        let ceiling = self.ceiling;
        for (out, level) in self.normalized.iter_mut().zip(&self.levels) {
            *out = (level / ceiling).clamp(0.0, 1.0);
        }
        &self.normalized
    }

    fn push_peak(&mut self, peak: f32) {
        self.history.pop_front();
        self.history.push_back(peak);

        let weighted: f32 = self
            .history
            .iter()
            .zip(&self.weights)
            .map(|(peak, weight)| peak * weight)
            .sum();
        self.ceiling = (weighted / self.weight_total * self.margin).max(self.floor);
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn normalized(&self) -> &[f32] {
        &self.normalized
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }
}

/// Weight `2^tier` for each history slot, tiers split as evenly as possible
/// with the newest slots in the highest tier.
fn tier_weights(history_len: usize, tiers: usize) -> Vec<f32> {
    let tiers = tiers.clamp(1, history_len);
    (0..history_len)
        .map(|slot| {
            let tier = slot * tiers / history_len;
            (1u32 << tier.min(31)) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> AmplitudeSettings {
        AmplitudeSettings::default()
    }

    #[test]
    fn attack_is_immediate() {
        let mut normalizer = AmplitudeNormalizer::new(1, &settings());
        normalizer.update(&[100.0]);
        assert_eq!(normalizer.levels()[0], 100.0);
    }

    #[test]
    fn decay_is_gradual() {
        let settings = settings();
        let mut normalizer = AmplitudeNormalizer::new(1, &settings);
        normalizer.update(&[100.0]);

        let keep = settings.decay_weight / (settings.decay_weight + settings.attack_weight);
        let mut previous = normalizer.levels()[0];
        for _ in 0..20 {
            normalizer.update(&[0.0]);
            let level = normalizer.levels()[0];
            assert!(level < previous, "{level} should fall below {previous}");
            // Never faster than the configured blend allows.
            assert!(level >= previous * keep * 0.999);
            previous = level;
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn normalized_levels_stay_in_unit_range() {
        let mut normalizer = AmplitudeNormalizer::new(4, &settings());
        let frames: [[f32; 4]; 5] = [
            [0.0, 0.0, 0.0, 0.0],
            [1e6, 3.0, 0.0, 2.5],
            [0.5, 1e9, 7.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [42.0, 42.0, 42.0, 42.0],
        ];
        for frame in &frames {
            for &level in normalizer.update(frame) {
                assert!((0.0..=1.0).contains(&level), "{level} escaped [0, 1]");
            }
            assert!(normalizer.ceiling() > 0.0);
        }
    }

    #[test]
    fn ceiling_never_drops_below_floor() {
        let settings = settings();
        let mut normalizer = AmplitudeNormalizer::new(2, &settings);
        for _ in 0..100 {
            normalizer.update(&[0.0, 0.0]);
            assert!(normalizer.ceiling() >= settings.ceiling_floor);
        }
    }

    #[test]
    fn ceiling_rises_within_one_history_window() {
        let settings = settings();
        let mut normalizer = AmplitudeNormalizer::new(2, &settings);
        for _ in 0..settings.history_len {
            normalizer.update(&[1000.0, 10.0]);
        }
        assert_relative_eq!(
            normalizer.ceiling(),
            1000.0 * settings.margin,
            max_relative = 1e-4
        );
    }

    #[test]
    fn ceiling_falls_within_one_history_window_of_silence() {
        let settings = settings();
        let mut normalizer = AmplitudeNormalizer::new(2, &settings);
        for _ in 0..settings.history_len {
            normalizer.update(&[1000.0, 10.0]);
        }
        let loud = normalizer.ceiling();

        let mut previous = loud;
        for _ in 0..settings.history_len {
            normalizer.update(&[0.0, 0.0]);
            assert!(normalizer.ceiling() <= previous);
            previous = normalizer.ceiling();
        }
        assert!(normalizer.ceiling() < loud * 0.1);
    }

    #[test]
    fn recent_peaks_weigh_more() {
        let mut settings = settings();
        settings.history_len = 4;
        settings.tiers = 2;
        settings.ceiling_floor = 0.001;

        // Same peaks, opposite order: the loud-last run ends with a higher ceiling.
        let mut loud_last = AmplitudeNormalizer::new(1, &settings);
        let mut loud_first = AmplitudeNormalizer::new(1, &settings);
        for peak in [100.0, 100.0, 0.0, 0.0] {
            loud_first.push_peak(peak);
        }
        for peak in [0.0, 0.0, 100.0, 100.0] {
            loud_last.push_peak(peak);
        }
        assert_relative_eq!(loud_first.ceiling(), 200.0 / 6.0 * settings.margin);
        assert_relative_eq!(loud_last.ceiling(), 400.0 / 6.0 * settings.margin);
    }

    #[test]
    fn weights_are_tiered_and_non_decreasing() {
        assert_eq!(tier_weights(6, 3), vec![1.0, 1.0, 2.0, 2.0, 4.0, 4.0]);
        assert_eq!(tier_weights(3, 1), vec![1.0, 1.0, 1.0]);
        let weights = tier_weights(30, 3);
        assert!(weights.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
