use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};

use crate::audio::WindowSource;
use crate::config::SpectrumSettings;
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketLayout {
    /// First folded bin at or above the minimum frequency.
    pub min_bin: usize,
    /// One past the last folded bin within the maximum frequency.
    pub max_bin: usize,
    pub bins_per_bucket: usize,
    pub bucket_count: usize,
}

impl BucketLayout {
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        settings: &SpectrumSettings,
        bucket_count: usize,
    ) -> BucketLayout {
        let bin = |freq: f32| (freq as f64 * window_size as f64 / sample_rate.max(1) as f64) as usize;

        let max_bin = bin(settings.max_frequency).min(window_size / 2);
        let min_bin = bin(settings.min_frequency).min(max_bin.saturating_sub(1));
        let bins_per_bucket = (max_bin / bucket_count.max(1)).max(1);

        BucketLayout {
            min_bin,
            max_bin,
            bins_per_bucket,
            bucket_count,
        }
    }

    /// Distinct groups available before any replication kicks in.
    pub fn group_count(&self) -> usize {
        (self.max_bin - self.min_bin).div_ceil(self.bins_per_bucket)
    }

    pub fn bucket_center(&self, bucket: usize, sample_rate: u32, window_size: usize) -> f32 {
        let groups = self.group_count().max(1);
        let group = if groups >= self.bucket_count {
            bucket
        } else {
            bucket * groups / self.bucket_count.max(1)
        };
        let center_bin = self.min_bin as f32 + (group as f32 + 0.5) * self.bins_per_bucket as f32;
        center_bin * sample_rate as f32 / window_size as f32
    }
}

pub struct SpectralAnalyzer {
    r2c: Arc<dyn RealToComplex<f32>>,
    samples: Vec<i16>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    magnitudes: Vec<f32>,
    folded: Vec<f32>,
    buckets: Vec<f32>,
    layout: BucketLayout,
}

impl SpectralAnalyzer {
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        settings: &SpectrumSettings,
        bucket_count: usize,
    ) -> SpectralAnalyzer {
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(window_size);

        let input = r2c.make_input_vec();
        let spectrum = r2c.make_output_vec();
        let scratch = r2c.make_scratch_vec();

        let window: Vec<f32> = (0..window_size)
            .map(|i| {
                let n = i as f32;
                0.5 - 0.5 * ((2.0 * std::f32::consts::PI * n) / window_size as f32).cos()
            })
            .collect();

        let layout = BucketLayout::new(sample_rate, window_size, settings, bucket_count);
        if layout.group_count() < bucket_count {
            tracing::warn!(
                groups = layout.group_count(),
                buckets = bucket_count,
                "frequency range too narrow for bucket count, replicating buckets"
            );
        }

        SpectralAnalyzer {
            r2c,
            samples: vec![0; window_size],
            window,
            input,
            spectrum,
            scratch,
            magnitudes: vec![0.0; window_size],
            folded: vec![0.0; window_size / 2],
            buckets: vec![0.0; bucket_count],
            layout,
        }
    }

    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    /// Pulls the next window from `source`. `None` means no window completed
    /// since the last call and the previous levels should be reused.
    pub fn next_buckets<S: WindowSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<&[f32]>> {
        if !source.read(&mut self.samples) {
            return Ok(None);
        }
        self.transform().map(Some)
    }

    pub fn analyze(&mut self, samples: &[i16]) -> Result<&[f32]> {
        let n = samples.len().min(self.samples.len());
        self.samples[..n].copy_from_slice(&samples[..n]);
        self.samples[n..].fill(0);
        self.transform()
    }

    fn transform(&mut self) -> Result<&[f32]> {
        for ((x, &s), &w) in self.input.iter_mut().zip(&self.samples).zip(&self.window) {
            *x = s as f32 / 32768.0 * w;
        }

        self.r2c
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        // Rebuild the full, mirrored magnitude spectrum from the half spectrum.
        let n = self.magnitudes.len();
        for (k, c) in self.spectrum.iter().enumerate() {
            let mag = c.norm();
            self.magnitudes[k] = mag;
            if k != 0 && k != n - k {
                self.magnitudes[n - k] = mag;
            }
        }

        fold_spectrum(&self.magnitudes, &mut self.folded);

        let usable = &self.folded[self.layout.min_bin..self.layout.max_bin];
        compress_bins(usable, self.layout.bins_per_bucket, &mut self.buckets);
        Ok(&self.buckets)
    }
}

/// Sums the first half of a symmetric magnitude spectrum with its reversed
/// second half. `out` must hold `magnitudes.len() / 2` bins.
pub fn fold_spectrum(magnitudes: &[f32], out: &mut [f32]) {
    let (left, right) = magnitudes.split_at(magnitudes.len() / 2);
    for ((slot, l), r) in out.iter_mut().zip(left).zip(right.iter().rev()) {
        *slot = l + r;
    }
}

/// Sums consecutive runs of `bins_per_bucket` bins into `out`.
pub fn compress_bins(bins: &[f32], bins_per_bucket: usize, out: &mut [f32]) {
    let bins_per_bucket = bins_per_bucket.max(1);
    let groups = bins.len().div_ceil(bins_per_bucket);
    if groups == 0 {
        out.fill(0.0);
        return;
    }

    let count = out.len();
    for (bucket, slot) in out.iter_mut().enumerate() {
        let group = if groups >= count {
            bucket
        } else {
            bucket * groups / count
        };
        let start = group * bins_per_bucket;
        let end = (start + bins_per_bucket).min(bins.len());
        *slot = bins[start..end].iter().sum();
    }
}
