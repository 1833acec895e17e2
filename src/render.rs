use std::thread;
use std::time::Instant;

use crate::amplitude::AmplitudeNormalizer;
use crate::audio::WindowSource;
use crate::colors::VisualizationMode;
use crate::config::{RenderSettings, Settings};
use crate::control::{Control, ControlReceiver};
use crate::error::Result;
use crate::sink::{LightSink, emit_frame};
use crate::spectrum::SpectralAnalyzer;
use crate::types::Rgb;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

struct FpsMeter {
    interval: u64,
    iterations: u64,
    since: Instant,
}

impl FpsMeter {
    fn new(interval: u64) -> FpsMeter {
        FpsMeter {
            interval,
            iterations: 0,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) -> Option<f64> {
        if self.interval == 0 {
            return None;
        }
        self.iterations += 1;
        if self.iterations % self.interval != 0 {
            return None;
        }
        let now = Instant::now();
        let secs = now.duration_since(self.since).as_secs_f64();
        self.since = now;
        (secs > 0.0).then(|| self.interval as f64 / secs)
    }
}

/// Drives capture → spectrum → normalization → color → sink, one frame per
/// iteration, and owns every resource on that path.
pub struct Visualizer<S: WindowSource, K: LightSink> {
    source: S,
    sink: K,
    analyzer: SpectralAnalyzer,
    normalizer: AmplitudeNormalizer,
    control: ControlReceiver,
    mode: VisualizationMode,
    /// Normalized levels from the most recent window.
    levels: Vec<f32>,
    /// Set once the first window has been analyzed; levels carry over after that.
    fresh: bool,
    frame: Vec<Rgb>,
    started: Instant,
    state: LoopState,
    render: RenderSettings,
    fps: FpsMeter,
}

impl<S: WindowSource, K: LightSink> Visualizer<S, K> {
    pub fn new(source: S, sink: K, settings: &Settings, control: ControlReceiver) -> Self {
        let count = sink.pixel_count();
        let analyzer = SpectralAnalyzer::new(
            source.sample_rate(),
            source.window_size(),
            &settings.spectrum,
            count,
        );
        let normalizer = AmplitudeNormalizer::new(count, &settings.amplitude);
        control.publish_mode(settings.render.mode);

        Visualizer {
            source,
            sink,
            analyzer,
            normalizer,
            control,
            mode: settings.render.mode,
            levels: vec![0.0; count],
            fresh: false,
            frame: vec![Rgb::BLACK; count],
            started: Instant::now(),
            state: LoopState::Running,
            render: settings.render.clone(),
            fps: FpsMeter::new(settings.render.fps_log_interval),
        }
    }

    pub fn mode(&self) -> VisualizationMode {
        self.mode
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn run(&mut self) -> Result<()> {
        let budget = self.render.frame_budget();
        while self.state == LoopState::Running {
            let frame_start = Instant::now();
            self.step()?;

            let spent = frame_start.elapsed();
            if self.state == LoopState::Running && spent < budget {
                thread::sleep(budget - spent);
            }
        }
        Ok(())
    }

    /// One iteration. Returns whether a frame reached the sink.
    pub fn step(&mut self) -> Result<bool> {
        if self.state == LoopState::Stopped {
            return Ok(false);
        }

        match self.control.poll(self.render.control_poll) {
            Some(Control::SetMode(mode)) if mode != self.mode => {
                tracing::info!(from = %self.mode, to = %mode, "visualization mode changed");
                self.mode = mode;
                self.control.publish_mode(mode);
            }
            Some(Control::SetMode(_)) | None => {}
            Some(Control::Shutdown) => {
                self.shutdown()?;
                return Ok(false);
            }
        }

        if let Some(buckets) = self.analyzer.next_buckets(&mut self.source)? {
            let normalized = self.normalizer.update(buckets);
            self.levels.copy_from_slice(normalized);
            self.fresh = true;
        }

        if let Some(fps) = self.fps.tick() {
            tracing::info!(fps, "render rate");
        }

        if !self.fresh {
            return Ok(false);
        }

        // The whole frame is computed before the sink sees any of it.
        let elapsed = self.started.elapsed();
        let count = self.frame.len();
        let mode = self.mode;
        for (index, (pixel, &level)) in self.frame.iter_mut().zip(&self.levels).enumerate() {
            *pixel = mode.color(level, index, count, elapsed);
        }
        emit_frame(&mut self.sink, &self.frame)?;
        Ok(true)
    }

    /// Stops the recorder (joining its capture thread), releases the sink and
    /// wakes anyone waiting in `ControlHandle::shutdown`. Safe to call twice.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == LoopState::Stopped {
            return Ok(());
        }
        self.state = LoopState::Stopped;

        self.source.stop();
        let released = self.sink.release();
        self.control.mark_stopped();
        tracing::info!("render loop stopped");
        released
    }
}

impl<S: WindowSource, K: LightSink> Drop for Visualizer<S, K> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "failed to release sink");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::control_channel;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedSource {
        windows: VecDeque<Vec<i16>>,
        stops: usize,
    }

    impl ScriptedSource {
        fn new(windows: Vec<Vec<i16>>) -> Self {
            ScriptedSource {
                windows: windows.into(),
                stops: 0,
            }
        }
    }

    impl WindowSource for ScriptedSource {
        fn read(&mut self, out: &mut [i16]) -> bool {
            match self.windows.pop_front() {
                Some(window) => {
                    out.copy_from_slice(&window);
                    true
                }
                None => false,
            }
        }

        fn stop(&mut self) {
            self.stops += 1;
        }

        fn sample_rate(&self) -> u32 {
            8_000
        }

        fn window_size(&self) -> usize {
            256
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        staged: Vec<Rgb>,
        frames: Vec<Vec<Rgb>>,
        releases: usize,
    }

    impl RecordingSink {
        fn new(count: usize) -> Self {
            RecordingSink {
                staged: vec![Rgb::BLACK; count],
                ..Default::default()
            }
        }
    }

    impl LightSink for RecordingSink {
        fn pixel_count(&self) -> usize {
            self.staged.len()
        }

        fn set(&mut self, index: usize, r: u8, g: u8, b: u8) {
            self.staged[index] = Rgb::new(r, g, b);
        }

        fn present(&mut self) -> Result<()> {
            self.frames.push(self.staged.clone());
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.releases += 1;
            Ok(())
        }
    }

    fn tone(freq: f32) -> Vec<i16> {
        (0..256)
            .map(|i| (12_000.0 * (2.0 * std::f32::consts::PI * freq * i as f32 / 8_000.0).sin()) as i16)
            .collect()
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.spectrum.max_frequency = 4_000.0;
        settings.render.control_poll = Duration::ZERO;
        settings.render.fps_log_interval = 0;
        settings
    }

    fn visualizer(
        windows: Vec<Vec<i16>>,
    ) -> (
        Visualizer<ScriptedSource, RecordingSink>,
        crate::control::ControlHandle,
    ) {
        let (handle, receiver) = control_channel();
        let viz = Visualizer::new(
            ScriptedSource::new(windows),
            RecordingSink::new(8),
            &settings(),
            receiver,
        );
        (viz, handle)
    }

    #[test]
    fn nothing_is_emitted_before_the_first_window() {
        let (mut viz, _handle) = visualizer(vec![]);
        assert!(!viz.step().unwrap());
        assert!(viz.sink().frames.is_empty());
    }

    #[test]
    fn levels_carry_over_when_no_window_arrives() {
        let (mut viz, _handle) = visualizer(vec![tone(1_000.0)]);
        assert!(viz.step().unwrap());
        let levels = viz.levels().to_vec();
        assert!(levels.iter().any(|&l| l > 0.0));

        assert!(viz.step().unwrap());
        assert_eq!(viz.levels(), levels.as_slice());
        assert_eq!(viz.sink().frames.len(), 2);
        assert_eq!(viz.sink().frames[0], viz.sink().frames[1]);
    }

    #[test]
    fn mode_switch_applies_from_the_next_frame() {
        let (mut viz, handle) = visualizer(vec![tone(1_000.0)]);
        assert!(viz.step().unwrap());
        let frame_n = viz.sink().frames[0].clone();

        handle.set_mode(VisualizationMode::SingleFrequencyAmplitude);
        assert!(viz.step().unwrap());

        let frames = &viz.sink().frames;
        assert_eq!(frames[0], frame_n);
        assert_eq!(viz.mode(), VisualizationMode::SingleFrequencyAmplitude);
        // White scaling means every pixel is grey.
        assert!(frames[1].iter().all(|c| c.r == c.g && c.g == c.b));
        assert_ne!(frames[1], frame_n);
    }

    #[test]
    fn unknown_mode_keeps_current_mode() {
        let (mut viz, handle) = visualizer(vec![tone(1_000.0)]);
        let before = viz.mode();
        assert!(!handle.select_mode("strobe"));
        viz.step().unwrap();
        assert_eq!(viz.mode(), before);
    }

    #[test]
    fn shutdown_releases_everything_once() {
        let (mut viz, handle) = visualizer(vec![tone(1_000.0), tone(2_000.0)]);
        assert!(viz.step().unwrap());

        handle.request_shutdown();
        assert!(!viz.step().unwrap());
        assert_eq!(viz.state(), LoopState::Stopped);
        assert!(handle.is_stopped());

        viz.shutdown().unwrap();
        assert!(!viz.step().unwrap());
        assert_eq!(viz.source.stops, 1);
        assert_eq!(viz.sink().releases, 1);
        assert_eq!(viz.sink().frames.len(), 1);
    }

    #[test]
    fn shutdown_is_not_starved_by_queued_mode_changes() {
        let (mut viz, handle) = visualizer(vec![tone(1_000.0)]);
        for i in 0..10_000 {
            handle.set_mode(VisualizationMode::ALL[i % VisualizationMode::ALL.len()]);
        }
        handle.request_shutdown();

        assert!(!viz.step().unwrap());
        assert_eq!(viz.state(), LoopState::Stopped);
        assert!(handle.is_stopped());
        assert!(viz.sink().frames.is_empty());
    }

    #[test]
    fn burst_of_mode_changes_lands_on_the_last_one() {
        let (mut viz, handle) = visualizer(vec![tone(1_000.0)]);
        for _ in 0..500 {
            handle.set_mode(VisualizationMode::FrequencyColor);
            handle.set_mode(VisualizationMode::ColorChangeFrequencyAmplitude);
        }
        assert!(viz.step().unwrap());
        assert_eq!(viz.mode(), VisualizationMode::ColorChangeFrequencyAmplitude);
        assert_eq!(handle.mode(), VisualizationMode::ColorChangeFrequencyAmplitude);
        assert!(viz.step().unwrap());
        assert_eq!(viz.mode(), VisualizationMode::ColorChangeFrequencyAmplitude);
    }

    #[test]
    fn run_returns_after_shutdown_request() {
        let (mut viz, handle) = visualizer(vec![tone(500.0)]);
        handle.request_shutdown();
        viz.run().unwrap();
        assert_eq!(viz.state(), LoopState::Stopped);
    }

    #[test]
    fn fps_meter_reports_on_interval() {
        let mut meter = FpsMeter::new(3);
        assert_eq!(meter.tick(), None);
        assert_eq!(meter.tick(), None);
        thread::sleep(Duration::from_millis(2));
        assert!(meter.tick().is_some());

        let mut disabled = FpsMeter::new(0);
        assert!((0..10).all(|_| disabled.tick().is_none()));
    }
}
