use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, InputCallbackInfo, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
    StreamError,
};
use crossbeam_channel::{self as chan, Receiver, Sender};

use crate::config::AudioSettings;
use crate::error::{LightbarError, Result};

/// Anything that hands out fixed-size capture windows.
pub trait WindowSource {
    /// Copies the latest completed window into `out` and returns `true`, or
    /// returns `false` if no window completed since the previous call.
    fn read(&mut self, out: &mut [i16]) -> bool;

    /// Stops producing windows and releases the underlying device. Idempotent.
    fn stop(&mut self);

    fn sample_rate(&self) -> u32;

    fn window_size(&self) -> usize;
}

struct Mailbox {
    samples: Vec<i16>,
    ready: bool,
}

#[derive(Clone)]
struct SharedWindow(Arc<Mutex<Mailbox>>);

impl SharedWindow {
    fn new(window_size: usize) -> SharedWindow {
        SharedWindow(Arc::new(Mutex::new(Mailbox {
            samples: vec![0; window_size],
            ready: false,
        })))
    }

    fn publish(&self, window: &[i16]) {
        let mut mailbox = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        mailbox.samples.copy_from_slice(window);
        mailbox.ready = true;
    }

    fn take(&self, out: &mut [i16]) -> bool {
        let mut mailbox = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !mailbox.ready {
            return false;
        }
        let n = out.len().min(mailbox.samples.len());
        out[..n].copy_from_slice(&mailbox.samples[..n]);
        mailbox.ready = false;
        true
    }
}

struct WindowFiller {
    window: Vec<i16>,
    filled: usize,
    shared: SharedWindow,
    overrun: Arc<AtomicBool>,
}

impl WindowFiller {
    fn push(&mut self, sample: i16) {
        self.window[self.filled] = sample;
        self.filled += 1;
        if self.filled == self.window.len() {
            self.shared.publish(&self.window);
            self.filled = 0;
        }
    }

    fn drop_partial_on_overrun(&mut self) {
        if self.overrun.swap(false, Ordering::AcqRel) {
            self.filled = 0;
        }
    }
}

pub struct RingRecorder {
    shared: SharedWindow,
    stop_tx: Option<Sender<()>>,
    capture: Option<JoinHandle<()>>,
    sample_rate: u32,
    window_size: usize,
}

struct Opened {
    sample_rate: u32,
    device_name: String,
}

impl RingRecorder {
    /// Opens the input device at its native rate and starts capturing.
    pub fn start(settings: &AudioSettings) -> Result<RingRecorder> {
        let window_size = settings.window_size;
        let shared = SharedWindow::new(window_size);
        let (ready_tx, ready_rx) = chan::bounded::<Result<Opened>>(1);
        let (stop_tx, stop_rx) = chan::bounded::<()>(1);

        let device = settings.device.clone();
        let filler_shared = shared.clone();
        let capture = thread::Builder::new()
            .name("lightbar-capture".into())
            .spawn(move || {
                capture_thread(device, window_size, filler_shared, ready_tx, stop_rx)
            })?;

        let opened = match ready_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = capture.join();
                return Err(e);
            }
            Err(_) => {
                let _ = capture.join();
                return Err(LightbarError::CaptureThread);
            }
        };

        tracing::info!(
            device = %opened.device_name,
            sample_rate = opened.sample_rate,
            window_size,
            "audio capture started"
        );

        Ok(RingRecorder {
            shared,
            stop_tx: Some(stop_tx),
            capture: Some(capture),
            sample_rate: opened.sample_rate,
            window_size,
        })
    }
}

impl WindowSource for RingRecorder {
    fn read(&mut self, out: &mut [i16]) -> bool {
        self.shared.take(out)
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the capture thread, which drops the stream.
        self.stop_tx.take();
        if let Some(capture) = self.capture.take() {
            if capture.join().is_err() {
                tracing::error!("capture thread panicked");
            }
            tracing::info!("audio capture stopped");
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn window_size(&self) -> usize {
        self.window_size
    }
}

impl Drop for RingRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(
    device: Option<String>,
    window_size: usize,
    shared: SharedWindow,
    ready_tx: Sender<Result<Opened>>,
    stop_rx: Receiver<()>,
) {
    let stream = match open_input(device.as_deref(), window_size, shared) {
        Ok((stream, opened)) => {
            let _ = ready_tx.send(Ok(opened));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Blocks until stop() sends or drops the sender.
    let _ = stop_rx.recv();

    if let Err(e) = stream.pause() {
        tracing::warn!(error = %e, "failed to pause input stream");
    }
    drop(stream);
}

fn open_input(
    wanted: Option<&str>,
    window_size: usize,
    shared: SharedWindow,
) -> Result<(Stream, Opened)> {
    let host = cpal::default_host();
    let device = select_device(&host, wanted)?;
    let device_name = device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string());

    let input_cfg = device.default_input_config()?;
    let cfg = input_cfg.config();
    let channels = cfg.channels as usize;
    let sample_rate = cfg.sample_rate.0;

    let filler = WindowFiller {
        window: vec![0; window_size],
        filled: 0,
        shared,
        overrun: Arc::new(AtomicBool::new(false)),
    };

    let stream = create_input_stream(&device, input_cfg.sample_format(), &cfg, channels, filler)?;
    Ok((
        stream,
        Opened {
            sample_rate,
            device_name,
        },
    ))
}

fn select_device(host: &cpal::Host, wanted: Option<&str>) -> Result<Device> {
    match wanted {
        None => host.default_input_device().ok_or(LightbarError::NoInputDevice),
        Some(wanted) => {
            let needle = wanted.to_lowercase();
            host.input_devices()?
                .find(|d| {
                    d.name()
                        .map(|name| name.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
                .ok_or_else(|| LightbarError::DeviceNotFound(wanted.to_string()))
        }
    }
}

fn build_input_stream<T>(
    device: &Device,
    cfg: &StreamConfig,
    channels: usize,
    mut filler: WindowFiller,
) -> Result<Stream>
where
    T: Sample + SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let overrun = filler.overrun.clone();
    let err_callback = move |err: StreamError| {
        tracing::warn!(error = %err, "input stream error, dropping partial window");
        overrun.store(true, Ordering::Release);
    };

    let input_callback = move |data: &[T], _info: &InputCallbackInfo| {
        filler.drop_partial_on_overrun();
        for frame in data.chunks(channels.max(1)) {
            let mono = frame.first().map(|s| i16::from_sample(*s)).unwrap_or(0);
            filler.push(mono);
        }
    };

    let latency = Some(Duration::from_millis(20));
    let stream = device.build_input_stream(cfg, input_callback, err_callback, latency)?;
    stream.play()?;
    Ok(stream)
}

fn create_input_stream(
    device: &Device,
    sample_format: SampleFormat,
    cfg: &StreamConfig,
    channels: usize,
    filler: WindowFiller,
) -> Result<Stream> {
    match sample_format {
        SampleFormat::F32 => build_input_stream::<f32>(device, cfg, channels, filler),
        SampleFormat::I16 => build_input_stream::<i16>(device, cfg, channels, filler),
        SampleFormat::U16 => build_input_stream::<u16>(device, cfg, channels, filler),
        other => Err(LightbarError::UnsupportedFormat(other)),
    }
}
