use cpal::SampleFormat;

pub type Result<T> = std::result::Result<T, LightbarError>;

#[derive(Debug, thiserror::Error)]
pub enum LightbarError {
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("no input device matching `{0}`")]
    DeviceNotFound(String),
    #[error("unsupported sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),
    #[error(transparent)]
    Devices(#[from] cpal::DevicesError),
    #[error(transparent)]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
    /// The capture thread died before reporting whether the device opened.
    #[error("capture thread exited before the input device was opened")]
    CaptureThread,
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
    /// Rejected tuning value, reported once at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LightbarError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
