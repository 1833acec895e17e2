pub mod amplitude;
pub mod audio;
pub mod colors;
pub mod config;
pub mod control;
pub mod error;
pub mod render;
pub mod sink;
pub mod spectrum;
pub mod types;
pub mod ui;

pub use colors::{VisualizationMode, current_modes};
pub use config::Settings;
pub use control::{ControlHandle, control_channel};
pub use error::{LightbarError, Result};
pub use render::Visualizer;
pub use types::Rgb;
