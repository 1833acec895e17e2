use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use lightbar::audio::RingRecorder;
use lightbar::ui::{TerminalGrid, spawn_keyboard_control};
use lightbar::{Visualizer, control_channel};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(&args.log_path())?;

    let settings = args.settings();
    settings.validate()?;

    // Without an audio source there is nothing to show; fail before touching
    // the terminal.
    let recorder = RingRecorder::start(&settings.audio)?;
    let sink = TerminalGrid::new(settings.strip.led_count, settings.strip.brightness)?;

    let (control, receiver) = control_channel();
    let mut visualizer = Visualizer::new(recorder, sink, &settings, receiver);

    let on_signal = control.clone();
    ctrlc::set_handler(move || {
        tracing::info!("termination signal received");
        on_signal.shutdown();
    })?;

    let keys = spawn_keyboard_control(control.clone())?;

    let result = visualizer.run();
    // Covers the error path: recorder and terminal are released exactly once.
    drop(visualizer);

    if keys.join().is_err() {
        tracing::error!("keyboard thread panicked");
    }

    if let Err(e) = &result {
        tracing::error!(error = %e, "render loop failed");
    }
    result.map_err(anyhow::Error::from)
}

fn init_tracing(path: &Path) -> Result<(), anyhow::Error> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_log_subscriber_is_reported() {
        let dir = std::env::temp_dir();
        let first = dir.join(format!("lightbar-test-{}-a.log", std::process::id()));
        let second = dir.join(format!("lightbar-test-{}-b.log", std::process::id()));

        init_tracing(&first).unwrap();
        let err = init_tracing(&second).unwrap_err();
        assert!(err.to_string().contains("log subscriber"));

        let _ = std::fs::remove_file(first);
        let _ = std::fs::remove_file(second);
    }

    #[test]
    fn unwritable_log_path_is_an_error() {
        let missing = std::env::temp_dir()
            .join("lightbar-no-such-dir")
            .join("nested")
            .join("lightbar.log");
        assert!(init_tracing(&missing).is_err());
    }
}
