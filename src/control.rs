use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{self as chan, Receiver, Sender, TryRecvError};

use crate::colors::{self, VisualizationMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    SetMode(VisualizationMode),
    Shutdown,
}

#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<Control>,
    stopped: Receiver<()>,
    applied: Arc<AtomicUsize>,
}

pub struct ControlReceiver {
    rx: Receiver<Control>,
    stopped: Option<Sender<()>>,
    applied: Arc<AtomicUsize>,
}

pub fn control_channel() -> (ControlHandle, ControlReceiver) {
    let (tx, rx) = chan::unbounded();
    let (stopped_tx, stopped_rx) = chan::bounded(0);
    let applied = Arc::new(AtomicUsize::new(VisualizationMode::default().position()));
    (
        ControlHandle {
            tx,
            stopped: stopped_rx,
            applied: applied.clone(),
        },
        ControlReceiver {
            rx,
            stopped: Some(stopped_tx),
            applied,
        },
    )
}

impl ControlHandle {
    pub fn set_mode(&self, mode: VisualizationMode) {
        if self.tx.send(Control::SetMode(mode)).is_err() {
            tracing::debug!(%mode, "mode change after render loop stopped");
        }
    }

    /// Parses an untrusted key. Unknown keys are ignored and the current mode
    /// stays in place; returns whether a change was queued.
    pub fn select_mode(&self, key: &str) -> bool {
        match key.parse::<VisualizationMode>() {
            Ok(mode) => {
                self.set_mode(mode);
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "ignoring mode selection");
                false
            }
        }
    }

    pub fn current_modes(&self) -> &'static [(&'static str, &'static str)] {
        colors::current_modes()
    }

    /// The mode the render loop is drawing with right now.
    pub fn mode(&self) -> VisualizationMode {
        let position = self.applied.load(Ordering::Acquire);
        VisualizationMode::ALL
            .get(position)
            .copied()
            .unwrap_or_default()
    }

    /// Asks the loop to stop without waiting for it.
    pub fn request_shutdown(&self) {
        let _ = self.tx.send(Control::Shutdown);
    }

    /// Asks the loop to stop and waits until it has released the recorder and
    /// the sink. Returns at once if the loop is already gone. Must not be called
    /// from the render loop's own thread.
    pub fn shutdown(&self) {
        self.request_shutdown();
        // The loop never sends; recv returns when it drops its sender.
        let _ = self.stopped.recv();
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.stopped.try_recv(), Err(TryRecvError::Disconnected))
    }
}

impl ControlReceiver {
    /// Waits no longer than `timeout` for a message, then drains the backlog.
    /// A queued `Shutdown` beats any mode change; otherwise the last mode wins.
    pub fn poll(&self, timeout: Duration) -> Option<Control> {
        let first = if timeout.is_zero() {
            self.rx.try_recv().ok()
        } else {
            self.rx.recv_timeout(timeout).ok()
        }?;
        if first == Control::Shutdown {
            return Some(first);
        }

        let mut latest = first;
        for next in self.rx.try_iter() {
            if next == Control::Shutdown {
                return Some(next);
            }
            latest = next;
        }
        Some(latest)
    }

    pub fn publish_mode(&self, mode: VisualizationMode) {
        self.applied.store(mode.position(), Ordering::Release);
    }

    /// Releases every caller blocked in [`ControlHandle::shutdown`].
    pub fn mark_stopped(&mut self) {
        self.stopped.take();
    }
}
