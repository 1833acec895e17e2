use crate::error::Result;
use crate::types::Rgb;

/// Where finished frames go. A physical strip driver and the terminal grid
/// both implement this.
pub trait LightSink {
    fn pixel_count(&self) -> usize;

    /// Stages one pixel; nothing is visible until [`present`](Self::present).
    fn set(&mut self, index: usize, r: u8, g: u8, b: u8);

    fn present(&mut self) -> Result<()>;

    /// Gives the underlying output back. Called exactly once, on shutdown.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn emit_frame<K: LightSink + ?Sized>(sink: &mut K, frame: &[Rgb]) -> Result<()> {
    for (index, c) in frame.iter().enumerate() {
        sink.set(index, c.r, c.g, c.b);
    }
    sink.present()
}
