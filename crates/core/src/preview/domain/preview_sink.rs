use std::time::Duration;

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("preview display unavailable: {0}")]
    Display(#[from] std::io::Error),
}

/// Live display surface for composited frames.
///
/// Presentation is best effort: implementations drop frames rather than
/// slow down the decode/encode path.
pub trait PreviewSink: Send {
    fn open(&mut self, title: &str) -> Result<(), PreviewError>;

    /// Hands a frame to the display without blocking.
    fn present(&mut self, frame: &Frame);

    /// Returns true if the user asked to stop within `timeout`.
    fn poll_cancel(&mut self, timeout: Duration) -> bool;

    /// Releases the display surface. Safe to call more than once.
    fn close(&mut self);
}
