use std::path::Path;

use crate::shared::frame::{Frame, FrameSize};
use crate::shared::video_metadata::FrameRate;

use super::video_error::VideoError;

/// Ordered frame output to a single encodable stream.
pub trait FrameSink: Send {
    /// Opens the output at `rate`. An unknown rate leaves the choice to
    /// the implementation.
    fn open(&mut self, path: &Path, size: FrameSize, rate: FrameRate) -> Result<(), VideoError>;

    /// Appends a frame. Its size must equal the size given to `open`.
    fn append(&mut self, frame: &Frame) -> Result<(), VideoError>;

    /// Flushes all pending frames to disk and finalizes the container.
    /// Safe to call more than once.
    fn close(&mut self) -> Result<(), VideoError>;
}
