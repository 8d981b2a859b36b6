use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

use super::video_error::VideoError;

/// Result of pulling one frame from a [`FrameSource`].
///
/// A clean end of the container and a frame that could not be decoded are
/// kept apart so callers can report them differently, even when both end
/// the run.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    EndOfStream,
    ReadError(String),
}

/// Sequential frame retrieval from a single decodable video stream.
///
/// Implementations block until the next frame is decoded and always yield
/// frames in presentation order.
pub trait FrameSource: Send {
    /// Opens the stream and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, VideoError>;

    fn next_frame(&mut self) -> ReadOutcome;

    fn is_open(&self) -> bool;

    /// Releases decoder resources. Safe to call more than once.
    fn close(&mut self);
}
