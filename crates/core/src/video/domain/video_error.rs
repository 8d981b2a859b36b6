use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::FrameSize;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("cannot open video source {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("cannot open video sink {path}: {reason}")]
    SinkUnavailable { path: PathBuf, reason: String },
    #[error("{0} is not open")]
    NotOpen(&'static str),
    #[error("frame is {actual:?} but the sink was opened for {expected:?}")]
    FrameSizeMismatch { expected: FrameSize, actual: FrameSize },
    #[error("encode failed: {0}")]
    Encode(String),
}
