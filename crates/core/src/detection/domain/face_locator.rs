use thiserror::Error;

use crate::shared::frame::Frame;

use super::face_region::FaceRegion;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    InvalidOutput(String),
}

/// Result of a successful locate call. Not finding a face is not an error.
#[derive(Debug)]
pub enum LocateOutcome {
    Found(FaceRegion),
    NotFound,
}

/// Finds one face in a frame.
///
/// `prefer_largest` picks the face with the largest box; otherwise the most
/// confident face is returned.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &Frame, prefer_largest: bool) -> Result<LocateOutcome, LocatorError>;
}
