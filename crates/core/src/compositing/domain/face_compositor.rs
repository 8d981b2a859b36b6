use thiserror::Error;

use crate::detection::domain::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// How the source face is mapped onto the destination landmarks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WarpMode {
    /// One similarity transform for the whole face.
    TwoD,
    /// Piecewise-affine warp over a triangulation of the landmarks.
    #[default]
    ThreeD,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositeOptions {
    pub warp_mode: WarpMode,
    pub correct_color: bool,
}

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("landmark count mismatch: source has {source_count}, destination has {destination_count}")]
    LandmarkCountMismatch {
        source_count: usize,
        destination_count: usize,
    },
    #[error("degenerate landmarks: {0}")]
    DegenerateLandmarks(String),
    #[error("source face image is empty")]
    EmptyFace,
    #[error("destination face lies outside the frame")]
    OutsideFrame,
    #[error("unsupported pixel format: {channels} channels")]
    UnsupportedFormat { channels: u8 },
}

/// Blends the source face onto the destination frame.
///
/// Takes ownership of `dest_frame` and returns the composited frame.
pub trait FaceCompositor: Send {
    fn composite(
        &self,
        source: &FaceRegion,
        destination: &FaceRegion,
        dest_frame: Frame,
        options: &CompositeOptions,
    ) -> Result<Frame, CompositeError>;
}
