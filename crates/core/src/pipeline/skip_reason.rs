use std::fmt;

/// Why a frame pair produced no output. Skips never stop the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    SourceFaceNotFound,
    DestinationFaceNotFound,
    LocatorFailed(String),
    CompositorFailed(String),
    SinkWriteFailed(String),
    /// The locator or compositor panicked; carries the panic message.
    Panicked(String),
}

impl SkipReason {
    /// Stable key used for per-reason counts.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::SourceFaceNotFound => "source_face_not_found",
            SkipReason::DestinationFaceNotFound => "destination_face_not_found",
            SkipReason::LocatorFailed(_) => "locator_failed",
            SkipReason::CompositorFailed(_) => "compositor_failed",
            SkipReason::SinkWriteFailed(_) => "sink_write_failed",
            SkipReason::Panicked(_) => "panicked",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SourceFaceNotFound => write!(f, "no face landmarks in source frame"),
            SkipReason::DestinationFaceNotFound => {
                write!(f, "no face landmarks in destination frame")
            }
            SkipReason::LocatorFailed(cause) => write!(f, "face locator failed: {cause}"),
            SkipReason::CompositorFailed(cause) => write!(f, "compositing failed: {cause}"),
            SkipReason::SinkWriteFailed(cause) => write!(f, "cannot write output frame: {cause}"),
            SkipReason::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ignores_cause() {
        assert_eq!(
            SkipReason::CompositorFailed("a".into()).kind(),
            SkipReason::CompositorFailed("b".into()).kind()
        );
    }

    #[test]
    fn test_panicked_kind() {
        let reason = SkipReason::Panicked("index out of bounds".into());
        assert_eq!(reason.kind(), "panicked");
        assert!(reason.to_string().contains("index out of bounds"));
    }

    #[test]
    fn test_display_includes_cause() {
        let text = SkipReason::SinkWriteFailed("disk full".into()).to_string();
        assert!(text.contains("disk full"));
    }
}
