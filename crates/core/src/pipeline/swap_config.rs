use std::path::PathBuf;
use std::time::Duration;

use crate::compositing::domain::face_compositor::CompositeOptions;
use crate::shared::constants::{CANCEL_POLL_TIMEOUT_MS, PREVIEW_TITLE};

/// Settings for one run, resolved once before the pipeline starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SwapConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub output: PathBuf,
    pub composite: CompositeOptions,
    pub preview: bool,
    pub preview_title: String,
    /// How long each iteration waits for a cancel key.
    pub cancel_poll: Duration,
}

impl SwapConfig {
    pub fn new(source: PathBuf, destination: PathBuf, output: PathBuf) -> Self {
        Self {
            source,
            destination,
            output,
            composite: CompositeOptions::default(),
            preview: false,
            preview_title: PREVIEW_TITLE.to_string(),
            cancel_poll: Duration::from_millis(CANCEL_POLL_TIMEOUT_MS),
        }
    }

    pub fn with_composite(mut self, composite: CompositeOptions) -> Self {
        self.composite = composite;
        self
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }
}
