use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;

use crate::compositing::domain::face_compositor::FaceCompositor;
use crate::detection::domain::face_locator::FaceLocator;
use crate::preview::domain::preview_sink::{PreviewError, PreviewSink};
use crate::video::domain::frame_sink::FrameSink;
use crate::video::domain::frame_source::FrameSource;
use crate::video::domain::video_error::VideoError;

use super::pipeline_controller::{FrameStreams, PipelineController};
use super::pipeline_logger::PipelineLogger;
use super::run_summary::RunSummary;
use super::swap_config::SwapConfig;

#[derive(Error, Debug)]
pub enum SwapError {
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error(transparent)]
    Preview(#[from] PreviewError),
    #[error("pipeline already executed")]
    AlreadyExecuted,
}

/// Opens every stream and runs the face swap pipeline once.
///
/// Streams are opened in the order source, destination, sink, preview.
/// If any open fails, everything opened before it is closed again and the
/// error is returned; no frames are read. Single-use: `execute` consumes
/// the owned components.
pub struct SwapFacesUseCase {
    source: Option<Box<dyn FrameSource>>,
    destination: Option<Box<dyn FrameSource>>,
    sink: Option<Box<dyn FrameSink>>,
    preview: Option<Box<dyn PreviewSink>>,
    locator: Option<Box<dyn FaceLocator>>,
    compositor: Option<Box<dyn FaceCompositor>>,
    logger: Option<Box<dyn PipelineLogger>>,
    cancelled: Arc<AtomicBool>,
}

impl SwapFacesUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        destination: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        preview: Option<Box<dyn PreviewSink>>,
        locator: Box<dyn FaceLocator>,
        compositor: Box<dyn FaceCompositor>,
        logger: Box<dyn PipelineLogger>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            source: Some(source),
            destination: Some(destination),
            sink: Some(sink),
            preview,
            locator: Some(locator),
            compositor: Some(compositor),
            logger: Some(logger),
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn execute(&mut self, config: &SwapConfig) -> Result<RunSummary, SwapError> {
        let mut source = self.source.take().ok_or(SwapError::AlreadyExecuted)?;
        let mut destination = self.destination.take().ok_or(SwapError::AlreadyExecuted)?;
        let mut sink = self.sink.take().ok_or(SwapError::AlreadyExecuted)?;
        let locator = self.locator.take().ok_or(SwapError::AlreadyExecuted)?;
        let compositor = self.compositor.take().ok_or(SwapError::AlreadyExecuted)?;
        let mut logger = self.logger.take().ok_or(SwapError::AlreadyExecuted)?;
        let preview = self.preview.take().filter(|_| config.preview);

        let source_meta = source.open(&config.source)?;
        let dest_meta = match destination.open(&config.destination) {
            Ok(meta) => meta,
            Err(e) => {
                source.close();
                return Err(e.into());
            }
        };
        logger.info(&format!(
            "Source: {}x{} @ {:.2} fps, destination: {}x{} @ {:.2} fps",
            source_meta.width,
            source_meta.height,
            source_meta.fps(),
            dest_meta.width,
            dest_meta.height,
            dest_meta.fps()
        ));

        if let Err(e) = sink.open(&config.output, dest_meta.frame_size(), dest_meta.frame_rate) {
            source.close();
            destination.close();
            return Err(e.into());
        }

        let preview = match preview {
            Some(mut preview) => match preview.open(&config.preview_title) {
                Ok(()) => Some(preview),
                Err(e) => {
                    source.close();
                    destination.close();
                    if let Err(close_err) = sink.close() {
                        logger.warn(&format!("Failed to finalize output: {close_err}"));
                    }
                    return Err(e.into());
                }
            },
            None => None,
        };

        let streams = FrameStreams {
            source,
            destination,
            sink,
            preview,
        };
        let mut controller = PipelineController::new(
            streams,
            locator,
            compositor,
            config,
            self.cancelled.clone(),
            logger,
        );
        Ok(controller.run())
    }
}
