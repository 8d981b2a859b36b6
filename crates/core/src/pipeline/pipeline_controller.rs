//! Synchronized dual-stream face swap loop.
//!
//! Each iteration reads one frame from each source, locates a face in both,
//! composites, and appends the result to the sink. Per-frame failures,
//! including a panic inside the locator or compositor, are skips; end of
//! stream, read failures and cancellation end the run. All
//! streams are released exactly once, in a fixed order, on every exit path.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::compositing::domain::face_compositor::{CompositeOptions, FaceCompositor};
use crate::detection::domain::face_locator::{FaceLocator, LocateOutcome};
use crate::detection::domain::face_region::FaceRegion;
use crate::preview::domain::preview_sink::PreviewSink;
use crate::shared::frame::Frame;
use crate::video::domain::frame_sink::FrameSink;
use crate::video::domain::frame_source::{FrameSource, ReadOutcome};

use super::pipeline_logger::PipelineLogger;
use super::pipeline_state::{InvalidTransition, PipelineState, TerminationReason};
use super::run_summary::{RunSummary, SkipStats};
use super::skip_reason::SkipReason;
use super::swap_config::SwapConfig;

/// Opened streams handed to the controller, which owns them from then on.
pub struct FrameStreams {
    pub source: Box<dyn FrameSource>,
    pub destination: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
    pub preview: Option<Box<dyn PreviewSink>>,
}

pub struct PipelineController {
    streams: FrameStreams,
    locator: Box<dyn FaceLocator>,
    compositor: Box<dyn FaceCompositor>,
    options: CompositeOptions,
    cancel_poll: Duration,
    cancelled: Arc<AtomicBool>,
    logger: Box<dyn PipelineLogger>,
    state: PipelineState,
    frame_counter: usize,
    frames_written: usize,
    skips: SkipStats,
    released: bool,
    summary: Option<RunSummary>,
}

impl PipelineController {
    pub fn new(
        streams: FrameStreams,
        locator: Box<dyn FaceLocator>,
        compositor: Box<dyn FaceCompositor>,
        config: &SwapConfig,
        cancelled: Arc<AtomicBool>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            streams,
            locator,
            compositor,
            options: config.composite,
            cancel_poll: config.cancel_poll,
            cancelled,
            logger,
            state: PipelineState::Running,
            frame_counter: 0,
            frames_written: 0,
            skips: SkipStats::default(),
            released: false,
            summary: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Frame pairs attempted so far, skipped or not.
    pub fn frame_counter(&self) -> usize {
        self.frame_counter
    }

    /// Runs until a stream ends, a read fails or cancellation is requested,
    /// then releases every stream. Later calls return the same summary.
    pub fn run(&mut self) -> RunSummary {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }

        let started = Instant::now();
        let reason = loop {
            if let Some(reason) = self.step() {
                break reason;
            }
        };

        self.transition(self.state.cancel(reason));
        self.release();
        self.transition(self.state.terminate());

        let summary = self.skips.summarize(
            reason,
            self.frame_counter,
            self.frames_written,
            started.elapsed(),
        );
        self.logger.summary(&summary);
        self.summary = Some(summary.clone());
        summary
    }

    /// One iteration. Returns the reason to stop, if any.
    fn step(&mut self) -> Option<TerminationReason> {
        if self.cancel_requested() {
            self.logger.info("Cancellation requested");
            return Some(TerminationReason::UserCancelled);
        }

        let (source_frame, dest_frame) = match self.read_pair() {
            Ok(pair) => pair,
            Err(reason) => return Some(reason),
        };

        let frame = self.frame_counter;
        if let Err(reason) = self.process_pair(&source_frame, dest_frame) {
            self.skips.record(frame, &reason);
            self.logger.frame_skipped(frame, &reason);
        }

        self.frame_counter += 1;
        self.logger.frame_processed(self.frame_counter);
        None
    }

    fn cancel_requested(&mut self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.streams.preview.as_mut() {
            Some(preview) => preview.poll_cancel(self.cancel_poll),
            None => false,
        }
    }

    /// Reads source then destination. Both are always read once both are open.
    fn read_pair(&mut self) -> Result<(Frame, Frame), TerminationReason> {
        for (name, open) in [
            ("source", self.streams.source.is_open()),
            ("destination", self.streams.destination.is_open()),
        ] {
            if !open {
                self.logger.warn(&format!(
                    "The {name} stream is not open at frame {}",
                    self.frame_counter
                ));
                return Err(TerminationReason::SourceReadFailure);
            }
        }

        let source = self.streams.source.next_frame();
        let destination = self.streams.destination.next_frame();

        let (source, destination) = match (source, destination) {
            (ReadOutcome::Frame(s), ReadOutcome::Frame(d)) => return Ok((s, d)),
            other => other,
        };

        let mut reason = TerminationReason::NormalEndOfStream;
        for (name, outcome) in [("source", source), ("destination", destination)] {
            match outcome {
                ReadOutcome::ReadError(cause) => {
                    self.logger.warn(&format!(
                        "Cannot read {name} frame {}: {cause}",
                        self.frame_counter
                    ));
                    reason = TerminationReason::SourceReadFailure;
                }
                ReadOutcome::EndOfStream => {
                    self.logger
                        .info(&format!("End of {name} stream after {} frames", self.frame_counter));
                }
                ReadOutcome::Frame(_) => {}
            }
        }
        Err(reason)
    }

    fn process_pair(&mut self, source_frame: &Frame, dest_frame: Frame) -> Result<(), SkipReason> {
        let started = Instant::now();
        let source_face = self.locate(source_frame, false, SkipReason::SourceFaceNotFound)?;
        let dest_face = self.locate(&dest_frame, true, SkipReason::DestinationFaceNotFound)?;
        self.logger.timing("locate", elapsed_ms(started));

        let started = Instant::now();
        let compositor = &self.compositor;
        let options = &self.options;
        let composited = panic::catch_unwind(AssertUnwindSafe(|| {
            compositor.composite(&source_face, &dest_face, dest_frame, options)
        }))
        .map_err(panic_skip)?
        .map_err(|e| SkipReason::CompositorFailed(e.to_string()))?;
        self.logger.timing("composite", elapsed_ms(started));

        let started = Instant::now();
        self.streams
            .sink
            .append(&composited)
            .map_err(|e| SkipReason::SinkWriteFailed(e.to_string()))?;
        self.frames_written += 1;
        self.logger.timing("write", elapsed_ms(started));

        if let Some(preview) = self.streams.preview.as_mut() {
            preview.present(&composited);
        }
        Ok(())
    }

    fn locate(
        &mut self,
        frame: &Frame,
        prefer_largest: bool,
        not_found: SkipReason,
    ) -> Result<FaceRegion, SkipReason> {
        let locator = &mut self.locator;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| locator.locate(frame, prefer_largest)))
            .map_err(panic_skip)?;
        match outcome {
            Ok(LocateOutcome::Found(region)) => Ok(region),
            Ok(LocateOutcome::NotFound) => Err(not_found),
            Err(e) => Err(SkipReason::LocatorFailed(e.to_string())),
        }
    }

    /// Closes source, destination, sink and preview, in that order, once.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.streams.source.close();
        self.streams.destination.close();
        if let Err(e) = self.streams.sink.close() {
            self.logger.warn(&format!("Failed to finalize output: {e}"));
        }
        if let Some(preview) = self.streams.preview.as_mut() {
            preview.close();
        }
    }

    fn transition(&mut self, next: Result<PipelineState, InvalidTransition>) {
        match next {
            Ok(state) => self.state = state,
            Err(e) => self.logger.warn(&e.to_string()),
        }
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.release();
    }
}

fn panic_skip(payload: Box<dyn Any + Send>) -> SkipReason {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    SkipReason::Panicked(message)
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use std::sync::Mutex;

    struct Harness {
        events: Events,
        written: Arc<Mutex<Vec<usize>>>,
        log: Arc<Mutex<Vec<LogEntry>>>,
        pairs: Arc<Mutex<Vec<(usize, usize)>>>,
        source_reads: Arc<Mutex<usize>>,
        controller: PipelineController,
    }

    struct Setup {
        source: StubSource,
        destination: StubSource,
        sink: StubSink,
        preview: Option<StubPreview>,
        locator: StubLocator,
        compositor: StubCompositor,
        cancelled: Arc<AtomicBool>,
        events: Events,
    }

    impl Setup {
        fn frames(source: usize, destination: usize) -> Self {
            let events = events();
            Self {
                source: StubSource::new("source", source, &events),
                destination: StubSource::new("destination", destination, &events),
                sink: StubSink::new(&events),
                preview: None,
                locator: StubLocator::new(),
                compositor: StubCompositor::new(),
                cancelled: Arc::new(AtomicBool::new(false)),
                events,
            }
        }

        fn build(self) -> Harness {
            let logger = RecordingLogger::new();
            let log = logger.entries.clone();
            let written = self.sink.written.clone();
            let pairs = self.compositor.pairs.clone();
            let source_reads = self.source.reads.clone();
            let streams = FrameStreams {
                source: Box::new(self.source),
                destination: Box::new(self.destination),
                sink: Box::new(self.sink),
                preview: self
                    .preview
                    .map(|p| Box::new(p) as Box<dyn PreviewSink>),
            };
            let config = SwapConfig::new("s.mp4".into(), "d.mp4".into(), "o.mp4".into());
            let controller = PipelineController::new(
                streams,
                Box::new(self.locator),
                Box::new(self.compositor),
                &config,
                self.cancelled,
                Box::new(logger),
            );
            Harness {
                events: self.events,
                written,
                log,
                pairs,
                source_reads,
                controller,
            }
        }
    }

    fn closes(events: &Events) -> Vec<String> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("close:"))
            .cloned()
            .collect()
    }

    #[test]
    fn test_all_frames_swapped() {
        let mut h = Setup::frames(10, 10).build();
        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::NormalEndOfStream);
        assert_eq!(summary.frames_attempted, 10);
        assert_eq!(summary.frames_written, 10);
        assert_eq!(summary.skip_ratio, 0.0);
        assert_eq!(h.controller.frame_counter(), 10);
        assert_eq!(*h.written.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(
            h.controller.state(),
            PipelineState::Terminated(TerminationReason::NormalEndOfStream)
        );
    }

    #[test]
    fn test_missing_source_faces_are_skipped() {
        let mut setup = Setup::frames(10, 10);
        setup.locator = StubLocator::new().without_source_face(&[3, 7]);
        let mut h = setup.build();

        let summary = h.controller.run();

        assert_eq!(summary.frames_attempted, 10);
        assert_eq!(summary.frames_written, 8);
        assert_eq!(summary.skipped_frames, vec![[3, 3], [7, 7]]);
        assert_eq!(summary.skip_counts["source_face_not_found"], 2);
        assert_eq!(
            RecordingLogger::skipped(&h.log),
            vec![(3, "source_face_not_found"), (7, "source_face_not_found")]
        );
        let written = h.written.lock().unwrap().clone();
        assert!(!written.contains(&3) && !written.contains(&7));
    }

    #[test]
    fn test_missing_destination_face_is_skipped() {
        let mut setup = Setup::frames(4, 4);
        setup.locator = StubLocator::new().without_destination_face(&[1]);
        let mut h = setup.build();

        let summary = h.controller.run();
        assert_eq!(summary.frames_written, 3);
        assert_eq!(
            RecordingLogger::skipped(&h.log),
            vec![(1, "destination_face_not_found")]
        );
    }

    #[test]
    fn test_cancel_flag_stops_after_current_iteration() {
        let mut setup = Setup::frames(10, 10);
        let flag = setup.cancelled.clone();
        setup.sink = StubSink::new(&setup.events).cancel_after(4, flag);
        let mut h = setup.build();

        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::UserCancelled);
        assert_eq!(h.controller.frame_counter(), 4);
        assert!(summary.frames_written <= 4);
        assert_eq!(*h.source_reads.lock().unwrap(), 4);
        assert_eq!(
            closes(&h.events),
            vec!["close:source", "close:destination", "close:sink"]
        );
    }

    #[test]
    fn test_preview_key_cancels() {
        let mut setup = Setup::frames(10, 10);
        setup.preview = Some(StubPreview::new(&setup.events).cancel_on_poll(3));
        let mut h = setup.build();

        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::UserCancelled);
        assert_eq!(summary.frames_attempted, 2);
        assert_eq!(
            closes(&h.events),
            vec![
                "close:source",
                "close:destination",
                "close:sink",
                "close:preview"
            ]
        );
    }

    #[test]
    fn test_preview_receives_written_frames() {
        let mut setup = Setup::frames(3, 3);
        let preview = StubPreview::new(&setup.events);
        let presented = preview.presented.clone();
        setup.preview = Some(preview);
        setup.locator = StubLocator::new().without_source_face(&[1]);
        let mut h = setup.build();

        h.controller.run();
        assert_eq!(*presented.lock().unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_shorter_destination_ends_run() {
        let mut h = Setup::frames(10, 5).build();
        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::NormalEndOfStream);
        assert_eq!(summary.frames_attempted, 5);
        assert_eq!(summary.frames_written, 5);
        // The source frame of the sixth pair is still consumed.
        assert_eq!(*h.source_reads.lock().unwrap(), 6);
    }

    #[test]
    fn test_shorter_source_ends_run() {
        let mut h = Setup::frames(3, 10).build();
        let summary = h.controller.run();
        assert_eq!(summary.termination, TerminationReason::NormalEndOfStream);
        assert_eq!(summary.frames_attempted, 3);
    }

    #[test]
    fn test_read_error_terminates_and_flushes() {
        let mut setup = Setup::frames(10, 10);
        setup.source = StubSource::new("source", 10, &setup.events).read_error_at(2);
        let mut h = setup.build();

        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::SourceReadFailure);
        assert_eq!(summary.frames_attempted, 2);
        assert_eq!(*h.written.lock().unwrap(), vec![0, 1]);
        assert_eq!(
            closes(&h.events),
            vec!["close:source", "close:destination", "close:sink"]
        );
        assert!(h
            .log
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, LogEntry::Warn(m) if m.contains("corrupt packet at 2"))));
    }

    #[test]
    fn test_unopened_stream_ends_run_without_reading() {
        let mut setup = Setup::frames(5, 5);
        setup.destination = StubSource::new("destination", 5, &setup.events).closed();
        let mut h = setup.build();

        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::SourceReadFailure);
        assert_eq!(summary.frames_attempted, 0);
        assert_eq!(*h.source_reads.lock().unwrap(), 0);
        assert!(h.written.lock().unwrap().is_empty());
        assert_eq!(
            closes(&h.events),
            vec!["close:source", "close:destination", "close:sink"]
        );
        assert!(h
            .log
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, LogEntry::Warn(m) if m.contains("destination stream is not open"))));
    }

    #[test]
    fn test_read_error_wins_over_end_of_stream() {
        let mut setup = Setup::frames(10, 2);
        setup.source = StubSource::new("source", 10, &setup.events).read_error_at(2);
        let mut h = setup.build();

        let summary = h.controller.run();
        assert_eq!(summary.termination, TerminationReason::SourceReadFailure);
    }

    #[test]
    fn test_compositor_and_locator_errors_are_skips() {
        let mut setup = Setup::frames(6, 6);
        setup.compositor = StubCompositor::new().failing_at(&[1]);
        setup.locator = StubLocator::new().failing_at(&[4]);
        let mut h = setup.build();

        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::NormalEndOfStream);
        assert_eq!(summary.frames_attempted, 6);
        assert_eq!(summary.frames_written, 4);
        assert_eq!(
            RecordingLogger::skipped(&h.log),
            vec![(1, "compositor_failed"), (4, "locator_failed")]
        );
    }

    #[test]
    fn test_compositor_panic_is_skip_and_run_completes() {
        let mut setup = Setup::frames(4, 4);
        setup.compositor = StubCompositor::new().panicking_at(&[1]);
        let mut h = setup.build();

        let summary = h.controller.run();

        assert_eq!(summary.termination, TerminationReason::NormalEndOfStream);
        assert_eq!(summary.frames_attempted, 4);
        assert_eq!(summary.frames_written, 3);
        assert_eq!(RecordingLogger::skipped(&h.log), vec![(1, "panicked")]);
        assert_eq!(*h.written.lock().unwrap(), vec![0, 2, 3]);
        assert_eq!(
            closes(&h.events),
            vec!["close:source", "close:destination", "close:sink"]
        );
    }

    #[test]
    fn test_locator_panic_is_skip() {
        let mut setup = Setup::frames(3, 3);
        setup.locator = StubLocator::new().panicking_at(&[2]);
        let mut h = setup.build();

        let summary = h.controller.run();
        assert_eq!(summary.frames_written, 2);
        assert_eq!(summary.skip_counts["panicked"], 1);
        assert!(h.controller.state().is_terminated());
    }

    #[test]
    fn test_sink_write_error_is_skip() {
        let mut setup = Setup::frames(4, 4);
        setup.sink = StubSink::new(&setup.events).failing_append_at(2);
        let mut h = setup.build();

        let summary = h.controller.run();
        assert_eq!(summary.frames_written, 3);
        assert_eq!(summary.skip_counts["sink_write_failed"], 1);
        assert_eq!(*h.written.lock().unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_sink_close_failure_is_logged_not_escalated() {
        let mut setup = Setup::frames(2, 2);
        setup.sink = StubSink::new(&setup.events).failing_close();
        let mut h = setup.build();

        let summary = h.controller.run();
        assert_eq!(summary.frames_written, 2);
        assert!(h
            .log
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, LogEntry::Warn(m) if m.contains("finalize"))));
        assert!(h.controller.state().is_terminated());
    }

    #[test]
    fn test_compositor_sees_pairs_from_same_iteration() {
        let mut h = Setup::frames(5, 5).build();
        h.controller.run();
        let pairs = h.pairs.lock().unwrap().clone();
        assert_eq!(pairs.len(), 5);
        assert!(pairs.iter().all(|(s, d)| s == d));
    }

    #[test]
    fn test_counter_and_progress_cover_every_attempt() {
        let mut setup = Setup::frames(4, 4);
        setup.locator = StubLocator::new().without_source_face(&[0, 1, 2, 3]);
        let mut h = setup.build();

        let summary = h.controller.run();
        assert_eq!(summary.frames_written, 0);
        assert_eq!(summary.skip_ratio, 1.0);
        let processed: Vec<_> = h
            .log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                LogEntry::Processed(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(processed, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_release_happens_once_across_run_and_drop() {
        let mut setup = Setup::frames(2, 2);
        setup.preview = Some(StubPreview::new(&setup.events));
        let mut h = setup.build();

        h.controller.run();
        let events = h.events.clone();
        drop(h);

        assert_eq!(
            closes(&events),
            vec![
                "close:source",
                "close:destination",
                "close:sink",
                "close:preview"
            ]
        );
    }

    #[test]
    fn test_drop_without_run_releases() {
        let h = Setup::frames(2, 2).build();
        let events = h.events.clone();
        assert!(h.controller.state().is_running());
        drop(h);

        assert_eq!(
            closes(&events),
            vec!["close:source", "close:destination", "close:sink"]
        );
    }

    #[test]
    fn test_second_run_returns_stored_summary() {
        let mut h = Setup::frames(3, 3).build();
        let first = h.controller.run();
        let reads = *h.source_reads.lock().unwrap();

        let second = h.controller.run();
        assert_eq!(first, second);
        assert_eq!(*h.source_reads.lock().unwrap(), reads);
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let setup = Setup::frames(5, 5);
        setup.cancelled.store(true, Ordering::SeqCst);
        let mut h = setup.build();

        let summary = h.controller.run();
        assert_eq!(summary.termination, TerminationReason::UserCancelled);
        assert_eq!(summary.frames_attempted, 0);
        assert_eq!(*h.source_reads.lock().unwrap(), 0);
    }
}
