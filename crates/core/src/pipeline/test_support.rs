//! Recording stubs for pipeline tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::compositing::domain::face_compositor::{
    CompositeError, CompositeOptions, FaceCompositor,
};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::face_locator::{FaceLocator, LocateOutcome, LocatorError};
use crate::detection::domain::face_region::{BoundingBox, FaceRegion};
use crate::preview::domain::preview_sink::{PreviewError, PreviewSink};
use crate::shared::frame::{Frame, FrameSize};
use crate::shared::video_metadata::{FrameRate, VideoMetadata};
use crate::video::domain::frame_sink::FrameSink;
use crate::video::domain::frame_source::{FrameSource, ReadOutcome};
use crate::video::domain::video_error::VideoError;

use super::pipeline_logger::PipelineLogger;
use super::skip_reason::SkipReason;

pub const W: u32 = 8;
pub const H: u32 = 8;

/// Ordered record of lifecycle calls shared by all stubs of one test.
pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn frame(index: usize) -> Frame {
    Frame::new(vec![index as u8; (W * H * 3) as usize], W, H, 3, index)
}

pub fn metadata() -> VideoMetadata {
    VideoMetadata {
        width: W,
        height: H,
        frame_rate: FrameRate::new(25, 1),
        total_frames: 0,
        codec: "stub".to_string(),
        source_path: None,
    }
}

pub struct StubSource {
    name: &'static str,
    frames: usize,
    read_error_at: Option<usize>,
    fail_open: bool,
    next: usize,
    open: bool,
    events: Events,
    pub reads: Arc<Mutex<usize>>,
}

impl StubSource {
    pub fn new(name: &'static str, frames: usize, events: &Events) -> Self {
        Self {
            name,
            frames,
            read_error_at: None,
            fail_open: false,
            next: 0,
            open: true,
            events: events.clone(),
            reads: Arc::new(Mutex::new(0)),
        }
    }

    pub fn read_error_at(mut self, index: usize) -> Self {
        self.read_error_at = Some(index);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn closed(mut self) -> Self {
        self.open = false;
        self
    }
}

impl FrameSource for StubSource {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, VideoError> {
        self.events.lock().unwrap().push(format!("open:{}", self.name));
        if self.fail_open {
            return Err(VideoError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: "stub".into(),
            });
        }
        self.open = true;
        Ok(metadata())
    }

    fn next_frame(&mut self) -> ReadOutcome {
        *self.reads.lock().unwrap() += 1;
        if !self.open {
            return ReadOutcome::ReadError("closed".into());
        }
        let i = self.next;
        self.next += 1;
        if self.read_error_at == Some(i) {
            return ReadOutcome::ReadError(format!("corrupt packet at {i}"));
        }
        if i >= self.frames {
            return ReadOutcome::EndOfStream;
        }
        ReadOutcome::Frame(frame(i))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.events.lock().unwrap().push(format!("close:{}", self.name));
        self.open = false;
    }
}

pub struct StubSink {
    pub written: Arc<Mutex<Vec<usize>>>,
    events: Events,
    fail_append_at: Option<usize>,
    fail_open: bool,
    fail_close: bool,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
    pub opened_with: Arc<Mutex<Option<(PathBuf, FrameSize, FrameRate)>>>,
}

impl StubSink {
    pub fn new(events: &Events) -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            events: events.clone(),
            fail_append_at: None,
            fail_open: false,
            fail_close: false,
            cancel_after: None,
            opened_with: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing_append_at(mut self, index: usize) -> Self {
        self.fail_append_at = Some(index);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Raises `flag` once `count` frames have been written.
    pub fn cancel_after(mut self, count: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_after = Some((count, flag));
        self
    }
}

impl FrameSink for StubSink {
    fn open(&mut self, path: &Path, size: FrameSize, rate: FrameRate) -> Result<(), VideoError> {
        self.events.lock().unwrap().push("open:sink".into());
        if self.fail_open {
            return Err(VideoError::SinkUnavailable {
                path: path.to_path_buf(),
                reason: "stub".into(),
            });
        }
        *self.opened_with.lock().unwrap() = Some((path.to_path_buf(), size, rate));
        Ok(())
    }

    fn append(&mut self, frame: &Frame) -> Result<(), VideoError> {
        if self.fail_append_at == Some(frame.index()) {
            return Err(VideoError::Encode("stub encoder".into()));
        }
        let mut written = self.written.lock().unwrap();
        written.push(frame.index());
        if let Some((count, flag)) = &self.cancel_after {
            if written.len() >= *count {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), VideoError> {
        self.events.lock().unwrap().push("close:sink".into());
        if self.fail_close {
            return Err(VideoError::Encode("trailer".into()));
        }
        Ok(())
    }
}

pub struct StubPreview {
    pub presented: Arc<Mutex<Vec<usize>>>,
    events: Events,
    cancel_on_poll: Option<usize>,
    polls: usize,
    fail_open: bool,
}

impl StubPreview {
    pub fn new(events: &Events) -> Self {
        Self {
            presented: Arc::new(Mutex::new(Vec::new())),
            events: events.clone(),
            cancel_on_poll: None,
            polls: 0,
            fail_open: false,
        }
    }

    /// `poll_cancel` reports a key press on the given 1-based poll.
    pub fn cancel_on_poll(mut self, poll: usize) -> Self {
        self.cancel_on_poll = Some(poll);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

impl PreviewSink for StubPreview {
    fn open(&mut self, _title: &str) -> Result<(), PreviewError> {
        self.events.lock().unwrap().push("open:preview".into());
        if self.fail_open {
            return Err(PreviewError::Display(std::io::Error::other("no tty")));
        }
        Ok(())
    }

    fn present(&mut self, frame: &Frame) {
        self.presented.lock().unwrap().push(frame.index());
    }

    fn poll_cancel(&mut self, _timeout: Duration) -> bool {
        self.polls += 1;
        self.cancel_on_poll == Some(self.polls)
    }

    fn close(&mut self) {
        self.events.lock().unwrap().push("close:preview".into());
    }
}

/// Finds a face in every frame unless told otherwise. Source and
/// destination calls are told apart by `prefer_largest`.
#[derive(Default)]
pub struct StubLocator {
    missing_source: HashSet<usize>,
    missing_destination: HashSet<usize>,
    fail_at: HashSet<usize>,
    panic_at: HashSet<usize>,
}

impl StubLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_source_face(mut self, frames: &[usize]) -> Self {
        self.missing_source.extend(frames);
        self
    }

    pub fn without_destination_face(mut self, frames: &[usize]) -> Self {
        self.missing_destination.extend(frames);
        self
    }

    pub fn failing_at(mut self, frames: &[usize]) -> Self {
        self.fail_at.extend(frames);
        self
    }

    pub fn panicking_at(mut self, frames: &[usize]) -> Self {
        self.panic_at.extend(frames);
        self
    }
}

pub fn face(frame: &Frame) -> FaceRegion {
    let landmarks = FaceLandmarks::new(vec![
        (2.0, 2.0),
        (6.0, 2.0),
        (4.0, 4.0),
        (3.0, 6.0),
        (5.0, 6.0),
    ]);
    FaceRegion::from_frame(frame, landmarks, BoundingBox::new(0.0, 0.0, W as f64, H as f64), 0.9)
        .expect("stub face inside frame")
}

impl FaceLocator for StubLocator {
    fn locate(&mut self, frame: &Frame, prefer_largest: bool) -> Result<LocateOutcome, LocatorError> {
        let i = frame.index();
        if self.panic_at.contains(&i) {
            panic!("stub locator blew up at {i}");
        }
        if self.fail_at.contains(&i) {
            return Err(LocatorError::Inference("stub session".into()));
        }
        let missing = if prefer_largest {
            &self.missing_destination
        } else {
            &self.missing_source
        };
        if missing.contains(&i) {
            return Ok(LocateOutcome::NotFound);
        }
        Ok(LocateOutcome::Found(face(frame)))
    }
}

/// Returns the destination frame untouched and records which pairs it saw.
pub struct StubCompositor {
    pub pairs: Arc<Mutex<Vec<(usize, usize)>>>,
    fail_at: HashSet<usize>,
    panic_at: HashSet<usize>,
}

impl StubCompositor {
    pub fn new() -> Self {
        Self {
            pairs: Arc::new(Mutex::new(Vec::new())),
            fail_at: HashSet::new(),
            panic_at: HashSet::new(),
        }
    }

    pub fn failing_at(mut self, frames: &[usize]) -> Self {
        self.fail_at.extend(frames);
        self
    }

    pub fn panicking_at(mut self, frames: &[usize]) -> Self {
        self.panic_at.extend(frames);
        self
    }
}

impl FaceCompositor for StubCompositor {
    fn composite(
        &self,
        source: &FaceRegion,
        destination: &FaceRegion,
        dest_frame: Frame,
        _options: &CompositeOptions,
    ) -> Result<Frame, CompositeError> {
        self.pairs
            .lock()
            .unwrap()
            .push((source.face_image().index(), destination.face_image().index()));
        if self.panic_at.contains(&dest_frame.index()) {
            panic!("stub compositor: index {} out of bounds", dest_frame.index());
        }
        if self.fail_at.contains(&dest_frame.index()) {
            return Err(CompositeError::DegenerateLandmarks("stub".into()));
        }
        Ok(dest_frame)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogEntry {
    Skipped(usize, &'static str),
    Processed(usize),
    Warn(String),
}

pub struct RecordingLogger {
    pub entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn skipped(entries: &Arc<Mutex<Vec<LogEntry>>>) -> Vec<(usize, &'static str)> {
        entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                LogEntry::Skipped(frame, kind) => Some((*frame, *kind)),
                _ => None,
            })
            .collect()
    }
}

impl PipelineLogger for RecordingLogger {
    fn frame_skipped(&mut self, frame: usize, reason: &SkipReason) {
        self.entries
            .lock()
            .unwrap()
            .push(LogEntry::Skipped(frame, reason.kind()));
    }

    fn frame_processed(&mut self, count: usize) {
        self.entries.lock().unwrap().push(LogEntry::Processed(count));
    }

    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}

    fn info(&mut self, _message: &str) {}

    fn warn(&mut self, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(LogEntry::Warn(message.to_string()));
    }
}
