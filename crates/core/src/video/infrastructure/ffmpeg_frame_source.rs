use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::{FrameRate, VideoMetadata};
use crate::video::domain::frame_source::{FrameSource, ReadOutcome};
use crate::video::domain::video_error::VideoError;

/// Pull-based video decoder backed by ffmpeg-next (libavformat + libavcodec).
///
/// Each call to [`FrameSource::next_frame`] decodes exactly one frame,
/// converts it to RGB24 and wraps it in a [`Frame`].
pub struct FfmpegFrameSource {
    state: Option<DecodeState>,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

struct DecodeState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

enum Received {
    Frame(Frame),
    NeedInput,
    Finished,
    Failed(String),
}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self { state: None }
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, VideoError> {
        let unavailable = |reason: String| VideoError::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| unavailable(e.to_string()))?;
        let ictx = ffmpeg_next::format::input(path).map_err(|e| unavailable(e.to_string()))?;

        let (metadata, video_stream_index, decoder) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or_else(|| unavailable("no video stream found".to_string()))?;

            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
                    .map_err(|e| unavailable(e.to_string()))?;
            let decoder = codec_ctx
                .decoder()
                .video()
                .map_err(|e| unavailable(e.to_string()))?;

            let rate = stream.rate();
            let frame_rate = if rate.numerator() > 0 && rate.denominator() > 0 {
                FrameRate::new(rate.numerator() as u32, rate.denominator() as u32)
            } else {
                FrameRate::UNKNOWN
            };

            let metadata = VideoMetadata {
                width: decoder.width(),
                height: decoder.height(),
                frame_rate,
                total_frames: stream.frames().max(0) as usize,
                codec: decoder
                    .codec()
                    .map(|c| c.name().to_string())
                    .unwrap_or_default(),
                source_path: Some(path.to_path_buf()),
            };
            (metadata, stream.index(), decoder)
        };

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            metadata.width,
            metadata.height,
            ffmpeg_next::format::Pixel::RGB24,
            metadata.width,
            metadata.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| unavailable(e.to_string()))?;

        log::debug!(
            "Opened {} ({}x{} @ {:.2} fps, codec {})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps(),
            metadata.codec
        );

        self.state = Some(DecodeState {
            ictx,
            decoder,
            scaler,
            width: metadata.width,
            height: metadata.height,
            video_stream_index,
            frame_index: 0,
            flushing: false,
            done: false,
        });

        Ok(metadata)
    }

    fn next_frame(&mut self) -> ReadOutcome {
        match self.state.as_mut() {
            Some(state) => state.decode_next(),
            None => ReadOutcome::ReadError("FfmpegFrameSource: not opened".to_string()),
        }
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn close(&mut self) {
        self.state = None;
    }
}

impl DecodeState {
    fn decode_next(&mut self) -> ReadOutcome {
        if self.done {
            return ReadOutcome::EndOfStream;
        }

        loop {
            match self.receive() {
                Received::Frame(frame) => return ReadOutcome::Frame(frame),
                Received::Failed(cause) => return ReadOutcome::ReadError(cause),
                Received::Finished => {
                    self.done = true;
                    return ReadOutcome::EndOfStream;
                }
                Received::NeedInput if self.flushing => {
                    self.done = true;
                    return ReadOutcome::EndOfStream;
                }
                Received::NeedInput => {}
            }

            let next = self
                .ictx
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));

            match next {
                None => {
                    if let Err(e) = self.decoder.send_eof() {
                        return ReadOutcome::ReadError(format!("decoder flush failed: {e}"));
                    }
                    self.flushing = true;
                }
                Some((index, _)) if index != self.video_stream_index => {}
                Some((_, packet)) => {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        return ReadOutcome::ReadError(format!(
                            "cannot decode packet after frame {}: {e}",
                            self.frame_index
                        ));
                    }
                }
            }
        }
    }

    fn receive(&mut self) -> Received {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => return Received::Finished,
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                return Received::NeedInput
            }
            Err(e) => return Received::Failed(format!("cannot receive frame: {e}")),
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            return Received::Failed(format!("cannot convert frame to RGB: {e}"));
        }

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Received::Frame(frame)
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly-packed RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::infrastructure::test_support::write_test_video;

    fn collect_frames(source: &mut FfmpegFrameSource) -> (Vec<Frame>, ReadOutcome) {
        let mut frames = Vec::new();
        loop {
            match source.next_frame() {
                ReadOutcome::Frame(frame) => frames.push(frame),
                other => return (frames, other),
            }
        }
    }

    #[test]
    fn test_open_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.mp4");
        write_test_video(&path, 5, 160, 120, 30.0);

        let mut source = FfmpegFrameSource::new();
        let meta = source.open(&path).unwrap();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert_eq!(meta.frame_rate, FrameRate::new(30, 1));
        assert_eq!(meta.source_path, Some(path));
        assert!(source.is_open());
    }

    #[test]
    fn test_open_nonexistent_is_source_unavailable() {
        let mut source = FfmpegFrameSource::new();
        let err = source.open(Path::new("/nonexistent/src.mp4")).unwrap_err();
        assert!(matches!(err, VideoError::SourceUnavailable { .. }));
        assert!(!source.is_open());
    }

    #[test]
    fn test_reads_every_frame_then_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.mp4");
        write_test_video(&path, 5, 160, 120, 30.0);

        let mut source = FfmpegFrameSource::new();
        source.open(&path).unwrap();

        let (frames, last) = collect_frames(&mut source);
        assert_eq!(frames.len(), 5);
        assert!(matches!(last, ReadOutcome::EndOfStream));
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
        }
    }

    #[test]
    fn test_end_of_stream_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.mp4");
        write_test_video(&path, 1, 64, 48, 25.0);

        let mut source = FfmpegFrameSource::new();
        source.open(&path).unwrap();
        let _ = collect_frames(&mut source);
        assert!(matches!(source.next_frame(), ReadOutcome::EndOfStream));
        assert!(matches!(source.next_frame(), ReadOutcome::EndOfStream));
    }

    #[test]
    fn test_next_frame_without_open_is_read_error() {
        let mut source = FfmpegFrameSource::new();
        assert!(matches!(source.next_frame(), ReadOutcome::ReadError(_)));
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.mp4");
        write_test_video(&path, 1, 64, 48, 25.0);

        let mut source = FfmpegFrameSource::new();
        source.open(&path).unwrap();
        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(matches!(source.next_frame(), ReadOutcome::ReadError(_)));
    }
}
