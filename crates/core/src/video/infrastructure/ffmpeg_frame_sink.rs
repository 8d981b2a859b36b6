use std::path::Path;

use crate::shared::frame::{Frame, FrameSize};
use crate::shared::video_metadata::FrameRate;
use crate::video::domain::frame_sink::FrameSink;
use crate::video::domain::video_error::VideoError;

/// Frame rate used when the input reports none.
const FALLBACK_RATE: FrameRate = FrameRate {
    numerator: 30,
    denominator: 1,
};

/// Largest time base denominator the MPEG-4 part 2 encoder accepts.
const MAX_TIME_BASE_DENOMINATOR: u32 = 65_535;

/// Encodes frames to an MPEG-4 video via ffmpeg-next.
///
/// The container is picked from the output extension. Frames are converted
/// from RGB24 to YUV420P before encoding.
pub struct FfmpegFrameSink {
    state: Option<EncodeState>,
}

// Safety: FfmpegFrameSink is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSink {}

struct EncodeState {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: ffmpeg_next::software::scaling::Context,
    size: FrameSize,
    time_base: ffmpeg_next::Rational,
    frame_count: usize,
}

impl FfmpegFrameSink {
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Frames appended since the sink was opened.
    pub fn frames_written(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.frame_count)
    }
}

impl Default for FfmpegFrameSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for FfmpegFrameSink {
    fn open(&mut self, path: &Path, size: FrameSize, rate: FrameRate) -> Result<(), VideoError> {
        let unavailable = |e: ffmpeg_next::Error| VideoError::SinkUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        ffmpeg_next::init().map_err(unavailable)?;

        let mut octx = ffmpeg_next::format::output(path).map_err(unavailable)?;

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).ok_or_else(|| {
            VideoError::SinkUnavailable {
                path: path.to_path_buf(),
                reason: "MPEG4 encoder not found".to_string(),
            }
        })?;

        let mut ost = octx.add_stream(Some(codec)).map_err(unavailable)?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(unavailable)?;

        let rate = encodable_rate(rate);
        let time_base = ffmpeg_next::Rational(rate.denominator as i32, rate.numerator as i32);

        encoder_ctx.set_width(size.width);
        encoder_ctx.set_height(size.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(time_base);
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(
            rate.numerator as i32,
            rate.denominator as i32,
        )));

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .map_err(unavailable)?;
        ost.set_parameters(&encoder);
        ost.set_time_base(time_base);
        ost.set_rate(ffmpeg_next::Rational(rate.numerator as i32, rate.denominator as i32));
        ost.set_avg_frame_rate(ffmpeg_next::Rational(
            rate.numerator as i32,
            rate.denominator as i32,
        ));

        octx.write_header().map_err(unavailable)?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            size.width,
            size.height,
            ffmpeg_next::format::Pixel::YUV420P,
            size.width,
            size.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(unavailable)?;

        self.state = Some(EncodeState {
            octx,
            encoder,
            scaler,
            size,
            time_base,
            frame_count: 0,
        });

        Ok(())
    }

    fn append(&mut self, frame: &Frame) -> Result<(), VideoError> {
        let state = self.state.as_mut().ok_or(VideoError::NotOpen("FfmpegFrameSink"))?;
        if frame.size() != state.size {
            return Err(VideoError::FrameSizeMismatch {
                expected: state.size,
                actual: frame.size(),
            });
        }
        state.encode(frame).map_err(|e| VideoError::Encode(e.to_string()))
    }

    fn close(&mut self) -> Result<(), VideoError> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        log::debug!("Finalizing output after {} frames", state.frame_count);
        state.finish().map_err(|e| VideoError::Encode(e.to_string()))
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Output finalization failed: {e}");
        }
    }
}

/// The rate to encode at: the input's exact rate when the encoder can
/// represent it, else the nearest rate it can, else the fallback.
fn encodable_rate(rate: FrameRate) -> FrameRate {
    let rate = rate.or(FALLBACK_RATE);
    if rate.numerator <= MAX_TIME_BASE_DENOMINATOR {
        return rate;
    }
    let approx = FrameRate::from_fps(rate.as_f64());
    if approx.is_known() && approx.numerator <= MAX_TIME_BASE_DENOMINATOR {
        approx
    } else {
        FrameRate::new(rate.as_f64().round().max(1.0) as u32, 1)
    }
}

impl EncodeState {
    fn encode(&mut self, frame: &Frame) -> Result<(), ffmpeg_next::Error> {
        let width = self.size.width as usize;
        let height = self.size.height as usize;

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.size.width,
            self.size.height,
        );

        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data_mut(0);
        let src = frame.data();
        let row_bytes = width * 3;
        for row in 0..height {
            let src_start = row * row_bytes;
            let dst_start = row * stride;
            data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src[src_start..src_start + row_bytes]);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(self.frame_count as i64));

        self.encoder.send_frame(&yuv_frame)?;
        self.drain_packets()?;

        self.frame_count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ffmpeg_next::Error> {
        self.encoder.send_eof()?;
        self.drain_packets()?;
        self.octx.write_trailer()
    }

    fn drain_packets(&mut self) -> Result<(), ffmpeg_next::Error> {
        let ost_time_base = self
            .octx
            .stream(0)
            .map(|s| s.time_base())
            .ok_or(ffmpeg_next::Error::StreamNotFound)?;

        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(self.time_base, ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }
}
