pub mod ffmpeg_frame_sink;
pub mod ffmpeg_frame_source;
