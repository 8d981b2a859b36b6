mod log_gate;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use faceswap_core::compositing::domain::face_compositor::{CompositeOptions, WarpMode};
use faceswap_core::compositing::infrastructure::landmark_compositor::LandmarkCompositor;
use faceswap_core::detection::domain::face_locator::FaceLocator;
use faceswap_core::detection::infrastructure::model_resolver::{self, ModelSource};
use faceswap_core::detection::infrastructure::onnx_face_locator::OnnxFaceLocator;
use faceswap_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use faceswap_core::pipeline::run_summary::RunSummary;
use faceswap_core::pipeline::swap_config::SwapConfig;
use faceswap_core::pipeline::swap_faces_use_case::SwapFacesUseCase;
use faceswap_core::preview::domain::preview_sink::PreviewSink;
use faceswap_core::preview::infrastructure::terminal_preview::TerminalPreview;
use faceswap_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use faceswap_core::video::infrastructure::ffmpeg_frame_sink::FfmpegFrameSink;
use faceswap_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;

use log_gate::LogGate;

/// Frames between progress log lines.
const PROGRESS_EVERY: usize = 25;

/// Swap the face of one video onto another, frame by frame.
#[derive(Parser, Debug)]
#[command(name = "faceswap-video")]
struct Cli {
    /// Video providing the face.
    #[arg(long = "src_video")]
    src_video: PathBuf,

    /// Video whose face is replaced.
    #[arg(long = "dst_video")]
    dst_video: PathBuf,

    /// Output video path. Missing parent directories are created.
    #[arg(long = "save_path")]
    save_path: PathBuf,

    /// Use a single similarity warp instead of the piecewise warp.
    #[arg(long = "warp_2d")]
    warp_2d: bool,

    /// Match the swapped face's colors to the destination.
    #[arg(long = "correct_color")]
    correct_color: bool,

    /// Show a live preview in the terminal (q to stop).
    #[arg(long)]
    show: bool,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,

    /// ONNX face model to use instead of the cached download.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Write the run summary as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Skip ratio above which the run is reported as degraded (0.0-1.0).
    #[arg(long = "max_skip_ratio", default_value = "0.5")]
    max_skip_ratio: f64,
}

impl Cli {
    fn composite_options(&self) -> CompositeOptions {
        CompositeOptions {
            warp_mode: if self.warp_2d {
                WarpMode::TwoD
            } else {
                WarpMode::ThreeD
            },
            correct_color: self.correct_color,
        }
    }

    fn swap_config(&self) -> SwapConfig {
        SwapConfig::new(
            self.src_video.clone(),
            self.dst_video.clone(),
            self.save_path.clone(),
        )
        .with_composite(self.composite_options())
        .with_preview(self.show)
    }
}

fn main() {
    let log_gate = LogGate::new(io::stderr());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_gate.clone())))
        .init();

    if let Err(e) = run(&log_gate) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(log_gate: &LogGate) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    prepare_output_dir(&cli.save_path)?;
    if let Some(report) = &cli.report {
        prepare_output_dir(report)?;
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            cancelled.store(true, Ordering::SeqCst);
        }) {
            log::warn!("Failed to install Ctrl+C handler: {err}");
        }
    }

    let locator = build_locator(&cli)?;
    let preview: Option<Box<dyn PreviewSink>> = if cli.show {
        Some(Box::new(TerminalPreview::new()))
    } else {
        None
    };
    let logger = StdoutPipelineLogger::new(PROGRESS_EVERY, cli.max_skip_ratio);

    let mut use_case = SwapFacesUseCase::new(
        Box::new(FfmpegFrameSource::new()),
        Box::new(FfmpegFrameSource::new()),
        Box::new(FfmpegFrameSink::new()),
        preview,
        locator,
        Box::new(LandmarkCompositor::new()),
        Box::new(logger),
        Some(cancelled),
    );

    // Log lines would draw over the preview, so they wait until it closes.
    if cli.show {
        log_gate.hold();
    }
    let result = use_case.execute(&cli.swap_config());
    if let Err(e) = log_gate.release() {
        eprintln!("Failed to flush held log output: {e}");
    }
    let summary = result?;
    log::info!(
        "Output written to {} ({:?})",
        cli.save_path.display(),
        summary.termination
    );

    if let Some(report) = &cli.report {
        write_report(report, &summary);
    }
    Ok(())
}

/// Writes the JSON summary. The run has already completed, so a failure
/// here is reported but does not change the exit code.
fn write_report(path: &Path, summary: &RunSummary) -> bool {
    let written = summary
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => {
            log::info!("Run summary written to {}", path.display());
            true
        }
        Err(e) => {
            log::warn!("Failed to write run summary to {}: {e}", path.display());
            false
        }
    }
}

fn build_locator(cli: &Cli) -> Result<Box<dyn FaceLocator>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let source = ModelSource {
        name: YOLO_MODEL_NAME,
        url: YOLO_MODEL_URL,
    };
    let model_path =
        model_resolver::resolve(source, cli.model.as_deref(), Some(Box::new(download_progress)))?;
    if cli.model.is_none() {
        eprintln!();
    }
    Ok(Box::new(OnnxFaceLocator::new(&model_path, cli.confidence)?))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.src_video.is_file() {
        return Err(format!("Source video not found: {}", cli.src_video.display()).into());
    }
    if !cli.dst_video.is_file() {
        return Err(format!("Destination video not found: {}", cli.dst_video.display()).into());
    }
    if cli.save_path.as_os_str().is_empty() || cli.save_path.is_dir() {
        return Err(format!("Save path must be a file: {}", cli.save_path.display()).into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.max_skip_ratio) {
        return Err(format!(
            "Max skip ratio must be between 0.0 and 1.0, got {}",
            cli.max_skip_ratio
        )
        .into());
    }
    if let Some(report) = &cli.report {
        if report.as_os_str().is_empty() || report.is_dir() {
            return Err(format!("Report path must be a file: {}", report.display()).into());
        }
        if let Some(blocker) = non_directory_ancestor(report) {
            return Err(format!(
                "Report directory cannot be created, {} is not a directory",
                blocker.display()
            )
            .into());
        }
    }
    if let Some(model) = &cli.model {
        if !model.is_file() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    Ok(())
}

/// First existing ancestor of `path` that is not a directory, if any.
fn non_directory_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors()
        .skip(1)
        .filter(|p| !p.as_os_str().is_empty())
        .find(|p| p.exists())
        .filter(|p| !p.is_dir())
}

fn prepare_output_dir(save_path: &Path) -> std::io::Result<()> {
    match save_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceswap_core::pipeline::pipeline_state::TerminationReason;
    use faceswap_core::pipeline::run_summary::SkipStats;
    use std::time::Duration;
    use tempfile::TempDir;

    fn summary() -> RunSummary {
        SkipStats::default().summarize(
            TerminationReason::NormalEndOfStream,
            3,
            3,
            Duration::from_secs(1),
        )
    }

    fn videos(dir: &TempDir) -> (PathBuf, PathBuf) {
        let src = dir.path().join("src.mp4");
        let dst = dir.path().join("dst.mp4");
        fs::write(&src, b"src").unwrap();
        fs::write(&dst, b"dst").unwrap();
        (src, dst)
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["faceswap-video"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn cli_for(dir: &TempDir, extra: &[&str]) -> Cli {
        let (src, dst) = videos(dir);
        let out = dir.path().join("out/result.mp4");
        let mut args = vec![
            "--src_video".to_string(),
            src.display().to_string(),
            "--dst_video".to_string(),
            dst.display().to_string(),
            "--save_path".to_string(),
            out.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        parse(&refs)
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[
            "--src_video",
            "a.mp4",
            "--dst_video",
            "b.mp4",
            "--save_path",
            "out.mp4",
        ]);
        assert!(!cli.warp_2d);
        assert!(!cli.correct_color);
        assert!(!cli.show);
        assert_eq!(cli.confidence, 0.5);
        assert_eq!(cli.max_skip_ratio, 0.5);
        assert!(cli.model.is_none());
        assert!(cli.report.is_none());

        let options = cli.composite_options();
        assert_eq!(options.warp_mode, WarpMode::ThreeD);
        assert!(!options.correct_color);
    }

    #[test]
    fn test_flags_map_to_config() {
        let cli = parse(&[
            "--src_video",
            "a.mp4",
            "--dst_video",
            "b.mp4",
            "--save_path",
            "out.mp4",
            "--warp_2d",
            "--correct_color",
            "--show",
        ]);
        let config = cli.swap_config();
        assert_eq!(config.composite.warp_mode, WarpMode::TwoD);
        assert!(config.composite.correct_color);
        assert!(config.preview);
        assert_eq!(config.source, PathBuf::from("a.mp4"));
        assert_eq!(config.destination, PathBuf::from("b.mp4"));
        assert_eq!(config.output, PathBuf::from("out.mp4"));
    }

    #[test]
    fn test_required_arguments() {
        assert!(Cli::try_parse_from(["faceswap-video", "--src_video", "a.mp4"]).is_err());
    }

    #[test]
    fn test_validate_accepts_existing_inputs() {
        let dir = TempDir::new().unwrap();
        let cli = cli_for(&dir, &[]);
        assert!(validate(&cli).is_ok());
    }

    #[test]
    fn test_validate_missing_source() {
        let dir = TempDir::new().unwrap();
        let mut cli = cli_for(&dir, &[]);
        cli.src_video = dir.path().join("missing.mp4");
        let err = validate(&cli).unwrap_err();
        assert!(err.to_string().contains("Source video not found"));
    }

    #[test]
    fn test_validate_missing_destination() {
        let dir = TempDir::new().unwrap();
        let mut cli = cli_for(&dir, &[]);
        cli.dst_video = dir.path().join("missing.mp4");
        let err = validate(&cli).unwrap_err();
        assert!(err.to_string().contains("Destination video not found"));
    }

    #[test]
    fn test_validate_ranges() {
        let dir = TempDir::new().unwrap();
        let cli = cli_for(&dir, &["--confidence", "1.5"]);
        assert!(validate(&cli).is_err());

        let cli = cli_for(&dir, &["--max_skip_ratio", "2"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_validate_missing_model() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("missing.onnx");
        let cli = cli_for(&dir, &["--model", model.to_str().unwrap()]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_validate_rejects_directory_save_path() {
        let dir = TempDir::new().unwrap();
        let mut cli = cli_for(&dir, &[]);
        cli.save_path = dir.path().to_path_buf();
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_report_with_missing_parent_is_prepared_before_run() {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("reports/nightly/summary.json");
        let cli = cli_for(&dir, &["--report", report.to_str().unwrap()]);

        assert!(validate(&cli).is_ok());
        prepare_output_dir(&report).unwrap();
        assert!(dir.path().join("reports/nightly").is_dir());
        assert!(write_report(&report, &summary()));
        let json = fs::read_to_string(&report).unwrap();
        assert!(json.contains("\"termination\": \"normal_end_of_stream\""));
    }

    #[test]
    fn test_report_under_a_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();
        let report = blocker.join("summary.json");
        let cli = cli_for(&dir, &["--report", report.to_str().unwrap()]);

        let err = validate(&cli).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_report_write_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("missing/summary.json");
        assert!(!write_report(&report, &summary()));
        assert!(!report.exists());
    }

    #[test]
    fn test_prepare_output_dir_creates_parents() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("a/b/out.mp4");
        prepare_output_dir(&out).unwrap();
        assert!(dir.path().join("a/b").is_dir());
        assert!(prepare_output_dir(Path::new("out.mp4")).is_ok());
    }
}
