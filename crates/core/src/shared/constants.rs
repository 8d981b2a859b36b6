pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Landmarks produced per face by the bundled locator.
pub const LANDMARK_COUNT: usize = 5;

pub const PREVIEW_TITLE: &str = "faceswap";

/// How long the controller waits for a cancel key each iteration.
pub const CANCEL_POLL_TIMEOUT_MS: u64 = 1;

/// Skip ratio above which a run summary is reported as degraded.
pub const DEFAULT_MAX_SKIP_RATIO: f64 = 0.5;
