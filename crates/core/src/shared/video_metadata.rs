use std::path::PathBuf;

use super::frame::FrameSize;

/// Exact frame rate as `numerator / denominator` frames per second.
///
/// Kept as a ratio so NTSC rates such as 30000/1001 survive a decode and
/// re-encode without rounding. `0/0` means the container reported none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub const UNKNOWN: FrameRate = FrameRate {
        numerator: 0,
        denominator: 0,
    };

    /// Reduced `numerator / denominator`; `UNKNOWN` if either part is 0.
    pub fn new(numerator: u32, denominator: u32) -> Self {
        if numerator == 0 || denominator == 0 {
            return Self::UNKNOWN;
        }
        let g = gcd(numerator, denominator);
        Self {
            numerator: numerator / g,
            denominator: denominator / g,
        }
    }

    /// Best ratio for a floating point rate. NTSC rates map to `n*1000/1001`,
    /// anything else is kept to a thousandth of a frame.
    pub fn from_fps(fps: f64) -> Self {
        if !fps.is_finite() || fps <= 0.0 {
            return Self::UNKNOWN;
        }
        let ntsc = fps * 1001.0 / 1000.0;
        if (ntsc - ntsc.round()).abs() < 1e-3 && (fps - fps.round()).abs() > 1e-3 {
            return Self::new(ntsc.round() as u32 * 1000, 1001);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    pub fn is_known(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.is_known() {
            self.numerator as f64 / self.denominator as f64
        } else {
            0.0
        }
    }

    /// This rate, or `fallback` when unknown.
    pub fn or(self, fallback: FrameRate) -> FrameRate {
        if self.is_known() {
            self
        } else {
            fallback
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Frame count advertised by the container; 0 when unknown.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn fps(&self) -> f64 {
        self.frame_rate.as_f64()
    }
}
