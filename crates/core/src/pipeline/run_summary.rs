use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::pipeline_state::TerminationReason;
use super::skip_reason::SkipReason;

/// Most skipped-frame ranges kept for the report. Counts stay exact past it.
pub const MAX_SKIP_RANGES: usize = 256;

/// Outcome of one pipeline run, exported with `--report`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub termination: TerminationReason,
    pub frames_attempted: usize,
    pub frames_written: usize,
    pub frames_skipped: usize,
    /// `frames_skipped / frames_attempted`, 0 when nothing was attempted.
    pub skip_ratio: f64,
    pub skip_counts: BTreeMap<String, usize>,
    /// Inclusive `[first, last]` runs of skipped frame indices.
    pub skipped_frames: Vec<[usize; 2]>,
    /// More ranges were skipped than `MAX_SKIP_RANGES`.
    pub skipped_frames_truncated: bool,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Accumulates skipped frames while the pipeline runs.
#[derive(Debug, Default)]
pub struct SkipStats {
    counts: BTreeMap<String, usize>,
    total: usize,
    ranges: Vec<[usize; 2]>,
    truncated: bool,
}

impl SkipStats {
    /// Frames are expected in increasing order; a frame right after the
    /// last range extends it.
    pub fn record(&mut self, frame: usize, reason: &SkipReason) {
        *self.counts.entry(reason.kind().to_string()).or_default() += 1;
        self.total += 1;
        if let Some(last) = self.ranges.last_mut() {
            if frame == last[1] + 1 {
                last[1] = frame;
                return;
            }
        }
        if self.ranges.len() < MAX_SKIP_RANGES {
            self.ranges.push([frame, frame]);
        } else {
            self.truncated = true;
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn summarize(
        &self,
        termination: TerminationReason,
        frames_attempted: usize,
        frames_written: usize,
        elapsed: Duration,
    ) -> RunSummary {
        let frames_skipped = self.total();
        let skip_ratio = if frames_attempted == 0 {
            0.0
        } else {
            frames_skipped as f64 / frames_attempted as f64
        };
        RunSummary {
            termination,
            frames_attempted,
            frames_written,
            frames_skipped,
            skip_ratio,
            skip_counts: self.counts.clone(),
            skipped_frames: self.ranges.clone(),
            skipped_frames_truncated: self.truncated,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}
