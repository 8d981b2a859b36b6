use std::collections::HashMap;

use crate::shared::constants::DEFAULT_MAX_SKIP_RATIO;

use super::run_summary::RunSummary;
use super::skip_reason::SkipReason;

/// Receives pipeline events from the controller.
///
/// Passed in explicitly so the CLI, tests and any future front end can
/// observe a run without the controller knowing where output goes.
pub trait PipelineLogger: Send {
    /// A frame pair was dropped. `frame` is the 0-based pair index.
    fn frame_skipped(&mut self, frame: usize, reason: &SkipReason);

    /// `count` frame pairs have been attempted so far.
    fn frame_processed(&mut self, count: usize);

    /// Time one named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    fn info(&mut self, message: &str);

    fn warn(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self, _summary: &RunSummary) {}
}

/// Discards everything.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn frame_skipped(&mut self, _frame: usize, _reason: &SkipReason) {}
    fn frame_processed(&mut self, _count: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn info(&mut self, _message: &str) {}
    fn warn(&mut self, _message: &str) {}
}

/// CLI logger on top of the `log` crate.
///
/// Skips are logged as they happen, progress every `throttle_frames`
/// pairs. The summary lists per-stage timing averages and the skip ratio,
/// and warns when the ratio exceeds `max_skip_ratio`.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    max_skip_ratio: f64,
    timings: HashMap<String, Vec<f64>>,
    processed: usize,
    skipped: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize, max_skip_ratio: f64) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            max_skip_ratio,
            timings: HashMap::new(),
            processed: 0,
            skipped: 0,
        }
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn exceeds_skip_threshold(&self, summary: &RunSummary) -> bool {
        summary.skip_ratio > self.max_skip_ratio
    }

    pub fn summary_string(&self, summary: &RunSummary) -> String {
        let elapsed_ms = summary.elapsed_secs * 1000.0;
        let mut lines = vec![format!(
            "Run summary ({:?}, {} frames in {:.1}s):",
            summary.termination, summary.frames_attempted, summary.elapsed_secs
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        lines.push(format!(
            "  Written: {}  Skipped: {} ({:.1}%)",
            summary.frames_written,
            summary.frames_skipped,
            summary.skip_ratio * 100.0
        ));
        for (kind, count) in &summary.skip_counts {
            lines.push(format!("    {kind}: {count}"));
        }

        if summary.frames_attempted > 0 && summary.elapsed_secs > 0.0 {
            let fps = summary.frames_attempted as f64 / summary.elapsed_secs;
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        lines.join("\n")
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(10, DEFAULT_MAX_SKIP_RATIO)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn frame_skipped(&mut self, frame: usize, reason: &SkipReason) {
        self.skipped += 1;
        log::warn!(
            "Skip frame {frame}: {reason} ({} of {} skipped)",
            self.skipped,
            self.processed + 1
        );
    }

    fn frame_processed(&mut self, count: usize) {
        self.processed = count;
        if count % self.throttle_frames == 0 {
            log::info!("Frames processed: {count} ({} skipped)", self.skipped);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn warn(&mut self, message: &str) {
        log::warn!("{message}");
    }

    fn summary(&self, summary: &RunSummary) {
        log::info!("\n\n{}", self.summary_string(summary));
        if self.exceeds_skip_threshold(summary) {
            log::warn!(
                "{:.1}% of frames were skipped (threshold {:.1}%); output may be mostly empty",
                summary.skip_ratio * 100.0,
                self.max_skip_ratio * 100.0
            );
        }
    }
}
