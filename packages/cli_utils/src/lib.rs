#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the Vision Zero toolchain.
//!
//! Provides [`StageProgress`], an `indicatif` bar that tracks pipeline
//! stages, plus [`init_logger`] which sets up `indicatif-log-bridge` so
//! that `log::info!` and friends are suspended while the bar redraws.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::{MultiProgress, ProgressDrawTarget};

/// Step-level progress over the pipeline's stages (e.g., stage 2/4).
pub struct StageProgress {
    bar: ProgressBar,
    total: u64,
}

impl StageProgress {
    /// Creates a bar with a known number of stages.
    #[must_use]
    pub fn new(multi: &MultiProgress, total: u64) -> Self {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.enable_steady_tick(Duration::from_millis(250));
        Self { bar, total }
    }

    /// Marks a stage as started and returns its `[n/total]` prefix.
    #[must_use]
    pub fn start(&self, stage: &str) -> String {
        let prefix = format!("[{}/{}]", self.bar.position() + 1, self.total);
        self.bar.set_message(format!("{prefix} {stage}"));
        prefix
    }

    /// Marks the current stage as finished, whether it ran or was skipped.
    pub fn advance(&self) {
        self.bar.inc(1);
    }

    /// Number of stages advanced past so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finishes the bar, leaving a final message.
    pub fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    /// Removes the bar, e.g. when a stage fails.
    pub fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set in tests.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progress_counts_stages() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = StageProgress::new(&multi, 3);

        assert_eq!(progress.start("transformation"), "[1/3]");
        progress.advance();
        assert_eq!(progress.start("generation"), "[2/3]");
        progress.advance();
        assert_eq!(progress.position(), 2);
        progress.finish("done".to_string());
    }

    #[test]
    fn init_logger_can_be_called_twice() {
        let _ = init_logger();
        let _ = init_logger();
    }
}
