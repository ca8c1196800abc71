#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the ground risk tool.
//!
//! Provides an `indicatif` stage bar for the analysis pipeline, plus
//! [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::{MultiProgress, ProgressDrawTarget};

/// A fixed-length bar that advances one pipeline stage at a time.
pub struct StageProgress {
    bar: ProgressBar,
    started: Instant,
    stage_started: Instant,
}

impl StageProgress {
    /// Creates a bar for `total` stages. Total is known up front so this
    /// starts as a bar immediately.
    #[must_use]
    pub fn new(multi: &MultiProgress, total: u64) -> Self {
        let bar = multi.add(ProgressBar::new(total));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} {msg:<28} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        let now = Instant::now();
        Self {
            bar,
            started: now,
            stage_started: now,
        }
    }

    /// Marks the start of a stage.
    pub fn start(&mut self, stage: &str) {
        self.stage_started = Instant::now();
        self.bar.set_message(stage.to_string());
    }

    /// Marks the current stage done and logs how long it took.
    pub fn complete(&mut self) {
        log::info!(
            "{} done in {:.2?}",
            self.bar.message(),
            self.stage_started.elapsed()
        );
        self.bar.inc(1);
    }

    /// Skips a stage without running it.
    pub fn skip(&mut self, stage: &str) {
        log::info!("{stage} skipped");
        self.bar.inc(1);
    }

    /// Finishes the bar with a closing message.
    pub fn finish(&self, message: &str) {
        self.bar
            .finish_with_message(format!("{message} ({:.2?})", self.started.elapsed()));
    }

    /// Removes the bar, e.g. after a failed stage.
    pub fn abandon(&self) {
        self.bar.abandon();
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

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    multi
}
