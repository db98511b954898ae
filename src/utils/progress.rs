// src/utils/progress.rs - Progress and abort hooks for batch extraction

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::env::env_bool;

/// Called after each profile is extracted with `(position, total)`.
/// Position is 1-based.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Shared flag polled between profiles. Setting it stops a running batch
/// after the current profile.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Optional observability hooks threaded through an extraction call.
#[derive(Clone, Default)]
pub struct ExtractionHooks {
    pub progress: Option<ProgressCallback>,
    /// Any raised flag stops the batch.
    pub aborts: Vec<AbortFlag>,
}

impl ExtractionHooks {
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_abort(mut self, flag: AbortFlag) -> Self {
        self.aborts.push(flag);
        self
    }

    pub fn notify(&self, position: usize, total: usize) {
        if let Some(ref cb) = self.progress {
            cb(position, total);
        }
    }

    pub fn should_abort(&self) -> bool {
        self.aborts.iter().any(AbortFlag::is_aborted)
    }
}

impl std::fmt::Debug for ExtractionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionHooks")
            .field("progress", &self.progress.is_some())
            .field("aborts", &self.aborts)
            .finish()
    }
}

/// Callback that only writes debug logs.
pub fn create_logging_callback(label: &str) -> ProgressCallback {
    let label = label.to_string();
    Arc::new(move |position: usize, total: usize| {
        if position == total || position % 100 == 0 {
            debug!("[{}] Progress: {}/{}", label, position, total);
        }
    })
}

/// Callback that drives an indicatif bar.
pub fn create_progress_bar_callback(pb: ProgressBar) -> ProgressCallback {
    Arc::new(move |position: usize, total: usize| {
        if pb.length() != Some(total as u64) {
            pb.set_length(total as u64);
        }
        pb.set_position(position as u64);
        if position == total {
            pb.finish_with_message("Complete");
        }
    })
}

/// Configuration for progress bars in the binaries.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub enabled: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_bool("PROGRESS_ENABLED", true),
        }
    }

    /// A styled bar of `len` steps, or `None` when progress is disabled.
    pub fn create_progress_bar(&self, len: u64, message: &str) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb.set_message(message.to_string());
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_hooks_notify_and_abort() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = Arc::clone(&call_count);
        let callback: ProgressCallback = Arc::new(move |_pos, _total| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let flag = AbortFlag::new();
        let hooks = ExtractionHooks::default()
            .with_progress(callback)
            .with_abort(flag.clone());

        hooks.notify(1, 2);
        hooks.notify(2, 2);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        assert!(!hooks.should_abort());
        flag.abort();
        assert!(hooks.should_abort());
    }

    #[test]
    fn test_any_chained_flag_aborts() {
        let caller = AbortFlag::new();
        let internal = AbortFlag::new();
        let hooks = ExtractionHooks::default()
            .with_abort(caller.clone())
            .with_abort(internal.clone());
        assert!(!hooks.should_abort());
        internal.abort();
        assert!(hooks.should_abort());
        assert!(!caller.is_aborted());
    }

    #[test]
    fn test_default_hooks_are_inert() {
        let hooks = ExtractionHooks::default();
        hooks.notify(1, 1);
        assert!(!hooks.should_abort());
    }

    #[test]
    fn test_logging_callback_does_not_panic() {
        let callback = create_logging_callback("TestExtractor");
        callback(1, 3);
        callback(3, 3);
    }

    #[test]
    fn test_progress_bar_creation() {
        let mut config = ProgressConfig::default();
        assert!(config.create_progress_bar(10, "test").is_some());
        config.enabled = false;
        assert!(config.create_progress_bar(10, "test").is_none());
    }

    #[test]
    fn test_progress_bar_callback_tracks_position() {
        let pb = ProgressBar::hidden();
        let callback = create_progress_bar_callback(pb.clone());
        callback(1, 4);
        assert_eq!(pb.position(), 1);
        assert_eq!(pb.length(), Some(4));
        callback(4, 4);
        assert!(pb.is_finished());
    }
}
