//! Progress tracking, callbacks and cancellation for registration runs.
//!
//! This module provides progress tracking, callbacks, and the cooperative
//! cancellation token checked at iteration boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a callback panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Progress information for registration iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Current iteration number.
    pub iteration: usize,
    /// Iteration limit of the run.
    pub max_iterations: usize,
    /// `‖Δ‖` of the last increment.
    pub delta_phi_norm: f64,
    /// Joint-histogram log-likelihood after the update.
    pub log_likelihood: f64,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Translation of the current Phi, when it decomposes.
    pub translation: Option<[f64; 3]>,
    /// Rotation vector of the current Phi, when it decomposes.
    pub rotation: Option<[f64; 3]>,
    /// Diagonal zoom of the current Phi, when it decomposes.
    pub zoom: Option<[f64; 3]>,
}

impl ProgressInfo {
    /// Create new progress information without transform parameters.
    pub fn new(
        iteration: usize,
        max_iterations: usize,
        delta_phi_norm: f64,
        log_likelihood: f64,
        elapsed: Duration,
    ) -> Self {
        Self {
            iteration,
            max_iterations,
            delta_phi_norm,
            log_likelihood,
            elapsed,
            translation: None,
            rotation: None,
            zoom: None,
        }
    }

    /// Attach translation, rotation and zoom.
    pub fn with_parameters(
        mut self,
        translation: [f64; 3],
        rotation: [f64; 3],
        zoom: [f64; 3],
    ) -> Self {
        self.translation = Some(translation);
        self.rotation = Some(rotation);
        self.zoom = Some(zoom);
        self
    }

    /// Calculate progress percentage against the iteration limit.
    pub fn progress_percent(&self) -> f64 {
        if self.max_iterations == 0 {
            return 100.0;
        }
        (self.iteration as f64 / self.max_iterations as f64) * 100.0
    }
}

/// Progress callback trait for monitoring registration progress.
pub trait ProgressCallback: Send + Sync {
    /// Called after each iteration with progress information.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when registration starts.
    fn on_start(&self) {}

    /// Called when registration finishes with a converged or capped result.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when registration fails or is cancelled.
    fn on_error(&self, _error: &str) {}
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (iterations).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    /// Create a new console progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval != 0 && info.iteration != info.max_iterations {
            return;
        }
        tracing::info!(
            "Iter {}/{} ({:.1}%) | logLikelihood: {:.3} | dPhiNorm: {:.5} | Elapsed: {:.2}s",
            info.iteration,
            info.max_iterations,
            info.progress_percent(),
            info.log_likelihood,
            info.delta_phi_norm,
            info.elapsed.as_secs_f64(),
        );
        if let (Some(t), Some(r), Some(z)) = (info.translation, info.rotation, info.zoom) {
            tracing::info!("  T = {:.3?} | R = {:.3?} | Z = {:.3?}", t, r, z);
        }
    }

    fn on_start(&self) {
        tracing::info!("Registration started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "Registration completed in {:.2}s after {} iterations (dPhiNorm: {:.5})",
            info.elapsed.as_secs_f64(),
            info.iteration,
            info.delta_phi_norm
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Registration failed: {}", error);
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    /// Clear the history.
    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }
}

/// Progress tracker that manages multiple callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Builder-style [`add_callback`](Self::add_callback).
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    /// Time since [`start`](Self::start), zero before it.
    pub fn elapsed(&self) -> Duration {
        let start = *lock(&self.start_time);
        start.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Start tracking.
    pub fn start(&self) {
        *lock(&self.start_time) = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    /// Report one iteration.
    pub fn update(&self, info: &ProgressInfo) {
        for callback in &self.callbacks {
            callback.on_progress(info);
        }
    }

    /// Complete tracking.
    pub fn complete(&self, info: &ProgressInfo) {
        for callback in &self.callbacks {
            callback.on_complete(info);
        }
    }

    /// Report error.
    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a running session.
///
/// The session reads it once per iteration boundary, so a cancelled run
/// always returns a fully updated Phi.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
