//! Logging setup and the detection event logger.

use tracing::{debug, info, trace, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::detection::{PatternKind, Severity};
use crate::orderbook::SnapshotQuality;

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// A second call is a no-op, so tests and embedding applications can call
/// it freely.
pub fn init_logging(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .try_init()
    };

    if result.is_err() {
        debug!("Global subscriber already installed");
    }
}

/// Structured events for one detector instance.
///
/// Constructed by whoever owns the detector and handed to it, so every event
/// carries the same `scope` (for example `pool-2/BTCUSDT`).
#[derive(Debug, Clone)]
pub struct DetectionLogger {
    scope: String,
}

impl Default for DetectionLogger {
    fn default() -> Self {
        Self::new("detector")
    }
}

impl DetectionLogger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self { scope: scope.into() }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn degenerate_snapshot(&self, sequence: u64, quality: SnapshotQuality, total: u64) {
        warn!(
            scope = %self.scope,
            sequence,
            quality = quality.as_str(),
            degenerate_total = total,
            "Degenerate snapshot recorded"
        );
    }

    pub fn crossed_book(&self, sequence: u64) {
        debug!(scope = %self.scope, sequence, "Crossed book kept in history");
    }

    pub fn cold_start(&self, snapshots: usize, required: usize) {
        debug!(scope = %self.scope, snapshots, required, "Insufficient history, skipping detectors");
    }

    pub fn pattern_detected(&self, pattern: PatternKind, likelihood: f64) {
        info!(scope = %self.scope, pattern = %pattern, likelihood, "Pattern detected");
    }

    pub fn detector_failed(&self, pattern: PatternKind, reason: &str) {
        warn!(scope = %self.scope, pattern = %pattern, reason, "Detector failed, contribution zeroed");
    }

    pub fn analysis_complete(&self, overall: f64, severity: Severity, confidence: f64, elapsed_ms: f64) {
        debug!(
            scope = %self.scope,
            overall,
            severity = severity.as_str(),
            confidence,
            elapsed_ms,
            "Analysis complete"
        );
    }

    pub fn cache_hit(&self, fingerprint: &str) {
        trace!(scope = %self.scope, fingerprint, "Cache hit");
    }
}
