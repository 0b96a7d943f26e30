use serde::Serialize;

use super::{ensure_finite, AnalysisContext, DetectionResult, PatternDetector, PatternKind, PatternMetrics};
use crate::config::FakeLiquidityConfig;
use crate::error::DetectorResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FakeLiquidityMetrics {
    /// Phantom resolutions inside the configured window.
    pub withdrawal_events: usize,
    pub phantom_orders: usize,
    pub completed_orders: usize,
    pub phantom_ratio: f64,
    pub avg_lifetime_ms: f64,
}

/// Displayed size that disappears before anyone can trade against it.
pub struct FakeLiquidityDetector {
    config: FakeLiquidityConfig,
}

impl FakeLiquidityDetector {
    pub fn new(config: FakeLiquidityConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for FakeLiquidityDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::FakeLiquidity
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(&mut self, ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult> {
        let tracker = ctx.tracker(self.kind())?;
        let stats = tracker.stats();

        let since = ctx.latest_timestamp().saturating_sub(self.config.window_ms);
        let mut metrics = FakeLiquidityMetrics {
            withdrawal_events: tracker.phantom_events_since(since),
            phantom_orders: stats.phantom_orders,
            completed_orders: stats.completed_orders,
            phantom_ratio: 0.0,
            avg_lifetime_ms: stats.avg_lifetime_ms,
        };

        let resolved = stats.phantom_orders + stats.completed_orders;
        if resolved < self.config.min_resolved_orders {
            return Ok(DetectionResult::new(
                self.kind(),
                0.0,
                self.config.detection_threshold,
                PatternMetrics::FakeLiquidity(metrics),
            ));
        }

        metrics.phantom_ratio = stats.phantom_orders as f64 / resolved as f64;
        // A phantom ratio at the withdrawal threshold lands at 0.5.
        let likelihood = ensure_finite(
            self.kind(),
            "phantom_ratio",
            metrics.phantom_ratio / (2.0 * self.config.withdrawal_threshold),
        )?;

        Ok(DetectionResult::new(
            self.kind(),
            likelihood,
            self.config.detection_threshold,
            PatternMetrics::FakeLiquidity(metrics),
        ))
    }
}
