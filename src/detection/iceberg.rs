use serde::Serialize;

use super::{AnalysisContext, DetectionResult, PatternDetector, PatternKind, PatternMetrics};
use crate::config::IcebergConfig;
use crate::error::DetectorResult;
use crate::stats::clamp_unit;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IcebergMetrics {
    /// Levels refilled at least `min_refills` times.
    pub candidate_count: usize,
    pub total_refills: u32,
    /// Mean refills per candidate.
    pub refill_frequency: f64,
    pub max_refills: u32,
    /// Size shown at the most-refilled level.
    pub visible_size: f64,
}

/// Hidden size replenished after each slice trades.
pub struct IcebergDetector {
    config: IcebergConfig,
}

impl IcebergDetector {
    pub fn new(config: IcebergConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for IcebergDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::IcebergOrders
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(&mut self, ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult> {
        let tracker = ctx.tracker(self.kind())?;

        let mut metrics = IcebergMetrics::default();
        let mut candidate_refills = 0u32;
        for order in tracker.active_orders().chain(tracker.resolved_orders()) {
            metrics.total_refills += order.refills;
            if order.refills < self.config.min_refills {
                continue;
            }
            metrics.candidate_count += 1;
            candidate_refills += order.refills;
            if order.refills > metrics.max_refills {
                metrics.max_refills = order.refills;
                metrics.visible_size = order.current_size;
            }
        }

        let likelihood = if metrics.candidate_count == 0 {
            // Isolated refills are weak evidence on their own.
            (0.1 * metrics.total_refills as f64).min(0.3)
        } else {
            metrics.refill_frequency = candidate_refills as f64 / metrics.candidate_count as f64;
            clamp_unit(0.25 * metrics.refill_frequency + 0.05 * (metrics.candidate_count - 1) as f64)
        };

        Ok(DetectionResult::new(
            self.kind(),
            likelihood,
            self.config.detection_threshold,
            PatternMetrics::Iceberg(metrics),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrderTrackingConfig;
    use crate::orderbook::{OrderBook, OrderTracker, SnapshotHistory, TradeRecord, TradeSide};

    fn run(steps: Vec<(f64, Option<f64>)>) -> DetectionResult {
        let mut history = SnapshotHistory::new(100, 100);
        let mut tracker = OrderTracker::new(OrderTrackingConfig::default(), &IcebergConfig::default());
        for (i, (ask_size, traded)) in steps.into_iter().enumerate() {
            let ts = i as i64 * 1_000;
            let trades: Vec<TradeRecord> = traded
                .map(|size| TradeRecord::new(format!("t{}", i), 101.0, size, TradeSide::Buy, ts - 500))
                .into_iter()
                .collect();
            let book = OrderBook::new(vec![(100.0, 1.0)], vec![(101.0, ask_size)], ts);
            let update = history.update(&book, &trades).unwrap();
            tracker.update(history.previous(), history.latest().unwrap(), &update.new_trades);
        }
        IcebergDetector::new(IcebergConfig::default())
            .detect(&AnalysisContext::new(&history, Some(&tracker)))
            .unwrap()
    }

    #[test]
    fn test_repeated_refills_detected() {
        let result = run(vec![
            (10.0, None),
            (2.0, Some(8.0)),
            (10.0, None),
            (2.0, Some(8.0)),
            (10.0, None),
            (3.0, Some(7.0)),
            (10.0, None),
            (2.0, Some(8.0)),
            (10.0, None),
        ]);
        let metrics = result.metrics.iceberg().unwrap();

        assert_eq!(metrics.candidate_count, 1);
        assert_eq!(metrics.total_refills, 4);
        assert_eq!(metrics.refill_frequency, 4.0);
        assert!(result.detected);
    }

    #[test]
    fn test_single_refill_is_weak() {
        let result = run(vec![(10.0, None), (2.0, Some(8.0)), (10.0, None)]);
        assert_eq!(result.metrics.iceberg().unwrap().candidate_count, 0);
        assert!((result.likelihood - 0.1).abs() < 1e-12);
        assert!(!result.detected);
    }

    #[test]
    fn test_plain_consumption_is_not_iceberg() {
        let result = run(vec![(10.0, None), (6.0, Some(4.0)), (3.0, Some(3.0)), (3.0, None)]);
        assert_eq!(result.likelihood, 0.0);
    }
}
