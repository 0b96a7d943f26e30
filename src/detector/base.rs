use std::time::Instant;

use super::ManipulationAnalyzer;
use crate::config::DetectorConfig;
use crate::detection::{
    AdvancedMetrics, AggregateResult, AnalysisContext, Coverage, LayeringDetector, PatternDetector, PatternKind,
    ScoreAggregator, SpoofingDetector,
};
use crate::error::DetectorResult;
use crate::orderbook::{HistoryUpdate, OrderBook, OrderTracker, SnapshotHistory, SnapshotQuality, TradeRecord};
use crate::telemetry::DetectionLogger;

/// History plus the book-shape detectors (spoofing, layering).
pub struct ManipulationDetector {
    config: DetectorConfig,
    history: SnapshotHistory,
    detectors: Vec<Box<dyn PatternDetector>>,
    aggregator: ScoreAggregator,
    logger: DetectionLogger,
}

impl ManipulationDetector {
    pub fn new(config: DetectorConfig) -> DetectorResult<Self> {
        Self::with_logger(config, DetectionLogger::default())
    }

    pub fn with_logger(config: DetectorConfig, logger: DetectionLogger) -> DetectorResult<Self> {
        config.validate()?;
        let detectors: Vec<Box<dyn PatternDetector>> = vec![
            Box::new(SpoofingDetector::new(config.spoofing.clone())),
            Box::new(LayeringDetector::new(config.layering.clone())),
        ];
        Self::from_parts(config, detectors, logger)
    }

    /// Build around an explicit detector set. Weights are validated against
    /// exactly the patterns supplied.
    pub(crate) fn from_parts(
        config: DetectorConfig,
        detectors: Vec<Box<dyn PatternDetector>>,
        logger: DetectionLogger,
    ) -> DetectorResult<Self> {
        let kinds: Vec<PatternKind> = detectors.iter().map(|d| d.kind()).collect();
        let aggregator = ScoreAggregator::new(&config, &kinds)?;
        let history = SnapshotHistory::new(config.history.max_snapshots, config.history.trade_history_size);

        Ok(Self {
            config,
            history,
            detectors,
            aggregator,
            logger,
        })
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    /// Record one book update. Degenerate books are kept and logged.
    pub fn update(&mut self, orderbook: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<HistoryUpdate> {
        let update = self.history.update(orderbook, trades)?;
        let sequence = self.history.latest().map(|s| s.sequence).unwrap_or_default();

        if update.quality.is_degenerate() {
            self.logger
                .degenerate_snapshot(sequence, update.quality, self.history.degenerate_count());
        } else if update.quality == SnapshotQuality::Crossed {
            self.logger.crossed_book(sequence);
        }
        Ok(update)
    }

    /// Score the current window. Detector failures are folded into the result.
    pub(crate) fn evaluate(&mut self, tracker: Option<&OrderTracker>) -> AggregateResult {
        let started = Instant::now();

        let coverage = Coverage {
            snapshots: self.history.len(),
            trades: self.history.trade_count(),
            timestamp: self.history.latest().map(|s| s.timestamp).unwrap_or_default(),
        };

        if coverage.snapshots < self.config.history.min_snapshots {
            self.logger.cold_start(coverage.snapshots, self.config.history.min_snapshots);
            let mut result = self.aggregator.cold_start(coverage);
            result.performance.analysis_time_ms = started.elapsed().as_secs_f64() * 1_000.0;
            return result;
        }

        let ctx = AnalysisContext::new(&self.history, tracker);
        let outcomes = self
            .detectors
            .iter_mut()
            .filter(|d| d.is_enabled())
            .map(|d| (d.kind(), d.detect(&ctx)))
            .collect();

        let mut result = self.aggregator.aggregate(outcomes, coverage, AdvancedMetrics::default());

        for failure in &result.errors {
            self.logger.detector_failed(failure.pattern, &failure.message);
        }
        for pattern in result.patterns().filter(|p| p.detected) {
            self.logger.pattern_detected(pattern.pattern, pattern.likelihood);
        }

        result.performance.analysis_time_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.logger.analysis_complete(
            result.overall_likelihood,
            result.severity,
            result.confidence,
            result.performance.analysis_time_ms,
        );
        result
    }
}

impl ManipulationAnalyzer for ManipulationDetector {
    fn analyze(&mut self, orderbook: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<AggregateResult> {
        self.update(orderbook, trades)?;
        Ok(self.evaluate(None))
    }

    fn snapshot_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionResult, ManipulationType};
    use crate::error::DetectorError;
    use crate::orderbook::TradeSide;

    fn book(i: i64) -> OrderBook {
        OrderBook::new(
            vec![(100.0, 1.0 + (i % 3) as f64), (99.0, 4.0)],
            vec![(101.0, 2.0), (102.0, 7.0)],
            i * 1_000,
        )
    }

    /// Always fails, to exercise failure isolation.
    struct Broken;

    impl PatternDetector for Broken {
        fn kind(&self) -> PatternKind {
            PatternKind::Spoofing
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn detect(&mut self, _ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult> {
            Err(DetectorError::pattern(PatternKind::Spoofing, "forced"))
        }
    }

    #[test]
    fn test_cold_start_skips_detectors() {
        let mut detector = ManipulationDetector::new(DetectorConfig::default()).unwrap();
        for i in 0..9 {
            let result = detector.analyze(&book(i), &[]).unwrap();
            assert_eq!(result.overall_likelihood, 0.0);
            assert_eq!(result.manipulation_type, ManipulationType::None);
            assert_eq!(result.confidence, 0.0);
            assert!(result.is_cold_start());
        }
        let warm = detector.analyze(&book(9), &[]).unwrap();
        assert!(warm.confidence > 0.0);
        assert_eq!(warm.snapshots_analyzed, 10);
    }

    #[test]
    fn test_invalid_book_rejected_without_mutation() {
        let mut detector = ManipulationDetector::new(DetectorConfig::default()).unwrap();
        detector.analyze(&book(0), &[]).unwrap();

        let bad = OrderBook::new(vec![(f64::INFINITY, 1.0)], vec![(101.0, 1.0)], 1);
        assert!(matches!(detector.analyze(&bad, &[]), Err(DetectorError::InvalidData(_))));
        assert_eq!(detector.snapshot_count(), 1);
    }

    #[test]
    fn test_degenerate_book_is_recorded() {
        let mut detector = ManipulationDetector::new(DetectorConfig::default()).unwrap();
        let one_sided = OrderBook::new(vec![(100.0, 1.0)], vec![], 0);
        assert!(detector.analyze(&one_sided, &[]).is_ok());
        assert_eq!(detector.history().degenerate_count(), 1);
        assert_eq!(detector.snapshot_count(), 1);
    }

    #[test]
    fn test_failing_detector_does_not_block_result() {
        let config = DetectorConfig::default();
        let detectors: Vec<Box<dyn PatternDetector>> = vec![
            Box::new(Broken),
            Box::new(LayeringDetector::new(config.layering.clone())),
        ];
        let mut detector = ManipulationDetector::from_parts(config, detectors, DetectionLogger::new("test")).unwrap();

        let mut last = None;
        for i in 0..12 {
            let trade = TradeRecord::new(format!("t{}", i), 101.0, 0.1, TradeSide::Buy, i * 1_000);
            last = Some(detector.analyze(&book(i), &[trade]).unwrap());
        }
        let result = last.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.spoofing.likelihood, 0.0);
        assert!(result.spoofing.error.is_some());
        assert!(result.layering.error.is_none());
        assert!((0.0..=1.0).contains(&result.overall_likelihood));
    }

    #[test]
    fn test_disabled_pattern_reported_inactive() {
        let mut config = DetectorConfig::default();
        config.layering.enabled = false;
        let mut detector = ManipulationDetector::new(config).unwrap();
        let mut result = None;
        for i in 0..10 {
            result = Some(detector.analyze(&book(i), &[]).unwrap());
        }
        let result = result.unwrap();
        assert!(!result.layering.enabled);
        assert!(result.spoofing.enabled);
    }
}
