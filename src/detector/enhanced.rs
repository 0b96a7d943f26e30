use super::{ManipulationAnalyzer, ManipulationDetector};
use crate::config::DetectorConfig;
use crate::detection::{
    AdvancedMetrics, AggregateResult, FakeLiquidityDetector, IcebergDetector, LayeringDetector, PatternDetector,
    SpoofingDetector, TradeCorrelationDetector, WashTradingDetector,
};
use crate::error::DetectorResult;
use crate::orderbook::{OrderBook, OrderTracker, TradeRecord};
use crate::telemetry::DetectionLogger;

/// Full detector: adds order lifecycle tracking and the trade/lifecycle patterns.
pub struct EnhancedManipulationDetector {
    base: ManipulationDetector,
    tracker: OrderTracker,
}

impl EnhancedManipulationDetector {
    pub fn new(config: DetectorConfig) -> DetectorResult<Self> {
        Self::with_logger(config, DetectionLogger::default())
    }

    pub fn with_logger(config: DetectorConfig, logger: DetectionLogger) -> DetectorResult<Self> {
        config.validate()?;

        let detectors: Vec<Box<dyn PatternDetector>> = vec![
            Box::new(SpoofingDetector::new(config.spoofing.clone())),
            Box::new(LayeringDetector::new(config.layering.clone())),
            Box::new(WashTradingDetector::new(config.wash_trading.clone())),
            Box::new(FakeLiquidityDetector::new(config.fake_liquidity.clone())),
            Box::new(IcebergDetector::new(config.iceberg.clone())),
            Box::new(TradeCorrelationDetector::new(config.trade_correlation.clone())),
        ];
        let tracker = OrderTracker::new(config.order_tracking.clone(), &config.iceberg);
        let base = ManipulationDetector::from_parts(config, detectors, logger)?;

        Ok(Self { base, tracker })
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    fn advanced_metrics(&self, result: &AggregateResult) -> AdvancedMetrics {
        let stats = self.tracker.stats();
        AdvancedMetrics {
            tracked_orders: stats.active_orders,
            phantom_orders: stats.phantom_orders,
            iceberg_candidates: stats.iceberg_candidates,
            correlation_accuracy: result
                .trade_correlation
                .metrics
                .trade_correlation()
                .map(|m| m.accuracy_trend)
                .unwrap_or_default(),
        }
    }
}

impl ManipulationAnalyzer for EnhancedManipulationDetector {
    fn analyze(&mut self, orderbook: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<AggregateResult> {
        let update = self.base.update(orderbook, trades)?;

        let history = self.base.history();
        if let Some(latest) = history.latest() {
            self.tracker.update(history.previous(), latest, &update.new_trades);
        }

        let mut result = self.base.evaluate(Some(&self.tracker));
        if !result.is_cold_start() {
            result.advanced_metrics = self.advanced_metrics(&result);
        }
        Ok(result)
    }

    fn snapshot_count(&self) -> usize {
        self.base.history().len()
    }
}
