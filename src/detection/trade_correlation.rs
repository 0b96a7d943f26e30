use serde::Serialize;
use std::collections::VecDeque;

use super::{AnalysisContext, DetectionResult, PatternDetector, PatternKind, PatternMetrics};
use crate::config::TradeCorrelationConfig;
use crate::error::DetectorResult;
use crate::orderbook::{OrderEvent, OrderEventKind, TradeRecord};
use crate::stats::within_relative;

/// A trade counts as explained once this share of its size is matched.
const MATCH_COVERAGE: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeCorrelationMetrics {
    pub trades_evaluated: usize,
    pub matched_trades: usize,
    /// matched_trades / trades_evaluated for this call.
    pub correlation_score: f64,
    /// Rolling mean of recent correlation scores.
    pub accuracy_trend: f64,
}

/// Checks that printed trades line up with visible book depletion.
///
/// A low score means volume is printing without the book moving, which
/// undermines the book-derived detectors.
pub struct TradeCorrelationDetector {
    config: TradeCorrelationConfig,
    scores: VecDeque<f64>,
}

impl TradeCorrelationDetector {
    pub fn new(config: TradeCorrelationConfig) -> Self {
        let capacity = config.trend_window;
        Self {
            config,
            scores: VecDeque::with_capacity(capacity),
        }
    }

    /// Rolling accuracy; 1.0 until any score has been recorded.
    pub fn accuracy_trend(&self) -> f64 {
        if self.scores.is_empty() {
            return 1.0;
        }
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }

    fn record(&mut self, score: f64) {
        self.scores.push_back(score);
        while self.scores.len() > self.config.trend_window.max(1) {
            self.scores.pop_front();
        }
    }

    fn could_explain(&self, trade: &TradeRecord, event: &OrderEvent) -> bool {
        matches!(event.kind, OrderEventKind::Reduced | OrderEventKind::Removed)
            && event.side == trade.side.consumes()
            && event.timestamp >= trade.timestamp
            && event.timestamp - trade.timestamp <= self.config.window_ms
            && within_relative(trade.price, event.price, self.config.price_tolerance)
    }

    /// Greedily allot each trade to the depletion events it could have caused.
    fn match_trades(&self, trades: &[&TradeRecord], events: &[&OrderEvent]) -> usize {
        let mut capacity: Vec<f64> = events.iter().map(|e| e.size_delta).collect();
        let mut matched = 0;

        for trade in trades {
            let mut remaining = trade.size;
            for (idx, event) in events.iter().enumerate() {
                if remaining <= 0.0 {
                    break;
                }
                if capacity[idx] <= 0.0 || !self.could_explain(trade, event) {
                    continue;
                }
                let take = capacity[idx].min(remaining);
                capacity[idx] -= take;
                remaining -= take;
            }
            if trade.size - remaining >= trade.size * MATCH_COVERAGE {
                matched += 1;
            }
        }

        matched
    }
}

impl PatternDetector for TradeCorrelationDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::TradeCorrelation
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(&mut self, ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult> {
        let tracker = ctx.tracker(self.kind())?;
        let latest = ctx.latest_timestamp();
        let since = latest.saturating_sub(self.config.window_ms);

        let trades: Vec<&TradeRecord> = ctx
            .history
            .trades_since(since)
            .filter(|t| t.timestamp <= latest)
            .collect();
        let events: Vec<&OrderEvent> = tracker.events().iter().filter(|e| e.timestamp >= since).collect();

        let mut metrics = TradeCorrelationMetrics {
            trades_evaluated: trades.len(),
            ..Default::default()
        };

        let likelihood = if trades.is_empty() {
            0.0
        } else {
            metrics.matched_trades = self.match_trades(&trades, &events);
            metrics.correlation_score = metrics.matched_trades as f64 / trades.len() as f64;
            self.record(metrics.correlation_score);
            1.0 - metrics.correlation_score
        };
        metrics.accuracy_trend = self.accuracy_trend();

        Ok(DetectionResult::new(
            self.kind(),
            likelihood,
            self.config.detection_threshold,
            PatternMetrics::TradeCorrelation(metrics),
        ))
    }
}
