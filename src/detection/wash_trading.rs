use serde::Serialize;
use std::collections::HashMap;

use super::{ensure_finite, AnalysisContext, DetectionResult, PatternDetector, PatternKind, PatternMetrics};
use crate::config::WashTradingConfig;
use crate::error::DetectorResult;
use crate::orderbook::{TradeRecord, TradeSide};
use crate::stats::{clamp_unit, within_relative};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WashTradingMetrics {
    pub trades_analyzed: usize,
    /// Clusters of two or more near-identical trades linked within the time window.
    pub fingerprint_groups: usize,
    /// Fingerprint groups containing both buys and sells.
    pub circular_groups: usize,
    /// Opposing buy/sell pairs matched within the time window.
    pub pattern_count: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Group {
    buys: usize,
    sells: usize,
}

/// Disjoint sets over trade indices.
struct Clusters {
    parent: Vec<usize>,
}

impl Clusters {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut idx: usize) -> usize {
        while self.parent[idx] != idx {
            self.parent[idx] = self.parent[self.parent[idx]];
            idx = self.parent[idx];
        }
        idx
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

pub struct WashTradingDetector {
    config: WashTradingConfig,
}

impl WashTradingDetector {
    pub fn new(config: WashTradingConfig) -> Self {
        Self { config }
    }

    fn fingerprint_match(&self, a: &TradeRecord, b: &TradeRecord) -> bool {
        within_relative(a.price, b.price, self.config.price_tolerance)
            && within_relative(a.size, b.size, self.config.size_tolerance)
    }

    /// Link matching prints no further apart than `time_window_ms` and pair
    /// each trade with the earliest unpaired opposite-side match.
    ///
    /// `trades` must be sorted by timestamp.
    fn scan(&self, trades: &[&TradeRecord]) -> WashTradingMetrics {
        let mut clusters = Clusters::new(trades.len());
        let mut paired = vec![false; trades.len()];
        let mut metrics = WashTradingMetrics {
            trades_analyzed: trades.len(),
            ..Default::default()
        };

        for i in 0..trades.len() {
            for j in (i + 1)..trades.len() {
                if trades[j].timestamp - trades[i].timestamp > self.config.time_window_ms {
                    break;
                }
                if !self.fingerprint_match(trades[i], trades[j]) {
                    continue;
                }
                clusters.union(i, j);
                if !paired[i] && !paired[j] && trades[i].side != trades[j].side {
                    paired[i] = true;
                    paired[j] = true;
                    metrics.pattern_count += 1;
                }
            }
        }

        let mut groups: HashMap<usize, Group> = HashMap::new();
        for (idx, trade) in trades.iter().enumerate() {
            let group = groups.entry(clusters.find(idx)).or_default();
            match trade.side {
                TradeSide::Buy => group.buys += 1,
                TradeSide::Sell => group.sells += 1,
            }
        }
        for group in groups.values().filter(|g| g.buys + g.sells >= 2) {
            metrics.fingerprint_groups += 1;
            if group.buys > 0 && group.sells > 0 {
                metrics.circular_groups += 1;
            }
        }

        metrics
    }
}

impl PatternDetector for WashTradingDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::WashTrading
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(&mut self, ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult> {
        let mut trades: Vec<&TradeRecord> = ctx.history.trades().iter().collect();
        if trades.len() < self.config.min_trades {
            return Ok(DetectionResult::empty(self.kind()));
        }
        trades.sort_by_key(|t| t.timestamp);

        let metrics = self.scan(&trades);

        // Every matched pair accounts for two trades.
        let paired_share = 2.0 * metrics.pattern_count as f64 / trades.len() as f64;
        let circular_share = if metrics.fingerprint_groups > 0 {
            metrics.circular_groups as f64 / metrics.fingerprint_groups as f64
        } else {
            0.0
        };
        let likelihood = ensure_finite(
            self.kind(),
            "likelihood",
            0.8 * clamp_unit(1.25 * paired_share) + 0.2 * circular_share,
        )?;

        Ok(DetectionResult::new(
            self.kind(),
            likelihood,
            self.config.detection_threshold,
            PatternMetrics::WashTrading(metrics),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{OrderBook, SnapshotHistory};

    fn detect(trades: Vec<TradeRecord>) -> DetectionResult {
        let mut history = SnapshotHistory::new(10, 100);
        history
            .update(&OrderBook::new(vec![(99.9, 1.0)], vec![(100.1, 1.0)], 0), &trades)
            .unwrap();
        WashTradingDetector::new(WashTradingConfig::default())
            .detect(&AnalysisContext::new(&history, None))
            .unwrap()
    }

    #[test]
    fn test_matched_buy_sell_pairs() {
        let trades = (0..5)
            .flat_map(|i| {
                let ts = 10_000 + i * 200;
                vec![
                    TradeRecord::new(format!("b{}", i), 100.0, 2.5, TradeSide::Buy, ts),
                    TradeRecord::new(format!("s{}", i), 100.0, 2.5, TradeSide::Sell, ts + 50),
                ]
            })
            .collect();
        let result = detect(trades);
        let metrics = result.metrics.wash_trading().unwrap();

        assert_eq!(metrics.pattern_count, 5);
        assert_eq!(metrics.circular_groups, 1);
        assert!(result.likelihood > 0.9);
        assert!(result.detected);
    }

    #[test]
    fn test_one_sided_flow_is_clean() {
        let trades = (0..12)
            .map(|i| {
                let (price, size) = (100.0 + i as f64 * 0.2, 1.0 + i as f64 * 0.37);
                TradeRecord::new(format!("t{}", i), price, size, TradeSide::Buy, i * 1_000)
            })
            .collect();
        let result = detect(trades);
        assert_eq!(result.likelihood, 0.0);
        assert_eq!(result.metrics.wash_trading().unwrap().circular_groups, 0);
    }

    #[test]
    fn test_pairs_across_bucket_edge_still_match() {
        // Each buy prints 10ms before a 5s boundary and its sell 10ms after.
        let trades = (1..=12)
            .flat_map(|i| {
                let edge = i * 5_000;
                vec![
                    TradeRecord::new(format!("b{}", i), 100.0, 2.5, TradeSide::Buy, edge - 10),
                    TradeRecord::new(format!("s{}", i), 100.0, 2.5, TradeSide::Sell, edge + 10),
                ]
            })
            .collect();
        let result = detect(trades);
        let metrics = result.metrics.wash_trading().unwrap();

        assert_eq!(metrics.pattern_count, 12);
        assert!(metrics.circular_groups >= 1);
        assert!(result.likelihood > 0.9);
    }

    #[test]
    fn test_opposing_prints_outside_window_are_not_paired() {
        let trades = (0..6)
            .flat_map(|i| {
                let ts = i * 20_000;
                vec![
                    TradeRecord::new(format!("b{}", i), 100.0, 2.5, TradeSide::Buy, ts),
                    TradeRecord::new(format!("s{}", i), 100.0, 2.5, TradeSide::Sell, ts + 6_000),
                ]
            })
            .collect();
        let result = detect(trades);
        let metrics = result.metrics.wash_trading().unwrap();

        assert_eq!(metrics.pattern_count, 0);
        assert_eq!(metrics.fingerprint_groups, 0);
        assert_eq!(result.likelihood, 0.0);
    }

    #[test]
    fn test_too_few_trades() {
        let trades = vec![
            TradeRecord::new("a", 100.0, 1.0, TradeSide::Buy, 0),
            TradeRecord::new("b", 100.0, 1.0, TradeSide::Sell, 1),
        ];
        let result = detect(trades);
        assert_eq!(result.likelihood, 0.0);
        assert_eq!(result.metrics, PatternMetrics::None);
    }
}
