use serde::Serialize;
use std::collections::HashMap;

use super::{ensure_finite, AnalysisContext, DetectionResult, PatternDetector, PatternKind, PatternMetrics};
use crate::config::SpoofingConfig;
use crate::error::DetectorResult;
use crate::orderbook::{BookSide, OrderBookSnapshot, Price, TradeRecord};
use crate::stats::{clamp_unit, median, variance};

const MIN_SNAPSHOTS: usize = 3;
const MAX_VOLATILITY_RATIO: f64 = 100.0;
const LIVE_ORDER_FACTOR: f64 = 0.6;
const UNFLAGGED_FACTOR: f64 = 0.5;
const REVERSAL_BONUS: f64 = 0.1;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpoofingMetrics {
    /// Recent depth variance over the baseline variance.
    pub volatility_ratio: f64,
    /// Traded volume over displayed size for the highest-scoring order.
    pub execution_ratio: f64,
    pub large_orders: usize,
    pub suspicious_orders: usize,
    pub withdrawn_orders: usize,
    pub price_reversals: usize,
}

/// A contiguous run of snapshots in which one level held a large order.
#[derive(Debug, Clone)]
struct LargeOrderSighting {
    side: BookSide,
    price: f64,
    max_size: f64,
    first_idx: usize,
    last_idx: usize,
}

pub struct SpoofingDetector {
    config: SpoofingConfig,
}

impl SpoofingDetector {
    pub fn new(config: SpoofingConfig) -> Self {
        Self { config }
    }

    /// Variance of top-of-book depth in the recent window against the rest of the history.
    fn volatility_ratio(&self, snapshots: &[&OrderBookSnapshot]) -> f64 {
        let depths: Vec<f64> = snapshots
            .iter()
            .map(|s| s.liquidity_depth(self.config.depth_levels))
            .collect();

        let window = self.config.recent_window.min(depths.len().saturating_sub(1)).max(1);
        let (baseline, recent) = depths.split_at(depths.len() - window);
        if baseline.len() < 2 {
            return 1.0;
        }

        let baseline_var = variance(baseline);
        let recent_var = variance(recent);
        if baseline_var <= f64::EPSILON {
            return if recent_var > f64::EPSILON { MAX_VOLATILITY_RATIO } else { 1.0 };
        }
        (recent_var / baseline_var).min(MAX_VOLATILITY_RATIO)
    }

    fn is_large(&self, price: f64, size: f64, side_median: f64) -> bool {
        size >= side_median * self.config.large_order_multiplier && price * size >= self.config.min_order_size_usd
    }

    /// Walk the window and collect each continuous large-order run per level.
    fn sightings(&self, snapshots: &[&OrderBookSnapshot]) -> Vec<LargeOrderSighting> {
        let mut open: HashMap<(BookSide, Price), LargeOrderSighting> = HashMap::new();
        let mut closed = Vec::new();

        for (idx, snapshot) in snapshots.iter().enumerate() {
            for side in BookSide::BOTH {
                let levels = snapshot.side(side);
                let sizes: Vec<f64> = levels.iter().map(|(_, size)| *size).collect();
                let side_median = median(&sizes);

                for &(price, size) in levels {
                    if !self.is_large(price, size, side_median) {
                        continue;
                    }
                    let entry = open.entry((side, Price::from(price))).or_insert(LargeOrderSighting {
                        side,
                        price,
                        max_size: size,
                        first_idx: idx,
                        last_idx: idx,
                    });
                    entry.last_idx = idx;
                    entry.max_size = entry.max_size.max(size);
                }
            }

            let ended: Vec<(BookSide, Price)> = open
                .iter()
                .filter(|(_, sighting)| sighting.last_idx < idx)
                .map(|(key, _)| *key)
                .collect();
            for key in ended {
                if let Some(sighting) = open.remove(&key) {
                    closed.push(sighting);
                }
            }
        }

        closed.extend(open.into_values());
        closed.sort_by_key(|s| (s.first_idx, s.side == BookSide::Ask));
        closed
    }

    /// Volume that traded against the order while it was displayed.
    fn executed_volume<'a>(
        &self,
        sighting: &LargeOrderSighting,
        snapshots: &[&OrderBookSnapshot],
        trades: impl Iterator<Item = &'a TradeRecord>,
    ) -> f64 {
        let start = snapshots[sighting.first_idx].timestamp;
        let end = snapshots
            .get(sighting.last_idx + 1)
            .map(|s| s.timestamp)
            .unwrap_or(i64::MAX);
        let proximity = sighting.price * self.config.proximity_pct;

        trades
            .filter(|t| t.side.consumes() == sighting.side)
            .filter(|t| t.timestamp >= start && t.timestamp <= end)
            .filter(|t| (t.price - sighting.price).abs() <= proximity)
            .map(|t| t.size)
            .sum()
    }

    /// Mid moved one way while the order was up and back once it left.
    fn is_reversal(sighting: &LargeOrderSighting, snapshots: &[&OrderBookSnapshot]) -> bool {
        if sighting.first_idx == 0 {
            return false;
        }
        let Some(after) = snapshots.get(sighting.last_idx + 1) else {
            return false;
        };
        let before = snapshots[sighting.first_idx - 1].mid_price;
        let during = snapshots[sighting.last_idx].mid_price;

        let approach = during - before;
        let retreat = after.mid_price - during;
        approach.abs() > f64::EPSILON && retreat.abs() > f64::EPSILON && approach.signum() != retreat.signum()
    }
}

impl PatternDetector for SpoofingDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Spoofing
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(&mut self, ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult> {
        let snapshots: Vec<&OrderBookSnapshot> = ctx.history.snapshots().iter().collect();
        if snapshots.len() < MIN_SNAPSHOTS {
            return Ok(DetectionResult::empty(self.kind()));
        }

        let volatility_ratio = ensure_finite(self.kind(), "volatility_ratio", self.volatility_ratio(&snapshots))?;
        let volatility_score = clamp_unit(volatility_ratio / (2.0 * self.config.volatility_threshold));

        let sightings = self.sightings(&snapshots);
        let mut metrics = SpoofingMetrics {
            volatility_ratio,
            large_orders: sightings.len(),
            ..Default::default()
        };

        let mut likelihood: f64 = 0.0;
        for sighting in &sightings {
            let traded = self.executed_volume(sighting, &snapshots, ctx.history.trades().iter());
            let execution_ratio = clamp_unit(traded / sighting.max_size);
            let withdrawn = sighting.last_idx + 1 < snapshots.len();
            let reversal = Self::is_reversal(sighting, &snapshots);
            let flagged = volatility_ratio >= self.config.volatility_threshold
                && execution_ratio <= self.config.execution_ratio_threshold;

            if withdrawn {
                metrics.withdrawn_orders += 1;
            }
            if reversal {
                metrics.price_reversals += 1;
            }
            if flagged {
                metrics.suspicious_orders += 1;
            }

            let mut score = 0.5 * volatility_score + 0.5 * (1.0 - execution_ratio);
            if !withdrawn {
                score *= LIVE_ORDER_FACTOR;
            }
            if reversal {
                score += REVERSAL_BONUS;
            }
            if !flagged {
                score *= UNFLAGGED_FACTOR;
            }
            let score = clamp_unit(score);

            if score >= likelihood {
                likelihood = score;
                metrics.execution_ratio = execution_ratio;
            }
        }

        Ok(DetectionResult::new(
            self.kind(),
            likelihood,
            self.config.detection_threshold,
            PatternMetrics::Spoofing(metrics),
        ))
    }
}
