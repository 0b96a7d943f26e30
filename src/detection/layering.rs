use serde::Serialize;

use super::{AnalysisContext, DetectionResult, PatternDetector, PatternKind, PatternMetrics};
use crate::config::LayeringConfig;
use crate::error::DetectorResult;
use crate::orderbook::{BookSide, Level, OrderBookSnapshot};
use crate::stats::{clamp_unit, coefficient_of_variation};

/// Floor for a side that qualifies at all.
const BASE_LIKELIHOOD: f64 = 0.35;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideLayering {
    pub likelihood: f64,
    /// Length of the longest uniform run of levels.
    pub layers_analyzed: usize,
    pub size_cv: f64,
    /// Widest gap inside the run, relative to mid.
    pub max_gap_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayeringMetrics {
    pub bid_side: SideLayering,
    pub ask_side: SideLayering,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    len: usize,
    size_cv: f64,
    max_gap_pct: f64,
}

pub struct LayeringDetector {
    config: LayeringConfig,
}

impl LayeringDetector {
    pub fn new(config: LayeringConfig) -> Self {
        Self { config }
    }

    /// Longest stretch of adjacent levels with tight gaps and uniform sizes.
    fn longest_run(&self, levels: &[Level], mid: f64) -> Option<Run> {
        let mut best: Option<Run> = None;

        for start in 0..levels.len() {
            let mut max_gap_pct: f64 = 0.0;
            let mut end = start + 1;

            while end < levels.len() {
                let gap_pct = (levels[end].0 - levels[end - 1].0).abs() / mid;
                if gap_pct > self.config.price_gap_threshold {
                    break;
                }
                let sizes: Vec<f64> = levels[start..=end].iter().map(|(_, size)| *size).collect();
                if coefficient_of_variation(&sizes) > self.config.size_uniformity_threshold {
                    break;
                }
                max_gap_pct = max_gap_pct.max(gap_pct);
                end += 1;
            }

            let len = end - start;
            if len < 2 {
                continue;
            }
            let sizes: Vec<f64> = levels[start..end].iter().map(|(_, size)| *size).collect();
            let run = Run {
                len,
                size_cv: coefficient_of_variation(&sizes),
                max_gap_pct,
            };

            let better = match best {
                None => true,
                Some(b) => run.len > b.len || (run.len == b.len && run.size_cv < b.size_cv),
            };
            if better {
                best = Some(run);
            }
        }

        best
    }

    fn analyze_side(&self, snapshot: &OrderBookSnapshot, side: BookSide) -> SideLayering {
        if snapshot.mid_price <= 0.0 {
            return SideLayering::default();
        }
        let Some(run) = self.longest_run(snapshot.side(side), snapshot.mid_price) else {
            return SideLayering::default();
        };

        let mut result = SideLayering {
            likelihood: 0.0,
            layers_analyzed: run.len,
            size_cv: run.size_cv,
            max_gap_pct: run.max_gap_pct,
        };
        if run.len < self.config.min_layers {
            return result;
        }

        let uniformity = clamp_unit(1.0 - run.size_cv / self.config.size_uniformity_threshold);
        let gap_score = clamp_unit(1.0 - run.max_gap_pct / self.config.price_gap_threshold);
        let depth_score = (run.len as f64 / (2 * self.config.min_layers) as f64).min(1.0);

        let conformance = 0.5 * uniformity + 0.25 * gap_score + 0.25 * depth_score;
        result.likelihood = clamp_unit(BASE_LIKELIHOOD + (1.0 - BASE_LIKELIHOOD) * conformance);
        result
    }
}

impl PatternDetector for LayeringDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Layering
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(&mut self, ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult> {
        let Some(snapshot) = ctx.history.latest() else {
            return Ok(DetectionResult::empty(self.kind()));
        };

        let metrics = LayeringMetrics {
            bid_side: self.analyze_side(snapshot, BookSide::Bid),
            ask_side: self.analyze_side(snapshot, BookSide::Ask),
        };
        let likelihood = metrics.bid_side.likelihood.max(metrics.ask_side.likelihood);

        Ok(DetectionResult::new(
            self.kind(),
            likelihood,
            self.config.detection_threshold,
            PatternMetrics::Layering(metrics),
        ))
    }
}
