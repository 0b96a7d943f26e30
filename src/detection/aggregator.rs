use serde::Serialize;
use std::collections::HashMap;

use super::{DetectionResult, PatternKind};
use crate::config::{DetectorConfig, HistoryConfig, PatternSettings};
use crate::error::{DetectorError, DetectorResult};
use crate::stats::clamp_unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_likelihood(likelihood: f64) -> Self {
        if likelihood >= 0.95 {
            Severity::Critical
        } else if likelihood >= 0.85 {
            Severity::High
        } else if likelihood >= 0.7 {
            Severity::Medium
        } else if likelihood >= 0.5 {
            Severity::Low
        } else {
            Severity::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Classification of the strongest detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManipulationType {
    None,
    Spoofing,
    Layering,
    WashTrading,
    FakeLiquidity,
    IcebergOrders,
}

impl ManipulationType {
    /// TradeCorrelation is a reliability signal, not a manipulation.
    pub fn from_pattern(kind: PatternKind) -> Option<Self> {
        match kind {
            PatternKind::Spoofing => Some(ManipulationType::Spoofing),
            PatternKind::Layering => Some(ManipulationType::Layering),
            PatternKind::WashTrading => Some(ManipulationType::WashTrading),
            PatternKind::FakeLiquidity => Some(ManipulationType::FakeLiquidity),
            PatternKind::IcebergOrders => Some(ManipulationType::IcebergOrders),
            PatternKind::TradeCorrelation => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManipulationType::None => "none",
            ManipulationType::Spoofing => "spoofing",
            ManipulationType::Layering => "layering",
            ManipulationType::WashTrading => "wash_trading",
            ManipulationType::FakeLiquidity => "fake_liquidity",
            ManipulationType::IcebergOrders => "iceberg_orders",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdvancedMetrics {
    pub tracked_orders: usize,
    pub phantom_orders: usize,
    pub iceberg_candidates: usize,
    pub correlation_accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub analysis_time_ms: f64,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorFailure {
    pub pattern: PatternKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub overall_likelihood: f64,
    pub manipulation_type: ManipulationType,
    pub severity: Severity,
    pub confidence: f64,
    pub spoofing: DetectionResult,
    pub layering: DetectionResult,
    pub wash_trading: DetectionResult,
    pub fake_liquidity: DetectionResult,
    pub iceberg_orders: DetectionResult,
    pub trade_correlation: DetectionResult,
    pub advanced_metrics: AdvancedMetrics,
    pub performance: PerformanceMetrics,
    pub cached: bool,
    /// Timestamp of the newest snapshot analyzed.
    pub timestamp: i64,
    pub snapshots_analyzed: usize,
    pub trades_analyzed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<DetectorFailure>,
}

impl AggregateResult {
    pub fn pattern(&self, kind: PatternKind) -> &DetectionResult {
        match kind {
            PatternKind::Spoofing => &self.spoofing,
            PatternKind::Layering => &self.layering,
            PatternKind::WashTrading => &self.wash_trading,
            PatternKind::FakeLiquidity => &self.fake_liquidity,
            PatternKind::IcebergOrders => &self.iceberg_orders,
            PatternKind::TradeCorrelation => &self.trade_correlation,
        }
    }

    pub fn patterns(&self) -> impl Iterator<Item = &DetectionResult> {
        PatternKind::ALL.into_iter().map(move |kind| self.pattern(kind))
    }

    pub fn is_cold_start(&self) -> bool {
        self.confidence == 0.0 && self.patterns().all(|p| p.metrics == super::PatternMetrics::None)
    }
}

/// How much data backed one analysis call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Coverage {
    pub snapshots: usize,
    pub trades: usize,
    pub timestamp: i64,
}

/// Combines per-pattern results into one weighted verdict.
///
/// Weights are checked once here so analysis never has to.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    settings: HashMap<PatternKind, PatternSettings>,
    history: HistoryConfig,
}

impl ScoreAggregator {
    /// `available` lists the patterns the owning detector tier can run.
    pub fn new(config: &DetectorConfig, available: &[PatternKind]) -> DetectorResult<Self> {
        let settings: HashMap<PatternKind, PatternSettings> = available
            .iter()
            .map(|&kind| (kind, config.pattern(kind)))
            .filter(|(_, s)| s.enabled)
            .collect();

        let total_weight: f64 = settings.values().map(|s| s.weight).sum();
        if !total_weight.is_finite() || total_weight <= 0.0 {
            return Err(DetectorError::config(format!(
                "enabled detectors {:?} carry no weight",
                settings.keys().collect::<Vec<_>>()
            )));
        }

        Ok(Self {
            settings,
            history: config.history.clone(),
        })
    }

    /// Zero-confidence verdict returned before enough history exists.
    pub fn cold_start(&self, coverage: Coverage) -> AggregateResult {
        let by_kind: HashMap<PatternKind, DetectionResult> = self
            .settings
            .keys()
            .map(|&kind| (kind, DetectionResult::empty(kind)))
            .collect();

        self.assemble(by_kind, Vec::new(), coverage, AdvancedMetrics::default(), 0.0, ManipulationType::None, 0.0)
    }

    pub fn aggregate(
        &self,
        outcomes: Vec<(PatternKind, DetectorResult<DetectionResult>)>,
        coverage: Coverage,
        advanced: AdvancedMetrics,
    ) -> AggregateResult {
        let mut by_kind = HashMap::new();
        let mut errors = Vec::new();

        for (kind, outcome) in outcomes {
            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    errors.push(DetectorFailure {
                        pattern: kind,
                        message: err.to_string(),
                    });
                    DetectionResult::failed(kind, &err)
                }
            };
            by_kind.insert(kind, result);
        }

        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for kind in PatternKind::ALL {
            let Some(settings) = self.settings.get(&kind) else {
                continue;
            };
            if settings.weight <= 0.0 {
                continue;
            }
            let likelihood = by_kind.get(&kind).map(|r| r.likelihood).unwrap_or(0.0);
            weighted += settings.weight * likelihood;
            total_weight += settings.weight;
        }
        let overall = if total_weight > 0.0 {
            clamp_unit(weighted / total_weight)
        } else {
            0.0
        };

        let manipulation_type = PatternKind::ALL
            .iter()
            .filter_map(|kind| by_kind.get(kind))
            .filter(|r| r.detected)
            .filter_map(|r| ManipulationType::from_pattern(r.pattern).map(|t| (t, r.likelihood)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _)| t)
            .unwrap_or(ManipulationType::None);

        let correlation_trend = by_kind
            .get(&PatternKind::TradeCorrelation)
            .and_then(|r| r.metrics.trade_correlation())
            .map(|m| m.accuracy_trend);
        let confidence = self.confidence(coverage, correlation_trend);

        self.assemble(by_kind, errors, coverage, advanced, overall, manipulation_type, confidence)
    }

    /// Scales down with thin history; trade correlation can discount it further.
    pub fn confidence(&self, coverage: Coverage, correlation_trend: Option<f64>) -> f64 {
        let snapshot_factor = if self.history.full_confidence_snapshots == 0 {
            1.0
        } else {
            (coverage.snapshots as f64 / self.history.full_confidence_snapshots as f64).min(1.0)
        };
        let trade_factor = if self.history.min_trades == 0 {
            1.0
        } else {
            0.5 + 0.5 * (coverage.trades as f64 / self.history.min_trades as f64).min(1.0)
        };

        let mut confidence = snapshot_factor * trade_factor;
        if let Some(trend) = correlation_trend {
            if coverage.trades >= self.history.min_trades {
                confidence *= 0.75 + 0.25 * clamp_unit(trend);
            }
        }
        clamp_unit(confidence)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        mut by_kind: HashMap<PatternKind, DetectionResult>,
        errors: Vec<DetectorFailure>,
        coverage: Coverage,
        advanced_metrics: AdvancedMetrics,
        overall: f64,
        manipulation_type: ManipulationType,
        confidence: f64,
    ) -> AggregateResult {
        let mut take = |kind: PatternKind| {
            by_kind
                .remove(&kind)
                .unwrap_or_else(|| DetectionResult::inactive(kind))
        };

        AggregateResult {
            overall_likelihood: overall,
            manipulation_type,
            severity: Severity::from_likelihood(overall),
            confidence,
            spoofing: take(PatternKind::Spoofing),
            layering: take(PatternKind::Layering),
            wash_trading: take(PatternKind::WashTrading),
            fake_liquidity: take(PatternKind::FakeLiquidity),
            iceberg_orders: take(PatternKind::IcebergOrders),
            trade_correlation: take(PatternKind::TradeCorrelation),
            advanced_metrics,
            performance: PerformanceMetrics::default(),
            cached: false,
            timestamp: coverage.timestamp,
            snapshots_analyzed: coverage.snapshots,
            trades_analyzed: coverage.trades,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::PatternMetrics;

    const BASE: [PatternKind; 2] = [PatternKind::Spoofing, PatternKind::Layering];

    fn result(kind: PatternKind, likelihood: f64) -> (PatternKind, DetectorResult<DetectionResult>) {
        (kind, Ok(DetectionResult::new(kind, likelihood, 0.5, PatternMetrics::None)))
    }

    fn coverage(snapshots: usize, trades: usize) -> Coverage {
        Coverage {
            snapshots,
            trades,
            timestamp: 0,
        }
    }

    #[test]
    fn test_severity_tiers_are_monotonic() {
        let samples = [0.0, 0.49, 0.5, 0.69, 0.7, 0.84, 0.85, 0.94, 0.95, 1.0];
        let tiers: Vec<Severity> = samples.iter().map(|&l| Severity::from_likelihood(l)).collect();
        assert!(tiers.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(Severity::from_likelihood(0.49), Severity::None);
        assert_eq!(Severity::from_likelihood(0.5), Severity::Low);
        assert_eq!(Severity::from_likelihood(0.7), Severity::Medium);
        assert_eq!(Severity::from_likelihood(0.85), Severity::High);
        assert_eq!(Severity::from_likelihood(0.95), Severity::Critical);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
    }

    #[test]
    fn test_weights_renormalised_over_active_patterns() {
        let aggregator = ScoreAggregator::new(&DetectorConfig::default(), &BASE).unwrap();

        let aggregate = aggregator.aggregate(
            vec![result(PatternKind::Spoofing, 1.0), result(PatternKind::Layering, 0.0)],
            coverage(30, 10),
            AdvancedMetrics::default(),
        );
        assert!((aggregate.overall_likelihood - 0.30 / 0.55).abs() < 1e-12);
        assert_eq!(aggregate.manipulation_type, ManipulationType::Spoofing);
        assert!(!aggregate.wash_trading.enabled);
    }

    #[test]
    fn test_failed_detector_contributes_zero() {
        let aggregator = ScoreAggregator::new(&DetectorConfig::default(), &BASE).unwrap();
        let aggregate = aggregator.aggregate(
            vec![
                (
                    PatternKind::Spoofing,
                    Err(DetectorError::pattern(PatternKind::Spoofing, "non-finite variance")),
                ),
                result(PatternKind::Layering, 0.8),
            ],
            coverage(30, 10),
            AdvancedMetrics::default(),
        );

        assert_eq!(aggregate.errors.len(), 1);
        assert_eq!(aggregate.errors[0].pattern, PatternKind::Spoofing);
        assert_eq!(aggregate.spoofing.likelihood, 0.0);
        assert!(!aggregate.spoofing.detected);
        assert!((aggregate.overall_likelihood - 0.8 * 0.25 / 0.55).abs() < 1e-12);
        assert_eq!(aggregate.manipulation_type, ManipulationType::Layering);
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let mut config = DetectorConfig::default();
        config.spoofing.weight = 0.0;
        config.layering.weight = 0.0;
        let err = ScoreAggregator::new(&config, &BASE).unwrap_err();
        assert!(matches!(err, DetectorError::Configuration(_)));
    }

    #[test]
    fn test_confidence_scales_with_history() {
        let aggregator = ScoreAggregator::new(&DetectorConfig::default(), &BASE).unwrap();
        assert_eq!(aggregator.confidence(coverage(30, 10), None), 1.0);
        assert_eq!(aggregator.confidence(coverage(15, 10), None), 0.5);
        assert_eq!(aggregator.confidence(coverage(30, 0), None), 0.5);
        assert_eq!(aggregator.confidence(coverage(30, 10), Some(0.0)), 0.75);
        assert_eq!(aggregator.confidence(coverage(30, 5), Some(0.0)), 0.75);
    }

    #[test]
    fn test_cold_start_shape() {
        let aggregator = ScoreAggregator::new(&DetectorConfig::default(), &BASE).unwrap();
        let result = aggregator.cold_start(coverage(3, 0));

        assert_eq!(result.overall_likelihood, 0.0);
        assert_eq!(result.manipulation_type, ManipulationType::None);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.severity, Severity::None);
        assert!(result.is_cold_start());
        assert!(result.spoofing.enabled);
        assert!(!result.iceberg_orders.enabled);
    }

    #[test]
    fn test_correlation_never_classifies() {
        let kinds = [PatternKind::Spoofing, PatternKind::TradeCorrelation];
        let aggregator = ScoreAggregator::new(&DetectorConfig::default(), &kinds).unwrap();
        let aggregate = aggregator.aggregate(
            vec![result(PatternKind::Spoofing, 0.2), result(PatternKind::TradeCorrelation, 1.0)],
            coverage(30, 10),
            AdvancedMetrics::default(),
        );
        assert!(aggregate.trade_correlation.detected);
        assert_eq!(aggregate.manipulation_type, ManipulationType::None);
        assert!((aggregate.overall_likelihood - 0.2).abs() < 1e-12);
    }
}
