use serde::Serialize;

use super::{
    FakeLiquidityMetrics, IcebergMetrics, LayeringMetrics, PatternKind, SpoofingMetrics, TradeCorrelationMetrics,
    WashTradingMetrics,
};
use crate::error::DetectorError;
use crate::stats::clamp_unit;

/// Pattern-specific supporting numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternMetrics {
    None,
    Spoofing(SpoofingMetrics),
    Layering(LayeringMetrics),
    WashTrading(WashTradingMetrics),
    FakeLiquidity(FakeLiquidityMetrics),
    Iceberg(IcebergMetrics),
    TradeCorrelation(TradeCorrelationMetrics),
}

impl PatternMetrics {
    pub fn spoofing(&self) -> Option<&SpoofingMetrics> {
        match self {
            PatternMetrics::Spoofing(m) => Some(m),
            _ => None,
        }
    }

    pub fn layering(&self) -> Option<&LayeringMetrics> {
        match self {
            PatternMetrics::Layering(m) => Some(m),
            _ => None,
        }
    }

    pub fn wash_trading(&self) -> Option<&WashTradingMetrics> {
        match self {
            PatternMetrics::WashTrading(m) => Some(m),
            _ => None,
        }
    }

    pub fn fake_liquidity(&self) -> Option<&FakeLiquidityMetrics> {
        match self {
            PatternMetrics::FakeLiquidity(m) => Some(m),
            _ => None,
        }
    }

    pub fn iceberg(&self) -> Option<&IcebergMetrics> {
        match self {
            PatternMetrics::Iceberg(m) => Some(m),
            _ => None,
        }
    }

    pub fn trade_correlation(&self) -> Option<&TradeCorrelationMetrics> {
        match self {
            PatternMetrics::TradeCorrelation(m) => Some(m),
            _ => None,
        }
    }
}

/// Outcome of one pattern detector for one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub pattern: PatternKind,
    pub likelihood: f64,
    pub detected: bool,
    pub enabled: bool,
    pub metrics: PatternMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    /// Likelihood is clamped to `[0, 1]` before the threshold test.
    pub fn new(pattern: PatternKind, likelihood: f64, threshold: f64, metrics: PatternMetrics) -> Self {
        let likelihood = clamp_unit(likelihood);
        Self {
            pattern,
            likelihood,
            detected: likelihood > 0.0 && likelihood >= threshold,
            enabled: true,
            metrics,
            error: None,
        }
    }

    /// Enabled but nothing to evaluate yet.
    pub fn empty(pattern: PatternKind) -> Self {
        Self {
            pattern,
            likelihood: 0.0,
            detected: false,
            enabled: true,
            metrics: PatternMetrics::None,
            error: None,
        }
    }

    /// Disabled by configuration or not part of this detector tier.
    pub fn inactive(pattern: PatternKind) -> Self {
        Self {
            enabled: false,
            ..Self::empty(pattern)
        }
    }

    pub fn failed(pattern: PatternKind, error: &DetectorError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(pattern)
        }
    }
}
