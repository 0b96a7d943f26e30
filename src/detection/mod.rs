//! Pattern detectors and score aggregation.
//!
//! Every detector reads the same [`AnalysisContext`] (rolling history plus,
//! for the enhanced tier, the order tracker) and returns a
//! [`DetectionResult`] with a likelihood in `[0, 1]`.

pub mod aggregator;
pub mod fake_liquidity;
pub mod iceberg;
pub mod layering;
pub mod result;
pub mod spoofing;
pub mod trade_correlation;
pub mod wash_trading;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DetectorError, DetectorResult};
use crate::orderbook::{OrderTracker, SnapshotHistory};

pub use aggregator::{
    AdvancedMetrics, AggregateResult, Coverage, DetectorFailure, ManipulationType, PerformanceMetrics,
    ScoreAggregator, Severity,
};
pub use fake_liquidity::{FakeLiquidityDetector, FakeLiquidityMetrics};
pub use iceberg::{IcebergDetector, IcebergMetrics};
pub use layering::{LayeringDetector, LayeringMetrics, SideLayering};
pub use result::{DetectionResult, PatternMetrics};
pub use spoofing::{SpoofingDetector, SpoofingMetrics};
pub use trade_correlation::{TradeCorrelationDetector, TradeCorrelationMetrics};
pub use wash_trading::{WashTradingDetector, WashTradingMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Spoofing,
    Layering,
    WashTrading,
    FakeLiquidity,
    IcebergOrders,
    TradeCorrelation,
}

impl PatternKind {
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Spoofing,
        PatternKind::Layering,
        PatternKind::WashTrading,
        PatternKind::FakeLiquidity,
        PatternKind::IcebergOrders,
        PatternKind::TradeCorrelation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Spoofing => "spoofing",
            PatternKind::Layering => "layering",
            PatternKind::WashTrading => "wash_trading",
            PatternKind::FakeLiquidity => "fake_liquidity",
            PatternKind::IcebergOrders => "iceberg_orders",
            PatternKind::TradeCorrelation => "trade_correlation",
        }
    }

    /// Patterns that need per-order lifecycle state.
    pub fn needs_tracker(&self) -> bool {
        matches!(
            self,
            PatternKind::FakeLiquidity | PatternKind::IcebergOrders | PatternKind::TradeCorrelation
        )
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view handed to each detector for one analysis call.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub history: &'a SnapshotHistory,
    pub tracker: Option<&'a OrderTracker>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(history: &'a SnapshotHistory, tracker: Option<&'a OrderTracker>) -> Self {
        Self { history, tracker }
    }

    pub fn tracker(&self, pattern: PatternKind) -> DetectorResult<&'a OrderTracker> {
        self.tracker
            .ok_or_else(|| DetectorError::pattern(pattern, "order tracker not available"))
    }

    /// Timestamp of the newest snapshot, or 0 on an empty history.
    pub fn latest_timestamp(&self) -> i64 {
        self.history.latest().map(|s| s.timestamp).unwrap_or(0)
    }
}

pub trait PatternDetector: Send {
    fn kind(&self) -> PatternKind;

    fn is_enabled(&self) -> bool;

    fn detect(&mut self, ctx: &AnalysisContext<'_>) -> DetectorResult<DetectionResult>;
}

/// Guard against NaN/inf leaking out of an intermediate computation.
pub(crate) fn ensure_finite(pattern: PatternKind, name: &str, value: f64) -> DetectorResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DetectorError::pattern(pattern, format!("{} is not finite ({})", name, value)))
    }
}
