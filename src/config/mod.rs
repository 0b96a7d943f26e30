use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::detection::PatternKind;
use crate::error::{DetectorError, DetectorResult};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Everything one detector instance needs, injected at construction.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub spoofing: SpoofingConfig,
    #[serde(default)]
    pub layering: LayeringConfig,
    #[serde(default)]
    pub wash_trading: WashTradingConfig,
    #[serde(default)]
    pub fake_liquidity: FakeLiquidityConfig,
    #[serde(default)]
    pub iceberg: IcebergConfig,
    #[serde(default)]
    pub trade_correlation: TradeCorrelationConfig,
    #[serde(default)]
    pub order_tracking: OrderTrackingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
    #[serde(default = "default_trade_history_size")]
    pub trade_history_size: usize,
    /// Below this many snapshots the aggregator short-circuits (cold start).
    #[serde(default = "default_min_snapshots")]
    pub min_snapshots: usize,
    #[serde(default = "default_full_confidence_snapshots")]
    pub full_confidence_snapshots: usize,
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_snapshots: default_max_snapshots(),
            trade_history_size: default_trade_history_size(),
            min_snapshots: default_min_snapshots(),
            full_confidence_snapshots: default_full_confidence_snapshots(),
            min_trades: default_min_trades(),
        }
    }
}

fn default_max_snapshots() -> usize { 100 }
fn default_trade_history_size() -> usize { 100 }
fn default_min_snapshots() -> usize { 10 }
fn default_full_confidence_snapshots() -> usize { 30 }
fn default_min_trades() -> usize { 10 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpoofingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_spoofing_weight")]
    pub weight: f64,
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,
    /// Recent/baseline depth variance ratio that counts as agitated.
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,
    #[serde(default = "default_min_order_size_usd")]
    pub min_order_size_usd: f64,
    #[serde(default = "default_execution_ratio_threshold")]
    pub execution_ratio_threshold: f64,
    /// A level is "large" when it is this many times the side's median size.
    #[serde(default = "default_large_order_multiplier")]
    pub large_order_multiplier: f64,
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,
    #[serde(default = "default_proximity_pct")]
    pub proximity_pct: f64,
}

impl Default for SpoofingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weight: default_spoofing_weight(),
            detection_threshold: default_detection_threshold(),
            volatility_threshold: default_volatility_threshold(),
            min_order_size_usd: default_min_order_size_usd(),
            execution_ratio_threshold: default_execution_ratio_threshold(),
            large_order_multiplier: default_large_order_multiplier(),
            recent_window: default_recent_window(),
            depth_levels: default_depth_levels(),
            proximity_pct: default_proximity_pct(),
        }
    }
}

fn default_enabled() -> bool { true }
fn default_detection_threshold() -> f64 { 0.5 }
fn default_spoofing_weight() -> f64 { 0.30 }
fn default_volatility_threshold() -> f64 { 2.0 }
fn default_min_order_size_usd() -> f64 { 1_000.0 }
fn default_execution_ratio_threshold() -> f64 { 0.1 }
fn default_large_order_multiplier() -> f64 { 5.0 }
fn default_recent_window() -> usize { 5 }
fn default_depth_levels() -> usize { 5 }
fn default_proximity_pct() -> f64 { 0.001 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayeringConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_layering_weight")]
    pub weight: f64,
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,
    /// Maximum gap between adjacent layers, relative to mid price.
    #[serde(default = "default_price_gap_threshold")]
    pub price_gap_threshold: f64,
    /// Maximum coefficient of variation of layer sizes.
    #[serde(default = "default_size_uniformity_threshold")]
    pub size_uniformity_threshold: f64,
    #[serde(default = "default_min_layers")]
    pub min_layers: usize,
}

impl Default for LayeringConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weight: default_layering_weight(),
            detection_threshold: default_detection_threshold(),
            price_gap_threshold: default_price_gap_threshold(),
            size_uniformity_threshold: default_size_uniformity_threshold(),
            min_layers: default_min_layers(),
        }
    }
}

fn default_layering_weight() -> f64 { 0.25 }
fn default_price_gap_threshold() -> f64 { 0.001 }
fn default_size_uniformity_threshold() -> f64 { 0.1 }
fn default_min_layers() -> usize { 3 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WashTradingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_wash_trading_weight")]
    pub weight: f64,
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: i64,
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: f64,
    #[serde(default = "default_size_tolerance")]
    pub size_tolerance: f64,
    #[serde(default = "default_wash_min_trades")]
    pub min_trades: usize,
}

impl Default for WashTradingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weight: default_wash_trading_weight(),
            detection_threshold: default_detection_threshold(),
            time_window_ms: default_time_window_ms(),
            price_tolerance: default_price_tolerance(),
            size_tolerance: default_size_tolerance(),
            min_trades: default_wash_min_trades(),
        }
    }
}

fn default_wash_trading_weight() -> f64 { 0.20 }
fn default_time_window_ms() -> i64 { 5_000 }
fn default_price_tolerance() -> f64 { 0.0005 }
fn default_size_tolerance() -> f64 { 0.01 }
fn default_wash_min_trades() -> usize { 4 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FakeLiquidityConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_fake_liquidity_weight")]
    pub weight: f64,
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,
    /// Phantom ratio at which the pattern is considered present.
    #[serde(default = "default_withdrawal_threshold")]
    pub withdrawal_threshold: f64,
    #[serde(default = "default_withdrawal_window_ms")]
    pub window_ms: i64,
    #[serde(default = "default_min_resolved_orders")]
    pub min_resolved_orders: usize,
}

impl Default for FakeLiquidityConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weight: default_fake_liquidity_weight(),
            detection_threshold: default_detection_threshold(),
            withdrawal_threshold: default_withdrawal_threshold(),
            window_ms: default_withdrawal_window_ms(),
            min_resolved_orders: default_min_resolved_orders(),
        }
    }
}

fn default_fake_liquidity_weight() -> f64 { 0.15 }
fn default_withdrawal_threshold() -> f64 { 0.3 }
fn default_withdrawal_window_ms() -> i64 { 60_000 }
fn default_min_resolved_orders() -> usize { 3 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IcebergConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_iceberg_weight")]
    pub weight: f64,
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,
    /// Fraction of the pre-trade size a level must recover to count as refilled.
    #[serde(default = "default_refill_threshold")]
    pub refill_threshold: f64,
    #[serde(default = "default_refill_window_snapshots")]
    pub refill_window_snapshots: u64,
    #[serde(default = "default_min_refills")]
    pub min_refills: u32,
}

impl Default for IcebergConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weight: default_iceberg_weight(),
            detection_threshold: default_detection_threshold(),
            refill_threshold: default_refill_threshold(),
            refill_window_snapshots: default_refill_window_snapshots(),
            min_refills: default_min_refills(),
        }
    }
}

fn default_iceberg_weight() -> f64 { 0.10 }
fn default_refill_threshold() -> f64 { 0.8 }
fn default_refill_window_snapshots() -> u64 { 3 }
fn default_min_refills() -> u32 { 2 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeCorrelationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Zero keeps correlation out of the likelihood; it still adjusts confidence.
    #[serde(default)]
    pub weight: f64,
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,
    #[serde(default = "default_correlation_window_ms")]
    pub window_ms: i64,
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: f64,
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
}

impl Default for TradeCorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weight: 0.0,
            detection_threshold: default_detection_threshold(),
            window_ms: default_correlation_window_ms(),
            price_tolerance: default_price_tolerance(),
            trend_window: default_trend_window(),
        }
    }
}

fn default_correlation_window_ms() -> i64 { 2_000 }
fn default_trend_window() -> usize { 20 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderTrackingConfig {
    /// Levels that vanish after fewer snapshot intervals than this are phantom candidates.
    #[serde(default = "default_min_visible_intervals")]
    pub min_visible_intervals: u32,
    #[serde(default = "default_tracking_price_tolerance")]
    pub price_tolerance: f64,
    /// Fraction of a level's size that may go unexplained and still count as executed.
    #[serde(default = "default_execution_tolerance")]
    pub execution_tolerance: f64,
    #[serde(default = "default_max_resolved_orders")]
    pub max_resolved_orders: usize,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for OrderTrackingConfig {
    fn default() -> Self {
        Self {
            min_visible_intervals: default_min_visible_intervals(),
            price_tolerance: default_tracking_price_tolerance(),
            execution_tolerance: default_execution_tolerance(),
            max_resolved_orders: default_max_resolved_orders(),
            max_events: default_max_events(),
        }
    }
}

fn default_min_visible_intervals() -> u32 { 2 }
fn default_tracking_price_tolerance() -> f64 { 0.0001 }
fn default_execution_tolerance() -> f64 { 0.1 }
fn default_max_resolved_orders() -> usize { 500 }
fn default_max_events() -> usize { 1_000 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: f64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl_seconds(),
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_ttl_seconds() -> f64 { 5.0 }
fn default_cache_max_entries() -> usize { 1_024 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Ring points per pool slot.
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            virtual_nodes: default_virtual_nodes(),
        }
    }
}

fn default_pool_size() -> usize { 4 }
fn default_virtual_nodes() -> usize { 64 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String { "info".to_string() }

fn check_unit(name: &str, value: f64) -> DetectorResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(DetectorError::config(format!(
            "{} ({}) must be within [0, 1]",
            name, value
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> DetectorResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(DetectorError::config(format!(
            "{} ({}) must be a positive number",
            name, value
        )));
    }
    Ok(())
}

fn check_weight(name: &str, enabled: bool, weight: f64) -> DetectorResult<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(DetectorError::config(format!(
            "{}.weight ({}) must be non-negative",
            name, weight
        )));
    }
    if enabled && weight > 1.0 {
        return Err(DetectorError::config(format!(
            "{}.weight ({}) must not exceed 1.0",
            name, weight
        )));
    }
    Ok(())
}

impl DetectorConfig {
    /// Reject configurations that could only fail later, during analysis.
    pub fn validate(&self) -> DetectorResult<()> {
        let h = &self.history;
        if h.max_snapshots < 2 || h.trade_history_size == 0 {
            return Err(DetectorError::config(
                "history.max_snapshots must be >= 2 and history.trade_history_size non-zero",
            ));
        }
        if h.min_snapshots > h.max_snapshots {
            return Err(DetectorError::config(format!(
                "history.min_snapshots ({}) exceeds history.max_snapshots ({})",
                h.min_snapshots, h.max_snapshots
            )));
        }

        let s = &self.spoofing;
        check_weight("spoofing", s.enabled, s.weight)?;
        if s.enabled {
            check_unit("spoofing.detection_threshold", s.detection_threshold)?;
            check_positive("spoofing.volatility_threshold", s.volatility_threshold)?;
            check_positive("spoofing.min_order_size_usd", s.min_order_size_usd)?;
            check_unit("spoofing.execution_ratio_threshold", s.execution_ratio_threshold)?;
            check_positive("spoofing.large_order_multiplier", s.large_order_multiplier)?;
            check_unit("spoofing.proximity_pct", s.proximity_pct)?;
            if s.recent_window < 2 || s.depth_levels == 0 {
                return Err(DetectorError::config(
                    "spoofing.recent_window must be >= 2 and spoofing.depth_levels >= 1",
                ));
            }
        }

        let l = &self.layering;
        check_weight("layering", l.enabled, l.weight)?;
        if l.enabled {
            check_unit("layering.detection_threshold", l.detection_threshold)?;
            check_positive("layering.price_gap_threshold", l.price_gap_threshold)?;
            check_positive("layering.size_uniformity_threshold", l.size_uniformity_threshold)?;
            if l.min_layers < 2 {
                return Err(DetectorError::config(format!(
                    "layering.min_layers ({}) must be at least 2",
                    l.min_layers
                )));
            }
        }

        let w = &self.wash_trading;
        check_weight("wash_trading", w.enabled, w.weight)?;
        if w.enabled {
            check_unit("wash_trading.detection_threshold", w.detection_threshold)?;
            check_positive("wash_trading.price_tolerance", w.price_tolerance)?;
            check_positive("wash_trading.size_tolerance", w.size_tolerance)?;
            if w.time_window_ms <= 0 {
                return Err(DetectorError::config("wash_trading.time_window_ms must be positive"));
            }
        }

        let f = &self.fake_liquidity;
        check_weight("fake_liquidity", f.enabled, f.weight)?;
        if f.enabled {
            check_unit("fake_liquidity.detection_threshold", f.detection_threshold)?;
            check_positive("fake_liquidity.withdrawal_threshold", f.withdrawal_threshold)?;
            check_unit("fake_liquidity.withdrawal_threshold", f.withdrawal_threshold)?;
            if f.window_ms <= 0 {
                return Err(DetectorError::config("fake_liquidity.window_ms must be positive"));
            }
        }

        let i = &self.iceberg;
        check_weight("iceberg", i.enabled, i.weight)?;
        if i.enabled {
            check_unit("iceberg.detection_threshold", i.detection_threshold)?;
            check_positive("iceberg.refill_threshold", i.refill_threshold)?;
            check_unit("iceberg.refill_threshold", i.refill_threshold)?;
            if i.refill_window_snapshots == 0 || i.min_refills == 0 {
                return Err(DetectorError::config(
                    "iceberg.refill_window_snapshots and iceberg.min_refills must be non-zero",
                ));
            }
        }

        let c = &self.trade_correlation;
        check_weight("trade_correlation", c.enabled, c.weight)?;
        if c.enabled {
            check_unit("trade_correlation.detection_threshold", c.detection_threshold)?;
            check_unit("trade_correlation.price_tolerance", c.price_tolerance)?;
            if c.window_ms <= 0 || c.trend_window == 0 {
                return Err(DetectorError::config(
                    "trade_correlation.window_ms and trade_correlation.trend_window must be positive",
                ));
            }
        }

        let t = &self.order_tracking;
        check_unit("order_tracking.price_tolerance", t.price_tolerance)?;
        check_unit("order_tracking.execution_tolerance", t.execution_tolerance)?;
        if t.min_visible_intervals == 0 || t.max_resolved_orders == 0 || t.max_events == 0 {
            return Err(DetectorError::config(
                "order_tracking capacities and min_visible_intervals must be non-zero",
            ));
        }

        if !self.cache.cache_ttl_seconds.is_finite() || self.cache.cache_ttl_seconds < 0.0 {
            return Err(DetectorError::config(format!(
                "cache.cache_ttl_seconds ({}) must be a non-negative number",
                self.cache.cache_ttl_seconds
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(DetectorError::config("cache.max_entries must be non-zero"));
        }

        Ok(())
    }
}

/// The knobs every pattern section shares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternSettings {
    pub enabled: bool,
    pub weight: f64,
    pub detection_threshold: f64,
}

impl DetectorConfig {
    pub fn pattern(&self, kind: PatternKind) -> PatternSettings {
        let (enabled, weight, detection_threshold) = match kind {
            PatternKind::Spoofing => (self.spoofing.enabled, self.spoofing.weight, self.spoofing.detection_threshold),
            PatternKind::Layering => (self.layering.enabled, self.layering.weight, self.layering.detection_threshold),
            PatternKind::WashTrading => (
                self.wash_trading.enabled,
                self.wash_trading.weight,
                self.wash_trading.detection_threshold,
            ),
            PatternKind::FakeLiquidity => (
                self.fake_liquidity.enabled,
                self.fake_liquidity.weight,
                self.fake_liquidity.detection_threshold,
            ),
            PatternKind::IcebergOrders => (self.iceberg.enabled, self.iceberg.weight, self.iceberg.detection_threshold),
            PatternKind::TradeCorrelation => (
                self.trade_correlation.enabled,
                self.trade_correlation.weight,
                self.trade_correlation.detection_threshold,
            ),
        };
        PatternSettings {
            enabled,
            weight,
            detection_threshold,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        if self.pool_size == 0 {
            return Err(DetectorError::config("pool.pool_size must be at least 1"));
        }
        if self.virtual_nodes == 0 {
            return Err(DetectorError::config("pool.virtual_nodes must be at least 1"));
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Arc<Self>> {
        dotenv::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("DETECTOR")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Config = builder.build()?.try_deserialize()?;
        config.detector.validate()?;
        config.pool.validate()?;
        Ok(Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.detector.validate().is_ok());
        assert!(config.pool.validate().is_ok());
        assert_eq!(config.detector.history.max_snapshots, 100);
        assert_eq!(config.detector.cache.cache_ttl_seconds, 5.0);
    }

    #[test]
    fn test_default_weights_match_baseline() {
        let config = DetectorConfig::default();
        let total = config.spoofing.weight
            + config.layering.weight
            + config.wash_trading.weight
            + config.fake_liquidity.weight
            + config.iceberg.weight;
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(config.trade_correlation.weight, 0.0);
    }

    #[test]
    fn test_rejects_single_layer() {
        let mut config = DetectorConfig::default();
        config.layering.min_layers = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_layers"));
    }

    #[test]
    fn test_disabled_detector_skips_threshold_checks() {
        let mut config = DetectorConfig::default();
        config.layering.enabled = false;
        config.layering.min_layers = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_finite_threshold() {
        let mut config = DetectorConfig::default();
        config.spoofing.volatility_threshold = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(DetectorError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_min_snapshots_above_capacity() {
        let mut config = DetectorConfig::default();
        config.history.min_snapshots = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "detector": { "layering": { "min_layers": 4 } }, "pool": { "pool_size": 8 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.detector.layering.min_layers, 4);
        assert_eq!(config.detector.layering.size_uniformity_threshold, 0.1);
        assert_eq!(config.pool.pool_size, 8);
        assert_eq!(config.pool.virtual_nodes, 64);
    }

    #[test]
    fn test_zero_pool_rejected() {
        let pool = PoolConfig { pool_size: 0, ..Default::default() };
        assert!(pool.validate().is_err());
    }
}
