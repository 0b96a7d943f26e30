pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod orderbook;
pub mod stats;
pub mod telemetry;

pub use config::{Config, DetectorConfig, PoolConfig};
pub use detection::{AggregateResult, DetectionResult, ManipulationType, PatternKind, Severity};
pub use detector::{
    BatchItem, CachedManipulationDetector, DetectorPool, EnhancedManipulationDetector, ManipulationAnalyzer,
    ManipulationDetector,
};
pub use error::{DetectorError, DetectorResult};
pub use orderbook::{OrderBook, TradeRecord, TradeSide};
