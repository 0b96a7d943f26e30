//! Detector tiers, from the bare history-backed detector up to the pool.

pub mod base;
pub mod cached;
pub mod enhanced;
pub mod pool;

pub use base::ManipulationDetector;
pub use cached::{fingerprint, CacheStats, CachedManipulationDetector};
pub use enhanced::EnhancedManipulationDetector;
pub use pool::{AnalyzerFactory, BatchItem, DetectorPool, DetectorStats, PoolStats};

use crate::detection::AggregateResult;
use crate::error::DetectorResult;
use crate::orderbook::{OrderBook, TradeRecord};

/// Anything that can ingest one book update and score it.
pub trait ManipulationAnalyzer: Send {
    /// Append the book and trades to history, then score the window.
    fn analyze(&mut self, orderbook: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<AggregateResult>;

    /// Snapshots currently held in history.
    fn snapshot_count(&self) -> usize;
}
