use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{EnhancedManipulationDetector, ManipulationAnalyzer};
use crate::config::{CacheConfig, DetectorConfig};
use crate::detection::AggregateResult;
use crate::error::DetectorResult;
use crate::orderbook::{OrderBook, TradeRecord};
use crate::telemetry::DetectionLogger;

/// Deterministic key over book levels and trade ids/sizes. The book
/// timestamp is not hashed, so a resent unchanged book hits.
pub fn fingerprint(orderbook: &OrderBook, trades: &[TradeRecord]) -> String {
    let mut hasher = Sha256::new();

    for (tag, levels) in [(b'B', &orderbook.bids), (b'A', &orderbook.asks)] {
        hasher.update([tag]);
        hasher.update((levels.len() as u64).to_le_bytes());
        for (price, size) in levels {
            hasher.update(price.to_bits().to_le_bytes());
            hasher.update(size.to_bits().to_le_bytes());
        }
    }

    hasher.update([b'T']);
    hasher.update((trades.len() as u64).to_le_bytes());
    for trade in trades {
        hasher.update((trade.id.len() as u64).to_le_bytes());
        hasher.update(trade.id.as_bytes());
        hasher.update(trade.size.to_bits().to_le_bytes());
    }

    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: AggregateResult,
    inserted: Instant,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub cache_hit_rate: f64,
    pub avg_analysis_time_ms: f64,
    pub cache_size: usize,
    pub total_analyses: u64,
}

/// TTL-bound result cache in front of an analyzer.
///
/// Expired entries are dropped when looked up; there is no background sweep.
pub struct CachedManipulationDetector<D = EnhancedManipulationDetector> {
    inner: D,
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<String, CacheEntry>,
    logger: DetectionLogger,
    hits: u64,
    misses: u64,
    total_time_ms: f64,
}

impl CachedManipulationDetector<EnhancedManipulationDetector> {
    /// Enhanced detector behind a cache configured from `config.cache`.
    pub fn enhanced(config: DetectorConfig, logger: DetectionLogger) -> DetectorResult<Self> {
        let cache = config.cache.clone();
        let inner = EnhancedManipulationDetector::with_logger(config, logger.clone())?;
        Ok(Self::new(inner, &cache, logger))
    }
}

impl<D: ManipulationAnalyzer> CachedManipulationDetector<D> {
    pub fn new(inner: D, cache: &CacheConfig, logger: DetectionLogger) -> Self {
        Self {
            inner,
            ttl: Duration::from_secs_f64(cache.cache_ttl_seconds.max(0.0)),
            max_entries: cache.max_entries.max(1),
            entries: HashMap::new(),
            logger,
            hits: 0,
            misses: 0,
            total_time_ms: 0.0,
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    pub fn cache_size(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            cache_hit_rate: self.cache_hit_rate(),
            avg_analysis_time_ms: if total > 0 {
                self.total_time_ms / total as f64
            } else {
                0.0
            },
            cache_size: self.entries.len(),
            total_analyses: total,
        }
    }

    /// Valid entry for `key`, dropping it first if it has expired.
    fn lookup(&mut self, key: &str) -> Option<&AggregateResult> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.result)
    }

    fn insert(&mut self, key: String, result: AggregateResult) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            let ttl = self.ttl;
            self.entries.retain(|_, entry| entry.inserted.elapsed() < ttl);

            if self.entries.len() >= self.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                result,
                inserted: Instant::now(),
            },
        );
    }
}

impl<D: ManipulationAnalyzer> ManipulationAnalyzer for CachedManipulationDetector<D> {
    fn analyze(&mut self, orderbook: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<AggregateResult> {
        let started = Instant::now();
        let key = fingerprint(orderbook, trades);

        if let Some(cached) = self.lookup(&key) {
            let mut result = cached.clone();
            self.hits += 1;
            self.logger.cache_hit(&key);

            let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
            self.total_time_ms += elapsed_ms;
            result.cached = true;
            result.performance.analysis_time_ms = elapsed_ms;
            result.performance.cache_hit_rate = self.cache_hit_rate();
            return Ok(result);
        }

        self.misses += 1;
        let outcome = self.inner.analyze(orderbook, trades);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.total_time_ms += elapsed_ms;

        let mut result = outcome?;
        result.performance.analysis_time_ms = elapsed_ms;
        result.performance.cache_hit_rate = self.cache_hit_rate();
        self.insert(key, result.clone());
        Ok(result)
    }

    fn snapshot_count(&self) -> usize {
        self.inner.snapshot_count()
    }
}
