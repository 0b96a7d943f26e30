use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{CachedManipulationDetector, EnhancedManipulationDetector, ManipulationAnalyzer};
use crate::config::{DetectorConfig, PoolConfig};
use crate::detection::AggregateResult;
use crate::error::{DetectorError, DetectorResult};
use crate::orderbook::{OrderBook, TradeRecord};
use crate::telemetry::DetectionLogger;

/// One line of a batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub symbol: String,
    pub orderbook: OrderBook,
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
}

impl BatchItem {
    pub fn new(symbol: impl Into<String>, orderbook: OrderBook, trades: Vec<TradeRecord>) -> Self {
        Self {
            symbol: symbol.into(),
            orderbook,
            trades,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectorStats {
    pub detector_id: usize,
    pub assigned_symbols: Vec<String>,
    pub cache_hit_rate: f64,
    pub cache_size: usize,
    pub total_analyses: u64,
    pub avg_analysis_time_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub total_symbols: usize,
    pub total_analyses: u64,
    pub cache_hit_rate: f64,
    pub avg_analysis_time_ms: f64,
    pub detectors: Vec<DetectorStats>,
}

/// Builds the analyzer behind each per-symbol cache.
pub type AnalyzerFactory<D> = Arc<dyn Fn(&DetectorConfig, DetectionLogger) -> DetectorResult<D> + Send + Sync>;

/// One pool member. Each symbol routed here gets its own cached detector so
/// histories never interleave.
struct PoolSlot<D> {
    id: usize,
    config: DetectorConfig,
    factory: AnalyzerFactory<D>,
    detectors: HashMap<String, CachedManipulationDetector<D>>,
}

impl<D: ManipulationAnalyzer> PoolSlot<D> {
    fn new(id: usize, config: DetectorConfig, factory: AnalyzerFactory<D>) -> Self {
        Self {
            id,
            config,
            factory,
            detectors: HashMap::new(),
        }
    }

    fn analyze(&mut self, symbol: &str, orderbook: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<AggregateResult> {
        if !self.detectors.contains_key(symbol) {
            let logger = DetectionLogger::new(format!("pool-{}/{}", self.id, symbol));
            let inner = (self.factory)(&self.config, logger.clone())?;
            let detector = CachedManipulationDetector::new(inner, &self.config.cache, logger);
            self.detectors.insert(symbol.to_string(), detector);
            debug!(detector_id = self.id, symbol, "Created per-symbol detector");
        }

        match self.detectors.get_mut(symbol) {
            Some(detector) => detector.analyze(orderbook, trades),
            None => Err(DetectorError::Pool(format!("detector for {} missing after creation", symbol))),
        }
    }

    /// Counters summed over the symbols this slot serves.
    fn stats(&self, assigned_symbols: Vec<String>) -> DetectorStats {
        let mut hits = 0u64;
        let mut total = 0u64;
        let mut time_ms = 0.0;
        let mut cache_size = 0usize;

        for detector in self.detectors.values() {
            let stats = detector.stats();
            hits += stats.hits;
            total += stats.total_analyses;
            time_ms += stats.avg_analysis_time_ms * stats.total_analyses as f64;
            cache_size += stats.cache_size;
        }

        DetectorStats {
            detector_id: self.id,
            assigned_symbols,
            cache_hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            cache_size,
            total_analyses: total,
            avg_analysis_time_ms: if total > 0 { time_ms / total as f64 } else { 0.0 },
        }
    }
}

fn ring_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Fixed set of detector slots with consistent-hash symbol routing.
pub struct DetectorPool<D = EnhancedManipulationDetector> {
    pool_size: usize,
    ring: BTreeMap<u64, usize>,
    slots: Vec<Arc<Mutex<PoolSlot<D>>>>,
    assignments: DashMap<String, usize>,
}

impl DetectorPool<EnhancedManipulationDetector> {
    /// Pool of cached enhanced detectors.
    pub fn new(config: DetectorConfig, pool: &PoolConfig) -> DetectorResult<Self> {
        Self::with_factory(
            config,
            pool,
            Arc::new(|config: &DetectorConfig, logger: DetectionLogger| {
                EnhancedManipulationDetector::with_logger(config.clone(), logger)
            }),
        )
    }
}

impl<D: ManipulationAnalyzer + 'static> DetectorPool<D> {
    /// Validates everything up front; a pool that constructs never fails on config later.
    pub fn with_factory(config: DetectorConfig, pool: &PoolConfig, factory: AnalyzerFactory<D>) -> DetectorResult<Self> {
        config.validate()?;
        pool.validate()?;
        // Surface weight/tier errors now rather than on a symbol's first tick.
        factory(&config, DetectionLogger::new("pool-check"))?;

        let mut ring = BTreeMap::new();
        for slot in 0..pool.pool_size {
            for vnode in 0..pool.virtual_nodes {
                ring.entry(ring_hash(&format!("detector-{}#{}", slot, vnode)))
                    .or_insert(slot);
            }
        }

        let slots = (0..pool.pool_size)
            .map(|id| Arc::new(Mutex::new(PoolSlot::new(id, config.clone(), Arc::clone(&factory)))))
            .collect();

        info!(
            pool_size = pool.pool_size,
            virtual_nodes = pool.virtual_nodes,
            "Detector pool initialized"
        );

        Ok(Self {
            pool_size: pool.pool_size,
            ring,
            slots,
            assignments: DashMap::new(),
        })
    }

    /// Slot serving `symbol`. Stable for the lifetime of the pool.
    pub fn detector_id(&self, symbol: &str) -> usize {
        if let Some(id) = self.assignments.get(symbol) {
            return *id;
        }

        let hash = ring_hash(symbol);
        let id = self
            .ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, slot)| *slot)
            .unwrap_or(0);

        self.assignments.insert(symbol.to_string(), id);
        id
    }

    /// Analyze one symbol on the calling thread.
    pub fn analyze(&self, symbol: &str, orderbook: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<AggregateResult> {
        let id = self.detector_id(symbol);
        let mut slot = self.slots[id].lock();
        slot.analyze(symbol, orderbook, trades)
    }

    /// Analyze many symbols. Slots run in parallel on the blocking pool; a
    /// failure for one symbol, or a crashed slot, never drops the others.
    pub async fn batch_analyze(&self, items: Vec<BatchItem>) -> HashMap<String, DetectorResult<AggregateResult>> {
        let mut groups: BTreeMap<usize, Vec<BatchItem>> = BTreeMap::new();
        for item in items {
            let id = self.detector_id(&item.symbol);
            groups.entry(id).or_default().push(item);
        }

        let mut pending = Vec::with_capacity(groups.len());
        let mut handles = Vec::with_capacity(groups.len());
        for (id, group) in groups {
            let symbols: Vec<String> = group.iter().map(|item| item.symbol.clone()).collect();
            let slot = Arc::clone(&self.slots[id]);
            handles.push(tokio::task::spawn_blocking(move || {
                let mut slot = slot.lock();
                group
                    .into_iter()
                    .map(|item| {
                        let result = slot.analyze(&item.symbol, &item.orderbook, &item.trades);
                        (item.symbol, result)
                    })
                    .collect::<Vec<_>>()
            }));
            pending.push((id, symbols));
        }

        let mut results = HashMap::new();
        for ((id, symbols), joined) in pending.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcomes) => {
                    for (symbol, outcome) in outcomes {
                        if let Err(err) = &outcome {
                            warn!(detector_id = id, symbol = %symbol, error = %err, "Batch analysis failed");
                        }
                        results.insert(symbol, outcome);
                    }
                }
                Err(err) => {
                    warn!(detector_id = id, error = %err, "Detector worker crashed");
                    for symbol in symbols {
                        let failure = DetectorError::Pool(format!("detector-{} worker failed: {}", id, err));
                        results.insert(symbol, Err(failure));
                    }
                }
            }
        }

        results
    }

    pub fn detector_stats(&self) -> Vec<DetectorStats> {
        let mut assigned: Vec<Vec<String>> = vec![Vec::new(); self.pool_size];
        for entry in self.assignments.iter() {
            if let Some(symbols) = assigned.get_mut(*entry.value()) {
                symbols.push(entry.key().clone());
            }
        }

        self.slots
            .iter()
            .zip(assigned)
            .map(|(slot, mut symbols)| {
                symbols.sort();
                slot.lock().stats(symbols)
            })
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        let detectors = self.detector_stats();

        let total_analyses: u64 = detectors.iter().map(|d| d.total_analyses).sum();
        let weighted = |f: fn(&DetectorStats) -> f64| {
            if total_analyses == 0 {
                return 0.0;
            }
            detectors
                .iter()
                .map(|d| f(d) * d.total_analyses as f64)
                .sum::<f64>()
                / total_analyses as f64
        };

        PoolStats {
            pool_size: self.pool_size,
            total_symbols: self.assignments.len(),
            total_analyses,
            cache_hit_rate: weighted(|d| d.cache_hit_rate),
            avg_analysis_time_ms: weighted(|d| d.avg_analysis_time_ms),
            detectors,
        }
    }
}
