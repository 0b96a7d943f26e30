//! Per-price-level order lifecycle tracking.
//!
//! Level-2 data carries no order ids, so every resting price level is treated
//! as one order. Each snapshot is diffed against the live set:
//!
//! - new level -> `Active`
//! - size change -> `Modified`
//! - level gone -> `Executed` (trades cover it), `Phantom` (short-lived, untraded)
//!   or `Cancelled`
//!
//! Terminal orders leave the live set for a bounded retention buffer and are
//! never reopened. A level that reappears at the same price is a new order.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use super::{BookSide, OrderBookSnapshot, Price, TradeRecord};
use crate::config::{IcebergConfig, OrderTrackingConfig};
use crate::stats::within_relative;

const SIZE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Active,
    Modified,
    Cancelled,
    Phantom,
    Executed,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Cancelled | OrderState::Phantom | OrderState::Executed)
    }

    /// Lifecycles only move forward: Active -> Modified -> terminal.
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        if self.is_terminal() {
            return false;
        }
        !matches!((self, next), (OrderState::Modified, OrderState::Active))
    }
}

/// How the tracker learned about an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    /// Appeared while we were watching.
    Observed,
    /// Already resting on the first snapshot; true age unknown.
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRefill {
    prior_size: f64,
    cycle: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedOrder {
    pub id: u64,
    pub side: BookSide,
    pub price: f64,
    pub initial_size: f64,
    pub current_size: f64,
    pub peak_size: f64,
    pub first_seen_ts: i64,
    pub last_seen_ts: i64,
    pub terminal_ts: Option<i64>,
    pub state: OrderState,
    pub origin: OrderOrigin,
    pub snapshots_seen: u32,
    pub modifications: u32,
    pub last_delta: f64,
    pub executed_volume: f64,
    pub refills: u32,
    #[serde(skip)]
    pending_refill: Option<PendingRefill>,
}

impl TrackedOrder {
    fn new(id: u64, side: BookSide, price: f64, size: f64, ts: i64, origin: OrderOrigin) -> Self {
        Self {
            id,
            side,
            price,
            initial_size: size,
            current_size: size,
            peak_size: size,
            first_seen_ts: ts,
            last_seen_ts: ts,
            terminal_ts: None,
            state: OrderState::Active,
            origin,
            snapshots_seen: 1,
            modifications: 0,
            last_delta: 0.0,
            executed_volume: 0.0,
            refills: 0,
            pending_refill: None,
        }
    }

    /// Apply a state change; regressions and reopenings are refused.
    pub fn transition(&mut self, next: OrderState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Time from first sighting to resolution, for resolved orders.
    pub fn lifetime_ms(&self) -> Option<i64> {
        self.terminal_ts.map(|ts| ts - self.first_seen_ts)
    }

    /// Snapshot intervals between first and last sighting.
    pub fn visible_intervals(&self) -> u32 {
        self.snapshots_seen.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Appeared,
    Increased,
    Reduced,
    Removed,
}

/// A book change observed between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderEvent {
    pub order_id: u64,
    pub kind: OrderEventKind,
    pub side: BookSide,
    pub price: f64,
    /// Absolute size change.
    pub size_delta: f64,
    pub timestamp: i64,
    /// Final state for `Removed` events.
    pub resolution: Option<OrderState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderTrackerStats {
    pub active_orders: usize,
    pub phantom_orders: usize,
    pub completed_orders: usize,
    pub executed_orders: usize,
    pub cancelled_orders: usize,
    pub avg_lifetime_ms: f64,
    pub total_refills: u32,
    pub iceberg_candidates: usize,
}

pub struct OrderTracker {
    config: OrderTrackingConfig,
    refill_threshold: f64,
    refill_window: u64,
    min_refills: u32,
    active: HashMap<(BookSide, Price), TrackedOrder>,
    resolved: VecDeque<TrackedOrder>,
    events: VecDeque<OrderEvent>,
    next_id: u64,
    cycle: u64,
}

impl OrderTracker {
    pub fn new(config: OrderTrackingConfig, iceberg: &IcebergConfig) -> Self {
        Self {
            config,
            refill_threshold: iceberg.refill_threshold,
            refill_window: iceberg.refill_window_snapshots,
            min_refills: iceberg.min_refills,
            active: HashMap::new(),
            resolved: VecDeque::new(),
            events: VecDeque::new(),
            next_id: 0,
            cycle: 0,
        }
    }

    /// Diff `current` against the live set.
    ///
    /// `trades` are the trades that arrived since `previous`. With no previous
    /// snapshot the book is only seeded; no transitions are derived.
    pub fn update(
        &mut self,
        previous: Option<&OrderBookSnapshot>,
        current: &OrderBookSnapshot,
        trades: &[TradeRecord],
    ) {
        self.cycle += 1;

        if previous.is_none() {
            self.seed(current);
            return;
        }

        for side in BookSide::BOTH {
            // An empty side is missing data, not a mass cancellation.
            if current.side(side).is_empty() {
                continue;
            }
            self.diff_side(side, current, trades);
        }
    }

    fn seed(&mut self, snapshot: &OrderBookSnapshot) {
        for side in BookSide::BOTH {
            for &(price, size) in snapshot.side(side) {
                let key = (side, Price::from(price));
                if self.active.contains_key(&key) {
                    continue;
                }
                let order = self.open(side, price, size, snapshot.timestamp, OrderOrigin::Inferred);
                self.active.insert(key, order);
            }
        }
    }

    fn open(&mut self, side: BookSide, price: f64, size: f64, ts: i64, origin: OrderOrigin) -> TrackedOrder {
        self.next_id += 1;
        TrackedOrder::new(self.next_id, side, price, size, ts, origin)
    }

    fn diff_side(&mut self, side: BookSide, current: &OrderBookSnapshot, trades: &[TradeRecord]) {
        let ts = current.timestamp;
        let levels: HashMap<Price, f64> = current
            .side(side)
            .iter()
            .map(|&(price, size)| (Price::from(price), size))
            .collect();

        for (&price, &size) in &levels {
            let traded = self.traded_volume(side, price.0, trades);
            match self.active.get_mut(&(side, price)) {
                None => {
                    let order = self.open(side, price.0, size, ts, OrderOrigin::Observed);
                    self.push_event(&order, OrderEventKind::Appeared, size, ts, None);
                    self.active.insert((side, price), order);
                }
                Some(order) => {
                    order.snapshots_seen += 1;
                    order.last_seen_ts = ts;

                    let prior = order.current_size;
                    let delta = size - prior;

                    if traded > SIZE_EPSILON {
                        order.executed_volume += traded.min(prior);
                        if size >= prior * self.refill_threshold && traded >= prior * (1.0 - self.refill_threshold) {
                            // Traded through yet still shown at full size.
                            order.refills += 1;
                            order.pending_refill = None;
                        } else if delta < 0.0 {
                            order.pending_refill = Some(PendingRefill {
                                prior_size: prior,
                                cycle: self.cycle,
                            });
                        }
                    } else if delta > 0.0 {
                        if let Some(pending) = order.pending_refill {
                            if self.cycle - pending.cycle <= self.refill_window
                                && size >= pending.prior_size * self.refill_threshold
                            {
                                order.refills += 1;
                                order.pending_refill = None;
                            }
                        }
                    }

                    if let Some(pending) = order.pending_refill {
                        if self.cycle - pending.cycle > self.refill_window {
                            order.pending_refill = None;
                        }
                    }

                    if delta.abs() <= SIZE_EPSILON * prior.max(1.0) {
                        continue;
                    }

                    order.transition(OrderState::Modified);
                    order.modifications += 1;
                    order.last_delta = delta;
                    order.current_size = size;
                    order.peak_size = order.peak_size.max(size);

                    let kind = if delta > 0.0 {
                        OrderEventKind::Increased
                    } else {
                        OrderEventKind::Reduced
                    };
                    let snapshot = order.clone();
                    self.push_event(&snapshot, kind, delta.abs(), ts, None);
                }
            }
        }

        let vanished: Vec<(BookSide, Price)> = self
            .active
            .keys()
            .filter(|(s, p)| *s == side && !levels.contains_key(p))
            .copied()
            .collect();

        for key in vanished {
            if let Some(order) = self.active.remove(&key) {
                let traded = self.traded_volume(side, order.price, trades);
                self.resolve(order, traded, ts);
            }
        }
    }

    fn resolve(&mut self, mut order: TrackedOrder, traded: f64, ts: i64) {
        let remaining = order.current_size;
        let tolerance = self.config.execution_tolerance;

        let next = if traded >= remaining * (1.0 - tolerance) {
            order.executed_volume += remaining.min(traded);
            OrderState::Executed
        } else if order.origin == OrderOrigin::Observed
            && order.visible_intervals() < self.config.min_visible_intervals
            && order.executed_volume + traded <= order.peak_size * tolerance
        {
            OrderState::Phantom
        } else {
            OrderState::Cancelled
        };

        if !order.transition(next) {
            return;
        }
        order.terminal_ts = Some(ts);
        order.pending_refill = None;

        self.push_event(&order, OrderEventKind::Removed, remaining, ts, Some(next));

        self.resolved.push_back(order);
        while self.resolved.len() > self.config.max_resolved_orders {
            self.resolved.pop_front();
        }
    }

    fn push_event(
        &mut self,
        order: &TrackedOrder,
        kind: OrderEventKind,
        size_delta: f64,
        timestamp: i64,
        resolution: Option<OrderState>,
    ) {
        self.events.push_back(OrderEvent {
            order_id: order.id,
            kind,
            side: order.side,
            price: order.price,
            size_delta,
            timestamp,
            resolution,
        });
        while self.events.len() > self.config.max_events {
            self.events.pop_front();
        }
    }

    /// Volume traded against `side` at `price` among `trades`.
    fn traded_volume(&self, side: BookSide, price: f64, trades: &[TradeRecord]) -> f64 {
        trades
            .iter()
            .filter(|t| t.side.consumes() == side && within_relative(t.price, price, self.config.price_tolerance))
            .map(|t| t.size)
            .sum()
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &TrackedOrder> {
        self.active.values()
    }

    pub fn resolved_orders(&self) -> impl Iterator<Item = &TrackedOrder> {
        self.resolved.iter()
    }

    pub fn events(&self) -> &VecDeque<OrderEvent> {
        &self.events
    }

    /// Phantom resolutions stamped at or after `since_ms`.
    pub fn phantom_events_since(&self, since_ms: i64) -> usize {
        self.events
            .iter()
            .filter(|e| e.resolution == Some(OrderState::Phantom) && e.timestamp >= since_ms)
            .count()
    }

    pub fn order_at(&self, side: BookSide, price: f64) -> Option<&TrackedOrder> {
        self.active.get(&(side, Price::from(price)))
    }

    pub fn stats(&self) -> OrderTrackerStats {
        let mut stats = OrderTrackerStats {
            active_orders: self.active.len(),
            ..Default::default()
        };

        let mut lifetime_sum = 0.0;
        let mut lifetimes = 0usize;
        for order in &self.resolved {
            match order.state {
                OrderState::Phantom => stats.phantom_orders += 1,
                OrderState::Executed => stats.executed_orders += 1,
                OrderState::Cancelled => stats.cancelled_orders += 1,
                _ => {}
            }
            if let Some(lifetime) = order.lifetime_ms() {
                lifetime_sum += lifetime as f64;
                lifetimes += 1;
            }
        }
        stats.completed_orders = stats.executed_orders + stats.cancelled_orders;
        if lifetimes > 0 {
            stats.avg_lifetime_ms = lifetime_sum / lifetimes as f64;
        }

        for order in self.active.values().chain(self.resolved.iter()) {
            stats.total_refills += order.refills;
            if order.refills >= self.min_refills {
                stats.iceberg_candidates += 1;
            }
        }

        stats
    }
}
