use std::collections::{HashSet, VecDeque};

use super::validation::{validate_book, validate_trades, SnapshotQuality};
use super::{OrderBook, OrderBookSnapshot, TradeRecord};
use crate::error::DetectorResult;

/// What a single `update` added to the window.
#[derive(Debug, Clone)]
pub struct HistoryUpdate {
    pub quality: SnapshotQuality,
    /// Trades accepted this call, duplicates already filtered out.
    pub new_trades: Vec<TradeRecord>,
}

/// Bounded rolling window of snapshots and trades for one symbol.
pub struct SnapshotHistory {
    snapshots: VecDeque<OrderBookSnapshot>,
    trades: VecDeque<TradeRecord>,
    trade_ids: HashSet<String>,
    max_snapshots: usize,
    max_trades: usize,
    next_sequence: u64,
    degenerate_count: u64,
}

impl SnapshotHistory {
    pub fn new(max_snapshots: usize, max_trades: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(max_snapshots),
            trades: VecDeque::with_capacity(max_trades),
            trade_ids: HashSet::new(),
            max_snapshots: max_snapshots.max(1),
            max_trades: max_trades.max(1),
            next_sequence: 0,
            degenerate_count: 0,
        }
    }

    /// Append one book and its trades. Only non-finite input is rejected;
    /// one-sided or empty books are recorded as degenerate snapshots.
    pub fn update(&mut self, book: &OrderBook, trades: &[TradeRecord]) -> DetectorResult<HistoryUpdate> {
        validate_book(book)?;
        validate_trades(trades)?;

        self.next_sequence += 1;
        let snapshot = OrderBookSnapshot::from_book(book, self.next_sequence);
        let quality = SnapshotQuality::assess(&snapshot);
        if quality.is_degenerate() {
            self.degenerate_count += 1;
        }

        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
        }

        let mut new_trades = Vec::new();
        for trade in trades {
            if !self.trade_ids.insert(trade.id.clone()) {
                continue;
            }
            self.trades.push_back(trade.clone());
            new_trades.push(trade.clone());
        }
        while self.trades.len() > self.max_trades {
            if let Some(evicted) = self.trades.pop_front() {
                self.trade_ids.remove(&evicted.id);
            }
        }

        Ok(HistoryUpdate { quality, new_trades })
    }

    pub fn snapshots(&self) -> &VecDeque<OrderBookSnapshot> {
        &self.snapshots
    }

    pub fn trades(&self) -> &VecDeque<TradeRecord> {
        &self.trades
    }

    pub fn latest(&self) -> Option<&OrderBookSnapshot> {
        self.snapshots.back()
    }

    /// The snapshot immediately before the latest one.
    pub fn previous(&self) -> Option<&OrderBookSnapshot> {
        let len = self.snapshots.len();
        if len < 2 {
            return None;
        }
        self.snapshots.get(len - 2)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn degenerate_count(&self) -> u64 {
        self.degenerate_count
    }

    pub fn capacity(&self) -> (usize, usize) {
        (self.max_snapshots, self.max_trades)
    }

    /// Trades stamped at or after `since_ms`, oldest first.
    pub fn trades_since(&self, since_ms: i64) -> impl Iterator<Item = &TradeRecord> {
        self.trades.iter().filter(move |t| t.timestamp >= since_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::TradeSide;

    fn book(ts: i64) -> OrderBook {
        OrderBook::new(vec![(100.0, 1.0)], vec![(101.0, 1.0)], ts)
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = SnapshotHistory::new(3, 2);
        for i in 0..10 {
            let trade = TradeRecord::new(format!("t{}", i), 100.5, 1.0, TradeSide::Buy, i);
            history.update(&book(i), &[trade]).unwrap();
            assert!(history.len() <= 3);
            assert!(history.trade_count() <= 2);
        }
        assert_eq!(history.latest().unwrap().timestamp, 9);
        assert_eq!(history.snapshots().front().unwrap().timestamp, 7);
        assert_eq!(history.previous().unwrap().timestamp, 8);
    }

    #[test]
    fn test_duplicate_trades_ignored() {
        let mut history = SnapshotHistory::new(10, 10);
        let trade = TradeRecord::new("t1", 100.5, 1.0, TradeSide::Buy, 1);

        let first = history.update(&book(1), &[trade.clone()]).unwrap();
        let second = history.update(&book(2), &[trade]).unwrap();

        assert_eq!(first.new_trades.len(), 1);
        assert!(second.new_trades.is_empty());
        assert_eq!(history.trade_count(), 1);
    }

    #[test]
    fn test_degenerate_snapshot_recorded() {
        let mut history = SnapshotHistory::new(10, 10);
        let update = history
            .update(&OrderBook::new(vec![], vec![(101.0, 1.0)], 5), &[])
            .unwrap();

        assert_eq!(update.quality, SnapshotQuality::MissingBids);
        assert_eq!(history.len(), 1);
        assert_eq!(history.degenerate_count(), 1);
    }

    #[test]
    fn test_invalid_input_leaves_history_untouched() {
        let mut history = SnapshotHistory::new(10, 10);
        history.update(&book(1), &[]).unwrap();

        let bad = OrderBook::new(vec![(f64::NAN, 1.0)], vec![(101.0, 1.0)], 2);
        assert!(history.update(&bad, &[]).is_err());
        assert_eq!(history.len(), 1);
        assert!(history.previous().is_none());
    }
}
