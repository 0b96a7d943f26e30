#![allow(dead_code)]

use orderbook_manipulation_detector::{OrderBook, TradeRecord, TradeSide};

pub const BASE_TS: i64 = 1_700_000_000_000;

/// Ten levels a side around 50 000 with sizes alternating 1.0 / 1.1. A small
/// per-tick drift keeps every book distinct for the result cache.
pub fn ladder_book(i: usize, spoof: Option<(usize, f64)>) -> OrderBook {
    ladder_book_at(50_000.0, 1.0, i, spoof)
}

/// Same ladder with the best bid at `base` and levels `tick` apart. `spoof`
/// replaces the size of one bid level.
pub fn ladder_book_at(base: f64, tick: f64, i: usize, spoof: Option<(usize, f64)>) -> OrderBook {
    let size = |k: usize| 1.0 + 0.1 * ((i + k) % 2) as f64 + 0.0001 * i as f64;
    let bids = (0..10)
        .map(|k| {
            let price = base - k as f64 * tick;
            match spoof {
                Some((level, spoof_size)) if level == k => (price, spoof_size),
                _ => (price, size(k)),
            }
        })
        .collect();
    let asks = (0..10).map(|k| (base + (k + 1) as f64 * tick, size(k))).collect();
    OrderBook::new(bids, asks, BASE_TS + i as i64 * 1_000)
}

/// Fifteen ticks; a 50-unit bid appears two levels below the best bid on
/// ticks 10-11 and is then pulled. `fill` units are sold into it while it rests.
pub fn spoof_sequence(fill: f64) -> Vec<(OrderBook, Vec<TradeRecord>)> {
    spoof_sequence_at(50_000.0, 1.0, fill)
}

pub fn spoof_sequence_at(base: f64, tick: f64, fill: f64) -> Vec<(OrderBook, Vec<TradeRecord>)> {
    (0..15)
        .map(|i| {
            let spoof = if i == 10 || i == 11 { Some((2, 50.0)) } else { None };
            let ts = BASE_TS + i as i64 * 1_000;
            let mut trades = vec![TradeRecord::new(format!("buy-{}", i), base + tick, 0.05, TradeSide::Buy, ts - 300)];
            if i == 11 && fill > 0.0 {
                trades.push(TradeRecord::new("fill", base - 2.0 * tick, fill, TradeSide::Sell, ts - 500));
            }
            (ladder_book_at(base, tick, i, spoof), trades)
        })
        .collect()
}

/// Five evenly spaced bids of near-identical size; ragged asks.
pub fn layered_book(ts: i64) -> OrderBook {
    OrderBook::new(
        vec![(100.00, 10.0), (99.99, 10.3), (99.98, 9.8), (99.97, 10.1), (99.96, 9.9)],
        vec![(100.01, 3.0), (100.02, 17.0), (100.03, 8.0), (100.04, 25.0), (100.05, 1.0)],
        ts,
    )
}

/// Small deterministic generator so property-style tests are reproducible.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// A noisy book and trade tape for tick `i`.
pub fn random_tick(rng: &mut Lcg, i: usize) -> (OrderBook, Vec<TradeRecord>) {
    let mid = 100.0 + rng.range(-1.0, 1.0);
    let depth = 1 + (rng.next_f64() * 12.0) as usize;
    let bids = (0..depth)
        .map(|k| (mid - 0.01 * (k + 1) as f64, rng.range(0.1, 60.0)))
        .collect();
    let asks = (0..depth)
        .map(|k| (mid + 0.01 * (k + 1) as f64, rng.range(0.1, 60.0)))
        .collect();

    let ts = BASE_TS + i as i64 * 250;
    let trades = (0..(rng.next_f64() * 6.0) as usize)
        .map(|n| {
            let side = if rng.next_f64() < 0.5 { TradeSide::Buy } else { TradeSide::Sell };
            TradeRecord::new(format!("r{}-{}", i, n), mid + rng.range(-0.05, 0.05), rng.range(0.01, 5.0), side, ts - 10)
        })
        .collect();

    (OrderBook::new(bids, asks, ts), trades)
}
