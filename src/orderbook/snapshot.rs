use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub type Price = OrderedFloat<f64>;

/// `(price, size)` as delivered on the wire, best-first per side.
pub type Level = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    pub const BOTH: [BookSide; 2] = [BookSide::Bid, BookSide::Ask];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookSide::Bid => "bid",
            BookSide::Ask => "ask",
        }
    }
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// The resting side a trade executes against.
    pub fn consumes(&self) -> BookSide {
        match self {
            TradeSide::Buy => BookSide::Ask,
            TradeSide::Sell => BookSide::Bid,
        }
    }
}

/// Order book as handed over by the market-data collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<Level>,
    #[serde(default)]
    pub asks: Vec<Level>,
    /// Exchange timestamp in milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl OrderBook {
    pub fn new(bids: Vec<Level>, asks: Vec<Level>, timestamp: i64) -> Self {
        Self { bids, asks, timestamp }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
    pub timestamp: i64,
}

impl TradeRecord {
    pub fn new(id: impl Into<String>, price: f64, size: f64, side: TradeSide, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            price,
            size,
            side,
            timestamp,
        }
    }

    #[inline]
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Immutable view of the book at one ingest, with derived prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub sequence: u64,
    pub timestamp: i64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub mid_price: f64,
    pub spread: f64,
}

impl OrderBookSnapshot {
    /// Normalise a raw book: empty levels dropped, bids high-to-low, asks low-to-high.
    pub fn from_book(book: &OrderBook, sequence: u64) -> Self {
        let mut bids: Vec<Level> = book.bids.iter().copied().filter(|(_, qty)| *qty > 0.0).collect();
        let mut asks: Vec<Level> = book.asks.iter().copied().filter(|(_, qty)| *qty > 0.0).collect();

        bids.sort_by(|a, b| b.0.total_cmp(&a.0));
        asks.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (mid_price, spread) = match (bids.first(), asks.first()) {
            (Some(bid), Some(ask)) => ((bid.0 + ask.0) / 2.0, ask.0 - bid.0),
            (Some(bid), None) => (bid.0, 0.0),
            (None, Some(ask)) => (ask.0, 0.0),
            (None, None) => (0.0, 0.0),
        };

        Self {
            sequence,
            timestamp: book.timestamp,
            bids,
            asks,
            mid_price,
            spread,
        }
    }

    pub fn side(&self, side: BookSide) -> &[Level] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }

    /// Missing one or both sides.
    pub fn is_degenerate(&self) -> bool {
        self.bids.is_empty() || self.asks.is_empty()
    }

    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(b), Some(a)) if b.0 >= a.0)
    }

    /// Total size resting in the top `levels` of one side.
    pub fn depth(&self, side: BookSide, levels: usize) -> f64 {
        self.side(side).iter().take(levels).map(|(_, qty)| qty).sum()
    }

    /// Total liquidity in the top N levels of both sides.
    pub fn liquidity_depth(&self, levels: usize) -> f64 {
        self.depth(BookSide::Bid, levels) + self.depth(BookSide::Ask, levels)
    }
}
