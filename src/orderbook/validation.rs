use serde::Serialize;

use super::{OrderBook, OrderBookSnapshot, TradeRecord};
use crate::error::{DetectorError, DetectorResult};

/// Shape of an ingested snapshot. Anything but `Valid` is still recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotQuality {
    Valid,
    MissingBids,
    MissingAsks,
    Empty,
    Crossed, // Bid >= Ask
}

impl SnapshotQuality {
    pub fn assess(snapshot: &OrderBookSnapshot) -> Self {
        match (snapshot.bids.is_empty(), snapshot.asks.is_empty()) {
            (true, true) => SnapshotQuality::Empty,
            (true, false) => SnapshotQuality::MissingBids,
            (false, true) => SnapshotQuality::MissingAsks,
            (false, false) if snapshot.is_crossed() => SnapshotQuality::Crossed,
            (false, false) => SnapshotQuality::Valid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotQuality::Valid => "Valid",
            SnapshotQuality::MissingBids => "Missing Bids",
            SnapshotQuality::MissingAsks => "Missing Asks",
            SnapshotQuality::Empty => "Empty",
            SnapshotQuality::Crossed => "Crossed",
        }
    }

    /// One or both sides absent.
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            SnapshotQuality::MissingBids | SnapshotQuality::MissingAsks | SnapshotQuality::Empty
        )
    }
}

/// Reject numbers that would poison the rolling statistics.
pub fn validate_book(book: &OrderBook) -> DetectorResult<()> {
    for (side, levels) in [("bid", &book.bids), ("ask", &book.asks)] {
        for (price, qty) in levels {
            if !price.is_finite() || !qty.is_finite() || *price < 0.0 || *qty < 0.0 {
                return Err(DetectorError::InvalidData(format!(
                    "{} level ({}, {}) is not a finite non-negative price/size",
                    side, price, qty
                )));
            }
        }
    }
    Ok(())
}

pub fn validate_trades(trades: &[TradeRecord]) -> DetectorResult<()> {
    for trade in trades {
        if !trade.price.is_finite() || !trade.size.is_finite() || trade.price < 0.0 || trade.size < 0.0 {
            return Err(DetectorError::InvalidData(format!(
                "trade {} has invalid price/size ({}, {})",
                trade.id, trade.price, trade.size
            )));
        }
    }
    Ok(())
}
