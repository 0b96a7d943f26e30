pub mod history;
pub mod snapshot;
pub mod tracker;
pub mod validation;

pub use history::{HistoryUpdate, SnapshotHistory};
pub use snapshot::{BookSide, Level, OrderBook, OrderBookSnapshot, Price, TradeRecord, TradeSide};
pub use tracker::{OrderEvent, OrderEventKind, OrderOrigin, OrderState, OrderTracker, OrderTrackerStats, TrackedOrder};
pub use validation::{validate_book, validate_trades, SnapshotQuality};
