//! Immutable book snapshot.

use crate::price::Price;
use crate::symbol::Symbol;

/// Point-in-time view of one book's top and shape.
///
/// Snapshots are cheap `Copy` values and the only exported view of book
/// state; consumers never hold references into book internals. Absent sides
/// report zero price and size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    pub symbol: Symbol,
    pub timestamp: u64,
    pub best_bid: Price,
    pub best_bid_size: u64,
    pub best_ask: Price,
    pub best_ask_size: u64,
    pub spread: f64,
    pub imbalance: f64,
    pub bid_levels: usize,
    pub ask_levels: usize,
}
