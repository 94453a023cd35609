//! Ladder-only book for per-price aggregate feeds.
//!
//! The MBP feed reports absolute sizes at prices and carries no order ids,
//! so there is nothing to index, and rebuilding per-order state from
//! aggregates is explicitly off the table. This book just mirrors the
//! ladders the venue publishes: set a level, remove a level, decrement on
//! trade.

use std::collections::BTreeMap;

use crate::level::PriceLevel;
use crate::price::Price;
use crate::snapshot::Snapshot;
use crate::symbol::Symbol;

pub struct AggregateBook {
    symbol: Symbol,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    last_update_ts: u64,
    message_count: u64,
}

impl AggregateBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_ts: 0,
            message_count: 0,
        }
    }

    /// Set the absolute size resting at a bid price; zero removes the
    /// level.
    pub fn set_bid(&mut self, price: Price, size: u64, ts: u64) {
        Self::set_level(&mut self.bids, price, size);
        self.bump(ts);
    }

    /// Set the absolute size resting at an ask price; zero removes the
    /// level.
    pub fn set_ask(&mut self, price: Price, size: u64, ts: u64) {
        Self::set_level(&mut self.asks, price, size);
        self.bump(ts);
    }

    pub fn remove_bid(&mut self, price: Price, ts: u64) {
        self.bids.remove(&price);
        self.bump(ts);
    }

    pub fn remove_ask(&mut self, price: Price, ts: u64) {
        self.asks.remove(&price);
        self.bump(ts);
    }

    /// Trade against a bid level: decrement, removing at zero. A trade at
    /// an unknown price only counts the message.
    pub fn execute_bid(&mut self, price: Price, size: u64, ts: u64) {
        Self::execute_level(&mut self.bids, price, size);
        self.bump(ts);
    }

    /// Trade against an ask level: decrement, removing at zero.
    pub fn execute_ask(&mut self, price: Price, size: u64, ts: u64) {
        Self::execute_level(&mut self.asks, price, size);
        self.bump(ts);
    }

    fn set_level(ladder: &mut BTreeMap<Price, PriceLevel>, price: Price, size: u64) {
        if size == 0 {
            ladder.remove(&price);
        } else {
            ladder
                .entry(price)
                .and_modify(|level| level.size = size)
                .or_insert_with(|| PriceLevel::with_order(price, size));
        }
    }

    fn execute_level(ladder: &mut BTreeMap<Price, PriceLevel>, price: Price, size: u64) {
        if let Some(level) = ladder.get_mut(&price) {
            if level.size > size {
                level.size -= size;
            } else {
                ladder.remove(&price);
            }
        }
    }

    fn bump(&mut self, ts: u64) {
        self.last_update_ts = ts;
        self.message_count += 1;
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.last_key_value().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    pub fn best_bid_size(&self) -> Option<u64> {
        self.bids.last_key_value().map(|(_, l)| l.size)
    }

    pub fn best_ask_size(&self) -> Option<u64> {
        self.asks.first_key_value().map(|(_, l)| l.size)
    }

    pub fn spread(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (ask - bid).to_f64(),
            _ => 0.0,
        }
    }

    /// Top-of-book size imbalance; aggregates have no side totals to lean
    /// on, so the top is what the venue gives us.
    pub fn imbalance(&self) -> f64 {
        match (self.best_bid_size(), self.best_ask_size()) {
            (Some(bid), Some(ask)) => {
                let total = (bid + ask) as f64;
                if total == 0.0 {
                    0.0
                } else {
                    (bid as f64 - ask as f64) / total
                }
            }
            _ => 0.0,
        }
    }

    pub fn has_crossing(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            symbol: self.symbol,
            timestamp: self.last_update_ts,
            best_bid: self.best_bid().unwrap_or(Price::ZERO),
            best_bid_size: self.best_bid_size().unwrap_or(0),
            best_ask: self.best_ask().unwrap_or(Price::ZERO),
            best_ask_size: self.best_ask_size().unwrap_or(0),
            spread: self.spread(),
            imbalance: self.imbalance(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn last_update_ts(&self) -> u64 {
        self.last_update_ts
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update_ts = 0;
        self.message_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> AggregateBook {
        AggregateBook::new(Symbol::new("AAPL"))
    }

    #[test]
    fn set_and_replace_levels() {
        let mut b = book();
        b.set_bid(Price(1_500_000), 100, 1);
        b.set_bid(Price(1_500_000), 250, 2);

        assert_eq!(b.best_bid(), Some(Price(1_500_000)));
        assert_eq!(b.best_bid_size(), Some(250));
        assert_eq!(b.bid_levels(), 1);
    }

    #[test]
    fn zero_size_removes() {
        let mut b = book();
        b.set_ask(Price(1_500_100), 100, 1);
        b.set_ask(Price(1_500_100), 0, 2);

        assert_eq!(b.best_ask(), None);
        assert_eq!(b.ask_levels(), 0);
        assert_eq!(b.message_count(), 2);
    }

    #[test]
    fn tops_track_ladder_order() {
        let mut b = book();
        b.set_bid(Price(1_499_900), 100, 1);
        b.set_bid(Price(1_500_000), 50, 2);
        b.set_ask(Price(1_500_200), 80, 3);
        b.set_ask(Price(1_500_100), 70, 4);

        assert_eq!(b.best_bid(), Some(Price(1_500_000)));
        assert_eq!(b.best_ask(), Some(Price(1_500_100)));
        assert_eq!(b.spread(), 0.01);
    }

    #[test]
    fn execute_decrements_and_removes() {
        let mut b = book();
        b.set_bid(Price(1_500_000), 100, 1);

        b.execute_bid(Price(1_500_000), 30, 2);
        assert_eq!(b.best_bid_size(), Some(70));

        b.execute_bid(Price(1_500_000), 90, 3);
        assert_eq!(b.best_bid(), None);

        // Unknown price: counted, no state change.
        b.execute_ask(Price(1), 10, 4);
        assert_eq!(b.message_count(), 4);
    }

    #[test]
    fn top_size_imbalance() {
        let mut b = book();
        b.set_bid(Price(1_500_000), 100, 1);
        b.set_ask(Price(1_500_100), 300, 2);

        let expected = (100.0 - 300.0) / 400.0;
        assert!((b.imbalance() - expected).abs() < 1e-12);
    }
}
