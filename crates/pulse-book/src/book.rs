//! The order-indexed limit order book.
//!
//! Maintains the market-by-order view (an id → order map over pooled
//! storage) and the market-by-price view (two ordered ladders with running
//! side totals) in lockstep. Every mutating operation either applies fully
//! or leaves the book byte-identical, including the message counter and
//! update timestamp, which move only on success.
//!
//! The book is not internally synchronised. All mutation belongs to the
//! book thread; other threads see state through [`Snapshot`] values.

use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::level::PriceLevel;
use crate::order::{Order, OrderId, Side};
use crate::pool::{OrderHandle, OrderPool};
use crate::price::Price;
use crate::snapshot::Snapshot;
use crate::symbol::Symbol;

/// Default pooled-order capacity per book.
pub const DEFAULT_ORDER_CAPACITY: usize = 1 << 16;

/// Why a book operation was refused. The book is unchanged in every case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookError {
    /// `add_order` / `replace_order` target id already rests in the book.
    DuplicateOrderId,
    /// Mutating op referenced an id that is not resting.
    UnknownOrderId,
    /// An add would create an order with zero quantity.
    ZeroQuantity,
    /// The order pool has no free slots.
    PoolExhausted,
    /// Level arithmetic underflowed: upstream corruption. The book refuses
    /// all further mutation until `clear`.
    InvariantViolation,
}

impl fmt::Display for BookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BookError::DuplicateOrderId => "duplicate order id",
            BookError::UnknownOrderId => "unknown order id",
            BookError::ZeroQuantity => "zero quantity",
            BookError::PoolExhausted => "order pool exhausted",
            BookError::InvariantViolation => "book invariant violated",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for BookError {}

/// Order-indexed book for a single symbol.
pub struct OrderBook {
    symbol: Symbol,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    /// Cached ladder ends so top-of-book reads are O(1).
    best_bid: Option<Price>,
    best_ask: Option<Price>,
    orders: FxHashMap<OrderId, OrderHandle>,
    pool: OrderPool,
    total_bid_qty: u64,
    total_ask_qty: u64,
    last_update_ts: u64,
    message_count: u64,
    poisoned: bool,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self::with_capacity(symbol, DEFAULT_ORDER_CAPACITY)
    }

    /// `orders` bounds the number of simultaneously resting orders and must
    /// be a power of two.
    pub fn with_capacity(symbol: Symbol, orders: usize) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            best_bid: None,
            best_ask: None,
            orders: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
            pool: OrderPool::with_capacity(orders),
            total_bid_qty: 0,
            total_ask_qty: 0,
            last_update_ts: 0,
            message_count: 0,
            poisoned: false,
        }
    }

    // --- Mutations ------------------------------------------------------

    /// Rest a new order.
    pub fn add_order(
        &mut self,
        id: OrderId,
        side: Side,
        price: Price,
        qty: u64,
        ts: u64,
    ) -> Result<(), BookError> {
        self.check_poisoned()?;
        if qty == 0 {
            return Err(BookError::ZeroQuantity);
        }
        if self.orders.contains_key(&id) {
            return Err(BookError::DuplicateOrderId);
        }

        let order = Order {
            id,
            symbol: self.symbol,
            side,
            price,
            qty,
            timestamp: ts,
        };
        let handle = self.pool.insert(order).ok_or(BookError::PoolExhausted)?;
        self.orders.insert(id, handle);
        self.add_to_level(side, price, qty);
        self.bump(ts);
        Ok(())
    }

    /// Set an order's quantity; zero removes it.
    pub fn modify_order(&mut self, id: OrderId, new_qty: u64, ts: u64) -> Result<(), BookError> {
        self.check_poisoned()?;
        let handle = *self.orders.get(&id).ok_or(BookError::UnknownOrderId)?;
        let order = *self.pool.get(handle);

        if new_qty == 0 {
            self.remove_resting(id, handle, &order)?;
        } else if new_qty > order.qty {
            self.grow_level(order.side, order.price, new_qty - order.qty)?;
            let resting = self.pool.get_mut(handle);
            resting.qty = new_qty;
            resting.timestamp = ts;
        } else if new_qty < order.qty {
            self.shrink_level(order.side, order.price, order.qty - new_qty, false)?;
            let resting = self.pool.get_mut(handle);
            resting.qty = new_qty;
            resting.timestamp = ts;
        } else {
            self.pool.get_mut(handle).timestamp = ts;
        }

        self.bump(ts);
        Ok(())
    }

    /// Reduce an order by a cancelled quantity; at or past zero it is
    /// removed.
    pub fn cancel_order(&mut self, id: OrderId, cancelled: u64, ts: u64) -> Result<(), BookError> {
        self.reduce_resting(id, cancelled, ts)
    }

    /// Reduce an order by an executed quantity; at or past zero it is
    /// removed.
    pub fn execute_order(&mut self, id: OrderId, executed: u64, ts: u64) -> Result<(), BookError> {
        self.reduce_resting(id, executed, ts)
    }

    /// Remove an order entirely.
    pub fn delete_order(&mut self, id: OrderId, ts: u64) -> Result<(), BookError> {
        self.check_poisoned()?;
        let handle = *self.orders.get(&id).ok_or(BookError::UnknownOrderId)?;
        let order = *self.pool.get(handle);
        self.remove_resting(id, handle, &order)?;
        self.bump(ts);
        Ok(())
    }

    /// Atomically delete `old_id` and add `new_id` on the same side with a
    /// new price and quantity. Fails without touching the book if `old_id`
    /// is unknown, `new_id` collides, or `new_qty` is zero. Replacing an
    /// order with its own id is legal.
    pub fn replace_order(
        &mut self,
        old_id: OrderId,
        new_id: OrderId,
        new_qty: u64,
        new_price: Price,
        ts: u64,
    ) -> Result<(), BookError> {
        self.check_poisoned()?;
        let handle = *self.orders.get(&old_id).ok_or(BookError::UnknownOrderId)?;
        if new_id != old_id && self.orders.contains_key(&new_id) {
            return Err(BookError::DuplicateOrderId);
        }
        if new_qty == 0 {
            return Err(BookError::ZeroQuantity);
        }

        let old = *self.pool.get(handle);
        self.remove_resting(old_id, handle, &old)?;

        let order = Order {
            id: new_id,
            symbol: self.symbol,
            side: old.side,
            price: new_price,
            qty: new_qty,
            timestamp: ts,
        };
        // A slot was just freed, so the pool cannot be exhausted here.
        let new_handle = self.pool.insert(order).ok_or(BookError::PoolExhausted)?;
        self.orders.insert(new_id, new_handle);
        self.add_to_level(old.side, new_price, new_qty);
        self.bump(ts);
        Ok(())
    }

    /// Drop all state, including any poisoning.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.best_bid = None;
        self.best_ask = None;
        self.orders.clear();
        self.pool.clear();
        self.total_bid_qty = 0;
        self.total_ask_qty = 0;
        self.last_update_ts = 0;
        self.message_count = 0;
        self.poisoned = false;
    }

    // --- Top of book and analytics --------------------------------------

    #[inline(always)]
    pub fn best_bid(&self) -> Option<Price> {
        self.best_bid
    }

    #[inline(always)]
    pub fn best_ask(&self) -> Option<Price> {
        self.best_ask
    }

    pub fn best_bid_size(&self) -> Option<u64> {
        self.best_bid.map(|p| self.bids[&p].size)
    }

    pub fn best_ask_size(&self) -> Option<u64> {
        self.best_ask.map(|p| self.asks[&p].size)
    }

    /// Best-ask minus best-bid in display currency; 0 when a side is empty.
    pub fn spread(&self) -> f64 {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => (ask - bid).to_f64(),
            _ => 0.0,
        }
    }

    /// Midpoint in display currency; 0 when a side is empty.
    pub fn mid_price(&self) -> f64 {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => (bid.as_raw() + ask.as_raw()) as f64 / 20_000.0,
            _ => 0.0,
        }
    }

    /// Resting-quantity imbalance in [-1, +1]; 0 when both sides are empty.
    pub fn imbalance(&self) -> f64 {
        let total = self.total_bid_qty + self.total_ask_qty;
        if total == 0 {
            return 0.0;
        }
        (self.total_bid_qty as f64 - self.total_ask_qty as f64) / total as f64
    }

    /// A crossed top (bid ≥ ask) is evidence of gapped or reordered input;
    /// it is reported, never repaired.
    pub fn has_crossing(&self) -> bool {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Best `levels` bid rows, best first.
    pub fn get_bid_depth(&self, levels: usize) -> Vec<PriceLevel> {
        self.bids.values().rev().take(levels).copied().collect()
    }

    /// Best `levels` ask rows, best first.
    pub fn get_ask_depth(&self, levels: usize) -> Vec<PriceLevel> {
        self.asks.values().take(levels).copied().collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            symbol: self.symbol,
            timestamp: self.last_update_ts,
            best_bid: self.best_bid.unwrap_or(Price::ZERO),
            best_bid_size: self.best_bid_size().unwrap_or(0),
            best_ask: self.best_ask.unwrap_or(Price::ZERO),
            best_ask_size: self.best_ask_size().unwrap_or(0),
            spread: self.spread(),
            imbalance: self.imbalance(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }

    // --- Plain accessors -------------------------------------------------

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn total_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn total_bid_qty(&self) -> u64 {
        self.total_bid_qty
    }

    pub fn total_ask_qty(&self) -> u64 {
        self.total_ask_qty
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn last_update_ts(&self) -> u64 {
        self.last_update_ts
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Copy of a resting order, if present.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|&h| *self.pool.get(h))
    }

    // --- Level arithmetic ------------------------------------------------

    fn check_poisoned(&self) -> Result<(), BookError> {
        if self.poisoned {
            Err(BookError::InvariantViolation)
        } else {
            Ok(())
        }
    }

    fn poison(&mut self) -> BookError {
        self.poisoned = true;
        BookError::InvariantViolation
    }

    fn bump(&mut self, ts: u64) {
        self.last_update_ts = ts;
        self.message_count += 1;
    }

    fn ladder_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// New order arrives at a price: level size and count grow, the best
    /// cache is refreshed if the price improves it.
    fn add_to_level(&mut self, side: Side, price: Price, qty: u64) {
        let level = self
            .ladder_mut(side)
            .entry(price)
            .or_insert_with(|| PriceLevel::empty(price));
        level.size += qty;
        level.order_count += 1;

        match side {
            Side::Buy => {
                self.total_bid_qty += qty;
                if self.best_bid.map_or(true, |best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Sell => {
                self.total_ask_qty += qty;
                if self.best_ask.map_or(true, |best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }
    }

    /// An existing order grows in place: size only, never the count.
    fn grow_level(&mut self, side: Side, price: Price, qty: u64) -> Result<(), BookError> {
        match self.ladder_mut(side).get_mut(&price) {
            Some(level) => level.size += qty,
            None => return Err(self.poison()),
        }
        match side {
            Side::Buy => self.total_bid_qty += qty,
            Side::Sell => self.total_ask_qty += qty,
        }
        Ok(())
    }

    /// Take quantity (and, when the order leaves, one count) off a level.
    /// Underflow anywhere is corruption and poisons the book. An emptied
    /// level leaves the ladder and the best cache is recomputed.
    fn shrink_level(
        &mut self,
        side: Side,
        price: Price,
        qty: u64,
        retire_order: bool,
    ) -> Result<(), BookError> {
        let ladder = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };

        let Some(level) = ladder.get_mut(&price) else {
            return Err(self.poison());
        };
        let Some(new_size) = level.size.checked_sub(qty) else {
            return Err(self.poison());
        };
        level.size = new_size;
        if retire_order {
            let Some(new_count) = level.order_count.checked_sub(1) else {
                return Err(self.poison());
            };
            level.order_count = new_count;
        }

        if level.size == 0 || level.order_count == 0 {
            ladder.remove(&price);
            match side {
                Side::Buy if self.best_bid == Some(price) => {
                    self.best_bid = self.bids.last_key_value().map(|(p, _)| *p);
                }
                Side::Sell if self.best_ask == Some(price) => {
                    self.best_ask = self.asks.first_key_value().map(|(p, _)| *p);
                }
                _ => {}
            }
        }

        let total = match side {
            Side::Buy => &mut self.total_bid_qty,
            Side::Sell => &mut self.total_ask_qty,
        };
        match total.checked_sub(qty) {
            Some(v) => *total = v,
            None => return Err(self.poison()),
        }
        Ok(())
    }

    /// Shared body of cancel and execute: decrement in place, remove when
    /// nothing is left.
    fn reduce_resting(&mut self, id: OrderId, qty: u64, ts: u64) -> Result<(), BookError> {
        self.check_poisoned()?;
        let handle = *self.orders.get(&id).ok_or(BookError::UnknownOrderId)?;
        let order = *self.pool.get(handle);

        if qty >= order.qty {
            self.remove_resting(id, handle, &order)?;
        } else {
            self.shrink_level(order.side, order.price, qty, false)?;
            let resting = self.pool.get_mut(handle);
            resting.qty -= qty;
            resting.timestamp = ts;
        }

        self.bump(ts);
        Ok(())
    }

    fn remove_resting(
        &mut self,
        id: OrderId,
        handle: OrderHandle,
        order: &Order,
    ) -> Result<(), BookError> {
        self.shrink_level(order.side, order.price, order.qty, true)?;
        self.orders.remove(&id);
        self.pool.free(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::with_capacity(Symbol::new("AAPL"), 1 << 10)
    }

    /// Full cross-check of both views: side totals equal the per-level sums
    /// equal the per-order sums, counts match, tops match the ladder ends,
    /// and every resting order has positive quantity.
    fn assert_consistent(book: &OrderBook) {
        let mut bid_orders: BTreeMap<Price, (u64, u64)> = BTreeMap::new();
        let mut ask_orders: BTreeMap<Price, (u64, u64)> = BTreeMap::new();

        for (&id, &handle) in &book.orders {
            let order = book.pool.get(handle);
            assert_eq!(order.id, id);
            assert!(order.qty > 0, "resting order with zero qty");
            let slot = match order.side {
                Side::Buy => bid_orders.entry(order.price).or_insert((0, 0)),
                Side::Sell => ask_orders.entry(order.price).or_insert((0, 0)),
            };
            slot.0 += order.qty;
            slot.1 += 1;
        }

        for (ladder, orders, total) in [
            (&book.bids, &bid_orders, book.total_bid_qty),
            (&book.asks, &ask_orders, book.total_ask_qty),
        ] {
            assert_eq!(ladder.len(), orders.len(), "ladder/order level mismatch");
            let mut ladder_total = 0;
            for (price, level) in ladder {
                assert_eq!(level.price, *price, "level price key mismatch");
                assert!(level.order_count > 0, "empty level present");
                assert!(level.size > 0, "zero-size level present");
                let (qty, count) = orders[price];
                assert_eq!(level.size, qty);
                assert_eq!(level.order_count, count);
                ladder_total += level.size;
            }
            assert_eq!(ladder_total, total, "side total mismatch");
        }

        assert_eq!(
            book.best_bid,
            book.bids.last_key_value().map(|(p, _)| *p),
            "stale best bid cache"
        );
        assert_eq!(
            book.best_ask,
            book.asks.first_key_value().map(|(p, _)| *p),
            "stale best ask cache"
        );
        assert_eq!(book.pool.active(), book.orders.len());
    }

    #[test]
    fn add_order_rests() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1000)
            .unwrap();

        assert_eq!(b.best_bid(), Some(Price(1_500_000)));
        assert_eq!(b.best_bid_size(), Some(100));
        assert_eq!(b.total_orders(), 1);
        assert_consistent(&b);
    }

    #[test]
    fn better_bid_takes_top() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Buy, Price(1_500_100), 50, 2)
            .unwrap();

        assert_eq!(b.best_bid(), Some(Price(1_500_100)));
        assert_eq!(b.best_bid_size(), Some(50));
        assert_eq!(b.bid_levels(), 2);
        assert_consistent(&b);
    }

    #[test]
    fn spread_mid_imbalance() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Sell, Price(1_500_100), 200, 2)
            .unwrap();

        assert_eq!(b.spread(), 0.01);
        assert_eq!(b.mid_price(), 150.005);
        let expected = (100.0 - 200.0) / 300.0;
        assert!((b.imbalance() - expected).abs() < 1e-12);
        assert!(!b.has_crossing());
        assert_consistent(&b);
    }

    #[test]
    fn empty_side_analytics_are_zero() {
        let mut b = book();
        assert_eq!(b.spread(), 0.0);
        assert_eq!(b.mid_price(), 0.0);
        assert_eq!(b.imbalance(), 0.0);

        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        assert_eq!(b.spread(), 0.0);
        assert_eq!(b.mid_price(), 0.0);
        assert_eq!(b.imbalance(), 1.0);
    }

    #[test]
    fn duplicate_add_changes_nothing() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1000)
            .unwrap();
        let count = b.message_count();
        let ts = b.last_update_ts();

        assert_eq!(
            b.add_order(OrderId(1), Side::Buy, Price(1_500_100), 200, 1001),
            Err(BookError::DuplicateOrderId)
        );
        assert_eq!(b.message_count(), count);
        assert_eq!(b.last_update_ts(), ts);
        assert_eq!(b.best_bid(), Some(Price(1_500_000)));
        assert_consistent(&b);
    }

    #[test]
    fn unknown_ids_are_refused_without_effect() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        let before = b.snapshot();
        let count = b.message_count();

        assert_eq!(
            b.modify_order(OrderId(9), 50, 2),
            Err(BookError::UnknownOrderId)
        );
        assert_eq!(
            b.cancel_order(OrderId(9), 50, 2),
            Err(BookError::UnknownOrderId)
        );
        assert_eq!(b.delete_order(OrderId(9), 2), Err(BookError::UnknownOrderId));
        assert_eq!(
            b.execute_order(OrderId(9), 50, 2),
            Err(BookError::UnknownOrderId)
        );
        assert_eq!(
            b.replace_order(OrderId(9), OrderId(10), 50, Price(1), 2),
            Err(BookError::UnknownOrderId)
        );

        assert_eq!(b.snapshot(), before);
        assert_eq!(b.message_count(), count);
        assert_consistent(&b);
    }

    #[test]
    fn zero_quantity_add_is_refused() {
        let mut b = book();
        assert_eq!(
            b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 0, 1),
            Err(BookError::ZeroQuantity)
        );
        assert_eq!(b.total_orders(), 0);
        assert_eq!(b.message_count(), 0);
    }

    #[test]
    fn partial_cancel_decrements_in_place() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.cancel_order(OrderId(1), 30, 2).unwrap();

        assert_eq!(b.order(OrderId(1)).unwrap().qty, 70);
        assert_eq!(b.best_bid_size(), Some(70));
        assert_eq!(b.total_bid_qty(), 70);
        assert_consistent(&b);
    }

    #[test]
    fn full_cancel_removes_order_and_level() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.cancel_order(OrderId(1), 100, 2).unwrap();

        assert_eq!(b.best_bid(), None);
        assert_eq!(b.total_orders(), 0);
        assert_consistent(&b);
    }

    #[test]
    fn over_cancel_clamps_to_removal() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.cancel_order(OrderId(1), 250, 2).unwrap();

        assert_eq!(b.total_orders(), 0);
        assert_eq!(b.total_bid_qty(), 0);
        assert_consistent(&b);
    }

    #[test]
    fn execute_to_zero_empties_book() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.execute_order(OrderId(1), 100, 2).unwrap();

        assert_eq!(b.total_orders(), 0);
        assert_eq!(b.total_bid_qty(), 0);
        assert_eq!(b.bid_levels(), 0);
        assert_eq!(b.best_bid(), None);
        assert_consistent(&b);
    }

    #[test]
    fn partial_execute() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.execute_order(OrderId(1), 40, 2).unwrap();
        assert_eq!(b.best_bid_size(), Some(60));

        b.execute_order(OrderId(1), 60, 3).unwrap();
        assert_eq!(b.best_bid(), None);
        assert_consistent(&b);
    }

    #[test]
    fn modify_up_down_and_to_zero() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();

        b.modify_order(OrderId(1), 200, 2).unwrap();
        assert_eq!(b.best_bid_size(), Some(200));
        assert_eq!(b.total_bid_qty(), 200);
        assert_consistent(&b);

        b.modify_order(OrderId(1), 50, 3).unwrap();
        assert_eq!(b.best_bid_size(), Some(50));
        assert_consistent(&b);

        b.modify_order(OrderId(1), 0, 4).unwrap();
        assert_eq!(b.total_orders(), 0);
        assert_eq!(b.best_bid(), None);
        assert_consistent(&b);
    }

    #[test]
    fn shared_level_bookkeeping() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Buy, Price(1_500_000), 200, 2)
            .unwrap();

        assert_eq!(b.best_bid_size(), Some(300));
        assert_eq!(b.bid_levels(), 1);

        b.delete_order(OrderId(1), 3).unwrap();
        assert_eq!(b.best_bid_size(), Some(200));
        assert_eq!(b.bid_levels(), 1);
        assert_consistent(&b);
    }

    #[test]
    fn best_recomputes_after_top_removal() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Buy, Price(1_500_100), 50, 2)
            .unwrap();
        b.add_order(OrderId(3), Side::Sell, Price(1_500_300), 70, 3)
            .unwrap();
        b.add_order(OrderId(4), Side::Sell, Price(1_500_200), 60, 4)
            .unwrap();

        b.delete_order(OrderId(2), 5).unwrap();
        assert_eq!(b.best_bid(), Some(Price(1_500_000)));
        b.delete_order(OrderId(4), 6).unwrap();
        assert_eq!(b.best_ask(), Some(Price(1_500_300)));
        assert_consistent(&b);
    }

    #[test]
    fn replace_moves_the_order() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.replace_order(OrderId(1), OrderId(2), 150, Price(1_500_100), 2)
            .unwrap();

        assert_eq!(b.total_orders(), 1);
        assert_eq!(b.order(OrderId(1)), None);
        let new = b.order(OrderId(2)).unwrap();
        assert_eq!(new.qty, 150);
        assert_eq!(new.price, Price(1_500_100));
        assert_eq!(new.side, Side::Buy);
        assert_eq!(b.best_bid(), Some(Price(1_500_100)));
        assert_consistent(&b);
    }

    #[test]
    fn replace_collision_is_atomic() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Buy, Price(1_499_900), 50, 2)
            .unwrap();
        let before = b.snapshot();
        let count = b.message_count();

        assert_eq!(
            b.replace_order(OrderId(1), OrderId(2), 80, Price(1_500_100), 3),
            Err(BookError::DuplicateOrderId)
        );

        // Nothing moved: id 1 still rests untouched at the old top.
        assert_eq!(b.best_bid(), Some(Price(1_500_000)));
        assert_eq!(b.order(OrderId(1)).unwrap().qty, 100);
        assert_eq!(b.snapshot(), before);
        assert_eq!(b.message_count(), count);
        assert_consistent(&b);
    }

    #[test]
    fn replace_onto_own_id_is_legal() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Sell, Price(1_500_000), 100, 1)
            .unwrap();
        b.replace_order(OrderId(1), OrderId(1), 40, Price(1_499_900), 2)
            .unwrap();

        let order = b.order(OrderId(1)).unwrap();
        assert_eq!(order.qty, 40);
        assert_eq!(order.price, Price(1_499_900));
        assert_eq!(b.total_orders(), 1);
        assert_consistent(&b);
    }

    #[test]
    fn replace_matches_delete_then_add() {
        let mut replaced = book();
        replaced
            .add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        replaced
            .replace_order(OrderId(1), OrderId(2), 80, Price(1_500_100), 2)
            .unwrap();

        let mut manual = book();
        manual
            .add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        manual.delete_order(OrderId(1), 2).unwrap();
        manual
            .add_order(OrderId(2), Side::Buy, Price(1_500_100), 80, 2)
            .unwrap();

        assert_eq!(replaced.snapshot().best_bid, manual.snapshot().best_bid);
        assert_eq!(replaced.total_bid_qty(), manual.total_bid_qty());
        assert_eq!(replaced.get_bid_depth(10), manual.get_bid_depth(10));
        assert_eq!(replaced.order(OrderId(2)), manual.order(OrderId(2)));
    }

    #[test]
    fn add_then_delete_restores_prior_state() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        let before = b.snapshot();

        b.add_order(OrderId(2), Side::Buy, Price(1_500_100), 50, 2)
            .unwrap();
        b.delete_order(OrderId(2), 3).unwrap();

        let after = b.snapshot();
        // Identical apart from the timestamp carried by the snapshot.
        assert_eq!(after.best_bid, before.best_bid);
        assert_eq!(after.best_bid_size, before.best_bid_size);
        assert_eq!(after.bid_levels, before.bid_levels);
        assert_eq!(b.total_bid_qty(), 100);
        assert_eq!(b.total_orders(), 1);
        assert_consistent(&b);
    }

    #[test]
    fn depth_is_ladder_ordered() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Buy, Price(1_499_900), 200, 2)
            .unwrap();
        b.add_order(OrderId(3), Side::Buy, Price(1_499_800), 150, 3)
            .unwrap();
        b.add_order(OrderId(4), Side::Sell, Price(1_500_100), 70, 4)
            .unwrap();
        b.add_order(OrderId(5), Side::Sell, Price(1_500_200), 80, 5)
            .unwrap();

        let bids = b.get_bid_depth(2);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, Price(1_500_000));
        assert_eq!(bids[1].price, Price(1_499_900));

        let asks = b.get_ask_depth(10);
        assert_eq!(asks.len(), 2);
        assert_eq!(asks[0].price, Price(1_500_100));
        assert_eq!(asks[1].price, Price(1_500_200));
    }

    #[test]
    fn crossing_is_reported() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_100), 100, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Sell, Price(1_500_000), 100, 2)
            .unwrap();
        assert!(b.has_crossing());
    }

    #[test]
    fn pool_exhaustion_refuses_cleanly() {
        let mut b = OrderBook::with_capacity(Symbol::new("AAPL"), 2);
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 1, 1)
            .unwrap();
        b.add_order(OrderId(2), Side::Buy, Price(1_500_001), 1, 2)
            .unwrap();

        assert_eq!(
            b.add_order(OrderId(3), Side::Buy, Price(1_500_002), 1, 3),
            Err(BookError::PoolExhausted)
        );
        assert_eq!(b.total_orders(), 2);
        assert_consistent(&b);

        // Freeing a slot makes the add work again.
        b.delete_order(OrderId(1), 4).unwrap();
        b.add_order(OrderId(3), Side::Buy, Price(1_500_002), 1, 5)
            .unwrap();
        assert_consistent(&b);
    }

    #[test]
    fn corruption_poisons_the_book() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();

        // Simulate upstream corruption: the ladder lost size the id-map
        // still believes in.
        b.bids.get_mut(&Price(1_500_000)).unwrap().size = 10;

        assert_eq!(
            b.cancel_order(OrderId(1), 50, 2),
            Err(BookError::InvariantViolation)
        );
        assert!(b.is_poisoned());

        // Every further mutation is refused until clear().
        assert_eq!(
            b.add_order(OrderId(7), Side::Sell, Price(1_600_000), 5, 3),
            Err(BookError::InvariantViolation)
        );

        b.clear();
        assert!(!b.is_poisoned());
        b.add_order(OrderId(7), Side::Sell, Price(1_600_000), 5, 4)
            .unwrap();
        assert_consistent(&b);
    }

    #[test]
    fn id_reuse_after_removal() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 1)
            .unwrap();
        b.delete_order(OrderId(1), 2).unwrap();
        b.add_order(OrderId(1), Side::Sell, Price(1_600_000), 30, 3)
            .unwrap();

        assert_eq!(b.order(OrderId(1)).unwrap().side, Side::Sell);
        assert_consistent(&b);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut b = book();
        b.add_order(OrderId(1), Side::Buy, Price(1_500_000), 100, 10)
            .unwrap();
        b.add_order(OrderId(2), Side::Sell, Price(1_500_100), 200, 11)
            .unwrap();

        let snap = b.snapshot();
        assert_eq!(snap.symbol, Symbol::new("AAPL"));
        assert_eq!(snap.timestamp, 11);
        assert_eq!(snap.best_bid, Price(1_500_000));
        assert_eq!(snap.best_bid_size, 100);
        assert_eq!(snap.best_ask, Price(1_500_100));
        assert_eq!(snap.best_ask_size, 200);
        assert_eq!(snap.bid_levels, 1);
        assert_eq!(snap.ask_levels, 1);
    }
}
