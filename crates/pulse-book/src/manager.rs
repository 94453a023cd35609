//! Per-symbol book multiplexing.

use rustc_hash::FxHashMap;

use crate::book::OrderBook;
use crate::symbol::Symbol;

/// Insertion-lazy `symbol → OrderBook` map, owned by the book thread.
pub struct BookManager {
    books: FxHashMap<Symbol, OrderBook>,
    /// Pooled-order capacity handed to each new book.
    orders_per_book: usize,
}

impl BookManager {
    pub fn new() -> Self {
        Self::with_book_capacity(crate::book::DEFAULT_ORDER_CAPACITY)
    }

    pub fn with_book_capacity(orders_per_book: usize) -> Self {
        Self {
            books: FxHashMap::default(),
            orders_per_book,
        }
    }

    /// Sole mutating entry point: the book for `symbol`, created on first
    /// sight.
    pub fn get_or_create(&mut self, symbol: Symbol) -> &mut OrderBook {
        let capacity = self.orders_per_book;
        self.books
            .entry(symbol)
            .or_insert_with(|| OrderBook::with_capacity(symbol, capacity))
    }

    pub fn get(&self, symbol: Symbol) -> Option<&OrderBook> {
        self.books.get(&symbol)
    }

    pub fn get_mut(&mut self, symbol: Symbol) -> Option<&mut OrderBook> {
        self.books.get_mut(&symbol)
    }

    /// Known symbols, sorted for stable iteration.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.books.keys().copied().collect();
        symbols.sort();
        symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &OrderBook)> {
        self.books.iter()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn clear(&mut self) {
        self.books.clear();
    }
}

impl Default for BookManager {
    fn default() -> Self {
        Self::new()
    }
}
