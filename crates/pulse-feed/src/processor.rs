//! Record application and routing.
//!
//! One processor owns one consumer thread's worth of state: the per-symbol
//! order books, the aggregate quote books for the MBP feed, and the
//! `stock_locate → symbol` table that routes id-only MBO messages. Nothing
//! here blocks and nothing is retried; refusals become counters.

use rustc_hash::FxHashMap;
use tracing::{error, warn};

use pulse_book::{AggregateBook, BookError, BookManager, OrderId, Price, Side, Symbol};
use pulse_proto::{mbo, mbp, DecodeError, MboDecoder, MbpDecoder, Record};
use pulse_tape::TickRecorder;

pub struct FeedProcessor {
    books: BookManager,
    quotes: FxHashMap<Symbol, AggregateBook>,
    locates: FxHashMap<u16, Symbol>,
    stats: crate::FeedStats,
    tape: Option<TickRecorder>,
}

impl FeedProcessor {
    pub fn new() -> Self {
        Self {
            books: BookManager::new(),
            quotes: FxHashMap::default(),
            locates: FxHashMap::default(),
            stats: crate::FeedStats::default(),
            tape: None,
        }
    }

    pub fn with_book_capacity(orders_per_book: usize) -> Self {
        Self {
            books: BookManager::with_book_capacity(orders_per_book),
            ..Self::new()
        }
    }

    /// Forward trade prints and quotes to a tick tape.
    pub fn attach_tape(&mut self, tape: TickRecorder) {
        self.tape = Some(tape);
    }

    /// Detach the tape, e.g. to flush and close it at end of session.
    pub fn take_tape(&mut self) -> Option<TickRecorder> {
        self.tape.take()
    }

    /// Apply one decoded record to the owned state.
    pub fn apply(&mut self, record: &Record) {
        self.stats.records_decoded += 1;

        match record {
            Record::AddOrder(m) => self.apply_add(m),
            Record::AddOrderAttributed(m) => self.apply_add(&m.order),
            Record::Executed(m) => {
                if let Some(symbol) = self.resolve_locate(m.stock_locate) {
                    let result = self.books.get_or_create(symbol).execute_order(
                        OrderId(m.order_ref),
                        u64::from(m.shares),
                        m.timestamp,
                    );
                    self.finish_book_op(symbol, result);
                }
            }
            Record::ExecutedWithPrice(m) => {
                // The execution price affects the trade tape, not the
                // resting order's level.
                let e = &m.executed;
                if let Some(symbol) = self.resolve_locate(e.stock_locate) {
                    let result = self.books.get_or_create(symbol).execute_order(
                        OrderId(e.order_ref),
                        u64::from(e.shares),
                        e.timestamp,
                    );
                    self.finish_book_op(symbol, result);
                    self.record_trade(
                        e.timestamp,
                        symbol,
                        i64::from(m.price),
                        u64::from(e.shares),
                        pulse_tape::TickRecord::SIDE_BID,
                    );
                }
            }
            Record::Cancel(m) => {
                if let Some(symbol) = self.resolve_locate(m.stock_locate) {
                    let result = self.books.get_or_create(symbol).cancel_order(
                        OrderId(m.order_ref),
                        u64::from(m.cancelled),
                        m.timestamp,
                    );
                    self.finish_book_op(symbol, result);
                }
            }
            Record::Delete(m) => {
                if let Some(symbol) = self.resolve_locate(m.stock_locate) {
                    let result = self
                        .books
                        .get_or_create(symbol)
                        .delete_order(OrderId(m.order_ref), m.timestamp);
                    self.finish_book_op(symbol, result);
                }
            }
            Record::Replace(m) => {
                if let Some(symbol) = self.resolve_locate(m.stock_locate) {
                    let result = self.books.get_or_create(symbol).replace_order(
                        OrderId(m.old_ref),
                        OrderId(m.new_ref),
                        u64::from(m.shares),
                        Price(i64::from(m.price)),
                        m.timestamp,
                    );
                    self.finish_book_op(symbol, result);
                }
            }
            Record::Trade(m) => {
                let symbol = Symbol::from_raw(m.stock);
                self.locates.insert(m.stock_locate, symbol);
                self.stats.records_informational += 1;
                let side = if m.side == b'S' {
                    pulse_tape::TickRecord::SIDE_ASK
                } else {
                    pulse_tape::TickRecord::SIDE_BID
                };
                self.record_trade(
                    m.timestamp,
                    symbol,
                    i64::from(m.price),
                    u64::from(m.shares),
                    side,
                );
            }
            Record::Directory(m) => {
                self.locates.insert(m.stock_locate, Symbol::from_raw(m.stock));
                self.stats.records_informational += 1;
            }

            Record::QuoteUpdate(m) => self.apply_quote(m),
            Record::PriceLevelUpdate(m) => self.apply_level_update(m),
            Record::TradeReport(m) => {
                self.stats.records_informational += 1;
                self.record_trade(
                    m.timestamp,
                    Symbol::from_raw(m.symbol),
                    m.price,
                    u64::from(m.size),
                    pulse_tape::TickRecord::SIDE_BID,
                );
            }

            Record::SystemEvent(_)
            | Record::MbpSystemEvent(_)
            | Record::SecurityDirectory(_)
            | Record::TradingStatus(_)
            | Record::AuctionInfo(_)
            | Record::TradeBreak(_) => {
                self.stats.records_informational += 1;
            }
        }
    }

    /// Count one decode violation (single-threaded decode path).
    pub fn on_decode_error(&mut self, err: DecodeError) {
        match err {
            DecodeError::Truncated => self.stats.decode_truncated += 1,
            DecodeError::MalformedFrame { tag, declared } => {
                self.stats.decode_malformed += 1;
                warn!(tag, declared, "malformed frame skipped");
            }
            DecodeError::UnknownType { .. } => self.stats.decode_unknown_type += 1,
        }
    }

    /// Merge decode errors counted on the producer thread.
    pub fn absorb_decode_tally(&mut self, tally: crate::DecodeTally) {
        self.stats.absorb_decode_tally(tally);
    }

    /// Decode and apply a complete MBO byte region on the calling thread.
    /// Returns the number of records decoded.
    pub fn process_mbo_bytes(&mut self, bytes: &[u8]) -> u64 {
        let mut decoder = MboDecoder::new(bytes);
        let mut decoded = 0;
        while let Some(result) = decoder.parse_next() {
            match result {
                Ok(record) => {
                    self.apply(&record);
                    decoded += 1;
                }
                Err(err @ DecodeError::Truncated) => {
                    self.on_decode_error(err);
                    break;
                }
                Err(err) => self.on_decode_error(err),
            }
        }
        decoded
    }

    /// Decode and apply a complete MBP byte region on the calling thread.
    pub fn process_mbp_bytes(&mut self, bytes: &[u8]) -> u64 {
        let mut decoder = MbpDecoder::new(bytes);
        let mut decoded = 0;
        while let Some(result) = decoder.parse_next() {
            match result {
                Ok(record) => {
                    self.apply(&record);
                    decoded += 1;
                }
                Err(err @ DecodeError::Truncated) => {
                    self.on_decode_error(err);
                    break;
                }
                Err(err) => self.on_decode_error(err),
            }
        }
        decoded
    }

    pub fn books(&self) -> &BookManager {
        &self.books
    }

    pub fn books_mut(&mut self) -> &mut BookManager {
        &mut self.books
    }

    /// Aggregate book built from MBP quotes and level updates.
    pub fn quote_book(&self, symbol: Symbol) -> Option<&AggregateBook> {
        self.quotes.get(&symbol)
    }

    pub fn stats(&self) -> &crate::FeedStats {
        &self.stats
    }

    // --- Internals -------------------------------------------------------

    fn apply_add(&mut self, m: &mbo::AddOrder) {
        let symbol = Symbol::from_raw(m.stock);
        self.locates.insert(m.stock_locate, symbol);

        // The decoder enforces strict sides; anything else cannot reach a
        // book operation.
        let Some(side) = Side::from_wire(m.side) else {
            self.stats.book_rejected += 1;
            return;
        };

        let result = self.books.get_or_create(symbol).add_order(
            OrderId(m.order_ref),
            side,
            Price(i64::from(m.price)),
            u64::from(m.shares),
            m.timestamp,
        );
        self.finish_book_op(symbol, result);
    }

    fn apply_quote(&mut self, m: &mbp::QuoteUpdate) {
        let symbol = Symbol::from_raw(m.symbol);
        let book = self
            .quotes
            .entry(symbol)
            .or_insert_with(|| AggregateBook::new(symbol));
        book.set_bid(Price(m.bid_price), u64::from(m.bid_size), m.timestamp);
        book.set_ask(Price(m.ask_price), u64::from(m.ask_size), m.timestamp);
        let crossed = book.has_crossing();

        self.stats.records_applied += 1;
        if crossed {
            self.stats.crossed_observations += 1;
            warn!(symbol = %symbol, "crossed quote top");
        }

        if let Some(tape) = &mut self.tape {
            let write = tape.record_quote(
                m.timestamp,
                *symbol.as_raw(),
                m.bid_price,
                u64::from(m.bid_size),
                m.ask_price,
                u64::from(m.ask_size),
            );
            if write.is_err() {
                self.stats.tape_errors += 1;
            }
        }
    }

    fn apply_level_update(&mut self, m: &mbp::PriceLevelUpdate) {
        let symbol = Symbol::from_raw(m.symbol);
        let book = self
            .quotes
            .entry(symbol)
            .or_insert_with(|| AggregateBook::new(symbol));
        if m.is_ask() {
            book.set_ask(Price(m.price), m.size, m.timestamp);
        } else {
            book.set_bid(Price(m.price), m.size, m.timestamp);
        }
        let crossed = book.has_crossing();

        self.stats.records_applied += 1;
        if crossed {
            self.stats.crossed_observations += 1;
            warn!(symbol = %symbol, "crossed aggregate top");
        }
    }

    fn resolve_locate(&mut self, locate: u16) -> Option<Symbol> {
        match self.locates.get(&locate) {
            Some(symbol) => Some(*symbol),
            None => {
                self.stats.unknown_locate += 1;
                None
            }
        }
    }

    fn finish_book_op(&mut self, symbol: Symbol, result: Result<(), BookError>) {
        match result {
            Ok(()) => {
                self.stats.records_applied += 1;
                if let Some(book) = self.books.get(symbol) {
                    if book.has_crossing() {
                        self.stats.crossed_observations += 1;
                        warn!(symbol = %symbol, "crossed book top");
                    }
                }
            }
            Err(BookError::DuplicateOrderId) => self.stats.book_duplicate_id += 1,
            Err(BookError::UnknownOrderId) => self.stats.book_unknown_id += 1,
            Err(BookError::ZeroQuantity | BookError::PoolExhausted) => {
                self.stats.book_rejected += 1
            }
            Err(BookError::InvariantViolation) => {
                self.stats.book_poisoned += 1;
                error!(symbol = %symbol, "book refused operation after invariant violation");
            }
        }
    }

    fn record_trade(&mut self, ts: u64, symbol: Symbol, price: i64, size: u64, side: u8) {
        if let Some(tape) = &mut self.tape {
            if tape
                .record_trade(ts, *symbol.as_raw(), price, size, side)
                .is_err()
            {
                self.stats.tape_errors += 1;
            }
        }
    }
}

impl Default for FeedProcessor {
    fn default() -> Self {
        Self::new()
    }
}
