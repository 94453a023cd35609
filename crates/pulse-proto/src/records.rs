//! The tagged record type shared by both feed decoders.
//!
//! `Record` is a closed sum of every message either feed can produce. The
//! decoders dispatch on the wire type byte and build exactly one variant;
//! downstream consumers match on the variant, never on raw bytes.

use alloc::string::String;
use core::fmt;

use crate::{mbo, mbp};

/// One decoded wire message from either feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Record {
    // MBO feed (big-endian, length-prefixed)
    SystemEvent(mbo::SystemEvent),
    Directory(mbo::Directory),
    AddOrder(mbo::AddOrder),
    AddOrderAttributed(mbo::AddOrderAttributed),
    Executed(mbo::Executed),
    ExecutedWithPrice(mbo::ExecutedWithPrice),
    Cancel(mbo::Cancel),
    Delete(mbo::Delete),
    Replace(mbo::Replace),
    Trade(mbo::Trade),

    // MBP feed (little-endian, typed header)
    QuoteUpdate(mbp::QuoteUpdate),
    TradeReport(mbp::TradeReport),
    TradeBreak(mbp::TradeBreak),
    PriceLevelUpdate(mbp::PriceLevelUpdate),
    MbpSystemEvent(mbp::SystemEvent),
    SecurityDirectory(mbp::SecurityDirectory),
    TradingStatus(mbp::TradingStatus),
    AuctionInfo(mbp::AuctionInfo),
}

impl Record {
    /// Exchange timestamp carried by the message.
    pub fn timestamp(&self) -> u64 {
        match self {
            Record::SystemEvent(m) => m.timestamp,
            Record::Directory(m) => m.timestamp,
            Record::AddOrder(m) => m.timestamp,
            Record::AddOrderAttributed(m) => m.order.timestamp,
            Record::Executed(m) => m.timestamp,
            Record::ExecutedWithPrice(m) => m.executed.timestamp,
            Record::Cancel(m) => m.timestamp,
            Record::Delete(m) => m.timestamp,
            Record::Replace(m) => m.timestamp,
            Record::Trade(m) => m.timestamp,
            Record::QuoteUpdate(m) => m.timestamp,
            Record::TradeReport(m) => m.timestamp,
            Record::TradeBreak(m) => m.timestamp,
            Record::PriceLevelUpdate(m) => m.timestamp,
            Record::MbpSystemEvent(m) => m.timestamp,
            Record::SecurityDirectory(m) => m.timestamp,
            Record::TradingStatus(m) => m.timestamp,
            Record::AuctionInfo(m) => m.timestamp,
        }
    }

    /// Symbol field, for messages that carry one on the wire.
    ///
    /// Id-only MBO messages (execute / cancel / delete / replace) return
    /// `None`; they are routed through the locate table instead.
    pub fn symbol(&self) -> Option<&[u8; 8]> {
        match self {
            Record::Directory(m) => Some(&m.stock),
            Record::AddOrder(m) => Some(&m.stock),
            Record::AddOrderAttributed(m) => Some(&m.order.stock),
            Record::Trade(m) => Some(&m.stock),
            Record::QuoteUpdate(m) => Some(&m.symbol),
            Record::TradeReport(m) => Some(&m.symbol),
            Record::TradeBreak(m) => Some(&m.symbol),
            Record::PriceLevelUpdate(m) => Some(&m.symbol),
            Record::SecurityDirectory(m) => Some(&m.symbol),
            Record::TradingStatus(m) => Some(&m.symbol),
            Record::AuctionInfo(m) => Some(&m.symbol),
            _ => None,
        }
    }
}

/// A wire-format violation surfaced by a decoder.
///
/// Nothing is retried internally; each violation is reported exactly once
/// per `parse_next` call and the cursor advances as documented on the
/// decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// A declared frame extends past the end of the buffer. The cursor does
    /// not advance; the caller re-presents the region with more bytes.
    Truncated,
    /// The declared frame length disagrees with the fixed layout of the
    /// type (or a required field is out of its domain). The cursor advances
    /// past the declared frame.
    MalformedFrame { tag: u8, declared: u16 },
    /// The type byte is not one this decoder recognises. The cursor
    /// advances past the frame (MBO) or the header (MBP).
    UnknownType { tag: u8 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "frame truncated at end of buffer"),
            DecodeError::MalformedFrame { tag, declared } => {
                write!(f, "malformed frame: tag {tag:#04x}, declared length {declared}")
            }
            DecodeError::UnknownType { tag } => write!(f, "unknown message type {tag:#04x}"),
        }
    }
}

/// Strip trailing ASCII-space and NUL padding from an 8-byte symbol field.
/// Internal spaces are preserved.
pub fn trim_symbol(raw: &[u8; 8]) -> &[u8] {
    let mut end = raw.len();
    while end > 0 && (raw[end - 1] == b' ' || raw[end - 1] == 0) {
        end -= 1;
    }
    &raw[..end]
}

/// Lossy symbol conversion: non-ASCII bytes become U+FFFD rather than an
/// error.
pub fn symbol_to_string(raw: &[u8; 8]) -> String {
    String::from_utf8_lossy(trim_symbol(raw)).into_owned()
}

/// Fixed-point price scale: 10^-4 currency units per tick.
pub const PRICE_SCALE: f64 = 10_000.0;

/// Convert a 4-byte MBO wire price to a display price.
pub fn price4_to_f64(price: u32) -> f64 {
    price as f64 / PRICE_SCALE
}

/// Convert an 8-byte MBP wire price to a display price.
pub fn price8_to_f64(price: i64) -> f64 {
    price as f64 / PRICE_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_trims_trailing_padding() {
        assert_eq!(trim_symbol(b"AAPL    "), b"AAPL");
        assert_eq!(trim_symbol(b"MSFT\0\0\0\0"), b"MSFT");
        assert_eq!(trim_symbol(b"BRK B   "), b"BRK B");
        assert_eq!(trim_symbol(b"        "), b"");
    }

    #[test]
    fn invalid_ascii_is_replaced_not_rejected() {
        let raw = [b'A', 0xFF, b'C', b' ', b' ', b' ', b' ', b' '];
        assert_eq!(symbol_to_string(&raw), "A\u{fffd}C");
    }

    #[test]
    fn price_conversion() {
        assert_eq!(price4_to_f64(1_500_000), 150.0);
        assert_eq!(price8_to_f64(1_500_050), 150.005);
        assert_eq!(price8_to_f64(-10_000), -1.0);
    }

    #[test]
    fn record_accessors() {
        let add = Record::AddOrder(mbo::AddOrder {
            stock_locate: 1,
            tracking: 0,
            timestamp: 77,
            order_ref: 5,
            side: b'B',
            shares: 100,
            stock: *b"AAPL    ",
            price: 1_500_000,
        });
        assert_eq!(add.timestamp(), 77);
        assert_eq!(add.symbol(), Some(b"AAPL    "));

        let delete = Record::Delete(mbo::Delete {
            stock_locate: 1,
            tracking: 0,
            timestamp: 78,
            order_ref: 5,
        });
        assert_eq!(delete.timestamp(), 78);
        // Id-only messages carry no symbol on the wire.
        assert_eq!(delete.symbol(), None);

        let quote = Record::QuoteUpdate(mbp::QuoteUpdate {
            timestamp: 79,
            symbol: *b"MSFT    ",
            ..mbp::QuoteUpdate::default()
        });
        assert_eq!(quote.timestamp(), 79);
        assert_eq!(quote.symbol(), Some(b"MSFT    "));
    }
}
