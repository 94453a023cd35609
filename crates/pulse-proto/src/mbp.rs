//! MBP feed: little-endian, typed-header, per-price aggregate messages.
//!
//! Every message starts with a 9-byte header (1-byte type tag, 8-byte
//! little-endian timestamp); the total size is implied by the tag. Prices
//! are signed 8-byte fixed-point. Fields are read with explicit
//! little-endian conversions so the decoder is correct on any host.

use crate::records::{DecodeError, Record};
use crate::wire::{Reader, Writer};

/// Message type tags.
pub mod tag {
    pub const SYSTEM_EVENT: u8 = 0x53;
    pub const SECURITY_DIRECTORY: u8 = 0x44;
    pub const TRADING_STATUS: u8 = 0x48;
    pub const QUOTE_UPDATE: u8 = 0x51;
    pub const TRADE_REPORT: u8 = 0x54;
    pub const TRADE_BREAK: u8 = 0x42;
    pub const PRICE_LEVEL_UPDATE: u8 = 0x38;
    pub const AUCTION_INFO: u8 = 0x41;
}

/// Total message sizes, header included.
pub mod len {
    pub const SYSTEM_EVENT: usize = 14;
    pub const SECURITY_DIRECTORY: usize = 31;
    pub const TRADING_STATUS: usize = 22;
    pub const QUOTE_UPDATE: usize = 42;
    pub const TRADE_REPORT: usize = 38;
    pub const TRADE_BREAK: usize = 38;
    pub const PRICE_LEVEL_UPDATE: usize = 34;
    pub const AUCTION_INFO: usize = 43;
}

/// Header: type tag plus timestamp.
pub const HEADER_LEN: usize = 9;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemEvent {
    pub timestamp: u64,
    pub event: u8,
    pub session: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SecurityDirectory {
    pub timestamp: u64,
    pub flags: u8,
    pub symbol: [u8; 8],
    pub round_lot: u32,
    pub adjusted_close: i64,
    pub luld_tier: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TradingStatus {
    pub timestamp: u64,
    pub status: u8,
    pub symbol: [u8; 8],
    pub reason: [u8; 4],
}

/// Top-of-book update for one symbol, both sides at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuoteUpdate {
    pub timestamp: u64,
    pub flags: u8,
    pub symbol: [u8; 8],
    pub bid_size: u32,
    pub bid_price: i64,
    pub ask_size: u32,
    pub ask_price: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TradeReport {
    pub timestamp: u64,
    pub flags: u8,
    pub symbol: [u8; 8],
    pub size: u32,
    pub price: i64,
    pub trade_id: u64,
}

/// Retraction of an earlier trade report. Same layout, its own tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TradeBreak {
    pub timestamp: u64,
    pub flags: u8,
    pub symbol: [u8; 8],
    pub size: u32,
    pub price: i64,
    pub trade_id: u64,
}

/// Absolute aggregate size at one price on one side; size zero removes the
/// level. Bit 0 of `flags` set means ask side, clear means bid side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriceLevelUpdate {
    pub timestamp: u64,
    pub flags: u8,
    pub symbol: [u8; 8],
    pub size: u64,
    pub price: i64,
}

impl PriceLevelUpdate {
    pub const FLAG_ASK: u8 = 0x01;

    pub fn is_ask(&self) -> bool {
        self.flags & Self::FLAG_ASK != 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuctionInfo {
    pub timestamp: u64,
    pub auction_type: u8,
    pub symbol: [u8; 8],
    pub paired_qty: u32,
    pub reference_price: i64,
    pub indicative_price: i64,
    pub imbalance_qty: u32,
    pub imbalance_side: u8,
}

/// Streaming decoder for the MBP feed.
pub struct MbpDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MbpDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Decode the next message.
    ///
    /// Returns `None` once fewer bytes remain than the 9-byte header.
    /// `Err(Truncated)` means the typed payload runs past the buffer; the
    /// cursor has not moved. An unknown tag consumes only the header.
    pub fn parse_next(&mut self) -> Option<Result<Record, DecodeError>> {
        if self.buf.len() - self.pos < HEADER_LEN {
            return None;
        }

        let tag = self.buf[self.pos];
        let size = match message_len(tag) {
            Some(size) => size,
            None => {
                self.pos += HEADER_LEN;
                return Some(Err(DecodeError::UnknownType { tag }));
            }
        };

        if self.buf.len() - self.pos < size {
            return Some(Err(DecodeError::Truncated));
        }

        let frame = &self.buf[self.pos..self.pos + size];
        self.pos += size;
        Some(Ok(decode_frame(tag, frame)))
    }

    pub fn has_more(&self) -> bool {
        self.pos < self.buf.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

fn message_len(tag: u8) -> Option<usize> {
    match tag {
        tag::SYSTEM_EVENT => Some(len::SYSTEM_EVENT),
        tag::SECURITY_DIRECTORY => Some(len::SECURITY_DIRECTORY),
        tag::TRADING_STATUS => Some(len::TRADING_STATUS),
        tag::QUOTE_UPDATE => Some(len::QUOTE_UPDATE),
        tag::TRADE_REPORT => Some(len::TRADE_REPORT),
        tag::TRADE_BREAK => Some(len::TRADE_BREAK),
        tag::PRICE_LEVEL_UPDATE => Some(len::PRICE_LEVEL_UPDATE),
        tag::AUCTION_INFO => Some(len::AUCTION_INFO),
        _ => None,
    }
}

fn decode_frame(tag: u8, frame: &[u8]) -> Record {
    let mut r = Reader::new(frame);
    r.skip(1);
    let timestamp = r.u64_le();

    match tag {
        tag::SYSTEM_EVENT => Record::MbpSystemEvent(SystemEvent {
            timestamp,
            event: r.u8(),
            session: r.u32_le(),
        }),
        tag::SECURITY_DIRECTORY => Record::SecurityDirectory(SecurityDirectory {
            timestamp,
            flags: r.u8(),
            symbol: r.bytes(),
            round_lot: r.u32_le(),
            adjusted_close: r.i64_le(),
            luld_tier: r.u8(),
        }),
        tag::TRADING_STATUS => Record::TradingStatus(TradingStatus {
            timestamp,
            status: r.u8(),
            symbol: r.bytes(),
            reason: r.bytes(),
        }),
        tag::QUOTE_UPDATE => Record::QuoteUpdate(QuoteUpdate {
            timestamp,
            flags: r.u8(),
            symbol: r.bytes(),
            bid_size: r.u32_le(),
            bid_price: r.i64_le(),
            ask_size: r.u32_le(),
            ask_price: r.i64_le(),
        }),
        tag::TRADE_REPORT => Record::TradeReport(TradeReport {
            timestamp,
            flags: r.u8(),
            symbol: r.bytes(),
            size: r.u32_le(),
            price: r.i64_le(),
            trade_id: r.u64_le(),
        }),
        tag::TRADE_BREAK => Record::TradeBreak(TradeBreak {
            timestamp,
            flags: r.u8(),
            symbol: r.bytes(),
            size: r.u32_le(),
            price: r.i64_le(),
            trade_id: r.u64_le(),
        }),
        tag::PRICE_LEVEL_UPDATE => Record::PriceLevelUpdate(PriceLevelUpdate {
            timestamp,
            flags: r.u8(),
            symbol: r.bytes(),
            size: r.u64_le(),
            price: r.i64_le(),
        }),
        tag::AUCTION_INFO => Record::AuctionInfo(AuctionInfo {
            timestamp,
            auction_type: r.u8(),
            symbol: r.bytes(),
            paired_qty: r.u32_le(),
            reference_price: r.i64_le(),
            indicative_price: r.i64_le(),
            imbalance_qty: r.u32_le(),
            imbalance_side: r.u8(),
        }),
        // message_len() already filtered unknown tags.
        _ => unreachable!("unhandled tag {tag:#04x}"),
    }
}

// --- Encoders ----------------------------------------------------------

fn header(w: &mut Writer<'_>, tag: u8, timestamp: u64) {
    w.u8(tag);
    w.u64_le(timestamp);
}

pub fn encode_system_event(m: &SystemEvent) -> [u8; len::SYSTEM_EVENT] {
    let mut out = [0u8; len::SYSTEM_EVENT];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::SYSTEM_EVENT, m.timestamp);
    w.u8(m.event);
    w.u32_le(m.session);
    out
}

pub fn encode_security_directory(m: &SecurityDirectory) -> [u8; len::SECURITY_DIRECTORY] {
    let mut out = [0u8; len::SECURITY_DIRECTORY];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::SECURITY_DIRECTORY, m.timestamp);
    w.u8(m.flags);
    w.bytes(&m.symbol);
    w.u32_le(m.round_lot);
    w.i64_le(m.adjusted_close);
    w.u8(m.luld_tier);
    out
}

pub fn encode_trading_status(m: &TradingStatus) -> [u8; len::TRADING_STATUS] {
    let mut out = [0u8; len::TRADING_STATUS];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::TRADING_STATUS, m.timestamp);
    w.u8(m.status);
    w.bytes(&m.symbol);
    w.bytes(&m.reason);
    out
}

pub fn encode_quote_update(m: &QuoteUpdate) -> [u8; len::QUOTE_UPDATE] {
    let mut out = [0u8; len::QUOTE_UPDATE];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::QUOTE_UPDATE, m.timestamp);
    w.u8(m.flags);
    w.bytes(&m.symbol);
    w.u32_le(m.bid_size);
    w.i64_le(m.bid_price);
    w.u32_le(m.ask_size);
    w.i64_le(m.ask_price);
    out
}

pub fn encode_trade_report(m: &TradeReport) -> [u8; len::TRADE_REPORT] {
    let mut out = [0u8; len::TRADE_REPORT];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::TRADE_REPORT, m.timestamp);
    w.u8(m.flags);
    w.bytes(&m.symbol);
    w.u32_le(m.size);
    w.i64_le(m.price);
    w.u64_le(m.trade_id);
    out
}

pub fn encode_trade_break(m: &TradeBreak) -> [u8; len::TRADE_BREAK] {
    let mut out = [0u8; len::TRADE_BREAK];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::TRADE_BREAK, m.timestamp);
    w.u8(m.flags);
    w.bytes(&m.symbol);
    w.u32_le(m.size);
    w.i64_le(m.price);
    w.u64_le(m.trade_id);
    out
}

pub fn encode_price_level_update(m: &PriceLevelUpdate) -> [u8; len::PRICE_LEVEL_UPDATE] {
    let mut out = [0u8; len::PRICE_LEVEL_UPDATE];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::PRICE_LEVEL_UPDATE, m.timestamp);
    w.u8(m.flags);
    w.bytes(&m.symbol);
    w.u64_le(m.size);
    w.i64_le(m.price);
    out
}

pub fn encode_auction_info(m: &AuctionInfo) -> [u8; len::AUCTION_INFO] {
    let mut out = [0u8; len::AUCTION_INFO];
    let mut w = Writer::new(&mut out);
    header(&mut w, tag::AUCTION_INFO, m.timestamp);
    w.u8(m.auction_type);
    w.bytes(&m.symbol);
    w.u32_le(m.paired_qty);
    w.i64_le(m.reference_price);
    w.i64_le(m.indicative_price);
    w.u32_le(m.imbalance_qty);
    w.u8(m.imbalance_side);
    out
}
