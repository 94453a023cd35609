//! MBO feed: big-endian, length-prefixed, per-order messages.
//!
//! Framing is a 2-byte big-endian message length followed by `length` bytes
//! of message, the first of which is the type tag. Timestamps are 48-bit
//! big-endian nanoseconds widened to `u64`. The decoder advances
//! deterministically on every outcome: a truncated trailing frame leaves the
//! cursor in place so the caller can re-feed, everything else consumes the
//! declared frame.

use crate::records::{DecodeError, Record};
use crate::wire::{Reader, Writer};

/// Message type tags.
pub mod tag {
    pub const SYSTEM_EVENT: u8 = b'S';
    pub const DIRECTORY: u8 = b'R';
    pub const ADD_ORDER: u8 = b'A';
    pub const ADD_ORDER_ATTRIBUTED: u8 = b'F';
    pub const EXECUTED: u8 = b'E';
    pub const EXECUTED_WITH_PRICE: u8 = b'C';
    pub const CANCEL: u8 = b'X';
    pub const DELETE: u8 = b'D';
    pub const REPLACE: u8 = b'U';
    pub const TRADE: u8 = b'P';
}

/// Fixed message lengths (tag byte included, length prefix excluded).
pub mod len {
    pub const SYSTEM_EVENT: u16 = 12;
    pub const DIRECTORY: u16 = 39;
    pub const ADD_ORDER: u16 = 36;
    pub const ADD_ORDER_ATTRIBUTED: u16 = 40;
    pub const EXECUTED: u16 = 31;
    pub const EXECUTED_WITH_PRICE: u16 = 36;
    pub const CANCEL: u16 = 23;
    pub const DELETE: u16 = 19;
    pub const REPLACE: u16 = 35;
    pub const TRADE: u16 = 44;
}

const LENGTH_PREFIX: usize = 2;
/// Smallest parseable unit: length prefix plus the type tag.
const MIN_HEADER: usize = LENGTH_PREFIX + 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemEvent {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub event: u8,
}

/// Security reference data announced at session start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Directory {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub stock: [u8; 8],
    pub market_category: u8,
    pub financial_status: u8,
    pub round_lot_size: u32,
    pub round_lots_only: u8,
    pub issue_classification: u8,
    pub issue_subtype: [u8; 2],
    pub authenticity: u8,
    pub short_sale_threshold: u8,
    pub ipo_flag: u8,
    pub luld_tier: u8,
    pub etp_flag: u8,
    pub etp_leverage: u32,
    pub inverse: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddOrder {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub order_ref: u64,
    /// `b'B'` or `b'S'`; anything else is rejected as a malformed frame.
    pub side: u8,
    pub shares: u32,
    pub stock: [u8; 8],
    pub price: u32,
}

/// Add order with market-participant attribution appended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddOrderAttributed {
    pub order: AddOrder,
    pub attribution: [u8; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Executed {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub order_ref: u64,
    pub shares: u32,
    pub match_id: u64,
}

/// Execution at a price other than the resting price.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutedWithPrice {
    pub executed: Executed,
    pub printable: u8,
    pub price: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cancel {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub order_ref: u64,
    pub cancelled: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delete {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub order_ref: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Replace {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub old_ref: u64,
    pub new_ref: u64,
    pub shares: u32,
    pub price: u32,
}

/// Non-displayable trade print. Informational; drives no book operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trade {
    pub stock_locate: u16,
    pub tracking: u16,
    pub timestamp: u64,
    pub order_ref: u64,
    pub side: u8,
    pub shares: u32,
    pub stock: [u8; 8],
    pub price: u32,
    pub match_id: u64,
}

/// Streaming decoder for the MBO feed.
pub struct MboDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MboDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Decode the next frame.
    ///
    /// Returns `None` once fewer bytes remain than the minimum header.
    /// `Err(Truncated)` means a declared frame runs past the buffer; the
    /// cursor has not moved and the caller must supply more bytes before
    /// retrying. All other errors consume the declared frame.
    pub fn parse_next(&mut self) -> Option<Result<Record, DecodeError>> {
        if self.buf.len() - self.pos < MIN_HEADER {
            return None;
        }

        let declared = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        if declared == 0 {
            // Cannot even hold the tag byte.
            self.pos += LENGTH_PREFIX;
            return Some(Err(DecodeError::MalformedFrame { tag: 0, declared }));
        }

        let frame_end = self.pos + LENGTH_PREFIX + declared as usize;
        if frame_end > self.buf.len() {
            return Some(Err(DecodeError::Truncated));
        }

        let frame = &self.buf[self.pos + LENGTH_PREFIX..frame_end];
        self.pos = frame_end;
        Some(decode_frame(frame, declared))
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

fn decode_frame(frame: &[u8], declared: u16) -> Result<Record, DecodeError> {
    let tag = frame[0];
    let need = |fixed: u16| -> Result<(), DecodeError> {
        if declared < fixed {
            Err(DecodeError::MalformedFrame { tag, declared })
        } else {
            Ok(())
        }
    };

    // A frame longer than the fixed layout parses the known prefix and
    // ignores the surplus.
    let mut r = Reader::new(frame);
    r.skip(1);

    match tag {
        tag::SYSTEM_EVENT => {
            need(len::SYSTEM_EVENT)?;
            Ok(Record::SystemEvent(SystemEvent {
                stock_locate: r.u16_be(),
                tracking: r.u16_be(),
                timestamp: r.u48_be(),
                event: r.u8(),
            }))
        }
        tag::DIRECTORY => {
            need(len::DIRECTORY)?;
            Ok(Record::Directory(Directory {
                stock_locate: r.u16_be(),
                tracking: r.u16_be(),
                timestamp: r.u48_be(),
                stock: r.bytes(),
                market_category: r.u8(),
                financial_status: r.u8(),
                round_lot_size: r.u32_be(),
                round_lots_only: r.u8(),
                issue_classification: r.u8(),
                issue_subtype: r.bytes(),
                authenticity: r.u8(),
                short_sale_threshold: r.u8(),
                ipo_flag: r.u8(),
                luld_tier: r.u8(),
                etp_flag: r.u8(),
                etp_leverage: r.u32_be(),
                inverse: r.u8(),
            }))
        }
        tag::ADD_ORDER => {
            need(len::ADD_ORDER)?;
            let add = read_add_order(&mut r);
            check_side(add.side, tag, declared)?;
            Ok(Record::AddOrder(add))
        }
        tag::ADD_ORDER_ATTRIBUTED => {
            need(len::ADD_ORDER_ATTRIBUTED)?;
            let order = read_add_order(&mut r);
            check_side(order.side, tag, declared)?;
            Ok(Record::AddOrderAttributed(AddOrderAttributed {
                order,
                attribution: r.bytes(),
            }))
        }
        tag::EXECUTED => {
            need(len::EXECUTED)?;
            Ok(Record::Executed(read_executed(&mut r)))
        }
        tag::EXECUTED_WITH_PRICE => {
            need(len::EXECUTED_WITH_PRICE)?;
            Ok(Record::ExecutedWithPrice(ExecutedWithPrice {
                executed: read_executed(&mut r),
                printable: r.u8(),
                price: r.u32_be(),
            }))
        }
        tag::CANCEL => {
            need(len::CANCEL)?;
            Ok(Record::Cancel(Cancel {
                stock_locate: r.u16_be(),
                tracking: r.u16_be(),
                timestamp: r.u48_be(),
                order_ref: r.u64_be(),
                cancelled: r.u32_be(),
            }))
        }
        tag::DELETE => {
            need(len::DELETE)?;
            Ok(Record::Delete(Delete {
                stock_locate: r.u16_be(),
                tracking: r.u16_be(),
                timestamp: r.u48_be(),
                order_ref: r.u64_be(),
            }))
        }
        tag::REPLACE => {
            need(len::REPLACE)?;
            Ok(Record::Replace(Replace {
                stock_locate: r.u16_be(),
                tracking: r.u16_be(),
                timestamp: r.u48_be(),
                old_ref: r.u64_be(),
                new_ref: r.u64_be(),
                shares: r.u32_be(),
                price: r.u32_be(),
            }))
        }
        tag::TRADE => {
            need(len::TRADE)?;
            let trade = Trade {
                stock_locate: r.u16_be(),
                tracking: r.u16_be(),
                timestamp: r.u48_be(),
                order_ref: r.u64_be(),
                side: r.u8(),
                shares: r.u32_be(),
                stock: r.bytes(),
                price: r.u32_be(),
                match_id: r.u64_be(),
            };
            check_side(trade.side, tag, declared)?;
            Ok(Record::Trade(trade))
        }
        _ => Err(DecodeError::UnknownType { tag }),
    }
}

fn read_add_order(r: &mut Reader<'_>) -> AddOrder {
    AddOrder {
        stock_locate: r.u16_be(),
        tracking: r.u16_be(),
        timestamp: r.u48_be(),
        order_ref: r.u64_be(),
        side: r.u8(),
        shares: r.u32_be(),
        stock: r.bytes(),
        price: r.u32_be(),
    }
}

fn read_executed(r: &mut Reader<'_>) -> Executed {
    Executed {
        stock_locate: r.u16_be(),
        tracking: r.u16_be(),
        timestamp: r.u48_be(),
        order_ref: r.u64_be(),
        shares: r.u32_be(),
        match_id: r.u64_be(),
    }
}

// Sides are strictly 'B' or 'S'; the feed never legitimately sends anything
// else, so any other byte marks the frame corrupt.
fn check_side(side: u8, tag: u8, declared: u16) -> Result<(), DecodeError> {
    if side == b'B' || side == b'S' {
        Ok(())
    } else {
        Err(DecodeError::MalformedFrame { tag, declared })
    }
}

// --- Encoders ----------------------------------------------------------
//
// Every encoder emits a complete frame: length prefix plus message. Used by
// tests and the synthetic feed generator; the hot path never encodes.

fn frame_header(w: &mut Writer<'_>, length: u16, tag: u8) {
    w.u16_be(length);
    w.u8(tag);
}

pub fn encode_system_event(m: &SystemEvent) -> [u8; 2 + len::SYSTEM_EVENT as usize] {
    let mut out = [0u8; 2 + len::SYSTEM_EVENT as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::SYSTEM_EVENT, tag::SYSTEM_EVENT);
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.u8(m.event);
    out
}

pub fn encode_directory(m: &Directory) -> [u8; 2 + len::DIRECTORY as usize] {
    let mut out = [0u8; 2 + len::DIRECTORY as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::DIRECTORY, tag::DIRECTORY);
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.bytes(&m.stock);
    w.u8(m.market_category);
    w.u8(m.financial_status);
    w.u32_be(m.round_lot_size);
    w.u8(m.round_lots_only);
    w.u8(m.issue_classification);
    w.bytes(&m.issue_subtype);
    w.u8(m.authenticity);
    w.u8(m.short_sale_threshold);
    w.u8(m.ipo_flag);
    w.u8(m.luld_tier);
    w.u8(m.etp_flag);
    w.u32_be(m.etp_leverage);
    w.u8(m.inverse);
    out
}

fn write_add_order(w: &mut Writer<'_>, m: &AddOrder) {
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.u64_be(m.order_ref);
    w.u8(m.side);
    w.u32_be(m.shares);
    w.bytes(&m.stock);
    w.u32_be(m.price);
}

pub fn encode_add_order(m: &AddOrder) -> [u8; 2 + len::ADD_ORDER as usize] {
    let mut out = [0u8; 2 + len::ADD_ORDER as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::ADD_ORDER, tag::ADD_ORDER);
    write_add_order(&mut w, m);
    out
}

pub fn encode_add_order_attributed(
    m: &AddOrderAttributed,
) -> [u8; 2 + len::ADD_ORDER_ATTRIBUTED as usize] {
    let mut out = [0u8; 2 + len::ADD_ORDER_ATTRIBUTED as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::ADD_ORDER_ATTRIBUTED, tag::ADD_ORDER_ATTRIBUTED);
    write_add_order(&mut w, &m.order);
    w.bytes(&m.attribution);
    out
}

fn write_executed(w: &mut Writer<'_>, m: &Executed) {
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.u64_be(m.order_ref);
    w.u32_be(m.shares);
    w.u64_be(m.match_id);
}

pub fn encode_executed(m: &Executed) -> [u8; 2 + len::EXECUTED as usize] {
    let mut out = [0u8; 2 + len::EXECUTED as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::EXECUTED, tag::EXECUTED);
    write_executed(&mut w, m);
    out
}

pub fn encode_executed_with_price(
    m: &ExecutedWithPrice,
) -> [u8; 2 + len::EXECUTED_WITH_PRICE as usize] {
    let mut out = [0u8; 2 + len::EXECUTED_WITH_PRICE as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::EXECUTED_WITH_PRICE, tag::EXECUTED_WITH_PRICE);
    write_executed(&mut w, &m.executed);
    w.u8(m.printable);
    w.u32_be(m.price);
    out
}

pub fn encode_cancel(m: &Cancel) -> [u8; 2 + len::CANCEL as usize] {
    let mut out = [0u8; 2 + len::CANCEL as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::CANCEL, tag::CANCEL);
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.u64_be(m.order_ref);
    w.u32_be(m.cancelled);
    out
}

pub fn encode_delete(m: &Delete) -> [u8; 2 + len::DELETE as usize] {
    let mut out = [0u8; 2 + len::DELETE as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::DELETE, tag::DELETE);
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.u64_be(m.order_ref);
    out
}

pub fn encode_replace(m: &Replace) -> [u8; 2 + len::REPLACE as usize] {
    let mut out = [0u8; 2 + len::REPLACE as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::REPLACE, tag::REPLACE);
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.u64_be(m.old_ref);
    w.u64_be(m.new_ref);
    w.u32_be(m.shares);
    w.u32_be(m.price);
    out
}

pub fn encode_trade(m: &Trade) -> [u8; 2 + len::TRADE as usize] {
    let mut out = [0u8; 2 + len::TRADE as usize];
    let mut w = Writer::new(&mut out);
    frame_header(&mut w, len::TRADE, tag::TRADE);
    w.u16_be(m.stock_locate);
    w.u16_be(m.tracking);
    w.u48_be(m.timestamp);
    w.u64_be(m.order_ref);
    w.u8(m.side);
    w.u32_be(m.shares);
    w.bytes(&m.stock);
    w.u32_be(m.price);
    w.u64_be(m.match_id);
    out
}
