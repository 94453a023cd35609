//! Wire-format definitions and decoders for the two inbound market-data
//! feeds.
//!
//! Two protocols are supported:
//! - the **MBO feed** ([`mbo`]): big-endian, length-prefixed, per-order
//!   messages (add / execute / cancel / delete / replace),
//! - the **MBP feed** ([`mbp`]): little-endian, typed-header, per-price
//!   aggregate messages (quotes, trades, level updates).
//!
//! Both decoders walk an immutable byte slice and emit [`Record`] values.
//! They never allocate on the decode path and never assume host endianness;
//! every multi-byte field is read with an explicit byte order.

#![no_std]

extern crate alloc;

pub mod mbo;
pub mod mbp;
pub mod records;
mod wire;

pub use mbo::MboDecoder;
pub use mbp::MbpDecoder;
pub use records::{
    price4_to_f64, price8_to_f64, symbol_to_string, trim_symbol, DecodeError, Record,
};
