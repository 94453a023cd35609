//! Tick persistence: flat files of packed 48-byte records.
//!
//! The tape is a bare array of [`TickRecord`] in host byte order: a local
//! capture format, not an exchange format, trading portability for
//! zero-conversion reads. [`TickRecorder`] appends, [`TickReader`] iterates,
//! and [`replay`] re-delivers a tape through a callback at a chosen pace.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};

/// One tick on disk. Exactly 48 bytes, host endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TickRecord {
    pub timestamp: u64,
    pub symbol: [u8; 8],
    pub price: i64,
    pub size: u64,
    /// 0 = bid/buy, 1 = ask/sell.
    pub side: u8,
    /// Bit 0 = trade, bit 1 = quote.
    pub flags: u8,
    pub padding: u16,
    pub reserved: [u8; 12],
}

const _: () = assert!(size_of::<TickRecord>() == 48);

// SAFETY: repr(C), every field is plain old data, and the layout has no
// implicit padding (verified by the size assertion above).
unsafe impl Pod for TickRecord {}
unsafe impl Zeroable for TickRecord {}

impl TickRecord {
    pub const FLAG_TRADE: u8 = 0b01;
    pub const FLAG_QUOTE: u8 = 0b10;

    pub const SIDE_BID: u8 = 0;
    pub const SIDE_ASK: u8 = 1;

    pub fn is_trade(&self) -> bool {
        self.flags & Self::FLAG_TRADE != 0
    }

    pub fn is_quote(&self) -> bool {
        self.flags & Self::FLAG_QUOTE != 0
    }
}

/// Buffered tape writer.
pub struct TickRecorder {
    writer: BufWriter<File>,
    count: u64,
}

impl TickRecorder {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            count: 0,
        })
    }

    /// Append one trade print.
    pub fn record_trade(
        &mut self,
        timestamp: u64,
        symbol: [u8; 8],
        price: i64,
        size: u64,
        side: u8,
    ) -> io::Result<()> {
        self.write_record(&TickRecord {
            timestamp,
            symbol,
            price,
            size,
            side,
            flags: TickRecord::FLAG_TRADE,
            ..TickRecord::default()
        })
    }

    /// Append a two-sided quote as a bid record and an ask record.
    #[allow(clippy::too_many_arguments)]
    pub fn record_quote(
        &mut self,
        timestamp: u64,
        symbol: [u8; 8],
        bid_price: i64,
        bid_size: u64,
        ask_price: i64,
        ask_size: u64,
    ) -> io::Result<()> {
        self.write_record(&TickRecord {
            timestamp,
            symbol,
            price: bid_price,
            size: bid_size,
            side: TickRecord::SIDE_BID,
            flags: TickRecord::FLAG_QUOTE,
            ..TickRecord::default()
        })?;
        self.write_record(&TickRecord {
            timestamp,
            symbol,
            price: ask_price,
            size: ask_size,
            side: TickRecord::SIDE_ASK,
            flags: TickRecord::FLAG_QUOTE,
            ..TickRecord::default()
        })
    }

    pub fn write_record(&mut self, record: &TickRecord) -> io::Result<()> {
        self.writer.write_all(bytemuck::bytes_of(record))?;
        self.count += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Records written so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// In-memory tape reader.
#[derive(Debug)]
pub struct TickReader {
    data: Vec<u8>,
    offset: usize,
}

impl TickReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        if data.len() % size_of::<TickRecord>() != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "tape length is not a whole number of tick records",
            ));
        }
        Ok(Self { data, offset: 0 })
    }

    pub fn read_next(&mut self) -> Option<TickRecord> {
        let end = self.offset + size_of::<TickRecord>();
        if end > self.data.len() {
            return None;
        }
        // Unaligned read: the backing Vec<u8> owes us nothing.
        let record = bytemuck::pod_read_unaligned(&self.data[self.offset..end]);
        self.offset = end;
        Some(record)
    }

    pub fn has_more(&self) -> bool {
        self.offset < self.data.len()
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    pub fn total_records(&self) -> usize {
        self.data.len() / size_of::<TickRecord>()
    }
}

/// Replay pacing relative to the recorded timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speed {
    Real1x,
    Fast10x,
    Fast100x,
    /// No pacing at all.
    Max,
}

impl Speed {
    fn divisor(self) -> Option<u64> {
        match self {
            Speed::Real1x => Some(1),
            Speed::Fast10x => Some(10),
            Speed::Fast100x => Some(100),
            Speed::Max => None,
        }
    }
}

/// Inter-record sleeps are capped so a tape with a bad timestamp cannot
/// stall a replay for hours.
const MAX_GAP: Duration = Duration::from_secs(1);

/// Deliver every record on the tape to `callback`, pacing by recorded
/// timestamp deltas. Checks `stop` between records for cooperative
/// shutdown. Returns the number of records delivered.
pub fn replay<F>(
    reader: &mut TickReader,
    speed: Speed,
    stop: &AtomicBool,
    mut callback: F,
) -> u64
where
    F: FnMut(&TickRecord),
{
    let mut delivered = 0;
    let mut prev_ts: Option<u64> = None;

    while let Some(record) = reader.read_next() {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        if let (Some(divisor), Some(prev)) = (speed.divisor(), prev_ts) {
            let gap_ns = record.timestamp.saturating_sub(prev) / divisor;
            if gap_ns > 0 {
                thread::sleep(Duration::from_nanos(gap_ns).min(MAX_GAP));
            }
        }
        prev_ts = Some(record.timestamp);

        callback(&record);
        delivered += 1;
    }

    delivered
}
