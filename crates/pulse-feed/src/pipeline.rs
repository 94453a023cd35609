//! The two-thread deployment shape: decode on one core, apply on another.
//!
//! The producer thread walks the byte region with the feed's decoder and
//! publishes records into the SPSC ring; the calling thread is the book
//! thread, draining the ring in bounded batches and applying records in
//! arrival order. Shutdown is cooperative: the producer raises a done
//! flag when the region is exhausted and the consumer drains what is left.

use std::sync::atomic::{AtomicBool, Ordering};

use arrayvec::ArrayVec;

use pulse_proto::{DecodeError, MboDecoder, MbpDecoder, Record};
use pulse_ring::SpscRing;

use crate::processor::FeedProcessor;
use crate::stats::DecodeTally;

/// Which wire protocol the byte region speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedKind {
    Mbo,
    Mbp,
}

/// Records applied per drain before checking the ring again.
const BATCH: usize = 64;

/// Decode `bytes` on a spawned producer thread and apply every record on
/// the calling thread, preserving arrival order end-to-end.
///
/// `ring_capacity` must be a power of two. Decode violations are counted
/// on the producer side and merged into the processor's stats before
/// returning.
pub fn run(feed: FeedKind, bytes: &[u8], processor: &mut FeedProcessor, ring_capacity: usize) {
    let mut ring: SpscRing<Record> = SpscRing::with_capacity(ring_capacity);
    let (mut producer, mut consumer) = ring.split();
    let done = AtomicBool::new(false);
    let done = &done;

    std::thread::scope(|s| {
        let handle = s.spawn(move || {
            let mut tally = DecodeTally::default();
            match feed {
                FeedKind::Mbo => {
                    let mut decoder = MboDecoder::new(bytes);
                    while let Some(result) = decoder.parse_next() {
                        match result {
                            Ok(record) => producer.push(record),
                            Err(DecodeError::Truncated) => {
                                tally.truncated += 1;
                                break;
                            }
                            Err(DecodeError::MalformedFrame { .. }) => tally.malformed += 1,
                            Err(DecodeError::UnknownType { .. }) => tally.unknown_type += 1,
                        }
                    }
                }
                FeedKind::Mbp => {
                    let mut decoder = MbpDecoder::new(bytes);
                    while let Some(result) = decoder.parse_next() {
                        match result {
                            Ok(record) => producer.push(record),
                            Err(DecodeError::Truncated) => {
                                tally.truncated += 1;
                                break;
                            }
                            Err(DecodeError::MalformedFrame { .. }) => tally.malformed += 1,
                            Err(DecodeError::UnknownType { .. }) => tally.unknown_type += 1,
                        }
                    }
                }
            }
            done.store(true, Ordering::Release);
            tally
        });

        let mut batch: ArrayVec<Record, BATCH> = ArrayVec::new();
        loop {
            while !batch.is_full() {
                match consumer.try_pop() {
                    Some(record) => batch.push(record),
                    None => break,
                }
            }

            if batch.is_empty() {
                if done.load(Ordering::Acquire) {
                    // Final drain: anything still in flight, then out.
                    match consumer.try_pop() {
                        Some(record) => processor.apply(&record),
                        None => break,
                    }
                } else {
                    std::hint::spin_loop();
                }
                continue;
            }

            for record in batch.drain(..) {
                processor.apply(&record);
            }
        }

        match handle.join() {
            Ok(tally) => processor.absorb_decode_tally(tally),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    });
}
