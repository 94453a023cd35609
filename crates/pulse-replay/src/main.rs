//! Feed-handler demo and benchmark harness.
//!
//! Generates a deterministic synthetic MBO session, runs it through the
//! decode → apply path single-threaded and pipelined, prints latency
//! distributions, and finishes with a tick-tape record/replay pass.
//!
//! Usage: pulse-replay [messages] [tape-path]

use std::error::Error;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use pulse_book::Symbol;
use pulse_feed::{pipeline, FeedKind, FeedProcessor};
use pulse_metrics::{format_nanos, LatencyHistogram, TscClock};
use pulse_proto::mbo::{
    encode_add_order, encode_cancel, encode_delete, encode_executed, encode_replace,
    encode_trade, AddOrder, Cancel, Delete, Executed, Replace, Trade,
};
use pulse_proto::MboDecoder;
use pulse_tape::{replay, Speed, TickReader, TickRecorder};

const DEFAULT_MESSAGES: usize = 200_000;
const RING_CAPACITY: usize = 1 << 14;
const SEED: u64 = 0x5EED_CAFE;

struct Listing {
    locate: u16,
    stock: [u8; 8],
    base_price: u32,
}

const LISTINGS: [Listing; 3] = [
    Listing {
        locate: 1,
        stock: *b"AAPL    ",
        base_price: 1_500_000,
    },
    Listing {
        locate: 2,
        stock: *b"MSFT    ",
        base_price: 3_800_000,
    },
    Listing {
        locate: 3,
        stock: *b"GOOGL   ",
        base_price: 14_100_000,
    },
];

/// A resting order the generator may act on again.
#[derive(Clone, Copy)]
struct LiveOrder {
    order_ref: u64,
    listing_idx: usize,
    remaining: u32,
}

/// Deterministic synthetic MBO session. Tracks which orders rest, and how
/// much of each remains, so executes, cancels, and replaces always
/// reference real resting state.
struct FeedGenerator {
    rng: ChaCha8Rng,
    next_ref: u64,
    next_match: u64,
    ts: u64,
    live: Vec<LiveOrder>,
}

impl FeedGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_ref: 1,
            next_match: 1,
            ts: 1_700_000_000_000_000_000,
            live: Vec::new(),
        }
    }

    fn generate(&mut self, messages: usize) -> Vec<u8> {
        let mut stream = Vec::with_capacity(messages * 40);
        for _ in 0..messages {
            self.ts += self.rng.gen_range(100..10_000);
            let roll: u32 = self.rng.gen_range(0..100);
            match roll {
                0..=49 => self.emit_add(&mut stream),
                50..=69 => self.emit_execute(&mut stream),
                70..=84 => self.emit_cancel(&mut stream),
                85..=92 => self.emit_delete(&mut stream),
                93..=96 => self.emit_replace(&mut stream),
                _ => self.emit_trade(&mut stream),
            }
        }
        stream
    }

    fn emit_add(&mut self, stream: &mut Vec<u8>) {
        let listing_idx = self.rng.gen_range(0..LISTINGS.len());
        let listing = &LISTINGS[listing_idx];
        let order_ref = self.next_ref;
        self.next_ref += 1;

        let side = if self.rng.gen_bool(0.5) { b'B' } else { b'S' };
        let offset = self.rng.gen_range(0..200);
        let price = if side == b'B' {
            listing.base_price - offset
        } else {
            listing.base_price + 10 + offset
        };
        let shares = self.rng.gen_range(1..50) * 100;

        stream.extend(encode_add_order(&AddOrder {
            stock_locate: listing.locate,
            tracking: 0,
            timestamp: self.ts & 0x0000_FFFF_FFFF_FFFF,
            order_ref,
            side,
            shares,
            stock: listing.stock,
            price,
        }));
        self.live.push(LiveOrder {
            order_ref,
            listing_idx,
            remaining: shares,
        });
    }

    fn pick_live(&mut self) -> Option<usize> {
        if self.live.is_empty() {
            return None;
        }
        Some(self.rng.gen_range(0..self.live.len()))
    }

    fn emit_execute(&mut self, stream: &mut Vec<u8>) {
        let Some(idx) = self.pick_live() else {
            return self.emit_add(stream);
        };
        let order = self.live[idx];

        // Partial executions leave the order resting more often than not.
        let shares = if order.remaining > 1 && self.rng.gen_bool(0.7) {
            self.rng.gen_range(1..order.remaining)
        } else {
            order.remaining
        };
        if shares == order.remaining {
            self.live.swap_remove(idx);
        } else {
            self.live[idx].remaining -= shares;
        }

        stream.extend(encode_executed(&Executed {
            stock_locate: LISTINGS[order.listing_idx].locate,
            tracking: 0,
            timestamp: self.ts & 0x0000_FFFF_FFFF_FFFF,
            order_ref: order.order_ref,
            shares,
            match_id: self.next_match,
        }));
        self.next_match += 1;
    }

    fn emit_cancel(&mut self, stream: &mut Vec<u8>) {
        let Some(idx) = self.pick_live() else {
            return self.emit_add(stream);
        };
        let order = self.live[idx];

        let cancelled = if order.remaining > 1 {
            self.rng.gen_range(1..order.remaining)
        } else {
            order.remaining
        };
        if cancelled == order.remaining {
            self.live.swap_remove(idx);
        } else {
            self.live[idx].remaining -= cancelled;
        }

        stream.extend(encode_cancel(&Cancel {
            stock_locate: LISTINGS[order.listing_idx].locate,
            tracking: 0,
            timestamp: self.ts & 0x0000_FFFF_FFFF_FFFF,
            order_ref: order.order_ref,
            cancelled,
        }));
    }

    fn emit_delete(&mut self, stream: &mut Vec<u8>) {
        let Some(idx) = self.pick_live() else {
            return self.emit_add(stream);
        };
        let order = self.live.swap_remove(idx);
        stream.extend(encode_delete(&Delete {
            stock_locate: LISTINGS[order.listing_idx].locate,
            tracking: 0,
            timestamp: self.ts & 0x0000_FFFF_FFFF_FFFF,
            order_ref: order.order_ref,
        }));
    }

    fn emit_replace(&mut self, stream: &mut Vec<u8>) {
        let Some(idx) = self.pick_live() else {
            return self.emit_add(stream);
        };
        let old = self.live[idx];
        let new_ref = self.next_ref;
        self.next_ref += 1;

        let listing = &LISTINGS[old.listing_idx];
        let shares = self.rng.gen_range(1..50) * 100;
        self.live[idx] = LiveOrder {
            order_ref: new_ref,
            listing_idx: old.listing_idx,
            remaining: shares,
        };

        stream.extend(encode_replace(&Replace {
            stock_locate: listing.locate,
            tracking: 0,
            timestamp: self.ts & 0x0000_FFFF_FFFF_FFFF,
            old_ref: old.order_ref,
            new_ref,
            shares,
            price: listing.base_price + self.rng.gen_range(0..100),
        }));
    }

    fn emit_trade(&mut self, stream: &mut Vec<u8>) {
        let listing = &LISTINGS[self.rng.gen_range(0..LISTINGS.len())];
        stream.extend(encode_trade(&Trade {
            stock_locate: listing.locate,
            tracking: 0,
            timestamp: self.ts & 0x0000_FFFF_FFFF_FFFF,
            order_ref: 0,
            side: if self.rng.gen_bool(0.5) { b'B' } else { b'S' },
            shares: self.rng.gen_range(1..20) * 100,
            stock: listing.stock,
            price: listing.base_price,
            match_id: self.next_match,
        }));
        self.next_match += 1;
    }
}

fn print_books(processor: &FeedProcessor) {
    for symbol in processor.books().symbols() {
        let Some(book) = processor.books().get(symbol) else {
            continue;
        };
        let snap = book.snapshot();
        println!(
            "   {:<8} bid {} x {}  ask {} x {}  spread {:.4}  levels {}/{}  orders {}",
            symbol.to_string(),
            snap.best_bid,
            snap.best_bid_size,
            snap.best_ask,
            snap.best_ask_size,
            snap.spread,
            snap.bid_levels,
            snap.ask_levels,
            book.total_orders(),
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let messages: usize = match args.next() {
        Some(arg) => arg.parse()?,
        None => DEFAULT_MESSAGES,
    };
    let tape_path = args
        .next()
        .unwrap_or_else(|| "pulse-session.ticks".to_string());

    println!("pulse-replay: {messages} synthetic MBO messages\n");

    // Phase 1: generate.
    println!("[1/4] generating session");
    let start = Instant::now();
    let stream = FeedGenerator::new(SEED).generate(messages);
    println!(
        "   {} bytes in {:.2?}\n",
        stream.len(),
        start.elapsed()
    );

    // Phase 2: single-threaded decode + apply with per-message latency.
    println!("[2/4] single-threaded decode + apply");
    let clock = TscClock::new();
    let mut decode_latency = LatencyHistogram::new("decode");
    let mut apply_latency = LatencyHistogram::new("apply");

    let mut processor = FeedProcessor::new();
    processor.attach_tape(TickRecorder::create(&tape_path)?);

    let start = Instant::now();
    let mut decoder = MboDecoder::new(&stream);
    loop {
        let t0 = clock.raw();
        let Some(result) = decoder.parse_next() else {
            break;
        };
        let t1 = clock.raw();
        match result {
            Ok(record) => {
                processor.apply(&record);
                let t2 = clock.raw();
                decode_latency.record(clock.delta_nanos(t0, t1));
                apply_latency.record(clock.delta_nanos(t1, t2));
            }
            Err(err @ pulse_proto::DecodeError::Truncated) => {
                processor.on_decode_error(err);
                break;
            }
            Err(err) => processor.on_decode_error(err),
        }
    }
    let elapsed = start.elapsed();
    let rate = messages as f64 / elapsed.as_secs_f64();

    println!("   {} messages in {:.2?} ({rate:.0} msg/s)", messages, elapsed);
    println!("   {}", decode_latency.summary());
    println!("   {}", apply_latency.summary());
    println!("   stats: {}", processor.stats());
    print_books(&processor);

    if let Some(mut tape) = processor.take_tape() {
        tape.flush()?;
        println!("   tape: {} records -> {tape_path}", tape.count());
    }
    println!();

    // Phase 3: pipelined decode + apply.
    println!("[3/4] pipelined decode -> ring -> apply");
    let mut pipelined = FeedProcessor::new();
    let start = Instant::now();
    pipeline::run(FeedKind::Mbo, &stream, &mut pipelined, RING_CAPACITY);
    let elapsed = start.elapsed();
    let rate = messages as f64 / elapsed.as_secs_f64();
    println!("   {} messages in {:.2?} ({rate:.0} msg/s)", messages, elapsed);
    println!("   stats: {}", pipelined.stats());

    // The ring preserves order, so both runs land on identical books.
    let mut divergent = 0;
    for symbol in processor.books().symbols() {
        let a = processor.books().get(symbol);
        let b = pipelined.books().get(symbol);
        if a.map(|x| x.snapshot()) != b.map(|x| x.snapshot()) {
            divergent += 1;
        }
    }
    println!(
        "   pipelined vs single-threaded books: {}",
        if divergent == 0 { "identical" } else { "DIVERGED" }
    );
    println!();

    // Phase 4: replay the recorded tape.
    println!("[4/4] tape replay");
    let mut reader = TickReader::open(&tape_path)?;
    let stop = AtomicBool::new(false);
    let start = Instant::now();
    let mut trades = 0u64;
    let mut quotes = 0u64;
    let delivered = replay(&mut reader, Speed::Max, &stop, |record| {
        if record.is_trade() {
            trades += 1;
        }
        if record.is_quote() {
            quotes += 1;
        }
    });
    println!(
        "   {delivered} records ({trades} trades, {quotes} quote legs) in {}",
        format_nanos(start.elapsed().as_nanos() as u64)
    );

    let sym = Symbol::new("AAPL");
    if let Some(book) = processor.books().get(sym) {
        println!(
            "\ndone. AAPL saw {} applied messages, last update ts {}",
            book.message_count(),
            book.last_update_ts()
        );
    }

    Ok(())
}
