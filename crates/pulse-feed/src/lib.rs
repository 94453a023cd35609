//! Feed processing: decoded records in, book state out.
//!
//! [`FeedProcessor`] owns the per-symbol books and applies [`Record`]s to
//! them, keeping a full accounting of what it saw in [`FeedStats`].
//! [`pipeline`] wires a decoder thread to the processor through the SPSC
//! ring for the two-thread deployment shape; `process_*_bytes` on the
//! processor is the single-threaded equivalent.
//!
//! [`Record`]: pulse_proto::Record

pub mod pipeline;
pub mod processor;
pub mod stats;

pub use pipeline::FeedKind;
pub use processor::FeedProcessor;
pub use stats::{DecodeTally, FeedStats};
