//! Latency tracking for the decode → apply pipeline.
//!
//! [`LatencyHistogram`] records nanosecond samples into an HdrHistogram and
//! exports a [`Summary`] value object; [`TscClock`] produces the raw
//! counter timestamps the samples are derived from. Recording is the only
//! operation allowed anywhere near the hot path.

use std::fmt;

use hdrhistogram::Histogram;

/// Nanosecond-precision latency histogram.
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
    label: &'static str,
}

impl LatencyHistogram {
    /// Three significant digits, auto-resizing range.
    pub fn new(label: &'static str) -> Self {
        Self {
            histogram: Histogram::new(3).expect("3 significant digits is a valid precision"),
            label,
        }
    }

    /// Record one latency sample in nanoseconds.
    #[inline(always)]
    pub fn record(&mut self, nanos: u64) {
        // Out-of-range samples are dropped rather than panicking mid-run.
        let _ = self.histogram.record(nanos);
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        self.histogram.value_at_quantile(percentile / 100.0)
    }

    pub fn p50(&self) -> u64 {
        self.value_at_percentile(50.0)
    }

    pub fn p90(&self) -> u64 {
        self.value_at_percentile(90.0)
    }

    pub fn p99(&self) -> u64 {
        self.value_at_percentile(99.0)
    }

    pub fn p999(&self) -> u64 {
        self.value_at_percentile(99.9)
    }

    pub fn min(&self) -> u64 {
        self.histogram.min()
    }

    pub fn max(&self) -> u64 {
        self.histogram.max()
    }

    pub fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
    }

    /// Freeze the current distribution into a value object.
    pub fn summary(&self) -> Summary {
        Summary {
            label: self.label,
            count: self.count(),
            min: self.min(),
            p50: self.p50(),
            p90: self.p90(),
            p99: self.p99(),
            p999: self.p999(),
            max: self.max(),
            mean: self.mean(),
        }
    }
}

/// Frozen percentile summary of one latency stage.
#[derive(Clone, Copy, Debug)]
pub struct Summary {
    pub label: &'static str,
    pub count: u64,
    pub min: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
    pub max: u64,
    pub mean: f64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: n={} min={} p50={} p90={} p99={} p99.9={} max={} mean={}",
            self.label,
            self.count,
            format_nanos(self.min),
            format_nanos(self.p50),
            format_nanos(self.p90),
            format_nanos(self.p99),
            format_nanos(self.p999),
            format_nanos(self.max),
            format_nanos(self.mean as u64),
        )
    }
}

/// Human-readable duration with the right unit.
pub fn format_nanos(nanos: u64) -> String {
    if nanos < 1_000 {
        format!("{nanos}ns")
    } else if nanos < 1_000_000 {
        format!("{:.2}µs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos as f64 / 1_000_000_000.0)
    }
}

/// TSC-backed clock: raw counter reads on the hot path, conversion to
/// nanoseconds off it.
pub struct TscClock {
    clock: quanta::Clock,
}

impl TscClock {
    pub fn new() -> Self {
        Self {
            clock: quanta::Clock::new(),
        }
    }

    /// Raw counter value; cheapest possible timestamp.
    #[inline(always)]
    pub fn raw(&self) -> u64 {
        self.clock.raw()
    }

    /// Nanoseconds between two raw readings.
    #[inline(always)]
    pub fn delta_nanos(&self, start: u64, end: u64) -> u64 {
        self.clock.delta_as_nanos(start, end)
    }
}

impl Default for TscClock {
    fn default() -> Self {
        Self::new()
    }
}
