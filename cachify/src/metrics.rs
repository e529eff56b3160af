//! Render-cost counters reported in detailed signatures.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// Cost of producing one response.
#[derive(Clone, Debug, PartialEq)]
pub struct PageMetrics {
    pub queries: u32,
    /// Elapsed seconds.
    pub timer: f64,
    /// Human readable memory usage, e.g. `12.50 MB`.
    pub memory: String,
}

/// Source of the current request's metrics.
pub trait MetricsProbe: Send + Sync + 'static {
    fn sample(&self) -> PageMetrics;
}

/// Always reports the same numbers.
pub struct FixedMetrics(pub PageMetrics);

impl MetricsProbe for FixedMetrics {
    fn sample(&self) -> PageMetrics {
        self.0.clone()
    }
}

/// Counters for the request in flight: queries recorded by the host application, wall
/// time since the request began and resident memory of the process.
///
/// The host calls [`ProcessMetrics::begin_request`] when a request starts; until then
/// the scope is the lifetime of the instance.
pub struct ProcessMetrics {
    origin: Instant,
    request_start_nanos: AtomicU64,
    queries: AtomicU32,
}

impl ProcessMetrics {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            request_start_nanos: AtomicU64::new(0),
            queries: AtomicU32::new(0),
        }
    }

    /// Starts a new request scope: the query counter and the timer restart from zero.
    pub fn begin_request(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.request_start_nanos
            .store(self.nanos_since_origin(), Ordering::Relaxed);
    }

    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    fn nanos_since_origin(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn request_elapsed_secs(&self) -> f64 {
        let started = self.request_start_nanos.load(Ordering::Relaxed);
        self.nanos_since_origin().saturating_sub(started) as f64 / 1e9
    }
}

impl Default for ProcessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProbe for ProcessMetrics {
    fn sample(&self) -> PageMetrics {
        let elapsed = self.request_elapsed_secs();
        PageMetrics {
            queries: self.queries.load(Ordering::Relaxed),
            timer: (elapsed * 100.0).round() / 100.0,
            memory: format_size(resident_memory_bytes().unwrap_or(0)),
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(kib * 1024)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

/// Formats a byte count with two decimals in the largest fitting unit.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [
        ("TB", 1 << 40),
        ("GB", 1 << 30),
        ("MB", 1 << 20),
        ("KB", 1 << 10),
    ];

    if bytes == 0 {
        return "0 B".to_string();
    }
    for (unit, magnitude) in UNITS {
        if bytes >= magnitude {
            return format!("{:.2} {}", bytes as f64 / magnitude as f64, unit);
        }
    }
    format!("{} B", bytes)
}
