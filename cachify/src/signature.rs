//! Diagnostic HTML comment appended to served pages.

use std::sync::Arc;

use chrono::DateTime;

use crate::domain::PageMeta;
use crate::metrics::{MetricsProbe, PageMetrics};

/// First line of every signature.
pub const SIGNATURE_MARKER: &str = "Cachify | http://cachify.de";
pub const GENERATED_LABEL: &str = "Generated";

/// `d.m.Y H:i:s` in UTC.
pub fn format_timestamp(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format("%d.%m.%Y %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Builds signatures for one backend.
#[derive(Clone)]
pub struct Signature {
    method: &'static str,
    probe: Arc<dyn MetricsProbe>,
}

impl Signature {
    pub fn new(method: &'static str, probe: Arc<dyn MetricsProbe>) -> Self {
        Self { method, probe }
    }

    /// `<marker>\n<label> @ <timestamp>` wrapped in a comment.
    pub fn brief(label: &str, timestamp: i64) -> String {
        format!(
            "\n\n<!-- {}\n{} @ {} -->",
            SIGNATURE_MARKER,
            label,
            format_timestamp(timestamp)
        )
    }

    /// Brief signature followed by the render cost without and with the cache.
    pub fn detailed(
        label: &str,
        timestamp: i64,
        without_cache: &PageMetrics,
        with_cache: &PageMetrics,
    ) -> String {
        format!(
            "\n\n<!-- {}\n{} @ {}\n{}\n{}\n-->",
            SIGNATURE_MARKER,
            label,
            format_timestamp(timestamp),
            metrics_line("Without Cachify", without_cache),
            metrics_line("With Cachify", with_cache)
        )
    }

    /// Signature for a structured entry, rendered when the entry is served so the
    /// "with cache" numbers describe the current request.
    pub fn render(&self, detail: bool, meta: Option<&PageMeta>) -> String {
        match meta {
            Some(meta) if detail => Self::detailed(
                &format!("{} Cache", self.method),
                meta.timestamp,
                &meta.metrics(),
                &self.probe.sample(),
            ),
            Some(meta) => Self::brief(GENERATED_LABEL, meta.timestamp),
            None => Self::brief(GENERATED_LABEL, now_timestamp()),
        }
    }

    /// Signature baked into a flat entry at store time. No read-time metrics exist
    /// for these, so detail mode only swaps the label for the method name.
    pub fn embedded(&self, detail: bool, timestamp: i64) -> String {
        let label = if detail { self.method } else { GENERATED_LABEL };
        Self::brief(label, timestamp)
    }

    pub fn capture_meta(&self, timestamp: i64) -> PageMeta {
        PageMeta::capture(self.probe.sample(), timestamp)
    }
}

fn metrics_line(label: &str, metrics: &PageMetrics) -> String {
    format!(
        "{}: {} DB queries, {} seconds, {}",
        label, metrics.queries, metrics.timer, metrics.memory
    )
}
