use hdrhistogram::Histogram;

/// Upper bound for recorded latencies: one hour in milliseconds.
const MAX_TRACKABLE_MS: u64 = 3_600_000;

pub(crate) fn new_latency_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_max(MAX_TRACKABLE_MS, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Record a millisecond sample; negative inputs count as zero and values past the
/// trackable range are clamped to it.
pub(crate) fn record_ms(h: &mut Histogram<u64>, elapsed_ms: i64) {
    let v = u64::try_from(elapsed_ms).unwrap_or(0).min(MAX_TRACKABLE_MS);
    let _ = h.record(v);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub mean_ms: Option<f64>,
    pub p50_ms: Option<u64>,
    pub p90_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub count: u64,
}

pub(crate) fn summarize_latency(h: &Histogram<u64>) -> LatencySummary {
    let count = h.len();
    let q = |quantile| (count > 0).then(|| h.value_at_quantile(quantile));

    LatencySummary {
        min_ms: (count > 0).then(|| h.min()),
        max_ms: (count > 0).then(|| h.max()),
        mean_ms: (count > 0).then(|| h.mean()),
        p50_ms: q(0.50),
        p90_ms: q(0.90),
        p95_ms: q(0.95),
        p99_ms: q(0.99),
        count,
    }
}
