use pusher_statsd::{CounterMetric, GaugeMetric, HistogramMetric, TimerMetric};

/// Counter metrics used by the pusher.
pub enum PusherCounters {
    /// Number of scrapes that returned no payload.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    ScrapeFailed,
    /// Number of batches that could not be pushed.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    /// - `destination`: the destination of the batch.
    PushFailed,
    /// Number of batches pushed successfully.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    /// - `destination`: the destination of the batch.
    PushBatches,
    /// Number of samples forwarded verbatim because they could not be parsed.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    RecordsFallback,
    /// Number of route map reloads.
    ///
    /// This metric is tagged with:
    /// - `success`: `true` if the new route maps were applied.
    RoutesReloaded,
}

impl CounterMetric for PusherCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::ScrapeFailed => "scrape.failed",
            Self::PushFailed => "push.failed",
            Self::PushBatches => "push.batches",
            Self::RecordsFallback => "records.fallback",
            Self::RoutesReloaded => "routes.reloaded",
        }
    }
}

/// Timer metrics used by the pusher.
pub enum PusherTimers {
    /// Total time of one cycle of a resource, from scrape until the last push.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    CycleDuration,
    /// Time spent waiting for the exporter of a resource.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    ScrapeDuration,
}

impl TimerMetric for PusherTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::CycleDuration => "cycle.duration",
            Self::ScrapeDuration => "scrape.duration",
        }
    }
}

/// Histogram metrics used by the pusher.
pub enum PusherHistograms {
    /// Size of a scraped payload in bytes.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    ScrapeBytes,
    /// Number of data lines in the bucket of one destination.
    ///
    /// This metric is tagged with:
    /// - `resource`: the name of the resource.
    /// - `destination`: the destination of the bucket.
    BucketLines,
}

impl HistogramMetric for PusherHistograms {
    fn name(&self) -> &'static str {
        match self {
            Self::ScrapeBytes => "scrape.bytes",
            Self::BucketLines => "bucket.lines",
        }
    }
}

/// Gauge metrics used by the pusher.
pub enum PusherGauges {
    /// Number of configured resources.
    Resources,
}

impl GaugeMetric for PusherGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::Resources => "resources",
        }
    }
}
