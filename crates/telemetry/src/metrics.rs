use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Analysis Metrics ====
    pub static ref CROWD_ANALYSES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_analyses_total",
                "Total number of crowd analyses by media kind and outcome",
            ),
            &["media_kind", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_ANALYSIS_DURATION: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "crowd_analysis_duration_seconds",
                "Wall-clock duration of a complete analysis run",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["mode"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_PEOPLE_DETECTED: IntCounter = {
        let metric = IntCounter::new(
            "crowd_people_detected_total",
            "Total number of people emitted by completed analyses",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_FUSION_OUTCOMES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_fusion_outcomes_total",
                "Cross-model fusion decisions (confirmed, unconfirmed, promoted, rejected_pose)",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_FRAMES_SAMPLED: IntCounter = {
        let metric = IntCounter::new(
            "crowd_frames_sampled_total",
            "Total number of video frames sampled by the frame selector",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Result Cache Metrics ====
    pub static ref CROWD_CACHE_LOOKUPS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_cache_lookups_total",
                "Result cache lookups by result (hit, miss)",
            ),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_CACHE_ENTRIES: IntGauge = {
        let metric = IntGauge::new("crowd_cache_entries", "Number of cached analysis results")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
