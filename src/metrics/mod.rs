
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref SEGMENT_APPEND_RECORDS: IntCounter = IntCounter::new(
        "segment_append_records",
        "Records appended to local segments"
    )
    .expect("metric can not be created");

    pub static ref SEGMENT_APPEND_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "segment_append_latency_seconds",
            "Latency of one segment append batch in seconds"
        )
        .buckets(exponential_buckets(0.00005, 2.0, 16).expect("buckets can be created"))
    )
    .expect("metric can not be created");

    pub static ref SHARD_ROLLOVERS: IntCounter = IntCounter::new(
        "shard_rollovers",
        "Active segments sealed and replaced"
    )
    .expect("metric can not be created");

    pub static ref REQUEST_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "journal_request_latency_seconds",
            "Journal protocol request latency in seconds"
        )
        .buckets(exponential_buckets(0.0001, 2.0, 16).expect("buckets can be created")),
        &["api_key"]
    )
    .expect("metric can not be created");

    pub static ref REQUEST_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("journal_request_errors", "Journal protocol errors by wire code"),
        &["api_key", "code"]
    )
    .expect("metric can not be created");

    pub static ref RAFT_PROPOSAL_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "raft_proposal_latency_seconds",
            "Time from proposal to applied result in seconds"
        )
        .buckets(exponential_buckets(0.0005, 2.0, 14).expect("buckets can be created"))
    )
    .expect("metric can not be created");

    pub static ref RAFT_COMMIT_INDEX: IntGauge = IntGauge::new(
        "raft_commit_index",
        "Commit index of the placement Raft node"
    )
    .expect("metric can not be created");

    pub static ref RAFT_LEADER_CHANGES: IntCounter = IntCounter::new(
        "raft_leader_changes",
        "Times this node became leader"
    )
    .expect("metric can not be created");

    pub static ref SUSPECT_NODES: IntGauge = IntGauge::new(
        "placement_suspect_nodes",
        "Registered nodes that missed consecutive heartbeats"
    )
    .expect("metric can not be created");

    pub static ref HEARTBEAT_MISSES: IntCounterVec = IntCounterVec::new(
        Opts::new("placement_heartbeat_misses", "Heartbeat miss reports per node"),
        &["node_id"]
    )
    .expect("metric can not be created");
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SEGMENT_APPEND_RECORDS.clone()),
        Box::new(SEGMENT_APPEND_LATENCY.clone()),
        Box::new(SHARD_ROLLOVERS.clone()),
        Box::new(REQUEST_LATENCY.clone()),
        Box::new(REQUEST_ERRORS.clone()),
        Box::new(RAFT_PROPOSAL_LATENCY.clone()),
        Box::new(RAFT_COMMIT_INDEX.clone()),
        Box::new(RAFT_LEADER_CHANGES.clone()),
        Box::new(SUSPECT_NODES.clone()),
        Box::new(HEARTBEAT_MISSES.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector can not be registered: {:?}", e);
        }
    }
}

/// Serves `/metrics` until `shutdown_signal` fires.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics")
        .map(|| REGISTRY.clone())
        .and_then(metrics_handler);

    info!("metrics endpoint listening on 0.0.0.0:{}", port);
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    let res = String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    });
    Ok(res)
}
