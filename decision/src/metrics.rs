//! Prometheus metrics for the request scheduler.
//!
//! [`SchedulerMetrics`] owns a dedicated [`Registry`]; the embedding process
//! decides where (and whether) to expose it. Attach it with
//! [`Scheduler::with_metrics`](crate::Scheduler::with_metrics).

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct SchedulerMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// New tasks accepted by `push` (priority updates are not counted).
    pub tasks_pushed: IntCounter,
    /// Tasks handed out by `pop`.
    pub tasks_popped: IntCounter,
    /// Tasks tombstoned by `remove`.
    pub tasks_cancelled: IntCounter,
    /// Tombstones discarded, either on pop or by compaction.
    pub tombstones_dropped: IntCounter,
    /// Rounds initialised, including ones that came out empty.
    pub rounds_started: IntCounter,
    /// Bytes charged against round allocations.
    pub bytes_scheduled: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Peers still holding allocation in the current round.
    pub round_peers: IntGauge,
    /// Popped tasks whose completion has not been signalled yet.
    pub in_flight_tasks: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Size of each scheduled task, in bytes.
    pub task_size_bytes: Histogram,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let tasks_pushed = register_int_counter_with_registry!(
            Opts::new("blockswap_tasks_pushed_total", "Total tasks enqueued"),
            registry
        )
        .expect("failed to register tasks_pushed counter");

        let tasks_popped = register_int_counter_with_registry!(
            Opts::new("blockswap_tasks_popped_total", "Total tasks scheduled"),
            registry
        )
        .expect("failed to register tasks_popped counter");

        let tasks_cancelled = register_int_counter_with_registry!(
            Opts::new(
                "blockswap_tasks_cancelled_total",
                "Total queued tasks cancelled"
            ),
            registry
        )
        .expect("failed to register tasks_cancelled counter");

        let tombstones_dropped = register_int_counter_with_registry!(
            Opts::new(
                "blockswap_tombstones_dropped_total",
                "Total cancelled tasks discarded from peer queues"
            ),
            registry
        )
        .expect("failed to register tombstones_dropped counter");

        let rounds_started = register_int_counter_with_registry!(
            Opts::new(
                "blockswap_rounds_started_total",
                "Total round-robin rounds initialised"
            ),
            registry
        )
        .expect("failed to register rounds_started counter");

        let bytes_scheduled = register_int_counter_with_registry!(
            Opts::new(
                "blockswap_bytes_scheduled_total",
                "Total bytes charged against round allocations"
            ),
            registry
        )
        .expect("failed to register bytes_scheduled counter");

        let round_peers = register_int_gauge_with_registry!(
            Opts::new(
                "blockswap_round_peers",
                "Peers with remaining allocation in the current round"
            ),
            registry
        )
        .expect("failed to register round_peers gauge");

        let in_flight_tasks = register_int_gauge_with_registry!(
            Opts::new(
                "blockswap_in_flight_tasks",
                "Scheduled tasks not yet marked done"
            ),
            registry
        )
        .expect("failed to register in_flight_tasks gauge");

        // Block sizes: 64 B → 4 MiB.
        let task_size_bytes = register_histogram_with_registry!(
            HistogramOpts::new("blockswap_task_size_bytes", "Size of scheduled tasks")
                .buckets(prometheus::exponential_buckets(64.0, 4.0, 9).unwrap()),
            registry
        )
        .expect("failed to register task_size_bytes histogram");

        Self {
            registry,
            tasks_pushed,
            tasks_popped,
            tasks_cancelled,
            tombstones_dropped,
            rounds_started,
            bytes_scheduled,
            round_peers,
            in_flight_tasks,
            task_size_bytes,
        }
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode scheduler metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
