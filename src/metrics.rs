//! Server metrics.
//!
//! Plain metriken statics: the server is single-threaded, so nothing
//! here needs sharding.

use metriken::{Counter, Gauge, metric};

// ── Connection lifecycle ─────────────────────────────────────────

#[metric(
    name = "ringserve/connections/accepted",
    description = "Total connections accepted"
)]
pub static CONNECTIONS_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "ringserve/connections/closed",
    description = "Total connections closed"
)]
pub static CONNECTIONS_CLOSED: Counter = Counter::new();

#[metric(
    name = "ringserve/connections/active",
    description = "Currently active connections"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(name = "ringserve/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(name = "ringserve/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

// ── Ring utilization ─────────────────────────────────────────────

#[metric(name = "ringserve/cqe/processed", description = "Total CQEs processed")]
pub static CQE_PROCESSED: Counter = Counter::new();

#[metric(
    name = "ringserve/sqe/submit_retries",
    description = "SQE pushes that needed a mid-loop flush"
)]
pub static SUBMISSION_RETRIES: Counter = Counter::new();

#[metric(
    name = "ringserve/sqe/submit_failures",
    description = "SQE submission failures after flush"
)]
pub static SUBMISSION_FAILURES: Counter = Counter::new();

#[metric(
    name = "ringserve/cqe/stale",
    description = "Completions whose context was already consumed"
)]
pub static STALE_COMPLETIONS: Counter = Counter::new();

// ── Request outcomes ─────────────────────────────────────────────

#[metric(
    name = "ringserve/ops/failures",
    description = "Operations completed with a negative result"
)]
pub static OPERATION_FAILURES: Counter = Counter::new();

#[metric(
    name = "ringserve/requests/malformed",
    description = "Requests rejected by the request-line parser"
)]
pub static MALFORMED_REQUESTS: Counter = Counter::new();
