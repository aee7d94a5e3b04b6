use std::net::SocketAddr;

use crate::sql::{Command, RequestTable};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "villetta_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "villetta_query_duration_seconds";

/// Counter: admin-only commands refused to a guest login.
pub const PERMISSION_DENIED_TOTAL: &str = "villetta_permission_denied_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "villetta_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "villetta_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "villetta_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "villetta_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "villetta_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metric label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::UpsertSetting { .. } => "upsert_setting",
        Command::SelectSettings { .. } => "select_settings",
        Command::InsertBookingRequest(_) => "insert_booking_request",
        Command::InsertContact { .. } => "insert_contact",
        Command::InsertQuestion { .. } => "insert_question",
        Command::InsertReview { .. } => "insert_review",
        Command::Select(RequestTable::BookingRequests) => "select_booking_requests",
        Command::Select(RequestTable::ContactSubmissions) => "select_contacts",
        Command::Select(RequestTable::UserQuestions) => "select_questions",
        Command::Select(RequestTable::Reviews) => "select_reviews",
        Command::Delete { .. } => "delete",
        Command::ApproveReview { .. } => "approve_review",
        Command::SelectQuote { .. } => "select_quote",
        Command::SelectCalendar { .. } => "select_calendar",
    }
}
