use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::engine::Engine;

pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact once the log has grown by `threshold` appends. Returns whether it
/// compacted.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task checking the WAL every `CHECK_INTERVAL`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}
