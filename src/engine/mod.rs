mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use queries::{CalendarDay, QuoteRow};
pub use store::SiteState;

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::calendar::{PersistError, SiteStore};
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that arrive while a flush is pending are written
/// together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so no half-written batch lingers in
    // the buffer.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let r = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(r);
        }
    }
}

/// The site-data store: settings plus the four request tables, made durable
/// through the WAL.
pub struct Engine {
    pub(super) state: SiteState,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Held across WAL append and apply so the log order is the apply order.
    pub(super) write_gate: Mutex<()>,
    /// Monotonic within a millisecond, so listings sort in submission order.
    ids: std::sync::Mutex<ulid::Generator>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let state = SiteState::new();
        for event in &events {
            state.apply(event);
        }
        if !events.is_empty() {
            info!("replayed {} events from {}", events.len(), wal_path.display());
        }

        Ok(Self {
            state,
            wal_tx,
            write_gate: Mutex::new(()),
            ids: std::sync::Mutex::new(ulid::Generator::new()),
        })
    }

    /// Fresh record id, later than every id this engine handed out before.
    pub(super) fn next_id(&self) -> Ulid {
        match self.ids.lock() {
            Ok(mut ids) => ids.generate().unwrap_or_else(|_| Ulid::new()),
            Err(_) => Ulid::new(),
        }
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply. `check` runs under the write gate, so it sees
    /// the state the event will be applied to.
    pub(super) async fn persist_and_apply<F>(&self, event: Event, check: F) -> Result<(), EngineError>
    where
        F: FnOnce(&SiteState) -> Result<(), EngineError>,
    {
        let _gate = self.write_gate.lock().await;
        check(&self.state)?;
        self.wal_append(&event).await?;
        self.state.apply(&event);
        Ok(())
    }
}

fn persist_error(e: EngineError) -> PersistError {
    match e {
        // A failed flush may still have put bytes on disk.
        EngineError::WalError(msg) => PersistError::Unavailable(msg),
        other => PersistError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl SiteStore for Engine {
    async fn update_setting(
        &self,
        key: SettingKey,
        value: serde_json::Value,
    ) -> Result<(), PersistError> {
        Engine::update_setting(self, key, value)
            .await
            .map_err(persist_error)
    }

    async fn submit_booking(
        &self,
        request: NewBookingRequest,
    ) -> Result<BookingRequest, PersistError> {
        self.submit_booking_request(request)
            .await
            .map_err(persist_error)
    }
}
