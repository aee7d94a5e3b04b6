use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{CalendarDate, SettingKey};

use super::rates::SeasonalRates;
use super::store::{PersistError, SiteStore};
use super::table::{DateOverride, OverrideTable};

/// Result of a write whose tentative state is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Persisted,
    /// The store gave no definitive answer. The tentative state stays in
    /// memory but may not be stored.
    Unconfirmed,
}

impl SaveOutcome {
    fn and(self, other: SaveOutcome) -> SaveOutcome {
        if self == SaveOutcome::Persisted && other == SaveOutcome::Persisted {
            SaveOutcome::Persisted
        } else {
            SaveOutcome::Unconfirmed
        }
    }
}

/// A definitive persistence failure. The in-memory value for `key` has
/// already been restored to its snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditError {
    pub key: SettingKey,
    pub source: PersistError,
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "saving {} failed, changes reverted: {}", self.key, self.source)
    }
}

impl std::error::Error for EditError {}

/// Admin-side holder of the override table and seasonal rates.
///
/// Every edit is two-phase: snapshot the current value, apply the tentative
/// value, then persist the whole value. A definitive failure restores the
/// snapshot; an ambiguous one keeps the tentative value.
///
/// Writes replace the entire `dateInfo` value. Two editors working from
/// different snapshots overwrite each other; the last write to land wins.
pub struct OverrideEditor<S: ?Sized> {
    store: Arc<S>,
    table: OverrideTable,
    rates: SeasonalRates,
}

impl<S: SiteStore + ?Sized> OverrideEditor<S> {
    pub fn new(store: Arc<S>, table: OverrideTable, rates: SeasonalRates) -> Self {
        Self { store, table, rates }
    }

    pub fn table(&self) -> &OverrideTable {
        &self.table
    }

    pub fn rates(&self) -> SeasonalRates {
        self.rates
    }

    /// Set or clear the override for one date. `occupied=false` with no
    /// price removes the entry.
    pub async fn set_override(
        &mut self,
        date: CalendarDate,
        entry: DateOverride,
    ) -> Result<SaveOutcome, EditError> {
        let mut tentative = self.table.clone();
        tentative.set(date, entry);
        let value = tentative.to_json();
        write_tentative(&*self.store, &mut self.table, tentative, SettingKey::DateInfo, value).await
    }

    /// Drop every override.
    pub async fn clear_all(&mut self) -> Result<SaveOutcome, EditError> {
        write_tentative(
            &*self.store,
            &mut self.table,
            OverrideTable::new(),
            SettingKey::DateInfo,
            serde_json::json!({}),
        )
        .await
    }

    /// Persist each rate that changed. Stops at the first definitive failure;
    /// a rate already persisted before it stays persisted.
    pub async fn set_seasonal_rates(
        &mut self,
        rates: SeasonalRates,
    ) -> Result<SaveOutcome, EditError> {
        let mut outcome = SaveOutcome::Persisted;
        if rates.high != self.rates.high {
            let tentative = SeasonalRates { high: rates.high, ..self.rates };
            let o = write_tentative(
                &*self.store,
                &mut self.rates,
                tentative,
                SettingKey::HighSeasonRate,
                serde_json::Value::from(rates.high),
            )
            .await?;
            outcome = outcome.and(o);
        }
        if rates.low != self.rates.low {
            let tentative = SeasonalRates { low: rates.low, ..self.rates };
            let o = write_tentative(
                &*self.store,
                &mut self.rates,
                tentative,
                SettingKey::LowSeasonRate,
                serde_json::Value::from(rates.low),
            )
            .await?;
            outcome = outcome.and(o);
        }
        Ok(outcome)
    }
}

async fn write_tentative<S, T>(
    store: &S,
    slot: &mut T,
    tentative: T,
    key: SettingKey,
    value: serde_json::Value,
) -> Result<SaveOutcome, EditError>
where
    S: SiteStore + ?Sized,
    T: Send,
{
    let snapshot = std::mem::replace(slot, tentative);
    match store.update_setting(key, value).await {
        Ok(()) => {
            debug!("saved {key}");
            Ok(SaveOutcome::Persisted)
        }
        Err(source) if source.is_definitive() => {
            *slot = snapshot;
            warn!("saving {key} failed, restored previous value: {source}");
            Err(EditError { key, source })
        }
        Err(source) => {
            warn!("saving {key} not confirmed, keeping local change: {source}");
            Ok(SaveOutcome::Unconfirmed)
        }
    }
}
