use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::{BookingRequest, NewBookingRequest, SettingKey};

use super::rates::SeasonalRates;
use super::selection::{BookingError, RangeSelector};
use super::table::OverrideTable;

/// Failure of a call across the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// The store refused or failed the write. Nothing was persisted.
    Rejected(String),
    /// No definitive answer (backend missing, timeout). The write may or may
    /// not have landed.
    Unavailable(String),
}

impl PersistError {
    pub fn is_definitive(&self) -> bool {
        matches!(self, PersistError::Rejected(_))
    }
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Rejected(e) => write!(f, "write rejected: {e}"),
            PersistError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for PersistError {}

/// The site-data store as seen from the pricing/availability core.
#[async_trait]
pub trait SiteStore: Send + Sync {
    /// Replace the whole value stored under `key`. Last write wins.
    async fn update_setting(
        &self,
        key: SettingKey,
        value: serde_json::Value,
    ) -> Result<(), PersistError>;

    /// Hand a booking request to request intake. It is stored as pending.
    async fn submit_booking(
        &self,
        request: NewBookingRequest,
    ) -> Result<BookingRequest, PersistError>;
}

#[derive(Debug)]
pub enum SubmitError {
    Booking(BookingError),
    Persist(PersistError),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Booking(e) => write!(f, "{e}"),
            SubmitError::Persist(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<BookingError> for SubmitError {
    fn from(e: BookingError) -> Self {
        SubmitError::Booking(e)
    }
}

impl From<PersistError> for SubmitError {
    fn from(e: PersistError) -> Self {
        SubmitError::Persist(e)
    }
}

/// Submit the selector's range as a booking request. The selection is reset
/// only once the store accepted the request.
pub async fn submit_selection<S: SiteStore + ?Sized>(
    selector: &mut RangeSelector,
    name: &str,
    email: &str,
    table: &OverrideTable,
    rates: &SeasonalRates,
    store: &S,
) -> Result<BookingRequest, SubmitError> {
    let request = selector.booking_request(name, email, table, rates)?;
    match store.submit_booking(request).await {
        Ok(stored) => {
            debug!(
                "booking request {} stored: {} -> {}, {} nights",
                stored.id, stored.check_in, stored.check_out, stored.nights
            );
            selector.reset();
            Ok(stored)
        }
        Err(e) => {
            warn!("booking request not stored: {e}");
            Err(e.into())
        }
    }
}
