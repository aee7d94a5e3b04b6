//! Date-range pricing and occupancy resolution.
//!
//! Everything here is a pure function of an explicit `OverrideTable` and
//! `SeasonalRates`, except the editor and `submit_selection`, which talk to a
//! `SiteStore`.

pub mod datekey;
pub mod editor;
pub mod month;
pub mod rates;
pub mod selection;
pub mod store;
pub mod table;
#[cfg(test)]
mod tests;

pub use datekey::{DateKey, encode};
pub use editor::{EditError, OverrideEditor, SaveOutcome};
pub use month::{DayCell, Mark, MonthView, next_month, prev_month};
pub use rates::{HIGH_SEASON_MONTHS, Quote, SeasonalRates, is_high_season, nightly_rate, total_for_range};
pub use selection::{BookingError, ClickOutcome, Mode, RangeSelector, Selection, first_occupied_between};
pub use store::{PersistError, SiteStore, SubmitError, submit_selection};
pub use table::{DateOverride, OverrideTable};
