use crate::calendar::{
    Mode, MonthView, OverrideTable, Quote, SeasonalRates, Selection, first_occupied_between,
    nightly_rate, total_for_range,
};
use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Price and availability of a stay as served to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRow {
    pub check_in: CalendarDate,
    pub check_out: CalendarDate,
    pub quote: Quote,
    /// False for an empty range or when an occupied night lies strictly
    /// inside it.
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: CalendarDate,
    pub occupied: bool,
    pub nightly_rate: Price,
    pub custom_price: Option<Price>,
}

impl Engine {
    /// Stored value, or the key's default if it was never written.
    pub fn setting(&self, key: SettingKey) -> serde_json::Value {
        self.state
            .setting_json(key)
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_else(|| key.default_value())
    }

    /// Every whitelisted key with its current value.
    pub fn settings(&self) -> Vec<(SettingKey, serde_json::Value)> {
        SettingKey::ALL
            .into_iter()
            .map(|key| (key, self.setting(key)))
            .collect()
    }

    pub fn date_info(&self) -> Result<OverrideTable, EngineError> {
        OverrideTable::from_json(&self.setting(SettingKey::DateInfo)).map_err(EngineError::Invalid)
    }

    pub fn seasonal_rates(&self) -> SeasonalRates {
        let rate = |key: SettingKey, fallback: Price| {
            self.setting(key)
                .as_u64()
                .and_then(|n| Price::try_from(n).ok())
                .unwrap_or(fallback)
        };
        let defaults = SeasonalRates::default();
        SeasonalRates::new(
            rate(SettingKey::HighSeasonRate, defaults.high),
            rate(SettingKey::LowSeasonRate, defaults.low),
        )
    }

    pub fn quote(&self, check_in: CalendarDate, check_out: CalendarDate) -> Result<QuoteRow, EngineError> {
        if check_in.days_until(&check_out) > MAX_STAY_NIGHTS {
            return Err(EngineError::LimitExceeded("stay too long"));
        }
        let table = self.date_info()?;
        let quote = total_for_range(check_in, check_out, &table, &self.seasonal_rates());
        let available =
            quote.nights > 0 && first_occupied_between(check_in, check_out, &table).is_none();
        Ok(QuoteRow {
            check_in,
            check_out,
            quote,
            available,
        })
    }

    /// Month grid over the stored overrides. `month` is 1-indexed.
    pub fn month(
        &self,
        year: i32,
        month: u32,
        selection: Selection,
        mode: Mode,
    ) -> Result<MonthView, EngineError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(EngineError::Invalid(format!(
                "year must be between {MIN_YEAR} and {MAX_YEAR}"
            )));
        }
        let table = self.date_info()?;
        MonthView::build(year, month, &table, selection, mode)
            .ok_or_else(|| EngineError::Invalid(format!("no such month: {year}-{month}")))
    }

    /// One row per day of the month with its resolved nightly rate.
    pub fn calendar_days(&self, year: i32, month: u32) -> Result<Vec<CalendarDay>, EngineError> {
        let view = self.month(year, month, Selection::Empty, Mode::Guest)?;
        let table = self.date_info()?;
        let rates = self.seasonal_rates();
        Ok(view
            .days
            .iter()
            .map(|cell| CalendarDay {
                date: cell.date,
                occupied: cell.occupied,
                nightly_rate: nightly_rate(cell.date, &table, &rates),
                custom_price: cell.custom_price,
            })
            .collect())
    }

    pub fn booking_requests(&self) -> Vec<BookingRequest> {
        self.state.booking_requests()
    }

    pub fn contacts(&self) -> Vec<ContactSubmission> {
        self.state.contacts()
    }

    pub fn questions(&self) -> Vec<UserQuestion> {
        self.state.questions()
    }

    /// Newest first. Pending reviews only when asked for.
    pub fn reviews(&self, include_pending: bool) -> Vec<Review> {
        let mut reviews = self.state.reviews();
        if !include_pending {
            reviews.retain(|r| r.approved);
        }
        reviews
    }
}
