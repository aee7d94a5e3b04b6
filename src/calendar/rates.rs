use serde::{Deserialize, Serialize};

use crate::model::{CalendarDate, Price};

use super::table::OverrideTable;

/// Zero-indexed months billed at the high-season rate (June to September).
pub const HIGH_SEASON_MONTHS: [u32; 4] = [5, 6, 7, 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalRates {
    pub high: Price,
    pub low: Price,
}

impl Default for SeasonalRates {
    fn default() -> Self {
        Self { high: 200, low: 120 }
    }
}

impl SeasonalRates {
    pub fn new(high: Price, low: Price) -> Self {
        Self { high, low }
    }

    pub fn for_date(&self, date: CalendarDate) -> Price {
        if is_high_season(date) { self.high } else { self.low }
    }
}

pub fn is_high_season(date: CalendarDate) -> bool {
    HIGH_SEASON_MONTHS.contains(&date.month0())
}

/// Nights and total price of a stay. Checkout day is not charged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub nights: u32,
    pub total_price: u64,
}

impl Quote {
    /// Rounded average per night, 0 for an empty quote.
    pub fn average_per_night(&self) -> u64 {
        if self.nights == 0 {
            return 0;
        }
        let n = self.nights as u64;
        (self.total_price + n / 2) / n
    }
}

/// Custom price for the date if one is set, else the seasonal rate.
pub fn nightly_rate(date: CalendarDate, table: &OverrideTable, rates: &SeasonalRates) -> Price {
    table
        .custom_price(date)
        .unwrap_or_else(|| rates.for_date(date))
}

/// Sum of nightly rates over `[check_in, check_out)`. A range that is empty or
/// reversed quotes as zero nights and zero price.
pub fn total_for_range(
    check_in: CalendarDate,
    check_out: CalendarDate,
    table: &OverrideTable,
    rates: &SeasonalRates,
) -> Quote {
    let nights = check_in.days_until(&check_out);
    if nights <= 0 {
        return Quote::default();
    }
    let total_price = check_in
        .days_to(check_out)
        .map(|day| nightly_rate(day, table, rates) as u64)
        .sum();
    Quote {
        nights: nights as u32,
        total_price,
    }
}
