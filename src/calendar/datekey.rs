use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::CalendarDate;

/// Canonical `YYYY-MM-DD` key of a calendar day, used to index the override table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateKey(String);

impl DateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts only strings that are already canonical keys.
    pub fn from_canonical(s: &str) -> Option<DateKey> {
        let date = CalendarDate::parse(s)?;
        let key = encode(date);
        (key.0 == s).then_some(key)
    }
}

/// Zero-padded, 1-indexed month, taken from the date's own calendar fields.
pub fn encode(date: CalendarDate) -> DateKey {
    DateKey(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month(),
        date.day()
    ))
}

impl From<CalendarDate> for DateKey {
    fn from(date: CalendarDate) -> Self {
        encode(date)
    }
}

impl Borrow<str> for DateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
