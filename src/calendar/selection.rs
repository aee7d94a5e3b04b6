use crate::model::{CalendarDate, NewBookingRequest};

use super::rates::{Quote, SeasonalRates, total_for_range};
use super::table::OverrideTable;

/// Guests cannot pick occupied dates; admins can click anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Guest,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Empty,
    Partial {
        check_in: CalendarDate,
    },
    Complete {
        check_in: CalendarDate,
        check_out: CalendarDate,
    },
}

/// What a click did to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Click on an occupied date in guest mode; nothing changed.
    Ignored,
    /// Selection (re)started at the clicked date.
    CheckInSet,
    /// Range completed.
    CheckOutSet,
    /// An occupied date lies inside the range. Selection was cleared and the
    /// caller should ask the user to pick again.
    Conflict { occupied: CalendarDate },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    IncompleteSelection,
    MissingField(&'static str),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::IncompleteSelection => write!(f, "select both check-in and check-out"),
            BookingError::MissingField(field) => write!(f, "missing required field: {field}"),
        }
    }
}

impl std::error::Error for BookingError {}

/// First occupied date strictly between `check_in` and `check_out`.
/// The endpoints themselves are never scanned.
pub fn first_occupied_between(
    check_in: CalendarDate,
    check_out: CalendarDate,
    table: &OverrideTable,
) -> Option<CalendarDate> {
    let first_inner = check_in.next_day()?;
    first_inner
        .days_to(check_out)
        .find(|day| table.is_occupied(*day))
}

/// Per-session check-in/check-out selection. Never persisted.
#[derive(Debug, Clone)]
pub struct RangeSelector {
    mode: Mode,
    selection: Selection,
}

impl RangeSelector {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            selection: Selection::Empty,
        }
    }

    pub fn guest() -> Self {
        Self::new(Mode::Guest)
    }

    pub fn admin() -> Self {
        Self::new(Mode::Admin)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn check_in(&self) -> Option<CalendarDate> {
        match self.selection {
            Selection::Empty => None,
            Selection::Partial { check_in } | Selection::Complete { check_in, .. } => Some(check_in),
        }
    }

    pub fn check_out(&self) -> Option<CalendarDate> {
        match self.selection {
            Selection::Complete { check_out, .. } => Some(check_out),
            _ => None,
        }
    }

    pub fn click(&mut self, date: CalendarDate, table: &OverrideTable) -> ClickOutcome {
        if self.mode == Mode::Guest && table.is_occupied(date) {
            return ClickOutcome::Ignored;
        }

        match self.selection {
            Selection::Partial { check_in } if date > check_in => {
                if let Some(occupied) = first_occupied_between(check_in, date, table) {
                    self.selection = Selection::Empty;
                    return ClickOutcome::Conflict { occupied };
                }
                self.selection = Selection::Complete {
                    check_in,
                    check_out: date,
                };
                ClickOutcome::CheckOutSet
            }
            // Empty, a backwards or repeated click, or a click after a
            // completed range all start over at `date`.
            _ => {
                self.selection = Selection::Partial { check_in: date };
                ClickOutcome::CheckInSet
            }
        }
    }

    pub fn reset(&mut self) {
        self.selection = Selection::Empty;
    }

    /// Quote for a completed selection.
    pub fn quote(&self, table: &OverrideTable, rates: &SeasonalRates) -> Option<Quote> {
        match self.selection {
            Selection::Complete {
                check_in,
                check_out,
            } => Some(total_for_range(check_in, check_out, table, rates)),
            _ => None,
        }
    }

    /// Booking request for the current selection, priced against `table`.
    pub fn booking_request(
        &self,
        name: &str,
        email: &str,
        table: &OverrideTable,
        rates: &SeasonalRates,
    ) -> Result<NewBookingRequest, BookingError> {
        let Selection::Complete {
            check_in,
            check_out,
        } = self.selection
        else {
            return Err(BookingError::IncompleteSelection);
        };
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(BookingError::MissingField("name"));
        }
        if email.is_empty() {
            return Err(BookingError::MissingField("email"));
        }
        let quote = total_for_range(check_in, check_out, table, rates);
        if quote.nights == 0 {
            return Err(BookingError::IncompleteSelection);
        }
        Ok(NewBookingRequest {
            name: name.to_string(),
            email: email.to_string(),
            check_in,
            check_out,
            nights: quote.nights,
            total_price: quote.total_price,
        })
    }
}
