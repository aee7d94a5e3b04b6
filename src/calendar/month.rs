use serde::Serialize;

use crate::model::{CalendarDate, Price};

use super::selection::{Mode, Selection};
use super::table::OverrideTable;

/// How a day relates to the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mark {
    None,
    CheckIn,
    CheckOut,
    InRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    pub date: CalendarDate,
    pub occupied: bool,
    /// Not clickable. Only occupied days in guest mode.
    pub disabled: bool,
    pub custom_price: Option<Price>,
    pub mark: Mark,
}

/// One month laid out for a Sunday-first calendar grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthView {
    pub year: i32,
    /// 1-indexed.
    pub month: u32,
    /// Empty cells before the 1st.
    pub leading_blanks: u32,
    pub days: Vec<DayCell>,
}

impl MonthView {
    /// `None` if `(year, month)` is not a real month.
    pub fn build(
        year: i32,
        month: u32,
        table: &OverrideTable,
        selection: Selection,
        mode: Mode,
    ) -> Option<MonthView> {
        let first = CalendarDate::from_ymd(year, month, 1)?;
        let (ny, nm) = next_month(year, month);
        let end = CalendarDate::from_ymd(ny, nm, 1)?;

        let days = first
            .days_to(end)
            .map(|date| {
                let occupied = table.is_occupied(date);
                DayCell {
                    date,
                    occupied,
                    disabled: occupied && mode == Mode::Guest,
                    custom_price: table.custom_price(date),
                    mark: mark_for(date, selection),
                }
            })
            .collect();

        Some(MonthView {
            year,
            month,
            leading_blanks: first.weekday_from_sunday(),
            days,
        })
    }

    pub fn cell(&self, day: u32) -> Option<&DayCell> {
        self.days.get(day.checked_sub(1)? as usize)
    }
}

fn mark_for(date: CalendarDate, selection: Selection) -> Mark {
    match selection {
        Selection::Empty => Mark::None,
        Selection::Partial { check_in } if date == check_in => Mark::CheckIn,
        Selection::Partial { .. } => Mark::None,
        Selection::Complete { check_in, .. } if date == check_in => Mark::CheckIn,
        Selection::Complete { check_out, .. } if date == check_out => Mark::CheckOut,
        Selection::Complete { check_in, check_out } if date > check_in && date < check_out => {
            Mark::InRange
        }
        Selection::Complete { .. } => Mark::None,
    }
}

/// 1-indexed month arithmetic.
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 { (year + 1, 1) } else { (year, month + 1) }
}

pub fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 { (year - 1, 12) } else { (year, month - 1) }
}
