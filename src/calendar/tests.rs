use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ulid::Ulid;

use super::*;
use crate::model::{BookingRequest, CalendarDate, NewBookingRequest, SettingKey};

fn d(y: i32, m: u32, day: u32) -> CalendarDate {
    CalendarDate::from_ymd(y, m, day).unwrap()
}

fn rates() -> SeasonalRates {
    SeasonalRates::new(200, 120)
}

fn select(sel: &mut RangeSelector, table: &OverrideTable, from: CalendarDate, to: CalendarDate) {
    assert_eq!(sel.click(from, table), ClickOutcome::CheckInSet);
    assert_eq!(sel.click(to, table), ClickOutcome::CheckOutSet);
}

// ── Worked scenarios ─────────────────────────────────────

#[test]
fn scenario_high_season_no_overrides() {
    let table = OverrideTable::new();
    let mut sel = RangeSelector::guest();
    select(&mut sel, &table, d(2025, 6, 10), d(2025, 6, 13));
    let quote = sel.quote(&table, &rates()).unwrap();
    assert_eq!(quote, Quote { nights: 3, total_price: 600 });
}

#[test]
fn scenario_custom_price_on_one_night() {
    let mut table = OverrideTable::new();
    table.set(d(2025, 6, 11), DateOverride::priced(250));
    let mut sel = RangeSelector::guest();
    select(&mut sel, &table, d(2025, 6, 10), d(2025, 6, 13));
    let quote = sel.quote(&table, &rates()).unwrap();
    assert_eq!(quote, Quote { nights: 3, total_price: 650 });
}

#[test]
fn scenario_interior_conflict_resets() {
    let mut table = OverrideTable::new();
    table.set(d(2025, 6, 12), DateOverride::occupied());
    let mut sel = RangeSelector::guest();
    assert_eq!(sel.click(d(2025, 6, 10), &table), ClickOutcome::CheckInSet);
    assert_eq!(
        sel.click(d(2025, 6, 15), &table),
        ClickOutcome::Conflict { occupied: d(2025, 6, 12) }
    );
    assert_eq!(sel.selection(), Selection::Empty);
    assert!(sel.quote(&table, &rates()).is_none());
}

#[test]
fn scenario_one_night_stay() {
    let table = OverrideTable::new();
    let mut sel = RangeSelector::guest();
    select(&mut sel, &table, d(2025, 6, 10), d(2025, 6, 11));
    assert_eq!(sel.quote(&table, &rates()).unwrap(), Quote { nights: 1, total_price: 200 });

    // Endpoints are never scanned, so flagging them does not make the range
    // conflict.
    let mut flagged = OverrideTable::new();
    flagged.set(d(2025, 6, 10), DateOverride::occupied());
    flagged.set(d(2025, 6, 11), DateOverride::occupied());
    assert_eq!(first_occupied_between(d(2025, 6, 10), d(2025, 6, 11), &flagged), None);
}

#[test]
fn scenario_click_after_complete_restarts() {
    let table = OverrideTable::new();
    let mut sel = RangeSelector::guest();
    select(&mut sel, &table, d(2025, 6, 10), d(2025, 6, 13));
    assert_eq!(sel.click(d(2025, 6, 20), &table), ClickOutcome::CheckInSet);
    assert_eq!(sel.selection(), Selection::Partial { check_in: d(2025, 6, 20) });
    assert_eq!(sel.check_out(), None);
}

// ── Properties ───────────────────────────────────────────

#[test]
fn total_equals_sum_of_nightly_rates() {
    let mut table = OverrideTable::new();
    table.set(d(2025, 8, 30), DateOverride::priced(330));
    table.set(d(2025, 9, 2), DateOverride { occupied: false, price: Some(90) });
    let r = rates();

    let check_in = d(2025, 8, 25);
    for len in 1..20 {
        let check_out = check_in.days_to(d(2026, 1, 1)).nth(len).unwrap();
        let expected: u64 = check_in
            .days_to(check_out)
            .map(|day| nightly_rate(day, &table, &r) as u64)
            .sum();
        let quote = total_for_range(check_in, check_out, &table, &r);
        assert_eq!(quote.nights as usize, len);
        assert_eq!(quote.total_price, expected);
    }
}

#[test]
fn override_changes_only_its_own_night() {
    let r = rates();
    let check_in = d(2025, 5, 28);
    let check_out = d(2025, 6, 5);
    let base = total_for_range(check_in, check_out, &OverrideTable::new(), &r);

    for day in check_in.days_to(check_out) {
        let mut table = OverrideTable::new();
        table.set(day, DateOverride::priced(999));
        let quote = total_for_range(check_in, check_out, &table, &r);
        let delta = 999i64 - r.for_date(day) as i64;
        assert_eq!(quote.total_price as i64, base.total_price as i64 + delta, "{day}");
        assert_eq!(quote.nights, base.nights);
    }
}

#[test]
fn cleared_override_falls_back_to_season() {
    let r = rates();
    let mut table = OverrideTable::new();
    table.set(d(2025, 11, 3), DateOverride { occupied: true, price: Some(400) });
    assert_eq!(nightly_rate(d(2025, 11, 3), &table, &r), 400);

    table.set(d(2025, 11, 3), DateOverride::default());
    assert!(table.get(d(2025, 11, 3)).is_none());
    assert_eq!(nightly_rate(d(2025, 11, 3), &table, &r), 120);
}

#[test]
fn admin_conflict_scan_still_applies() {
    let mut table = OverrideTable::new();
    table.set(d(2025, 6, 12), DateOverride::occupied());
    let mut sel = RangeSelector::admin();
    sel.click(d(2025, 6, 12), &table);
    assert_eq!(sel.check_in(), Some(d(2025, 6, 12)));
    assert_eq!(sel.click(d(2025, 6, 14), &table), ClickOutcome::CheckOutSet);

    sel.click(d(2025, 6, 10), &table);
    assert!(matches!(sel.click(d(2025, 6, 14), &table), ClickOutcome::Conflict { .. }));
}

// ── Booking submission through a store ──────────────────

#[derive(Default)]
struct IntakeStore {
    accepted: Mutex<Vec<BookingRequest>>,
    fail: bool,
}

#[async_trait]
impl SiteStore for IntakeStore {
    async fn update_setting(&self, _key: SettingKey, _value: serde_json::Value) -> Result<(), PersistError> {
        Ok(())
    }

    async fn submit_booking(&self, request: NewBookingRequest) -> Result<BookingRequest, PersistError> {
        if self.fail {
            return Err(PersistError::Rejected("intake closed".into()));
        }
        let stored = BookingRequest {
            id: Ulid::new(),
            name: request.name,
            email: request.email,
            check_in: request.check_in,
            check_out: request.check_out,
            nights: request.nights,
            total_price: request.total_price,
            submitted_at: 0,
        };
        self.accepted.lock().unwrap().push(stored.clone());
        Ok(stored)
    }
}

#[tokio::test]
async fn successful_submit_resets_selection() {
    let store = IntakeStore::default();
    let mut table = OverrideTable::new();
    table.set(d(2025, 6, 11), DateOverride::priced(250));
    let mut sel = RangeSelector::guest();
    select(&mut sel, &table, d(2025, 6, 10), d(2025, 6, 13));

    let stored = submit_selection(&mut sel, "Anna", "anna@example.com", &table, &rates(), &store)
        .await
        .unwrap();
    assert_eq!(stored.nights, 3);
    assert_eq!(stored.total_price, 650);
    assert_eq!(sel.selection(), Selection::Empty);
    assert_eq!(store.accepted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_submit_keeps_selection() {
    let store = IntakeStore { fail: true, ..Default::default() };
    let table = OverrideTable::new();
    let mut sel = RangeSelector::guest();
    select(&mut sel, &table, d(2025, 6, 10), d(2025, 6, 13));

    let err = submit_selection(&mut sel, "Anna", "anna@example.com", &table, &rates(), &store)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Persist(PersistError::Rejected(_))));
    assert_eq!(sel.check_out(), Some(d(2025, 6, 13)));
}

#[tokio::test]
async fn incomplete_selection_never_reaches_store() {
    let store = IntakeStore::default();
    let table = OverrideTable::new();
    let mut sel = RangeSelector::guest();
    sel.click(d(2025, 6, 10), &table);

    let err = submit_selection(&mut sel, "Anna", "anna@example.com", &table, &rates(), &store)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Booking(BookingError::IncompleteSelection)));
    assert!(store.accepted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn editor_feeds_selection_through_shared_table() {
    let store = Arc::new(IntakeStore::default());
    let mut editor = OverrideEditor::new(store, OverrideTable::new(), rates());
    editor
        .set_override(d(2025, 6, 12), DateOverride::occupied())
        .await
        .unwrap();

    let mut sel = RangeSelector::guest();
    assert_eq!(sel.click(d(2025, 6, 12), editor.table()), ClickOutcome::Ignored);
    sel.click(d(2025, 6, 10), editor.table());
    assert!(matches!(
        sel.click(d(2025, 6, 15), editor.table()),
        ClickOutcome::Conflict { .. }
    ));
}
