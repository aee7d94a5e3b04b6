use std::fmt;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for submission timestamps.
pub type Ms = i64;

/// Nightly price in whole currency units.
pub type Price = u32;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// A calendar day. No time-of-day component; ordering is (year, month, day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    /// `month` is 1-indexed. Returns `None` for impossible dates.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Takes the local calendar fields of `instant`, never its UTC date.
    pub fn from_local(instant: &DateTime<Local>) -> Self {
        Self(instant.date_naive())
    }

    /// Local calendar day of a Unix-millisecond instant.
    pub fn from_instant_ms(ms: Ms) -> Option<Self> {
        Local
            .timestamp_millis_opt(ms)
            .single()
            .map(|dt| Self::from_local(&dt))
    }

    pub fn today() -> Self {
        Self::from_local(&Local::now())
    }

    /// Parses the `YYYY-MM-DD` form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok().map(Self)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 1-indexed month.
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// 0-indexed month (January = 0), the numbering used for season tables.
    pub fn month0(&self) -> u32 {
        self.0.month0()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Column of this day in a Sunday-first week (Sunday = 0).
    pub fn weekday_from_sunday(&self) -> u32 {
        self.0.weekday().num_days_from_sunday()
    }

    pub fn next_day(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// Signed number of days from `self` to `later`.
    pub fn days_until(&self, later: &CalendarDate) -> i64 {
        (later.0 - self.0).num_days()
    }

    /// Every day in the half-open range `[self, end)`.
    pub fn days_to(self, end: CalendarDate) -> impl Iterator<Item = CalendarDate> {
        self.0
            .iter_days()
            .take_while(move |d| *d < end.0)
            .map(CalendarDate)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

/// Whitelisted keys of the `site_settings` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    SiteContent,
    HeroImage,
    GalleryImages,
    IsQuizEnabled,
    DateInfo,
    HighSeasonRate,
    LowSeasonRate,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::SiteContent,
        SettingKey::HeroImage,
        SettingKey::GalleryImages,
        SettingKey::IsQuizEnabled,
        SettingKey::DateInfo,
        SettingKey::HighSeasonRate,
        SettingKey::LowSeasonRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::SiteContent => "siteContent",
            SettingKey::HeroImage => "heroImage",
            SettingKey::GalleryImages => "galleryImages",
            SettingKey::IsQuizEnabled => "isQuizEnabled",
            SettingKey::DateInfo => "dateInfo",
            SettingKey::HighSeasonRate => "highSeasonRate",
            SettingKey::LowSeasonRate => "lowSeasonRate",
        }
    }

    pub fn parse(s: &str) -> Option<SettingKey> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Value served for a key that has never been written.
    pub fn default_value(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            SettingKey::SiteContent => json!({}),
            SettingKey::HeroImage => json!("/images/hero/hero_image_01.jpg"),
            SettingKey::GalleryImages => json!([]),
            SettingKey::IsQuizEnabled => json!(true),
            SettingKey::DateInfo => json!({}),
            SettingKey::HighSeasonRate => json!(200),
            SettingKey::LowSeasonRate => json!(120),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload handed to the request-intake store when a guest books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookingRequest {
    pub name: String,
    pub email: String,
    pub check_in: CalendarDate,
    pub check_out: CalendarDate,
    pub nights: u32,
    pub total_price: u64,
}

/// A pending booking request. No confirmation or payment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub check_in: CalendarDate,
    pub check_out: CalendarDate,
    pub nights: u32,
    pub total_price: u64,
    pub submitted_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub submitted_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuestion {
    pub id: Ulid,
    pub email: String,
    pub question: String,
    pub submitted_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Ulid,
    pub name: String,
    /// 1 to 5.
    pub rating: u8,
    pub comment: String,
    pub submitted_at: Ms,
    pub approved: bool,
}

/// WAL record format. Setting values travel as JSON text because bincode
/// cannot carry a self-describing `serde_json::Value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SettingUpdated { key: SettingKey, value: String },
    BookingRequested(BookingRequest),
    BookingRequestDeleted { id: Ulid },
    ContactSubmitted(ContactSubmission),
    ContactDeleted { id: Ulid },
    QuestionSubmitted(UserQuestion),
    QuestionDeleted { id: Ulid },
    ReviewSubmitted(Review),
    ReviewApproved { id: Ulid },
    ReviewDeleted { id: Ulid },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> CalendarDate {
        CalendarDate::from_ymd(y, m, day).unwrap()
    }

    #[test]
    fn calendar_date_ordering() {
        assert!(d(2025, 6, 10) < d(2025, 6, 11));
        assert!(d(2025, 6, 30) < d(2025, 7, 1));
        assert!(d(2024, 12, 31) < d(2025, 1, 1));
        assert_eq!(d(2025, 6, 10), d(2025, 6, 10));
    }

    #[test]
    fn month0_is_zero_indexed() {
        assert_eq!(d(2025, 1, 15).month0(), 0);
        assert_eq!(d(2025, 6, 1).month0(), 5);
        assert_eq!(d(2025, 12, 31).month0(), 11);
    }

    #[test]
    fn impossible_dates_rejected() {
        assert!(CalendarDate::from_ymd(2025, 2, 29).is_none());
        assert!(CalendarDate::from_ymd(2024, 2, 29).is_some());
        assert!(CalendarDate::from_ymd(2025, 13, 1).is_none());
    }

    #[test]
    fn days_until_counts_across_months() {
        assert_eq!(d(2025, 6, 10).days_until(&d(2025, 6, 13)), 3);
        assert_eq!(d(2025, 6, 28).days_until(&d(2025, 7, 2)), 4);
        assert_eq!(d(2025, 6, 13).days_until(&d(2025, 6, 10)), -3);
    }

    #[test]
    fn days_to_is_half_open() {
        let days: Vec<_> = d(2025, 6, 10).days_to(d(2025, 6, 13)).collect();
        assert_eq!(days, vec![d(2025, 6, 10), d(2025, 6, 11), d(2025, 6, 12)]);
        assert_eq!(d(2025, 6, 10).days_to(d(2025, 6, 10)).count(), 0);
        assert_eq!(d(2025, 6, 10).days_to(d(2025, 6, 1)).count(), 0);
    }

    #[test]
    fn display_and_parse_agree() {
        let date = d(2025, 3, 7);
        assert_eq!(date.to_string(), "2025-03-07");
        assert_eq!(CalendarDate::parse("2025-03-07"), Some(date));
        assert_eq!(CalendarDate::parse("2025-3-7"), Some(date));
        assert!(CalendarDate::parse("07/03/2025").is_none());
    }

    #[test]
    fn instant_maps_to_local_day() {
        let noon = Local.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).single().unwrap();
        let late = Local.with_ymd_and_hms(2025, 6, 10, 23, 59, 0).single().unwrap();
        let early = Local.with_ymd_and_hms(2025, 6, 10, 0, 1, 0).single().unwrap();
        for instant in [noon, late, early] {
            assert_eq!(
                CalendarDate::from_instant_ms(instant.timestamp_millis()),
                Some(d(2025, 6, 10))
            );
        }
    }

    #[test]
    fn weekday_from_sunday() {
        // 2025-06-01 is a Sunday.
        assert_eq!(d(2025, 6, 1).weekday_from_sunday(), 0);
        assert_eq!(d(2025, 6, 7).weekday_from_sunday(), 6);
    }

    #[test]
    fn setting_key_whitelist() {
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(SettingKey::parse("dateInfo"), Some(SettingKey::DateInfo));
        assert_eq!(SettingKey::parse("adminPassword"), None);
        assert_eq!(SettingKey::parse("dateinfo"), None);
    }

    #[test]
    fn default_rates() {
        assert_eq!(SettingKey::HighSeasonRate.default_value(), serde_json::json!(200));
        assert_eq!(SettingKey::LowSeasonRate.default_value(), serde_json::json!(120));
        assert!(SettingKey::DateInfo.default_value().as_object().unwrap().is_empty());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingRequested(BookingRequest {
            id: Ulid::new(),
            name: "Anna".into(),
            email: "anna@example.com".into(),
            check_in: d(2025, 6, 10),
            check_out: d(2025, 6, 13),
            nights: 3,
            total_price: 600,
            submitted_at: 1_700_000_000_000,
        });
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
