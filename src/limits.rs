//! Input limits enforced by the engine before anything reaches the WAL.

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_PHONE_LEN: usize = 64;
pub const MAX_MESSAGE_LEN: usize = 8 * 1024;

/// Serialized JSON size of a single site setting (gallery lists and the
/// override table are the large ones).
pub const MAX_SETTING_VALUE_LEN: usize = 1024 * 1024;

/// Rows kept per request table before inserts are refused.
pub const MAX_RECORDS_PER_TABLE: usize = 100_000;

/// Longest stay a quote or booking request may cover.
pub const MAX_STAY_NIGHTS: i64 = 366;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Calendar years accepted from clients.
pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2200;
