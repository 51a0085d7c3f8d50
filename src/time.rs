//! Time, date and weekday text handling.
//!
//! Entries keep their times as display strings (`"9:00 AM"`) and exam dates as
//! `DD/MM/YYYY`, so everything that does arithmetic on them goes through the
//! parsers in this module first.

use std::fmt;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Minutes in one nominal day.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A wall-clock time of day with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    /// Create a time, rejecting hours outside 0-23 and minutes outside 0-59.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Build a time from minutes since midnight.
    pub fn from_minutes(total: u32) -> Option<Self> {
        (total < MINUTES_PER_DAY).then_some(Self {
            hour: total / 60,
            minute: total % 60,
        })
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    /// Display form used everywhere in stored entries, e.g. `"2:30 PM"`.
    pub fn to_12_hour(&self) -> String {
        format_12_hour(self.hour, self.minute)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_12_hour())
    }
}

// ==================== Time Parsing ====================

/// Parse a time typed by the user.
///
/// Two grammars are accepted:
/// - `H:MM AM|PM` (case-insensitive, hour 1-12, optional space before the
///   meridiem)
/// - bare 24-hour `HH:MM` (hour 0-23, one or two digits)
///
/// Minutes are always exactly two digits. Surrounding whitespace is ignored.
pub fn parse_time(text: &str) -> Option<ClockTime> {
    let text = text.trim();

    if let Some((clock, is_pm)) = split_meridiem(text) {
        let (hour, minute) = split_hour_minute(clock)?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (hour, is_pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return ClockTime::new(hour, minute);
    }

    let (hour, minute) = split_hour_minute(text)?;
    ClockTime::new(hour, minute)
}

/// Split a trailing `AM`/`PM` off the text. Returns the remaining clock part
/// and whether the meridiem was PM.
fn split_meridiem(text: &str) -> Option<(&str, bool)> {
    let cut = text.len().checked_sub(2)?;
    if !text.is_char_boundary(cut) {
        return None;
    }
    let (head, suffix) = text.split_at(cut);
    let is_pm = if suffix.eq_ignore_ascii_case("pm") {
        true
    } else if suffix.eq_ignore_ascii_case("am") {
        false
    } else {
        return None;
    };
    Some((head.trim_end(), is_pm))
}

fn split_hour_minute(text: &str) -> Option<(u32, u32)> {
    let (hour, minute) = text.split_once(':')?;
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    if !(1..=2).contains(&hour.len()) || minute.len() != 2 {
        return None;
    }
    if !all_digits(hour) || !all_digits(minute) {
        return None;
    }
    Some((hour.parse().ok()?, minute.parse().ok()?))
}

/// Format an hour (0-23) and minute as `H:MM AM|PM`.
pub fn format_12_hour(hour: u32, minute: u32) -> String {
    let meridiem = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour {
        0 => 12,
        h if h > 12 => h - 12,
        h => h,
    };
    format!("{display_hour}:{minute:02} {meridiem}")
}

/// Reformat any accepted time into the 12-hour display form. Unparseable text
/// is returned unchanged.
pub fn normalize_display(text: &str) -> String {
    parse_time(text)
        .map(|t| t.to_12_hour())
        .unwrap_or_else(|| text.to_string())
}

// ==================== Dates ====================

/// Parse a `DD/MM/YYYY` date. Single-digit day and month are accepted.
pub fn parse_day_month_year(text: &str) -> Option<NaiveDate> {
    let mut parts = text.trim().split('/');
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let year: i32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn format_day_month_year(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

// ==================== Input Auto-Formatting ====================

/// Tidy a time field while the user types.
///
/// Anything containing `A` or `P` is treated as a meridiem time and only
/// cleaned and upper-cased. Plain digits get a colon inserted before the last
/// two (`"930"` becomes `"9:30"`).
pub fn format_time_input(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| {
            c.is_ascii_digit()
                || c.is_whitespace()
                || matches!(c.to_ascii_uppercase(), ':' | 'A' | 'P' | 'M')
        })
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.contains(['A', 'P']) {
        return cleaned;
    }

    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        0..=2 => digits,
        3 | 4 => {
            let (hour, minute) = digits.split_at(digits.len() - 2);
            format!("{hour}:{minute}")
        }
        _ => format!("{}:{}", &digits[..2], &digits[2..4]),
    }
}

/// Tidy a date field while the user types: `"01022025"` becomes `"01/02/2025"`.
pub fn format_date_input(text: &str) -> String {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        0..=2 => digits,
        3 | 4 => format!("{}/{}", &digits[..2], &digits[2..]),
        5..=8 => format!("{}/{}/{}", &digits[..2], &digits[2..4], &digits[4..]),
        _ => format!("{}/{}/{}", &digits[..2], &digits[2..4], &digits[4..8]),
    }
}

// ==================== Weekdays ====================

/// Stored weekday index, Sunday = 0 through Saturday = 6.
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// Inverse of [`weekday_index`].
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Parse a weekday given as a stored index (`"0"`..`"6"`) or an English name
/// (`"mon"`, `"Monday"`).
pub fn parse_weekday(text: &str) -> Option<Weekday> {
    let text = text.trim();
    if let Ok(index) = text.parse::<u8>() {
        return weekday_from_index(index);
    }
    text.parse().ok()
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

pub fn weekday_short(weekday: Weekday) -> &'static str {
    &weekday_name(weekday)[..3]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(hour: u32, minute: u32) -> Option<ClockTime> {
        ClockTime::new(hour, minute)
    }

    // ==================== parse_time Tests ====================

    #[test]
    fn test_parse_12_hour_morning() {
        assert_eq!(parse_time("9:00 AM"), hm(9, 0));
        assert_eq!(parse_time("11:45 am"), hm(11, 45));
    }

    #[test]
    fn test_parse_12_hour_afternoon() {
        assert_eq!(parse_time("2:30 PM"), hm(14, 30));
        assert_eq!(parse_time("11:59 pm"), hm(23, 59));
    }

    #[test]
    fn test_parse_noon_and_midnight() {
        assert_eq!(parse_time("12:00 PM"), hm(12, 0));
        assert_eq!(parse_time("12:00 AM"), hm(0, 0));
        assert_eq!(parse_time("12:30 AM"), hm(0, 30));
    }

    #[test]
    fn test_parse_meridiem_without_space_and_padding() {
        assert_eq!(parse_time("7:05PM"), hm(19, 5));
        assert_eq!(parse_time("  7:05   pm  "), hm(19, 5));
        assert_eq!(parse_time("07:05 AM"), hm(7, 5));
    }

    #[test]
    fn test_parse_24_hour() {
        assert_eq!(parse_time("14:30"), hm(14, 30));
        assert_eq!(parse_time("0:00"), hm(0, 0));
        assert_eq!(parse_time("23:59"), hm(23, 59));
        assert_eq!(parse_time(" 9:15 "), hm(9, 15));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert_eq!(parse_time("13:00 AM"), None);
        assert_eq!(parse_time("0:30 PM"), None);
        assert_eq!(parse_time("9:60 AM"), None);
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("24:00"), None);
        assert_eq!(parse_time("12:60"), None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_time(""), None);
        assert_eq!(parse_time("9"), None);
        assert_eq!(parse_time("9:0 AM"), None);
        assert_eq!(parse_time("9:000"), None);
        assert_eq!(parse_time("123:00"), None);
        assert_eq!(parse_time("9:00 XM"), None);
        assert_eq!(parse_time("nine:thirty"), None);
        assert_eq!(parse_time("9.30"), None);
        assert_eq!(parse_time("+9:30"), None);
    }

    // ==================== Formatting Tests ====================

    #[test]
    fn test_format_12_hour() {
        assert_eq!(format_12_hour(0, 0), "12:00 AM");
        assert_eq!(format_12_hour(0, 5), "12:05 AM");
        assert_eq!(format_12_hour(9, 0), "9:00 AM");
        assert_eq!(format_12_hour(12, 0), "12:00 PM");
        assert_eq!(format_12_hour(13, 7), "1:07 PM");
        assert_eq!(format_12_hour(23, 59), "11:59 PM");
    }

    #[test]
    fn test_normalize_display() {
        assert_eq!(normalize_display("14:30"), "2:30 PM");
        assert_eq!(normalize_display("9:00 am"), "9:00 AM");
        assert_eq!(normalize_display("soon"), "soon");
    }

    #[test]
    fn test_clock_time_bounds() {
        assert!(ClockTime::new(24, 0).is_none());
        assert!(ClockTime::new(0, 60).is_none());
        assert_eq!(ClockTime::from_minutes(615), hm(10, 15));
        assert!(ClockTime::from_minutes(MINUTES_PER_DAY).is_none());
    }

    // ==================== Date Tests ====================

    #[test]
    fn test_parse_day_month_year() {
        assert_eq!(
            parse_day_month_year("05/03/2025"),
            NaiveDate::from_ymd_opt(2025, 3, 5)
        );
        assert_eq!(
            parse_day_month_year("5/3/2025"),
            NaiveDate::from_ymd_opt(2025, 3, 5)
        );
        assert_eq!(parse_day_month_year("31/02/2025"), None);
        assert_eq!(parse_day_month_year("2025-03-05"), None);
        assert_eq!(parse_day_month_year("05/03"), None);
        assert_eq!(parse_day_month_year("05/03/2025/1"), None);
        assert_eq!(parse_day_month_year(""), None);
    }

    #[test]
    fn test_format_day_month_year_pads() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert_eq!(format_day_month_year(date), "05/03/2025");
    }

    // ==================== Input Formatter Tests ====================

    #[test]
    fn test_format_time_input_digits() {
        assert_eq!(format_time_input("9"), "9");
        assert_eq!(format_time_input("93"), "93");
        assert_eq!(format_time_input("930"), "9:30");
        assert_eq!(format_time_input("1430"), "14:30");
        assert_eq!(format_time_input("143055"), "14:30");
    }

    #[test]
    fn test_format_time_input_keeps_meridiem() {
        assert_eq!(format_time_input("9:30 pm"), "9:30 PM");
        assert_eq!(format_time_input("9:30x am!"), "9:30 AM");
    }

    #[test]
    fn test_format_date_input() {
        assert_eq!(format_date_input("01"), "01");
        assert_eq!(format_date_input("0102"), "01/02");
        assert_eq!(format_date_input("01022025"), "01/02/2025");
        assert_eq!(format_date_input("01-02-2025-99"), "01/02/2025");
    }

    // ==================== Weekday Tests ====================

    #[test]
    fn test_weekday_index_is_sunday_first() {
        assert_eq!(weekday_index(Weekday::Sun), 0);
        assert_eq!(weekday_index(Weekday::Mon), 1);
        assert_eq!(weekday_index(Weekday::Sat), 6);
        for index in 0..7 {
            let weekday = weekday_from_index(index).unwrap();
            assert_eq!(weekday_index(weekday), index);
        }
        assert_eq!(weekday_from_index(7), None);
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("2"), Some(Weekday::Tue));
        assert_eq!(parse_weekday("mon"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("Saturday"), Some(Weekday::Sat));
        assert_eq!(parse_weekday("9"), None);
        assert_eq!(parse_weekday("someday"), None);
    }

    #[test]
    fn test_weekday_labels() {
        assert_eq!(weekday_name(Weekday::Wed), "Wednesday");
        assert_eq!(weekday_short(Weekday::Wed), "Wed");
        assert_eq!(weekday_short(Weekday::Sun), "Sun");
    }

    // ==================== Property-Based Tests ====================

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn format_then_parse_round_trips(hour in 0u32..24, minute in 0u32..60) {
                let text = format_12_hour(hour, minute);
                prop_assert_eq!(parse_time(&text), ClockTime::new(hour, minute),
                    "round trip failed for {}", text);
            }

            #[test]
            fn bare_24_hour_parses_to_itself(hour in 0u32..24, minute in 0u32..60) {
                let text = format!("{hour}:{minute:02}");
                prop_assert_eq!(parse_time(&text), ClockTime::new(hour, minute));
            }

            #[test]
            fn date_format_round_trips(days in 0i64..40_000) {
                let date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
                    + chrono::Duration::days(days);
                prop_assert_eq!(parse_day_month_year(&format_day_month_year(date)), Some(date));
            }
        }
    }
}
