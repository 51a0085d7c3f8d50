//! Persisted timetable entities.
//!
//! Field names and value shapes follow the stored JSON documents
//! (`startTime`, `notifId`, ...), so data written by earlier builds still
//! loads.

use chrono::Weekday;
use serde::{Deserialize, Deserializer, Serialize};

use crate::time::{ClockTime, parse_time};

/// Prefix of the handle stored when notification scheduling failed.
pub const PLACEHOLDER_PREFIX: &str = "placeholder_";

/// Which entry collection an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Mode {
    #[default]
    Regular,
    Exam,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Regular => "regular",
            Mode::Exam => "exam",
        }
    }
}

// ==================== Notification Handles ====================

/// Handles of the notifications scheduled for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationHandles {
    /// Lead reminder handle followed by the on-start handle.
    Pair([String; 2]),
    /// A placeholder marker, or a single handle written by older builds.
    Single(String),
}

impl NotificationHandles {
    pub fn pair(lead: String, start: String) -> Self {
        Self::Pair([lead, start])
    }

    pub fn placeholder(entry_id: &str) -> Self {
        Self::Single(format!("{PLACEHOLDER_PREFIX}{entry_id}"))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Single(id) if id.starts_with(PLACEHOLDER_PREFIX))
    }

    /// Handles that refer to real scheduled notifications.
    pub fn live(&self) -> Vec<&str> {
        match self {
            Self::Pair(ids) => ids.iter().map(String::as_str).collect(),
            Self::Single(_) if self.is_placeholder() => Vec::new(),
            Self::Single(id) => vec![id.as_str()],
        }
    }
}

// ==================== Entry ====================

/// One weekly class or exam occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(deserialize_with = "text_or_number")]
    pub id: String,
    pub subject: String,
    #[serde(with = "weekday_index_serde")]
    pub weekday: Weekday,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, deserialize_with = "lead_minutes")]
    pub lead: u32,
    #[serde(default)]
    pub notif_id: Option<NotificationHandles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_date: Option<String>,
}

impl Entry {
    pub fn start(&self) -> Option<ClockTime> {
        parse_time(&self.start_time)
    }

    pub fn end(&self) -> Option<ClockTime> {
        parse_time(&self.end_time)
    }

    /// Handles that should be cancelled when this entry goes away.
    pub fn live_handles(&self) -> Vec<&str> {
        self.notif_id
            .as_ref()
            .map(NotificationHandles::live)
            .unwrap_or_default()
    }

    pub fn has_placeholder(&self) -> bool {
        self.notif_id
            .as_ref()
            .is_some_and(NotificationHandles::is_placeholder)
    }
}

/// Order entries by weekday, then by start time of day.
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by_key(|e| {
        (
            e.weekday.num_days_from_sunday(),
            e.start().map(|t| t.minutes_since_midnight()),
            e.start_time.clone(),
        )
    });
}

// ==================== Exam Window ====================

/// The persisted exam period. Dates are `DD/MM/YYYY` text as entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamWindow {
    pub enabled: bool,
    pub start_date: String,
    pub end_date: String,
}

// ==================== Templates ====================

/// A saved start/end time pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeTemplate {
    pub start_time: String,
    pub end_time: String,
    pub name: String,
}

impl TimeTemplate {
    pub fn new(start_time: String, end_time: String, name: Option<&str>) -> Self {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{start_time} - {end_time}"));
        Self {
            start_time,
            end_time,
            name,
        }
    }
}

/// A saved exam-day layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamScheduleTemplate {
    pub name: String,
    #[serde(deserialize_with = "count")]
    pub duration: u32,
    #[serde(deserialize_with = "count")]
    pub exams_per_day: u32,
    #[serde(deserialize_with = "count")]
    pub gap: u32,
    pub start_time: String,
}

impl ExamScheduleTemplate {
    /// A user-saved layout, named after its shape (`Custom 2x3h`).
    pub fn custom(exams_per_day: u32, duration: u32, gap: u32, start_time: String) -> Self {
        Self {
            name: format!("Custom {exams_per_day}x{duration}h"),
            duration,
            exams_per_day,
            gap,
            start_time,
        }
    }
}

/// Exam titles offered before the user has saved any.
pub fn default_exam_titles() -> Vec<String> {
    [
        "Midterm Exam",
        "Final Exam",
        "Quiz",
        "Unit Test",
        "Semester Exam",
        "Internal Test",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Exam layouts offered before the user has saved any.
pub fn default_exam_schedules() -> Vec<ExamScheduleTemplate> {
    let preset = |name: &str, duration, exams_per_day, gap, start: &str| ExamScheduleTemplate {
        name: name.to_string(),
        duration,
        exams_per_day,
        gap,
        start_time: start.to_string(),
    };
    vec![
        preset("Morning Session", 3, 2, 30, "9:00 AM"),
        preset("Afternoon Session", 2, 3, 15, "2:00 PM"),
        preset("Full Day", 2, 4, 20, "9:00 AM"),
    ]
}

// ==================== Serde Helpers ====================

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Integer(i64),
    Float(f64),
    Text(String),
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Integer(n) => n.to_string(),
        TextOrNumber::Float(n) => n.to_string(),
        TextOrNumber::Text(s) => s,
    })
}

/// Lead minutes were stored as numbers by some builds and as strings by
/// others. Null, negative or unparseable values clamp to zero.
fn lead_minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let minutes = match Option::<TextOrNumber>::deserialize(deserializer)? {
        Some(TextOrNumber::Integer(n)) => n,
        Some(TextOrNumber::Float(n)) => n as i64,
        Some(TextOrNumber::Text(s)) => s.trim().parse::<i64>().unwrap_or(0),
        None => 0,
    };
    Ok(minutes.clamp(0, i64::from(u32::MAX)) as u32)
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    use serde::de::Error;

    let value = match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Integer(n) => n,
        TextOrNumber::Float(n) => n as i64,
        TextOrNumber::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("expected a whole number, got {s:?}")))?,
    };
    u32::try_from(value).map_err(|_| D::Error::custom(format!("{value} is out of range")))
}

mod weekday_index_serde {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use crate::time::{weekday_from_index, weekday_index};

    pub fn serialize<S: Serializer>(weekday: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(weekday_index(*weekday))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Weekday, D::Error> {
        let index = u8::deserialize(deserializer)?;
        weekday_from_index(index)
            .ok_or_else(|| D::Error::custom(format!("weekday {index} is outside 0..=6")))
    }
}
