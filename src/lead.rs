//! Weekly slot arithmetic for reminder lead times.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::time::{ClockTime, MINUTES_PER_DAY, weekday_index};

/// A point in the repeating week: a weekday plus a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeeklySlot {
    pub weekday: Weekday,
    pub time: ClockTime,
}

impl WeeklySlot {
    pub fn new(weekday: Weekday, time: ClockTime) -> Self {
        Self { weekday, time }
    }

    /// Weekday numbering used by recurring platform triggers:
    /// 1 = Sunday through 7 = Saturday.
    pub fn platform_weekday(&self) -> u32 {
        self.weekday.number_from_sunday()
    }

    /// Minutes elapsed since Sunday 00:00.
    pub fn minutes_into_week(&self) -> u32 {
        u32::from(weekday_index(self.weekday)) * MINUTES_PER_DAY
            + self.time.minutes_since_midnight()
    }

    /// The slot `minutes` earlier, stepping back over midnight as often as
    /// needed. Sunday steps back to Saturday.
    pub fn earlier_by(self, minutes: u32) -> Self {
        let day = i64::from(MINUTES_PER_DAY);
        let total = i64::from(self.time.minutes_since_midnight()) - i64::from(minutes);
        let days_back = -total.div_euclid(day);
        let minute_of_day = total.rem_euclid(day) as u32;

        let mut weekday = self.weekday;
        for _ in 0..days_back.rem_euclid(7) {
            weekday = weekday.pred();
        }

        Self {
            weekday,
            time: ClockTime {
                hour: minute_of_day / 60,
                minute: minute_of_day % 60,
            },
        }
    }
}

/// Compute when the pre-class reminder for a class starting at
/// `weekday`/`time` fires, `lead_minutes` earlier.
pub fn adjust_for_lead(weekday: Weekday, time: ClockTime, lead_minutes: u32) -> WeeklySlot {
    WeeklySlot::new(weekday, time).earlier_by(lead_minutes)
}
