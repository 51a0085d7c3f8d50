//! Deciding whether the exam timetable is in effect.
//!
//! The window is compared by calendar day: both dates are inclusive and the
//! time of day never matters.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::model::ExamWindow;
use crate::store::{KeyValueStore, PersistOutcome, StorageKey, load_or_warn, persist};
use crate::time::parse_day_month_year;
use crate::traits::Notifier;

pub const EXAM_PERIOD_ENDED_TITLE: &str = "Exam Period Ended";
pub const EXAM_PERIOD_ENDED_MESSAGE: &str = "Switched back to regular timetable.";

/// Where a day falls relative to the exam window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Disabled,
    Upcoming,
    Active,
    /// Enabled, but the last day has passed.
    Expired,
    /// Enabled with a date that does not parse.
    Malformed,
}

impl WindowStatus {
    pub fn is_active(self) -> bool {
        self == WindowStatus::Active
    }
}

impl ExamWindow {
    /// Parsed `(start, end)` dates, if both are valid.
    pub fn dates(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((
            parse_day_month_year(&self.start_date)?,
            parse_day_month_year(&self.end_date)?,
        ))
    }

    pub fn has_dates(&self) -> bool {
        !self.start_date.trim().is_empty() && !self.end_date.trim().is_empty()
    }

    pub fn status_on(&self, today: NaiveDate) -> WindowStatus {
        if !self.enabled {
            return WindowStatus::Disabled;
        }
        let Some((start, end)) = self.dates() else {
            return WindowStatus::Malformed;
        };

        if today > end {
            WindowStatus::Expired
        } else if today < start {
            WindowStatus::Upcoming
        } else {
            WindowStatus::Active
        }
    }
}

/// Result of one exam-mode check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamModeCheck {
    pub active: bool,
    /// The window was enabled but has ended; it is now disabled.
    pub expired: bool,
    /// The window as it stands after the check.
    pub window: ExamWindow,
    pub persisted: PersistOutcome,
}

/// Reads the stored window and retires it once the exam period is over.
pub struct ExamModeClock {
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
}

impl ExamModeClock {
    pub fn new(store: Arc<dyn KeyValueStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn load_window(&self) -> ExamWindow {
        load_or_warn(self.store.as_ref(), StorageKey::ExamWindow).unwrap_or_default()
    }

    /// Evaluate the stored window for `today`.
    ///
    /// An expired window is switched off, written back and announced once;
    /// later checks see it disabled and stay quiet.
    pub fn check(&self, today: NaiveDate) -> ExamModeCheck {
        let mut window = self.load_window();
        let status = window.status_on(today);

        match status {
            WindowStatus::Expired => {
                window.enabled = false;
                let persisted = persist(self.store.as_ref(), StorageKey::ExamWindow, &window);
                tracing::info!(end = %window.end_date, "Exam period ended");

                if let Err(e) = self
                    .notifier
                    .notify(EXAM_PERIOD_ENDED_TITLE, EXAM_PERIOD_ENDED_MESSAGE)
                {
                    tracing::warn!(error = %e, "Failed to show exam period notice");
                }

                ExamModeCheck {
                    active: false,
                    expired: true,
                    window,
                    persisted,
                }
            }
            WindowStatus::Malformed => {
                tracing::debug!(
                    start = %window.start_date,
                    end = %window.end_date,
                    "Exam window dates unreadable, using regular timetable"
                );
                ExamModeCheck {
                    active: false,
                    expired: false,
                    window,
                    persisted: PersistOutcome::Saved,
                }
            }
            _ => ExamModeCheck {
                active: status.is_active(),
                expired: false,
                window,
                persisted: PersistOutcome::Saved,
            },
        }
    }
}
