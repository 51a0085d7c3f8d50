//! Smart Table Library
//!
//! Weekly class timetables and generated exam timetables, with a lead-time
//! reminder and an on-start alert scheduled for every entry.

pub mod config;
pub mod error;
pub mod exam;
pub mod exam_mode;
pub mod lead;
pub mod local_scheduler;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod time;
pub mod timetable;
pub mod traits;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::ValidationError;
pub use exam::{ExamPlan, ExamSlot, generate_exam_entries, plan_slots};
pub use exam_mode::{ExamModeCheck, ExamModeClock, WindowStatus};
pub use lead::{WeeklySlot, adjust_for_lead};
pub use local_scheduler::LocalScheduler;
pub use model::{
    Entry, ExamScheduleTemplate, ExamWindow, Mode, NotificationHandles, TimeTemplate, sort_entries,
};
pub use scheduler::{
    PermissionOutcome, RecurrenceScheduler, RescheduleReport, ScheduleOutcome, plan_reminders,
};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, PersistOutcome, StorageKey, StoreError};
pub use time::{ClockTime, format_12_hour, parse_time, weekday_name, weekday_short};
pub use timetable::{EntryDraft, Notice, Outcome, Templates, Timetable, TimetableState};
#[cfg(feature = "desktop")]
pub use traits::SystemNotifier;
pub use traits::{
    Clock, LogNotifier, MockClock, MockNotifier, MockScheduler, NotificationScheduler, Notifier,
    SystemClock,
};
