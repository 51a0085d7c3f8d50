//! The timetable controller.
//!
//! [`Timetable`] owns all in-memory state and the collaborators. Every change
//! is written to the store first and only then applied to local state; a
//! failed write is reported as a notice and the in-memory value still wins for
//! the rest of the session.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::Serialize;
use serde_json::Value;

use crate::config::NotificationConfig;
use crate::error::ValidationError;
use crate::exam::{ExamPlan, generate_exam_entries};
use crate::exam_mode::{ExamModeCheck, ExamModeClock};
use crate::model::{
    Entry, ExamScheduleTemplate, ExamWindow, Mode, TimeTemplate, default_exam_schedules,
    default_exam_titles, sort_entries,
};
use crate::scheduler::{PermissionOutcome, RecurrenceScheduler, RescheduleReport};
use crate::store::{
    KeyValueStore, PersistOutcome, StorageKey, entry_records, load_entries, load_or_warn, persist,
};
use crate::time::{
    ClockTime, normalize_display, parse_day_month_year, parse_time, weekday_from_index,
};
use crate::traits::{Clock, NotificationScheduler, Notifier};

// ==================== Notices ====================

/// A message for the user, shown however the front end sees fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    fn not_saved() -> Self {
        Self::new(
            "Not Saved",
            "Changes are kept for this session but could not be written to storage.",
        )
    }

    fn unreadable(count: usize) -> Self {
        let what = if count == 1 {
            "1 stored entry".to_string()
        } else {
            format!("{count} stored entries")
        };
        Self::new(
            "Unreadable Entries",
            format!("{what} could not be read. They are kept in storage but not shown."),
        )
    }

    fn degraded(count: usize) -> Self {
        let what = if count == 1 {
            "1 entry".to_string()
        } else {
            format!("{count} entries")
        };
        Self::new(
            "Notice",
            format!("Reminders for {what} could not be scheduled. Reschedule to try again."),
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

impl From<&ValidationError> for Notice {
    fn from(err: &ValidationError) -> Self {
        Notice::new(err.title(), err.to_string())
    }
}

/// The value an operation produced plus what to tell the user about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub notices: Vec<Notice>,
}

// ==================== State ====================

/// Saved presets, one subject and time collection per mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Templates {
    pub subjects: Vec<String>,
    pub exam_subjects: Vec<String>,
    pub times: Vec<TimeTemplate>,
    pub exam_times: Vec<TimeTemplate>,
    pub exam_titles: Vec<String>,
    pub exam_schedules: Vec<ExamScheduleTemplate>,
}

impl Templates {
    pub fn subjects(&self, mode: Mode) -> &[String] {
        match mode {
            Mode::Regular => &self.subjects,
            Mode::Exam => &self.exam_subjects,
        }
    }

    pub fn times(&self, mode: Mode) -> &[TimeTemplate] {
        match mode {
            Mode::Regular => &self.times,
            Mode::Exam => &self.exam_times,
        }
    }

    fn subjects_mut(&mut self, mode: Mode) -> &mut Vec<String> {
        match mode {
            Mode::Regular => &mut self.subjects,
            Mode::Exam => &mut self.exam_subjects,
        }
    }

    fn times_mut(&mut self, mode: Mode) -> &mut Vec<TimeTemplate> {
        match mode {
            Mode::Regular => &mut self.times,
            Mode::Exam => &mut self.exam_times,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimetableState {
    pub entries: Vec<Entry>,
    pub exam_entries: Vec<Entry>,
    pub window: ExamWindow,
    /// The collection that additions, removals and reschedules touch. Follows
    /// the window's `enabled` flag.
    pub editing_mode: Mode,
    /// Whether today falls inside an enabled exam window.
    pub exam_active: bool,
    pub templates: Templates,
}

impl TimetableState {
    pub fn collection(&self, mode: Mode) -> &[Entry] {
        match mode {
            Mode::Regular => &self.entries,
            Mode::Exam => &self.exam_entries,
        }
    }

    fn collection_mut(&mut self, mode: Mode) -> &mut Vec<Entry> {
        match mode {
            Mode::Regular => &mut self.entries,
            Mode::Exam => &mut self.exam_entries,
        }
    }

    /// The collection currently displayed.
    pub fn visible_mode(&self) -> Mode {
        if self.exam_active { Mode::Exam } else { Mode::Regular }
    }
}

/// Stored entry records this session could not decode.
#[derive(Debug, Default)]
struct HeldRecords {
    regular: Vec<Value>,
    exam: Vec<Value>,
    /// Collections whose stored document could not be read at all. These are
    /// never overwritten.
    locked: Vec<Mode>,
}

impl HeldRecords {
    fn records(&self, mode: Mode) -> &[Value] {
        match mode {
            Mode::Regular => &self.regular,
            Mode::Exam => &self.exam,
        }
    }

    fn records_mut(&mut self, mode: Mode) -> &mut Vec<Value> {
        match mode {
            Mode::Regular => &mut self.regular,
            Mode::Exam => &mut self.exam,
        }
    }
}

/// A class as typed into the form, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub subject: String,
    pub weekday: Weekday,
    pub start_time: String,
    pub end_time: String,
    pub lead: u32,
}

// ==================== Controller ====================

pub struct Timetable {
    store: Arc<dyn KeyValueStore>,
    scheduler: RecurrenceScheduler,
    exam_clock: ExamModeClock,
    clock: Arc<dyn Clock>,
    state: TimetableState,
    held: HeldRecords,
}

impl Timetable {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn NotificationScheduler>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            scheduler: RecurrenceScheduler::new(backend, config),
            exam_clock: ExamModeClock::new(store.clone(), notifier),
            store,
            clock,
            state: TimetableState::default(),
            held: HeldRecords::default(),
        }
    }

    pub fn state(&self) -> &TimetableState {
        &self.state
    }

    fn today(&self) -> NaiveDate {
        self.clock.now_local().date_naive()
    }

    fn save<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T, notices: &mut Vec<Notice>) {
        if let PersistOutcome::Failed(_) = persist(self.store.as_ref(), key, value) {
            notices.push(Notice::not_saved());
        }
    }

    /// Write an entry collection back together with the records held aside
    /// at load.
    fn save_entries(&self, mode: Mode, entries: &[Entry], notices: &mut Vec<Notice>) {
        let key = StorageKey::entries(mode);
        if self.held.locked.contains(&mode) {
            tracing::warn!(key = key.as_str(), "Stored entries were unreadable, not overwriting");
            notices.push(Notice::not_saved());
            return;
        }
        let records = entry_records(entries, self.held.records(mode));
        self.save(key, &records, notices);
    }

    fn load_collection(&mut self, mode: Mode, notices: &mut Vec<Notice>) -> Vec<Entry> {
        let key = StorageKey::entries(mode);
        match load_entries(self.store.as_ref(), key) {
            Ok(document) => {
                if !document.unreadable.is_empty() {
                    notices.push(Notice::unreadable(document.unreadable.len()));
                }
                *self.held.records_mut(mode) = document.unreadable;
                let mut entries = document.entries;
                sort_entries(&mut entries);
                entries
            }
            Err(e) => {
                tracing::warn!(key = key.as_str(), error = %e, "Failed to load entries");
                self.held.locked.push(mode);
                notices.push(Notice::new(
                    "Unreadable Entries",
                    format!(
                        "Stored {} entries could not be read. Changes to them will not be saved.",
                        mode.label()
                    ),
                ));
                Vec::new()
            }
        }
    }

    /// Read every stored document, seed default templates, set up
    /// notifications and evaluate the exam window.
    pub fn load(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();

        self.held = HeldRecords::default();
        let entries = self.load_collection(Mode::Regular, &mut notices);
        let exam_entries = self.load_collection(Mode::Exam, &mut notices);

        let store = self.store.as_ref();

        let mut templates = Templates {
            subjects: load_or_warn(store, StorageKey::SubjectTemplates).unwrap_or_default(),
            exam_subjects: load_or_warn(store, StorageKey::ExamSubjectTemplates).unwrap_or_default(),
            times: load_or_warn(store, StorageKey::TimeTemplates).unwrap_or_default(),
            exam_times: load_or_warn(store, StorageKey::ExamTimeTemplates).unwrap_or_default(),
            exam_titles: Vec::new(),
            exam_schedules: Vec::new(),
        };
        templates.exam_titles = match load_or_warn(store, StorageKey::ExamTitleTemplates) {
            Some(titles) => titles,
            None => {
                let titles = default_exam_titles();
                self.save(StorageKey::ExamTitleTemplates, &titles, &mut notices);
                titles
            }
        };
        templates.exam_schedules = match load_or_warn(store, StorageKey::ExamScheduleTemplates) {
            Some(schedules) => schedules,
            None => {
                let schedules = default_exam_schedules();
                self.save(StorageKey::ExamScheduleTemplates, &schedules, &mut notices);
                schedules
            }
        };

        tracing::info!(
            entries = entries.len(),
            exam_entries = exam_entries.len(),
            "Loaded timetable"
        );
        self.state.entries = entries;
        self.state.exam_entries = exam_entries;
        self.state.templates = templates;

        match self.scheduler.ensure_permission() {
            PermissionOutcome::Granted => {}
            PermissionOutcome::Denied => notices.push(Notice::new(
                "Permissions required",
                "Enable notifications in Settings to receive class reminders.",
            )),
            PermissionOutcome::Unsupported => notices.push(Notice::new(
                "Notifications Unavailable",
                "This device cannot deliver scheduled reminders.",
            )),
        }

        self.check_exam_mode();
        notices
    }

    /// Re-evaluate the exam window against today's date.
    pub fn check_exam_mode(&mut self) -> ExamModeCheck {
        let check = self.exam_clock.check(self.today());

        self.state.window = check.window.clone();
        self.state.exam_active = check.active;
        self.state.editing_mode = if check.window.enabled {
            Mode::Exam
        } else {
            Mode::Regular
        };
        check
    }

    fn next_entry_id(&self) -> String {
        let mut id = self.clock.now_utc().timestamp_millis();
        let taken = |candidate: &str| {
            self.state
                .entries
                .iter()
                .chain(&self.state.exam_entries)
                .any(|e| e.id == candidate)
        };
        while taken(&id.to_string()) {
            id += 1;
        }
        id.to_string()
    }

    /// Validate a draft, schedule its reminders and store it in the editing
    /// collection.
    ///
    /// Rejected drafts change nothing and schedule nothing.
    pub fn add_entry(&mut self, draft: EntryDraft) -> Result<Outcome<Entry>, ValidationError> {
        let start = parse_time(&draft.start_time);
        let end = parse_time(&draft.end_time);
        let subject = draft.subject.trim();
        if subject.is_empty() {
            return Err(ValidationError::MissingSubject);
        }
        let start = start.ok_or_else(|| ValidationError::InvalidStartTime(draft.start_time.clone()))?;
        let end = end.ok_or_else(|| ValidationError::InvalidEndTime(draft.end_time.clone()))?;
        if end <= start {
            return Err(ValidationError::EndNotAfterStart);
        }

        let mut entry = Entry {
            id: self.next_entry_id(),
            subject: subject.to_string(),
            weekday: draft.weekday,
            start_time: start.to_12_hour(),
            end_time: end.to_12_hour(),
            lead: draft.lead,
            notif_id: None,
            exam_date: None,
        };

        let mut notices = Vec::new();
        let outcome = self.scheduler.schedule_entry(&entry);
        if outcome.is_degraded() {
            notices.push(Notice::degraded(1));
        }
        entry.notif_id = Some(outcome.into_handles());

        let mode = self.state.editing_mode;
        let mut next = self.state.collection(mode).to_vec();
        next.push(entry.clone());
        sort_entries(&mut next);
        self.save_entries(mode, &next, &mut notices);
        *self.state.collection_mut(mode) = next;

        tracing::info!(id = %entry.id, subject = %entry.subject, mode = mode.label(), "Added entry");
        Ok(Outcome {
            value: entry,
            notices,
        })
    }

    /// Cancel an entry's reminders and drop it from the editing collection.
    pub fn remove_entry(&mut self, id: &str) -> Outcome<Option<Entry>> {
        let mode = self.state.editing_mode;
        let mut notices = Vec::new();

        let Some(found) = self.state.collection(mode).iter().find(|e| e.id == id).cloned() else {
            tracing::debug!(id, mode = mode.label(), "Remove for unknown entry");
            return Outcome {
                value: None,
                notices,
            };
        };

        self.scheduler.cancel_entry(&found);
        let next: Vec<Entry> = self
            .state
            .collection(mode)
            .iter()
            .filter(|e| e.id != id)
            .cloned()
            .collect();
        self.save_entries(mode, &next, &mut notices);
        *self.state.collection_mut(mode) = next;

        tracing::info!(id, subject = %found.subject, "Removed entry");
        Outcome {
            value: Some(found),
            notices,
        }
    }

    /// Cancel every scheduled notification and schedule the editing
    /// collection again.
    pub fn reschedule_all(&mut self) -> Outcome<RescheduleReport> {
        let mode = self.state.editing_mode;
        let report = self.scheduler.reschedule_all(self.state.collection(mode));

        let mut notices = Vec::new();
        self.save_entries(mode, &report.entries, &mut notices);
        *self.state.collection_mut(mode) = report.entries.clone();

        if report.listing_failed || report.degraded > 0 {
            notices.push(Notice::new(
                "Notice",
                "Schedules updated. Some reminders could not be scheduled on this device.",
            ));
        } else {
            notices.push(Notice::new("Updated", "All class reminders have been refreshed."));
        }

        Outcome {
            value: report,
            notices,
        }
    }

    /// Store new exam dates, keeping the enabled flag as it is.
    pub fn set_exam_window(
        &mut self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<Notice>, ValidationError> {
        let start = parse_day_month_year(start_date)
            .ok_or_else(|| ValidationError::InvalidDate(start_date.to_string()))?;
        let end = parse_day_month_year(end_date)
            .ok_or_else(|| ValidationError::InvalidDate(end_date.to_string()))?;
        if end < start {
            return Err(ValidationError::EndDateBeforeStart);
        }

        let window = ExamWindow {
            enabled: self.state.window.enabled,
            start_date: start_date.trim().to_string(),
            end_date: end_date.trim().to_string(),
        };

        let mut notices = Vec::new();
        self.save(StorageKey::ExamWindow, &window, &mut notices);
        self.state.exam_active = window.status_on(self.today()).is_active();
        self.state.window = window;
        Ok(notices)
    }

    /// Switch the editing collection between regular and exam entries, then
    /// reschedule reminders for the newly selected collection.
    pub fn toggle_exam_mode(&mut self) -> Result<Vec<Notice>, ValidationError> {
        let enabling = !self.state.window.enabled;
        if enabling && !self.state.window.has_dates() {
            return Err(ValidationError::MissingExamDates);
        }

        let window = ExamWindow {
            enabled: enabling,
            ..self.state.window.clone()
        };

        let mut notices = Vec::new();
        self.save(StorageKey::ExamWindow, &window, &mut notices);

        let active = window.status_on(self.today()).is_active();
        if !enabling {
            notices.push(Notice::new("Exam Mode Deactivated", "Back to regular timetable."));
        } else if active {
            notices.push(Notice::new("Exam Mode Activated", "Now using exam timetable."));
        } else {
            notices.push(Notice::new(
                "Exam Mode Set",
                "Will activate automatically when exam period starts.",
            ));
        }

        self.state.window = window;
        self.state.exam_active = active;
        self.state.editing_mode = if enabling { Mode::Exam } else { Mode::Regular };
        tracing::info!(enabled = enabling, active, "Exam mode toggled");

        notices.extend(self.reschedule_all().notices);
        Ok(notices)
    }

    /// Generate exam entries from a plan and add them to the editing
    /// collection, scheduling each one.
    pub fn generate_exam_schedule(
        &mut self,
        plan: &ExamPlan,
    ) -> Result<Outcome<Vec<Entry>>, ValidationError> {
        let id_base = self.clock.now_utc().timestamp_millis();
        let generated = generate_exam_entries(plan, id_base)?;

        let mut degraded = 0;
        let generated: Vec<Entry> = generated
            .into_iter()
            .map(|entry| {
                let outcome = self.scheduler.schedule_entry(&entry);
                if outcome.is_degraded() {
                    degraded += 1;
                }
                Entry {
                    notif_id: Some(outcome.into_handles()),
                    ..entry
                }
            })
            .collect();

        let mode = self.state.editing_mode;
        let mut next = self.state.collection(mode).to_vec();
        next.extend(generated.iter().cloned());
        sort_entries(&mut next);

        let mut notices = Vec::new();
        self.save_entries(mode, &next, &mut notices);
        *self.state.collection_mut(mode) = next;

        if degraded > 0 {
            notices.push(Notice::degraded(degraded));
        }
        notices.push(Notice::new(
            "Success",
            format!("Generated {} exam entries!", generated.len()),
        ));
        tracing::info!(count = generated.len(), mode = mode.label(), "Generated exam entries");

        Ok(Outcome {
            value: generated,
            notices,
        })
    }

    // ==================== Templates ====================

    pub fn save_subject_template(&mut self, subject: &str) -> Result<Vec<Notice>, ValidationError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ValidationError::EmptyTemplate);
        }

        let mode = self.state.editing_mode;
        let mut next = self.state.templates.subjects(mode).to_vec();
        next.push(subject.to_string());

        let mut notices = Vec::new();
        self.save(StorageKey::subject_templates(mode), &next, &mut notices);
        *self.state.templates.subjects_mut(mode) = next;
        Ok(notices)
    }

    pub fn save_time_template(
        &mut self,
        start_time: &str,
        end_time: &str,
        name: Option<&str>,
    ) -> Result<Vec<Notice>, ValidationError> {
        if start_time.trim().is_empty() || end_time.trim().is_empty() {
            return Err(ValidationError::EmptyTemplate);
        }

        let mode = self.state.editing_mode;
        let mut next = self.state.templates.times(mode).to_vec();
        next.push(TimeTemplate::new(
            normalize_display(start_time.trim()),
            normalize_display(end_time.trim()),
            name,
        ));

        let mut notices = Vec::new();
        self.save(StorageKey::time_templates(mode), &next, &mut notices);
        *self.state.templates.times_mut(mode) = next;
        Ok(notices)
    }

    /// Remember an exam title. Titles already saved are left alone.
    pub fn save_exam_title_template(&mut self, title: &str) -> Result<Vec<Notice>, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTemplate);
        }
        if self.state.templates.exam_titles.iter().any(|t| t == title) {
            return Ok(Vec::new());
        }

        let mut next = self.state.templates.exam_titles.clone();
        next.push(title.to_string());

        let mut notices = Vec::new();
        self.save(StorageKey::ExamTitleTemplates, &next, &mut notices);
        self.state.templates.exam_titles = next;
        Ok(notices)
    }

    /// Save the layout of a plan as `Custom <n>x<h>h`, replacing a saved
    /// layout of the same name.
    pub fn save_exam_schedule_template(
        &mut self,
        plan: &ExamPlan,
    ) -> Result<Vec<Notice>, ValidationError> {
        if plan.exams_per_day == 0 || plan.duration_hours == 0 || plan.start_time.trim().is_empty()
        {
            return Err(ValidationError::EmptyTemplate);
        }

        let template = plan.to_template();
        let mut next = self.state.templates.exam_schedules.clone();
        match next.iter_mut().find(|t| t.name == template.name) {
            Some(existing) => *existing = template.clone(),
            None => next.push(template.clone()),
        }

        let mut notices = Vec::new();
        self.save(StorageKey::ExamScheduleTemplates, &next, &mut notices);
        self.state.templates.exam_schedules = next;
        notices.push(Notice::new(
            "Template Saved",
            format!("\"{}\" schedule template saved!", template.name),
        ));
        Ok(notices)
    }

    // ==================== Projections ====================

    /// Entries of the collection on display.
    pub fn visible_entries(&self) -> &[Entry] {
        self.state.collection(self.state.visible_mode())
    }

    /// Entries of the collection being edited.
    pub fn editing_entries(&self) -> &[Entry] {
        self.state.collection(self.state.editing_mode)
    }

    /// Visible entries by weekday, Sunday first, every day present.
    pub fn grouped_by_weekday(&self) -> Vec<(Weekday, Vec<&Entry>)> {
        (0..7)
            .filter_map(weekday_from_index)
            .map(|day| {
                let entries = self
                    .visible_entries()
                    .iter()
                    .filter(|e| e.weekday == day)
                    .collect();
                (day, entries)
            })
            .collect()
    }

    /// Visible entries that fall on the weekday of `date`.
    pub fn classes_on(&self, date: NaiveDate) -> Vec<&Entry> {
        self.visible_entries()
            .iter()
            .filter(|e| e.weekday == date.weekday())
            .collect()
    }

    /// Whether `now` lies between the entry's start and end on its weekday.
    /// Both ends are inclusive.
    pub fn is_class_active(entry: &Entry, now: NaiveDateTime) -> bool {
        if entry.weekday != now.weekday() {
            return false;
        }
        let (Some(start), Some(end)) = (entry.start(), entry.end()) else {
            return false;
        };
        let current = now.time();
        to_naive(start) <= current && current <= to_naive(end)
    }

    pub fn active_classes(&self, now: NaiveDateTime) -> Vec<&Entry> {
        self.visible_entries()
            .iter()
            .filter(|e| Self::is_class_active(e, now))
            .collect()
    }
}

fn to_naive(time: ClockTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour, time.minute, 0).unwrap_or(NaiveTime::MIN)
}
