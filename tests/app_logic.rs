//! Integration tests for the timetable controller using mock dependencies.
//!
//! These tests drive `Timetable` through MockClock, MockScheduler,
//! MockNotifier and MemoryStore for deterministic, reproducible results.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use smart_table::{
    Entry, EntryDraft, ExamPlan, ExamWindow, MemoryStore, MockClock, MockNotifier, MockScheduler,
    Mode, NotificationHandles, StorageKey, Timetable, ValidationError,
    config::NotificationConfig,
    store::load_json,
    traits::PermissionStatus,
};

struct Fixture {
    store: MemoryStore,
    scheduler: MockScheduler,
    notifier: MockNotifier,
    clock: MockClock,
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

impl Fixture {
    /// Monday 10 March 2025, 8:00 local time.
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            scheduler: MockScheduler::new(),
            notifier: MockNotifier::new(),
            clock: MockClock::from_local(at(2025, 3, 10, 8, 0)),
        }
    }

    fn timetable(&self) -> Timetable {
        let mut table = Timetable::new(
            Arc::new(self.store.clone()),
            Arc::new(self.scheduler.clone()),
            Arc::new(self.notifier.clone()),
            Arc::new(self.clock.clone()),
            &NotificationConfig::default(),
        );
        table.load();
        table
    }

    fn stored_entries(&self, mode: Mode) -> Option<Vec<Entry>> {
        load_json(&self.store, StorageKey::entries(mode)).unwrap()
    }
}

fn draft(subject: &str, weekday: Weekday, start: &str, end: &str) -> EntryDraft {
    EntryDraft {
        subject: subject.to_string(),
        weekday,
        start_time: start.to_string(),
        end_time: end.to_string(),
        lead: 10,
    }
}

fn exam_plan() -> ExamPlan {
    ExamPlan {
        title: "Final Exam".to_string(),
        subject: "Maths".to_string(),
        start_date: "10/03/2025".to_string(),
        end_date: "12/03/2025".to_string(),
        start_time: "9:00 AM".to_string(),
        exams_per_day: 2,
        duration_hours: 1,
        gap_minutes: 15,
        lead: 10,
    }
}

fn live_handle_count(entries: &[Entry]) -> usize {
    entries.iter().map(|e| e.live_handles().len()).sum()
}

// ==================== Entry Validation Tests ====================

/// An entry whose end is not after its start is rejected outright.
#[test]
fn test_rejected_entry_schedules_nothing() {
    let fx = Fixture::new();
    let mut table = fx.timetable();

    let result = table.add_entry(draft("Maths", Weekday::Mon, "10:00 AM", "9:00 AM"));

    assert_eq!(result, Err(ValidationError::EndNotAfterStart));
    assert!(table.state().entries.is_empty());
    assert_eq!(fx.scheduler.scheduled_count(), 0);
    assert!(fx.stored_entries(Mode::Regular).is_none());
}

#[test]
fn test_added_entry_is_persisted_with_handle_pair() {
    let fx = Fixture::new();
    let mut table = fx.timetable();

    let added = table
        .add_entry(draft("Maths", Weekday::Tue, "12:05 AM", "1:00 AM"))
        .unwrap();
    assert!(added.notices.is_empty());
    assert!(matches!(added.value.notif_id, Some(NotificationHandles::Pair(_))));

    let stored = fx.stored_entries(Mode::Regular).unwrap();
    assert_eq!(stored, vec![added.value]);

    // Lead reminder rolls back to Monday 23:55 (platform weekday 2).
    let scheduled = fx.scheduler.scheduled();
    assert_eq!(scheduled.len(), 2);
    assert_eq!(scheduled[0].trigger.weekday, 2);
    assert_eq!((scheduled[0].trigger.hour, scheduled[0].trigger.minute), (23, 55));
    assert_eq!(scheduled[1].trigger.weekday, 3);
}

// ==================== Reschedule Tests ====================

#[test]
fn test_reschedule_regular_collection() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    table.add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM")).unwrap();
    table.add_entry(draft("Physics", Weekday::Wed, "11:00 AM", "12:00 PM")).unwrap();
    table.add_entry(draft("Art", Weekday::Fri, "2:00 PM", "3:30 PM")).unwrap();

    let outcome = table.reschedule_all();

    assert_eq!(outcome.value.cancelled, 6);
    assert_eq!(outcome.value.degraded, 0);
    assert_eq!(outcome.notices[0].title, "Updated");
    assert_eq!(fx.scheduler.scheduled_count(), 6);
    assert_eq!(live_handle_count(&table.state().entries), 6);
    assert_eq!(fx.stored_entries(Mode::Regular).unwrap(), table.state().entries);
}

#[test]
fn test_reschedule_exam_collection_independently() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    table.add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM")).unwrap();
    table.add_entry(draft("Physics", Weekday::Wed, "11:00 AM", "12:00 PM")).unwrap();

    table.set_exam_window("01/03/2025", "31/03/2025").unwrap();
    table.toggle_exam_mode().unwrap();
    assert_eq!(table.state().editing_mode, Mode::Exam);
    // The exam collection is empty, so nothing is scheduled now.
    assert_eq!(fx.scheduler.scheduled_count(), 0);

    table.add_entry(draft("Maths Paper", Weekday::Tue, "9:00 AM", "11:00 AM")).unwrap();
    table.add_entry(draft("Physics Paper", Weekday::Thu, "9:00 AM", "11:00 AM")).unwrap();
    table.add_entry(draft("Chemistry Paper", Weekday::Fri, "9:00 AM", "11:00 AM")).unwrap();

    table.reschedule_all();
    assert_eq!(fx.scheduler.scheduled_count(), 6);
    assert_eq!(live_handle_count(&table.state().exam_entries), 6);
    assert_eq!(table.state().entries.len(), 2);

    table.toggle_exam_mode().unwrap();
    assert_eq!(table.state().editing_mode, Mode::Regular);
    assert_eq!(fx.scheduler.scheduled_count(), 4);
    assert_eq!(live_handle_count(&table.state().entries), 4);
}

#[test]
fn test_reschedule_with_partial_failure_uses_placeholder() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    table.add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM")).unwrap();
    table.add_entry(draft("Physics", Weekday::Wed, "11:00 AM", "12:00 PM")).unwrap();

    // Three more schedules succeed: one full pair, then half a pair.
    fx.scheduler.fail_after(3);
    let outcome = table.reschedule_all();

    assert_eq!(outcome.value.degraded, 1);
    assert_eq!(outcome.notices[0].title, "Notice");
    assert_eq!(fx.scheduler.scheduled_count(), 2);

    let physics = table
        .state()
        .entries
        .iter()
        .find(|e| e.subject == "Physics")
        .unwrap();
    assert!(physics.has_placeholder());
    assert_eq!(
        physics.notif_id,
        Some(NotificationHandles::placeholder(&physics.id))
    );
}

#[test]
fn test_reschedule_continues_when_listing_fails() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    table.add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM")).unwrap();
    fx.scheduler.set_fail_list(true);

    let outcome = table.reschedule_all();

    assert!(outcome.value.listing_failed);
    assert_eq!(outcome.value.cancelled, 2);
    assert_eq!(outcome.notices[0].title, "Notice");
    assert_eq!(live_handle_count(&table.state().entries), 2);
    assert_eq!(fx.scheduler.scheduled_count(), 2 * table.state().entries.len());
}

#[test]
fn test_reschedule_without_listing_leaves_no_duplicates() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    table.add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM")).unwrap();
    table.add_entry(draft("Physics", Weekday::Wed, "1:00 PM", "2:00 PM")).unwrap();
    fx.scheduler.set_fail_list(true);

    table.reschedule_all();
    let outcome = table.reschedule_all();

    assert_eq!(outcome.value.cancelled, 4);
    assert_eq!(fx.scheduler.scheduled_count(), 4);
    assert_eq!(live_handle_count(&fx.stored_entries(Mode::Regular).unwrap()), 4);
}

// ==================== Exam Mode Tests ====================

#[test]
fn test_toggle_requires_dates() {
    let fx = Fixture::new();
    let mut table = fx.timetable();

    assert_eq!(table.toggle_exam_mode(), Err(ValidationError::MissingExamDates));
    assert!(!table.state().window.enabled);
    assert!(fx.store.raw(StorageKey::ExamWindow).is_none());
}

#[test]
fn test_toggle_notices() {
    let fx = Fixture::new();
    let mut table = fx.timetable();

    table.set_exam_window("01/04/2025", "10/04/2025").unwrap();
    let notices = table.toggle_exam_mode().unwrap();
    assert_eq!(notices[0].title, "Exam Mode Set");
    assert!(!table.state().exam_active);

    let notices = table.toggle_exam_mode().unwrap();
    assert_eq!(notices[0].title, "Exam Mode Deactivated");
    assert_eq!(notices[0].message, "Back to regular timetable.");

    table.set_exam_window("10/03/2025", "14/03/2025").unwrap();
    let notices = table.toggle_exam_mode().unwrap();
    assert_eq!(notices[0].title, "Exam Mode Activated");
    assert!(table.state().exam_active);
    assert_eq!(notices.last().unwrap().title, "Updated");

    let stored: ExamWindow = load_json(&fx.store, StorageKey::ExamWindow).unwrap().unwrap();
    assert!(stored.enabled);
    assert_eq!(stored.start_date, "10/03/2025");
}

#[test]
fn test_set_exam_window_rejects_bad_dates() {
    let fx = Fixture::new();
    let mut table = fx.timetable();

    assert!(matches!(
        table.set_exam_window("31/02/2025", "10/03/2025"),
        Err(ValidationError::InvalidDate(_))
    ));
    assert_eq!(
        table.set_exam_window("10/03/2025", "01/03/2025"),
        Err(ValidationError::EndDateBeforeStart)
    );
    assert_eq!(table.state().window, ExamWindow::default());
}

/// Once the exam period ends, the next check switches back to the regular
/// timetable and says so once.
#[test]
fn test_expired_window_reverts_to_regular() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    table.add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM")).unwrap();

    table.set_exam_window("10/03/2025", "12/03/2025").unwrap();
    table.toggle_exam_mode().unwrap();
    table.add_entry(draft("Maths Paper", Weekday::Tue, "9:00 AM", "11:00 AM")).unwrap();
    assert!(table.state().exam_active);
    assert_eq!(table.visible_entries()[0].subject, "Maths Paper");

    // The last exam day is still active.
    fx.clock.set_local(at(2025, 3, 12, 23, 59));
    assert!(table.check_exam_mode().active);

    fx.clock.set_local(at(2025, 3, 13, 0, 1));
    let check = table.check_exam_mode();
    assert!(check.expired);
    assert!(!table.state().exam_active);
    assert!(!table.state().window.enabled);
    assert_eq!(table.state().editing_mode, Mode::Regular);
    assert_eq!(table.visible_entries()[0].subject, "Maths");

    let stored: ExamWindow = load_json(&fx.store, StorageKey::ExamWindow).unwrap().unwrap();
    assert!(!stored.enabled);
    assert_eq!(
        fx.notifier.get_notifications(),
        vec![(
            "Exam Period Ended".to_string(),
            "Switched back to regular timetable.".to_string()
        )]
    );

    table.check_exam_mode();
    assert_eq!(fx.notifier.notification_count(), 1);
}

#[test]
fn test_load_picks_up_expired_window() {
    let fx = Fixture::new();
    fx.store.insert_raw(
        StorageKey::ExamWindow,
        r#"{"enabled":true,"startDate":"01/03/2025","endDate":"05/03/2025"}"#,
    );

    let table = fx.timetable();

    assert!(!table.state().window.enabled);
    assert_eq!(fx.notifier.notification_count(), 1);
}

// ==================== Exam Generation Tests ====================

#[test]
fn test_generate_exam_schedule_adds_and_schedules() {
    let fx = Fixture::new();
    let mut table = fx.timetable();

    let generated = table.generate_exam_schedule(&exam_plan()).unwrap();

    assert_eq!(generated.value.len(), 6);
    assert_eq!(
        generated.notices.last().unwrap().message,
        "Generated 6 exam entries!"
    );
    assert_eq!(fx.scheduler.scheduled_count(), 12);
    assert_eq!(table.editing_entries().len(), 6);
    assert_eq!(fx.stored_entries(Mode::Regular).unwrap().len(), 6);

    let monday: Vec<_> = table
        .state()
        .entries
        .iter()
        .filter(|e| e.weekday == Weekday::Mon)
        .map(|e| (e.start_time.as_str(), e.end_time.as_str()))
        .collect();
    assert_eq!(monday, vec![("9:00 AM", "10:00 AM"), ("10:15 AM", "11:15 AM")]);
}

#[test]
fn test_generate_goes_to_exam_collection_in_exam_mode() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    table.set_exam_window("10/03/2025", "12/03/2025").unwrap();
    table.toggle_exam_mode().unwrap();

    table.generate_exam_schedule(&exam_plan()).unwrap();

    assert!(table.state().entries.is_empty());
    assert_eq!(table.state().exam_entries.len(), 6);
    assert_eq!(fx.stored_entries(Mode::Exam).unwrap().len(), 6);
}

#[test]
fn test_generate_with_missing_fields_changes_nothing() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    let mut plan = exam_plan();
    plan.subject.clear();

    let result = table.generate_exam_schedule(&plan);

    assert_eq!(
        result,
        Err(ValidationError::MissingExamFields(vec!["subject"]))
    );
    assert!(table.state().entries.is_empty());
    assert_eq!(fx.scheduler.scheduled_count(), 0);
}

// ==================== Persistence Tests ====================

#[test]
fn test_failed_write_keeps_in_memory_state() {
    let fx = Fixture::new();
    let mut table = fx.timetable();
    fx.store.set_fail_writes(true);

    let added = table
        .add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM"))
        .unwrap();

    assert_eq!(added.notices[0].title, "Not Saved");
    assert_eq!(table.state().entries.len(), 1);
    assert!(fx.stored_entries(Mode::Regular).is_none());
}

#[test]
fn test_state_survives_reload() {
    let fx = Fixture::new();
    {
        let mut table = fx.timetable();
        table.add_entry(draft("Physics", Weekday::Wed, "2:00 PM", "3:00 PM")).unwrap();
        table.add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM")).unwrap();
        table.save_subject_template("Physics").unwrap();
    }

    let table = fx.timetable();
    let subjects: Vec<_> = table.state().entries.iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Maths", "Physics"]);
    assert_eq!(table.state().templates.subjects, vec!["Physics".to_string()]);
}

#[test]
fn test_loads_documents_from_older_builds() {
    let fx = Fixture::new();
    fx.store.insert_raw(
        StorageKey::Entries,
        r#"[
            {"id":1700000000000,"subject":"History","weekday":1,"startTime":"9:00 AM",
             "endTime":"10:00 AM","lead":"15","notifId":"legacy-1"},
            {"id":"1700000000001","subject":"Art","weekday":0,"startTime":"1:00 PM",
             "endTime":"2:00 PM","lead":5,"notifId":null}
        ]"#,
    );

    let mut table = fx.timetable();

    let entries = &table.state().entries;
    assert_eq!(entries.len(), 2);
    // Sunday sorts first.
    assert_eq!(entries[0].subject, "Art");
    assert_eq!(entries[1].id, "1700000000000");
    assert_eq!(entries[1].lead, 15);

    table.remove_entry("1700000000000");
    assert_eq!(fx.scheduler.cancelled(), vec!["legacy-1".to_string()]);
}

#[test]
fn test_null_lead_entry_does_not_drop_the_collection() {
    let fx = Fixture::new();
    fx.store.insert_raw(
        StorageKey::Entries,
        r#"[
            {"id":"1700000000000","subject":"Keep Me","weekday":2,"startTime":"9:00 AM",
             "endTime":"10:00 AM","lead":10,"notifId":null},
            {"id":"1700000000001-0-0","subject":"Final Exam - Maths","weekday":1,
             "startTime":"9:00 AM","endTime":"11:00 AM","lead":null,"notifId":null,
             "examDate":"10/03/2025"}
        ]"#,
    );

    let mut table = fx.timetable();
    assert_eq!(table.state().entries.len(), 2);
    table.add_entry(draft("New", Weekday::Fri, "1:00 PM", "2:00 PM")).unwrap();

    let stored = fx.stored_entries(Mode::Regular).unwrap();
    let subjects: Vec<_> = stored.iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Final Exam - Maths", "Keep Me", "New"]);
    assert_eq!(stored[0].lead, 0);
}

#[test]
fn test_unreadable_entry_is_written_back_untouched() {
    let fx = Fixture::new();
    let bad = r#"{"id":"broken","subject":"Mystery","weekday":"someday"}"#;
    fx.store.insert_raw(
        StorageKey::Entries,
        &format!(
            r#"[{{"id":"1","subject":"Keep Me","weekday":2,"startTime":"9:00 AM",
                 "endTime":"10:00 AM","lead":10}}, {bad}]"#
        ),
    );

    let mut table = Timetable::new(
        Arc::new(fx.store.clone()),
        Arc::new(fx.scheduler.clone()),
        Arc::new(fx.notifier.clone()),
        Arc::new(fx.clock.clone()),
        &NotificationConfig::default(),
    );
    let notices = table.load();
    assert_eq!(notices[0].title, "Unreadable Entries");
    assert_eq!(table.state().entries.len(), 1);

    table.add_entry(draft("New", Weekday::Fri, "1:00 PM", "2:00 PM")).unwrap();
    table.remove_entry("1");
    table.reschedule_all();

    let raw: Vec<serde_json::Value> = load_json(&fx.store, StorageKey::Entries).unwrap().unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[0]["subject"], "New");
    assert_eq!(raw[1], serde_json::from_str::<serde_json::Value>(bad).unwrap());
}

#[test]
fn test_unparseable_collection_is_never_overwritten() {
    let fx = Fixture::new();
    fx.store.insert_raw(StorageKey::Entries, "{ truncated");

    let mut table = fx.timetable();
    assert!(table.state().entries.is_empty());

    let added = table
        .add_entry(draft("New", Weekday::Fri, "1:00 PM", "2:00 PM"))
        .unwrap();
    assert_eq!(added.notices[0].title, "Not Saved");
    assert_eq!(table.state().entries.len(), 1);
    assert_eq!(fx.store.raw(StorageKey::Entries).as_deref(), Some("{ truncated"));

    // The exam collection is unaffected.
    fx.store.insert_raw(
        StorageKey::ExamWindow,
        r#"{"enabled":true,"startDate":"01/03/2025","endDate":"31/03/2025"}"#,
    );
    let mut table = fx.timetable();
    table
        .add_entry(draft("Paper 1", Weekday::Mon, "9:00 AM", "11:00 AM"))
        .unwrap();
    assert_eq!(fx.stored_entries(Mode::Exam).unwrap().len(), 1);
}

// ==================== Permission Tests ====================

#[test]
fn test_load_reports_denied_permission() {
    let fx = Fixture::new();
    fx.scheduler.set_permission(PermissionStatus::Denied, false);

    let mut table = Timetable::new(
        Arc::new(fx.store.clone()),
        Arc::new(fx.scheduler.clone()),
        Arc::new(fx.notifier.clone()),
        Arc::new(fx.clock.clone()),
        &NotificationConfig::default(),
    );
    let notices = table.load();

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Permissions required");
    assert!(fx.scheduler.channels().is_empty());
}

#[test]
fn test_load_registers_channel_when_granted() {
    let fx = Fixture::new();
    fx.timetable();

    let channels = fx.scheduler.channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, "classes");
    assert_eq!(channels[0].name, "Class Reminders");
}

#[test]
fn test_unsupported_device_still_stores_entries() {
    let fx = Fixture {
        scheduler: MockScheduler::unsupported(),
        ..Fixture::new()
    };
    let mut table = Timetable::new(
        Arc::new(fx.store.clone()),
        Arc::new(fx.scheduler.clone()),
        Arc::new(fx.notifier.clone()),
        Arc::new(fx.clock.clone()),
        &NotificationConfig::default(),
    );
    let notices = table.load();
    assert_eq!(notices[0].title, "Notifications Unavailable");

    let added = table
        .add_entry(draft("Maths", Weekday::Mon, "9:00 AM", "10:00 AM"))
        .unwrap();
    assert!(added.value.has_placeholder());
    assert_eq!(fx.stored_entries(Mode::Regular).unwrap().len(), 1);
}
