//! Abstractions for time and side effects to enable testing.
//!
//! This module provides traits for:
//! - `Clock`: Abstracting time access for deterministic testing
//! - `Notifier`: Immediate user-visible notices
//! - `NotificationScheduler`: The platform's recurring local notifications

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::lead::WeeklySlot;
use crate::time::ClockTime;

// ==================== Clock Trait ====================

/// Trait for abstracting time access.
///
/// This allows injecting mock clocks during testing to create
/// deterministic, reproducible tests for time-dependent logic.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Get the current time in the local timezone.
    fn now_local(&self) -> DateTime<Local>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Mock clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Create a mock clock reading the given local wall-clock time.
    pub fn from_local(time: NaiveDateTime) -> Self {
        Self::new(local_to_utc(time))
    }

    /// Set the mock clock to a new time.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap() = time;
    }

    /// Set the mock clock to a new local wall-clock time.
    pub fn set_local(&self, time: NaiveDateTime) {
        self.set_time(local_to_utc(time));
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock().unwrap();
        *time = *time + duration;
    }
}

fn local_to_utc(time: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&time)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&time))
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap()
    }

    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }
}

// ==================== Notifier Trait ====================

/// Trait for immediate, one-off user notices.
///
/// This allows testing notification logic without actually
/// sending system notifications.
pub trait Notifier: Send + Sync {
    /// Send a notification with the given title and body.
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Desktop notifier implementation using notify-rust.
#[cfg(feature = "desktop")]
#[derive(Debug, Clone, Default)]
pub struct SystemNotifier;

#[cfg(feature = "desktop")]
impl Notifier for SystemNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .appname("Smart Table")
            .show()?;
        Ok(())
    }
}

/// Notifier that only writes to the log. Used for headless builds.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        tracing::info!(title, body, "Notification");
        Ok(())
    }
}

/// Mock notifier for testing that records all notifications.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    notifications: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockNotifier {
    /// Create a new mock notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all notifications that have been sent.
    pub fn get_notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().unwrap().clone()
    }

    /// Get the count of notifications sent.
    pub fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    /// Clear all recorded notifications.
    pub fn clear(&self) {
        self.notifications.lock().unwrap().clear();
    }

    /// Check if any notification was sent.
    pub fn was_called(&self) -> bool {
        !self.notifications.lock().unwrap().is_empty()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

// ==================== Notification Scheduler Trait ====================

/// What a scheduled notification shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub sound: bool,
}

/// A weekly repeating trigger in platform numbering
/// (`weekday` 1 = Sunday through 7 = Saturday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub repeats: bool,
    pub weekday: u32,
    pub hour: u32,
    pub minute: u32,
}

impl WeeklyTrigger {
    pub fn weekly(slot: WeeklySlot, channel_id: Option<String>) -> Self {
        Self {
            channel_id,
            repeats: true,
            weekday: slot.platform_weekday(),
            hour: slot.time.hour,
            minute: slot.time.minute,
        }
    }

    /// The weekday and time this trigger fires at.
    pub fn slot(&self) -> Option<WeeklySlot> {
        let weekday = self
            .weekday
            .checked_sub(1)
            .and_then(|i| u8::try_from(i).ok())
            .and_then(crate::time::weekday_from_index)?;
        Some(WeeklySlot::new(weekday, ClockTime::new(self.hour, self.minute)?))
    }
}

/// A notification currently registered with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub identifier: String,
    pub content: NotificationContent,
    pub trigger: WeeklyTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Platform notification channel (Android-style grouping).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
}

/// Trait for the platform's local notification scheduler.
pub trait NotificationScheduler: Send + Sync {
    /// Whether this device can deliver scheduled notifications at all.
    fn is_supported(&self) -> bool;

    fn permission_status(&self) -> Result<PermissionStatus>;

    fn request_permission(&self) -> Result<PermissionStatus>;

    fn create_channel(&self, channel: &NotificationChannel) -> Result<()>;

    /// Register a recurring notification and return its handle.
    fn schedule(&self, content: &NotificationContent, trigger: &WeeklyTrigger) -> Result<String>;

    fn cancel(&self, identifier: &str) -> Result<()>;

    fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>>;
}

#[derive(Debug, Default)]
struct MockSchedulerState {
    scheduled: Vec<ScheduledNotification>,
    cancelled: Vec<String>,
    channels: Vec<NotificationChannel>,
    next_id: u64,
    unsupported: bool,
    permission: Option<PermissionStatus>,
    grant_on_request: bool,
    fail_schedule: bool,
    fail_after: Option<usize>,
    fail_list: bool,
}

/// Mock scheduler for testing that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockScheduler {
    state: Arc<Mutex<MockSchedulerState>>,
}

impl MockScheduler {
    /// A supported device with permission already granted.
    pub fn new() -> Self {
        let scheduler = Self::default();
        {
            let mut state = scheduler.state.lock().unwrap();
            state.permission = Some(PermissionStatus::Granted);
            state.grant_on_request = true;
        }
        scheduler
    }

    /// A device without scheduled-notification support (e.g. a simulator).
    pub fn unsupported() -> Self {
        let scheduler = Self::new();
        scheduler.state.lock().unwrap().unsupported = true;
        scheduler
    }

    /// Set the current permission and whether a request grants it.
    pub fn set_permission(&self, status: PermissionStatus, grant_on_request: bool) {
        let mut state = self.state.lock().unwrap();
        state.permission = Some(status);
        state.grant_on_request = grant_on_request;
    }

    /// Make permission queries fail.
    pub fn fail_permission_query(&self) {
        self.state.lock().unwrap().permission = None;
    }

    /// Make every `schedule` call fail (or succeed again).
    pub fn set_fail_schedule(&self, fail: bool) {
        self.state.lock().unwrap().fail_schedule = fail;
    }

    /// Let `count` more `schedule` calls succeed, then fail the rest.
    pub fn fail_after(&self, count: usize) {
        self.state.lock().unwrap().fail_after = Some(count);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    /// Notifications currently live.
    pub fn scheduled(&self) -> Vec<ScheduledNotification> {
        self.state.lock().unwrap().scheduled.clone()
    }

    pub fn scheduled_count(&self) -> usize {
        self.state.lock().unwrap().scheduled.len()
    }

    /// Handles passed to `cancel`, in call order.
    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        self.state.lock().unwrap().channels.clone()
    }
}

impl NotificationScheduler for MockScheduler {
    fn is_supported(&self) -> bool {
        !self.state.lock().unwrap().unsupported
    }

    fn permission_status(&self) -> Result<PermissionStatus> {
        match self.state.lock().unwrap().permission {
            Some(status) => Ok(status),
            None => bail!("permission query failed"),
        }
    }

    fn request_permission(&self) -> Result<PermissionStatus> {
        let mut state = self.state.lock().unwrap();
        if state.grant_on_request {
            state.permission = Some(PermissionStatus::Granted);
            Ok(PermissionStatus::Granted)
        } else {
            state.permission = Some(PermissionStatus::Denied);
            Ok(PermissionStatus::Denied)
        }
    }

    fn create_channel(&self, channel: &NotificationChannel) -> Result<()> {
        self.state.lock().unwrap().channels.push(channel.clone());
        Ok(())
    }

    fn schedule(&self, content: &NotificationContent, trigger: &WeeklyTrigger) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.unsupported {
            bail!("Notifications require a physical device");
        }
        if state.fail_schedule {
            bail!("scheduling rejected");
        }
        if let Some(remaining) = state.fail_after.as_mut() {
            if *remaining == 0 {
                bail!("scheduling rejected");
            }
            *remaining -= 1;
        }

        state.next_id += 1;
        let identifier = format!("mock-{}", state.next_id);
        state.scheduled.push(ScheduledNotification {
            identifier: identifier.clone(),
            content: content.clone(),
            trigger: trigger.clone(),
        });
        Ok(identifier)
    }

    fn cancel(&self, identifier: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cancelled.push(identifier.to_string());
        state.scheduled.retain(|s| s.identifier != identifier);
        Ok(())
    }

    fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            bail!("listing failed");
        }
        Ok(state.scheduled.clone())
    }
}
