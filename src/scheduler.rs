//! Recurring class reminders.
//!
//! Every entry gets two weekly notifications: a reminder `lead` minutes before
//! the start and an alert at the start. When the platform refuses, the entry
//! carries a placeholder handle and is picked up again by the next
//! [`RecurrenceScheduler::reschedule_all`].

use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::config::NotificationConfig;
use crate::lead::{WeeklySlot, adjust_for_lead};
use crate::model::{Entry, NotificationHandles};
use crate::time::MINUTES_PER_DAY;
use crate::traits::{
    NotificationChannel, NotificationContent, NotificationScheduler, PermissionStatus,
    WeeklyTrigger,
};

/// Content and trigger for one notification to be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRequest {
    pub content: NotificationContent,
    pub trigger: WeeklyTrigger,
}

/// The pair of notifications belonging to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPair {
    pub lead: ReminderRequest,
    pub start: ReminderRequest,
}

/// Build both reminder requests for an entry without touching the platform.
pub fn plan_reminders(entry: &Entry, channel_id: Option<&str>) -> Result<ReminderPair> {
    let start = entry
        .start()
        .ok_or_else(|| anyhow!("Invalid time format: {:?}", entry.start_time))?;
    let end = entry
        .end()
        .ok_or_else(|| anyhow!("Invalid time format: {:?}", entry.end_time))?;

    let mut duration =
        i64::from(end.minutes_since_midnight()) - i64::from(start.minutes_since_midnight());
    if duration < 0 {
        duration += i64::from(MINUTES_PER_DAY);
    }

    let channel = channel_id.map(str::to_string);
    let lead_slot = adjust_for_lead(entry.weekday, start, entry.lead);
    let start_slot = WeeklySlot::new(entry.weekday, start);

    Ok(ReminderPair {
        lead: ReminderRequest {
            content: NotificationContent {
                title: format!("{} starting in {} minutes", entry.subject, entry.lead),
                body: format!(
                    "Class from {} to {} - get ready!",
                    entry.start_time, entry.end_time
                ),
                sound: true,
            },
            trigger: WeeklyTrigger::weekly(lead_slot, channel.clone()),
        },
        start: ReminderRequest {
            content: NotificationContent {
                title: format!("{} has started!", entry.subject),
                body: format!(
                    "Class runs until {} - {} minutes remaining",
                    entry.end_time, duration
                ),
                sound: true,
            },
            trigger: WeeklyTrigger::weekly(start_slot, channel),
        },
    })
}

// ==================== Outcomes ====================

/// Result of scheduling one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(NotificationHandles),
    /// The platform refused; `placeholder` stands in for the handles.
    Degraded {
        placeholder: NotificationHandles,
        reason: String,
    },
}

impl ScheduleOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ScheduleOutcome::Degraded { .. })
    }

    pub fn into_handles(self) -> NotificationHandles {
        match self {
            ScheduleOutcome::Scheduled(handles) => handles,
            ScheduleOutcome::Degraded { placeholder, .. } => placeholder,
        }
    }
}

/// Result of the permission bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
    /// The device cannot deliver scheduled notifications at all.
    Unsupported,
}

/// Summary of a bulk reschedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescheduleReport {
    /// The entries with their new handles.
    pub entries: Vec<Entry>,
    pub cancelled: usize,
    pub degraded: usize,
    /// Existing notifications could not be listed, so only the entries' own
    /// handles were cancelled.
    pub listing_failed: bool,
}

// ==================== Scheduler ====================

pub struct RecurrenceScheduler {
    backend: Arc<dyn NotificationScheduler>,
    channel: NotificationChannel,
}

impl RecurrenceScheduler {
    pub fn new(backend: Arc<dyn NotificationScheduler>, config: &NotificationConfig) -> Self {
        Self {
            backend,
            channel: NotificationChannel {
                id: config.channel_id.clone(),
                name: config.channel_name.clone(),
            },
        }
    }

    /// Check device support, ask for permission when needed and register the
    /// reminder channel.
    ///
    /// Unexpected platform errors are logged and treated as granted so the
    /// rest of the app keeps working; scheduling itself degrades later.
    pub fn ensure_permission(&self) -> PermissionOutcome {
        if !self.backend.is_supported() {
            tracing::warn!("Scheduled notifications are not supported on this device");
            return PermissionOutcome::Unsupported;
        }

        match self.request_permission() {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Notification setup warning");
                PermissionOutcome::Granted
            }
        }
    }

    fn request_permission(&self) -> Result<PermissionOutcome> {
        let mut status = self.backend.permission_status()?;
        if status != PermissionStatus::Granted {
            status = self.backend.request_permission()?;
        }
        if status != PermissionStatus::Granted {
            tracing::info!(?status, "Notification permission not granted");
            return Ok(PermissionOutcome::Denied);
        }

        self.backend.create_channel(&self.channel)?;
        Ok(PermissionOutcome::Granted)
    }

    /// Register both reminders for an entry.
    pub fn schedule_entry(&self, entry: &Entry) -> ScheduleOutcome {
        match self.try_schedule(entry) {
            Ok(handles) => {
                tracing::debug!(id = %entry.id, subject = %entry.subject, ?handles, "Scheduled reminders");
                ScheduleOutcome::Scheduled(handles)
            }
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "Notification scheduling warning");
                ScheduleOutcome::Degraded {
                    placeholder: NotificationHandles::placeholder(&entry.id),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_schedule(&self, entry: &Entry) -> Result<NotificationHandles> {
        let pair = plan_reminders(entry, Some(&self.channel.id))?;

        let lead_id = self.backend.schedule(&pair.lead.content, &pair.lead.trigger)?;
        let start_id = match self.backend.schedule(&pair.start.content, &pair.start.trigger) {
            Ok(id) => id,
            Err(e) => {
                // Don't leave half a pair behind.
                if let Err(cancel_err) = self.backend.cancel(&lead_id) {
                    tracing::warn!(handle = %lead_id, error = %cancel_err, "Failed to cancel orphaned reminder");
                }
                return Err(e);
            }
        };

        Ok(NotificationHandles::pair(lead_id, start_id))
    }

    /// Cancel the live notifications of an entry. Returns how many were
    /// cancelled.
    pub fn cancel_entry(&self, entry: &Entry) -> usize {
        let mut cancelled = 0;
        for handle in entry.live_handles() {
            match self.backend.cancel(handle) {
                Ok(()) => cancelled += 1,
                Err(e) => tracing::warn!(handle, error = %e, "Failed to cancel notification"),
            }
        }
        cancelled
    }

    /// Cancel every scheduled notification, then schedule each entry again.
    /// When the platform cannot list what is scheduled, only the entries' own
    /// handles are cancelled.
    pub fn reschedule_all(&self, entries: &[Entry]) -> RescheduleReport {
        let mut report = RescheduleReport::default();

        match self.backend.list_scheduled() {
            Ok(scheduled) => {
                for notification in scheduled {
                    match self.backend.cancel(&notification.identifier) {
                        Ok(()) => report.cancelled += 1,
                        Err(e) => tracing::warn!(
                            handle = %notification.identifier,
                            error = %e,
                            "Failed to cancel notification"
                        ),
                    }
                }
            }
            Err(e) => {
                // Fall back to the handles the entries know about.
                tracing::warn!(error = %e, "Reschedule warning: could not list notifications");
                report.listing_failed = true;
                report.cancelled = entries.iter().map(|entry| self.cancel_entry(entry)).sum();
            }
        }

        for entry in entries {
            let outcome = self.schedule_entry(entry);
            if outcome.is_degraded() {
                report.degraded += 1;
            }
            report.entries.push(Entry {
                notif_id: Some(outcome.into_handles()),
                ..entry.clone()
            });
        }

        tracing::info!(
            entries = report.entries.len(),
            cancelled = report.cancelled,
            degraded = report.degraded,
            "Rescheduled reminders"
        );
        report
    }
}
