//! A notification scheduler that keeps its triggers in the key-value store.
//!
//! Desktops have no OS-level weekly alarm we can hand triggers to, so the
//! watch loop asks [`LocalScheduler::due_at`] every minute and shows whatever
//! matches through a [`Notifier`](crate::traits::Notifier).

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::store::{KeyValueStore, StorageKey, load_json, save_json};
use crate::traits::{
    NotificationChannel, NotificationContent, NotificationScheduler, PermissionStatus,
    ScheduledNotification, WeeklyTrigger,
};

const IDENTIFIER_PREFIX: &str = "local-";

pub struct LocalScheduler {
    store: Arc<dyn KeyValueStore>,
    // Serializes read-modify-write of the scheduled list.
    write_lock: Mutex<()>,
}

impl LocalScheduler {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(load_json(self.store.as_ref(), StorageKey::ScheduledNotifications)
            .context("Failed to read scheduled notifications")?
            .unwrap_or_default())
    }

    fn save(&self, scheduled: &[ScheduledNotification]) -> Result<()> {
        save_json(self.store.as_ref(), StorageKey::ScheduledNotifications, scheduled)
            .context("Failed to write scheduled notifications")
    }

    fn update<T>(&self, f: impl FnOnce(&mut Vec<ScheduledNotification>) -> T) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("scheduler lock poisoned"))?;
        let mut scheduled = self.load()?;
        let result = f(&mut scheduled);
        self.save(&scheduled)?;
        Ok(result)
    }

    /// Notifications whose weekly trigger falls on the given local minute.
    pub fn due_at(&self, now: NaiveDateTime) -> Result<Vec<ScheduledNotification>> {
        let weekday = now.weekday().number_from_sunday();
        let (hour, minute) = (now.hour(), now.minute());

        Ok(self
            .load()?
            .into_iter()
            .filter(|s| {
                s.trigger.weekday == weekday && s.trigger.hour == hour && s.trigger.minute == minute
            })
            .collect())
    }
}

fn next_identifier(scheduled: &[ScheduledNotification]) -> String {
    let highest = scheduled
        .iter()
        .filter_map(|s| s.identifier.strip_prefix(IDENTIFIER_PREFIX))
        .filter_map(|n| n.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{IDENTIFIER_PREFIX}{}", highest + 1)
}

impl NotificationScheduler for LocalScheduler {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission_status(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    fn request_permission(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    fn create_channel(&self, channel: &NotificationChannel) -> Result<()> {
        tracing::debug!(id = %channel.id, name = %channel.name, "Channel registered");
        Ok(())
    }

    fn schedule(&self, content: &NotificationContent, trigger: &WeeklyTrigger) -> Result<String> {
        if trigger.slot().is_none() {
            anyhow::bail!(
                "invalid trigger: weekday {} at {}:{:02}",
                trigger.weekday,
                trigger.hour,
                trigger.minute
            );
        }

        self.update(|scheduled| {
            let identifier = next_identifier(scheduled);
            scheduled.push(ScheduledNotification {
                identifier: identifier.clone(),
                content: content.clone(),
                trigger: trigger.clone(),
            });
            identifier
        })
    }

    fn cancel(&self, identifier: &str) -> Result<()> {
        let removed = self.update(|scheduled| {
            let before = scheduled.len();
            scheduled.retain(|s| s.identifier != identifier);
            before - scheduled.len()
        })?;
        if removed == 0 {
            tracing::debug!(identifier, "Cancel for unknown notification");
        }
        Ok(())
    }

    fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        self.load()
    }
}
