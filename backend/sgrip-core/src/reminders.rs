// src/reminders.rs
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::directory::EmployeeId;
use crate::imputation::WeekKey;
use crate::store::TimesheetStore;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Failed to send notification: {0}")]
    SendError(String),
    #[error("Invalid notification target: {0}")]
    InvalidTarget(String),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Previous week still a draft on Monday.
    WeeklyIncomplete,
    /// A week was rejected and waits for corrections.
    CorrectionNeeded,
    /// Manager digest of submitted weeks.
    PendingValidation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient_id: EmployeeId,
    pub recipient_email: String,
    pub kind: ReminderKind,
    pub week: WeekKey,
    pub subject: String,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Writes reminders to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            "Reminder for {} <{}>: {}",
            notification.recipient_id, notification.recipient_email, notification.subject
        );
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(target: &str) -> Result<Self, NotificationError> {
        let url = Url::parse(target)
            .map_err(|e| NotificationError::InvalidTarget(format!("{}: {}", target, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(NotificationError::InvalidTarget(format!(
                "Invalid webhook URL: {}",
                target
            )));
        }
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_notification(&self, notification: &Notification) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "notification": notification,
            "sent_at": Utc::now(),
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::SendError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(NotificationError::SendError(format!(
                "Webhook error: {} - {}",
                status, body
            )));
        }
        debug!("Webhook accepted reminder for {}", notification.recipient_id);
        Ok(())
    }
}

/// Sends the periodic reminders. Each (recipient, kind, week) goes out at most once per day.
pub struct ReminderService {
    store: Arc<TimesheetStore>,
    notifier: Arc<dyn Notifier>,
    reminder_hour: u32,
    sent: Mutex<HashSet<(EmployeeId, ReminderKind, WeekKey, NaiveDate)>>,
}

impl ReminderService {
    pub fn new(store: Arc<TimesheetStore>, notifier: Arc<dyn Notifier>, reminder_hour: u32) -> Self {
        Self {
            store,
            notifier,
            reminder_hour,
            sent: Mutex::new(HashSet::new()),
        }
    }

    /// Returns how many notifications were delivered.
    pub async fn run_scheduled_checks(&self, now: DateTime<Utc>) -> usize {
        let today = now.date_naive();
        info!("Running scheduled checks at {}", now);
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(_, _, _, day)| *day == today);

        let mut due = self.weekly_completion(today, now.hour());
        due.extend(self.corrections());
        due.extend(self.pending_digests(today));

        let mut delivered = 0;
        for notification in due {
            let key = (
                notification.recipient_id,
                notification.kind,
                notification.week,
                today,
            );
            if self
                .sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&key)
            {
                debug!("Skipping {:?} for {}: already sent today", key.1, key.0);
                continue;
            }
            match self.notifier.send_notification(&notification).await {
                Ok(()) => {
                    self.sent
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(key);
                    delivered += 1;
                }
                Err(e) => error!(
                    "Failed to send {:?} reminder to {}: {}",
                    notification.kind, notification.recipient_id, e
                ),
            }
        }
        info!("Finished scheduled checks: {} notifications sent", delivered);
        delivered
    }

    fn weekly_completion(&self, today: NaiveDate, current_hour: u32) -> Vec<Notification> {
        if today.weekday() != Weekday::Mon || current_hour < self.reminder_hour {
            return Vec::new();
        }
        let previous = WeekKey::containing(today).previous();
        debug!("Checking weekly completion for {}", previous);
        self.store
            .draft_employees(previous)
            .into_iter()
            .map(|employee| {
                info!("Sending weekly reminder to {} for {}", employee.id, previous);
                Notification {
                    recipient_id: employee.id,
                    recipient_email: employee.email.clone(),
                    kind: ReminderKind::WeeklyIncomplete,
                    week: previous,
                    subject: format!("Timesheet for week {} not submitted", previous),
                    message: format!(
                        "Hello {}, please complete and submit your timesheet for {} - {}.",
                        employee.first_name,
                        previous.monday().format("%d/%m/%Y"),
                        previous.sunday().format("%d/%m/%Y")
                    ),
                }
            })
            .collect()
    }

    fn corrections(&self) -> Vec<Notification> {
        let directory = self.store.directory();
        self.store
            .rejected_weeks()
            .into_iter()
            .filter_map(|record| {
                let employee = directory.employee(record.employee_id).filter(|e| e.active)?;
                let reason = if record.comment.is_empty() {
                    "no comment given".to_string()
                } else {
                    record.comment.clone()
                };
                Some(Notification {
                    recipient_id: employee.id,
                    recipient_email: employee.email.clone(),
                    kind: ReminderKind::CorrectionNeeded,
                    week: record.week,
                    subject: format!("Timesheet for week {} was rejected", record.week),
                    message: format!(
                        "Hello {}, your manager rejected week {} ({}). Reopen it, correct it and submit again.",
                        employee.first_name, record.week, reason
                    ),
                })
            })
            .collect()
    }

    fn pending_digests(&self, today: NaiveDate) -> Vec<Notification> {
        let current = WeekKey::containing(today);
        self.store
            .pending_by_manager()
            .into_iter()
            .map(|(manager, pending)| {
                let lines: Vec<String> = pending
                    .iter()
                    .map(|p| format!("- {} ({}, {}h)", p.employee, p.week, p.total_hours))
                    .collect();
                Notification {
                    recipient_id: manager.id,
                    recipient_email: manager.email.clone(),
                    kind: ReminderKind::PendingValidation,
                    week: current,
                    subject: format!("{} timesheet(s) waiting for validation", pending.len()),
                    message: format!(
                        "Hello {}, these weeks are waiting for your decision:\n{}",
                        manager.first_name,
                        lines.join("\n")
                    ),
                }
            })
            .collect()
    }
}
