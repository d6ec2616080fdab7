//! # Feature: Daily Notifications and Rollover
//!
//! Two independent daily jobs on the local clock: the morning reminder digest
//! (one message per user with active habits) and the midnight rollover of
//! habit cycles. A delivery failure for one user never stops the batch.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Jobs stop cleanly through `SchedulerHandle::shutdown`
//! - 1.0.0: Initial release

use crate::error::HabitResult;
use crate::habit_service::HabitService;
use crate::models::{Habit, RolloverReport};
use crate::transport::BotTransport;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, TimeZone};
use log::{debug, error, info, warn};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Wall-clock time of day, minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DailyTime {
    hour: u32,
    minute: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day '{0}', expected HH:MM")]
pub struct InvalidDailyTime(pub String);

impl DailyTime {
    pub const MIDNIGHT: DailyTime = DailyTime { hour: 0, minute: 0 };

    pub fn new(hour: u32, minute: u32) -> Result<Self, InvalidDailyTime> {
        if hour > 23 || minute > 59 {
            return Err(InvalidDailyTime(format!("{hour}:{minute}")));
        }
        Ok(DailyTime { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for DailyTime {
    type Err = InvalidDailyTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDailyTime(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if minute.len() != 2 || hour.is_empty() || hour.len() > 2 {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        DailyTime::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// First instant strictly after `now` whose local wall-clock time is `at`.
///
/// A time that falls into a DST gap resolves to the first valid instant after
/// the gap; an ambiguous time resolves to its earlier occurrence.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, at: DailyTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    for _ in 0..3 {
        if let Some(candidate) = resolve_local(&tz, date.and_time(at.naive())) {
            if candidate > *now {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    now.clone() + ChronoDuration::days(1)
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    let mut local = naive;
    // Gaps are at most a couple of hours; step forward minute by minute
    for _ in 0..180 {
        if let Some(resolved) = tz.from_local_datetime(&local).earliest() {
            return Some(resolved);
        }
        local += ChronoDuration::minutes(1);
    }
    None
}

/// Next fire time for a daily job that last fired at `last_fired`.
///
/// The search starts from the later of `now` and `last_fired`, so a wall
/// clock that lags the timer never selects an already-fired target again.
pub fn next_run<Tz: TimeZone>(now: &DateTime<Tz>, last_fired: Option<&DateTime<Tz>>, at: DailyTime) -> DateTime<Tz> {
    match last_fired {
        Some(fired) if fired >= now => next_occurrence(fired, at),
        _ => next_occurrence(now, at),
    }
}

pub fn duration_until<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>) -> Duration {
    target
        .clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Morning digest listing every active habit with its progress
pub fn format_daily_digest(habits: &[Habit], threshold: u32) -> String {
    let mut message = String::from("🌅 Доброе утро! Время для ваших привычек:\n\n");

    for (i, habit) in habits.iter().enumerate() {
        message.push_str(&format!(
            "{}. {}\n   📊 Прогресс: {}\n",
            i + 1,
            habit.title,
            habit.progress(threshold)
        ));
        if let Some(description) = habit.description_text() {
            message.push_str(&format!("   💡 {description}\n"));
        }
        message.push('\n');
    }

    message.push_str("✅ Отметьте выполнение привычек в боте!\n💪 Постоянство - ключ к успеху!");
    message
}

/// Outcome of one reminder batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub users_seen: usize,
    pub notified: usize,
    /// Users without active habits
    pub skipped: usize,
    pub failed: usize,
}

pub struct NotificationScheduler {
    service: Arc<HabitService>,
    transport: Arc<dyn BotTransport>,
    reminder_time: DailyTime,
    rollover_time: DailyTime,
}

impl NotificationScheduler {
    pub fn new(service: Arc<HabitService>, transport: Arc<dyn BotTransport>, reminder_time: DailyTime) -> Self {
        NotificationScheduler {
            service,
            transport,
            reminder_time,
            rollover_time: DailyTime::MIDNIGHT,
        }
    }

    /// Send one digest to every user who has at least one active habit
    pub async fn send_daily_reminders(&self) -> HabitResult<ReminderReport> {
        let users = self.service.list_users().await?;
        let threshold = self.service.completion_threshold();
        let mut report = ReminderReport {
            users_seen: users.len(),
            ..ReminderReport::default()
        };

        for user in users {
            let habits = match self.service.list_active_habits(user.id).await {
                Ok(habits) => habits,
                Err(e) => {
                    error!("Failed to load habits for user {}: {e}", user.id);
                    report.failed += 1;
                    continue;
                }
            };

            if habits.is_empty() {
                report.skipped += 1;
                continue;
            }

            let message = format_daily_digest(&habits, threshold);
            match self.transport.send_message(&user.external_id, &message, None).await {
                Ok(()) => {
                    debug!("Sent reminder to user {}", user.external_id);
                    report.notified += 1;
                }
                Err(e) => {
                    warn!("Failed to send notification to user {}: {e}", user.external_id);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Daily reminders sent: {} notified, {} skipped, {} failed",
            report.notified, report.skipped, report.failed
        );
        Ok(report)
    }

    pub async fn run_rollover(&self) -> HabitResult<RolloverReport> {
        self.service.rollover_daily().await
    }

    /// Spawn both daily jobs; each computes its own next local fire time
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reminders = Arc::clone(&self);
        let reminder_task = tokio::spawn(run_daily(
            "Daily reminders",
            self.reminder_time,
            shutdown_rx.clone(),
            move || {
                let scheduler = Arc::clone(&reminders);
                async move {
                    if let Err(e) = scheduler.send_daily_reminders().await {
                        error!("Error sending daily reminders: {e}");
                    }
                }
            },
        ));

        let rollover = Arc::clone(&self);
        let rollover_task = tokio::spawn(run_daily(
            "Daily rollover",
            self.rollover_time,
            shutdown_rx,
            move || {
                let scheduler = Arc::clone(&rollover);
                async move {
                    if let Err(e) = scheduler.run_rollover().await {
                        error!("Error processing daily habits: {e}");
                    }
                }
            },
        ));

        info!(
            "Notification scheduler started: reminders at {}, rollover at {}",
            self.reminder_time, self.rollover_time
        );

        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks: vec![reminder_task, rollover_task],
        }
    }
}

async fn run_daily<F, Fut>(name: &'static str, at: DailyTime, mut shutdown: watch::Receiver<bool>, job: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut last_fired: Option<DateTime<Local>> = None;
    loop {
        let now = Local::now();
        let next = next_run(&now, last_fired.as_ref(), at);
        let wait = duration_until(&now, &next);
        debug!("{name} next run at {next} (in {}s)", wait.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                info!("{name} job starting");
                last_fired = Some(next);
                job().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("{name} job stopped");
                    break;
                }
            }
        }
    }
}

/// Stops the scheduler's jobs
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Scheduler task ended abnormally: {e}");
            }
        }
    }
}
