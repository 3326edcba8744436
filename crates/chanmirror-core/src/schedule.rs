//! Daily calendar triggers for the mirror phases.
//!
//! Times are wall-clock `HH:MM` at a fixed UTC offset. The default offset is
//! Asia/Kolkata (+05:30), which observes no daylight saving.

use crate::config::AppSettings;
use chrono::{DateTime, Days, FixedOffset, NaiveTime, Utc};
use std::future::Future;
use thiserror::Error;
use tracing::{error, info};

/// Invalid schedule settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Not a `HH:MM` time of day
    #[error("invalid time of day `{0}`, expected HH:MM")]
    InvalidTime(String),
    /// Offset outside ±24h
    #[error("invalid UTC offset of {0} minutes")]
    InvalidOffset(i32),
}

/// Build a fixed offset from minutes east of UTC.
///
/// # Errors
///
/// Returns `InvalidOffset` when the offset is a day or more.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, ScheduleError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(ScheduleError::InvalidOffset(minutes))
}

/// Fires once a day at a fixed local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    time: NaiveTime,
    offset: FixedOffset,
}

impl DailyTrigger {
    /// Trigger at `time` in the given offset.
    #[must_use]
    pub const fn new(time: NaiveTime, offset: FixedOffset) -> Self {
        Self { time, offset }
    }

    /// Parse an `HH:MM` time of day.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTime` if the text is not a valid time of day.
    pub fn parse(text: &str, offset: FixedOffset) -> Result<Self, ScheduleError> {
        let time = NaiveTime::parse_from_str(text.trim(), "%H:%M")
            .map_err(|_| ScheduleError::InvalidTime(text.to_string()))?;
        Ok(Self::new(time, offset))
    }

    /// Time of day the trigger fires at.
    #[must_use]
    pub const fn time(&self) -> NaiveTime {
        self.time
    }

    /// First fire time strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = now.with_timezone(&self.offset).date_naive();
        let shift = chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let fire_on = |date: chrono::NaiveDate| (date.and_time(self.time) - shift).and_utc();

        let today = fire_on(local_date);
        if today > now {
            return today;
        }
        local_date
            .checked_add_days(Days::new(1))
            .map_or(today + chrono::Duration::days(1), fire_on)
    }
}

/// The three phase triggers of the mirror cycle.
#[derive(Debug, Clone, Copy)]
pub struct MirrorSchedule {
    /// Pre-check trigger
    pub precheck: DailyTrigger,
    /// Backup trigger
    pub backup: DailyTrigger,
    /// Repost trigger
    pub repost: DailyTrigger,
}

impl MirrorSchedule {
    /// Build the triggers from settings.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed time or offset.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, ScheduleError> {
        let offset = offset_from_minutes(settings.schedule_offset_minutes)?;
        Ok(Self {
            precheck: DailyTrigger::parse(&settings.precheck_time, offset)?,
            backup: DailyTrigger::parse(&settings.backup_time, offset)?,
            repost: DailyTrigger::parse(&settings.repost_time, offset)?,
        })
    }
}

/// Run `job` every day at `trigger`, forever.
///
/// A failing run is logged and the loop waits for the next day.
pub async fn run_daily<F, Fut>(name: &'static str, trigger: DailyTrigger, mut job: F)
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    loop {
        let now = Utc::now();
        let next = trigger.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(job = name, next = %next, "Scheduled next run");
        tokio::time::sleep(wait).await;

        info!(job = name, "Running scheduled job");
        match job().await {
            Ok(()) => info!(job = name, "Scheduled job finished"),
            Err(e) => error!(job = name, error = %format!("{e:#}"), "Scheduled job failed"),
        }
    }
}
