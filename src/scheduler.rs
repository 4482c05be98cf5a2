//! Daily job scheduler.
//!
//! Jobs are registered against a `"M H * * *"` cron rule and evaluated on the
//! local wall clock every few seconds. A trigger is only honoured within
//! [`MISFIRE_GRACE`] of its time: one that passed before the scheduler started,
//! or while the process was suspended, is not caught up and the job first runs
//! at its next occurrence.
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(20);

/// How late a tick may be and still fire the trigger it follows.
pub const MISFIRE_GRACE: Duration = Duration::from_secs(120);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 5 cron fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field: {value:?}")]
    Field { field: &'static str, value: String },
    #[error("only daily rules are supported, {field} must be '*' (got {value:?})")]
    NotDaily { field: &'static str, value: String },
}

/// A once-a-day trigger time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAt {
    pub hour: u32,
    pub minute: u32,
}

impl DailyAt {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Parse a cron rule of the form `"M H * * *"`.
    pub fn parse(rule: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = rule.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }
        for (field, value) in ["day of month", "month", "day of week"].into_iter().zip(&fields[2..]) {
            if *value != "*" {
                return Err(ScheduleError::NotDaily { field, value: value.to_string() });
            }
        }
        let minute = parse_field(fields[0], "minute", 59)?;
        let hour = parse_field(fields[1], "hour", 23)?;
        Ok(Self { hour, minute })
    }

    pub fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }

    /// The trigger instant on the same day as `now`.
    pub fn trigger_on_day_of(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.date().and_time(self.time())
    }
}

fn parse_field(value: &str, field: &'static str, max: u32) -> Result<u32, ScheduleError> {
    value
        .parse::<u32>()
        .ok()
        .filter(|v| *v <= max)
        .ok_or_else(|| ScheduleError::Field { field, value: value.to_string() })
}

impl fmt::Display for DailyAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daily at {:02}:{:02}", self.hour, self.minute)
    }
}

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> anyhow::Result<()>;
}

struct Entry {
    at: DailyAt,
    job: Arc<dyn ScheduledJob>,
    last_fired: Option<NaiveDateTime>,
}

impl Entry {
    /// Today's trigger if it should fire at `now`.
    fn due_trigger(&self, armed_from: NaiveDateTime, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let trigger = self.at.trigger_on_day_of(now);
        let grace = chrono::Duration::seconds(MISFIRE_GRACE.as_secs() as i64);
        let due = now >= trigger
            && now - trigger <= grace
            && trigger >= armed_from
            && self.last_fired != Some(trigger);
        due.then_some(trigger)
    }
}

pub struct JobScheduler {
    entries: Vec<Entry>,
    tick: Duration,
    armed_from: Option<NaiveDateTime>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            tick: TICK_INTERVAL,
            armed_from: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn register(&mut self, at: DailyAt, job: Arc<dyn ScheduledJob>) {
        info!(job = job.name(), schedule = %at, "job registered");
        self.entries.push(Entry { at, job, last_fired: None });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start counting triggers from `now`, truncated to the minute. Earlier
    /// triggers are never fired.
    pub fn arm(&mut self, now: NaiveDateTime) {
        let start = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        self.armed_from = Some(start);
    }

    /// Jobs due at `now`, marked as fired for today's trigger. Arms the
    /// scheduler on first use.
    pub fn take_due(&mut self, now: NaiveDateTime) -> Vec<Arc<dyn ScheduledJob>> {
        if self.armed_from.is_none() {
            self.arm(now);
        }
        let armed_from = self.armed_from.unwrap_or(now);
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if let Some(trigger) = entry.due_trigger(armed_from, now) {
                entry.last_fired = Some(trigger);
                due.push(Arc::clone(&entry.job));
            }
        }
        due
    }

    /// Spawn every job due at `now`, each in its own task.
    pub fn fire_due(&mut self, now: NaiveDateTime) -> Vec<JoinHandle<()>> {
        self.take_due(now).into_iter().map(spawn_job).collect()
    }

    /// Tick until `cancel` fires.
    pub fn run(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.arm(Local::now().naive_local());
            info!(jobs = self.entries.len(), "scheduler started");
            let mut interval = tokio::time::interval(self.tick);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let handles = self.fire_due(Local::now().naive_local());
                if !handles.is_empty() {
                    debug!(count = handles.len(), "jobs fired");
                }
            }
            info!("scheduler stopped");
        })
    }
}

/// Run one job in its own task. Errors and panics are logged and stay
/// contained to that run.
fn spawn_job(job: Arc<dyn ScheduledJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = job.name().to_string();
        info!(job = %name, "job started");
        let inner = tokio::spawn(async move { job.run().await });
        match inner.await {
            Ok(Ok(())) => info!(job = %name, "job finished"),
            Ok(Err(err)) => {
                let message = format!("{err:#}");
                error!(job = %name, error = %message, "job failed");
            }
            Err(join) if join.is_panic() => error!(job = %name, "job panicked"),
            Err(join) => warn!(job = %name, error = %join, "job aborted"),
        }
    })
}
