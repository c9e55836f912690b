//! Schedule lifecycle and the firing loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use chronoprint_store::{DocumentStore, ScheduleFields, StoreError};

use crate::calculator::compute_next_run;
use crate::{LogEntry, LogStatus, NewSchedule, Schedule, ScheduleEdit, SchedulerError};

/// Shortest sleep between ticks.
const MIN_SLEEP: Duration = Duration::from_secs(1);

/// Added to a computed wake-up so the tick lands strictly after `next_run`.
const WAKE_SLACK: Duration = Duration::from_millis(1);

/// Message recorded for the built-in job.
pub const HELLO_WORLD_MESSAGE: &str = "Executed \"Hello World\"";

/// Runs a due schedule and returns the message to log, or an error message
/// logged with [`LogStatus::Failure`].
pub type JobExecutor = Box<
    dyn Fn(Schedule) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>>
        + Send
        + Sync,
>;

/// The built-in job: announce the schedule and succeed.
pub fn hello_world_executor() -> JobExecutor {
    Box::new(|schedule: Schedule| {
        Box::pin(async move {
            info!("JOB EXECUTING: \"{}\" - Hello World!", schedule.job_name);
            Ok(HELLO_WORLD_MESSAGE.to_string())
        })
    })
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest the loop sleeps between ticks.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
        }
    }
}

/// Manages schedules against a [`DocumentStore`] and fires them when due.
///
/// The store is the source of truth. The schedule and log lists held here
/// are write-through caches: every mutation is persisted first and only
/// reflected locally once the store has accepted it. All mutations,
/// including ticks, run under one lock.
///
/// Recurrences are evaluated on the wall clock of `Tz`.
pub struct Scheduler<Tz: TimeZone = Local> {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    zone: Tz,
    config: SchedulerConfig,
    executor: JobExecutor,
    schedules: RwLock<Vec<Schedule>>,
    logs: RwLock<Vec<LogEntry>>,
    mutation: Mutex<()>,
    wake: Notify,
}

impl Scheduler<Local> {
    /// Create a scheduler on the local time zone.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_zone(store, Local)
    }
}

impl<Tz> Scheduler<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Create a scheduler evaluating recurrences in `zone`.
    pub fn with_zone(store: Arc<dyn DocumentStore>, zone: Tz) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            zone,
            config: SchedulerConfig::default(),
            executor: hello_world_executor(),
            schedules: RwLock::new(Vec::new()),
            logs: RwLock::new(Vec::new()),
            mutation: Mutex::new(()),
            wake: Notify::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in job.
    pub fn with_executor(mut self, executor: JobExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Populate the caches from the store.
    ///
    /// Schedules that fail validation are skipped. Enabled schedules with no
    /// next run get one computed from now.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Result<(), SchedulerError> {
        let _guard = self.mutation.lock().await;
        let (schedules, logs) = self.refresh().await?;
        info!(schedules, logs, "loaded schedules from store");
        self.wake.notify_one();
        Ok(())
    }

    /// Replace both caches with what the store holds now. Returns the number
    /// of schedules and logs kept. Callers hold the mutation lock.
    async fn refresh(&self) -> Result<(usize, usize), SchedulerError> {
        let schedule_docs = self.store.list_schedules().await?;
        let log_docs = self.store.list_logs().await?;

        let mut schedules = Vec::with_capacity(schedule_docs.len());
        for doc in schedule_docs {
            match Schedule::from_document(doc) {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => warn!(error = %e, "skipping invalid schedule"),
            }
        }

        let now = self.clock.now();
        for schedule in schedules
            .iter_mut()
            .filter(|s| s.is_enabled && s.next_run.is_none())
        {
            let next_run = self.next_run_after(schedule, now);
            let fields = ScheduleFields {
                next_run: Some(next_run.map(Into::into)),
                ..Default::default()
            };
            match self.store.update_schedule(&schedule.id, &fields).await {
                Ok(()) => schedule.next_run = next_run,
                Err(e) => warn!(id = %schedule.id, error = %e, "failed to backfill next run"),
            }
        }

        let mut logs = Vec::with_capacity(log_docs.len());
        for doc in log_docs {
            match LogEntry::from_document(doc) {
                Ok(log) => logs.push(log),
                Err(e) => warn!(error = %e, "skipping invalid log entry"),
            }
        }

        let counts = (schedules.len(), logs.len());
        *self.schedules.write().await = schedules;
        *self.logs.write().await = logs;
        Ok(counts)
    }

    /// Create an enabled schedule due at its first occurrence after now.
    #[tracing::instrument(skip(self, new), fields(job_name = %new.job_name))]
    pub async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule, SchedulerError> {
        new.validate()?;
        let _guard = self.mutation.lock().await;

        let now = self.clock.now();
        let mut schedule = Schedule {
            id: String::new(),
            job_name: new.job_name.trim().to_string(),
            start_time: new.start_time,
            recurrence: new.recurrence,
            is_enabled: true,
            next_run: None,
            created_at: now,
        };
        schedule.next_run = self.next_run_after(&schedule, now);

        let doc = self.store.create_schedule(&schedule.to_record()).await?;
        schedule.id = doc.id;

        self.schedules.write().await.insert(0, schedule.clone());
        info!(id = %schedule.id, next_run = ?schedule.next_run, "created schedule");
        self.wake.notify_one();
        Ok(schedule)
    }

    /// Turn a schedule on or off.
    ///
    /// Enabling recomputes the next run from now; disabling clears it.
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Schedule, SchedulerError> {
        let _guard = self.mutation.lock().await;

        let mut schedule = self.cached(id).await?;
        schedule.is_enabled = enabled;
        schedule.next_run = self.next_run_after(&schedule, self.clock.now());

        let fields = ScheduleFields {
            is_enabled: Some(enabled),
            next_run: Some(schedule.next_run.map(Into::into)),
            ..Default::default()
        };
        self.store.update_schedule(id, &fields).await?;

        self.reflect(&schedule).await;
        info!(id, enabled, next_run = ?schedule.next_run, "updated schedule state");
        self.wake.notify_one();
        Ok(schedule)
    }

    pub async fn enable(&self, id: &str) -> Result<Schedule, SchedulerError> {
        self.set_enabled(id, true).await
    }

    pub async fn disable(&self, id: &str) -> Result<Schedule, SchedulerError> {
        self.set_enabled(id, false).await
    }

    /// Change a schedule's name, start time or recurrence.
    #[tracing::instrument(skip(self, edit))]
    pub async fn edit_schedule(
        &self,
        id: &str,
        edit: ScheduleEdit,
    ) -> Result<Schedule, SchedulerError> {
        edit.validate()?;
        let _guard = self.mutation.lock().await;

        let mut schedule = self.cached(id).await?;
        if edit.is_empty() {
            return Ok(schedule);
        }

        let mut fields = ScheduleFields::default();
        if let Some(job_name) = edit.job_name {
            schedule.job_name = job_name.trim().to_string();
            fields.job_name = Some(schedule.job_name.clone());
        }
        if let Some(start_time) = edit.start_time {
            schedule.start_time = start_time;
            fields.start_time = Some(start_time.to_string());
        }
        if let Some(recurrence) = edit.recurrence {
            fields.schedule_type = Some(recurrence.schedule_type());
            fields.interval = Some(recurrence.stored_interval());
            fields.days_of_week = Some(recurrence.stored_days());
            schedule.recurrence = recurrence;
        }
        schedule.next_run = self.next_run_after(&schedule, self.clock.now());
        fields.next_run = Some(schedule.next_run.map(Into::into));

        self.store.update_schedule(id, &fields).await?;

        self.reflect(&schedule).await;
        info!(id, next_run = ?schedule.next_run, "edited schedule");
        self.wake.notify_one();
        Ok(schedule)
    }

    /// Delete a schedule and every log it produced.
    #[tracing::instrument(skip(self))]
    pub async fn delete_schedule(&self, id: &str) -> Result<(), SchedulerError> {
        let _guard = self.mutation.lock().await;

        self.cached(id).await?;
        self.store.delete_schedule(id).await?;

        self.schedules.write().await.retain(|s| s.id != id);
        self.logs.write().await.retain(|l| l.job_id != id);
        info!(id, "deleted schedule");
        self.wake.notify_one();
        Ok(())
    }

    /// Cached schedules, newest first.
    pub async fn list_schedules(&self) -> Vec<Schedule> {
        self.schedules.read().await.clone()
    }

    pub async fn get_schedule(&self, id: &str) -> Option<Schedule> {
        self.schedules
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Cached logs, newest first.
    pub async fn list_logs(&self) -> Vec<LogEntry> {
        self.logs.read().await.clone()
    }

    /// Cached logs of one schedule, newest first.
    pub async fn logs_for(&self, job_id: &str) -> Vec<LogEntry> {
        self.logs
            .read()
            .await
            .iter()
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Fire every due schedule once. Returns how many fired.
    ///
    /// The caches are first re-read from the store, so schedules added,
    /// toggled or deleted by another process take effect here.
    pub async fn tick(&self) -> usize {
        let _guard = self.mutation.lock().await;

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "failed to refresh from store, using cached schedules");
        }

        let now = self.clock.now();
        let due: Vec<Schedule> = self
            .schedules
            .read()
            .await
            .iter()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();

        let fired = due.len();
        for schedule in due {
            self.fire(schedule, now).await;
        }
        fired
    }

    /// Run the scheduler loop until `shutdown` turns true or its sender drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_interval = ?self.config.tick_interval, "scheduler starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let fired = self.tick().await;
            if fired > 0 {
                debug!(fired, "tick complete");
            }

            let sleep_for = self.calculate_sleep_duration().await;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
                _ = self.wake.notified() => {
                    debug!("schedules changed, re-arming timer");
                }
                _ = sleep(sleep_for) => {}
            }
        }

        info!("scheduler shut down gracefully");
    }

    /// How long to sleep before the next tick: until the earliest next run,
    /// bounded by the minimum sleep and the tick interval.
    pub async fn calculate_sleep_duration(&self) -> Duration {
        let cap = self.config.tick_interval.max(MIN_SLEEP);
        let now = self.clock.now();

        let next_due = self
            .schedules
            .read()
            .await
            .iter()
            .filter(|s| s.is_enabled)
            .filter_map(|s| s.next_run)
            .min();

        match next_due {
            Some(next) => (next - now)
                .to_std()
                .map(|until| until + WAKE_SLACK)
                .unwrap_or(MIN_SLEEP)
                .clamp(MIN_SLEEP, cap),
            None => cap,
        }
    }

    /// Run one due schedule, record the outcome and advance its next run.
    ///
    /// The following occurrence is computed from the prior next run, not from
    /// `now`, so a late tick keeps the schedule on its grid. If either write
    /// fails the next run stays put and the next tick fires again.
    #[tracing::instrument(
        skip(self, schedule),
        fields(id = %schedule.id, job_name = %schedule.job_name)
    )]
    async fn fire(&self, schedule: Schedule, now: DateTime<Utc>) {
        let (message, status) = match (self.executor)(schedule.clone()).await {
            Ok(message) => (message, LogStatus::Success),
            Err(message) => {
                warn!(error = %message, "job failed");
                (message, LogStatus::Failure)
            }
        };

        let mut log = LogEntry {
            id: String::new(),
            job_id: schedule.id.clone(),
            job_name: schedule.job_name.clone(),
            execution_time: now,
            message,
            status,
        };
        match self.store.create_log(&log.to_record()).await {
            Ok(doc) => {
                log.id = doc.id;
                self.logs.write().await.insert(0, log);
            }
            Err(e) => {
                error!(error = %e, "failed to record execution log");
                return;
            }
        }

        let next_run = schedule
            .next_run
            .and_then(|prior| self.next_run_after(&schedule, prior));
        let fields = ScheduleFields {
            next_run: Some(next_run.map(Into::into)),
            ..Default::default()
        };
        match self.store.update_schedule(&schedule.id, &fields).await {
            Ok(()) => {
                if let Some(cached) = self
                    .schedules
                    .write()
                    .await
                    .iter_mut()
                    .find(|s| s.id == schedule.id)
                {
                    cached.next_run = next_run;
                }
                debug!(next_run = ?next_run, "rescheduled");
            }
            Err(StoreError::NotFound { .. }) => {
                warn!("schedule no longer in store, dropping it");
                self.schedules.write().await.retain(|s| s.id != schedule.id);
                self.logs.write().await.retain(|l| l.job_id != schedule.id);
            }
            Err(e) => error!(error = %e, "failed to persist next run"),
        }
    }

    /// Next run of `schedule` strictly after `reference`, on this zone's wall clock.
    fn next_run_after(
        &self,
        schedule: &Schedule,
        reference: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        compute_next_run(schedule, &reference.with_timezone(&self.zone))
            .map(|next| next.with_timezone(&Utc))
    }

    async fn cached(&self, id: &str) -> Result<Schedule, SchedulerError> {
        self.get_schedule(id)
            .await
            .ok_or_else(|| SchedulerError::ScheduleNotFound(id.to_string()))
    }

    async fn reflect(&self, schedule: &Schedule) {
        if let Some(cached) = self
            .schedules
            .write()
            .await
            .iter_mut()
            .find(|s| s.id == schedule.id)
        {
            *cached = schedule.clone();
        }
    }
}
