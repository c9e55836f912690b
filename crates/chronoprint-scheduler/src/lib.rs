//! Recurring job scheduler for ChronoPrint.
//!
//! This crate provides:
//! - Schedule and execution log types with a tagged recurrence
//! - Wall-clock time arithmetic helpers
//! - A pure next-run calculator for hourly, daily and weekly schedules
//! - A [`Scheduler`] that manages schedule lifecycles against a
//!   [`DocumentStore`](chronoprint_store::DocumentStore) and fires due jobs

mod calculator;
mod error;
mod scheduler;
pub mod time;
mod types;

pub use calculator::{compute_next_run, next_occurrence};
pub use error::SchedulerError;
pub use scheduler::{
    Clock, HELLO_WORLD_MESSAGE, JobExecutor, Scheduler, SchedulerConfig, SystemClock,
    hello_world_executor,
};
pub use types::{
    DayOfWeek, LogEntry, LogStatus, NewSchedule, Recurrence, Schedule, ScheduleEdit, StartTime,
};
