//! One-shot schedule management commands.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use miette::Result;

use chronoprint_scheduler::{
    LogEntry, NewSchedule, Recurrence, Schedule, ScheduleEdit, Scheduler, StartTime,
};
use chronoprint_store::HttpStore;

/// Where the document store lives.
pub struct StoreArgs {
    pub url: String,
    pub token: Option<String>,
}

/// Connect to the store and load its schedules.
pub async fn connect(args: &StoreArgs) -> Result<Scheduler> {
    let mut store = HttpStore::new(args.url.as_str())
        .map_err(|e| miette::miette!("failed to create store client: {}", e))?;
    if let Some(ref token) = args.token {
        store = store.with_token(token.as_str());
    }

    let scheduler = Scheduler::new(Arc::new(store));
    scheduler
        .load()
        .await
        .map_err(|e| miette::miette!("failed to load schedules: {}", e))?;
    Ok(scheduler)
}

pub async fn add(
    args: &StoreArgs,
    name: String,
    start: StartTime,
    recurrence: Recurrence,
) -> Result<()> {
    let scheduler = connect(args).await?;
    let schedule = scheduler
        .create_schedule(NewSchedule::new(name, start, recurrence))
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    println!("{}", format_schedule(&schedule));
    Ok(())
}

pub async fn edit(args: &StoreArgs, id: &str, edit: ScheduleEdit) -> Result<()> {
    let scheduler = connect(args).await?;
    let schedule = scheduler
        .edit_schedule(id, edit)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    println!("{}", format_schedule(&schedule));
    Ok(())
}

pub async fn list(args: &StoreArgs) -> Result<()> {
    let scheduler = connect(args).await?;
    let schedules = scheduler.list_schedules().await;
    if schedules.is_empty() {
        println!("No schedules.");
    }
    for schedule in schedules {
        println!("{}", format_schedule(&schedule));
    }
    Ok(())
}

pub async fn logs(args: &StoreArgs, job: Option<&str>) -> Result<()> {
    let scheduler = connect(args).await?;
    let logs = match job {
        Some(job_id) => scheduler.logs_for(job_id).await,
        None => scheduler.list_logs().await,
    };
    if logs.is_empty() {
        println!("No execution logs.");
    }
    for log in logs {
        println!("{}", format_log(&log));
    }
    Ok(())
}

pub async fn set_enabled(args: &StoreArgs, id: &str, enabled: bool) -> Result<()> {
    let scheduler = connect(args).await?;
    let schedule = scheduler
        .set_enabled(id, enabled)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    println!("{}", format_schedule(&schedule));
    Ok(())
}

pub async fn delete(args: &StoreArgs, id: &str) -> Result<()> {
    let scheduler = connect(args).await?;
    scheduler
        .delete_schedule(id)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    println!("Deleted {id}");
    Ok(())
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn describe(recurrence: &Recurrence) -> String {
    match recurrence {
        Recurrence::Hourly { interval_minutes } => format!("every {interval_minutes} min"),
        Recurrence::Daily => "daily".to_string(),
        Recurrence::Weekly { days } => {
            let names: Vec<_> = days.iter().map(|d| d.name()).collect();
            format!("weekly on {}", names.join(", "))
        }
    }
}

fn format_schedule(schedule: &Schedule) -> String {
    let next = match (schedule.is_enabled, schedule.next_run) {
        (false, _) => "disabled".to_string(),
        (true, Some(next_run)) => format!("next {}", local(next_run)),
        (true, None) => "no upcoming run".to_string(),
    };
    format!(
        "{}  {:<24} {} from {}  [{}]",
        schedule.id,
        schedule.job_name,
        describe(&schedule.recurrence),
        schedule.start_time,
        next
    )
}

fn format_log(log: &LogEntry) -> String {
    format!(
        "{}  {:?}  {} ({})  {}",
        local(log.execution_time),
        log.status,
        log.job_name,
        log.job_id,
        log.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoprint_scheduler::DayOfWeek;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_describe_recurrence() {
        assert_eq!(
            describe(&Recurrence::Hourly {
                interval_minutes: 45
            }),
            "every 45 min"
        );
        assert_eq!(describe(&Recurrence::Daily), "daily");
        assert_eq!(
            describe(&Recurrence::weekly([DayOfWeek::Wednesday, DayOfWeek::Monday])),
            "weekly on Monday, Wednesday"
        );
    }

    #[test]
    fn test_format_disabled_schedule() {
        let schedule = Schedule {
            id: "abc".to_string(),
            job_name: "Print".to_string(),
            start_time: StartTime::new(9, 0).unwrap(),
            recurrence: Recurrence::Daily,
            is_enabled: false,
            next_run: None,
            created_at: Utc::now(),
        };
        let line = format_schedule(&schedule);
        assert!(line.starts_with("abc  Print"));
        assert!(line.ends_with("daily from 09:00  [disabled]"));
    }
}
