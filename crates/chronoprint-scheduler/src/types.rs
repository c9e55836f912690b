//! Scheduler types.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use chronoprint_store::{Document, LogRecord, ScheduleRecord, ScheduleType, StoreError};

pub use chronoprint_store::LogStatus;

use crate::SchedulerError;
use crate::time::is_strictly_after;

/// Wall-clock time of day a recurrence is anchored to. Seconds are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StartTime(NaiveTime);

impl StartTime {
    /// Build from an hour (0-23) and minute (0-59).
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    /// The time of day as a chrono value.
    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for StartTime {
    type Err = SchedulerError;

    /// Parse `HH:mm` (a single-digit hour is accepted).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            SchedulerError::InvalidSchedule(format!("invalid start time {s:?}, expected HH:mm"))
        };

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for StartTime {
    type Error = SchedulerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StartTime> for String {
    fn from(time: StartTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Day of the week, numbered 0-6 from Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    /// All days in numbering order.
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    /// Number consistent with [`crate::time::day_of_week`] (Sunday = 0).
    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.get(number as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = SchedulerError;

    /// Case-insensitive full name or three-letter abbreviation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|day| {
                let name = day.name().to_ascii_lowercase();
                name == needle || name[..3] == needle
            })
            .ok_or_else(|| SchedulerError::InvalidSchedule(format!("unknown day of week {s:?}")))
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How often a schedule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recurrence {
    /// Every `interval_minutes` from the start time, each day.
    Hourly { interval_minutes: u32 },
    /// Once a day at the start time.
    Daily,
    /// At the start time on each listed day.
    Weekly { days: BTreeSet<DayOfWeek> },
}

impl Recurrence {
    /// Weekly recurrence on the given days.
    pub fn weekly(days: impl IntoIterator<Item = DayOfWeek>) -> Self {
        Recurrence::Weekly {
            days: days.into_iter().collect(),
        }
    }

    /// The stored recurrence kind.
    pub fn schedule_type(&self) -> ScheduleType {
        match self {
            Recurrence::Hourly { .. } => ScheduleType::Hourly,
            Recurrence::Daily => ScheduleType::Daily,
            Recurrence::Weekly { .. } => ScheduleType::Weekly,
        }
    }

    /// Check the kind-specific required fields.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        match self {
            Recurrence::Hourly { interval_minutes: 0 } => Err(SchedulerError::InvalidSchedule(
                "interval must be a positive number of minutes for hourly schedules".to_string(),
            )),
            Recurrence::Weekly { days } if days.is_empty() => Err(SchedulerError::InvalidSchedule(
                "weekly schedules need at least one day".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Interval as stored (`None` unless hourly).
    pub(crate) fn stored_interval(&self) -> Option<i64> {
        match self {
            Recurrence::Hourly { interval_minutes } => Some(i64::from(*interval_minutes)),
            _ => None,
        }
    }

    /// Day names as stored (empty unless weekly).
    pub(crate) fn stored_days(&self) -> Vec<String> {
        match self {
            Recurrence::Weekly { days } => days.iter().map(|d| d.name().to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuild from the stored fields.
    fn from_stored(
        schedule_type: ScheduleType,
        interval: Option<i64>,
        days_of_week: &[String],
    ) -> Result<Self, SchedulerError> {
        let recurrence = match schedule_type {
            ScheduleType::Hourly => {
                let interval = interval.ok_or_else(|| {
                    SchedulerError::InvalidSchedule("hourly schedule without interval".to_string())
                })?;
                let interval_minutes = u32::try_from(interval).map_err(|_| {
                    SchedulerError::InvalidSchedule(format!("interval out of range: {interval}"))
                })?;
                Recurrence::Hourly { interval_minutes }
            }
            ScheduleType::Daily => Recurrence::Daily,
            ScheduleType::Weekly => Recurrence::Weekly {
                days: days_of_week
                    .iter()
                    .map(|d| d.parse::<DayOfWeek>())
                    .collect::<Result<BTreeSet<_>, _>>()?,
            },
        };
        recurrence.validate()?;
        Ok(recurrence)
    }
}

/// A recurring job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Store-assigned id.
    pub id: String,
    /// Display label.
    pub job_name: String,
    /// Time of day the recurrence is anchored to.
    pub start_time: StartTime,
    /// How often the job fires.
    pub recurrence: Recurrence,
    /// Whether the job fires at all.
    pub is_enabled: bool,
    /// When the job is next due; `None` when disabled.
    pub next_run: Option<DateTime<Utc>>,
    /// When the schedule was created.
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether the schedule should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_enabled
            && self
                .next_run
                .is_some_and(|next_run| is_strictly_after(&now, &next_run))
    }

    /// Interpret a stored document.
    ///
    /// A disabled schedule never carries a next run, whatever the store says.
    pub fn from_document(doc: Document<ScheduleRecord>) -> Result<Self, SchedulerError> {
        let Document { id, fields } = doc;
        let invalid = |reason: String| {
            SchedulerError::Store(StoreError::InvalidRecord {
                id: id.clone(),
                reason,
            })
        };

        let start_time: StartTime = fields
            .start_time
            .parse()
            .map_err(|e: SchedulerError| invalid(e.to_string()))?;
        let recurrence =
            Recurrence::from_stored(fields.schedule_type, fields.interval, &fields.days_of_week)
                .map_err(|e| invalid(e.to_string()))?;
        let next_run = match fields.next_run {
            Some(ts) if fields.is_enabled => Some(
                ts.to_datetime()
                    .ok_or_else(|| invalid("next run out of range".to_string()))?,
            ),
            _ => None,
        };
        let created_at = fields
            .created_at
            .to_datetime()
            .ok_or_else(|| invalid("creation time out of range".to_string()))?;

        Ok(Self {
            id,
            job_name: fields.job_name,
            start_time,
            recurrence,
            is_enabled: fields.is_enabled,
            next_run,
            created_at,
        })
    }

    /// The stored form of this schedule (without its id).
    pub fn to_record(&self) -> ScheduleRecord {
        ScheduleRecord {
            job_name: self.job_name.clone(),
            schedule_type: self.recurrence.schedule_type(),
            start_time: self.start_time.to_string(),
            interval: self.recurrence.stored_interval(),
            days_of_week: self.recurrence.stored_days(),
            is_enabled: self.is_enabled,
            next_run: self.next_run.map(Into::into),
            created_at: self.created_at.into(),
        }
    }
}

/// Definition of a schedule to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSchedule {
    pub job_name: String,
    pub start_time: StartTime,
    pub recurrence: Recurrence,
}

impl NewSchedule {
    pub fn new(job_name: impl Into<String>, start_time: StartTime, recurrence: Recurrence) -> Self {
        Self {
            job_name: job_name.into(),
            start_time,
            recurrence,
        }
    }

    /// Reject definitions that cannot be scheduled.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        validate_job_name(&self.job_name)?;
        self.recurrence.validate()
    }
}

/// Changes to an existing schedule. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleEdit {
    pub job_name: Option<String>,
    pub start_time: Option<StartTime>,
    pub recurrence: Option<Recurrence>,
}

impl ScheduleEdit {
    pub fn is_empty(&self) -> bool {
        self.job_name.is_none() && self.start_time.is_none() && self.recurrence.is_none()
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if let Some(ref job_name) = self.job_name {
            validate_job_name(job_name)?;
        }
        if let Some(ref recurrence) = self.recurrence {
            recurrence.validate()?;
        }
        Ok(())
    }
}

fn validate_job_name(job_name: &str) -> Result<(), SchedulerError> {
    if job_name.trim().is_empty() {
        return Err(SchedulerError::InvalidSchedule(
            "job name is required".to_string(),
        ));
    }
    Ok(())
}

/// One firing of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    /// Schedule that fired; may since have been deleted.
    pub job_id: String,
    /// Schedule name at firing time.
    pub job_name: String,
    /// When the firing was detected.
    pub execution_time: DateTime<Utc>,
    pub message: String,
    pub status: LogStatus,
}

impl LogEntry {
    pub fn from_document(doc: Document<LogRecord>) -> Result<Self, SchedulerError> {
        let Document { id, fields } = doc;
        let execution_time = fields.execution_time.to_datetime().ok_or_else(|| {
            SchedulerError::Store(StoreError::InvalidRecord {
                id: id.clone(),
                reason: "execution time out of range".to_string(),
            })
        })?;
        Ok(Self {
            id,
            job_id: fields.job_id,
            job_name: fields.job_name,
            execution_time,
            message: fields.message,
            status: fields.status,
        })
    }

    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            job_id: self.job_id.clone(),
            job_name: self.job_name.clone(),
            execution_time: self.execution_time.into(),
            message: self.message.clone(),
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use chronoprint_store::StoreTimestamp;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap()
    }

    fn schedule(recurrence: Recurrence) -> Schedule {
        Schedule {
            id: "s1".to_string(),
            job_name: "Report".to_string(),
            start_time: StartTime::new(9, 0).unwrap(),
            recurrence,
            is_enabled: true,
            next_run: Some(at(9, 0)),
            created_at: at(8, 0),
        }
    }

    // === Unit Tests ===

    #[test]
    fn test_start_time_parse_and_display() {
        let time: StartTime = "09:05".parse().unwrap();
        assert_eq!(time.hour(), 9);
        assert_eq!(time.minute(), 5);
        assert_eq!(time.to_string(), "09:05");

        let short: StartTime = "7:30".parse().unwrap();
        assert_eq!(short.to_string(), "07:30");
    }

    #[test]
    fn test_start_time_rejects_malformed() {
        for bad in ["", "9", "24:00", "12:60", "12:5", "ab:cd", "12:345", "-1:00"] {
            assert!(bad.parse::<StartTime>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_start_time_serde_as_string() {
        let time = StartTime::new(23, 59).unwrap();
        assert_eq!(serde_json::to_value(time).unwrap(), "23:59");
        let back: StartTime = serde_json::from_value(serde_json::json!("23:59")).unwrap();
        assert_eq!(back, time);
        assert!(serde_json::from_value::<StartTime>(serde_json::json!("25:00")).is_err());
    }

    #[test]
    fn test_day_of_week_numbering() {
        assert_eq!(DayOfWeek::Sunday.number(), 0);
        assert_eq!(DayOfWeek::Saturday.number(), 6);
        assert_eq!(DayOfWeek::from_number(3), Some(DayOfWeek::Wednesday));
        assert_eq!(DayOfWeek::from_number(7), None);
    }

    #[test]
    fn test_day_of_week_parse() {
        assert_eq!("Monday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!("fri".parse::<DayOfWeek>().unwrap(), DayOfWeek::Friday);
        assert_eq!(" SATURDAY ".parse::<DayOfWeek>().unwrap(), DayOfWeek::Saturday);
        assert!("Funday".parse::<DayOfWeek>().is_err());
    }

    #[test]
    fn test_recurrence_validation() {
        assert!(Recurrence::Hourly { interval_minutes: 0 }.validate().is_err());
        assert!(Recurrence::Hourly { interval_minutes: 1 }.validate().is_ok());
        assert!(Recurrence::weekly(Vec::new()).validate().is_err());
        assert!(Recurrence::weekly([DayOfWeek::Monday]).validate().is_ok());
        assert!(Recurrence::Daily.validate().is_ok());
    }

    #[test]
    fn test_new_schedule_requires_name() {
        let start = StartTime::new(9, 0).unwrap();
        assert!(NewSchedule::new("   ", start, Recurrence::Daily).validate().is_err());
        assert!(NewSchedule::new("Backup", start, Recurrence::Daily).validate().is_ok());
    }

    #[test]
    fn test_is_due_is_strict() {
        let s = schedule(Recurrence::Daily);
        assert!(!s.is_due(at(9, 0)));
        assert!(s.is_due(at(9, 0) + Duration::milliseconds(1)));
        assert!(!s.is_due(at(8, 59)));
    }

    #[test]
    fn test_disabled_schedule_never_due() {
        let mut s = schedule(Recurrence::Daily);
        s.is_enabled = false;
        assert!(!s.is_due(at(23, 0)));
    }

    #[test]
    fn test_hourly_record_shape() {
        let record = schedule(Recurrence::Hourly { interval_minutes: 45 }).to_record();
        assert_eq!(record.schedule_type, ScheduleType::Hourly);
        assert_eq!(record.interval, Some(45));
        assert!(record.days_of_week.is_empty());
        assert_eq!(record.start_time, "09:00");
    }

    #[test]
    fn test_weekly_record_days_in_week_order() {
        let record =
            schedule(Recurrence::weekly([DayOfWeek::Friday, DayOfWeek::Monday])).to_record();
        assert_eq!(record.interval, None);
        assert_eq!(record.days_of_week, vec!["Monday", "Friday"]);
    }

    #[test]
    fn test_from_document_rejects_hourly_without_interval() {
        let mut record = schedule(Recurrence::Daily).to_record();
        record.schedule_type = ScheduleType::Hourly;
        let err = Schedule::from_document(Document {
            id: "bad".to_string(),
            fields: record,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Store(StoreError::InvalidRecord { ref id, .. }) if id == "bad"
        ));
    }

    #[test]
    fn test_from_document_rejects_negative_interval() {
        let mut record = schedule(Recurrence::Hourly { interval_minutes: 5 }).to_record();
        record.interval = Some(-5);
        assert!(
            Schedule::from_document(Document {
                id: "neg".to_string(),
                fields: record,
            })
            .is_err()
        );
    }

    #[test]
    fn test_from_document_rejects_empty_weekly() {
        let mut record = schedule(Recurrence::Daily).to_record();
        record.schedule_type = ScheduleType::Weekly;
        assert!(
            Schedule::from_document(Document {
                id: "w".to_string(),
                fields: record,
            })
            .is_err()
        );
    }

    #[test]
    fn test_from_document_drops_next_run_of_disabled() {
        let mut record = schedule(Recurrence::Daily).to_record();
        record.is_enabled = false;
        record.next_run = Some(StoreTimestamp::from(at(9, 0)));
        let s = Schedule::from_document(Document {
            id: "d".to_string(),
            fields: record,
        })
        .unwrap();
        assert!(!s.is_enabled);
        assert_eq!(s.next_run, None);
    }

    #[test]
    fn test_schedule_document_round_trip() {
        let original = schedule(Recurrence::weekly([DayOfWeek::Monday, DayOfWeek::Wednesday]));
        let restored = Schedule::from_document(Document {
            id: original.id.clone(),
            fields: original.to_record(),
        })
        .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_log_entry_round_trip() {
        let entry = LogEntry {
            id: "l1".to_string(),
            job_id: "s1".to_string(),
            job_name: "Report".to_string(),
            execution_time: at(9, 0) + Duration::seconds(7),
            message: "Executed \"Hello World\"".to_string(),
            status: LogStatus::Success,
        };
        let restored = LogEntry::from_document(Document {
            id: entry.id.clone(),
            fields: entry.to_record(),
        })
        .unwrap();
        assert_eq!(restored, entry);
    }

    // === Property-Based Tests ===

    proptest! {
        // Every valid hour/minute formats and parses back to itself
        #[test]
        fn start_time_text_is_stable(hour in 0u32..24, minute in 0u32..60) {
            let time = StartTime::new(hour, minute).unwrap();
            let text = time.to_string();
            prop_assert_eq!(text.len(), 5);
            prop_assert_eq!(text.parse::<StartTime>().unwrap(), time);
        }

        // Day numbers and names agree in both directions
        #[test]
        fn day_number_and_name_agree(number in 0u32..7) {
            let day = DayOfWeek::from_number(number).unwrap();
            prop_assert_eq!(day.number(), number);
            prop_assert_eq!(day.name().parse::<DayOfWeek>().unwrap(), day);
        }

        // Positive intervals always validate
        #[test]
        fn positive_interval_is_valid(interval in 1u32..100_000) {
            let recurrence = Recurrence::Hourly { interval_minutes: interval };
            prop_assert!(recurrence.validate().is_ok());
        }
    }
}
