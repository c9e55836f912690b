//! Core types for stored documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-native timestamp: whole seconds plus nanoseconds since the Unix epoch.
///
/// Every instant crosses the store boundary in this form. Optional instants are
/// modelled as `Option<StoreTimestamp>` so that a missing field never decodes
/// as the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreTimestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanos: u32,
}

impl StoreTimestamp {
    /// Convert back to a UTC instant. Returns `None` for out-of-range values.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }
}

impl From<DateTime<Utc>> for StoreTimestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanos: at.timestamp_subsec_nanos(),
        }
    }
}

/// A stored document: its id plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    pub id: String,
    pub fields: T,
}

/// Response from listing a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse<T> {
    pub documents: Vec<Document<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Recurrence kind as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    Hourly,
    Daily,
    Weekly,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleType::Hourly => write!(f, "Hourly"),
            ScheduleType::Daily => write!(f, "Daily"),
            ScheduleType::Weekly => write!(f, "Weekly"),
        }
    }
}

/// Schedule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    /// Display label.
    pub job_name: String,
    /// Recurrence kind.
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    /// Time of day in `HH:mm` form.
    pub start_time: String,
    /// Interval in minutes (Hourly only, flexible number deserialization).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_i64"
    )]
    pub interval: Option<i64>,
    /// Weekday names (Weekly only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<String>,
    /// Whether the schedule fires.
    pub is_enabled: bool,
    /// Next due instant, absent when disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<StoreTimestamp>,
    /// When this schedule was created.
    pub created_at: StoreTimestamp,
}

impl ScheduleRecord {
    /// Apply a partial update in place.
    pub fn apply(&mut self, fields: &ScheduleFields) {
        if let Some(is_enabled) = fields.is_enabled {
            self.is_enabled = is_enabled;
        }
        if let Some(next_run) = fields.next_run {
            self.next_run = next_run;
        }
        if let Some(ref job_name) = fields.job_name {
            self.job_name = job_name.clone();
        }
        if let Some(schedule_type) = fields.schedule_type {
            self.schedule_type = schedule_type;
        }
        if let Some(ref start_time) = fields.start_time {
            self.start_time = start_time.clone();
        }
        if let Some(interval) = fields.interval {
            self.interval = interval;
        }
        if let Some(ref days) = fields.days_of_week {
            self.days_of_week = days.clone();
        }
    }
}

/// Partial update of a schedule document.
///
/// Outer `None` leaves a field untouched. For the optional fields, `Some(None)`
/// serializes as `null` and clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<Option<StoreTimestamp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schedule_type: Option<ScheduleType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<String>>,
}

impl ScheduleFields {
    /// True when the update would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStatus {
    Success,
    Failure,
}

/// Execution log document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Id of the schedule that fired (may no longer exist).
    pub job_id: String,
    /// Schedule name at firing time.
    pub job_name: String,
    /// When the firing was detected.
    pub execution_time: StoreTimestamp,
    /// What ran.
    pub message: String,
    /// Outcome.
    pub status: LogStatus,
}

/// Deserialize an optional integer that may arrive as an integer, an integral
/// float, or a numeric string.
fn deserialize_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct OptionalI64Visitor;

    impl<'de> Visitor<'de> for OptionalI64Visitor {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an integer, an integral float, a numeric string, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map(Some)
                .map_err(|_| de::Error::custom("integer out of range"))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if value.fract() == 0.0 && value.is_finite() {
                Ok(Some(value as i64))
            } else {
                Err(de::Error::custom("expected an integral number"))
            }
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("not an integer: {value:?}")))
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_any(OptionalI64Visitor)
        }
    }

    deserializer.deserialize_option(OptionalI64Visitor)
}
