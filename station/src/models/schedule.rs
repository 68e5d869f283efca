//! Watering schedule models

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::StationError;

/// Local time of day at minute granularity, `"HH:MM"` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Truncate a clock reading to its minute
    pub fn of<T: Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StationError::ValidationError(format!("Invalid time of day: {s:?}"));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Day of week, 1 = Monday through 7 = Sunday
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Weekday(u8);

impl Weekday {
    /// Weekday of a local date
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self(date.weekday().number_from_monday() as u8)
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Weekday {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=7).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("weekday must be within 1..=7, got {value}"))
        }
    }
}

impl From<Weekday> for u8 {
    fn from(day: Weekday) -> Self {
        day.0
    }
}

/// Forecast lookup coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// A recurring watering plan for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Schedule ID, unique within its device
    pub id: String,

    /// Owning device; filled from the enclosing profile when omitted
    #[serde(default)]
    pub device_id: String,

    #[serde(default = "default_label")]
    pub label: String,

    pub enabled: bool,

    /// Active weekdays
    pub days: BTreeSet<Weekday>,

    /// Local start time
    pub time: TimeOfDay,

    /// Watering length; zero is rejected at load time
    pub duration_minutes: NonZeroU32,

    #[serde(flatten)]
    pub location: Location,
}

fn default_label() -> String {
    "Schedule".to_string()
}

impl Schedule {
    /// Valve-open time for the command this schedule produces
    pub fn duration_secs(&self) -> u32 {
        self.duration_minutes.get().saturating_mul(60)
    }
}

/// Everything the schedule store holds for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_id: String,

    /// Soil moisture (percent) at or above which scheduled watering is skipped.
    /// `None` disables the soil-moisture guard.
    #[serde(default)]
    pub target_soil_moisture: Option<f64>,

    #[serde(default)]
    pub schedules: Vec<Schedule>,

    /// Schedules that failed validation while loading; the rest still run
    #[serde(skip)]
    pub rejected: Vec<RejectedSchedule>,
}

/// A stored schedule entry that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSchedule {
    /// The entry's `id`, when it has a string one
    pub id: Option<String>,
    pub reason: String,
}

/// Profile fields read before the schedules are validated one by one
#[derive(Deserialize)]
struct ProfileHeader {
    device_id: String,
    #[serde(default)]
    target_soil_moisture: Option<f64>,
    #[serde(default)]
    schedules: Vec<serde_json::Value>,
}

impl DeviceProfile {
    /// Parse a stored profile, setting aside schedules that do not validate.
    ///
    /// Fails only when the profile itself (device ID, soil target, schedule
    /// list) is malformed.
    pub fn from_value(value: serde_json::Value) -> Result<Self, StationError> {
        let header: ProfileHeader = serde_json::from_value(value)?;

        let mut schedules = Vec::with_capacity(header.schedules.len());
        let mut rejected = Vec::new();
        for entry in header.schedules {
            let id = entry.get("id").and_then(|id| id.as_str()).map(str::to_string);
            match serde_json::from_value::<Schedule>(entry) {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => rejected.push(RejectedSchedule {
                    id,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(Self {
            device_id: header.device_id,
            target_soil_moisture: header.target_soil_moisture,
            schedules,
            rejected,
        }
        .normalized())
    }

    /// Stamp the profile's device ID onto schedules that omit it
    pub fn normalized(mut self) -> Self {
        for schedule in &mut self.schedules {
            if schedule.device_id.is_empty() {
                schedule.device_id = self.device_id.clone();
            }
        }
        self
    }
}
