//! Selects the schedules due at a given local minute

use chrono::{DateTime, TimeZone};

use crate::models::schedule::{Schedule, TimeOfDay, Weekday};

/// Return the enabled schedules whose weekday set contains the local weekday of
/// `now` and whose start time equals the local minute of `now`.
///
/// `now` must already carry the locality's timezone. A minute the caller never
/// evaluates is simply missed; there is no catch-up window.
pub fn due_schedules<'a, Tz: TimeZone>(
    now: &DateTime<Tz>,
    schedules: &'a [Schedule],
) -> Vec<&'a Schedule> {
    let local = now.naive_local();
    let weekday = Weekday::of(&local);
    let minute = TimeOfDay::of(&local);

    schedules
        .iter()
        .filter(|s| s.enabled && s.days.contains(&weekday) && s.time == minute)
        .collect()
}
