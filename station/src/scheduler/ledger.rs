//! Same-minute dispatch ledger

use std::collections::HashSet;

use chrono::{NaiveDateTime, Timelike};

/// Command IDs already evaluated in the current local minute.
///
/// Two ticks landing in the same minute see the same due schedules; the ledger
/// lets only the first one act. It forgets everything when the minute changes.
#[derive(Debug, Default)]
pub struct DispatchLedger {
    minute: Option<NaiveDateTime>,
    claimed: HashSet<String>,
}

impl DispatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `command_id` for `local`'s minute; false if it was already claimed
    pub fn claim(&mut self, local: &NaiveDateTime, command_id: &str) -> bool {
        let minute = local.with_second(0).and_then(|t| t.with_nanosecond(0));
        if self.minute != minute {
            self.minute = minute;
            self.claimed.clear();
        }
        self.claimed.insert(command_id.to_string())
    }
}
