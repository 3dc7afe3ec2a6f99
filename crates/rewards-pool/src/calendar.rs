//! Once-per-day check-in rule

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use rewards_api::CheckinTime;

/// Whether the last check-in falls on the same local calendar day as `now`.
///
/// A missing or unparseable timestamp counts as "not checked in", so the
/// check-in is attempted and the server decides.
pub fn checked_in_today(last: Option<&CheckinTime>, now: DateTime<Local>) -> bool {
    last.and_then(to_local)
        .is_some_and(|at| at.date_naive() == now.date_naive())
}

fn to_local(time: &CheckinTime) -> Option<DateTime<Local>> {
    match time {
        CheckinTime::EpochMillis(ms) => {
            DateTime::from_timestamp_millis(*ms).map(|at| at.with_timezone(&Local))
        }
        CheckinTime::Text(text) => {
            if let Ok(at) = DateTime::parse_from_rfc3339(text) {
                return Some(at.with_timezone(&Local));
            }
            // Timestamps without an offset are local time
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        }
    }
}
