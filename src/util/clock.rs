//! Small time helpers.

use std::time::Duration;

const MILLIS_PER_MINUTE: u128 = 60 * 1000;
const MILLIS_PER_HOUR: u128 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u128 = 24 * MILLIS_PER_HOUR;

/// Express `duration` in the largest whole unit that fits, for log lines.
#[must_use]
pub fn human_duration(duration: Duration) -> (u64, &'static str) {
    let millis = duration.as_millis();
    if millis >= MILLIS_PER_DAY {
        (whole(millis / MILLIS_PER_DAY), "days")
    } else if millis >= MILLIS_PER_HOUR {
        (whole(millis / MILLIS_PER_HOUR), "hours")
    } else if millis >= MILLIS_PER_MINUTE {
        (whole(millis / MILLIS_PER_MINUTE), "minutes")
    } else if millis >= 1000 {
        (whole(millis / 1000), "seconds")
    } else {
        (whole(millis), "milliseconds")
    }
}

fn whole(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
