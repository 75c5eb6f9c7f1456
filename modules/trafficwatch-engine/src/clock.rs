use chrono::{DateTime, Duration, DurationRound, Utc};

/// Current time at the store's resolution (microseconds).
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::microseconds(1)).unwrap_or(now)
}

/// A mutation timestamp strictly after `previous`, even if the wall clock
/// has not moved past it.
pub fn after(previous: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = now();
    if candidate > previous {
        candidate
    } else {
        previous + Duration::microseconds(1)
    }
}
