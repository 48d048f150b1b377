use chrono::Duration;

use super::time::Interval;

/// Every `duration`-long candidate inside `window`, with starts spaced
/// `step` apart. Candidates that would run past the window end are dropped,
/// never truncated.
pub fn candidate_slots(window: Interval, duration: Duration, step: Duration) -> Vec<Interval> {
    if duration <= Duration::zero() {
        return Vec::new();
    }
    let step = step.max(Duration::minutes(1));

    let mut slots = Vec::new();
    let mut cursor = window.start;
    while cursor + duration <= window.end {
        slots.push(Interval::new(cursor, cursor + duration));
        cursor += step;
    }
    slots
}
