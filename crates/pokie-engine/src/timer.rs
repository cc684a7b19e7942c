//! Voting countdowns as absolute deadlines.
//!
//! Nothing here runs in the background: the deadline is stored on the
//! session when voting starts and clients count down locally. Expiry is
//! advisory, the host still reveals explicitly.

use pokie_types::api::TimerView;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Deadline for a countdown of `duration_secs` starting at `now_ms`.
pub fn deadline(now_ms: i64, duration_secs: u32) -> i64 {
    now_ms.saturating_add(i64::from(duration_secs) * 1000)
}

/// Snapshot of a running countdown as seen at `now_ms`.
pub fn view(end_time: Option<i64>, now_ms: i64) -> Option<TimerView> {
    let end_time = end_time?;
    let remaining_ms = (end_time - now_ms).max(0);
    Some(TimerView {
        end_time,
        remaining_ms,
        expired: remaining_ms == 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_adds_seconds_as_millis() {
        assert_eq!(deadline(1_000, 60), 61_000);
        assert_eq!(deadline(i64::MAX - 5, 1), i64::MAX);
    }

    #[test]
    fn view_counts_down_and_expires() {
        let running = view(Some(10_000), 4_000).unwrap();
        assert_eq!(running.remaining_ms, 6_000);
        assert!(!running.expired);

        let done = view(Some(10_000), 12_000).unwrap();
        assert_eq!(done.remaining_ms, 0);
        assert!(done.expired);

        assert_eq!(view(None, 12_000), None);
    }
}
