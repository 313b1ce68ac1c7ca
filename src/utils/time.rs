use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Nanoseconds since the Unix epoch, truncated to 64 bits.
pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// A deadline has passed once the current time reaches it.
pub fn is_expired(expires_at: i64, current_time: i64) -> bool {
    expires_at <= current_time
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp() {
        let ts = current_timestamp();
        // Should be a reasonable timestamp (after 2020-01-01)
        assert!(ts > 1577836800);
        // Should be before 2100-01-01
        assert!(ts < 4102444800);
    }

    #[test]
    fn test_current_timestamp_nanos_tracks_seconds() {
        let nanos = current_timestamp_nanos();
        let secs = current_timestamp();

        let diff = (nanos / 1_000_000_000) as i64 - secs;
        assert!(diff.abs() <= 1);
    }

    #[test]
    fn test_is_expired() {
        let current = 1000;

        // Deadline still ahead
        assert!(!is_expired(1001, current));

        // Deadline long gone
        assert!(is_expired(100, current));

        // Edge case: exactly at the deadline counts as expired
        assert!(is_expired(1000, current));
    }
}
