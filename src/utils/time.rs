use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

pub fn get_duration_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// return millisecond
pub fn timestamp_millis() -> u64 {
    get_duration_since_epoch().as_millis() as u64
}
