use jiff::{Timestamp, Zoned};
use std::time::Duration;

/// Local wall-clock time as `HH:MM:SS`
pub fn clock_text() -> String {
    format_clock(&Zoned::now())
}

pub fn format_clock(time: &Zoned) -> String {
    time.strftime("%H:%M:%S").to_string()
}

/// Time left until the wall clock reaches the next whole second
pub fn until_next_second() -> Duration {
    let nanos = Timestamp::now().subsec_nanosecond().max(0) as u64;
    Duration::from_nanos(1_000_000_000 - nanos.min(999_999_999))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::ToSpan;

    #[test]
    fn test_format_is_hours_minutes_seconds() {
        let time: Zoned = "2024-03-10T07:05:09[UTC]".parse().unwrap();
        assert_eq!(format_clock(&time), "07:05:09");
    }

    #[test]
    fn test_one_second_apart_never_matches() {
        let time: Zoned = "2024-03-10T23:59:58[UTC]".parse().unwrap();
        let later = time.checked_add(1.second()).unwrap();
        assert_ne!(format_clock(&time), format_clock(&later));
        assert_eq!(format_clock(&later), "23:59:59");
    }

    #[test]
    fn test_next_second_is_within_a_second() {
        let wait = until_next_second();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(1));
    }
}
