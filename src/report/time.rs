use std::time::Duration;

const MILLIS_PER_SECOND: u128 = 1_000;
const MILLIS_PER_MINUTE: u128 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u128 = 60 * MILLIS_PER_MINUTE;

/// 소요 시간을 가장 큰 단위와 그 다음 단위, 두 요소로 줄여 표시한다.
///
/// 단위는 시, 분, 초, 밀리초 순이다. 두 번째 요소보다 작은 단위는 버린다.
/// 분과 초는 두 자리로 채우고 밀리초는 채우지 않는다.
///
/// ```
/// use rust_bdd::report::format_pretty;
/// use std::time::Duration;
///
/// assert_eq!(format_pretty(Duration::from_millis(64_000)), "1m 04s");
/// assert_eq!(format_pretty(Duration::from_millis(25)), "25ms");
/// ```
pub fn format_pretty(duration: Duration) -> String {
    let total = duration.as_millis();
    let hours = total / MILLIS_PER_HOUR;
    let minutes = total % MILLIS_PER_HOUR / MILLIS_PER_MINUTE;
    let seconds = total % MILLIS_PER_MINUTE / MILLIS_PER_SECOND;
    let millis = total % MILLIS_PER_SECOND;

    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else if seconds > 0 {
        format!("{seconds}s {millis}ms")
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> String {
        format_pretty(Duration::from_millis(value))
    }

    #[test]
    fn formats_minutes_with_padded_seconds() {
        assert_eq!(ms(64_000), "1m 04s");
        assert_eq!(ms(62_000), "1m 02s");
        assert_eq!(ms(61_999), "1m 01s");
    }

    #[test]
    fn formats_seconds_with_milliseconds() {
        assert_eq!(ms(32_128), "32s 128ms");
        assert_eq!(ms(1_100), "1s 100ms");
        assert_eq!(ms(2_157), "2s 157ms");
        assert_eq!(ms(1_005), "1s 5ms");
    }

    #[test]
    fn formats_milliseconds_alone() {
        assert_eq!(ms(25), "25ms");
        assert_eq!(ms(0), "0ms");
        assert_eq!(format_pretty(Duration::from_micros(900)), "0ms");
    }

    #[test]
    fn hours_drop_seconds() {
        assert_eq!(ms(3 * 3_600_000 + 5 * 60_000 + 59_999), "3h 05m");
        assert_eq!(ms(3_600_000), "1h 00m");
        assert_eq!(ms(30 * 3_600_000), "30h 00m");
    }
}
