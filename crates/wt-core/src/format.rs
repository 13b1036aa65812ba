//! Human-readable duration formatting.

const WEEK_MS: i64 = 604_800_000;
const DAY_MS: i64 = 86_400_000;
const HOUR_MS: i64 = 3_600_000;
const MINUTE_MS: i64 = 60_000;

/// Rounded conversion of milliseconds to seconds (half rounds up).
#[must_use]
pub const fn ms_to_s(ms: i64) -> i64 {
    ms.saturating_add(500) / 1000
}

/// Renders a duration as its two most significant units.
///
/// Falls through week, day, hour and minute; anything under a minute is
/// shown as seconds alone (`"42sec"`). Negative input is treated as zero.
#[must_use]
pub fn millis_to_string(ms: i64) -> String {
    let mut rest = ms.max(0);

    let weeks = rest / WEEK_MS;
    rest -= weeks * WEEK_MS;

    let days = rest / DAY_MS;
    rest -= days * DAY_MS;

    let hours = rest / HOUR_MS;
    rest -= hours * HOUR_MS;

    let minutes = rest / MINUTE_MS;
    rest -= minutes * MINUTE_MS;

    let seconds = ms_to_s(rest);

    if weeks > 0 {
        format!("{weeks}w {days}d")
    } else if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}sec")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_to_s_rounds_half_up() {
        assert_eq!(ms_to_s(0), 0);
        assert_eq!(ms_to_s(499), 0);
        assert_eq!(ms_to_s(500), 1);
        assert_eq!(ms_to_s(1499), 1);
        assert_eq!(ms_to_s(1500), 2);
    }

    #[test]
    fn ms_to_s_saturates_near_max() {
        assert_eq!(ms_to_s(i64::MAX), i64::MAX / 1000);
        assert_eq!(ms_to_s(i64::MAX - 200), i64::MAX / 1000);
        assert_eq!(millis_to_string(i64::MAX), "15250284452w 3d");
    }

    #[test]
    fn formats_each_unit_boundary() {
        assert_eq!(millis_to_string(0), "0sec");
        assert_eq!(millis_to_string(90_000), "1m 30s");
        assert_eq!(millis_to_string(3_661_000), "1h 1m");
        assert_eq!(millis_to_string(90_000_000), "1d 1h");
        assert_eq!(millis_to_string(WEEK_MS + 2 * DAY_MS + HOUR_MS), "1w 2d");
    }

    #[test]
    fn under_a_minute_shows_seconds_only() {
        assert_eq!(millis_to_string(59_000), "59sec");
        assert_eq!(millis_to_string(1_400), "1sec");
    }

    #[test]
    fn prints_zero_minor_unit() {
        assert_eq!(millis_to_string(2 * HOUR_MS), "2h 0m");
        assert_eq!(millis_to_string(3 * DAY_MS + 5 * MINUTE_MS), "3d 0h");
    }

    #[test]
    fn negative_is_zero() {
        assert_eq!(millis_to_string(-5_000), "0sec");
    }

    #[test]
    fn widest_value_per_unit() {
        let rendered: Vec<String> = [60_i64, 3_600, 86_400, 604_800]
            .iter()
            .map(|s| millis_to_string((s - 1) * 1000))
            .collect();
        insta::assert_snapshot!(rendered.join("\n"), @r"
        59sec
        59m 59s
        23h 59m
        6d 23h
        ");
    }
}
