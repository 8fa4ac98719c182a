//! Backlog parsing and time-window slicing for bounding vendor API requests.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SensorpushdError};

/// Parse a backlog string like `"1d"`, `"10m"`, `"1M"` into whole minutes.
///
/// Units: m=1, h=60, d=1440, w=10080, M=43800.48, Y=525600. The fractional
/// minutes-per-month factor is applied before truncating to an integer,
/// matching the original `int(int(n) * minutes_per_unit[unit])` — so
/// `"1M"` yields 43800, not 43800.48 rounded.
pub fn parse_backlog(s: &str) -> Result<i64> {
    if s.len() < 2 {
        return Err(SensorpushdError::InvalidBacklog(s.to_string()));
    }
    let (num_part, unit) = s.split_at(s.len() - 1);
    let n: i64 = num_part
        .parse()
        .map_err(|_| SensorpushdError::InvalidBacklog(s.to_string()))?;

    let minutes_per_unit: f64 = match unit {
        "m" => 1.0,
        "h" => 60.0,
        "d" => 60.0 * 24.0,
        "w" => 60.0 * 24.0 * 7.0,
        "M" => 60.0 * 24.0 * 30.417,
        "Y" => 60.0 * 24.0 * 365.0,
        _ => return Err(SensorpushdError::InvalidBacklog(s.to_string())),
    };

    Ok((n as f64 * minutes_per_unit) as i64)
}

/// Slice `[start, stop]` into overlapping windows, each `step` minutes wide,
/// where consecutive windows overlap by 30 minutes: `w_{i+1}.start = w_i.end - 30min`.
pub fn build_windows(
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    step_minutes: i64,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let step = Duration::minutes(step_minutes);
    let overlap = Duration::minutes(30);

    let mut windows = Vec::new();
    let mut cursor = start;

    while cursor <= stop {
        let window_end = cursor + step;
        windows.push((cursor, window_end));
        cursor = window_end - overlap;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_backlog_scenarios() {
        assert_eq!(parse_backlog("1d").unwrap(), 1440);
        assert_eq!(parse_backlog("1M").unwrap(), 43800);
        assert_eq!(parse_backlog("10m").unwrap(), 10);
        assert_eq!(parse_backlog("1w").unwrap(), 10080);
    }

    #[test]
    fn parse_backlog_rejects_malformed() {
        assert!(parse_backlog("").is_err());
        assert!(parse_backlog("abc").is_err());
        assert!(parse_backlog("5x").is_err());
    }

    #[test]
    fn windows_overlap_by_30_minutes() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let windows = build_windows(start, stop, 720);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (start, start + Duration::hours(12)));
        assert_eq!(
            windows[1],
            (
                start + Duration::hours(11) + Duration::minutes(30),
                start + Duration::hours(23) + Duration::minutes(30)
            )
        );
        for pair in windows.windows(2) {
            assert_eq!(pair[1].0, pair[0].1 - Duration::minutes(30));
        }
    }

    #[test]
    fn windows_cover_the_full_range() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let windows = build_windows(start, stop, 720);
        assert!(windows.first().unwrap().0 <= start);
        assert!(windows.last().unwrap().1 >= stop);
    }
}
