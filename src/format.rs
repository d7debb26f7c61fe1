use chrono::{DateTime, NaiveDateTime, Utc};

pub const UNKNOWN_TIME: &str = "unknown time";

/// Parses RFC 3339 or naive ISO-8601 timestamps. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(ts);
    let future = delta.num_seconds() < 0;
    let delta = if future { -delta } else { delta };

    let (amount, unit) = if delta.num_minutes() < 1 {
        return "just now".to_string();
    } else if delta.num_hours() < 1 {
        (delta.num_minutes(), "minute")
    } else if delta.num_days() < 1 {
        (delta.num_hours(), "hour")
    } else if delta.num_days() < 30 {
        (delta.num_days(), "day")
    } else if delta.num_days() < 365 {
        (delta.num_days() / 30, "month")
    } else {
        (delta.num_days() / 365, "year")
    };

    let plural = if amount == 1 { "" } else { "s" };
    if future {
        format!("in {} {}{}", amount, unit, plural)
    } else {
        format!("{} {}{} ago", amount, unit, plural)
    }
}

pub fn format_absolute(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_optional(ts: Option<DateTime<Utc>>) -> String {
    ts.map(format_absolute).unwrap_or_else(|| UNKNOWN_TIME.to_string())
}

pub fn format_score(score: f64) -> String {
    format!("{:.1}/10", score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_dates() {
        let now = noon();
        assert_eq!(format_relative(now - Duration::seconds(20), now), "just now");
        assert_eq!(format_relative(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_relative(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(format_relative(now - Duration::days(3), now), "3 days ago");
        assert_eq!(format_relative(now - Duration::days(65), now), "2 months ago");
        assert_eq!(format_relative(now + Duration::hours(2), now), "in 2 hours");
    }

    #[test]
    fn parses_backend_timestamps() {
        assert_eq!(parse_timestamp("2024-05-10T12:00:00"), Some(noon()));
        assert_eq!(parse_timestamp("2024-05-10T14:00:00+02:00"), Some(noon()));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(format_optional(None), UNKNOWN_TIME);
    }

    #[test]
    fn score_has_one_decimal() {
        assert_eq!(format_score(7.26), "7.3/10");
        assert_eq!(format_score(10.0), "10.0/10");
    }
}
