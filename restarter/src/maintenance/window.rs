//! Maintenance window definitions and day matching

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Weekday};
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Minutes since local midnight; 24:00 is accepted as the end of the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute > 59 || hour > 24 || (hour == 24 && minute != 0) {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    pub fn minutes(&self) -> i64 {
        i64::from(self.0)
    }

    fn is_end_of_day(&self) -> bool {
        self.0 == MINUTES_PER_DAY
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("invalid time '{}', expected HH:MM", s))?;
        let hour: u16 = hour
            .parse()
            .map_err(|_| format!("invalid hour in '{}'", s))?;
        let minute: u16 = minute
            .parse()
            .map_err(|_| format!("invalid minute in '{}'", s))?;
        Self::from_hm(hour, minute).ok_or_else(|| format!("time '{}' is out of range", s))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordinal {
    Nth(u8),
    Last,
}

/// A rule such as "2nd tue" or "last fri"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdinalDay {
    pub ordinal: Ordinal,
    pub weekday: Weekday,
}

impl OrdinalDay {
    /// The single date this rule selects in the given month, if any
    pub fn resolve(&self, year: i32, month: u32) -> Option<NaiveDate> {
        match self.ordinal {
            Ordinal::Nth(n) => NaiveDate::from_weekday_of_month_opt(year, month, self.weekday, n),
            Ordinal::Last => {
                let (next_year, next_month) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
                while day.weekday() != self.weekday {
                    day = day.pred_opt()?;
                }
                Some(day)
            }
        }
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        date.weekday() == self.weekday && self.resolve(date.year(), date.month()) == Some(date)
    }
}

impl FromStr for OrdinalDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let mut parts = lowered.split_whitespace();
        let (Some(ordinal), Some(weekday), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("invalid ordinal day '{}', expected e.g. '2nd tue'", s));
        };

        let ordinal = match ordinal {
            "1st" | "first" => Ordinal::Nth(1),
            "2nd" | "second" => Ordinal::Nth(2),
            "3rd" | "third" => Ordinal::Nth(3),
            "4th" | "fourth" => Ordinal::Nth(4),
            "5th" | "fifth" => Ordinal::Nth(5),
            "last" => Ordinal::Last,
            other => return Err(format!("unknown ordinal '{}' in '{}'", other, s)),
        };
        let weekday = parse_weekday(weekday)?;

        Ok(Self { ordinal, weekday })
    }
}

pub fn parse_weekday(raw: &str) -> Result<Weekday, String> {
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| format!("unknown weekday '{}'", raw))
}

/// Accepts "UTC", "Z", "GMT", "+02:00", "-0530" and "UTC+01:00"
pub fn parse_timezone(raw: &str) -> Result<FixedOffset, String> {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    let offset = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);

    if offset.is_empty() || offset == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| "invalid UTC offset".to_string());
    }

    let (sign, digits) = match offset.as_bytes().first() {
        Some(b'+') => (1, &offset[1..]),
        Some(b'-') => (-1, &offset[1..]),
        _ => {
            return Err(format!(
                "unsupported timezone '{}', use UTC or an offset like +02:00",
                trimmed
            ))
        }
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours
        .parse()
        .map_err(|_| format!("invalid offset hours in '{}'", trimmed))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid offset minutes in '{}'", trimmed))?;
    if hours > 14 || minutes > 59 {
        return Err(format!("offset '{}' is out of range", trimmed));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("offset '{}' is out of range", trimmed))
}

/// One recurring maintenance window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub weekdays: Vec<Weekday>,
    pub ordinal_days: Vec<OrdinalDay>,
    pub description: Option<String>,
}

impl MaintenanceWindow {
    /// Parses "HH:MM-HH:MM"
    pub fn parse_range(range: &str) -> Result<(TimeOfDay, TimeOfDay), String> {
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| format!("invalid time range '{}', expected HH:MM-HH:MM", range))?;
        let start: TimeOfDay = start.parse()?;
        let end: TimeOfDay = end.parse()?;
        if start.is_end_of_day() {
            return Err(format!("window '{}' cannot start at 24:00", range));
        }
        Ok((start, end))
    }

    /// A window whose end is not after its start runs past midnight
    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self) -> Duration {
        let mut minutes = self.end.minutes() - self.start.minutes();
        if self.crosses_midnight() {
            minutes += i64::from(MINUTES_PER_DAY);
        }
        Duration::minutes(minutes)
    }

    /// Weekday and ordinal rules must both hold when both are given
    pub fn matches_day(&self, date: NaiveDate) -> bool {
        let weekday_ok = self.weekdays.is_empty() || self.weekdays.contains(&date.weekday());
        let ordinal_ok =
            self.ordinal_days.is_empty() || self.ordinal_days.iter().any(|o| o.matches(date));
        weekday_ok && ordinal_ok
    }

    /// Start and end of the occurrence anchored on `date`, if the window runs that day
    pub fn occurrence_on(
        &self,
        date: NaiveDate,
        tz: &FixedOffset,
    ) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        if !self.matches_day(date) {
            return None;
        }

        let midnight = tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()?;
        let start = midnight + Duration::minutes(self.start.minutes());
        let end = start + self.duration();
        Some((start, end))
    }

    pub fn label(&self) -> String {
        match &self.description {
            Some(description) => format!("'{}' ({}-{})", description, self.start, self.end),
            None => format!("window {}-{}", self.start, self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case("00:00", 0)]
    #[case("18:30", 18 * 60 + 30)]
    #[case("24:00", 1440)]
    fn test_time_of_day_parse(#[case] raw: &str, #[case] minutes: i64) {
        assert_eq!(raw.parse::<TimeOfDay>().unwrap().minutes(), minutes);
    }

    #[rstest]
    #[case("24:01")]
    #[case("25:00")]
    #[case("12:60")]
    #[case("noon")]
    fn test_time_of_day_rejects_invalid(#[case] raw: &str) {
        assert!(raw.parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_second_tuesday_is_unique_per_month() {
        let rule: OrdinalDay = "2nd tue".parse().unwrap();
        for month in 1..=12 {
            let resolved = rule.resolve(2024, month).unwrap();
            let matching: Vec<_> = (1..=31)
                .filter_map(|d| NaiveDate::from_ymd_opt(2024, month, d))
                .filter(|d| rule.matches(*d))
                .collect();
            assert_eq!(matching, vec![resolved]);
            assert!((8..=14).contains(&resolved.day()));
        }
    }

    #[rstest]
    #[case(2024, 2, 23)] // 29-day February
    #[case(2023, 2, 24)] // 28-day February
    #[case(2024, 4, 26)] // 30-day month
    #[case(2024, 5, 31)] // 31-day month ending on a Friday
    fn test_last_friday_across_month_lengths(#[case] y: i32, #[case] m: u32, #[case] d: u32) {
        let rule: OrdinalDay = "last fri".parse().unwrap();
        assert_eq!(rule.resolve(y, m), Some(date(y, m, d)));
    }

    #[test]
    fn test_fifth_weekday_may_not_exist() {
        let rule: OrdinalDay = "fifth mon".parse().unwrap();
        assert_eq!(rule.resolve(2024, 2), None);
        assert_eq!(rule.resolve(2024, 1), Some(date(2024, 1, 29)));
    }

    #[test]
    fn test_ordinal_day_rejects_garbage() {
        assert!("6th mon".parse::<OrdinalDay>().is_err());
        assert!("last".parse::<OrdinalDay>().is_err());
        assert!("2nd funday".parse::<OrdinalDay>().is_err());
    }

    #[rstest]
    #[case("UTC", 0)]
    #[case("Z", 0)]
    #[case("+02:00", 7200)]
    #[case("UTC-05:30", -(5 * 3600 + 30 * 60))]
    #[case("+0100", 3600)]
    fn test_parse_timezone(#[case] raw: &str, #[case] seconds: i32) {
        assert_eq!(parse_timezone(raw).unwrap().local_minus_utc(), seconds);
    }

    #[test]
    fn test_parse_timezone_rejects_region_names() {
        assert!(parse_timezone("Europe/Berlin").is_err());
    }

    #[test]
    fn test_crossing_window_occurrence_spans_two_days() {
        let (start, end) = MaintenanceWindow::parse_range("23:00-01:00").unwrap();
        let window = MaintenanceWindow {
            start,
            end,
            weekdays: vec![],
            ordinal_days: vec![],
            description: None,
        };
        let utc = FixedOffset::east_opt(0).unwrap();

        let (from, to) = window.occurrence_on(date(2024, 1, 15), &utc).unwrap();
        assert!(window.crosses_midnight());
        assert_eq!(window.duration(), Duration::hours(2));
        assert_eq!(from.to_rfc3339(), "2024-01-15T23:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2024-01-16T01:00:00+00:00");
    }

    #[test]
    fn test_window_cannot_start_at_end_of_day() {
        assert!(MaintenanceWindow::parse_range("24:00-02:00").is_err());
    }
}
