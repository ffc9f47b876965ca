use std::cmp::Ordering;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Utc};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ordering key for Slack's decimal-string timestamps (`"1586271896.000200"`).
///
/// Comparing the strings lexically or as `f64` both go wrong at the edges, so
/// the integer seconds and the fraction are kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TsKey {
    secs: i64,
    nanos: u32,
}

impl TsKey {
    pub fn parse(ts: &str) -> Option<Self> {
        let ts = ts.trim();
        let (secs, fraction) = match ts.split_once('.') {
            Some((secs, fraction)) => (secs, fraction),
            None => (ts, ""),
        };
        if secs.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let secs = secs.parse::<i64>().ok()?;

        let mut digits: String = fraction.chars().take(9).collect();
        while digits.len() < 9 {
            digits.push('0');
        }
        let nanos = digits.parse::<u32>().ok()?;

        Some(Self { secs, nanos })
    }

    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.nanos)
    }
}

/// Compares two timestamps numerically; unparsable values sort first.
pub fn compare_ts(a: &str, b: &str) -> Ordering {
    TsKey::parse(a).cmp(&TsKey::parse(b))
}

/// Parses `+09:00`, `-0530` or `Z` into a fixed offset.
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match value.chars().next()? {
        '+' => (1, &value[1..]),
        '-' => (-1, &value[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Calendar conversions for timestamps, pinned to one UTC offset.
#[derive(Debug, Clone)]
pub struct DateUtil {
    offset: FixedOffset,
    frozen_at: Option<DateTime<Utc>>,
}

impl DateUtil {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            frozen_at: None,
        }
    }

    /// Uses the host's current local offset.
    pub fn local() -> Self {
        Self::new(*Local::now().offset())
    }

    /// A clock that always reports `now`.
    #[cfg(test)]
    pub fn frozen(offset: FixedOffset, now: DateTime<Utc>) -> Self {
        Self {
            offset,
            frozen_at: Some(now),
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.frozen_at
            .unwrap_or_else(Utc::now)
            .with_timezone(&self.offset)
    }

    fn ts_to_datetime(&self, ts: &str) -> Option<DateTime<FixedOffset>> {
        TsKey::parse(ts)?
            .to_utc()
            .map(|utc| utc.with_timezone(&self.offset))
    }

    /// `yyyy-MM-dd HH:mm:ss` for a Slack timestamp, `None` when it does not parse.
    pub fn datetime_string(&self, ts: &str) -> Option<String> {
        self.ts_to_datetime(ts)
            .map(|dt| dt.format(DATETIME_FORMAT).to_string())
    }

    /// `yyyyMMdd` of a stored `yyyy-MM-dd HH:mm:ss` value.
    pub fn date_number_of_datetime(&self, value: &str) -> Option<u32> {
        let date = NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()?;
        Some(date_number_of(&date))
    }

    pub fn current_date_number(&self) -> u32 {
        date_number_of(&self.now())
    }

    pub fn current_datetime_string(&self) -> String {
        self.now().format(DATETIME_FORMAT).to_string()
    }

    /// Timestamp for `days` calendar days before now.
    pub fn ts_before_days(&self, days: u32) -> String {
        let now = self.now();
        let before = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(now);
        format_ts(before.with_timezone(&Utc))
    }

    /// Builds an offset-aware datetime from calendar fields.
    #[cfg(test)]
    pub fn at(
        &self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Option<DateTime<Utc>> {
        use chrono::TimeZone;

        self.offset
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn date_number_of<D: chrono::Datelike>(date: &D) -> u32 {
    let year = u32::try_from(date.year()).unwrap_or(0);
    year * 10_000 + date.month() * 100 + date.day()
}

fn format_ts(dt: DateTime<Utc>) -> String {
    format!("{}.{:03}", dt.timestamp(), dt.timestamp_subsec_millis())
}
