use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::engine::error::AttendanceError;

/// Source of "now". Injected so admission and reports are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Stands still until a test moves it.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock(std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock(std::sync::Mutex::new(start))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AttendanceError> {
        if end <= start {
            return Err(AttendanceError::invalid("range end must be after its start"));
        }
        Ok(TimeRange { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// The reference timezone that decides where a "day" or a "month" starts.
/// Every day/month filter in the service goes through here.
#[derive(Debug, Clone, Copy)]
pub struct ReportZone {
    tz: Tz,
}

pub const DEFAULT_REPORT_TIMEZONE: &str = "America/Argentina/Buenos_Aires";

impl Default for ReportZone {
    fn default() -> Self {
        ReportZone {
            tz: chrono_tz::America::Argentina::Buenos_Aires,
        }
    }
}

impl ReportZone {
    pub fn new(tz: Tz) -> Self {
        ReportZone { tz }
    }

    pub fn parse(name: &str) -> Result<Self, String> {
        name.parse::<Tz>().map(ReportZone::new)
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_date(now)
    }

    /// First instant of `date` in the reference zone, as UTC.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        // a DST gap at midnight moves the start to the first valid instant
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(midnight + Duration::hours(1)))
                    .earliest()
            })
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    pub fn day_range(&self, date: NaiveDate) -> TimeRange {
        let next = date.succ_opt().unwrap_or(date);
        TimeRange {
            start: self.start_of_day(date),
            end: self.start_of_day(next),
        }
    }

    pub fn month_range(&self, year: i32, month: u32) -> Result<TimeRange, AttendanceError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AttendanceError::invalid(format!("invalid month {}-{}", year, month)))?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .ok_or_else(|| AttendanceError::invalid(format!("invalid month {}-{}", year, month)))?;
        Ok(TimeRange {
            start: self.start_of_day(first),
            end: self.start_of_day(next),
        })
    }

    /// `(year, month)` of the local month containing `now`.
    pub fn current_month(&self, now: DateTime<Utc>) -> (i32, u32) {
        let today = self.today(now);
        (today.year(), today.month())
    }

    /// `(year, month)` of the local month before the one containing `now`.
    pub fn previous_month(&self, now: DateTime<Utc>) -> (i32, u32) {
        let (year, month) = self.current_month(now);
        if month == 1 {
            (year - 1, 12)
        } else {
            (year, month - 1)
        }
    }
}
