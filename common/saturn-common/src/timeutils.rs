use std::time::SystemTime;
use time::{OffsetDateTime, Weekday};

/// Calendar fields as reported by the SMPC real-time clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    // 0 = Sunday
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl RtcDateTime {
    #[must_use]
    pub fn from_offset_date_time(datetime: OffsetDateTime) -> Self {
        Self {
            year: datetime.year().clamp(0, i32::from(u16::MAX)) as u16,
            month: datetime.month() as u8,
            day: datetime.day(),
            weekday: weekday_number(datetime.weekday()),
            hour: datetime.hour(),
            minute: datetime.minute(),
            second: datetime.second(),
        }
    }

    /// Date for a Unix timestamp in seconds. Out-of-range timestamps fall back to the epoch.
    #[must_use]
    pub fn from_unix_seconds(seconds: i64) -> Self {
        let datetime = OffsetDateTime::from_unix_timestamp(seconds).unwrap_or_else(|err| {
            log::error!("Invalid RTC base time {seconds}: {err}");
            OffsetDateTime::UNIX_EPOCH
        });
        Self::from_offset_date_time(datetime)
    }

    /// Current host wall-clock time (UTC).
    #[must_use]
    pub fn now() -> Self {
        Self::from_unix_seconds(current_unix_seconds())
    }
}

fn weekday_number(weekday: Weekday) -> u8 {
    weekday.number_days_from_sunday()
}

/// Seconds since the Unix epoch, or 0 if the host clock reports a time before the epoch.
#[must_use]
pub fn current_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamp_fields() {
        // 2024-02-29 13:45:30 UTC, a Thursday
        let rtc = RtcDateTime::from_unix_seconds(1_709_214_330);
        assert_eq!(
            rtc,
            RtcDateTime {
                year: 2024,
                month: 2,
                day: 29,
                weekday: 4,
                hour: 13,
                minute: 45,
                second: 30
            }
        );
    }
}
