use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

/// Maps instants onto calendar days of one fixed timezone.
///
/// Every "today" in the engine comes from here, so both partners share the
/// same day boundary regardless of where their requests originate.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    pub fn new(utc_offset_minutes: i32) -> anyhow::Result<Self> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                anyhow::anyhow!("UTC offset out of range: {} minutes", utc_offset_minutes)
            })?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.date_of(now)
    }

    /// Start of the calendar day after `now`, expressed in UTC.
    pub fn next_day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = self.today(now) + Duration::days(1);
        let local_midnight = tomorrow.and_time(chrono::NaiveTime::MIN);
        let utc_midnight =
            local_midnight - Duration::seconds(self.offset.local_minus_utc() as i64);
        DateTime::<Utc>::from_naive_utc_and_offset(utc_midnight, Utc)
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_follows_configured_offset() {
        // 23:30 UTC is already the next day at UTC+2
        let instant = Utc.with_ymd_and_hms(2026, 5, 1, 23, 30, 0).unwrap();
        assert_eq!(
            Calendar::utc().date_of(instant),
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
        );
        assert_eq!(
            Calendar::new(120).unwrap().date_of(instant),
            NaiveDate::from_ymd_opt(2026, 5, 2).unwrap()
        );
        assert_eq!(
            Calendar::new(-300).unwrap().date_of(Utc.with_ymd_and_hms(2026, 5, 2, 3, 0, 0).unwrap()),
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
        );
    }

    #[test]
    fn next_day_start_is_local_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            Calendar::utc().next_day_start(now),
            Utc.with_ymd_and_hms(2026, 5, 2, 0, 0, 0).unwrap()
        );
        // UTC+2: local midnight of May 2nd is 22:00 UTC on May 1st
        assert_eq!(
            Calendar::new(120).unwrap().next_day_start(now),
            Utc.with_ymd_and_hms(2026, 5, 1, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_out_of_range_offset() {
        assert!(Calendar::new(24 * 60).is_err());
    }

    #[test]
    fn absurd_offset_is_an_error_not_an_overflow() {
        assert!(Calendar::new(i32::MAX).is_err());
        assert!(Calendar::new(i32::MIN).is_err());
    }
}
