//! Listing timestamps (`yyyy-MM-ddTHH:mm:ss.SSSZ`)

use chrono::{DateTime, NaiveDate, Utc};

use super::{invalid, DecodeError};

const TAG: &str = "LastModified";

/// Parse a fixed-layout ISO-8601 UTC timestamp with millisecond precision,
/// e.g. `2014-12-20T23:02:11.000Z`
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, DecodeError> {
    let trimmed = text.trim();
    let b = trimmed.as_bytes();

    if b.len() != 24
        || b[4] != b'-'
        || b[7] != b'-'
        || b[10] != b'T'
        || b[13] != b':'
        || b[16] != b':'
        || b[19] != b'.'
        || b[23] != b'Z'
    {
        return Err(invalid(TAG, text));
    }

    let field = |start: usize, end: usize| -> Result<u32, DecodeError> {
        b[start..end].iter().try_fold(0u32, |acc, c| {
            if c.is_ascii_digit() {
                Ok(acc * 10 + u32::from(c - b'0'))
            } else {
                Err(invalid(TAG, text))
            }
        })
    };

    let year = field(0, 4)?;
    let month = field(5, 7)?;
    let day = field(8, 10)?;
    let hour = field(11, 13)?;
    let minute = field(14, 16)?;
    let second = field(17, 19)?;
    let millis = field(20, 23)?;

    NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|date| date.and_hms_milli_opt(hour, minute, second, millis))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| invalid(TAG, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2014-12-20T23:02:11.123Z").unwrap();
        assert_eq!(ts.year(), 2014);
        assert_eq!(ts.month(), 12);
        assert_eq!(ts.day(), 20);
        assert_eq!(ts.hour(), 23);
        assert_eq!(ts.minute(), 2);
        assert_eq!(ts.second(), 11);
        assert_eq!(ts.timestamp_subsec_millis(), 123);

        assert_eq!(
            parse_timestamp("2014-12-20T23:02:11.000Z").unwrap(),
            Utc.with_ymd_and_hms(2014, 12, 20, 23, 2, 11).unwrap()
        );
    }

    #[test]
    fn test_rejects_other_layouts() {
        assert!(parse_timestamp("2014-12-20T23:02:11Z").is_err());
        assert!(parse_timestamp("2014-12-20 23:02:11.000Z").is_err());
        assert!(parse_timestamp("2014-13-20T23:02:11.000Z").is_err());
        assert!(parse_timestamp("20x4-12-20T23:02:11.000Z").is_err());
        assert!(parse_timestamp("").is_err());
    }
}
