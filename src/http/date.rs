//! HTTP-date parsing and formatting.
//!
//! Accepts the three formats HTTP/1.1 servers are allowed to send:
//!
//! ```text
//! Sun, 06 Nov 1994 08:49:37 GMT    ; RFC 1123
//! Sunday, 06-Nov-94 08:49:37 GMT   ; RFC 850
//! Sun Nov  6 08:49:37 1994         ; asctime()
//! ```
//!
//! All three normalize to seconds since the Unix epoch (UTC).

use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 2070;

/// Parse an HTTP-date into Unix seconds.
///
/// Returns `None` for anything malformed or out of range.
pub fn parse_time(s: &str) -> Option<i64> {
    let s = s.trim();
    let fields = match s.split_once(',') {
        Some((_weekday, rest)) => {
            let rest = rest.trim_start();
            if rest.split_whitespace().next()?.contains('-') {
                parse_rfc850(rest)?
            } else {
                parse_rfc1123(rest)?
            }
        }
        None => parse_asctime(s)?,
    };
    fields.to_unix()
}

/// Format Unix seconds as an RFC 1123 date.
pub fn format_time(secs: i64) -> Option<String> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()?
        .format(&format)
        .ok()
}

/// Current time in Unix seconds.
pub(crate) fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

struct Fields {
    year: i32,
    month: Month,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl Fields {
    fn to_unix(&self) -> Option<i64> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            return None;
        }
        if !(1..=31).contains(&self.day) || self.hour > 23 || self.minute > 59 || self.second > 59
        {
            return None;
        }
        let date = Date::from_calendar_date(self.year, self.month, self.day).ok()?;
        let time = Time::from_hms(self.hour, self.minute, self.second).ok()?;
        Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
    }
}

// 06 Nov 1994 08:49:37 GMT
fn parse_rfc1123(s: &str) -> Option<Fields> {
    let mut it = s.split_whitespace();
    let day = it.next()?.parse().ok()?;
    let month = parse_month(it.next()?)?;
    let year = it.next()?.parse().ok()?;
    let (hour, minute, second) = parse_clock(it.next()?)?;
    expect_gmt(it.next())?;
    Some(Fields {
        year,
        month,
        day,
        hour,
        minute,
        second,
    })
}

// 06-Nov-94 08:49:37 GMT
fn parse_rfc850(s: &str) -> Option<Fields> {
    let mut it = s.split_whitespace();
    let mut date = it.next()?.split('-');
    let day = date.next()?.parse().ok()?;
    let month = parse_month(date.next()?)?;
    let year_str = date.next()?;
    if date.next().is_some() {
        return None;
    }
    let mut year: i32 = year_str.parse().ok()?;
    if year_str.len() <= 2 {
        year += if year < 70 { 2000 } else { 1900 };
    }
    let (hour, minute, second) = parse_clock(it.next()?)?;
    expect_gmt(it.next())?;
    Some(Fields {
        year,
        month,
        day,
        hour,
        minute,
        second,
    })
}

// Sun Nov  6 08:49:37 1994 [GMT]
fn parse_asctime(s: &str) -> Option<Fields> {
    let mut it = s.split_whitespace();
    let _weekday = it.next()?;
    let month = parse_month(it.next()?)?;
    let day = it.next()?.parse().ok()?;
    let (hour, minute, second) = parse_clock(it.next()?)?;
    let year = it.next()?.parse().ok()?;
    if let Some(zone) = it.next() {
        expect_gmt(Some(zone))?;
    }
    Some(Fields {
        year,
        month,
        day,
        hour,
        minute,
        second,
    })
}

fn parse_clock(s: &str) -> Option<(u8, u8, u8)> {
    let mut parts = s.split(':');
    let hour = parts.next()?.parse().ok()?;
    let minute = parts.next()?.parse().ok()?;
    let second = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((hour, minute, second))
}

fn parse_month(s: &str) -> Option<Month> {
    const MONTHS: [(&str, Month); 12] = [
        ("jan", Month::January),
        ("feb", Month::February),
        ("mar", Month::March),
        ("apr", Month::April),
        ("may", Month::May),
        ("jun", Month::June),
        ("jul", Month::July),
        ("aug", Month::August),
        ("sep", Month::September),
        ("oct", Month::October),
        ("nov", Month::November),
        ("dec", Month::December),
    ];
    MONTHS
        .iter()
        .find(|(name, _)| s.eq_ignore_ascii_case(name))
        .map(|(_, m)| *m)
}

fn expect_gmt(zone: Option<&str>) -> Option<()> {
    match zone {
        Some(z) if z.eq_ignore_ascii_case("GMT") || z.eq_ignore_ascii_case("UTC") => Some(()),
        _ => None,
    }
}
