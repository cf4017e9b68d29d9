use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use std::collections::HashSet;

const EST_OFFSET_SECS: i32 = -5 * 3600;
const EDT_OFFSET_SECS: i32 = -4 * 3600;

// NYSE closes at 16:00 ET; EOD bars settle a little later.
const CLOSE_CUTOFF_HOUR_ET: u32 = 16;
const CLOSE_CUTOFF_MINUTE_ET: u32 = 30;

pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid as-of date {s:?}, expected YYYY-MM-DD"));
    }

    let offset = if is_us_dst(now_utc) {
        EDT_OFFSET_SECS
    } else {
        EST_OFFSET_SECS
    };
    let et = chrono::FixedOffset::east_opt(offset).context("invalid ET offset")?;
    let now_et = now_utc.with_timezone(&et);

    let cutoff_reached =
        (now_et.hour(), now_et.minute()) >= (CLOSE_CUTOFF_HOUR_ET, CLOSE_CUTOFF_MINUTE_ET);
    let mut date = now_et.date_naive();
    if !cutoff_reached {
        date -= Duration::days(1);
    }

    let extra = configured_holidays();
    while !is_trading_day(date, &extra) {
        date -= Duration::days(1);
    }

    Ok(date)
}

pub fn is_trading_day(date: NaiveDate, extra_holidays: &HashSet<NaiveDate>) -> bool {
    !is_weekend(date) && !is_nyse_holiday(date) && !extra_holidays.contains(&date)
}

/// US daylight saving: second Sunday of March 07:00 UTC to first Sunday of November 06:00 UTC.
fn is_us_dst(now_utc: DateTime<Utc>) -> bool {
    let year = now_utc.year();
    let (Some(start), Some(end)) = (
        nth_weekday(year, 3, Weekday::Sun, 2).and_then(|d| d.and_hms_opt(7, 0, 0)),
        nth_weekday(year, 11, Weekday::Sun, 1).and_then(|d| d.and_hms_opt(6, 0, 0)),
    ) else {
        return false;
    };
    let naive = now_utc.naive_utc();
    naive >= start && naive < end
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn is_nyse_holiday(date: NaiveDate) -> bool {
    let y = date.year();

    let fixed = [(1, 1), (6, 19), (7, 4), (12, 25)]
        .into_iter()
        .filter_map(|(m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .filter_map(observed);

    let floating = [
        nth_weekday(y, 1, Weekday::Mon, 3),  // Martin Luther King Jr. Day
        nth_weekday(y, 2, Weekday::Mon, 3),  // Washington's Birthday
        last_weekday(y, 5, Weekday::Mon),    // Memorial Day
        nth_weekday(y, 9, Weekday::Mon, 1),  // Labor Day
        nth_weekday(y, 11, Weekday::Thu, 4), // Thanksgiving
        easter_sunday(y).map(|d| d - Duration::days(2)),
    ];

    fixed.chain(floating.into_iter().flatten()).any(|h| h == date)
}

/// Saturday holidays are observed on Friday, Sunday holidays on Monday.
/// New Year's Day falling on Saturday is not observed.
fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat if date.month() == 1 && date.day() == 1 => None,
        Weekday::Sat => Some(date - Duration::days(1)),
        Weekday::Sun => Some(date + Duration::days(1)),
        _ => Some(date),
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n as u8)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

/// Anonymous Gregorian computus.
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Extra closures from US_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
pub fn configured_holidays() -> HashSet<NaiveDate> {
    std::env::var("US_MARKET_HOLIDAYS")
        .map(|s| parse_holidays(&s))
        .unwrap_or_default()
}

fn parse_holidays(raw: &str) -> HashSet<NaiveDate> {
    let mut out = HashSet::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
            Ok(d) => {
                out.insert(d);
            }
            Err(_) => tracing::warn!(value = part, "ignoring malformed US_MARKET_HOLIDAYS entry"),
        }
    }
    out
}
