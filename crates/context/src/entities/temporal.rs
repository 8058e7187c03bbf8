//! Temporal phrase resolution
//!
//! Phrases are tried from most to least specific; the first one that yields
//! a valid date window wins. Relative windows end at the day after `now`, so
//! today is always included.

use super::Period;
use chrono::{Datelike, Duration, NaiveDate};
use regex_lite::{Captures, Regex};
use std::str::FromStr;
use std::sync::LazyLock;

const COUNT: &str = r"(\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)";

const MONTH_NAMES: &str = r"(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)";

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{4})-(\d{2})-(\d{2})(?:\s+(?:to|through|until|and|-)\s+|\s*-\s*|\s+)(\d{4})-(\d{2})-(\d{2})\b",
    )
    .expect("date range regex is valid")
});

static MONTH_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})\s+(?:to|through|until|and|-)\s+(\d{4})-(\d{2})\b")
        .expect("month range regex is valid")
});

static RELATIVE_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?:last|past|previous|prior|recent)\s+{}\s+(day|week|month|year)s?\b",
        COUNT
    ))
    .expect("relative count regex is valid")
});

static RELATIVE_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:last|past|previous|prior)\s+(day|week|month|year)\b")
        .expect("relative unit regex is valid")
});

static CURRENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:this\s+(week|month|year)|(ytd|year to date))\b")
        .expect("current period regex is valid")
});

static SINCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bsince\s+(\d{4})(?:-(\d{2}))?\b").expect("since regex is valid")
});

static DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("day regex is valid")
});

static NAMED_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b{}\s+(\d{{4}})\b", MONTH_NAMES)).expect("named month regex is valid")
});

static YEAR_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})\b").expect("year-month regex is valid")
});

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("year regex is valid"));

/// Resolve the first temporal phrase in normalized text against `now`
pub fn resolve_period(normalized: &str, now: NaiveDate) -> Option<Period> {
    let tomorrow = now.succ_opt()?;

    date_range(normalized)
        .or_else(|| month_range(normalized))
        .or_else(|| relative_count(normalized, tomorrow))
        .or_else(|| relative_unit(normalized, tomorrow))
        .or_else(|| current(normalized, now, tomorrow))
        .or_else(|| since(normalized, tomorrow))
        .or_else(|| single_day(normalized))
        .or_else(|| named_month(normalized))
        .or_else(|| year_month(normalized))
        .or_else(|| year(normalized))
}

fn date_range(text: &str) -> Option<Period> {
    let caps = DATE_RANGE.captures(text)?;
    let start = ymd(&caps, 1)?;
    let last = ymd(&caps, 4)?;
    Period::new(
        start,
        last.succ_opt()?,
        format!("{} to {}", start, last),
    )
}

fn month_range(text: &str) -> Option<Period> {
    let caps = MONTH_RANGE.captures(text)?;
    let (y1, m1): (i32, u32) = (num(&caps, 1)?, num(&caps, 2)?);
    let (y2, m2): (i32, u32) = (num(&caps, 3)?, num(&caps, 4)?);
    Period::new(
        month_start(y1, m1)?,
        next_month_start(y2, m2)?,
        format!("{:04}-{:02} to {:04}-{:02}", y1, m1, y2, m2),
    )
}

fn relative_count(text: &str, tomorrow: NaiveDate) -> Option<Period> {
    let caps = RELATIVE_COUNT.captures(text)?;
    let count = parse_count(caps.get(1)?.as_str())?;
    let unit = caps.get(2)?.as_str();
    relative_window(count, unit, tomorrow)
}

fn relative_unit(text: &str, tomorrow: NaiveDate) -> Option<Period> {
    let caps = RELATIVE_UNIT.captures(text)?;
    relative_window(1, caps.get(1)?.as_str(), tomorrow)
}

fn relative_window(count: u32, unit: &str, tomorrow: NaiveDate) -> Option<Period> {
    if count == 0 {
        return None;
    }
    let days_per_unit = match unit {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "year" => 365,
        _ => return None,
    };
    let label = if count == 1 {
        format!("last {}", unit)
    } else {
        format!("last {} {}s", count, unit)
    };
    // `tomorrow - 1` is today; the window covers `count` units back from today
    let start = tomorrow - Duration::days(1 + i64::from(count) * days_per_unit);
    Period::new(start, tomorrow, label)
}

fn current(text: &str, now: NaiveDate, tomorrow: NaiveDate) -> Option<Period> {
    let caps = CURRENT.captures(text)?;
    let unit = match (caps.get(1), caps.get(2)) {
        (Some(unit), _) => unit.as_str(),
        (None, Some(_)) => "year",
        _ => return None,
    };
    let start = match unit {
        "week" => now - Duration::days(i64::from(now.weekday().num_days_from_monday())),
        "month" => month_start(now.year(), now.month())?,
        "year" => NaiveDate::from_ymd_opt(now.year(), 1, 1)?,
        _ => return None,
    };
    Period::new(start, tomorrow, format!("this {}", unit))
}

fn since(text: &str, tomorrow: NaiveDate) -> Option<Period> {
    let caps = SINCE.captures(text)?;
    let year: i32 = num(&caps, 1)?;
    let (start, label) = match caps.get(2) {
        Some(m) => {
            let month: u32 = m.as_str().parse().ok()?;
            (month_start(year, month)?, format!("since {:04}-{:02}", year, month))
        }
        None => (NaiveDate::from_ymd_opt(year, 1, 1)?, format!("since {}", year)),
    };
    Period::new(start, tomorrow, label)
}

fn single_day(text: &str) -> Option<Period> {
    let caps = DAY.captures(text)?;
    let day = ymd(&caps, 1)?;
    Period::new(day, day.succ_opt()?, day.to_string())
}

fn named_month(text: &str) -> Option<Period> {
    let caps = NAMED_MONTH.captures(text)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let year: i32 = num(&caps, 2)?;
    month_period(year, month)
}

fn year_month(text: &str) -> Option<Period> {
    let caps = YEAR_MONTH.captures(text)?;
    month_period(num(&caps, 1)?, num(&caps, 2)?)
}

fn year(text: &str) -> Option<Period> {
    let caps = YEAR.captures(text)?;
    let year: i32 = num(&caps, 1)?;
    Period::new(
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?,
        year.to_string(),
    )
}

fn month_period(year: i32, month: u32) -> Option<Period> {
    Period::new(
        month_start(year, month)?,
        next_month_start(year, month)?,
        format!("{:04}-{:02}", year, month),
    )
}

fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn next_month_start(year: i32, month: u32) -> Option<NaiveDate> {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        // validates `month` as well
        month_start(year, month)?;
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
}

fn ymd(caps: &Captures<'_>, first: usize) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(num(caps, first)?, num(caps, first + 1)?, num(caps, first + 2)?)
}

fn num<T: FromStr>(caps: &Captures<'_>, idx: usize) -> Option<T> {
    caps.get(idx)?.as_str().parse().ok()
}

fn parse_count(raw: &str) -> Option<u32> {
    let word = match raw {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits => return digits.parse().ok(),
    };
    Some(word)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}
