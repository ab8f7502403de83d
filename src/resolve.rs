//! Natural-language input resolvers for quick-entry forms.
//!
//! Both functions are pure: no I/O, no clock access. Callers pass "today"
//! explicitly so the rules stay testable.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Minimal class row used by the fuzzy resolver and the coverage aggregator.
#[derive(Debug, Clone)]
pub struct ClassRef {
    pub id: String,
    pub name: String,
}

/// Resolve a free-text due-date phrase to a concrete date.
///
/// Rules, in priority order:
/// 1. `YYYY-MM-DD` passes through unchanged.
/// 2. "today"/"tod".
/// 3. "tomorrow"/"tmrw"/"tmr".
/// 4. "next <weekday>": that weekday in the following week, always >= 7
///    days out even when today is that weekday.
/// 5. Bare weekday name: the next occurrence, where today itself counts
///    (offset 0 allowed, never negative).
/// 6. `M/D` or `M-D`: this year, rolled to next year if already past.
///
/// Anything else returns `None`; due dates are optional so unparseable
/// input must not abort the caller's request.
pub fn resolve_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = input.trim().to_ascii_lowercase();
    if s.is_empty() {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Some(d);
    }

    match s.as_str() {
        "today" | "tod" => return Some(today),
        "tomorrow" | "tmrw" | "tmr" => return Some(today + Duration::days(1)),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("next ") {
        let wd = parse_weekday(rest.trim())?;
        // "next friday" on a Friday means +7, not today.
        let offset = days_until(today.weekday(), wd) + 7;
        return Some(today + Duration::days(offset as i64));
    }

    if let Some(wd) = parse_weekday(&s) {
        return Some(today + Duration::days(days_until(today.weekday(), wd) as i64));
    }

    parse_month_day(&s, today)
}

fn parse_month_day(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let sep = if s.contains('/') {
        '/'
    } else if s.contains('-') {
        '-'
    } else {
        return None;
    };
    let mut parts = s.splitn(2, sep);
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(this_year)
    }
}

/// Accepts full weekday names and abbreviations of 3+ letters ("fri",
/// "thurs", "tuesday").
fn parse_weekday(s: &str) -> Option<Weekday> {
    if s.len() < 3 {
        return None;
    }
    const NAMES: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];
    for (name, wd) in NAMES {
        if name.starts_with(s) {
            return Some(wd);
        }
    }
    // "tues" and "thurs" are common but not prefixes of the full names
    // beyond 4 letters; handle them explicitly.
    match s {
        "tues" => Some(Weekday::Tue),
        "thurs" => Some(Weekday::Thu),
        _ => None,
    }
}

/// Days from `from` forward to the next `to`, with 0 when they match.
fn days_until(from: Weekday, to: Weekday) -> u32 {
    (to.num_days_from_monday() + 7 - from.num_days_from_monday()) % 7
}

/// Resolve free text to a class id. `None` means "general", i.e. the item
/// is not scoped to any class.
///
/// Match order, first hit wins: general aliases, exact name, name prefix,
/// letter+digits abbreviation ("e1" hits "English-1"), substring.
pub fn resolve_class(input: &str, classes: &[ClassRef]) -> Option<String> {
    let needle = input.trim().to_ascii_lowercase();
    if needle.is_empty() || matches!(needle.as_str(), "general" | "gen" | "g") {
        return None;
    }

    for c in classes {
        if c.name.eq_ignore_ascii_case(&needle) {
            return Some(c.id.clone());
        }
    }

    for c in classes {
        if c.name.to_ascii_lowercase().starts_with(&needle) {
            return Some(c.id.clone());
        }
    }

    let mut chars = needle.chars();
    if let Some(first) = chars.next() {
        let digits = chars.as_str();
        if first.is_ascii_alphabetic()
            && !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
        {
            for c in classes {
                let lower = c.name.to_ascii_lowercase();
                if lower.starts_with(first) && lower.contains(digits) {
                    return Some(c.id.clone());
                }
            }
        }
    }

    for c in classes {
        if c.name.to_ascii_lowercase().contains(&needle) {
            return Some(c.id.clone());
        }
    }

    None
}
