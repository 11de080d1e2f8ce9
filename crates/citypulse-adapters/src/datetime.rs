//! Forward-biased parsing of the date text found on listing cards.
//!
//! Listing sites render dates for humans: "Sat, Aug 9, 7:00 PM",
//! "Tomorrow at 6:30pm", "9 August · 6pm AEST". Parsing is deterministic
//! given a reference instant, and biased toward the future: a date with no
//! year that has already passed rolls to the next year, and a bare weekday
//! means its next occurrence. Text with no recognizable clock time resolves
//! to noon local. Unparsable text yields `None` and the candidate is
//! dropped upstream.

use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::base::clean_text;

static AMPM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:[:.](\d{2}))?\s*([ap])\.?m\.?\b").expect("valid am/pm regex")
});
static H24_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid 24h regex"));
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid iso date regex"));
static MDY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2,4})\b").expect("valid m/d/y regex"));

const MONTHS: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:t|tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTHS})\b\.?,?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s*(\d{{4}})\b)?"
    ))
    .expect("valid month-day regex")
});
static DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTHS})\b\.?(?:,?\s*(\d{{4}})\b)?"
    ))
    .expect("valid day-month regex")
});

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

/// Parse free-form date text into a UTC instant, biased toward the future
/// relative to `reference`. ISO-8601 timestamps (JSON-LD) parse directly.
pub fn parse_forward(text: &str, tz: Tz, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, "%Y-%m-%dT%H:%M:%S") {
        return local_to_utc(naive.date(), naive.time(), tz);
    }

    let local_reference = reference.with_timezone(&tz).date_naive();
    let date = extract_date(&cleaned, local_reference)?;
    let time = extract_time(&cleaned)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(12, 0, 0).expect("valid noon"));
    local_to_utc(date, time, tz)
}

fn extract_time(text: &str) -> Option<NaiveTime> {
    if let Some(caps) = AMPM_RE.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let meridiem = caps[3].to_ascii_lowercase();
        let hour = match (hour, meridiem.as_str()) {
            (12, "a") => 0,
            (12, "p") => 12,
            (h, "p") => h + 12,
            (h, _) => h,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(caps) = H24_RE.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    None
}

fn extract_date(text: &str, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = ISO_DATE_RE.captures(text) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    if let Some(caps) = MDY_RE.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        // US order first, day-first as a fallback for local sites.
        return NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(year, day, month));
    }

    if let Some(caps) = MONTH_DAY_RE.captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        return resolve_forward(reference, month, day, year);
    }

    if let Some(caps) = DAY_MONTH_RE.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        return resolve_forward(reference, month, day, year);
    }

    let lower = text.to_ascii_lowercase();
    if word_in(&lower, "tomorrow") {
        return reference.succ_opt();
    }
    if word_in(&lower, "today") || word_in(&lower, "tonight") {
        return Some(reference);
    }

    for (name, weekday) in WEEKDAYS {
        if word_in(&lower, name) || word_in(&lower, &name[..3]) {
            let days_ahead = (weekday.num_days_from_monday() + 7
                - reference.weekday().num_days_from_monday())
                % 7;
            return reference.checked_add_days(Days::new(u64::from(days_ahead)));
        }
    }

    None
}

fn resolve_forward(
    reference: NaiveDate,
    month: u32,
    day: u32,
    year: Option<i32>,
) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day);
            match this_year {
                Some(date) if date >= reference => Some(date),
                _ => NaiveDate::from_ymd_opt(reference.year() + 1, month, day),
            }
        }
    }
}

fn month_number(token: &str) -> Option<u32> {
    let prefix = token.get(..3)?.to_ascii_lowercase();
    match prefix.as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

fn word_in(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == word)
}

fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&NaiveDateTime::new(date, time)) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        // DST gap: no such local time existed.
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TIMEZONE;

    // Tuesday 2026-03-10, 09:00 in Sydney.
    fn reference() -> DateTime<Utc> {
        DEFAULT_TIMEZONE
            .with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
            .single()
            .expect("valid reference")
            .with_timezone(&Utc)
    }

    fn local(text: &str) -> Option<NaiveDateTime> {
        parse_forward(text, DEFAULT_TIMEZONE, reference())
            .map(|dt| dt.with_timezone(&DEFAULT_TIMEZONE).naive_local())
    }

    fn ymd_hm(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn parses_card_style_date_with_time() {
        assert_eq!(
            local("Sat, Aug 15, 7:00 PM"),
            Some(ymd_hm(2026, 8, 15, 19, 0))
        );
    }

    #[test]
    fn parses_australian_day_first_style() {
        assert_eq!(
            local("15 August 2026 · 6:30pm AEST"),
            Some(ymd_hm(2026, 8, 15, 18, 30))
        );
    }

    #[test]
    fn dates_without_year_roll_forward() {
        // Jan 5 has already passed relative to the March reference.
        assert_eq!(local("Jan 5"), Some(ymd_hm(2027, 1, 5, 12, 0)));
        // Aug 15 has not.
        assert_eq!(local("Aug 15"), Some(ymd_hm(2026, 8, 15, 12, 0)));
    }

    #[test]
    fn keywords_resolve_relative_to_reference() {
        assert_eq!(local("Tomorrow at 7pm"), Some(ymd_hm(2026, 3, 11, 19, 0)));
        assert_eq!(local("today 10:00"), Some(ymd_hm(2026, 3, 10, 10, 0)));
    }

    #[test]
    fn bare_weekday_means_next_occurrence() {
        // Reference is a Tuesday; the following Saturday is Mar 14.
        assert_eq!(local("Saturday"), Some(ymd_hm(2026, 3, 14, 12, 0)));
        // The reference weekday itself means today.
        assert_eq!(local("Tuesday 8pm"), Some(ymd_hm(2026, 3, 10, 20, 0)));
    }

    #[test]
    fn iso_timestamps_parse_directly() {
        let parsed = parse_forward(
            "2026-11-02T19:30:00+11:00",
            DEFAULT_TIMEZONE,
            reference(),
        )
        .unwrap();
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2026, 11, 2, 8, 30, 0).single().unwrap()
        );
        assert_eq!(local("2026-05-04"), Some(ymd_hm(2026, 5, 4, 12, 0)));
    }

    #[test]
    fn numeric_dates_accept_both_orders() {
        assert_eq!(local("10/8/2026"), Some(ymd_hm(2026, 10, 8, 12, 0)));
        assert_eq!(local("25/12/2026"), Some(ymd_hm(2026, 12, 25, 12, 0)));
    }

    #[test]
    fn unparsable_text_is_dropped() {
        assert_eq!(local("Multiple dates and times"), None);
        assert_eq!(local(""), None);
    }

    #[test]
    fn dst_gap_times_are_dropped() {
        // Sydney skips 02:00-03:00 on 2026-10-04.
        assert_eq!(local("October 4 2026 2:30 AM"), None);
    }

    #[test]
    fn noon_is_assumed_without_a_clock_time() {
        assert_eq!(local("Sat, Aug 15"), Some(ymd_hm(2026, 8, 15, 12, 0)));
    }
}
