use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Normalized forms of a feed item's publication date.
///
/// `display` is the human-facing string (relative for recent dates, absolute
/// beyond a week); `iso` is RFC 3339 in UTC with millisecond precision, or
/// empty when the raw value could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateStamp {
    pub display: String,
    pub iso: String,
}

/// Normalizes a raw feed date string against a reference instant.
///
/// Feeds mix RFC 2822 (`pubDate`), RFC 3339 (`published`/`updated`), and the
/// occasional bare naive timestamp; the parse cascade tries them in that
/// order, treating naive values as UTC.
///
/// Display rules:
/// - less than an hour old (including any future-dated item): `Just now`
/// - less than a day: `N hour(s) ago`
/// - less than a week: `N day(s) ago`
/// - older: `M/D/YYYY` without zero padding
///
/// An unparseable value keeps the raw string as its display form with an
/// empty ISO form; an empty value yields empty strings for both.
pub fn normalize_date(raw: &str, now: DateTime<Utc>) -> DateStamp {
    if raw.is_empty() {
        return DateStamp {
            display: String::new(),
            iso: String::new(),
        };
    }
    match parse_date(raw) {
        Some(date) => DateStamp {
            display: relative_display(date, now),
            iso: date.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
        None => DateStamp {
            display: raw.to_string(),
            iso: String::new(),
        },
    }
}

/// Parse cascade over the date shapes seen in real feeds.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

fn relative_display(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = now.signed_duration_since(date).num_hours();
    if hours < 1 {
        return "Just now".to_string();
    }
    if hours < 24 {
        return format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" });
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{} day{} ago", days, if days == 1 { "" } else { "s" });
    }
    date.format("%-m/%-d/%Y").to_string()
}
