//! Logical attributes and the ordered column names each one may appear under.
//!
//! Lookups are "first present wins": the first alias holding a non-null value
//! decides, later aliases are never consulted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::Record;

pub const COMPANY: &[&str] = &["company", "company_name", "client_company", "client"];

pub const SUBMITTER: &[&str] = &[
    "observer_name",
    "submitter_name",
    "submitted_by",
    "reported_by",
    "employee_name",
    "conducted_by",
    "name",
];

pub const SUBMITTED_AT: &[&str] = &[
    "created_at",
    "submitted_at",
    "observation_date",
    "meeting_date",
    "event_date",
    "date",
];

pub const INCIDENT_OPENED: &[&str] = &["incident_date", "date", "created_at"];
pub const SAIL_OPENED: &[&str] = &["date_identified", "created_at", "date"];

pub const ENERGY: &[&str] = &["energy_source", "energy_type"];
pub const CONTROL: &[&str] = &["direct_control", "control_type"];
pub const HAZARD_RISK: &[&str] = &["risk_level", "severity", "risk_rating"];
pub const TITLE: &[&str] = &["title", "description", "action_item", "incident_type", "issue"];
pub const RECORD_ID: &[&str] = &["id"];

/// First alias with a non-null value.
pub fn first_present<'a>(record: &'a Record, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| record.get(key))
        .find(|value| !value.is_null())
}

/// First alias holding a non-blank string, trimmed.
pub fn first_text<'a>(record: &'a Record, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .filter_map(|key| record.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// String form of a scalar field; numbers are rendered, objects are not.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub fn str_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

pub fn equals(record: &Record, key: &str, expected: &str) -> bool {
    str_field(record, key) == Some(expected)
}

/// Boolean `true` or the string `"Yes"`.
pub fn is_yes(record: &Record, key: &str) -> bool {
    matches!(record.get(key), Some(Value::Bool(true)))
        || matches!(record.get(key), Some(Value::String(text)) if text == "Yes")
}

/// OR across every company alias.
pub fn matches_company(record: &Record, company: &str) -> bool {
    COMPANY
        .iter()
        .any(|key| str_field(record, key) == Some(company))
}

pub fn id_of(record: &Record) -> Option<String> {
    first_present(record, RECORD_ID).and_then(text_of)
}

/// Timestamp from the first non-null alias. A malformed value means no
/// timestamp; the next alias is not tried.
pub fn timestamp(record: &Record, aliases: &[&str]) -> Option<DateTime<Utc>> {
    first_present(record, aliases)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(offset) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(offset.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whole days elapsed, floored.
pub fn days_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - earlier).num_seconds().div_euclid(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from(value)
    }

    #[test]
    fn company_matches_any_alias() {
        for key in COMPANY {
            let row = record(json!({ *key: "Acme", "status": "Open" }));
            assert!(matches_company(&row, "Acme"), "alias {key} should match");
        }
        let mixed = record(json!({ "company": "Other", "client": "Acme" }));
        assert!(matches_company(&mixed, "Acme"));
    }

    #[test]
    fn company_does_not_match_without_alias() {
        let row = record(json!({ "customer": "Acme", "location": "Acme", "company": "Globex" }));
        assert!(!matches_company(&row, "Acme"));
        assert!(!matches_company(&record(json!({})), "Acme"));
    }

    #[test]
    fn first_present_skips_nulls_and_missing() {
        let row = record(json!({ "energy_source": null, "energy_type": "Electrical" }));
        assert_eq!(first_text(&row, ENERGY), Some("Electrical"));
        let blank = record(json!({ "energy_source": "  ", "energy_type": "Gravity" }));
        assert_eq!(first_text(&blank, ENERGY), Some("Gravity"));
    }

    #[test]
    fn yes_flag_accepts_bool_and_string() {
        assert!(is_yes(&record(json!({ "job_stop": true })), "job_stop"));
        assert!(is_yes(&record(json!({ "job_stop": "Yes" })), "job_stop"));
        assert!(!is_yes(&record(json!({ "job_stop": "No" })), "job_stop"));
        assert!(!is_yes(&record(json!({ "job_stop": false })), "job_stop"));
        assert!(!is_yes(&record(json!({})), "job_stop"));
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(parse_timestamp("2026-03-04T05:06:07Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-04T05:06:07.000+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-04 05:06:07"), Some(expected));
        assert_eq!(
            parse_timestamp("2026-03-04"),
            Some(Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("last tuesday"), None);
    }

    #[test]
    fn malformed_first_alias_means_no_timestamp() {
        let row = record(json!({ "created_at": "garbage", "date": "2026-01-01" }));
        assert_eq!(timestamp(&row, SUBMITTED_AT), None);
        let fallback = record(json!({ "created_at": null, "date": "2026-01-01" }));
        assert!(timestamp(&fallback, SUBMITTED_AT).is_some());
    }

    #[test]
    fn days_between_floors() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 3, 8, 18, 0, 0).unwrap();
        assert_eq!(days_between(earlier, now), 1);
        let future = Utc.with_ymd_and_hms(2026, 3, 10, 18, 0, 0).unwrap();
        assert_eq!(days_between(future, now), -1);
    }
}
