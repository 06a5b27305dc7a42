use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

use crate::utils::WorkflowError;

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9][0-9 ()-]{6,19}$").expect("valid phone regex"))
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([01]\d|2[0-3]):[0-5]\d(:[0-5]\d)?$").expect("valid time regex")
    })
}

pub fn validate_phone(phone: &str) -> bool {
    phone_re().is_match(phone.trim())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `validator` custom rule: rejects empty and whitespace-only text.
pub fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Calendar dates travel as `YYYY-MM-DD`, which also sorts correctly as a
/// string in range queries.
pub fn parse_date(value: &str, field: &str) -> Result<String, WorkflowError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| WorkflowError::Validation(format!("{} must be a date (YYYY-MM-DD)", field)))
}

pub fn parse_time(value: &str) -> Result<String, WorkflowError> {
    let value = value.trim();
    if time_re().is_match(value) {
        Ok(value.to_string())
    } else {
        Err(WorkflowError::Validation(
            "scheduledTime must be a time (HH:MM)".to_string(),
        ))
    }
}

/// Splits a comma-separated query value, dropping blanks.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Case-insensitive substring match for a user-supplied needle.
pub fn contains_pattern(needle: &str) -> mongodb::bson::Regex {
    mongodb::bson::Regex {
        pattern: regex::escape(needle.trim()),
        options: "i".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers() {
        assert!(validate_phone("+254 712 345678"));
        assert!(validate_phone("0712345678"));
        assert!(!validate_phone("call me"));
        assert!(!validate_phone("12"));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }

    #[test]
    fn whitespace_is_blank() {
        assert!(non_blank("Ana").is_ok());
        assert!(non_blank(" a ").is_ok());
        assert!(non_blank("").is_err());
        assert!(non_blank(" \t\n ").is_err());
    }

    #[test]
    fn dates_must_be_calendar_days() {
        assert_eq!(parse_date("2024-01-10", "scheduledDate").unwrap(), "2024-01-10");
        assert!(parse_date("2024-02-30", "scheduledDate").is_err());
        assert!(parse_date("10/01/2024", "dateFrom").is_err());
    }

    #[test]
    fn times_accept_optional_seconds() {
        assert_eq!(parse_time("09:30").unwrap(), "09:30");
        assert_eq!(parse_time("23:59:59").unwrap(), "23:59:59");
        assert!(parse_time("24:00").is_err());
        assert!(parse_time("9am").is_err());
    }

    #[test]
    fn csv_values_drop_blanks() {
        assert_eq!(split_csv("plumbing, wiring,,"), vec!["plumbing", "wiring"]);
        assert!(split_csv(" , ").is_empty());
    }

    #[test]
    fn search_patterns_are_escaped() {
        let re = contains_pattern("a.b*");
        assert_eq!(re.pattern, r"a\.b\*");
        assert_eq!(re.options, "i");
    }
}
