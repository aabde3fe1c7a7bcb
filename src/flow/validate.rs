//! Free-text step rules. Each returns the normalized value or a user-facing
//! rejection reason.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;

// dd/mm, dd/mm/yy or dd/mm/yyyy; `-` and `.` are accepted as separators
static CUSTOM_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})(?:[/.\-](\d{4}|\d{2}))?$").unwrap()
});

/// Parse a user-typed amount.
///
/// Everything except digits, `.`, `,` and `-` is dropped, so `"$1,250.00"`
/// and `"1.250,00 MXN"` both read as 1250. Separator handling:
///
/// - both `.` and `,` present: the last one is the decimal point, the other
///   is a thousands separator
/// - one separator appearing more than once: thousands separator
/// - one separator appearing once: decimal point, unless exactly three
///   digits follow it (`1,500` is fifteen hundred)
pub fn parse_amount(input: &str, max: Decimal) -> Result<Decimal, String> {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Err("That is not a number. Type an amount like 150.50".into());
    }

    let normalized = normalize_separators(&cleaned);
    let amount = Decimal::from_str(&normalized)
        .map_err(|_| "That is not a number. Type an amount like 150.50".to_string())?;
    if amount <= Decimal::ZERO {
        return Err("The amount must be greater than zero".into());
    }
    if amount > max {
        return Err(format!("The amount cannot exceed {}", max));
    }
    Ok(amount)
}

fn normalize_separators(cleaned: &str) -> String {
    let dots = cleaned.matches('.').count();
    let commas = cleaned.matches(',').count();
    match (dots, commas) {
        (0, 0) => cleaned.to_string(),
        (_, 0) | (0, _) => {
            let sep = if dots > 0 { '.' } else { ',' };
            let count = dots.max(commas);
            let decimals = cleaned.rsplit(sep).next().map_or(0, str::len);
            if count == 1 && decimals != 3 {
                cleaned.replace(sep, ".")
            } else {
                cleaned.replace(sep, "")
            }
        }
        _ => {
            let last_dot = cleaned.rfind('.');
            let last_comma = cleaned.rfind(',');
            let (decimal, thousands) = if last_dot > last_comma {
                ('.', ',')
            } else {
                (',', '.')
            };
            cleaned.replace(thousands, "").replace(decimal, ".")
        }
    }
}

/// Trim and check the character count lies in `[min, max]`.
pub fn check_length(input: &str, min: usize, max: usize, what: &str) -> Result<String, String> {
    let trimmed = input.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(format!("The {} must be at least {} characters", what, min));
    }
    if len > max {
        return Err(format!("The {} must be at most {} characters", what, max));
    }
    Ok(trimmed.to_string())
}

/// Parse a typed date. Without a year the current year of `today` is used;
/// two-digit years are in the 2000s.
pub fn parse_custom_date(input: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let malformed = || "Use the format dd/mm or dd/mm/yyyy".to_string();
    let caps = CUSTOM_DATE_REGEX.captures(input.trim()).ok_or_else(malformed)?;
    let day: u32 = caps[1].parse().map_err(|_| malformed())?;
    let month: u32 = caps[2].parse().map_err(|_| malformed())?;
    let year = match caps.get(3) {
        Some(y) if y.as_str().len() == 2 => 2000 + y.as_str().parse::<i32>().map_err(|_| malformed())?,
        Some(y) => y.as_str().parse().map_err(|_| malformed())?,
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("{:02}/{:02}/{} is not a valid date", day, month, year))
}

/// Quick-pick date `days` before `today`.
pub fn quick_date(today: NaiveDate, days: u8) -> NaiveDate {
    today - chrono::Duration::days(days.into())
}

pub fn quick_date_label(days: u8) -> &'static str {
    match days {
        0 => "Today",
        1 => "Yesterday",
        2 => "Day before yesterday",
        3 => "3 days ago",
        _ => "4 days ago",
    }
}
