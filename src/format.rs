//! Presentation formatting shared by the report and chart adapters. Rounding
//! happens here and nowhere else.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::DailyRecord;

pub const NOT_AVAILABLE: &str = "N/A";

/// Two decimals, thousands separated: `1,234.50`.
pub fn currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{}.{cents}", group_thousands(whole))
}

/// One decimal, as in row cells.
pub fn feed(kg: f64) -> String {
    format!("{kg:.1}")
}

/// Two decimals with unit, as in summary totals.
pub fn feed_total(kg: f64) -> String {
    format!("{kg:.2} kg")
}

pub fn quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

pub fn date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn optional(value: Option<&str>) -> &str {
    match value {
        Some(text) if !text.trim().is_empty() => text,
        _ => NOT_AVAILABLE,
    }
}

/// `Both`, `Vacc`, `Med` or `-`.
pub fn treatment_label(record: &DailyRecord) -> &'static str {
    match (record.has_vaccination(), record.has_medicine()) {
        (true, true) => "Both",
        (true, false) => "Vacc",
        (false, true) => "Med",
        (false, false) => "-",
    }
}

pub fn sent_label(routed: bool) -> &'static str {
    if routed {
        "Sent"
    } else {
        "Not Sent"
    }
}

/// Truncates to `max` characters without splitting a code point.
pub fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::daily;

    #[test]
    fn currency_rounds_to_cents() {
        assert_eq!(currency(0.0), "0.00");
        assert_eq!(currency(12.346), "12.35");
        assert_eq!(currency(1234567.5), "1,234,567.50");
        assert_eq!(currency(-1500.0), "-1,500.00");
    }

    #[test]
    fn feed_uses_one_decimal_in_cells() {
        assert_eq!(feed(12.46), "12.5");
        assert_eq!(feed(3.0), "3.0");
        assert_eq!(feed_total(24.756), "24.76 kg");
    }

    #[test]
    fn treatment_labels_cover_combinations() {
        let mut record = daily("u-1", "B1", "2024-01-10", 1, 0, 1.0);
        assert_eq!(treatment_label(&record), "-");
        record.vaccination = Some("Marek".to_string());
        assert_eq!(treatment_label(&record), "Vacc");
        record.medicine = Some("Tylosin".to_string());
        assert_eq!(treatment_label(&record), "Both");
        record.vaccination = None;
        assert_eq!(treatment_label(&record), "Med");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("LAYER-A-2024", 8), "LAYER-A-");
        assert_eq!(truncate("ñandú", 3), "ñan");
        assert_eq!(optional(Some("  ")), NOT_AVAILABLE);
    }
}
