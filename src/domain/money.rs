//! Amounts are stored as integer öre (1/100 SEK) everywhere.

pub const CURRENCY: &str = "SEK";

/// Human-readable amount, e.g. `1 250 kr` or `99,50 kr`.
pub fn format_sek(amount_ore: i64) -> String {
    let negative = amount_ore < 0;
    let abs = amount_ore.unsigned_abs();
    let kronor = abs / 100;
    let ore = abs % 100;

    let digits = kronor.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    if ore == 0 {
        format!("{}{} kr", sign, grouped)
    } else {
        format!("{}{},{:02} kr", sign, grouped, ore)
    }
}

/// Decimal string with two fraction digits, as the Swish API expects.
pub fn ore_to_decimal(amount_ore: i64) -> String {
    format!("{}.{:02}", amount_ore / 100, (amount_ore % 100).abs())
}

/// Parses `"100"`, `"100.5"`, `"100,50"` into öre. Rejects more than two
/// decimals and negative values.
pub fn parse_decimal_to_ore(value: &str) -> Option<i64> {
    let normalized = value.trim().replace(',', ".");
    let (whole, frac) = match normalized.split_once('.') {
        Some((w, f)) => (w, f),
        None => (normalized.as_str(), ""),
    };
    if whole.is_empty() || frac.len() > 2 || whole.starts_with('-') {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}
