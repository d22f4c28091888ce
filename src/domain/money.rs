use std::fmt;

/// Money is represented as integer cents to avoid floating-point precision issues.
/// Every amount in the ledger is fixed-point with exactly two fractional digits,
/// so 5000.00 = 500000 cents.
pub type Cents = i64;

/// Largest single amount the ledger accepts: 9,999,999,999,999.99
/// (the NUMERIC(15, 2) ceiling of the storage format).
pub const MAX_AMOUNT_CENTS: Cents = 999_999_999_999_999;

/// Format cents as a plain decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Format cents with thousands separators for chat replies.
/// Example: 500000 -> "5,000.00"
pub fn format_cents_grouped(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = (abs_cents / 100).to_string();
    let remainder = abs_cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}.{:02}", sign, grouped, remainder)
}

/// Parse a decimal string into cents.
/// Accepts either `.` or `,` as the decimal separator.
/// Example: "50.00" -> 5000, "12,5" -> 1250, "100" -> 10000
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim().replace(',', ".");
    let negative = input.starts_with('-');
    let input = input.trim_start_matches('-');

    if input.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }

    let parts: Vec<&str> = input.split('.').collect();
    let (units_str, decimal_str) = match parts.len() {
        1 => (parts[0], ""),
        2 => (parts[0], parts[1]),
        _ => return Err(ParseCentsError::InvalidFormat),
    };

    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !decimal_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::TooLarge)?
    };

    let decimal_cents: i64 = match decimal_str.len() {
        0 => 0,
        // Single digit like "5" means 50 cents
        1 => decimal_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        2 => decimal_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
        _ => return Err(ParseCentsError::TooPrecise),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal_cents))
        .ok_or(ParseCentsError::TooLarge)?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooPrecise,
    TooLarge,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooPrecise => write!(f, "at most two decimal places are allowed"),
            ParseCentsError::TooLarge => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

/// Check that an amount is strictly positive and fits the storage ceiling.
pub fn validate_amount(cents: Cents) -> Result<(), AmountError> {
    if cents <= 0 {
        return Err(AmountError::NotPositive);
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(AmountError::ExceedsCeiling);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountError {
    NotPositive,
    ExceedsCeiling,
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::NotPositive => write!(f, "amount must be positive"),
            AmountError::ExceedsCeiling => write!(
                f,
                "amount exceeds the maximum of {}",
                format_cents_grouped(MAX_AMOUNT_CENTS)
            ),
        }
    }
}

impl std::error::Error for AmountError {}
