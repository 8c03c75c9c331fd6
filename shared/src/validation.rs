//! Validation of amounts typed into the deposit and withdrawal forms.

use thiserror::Error;

/// Largest single transaction the forms accept, in rupiah
pub const MAX_AMOUNT: f64 = 1_000_000_000.0;

const CURRENCY_PREFIX: &str = "rp";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AmountValidationError {
    #[error("Please enter an amount")]
    Empty,
    #[error("Please enter a valid amount: {0}")]
    InvalidFormat(String),
    #[error("Amount must be greater than 0")]
    NotPositive,
    #[error("Amount is too large. Maximum is Rp{0:.0}")]
    TooLarge(f64),
}

fn strip_currency_prefix(input: &str) -> &str {
    match input.get(..CURRENCY_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(CURRENCY_PREFIX) => &input[CURRENCY_PREFIX.len()..],
        _ => input,
    }
}

/// Whole rupiah, either plain digits or grouped in threes by `.` or `,`
fn whole_rupiah_digits(amount: &str) -> Result<String, AmountValidationError> {
    let groups: Vec<&str> = amount.split(['.', ',']).collect();
    let all_digits = |group: &str| !group.is_empty() && group.chars().all(|c| c.is_ascii_digit());

    if !groups.iter().all(|g| all_digits(g)) {
        return Err(AmountValidationError::InvalidFormat(amount.to_string()));
    }
    let grouped = groups.len() > 1;
    if grouped && (groups[0].len() > 3 || groups[1..].iter().any(|g| g.len() != 3)) {
        return Err(AmountValidationError::InvalidFormat(format!(
            "{} (rupiah amounts have no fractional part)",
            amount
        )));
    }
    Ok(groups.concat())
}

/// Parse form input such as `"50000"`, `"Rp 50.000"`, `"rp 1,250,000"` or `" 7500 "`.
///
/// Separators are read as thousands separators; fractional amounts are refused.
pub fn parse_amount_input(input: &str) -> Result<f64, AmountValidationError> {
    let cleaned: String = strip_currency_prefix(input.trim())
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err(AmountValidationError::Empty);
    }

    let (negative, unsigned) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    let digits = whole_rupiah_digits(unsigned)?;
    let amount = digits
        .parse::<f64>()
        .map_err(|e| AmountValidationError::InvalidFormat(e.to_string()))?;

    if negative || amount <= 0.0 {
        return Err(AmountValidationError::NotPositive);
    }
    if amount > MAX_AMOUNT {
        return Err(AmountValidationError::TooLarge(MAX_AMOUNT));
    }
    Ok(amount)
}
