use std::fmt;

pub const PHONE_NUMBER_LEN: usize = 9;
pub const ALLOWED_PHONE_PREFIXES: &[&str] = &["84", "82", "83", "86", "87"];
pub const MIN_AMOUNT: f64 = 1.0;
pub const MAX_AMOUNT: f64 = 50_000.0;
pub const ORDER_REFERENCE_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Shape checks applied to the request body before any business rule.
pub fn validate_phone_format(phone_number: &str) -> ValidationResult {
    if phone_number.chars().count() != PHONE_NUMBER_LEN {
        return Err(ValidationError::new(
            "phone_number",
            format!("must be exactly {} characters", PHONE_NUMBER_LEN),
        ));
    }

    if !phone_number.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new(
            "phone_number",
            "must contain only digits",
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: f64) -> ValidationResult {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_order_reference(order_reference: &str) -> ValidationResult {
    validate_required("order_reference", order_reference)?;
    validate_max_len("order_reference", order_reference, ORDER_REFERENCE_MAX_LEN)
}

/// Payment amounts must lie in (1, 50000].
pub fn validate_amount_range(amount: f64) -> ValidationResult {
    if !amount.is_finite() || amount <= MIN_AMOUNT {
        return Err(ValidationError::new(
            "amount",
            format!("amount out of range: minimum payment amount is above {} MZN", MIN_AMOUNT),
        ));
    }

    if amount > MAX_AMOUNT {
        return Err(ValidationError::new(
            "amount",
            format!("amount out of range: maximum payment amount is {} MZN", MAX_AMOUNT),
        ));
    }

    Ok(())
}

/// A payable number is nine digits on one of the allowed network prefixes.
pub fn validate_mpesa_number(phone_number: &str) -> ValidationResult {
    let well_formed = phone_number.len() == PHONE_NUMBER_LEN
        && phone_number.chars().all(|ch| ch.is_ascii_digit());

    if !well_formed || !ALLOWED_PHONE_PREFIXES.contains(&&phone_number[..2]) {
        return Err(ValidationError::new(
            "phone_number",
            format!(
                "invalid phone prefix: use an M-Pesa number starting with {}",
                ALLOWED_PHONE_PREFIXES.join(", ")
            ),
        ));
    }

    Ok(())
}

/// Rounds to cents the way amounts are accepted at the boundary.
pub fn round_amount(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
