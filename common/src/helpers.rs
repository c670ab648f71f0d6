use fancy_regex::Regex;
use once_cell::sync::Lazy;

static PHONE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d+$").ok());

/// Unique external reference attached to every provider request.
pub fn generate_payment_reference() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Amount as the provider expects it: whole numbers without a fraction.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{}", amount as i64)
    } else {
        amount.to_string()
    }
}

/// Digits only, country code included and no leading `+`, e.g. `237670000000`.
pub fn is_phone_number(value: &str) -> bool {
    PHONE
        .as_ref()
        .and_then(|re| re.is_match(value.trim()).ok())
        .unwrap_or(false)
}
