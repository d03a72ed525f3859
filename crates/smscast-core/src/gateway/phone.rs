//! Phone number normalization

/// Normalize a North American number to E.164.
///
/// Ten digits get a `+1` prefix and eleven digits starting with `1` get a
/// bare `+`, ignoring any formatting characters. Anything else is returned
/// unchanged.
pub fn format_phone_number(phone_number: &str) -> String {
    let digits: String = phone_number
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    match digits.len() {
        10 => format!("+1{}", digits),
        11 if digits.starts_with('1') => format!("+{}", digits),
        _ => phone_number.to_string(),
    }
}

/// Whether `phone_number` has the E.164 shape: `+`, then 2 to 15 digits
/// with the first one non-zero
pub fn is_valid_phone_number(phone_number: &str) -> bool {
    let Some(digits) = phone_number.strip_prefix('+') else {
        return false;
    };

    (2..=15).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !digits.starts_with('0')
}
