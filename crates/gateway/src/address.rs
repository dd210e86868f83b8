//! Recipient address normalization.
//!
//! Providers address WhatsApp recipients by phone number; submissions arrive
//! in whatever shape the upstream system produced (`whatsapp:` prefixes,
//! separators, missing `+`). Normalization is a pure function so the
//! pipeline can validate before any side effect happens.

use courier_common::error::AppError;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Minimum digits for a plausible international number.
const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Normalize a recipient to canonical `+<digits>` form.
///
/// Accepts an optional `whatsapp:` prefix and common separators
/// (spaces, dashes, dots, parentheses). Anything else is rejected.
pub fn normalize_recipient(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let without_prefix = trimmed.strip_prefix(WHATSAPP_PREFIX).unwrap_or(trimmed);
    let without_plus = without_prefix.strip_prefix('+').unwrap_or(without_prefix);

    let mut digits = String::with_capacity(without_plus.len());
    for c in without_plus.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(AppError::InvalidAddress(format!(
                    "unexpected character '{c}' in recipient '{raw}'"
                )));
            }
        }
    }

    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
        return Err(AppError::InvalidAddress(format!(
            "recipient '{raw}' must contain {MIN_DIGITS}-{MAX_DIGITS} digits"
        )));
    }

    Ok(format!("+{digits}"))
}

/// `whatsapp:+<digits>` form used by the Twilio messaging API.
pub fn with_whatsapp_prefix(normalized: &str) -> String {
    if normalized.starts_with(WHATSAPP_PREFIX) {
        normalized.to_string()
    } else {
        format!("{WHATSAPP_PREFIX}{normalized}")
    }
}

/// Bare digits form used by the Meta Cloud API.
pub fn digits_only(normalized: &str) -> String {
    normalized.chars().filter(char::is_ascii_digit).collect()
}
