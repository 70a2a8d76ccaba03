use tracing::warn;

use crate::core::error::ErrorRecord;

/// Default maximum length (in characters) of a sanitized argument.
pub const MAX_ARGUMENT_LENGTH: usize = 500;

/// Sanitize free text received from a client.
///
/// This function:
/// 1. Drops NUL, carriage returns and other control characters
/// 2. Folds newlines and tabs into single spaces
/// 3. Truncates to `max_chars` characters (never splitting a character),
///    appending `...` when truncated
///
/// Non-ASCII text is preserved as-is.
///
/// # Examples
///
/// ```rust
/// use regon_mcp_server::core::security::sanitize_string;
///
/// assert_eq!(sanitize_string("SPÓŁKA\nPółnoc", 100), "SPÓŁKA Północ");
/// ```
pub fn sanitize_string(value: &str, max_chars: usize) -> String {
    let mut sanitized: String = value
        .chars()
        .filter(|c| *c != '\0' && *c != '\r')
        .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    if sanitized.chars().count() > max_chars {
        sanitized = sanitized.chars().take(max_chars).collect();
        sanitized.push_str("...");
        warn!("String truncated to {} characters", max_chars);
    }

    sanitized
}

/// Normalize an externally supplied registry identifier.
///
/// Trims the value and removes the separators people commonly type into
/// NIP/REGON/KRS numbers (whitespace, `-`, `.`), so `"734-286-71-48"` becomes
/// `"7342867148"`. Other characters are kept for the format check to reject.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .filter(|c| !c.is_control())
        .collect()
}

/// Normalize an identifier and check it is all ASCII digits of an allowed length.
///
/// `label` names the identifier in the error message; the rejected value is
/// echoed back in sanitized form.
pub fn validate_digits(label: &str, raw: &str, lengths: &[usize]) -> Result<String, ErrorRecord> {
    let normalized = normalize_identifier(raw);

    if !normalized.is_empty()
        && normalized.chars().all(|c| c.is_ascii_digit())
        && lengths.contains(&normalized.len())
    {
        return Ok(normalized);
    }

    let expected = match lengths {
        [single] => format!("exactly {} digits", single),
        _ => {
            let parts: Vec<String> = lengths.iter().map(|l| l.to_string()).collect();
            format!("{} digits", parts.join(" or "))
        }
    };

    Err(ErrorRecord::validation(format!(
        "{} must be {} (got '{}')",
        label,
        expected,
        sanitize_string(raw, 40)
    )))
}
