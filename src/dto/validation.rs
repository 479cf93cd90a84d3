//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

/// Alphabet used for access codes; omits characters that are easy to confuse (0/O, 1/I/L).
pub const ACCESS_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Validates that every vote option has visible text and that no option is repeated.
///
/// # Examples
///
/// ```ignore
/// validate_vote_options(&["Left".into(), "Right".into()]) // Ok
/// validate_vote_options(&["Left".into(), " ".into()])     // Err - blank option
/// validate_vote_options(&["Left".into(), "left".into()])  // Err - duplicate
/// ```
pub fn validate_vote_options(options: &[String]) -> Result<(), ValidationError> {
    if options.iter().any(|option| option.trim().is_empty()) {
        let mut err = ValidationError::new("option_blank");
        err.message = Some("Vote options must not be blank".into());
        return Err(err);
    }

    let mut seen = HashSet::new();
    if !options
        .iter()
        .all(|option| seen.insert(option.trim().to_lowercase()))
    {
        let mut err = ValidationError::new("option_duplicate");
        err.message = Some("Vote options must be distinct".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that an access code only uses characters from [`ACCESS_CODE_ALPHABET`].
pub fn validate_access_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty()
        || !code
            .bytes()
            .all(|byte| ACCESS_CODE_ALPHABET.contains(&byte.to_ascii_uppercase()))
    {
        let mut err = ValidationError::new("access_code_format");
        err.message = Some("Access code contains unsupported characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_validate_vote_options_valid() {
        assert!(validate_vote_options(&options(&["Left", "Right"])).is_ok());
        assert!(validate_vote_options(&options(&["A", "B", "C"])).is_ok());
    }

    #[test]
    fn test_validate_vote_options_blank() {
        assert!(validate_vote_options(&options(&["A", ""])).is_err());
        assert!(validate_vote_options(&options(&["  ", "B"])).is_err());
    }

    #[test]
    fn test_validate_vote_options_duplicate() {
        assert!(validate_vote_options(&options(&["Left", "left "])).is_err());
    }

    #[test]
    fn test_validate_access_code() {
        assert!(validate_access_code("ABC234").is_ok());
        assert!(validate_access_code("abc234").is_ok()); // case-insensitive
        assert!(validate_access_code("ABCO12").is_err()); // ambiguous characters
        assert!(validate_access_code("").is_err());
    }
}
