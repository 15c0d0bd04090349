//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::error::AuthError;

/// Validate email
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }

    if email.len() > 254 {
        return Err(AuthError::Validation(
            "Email must be at most 254 characters long".to_string(),
        ));
    }

    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

    match regex {
        Some(regex) if regex.is_match(email) => Ok(()),
        _ => Err(AuthError::Validation("Invalid email format".to_string())),
    }
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(AuthError::Validation(
            "Password must be at most 128 characters long".to_string(),
        ));
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err(AuthError::Validation(
            "Password must contain both letters and digits".to_string(),
        ));
    }

    Ok(())
}

/// Validate a Kenyan mobile number in international form (254XXXXXXXXX)
pub fn validate_phone_number(phone: &str) -> Result<(), AuthError> {
    static PHONE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = PHONE_REGEX.get_or_init(|| Regex::new(r"^254[17]\d{8}$").ok());

    match regex {
        Some(regex) if regex.is_match(phone) => Ok(()),
        _ => Err(AuthError::Validation(
            "Phone number must look like 2547XXXXXXXX".to_string(),
        )),
    }
}

/// Trim and lowercase an email address before lookup or storage
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(validate_email("achieng@makazi.co.ke").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email(&format!("{}@example.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn passwords() {
        assert!(validate_password("Nairobi2024").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn phone_numbers() {
        assert!(validate_phone_number("254712345678").is_ok());
        assert!(validate_phone_number("254112345678").is_ok());
        assert!(validate_phone_number("0712345678").is_err());
        assert!(validate_phone_number("25471234567").is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Kamau@Example.COM "), "kamau@example.com");
    }
}
