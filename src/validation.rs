//! Credential validation for register and login payloads.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

/// One field-level validation failure, rendered as `{ "path", "message" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Validate)]
struct RegisterInput {
    #[validate(email(message = "Invalid email address"))]
    email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    password: String,
}

#[derive(Debug, Validate)]
struct LoginInput {
    #[validate(email(message = "Invalid email address"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

/// Validate registration input: email format and password strength.
pub fn validate_registration(email: &str, password: &str) -> Result<(), Vec<FieldError>> {
    let mut errors = collect(
        RegisterInput {
            email: email.to_string(),
            password: password.to_string(),
        }
        .validate(),
    );

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one number",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate login input shape. Says nothing about whether the account exists.
pub fn validate_login(email: &str, password: &str) -> Result<(), Vec<FieldError>> {
    let errors = collect(
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
        .validate(),
    );
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn collect(result: Result<(), ValidationErrors>) -> Vec<FieldError> {
    let Err(errors) = result else {
        return Vec::new();
    };

    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| FieldError {
                path: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", field)),
            })
        })
        .collect();
    // HashMap order is random; keep responses stable
    fields.sort_by(|a, b| a.path.cmp(&b.path));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_valid_registration() {
        assert!(validate_registration("alice@example.com", "Secret123").is_ok());
    }

    #[test]
    fn test_bad_email() {
        let errors = validate_registration("not-an-email", "Secret123").unwrap_err();
        assert_eq!(errors, vec![FieldError::new("email", "Invalid email address")]);
    }

    #[test]
    fn test_weak_password_lists_every_rule() {
        let errors = validate_registration("alice@example.com", "abc").unwrap_err();
        let msgs = messages(&errors);

        assert!(errors.iter().all(|e| e.path == "password"));
        assert!(msgs.contains(&"Password must be at least 8 characters long"));
        assert!(msgs.contains(&"Password must contain at least one uppercase letter"));
        assert!(msgs.contains(&"Password must contain at least one number"));
        assert!(!msgs.contains(&"Password must contain at least one lowercase letter"));
    }

    #[test]
    fn test_password_missing_lowercase() {
        let errors = validate_registration("alice@example.com", "SECRET123").unwrap_err();
        assert_eq!(
            messages(&errors),
            vec!["Password must contain at least one lowercase letter"]
        );
    }

    #[test]
    fn test_login_requires_password() {
        let errors = validate_login("alice@example.com", "").unwrap_err();
        assert_eq!(errors, vec![FieldError::new("password", "Password is required")]);
    }

    #[test]
    fn test_login_accepts_weak_password_shape() {
        assert!(validate_login("alice@example.com", "x").is_ok());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
