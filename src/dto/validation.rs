//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest display name accepted at identification.
const MAX_NAME_LENGTH: usize = 32;
/// Longest avatar URL accepted at identification.
const MAX_AVATAR_LENGTH: usize = 512;

/// Validates that a display name is non-blank and at most 32 characters.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("Display name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message =
            Some(format!("Display name must be at most {MAX_NAME_LENGTH} characters").into());
        return Err(err);
    }

    Ok(())
}

/// Validates that an avatar reference is an http(s) URL of sane length.
///
/// An empty avatar is allowed; clients fall back to a generated one.
pub fn validate_avatar(avatar: &str) -> Result<(), ValidationError> {
    if avatar.is_empty() {
        return Ok(());
    }

    if avatar.len() > MAX_AVATAR_LENGTH {
        let mut err = ValidationError::new("avatar_length");
        err.message =
            Some(format!("Avatar URL must be at most {MAX_AVATAR_LENGTH} bytes").into());
        return Err(err);
    }

    if !avatar.starts_with("http://") && !avatar.starts_with("https://") {
        let mut err = ValidationError::new("avatar_scheme");
        err.message = Some("Avatar must be an http(s) URL".into());
        return Err(err);
    }

    Ok(())
}
