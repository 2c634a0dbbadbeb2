//! Validation helpers for DTOs.

use validator::ValidationError;

/// Number of characters in a room code.
pub const ROOM_CODE_LENGTH: usize = 6;
/// Characters used in room codes; look-alikes such as `0/O` and `1/I` are left out.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Longest accepted display name.
pub const MAX_NAME_LENGTH: usize = 32;

/// Validates that a room code is exactly [`ROOM_CODE_LENGTH`] characters of
/// [`ROOM_CODE_ALPHABET`], ignoring case.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("ABC234") // Ok
/// validate_room_code("abc234") // Ok - case-insensitive
/// validate_room_code("ABC10")  // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.chars().count() != ROOM_CODE_LENGTH {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be exactly {ROOM_CODE_LENGTH} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .bytes()
        .all(|b| ROOM_CODE_ALPHABET.contains(&b.to_ascii_uppercase()))
    {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code contains unsupported characters".into());
        return Err(err);
    }

    Ok(())
}

/// Canonical form of a room code.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Validates that a display name is non-blank and at most [`MAX_NAME_LENGTH`] characters.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("name_empty");
        err.message = Some("Name must not be empty".into());
        return Err(err);
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some(format!("Name must be at most {MAX_NAME_LENGTH} characters").into());
        return Err(err);
    }
    Ok(())
}
