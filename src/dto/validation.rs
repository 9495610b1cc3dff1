//! Validation helpers for DTOs, shared with the services that accept the same input.

use time::Time;
use validator::ValidationError;

/// Smallest capacity a ride can be offered with.
pub const MIN_SEATS: u32 = 1;
/// Largest capacity a ride can be offered with.
pub const MAX_SEATS: u32 = 10;
const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;
const MAX_LOCATION_LENGTH: usize = 120;

fn error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Strip everything but digits and require 10 to 15 of them.
///
/// ```ignore
/// normalize_whatsapp("+91 98765-43210") // Ok("919876543210")
/// normalize_whatsapp("12345")           // Err - too short
/// ```
pub fn normalize_whatsapp(raw: &str) -> Result<String, ValidationError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(error(
            "whatsapp_digits",
            format!(
                "Please enter a valid WhatsApp number ({MIN_PHONE_DIGITS}-{MAX_PHONE_DIGITS} digits, got {})",
                digits.len()
            ),
        ));
    }
    Ok(digits)
}

/// Accepts what [`normalize_whatsapp`] accepts.
pub fn validate_whatsapp(raw: &str) -> Result<(), ValidationError> {
    normalize_whatsapp(raw).map(|_| ())
}

/// Pickup and drop labels are free text but must say something.
pub fn validate_location(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(error("location_blank", "Location is required".into()));
    }
    if trimmed.chars().count() > MAX_LOCATION_LENGTH {
        return Err(error(
            "location_length",
            format!("Location must be at most {MAX_LOCATION_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Departure windows are half-open and must not be empty.
pub fn validate_time_window(start: Time, end: Time) -> Result<(), ValidationError> {
    if end <= start {
        return Err(error(
            "time_window",
            "End time must be after start time".into(),
        ));
    }
    Ok(())
}

/// Seats offered must fall within the allowed range.
pub fn validate_seat_count(seats: u32) -> Result<(), ValidationError> {
    if !(MIN_SEATS..=MAX_SEATS).contains(&seats) {
        return Err(error(
            "seat_count",
            format!("Seats must be between {MIN_SEATS} and {MAX_SEATS} (got {seats})"),
        ));
    }
    Ok(())
}
