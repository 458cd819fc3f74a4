//! Input validation utilities for media identifiers, seed keys and numeric options
//!
//! Everything arriving over the API passes through here before it reaches the
//! analysis pipeline, so malformed input is rejected instead of panicking.

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for resource IDs (media_id, track_id, etc.)
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for seed keys fed to the synthetic generator
pub const MAX_SOURCE_KEY_LENGTH: usize = 1024;

// ============================================================================
// Safe Time Operations
// ============================================================================

/// Get current Unix timestamp in milliseconds, safely handling clock errors
pub fn safe_unix_timestamp_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            0
        }
    }
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate resource ID (media_id, etc.)
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    // Prevent path traversal in IDs
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

/// Validate a seed key. Any printable text is accepted.
pub fn validate_source_key(key: &str) -> Result<()> {
    validate_non_empty(key, "source_key")?;
    validate_length(key, MAX_SOURCE_KEY_LENGTH, "source_key")?;
    if key.chars().any(char::is_control) {
        return Err(anyhow!("source_key contains control characters"));
    }
    Ok(())
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    // Written so NaN falls outside every range
    if !(value >= min && value <= max) {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
