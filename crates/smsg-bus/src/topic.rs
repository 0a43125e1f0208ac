//! Topic validation.

use crate::error::BusError;

/// Check that `topic` has at least one non-whitespace character.
///
/// Every bus operation that takes a topic runs this first, so a bad topic is
/// always reported by the call that received it.
pub fn validate(topic: &str) -> Result<&str, BusError> {
    if topic.trim().is_empty() {
        return Err(BusError::InvalidArgument {
            reason: "topic must be a non-empty string".to_string(),
        });
    }
    Ok(topic)
}
