//! Validation utilities for queue construction and consumer registration

/// Longest queue name accepted, counted in characters
pub const MAX_QUEUE_NAME_LEN: usize = 255;

/// Validate a queue name: non-empty, at most 255 characters, no spaces
pub fn validate_queue_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Queue name cannot be empty".to_string());
    }

    let length = name.chars().count();
    if length > MAX_QUEUE_NAME_LEN {
        return Err(format!(
            "Queue name is {} characters long, maximum is {}",
            length, MAX_QUEUE_NAME_LEN
        ));
    }

    if name.contains(' ') {
        return Err("Queue name cannot contain spaces".to_string());
    }

    Ok(())
}

/// Validate positive count value
pub fn validate_positive_count(value: usize) -> Result<usize, String> {
    match value {
        0 => Err("Value must be greater than 0".to_string()),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_queue_name() {
        assert!(validate_queue_name("orders").is_ok());
        assert!(validate_queue_name("orders.created-v2").is_ok());
        assert!(validate_queue_name(&"q".repeat(MAX_QUEUE_NAME_LEN)).is_ok());

        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name(&"q".repeat(MAX_QUEUE_NAME_LEN + 1)).is_err());
        assert!(validate_queue_name("two words").is_err());
        assert!(validate_queue_name(" leading").is_err());
    }

    #[test]
    fn test_queue_name_length_counts_characters() {
        // 255 two-byte characters is within the limit even though it is 510 bytes
        assert!(validate_queue_name(&"é".repeat(MAX_QUEUE_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_validate_positive_count() {
        assert_eq!(validate_positive_count(1).unwrap(), 1);
        assert_eq!(validate_positive_count(64).unwrap(), 64);
        assert!(validate_positive_count(0).is_err());
    }
}
