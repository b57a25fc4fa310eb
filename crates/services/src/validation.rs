//! Input checks run before any identity is derived.

use domains::error::{AppError, Result};
use std::collections::HashMap;

const MAX_LINKS: usize = 3;
const REPETITION_MIN_WORDS: usize = 5;

pub fn validate_content(content: &str, max_chars: usize) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::ValidationError("tip cannot be empty".to_string()));
    }

    if content.chars().count() > max_chars {
        return Err(AppError::ValidationError(format!(
            "tip exceeds maximum length of {max_chars} characters"
        )));
    }

    if content.matches("http").count() > MAX_LINKS {
        return Err(AppError::ValidationError(
            "too many URLs in content".to_string(),
        ));
    }

    let words: Vec<String> = content.split_whitespace().map(str::to_lowercase).collect();
    if words.len() > REPETITION_MIN_WORDS {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *counts.entry(word.as_str()).or_default() += 1;
        }
        if counts.values().any(|&n| n > words.len() / 2) {
            return Err(AppError::ValidationError(
                "content contains excessive repetition".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_validation_error(result: Result<()>) -> bool {
        matches!(result, Err(AppError::ValidationError(_)))
    }

    #[test]
    fn accepts_ordinary_text() {
        assert!(validate_content("A grey van has idled outside since noon.", 1000).is_ok());
    }

    #[test]
    fn rejects_blank_content() {
        assert!(is_validation_error(validate_content("", 1000)));
        assert!(is_validation_error(validate_content(" \t\n ", 1000)));
    }

    #[test]
    fn length_is_measured_in_characters() {
        assert!(is_validation_error(validate_content(&"x ".repeat(600), 1000)));
        // 1000 multi-byte characters fit in a 1000 character limit
        let accented = "é".repeat(1000);
        assert_eq!(accented.chars().count(), 1000);
        assert!(validate_content(&accented, 1000).is_ok());
    }

    #[test]
    fn rejects_link_spam() {
        let spam = "http://a http://b http://c http://d";
        assert!(is_validation_error(validate_content(spam, 1000)));
        assert!(validate_content("http://a http://b http://c", 1000).is_ok());
    }

    #[test]
    fn rejects_excessive_repetition() {
        assert!(is_validation_error(validate_content(
            "buy buy buy buy now please",
            1000
        )));
        assert!(validate_content("buy buy now please go home", 1000).is_ok());
        // short messages are not checked for repetition
        assert!(validate_content("no no no", 1000).is_ok());
    }
}
