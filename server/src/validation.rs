use llm_core::ChatMessage;

use crate::error::ApiError;

/// Maximum length of one message
const MAX_CONTENT_LENGTH: usize = 5000;
/// Maximum number of messages in one conversation
const MAX_MESSAGES: usize = 64;
const MAX_VOICE_ID_LENGTH: usize = 64;
const ALLOWED_ROLES: [&str; 3] = ["system", "user", "assistant"];

/// Validate the conversation sent with a speak request
pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), ApiError> {
    if messages.is_empty() {
        return Err(ApiError::InvalidInput("Messages cannot be empty".to_string()));
    }
    if messages.len() > MAX_MESSAGES {
        return Err(ApiError::InvalidInput(format!(
            "Too many messages (max {})",
            MAX_MESSAGES
        )));
    }

    for (i, message) in messages.iter().enumerate() {
        if !ALLOWED_ROLES.contains(&message.role.as_str()) {
            return Err(ApiError::InvalidInput(format!(
                "Invalid role '{}' in message {}. Expected one of: {}",
                message.role,
                i,
                ALLOWED_ROLES.join(", ")
            )));
        }
        if message.content.trim().is_empty() {
            return Err(ApiError::InvalidInput(format!("Message {} is empty", i)));
        }
        if message.content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(ApiError::InvalidInput(format!(
                "Message {} too long (max {} characters)",
                i, MAX_CONTENT_LENGTH
            )));
        }
    }

    if messages.last().map(|m| m.role.as_str()) != Some("user") {
        return Err(ApiError::InvalidInput(
            "The last message must come from the user".to_string(),
        ));
    }

    Ok(())
}

/// Validate voice id format (e.g., af_maple, en_US-lessac)
pub fn validate_voice_id(voice: &str) -> Result<(), ApiError> {
    let valid = !voice.is_empty()
        && voice.len() <= MAX_VOICE_ID_LENGTH
        && voice
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "Invalid voice id: {}. Expected letters, digits, '_', '-' or '.'",
            voice
        )))
    }
}

/// Check that `voice` is one of the synthesizer's voices
pub fn validate_voice_available(voice: &str, available: &[String]) -> Result<(), ApiError> {
    validate_voice_id(voice)?;
    if available.iter().any(|v| v == voice) {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "Unknown voice '{}'. Available voices: {}",
            voice,
            available.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_messages_valid() {
        let messages = vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi!"),
            ChatMessage::user("Tell me a joke"),
        ];
        assert!(validate_messages(&messages).is_ok());
    }

    #[test]
    fn test_validate_messages_empty() {
        let result = validate_messages(&[]);
        assert!(matches!(result, Err(ApiError::InvalidInput(msg)) if msg.contains("empty")));

        let result = validate_messages(&[ChatMessage::user("   ")]);
        assert!(matches!(result, Err(ApiError::InvalidInput(msg)) if msg.contains("Message 0 is empty")));
    }

    #[test]
    fn test_validate_messages_bad_role() {
        let result = validate_messages(&[ChatMessage::new("tool", "x"), ChatMessage::user("hi")]);
        assert!(matches!(result, Err(ApiError::InvalidInput(msg)) if msg.contains("Invalid role 'tool'")));
    }

    #[test]
    fn test_validate_messages_too_long() {
        let long_text = "a".repeat(6000);
        let result = validate_messages(&[ChatMessage::user(long_text)]);
        assert!(matches!(result, Err(ApiError::InvalidInput(msg)) if msg.contains("too long")));
    }

    #[test]
    fn test_validate_messages_must_end_with_user() {
        let result = validate_messages(&[ChatMessage::user("hi"), ChatMessage::assistant("hello")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_voice_id() {
        assert!(validate_voice_id("af_maple").is_ok());
        assert!(validate_voice_id("en_US-lessac-medium").is_ok());
        assert!(validate_voice_id("").is_err());
        assert!(validate_voice_id("../etc/passwd").is_err());
        assert!(validate_voice_id(&"v".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_voice_available() {
        let voices = vec!["af_maple".to_string(), "zm_yunjian".to_string()];
        assert!(validate_voice_available("zm_yunjian", &voices).is_ok());
        let err = validate_voice_available("bob", &voices).unwrap_err();
        assert!(err.to_string().contains("Available voices: af_maple, zm_yunjian"));
    }
}
