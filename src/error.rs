//! Structured error types for tool responses.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,

    // Not found errors
    QuestNotFound,
    PostNotFound,
    ParentNotFound,

    // Internal errors
    DatabaseError,
    InternalError,
    UnknownTool,
}

/// Structured error for tool responses.
#[derive(Debug, Serialize)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn quest_not_found(quest_id: &str) -> Self {
        Self::new(
            ErrorCode::QuestNotFound,
            format!("Quest not found: {}", quest_id),
        )
    }

    pub fn post_not_found(post_id: &str) -> Self {
        Self::new(
            ErrorCode::PostNotFound,
            format!("Post not found: {}", post_id),
        )
    }

    pub fn parent_not_found(parent_id: &str) -> Self {
        Self::new(
            ErrorCode::ParentNotFound,
            format!("Parent post not found: {}", parent_id),
        )
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("Unknown tool: {}", name))
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolError {}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ToolError>() {
            Ok(tool_err) => tool_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(sql_err) => ToolError::database(sql_err),
                Err(err) => ToolError::internal(err),
            },
        }
    }
}

/// Error code carried by an `anyhow` error, if it wraps a [`ToolError`].
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.downcast_ref::<ToolError>().map(|e| e.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_screaming_snake_codes() {
        let err = ToolError::quest_not_found("q1").with_details("looked in quests");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "QUEST_NOT_FOUND");
        assert_eq!(json["message"], "Quest not found: q1");
        assert_eq!(json["details"], "looked in quests");
        assert!(json.get("field").is_none());
    }

    #[test]
    fn roundtrips_through_anyhow() {
        let err: anyhow::Error = ToolError::missing_field("quest_id").into();
        assert_eq!(error_code(&err), Some(ErrorCode::MissingRequiredField));

        let back: ToolError = err.into();
        assert_eq!(back.field.as_deref(), Some("quest_id"));
    }

    #[test]
    fn plain_anyhow_becomes_internal() {
        let back: ToolError = anyhow::anyhow!("boom").into();
        assert_eq!(back.code, ErrorCode::InternalError);
    }
}
