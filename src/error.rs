//! Input-error taxonomy for tool calls.
//!
//! Tool handlers return `anyhow::Result`. Errors the caller caused are
//! raised as [`ToolError`] so transports can downcast and classify them;
//! anything else is an internal failure.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument '{name}': {message}")]
    InvalidArgument { name: &'static str, message: String },

    #[error("path outside workspace root: {}", .0.display())]
    OutsideWorkspace(PathBuf),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("no apps indexed")]
    NoApps,
}

impl ToolError {
    /// Stable machine-readable code used in transport error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::MissingArgument(_) | ToolError::InvalidArgument { .. } => "bad_request",
            ToolError::OutsideWorkspace(_) => "outside_workspace",
            ToolError::NotFound(_) | ToolError::UnknownTool(_) | ToolError::NoApps => "not_found",
        }
    }

    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        ToolError::InvalidArgument {
            name,
            message: message.into(),
        }
    }
}

/// The [`ToolError`] inside `err`, if it was raised as one.
pub fn as_tool_error(err: &anyhow::Error) -> Option<&ToolError> {
    err.downcast_ref::<ToolError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = ToolError::OutsideWorkspace(PathBuf::from("/etc")).into();
        let tool = as_tool_error(&err).unwrap();
        assert_eq!(tool.code(), "outside_workspace");
        assert_eq!(err.to_string(), "path outside workspace root: /etc");
    }

    #[test]
    fn test_context_does_not_hide_kind() {
        let err = anyhow::Error::from(ToolError::MissingArgument("query")).context("search_semantic");
        assert!(as_tool_error(&err).is_some());
    }

    #[test]
    fn test_plain_errors_are_not_tool_errors() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(as_tool_error(&err).is_none());
    }
}
