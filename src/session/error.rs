use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to read session file: {0}")]
    ReadError(std::io::Error),
    #[error("Failed to parse session file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Failed to create session directory: {0}")]
    CreateDirError(std::io::Error),
    #[error("Failed to write session file: {0}")]
    WriteError(std::io::Error),
    #[error("Failed to delete session file: {0}")]
    DeleteError(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let error = SessionError::ReadError(std::io::Error::other("boom"));
        assert_eq!(format!("{}", error), "Failed to read session file: boom");

        let error = SessionError::WriteError(std::io::Error::other("disk full"));
        assert_eq!(format!("{}", error), "Failed to write session file: disk full");
    }
}
