use thiserror::Error;

/// Main error type for granoloader
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Malformed mapping document; fatal for the whole run
    #[error("Schema error: {0}")]
    Schema(String),

    /// A required column did not resolve to a value
    #[error("Row {row}: {column} is not valid: {}", .value.as_deref().unwrap_or("<missing>"))]
    InvalidValue {
        row: u64,
        column: String,
        value: Option<String>,
    },

    /// A `file` column could not be fetched
    #[error("Row {row}: could not fetch {url}: {message}")]
    FileFetch {
        row: u64,
        url: String,
        message: String,
    },

    /// The grano server rejected or failed a call
    #[error("Server error: {0}")]
    Transport(String),

    /// CSV decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML decoding errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker or reader task died
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// How far an error reaches: the whole run, one row, or the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Row,
    Transport,
}

impl LoaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoaderError::Schema(_) | LoaderError::Yaml(_) | LoaderError::Config(_) => {
                ErrorKind::Schema
            }
            LoaderError::Transport(_) => ErrorKind::Transport,
            LoaderError::InvalidValue { .. }
            | LoaderError::FileFetch { .. }
            | LoaderError::Csv(_)
            | LoaderError::Io(_)
            | LoaderError::Worker(_) => ErrorKind::Row,
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        LoaderError::Schema(message.into())
    }

    /// Whether the message already names the row it happened on.
    pub fn names_row(&self) -> bool {
        matches!(
            self,
            LoaderError::InvalidValue { .. } | LoaderError::FileFetch { .. }
        )
    }
}

impl From<reqwest::Error> for LoaderError {
    fn from(err: reqwest::Error) -> Self {
        LoaderError::Transport(err.to_string())
    }
}

/// Convenient Result type using LoaderError
pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoaderError::Schema("Test error".to_string());
        assert!(err.to_string().contains("Schema error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_invalid_value_names_row_and_column() {
        let err = LoaderError::InvalidValue {
            row: 7,
            column: "Name".to_string(),
            value: Some("  ".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Row 7:"));
        assert!(msg.contains("Name is not valid"));
        assert_eq!(err.kind(), ErrorKind::Row);
    }

    #[test]
    fn test_invalid_value_missing_input() {
        let err = LoaderError::InvalidValue {
            row: 2,
            column: "Age".to_string(),
            value: None,
        };
        assert!(err.to_string().contains("<missing>"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(LoaderError::Transport("500".into()).kind(), ErrorKind::Transport);
        assert_eq!(LoaderError::schema("bad").kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LoaderError = io_err.into();
        assert!(matches!(err, LoaderError::Io(_)));
    }
}
