use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{field} must be at least 1")]
    ZeroValue { field: &'static str },

    #[error("View '{view}' has a checklist item with an empty key")]
    EmptyKey { view: String },

    #[error("View '{view}' item '{key}' has a non-finite weight")]
    InvalidWeight { view: String, key: String },

    #[error("Unknown view '{0}'")]
    UnknownView(String),

    #[error("No views or questions configured")]
    NothingToDo,
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to build glob pattern '{pattern}': {source}")]
    GlobPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Failed to extract text from '{path}': {message}")]
    Extract { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model returned empty content")]
    EmptyContent,

    #[error("Provider configuration error: {0}")]
    Config(String),
}

/// Failure of a single pipeline call. Every variant except the terminal ones is
/// retried by the retry link.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Transport error: {0}")]
    Transport(#[from] ProviderError),

    #[error("Could not decode response: {reason}")]
    Decode { reason: String, raw: String },

    #[error("Response is missing the following question keys: {missing:?}")]
    Validation { missing: Vec<String>, raw: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<CallError>,
    },

    #[error("Concurrency limiter closed")]
    LimiterClosed,
}

impl CallError {
    /// Raw model output that failed to decode or validate, with the reason.
    pub fn malformed_response(&self) -> Option<(&str, String)> {
        match self {
            CallError::Decode { reason, raw } => Some((raw, reason.clone())),
            CallError::Validation { raw, .. } => Some((raw, self.to_string())),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to open cache '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cache lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create output directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Failed to write report: {0}")]
    WriteReport(std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One failed unit of a fan-out, tagged with its input index.
#[derive(Debug)]
pub struct UnitFailure<E> {
    pub index: usize,
    pub error: E,
}

/// Every failure of a fan-out, in input order.
#[derive(Debug)]
pub struct JoinedError<E> {
    pub total: usize,
    pub failures: Vec<UnitFailure<E>>,
}

impl<E> JoinedError<E> {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

impl<E: fmt::Display> fmt::Display for JoinedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} tasks failed: ", self.failures.len(), self.total)?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "[{}] {}", failure.index, failure.error)?;
        }
        Ok(())
    }
}

impl<E: std::error::Error + 'static> std::error::Error for JoinedError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

/// A document fails when any of its repeats fails.
pub type DocumentError = JoinedError<CallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_error_lists_every_cause() {
        let err = JoinedError {
            total: 10,
            failures: vec![
                UnitFailure {
                    index: 2,
                    error: ProviderError::EmptyContent,
                },
                UnitFailure {
                    index: 5,
                    error: ProviderError::Config("bad key".to_string()),
                },
            ],
        };

        let msg = err.to_string();
        assert!(msg.starts_with("2 of 10 tasks failed"));
        assert!(msg.contains("[2] Model returned empty content"));
        assert!(msg.contains("[5] Provider configuration error: bad key"));
        assert_eq!(err.failed_indices(), vec![2, 5]);
    }

    #[test]
    fn test_malformed_response_only_for_decode_and_validation() {
        let validation = CallError::Validation {
            missing: vec!["rust".to_string()],
            raw: "{}".to_string(),
        };
        let (raw, reason) = validation.malformed_response().unwrap();
        assert_eq!(raw, "{}");
        assert!(reason.contains("rust"));

        let transport = CallError::Transport(ProviderError::EmptyContent);
        assert!(transport.malformed_response().is_none());
    }
}
