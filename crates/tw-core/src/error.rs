//! Configuration errors.
//!
//! [`ConfigError`] is raised while loading a configuration file, by
//! [`Config::validate`](crate::Config::validate), and when the watched root
//! is checked before startup.

use camino::Utf8PathBuf;

/// Why a configuration could not be used.
///
/// # Examples
///
/// ```
/// use tw_core::ConfigError;
/// use camino::Utf8PathBuf;
///
/// let error = ConfigError::MissingDirectory(Utf8PathBuf::from("/media/jobs"));
/// assert_eq!(error.to_string(), "missing required directory: /media/jobs");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A path is set but cannot be used, or is not set at all.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: Utf8PathBuf,
        /// Why it cannot be used.
        reason: String,
    },

    /// The watched root does not exist.
    #[error("missing required directory: {0}")]
    MissingDirectory(Utf8PathBuf),

    /// An option is out of range or malformed.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// Dotted option name, e.g. `debounce.settle_ms`.
        option: String,
        /// What is wrong with its value.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`Config`](crate::Config).
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidOption`].
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let error = ConfigError::InvalidPath {
            path: Utf8PathBuf::from("/media/jobs/list.txt"),
            reason: "not a directory".to_owned(),
        };
        insta::assert_snapshot!(
            error.to_string(),
            @"invalid path '/media/jobs/list.txt': not a directory"
        );
    }

    #[test]
    fn test_missing_directory_display() {
        let error = ConfigError::MissingDirectory(Utf8PathBuf::from("/media/jobs"));
        insta::assert_snapshot!(error.to_string(), @"missing required directory: /media/jobs");
    }

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::invalid_option("debounce.settle_ms", "must be greater than zero");
        insta::assert_snapshot!(
            error.to_string(),
            @"invalid configuration option 'debounce.settle_ms': must be greater than zero"
        );
    }
}
