use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Command not found: {program}")]
    CommandNotFound { program: String },

    #[error("Command '{command}' failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command '{command}' timed out after {seconds}s")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Cannot patch {file}: {reason}")]
    PatchError { file: String, reason: String },

    #[error("Project directory not found: {path}")]
    ProjectNotFound { path: String },

    #[error("Check '{check}' failed: {details}")]
    CheckFailed { check: String, details: String },
}

/// 錯誤分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Environment,
    Process,
    FileSystem,
    Network,
    Internal,
}

/// 錯誤嚴重程度，決定 CLI 退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DoctorError {
    pub fn config(message: impl Into<String>) -> Self {
        DoctorError::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DoctorError::HttpError(_) => ErrorCategory::Network,
            DoctorError::IoError(_) | DoctorError::PatchError { .. } => ErrorCategory::FileSystem,
            DoctorError::CsvError(_) | DoctorError::SerializationError(_) => {
                ErrorCategory::Internal
            }
            DoctorError::ConfigError { .. }
            | DoctorError::ConfigValidationError { .. }
            | DoctorError::InvalidConfigValueError { .. }
            | DoctorError::MissingConfigError { .. } => ErrorCategory::Configuration,
            DoctorError::CommandNotFound { .. } | DoctorError::ProjectNotFound { .. } => {
                ErrorCategory::Environment
            }
            DoctorError::CommandFailed { .. } | DoctorError::CommandTimeout { .. } => {
                ErrorCategory::Process
            }
            DoctorError::CheckFailed { .. } => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DoctorError::ProjectNotFound { .. } => ErrorSeverity::Critical,
            DoctorError::ConfigError { .. }
            | DoctorError::ConfigValidationError { .. }
            | DoctorError::InvalidConfigValueError { .. }
            | DoctorError::MissingConfigError { .. } => ErrorSeverity::High,
            DoctorError::CommandFailed { .. }
            | DoctorError::CommandTimeout { .. }
            | DoctorError::HttpError(_) => ErrorSeverity::Medium,
            DoctorError::CommandNotFound { .. }
            | DoctorError::PatchError { .. }
            | DoctorError::CheckFailed { .. } => ErrorSeverity::Medium,
            DoctorError::IoError(_)
            | DoctorError::CsvError(_)
            | DoctorError::SerializationError(_) => ErrorSeverity::Medium,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            DoctorError::HttpError(_) => {
                "Check that the development server is listening on the configured host and port".to_string()
            }
            DoctorError::IoError(_) => {
                "Check file permissions and free disk space in the project directory".to_string()
            }
            DoctorError::CsvError(_) | DoctorError::SerializationError(_) => {
                "Re-run with --verbose and report the failing report format".to_string()
            }
            DoctorError::ConfigError { .. } | DoctorError::ConfigValidationError { .. } => {
                "Fix the profile file (stack-doctor.toml) or the command line flags".to_string()
            }
            DoctorError::InvalidConfigValueError { field, .. } => {
                format!("Provide a valid value for '{}'", field)
            }
            DoctorError::MissingConfigError { field } => {
                format!("Add '{}' to the profile or pass it on the command line", field)
            }
            DoctorError::CommandNotFound { program } => format!(
                "Install '{}' or pass --python pointing at a working interpreter",
                program
            ),
            DoctorError::CommandFailed { command, .. } => {
                format!("Run '{}' by hand to see the full output", command)
            }
            DoctorError::CommandTimeout { .. } => {
                "Raise framework.command_timeout_seconds in the profile".to_string()
            }
            DoctorError::PatchError { file, .. } => format!(
                "Restore {} from its .bak backup or edit it by hand, then re-run",
                file
            ),
            DoctorError::ProjectNotFound { .. } => {
                "Pass --project pointing at the directory that contains manage.py".to_string()
            }
            DoctorError::CheckFailed { check, .. } => {
                format!("Re-run with --verbose to see why '{}' failed", check)
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            DoctorError::ProjectNotFound { path } => {
                format!("Project directory '{}' does not exist", path)
            }
            DoctorError::CommandNotFound { program } => {
                format!("Could not find '{}' on this machine", program)
            }
            DoctorError::CommandTimeout { command, seconds } => {
                format!("'{}' did not finish within {} seconds", command, seconds)
            }
            DoctorError::MissingConfigError { field } => {
                format!("The setting '{}' is required", field)
            }
            other => other.to_string(),
        }
    }
}

impl ErrorSeverity {
    /// 0 正常、1 設定錯誤、2 可重試的執行錯誤、3 致命錯誤
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, DoctorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_not_found_is_critical() {
        let err = DoctorError::ProjectNotFound {
            path: "/nope".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert!(err.user_friendly_message().contains("/nope"));
    }

    #[test]
    fn test_config_errors_are_high() {
        let err = DoctorError::InvalidConfigValueError {
            field: "server.port".to_string(),
            value: "0".to_string(),
            reason: "Value must be between 1 and 65535".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.recovery_suggestion().contains("server.port"));
    }

    #[test]
    fn test_command_failures_are_recoverable() {
        let err = DoctorError::CommandFailed {
            command: "python manage.py migrate".to_string(),
            code: Some(1),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.category(), ErrorCategory::Process);
    }

    #[test]
    fn test_exit_codes_follow_severity() {
        let io = DoctorError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(io.severity().exit_code(), 2);
        assert_eq!(DoctorError::config("bad").severity().exit_code(), 1);
        let missing = DoctorError::ProjectNotFound {
            path: "/nope".to_string(),
        };
        assert_eq!(missing.severity().exit_code(), 3);
    }
}
