use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Classification credential not found: {message}")]
    MissingCredentialError { message: String },

    #[error("No data found in the selected column (\"{column}\")")]
    EmptyInputError { column: String },

    #[error("Classifier service error: {message}")]
    ServiceError { message: String },

    #[error("Classifier returned a malformed response: {message}")]
    MalformedResponseError { message: String },

    #[error("Classifier response entry {position} carries id {found}, which is not in the batch")]
    ResponseMismatchError { position: usize, found: i64 },

    #[error("Batch {batch_index} failed after {attempts} attempts")]
    BatchFailedError { batch_index: usize, attempts: u32 },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Transient,
    Pipeline,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ClassifyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. }
            | Self::MissingCredentialError { .. } => ErrorCategory::Configuration,
            Self::EmptyInputError { .. } | Self::CsvError(_) | Self::ValidationError { .. } => {
                ErrorCategory::Input
            }
            Self::ApiError(_)
            | Self::ServiceError { .. }
            | Self::MalformedResponseError { .. }
            | Self::ResponseMismatchError { .. } => ErrorCategory::Transient,
            Self::BatchFailedError { .. } => ErrorCategory::Pipeline,
            Self::ZipError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Transient => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Pipeline => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Whether a batch runner may try the same request again.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::EmptyInputError { column } => {
                format!("No data found in the selected column (\"{}\").", column)
            }
            Self::BatchFailedError {
                batch_index,
                attempts,
            } => format!("Batch {} failed after {} attempts.", batch_index, attempts),
            Self::MissingCredentialError { .. } => {
                "Classification API key not found.".to_string()
            }
            Self::MissingConfigError { field } => format!("Please select a {} first.", field),
            Self::ApiError(_) | Self::ServiceError { .. } => {
                "The classification service did not return a valid response.".to_string()
            }
            Self::CsvError(_) | Self::ZipError(_) => "Failed to read the input file.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the sheet/column selection, the config file and the GEMINI_API_KEY variable"
            }
            ErrorCategory::Input => "Pick a column that contains non-blank values",
            ErrorCategory::Transient => "Check API limits or network connectivity and retry",
            ErrorCategory::Pipeline => {
                "Already classified rows were kept; rerun to classify the remaining batches"
            }
            ErrorCategory::System => "Check file permissions and available disk space",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifyError>;
