/// Shared error type used across all Agent Execution Core crates.
///
/// Every crate boundary returns this enum so the driver can match on error
/// kind regardless of which component raised it (see DESIGN.md, Open
/// Question 2).
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("provider error ({provider}), retryable: {message}")]
    ProviderTransient { provider: String, message: String },

    #[error("provider error ({provider}), fatal: {message}")]
    ProviderFatal { provider: String, message: String },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool timed out: {0}")]
    ToolTimeout(String),

    #[error("tool failed: {0}")]
    ToolFailed(String),

    #[error("question timed out")]
    QuestionTimeout,

    #[error("question cancelled")]
    QuestionCancelled,

    #[error("question channel busy: a question is already pending")]
    QuestionBusy,

    #[error("max iterations reached")]
    MaxIterationsReached { last_content: Option<String> },

    #[error("cancelled")]
    Cancelled,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("http: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
