//! Shared utility functions for LLM adapters.

use ac_domain::error::CoreError;

/// Convert a [`reqwest::Error`] into the domain [`CoreError`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> CoreError {
    if e.is_timeout() || e.is_connect() {
        CoreError::ProviderTransient {
            provider: "http".into(),
            message: e.to_string(),
        }
    } else {
        CoreError::Http(e.to_string())
    }
}

/// Whether an error is the kind spec.md §4.6 allows one retry for.
pub(crate) fn is_retryable(e: &CoreError) -> bool {
    matches!(e, CoreError::ProviderTransient { .. })
}
