//! Gateway-wide error kinds.
//!
//! Subsystems define their own `thiserror` enums where the failure surface is
//! local (providers, memory, retrieval). Everything that crosses the API or
//! orchestrator boundary converges on [`GatewayError`], whose variants map
//! 1:1 onto response classes: input problems are 4xx and never retried,
//! provider failures are recovered locally when a fallback exists, transient
//! failures are retried only by the background task manager.

use axum::http::StatusCode;

/// Error kinds surfaced at component boundaries.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed or missing input; surfaced as 4xx, never retried.
    #[error("invalid input: {0}")]
    Input(String),

    /// Unauthenticated or forbidden.
    #[error("not authorized: {0}")]
    Auth(String),

    /// Resource does not exist in the caller's scope.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or state-transition violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// External service failure (LLM, SMS provider, embedding, database).
    #[error("provider failure: {0}")]
    Provider(String),

    /// Retriable failure (timeout, 5xx, rate limit).
    #[error("transient failure: {0}")]
    Transient(String),

    /// Invariant violation in our own code.
    #[error("internal error: {0}")]
    Fatal(String),
}

impl GatewayError {
    /// HTTP status for the API layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Input(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Provider(_) | Self::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether the background task manager may retry the failed operation.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_owned()),
            sqlx::Error::PoolTimedOut => Self::Transient("database pool timed out".to_owned()),
            other => Self::Provider(format!("database error: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_classes() {
        assert_eq!(
            GatewayError::Input("x".to_owned()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Auth("x".to_owned()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::NotFound("x".to_owned()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Conflict("x".to_owned()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn only_transient_is_retriable() {
        assert!(GatewayError::Transient("x".to_owned()).is_retriable());
        assert!(!GatewayError::Provider("x".to_owned()).is_retriable());
        assert!(!GatewayError::Input("x".to_owned()).is_retriable());
    }
}
