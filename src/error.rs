use std::time::Duration;

/// Failures surfaced by the catalog capability traits.
///
/// Platform clients map HTTP status codes onto these variants so the sync
/// engine never has to inspect wire-level details.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("authentication expired")]
    AuthExpired,

    #[error("search unavailable: {reason}")]
    SearchUnavailable { reason: String },

    #[error("rate limited by platform")]
    RateLimited { retry_after: Option<Duration> },

    /// Programming/config error: the caller handed more tracks than the
    /// platform accepts in a single add request.
    #[error("batch of {len} tracks exceeds the per-request limit of {limit}")]
    BatchTooLarge { len: usize, limit: usize },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl CatalogError {
    /// Whether a bounded retry with backoff is worth attempting. Transport
    /// failures (5xx, dropped connections) count as transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::RateLimited { .. } | CatalogError::Timeout(_) | CatalogError::Http(_)
        )
    }

    /// Platform-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Run-level failures of a playlist sync.
///
/// Everything else (unmatched tracks, degraded searches, failed add batches)
/// is absorbed into the plan or the `SyncResult`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("authentication expired; re-authenticate and run the sync again")]
    AuthExpired,

    #[error(transparent)]
    Catalog(CatalogError),
}

impl From<CatalogError> for SyncError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::AuthExpired => SyncError::AuthExpired,
            other => SyncError::Catalog(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error() -> CatalogError {
        let response = http::Response::builder()
            .status(http::StatusCode::INTERNAL_SERVER_ERROR)
            .body("upstream error")
            .unwrap();
        CatalogError::Http(
            reqwest::Response::from(response)
                .error_for_status()
                .unwrap_err(),
        )
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(server_error().is_retryable());
        assert!(CatalogError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(CatalogError::RateLimited { retry_after: None }.is_retryable());
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!CatalogError::AuthExpired.is_retryable());
        assert!(!CatalogError::NotFound("playlist".into()).is_retryable());
        assert!(!CatalogError::BatchTooLarge { len: 200, limit: 100 }.is_retryable());
        assert!(
            !CatalogError::SearchUnavailable {
                reason: "upstream down".into()
            }
            .is_retryable()
        );
    }
}
