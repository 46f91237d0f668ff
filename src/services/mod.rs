//! Platform adapters. Each client wraps one streaming platform's REST API
//! and implements the catalog capability traits the sync engine consumes.

pub mod apple_music;
pub mod spotify;

use std::time::Duration;

use reqwest::{Response, StatusCode, header};

use crate::error::CatalogError;

/// Map a platform HTTP response onto the catalog error taxonomy.
/// 401 means the token died; 429 carries the platform's retry hint.
pub(crate) fn check_status(response: Response) -> Result<Response, CatalogError> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(CatalogError::AuthExpired),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(CatalogError::RateLimited { retry_after })
        }
        StatusCode::NOT_FOUND => Err(CatalogError::NotFound(response.url().path().to_string())),
        _ => response.error_for_status().map_err(CatalogError::Http),
    }
}

/// Degrade transport-level search failures to `SearchUnavailable` so the
/// planner can tell them apart from a dead token or a rate limit.
pub(crate) fn as_search_error(err: CatalogError) -> CatalogError {
    match err {
        err @ (CatalogError::AuthExpired
        | CatalogError::RateLimited { .. }
        | CatalogError::Timeout(_)) => err,
        other => CatalogError::SearchUnavailable {
            reason: other.to_string(),
        },
    }
}
