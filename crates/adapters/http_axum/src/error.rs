//! HTTP error response mapping.

use std::str::FromStr;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use upkeep_domain::error::{UpkeepError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`UpkeepError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(UpkeepError);

impl From<UpkeepError> for ApiError {
    fn from(err: UpkeepError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            UpkeepError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            UpkeepError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            UpkeepError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Parse a typed id from a path or query segment.
pub(crate) fn parse_id<T: FromStr>(raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ValidationError::InvalidId(raw.to_string()).into())
}
