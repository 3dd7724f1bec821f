use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::fetch::StreamError;
use crate::platform::InvalidId;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid content id: {0}")]
    InvalidContentId(#[from] InvalidId),
    #[error("content not found")]
    NotFound,
    #[error("temporarily unavailable: {reason}")]
    Unavailable {
        reason: &'static str,
        retry_after_secs: u64,
    },
}

impl ApiError {
    /// Map a relay failure, advertising `retry_after_secs` on 503
    pub fn from_stream(err: StreamError, retry_after_secs: u64) -> Self {
        match err {
            StreamError::NotFound => ApiError::NotFound,
            StreamError::Unavailable(reason) => ApiError::Unavailable {
                reason: reason.as_str(),
                retry_after_secs,
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidContentId(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidContentId(_) => "INVALID_CONTENT_ID",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Unavailable { .. } => "TEMPORARILY_UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::Unavailable {
            retry_after_secs, ..
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Unavailable;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::InvalidContentId(InvalidId::Empty).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from_stream(StreamError::Unavailable(Unavailable::PoolExhausted), 5)
                .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_unavailable_sets_retry_after() {
        let response =
            ApiError::from_stream(StreamError::Unavailable(Unavailable::RetriesExhausted), 7)
                .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn test_not_found_has_no_retry_after() {
        let response = ApiError::from_stream(StreamError::NotFound, 7).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_stream_errors_never_map_to_server_error() {
        let errors = [
            StreamError::NotFound,
            StreamError::Unavailable(Unavailable::PoolExhausted),
            StreamError::Unavailable(Unavailable::RetriesExhausted),
            StreamError::Unavailable(Unavailable::DownloadFailed),
        ];
        for err in errors {
            let status = ApiError::from_stream(err, 3).status_code();
            assert!(
                status == StatusCode::NOT_FOUND || status == StatusCode::SERVICE_UNAVAILABLE,
                "unexpected status {status}"
            );
        }
    }
}
