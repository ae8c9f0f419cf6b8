use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use log::error;
use serde_json::json;
use thiserror::Error;

/// User-visible error taxonomy. Every variant renders as the deterministic
/// `{error:{type,code,message}}` envelope; internal causes are logged, never
/// serialized.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("upstream node or store unavailable")]
    Transient,
    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Wrap a failure from an upstream-touching operation.
    pub fn transient(err: anyhow::Error) -> Self {
        error!("transient failure: {:#}", err);
        ApiError::Transient
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequestError",
            ApiError::NotFound(_) => "NotFoundError",
            ApiError::Transient => "ServiceUnavailableError",
            ApiError::Internal => "InternalServerError",
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("internal failure: {:#}", err);
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "code": self.status_code().as_u16(),
                "message": self.to_string(),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(
            ApiError::bad_request("limit too large").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("block").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Transient.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn envelope_carries_type_code_message() {
        let err = ApiError::NotFound("name");
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), "NotFoundError");
        assert_eq!(err.to_string(), "name not found");
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err: ApiError = anyhow::anyhow!("rocksdb: io stall at /secret/path").into();
        assert_eq!(err.to_string(), "internal error");
    }
}
