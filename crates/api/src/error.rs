//! Maps the crate-wide [`mentisaid_core::Error`] onto the five HTTP classes
//! from the error handling design. Handlers never build ad-hoc error JSON;
//! they propagate `Result<_, ApiError>` and let this `IntoResponse` impl do
//! the translation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mentisaid_core::{Error, StatusClass};
use serde_json::json;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.status_class() {
            StatusClass::BadRequest => StatusCode::BAD_REQUEST,
            StatusClass::NotFound => StatusCode::NOT_FOUND,
            StatusClass::Conflict => StatusCode::CONFLICT,
            StatusClass::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
