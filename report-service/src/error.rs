use thiserror::Error;
use warp::{http::StatusCode, reject::Reject, Rejection, Reply};

use crate::gemini::GenerationError;
use crate::models::ErrorResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Report generation service is currently unavailable. Missing API configuration.")]
    Unavailable,

    #[error("Request must be JSON")]
    MalformedRequest,

    #[error("Request body is too large")]
    PayloadTooLarge,

    #[error("{}", generation_message(.0))]
    Generation(#[from] GenerationError),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

fn generation_message(err: &GenerationError) -> String {
    match err {
        GenerationError::PermissionDenied(details) => format!(
            "API Permission Denied. Please check API key configuration. Details: {}",
            details
        ),
        GenerationError::QuotaExceeded(_) => {
            "API quota exceeded. Please try again later or check your usage limits.".to_string()
        }
        GenerationError::SafetyBlocked(_) => "Report generation failed due to safety filters. The content may have been flagged as potentially harmful.".to_string(),
        GenerationError::InvalidArgument(details) => {
            format!("Invalid request sent to API. Details: {}", details)
        }
        GenerationError::ResponseExtractionFailed(_) => {
            "Failed to process the response from the report generation service.".to_string()
        }
        GenerationError::Unknown(details) => format!("An unexpected error occurred: {}", details),
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Generation(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Unavailable | ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unavailable => "unavailable",
            ApiError::MalformedRequest => "malformed_request",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::Generation(err) => err.kind(),
            ApiError::Unexpected(_) => "unexpected",
        }
    }
}

impl Reject for ApiError {}

fn error_reply(message: String, status: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&ErrorResponse { error: message }), status)
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(api_err) = err.find::<ApiError>() {
        Ok(error_reply(api_err.to_string(), api_err.status_code()))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        Ok(error_reply(
            ApiError::PayloadTooLarge.to_string(),
            StatusCode::PAYLOAD_TOO_LARGE,
        ))
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        Ok(error_reply(
            "A content-length header is required".to_string(),
            StatusCode::LENGTH_REQUIRED,
        ))
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use warp::Filter;

    use super::*;

    #[test]
    fn generation_errors_use_their_suggested_status() {
        let cases = [
            (GenerationError::PermissionDenied("denied".into()), StatusCode::FORBIDDEN),
            (GenerationError::QuotaExceeded("quota".into()), StatusCode::TOO_MANY_REQUESTS),
            (GenerationError::SafetyBlocked("blocked".into()), StatusCode::BAD_REQUEST),
            (GenerationError::InvalidArgument("bad".into()), StatusCode::BAD_REQUEST),
            (
                GenerationError::ResponseExtractionFailed("empty".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (GenerationError::Unknown("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn messages_carry_upstream_details_where_useful() {
        let err = ApiError::from(GenerationError::PermissionDenied("key revoked".into()));
        assert_eq!(
            err.to_string(),
            "API Permission Denied. Please check API key configuration. Details: key revoked"
        );

        let err = ApiError::from(GenerationError::Unknown("connection reset".into()));
        assert_eq!(err.to_string(), "An unexpected error occurred: connection reset");

        let err = ApiError::from(GenerationError::SafetyBlocked("Prompt blocked: SAFETY".into()));
        assert!(err.to_string().contains("safety filters"));
    }

    #[tokio::test]
    async fn warp_length_rejections_become_json_errors() {
        let reply = handle_rejection(warp::reject::custom(ApiError::PayloadTooLarge))
            .await
            .unwrap()
            .into_response();
        assert_eq!(reply.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let filter = warp::body::content_length_limit(4)
            .and(warp::body::bytes())
            .map(|_: bytes::Bytes| "ok")
            .recover(handle_rejection);

        let res = warp::test::request()
            .method("POST")
            .body("too long")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Request body is too large");

        let res = warp::test::request().method("POST").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::LENGTH_REQUIRED);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert!(body["error"].as_str().unwrap().contains("content-length"));
    }
}
