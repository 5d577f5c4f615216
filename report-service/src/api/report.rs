use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::{Rejection, Reply};

use super::Generator;
use crate::error::ApiError;
use crate::gemini::{GenerationError, ReportGenerator};
use crate::metrics;
use crate::models::{ReportRequest, ReportResponse};
use crate::prompt;

fn reject(e: ApiError) -> Rejection {
    metrics::record_outcome(e.kind());
    warp::reject::custom(e)
}

pub async fn require_generator(generator: Generator) -> Result<Arc<dyn ReportGenerator>, Rejection> {
    generator.ok_or_else(|| {
        error!("Report request rejected: generation client is not configured (check GEMINI_API_KEY)");
        reject(ApiError::Unavailable)
    })
}

/// Collects the request body, failing with `PayloadTooLarge` once it exceeds `limit` bytes.
pub async fn read_body<S, B>(body: S, limit: usize) -> Result<Bytes, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>> + Send,
    B: Buf + Send,
{
    body.map_err(|e| ApiError::Unexpected(e.to_string()))
        .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
            if buffer.len() + chunk.remaining() > limit {
                return Err(ApiError::PayloadTooLarge);
            }
            buffer.put(chunk);
            Ok(buffer)
        })
        .await
        .map(BytesMut::freeze)
        .map_err(reject)
}

pub async fn handle_generate_report(
    generator: Arc<dyn ReportGenerator>,
    content_type: Option<String>,
    body: Bytes,
) -> Result<impl Reply, Rejection> {
    let request_id = Uuid::new_v4();

    match generate_report(request_id, generator.as_ref(), content_type.as_deref(), &body).await {
        Ok(report) => {
            metrics::record_outcome("success");
            Ok(warp::reply::json(&ReportResponse { report }))
        }
        Err(e) => Err(reject(e)),
    }
}

async fn generate_report(
    request_id: Uuid,
    generator: &dyn ReportGenerator,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<String, ApiError> {
    if !is_json(content_type) {
        return Err(ApiError::MalformedRequest);
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| ApiError::MalformedRequest)?;
    if !value.is_object() {
        return Err(ApiError::MalformedRequest);
    }

    let request: ReportRequest =
        serde_json::from_value(value).map_err(|e| ApiError::Unexpected(e.to_string()))?;
    let (findings, template) = request.normalized();
    let prompt = prompt::assemble(findings, template);

    info!(
        "Generating report [{}] (findings: {} chars, template: {} chars)",
        request_id,
        findings.len(),
        template.len()
    );

    match generator.generate(&prompt).await {
        Ok(report) => {
            info!("Report generated [{}]", request_id);
            Ok(report)
        }
        Err(e) => {
            log_generation_error(request_id, &e);
            Err(e.into())
        }
    }
}

fn log_generation_error(request_id: Uuid, err: &GenerationError) {
    match err {
        GenerationError::PermissionDenied(details) => {
            error!("Gemini permission denied [{}]: {}. Check the API key", request_id, details)
        }
        GenerationError::QuotaExceeded(details) => {
            error!("Gemini quota exceeded [{}]: {}", request_id, details)
        }
        GenerationError::SafetyBlocked(details) => {
            warn!("Report generation blocked by safety filters [{}]: {}", request_id, details)
        }
        GenerationError::InvalidArgument(details) => {
            error!("Gemini rejected the request [{}]: {}", request_id, details)
        }
        GenerationError::ResponseExtractionFailed(details) => {
            error!("Could not extract report text [{}]: {}", request_id, details)
        }
        GenerationError::Unknown(details) => {
            error!("Unexpected report generation failure [{}]: {}", request_id, details)
        }
    }
}

/// `application/json` or any `application/*+json` media type.
fn is_json(content_type: Option<&str>) -> bool {
    let Some(mime) = content_type.and_then(|value| value.split(';').next()) else {
        return false;
    };
    let mime = mime.trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}
