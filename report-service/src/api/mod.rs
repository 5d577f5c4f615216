use std::sync::Arc;

use bytes::Bytes;
use warp::{Filter, Rejection, Reply};

use crate::error::handle_rejection;
use crate::gemini::ReportGenerator;
use crate::metrics;

mod report;

/// `None` when no API key was configured at startup.
pub type Generator = Option<Arc<dyn ReportGenerator>>;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub fn routes(generator: Generator) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let report_route = warp::path("generate_report")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_generator(generator))
        .and_then(report::require_generator)
        .and(warp::header::optional::<String>("content-type"))
        .and(report_body())
        .and_then(report::handle_generate_report);

    let index_route = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(INDEX_HTML));

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            let (buffer, content_type) = metrics::render();
            warp::reply::with_header(buffer, "Content-Type", content_type)
        });

    report_route
        .or(index_route)
        .or(health_route)
        .or(metrics_route)
        .recover(handle_rejection)
}

// Streamed so chunked requests work; the size cap applies while reading.
fn report_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::body::stream().and_then(|body| report::read_body(body, MAX_BODY_BYTES))
}

fn with_generator(
    generator: Generator,
) -> impl Filter<Extract = (Generator,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || generator.clone())
}
