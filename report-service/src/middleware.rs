use std::time::Duration;

use warp::http::{header, Method};

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(600);

/// The client page may be hosted elsewhere; it only needs JSON posts to `/generate_report`.
pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .max_age(PREFLIGHT_MAX_AGE)
}

#[cfg(test)]
mod tests {
    use warp::http::StatusCode;
    use warp::Filter;

    use super::*;
    use crate::api::routes;

    #[tokio::test]
    async fn preflight_for_report_post_is_allowed() {
        let res = warp::test::request()
            .method("OPTIONS")
            .path("/generate_report")
            .header("origin", "https://reports.example.org")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .reply(&routes(None).with(cors()))
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["access-control-allow-origin"],
            "https://reports.example.org"
        );
    }

    #[tokio::test]
    async fn preflight_with_unlisted_method_is_forbidden() {
        let res = warp::test::request()
            .method("OPTIONS")
            .path("/generate_report")
            .header("origin", "https://reports.example.org")
            .header("access-control-request-method", "DELETE")
            .reply(&routes(None).with(cors()))
            .await;

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
